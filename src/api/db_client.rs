use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::config::RuntimeConfig;
use crate::error::DbError;

pub const PRE_REGISTRATIONS: &str = "pre_registrations";
pub const MARKET_PRICES: &str = "market_prices";
pub const CALCULATOR_USAGE: &str = "calculator_usage";
pub const PAGE_ANALYTICS: &str = "page_analytics";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
}

impl FilterOp {
    fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Gt => "gt",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Row selection for select/update/subscribe calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub columns: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn gt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            op: FilterOp::Gt,
            value: value.into(),
        });
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Renders the query as PostgREST query-string parameters.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(self.filters.len() + 4);
        params.push((
            "select".to_string(),
            self.columns.clone().unwrap_or_else(|| "*".to_string()),
        ));
        for filter in &self.filters {
            params.push((
                filter.column.clone(),
                format!("{}.{}", filter.op.as_str(), render_value(&filter.value)),
            ));
        }
        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", column, direction)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

pub type ChangeCallback = Box<dyn Fn(Value) + Send + Sync + 'static>;

/// Live change feed. Dropping it stops delivery.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn unsubscribe(self) {
        drop(self)
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// What the rest of the crate may do with the hosted database.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DbClient: Send + Sync {
    /// Inserts rows and returns them as stored (ids, defaults filled in).
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, DbError>;

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, DbError>;

    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<(), DbError>;

    /// Exact row count of a table.
    async fn count(&self, table: &str) -> Result<u64, DbError>;

    fn subscribe(&self, table: &str, query: Query, callback: ChangeCallback) -> Result<Subscription, DbError>;
}

pub type ClientHandle = Arc<dyn DbClient>;

/// The client library entry point: turns endpoint settings into a handle.
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send + Sync {
    fn create_client(&self, config: &RuntimeConfig) -> Result<ClientHandle, DbError>;
}
