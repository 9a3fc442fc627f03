#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use carbonyx::{
    api::db_client::{ChangeCallback, ClientHandle, Connector, DbClient, Query, Subscription},
    config::{Environment, RuntimeConfig, ServerConfig},
    error::DbError,
    utils::{
        analytics::DbAnalytics,
        init_gate::{Dependency, InitGate, InitPolicy},
        staging::FileStaging,
    },
    AppState,
};
use serde_json::{json, Value};

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// In-memory stand-in for the hosted database.
#[derive(Default)]
pub struct FakeDb {
    pub rows: Mutex<Vec<(String, Value)>>,
    pub fail_with: Mutex<Option<DbError>>,
    pub inserts: Mutex<usize>,
}

impl FakeDb {
    pub fn failing(error: DbError) -> Self {
        let db = Self::default();
        *db.fail_with.lock().unwrap() = Some(error);
        db
    }

    pub fn rows_in(&self, table: &str) -> Vec<Value> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, row)| row.clone())
            .collect()
    }

    fn check(&self) -> Result<(), DbError> {
        match self.fail_with.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DbClient for FakeDb {
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, DbError> {
        *self.inserts.lock().unwrap() += 1;
        self.check()?;
        let mut stored = self.rows.lock().unwrap();
        let mut out = Vec::new();
        for mut row in rows {
            row["id"] = json!(stored.len() + 1);
            row["created_at"] = json!("2025-10-16T00:00:00+00:00");
            stored.push((table.to_string(), row.clone()));
            out.push(row);
        }
        Ok(out)
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, DbError> {
        self.check()?;
        let mut rows = self.rows_in(table);
        rows.retain(|row| {
            query
                .filters
                .iter()
                .all(|f| row.get(&f.column).map(|v| v == &f.value).unwrap_or(false))
        });
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<(), DbError> {
        self.check()?;
        let mut stored = self.rows.lock().unwrap();
        for (t, row) in stored.iter_mut() {
            let matches = t == table
                && query
                    .filters
                    .iter()
                    .all(|f| row.get(&f.column).map(|v| v == &f.value).unwrap_or(false));
            if matches {
                if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
                    for (k, v) in fields {
                        target.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<u64, DbError> {
        self.check()?;
        Ok(self.rows_in(table).len() as u64)
    }

    fn subscribe(&self, _table: &str, _query: Query, _callback: ChangeCallback) -> Result<Subscription, DbError> {
        Ok(Subscription::new(tokio::spawn(std::future::pending::<()>())))
    }
}

pub struct FakeConnector(pub Arc<FakeDb>);

impl Connector for FakeConnector {
    fn create_client(&self, _config: &RuntimeConfig) -> Result<ClientHandle, DbError> {
        Ok(self.0.clone())
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub db: Arc<FakeDb>,
    pub config_slot: Arc<Dependency<RuntimeConfig>>,
    pub connector_slot: Arc<Dependency<dyn Connector>>,
    pub _dir: tempfile::TempDir,
}

fn settings(dir: &tempfile::TempDir) -> ServerConfig {
    ServerConfig {
        admin_token: Some(ADMIN_TOKEN.to_string()),
        staging_path: dir.path().join("pending.json"),
        init_policy: InitPolicy {
            delay_unit: std::time::Duration::from_millis(10),
            max_attempts: 3,
        },
        ..ServerConfig::default()
    }
}

/// App whose database client is not wired up yet.
pub fn pending_app(db: FakeDb) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(&dir);
    let config_slot: Arc<Dependency<RuntimeConfig>> = Arc::new(Dependency::new());
    let connector_slot: Arc<Dependency<dyn Connector>> = Arc::new(Dependency::new());
    let gate = Arc::new(InitGate::new(config_slot.clone(), connector_slot.clone(), settings.init_policy));
    let state = Arc::new(AppState::new(
        gate.clone(),
        Arc::new(FileStaging::new(settings.staging_path.clone())),
        Arc::new(DbAnalytics::new(gate)),
        settings,
    ));
    TestApp {
        state,
        db: Arc::new(db),
        config_slot,
        connector_slot,
        _dir: dir,
    }
}

/// App with a ready database client.
pub async fn ready_app(db: FakeDb) -> TestApp {
    let app = pending_app(db);
    app.config_slot.provide(Arc::new(RuntimeConfig::new(
        "https://test.supabase.co",
        "anon",
        Environment::Development,
    )));
    app.connector_slot.provide(Arc::new(FakeConnector(app.db.clone())));
    let state = app.state.init_gate.start().unwrap().await.unwrap();
    assert!(state.is_ready());
    app
}
