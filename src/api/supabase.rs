use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use serde::Deserialize;
use serde_json::Value;

use crate::api::db_client::{ChangeCallback, ClientHandle, Connector, DbClient, Query, Subscription};
use crate::config::RuntimeConfig;
use crate::error::DbError;

// how often the change feed asks for rows newer than the last one seen
const REALTIME_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

/// PostgREST client for a Supabase project, authenticated with the anon key.
#[derive(Clone)]
pub struct SupabaseClient {
    client: reqwest::Client,
    rest_url: String,
}

impl SupabaseClient {
    pub fn new(endpoint_url: &str, anon_key: &str, timeout: Duration) -> Result<Self, DbError> {
        let parsed = url::Url::parse(endpoint_url)
            .map_err(|e| DbError::InvalidConfig(format!("endpoint url '{}': {}", endpoint_url, e)))?;
        if parsed.scheme() != "https" && parsed.scheme() != "http" {
            return Err(DbError::InvalidConfig(format!(
                "endpoint url must be http(s), got '{}'",
                parsed.scheme()
            )));
        }
        if anon_key.trim().is_empty() {
            return Err(DbError::InvalidConfig("anon key is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(anon_key)
            .map_err(|e| DbError::InvalidConfig(format!("anon key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", anon_key))
            .map_err(|e| DbError::InvalidConfig(format!("anon key: {}", e)))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| DbError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", endpoint_url.trim_end_matches('/')),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    async fn fetch(&self, table: &str, query: &Query) -> Result<Vec<Value>, DbError> {
        let response = self
            .client
            .get(self.table_url(table))
            .query(&query.to_params())
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json::<Vec<Value>>().await?)
    }
}

/// Turns a non-2xx response into `DbError::Remote`, keeping PostgREST's
/// error fields when the body has them.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DbError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!("Supabase responded {}: {}", status, body);
    match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(err) => Err(DbError::Remote {
            code: err.code.unwrap_or_else(|| status.as_u16().to_string()),
            message: err
                .message
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string()),
            details: err.details,
            hint: err.hint,
        }),
        Err(_) => Err(DbError::Remote {
            code: status.as_u16().to_string(),
            message: if body.is_empty() {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            } else {
                body
            },
            details: None,
            hint: None,
        }),
    }
}

/// Parses the total from a `Content-Range` header like `0-24/3573` or `*/0`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/').and_then(|(_, total)| total.parse().ok())
}

#[async_trait]
impl DbClient for SupabaseClient {
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, DbError> {
        let response = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json::<Vec<Value>>().await?)
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, DbError> {
        self.fetch(table, query).await
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> Result<(), DbError> {
        // select= has no meaning on PATCH with return=minimal
        let params: Vec<(String, String)> = query
            .to_params()
            .into_iter()
            .filter(|(k, _)| k != "select")
            .collect();
        let response = self
            .client
            .patch(self.table_url(table))
            .header("Prefer", "return=minimal")
            .query(&params)
            .json(&patch)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<u64, DbError> {
        let response = self
            .client
            .head(self.table_url(table))
            .header("Prefer", "count=exact")
            .query(&[("select", "*")])
            .send()
            .await?;
        let response = check_status(response).await?;
        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| DbError::Decode("missing or malformed Content-Range header".to_string()))
    }

    fn subscribe(&self, table: &str, query: Query, callback: ChangeCallback) -> Result<Subscription, DbError> {
        tracing::debug!("Subscribing to changes on {}", table);
        let client = self.clone();
        let table = table.to_string();
        let task = tokio::spawn(async move {
            let mut since = chrono::Utc::now().to_rfc3339();
            let mut ticker = tokio::time::interval(REALTIME_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let changes = query
                    .clone()
                    .gt("updated_at", since.clone())
                    .order("updated_at", true);
                match client.fetch(&table, &changes).await {
                    Ok(rows) => {
                        for row in rows {
                            if let Some(ts) = row.get("updated_at").and_then(Value::as_str) {
                                since = ts.to_string();
                            }
                            callback(row);
                        }
                    }
                    Err(e) => tracing::warn!("Change feed for {} failed: {}", table, e),
                }
            }
        });
        Ok(Subscription::new(task))
    }
}

/// Connector for the production client.
#[derive(Debug, Default, Clone, Copy)]
pub struct SupabaseConnector;

impl Connector for SupabaseConnector {
    fn create_client(&self, config: &RuntimeConfig) -> Result<ClientHandle, DbError> {
        let client = SupabaseClient::new(&config.endpoint_url, &config.credential, config.timeout)?;
        Ok(Arc::new(client))
    }
}
