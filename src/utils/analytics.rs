use std::sync::Arc;

use rand::{distributions::Alphanumeric, Rng};
use serde_json::{json, Value};

use crate::api::db_client::{CALCULATOR_USAGE, PAGE_ANALYTICS};
use crate::utils::init_gate::InitGate;

pub const PAGE_VISIT: &str = "page_visit";
pub const CALCULATOR_USE: &str = "calculator_use";
pub const FORM_SUBMIT: &str = "form_submit";
pub const FORM_ERROR: &str = "form_error";

/// Fire-and-forget event sink. `track` never fails and never blocks on I/O.
pub trait AnalyticsSink: Send + Sync {
    fn track(&self, event: &str, properties: Value);
}

/// Logs every event and persists the ones that have a table.
pub struct DbAnalytics {
    init_gate: Arc<InitGate>,
}

impl DbAnalytics {
    pub fn new(init_gate: Arc<InitGate>) -> Self {
        Self { init_gate }
    }
}

/// Table and row for events that are stored, `None` for log-only ones.
pub fn event_row(event: &str, properties: &Value) -> Option<(&'static str, Value)> {
    match event {
        PAGE_VISIT => Some((
            PAGE_ANALYTICS,
            json!({
                "page_path": properties.get("page_path").cloned().unwrap_or_else(|| json!("/")),
                "referrer": properties.get("referrer").cloned().unwrap_or(Value::Null),
                "user_agent": properties.get("user_agent").cloned().unwrap_or(Value::Null),
                "session_id": properties
                    .get("session_id")
                    .cloned()
                    .unwrap_or_else(|| json!(generate_session_id())),
            }),
        )),
        CALCULATOR_USE => Some((
            CALCULATOR_USAGE,
            json!({
                "generation_input": properties.get("generation_input").cloned().unwrap_or(Value::Null),
                "calculated_kcu": properties.get("calculated_kcu").cloned().unwrap_or(Value::Null),
                "estimated_revenue": properties.get("estimated_revenue").cloned().unwrap_or(Value::Null),
            }),
        )),
        _ => None,
    }
}

impl AnalyticsSink for DbAnalytics {
    fn track(&self, event: &str, properties: Value) {
        tracing::info!(event = event, "analytics event: {}", properties);

        let Some((table, row)) = event_row(event, &properties) else {
            return;
        };
        let client = match self.init_gate.client() {
            Ok(client) => client,
            Err(_) => {
                tracing::debug!("Analytics event {} not stored: database client not ready", event);
                return;
            }
        };
        let event = event.to_string();
        tokio::spawn(async move {
            if let Err(e) = client.insert(table, vec![row]).await {
                tracing::warn!("Failed to store analytics event {}: {}", event, e);
            }
        });
    }
}

/// `session_<unix millis>_<9 random chars>`
pub fn generate_session_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("session_{}_{}", chrono::Utc::now().timestamp_millis(), suffix)
}
