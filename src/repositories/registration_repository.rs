use std::sync::Arc;

use serde::Serialize;

use crate::api::db_client::{Query, PRE_REGISTRATIONS};
use crate::error::RepositoryError;
use crate::models::registration_models::StoredRegistration;
use crate::utils::init_gate::InitGate;

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationPage {
    pub data: Vec<StoredRegistration>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseStatus {
    pub initialized: bool,
    pub gate_state: String,
    pub connected: bool,
    pub tables_exist: bool,
    pub record_count: u64,
    pub last_error: Option<String>,
}

/// Read side of `pre_registrations` for the admin pages. Writes go through
/// the submission guard.
pub struct RegistrationRepository {
    init_gate: Arc<InitGate>,
}

impl RegistrationRepository {
    pub fn new(init_gate: Arc<InitGate>) -> Self {
        Self { init_gate }
    }

    pub async fn list(&self, limit: usize, offset: usize) -> Result<RegistrationPage, RepositoryError> {
        let client = self.init_gate.require_client()?;
        let query = Query::new()
            .order("created_at", false)
            .limit(limit)
            .offset(offset);
        let rows = client.select(PRE_REGISTRATIONS, &query).await?;
        let total = client.count(PRE_REGISTRATIONS).await?;

        let mut data = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<StoredRegistration>(row) {
                Ok(registration) => data.push(registration),
                Err(e) => tracing::warn!("Skipping malformed registration row: {}", e),
            }
        }
        Ok(RegistrationPage {
            data,
            total,
            limit,
            offset,
        })
    }

    /// Cheap round trip against the registrations table.
    pub async fn test_connection(&self) -> Result<(), RepositoryError> {
        let client = self.init_gate.require_client()?;
        client
            .select(PRE_REGISTRATIONS, &Query::new().columns("id").limit(1))
            .await?;
        Ok(())
    }

    pub async fn status(&self) -> DatabaseStatus {
        let state = self.init_gate.state();
        let mut status = DatabaseStatus {
            initialized: state.is_ready(),
            gate_state: state.label().to_string(),
            ..Default::default()
        };

        if let Err(e) = self.test_connection().await {
            tracing::warn!("Connection test failed: {}", e);
            status.last_error = Some(e.to_string());
            return status;
        }
        status.connected = true;

        match self.init_gate.require_client() {
            Ok(client) => match client.count(PRE_REGISTRATIONS).await {
                Ok(count) => {
                    status.tables_exist = true;
                    status.record_count = count;
                }
                Err(e) => status.last_error = Some(e.to_string()),
            },
            Err(e) => status.last_error = Some(e.to_string()),
        }
        status
    }
}
