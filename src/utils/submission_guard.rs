use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::db_client::PRE_REGISTRATIONS;
use crate::error::DbError;
use crate::models::registration_models::{Outcome, RawRegistration, RegistrationRecord, StoredRegistration};
use crate::utils::init_gate::InitGate;

/// The insert went through but its stored row could not be read back.
pub const DECODE_ERROR: &str = "DECODE_ERROR";
/// The insert went through but no stored row came back.
pub const EMPTY_RESPONSE: &str = "EMPTY_RESPONSE";

/// Lets at most one registration submission run at a time.
pub struct SubmissionGuard {
    in_flight: AtomicBool,
    init_gate: Arc<InitGate>,
}

/// Clears the in-flight flag when dropped, including during unwinding.
struct GateRelease<'a>(&'a AtomicBool);

impl Drop for GateRelease<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SubmissionGuard {
    pub fn new(init_gate: Arc<InitGate>) -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            init_gate,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn submit(&self, raw: &RawRegistration) -> Outcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Registration submission already in progress, ignoring");
            return Outcome::AlreadyInProgress;
        }
        let _release = GateRelease(&self.in_flight);

        let record = match RegistrationRecord::parse(raw) {
            Ok(record) => record,
            Err(messages) => {
                tracing::info!("Registration rejected by validation: {:?}", messages);
                return Outcome::ValidationFailed { messages };
            }
        };

        let client = match self.init_gate.client() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Registration submitted before database client was ready: {}", e);
                return Outcome::ClientNotReady;
            }
        };

        tracing::debug!("Saving pre-registration for {}", record.organization_name);
        match client.insert(PRE_REGISTRATIONS, vec![record.to_row()]).await {
            Ok(rows) => match rows.into_iter().next() {
                Some(row) => match serde_json::from_value::<StoredRegistration>(row) {
                    Ok(stored_record) => {
                        tracing::info!("Pre-registration saved for {}", stored_record.company_name);
                        Outcome::Success { stored_record }
                    }
                    Err(e) => {
                        tracing::error!("Stored registration had unexpected shape: {}", e);
                        Outcome::RemoteError {
                            code: DECODE_ERROR.to_string(),
                            message: e.to_string(),
                        }
                    }
                },
                None => {
                    tracing::error!("Insert returned no rows for pre-registration");
                    Outcome::RemoteError {
                        code: EMPTY_RESPONSE.to_string(),
                        message: "Database returned no stored record".to_string(),
                    }
                }
            },
            Err(DbError::Transport(message)) => {
                tracing::error!("Transport failure saving pre-registration: {}", message);
                Outcome::TransportError { message }
            }
            Err(e) => {
                tracing::error!("Database rejected pre-registration: {}", e);
                let code = e.code().to_string();
                let message = match e {
                    DbError::Remote { message, .. } => message,
                    other => other.to_string(),
                };
                Outcome::RemoteError { code, message }
            }
        }
    }
}
