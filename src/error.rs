use thiserror::Error;

/// Failures reported by the hosted database client.
///
/// `Remote` is a structured rejection from the service (constraint
/// violation, permission denial, unknown table). `Transport` covers
/// everything that prevented a response from arriving: unreachable host,
/// connection reset, timeout.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("{message} (code {code})")]
    Remote {
        code: String,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Failed to decode response: {0}")]
    Decode(String),
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl DbError {
    pub fn code(&self) -> &str {
        match self {
            DbError::Remote { code, .. } => code,
            DbError::Transport(_) => "CONNECTION_ERROR",
            DbError::Decode(_) => "DECODE_ERROR",
            DbError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, DbError::Transport(_))
    }
}

impl From<reqwest::Error> for DbError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DbError::Transport(format!("request timed out: {}", e))
        } else if e.is_decode() {
            DbError::Decode(e.to_string())
        } else if e.is_builder() {
            DbError::InvalidConfig(e.to_string())
        } else {
            // connect, request, body and redirect failures all mean the
            // service never gave us a usable answer
            DbError::Transport(e.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("Database client not initialized")]
    NotInitialized,
    #[error("Database client initialization failed after {attempts} attempts")]
    InitializationFailed { attempts: u32 },
}

/// Errors from repositories that need a ready client and then talk to it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error(transparent)]
    Init(#[from] InitError),
    #[error(transparent)]
    Db(#[from] DbError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}
