use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::registration_models::{PendingRegistration, RegistrationRecord};

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Staging file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Staging file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Local holding area for registrations that could not reach the database.
#[async_trait]
pub trait StagingArea: Send + Sync {
    async fn append(&self, record: RegistrationRecord) -> Result<PendingRegistration, StagingError>;
    async fn list_pending(&self) -> Result<Vec<PendingRegistration>, StagingError>;
    async fn clear(&self) -> Result<usize, StagingError>;
}

/// Keeps pending registrations as a JSON array in a single file.
pub struct FileStaging {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStaging {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<PendingRegistration>, StagingError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, entries: &[PendingRegistration]) -> Result<(), StagingError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // write then rename so a crash never leaves half a file behind
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StagingArea for FileStaging {
    async fn append(&self, record: RegistrationRecord) -> Result<PendingRegistration, StagingError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        let pending = PendingRegistration::new(record);
        entries.push(pending.clone());
        self.write_all(&entries).await?;
        tracing::info!("Staged registration locally ({} pending)", entries.len());
        Ok(pending)
    }

    async fn list_pending(&self) -> Result<Vec<PendingRegistration>, StagingError> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }

    async fn clear(&self) -> Result<usize, StagingError> {
        let _guard = self.lock.lock().await;
        let cleared = self.read_all().await?.len();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!("Cleared {} staged registrations", cleared);
        Ok(cleared)
    }
}
