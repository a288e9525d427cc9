use beneficiary_fraud::error::AppError;
use beneficiary_fraud::workflows::fraud::{
    FraudRepository, InMemoryFraudRepository, SaveBatch, User,
};
use beneficiary_fraud::workflows::identification::DownloadedPicture;
use beneficiary_fraud::workflows::subscription::{PictureStorage, SmsError, SmsSender, TaskError};
use metrics_exporter_prometheus::PrometheusHandle;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// SMS transport used outside production: the message only reaches the logs.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingSmsSender;

impl SmsSender for LoggingSmsSender {
    fn send(&self, phone_number: &str, message: &str) -> Result<(), SmsError> {
        info!(%phone_number, %message, "sms handed to logging transport");
        Ok(())
    }
}

/// Writes archived document pictures below a local directory.
#[derive(Debug, Clone)]
pub(crate) struct FileSystemPictureStorage {
    root: PathBuf,
}

impl FileSystemPictureStorage {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PictureStorage for FileSystemPictureStorage {
    fn store(&self, file_name: &str, picture: &DownloadedPicture) -> Result<(), TaskError> {
        let failed = |err: io::Error| TaskError::Failed {
            task: "archive_id_pictures",
            message: format!("{}: {err}", self.root.join(file_name).display()),
        };

        std::fs::create_dir_all(&self.root).map_err(failed)?;
        std::fs::write(self.root.join(file_name), &picture.bytes).map_err(failed)?;
        info!(file_name, size = picture.bytes.len(), "identity picture archived");
        Ok(())
    }
}

/// Loads a JSON array of users into the in-memory store.
pub(crate) fn seed_users(
    repository: &InMemoryFraudRepository,
    path: &Path,
) -> Result<usize, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let users: Vec<User> = serde_json::from_str(&raw)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

    let count = users.len();
    let batch = users.into_iter().fold(SaveBatch::new(), SaveBatch::user);
    repository
        .save(batch)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    Ok(count)
}
