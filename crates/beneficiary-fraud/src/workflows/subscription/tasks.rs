//! Fire-and-forget background work triggered by the subscription journey.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::workflows::identification::DownloadedPicture;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum BackgroundTask {
    ArchiveIdPictures { identification_id: String },
}

impl BackgroundTask {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ArchiveIdPictures { .. } => "archive_id_pictures",
        }
    }
}

/// Delivery is at least once, so handlers must tolerate repeats.
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task: BackgroundTask) -> Result<(), TaskError>;
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: BackgroundTask) -> Result<(), TaskError>;
}

/// Destination of archived identity document pictures.
pub trait PictureStorage: Send + Sync {
    fn store(&self, file_name: &str, picture: &DownloadedPicture) -> Result<(), TaskError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task queue is closed")]
    QueueClosed,
    #[error("{task} failed: {message}")]
    Failed { task: &'static str, message: String },
}

/// In-process queue backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTaskQueue {
    sender: mpsc::UnboundedSender<BackgroundTask>,
}

/// Receiving half of a [`ChannelTaskQueue`], consumed by [`TaskReceiver::spawn`].
#[derive(Debug)]
pub struct TaskReceiver {
    receiver: mpsc::UnboundedReceiver<BackgroundTask>,
}

impl ChannelTaskQueue {
    pub fn new() -> (Self, TaskReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, TaskReceiver { receiver })
    }
}

impl TaskQueue for ChannelTaskQueue {
    fn enqueue(&self, task: BackgroundTask) -> Result<(), TaskError> {
        let name = task.name();
        self.sender.send(task).map_err(|_| TaskError::QueueClosed)?;
        info!(task = name, "background task enqueued");
        Ok(())
    }
}

impl TaskReceiver {
    /// Runs tasks one at a time until every queue handle is dropped.
    ///
    /// Handler failures are logged and never reach the code that enqueued the task.
    pub fn spawn<H>(mut self, handler: Arc<H>) -> JoinHandle<()>
    where
        H: TaskHandler + ?Sized + 'static,
    {
        tokio::spawn(async move {
            while let Some(task) = self.receiver.recv().await {
                let name = task.name();
                if let Err(err) = handler.handle(task).await {
                    error!(task = name, error = %err, "background task failed");
                }
            }
        })
    }
}
