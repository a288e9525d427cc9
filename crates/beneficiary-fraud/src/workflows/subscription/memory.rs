//! In-process adapters for the subscription ports, used by the demo binary and the tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::info;

use super::messages::{
    NotificationError, NotificationPublisher, NotificationTemplate, SubscriptionNotification,
};
use super::phone::{AttemptCounter, CounterError, SmsError, SmsSender};
use super::tasks::{BackgroundTask, PictureStorage, TaskError, TaskQueue};
use crate::workflows::fraud::{IdentificationStatus, RemoteVerificationContent};
use crate::workflows::identification::{
    DownloadedPicture, IdentificationError, IdentificationProvider, IdentificationRequest,
    ReferenceDataPolicy,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps every published notification.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SubscriptionNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SubscriptionNotification> {
        lock(&self.sent).clone()
    }

    pub fn templates(&self) -> Vec<NotificationTemplate> {
        lock(&self.sent)
            .iter()
            .map(|notification| notification.template)
            .collect()
    }
}

impl NotificationPublisher for RecordingNotifier {
    fn publish(&self, notification: SubscriptionNotification) -> Result<(), NotificationError> {
        lock(&self.sent).push(notification);
        Ok(())
    }
}

/// Emits notifications as log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl NotificationPublisher for LoggingNotifier {
    fn publish(&self, notification: SubscriptionNotification) -> Result<(), NotificationError> {
        info!(
            user_id = %notification.user_id,
            template = notification.template.label(),
            details = ?notification.details,
            "notification sent"
        );
        Ok(())
    }
}

/// Queue that only remembers what was enqueued.
#[derive(Debug, Default)]
pub struct RecordingTaskQueue {
    tasks: Mutex<Vec<BackgroundTask>>,
}

impl RecordingTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<BackgroundTask> {
        lock(&self.tasks).clone()
    }
}

impl TaskQueue for RecordingTaskQueue {
    fn enqueue(&self, task: BackgroundTask) -> Result<(), TaskError> {
        lock(&self.tasks).push(task);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    expires_at: Instant,
}

/// Counters expiring `ttl` after their first increment.
#[derive(Debug, Default)]
pub struct InMemoryAttemptCounter {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryAttemptCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttemptCounter for InMemoryAttemptCounter {
    fn count(&self, key: &str) -> Result<u32, CounterError> {
        let now = Instant::now();
        Ok(lock(&self.windows)
            .get(key)
            .filter(|window| window.expires_at > now)
            .map(|window| window.count)
            .unwrap_or(0))
    }

    fn increment(&self, key: &str, ttl: Duration) -> Result<u32, CounterError> {
        let now = Instant::now();
        let mut windows = lock(&self.windows);
        let window = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            expires_at: now + ttl,
        });
        if window.expires_at <= now {
            *window = Window {
                count: 0,
                expires_at: now + ttl,
            };
        }
        window.count += 1;
        Ok(window.count)
    }
}

/// SMS sender keeping `(recipient, message)` pairs. A failing instance refuses every send.
#[derive(Debug, Default)]
pub struct RecordingSmsSender {
    sent: Mutex<Vec<(String, String)>>,
    failing: bool,
}

impl RecordingSmsSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            failing: true,
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        lock(&self.sent).clone()
    }
}

impl SmsSender for RecordingSmsSender {
    fn send(&self, phone_number: &str, message: &str) -> Result<(), SmsError> {
        if self.failing {
            return Err(SmsError("provider rejected the message".to_string()));
        }
        lock(&self.sent).push((phone_number.to_string(), message.to_string()));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPictureStorage {
    pictures: Mutex<BTreeMap<String, DownloadedPicture>>,
}

impl InMemoryPictureStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_names(&self) -> Vec<String> {
        lock(&self.pictures).keys().cloned().collect()
    }
}

impl PictureStorage for InMemoryPictureStorage {
    fn store(&self, file_name: &str, picture: &DownloadedPicture) -> Result<(), TaskError> {
        lock(&self.pictures).insert(file_name.to_string(), picture.clone());
        Ok(())
    }
}

/// Scripted identification vendor.
///
/// Sessions opened through it start INITIATED; tests and the demo then script the
/// result returned by `fetch_content` with [`FakeIdentificationProvider::set_result`].
/// A result registered with [`FakeIdentificationProvider::set_relaxed_result`] is what the
/// vendor answers once invalid reference data is discarded.
#[derive(Debug, Default)]
pub struct FakeIdentificationProvider {
    results: Mutex<BTreeMap<String, RemoteVerificationContent>>,
    relaxed_results: Mutex<BTreeMap<String, RemoteVerificationContent>>,
    pictures: Mutex<BTreeMap<String, DownloadedPicture>>,
    sequence: AtomicU64,
    unavailable: bool,
}

impl FakeIdentificationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider answering every call with `ServiceUnavailable`.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn set_result(&self, identification_id: &str, content: RemoteVerificationContent) {
        lock(&self.results).insert(identification_id.to_string(), content);
    }

    pub fn set_relaxed_result(&self, identification_id: &str, content: RemoteVerificationContent) {
        lock(&self.relaxed_results).insert(identification_id.to_string(), content);
    }

    pub fn set_picture(&self, url: &str, picture: DownloadedPicture) {
        lock(&self.pictures).insert(url.to_string(), picture);
    }

    fn ensure_available(&self) -> Result<(), IdentificationError> {
        if self.unavailable {
            return Err(IdentificationError::ServiceUnavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl IdentificationProvider for FakeIdentificationProvider {
    async fn start_identification(
        &self,
        request: &IdentificationRequest,
    ) -> Result<RemoteVerificationContent, IdentificationError> {
        self.ensure_available()?;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let identification_id = format!("ident-{}-{sequence}", request.user_id);
        let content = RemoteVerificationContent {
            status: Some(IdentificationStatus::Initiated),
            identification_url: Some(format!("https://id.example.org/{identification_id}")),
            identification_id: Some(identification_id.clone()),
            ..RemoteVerificationContent::default()
        };
        self.set_result(&identification_id, content.clone());
        Ok(content)
    }

    async fn fetch_content(
        &self,
        identification_id: &str,
        policy: ReferenceDataPolicy,
    ) -> Result<RemoteVerificationContent, IdentificationError> {
        self.ensure_available()?;
        if policy == ReferenceDataPolicy::DiscardInvalidReferenceData {
            if let Some(content) = lock(&self.relaxed_results).get(identification_id) {
                return Ok(content.clone());
            }
        }
        lock(&self.results)
            .get(identification_id)
            .cloned()
            .ok_or(IdentificationError::ServiceError { status: 404 })
    }

    async fn download_picture(
        &self,
        url: &str,
    ) -> Result<Option<DownloadedPicture>, IdentificationError> {
        self.ensure_available()?;
        Ok(lock(&self.pictures).get(url).cloned())
    }
}
