//! Beneficiary subscription journey: steps, activation, vendor callbacks, manual review and
//! phone validation.

pub mod memory;
pub mod messages;
pub mod phone;
mod remote;
mod review;
pub mod router;
pub mod service;
pub mod steps;
pub mod tasks;

#[cfg(test)]
mod tests;

pub use memory::{
    FakeIdentificationProvider, InMemoryAttemptCounter, InMemoryPictureStorage, LoggingNotifier,
    RecordingNotifier, RecordingSmsSender, RecordingTaskQueue,
};
pub use messages::{
    NotificationError, NotificationPublisher, NotificationTemplate, SubscriptionNotification,
};
pub use phone::{
    parse_phone_number, AttemptCounter, CounterError, ParsedPhoneNumber, PhoneFraudFailure,
    PhoneValidationError, SmsError, SmsSender,
};
pub use remote::IdentificationWebhook;
pub use router::subscription_router;
pub use service::{SubscriptionError, SubscriptionPorts, SubscriptionService, SubscriptionSettings};
pub use steps::{SubscriptionProgress, SubscriptionState, SubscriptionStep};
pub use tasks::{
    BackgroundTask, ChannelTaskQueue, PictureStorage, TaskError, TaskHandler, TaskQueue,
    TaskReceiver,
};
