use std::sync::Arc;

use axum::response::Response;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::clock::FixedClock;
use crate::config::{FeatureToggles, PhoneValidationSettings};
use crate::workflows::fraud::{
    EvaluationConfig, FraudCheck, FraudCheckService, FraudRepository, IdentificationStatus,
    IdentityContent, InMemoryFraudRepository, PhoneValidationStatus, RemoteVerificationContent,
    SaveBatch, User, UserId, UserRole,
};
use crate::workflows::identification::DownloadedPicture;
use crate::workflows::subscription::{
    AttemptCounter, FakeIdentificationProvider, InMemoryAttemptCounter, InMemoryPictureStorage,
    RecordingNotifier, RecordingSmsSender, RecordingTaskQueue, SubscriptionPorts,
    SubscriptionService, SubscriptionSettings,
};

pub(super) type TestService = SubscriptionService<InMemoryFraudRepository, RecordingNotifier>;

pub(super) const BLACKLISTED_NUMBER: &str = "+33600000666";

pub(super) struct Harness {
    pub service: Arc<TestService>,
    pub repository: Arc<InMemoryFraudRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub provider: Arc<FakeIdentificationProvider>,
    pub tasks: Arc<RecordingTaskQueue>,
    pub pictures: Arc<InMemoryPictureStorage>,
    pub sms: Arc<RecordingSmsSender>,
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn now() -> NaiveDateTime {
    date(2024, 6, 1).and_hms_opt(12, 0, 0).expect("valid time")
}

pub(super) fn born_years_ago(age: i32) -> NaiveDate {
    date(2024 - age, 3, 15)
}

pub(super) fn harness_with(
    toggles: FeatureToggles,
    provider: FakeIdentificationProvider,
    sms: RecordingSmsSender,
) -> Harness {
    build_harness(toggles, provider, sms, Arc::new(InMemoryAttemptCounter::new()))
}

pub(super) fn harness_with_counter(counters: Arc<dyn AttemptCounter>) -> Harness {
    build_harness(
        FeatureToggles::default(),
        FakeIdentificationProvider::new(),
        RecordingSmsSender::new(),
        counters,
    )
}

fn build_harness(
    toggles: FeatureToggles,
    provider: FakeIdentificationProvider,
    sms: RecordingSmsSender,
    counters: Arc<dyn AttemptCounter>,
) -> Harness {
    let repository = Arc::new(InMemoryFraudRepository::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let provider = Arc::new(provider);
    let tasks = Arc::new(RecordingTaskQueue::new());
    let pictures = Arc::new(InMemoryPictureStorage::new());
    let sms = Arc::new(sms);

    let fraud = FraudCheckService::new(
        repository.clone(),
        EvaluationConfig::default(),
        Arc::new(toggles),
        Arc::new(FixedClock(now())),
    );
    let ports = SubscriptionPorts {
        identification: provider.clone(),
        tasks: tasks.clone(),
        pictures: pictures.clone(),
        sms: sms.clone(),
        counters,
    };
    let settings = SubscriptionSettings {
        deposits: Default::default(),
        phone_validation: PhoneValidationSettings {
            blacklisted_numbers: vec![BLACKLISTED_NUMBER.to_string()],
            ..PhoneValidationSettings::default()
        },
    };

    Harness {
        service: Arc::new(SubscriptionService::new(
            fraud,
            notifier.clone(),
            ports,
            settings,
        )),
        repository,
        notifier,
        provider,
        tasks,
        pictures,
        sms,
    }
}

pub(super) fn harness_with_toggles(toggles: FeatureToggles) -> Harness {
    harness_with(
        toggles,
        FakeIdentificationProvider::new(),
        RecordingSmsSender::new(),
    )
}

pub(super) fn harness() -> Harness {
    harness_with_toggles(FeatureToggles::default())
}

/// Email validated, phone not validated yet.
pub(super) fn candidate(id: u64, age: i32) -> User {
    let mut user = User::new(UserId(id), format!("user{id}@example.org"));
    user.first_name = Some(format!("First{id}"));
    user.last_name = Some(format!("Last{id}"));
    user.date_of_birth = Some(born_years_ago(age));
    user.phone_number = Some(format!("+336000000{id:02}"));
    user.is_email_validated = true;
    user
}

pub(super) fn admin(id: u64) -> User {
    let mut user = User::new(UserId(id), format!("admin{id}@example.org"));
    user.roles.insert(UserRole::Admin);
    user
}

pub(super) fn with_validated_phone(mut user: User) -> User {
    user.phone_validation_status = PhoneValidationStatus::Validated;
    user
}

pub(super) fn store_user(harness: &Harness, user: &User) {
    harness
        .repository
        .save(SaveBatch::new().user(user.clone()))
        .expect("user saved");
}

pub(super) fn load_user(harness: &Harness, user_id: UserId) -> User {
    harness
        .repository
        .user(user_id)
        .expect("repository available")
        .expect("user exists")
}

pub(super) fn processed_content(
    user: &User,
    identification_id: &str,
    birth_date: Option<NaiveDate>,
    score: f64,
) -> RemoteVerificationContent {
    RemoteVerificationContent {
        status: Some(IdentificationStatus::Processed),
        birth_date,
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        document_type: Some("CI".to_string()),
        id_document_number: Some(format!("DOC{:06}", user.id.0)),
        score: Some(score),
        comment: None,
        expiry_date_score: Some(1.0),
        supported: Some(1.0),
        identification_id: Some(identification_id.to_string()),
        identification_url: Some(format!("https://id.example.org/{identification_id}")),
        registration_datetime: Some(now()),
        signed_image_front_url: None,
        signed_image_back_url: None,
    }
}

/// Stores an evaluated remote identity check for `user`.
pub(super) fn evaluated_identity_check(harness: &Harness, user: &User, score: f64) -> FraudCheck {
    let identification_id = format!("ident-{}", user.id);
    let content = processed_content(user, &identification_id, user.date_of_birth, score);
    let fraud = harness.service.fraud();
    let mut check = fraud
        .start(
            user,
            &identification_id,
            IdentityContent::RemoteVendorVerification(content),
        )
        .expect("check started");
    fraud
        .on_identity_fraud_check_result(user, &mut check)
        .expect("check evaluated");
    check
}

/// Opens a vendor session for `user` and scripts its PROCESSED result.
pub(super) async fn processed_session(
    harness: &Harness,
    user: &User,
    birth_date: Option<NaiveDate>,
    score: f64,
) -> String {
    harness
        .service
        .start_identification_workflow(user.id, "https://app.example.org/done")
        .await
        .expect("session started");
    let check = harness
        .service
        .fraud()
        .latest_identity_check(user.id)
        .expect("repository available")
        .expect("check stored");
    let identification_id = check.third_party_id;
    harness.provider.set_result(
        &identification_id,
        processed_content(user, &identification_id, birth_date, score),
    );
    identification_id
}

pub(super) fn jpeg() -> DownloadedPicture {
    DownloadedPicture {
        content_type: Some("image/jpeg".to_string()),
        bytes: vec![0xff, 0xd8, 0xff],
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
