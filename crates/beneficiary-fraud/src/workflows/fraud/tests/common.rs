use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use crate::clock::FixedClock;
use crate::config::FeatureToggles;
use crate::workflows::fraud::content::{
    DigitalIdentityContent, DocumentFederationContent, DocumentReviewContent,
    IdentificationStatus, IdentityContent, RemoteVerificationContent,
};
use crate::workflows::fraud::domain::{
    EligibilityType, FraudCheck, FraudCheckStatus, PhoneValidationStatus, User, UserId, UserRole,
};
use crate::workflows::fraud::repository::{FraudRepository, SaveBatch};
use crate::workflows::fraud::{EvaluationConfig, FraudCheckService, InMemoryFraudRepository};

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn now() -> NaiveDateTime {
    date(2024, 6, 1).and_hms_opt(12, 0, 0).expect("valid time")
}

/// Birth date giving exactly `age` years at [`now`].
pub(super) fn born_years_ago(age: i32) -> NaiveDate {
    date(2024 - age, 3, 15)
}

pub(super) fn user(id: u64, birth_date: NaiveDate) -> User {
    let mut user = User::new(UserId(id), format!("user{id}@example.org"));
    user.first_name = Some(format!("First{id}"));
    user.last_name = Some(format!("Last{id}"));
    user.date_of_birth = Some(birth_date);
    user.phone_number = Some(format!("+336000000{id:02}"));
    user.is_email_validated = true;
    user
}

pub(super) fn beneficiary(id: u64, first: &str, last: &str, birth_date: NaiveDate) -> User {
    let mut user = user(id, birth_date);
    user.first_name = Some(first.to_string());
    user.last_name = Some(last.to_string());
    user.phone_validation_status = PhoneValidationStatus::Validated;
    user.roles.insert(UserRole::Beneficiary);
    user
}

pub(super) fn store_user(repository: &InMemoryFraudRepository, user: &User) {
    repository
        .save(SaveBatch::new().user(user.clone()))
        .expect("user saved");
}

pub(super) fn build_service_with(
    toggles: FeatureToggles,
) -> (
    FraudCheckService<InMemoryFraudRepository>,
    Arc<InMemoryFraudRepository>,
) {
    let repository = Arc::new(InMemoryFraudRepository::new());
    let service = FraudCheckService::new(
        repository.clone(),
        EvaluationConfig::default(),
        Arc::new(toggles),
        Arc::new(FixedClock(now())),
    );
    (service, repository)
}

pub(super) fn build_service() -> (
    FraudCheckService<InMemoryFraudRepository>,
    Arc<InMemoryFraudRepository>,
) {
    build_service_with(FeatureToggles::default())
}

pub(super) fn remote_content(user: &User, score: f64) -> RemoteVerificationContent {
    RemoteVerificationContent {
        status: Some(IdentificationStatus::Processed),
        birth_date: user.date_of_birth,
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        document_type: Some("CI".to_string()),
        id_document_number: Some(format!("DOC{:06}", user.id.0)),
        score: Some(score),
        comment: None,
        expiry_date_score: Some(1.0),
        supported: Some(1.0),
        identification_id: Some(format!("ident-{}", user.id)),
        identification_url: Some(format!("https://id.example.org/{}", user.id)),
        registration_datetime: Some(now()),
        signed_image_front_url: None,
        signed_image_back_url: None,
    }
}

pub(super) fn digital_identity_content(user: &User, ine_hash: &str) -> DigitalIdentityContent {
    DigitalIdentityContent {
        federation_id: format!("edu-{}", user.id),
        first_name: user.first_name.clone().unwrap_or_default(),
        last_name: user.last_name.clone().unwrap_or_default(),
        birth_date: user.date_of_birth.expect("birth date"),
        ine_hash: ine_hash.to_string(),
        registration_datetime: now(),
    }
}

pub(super) fn document_review_content(user: &User, application_id: u64) -> DocumentReviewContent {
    DocumentReviewContent {
        application_id,
        first_name: user.first_name.clone().unwrap_or_default(),
        last_name: user.last_name.clone().unwrap_or_default(),
        birth_date: user.date_of_birth,
        email: user.email.clone(),
        phone: user.phone_number.clone(),
        postal_code: Some("75011".to_string()),
        id_piece_number: Some("123456789012".to_string()),
        registration_datetime: now(),
    }
}

pub(super) fn document_federation_content(
    user: &User,
    id_piece_number: Option<&str>,
) -> DocumentFederationContent {
    DocumentFederationContent {
        application_id: format!("jouve-{}", user.id),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        birth_date: user.date_of_birth,
        id_piece_number: id_piece_number.map(str::to_string),
        registration_datetime: Some(now()),
    }
}

pub(super) fn started_remote_check(
    service: &FraudCheckService<InMemoryFraudRepository>,
    user: &User,
    score: f64,
) -> FraudCheck {
    let content = IdentityContent::RemoteVendorVerification(remote_content(user, score));
    service
        .start(user, &format!("ident-{}", user.id), content)
        .expect("check started")
}

pub(super) fn assert_status(check: &FraudCheck, status: FraudCheckStatus) {
    assert_eq!(
        check.status, status,
        "unexpected status for check {} ({:?})",
        check.id, check.reason
    );
}

pub(super) fn age18() -> Option<EligibilityType> {
    Some(EligibilityType::Age18)
}
