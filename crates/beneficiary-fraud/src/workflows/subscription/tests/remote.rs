use super::common::*;

use crate::config::FeatureToggles;
use crate::workflows::fraud::{
    EligibilityType, FraudCheckStatus, FraudCheckType, FraudRepository, SaveBatch, UserId,
    UserRole,
};
use crate::workflows::identification::IdentificationError;
use crate::workflows::subscription::{
    BackgroundTask, FakeIdentificationProvider, IdentificationWebhook, NotificationTemplate,
    RecordingSmsSender, SubscriptionError,
};

fn webhook(identification_id: &str, status: &str) -> IdentificationWebhook {
    IdentificationWebhook {
        identification_id: identification_id.to_string(),
        status: status.to_string(),
    }
}

#[tokio::test]
async fn starting_a_session_stores_a_started_check() {
    let harness = harness();
    let user = candidate(1, 18);
    store_user(&harness, &user);

    let url = harness
        .service
        .start_identification_workflow(user.id, "https://app.example.org/done")
        .await
        .expect("session started");
    assert_eq!(url, "https://id.example.org/ident-1-1");

    let check = harness
        .service
        .fraud()
        .find_by_third_party_id(FraudCheckType::RemoteVendorVerification, "ident-1-1")
        .expect("repository available")
        .expect("check stored");
    assert_eq!(check.status, FraudCheckStatus::Started);
    assert_eq!(check.eligibility_type, Some(EligibilityType::Age18));
    assert!(harness.service.is_identification_restartable(&check));
}

#[tokio::test]
async fn session_needs_a_declared_identity() {
    let harness = harness();
    let mut user = candidate(2, 18);
    user.date_of_birth = None;
    store_user(&harness, &user);

    match harness
        .service
        .start_identification_workflow(user.id, "https://app.example.org/done")
        .await
    {
        Err(SubscriptionError::MissingIdentityData(_)) => {}
        other => panic!("expected missing identity error, got {other:?}"),
    }
}

#[tokio::test]
async fn unavailable_vendor_is_reported_as_such() {
    let harness = harness_with(
        FeatureToggles::default(),
        FakeIdentificationProvider::unavailable(),
        RecordingSmsSender::new(),
    );
    let user = candidate(3, 18);
    store_user(&harness, &user);

    match harness
        .service
        .start_identification_workflow(user.id, "https://app.example.org/done")
        .await
    {
        Err(SubscriptionError::Identification(IdentificationError::ServiceUnavailable)) => {}
        other => panic!("expected service unavailable, got {other:?}"),
    }
    assert!(harness
        .repository
        .fraud_checks_for_user(user.id)
        .expect("repository available")
        .is_empty());
}

#[tokio::test]
async fn processed_callback_activates_the_beneficiary() {
    let harness = harness();
    let user = with_validated_phone(candidate(4, 18));
    store_user(&harness, &user);
    let identification_id = processed_session(&harness, &user, user.date_of_birth, 1.0).await;

    harness
        .service
        .handle_identification_webhook(webhook(&identification_id, "processed"))
        .await
        .expect("callback handled");

    let check = harness
        .service
        .fraud()
        .find_by_third_party_id(FraudCheckType::RemoteVendorVerification, &identification_id)
        .expect("repository available")
        .expect("check stored");
    assert_eq!(check.status, FraudCheckStatus::Ok);
    assert!(!harness.service.is_identification_restartable(&check));

    let stored = load_user(&harness, user.id);
    assert!(stored.has_active_deposit(now()));
    assert!(stored.roles.contains(&UserRole::Beneficiary));
    assert!(stored.has_completed_id_check);
    assert_eq!(stored.id_piece_number.as_deref(), Some("DOC000004"));

    assert_eq!(
        harness.tasks.tasks(),
        vec![BackgroundTask::ArchiveIdPictures {
            identification_id: identification_id.clone()
        }]
    );
    assert!(harness
        .notifier
        .templates()
        .contains(&NotificationTemplate::BeneficiaryActivated));
}

#[tokio::test]
async fn repeated_processed_callback_keeps_the_ok_verdict() {
    let harness = harness();
    let user = with_validated_phone(candidate(5, 18));
    store_user(&harness, &user);
    let identification_id = processed_session(&harness, &user, user.date_of_birth, 1.0).await;

    for _ in 0..2 {
        harness
            .service
            .handle_identification_webhook(webhook(&identification_id, "processed"))
            .await
            .expect("callback handled");
    }

    let check = harness
        .service
        .fraud()
        .find_by_third_party_id(FraudCheckType::RemoteVendorVerification, &identification_id)
        .expect("repository available")
        .expect("check stored");
    assert_eq!(check.status, FraudCheckStatus::Ok);
    assert_eq!(harness.tasks.tasks().len(), 1);
}

#[tokio::test]
async fn refused_document_stops_the_journey() {
    let harness = harness();
    let user = with_validated_phone(candidate(6, 18));
    store_user(&harness, &user);
    let identification_id = processed_session(&harness, &user, user.date_of_birth, -1.0).await;

    harness
        .service
        .handle_identification_webhook(webhook(&identification_id, "processed"))
        .await
        .expect("callback handled");

    let check = harness
        .service
        .fraud()
        .latest_identity_check(user.id)
        .expect("repository available")
        .expect("check stored");
    assert_eq!(check.status, FraudCheckStatus::Ko);
    assert!(harness.tasks.tasks().is_empty());
    assert!(load_user(&harness, user.id).deposit.is_none());
    assert_eq!(
        harness.notifier.templates(),
        vec![
            NotificationTemplate::IdCheckInvalid,
            NotificationTemplate::JourneyCannotContinue,
        ]
    );
}

#[tokio::test]
async fn provider_eligibility_replaces_the_declared_one() {
    let harness = harness();
    let user = candidate(7, 18);
    store_user(&harness, &user);
    let identification_id =
        processed_session(&harness, &user, Some(born_years_ago(16)), 1.0).await;

    harness
        .service
        .handle_identification_webhook(webhook(&identification_id, "processed"))
        .await
        .expect("callback handled");

    let checks = harness
        .repository
        .fraud_checks_for_user(user.id)
        .expect("repository available");
    assert_eq!(checks.len(), 2);

    let deprecated = checks
        .iter()
        .find(|check| check.third_party_id == format!("deprecated-{identification_id}"))
        .expect("deprecated check kept");
    assert_eq!(deprecated.status, FraudCheckStatus::Canceled);
    assert_eq!(deprecated.eligibility_type, Some(EligibilityType::Age18));
    assert_eq!(
        deprecated.reason.as_deref(),
        Some("Eligibility type changed by the identity provider")
    );

    let replacement = checks
        .iter()
        .find(|check| check.third_party_id == identification_id)
        .expect("replacement check stored");
    assert_eq!(replacement.status, FraudCheckStatus::Ok);
    assert_eq!(replacement.eligibility_type, Some(EligibilityType::Underage));

    let stored = load_user(&harness, user.id);
    assert_eq!(stored.date_of_birth, Some(born_years_ago(16)));
    let deposit = stored.deposit.expect("underage deposit granted");
    assert_eq!(deposit.amount, 30);
    assert!(stored.roles.contains(&UserRole::UnderageBeneficiary));
}

#[tokio::test]
async fn processing_callback_marks_review_pending() {
    let harness = harness();
    let user = candidate(8, 18);
    store_user(&harness, &user);
    let identification_id = processed_session(&harness, &user, user.date_of_birth, 1.0).await;

    harness
        .service
        .handle_identification_webhook(webhook(&identification_id, "processing"))
        .await
        .expect("callback handled");

    assert!(load_user(&harness, user.id).has_completed_id_check);
    assert_eq!(
        harness.notifier.templates(),
        vec![NotificationTemplate::ReviewPending]
    );
    let check = harness
        .service
        .fraud()
        .latest_identity_check(user.id)
        .expect("repository available")
        .expect("check stored");
    assert_eq!(check.status, FraudCheckStatus::Started);
}

#[tokio::test]
async fn aborted_callback_cancels_the_check() {
    let harness = harness();
    let user = candidate(9, 18);
    store_user(&harness, &user);
    let identification_id = processed_session(&harness, &user, user.date_of_birth, 1.0).await;

    harness
        .service
        .handle_identification_webhook(webhook(&identification_id, "aborted"))
        .await
        .expect("callback handled");

    let check = harness
        .service
        .fraud()
        .latest_identity_check(user.id)
        .expect("repository available")
        .expect("check stored");
    assert_eq!(check.status, FraudCheckStatus::Canceled);
}

#[tokio::test]
async fn unknown_identification_is_rejected() {
    let harness = harness();

    match harness
        .service
        .handle_identification_webhook(webhook("missing", "processed"))
        .await
    {
        Err(SubscriptionError::UnknownIdentification(id)) if id == "missing" => {}
        other => panic!("expected unknown identification, got {other:?}"),
    }
}

#[tokio::test]
async fn archival_stores_both_faces_once() {
    let harness = harness();
    let user = candidate(10, 18);
    store_user(&harness, &user);
    let identification_id = processed_session(&harness, &user, user.date_of_birth, 1.0).await;

    let mut content = processed_content(&user, &identification_id, user.date_of_birth, 1.0);
    content.signed_image_front_url = Some("https://storage.example.org/front".to_string());
    content.signed_image_back_url = Some("https://storage.example.org/back".to_string());
    harness.provider.set_result(&identification_id, content);
    harness
        .provider
        .set_picture("https://storage.example.org/front", jpeg());
    harness
        .provider
        .set_picture("https://storage.example.org/back", jpeg());

    let stored = harness
        .service
        .archive_id_pictures(&identification_id)
        .await
        .expect("archival ran");
    assert!(stored);
    assert_eq!(
        harness.pictures.file_names(),
        vec![
            format!("10-{identification_id}-back.jpg"),
            format!("10-{identification_id}-front.jpg"),
        ]
    );

    let check = harness
        .service
        .fraud()
        .latest_identity_check(user.id)
        .expect("repository available")
        .expect("check stored");
    assert!(check.id_pictures_stored);

    assert!(harness
        .service
        .archive_id_pictures(&identification_id)
        .await
        .expect("archival ran again"));
    assert_eq!(harness.pictures.file_names().len(), 2);
}

#[tokio::test]
async fn archival_without_pictures_reports_nothing_stored() {
    let harness = harness();
    let user = candidate(11, 18);
    store_user(&harness, &user);
    let identification_id = processed_session(&harness, &user, user.date_of_birth, 1.0).await;

    let stored = harness
        .service
        .archive_id_pictures(&identification_id)
        .await
        .expect("archival ran");
    assert!(!stored);
    assert!(harness.pictures.file_names().is_empty());
}

#[tokio::test]
async fn ok_check_keeps_its_eligibility_when_the_provider_disagrees() {
    let harness = harness();
    let user = with_validated_phone(candidate(12, 18));
    store_user(&harness, &user);
    let identification_id = processed_session(&harness, &user, user.date_of_birth, 1.0).await;
    harness
        .service
        .handle_identification_webhook(webhook(&identification_id, "processed"))
        .await
        .expect("callback handled");

    let mut check = harness
        .service
        .fraud()
        .find_by_third_party_id(FraudCheckType::RemoteVendorVerification, &identification_id)
        .expect("repository available")
        .expect("check stored");
    assert_eq!(check.status, FraudCheckStatus::Ok);
    check.eligibility_type = Some(EligibilityType::Underage);
    harness
        .repository
        .save(SaveBatch::new().fraud_check(check))
        .expect("check saved");

    harness
        .service
        .handle_identification_webhook(webhook(&identification_id, "processed"))
        .await
        .expect("callback handled");

    let checks = harness
        .repository
        .fraud_checks_for_user(user.id)
        .expect("repository available");
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].third_party_id, identification_id);
    assert_eq!(checks[0].status, FraudCheckStatus::Ok);
    assert!(!checks
        .iter()
        .any(|check| check.third_party_id.starts_with("deprecated-")));
}

#[tokio::test]
async fn rerun_without_reference_data_accepts_the_corrected_result() {
    let harness = harness();
    store_user(&harness, &admin(100));
    let user = with_validated_phone(candidate(13, 18));
    store_user(&harness, &user);
    let identification_id = processed_session(&harness, &user, user.date_of_birth, -1.0).await;
    harness
        .service
        .handle_identification_webhook(webhook(&identification_id, "processed"))
        .await
        .expect("callback handled");
    harness.provider.set_relaxed_result(
        &identification_id,
        processed_content(&user, &identification_id, user.date_of_birth, 1.0),
    );

    harness
        .service
        .rerun_identification_without_reference_data(UserId(100), &identification_id)
        .await
        .expect("identification processed again");

    let check = harness
        .service
        .fraud()
        .find_by_third_party_id(FraudCheckType::RemoteVendorVerification, &identification_id)
        .expect("repository available")
        .expect("check stored");
    assert_eq!(check.status, FraudCheckStatus::Ok);
    let stored = load_user(&harness, user.id);
    assert!(stored.roles.contains(&UserRole::Beneficiary));
    assert!(stored.has_active_deposit(now()));
}

#[tokio::test]
async fn rerun_without_reference_data_is_reserved_to_admins() {
    let harness = harness();
    let user = with_validated_phone(candidate(14, 18));
    store_user(&harness, &user);
    let identification_id = processed_session(&harness, &user, user.date_of_birth, -1.0).await;
    harness.provider.set_relaxed_result(
        &identification_id,
        processed_content(&user, &identification_id, user.date_of_birth, 1.0),
    );

    match harness
        .service
        .rerun_identification_without_reference_data(user.id, &identification_id)
        .await
    {
        Err(SubscriptionError::ReviewerNotAdmin(UserId(14))) => {}
        other => panic!("expected reviewer not admin, got {other:?}"),
    }
    assert!(load_user(&harness, user.id).deposit.is_none());
}
