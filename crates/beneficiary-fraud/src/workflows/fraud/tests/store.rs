use super::common::*;
use crate::config::FeatureToggles;
use crate::workflows::fraud::content::{
    IdentityContent, PhoneFraudSource, PhoneValidationContent, ProfilingContent, RiskRating,
};
use crate::workflows::fraud::domain::{
    EligibilityType, FraudCheckStatus, FraudCheckType, FraudItem, FraudReasonCode,
};
use crate::workflows::fraud::repository::FraudRepository;
use crate::workflows::fraud::FraudCheckError;

#[test]
fn starting_the_same_application_twice_is_rejected() {
    let (service, _) = build_service();
    let applicant = user(1, born_years_ago(18));

    let check = started_remote_check(&service, &applicant, 1.0);
    assert_status(&check, FraudCheckStatus::Pending);
    assert_eq!(check.eligibility_type, age18());

    let content = IdentityContent::RemoteVendorVerification(remote_content(&applicant, 1.0));
    match service.start(&applicant, "ident-1", content) {
        Err(FraudCheckError::ApplicationAlreadyStarted { third_party_id }) => {
            assert_eq!(third_party_id, "ident-1");
        }
        other => panic!("expected already started error, got {other:?}"),
    }
}

#[test]
fn start_session_opens_a_started_check() {
    let (service, repository) = build_service();
    let applicant = user(2, born_years_ago(16));
    let content = IdentityContent::RemoteVendorVerification(remote_content(&applicant, 1.0));

    let check = service
        .start_session(&applicant, "session-2", content)
        .expect("session started");
    assert_status(&check, FraudCheckStatus::Started);
    assert_eq!(check.eligibility_type, Some(EligibilityType::Underage));

    let stored = repository
        .fraud_check(check.id)
        .expect("lookup")
        .expect("stored check");
    assert_eq!(stored, check);
}

#[test]
fn ok_check_is_never_downgraded() {
    let (service, repository) = build_service();
    let applicant = user(3, born_years_ago(18));
    store_user(&repository, &applicant);

    let mut check = started_remote_check(&service, &applicant, 1.0);
    service
        .on_identity_fraud_check_result(&applicant, &mut check)
        .expect("evaluated");
    assert_status(&check, FraudCheckStatus::Ok);

    let failing = [FraudItem::ko("forged", FraudReasonCode::IdCheckInvalid)];
    match service.validate_frauds(&failing, &mut check) {
        Err(FraudCheckError::BeneficiaryFraudResultCannotBeDowngraded(id)) => {
            assert_eq!(id, check.id);
        }
        other => panic!("expected downgrade error, got {other:?}"),
    }

    let stored = repository
        .fraud_check(check.id)
        .expect("lookup")
        .expect("stored check");
    assert_status(&stored, FraudCheckStatus::Ok);
}

#[test]
fn mark_failed_creates_a_ko_check_with_reasons() {
    let (service, _) = build_service();
    let applicant = user(4, born_years_ago(18));
    let content = IdentityContent::DocumentFederation(document_federation_content(
        &applicant,
        Some("@@"),
    ));
    let reasons = [
        FraudItem::suspicious("invalid number", FraudReasonCode::InvalidIdPieceNumber),
        FraudItem::ok("ignored"),
    ];

    let check = service
        .mark_failed(&applicant, "jouve-4", content, &reasons)
        .expect("marked failed");
    assert_status(&check, FraudCheckStatus::Ko);
    assert_eq!(check.reason.as_deref(), Some("invalid number"));
    assert_eq!(check.reason_codes, vec![FraudReasonCode::InvalidIdPieceNumber]);
}

#[test]
fn mark_failed_refuses_to_downgrade_an_ok_check() {
    let (service, repository) = build_service();
    let applicant = user(5, born_years_ago(18));
    store_user(&repository, &applicant);
    let mut check = started_remote_check(&service, &applicant, 1.0);
    service
        .on_identity_fraud_check_result(&applicant, &mut check)
        .expect("evaluated");

    let content = IdentityContent::RemoteVendorVerification(remote_content(&applicant, -1.0));
    match service.mark_failed(&applicant, "ident-5", content, &[]) {
        Err(FraudCheckError::BeneficiaryFraudResultCannotBeDowngraded(_)) => {}
        other => panic!("expected downgrade error, got {other:?}"),
    }
}

#[test]
fn honor_statement_is_recorded_once_per_eligibility() {
    let (service, repository) = build_service();
    let applicant = user(6, born_years_ago(18));

    let first = service
        .create_honor_statement(&applicant, "statement from web", None)
        .expect("recorded");
    let second = service
        .create_honor_statement(&applicant, "statement from app", None)
        .expect("recorded again");

    assert_eq!(first.id, second.id);
    assert_eq!(first.third_party_id, "internal_check_6_18");
    assert_eq!(first.eligibility_type, age18());
    assert!(service
        .has_performed_honor_statement(applicant.id, age18())
        .expect("lookup"));
    assert!(!service
        .has_performed_honor_statement(applicant.id, Some(EligibilityType::Underage))
        .expect("lookup"));

    let honor_checks = repository
        .fraud_checks_for_user(applicant.id)
        .expect("checks")
        .into_iter()
        .filter(|check| check.check_type == FraudCheckType::HonorStatement)
        .count();
    assert_eq!(honor_checks, 1);
}

#[test]
fn honor_statement_id_names_the_eligibility_label() {
    let (service, _repository) = build_service();
    let underage = user(16, born_years_ago(16));
    let mut without_birth_date = user(17, born_years_ago(18));
    without_birth_date.date_of_birth = None;

    let underage_statement = service
        .create_honor_statement(&underage, "statement from web", None)
        .expect("recorded");
    let undated_statement = service
        .create_honor_statement(&without_birth_date, "statement from web", None)
        .expect("recorded");

    assert_eq!(underage_statement.third_party_id, "internal_check_16_15-17");
    assert_eq!(undated_statement.third_party_id, "internal_check_17");
}

#[test]
fn pending_identity_check_ignores_unused_vendor_sessions() {
    let (service, _) = build_service();
    let applicant = user(7, born_years_ago(18));

    let mut content = remote_content(&applicant, 1.0);
    content.status = Some(crate::workflows::fraud::IdentificationStatus::Initiated);
    service
        .start(
            &applicant,
            "ident-7",
            IdentityContent::RemoteVendorVerification(content),
        )
        .expect("started");
    assert!(!service
        .has_user_pending_identity_check(&applicant)
        .expect("lookup"));

    let other = remote_content(&applicant, 1.0);
    service
        .start(
            &applicant,
            "ident-7b",
            IdentityContent::RemoteVendorVerification(other),
        )
        .expect("started");
    assert!(service
        .has_user_pending_identity_check(&applicant)
        .expect("lookup"));
    assert!(service
        .has_user_performed_identity_check(applicant.id)
        .expect("lookup"));
}

#[test]
fn risky_profile_follows_latest_profiling_and_toggle() {
    let (service, _) = build_service();
    let applicant = user(8, born_years_ago(18));
    assert!(service.is_risky_user_profile(applicant.id).expect("lookup"));

    let (permissive, _) = build_service_with(FeatureToggles {
        allow_empty_user_profiling: true,
        ..FeatureToggles::default()
    });
    assert!(!permissive
        .is_risky_user_profile(applicant.id)
        .expect("lookup"));

    let check = service
        .on_user_profiling_result(
            &applicant,
            ProfilingContent {
                session_id: "profiling-8".to_string(),
                risk_rating: RiskRating::High,
            },
        )
        .expect("profiling stored");
    assert_status(&check, FraudCheckStatus::Ko);
    assert!(service.is_risky_user_profile(applicant.id).expect("lookup"));

    let medium = service
        .on_user_profiling_result(
            &applicant,
            ProfilingContent {
                session_id: "profiling-8b".to_string(),
                risk_rating: RiskRating::Medium,
            },
        )
        .expect("profiling stored");
    assert_status(&medium, FraudCheckStatus::Suspicious);
    assert!(!service.is_risky_user_profile(applicant.id).expect("lookup"));
}

#[test]
fn failed_phone_validation_records_distinct_ko_checks() {
    let (service, _) = build_service();
    let applicant = user(9, born_years_ago(18));
    let content = || PhoneValidationContent {
        source: PhoneFraudSource::SmsSendingLimitReached,
        message: "too many codes sent".to_string(),
        phone_number: applicant.phone_number.clone(),
    };

    let first = service
        .record_failed_phone_validation(&applicant, content())
        .expect("recorded");
    let second = service
        .record_failed_phone_validation(&applicant, content())
        .expect("recorded");

    assert_status(&first, FraudCheckStatus::Ko);
    assert_ne!(first.third_party_id, second.third_party_id);
    assert!(first.third_party_id.starts_with("PC-9-"));
    assert_eq!(first.reason_codes, vec![FraudReasonCode::SmsSendingLimitReached]);
}
