use super::common::*;
use crate::config::FeatureToggles;
use crate::workflows::fraud::content::IdentityContent;
use crate::workflows::fraud::domain::{Deposit, EligibilityType, FraudReasonCode, FraudStatus};
use crate::workflows::fraud::evaluation::id_piece_number_format_item;
use crate::workflows::fraud::{EvaluationEngine, FraudItem, InMemoryFraudRepository, User};

fn evaluate(
    repository: &InMemoryFraudRepository,
    user: &User,
    content: &IdentityContent,
    toggles: FeatureToggles,
) -> Vec<FraudItem> {
    EvaluationEngine::default()
        .evaluate(repository, user, content, &toggles, now())
        .expect("evaluation succeeds")
}

fn codes(items: &[FraudItem]) -> Vec<FraudReasonCode> {
    items.iter().filter_map(|item| item.reason_code).collect()
}

#[test]
fn id_piece_number_format_accepts_known_national_formats() {
    let accepted = [
        "123456789012345678",
        "A123456",
        "AB1234567",
        "AB 1234567",
        "123-4567890-12",
        "1234567",
        "880692310285",
        "X 12345678",
    ];
    for value in accepted {
        let item = id_piece_number_format_item(Some(value));
        assert_eq!(item.status, FraudStatus::Ok, "{value} should be accepted");
    }
}

#[test]
fn id_piece_number_format_flags_empty_and_malformed_values() {
    for value in [None, Some(""), Some("   ")] {
        let item = id_piece_number_format_item(value);
        assert_eq!(item.status, FraudStatus::Suspicious);
        assert_eq!(item.reason_code, Some(FraudReasonCode::EmptyIdPieceNumber));
    }

    for value in ["@@", "12-34", "1234567890123456789012"] {
        let item = id_piece_number_format_item(Some(value));
        assert_eq!(item.status, FraudStatus::Suspicious, "{value} should be rejected");
        assert_eq!(item.reason_code, Some(FraudReasonCode::InvalidIdPieceNumber));
    }
}

#[test]
fn duplicate_person_is_matched_on_normalized_names_and_birth_date() {
    let repository = InMemoryFraudRepository::new();
    let existing = beneficiary(1, "Marie", "Dupont", date(2005, 5, 5));
    store_user(&repository, &existing);

    let applicant = user(2, date(2005, 5, 5));
    let mut content = remote_content(&applicant, 1.0);
    content.first_name = Some("MARIE".to_string());
    content.last_name = Some("Dupônt".to_string());
    content.birth_date = Some(date(2005, 5, 5));
    let identity = IdentityContent::RemoteVendorVerification(content.clone());

    let items = evaluate(&repository, &applicant, &identity, FeatureToggles::default());
    assert!(codes(&items).contains(&FraudReasonCode::DuplicateUser));
    let duplicate = items
        .iter()
        .find(|item| item.reason_code == Some(FraudReasonCode::DuplicateUser))
        .expect("duplicate item");
    assert_eq!(duplicate.detail, "duplicate of user 1");
    assert_eq!(duplicate.status, FraudStatus::Suspicious);

    content.birth_date = Some(date(2005, 5, 6));
    let identity = IdentityContent::RemoteVendorVerification(content);
    let items = evaluate(&repository, &applicant, &identity, FeatureToggles::default());
    assert!(!codes(&items).contains(&FraudReasonCode::DuplicateUser));
}

#[test]
fn duplicate_person_rule_is_skipped_without_names() {
    let repository = InMemoryFraudRepository::new();
    store_user(&repository, &beneficiary(1, "Marie", "Dupont", date(2005, 5, 5)));

    let applicant = user(2, date(2005, 5, 5));
    let mut content = remote_content(&applicant, 1.0);
    content.first_name = Some("  ".to_string());
    content.last_name = Some("Dupont".to_string());
    let identity = IdentityContent::RemoteVendorVerification(content);

    let items = evaluate(&repository, &applicant, &identity, FeatureToggles::default());
    assert!(!codes(&items).contains(&FraudReasonCode::DuplicateUser));
}

#[test]
fn remote_verification_scores_map_to_reason_codes() {
    let repository = InMemoryFraudRepository::new();
    let applicant = user(3, born_years_ago(18));

    let cases = [
        (1.0, None, None, None),
        (0.0, None, None, Some(FraudReasonCode::IdCheckUnprocessable)),
        (-1.0, Some(-1.0), None, Some(FraudReasonCode::IdCheckNotSupported)),
        (-1.0, Some(1.0), Some(-1.0), Some(FraudReasonCode::IdCheckExpired)),
        (-1.0, Some(1.0), Some(1.0), Some(FraudReasonCode::IdCheckInvalid)),
    ];

    for (score, supported, expiry, expected) in cases {
        let mut content = remote_content(&applicant, score);
        content.supported = supported;
        content.expiry_date_score = expiry;
        let identity = IdentityContent::RemoteVendorVerification(content);
        let items = evaluate(&repository, &applicant, &identity, FeatureToggles::default());

        let id_check_codes: Vec<_> = codes(&items)
            .into_iter()
            .filter(|code| {
                matches!(
                    code,
                    FraudReasonCode::IdCheckUnprocessable
                        | FraudReasonCode::IdCheckNotSupported
                        | FraudReasonCode::IdCheckExpired
                        | FraudReasonCode::IdCheckInvalid
                )
            })
            .collect();
        assert_eq!(id_check_codes, expected.into_iter().collect::<Vec<_>>(), "score {score}");
    }
}

#[test]
fn missing_remote_score_is_unprocessable() {
    let repository = InMemoryFraudRepository::new();
    let applicant = user(4, born_years_ago(18));
    let mut content = remote_content(&applicant, 1.0);
    content.score = None;

    let items = evaluate(
        &repository,
        &applicant,
        &IdentityContent::RemoteVendorVerification(content),
        FeatureToggles::default(),
    );
    assert!(codes(&items).contains(&FraudReasonCode::IdCheckUnprocessable));
}

#[test]
fn digital_identity_checks_age_window_and_ine() {
    let repository = InMemoryFraudRepository::new();
    let mut holder = user(10, born_years_ago(16));
    holder.ine_hash = Some("ine-shared".to_string());
    store_user(&repository, &holder);

    let applicant = user(11, born_years_ago(16));
    let content = digital_identity_content(&applicant, "ine-shared");
    let items = evaluate(
        &repository,
        &applicant,
        &IdentityContent::DigitalIdentityFederation(content),
        FeatureToggles::default(),
    );
    let found = codes(&items);
    assert!(found.contains(&FraudReasonCode::DuplicateIne));
    assert!(!found.contains(&FraudReasonCode::AgeNotValid));
    assert!(!found.contains(&FraudReasonCode::IneNotWhitelisted));

    let adult = user(12, born_years_ago(18));
    let content = digital_identity_content(&adult, "ine-adult");
    let items = evaluate(
        &repository,
        &adult,
        &IdentityContent::DigitalIdentityFederation(content),
        FeatureToggles::default(),
    );
    assert!(codes(&items).contains(&FraudReasonCode::AgeNotValid));
}

#[test]
fn ine_whitelist_applies_only_when_toggle_is_enabled() {
    let repository = InMemoryFraudRepository::new();
    repository
        .whitelist_ine_hash("ine-known")
        .expect("whitelist stored");
    let toggles = FeatureToggles {
        enable_ine_whitelist_filter: true,
        ..FeatureToggles::default()
    };

    let applicant = user(20, born_years_ago(15));
    let unknown = IdentityContent::DigitalIdentityFederation(digital_identity_content(
        &applicant,
        "ine-unknown",
    ));
    let items = evaluate(&repository, &applicant, &unknown, toggles);
    assert!(codes(&items).contains(&FraudReasonCode::IneNotWhitelisted));

    let known = IdentityContent::DigitalIdentityFederation(digital_identity_content(
        &applicant,
        "ine-known",
    ));
    let items = evaluate(&repository, &applicant, &known, toggles);
    assert!(!codes(&items).contains(&FraudReasonCode::IneNotWhitelisted));
}

#[test]
fn document_review_without_number_yields_ok_item() {
    let repository = InMemoryFraudRepository::new();
    let applicant = user(30, born_years_ago(18));
    let mut content = document_review_content(&applicant, 4242);
    content.id_piece_number = None;

    let items = evaluate(
        &repository,
        &applicant,
        &IdentityContent::ManualDocumentReview(content),
        FeatureToggles::default(),
    );
    assert!(items.iter().all(FraudItem::is_ok), "{items:?}");
}

#[test]
fn document_federation_flags_reused_document_numbers() {
    let repository = InMemoryFraudRepository::new();
    let mut holder = user(40, born_years_ago(18));
    holder.id_piece_number = Some("123456789012".to_string());
    store_user(&repository, &holder);

    let applicant = user(41, born_years_ago(18));
    let content = document_federation_content(&applicant, Some("123456789012"));
    let items = evaluate(
        &repository,
        &applicant,
        &IdentityContent::DocumentFederation(content),
        FeatureToggles::default(),
    );
    assert!(codes(&items).contains(&FraudReasonCode::DuplicateIdPieceNumber));

    let content = document_federation_content(&applicant, None);
    let items = evaluate(
        &repository,
        &applicant,
        &IdentityContent::DocumentFederation(content),
        FeatureToggles::default(),
    );
    let found = codes(&items);
    assert!(found.contains(&FraudReasonCode::EmptyIdPieceNumber));
    assert!(!found.contains(&FraudReasonCode::DuplicateIdPieceNumber));
}

#[test]
fn shared_rules_cover_deposit_role_and_email() {
    let repository = InMemoryFraudRepository::new();
    let mut applicant = beneficiary(50, "Jean", "Martin", born_years_ago(18));
    applicant.is_email_validated = false;
    applicant.deposit = Some(Deposit {
        amount: 300,
        eligibility: EligibilityType::Age18,
        source: "test".to_string(),
        expiration_date: now() + chrono::Duration::days(30),
    });

    let identity = IdentityContent::RemoteVendorVerification(remote_content(&applicant, 1.0));
    let items = evaluate(&repository, &applicant, &identity, FeatureToggles::default());
    let found = codes(&items);
    assert!(found.contains(&FraudReasonCode::AlreadyBeneficiary));
    assert!(found.contains(&FraudReasonCode::AlreadyHasActiveDeposit));
    assert!(found.contains(&FraudReasonCode::EmailNotValidated));
}

#[test]
fn out_of_window_birth_date_is_not_eligible() {
    let repository = InMemoryFraudRepository::new();
    let applicant = user(60, born_years_ago(25));
    let identity = IdentityContent::RemoteVendorVerification(remote_content(&applicant, 1.0));

    let items = evaluate(&repository, &applicant, &identity, FeatureToggles::default());
    let not_eligible = items
        .iter()
        .find(|item| item.reason_code == Some(FraudReasonCode::NotEligible))
        .expect("not eligible item");
    assert_eq!(not_eligible.status, FraudStatus::Ko);
}
