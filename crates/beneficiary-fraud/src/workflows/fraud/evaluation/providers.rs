use chrono::NaiveDateTime;

use super::super::content::{
    DigitalIdentityContent, DocumentFederationContent, DocumentReviewContent,
    RemoteVerificationContent, VerificationScore,
};
use super::super::domain::{FraudItem, FraudReasonCode, User};
use super::super::repository::{FraudLookup, RepositoryError};
use super::config::EvaluationConfig;
use super::rules;
use crate::config::FeatureToggles;

pub(crate) fn remote_verification_items<L>(
    lookup: &L,
    user: &User,
    content: &RemoteVerificationContent,
) -> Result<Vec<FraudItem>, RepositoryError>
where
    L: FraudLookup + ?Sized,
{
    let mut items = Vec::new();
    if let Some(number) = content.id_document_number.as_deref() {
        items.push(rules::duplicate_id_piece_number_item(lookup, user, number)?);
    }
    items.push(remote_verification_result_item(content));
    Ok(items)
}

/// Maps the vendor scores onto a single verdict.
pub(crate) fn remote_verification_result_item(content: &RemoteVerificationContent) -> FraudItem {
    let comment = content.comment.as_deref().unwrap_or("no comment");

    match content.score() {
        Some(VerificationScore::Valid) => FraudItem::ok("identity verification succeeded"),
        Some(VerificationScore::Invalid) => {
            let sub_score = |value: Option<f64>| value.and_then(VerificationScore::from_value);
            if sub_score(content.supported) == Some(VerificationScore::Invalid) {
                FraudItem::ko(
                    format!("identity document type is not supported: {comment}"),
                    FraudReasonCode::IdCheckNotSupported,
                )
            } else if sub_score(content.expiry_date_score) == Some(VerificationScore::Invalid) {
                FraudItem::ko(
                    format!("identity document is expired: {comment}"),
                    FraudReasonCode::IdCheckExpired,
                )
            } else {
                FraudItem::ko(
                    format!("identity verification failed: {comment}"),
                    FraudReasonCode::IdCheckInvalid,
                )
            }
        }
        Some(VerificationScore::Undecidable) | None => FraudItem::suspicious(
            format!("identity verification could not be processed: {comment}"),
            FraudReasonCode::IdCheckUnprocessable,
        ),
    }
}

pub(crate) fn digital_identity_items<L>(
    lookup: &L,
    user: &User,
    content: &DigitalIdentityContent,
    toggles: &FeatureToggles,
    config: &EvaluationConfig,
    now: NaiveDateTime,
) -> Result<Vec<FraudItem>, RepositoryError>
where
    L: FraudLookup + ?Sized,
{
    let mut items = vec![
        rules::underage_age_item(content.birth_date, now, config),
        rules::duplicate_ine_hash_item(lookup, &content.ine_hash, user.id)?,
    ];
    if toggles.enable_ine_whitelist_filter {
        items.push(rules::whitelisted_ine_item(lookup, &content.ine_hash)?);
    }
    Ok(items)
}

pub(crate) fn document_review_items<L>(
    lookup: &L,
    user: &User,
    content: &DocumentReviewContent,
) -> Result<Vec<FraudItem>, RepositoryError>
where
    L: FraudLookup + ?Sized,
{
    let item = match content.id_piece_number.as_deref() {
        Some(number) if !number.trim().is_empty() => {
            rules::duplicate_id_piece_number_item(lookup, user, number)?
        }
        _ => FraudItem::ok("no identity document number to compare"),
    };
    Ok(vec![item])
}

pub(crate) fn document_federation_items<L>(
    lookup: &L,
    user: &User,
    content: &DocumentFederationContent,
) -> Result<Vec<FraudItem>, RepositoryError>
where
    L: FraudLookup + ?Sized,
{
    let number = content.id_piece_number.as_deref();
    let mut items = vec![rules::id_piece_number_format_item(number)];
    if let Some(number) = number.filter(|value| !value.trim().is_empty()) {
        items.push(rules::duplicate_id_piece_number_item(lookup, user, number)?);
    }
    Ok(items)
}
