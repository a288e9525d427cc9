use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use super::super::domain::{EligibilityType, FraudItem, FraudReasonCode, User, UserId};
use super::super::repository::{FraudLookup, RepositoryError};
use super::config::EvaluationConfig;

// Algerian, European/French, Tunisian, Turkish, former Italian, Belgian, and
// Congolese/Cameroonian/Mauritian identity documents.
const ID_PIECE_NUMBER_PATTERN: &str = concat!(
    r"^(?:\d{18}|\w{8,12}|[\s\w]{14}|\w\d{6}|",
    r"\w *\d{8}|\w{2} *\d{7}|\d{3}-\d{7}-\d{2}|\d{7})$"
);

fn id_piece_number_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(ID_PIECE_NUMBER_PATTERN).ok())
        .as_ref()
}

/// Age must sit inside the underage window.
pub(crate) fn underage_age_item(
    birth_date: NaiveDate,
    now: NaiveDateTime,
    config: &EvaluationConfig,
) -> FraudItem {
    match now.date().years_since(birth_date) {
        Some(age) if config.is_underage_age(age) => {
            FraudItem::ok(format!("user age is valid ({age} years)"))
        }
        age => FraudItem::ko(
            format!(
                "user age is invalid ({} years), expected between {} and {}",
                age.map(|value| value.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                config.underage_min_age,
                config.underage_max_age
            ),
            FraudReasonCode::AgeNotValid,
        ),
    }
}

pub(crate) fn duplicate_user_item<L>(
    lookup: &L,
    first_name: &str,
    last_name: &str,
    birth_date: NaiveDate,
    excluded_user_id: UserId,
) -> Result<FraudItem, RepositoryError>
where
    L: FraudLookup + ?Sized,
{
    let duplicate =
        lookup.find_duplicate_beneficiary(first_name, last_name, birth_date, excluded_user_id)?;

    Ok(match duplicate {
        Some(other) => FraudItem::suspicious(
            format!("duplicate of user {other}"),
            FraudReasonCode::DuplicateUser,
        ),
        None => FraudItem::ok("user is not a duplicate"),
    })
}

pub(crate) fn duplicate_id_piece_number_item<L>(
    lookup: &L,
    user: &User,
    id_piece_number: &str,
) -> Result<FraudItem, RepositoryError>
where
    L: FraudLookup + ?Sized,
{
    Ok(
        match lookup.find_user_by_id_piece_number(id_piece_number, user.id)? {
            Some(other) => FraudItem::suspicious(
                format!("identity document {id_piece_number} is already used by user {other}"),
                FraudReasonCode::DuplicateIdPieceNumber,
            ),
            None => FraudItem::ok("identity document is not already used"),
        },
    )
}

pub(crate) fn duplicate_ine_hash_item<L>(
    lookup: &L,
    ine_hash: &str,
    excluded_user_id: UserId,
) -> Result<FraudItem, RepositoryError>
where
    L: FraudLookup + ?Sized,
{
    Ok(match lookup.find_user_by_ine_hash(ine_hash, excluded_user_id)? {
        Some(other) => FraudItem::suspicious(
            format!("INE {ine_hash} is already used by user {other}"),
            FraudReasonCode::DuplicateIne,
        ),
        None => FraudItem::ok("INE is not already used"),
    })
}

pub(crate) fn whitelisted_ine_item<L>(
    lookup: &L,
    ine_hash: &str,
) -> Result<FraudItem, RepositoryError>
where
    L: FraudLookup + ?Sized,
{
    Ok(if lookup.is_ine_whitelisted(ine_hash)? {
        FraudItem::ok("INE is whitelisted")
    } else {
        FraudItem::suspicious(
            format!("INE {ine_hash} is not whitelisted"),
            FraudReasonCode::IneNotWhitelisted,
        )
    })
}

/// Document number must be present and match a known national format.
pub fn id_piece_number_format_item(id_piece_number: Option<&str>) -> FraudItem {
    let value = match id_piece_number {
        Some(value) if !value.trim().is_empty() => value,
        _ => {
            return FraudItem::suspicious(
                "identity document number is empty",
                FraudReasonCode::EmptyIdPieceNumber,
            )
        }
    };

    let matches = id_piece_number_regex()
        .map(|regex| regex.is_match(value))
        .unwrap_or(false);

    if matches {
        FraudItem::ok("identity document number is valid")
    } else {
        FraudItem::suspicious(
            "identity document number format is invalid",
            FraudReasonCode::InvalidIdPieceNumber,
        )
    }
}

pub(crate) fn no_active_deposit_item(
    user: &User,
    eligibility: Option<EligibilityType>,
    now: NaiveDateTime,
) -> FraudItem {
    if user.has_active_deposit(now) {
        let track = eligibility.unwrap_or(EligibilityType::Age18).label();
        return FraudItem::ko(
            format!(
                "user is already a beneficiary with an unexpired deposit \
                 and cannot claim the {track} credit"
            ),
            FraudReasonCode::AlreadyHasActiveDeposit,
        );
    }
    FraudItem::ok("user has no active deposit")
}

pub(crate) fn eligibility_upgrade_item(
    user: &User,
    eligibility: Option<EligibilityType>,
) -> FraudItem {
    let Some(eligibility) = eligibility else {
        return FraudItem::ko(
            "the age declared in the application makes the user not eligible",
            FraudReasonCode::NotEligible,
        );
    };

    if !user.is_eligible_for_beneficiary_upgrade(eligibility) {
        return FraudItem::ko(
            format!(
                "user is already a beneficiary of the {} credit",
                eligibility.label()
            ),
            FraudReasonCode::AlreadyBeneficiary,
        );
    }

    FraudItem::ok("user is eligible to a new beneficiary status")
}

pub(crate) fn email_validated_item(user: &User) -> FraudItem {
    if user.is_email_validated {
        FraudItem::ok("email is validated")
    } else {
        FraudItem::ko("user email is not validated", FraudReasonCode::EmailNotValidated)
    }
}
