use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::content::FraudCheckContent;
use super::evaluation::EvaluationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FraudCheckId(pub u64);

impl fmt::Display for FraudCheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Age bracket a user is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EligibilityType {
    Underage,
    Age18,
}

impl EligibilityType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Underage => "15-17",
            Self::Age18 => "18",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Beneficiary,
    UnderageBeneficiary,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneValidationStatus {
    #[default]
    Unvalidated,
    Validated,
    BlockedTooManyCodeVerificationTries,
}

/// Monetary credit granted on activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub amount: u32,
    pub eligibility: EligibilityType,
    pub source: String,
    pub expiration_date: NaiveDateTime,
}

impl Deposit {
    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        self.expiration_date > now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone_number: Option<String>,
    pub is_email_validated: bool,
    pub phone_validation_status: PhoneValidationStatus,
    pub roles: BTreeSet<UserRole>,
    pub deposit: Option<Deposit>,
    pub id_piece_number: Option<String>,
    pub ine_hash: Option<String>,
    pub has_completed_id_check: bool,
    pub is_active: bool,
}

impl User {
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            first_name: None,
            last_name: None,
            date_of_birth: None,
            phone_number: None,
            is_email_validated: false,
            phone_validation_status: PhoneValidationStatus::Unvalidated,
            roles: BTreeSet::new(),
            deposit: None,
            id_piece_number: None,
            ine_hash: None,
            has_completed_id_check: false,
            is_active: true,
        }
    }

    pub fn age_at(&self, date: NaiveDate) -> Option<u32> {
        self.date_of_birth.and_then(|birth| date.years_since(birth))
    }

    /// Eligibility derived from the declared birth date at `now`.
    pub fn eligibility_at(
        &self,
        config: &EvaluationConfig,
        now: NaiveDateTime,
    ) -> Option<EligibilityType> {
        self.date_of_birth
            .and_then(|birth| config.eligibility_for(birth, now))
    }

    pub fn has_active_deposit(&self, now: NaiveDateTime) -> bool {
        self.deposit
            .as_ref()
            .map(|deposit| deposit.is_active(now))
            .unwrap_or(false)
    }

    pub fn has_beneficiary_role(&self) -> bool {
        self.roles.contains(&UserRole::Beneficiary)
    }

    pub fn has_underage_beneficiary_role(&self) -> bool {
        self.roles.contains(&UserRole::UnderageBeneficiary)
    }

    pub fn is_beneficiary(&self) -> bool {
        self.has_beneficiary_role() || self.has_underage_beneficiary_role()
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&UserRole::Admin)
    }

    pub fn is_phone_validated(&self) -> bool {
        self.phone_validation_status == PhoneValidationStatus::Validated
    }

    /// Whether the user may still be granted the role matching `eligibility`.
    pub fn is_eligible_for_beneficiary_upgrade(&self, eligibility: EligibilityType) -> bool {
        match eligibility {
            EligibilityType::Age18 => !self.has_beneficiary_role(),
            EligibilityType::Underage => {
                !self.has_underage_beneficiary_role() && !self.has_beneficiary_role()
            }
        }
    }
}

/// Provider kind that produced a fraud check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FraudCheckType {
    DocumentFederation,
    DigitalIdentityFederation,
    PhoneRiskProfiling,
    ManualDocumentReview,
    RemoteVendorVerification,
    HonorStatement,
    PhoneValidation,
}

impl FraudCheckType {
    pub const IDENTITY_CHECK_TYPES: [Self; 4] = [
        Self::DocumentFederation,
        Self::DigitalIdentityFederation,
        Self::ManualDocumentReview,
        Self::RemoteVendorVerification,
    ];

    pub fn is_identity_check(self) -> bool {
        Self::IDENTITY_CHECK_TYPES.contains(&self)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::DocumentFederation => "document-federation",
            Self::DigitalIdentityFederation => "digital-identity-federation",
            Self::PhoneRiskProfiling => "phone-risk-profiling",
            Self::ManualDocumentReview => "manual-document-review",
            Self::RemoteVendorVerification => "remote-vendor-verification",
            Self::HonorStatement => "honor-statement",
            Self::PhoneValidation => "phone-validation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudCheckStatus {
    Pending,
    Started,
    Ok,
    Ko,
    Suspicious,
    Canceled,
}

impl FraudCheckStatus {
    /// OK and KO close a check; SUSPICIOUS waits for a manual decision.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ok | Self::Ko)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Ok => "OK",
            Self::Ko => "KO",
            Self::Suspicious => "SUSPICIOUS",
            Self::Canceled => "CANCELED",
        }
    }
}

/// Verdict of a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudStatus {
    Ok,
    Ko,
    Suspicious,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudReasonCode {
    AgeNotValid,
    AlreadyBeneficiary,
    AlreadyHasActiveDeposit,
    DuplicateIdPieceNumber,
    DuplicateIne,
    DuplicateUser,
    EmailNotValidated,
    EmptyIdPieceNumber,
    IneNotWhitelisted,
    InvalidIdPieceNumber,
    NotEligible,
    IdCheckExpired,
    IdCheckInvalid,
    IdCheckNotSupported,
    IdCheckUnprocessable,
    BlacklistedPhoneNumber,
    PhoneAlreadyExists,
    SmsSendingLimitReached,
    PhoneValidationAttemptsLimitReached,
}

/// Output of one rule evaluator. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudItem {
    pub status: FraudStatus,
    pub detail: String,
    pub reason_code: Option<FraudReasonCode>,
}

impl FraudItem {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            status: FraudStatus::Ok,
            detail: detail.into(),
            reason_code: None,
        }
    }

    pub fn suspicious(detail: impl Into<String>, reason_code: FraudReasonCode) -> Self {
        Self {
            status: FraudStatus::Suspicious,
            detail: detail.into(),
            reason_code: Some(reason_code),
        }
    }

    pub fn ko(detail: impl Into<String>, reason_code: FraudReasonCode) -> Self {
        Self {
            status: FraudStatus::Ko,
            detail: detail.into(),
            reason_code: Some(reason_code),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == FraudStatus::Ok
    }
}

/// One provider verification attempt and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudCheck {
    pub id: FraudCheckId,
    pub user_id: UserId,
    pub check_type: FraudCheckType,
    pub third_party_id: String,
    pub status: FraudCheckStatus,
    pub eligibility_type: Option<EligibilityType>,
    pub result_content: Option<FraudCheckContent>,
    pub reason: Option<String>,
    pub reason_codes: Vec<FraudReasonCode>,
    pub date_created: NaiveDateTime,
    pub id_pictures_stored: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudReviewStatus {
    Ok,
    Ko,
    RedirectedToExternalReview,
}

/// Manual reviewer decision. One per user, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudReview {
    pub user_id: UserId,
    pub author_id: UserId,
    pub review: FraudReviewStatus,
    pub reason: String,
    pub date_reviewed: NaiveDateTime,
}

/// Short-lived code sent by SMS during phone validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneValidationToken {
    pub user_id: UserId,
    pub value: String,
    pub expiration_date: NaiveDateTime,
}
