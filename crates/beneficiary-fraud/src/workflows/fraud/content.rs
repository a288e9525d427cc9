//! Normalized provider payloads stored on a fraud check.
//!
//! Each provider kind owns its payload shape. The aggregator matches on [`IdentityContent`]
//! exhaustively, so adding a provider forces every dispatch site to be revisited.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::domain::{
    EligibilityType, FraudCheckStatus, FraudCheckType, FraudReasonCode, FraudStatus,
};
use super::evaluation::EvaluationConfig;

/// Lifecycle reported by the remote identity verification vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentificationStatus {
    Uninitiated,
    Initiated,
    Processing,
    Processed,
    Aborted,
}

impl IdentificationStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "uninitiated" => Some(Self::Uninitiated),
            "initiated" => Some(Self::Initiated),
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

/// Vendor score scale: 1 valid, 0 undecidable, -1 invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationScore {
    Valid,
    Undecidable,
    Invalid,
}

impl VerificationScore {
    pub fn from_value(value: f64) -> Option<Self> {
        if value == 1.0 {
            Some(Self::Valid)
        } else if value == 0.0 {
            Some(Self::Undecidable)
        } else if value == -1.0 {
            Some(Self::Invalid)
        } else {
            None
        }
    }

    pub const fn value(self) -> f64 {
        match self {
            Self::Valid => 1.0,
            Self::Undecidable => 0.0,
            Self::Invalid => -1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteVerificationContent {
    pub status: Option<IdentificationStatus>,
    pub birth_date: Option<NaiveDate>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub document_type: Option<String>,
    pub id_document_number: Option<String>,
    pub score: Option<f64>,
    pub comment: Option<String>,
    pub expiry_date_score: Option<f64>,
    pub supported: Option<f64>,
    pub identification_id: Option<String>,
    pub identification_url: Option<String>,
    pub registration_datetime: Option<NaiveDateTime>,
    pub signed_image_front_url: Option<String>,
    pub signed_image_back_url: Option<String>,
}

impl RemoteVerificationContent {
    pub fn score(&self) -> Option<VerificationScore> {
        self.score.and_then(VerificationScore::from_value)
    }
}

/// Digital identity federation (national education account) assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalIdentityContent {
    pub federation_id: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub ine_hash: String,
    pub registration_datetime: NaiveDateTime,
}

/// Application reviewed by hand on the document platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReviewContent {
    pub application_id: u64,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub email: String,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub id_piece_number: Option<String>,
    pub registration_datetime: NaiveDateTime,
}

/// Uploaded identity document read by the federation's OCR pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFederationContent {
    pub application_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub id_piece_number: Option<String>,
    pub registration_datetime: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "kebab-case")]
pub enum IdentityContent {
    RemoteVendorVerification(RemoteVerificationContent),
    DigitalIdentityFederation(DigitalIdentityContent),
    ManualDocumentReview(DocumentReviewContent),
    DocumentFederation(DocumentFederationContent),
}

impl IdentityContent {
    pub fn check_type(&self) -> FraudCheckType {
        match self {
            Self::RemoteVendorVerification(_) => FraudCheckType::RemoteVendorVerification,
            Self::DigitalIdentityFederation(_) => FraudCheckType::DigitalIdentityFederation,
            Self::ManualDocumentReview(_) => FraudCheckType::ManualDocumentReview,
            Self::DocumentFederation(_) => FraudCheckType::DocumentFederation,
        }
    }

    pub fn first_name(&self) -> Option<&str> {
        match self {
            Self::RemoteVendorVerification(content) => content.first_name.as_deref(),
            Self::DigitalIdentityFederation(content) => Some(content.first_name.as_str()),
            Self::ManualDocumentReview(content) => Some(content.first_name.as_str()),
            Self::DocumentFederation(content) => content.first_name.as_deref(),
        }
    }

    pub fn last_name(&self) -> Option<&str> {
        match self {
            Self::RemoteVendorVerification(content) => content.last_name.as_deref(),
            Self::DigitalIdentityFederation(content) => Some(content.last_name.as_str()),
            Self::ManualDocumentReview(content) => Some(content.last_name.as_str()),
            Self::DocumentFederation(content) => content.last_name.as_deref(),
        }
    }

    pub fn birth_date(&self) -> Option<NaiveDate> {
        match self {
            Self::RemoteVendorVerification(content) => content.birth_date,
            Self::DigitalIdentityFederation(content) => Some(content.birth_date),
            Self::ManualDocumentReview(content) => content.birth_date,
            Self::DocumentFederation(content) => content.birth_date,
        }
    }

    pub fn set_birth_date(&mut self, birth_date: Option<NaiveDate>) {
        match self {
            Self::RemoteVendorVerification(content) => content.birth_date = birth_date,
            Self::DigitalIdentityFederation(content) => {
                if let Some(date) = birth_date {
                    content.birth_date = date;
                }
            }
            Self::ManualDocumentReview(content) => content.birth_date = birth_date,
            Self::DocumentFederation(content) => content.birth_date = birth_date,
        }
    }

    pub fn id_piece_number(&self) -> Option<&str> {
        match self {
            Self::RemoteVendorVerification(content) => content.id_document_number.as_deref(),
            Self::DigitalIdentityFederation(_) => None,
            Self::ManualDocumentReview(content) => content.id_piece_number.as_deref(),
            Self::DocumentFederation(content) => content.id_piece_number.as_deref(),
        }
    }

    /// Rewrites the document number. Returns `false` for providers that carry none.
    pub fn set_id_piece_number(&mut self, value: &str) -> bool {
        match self {
            Self::RemoteVendorVerification(content) => {
                content.id_document_number = Some(value.to_string());
                true
            }
            Self::DigitalIdentityFederation(_) => false,
            Self::ManualDocumentReview(content) => {
                content.id_piece_number = Some(value.to_string());
                true
            }
            Self::DocumentFederation(content) => {
                content.id_piece_number = Some(value.to_string());
                true
            }
        }
    }

    pub fn registration_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::RemoteVendorVerification(content) => content.registration_datetime,
            Self::DigitalIdentityFederation(content) => Some(content.registration_datetime),
            Self::ManualDocumentReview(content) => Some(content.registration_datetime),
            Self::DocumentFederation(content) => content.registration_datetime,
        }
    }

    /// Eligibility at registration time, or at `now` when the provider did not report one.
    pub fn eligibility_type(
        &self,
        config: &EvaluationConfig,
        now: NaiveDateTime,
    ) -> Option<EligibilityType> {
        let birth_date = self.birth_date()?;
        let reference = self.registration_datetime().unwrap_or(now);
        config.eligibility_for(birth_date, reference)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskRating {
    Trusted,
    Neutral,
    Low,
    Medium,
    High,
}

impl RiskRating {
    pub fn fraud_status(self) -> FraudStatus {
        match self {
            Self::Trusted | Self::Neutral | Self::Low => FraudStatus::Ok,
            Self::Medium => FraudStatus::Suspicious,
            Self::High => FraudStatus::Ko,
        }
    }

    pub fn check_status(self) -> FraudCheckStatus {
        match self.fraud_status() {
            FraudStatus::Ok => FraudCheckStatus::Ok,
            FraudStatus::Suspicious => FraudCheckStatus::Suspicious,
            FraudStatus::Ko => FraudCheckStatus::Ko,
        }
    }
}

/// Phone carrier risk profiling session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingContent {
    pub session_id: String,
    pub risk_rating: RiskRating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhoneFraudSource {
    BlacklistedPhoneNumber,
    PhoneAlreadyExists,
    SmsSendingLimitReached,
    PhoneValidationAttemptsLimitReached,
}

impl PhoneFraudSource {
    pub fn reason_code(self) -> FraudReasonCode {
        match self {
            Self::BlacklistedPhoneNumber => FraudReasonCode::BlacklistedPhoneNumber,
            Self::PhoneAlreadyExists => FraudReasonCode::PhoneAlreadyExists,
            Self::SmsSendingLimitReached => FraudReasonCode::SmsSendingLimitReached,
            Self::PhoneValidationAttemptsLimitReached => {
                FraudReasonCode::PhoneValidationAttemptsLimitReached
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneValidationContent {
    pub source: PhoneFraudSource,
    pub message: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum FraudCheckContent {
    Identity(IdentityContent),
    Profiling(ProfilingContent),
    PhoneValidation(PhoneValidationContent),
}

impl FraudCheckContent {
    pub fn as_identity(&self) -> Option<&IdentityContent> {
        match self {
            Self::Identity(content) => Some(content),
            Self::Profiling(_) | Self::PhoneValidation(_) => None,
        }
    }

    pub fn as_identity_mut(&mut self) -> Option<&mut IdentityContent> {
        match self {
            Self::Identity(content) => Some(content),
            Self::Profiling(_) | Self::PhoneValidation(_) => None,
        }
    }

    pub fn as_profiling(&self) -> Option<&ProfilingContent> {
        match self {
            Self::Profiling(content) => Some(content),
            Self::Identity(_) | Self::PhoneValidation(_) => None,
        }
    }
}

impl From<IdentityContent> for FraudCheckContent {
    fn from(value: IdentityContent) -> Self {
        Self::Identity(value)
    }
}
