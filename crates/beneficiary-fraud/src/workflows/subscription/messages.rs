use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::workflows::fraud::{FraudReasonCode, UserId};

/// Transactional messages sent along the subscription journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    ReviewPending,
    JourneyCannotContinue,
    ProfilingJourneyStopped,
    FraudReviewKo,
    RedirectedToExternalReview,
    DuplicateBeneficiary,
    DuplicateIdPieceNumber,
    NotEligible,
    IdCheckExpired,
    IdCheckNotSupported,
    IdCheckInvalid,
    IdCheckUnprocessable,
    BeneficiaryActivated,
}

impl NotificationTemplate {
    pub fn label(self) -> &'static str {
        match self {
            Self::ReviewPending => "review_pending",
            Self::JourneyCannotContinue => "journey_cannot_continue",
            Self::ProfilingJourneyStopped => "profiling_journey_stopped",
            Self::FraudReviewKo => "fraud_review_ko",
            Self::RedirectedToExternalReview => "redirected_to_external_review",
            Self::DuplicateBeneficiary => "duplicate_beneficiary",
            Self::DuplicateIdPieceNumber => "duplicate_id_piece_number",
            Self::NotEligible => "not_eligible",
            Self::IdCheckExpired => "id_check_expired",
            Self::IdCheckNotSupported => "id_check_not_supported",
            Self::IdCheckInvalid => "id_check_invalid",
            Self::IdCheckUnprocessable => "id_check_unprocessable",
            Self::BeneficiaryActivated => "beneficiary_activated",
        }
    }

    /// Reason-coded message explaining a refused identity check, if one exists for `code`.
    pub fn for_reason_code(code: FraudReasonCode) -> Option<Self> {
        match code {
            FraudReasonCode::DuplicateUser => Some(Self::DuplicateBeneficiary),
            FraudReasonCode::DuplicateIdPieceNumber => Some(Self::DuplicateIdPieceNumber),
            FraudReasonCode::AgeNotValid | FraudReasonCode::NotEligible => Some(Self::NotEligible),
            FraudReasonCode::IdCheckExpired => Some(Self::IdCheckExpired),
            FraudReasonCode::IdCheckNotSupported => Some(Self::IdCheckNotSupported),
            FraudReasonCode::IdCheckInvalid => Some(Self::IdCheckInvalid),
            FraudReasonCode::IdCheckUnprocessable => Some(Self::IdCheckUnprocessable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionNotification {
    pub template: NotificationTemplate,
    pub user_id: UserId,
    pub details: BTreeMap<String, String>,
}

impl SubscriptionNotification {
    pub fn new(template: NotificationTemplate, user_id: UserId) -> Self {
        Self {
            template,
            user_id,
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Outbound messaging hook (push, e-mail or both).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: SubscriptionNotification) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
