use serde::{Deserialize, Serialize};

/// Requirement a user must satisfy before being granted a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionStep {
    EmailValidation,
    PhoneValidation,
    IdCheck,
    HonorStatement,
}

impl SubscriptionStep {
    pub fn label(self) -> &'static str {
        match self {
            Self::EmailValidation => "email-validation",
            Self::PhoneValidation => "phone-validation",
            Self::IdCheck => "id-check",
            Self::HonorStatement => "honor-statement",
        }
    }
}

/// Where a user stands on the way to becoming a beneficiary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionState {
    Unstarted,
    PendingSteps,
    BeneficiaryCandidate,
    ActiveBeneficiary,
    Blocked,
}

impl SubscriptionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Unstarted => "UNSTARTED",
            Self::PendingSteps => "PENDING_STEPS",
            Self::BeneficiaryCandidate => "BENEFICIARY_CANDIDATE",
            Self::ActiveBeneficiary => "ACTIVE_BENEFICIARY",
            Self::Blocked => "BLOCKED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ActiveBeneficiary | Self::Blocked)
    }
}

/// Response body for the next steps endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionProgress {
    pub state: SubscriptionState,
    pub missing_steps: Vec<SubscriptionStep>,
}
