//! Identity fraud checks: provider payloads, rule evaluation, verdict aggregation and the
//! record store backing them.

pub mod content;
pub mod domain;
pub mod evaluation;
pub mod memory;
pub(crate) mod normalizer;
pub mod repository;
pub mod service;
pub(crate) mod store;

#[cfg(test)]
mod tests;

pub use content::{
    DigitalIdentityContent, DocumentFederationContent, DocumentReviewContent, FraudCheckContent,
    IdentificationStatus, IdentityContent, PhoneFraudSource, PhoneValidationContent,
    ProfilingContent, RemoteVerificationContent, RiskRating, VerificationScore,
};
pub use domain::{
    Deposit, EligibilityType, FraudCheck, FraudCheckId, FraudCheckStatus, FraudCheckType,
    FraudItem, FraudReasonCode, FraudReview, FraudReviewStatus, FraudStatus,
    PhoneValidationStatus, PhoneValidationToken, User, UserId, UserRole,
};
pub use evaluation::{aggregate, EvaluationConfig, EvaluationEngine, FraudVerdict};
pub use memory::InMemoryFraudRepository;
pub use repository::{
    EntityKey, FraudLookup, FraudRepository, PersistedEntity, RepositoryError, SaveBatch,
};
pub use service::{FraudCheckError, FraudCheckService};
