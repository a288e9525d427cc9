use chrono::NaiveDate;

use super::domain::{
    FraudCheck, FraudCheckId, FraudCheckType, FraudReview, PhoneValidationToken, User, UserId,
};

/// Read-only queries the rule evaluators depend on.
pub trait FraudLookup: Send + Sync {
    /// Another beneficiary with the same normalized names and birth date.
    fn find_duplicate_beneficiary(
        &self,
        first_name: &str,
        last_name: &str,
        birth_date: NaiveDate,
        excluded_user_id: UserId,
    ) -> Result<Option<UserId>, RepositoryError>;

    fn find_user_by_id_piece_number(
        &self,
        id_piece_number: &str,
        excluded_user_id: UserId,
    ) -> Result<Option<UserId>, RepositoryError>;

    fn find_user_by_ine_hash(
        &self,
        ine_hash: &str,
        excluded_user_id: UserId,
    ) -> Result<Option<UserId>, RepositoryError>;

    fn is_ine_whitelisted(&self, ine_hash: &str) -> Result<bool, RepositoryError>;
}

/// Transactional storage boundary for users, fraud checks and reviews.
///
/// `save` applies a whole batch or nothing. Uniqueness is enforced on user email, user
/// document number, `(user, check type, third party id)` and one review per user; a
/// violation surfaces as [`RepositoryError::Conflict`].
pub trait FraudRepository: FraudLookup {
    fn save(&self, batch: SaveBatch) -> Result<(), RepositoryError>;

    fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    fn fraud_check(&self, id: FraudCheckId) -> Result<Option<FraudCheck>, RepositoryError>;

    /// Checks of one user, oldest first.
    fn fraud_checks_for_user(&self, user_id: UserId) -> Result<Vec<FraudCheck>, RepositoryError>;

    fn find_fraud_check(
        &self,
        user_id: UserId,
        check_type: FraudCheckType,
        third_party_id: &str,
    ) -> Result<Option<FraudCheck>, RepositoryError>;

    fn find_fraud_check_by_third_party_id(
        &self,
        check_type: FraudCheckType,
        third_party_id: &str,
    ) -> Result<Option<FraudCheck>, RepositoryError>;

    fn fraud_review(&self, user_id: UserId) -> Result<Option<FraudReview>, RepositoryError>;

    fn phone_validation_token(
        &self,
        user_id: UserId,
    ) -> Result<Option<PhoneValidationToken>, RepositoryError>;

    /// Owner of `phone_number` among users whose phone is already validated.
    fn find_validated_phone_owner(
        &self,
        phone_number: &str,
    ) -> Result<Option<UserId>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum PersistedEntity {
    User(User),
    FraudCheck(FraudCheck),
    FraudReview(FraudReview),
    PhoneValidationToken(PhoneValidationToken),
}

/// Entities that may be removed. Users, checks and reviews are kept for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKey {
    PhoneValidationToken(UserId),
}

/// Group of upserts and deletions committed atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveBatch {
    pub upserts: Vec<PersistedEntity>,
    pub deletions: Vec<EntityKey>,
}

impl SaveBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user: User) -> Self {
        self.upserts.push(PersistedEntity::User(user));
        self
    }

    pub fn fraud_check(mut self, check: FraudCheck) -> Self {
        self.upserts.push(PersistedEntity::FraudCheck(check));
        self
    }

    pub fn fraud_review(mut self, review: FraudReview) -> Self {
        self.upserts.push(PersistedEntity::FraudReview(review));
        self
    }

    pub fn phone_validation_token(mut self, token: PhoneValidationToken) -> Self {
        self.upserts.push(PersistedEntity::PhoneValidationToken(token));
        self
    }

    pub fn delete(mut self, key: EntityKey) -> Self {
        self.deletions.push(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletions.is_empty()
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
