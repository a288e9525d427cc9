use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;

use super::domain::{
    FraudCheck, FraudCheckId, FraudCheckType, FraudReview, PhoneValidationToken, User, UserId,
};
use super::normalizer::names_match;
use super::repository::{
    EntityKey, FraudLookup, FraudRepository, PersistedEntity, RepositoryError, SaveBatch,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: BTreeMap<UserId, User>,
    checks: BTreeMap<FraudCheckId, FraudCheck>,
    reviews: BTreeMap<UserId, FraudReview>,
    tokens: BTreeMap<UserId, PhoneValidationToken>,
    ine_whitelist: BTreeSet<String>,
}

impl MemoryState {
    fn apply(&mut self, batch: SaveBatch) -> Result<(), RepositoryError> {
        for entity in batch.upserts {
            match entity {
                PersistedEntity::User(user) => {
                    self.users.insert(user.id, user);
                }
                PersistedEntity::FraudCheck(check) => {
                    self.checks.insert(check.id, check);
                }
                PersistedEntity::FraudReview(review) => {
                    if self.reviews.contains_key(&review.user_id) {
                        return Err(RepositoryError::Conflict(format!(
                            "fraud review for user {}",
                            review.user_id
                        )));
                    }
                    self.reviews.insert(review.user_id, review);
                }
                PersistedEntity::PhoneValidationToken(token) => {
                    self.tokens.insert(token.user_id, token);
                }
            }
        }

        for key in batch.deletions {
            match key {
                EntityKey::PhoneValidationToken(user_id) => {
                    self.tokens.remove(&user_id);
                }
            }
        }

        self.check_constraints()
    }

    fn check_constraints(&self) -> Result<(), RepositoryError> {
        let mut emails = BTreeSet::new();
        let mut id_pieces = BTreeSet::new();
        for user in self.users.values() {
            if !emails.insert(user.email.to_lowercase()) {
                return Err(RepositoryError::Conflict(format!("email {}", user.email)));
            }
            if let Some(number) = &user.id_piece_number {
                if !id_pieces.insert(number.as_str()) {
                    return Err(RepositoryError::Conflict(format!(
                        "identity document {number}"
                    )));
                }
            }
        }

        let mut keys = BTreeSet::new();
        for check in self.checks.values() {
            if !keys.insert((check.user_id, check.check_type, check.third_party_id.as_str())) {
                return Err(RepositoryError::Conflict(format!(
                    "{} fraud check {} for user {}",
                    check.check_type.label(),
                    check.third_party_id,
                    check.user_id
                )));
            }
        }

        Ok(())
    }
}

/// Mutex-guarded store enforcing the same uniqueness rules as the relational schema.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFraudRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryFraudRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }

    pub fn whitelist_ine_hash(&self, ine_hash: impl Into<String>) -> Result<(), RepositoryError> {
        self.lock()?.ine_whitelist.insert(ine_hash.into());
        Ok(())
    }

    pub fn users(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.lock()?.users.values().cloned().collect())
    }

    pub fn fraud_checks(&self) -> Result<Vec<FraudCheck>, RepositoryError> {
        Ok(self.lock()?.checks.values().cloned().collect())
    }
}

impl FraudLookup for InMemoryFraudRepository {
    fn find_duplicate_beneficiary(
        &self,
        first_name: &str,
        last_name: &str,
        birth_date: NaiveDate,
        excluded_user_id: UserId,
    ) -> Result<Option<UserId>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .users
            .values()
            .find(|user| {
                user.id != excluded_user_id
                    && user.is_beneficiary()
                    && user.date_of_birth == Some(birth_date)
                    && user
                        .first_name
                        .as_deref()
                        .map(|name| names_match(name, first_name))
                        .unwrap_or(false)
                    && user
                        .last_name
                        .as_deref()
                        .map(|name| names_match(name, last_name))
                        .unwrap_or(false)
            })
            .map(|user| user.id))
    }

    fn find_user_by_id_piece_number(
        &self,
        id_piece_number: &str,
        excluded_user_id: UserId,
    ) -> Result<Option<UserId>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .users
            .values()
            .find(|user| {
                user.id != excluded_user_id
                    && user.id_piece_number.as_deref() == Some(id_piece_number)
            })
            .map(|user| user.id))
    }

    fn find_user_by_ine_hash(
        &self,
        ine_hash: &str,
        excluded_user_id: UserId,
    ) -> Result<Option<UserId>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .users
            .values()
            .find(|user| user.id != excluded_user_id && user.ine_hash.as_deref() == Some(ine_hash))
            .map(|user| user.id))
    }

    fn is_ine_whitelisted(&self, ine_hash: &str) -> Result<bool, RepositoryError> {
        Ok(self.lock()?.ine_whitelist.contains(ine_hash))
    }
}

impl FraudRepository for InMemoryFraudRepository {
    fn save(&self, batch: SaveBatch) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        let mut staged = guard.clone();
        staged.apply(batch)?;
        *guard = staged;
        Ok(())
    }

    fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    fn fraud_check(&self, id: FraudCheckId) -> Result<Option<FraudCheck>, RepositoryError> {
        Ok(self.lock()?.checks.get(&id).cloned())
    }

    fn fraud_checks_for_user(&self, user_id: UserId) -> Result<Vec<FraudCheck>, RepositoryError> {
        let guard = self.lock()?;
        let mut checks: Vec<FraudCheck> = guard
            .checks
            .values()
            .filter(|check| check.user_id == user_id)
            .cloned()
            .collect();
        checks.sort_by_key(|check| (check.date_created, check.id));
        Ok(checks)
    }

    fn find_fraud_check(
        &self,
        user_id: UserId,
        check_type: FraudCheckType,
        third_party_id: &str,
    ) -> Result<Option<FraudCheck>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .checks
            .values()
            .find(|check| {
                check.user_id == user_id
                    && check.check_type == check_type
                    && check.third_party_id == third_party_id
            })
            .cloned())
    }

    fn find_fraud_check_by_third_party_id(
        &self,
        check_type: FraudCheckType,
        third_party_id: &str,
    ) -> Result<Option<FraudCheck>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .checks
            .values()
            .find(|check| check.check_type == check_type && check.third_party_id == third_party_id)
            .cloned())
    }

    fn fraud_review(&self, user_id: UserId) -> Result<Option<FraudReview>, RepositoryError> {
        Ok(self.lock()?.reviews.get(&user_id).cloned())
    }

    fn phone_validation_token(
        &self,
        user_id: UserId,
    ) -> Result<Option<PhoneValidationToken>, RepositoryError> {
        Ok(self.lock()?.tokens.get(&user_id).cloned())
    }

    fn find_validated_phone_owner(
        &self,
        phone_number: &str,
    ) -> Result<Option<UserId>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .users
            .values()
            .find(|user| {
                user.is_phone_validated() && user.phone_number.as_deref() == Some(phone_number)
            })
            .map(|user| user.id))
    }
}
