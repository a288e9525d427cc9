use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use super::content::{
    DigitalIdentityContent, DocumentReviewContent, FraudCheckContent, IdentityContent,
    ProfilingContent,
};
use super::domain::{
    FraudCheck, FraudCheckId, FraudCheckStatus, FraudCheckType, FraudItem, User, UserId,
};
use super::evaluation::{aggregate, EvaluationConfig, EvaluationEngine, FraudVerdict};
use super::repository::{FraudRepository, RepositoryError, SaveBatch};
use super::store::next_fraud_check_id;
use crate::clock::Clock;
use crate::config::{FeatureToggleSource, FeatureToggles};

/// Runs evaluators against provider results and persists the merged verdict.
pub struct FraudCheckService<R> {
    repository: Arc<R>,
    engine: Arc<EvaluationEngine>,
    toggles: Arc<dyn FeatureToggleSource>,
    clock: Arc<dyn Clock>,
}

impl<R> Clone for FraudCheckService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            engine: Arc::clone(&self.engine),
            toggles: Arc::clone(&self.toggles),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R> FraudCheckService<R>
where
    R: FraudRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        config: EvaluationConfig,
        toggles: Arc<dyn FeatureToggleSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            engine: Arc::new(EvaluationEngine::new(config)),
            toggles,
            clock,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn config(&self) -> &EvaluationConfig {
        self.engine.config()
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn toggles(&self) -> FeatureToggles {
        self.toggles.snapshot()
    }

    pub(crate) fn load_user(&self, user_id: UserId) -> Result<User, FraudCheckError> {
        Ok(self
            .repository
            .user(user_id)?
            .ok_or(RepositoryError::NotFound)?)
    }

    /// Evaluates an identity check, stores its verdict and returns the rule items.
    ///
    /// This is the only path moving a check from PENDING/STARTED to a verdict status.
    pub fn on_identity_fraud_check_result(
        &self,
        user: &User,
        check: &mut FraudCheck,
    ) -> Result<Vec<FraudItem>, FraudCheckError> {
        let content = check
            .result_content
            .as_ref()
            .ok_or(FraudCheckError::MissingResultContent(check.id))?;

        let identity = match content {
            FraudCheckContent::Identity(identity) => identity,
            FraudCheckContent::Profiling(_) | FraudCheckContent::PhoneValidation(_) => {
                return Err(FraudCheckError::NotAnIdentityCheck(check.check_type));
            }
        };

        let toggles = self.toggles.snapshot();
        let items = self.engine.evaluate(
            self.repository.as_ref(),
            user,
            identity,
            &toggles,
            self.clock.now(),
        )?;

        self.validate_frauds(&items, check)?;
        Ok(items)
    }

    /// Applies the aggregated verdict to `check` and saves it.
    pub fn validate_frauds(
        &self,
        items: &[FraudItem],
        check: &mut FraudCheck,
    ) -> Result<FraudVerdict, FraudCheckError> {
        let verdict = aggregate(items);

        if check.status == FraudCheckStatus::Ok && !verdict.is_ok() {
            return Err(FraudCheckError::BeneficiaryFraudResultCannotBeDowngraded(
                check.id,
            ));
        }

        check.status = verdict.status;
        check.reason = (!verdict.reason.is_empty()).then(|| verdict.reason.clone());
        check.reason_codes = verdict.reason_codes.clone();

        self.repository
            .save(SaveBatch::new().fraud_check(check.clone()))?;

        info!(
            user_id = %check.user_id,
            fraud_check_id = %check.id,
            status = check.status.label(),
            "fraud check evaluated"
        );
        Ok(verdict)
    }

    /// Result of a manually reviewed document application.
    pub fn on_dms_result(
        &self,
        user: &User,
        content: DocumentReviewContent,
    ) -> Result<FraudCheck, FraudCheckError> {
        let now = self.clock.now();
        let third_party_id = content.application_id.to_string();
        let identity = IdentityContent::ManualDocumentReview(content);
        let eligibility = identity.eligibility_type(self.config(), now);

        let mut check = match self.repository.find_fraud_check(
            user.id,
            FraudCheckType::ManualDocumentReview,
            &third_party_id,
        )? {
            Some(mut check) => {
                if check.eligibility_type != eligibility {
                    info!(user_id = %user.id, "user changed eligibility in document application");
                    check.eligibility_type = eligibility;
                }
                check.result_content = Some(identity.into());
                check
            }
            None => {
                warn!(
                    user_id = %user.id,
                    third_party_id = %third_party_id,
                    "document review fraud check not previously created"
                );
                FraudCheck {
                    id: next_fraud_check_id(),
                    user_id: user.id,
                    check_type: FraudCheckType::ManualDocumentReview,
                    third_party_id,
                    status: FraudCheckStatus::Pending,
                    eligibility_type: eligibility,
                    result_content: Some(identity.into()),
                    reason: None,
                    reason_codes: Vec::new(),
                    date_created: now,
                    id_pictures_stored: false,
                }
            }
        };

        self.on_identity_fraud_check_result(user, &mut check)?;
        Ok(check)
    }

    /// Result of a digital identity federation login.
    pub fn on_educonnect_result(
        &self,
        user: &User,
        content: DigitalIdentityContent,
    ) -> Result<FraudCheck, FraudCheckError> {
        let now = self.clock.now();
        let third_party_id = content.federation_id.clone();
        let identity = IdentityContent::DigitalIdentityFederation(content);
        let eligibility = identity.eligibility_type(self.config(), now);

        let existing = self
            .repository
            .fraud_checks_for_user(user.id)?
            .into_iter()
            .find(|check| {
                check.check_type == FraudCheckType::DigitalIdentityFederation
                    && check.eligibility_type == eligibility
            });

        let mut check = match existing {
            Some(mut check) => {
                check.third_party_id = third_party_id;
                check.result_content = Some(identity.into());
                check
            }
            None => FraudCheck {
                id: next_fraud_check_id(),
                user_id: user.id,
                check_type: FraudCheckType::DigitalIdentityFederation,
                third_party_id,
                status: FraudCheckStatus::Pending,
                eligibility_type: eligibility,
                result_content: Some(identity.into()),
                reason: None,
                reason_codes: Vec::new(),
                date_created: now,
                id_pictures_stored: false,
            },
        };

        self.on_identity_fraud_check_result(user, &mut check)?;
        Ok(check)
    }

    /// Stores the phone carrier risk profile. Caller decides how to react to a non-OK rating.
    pub fn on_user_profiling_result(
        &self,
        user: &User,
        content: ProfilingContent,
    ) -> Result<FraudCheck, FraudCheckError> {
        let now = self.clock.now();
        let status = content.risk_rating.check_status();
        let check = FraudCheck {
            id: next_fraud_check_id(),
            user_id: user.id,
            check_type: FraudCheckType::PhoneRiskProfiling,
            third_party_id: content.session_id.clone(),
            status,
            eligibility_type: user.eligibility_at(self.config(), now),
            result_content: Some(FraudCheckContent::Profiling(content)),
            reason: None,
            reason_codes: Vec::new(),
            date_created: now,
            id_pictures_stored: false,
        };

        self.repository
            .save(SaveBatch::new().fraud_check(check.clone()))?;
        info!(user_id = %user.id, status = status.label(), "user profiling recorded");
        Ok(check)
    }

    /// Overwrites the document number on the most recent document-based check.
    pub fn admin_update_document_number(
        &self,
        user_id: UserId,
        id_piece_number: &str,
    ) -> Result<Option<FraudCheck>, FraudCheckError> {
        let latest = self
            .repository
            .fraud_checks_for_user(user_id)?
            .into_iter()
            .filter(|check| {
                matches!(
                    check.check_type,
                    FraudCheckType::DocumentFederation | FraudCheckType::ManualDocumentReview
                )
            })
            .max_by_key(|check| (check.date_created, check.id));

        let Some(mut check) = latest else {
            return Ok(None);
        };

        let updated = check
            .result_content
            .as_mut()
            .and_then(FraudCheckContent::as_identity_mut)
            .map(|content| content.set_id_piece_number(id_piece_number))
            .unwrap_or(false);
        if !updated {
            return Ok(None);
        }

        self.repository
            .save(SaveBatch::new().fraud_check(check.clone()))?;
        info!(user_id = %user_id, fraud_check_id = %check.id, "document number updated by admin");
        Ok(Some(check))
    }
}

/// Error raised by fraud check evaluation and storage.
#[derive(Debug, thiserror::Error)]
pub enum FraudCheckError {
    #[error("a fraud check was already started for application {third_party_id}")]
    ApplicationAlreadyStarted { third_party_id: String },
    #[error("fraud check {0} is OK and cannot be downgraded")]
    BeneficiaryFraudResultCannotBeDowngraded(FraudCheckId),
    #[error("{} fraud check cannot be evaluated as an identity check", .0.label())]
    NotAnIdentityCheck(FraudCheckType),
    #[error("fraud check {0} has no result content")]
    MissingResultContent(FraudCheckId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
