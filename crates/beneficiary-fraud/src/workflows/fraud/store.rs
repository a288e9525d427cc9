use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use super::content::{
    FraudCheckContent, IdentificationStatus, IdentityContent, PhoneValidationContent, RiskRating,
};
use super::domain::{
    EligibilityType, FraudCheck, FraudCheckId, FraudCheckStatus, FraudCheckType, FraudItem, User,
    UserId,
};
use super::evaluation::aggregate;
use super::repository::{FraudRepository, RepositoryError, SaveBatch};
use super::service::{FraudCheckError, FraudCheckService};

static FRAUD_CHECK_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_fraud_check_id() -> FraudCheckId {
    FraudCheckId(FRAUD_CHECK_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

fn honor_statement_third_party_id(
    user_id: UserId,
    eligibility: Option<EligibilityType>,
) -> String {
    match eligibility {
        Some(eligibility) => format!("internal_check_{user_id}_{}", eligibility.label()),
        None => format!("internal_check_{user_id}"),
    }
}

impl<R> FraudCheckService<R>
where
    R: FraudRepository + 'static,
{
    /// Opens a PENDING check for a new provider application.
    ///
    /// Fails when any check already exists for `(user, provider, application_id)`,
    /// including the case where a concurrent start wins the store's uniqueness race.
    pub fn start(
        &self,
        user: &User,
        application_id: &str,
        content: IdentityContent,
    ) -> Result<FraudCheck, FraudCheckError> {
        self.open_check(user, application_id, content, FraudCheckStatus::Pending)
    }

    /// Same as [`start`](Self::start) for sessions the vendor has opened but not yet used.
    pub fn start_session(
        &self,
        user: &User,
        application_id: &str,
        content: IdentityContent,
    ) -> Result<FraudCheck, FraudCheckError> {
        self.open_check(user, application_id, content, FraudCheckStatus::Started)
    }

    fn open_check(
        &self,
        user: &User,
        application_id: &str,
        content: IdentityContent,
        status: FraudCheckStatus,
    ) -> Result<FraudCheck, FraudCheckError> {
        let check_type = content.check_type();
        let already_started = || FraudCheckError::ApplicationAlreadyStarted {
            third_party_id: application_id.to_string(),
        };

        if self
            .repository()
            .find_fraud_check(user.id, check_type, application_id)?
            .is_some()
        {
            return Err(already_started());
        }

        let now = self.now();
        let check = FraudCheck {
            id: next_fraud_check_id(),
            user_id: user.id,
            check_type,
            third_party_id: application_id.to_string(),
            status,
            eligibility_type: content.eligibility_type(self.config(), now),
            result_content: Some(content.into()),
            reason: None,
            reason_codes: Vec::new(),
            date_created: now,
            id_pictures_stored: false,
        };

        match self
            .repository()
            .save(SaveBatch::new().fraud_check(check.clone()))
        {
            Ok(()) => {}
            Err(RepositoryError::Conflict(_)) => return Err(already_started()),
            Err(other) => return Err(other.into()),
        }

        info!(
            user_id = %user.id,
            fraud_check_id = %check.id,
            third_party_id = application_id,
            check_type = check_type.label(),
            "fraud check started"
        );
        Ok(check)
    }

    /// Forces the check for the key to KO, creating it when absent.
    pub fn mark_failed(
        &self,
        user: &User,
        application_id: &str,
        content: IdentityContent,
        reasons: &[FraudItem],
    ) -> Result<FraudCheck, FraudCheckError> {
        let check_type = content.check_type();
        let now = self.now();

        let mut check = match self
            .repository()
            .find_fraud_check(user.id, check_type, application_id)?
        {
            Some(check) if check.status == FraudCheckStatus::Ok => {
                return Err(FraudCheckError::BeneficiaryFraudResultCannotBeDowngraded(
                    check.id,
                ));
            }
            Some(check) => check,
            None => FraudCheck {
                id: next_fraud_check_id(),
                user_id: user.id,
                check_type,
                third_party_id: application_id.to_string(),
                status: FraudCheckStatus::Pending,
                eligibility_type: content.eligibility_type(self.config(), now),
                result_content: Some(content.into()),
                reason: None,
                reason_codes: Vec::new(),
                date_created: now,
                id_pictures_stored: false,
            },
        };

        let verdict = aggregate(reasons);
        check.status = FraudCheckStatus::Ko;
        check.reason = (!verdict.reason.is_empty()).then_some(verdict.reason);
        check.reason_codes = verdict.reason_codes;

        self.repository()
            .save(SaveBatch::new().fraud_check(check.clone()))?;
        warn!(
            user_id = %user.id,
            fraud_check_id = %check.id,
            third_party_id = application_id,
            "fraud check marked as failed"
        );
        Ok(check)
    }

    /// Most recent identity check of any provider.
    pub fn latest_identity_check(
        &self,
        user_id: UserId,
    ) -> Result<Option<FraudCheck>, FraudCheckError> {
        Ok(self
            .repository()
            .fraud_checks_for_user(user_id)?
            .into_iter()
            .filter(|check| check.check_type.is_identity_check())
            .max_by_key(|check| (check.date_created, check.id)))
    }

    pub fn find_by_third_party_id(
        &self,
        check_type: FraudCheckType,
        third_party_id: &str,
    ) -> Result<Option<FraudCheck>, FraudCheckError> {
        Ok(self
            .repository()
            .find_fraud_check_by_third_party_id(check_type, third_party_id)?)
    }

    /// Records the user's self attestation. Recording it twice is a no-op.
    pub fn create_honor_statement(
        &self,
        user: &User,
        origin: &str,
        eligibility: Option<EligibilityType>,
    ) -> Result<FraudCheck, FraudCheckError> {
        let now = self.now();
        let eligibility = eligibility.or_else(|| user.eligibility_at(self.config(), now));
        let third_party_id = honor_statement_third_party_id(user.id, eligibility);

        if let Some(existing) = self.repository().find_fraud_check(
            user.id,
            FraudCheckType::HonorStatement,
            &third_party_id,
        )? {
            return Ok(existing);
        }

        let check = FraudCheck {
            id: next_fraud_check_id(),
            user_id: user.id,
            check_type: FraudCheckType::HonorStatement,
            third_party_id,
            status: FraudCheckStatus::Ok,
            eligibility_type: eligibility,
            result_content: None,
            reason: Some(origin.to_string()),
            reason_codes: Vec::new(),
            date_created: now,
            id_pictures_stored: false,
        };
        self.repository()
            .save(SaveBatch::new().fraud_check(check.clone()))?;
        info!(user_id = %user.id, "honor statement recorded");
        Ok(check)
    }

    pub fn has_performed_honor_statement(
        &self,
        user_id: UserId,
        eligibility: Option<EligibilityType>,
    ) -> Result<bool, FraudCheckError> {
        Ok(self.any_check(user_id, |check| {
            check.check_type == FraudCheckType::HonorStatement
                && check.eligibility_type == eligibility
                && check.status == FraudCheckStatus::Ok
        })?)
    }

    /// A PENDING identity check for the current eligibility whose vendor session was used.
    pub fn has_user_pending_identity_check(&self, user: &User) -> Result<bool, FraudCheckError> {
        let eligibility = user.eligibility_at(self.config(), self.now());
        Ok(self.any_check(user.id, |check| {
            check.check_type.is_identity_check()
                && check.status == FraudCheckStatus::Pending
                && check.eligibility_type == eligibility
                && !is_initiated_session(check)
        })?)
    }

    pub fn has_user_performed_identity_check(
        &self,
        user_id: UserId,
    ) -> Result<bool, FraudCheckError> {
        Ok(self.any_check(user_id, |check| {
            check.check_type.is_identity_check()
                && !matches!(
                    check.status,
                    FraudCheckStatus::Canceled | FraudCheckStatus::Started
                )
        })?)
    }

    pub fn has_passed_digital_identity(&self, user_id: UserId) -> Result<bool, FraudCheckError> {
        Ok(self.any_check(user_id, |check| {
            check.check_type == FraudCheckType::DigitalIdentityFederation
                && check.status == FraudCheckStatus::Ok
        })?)
    }

    pub fn has_ok_identity_check(
        &self,
        user_id: UserId,
        eligibility: Option<EligibilityType>,
    ) -> Result<bool, FraudCheckError> {
        Ok(self.any_check(user_id, |check| {
            check.check_type.is_identity_check()
                && check.status == FraudCheckStatus::Ok
                && check.eligibility_type == eligibility
        })?)
    }

    /// Latest profiling rated HIGH, or no profiling at all while empty profiles are refused.
    pub fn is_risky_user_profile(&self, user_id: UserId) -> Result<bool, FraudCheckError> {
        let latest = self.latest_check_of_type(user_id, FraudCheckType::PhoneRiskProfiling)?;

        match latest {
            Some(check) => Ok(check
                .result_content
                .as_ref()
                .and_then(FraudCheckContent::as_profiling)
                .map(|profiling| profiling.risk_rating == RiskRating::High)
                .unwrap_or(false)),
            None => Ok(!self.toggles().allow_empty_user_profiling),
        }
    }

    pub fn latest_check_of_type(
        &self,
        user_id: UserId,
        check_type: FraudCheckType,
    ) -> Result<Option<FraudCheck>, FraudCheckError> {
        Ok(self
            .repository()
            .fraud_checks_for_user(user_id)?
            .into_iter()
            .filter(|check| check.check_type == check_type)
            .max_by_key(|check| (check.date_created, check.id)))
    }

    /// Stores a KO phone validation check describing why the number was refused.
    pub fn record_failed_phone_validation(
        &self,
        user: &User,
        content: PhoneValidationContent,
    ) -> Result<FraudCheck, FraudCheckError> {
        let now = self.now();
        let id = next_fraud_check_id();
        let check = FraudCheck {
            id,
            user_id: user.id,
            check_type: FraudCheckType::PhoneValidation,
            third_party_id: format!("PC-{}-{}", user.id, id),
            status: FraudCheckStatus::Ko,
            eligibility_type: user.eligibility_at(self.config(), now),
            reason: Some(content.message.clone()),
            reason_codes: vec![content.source.reason_code()],
            result_content: Some(FraudCheckContent::PhoneValidation(content)),
            date_created: now,
            id_pictures_stored: false,
        };
        self.repository()
            .save(SaveBatch::new().fraud_check(check.clone()))?;
        warn!(
            user_id = %user.id,
            fraud_check_id = %check.id,
            reason = check.reason.as_deref().unwrap_or_default(),
            "phone validation refused"
        );
        Ok(check)
    }

    fn any_check<F>(&self, user_id: UserId, predicate: F) -> Result<bool, RepositoryError>
    where
        F: Fn(&FraudCheck) -> bool,
    {
        Ok(self
            .repository()
            .fraud_checks_for_user(user_id)?
            .iter()
            .any(predicate))
    }
}

fn is_initiated_session(check: &FraudCheck) -> bool {
    matches!(
        check.result_content.as_ref().and_then(FraudCheckContent::as_identity),
        Some(IdentityContent::RemoteVendorVerification(content))
            if content.status == Some(IdentificationStatus::Initiated)
    )
}

