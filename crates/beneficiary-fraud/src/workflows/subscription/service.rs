use std::sync::Arc;

use chrono::{Months, NaiveDateTime};
use tracing::{error, info, warn};

use super::messages::{
    NotificationPublisher, NotificationTemplate, SubscriptionNotification,
};
use super::phone::{AttemptCounter, CounterError, PhoneValidationError, SmsSender};
use super::steps::{SubscriptionProgress, SubscriptionState, SubscriptionStep};
use super::tasks::{PictureStorage, TaskError, TaskQueue};
use crate::config::{DepositSettings, PhoneValidationSettings};
use crate::workflows::fraud::store::next_fraud_check_id;
use crate::workflows::fraud::{
    Deposit, EligibilityType, FraudCheck, FraudCheckError, FraudCheckService, FraudCheckStatus,
    FraudCheckType, FraudReasonCode, FraudRepository, FraudReviewStatus, IdentityContent,
    PhoneValidationStatus, ProfilingContent, RepositoryError, SaveBatch, User, UserId, UserRole,
};
use crate::workflows::identification::{IdentificationError, IdentificationProvider};

const ELIGIBILITY_CHANGED_REASON: &str = "Eligibility type changed by the identity provider";

/// Outbound collaborators of the subscription journey.
#[derive(Clone)]
pub struct SubscriptionPorts {
    pub identification: Arc<dyn IdentificationProvider>,
    pub tasks: Arc<dyn TaskQueue>,
    pub pictures: Arc<dyn PictureStorage>,
    pub sms: Arc<dyn SmsSender>,
    pub counters: Arc<dyn AttemptCounter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSettings {
    pub deposits: DepositSettings,
    pub phone_validation: PhoneValidationSettings,
}

/// Drives a user from sign-up to an activated deposit.
pub struct SubscriptionService<R, N> {
    fraud: FraudCheckService<R>,
    notifications: Arc<N>,
    pub(super) ports: SubscriptionPorts,
    pub(super) settings: SubscriptionSettings,
}

impl<R, N> SubscriptionService<R, N>
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        fraud: FraudCheckService<R>,
        notifications: Arc<N>,
        ports: SubscriptionPorts,
        settings: SubscriptionSettings,
    ) -> Self {
        Self {
            fraud,
            notifications,
            ports,
            settings,
        }
    }

    pub fn fraud(&self) -> &FraudCheckService<R> {
        &self.fraud
    }

    pub(super) fn now(&self) -> NaiveDateTime {
        self.fraud.now()
    }

    pub(super) fn load_user(&self, user_id: UserId) -> Result<User, SubscriptionError> {
        Ok(self.fraud.load_user(user_id)?)
    }

    pub(super) fn save(&self, batch: SaveBatch) -> Result<(), SubscriptionError> {
        Ok(self.fraud.repository().save(batch)?)
    }

    fn current_eligibility(&self, user: &User) -> Option<EligibilityType> {
        user.eligibility_at(self.fraud.config(), self.now())
    }

    /// Steps the user still has to complete, in the order they are presented.
    pub fn steps_to_become_beneficiary(
        &self,
        user: &User,
    ) -> Result<Vec<SubscriptionStep>, SubscriptionError> {
        let toggles = self.fraud.toggles();
        let eligibility = self.current_eligibility(user);
        let mut steps = Vec::new();

        if !user.is_email_validated {
            steps.push(SubscriptionStep::EmailValidation);
        }

        if !user.is_phone_validated()
            && eligibility != Some(EligibilityType::Underage)
            && toggles.force_phone_validation
        {
            steps.push(SubscriptionStep::PhoneValidation);
        }

        if !self.fraud.has_ok_identity_check(user.id, eligibility)? {
            steps.push(SubscriptionStep::IdCheck);
        }

        if !self
            .fraud
            .has_performed_honor_statement(user.id, eligibility)?
        {
            if toggles.honor_statement_mandatory {
                steps.push(SubscriptionStep::HonorStatement);
            } else {
                warn!(user_id = %user.id, "The honor statement has not been performed or recorded");
            }
        }

        Ok(steps)
    }

    pub fn subscription_progress(
        &self,
        user_id: UserId,
    ) -> Result<SubscriptionProgress, SubscriptionError> {
        let user = self.load_user(user_id)?;

        if self.is_blocked(&user)? {
            return Ok(SubscriptionProgress {
                state: SubscriptionState::Blocked,
                missing_steps: Vec::new(),
            });
        }

        if user.is_beneficiary() && user.has_active_deposit(self.now()) {
            return Ok(SubscriptionProgress {
                state: SubscriptionState::ActiveBeneficiary,
                missing_steps: Vec::new(),
            });
        }

        let missing_steps = self.steps_to_become_beneficiary(&user)?;
        let state = if missing_steps.is_empty() {
            SubscriptionState::BeneficiaryCandidate
        } else if !user.is_phone_validated()
            && self
                .fraud
                .repository()
                .fraud_checks_for_user(user.id)?
                .is_empty()
        {
            SubscriptionState::Unstarted
        } else {
            SubscriptionState::PendingSteps
        };

        Ok(SubscriptionProgress {
            state,
            missing_steps,
        })
    }

    fn is_blocked(&self, user: &User) -> Result<bool, SubscriptionError> {
        if !user.is_active
            || user.phone_validation_status
                == PhoneValidationStatus::BlockedTooManyCodeVerificationTries
        {
            return Ok(true);
        }

        let review_ko = self
            .fraud
            .repository()
            .fraud_review(user.id)?
            .map(|review| review.review == FraudReviewStatus::Ko)
            .unwrap_or(false);
        if review_ko {
            return Ok(true);
        }

        Ok(self
            .fraud
            .latest_check_of_type(user.id, FraudCheckType::PhoneRiskProfiling)?
            .map(|check| check.status == FraudCheckStatus::Ko)
            .unwrap_or(false))
    }

    /// Grants the deposit and role matching `eligibility`.
    pub fn activate_beneficiary(
        &self,
        user: User,
        eligibility: EligibilityType,
        source: &str,
    ) -> Result<User, SubscriptionError> {
        let user = self.upgrade_to_beneficiary(user, eligibility, source)?;
        self.save(SaveBatch::new().user(user.clone()))?;
        self.announce_activation(&user, source);
        Ok(user)
    }

    /// Applies the role and deposit of `eligibility` to `user` without persisting it.
    pub(super) fn upgrade_to_beneficiary(
        &self,
        mut user: User,
        eligibility: EligibilityType,
        source: &str,
    ) -> Result<User, SubscriptionError> {
        if !user.is_eligible_for_beneficiary_upgrade(eligibility) {
            return Err(SubscriptionError::CannotUpgradeBeneficiaryRole(user.id));
        }

        let deposits = self.settings.deposits;
        let amount = match eligibility {
            EligibilityType::Age18 => deposits.age18_amount,
            EligibilityType::Underage => deposits.underage_amount,
        };
        let expiration_date = self
            .now()
            .checked_add_months(Months::new(deposits.validity_years * 12))
            .unwrap_or(NaiveDateTime::MAX);

        match eligibility {
            EligibilityType::Age18 => {
                user.roles.remove(&UserRole::UnderageBeneficiary);
                user.roles.insert(UserRole::Beneficiary);
            }
            EligibilityType::Underage => {
                user.roles.insert(UserRole::UnderageBeneficiary);
            }
        }
        user.deposit = Some(Deposit {
            amount,
            eligibility,
            source: source.to_string(),
            expiration_date,
        });
        Ok(user)
    }

    /// Logs and notifies an activation that has been persisted.
    pub(super) fn announce_activation(&self, user: &User, source: &str) {
        let Some(deposit) = user.deposit.as_ref() else {
            return;
        };
        info!(
            user_id = %user.id,
            eligibility = deposit.eligibility.label(),
            amount = deposit.amount,
            source,
            "beneficiary activated"
        );
        self.notify(
            SubscriptionNotification::new(NotificationTemplate::BeneficiaryActivated, user.id)
                .with_detail("amount", deposit.amount.to_string())
                .with_detail("eligibility", deposit.eligibility.label()),
        );
    }

    /// Activates the user once no step is missing. `Ok(None)` when nothing happened.
    pub fn activate_if_possible(
        &self,
        user_id: UserId,
        source: &str,
    ) -> Result<Option<User>, SubscriptionError> {
        let user = self.load_user(user_id)?;
        let steps = self.steps_to_become_beneficiary(&user)?;
        if !steps.is_empty() {
            info!(
                user_id = %user_id,
                missing_steps = steps.len(),
                "user cannot be activated yet"
            );
            return Ok(None);
        }

        let Some(eligibility) = self.current_eligibility(&user) else {
            info!(user_id = %user_id, "user is not eligible, activation skipped");
            return Ok(None);
        };

        match self.activate_beneficiary(user, eligibility, source) {
            Ok(user) => Ok(Some(user)),
            Err(SubscriptionError::CannotUpgradeBeneficiaryRole(user_id)) => {
                warn!(user_id = %user_id, "user already holds the beneficiary role");
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    /// Copies the verified identity onto the user, then activates when possible.
    pub fn on_successful_application(
        &self,
        user_id: UserId,
        content: &IdentityContent,
        source: &str,
    ) -> Result<Option<User>, SubscriptionError> {
        let mut user = self.load_user(user_id)?;
        if let Some(first_name) = content.first_name() {
            user.first_name = Some(first_name.to_string());
        }
        if let Some(last_name) = content.last_name() {
            user.last_name = Some(last_name.to_string());
        }
        if let Some(birth_date) = content.birth_date() {
            user.date_of_birth = Some(birth_date);
        }
        if let Some(number) = content.id_piece_number() {
            user.id_piece_number = Some(number.to_string());
        }
        if let IdentityContent::DigitalIdentityFederation(federation) = content {
            user.ine_hash = Some(federation.ine_hash.clone());
        }
        user.has_completed_id_check = true;
        self.save(SaveBatch::new().user(user))?;

        self.activate_if_possible(user_id, source)
    }

    /// Replaces `check` when the provider computed another eligibility than the declared one.
    ///
    /// The replaced check is renamed with a `deprecated-` prefix and CANCELED; the returned
    /// replacement is PENDING under the original third party id. A check already at OK is
    /// returned untouched.
    pub fn handle_eligibility_difference(
        &self,
        check: FraudCheck,
    ) -> Result<FraudCheck, SubscriptionError> {
        let now = self.now();
        let detected = check
            .result_content
            .as_ref()
            .and_then(|content| content.as_identity())
            .and_then(|identity| identity.eligibility_type(self.fraud.config(), now));

        if detected.is_none() || detected == check.eligibility_type {
            return Ok(check);
        }
        if check.status == FraudCheckStatus::Ok {
            warn!(
                user_id = %check.user_id,
                fraud_check_id = %check.id,
                "eligibility differs on a check already considered OK, keeping it"
            );
            return Ok(check);
        }

        let replacement = FraudCheck {
            id: next_fraud_check_id(),
            user_id: check.user_id,
            check_type: check.check_type,
            third_party_id: check.third_party_id.clone(),
            status: FraudCheckStatus::Pending,
            eligibility_type: detected,
            result_content: check.result_content.clone(),
            reason: None,
            reason_codes: Vec::new(),
            date_created: now,
            id_pictures_stored: check.id_pictures_stored,
        };

        let mut deprecated = check;
        deprecated.third_party_id = format!("deprecated-{}", deprecated.third_party_id);
        deprecated.status = FraudCheckStatus::Canceled;
        deprecated.reason = Some(ELIGIBILITY_CHANGED_REASON.to_string());

        self.save(
            SaveBatch::new()
                .fraud_check(deprecated.clone())
                .fraud_check(replacement.clone()),
        )?;
        info!(
            user_id = %replacement.user_id,
            fraud_check_id = %replacement.id,
            deprecated_fraud_check_id = %deprecated.id,
            "eligibility changed by the identity provider"
        );
        Ok(replacement)
    }

    /// Records the honor statement, then activates when it was the last missing step.
    pub fn record_honor_statement(
        &self,
        user_id: UserId,
        origin: &str,
    ) -> Result<Option<User>, SubscriptionError> {
        let user = self.load_user(user_id)?;
        self.fraud.create_honor_statement(&user, origin, None)?;
        self.activate_if_possible(user_id, FraudCheckType::HonorStatement.label())
    }

    /// Stores the profiling result and stops the journey on a non-OK rating.
    pub fn on_user_profiling_result(
        &self,
        user_id: UserId,
        content: ProfilingContent,
    ) -> Result<FraudCheck, SubscriptionError> {
        let user = self.load_user(user_id)?;
        let check = self.fraud.on_user_profiling_result(&user, content)?;
        if check.status != FraudCheckStatus::Ok {
            let notification = SubscriptionNotification::new(
                NotificationTemplate::ProfilingJourneyStopped,
                user_id,
            );
            self.notify(notification.with_detail("status", check.status.label()));
        }
        Ok(check)
    }

    /// One message per distinct reason, then the journey-stopped message.
    pub fn handle_validation_errors(&self, user_id: UserId, reason_codes: &[FraudReasonCode]) {
        let mut templates: Vec<NotificationTemplate> = Vec::new();
        for template in reason_codes
            .iter()
            .filter_map(|code| NotificationTemplate::for_reason_code(*code))
        {
            if !templates.contains(&template) {
                templates.push(template);
            }
        }

        for template in templates {
            self.notify(SubscriptionNotification::new(template, user_id));
        }
        self.notify(SubscriptionNotification::new(
            NotificationTemplate::JourneyCannotContinue,
            user_id,
        ));
    }

    pub(super) fn notify(&self, notification: SubscriptionNotification) {
        let template = notification.template.label();
        let user_id = notification.user_id;
        if let Err(err) = self.notifications.publish(notification) {
            error!(user_id = %user_id, template, error = %err, "failed to publish notification");
        }
    }
}

/// Error raised by the subscription workflow.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("user {0} already holds an equal or higher beneficiary role")]
    CannotUpgradeBeneficiaryRole(UserId),
    #[error("user {0} is not eligible to become a beneficiary")]
    NotEligible(UserId),
    #[error("user {0} has already been reviewed")]
    FraudReviewAlreadyExists(UserId),
    #[error("user {0} is not allowed to review beneficiaries")]
    ReviewerNotAdmin(UserId),
    #[error("no identification check matches {0}")]
    UnknownIdentification(String),
    #[error("user {0} has no declared identity to verify")]
    MissingIdentityData(UserId),
    #[error(transparent)]
    FraudCheck(#[from] FraudCheckError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Identification(#[from] IdentificationError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Phone(#[from] PhoneValidationError),
}

impl From<CounterError> for SubscriptionError {
    fn from(value: CounterError) -> Self {
        Self::Phone(PhoneValidationError::Counter(value))
    }
}
