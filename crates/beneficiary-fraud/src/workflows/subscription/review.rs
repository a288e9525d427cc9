use tracing::{info, warn};

use super::messages::{NotificationPublisher, NotificationTemplate, SubscriptionNotification};
use super::service::{SubscriptionError, SubscriptionService};
use crate::workflows::fraud::{
    FraudCheckContent, FraudRepository, FraudReview, FraudReviewStatus, RepositoryError,
    SaveBatch, UserId,
};

const REDIRECTED_SUFFIX: &str = " ; Redirected to external review";
const REVIEW_ACTIVATION_SOURCE: &str = "fraud_validation";

impl<R, N> SubscriptionService<R, N>
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    /// Stores an admin's final decision on `user_id`. A user is reviewed at most once.
    ///
    /// An OK review activates the user from their latest identity check without
    /// re-running the subscription steps.
    pub fn review_user(
        &self,
        author_id: UserId,
        user_id: UserId,
        verdict: FraudReviewStatus,
        reason: &str,
    ) -> Result<FraudReview, SubscriptionError> {
        let author = self.load_user(author_id)?;
        if !author.is_admin() {
            return Err(SubscriptionError::ReviewerNotAdmin(author_id));
        }

        let user = self.load_user(user_id)?;
        if self.fraud().repository().fraud_review(user_id)?.is_some() {
            return Err(SubscriptionError::FraudReviewAlreadyExists(user_id));
        }

        let latest_identity = if verdict == FraudReviewStatus::Ok {
            let check = self.fraud().latest_identity_check(user_id)?;
            let now = self.now();
            let identity = check
                .as_ref()
                .and_then(|check| check.result_content.as_ref())
                .and_then(FraudCheckContent::as_identity)
                .cloned();
            let eligibility = check
                .as_ref()
                .and_then(|check| check.eligibility_type)
                .or_else(|| {
                    identity
                        .as_ref()
                        .and_then(|content| content.eligibility_type(self.fraud().config(), now))
                })
                .ok_or(SubscriptionError::NotEligible(user_id))?;
            Some((identity, eligibility))
        } else {
            None
        };

        let mut reason = reason.to_string();
        if verdict == FraudReviewStatus::RedirectedToExternalReview {
            reason.push_str(REDIRECTED_SUFFIX);
        }
        let review = FraudReview {
            user_id,
            author_id,
            review: verdict,
            reason,
            date_reviewed: self.now(),
        };
        // The review and the activation it grants are stored together.
        let mut batch = SaveBatch::new().fraud_review(review.clone());
        let mut activated = None;
        if let Some((identity, eligibility)) = latest_identity {
            let mut user = user;
            if let Some(identity) = identity {
                if let Some(first_name) = identity.first_name() {
                    user.first_name = Some(first_name.to_string());
                }
                if let Some(last_name) = identity.last_name() {
                    user.last_name = Some(last_name.to_string());
                }
                if let Some(birth_date) = identity.birth_date() {
                    user.date_of_birth = Some(birth_date);
                }
                if let Some(number) = identity.id_piece_number() {
                    user.id_piece_number = Some(number.to_string());
                }
            }

            match self.upgrade_to_beneficiary(user, eligibility, REVIEW_ACTIVATION_SOURCE) {
                Ok(user) => {
                    batch = batch.user(user.clone());
                    activated = Some(user);
                }
                Err(SubscriptionError::CannotUpgradeBeneficiaryRole(user_id)) => {
                    warn!(user_id = %user_id, "reviewed user already holds the beneficiary role");
                }
                Err(other) => return Err(other),
            }
        }

        match self.save(batch) {
            Ok(()) => {}
            Err(SubscriptionError::Repository(RepositoryError::Conflict(conflict))) => {
                if self.fraud().repository().fraud_review(user_id)?.is_some() {
                    return Err(SubscriptionError::FraudReviewAlreadyExists(user_id));
                }
                return Err(RepositoryError::Conflict(conflict).into());
            }
            Err(other) => return Err(other),
        }
        info!(
            user_id = %user_id,
            author_id = %author_id,
            review = ?verdict,
            "fraud review recorded"
        );

        match verdict {
            FraudReviewStatus::Ok => {
                if let Some(user) = activated {
                    self.announce_activation(&user, REVIEW_ACTIVATION_SOURCE);
                }
            }
            FraudReviewStatus::RedirectedToExternalReview => self.notify(
                SubscriptionNotification::new(
                    NotificationTemplate::RedirectedToExternalReview,
                    user_id,
                ),
            ),
            FraudReviewStatus::Ko => self.notify(SubscriptionNotification::new(
                NotificationTemplate::FraudReviewKo,
                user_id,
            )),
        }

        Ok(review)
    }
}
