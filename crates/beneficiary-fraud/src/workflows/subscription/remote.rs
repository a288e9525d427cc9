//! Remote identity verification journey: session start, vendor callbacks and picture archival.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::messages::{NotificationPublisher, NotificationTemplate, SubscriptionNotification};
use super::service::{SubscriptionError, SubscriptionService};
use super::tasks::{BackgroundTask, TaskError, TaskHandler};
use crate::workflows::fraud::{
    FraudCheck, FraudCheckContent, FraudCheckError, FraudCheckStatus, FraudCheckType,
    FraudRepository, IdentificationStatus, IdentityContent, SaveBatch, UserId,
};
use crate::workflows::identification::{
    picture_file_name, DocumentFace, IdentificationError, IdentificationRequest,
    ReferenceDataPolicy,
};

/// Status notification posted by the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentificationWebhook {
    pub identification_id: String,
    pub status: String,
}

impl<R, N> SubscriptionService<R, N>
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    /// Opens a vendor session and returns the URL the user must visit.
    pub async fn start_identification_workflow(
        &self,
        user_id: UserId,
        redirect_url: &str,
    ) -> Result<String, SubscriptionError> {
        let user = self.load_user(user_id)?;
        let (Some(first_name), Some(last_name), Some(birth_date)) = (
            user.first_name.clone(),
            user.last_name.clone(),
            user.date_of_birth,
        ) else {
            return Err(SubscriptionError::MissingIdentityData(user_id));
        };

        let request = IdentificationRequest {
            user_id,
            phone_number: user.phone_number.clone().unwrap_or_default(),
            birth_date,
            first_name,
            last_name,
            redirect_url: redirect_url.to_string(),
        };
        let mut content = self
            .ports
            .identification
            .start_identification(&request)
            .await?;

        let identification_id = content.identification_id.clone().ok_or_else(|| {
            IdentificationError::InvalidPayload("missing identification id".to_string())
        })?;
        let identification_url = content.identification_url.clone().ok_or_else(|| {
            IdentificationError::InvalidPayload("missing identification url".to_string())
        })?;

        // The declared birth date drives the check's eligibility until the vendor answers.
        if content.birth_date.is_none() {
            content.birth_date = Some(birth_date);
        }
        self.fraud().start_session(
            &user,
            &identification_id,
            IdentityContent::RemoteVendorVerification(content),
        )?;

        Ok(identification_url)
    }

    /// Only sessions the user never started may be reopened.
    pub fn is_identification_restartable(&self, check: &FraudCheck) -> bool {
        if check.check_type != FraudCheckType::RemoteVendorVerification {
            return false;
        }

        matches!(
            check.result_content.as_ref().and_then(FraudCheckContent::as_identity),
            Some(IdentityContent::RemoteVendorVerification(content))
                if content.status == Some(IdentificationStatus::Initiated)
        )
    }

    pub async fn handle_identification_webhook(
        &self,
        webhook: IdentificationWebhook,
    ) -> Result<(), SubscriptionError> {
        let status = IdentificationStatus::parse(&webhook.status).ok_or_else(|| {
            IdentificationError::InvalidPayload(format!("unknown status {}", webhook.status))
        })?;
        let check = self
            .fraud()
            .find_by_third_party_id(
                FraudCheckType::RemoteVendorVerification,
                &webhook.identification_id,
            )?
            .ok_or_else(|| SubscriptionError::UnknownIdentification(webhook.identification_id))?;

        self.update_identification_workflow(check, status).await
    }

    /// Refreshes the vendor result stored on `check` and advances the journey for `status`.
    pub async fn update_identification_workflow(
        &self,
        check: FraudCheck,
        status: IdentificationStatus,
    ) -> Result<(), SubscriptionError> {
        self.refresh_identification(check, status, ReferenceDataPolicy::Strict)
            .await
    }

    /// Admin action re-reading a finished identification while ignoring the vendor's
    /// reference-data comparison, then processing it again.
    ///
    /// Used when the declared identity held a typo the document does not share.
    pub async fn rerun_identification_without_reference_data(
        &self,
        author_id: UserId,
        identification_id: &str,
    ) -> Result<(), SubscriptionError> {
        let author = self.load_user(author_id)?;
        if !author.is_admin() {
            return Err(SubscriptionError::ReviewerNotAdmin(author_id));
        }

        let check = self
            .fraud()
            .find_by_third_party_id(FraudCheckType::RemoteVendorVerification, identification_id)?
            .ok_or_else(|| {
                SubscriptionError::UnknownIdentification(identification_id.to_string())
            })?;
        info!(
            user_id = %check.user_id,
            author_id = %author_id,
            identification_id,
            "identification processed again without reference data"
        );
        self.refresh_identification(
            check,
            IdentificationStatus::Processed,
            ReferenceDataPolicy::DiscardInvalidReferenceData,
        )
        .await
    }

    async fn refresh_identification(
        &self,
        mut check: FraudCheck,
        status: IdentificationStatus,
        policy: ReferenceDataPolicy,
    ) -> Result<(), SubscriptionError> {
        let content = self
            .ports
            .identification
            .fetch_content(&check.third_party_id, policy)
            .await?;
        check.result_content = Some(IdentityContent::RemoteVendorVerification(content).into());
        self.save(SaveBatch::new().fraud_check(check.clone()))?;

        let user_id = check.user_id;
        match status {
            IdentificationStatus::Processing => {
                let mut user = self.load_user(user_id)?;
                user.has_completed_id_check = true;
                self.save(SaveBatch::new().user(user))?;
                self.notify(SubscriptionNotification::new(
                    NotificationTemplate::ReviewPending,
                    user_id,
                ));
            }
            IdentificationStatus::Processed => self.on_identification_processed(check)?,
            IdentificationStatus::Aborted => {
                check.status = FraudCheckStatus::Canceled;
                self.save(SaveBatch::new().fraud_check(check))?;
                info!(user_id = %user_id, "identification aborted by the user");
            }
            IdentificationStatus::Uninitiated | IdentificationStatus::Initiated => {
                info!(user_id = %user_id, "identification session not used yet");
            }
        }

        Ok(())
    }

    fn on_identification_processed(&self, check: FraudCheck) -> Result<(), SubscriptionError> {
        let user_id = check.user_id;
        let mut check = self.handle_eligibility_difference(check)?;
        let user = self.load_user(user_id)?;

        match self.fraud().on_identity_fraud_check_result(&user, &mut check) {
            Ok(_) => {}
            Err(FraudCheckError::BeneficiaryFraudResultCannotBeDowngraded(_)) => {
                warn!(
                    user_id = %user_id,
                    "Trying to downgrade a beneficiary that already has been considered OK"
                );
                return Ok(());
            }
            Err(err) => {
                error!(
                    user_id = %user_id,
                    error = %err,
                    "error on identification fraud check result"
                );
                return Err(err.into());
            }
        }

        if check.status != FraudCheckStatus::Ok {
            self.handle_validation_errors(user_id, &check.reason_codes);
            return Ok(());
        }

        let task = BackgroundTask::ArchiveIdPictures {
            identification_id: check.third_party_id.clone(),
        };
        if let Err(err) = self.ports.tasks.enqueue(task) {
            error!(user_id = %user_id, error = %err, "could not enqueue picture archival");
        }

        let Some(identity) = check
            .result_content
            .as_ref()
            .and_then(FraudCheckContent::as_identity)
        else {
            return Ok(());
        };
        match self.on_successful_application(user_id, identity, check.check_type.label()) {
            Ok(_) => info!(
                user_id = %user_id,
                third_party_id = %check.third_party_id,
                "identification application accepted"
            ),
            Err(err) => warn!(
                user_id = %user_id,
                third_party_id = %check.third_party_id,
                error = %err,
                "could not save application"
            ),
        }

        Ok(())
    }

    /// Copies the document pictures of a finished identification to storage.
    ///
    /// Returns whether pictures are stored. Running it again for an archived check is a no-op.
    pub async fn archive_id_pictures(
        &self,
        identification_id: &str,
    ) -> Result<bool, SubscriptionError> {
        let mut check = self
            .fraud()
            .find_by_third_party_id(FraudCheckType::RemoteVendorVerification, identification_id)?
            .ok_or_else(|| {
                SubscriptionError::UnknownIdentification(identification_id.to_string())
            })?;
        if check.id_pictures_stored {
            return Ok(true);
        }

        let content = self
            .ports
            .identification
            .fetch_content(identification_id, ReferenceDataPolicy::Strict)
            .await?;

        let faces = [
            (DocumentFace::Front, content.signed_image_front_url.as_deref()),
            (DocumentFace::Back, content.signed_image_back_url.as_deref()),
        ];
        let mut stored = 0;
        for (face, url) in faces {
            let Some(url) = url else { continue };
            let Some(picture) = self.ports.identification.download_picture(url).await? else {
                warn!(
                    user_id = %check.user_id,
                    face = face.label(),
                    "identity picture could not be downloaded"
                );
                continue;
            };

            let file_name = picture_file_name(
                check.user_id,
                identification_id,
                face,
                picture.content_type.as_deref(),
            );
            self.ports.pictures.store(&file_name, &picture)?;
            stored += 1;
        }

        check.id_pictures_stored = stored > 0;
        self.save(SaveBatch::new().fraud_check(check.clone()))?;
        info!(
            user_id = %check.user_id,
            fraud_check_id = %check.id,
            stored,
            "identity pictures archived"
        );
        Ok(check.id_pictures_stored)
    }
}

#[async_trait]
impl<R, N> TaskHandler for SubscriptionService<R, N>
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    async fn handle(&self, task: BackgroundTask) -> Result<(), TaskError> {
        let name = task.name();
        match task {
            BackgroundTask::ArchiveIdPictures { identification_id } => self
                .archive_id_pictures(&identification_id)
                .await
                .map(|_| ())
                .map_err(|err| TaskError::Failed {
                    task: name,
                    message: err.to_string(),
                }),
        }
    }
}
