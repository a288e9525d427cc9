mod config;
mod policy;
mod providers;
mod rules;

pub use config::EvaluationConfig;
pub use policy::{aggregate, FraudVerdict, FRAUD_RESULT_REASON_SEPARATOR};
pub use rules::id_piece_number_format_item;

use chrono::NaiveDateTime;

use super::content::IdentityContent;
use super::domain::{FraudItem, User};
use super::repository::{FraudLookup, RepositoryError};
use crate::config::FeatureToggles;

/// Stateless evaluator choosing the rule set for an identity payload.
#[derive(Debug, Clone, Default)]
pub struct EvaluationEngine {
    config: EvaluationConfig,
}

impl EvaluationEngine {
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Runs the provider rules, then the identity rules shared by every provider.
    pub fn evaluate<L>(
        &self,
        lookup: &L,
        user: &User,
        content: &IdentityContent,
        toggles: &FeatureToggles,
        now: NaiveDateTime,
    ) -> Result<Vec<FraudItem>, RepositoryError>
    where
        L: FraudLookup + ?Sized,
    {
        let mut items = match content {
            IdentityContent::RemoteVendorVerification(content) => {
                providers::remote_verification_items(lookup, user, content)?
            }
            IdentityContent::DigitalIdentityFederation(content) => {
                providers::digital_identity_items(
                    lookup,
                    user,
                    content,
                    toggles,
                    &self.config,
                    now,
                )?
            }
            IdentityContent::ManualDocumentReview(content) => {
                providers::document_review_items(lookup, user, content)?
            }
            IdentityContent::DocumentFederation(content) => {
                providers::document_federation_items(lookup, user, content)?
            }
        };

        let eligibility = content.eligibility_type(&self.config, now);

        if let (Some(first_name), Some(last_name), Some(birth_date)) = (
            present(content.first_name()),
            present(content.last_name()),
            content.birth_date(),
        ) {
            items.push(rules::duplicate_user_item(
                lookup, first_name, last_name, birth_date, user.id,
            )?);
        }

        if content.birth_date().is_some() {
            items.push(rules::eligibility_upgrade_item(user, eligibility));
        }

        items.push(rules::no_active_deposit_item(user, eligibility, now));
        items.push(rules::email_validated_item(user));

        Ok(items)
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|name| !name.trim().is_empty())
}
