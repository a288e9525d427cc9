use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};

use super::{IdentificationError, IdentificationRequest, ReferenceDataPolicy};
use crate::workflows::fraud::{IdentificationStatus, RemoteVerificationContent, VerificationScore};

const DOCUMENTS: &str = "documents";
const DOCUMENT_CHECKS: &str = "document-checks";
const FACE_CHECKS: &str = "face-checks";
const DOC_FACE_MATCHES: &str = "doc-face-matches";
const REFERENCE_DATA_CHECKS: &str = "reference-data-checks";

#[derive(Debug, Deserialize)]
struct IdentificationResponse {
    data: ResponseData,
    #[serde(default)]
    included: Vec<IncludedResource>,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    #[serde(default)]
    attributes: DataAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DataAttributes {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    identification_id: Option<String>,
    #[serde(default)]
    identification_url: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncludedResource {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Map<String, Value>,
}

impl IdentificationResponse {
    fn included(&self, kind: &str) -> Option<&Map<String, Value>> {
        self.included
            .iter()
            .find(|resource| resource.kind == kind)
            .map(|resource| &resource.attributes)
    }

    /// Recomputes the global score without the reference-data comparison.
    ///
    /// Sub-score priority is undecidable, then invalid, then valid.
    fn discard_reference_data_error(&mut self) {
        let reference_invalid = self
            .included(REFERENCE_DATA_CHECKS)
            .and_then(|attributes| number(attributes, "score"))
            .and_then(VerificationScore::from_value)
            == Some(VerificationScore::Invalid);
        if !reference_invalid {
            return;
        }

        let sub_scores: Vec<VerificationScore> = [DOCUMENT_CHECKS, FACE_CHECKS, DOC_FACE_MATCHES]
            .into_iter()
            .filter_map(|kind| self.included(kind))
            .flat_map(|attributes| attributes.values())
            .filter_map(Value::as_f64)
            .filter_map(|value| VerificationScore::from_value(value.trunc()))
            .collect();

        let recomputed = [
            VerificationScore::Undecidable,
            VerificationScore::Invalid,
            VerificationScore::Valid,
        ]
        .into_iter()
        .find(|candidate| sub_scores.contains(candidate));

        if let Some(score) = recomputed {
            self.data.attributes.score = Some(score.value());
        }
    }

    fn to_content(&self) -> RemoteVerificationContent {
        let documents = self.included(DOCUMENTS);
        let document_checks = self.included(DOCUMENT_CHECKS);
        let text_field = |key: &str| documents.and_then(|attributes| text(attributes, key));

        RemoteVerificationContent {
            status: self
                .data
                .attributes
                .status
                .as_deref()
                .and_then(IdentificationStatus::parse),
            birth_date: documents
                .and_then(|attributes| text(attributes, "birth-date"))
                .and_then(|value| NaiveDate::parse_from_str(&value, "%Y-%m-%d").ok()),
            first_name: text_field("first-name"),
            last_name: text_field("last-name"),
            document_type: text_field("document-type"),
            id_document_number: text_field("document-number"),
            score: self.data.attributes.score,
            comment: self.data.attributes.comment.clone(),
            expiry_date_score: document_checks
                .and_then(|attributes| number(attributes, "expiry-date-score")),
            supported: document_checks.and_then(|attributes| number(attributes, "supported")),
            identification_id: self.data.attributes.identification_id.clone(),
            identification_url: self.data.attributes.identification_url.clone(),
            registration_datetime: self
                .data
                .attributes
                .created_at
                .as_deref()
                .and_then(parse_datetime),
            signed_image_front_url: text_field("signed-image-front-url"),
            signed_image_back_url: text_field("signed-image-back-url"),
        }
    }
}

/// Normalizes a vendor identification document.
pub fn content_from_json(
    payload: Value,
    policy: ReferenceDataPolicy,
) -> Result<RemoteVerificationContent, IdentificationError> {
    let mut response: IdentificationResponse = serde_json::from_value(payload)
        .map_err(|err| IdentificationError::InvalidPayload(err.to_string()))?;

    if policy == ReferenceDataPolicy::DiscardInvalidReferenceData {
        response.discard_reference_data_error();
    }

    Ok(response.to_content())
}

/// Body of the session creation request.
pub fn start_request_body(request: &IdentificationRequest, webhook_url: &str) -> Value {
    json!({
        "data": {
            "type": "identifications",
            "attributes": {
                "identification-form": {
                    "external-user-id": request.user_id.0,
                    "phone-number": request.phone_number,
                },
                "reference-data": {
                    "birth-date": request.birth_date.format("%Y-%m-%d").to_string(),
                    "first-name": request.first_name,
                    "last-name": request.last_name,
                },
                "webhook": webhook_url,
                "redirect_url": request.redirect_url,
            }
        }
    })
}

fn text(attributes: &Map<String, Value>, key: &str) -> Option<String> {
    match attributes.get(key)? {
        Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn number(attributes: &Map<String, Value>, key: &str) -> Option<f64> {
    attributes.get(key).and_then(Value::as_f64)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(value)) => Some(value),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    })
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f").ok()
}
