//! Connector for the remote identity verification vendor.
//!
//! The vendor speaks JSON:API. Responses are normalized into
//! [`RemoteVerificationContent`] before anything else in the crate sees them.

mod client;
mod mapping;
mod parser;


pub use client::IdentificationClient;
pub use mapping::{picture_file_name, DocumentFace};
pub use parser::{content_from_json, start_request_body};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::fraud::{RemoteVerificationContent, UserId};

/// How an invalid reference-data sub-score is treated when reading a result.
///
/// The vendor compares the declared identity with the document. Some callers
/// re-read a result ignoring that comparison; the global score is then recomputed
/// from the remaining sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceDataPolicy {
    #[default]
    Strict,
    DiscardInvalidReferenceData,
}

/// Identity declared by the user when opening a vendor session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentificationRequest {
    pub user_id: UserId,
    pub phone_number: String,
    pub birth_date: NaiveDate,
    pub first_name: String,
    pub last_name: String,
    pub redirect_url: String,
}

/// Raw picture returned by a signed document URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedPicture {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait IdentificationProvider: Send + Sync {
    async fn start_identification(
        &self,
        request: &IdentificationRequest,
    ) -> Result<RemoteVerificationContent, IdentificationError>;

    async fn fetch_content(
        &self,
        identification_id: &str,
        policy: ReferenceDataPolicy,
    ) -> Result<RemoteVerificationContent, IdentificationError>;

    /// `Ok(None)` when the signed URL answers anything but 200.
    async fn download_picture(
        &self,
        url: &str,
    ) -> Result<Option<DownloadedPicture>, IdentificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum IdentificationError {
    #[error("identification service is unavailable")]
    ServiceUnavailable,
    #[error("identification service answered with status {status}")]
    ServiceError { status: u16 },
    #[error("identification response could not be read: {0}")]
    InvalidPayload(String),
}

impl IdentificationError {
    /// Errors worth retrying later from the user's point of view.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceUnavailable)
    }
}
