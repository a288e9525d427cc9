use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::{error, info};

use super::parser::{content_from_json, start_request_body};
use super::{
    DownloadedPicture, IdentificationError, IdentificationProvider, IdentificationRequest,
    ReferenceDataPolicy,
};
use crate::config::IdentificationConfig;
use crate::workflows::fraud::RemoteVerificationContent;

const JSON_API: &str = "application/vnd.api+json";

/// HTTP connector authenticated with the vendor's client credentials.
#[derive(Clone)]
pub struct IdentificationClient {
    client: reqwest::Client,
    config: IdentificationConfig,
}

impl IdentificationClient {
    pub fn new(config: IdentificationConfig) -> Result<Self, IdentificationError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_API));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_API));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| {
                error!(error = %err, "failed to build identification HTTP client");
                IdentificationError::ServiceUnavailable
            })?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn read_json(response: Response) -> Result<Value, IdentificationError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "identification service error");
            return Err(status_error(status));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| IdentificationError::InvalidPayload(err.to_string()))
    }
}

/// 410 and 429 mean the vendor refuses new work for now.
fn status_error(status: StatusCode) -> IdentificationError {
    match status {
        StatusCode::GONE | StatusCode::TOO_MANY_REQUESTS => IdentificationError::ServiceUnavailable,
        other => IdentificationError::ServiceError {
            status: other.as_u16(),
        },
    }
}

fn transport_error(err: reqwest::Error) -> IdentificationError {
    error!(error = %err, "request to identification service failed");
    IdentificationError::ServiceUnavailable
}

#[async_trait]
impl IdentificationProvider for IdentificationClient {
    async fn start_identification(
        &self,
        request: &IdentificationRequest,
    ) -> Result<RemoteVerificationContent, IdentificationError> {
        let body = start_request_body(request, &self.config.webhook_url);
        let response = self
            .client
            .post(self.url("/identifications/"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let payload = Self::read_json(response).await?;
        let content = content_from_json(payload, ReferenceDataPolicy::Strict)?;
        info!(
            user_id = %request.user_id,
            identification_id = content.identification_id.as_deref().unwrap_or_default(),
            "identification session started"
        );
        Ok(content)
    }

    async fn fetch_content(
        &self,
        identification_id: &str,
        policy: ReferenceDataPolicy,
    ) -> Result<RemoteVerificationContent, IdentificationError> {
        let response = self
            .client
            .get(self.url(&format!("/identifications/{identification_id}/")))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .send()
            .await
            .map_err(transport_error)?;

        let payload = Self::read_json(response).await?;
        content_from_json(payload, policy)
    }

    async fn download_picture(
        &self,
        url: &str,
    ) -> Result<Option<DownloadedPicture>, IdentificationError> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        if response.status() != StatusCode::OK {
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|err| IdentificationError::InvalidPayload(err.to_string()))?;

        Ok(Some(DownloadedPicture {
            content_type,
            bytes: bytes.to_vec(),
        }))
    }
}
