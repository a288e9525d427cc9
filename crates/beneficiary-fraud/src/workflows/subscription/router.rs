use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::messages::NotificationPublisher;
use super::phone::{PhoneFraudFailure, PhoneValidationError};
use super::remote::IdentificationWebhook;
use super::service::{SubscriptionError, SubscriptionService};
use crate::workflows::fraud::{
    FraudCheckError, FraudRepository, FraudReviewStatus, ProfilingContent, RepositoryError,
    UserId,
};
use crate::workflows::identification::IdentificationError;

const HONOR_STATEMENT_ORIGIN: &str = "statement from /subscription/honor-statement endpoint";

#[derive(Debug, Deserialize)]
pub(crate) struct StartIdentificationBody {
    redirect_url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewBody {
    author_id: UserId,
    review: FraudReviewStatus,
    reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReprocessBody {
    author_id: UserId,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SendCodeBody {
    phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidateCodeBody {
    code: String,
}

/// Router builder exposing the subscription journey and the vendor webhook.
pub fn subscription_router<R, N>(service: Arc<SubscriptionService<R, N>>) -> Router
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route(
            "/webhooks/identification",
            post(identification_webhook_handler::<R, N>),
        )
        .route(
            "/api/v1/identifications/:identification_id/reprocess",
            post(reprocess_identification_handler::<R, N>),
        )
        .route(
            "/api/v1/subscription/:user_id/identification",
            post(start_identification_handler::<R, N>),
        )
        .route(
            "/api/v1/subscription/:user_id/honor-statement",
            post(honor_statement_handler::<R, N>),
        )
        .route(
            "/api/v1/subscription/:user_id/next-steps",
            get(next_steps_handler::<R, N>),
        )
        .route(
            "/api/v1/subscription/:user_id/profiling",
            post(profiling_handler::<R, N>),
        )
        .route(
            "/api/v1/subscription/:user_id/review",
            post(review_handler::<R, N>),
        )
        .route(
            "/api/v1/subscription/:user_id/phone/send-code",
            post(send_code_handler::<R, N>),
        )
        .route(
            "/api/v1/subscription/:user_id/phone/validate",
            post(validate_code_handler::<R, N>),
        )
        .with_state(service)
}

pub(crate) async fn identification_webhook_handler<R, N>(
    State(service): State<Arc<SubscriptionService<R, N>>>,
    axum::Json(webhook): axum::Json<IdentificationWebhook>,
) -> Response
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.handle_identification_webhook(webhook).await {
        Ok(()) => (StatusCode::OK, axum::Json(json!({ "status": "ok" }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reprocess_identification_handler<R, N>(
    State(service): State<Arc<SubscriptionService<R, N>>>,
    Path(identification_id): Path<String>,
    axum::Json(body): axum::Json<ReprocessBody>,
) -> Response
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service
        .rerun_identification_without_reference_data(body.author_id, &identification_id)
        .await
    {
        Ok(()) => (StatusCode::OK, axum::Json(json!({ "status": "ok" }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn start_identification_handler<R, N>(
    State(service): State<Arc<SubscriptionService<R, N>>>,
    Path(user_id): Path<u64>,
    axum::Json(body): axum::Json<StartIdentificationBody>,
) -> Response
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service
        .start_identification_workflow(UserId(user_id), &body.redirect_url)
        .await
    {
        Ok(identification_url) => (
            StatusCode::OK,
            axum::Json(json!({ "identification_url": identification_url })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn honor_statement_handler<R, N>(
    State(service): State<Arc<SubscriptionService<R, N>>>,
    Path(user_id): Path<u64>,
) -> Response
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.record_honor_statement(UserId(user_id), HONOR_STATEMENT_ORIGIN) {
        Ok(activated) => (
            StatusCode::OK,
            axum::Json(json!({ "activated": activated.is_some() })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn next_steps_handler<R, N>(
    State(service): State<Arc<SubscriptionService<R, N>>>,
    Path(user_id): Path<u64>,
) -> Response
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.subscription_progress(UserId(user_id)) {
        Ok(progress) => (StatusCode::OK, axum::Json(progress)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn profiling_handler<R, N>(
    State(service): State<Arc<SubscriptionService<R, N>>>,
    Path(user_id): Path<u64>,
    axum::Json(content): axum::Json<ProfilingContent>,
) -> Response
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.on_user_profiling_result(UserId(user_id), content) {
        Ok(check) => (
            StatusCode::OK,
            axum::Json(json!({ "status": check.status.label() })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn review_handler<R, N>(
    State(service): State<Arc<SubscriptionService<R, N>>>,
    Path(user_id): Path<u64>,
    axum::Json(body): axum::Json<ReviewBody>,
) -> Response
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.review_user(body.author_id, UserId(user_id), body.review, &body.reason) {
        Ok(review) => (StatusCode::CREATED, axum::Json(review)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn send_code_handler<R, N>(
    State(service): State<Arc<SubscriptionService<R, N>>>,
    Path(user_id): Path<u64>,
    axum::Json(body): axum::Json<SendCodeBody>,
) -> Response
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.send_phone_validation_code(UserId(user_id), body.phone_number.as_deref()) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn validate_code_handler<R, N>(
    State(service): State<Arc<SubscriptionService<R, N>>>,
    Path(user_id): Path<u64>,
    axum::Json(body): axum::Json<ValidateCodeBody>,
) -> Response
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.validate_phone_number_and_activate_user(UserId(user_id), &body.code) {
        Ok(activated) => (
            StatusCode::OK,
            axum::Json(json!({ "activated": activated.is_some() })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: SubscriptionError) -> Response {
    let status = status_for(&err);
    let message = match &err {
        SubscriptionError::Identification(IdentificationError::ServiceUnavailable) => {
            "identification service is unavailable, please try again later".to_string()
        }
        SubscriptionError::Identification(_) => {
            "identification service error, please try again later".to_string()
        }
        other => other.to_string(),
    };

    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "subscription request failed");
    }

    let payload = json!({
        "error": message,
    });
    (status, axum::Json(payload)).into_response()
}

fn status_for(err: &SubscriptionError) -> StatusCode {
    match err {
        SubscriptionError::Identification(IdentificationError::ServiceUnavailable) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SubscriptionError::Identification(_) => StatusCode::BAD_GATEWAY,
        SubscriptionError::UnknownIdentification(_)
        | SubscriptionError::Repository(RepositoryError::NotFound)
        | SubscriptionError::FraudCheck(FraudCheckError::Repository(RepositoryError::NotFound)) => {
            StatusCode::NOT_FOUND
        }
        SubscriptionError::ReviewerNotAdmin(_) => StatusCode::FORBIDDEN,
        SubscriptionError::FraudReviewAlreadyExists(_)
        | SubscriptionError::CannotUpgradeBeneficiaryRole(_)
        | SubscriptionError::FraudCheck(FraudCheckError::ApplicationAlreadyStarted { .. }) => {
            StatusCode::CONFLICT
        }
        SubscriptionError::NotEligible(_) | SubscriptionError::MissingIdentityData(_) => {
            StatusCode::BAD_REQUEST
        }
        SubscriptionError::Phone(phone) => match phone {
            PhoneValidationError::Fraud(
                PhoneFraudFailure::SmsSendingLimitReached
                | PhoneFraudFailure::AttemptsLimitReached { .. },
            ) => StatusCode::TOO_MANY_REQUESTS,
            PhoneValidationError::SendingFailed(_) => StatusCode::BAD_GATEWAY,
            PhoneValidationError::Counter(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
