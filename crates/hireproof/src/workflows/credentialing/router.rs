use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{ApplicationId, CandidateRef, JobSpec};
use super::orchestrator::{NextAction, PipelineError};
use super::review::ReviewSink;
use super::service::{CredentialService, CredentialStatusView};
use super::signer::{PassportView, SignedPassport};
use super::store::{DocumentStore, StoreError};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub candidate: CandidateRef,
    pub job: JobSpec,
}

#[derive(Debug, Serialize)]
pub struct PipelineResponse {
    pub credential: CredentialStatusView,
    pub next_action: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct TestSubmission {
    pub score: f64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub view: PassportView,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

fn action_label(action: NextAction) -> &'static str {
    match action {
        NextAction::Continue => "continue",
        NextAction::PauseForTest => "pause_for_test",
        NextAction::PauseForReview => "pause_for_review",
        NextAction::HaltRejected => "halt_rejected",
        NextAction::Done => "done",
    }
}

struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::NotFound | PipelineError::Store(StoreError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            PipelineError::Store(StoreError::AlreadyExists | StoreError::Conflict { .. })
            | PipelineError::TestNotPending(_)
            | PipelineError::TestAlreadySubmitted
            | PipelineError::NoPendingReview
            | PipelineError::ReviewStillPending
            | PipelineError::NotSigned
            | PipelineError::NotSupersedable => StatusCode::CONFLICT,
            PipelineError::FraudCheckUnavailable(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Store(StoreError::Unavailable(_))
            | PipelineError::Review(_)
            | PipelineError::Signing(_)
            | PipelineError::Archive(_)
            | PipelineError::MissingEvidence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// `/api/v1` routes for the credentialing pipeline, generic over the storage
/// and review backends so tests can run entirely in memory.
pub fn credential_routes<S, Q>() -> Router<Arc<CredentialService<S, Q>>>
where
    S: DocumentStore + 'static,
    Q: ReviewSink + 'static,
{
    Router::new()
        .route("/credentials", post(register::<S, Q>))
        .route("/credentials/:id", get(status::<S, Q>))
        .route("/credentials/:id/advance", post(advance::<S, Q>))
        .route("/credentials/:id/test", post(submit_test::<S, Q>))
        .route("/credentials/:id/review/resume", post(resume::<S, Q>))
        .route("/credentials/:id/supersede", post(supersede::<S, Q>))
        .route("/credentials/:id/passport", get(passport::<S, Q>))
        .route("/passports/verify", post(verify::<S, Q>))
}

/// Register and drive the pipeline until it pauses or finishes.
async fn register<S: DocumentStore + 'static, Q: ReviewSink + 'static>(
    State(service): State<Arc<CredentialService<S, Q>>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PipelineResponse>), ApiError> {
    let document = service.register(request.candidate, request.job)?;
    let (_, action) = service.run(&document.application_id).await?;
    let credential = service.status(&document.application_id)?;
    Ok((
        StatusCode::CREATED,
        Json(PipelineResponse {
            credential,
            next_action: action_label(action),
        }),
    ))
}

async fn status<S: DocumentStore + 'static, Q: ReviewSink + 'static>(
    State(service): State<Arc<CredentialService<S, Q>>>,
    Path(id): Path<String>,
) -> Result<Json<CredentialStatusView>, ApiError> {
    Ok(Json(service.status(&ApplicationId(id))?))
}

async fn advance<S: DocumentStore + 'static, Q: ReviewSink + 'static>(
    State(service): State<Arc<CredentialService<S, Q>>>,
    Path(id): Path<String>,
) -> Result<Json<PipelineResponse>, ApiError> {
    let id = ApplicationId(id);
    let (_, action) = service.advance(&id).await?;
    Ok(Json(PipelineResponse {
        credential: service.status(&id)?,
        next_action: action_label(action),
    }))
}

/// Record a test score, then drive the pipeline to its next pause point.
async fn submit_test<S: DocumentStore + 'static, Q: ReviewSink + 'static>(
    State(service): State<Arc<CredentialService<S, Q>>>,
    Path(id): Path<String>,
    Json(submission): Json<TestSubmission>,
) -> Result<Json<PipelineResponse>, ApiError> {
    let id = ApplicationId(id);
    service.submit_test_result(&id, submission.score)?;
    let (_, action) = service.run(&id).await?;
    Ok(Json(PipelineResponse {
        credential: service.status(&id)?,
        next_action: action_label(action),
    }))
}

async fn resume<S: DocumentStore + 'static, Q: ReviewSink + 'static>(
    State(service): State<Arc<CredentialService<S, Q>>>,
    Path(id): Path<String>,
) -> Result<Json<PipelineResponse>, ApiError> {
    let id = ApplicationId(id);
    service.resume_after_review(&id)?;
    let (_, action) = service.run(&id).await?;
    Ok(Json(PipelineResponse {
        credential: service.status(&id)?,
        next_action: action_label(action),
    }))
}

async fn supersede<S: DocumentStore + 'static, Q: ReviewSink + 'static>(
    State(service): State<Arc<CredentialService<S, Q>>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CredentialStatusView>), ApiError> {
    let replacement = service.supersede(&ApplicationId(id))?;
    let credential = service.status(&replacement.application_id)?;
    Ok((StatusCode::CREATED, Json(credential)))
}

async fn passport<S: DocumentStore + 'static, Q: ReviewSink + 'static>(
    State(service): State<Arc<CredentialService<S, Q>>>,
    Path(id): Path<String>,
) -> Result<Json<SignedPassport>, ApiError> {
    Ok(Json(service.passport(&ApplicationId(id))?))
}

async fn verify<S: DocumentStore + 'static, Q: ReviewSink + 'static>(
    State(service): State<Arc<CredentialService<S, Q>>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    Ok(Json(VerifyResponse {
        valid: service.verify(&request.view, &request.signature),
    }))
}
