//! Submission endpoints

use crate::coordinator::SubmitResponse;
use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use epiphany_core::models::{
    CropRequest, EditOperation, EnhanceRequest, GenerateImageRequest, GenerateVideoRequest,
    ImageUrlRequest, ResizeRequest, Submission, UpscaleRequest,
};
use epiphany_core::prompt::{enhance, EnhancedPrompt};
use epiphany_core::AppError;
use serde_json::Value;
use std::sync::Arc;
use validator::Validate;

#[tracing::instrument(skip(body))]
pub async fn enhance_prompt(
    ValidatedJson(body): ValidatedJson<EnhanceRequest>,
) -> Result<Json<EnhancedPrompt>, HttpAppError> {
    body.validate()?;
    Ok(Json(enhance(&body.prompt)))
}

#[tracing::instrument(skip(state, body))]
pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<GenerateImageRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), HttpAppError> {
    let submission = Submission::generate_image(&body, state.coordinator.allowlist())?;
    let response = state.coordinator.submit(submission).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

#[tracing::instrument(skip(state, body))]
pub async fn generate_video(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<GenerateVideoRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), HttpAppError> {
    let submission = Submission::generate_video(&body, state.coordinator.allowlist())?;
    let response = state.coordinator.submit(submission).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// `POST /v1/edit/{operation}`; the body shape depends on the operation
#[tracing::instrument(skip(state, body))]
pub async fn edit(
    State(state): State<Arc<AppState>>,
    Path(operation): Path<String>,
    ValidatedJson(body): ValidatedJson<Value>,
) -> Result<(StatusCode, Json<SubmitResponse>), HttpAppError> {
    let operation: EditOperation = operation
        .parse()
        .map_err(|_| AppError::NotFound(format!("Unknown edit operation: {}", operation)))?;
    let allowlist = state.coordinator.allowlist();

    let submission = match operation {
        EditOperation::Upscale => {
            Submission::edit(operation, &serde_json::from_value::<UpscaleRequest>(body)?, allowlist)?
        }
        EditOperation::RestoreFace | EditOperation::RemoveBg | EditOperation::Caption => {
            Submission::edit(operation, &serde_json::from_value::<ImageUrlRequest>(body)?, allowlist)?
        }
        EditOperation::Crop => {
            Submission::edit(operation, &serde_json::from_value::<CropRequest>(body)?, allowlist)?
        }
        EditOperation::Resize => {
            Submission::edit(operation, &serde_json::from_value::<ResizeRequest>(body)?, allowlist)?
        }
    };

    let response = state.coordinator.submit(submission).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}
