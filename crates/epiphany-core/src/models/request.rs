//! Submission request types
//!
//! Each request validates in two steps: declarative `validator` rules, then
//! the fixed-value checks (`mode`, `aspect`, `modelId`, ...) and the URL
//! allowlist. A request that passes becomes a [`Submission`], which is all the
//! coordinator needs to create the generation row and enqueue the job.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use validator::Validate;

use super::generation::GenerationKind;
use super::job::QueueName;
use crate::error::AppError;
use crate::validation::UrlAllowlist;

const MODES: &[u8] = &[0, 1, 2];
const ASPECTS: &[&str] = &["1:1", "16:9", "9:16", "3:2", "2:3"];
const IMAGE_MODELS: &[&str] = &["sdxl-base", "sdxl-refiner", "photoreal-xl", "anime-xl"];
const CONTROLNET_TYPES: &[&str] = &["canny", "depth", "pose"];
const VIDEO_DURATIONS: &[u32] = &[4, 8, 12];
const VIDEO_FPS: &[u32] = &[12, 24];
const VIDEO_RESOLUTIONS: &[&str] = &["576p", "720p"];
const VIDEO_MODELS: &[&str] = &["svd", "modelscope-t2v"];
const UPSCALE_FACTORS: &[u8] = &[2, 4];

/// Job name for image/video generation jobs; edit jobs use the operation name
pub const GENERATE_JOB_NAME: &str = "generate";

fn one_of<T: PartialEq + Display>(field: &str, value: &T, allowed: &[T]) -> Result<(), AppError> {
    if allowed.contains(value) {
        Ok(())
    } else {
        let allowed: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
        Err(AppError::InvalidInput(format!(
            "{} must be one of [{}], got {}",
            field,
            allowed.join(", "),
            value
        )))
    }
}

fn one_of_opt<T: PartialEq + Display>(
    field: &str,
    value: Option<&T>,
    allowed: &[T],
) -> Result<(), AppError> {
    match value {
        Some(v) => one_of(field, v, allowed),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ControlNet {
    #[serde(rename = "type")]
    pub control_type: String,
    #[validate(range(min = 0.0, max = 1.0, message = "strength must be between 0 and 1"))]
    pub strength: Option<f64>,
    #[validate(url(message = "controlnet.imageUrl must be a URL"))]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    #[validate(length(min = 1, max = 2000, message = "prompt must be between 1 and 2000 characters"))]
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub mode: u8,
    pub style_preset: Option<String>,
    pub aspect: Option<String>,
    #[validate(range(min = 1, max = 150, message = "steps must be between 1 and 150"))]
    pub steps: Option<u32>,
    #[validate(range(min = 1.0, max = 20.0, message = "cfg must be between 1 and 20"))]
    pub cfg: Option<f64>,
    pub seed: Option<i64>,
    pub model_id: Option<String>,
    #[validate(nested)]
    pub controlnet: Option<ControlNet>,
    #[validate(url(message = "initImageUrl must be a URL"))]
    pub init_image_url: Option<String>,
    #[validate(url(message = "maskUrl must be a URL"))]
    pub mask_url: Option<String>,
    pub preview: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoRequest {
    #[validate(length(min = 1, max = 2000, message = "prompt must be between 1 and 2000 characters"))]
    pub prompt: String,
    pub mode: u8,
    pub duration_sec: Option<u32>,
    pub fps: Option<u32>,
    pub resolution: Option<String>,
    pub seed: Option<i64>,
    pub model_id: Option<String>,
    #[validate(url(message = "sourceImageUrl must be a URL"))]
    pub source_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpscaleRequest {
    #[validate(url(message = "imageUrl must be a URL"))]
    pub image_url: String,
    pub scale: u8,
}

/// Body shared by `restore-face`, `remove-bg` and `caption`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImageUrlRequest {
    #[validate(url(message = "imageUrl must be a URL"))]
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CropRequest {
    #[validate(url(message = "imageUrl must be a URL"))]
    pub image_url: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResizeRequest {
    #[validate(url(message = "imageUrl must be a URL"))]
    pub image_url: String,
    #[validate(range(min = 1, message = "width must be at least 1"))]
    pub width: u32,
    #[validate(range(min = 1, message = "height must be at least 1"))]
    pub height: u32,
}

/// An empty prompt is accepted and enhanced to the default prompt
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EnhanceRequest {
    #[serde(default)]
    #[validate(length(max = 2000, message = "prompt must be at most 2000 characters"))]
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EditOperation {
    Upscale,
    RestoreFace,
    RemoveBg,
    Caption,
    Crop,
    Resize,
}

impl EditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditOperation::Upscale => "upscale",
            EditOperation::RestoreFace => "restore-face",
            EditOperation::RemoveBg => "remove-bg",
            EditOperation::Caption => "caption",
            EditOperation::Crop => "crop",
            EditOperation::Resize => "resize",
        }
    }
}

impl Display for EditOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditOperation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upscale" => Ok(EditOperation::Upscale),
            "restore-face" => Ok(EditOperation::RestoreFace),
            "remove-bg" => Ok(EditOperation::RemoveBg),
            "caption" => Ok(EditOperation::Caption),
            "crop" => Ok(EditOperation::Crop),
            "resize" => Ok(EditOperation::Resize),
            _ => Err(anyhow::anyhow!("Invalid edit operation: {}", s)),
        }
    }
}

/// A request body that can become a generation
pub trait SubmissionRequest: Serialize + Validate {
    /// Fixed-value checks the derive rules cannot express
    fn check_fields(&self) -> Result<(), AppError> {
        Ok(())
    }

    /// URLs that must pass the allowlist
    fn input_urls(&self) -> Vec<&str>;
}

impl SubmissionRequest for GenerateImageRequest {
    fn check_fields(&self) -> Result<(), AppError> {
        one_of("mode", &self.mode, MODES)?;
        one_of_opt("aspect", self.aspect.as_deref().as_ref(), ASPECTS)?;
        one_of_opt("modelId", self.model_id.as_deref().as_ref(), IMAGE_MODELS)?;
        if let Some(cn) = &self.controlnet {
            one_of("controlnet.type", &cn.control_type.as_str(), CONTROLNET_TYPES)?;
        }
        Ok(())
    }

    fn input_urls(&self) -> Vec<&str> {
        [
            self.init_image_url.as_deref(),
            self.mask_url.as_deref(),
            self.controlnet.as_ref().and_then(|c| c.image_url.as_deref()),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl SubmissionRequest for GenerateVideoRequest {
    fn check_fields(&self) -> Result<(), AppError> {
        one_of("mode", &self.mode, MODES)?;
        one_of_opt("durationSec", self.duration_sec.as_ref(), VIDEO_DURATIONS)?;
        one_of_opt("fps", self.fps.as_ref(), VIDEO_FPS)?;
        one_of_opt("resolution", self.resolution.as_deref().as_ref(), VIDEO_RESOLUTIONS)?;
        one_of_opt("modelId", self.model_id.as_deref().as_ref(), VIDEO_MODELS)?;
        Ok(())
    }

    fn input_urls(&self) -> Vec<&str> {
        self.source_image_url.as_deref().into_iter().collect()
    }
}

impl SubmissionRequest for UpscaleRequest {
    fn check_fields(&self) -> Result<(), AppError> {
        one_of("scale", &self.scale, UPSCALE_FACTORS)
    }

    fn input_urls(&self) -> Vec<&str> {
        vec![self.image_url.as_str()]
    }
}

impl SubmissionRequest for ImageUrlRequest {
    fn input_urls(&self) -> Vec<&str> {
        vec![self.image_url.as_str()]
    }
}

impl SubmissionRequest for CropRequest {
    fn input_urls(&self) -> Vec<&str> {
        vec![self.image_url.as_str()]
    }
}

impl SubmissionRequest for ResizeRequest {
    fn input_urls(&self) -> Vec<&str> {
        vec![self.image_url.as_str()]
    }
}

/// A validated request, ready to be persisted and enqueued
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub kind: GenerationKind,
    pub queue: QueueName,
    pub operation: Option<EditOperation>,
    /// Submitted parameters with absent fields dropped
    pub params: Value,
}

impl Submission {
    pub fn generate_image(
        req: &GenerateImageRequest,
        allowlist: &UrlAllowlist,
    ) -> Result<Self, AppError> {
        Self::build(req, GenerationKind::Image, QueueName::GenerateImage, None, allowlist)
    }

    pub fn generate_video(
        req: &GenerateVideoRequest,
        allowlist: &UrlAllowlist,
    ) -> Result<Self, AppError> {
        Self::build(req, GenerationKind::Video, QueueName::GenerateVideo, None, allowlist)
    }

    /// Edits are image-kind generations on the edit queue
    pub fn edit<R: SubmissionRequest>(
        operation: EditOperation,
        req: &R,
        allowlist: &UrlAllowlist,
    ) -> Result<Self, AppError> {
        Self::build(
            req,
            GenerationKind::Image,
            QueueName::EditImage,
            Some(operation),
            allowlist,
        )
    }

    fn build<R: SubmissionRequest>(
        req: &R,
        kind: GenerationKind,
        queue: QueueName,
        operation: Option<EditOperation>,
        allowlist: &UrlAllowlist,
    ) -> Result<Self, AppError> {
        req.validate()?;
        req.check_fields()?;
        allowlist.check_all(req.input_urls())?;
        let params = strip_nulls(serde_json::to_value(req)?);
        Ok(Submission {
            kind,
            queue,
            operation,
            params,
        })
    }

    pub fn job_name(&self) -> &'static str {
        self.operation
            .map(|op| op.as_str())
            .unwrap_or(GENERATE_JOB_NAME)
    }
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        other => other,
    }
}
