use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::dtos::matchdtos::MatchOptionsDto;

/// Query parameters accepted by the async matching endpoints.
#[derive(Debug, Deserialize, Default)]
pub struct EnqueueQueryDto {
    pub candidate_id: Option<String>,
    pub job_id: Option<String>,
    #[serde(default)]
    pub with_commute_time: bool,
    pub priority: Option<String>,
}

/// Body of `POST /v2/match` and `POST /v2/find-jobs`: one candidate
/// against a job list, with an optional webhook.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct EnqueueMatchDto {
    pub candidate: Value,

    #[validate(length(min = 1, message = "At least one job posting is required"))]
    pub jobs: Vec<Value>,

    #[validate]
    pub options: Option<MatchOptionsDto>,

    #[validate(url(message = "Invalid webhook URL"))]
    pub webhook_url: Option<String>,
}

/// Body of `POST /v2/find-candidates`: one posting against a candidate
/// list.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct EnqueueFindCandidatesDto {
    pub job: Value,

    #[validate(length(min = 1, message = "At least one candidate is required"))]
    pub candidates: Vec<Value>,

    #[validate]
    pub options: Option<MatchOptionsDto>,

    #[validate(url(message = "Invalid webhook URL"))]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponseDto {
    pub job_id: String,
    pub status: &'static str,
}
