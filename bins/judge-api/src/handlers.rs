// HTTP route handlers for the Judge API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use judge_common::problems::ProblemError;
use judge_common::store::{self, StoreError};
use judge_common::types::{JobKind, Problem, ResultRecord, TestCase};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::AppState;

/// Guard against pathological payloads before they reach the queue
const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub problem_id: String,
    pub source_code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub submission_id: Uuid,
}

/// What a solver may see of a problem: never the private tests
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicProblem {
    pub id: String,
    pub title: String,
    pub statement: String,
    pub constraints: String,
    pub public_tests: Vec<TestCase>,
    pub public_count: usize,
}

impl From<Problem> for PublicProblem {
    fn from(problem: Problem) -> Self {
        Self {
            public_count: problem.public_tests.len(),
            id: problem.id,
            title: problem.title,
            statement: problem.statement,
            constraints: problem.constraints,
            public_tests: problem.public_tests,
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn problem_error_response(err: ProblemError) -> Response {
    match err {
        ProblemError::NotFound(_) => error_response(StatusCode::NOT_FOUND, err.to_string()),
        other => {
            error!(error = %other, "Failed to read problem store");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

fn store_error_response(err: StoreError) -> Response {
    error!(error = %err, "Result store failure");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Result store unavailable: {}", err),
    )
}

/// GET / - Banner
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "msg": "Judge API up. Use /problems, /run, /submit, /result/{id}",
    }))
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /problems - Problem catalogue
pub async fn list_problems(State(state): State<Arc<AppState>>) -> Response {
    match state.problems.list_problems() {
        Ok(problems) => Json(problems).into_response(),
        Err(e) => problem_error_response(e),
    }
}

/// GET /problems/:problem_id - Public view of one problem
pub async fn get_problem(
    State(state): State<Arc<AppState>>,
    Path(problem_id): Path<String>,
) -> Response {
    match state.problems.load_problem(&problem_id) {
        Ok(problem) => Json(PublicProblem::from(problem)).into_response(),
        Err(e) => problem_error_response(e),
    }
}

/// POST /run - Judge against public tests only
pub async fn run_public(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> Response {
    queue_job(&state, JobKind::Public, payload).await
}

/// POST /submit - Judge against public and private tests
pub async fn submit_all(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> Response {
    queue_job(&state, JobKind::All, payload).await
}

async fn queue_job(state: &AppState, kind: JobKind, payload: SubmitRequest) -> Response {
    if payload.source_code.len() > MAX_SOURCE_CODE_BYTES {
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Source code exceeds maximum size of {} bytes", MAX_SOURCE_CODE_BYTES),
        );
    }

    // Fail fast instead of queueing a job that can only end in ERROR
    if let Err(e) = state.problems.load_problem(&payload.problem_id) {
        return problem_error_response(e);
    }

    match store::enqueue(
        state.store.as_ref(),
        kind,
        &payload.problem_id,
        &payload.source_code,
    )
    .await
    {
        Ok(submission_id) => Json(SubmitResponse { submission_id }).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// GET /result/:submission_id - Poll a submission
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
) -> Response {
    let unknown = || {
        Json(serde_json::json!({
            "status": "UNKNOWN",
            "error": "No such submission id",
        }))
        .into_response()
    };

    // A malformed id can never have been issued
    let Ok(id) = Uuid::parse_str(&submission_id) else {
        return unknown();
    };

    match store::poll(state.store.as_ref(), &id).await {
        Ok(Some(record)) => {
            if let ResultRecord::Done { verdict, .. } = &record {
                info!(submission_id = %id, verdict = %verdict, "Result retrieved");
            }
            Json(record).into_response()
        }
        Ok(None) => unknown(),
        Err(e) => store_error_response(e),
    }
}
