//! HTTP 路由与处理函数
//!
//! 所有错误在这里统一转换为 `{ "error": <分类>, "message": <提示> }`

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::Config;
use crate::error::{AppError, ErrorKind};
use crate::models::{ChatTurn, ProblemRequest};
use crate::session::{SessionPhase, SessionSnapshot, SessionStore};
use crate::workflow::{FollowUpAnswerer, ProblemSolver};

/// 路由共享状态
pub struct AppState {
    pub solver: ProblemSolver,
    pub answerer: FollowUpAnswerer,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(solver: ProblemSolver, answerer: FollowUpAnswerer) -> Self {
        Self {
            solver,
            answerer,
            sessions: SessionStore::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ProblemSolver::from_config(config),
            FollowUpAnswerer::from_config(config),
        )
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorKind,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::MissingInput | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::SessionConflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ModelTimeout | ErrorKind::OcrTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::ModelOutput | ErrorKind::Provider => StatusCode::BAD_GATEWAY,
            ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("请求失败 ({:?}): {}", kind, self);
        }
        let body = ErrorBody {
            error: kind,
            message: self.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveBody {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub problem: ProblemRequest,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResponse {
    pub session_id: String,
    pub solution: String,
    pub phase: SessionPhase,
    pub transcript: Vec<ChatTurn>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpBody {
    pub session_id: String,
    pub question: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpResponse {
    pub session_id: String,
    pub answer: String,
    pub phase: SessionPhase,
    pub transcript: Vec<ChatTurn>,
}

/// 构建路由
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/solve", post(api_solve))
        .route("/api/follow-up", post(api_follow_up))
        .route(
            "/api/session/:id",
            get(api_session_get).delete(api_session_delete),
        )
        .route("/api/health", get(|| async { "OK" }))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

async fn api_solve(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SolveBody>,
) -> Result<Json<SolveResponse>, AppError> {
    let (result, snapshot) = state
        .sessions
        .solve(body.session_id, &body.problem, &state.solver)
        .await?;

    info!(
        "[会话 {}] ✓ 解题成功，当前会话数 {}",
        snapshot.session_id,
        state.sessions.len().await
    );

    Ok(Json(SolveResponse {
        session_id: snapshot.session_id,
        solution: result.solution,
        phase: snapshot.phase,
        transcript: snapshot.transcript,
    }))
}

async fn api_follow_up(
    State(state): State<Arc<AppState>>,
    Json(body): Json<FollowUpBody>,
) -> Result<Json<FollowUpResponse>, AppError> {
    let (result, snapshot) = state
        .sessions
        .follow_up(&body.session_id, &body.question, &state.answerer)
        .await?;

    info!(
        "[会话 {}] ✓ 追问成功，当前对话 {} 轮",
        snapshot.session_id,
        snapshot.transcript.len()
    );

    Ok(Json(FollowUpResponse {
        session_id: snapshot.session_id,
        answer: result.answer,
        phase: snapshot.phase,
        transcript: snapshot.transcript,
    }))
}

async fn api_session_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.sessions.snapshot(&id).await?))
}

async fn api_session_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.sessions.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
