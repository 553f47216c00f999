//! 排位赛 API 处理器

use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use economy_engine::{AttemptOutcome, RankedLeaderboardEntry, RankedSession, SessionSummary};

use crate::auth::AuthUser;
use crate::dto::{ApiResponse, LimitQuery, RankedAttemptRequest};
use crate::error::Result;
use crate::state::AppState;

const DEFAULT_LEADERBOARD_LIMIT: i64 = 50;

/// POST /api/v1/ranked/sessions
///
/// 已有活跃会话时先强制结算旧会话
pub async fn start_session(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<RankedSession>>> {
    let session = state.engine.ranked.start_session(&user.user_id).await?;
    Ok(Json(ApiResponse::success(session)))
}

/// GET /api/v1/ranked/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ApiResponse<RankedSession>>> {
    let session = state
        .engine
        .ranked
        .get_session(session_id, &user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

/// POST /api/v1/ranked/sessions/{id}/attempts
pub async fn record_attempt(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<Uuid>,
    Json(req): Json<RankedAttemptRequest>,
) -> Result<Json<ApiResponse<AttemptOutcome>>> {
    let attempt = req.into_attempt()?;
    let outcome = state
        .engine
        .ranked
        .record_attempt(session_id, &user.user_id, attempt)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// POST /api/v1/ranked/sessions/{id}/end
pub async fn end_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ApiResponse<SessionSummary>>> {
    let summary = state
        .engine
        .ranked
        .end_session(session_id, &user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// GET /api/v1/leaderboard?limit=50
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<RankedLeaderboardEntry>>>> {
    let entries = state
        .engine
        .ranked
        .get_leaderboard(query.limit_or(DEFAULT_LEADERBOARD_LIMIT))
        .await?;
    Ok(Json(ApiResponse::success(entries)))
}

/// GET /api/v1/ranked/me
///
/// 未参加过排位赛时 data 为 null
pub async fn get_my_rank(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Option<RankedLeaderboardEntry>>>> {
    let rank = state.engine.ranked.get_user_rank(&user.user_id).await?;
    Ok(Json(ApiResponse::success(rank)))
}
