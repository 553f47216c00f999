//! 学习进度 API 处理器：连续打卡、经验值加成、答题

use axum::{Json, extract::State};

use economy_engine::{AnswerOutcome, ProgressSummary, StreakCheck, XpBoost};

use crate::auth::AuthUser;
use crate::dto::{ApiResponse, RecordAnswerRequest};
use crate::error::Result;
use crate::state::AppState;

/// POST /api/v1/streak/check
pub async fn check_streak(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<StreakCheck>>> {
    let check = state.engine.streaks.check_streak(&user.user_id).await?;
    Ok(Json(ApiResponse::success(check)))
}

/// GET /api/v1/streak/boost
pub async fn get_boost(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<XpBoost>>> {
    let boost = state
        .engine
        .streaks
        .get_active_xp_boost(&user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(boost)))
}

/// POST /api/v1/answers
pub async fn record_answer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<RecordAnswerRequest>,
) -> Result<Json<ApiResponse<AnswerOutcome>>> {
    let input = req.into_input()?;
    let outcome = state
        .engine
        .progression
        .record_answer(&user.user_id, input)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// GET /api/v1/progress
pub async fn get_progress(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<ProgressSummary>>> {
    let summary = state.engine.progression.get_progress(&user.user_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}
