//! 钱包 API 处理器

use axum::{
    Json,
    extract::{Query, State},
};
use tracing::info;
use validator::Validate;

use economy_engine::{CreditSource, HintUsage, WalletLedgerEntry, WalletSummary};

use crate::auth::AuthUser;
use crate::dto::{AdminCreditRequest, ApiResponse, LimitQuery};
use crate::error::Result;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 20;

/// GET /api/v1/wallet
pub async fn get_wallet(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<WalletSummary>>> {
    let wallet = state.engine.wallet.get_wallet(&user.user_id).await?;
    Ok(Json(ApiResponse::success(wallet)))
}

/// POST /api/v1/wallet/hints/use
///
/// 先用当日免费额度，其次扣付费余额；都不足时返回 409
pub async fn use_hint(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<HintUsage>>> {
    let usage = state.engine.wallet.use_hint(&user.user_id).await?;
    Ok(Json(ApiResponse::success(usage)))
}

/// GET /api/v1/wallet/history?limit=20
pub async fn get_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<WalletLedgerEntry>>>> {
    let entries = state
        .engine
        .wallet
        .get_history(&user.user_id, query.limit_or(DEFAULT_HISTORY_LIMIT))
        .await?;
    Ok(Json(ApiResponse::success(entries)))
}

/// POST /api/v1/admin/wallet/credit
pub async fn admin_credit(
    State(state): State<AppState>,
    Json(req): Json<AdminCreditRequest>,
) -> Result<Json<ApiResponse<WalletSummary>>> {
    req.validate()?;

    let wallet = state
        .engine
        .wallet
        .credit_wallet(
            &req.user_id,
            req.amount,
            CreditSource::Manual {
                reference: req.reference,
            },
        )
        .await?;

    info!(user_id = %req.user_id, amount = req.amount, "运营补发提示");
    Ok(Json(ApiResponse::success(wallet)))
}
