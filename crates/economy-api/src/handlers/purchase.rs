//! 提示包购买 API 处理器

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use validator::Validate;

use economy_engine::payment::HintPack;
use economy_engine::{Purchase, PurchaseCheckout};

use crate::auth::AuthUser;
use crate::dto::{ApiResponse, InitiatePurchaseRequest};
use crate::error::Result;
use crate::state::AppState;

/// GET /api/v1/shop/packs
pub async fn list_packs(State(state): State<AppState>) -> Json<ApiResponse<Vec<HintPack>>> {
    Json(ApiResponse::success(state.engine.purchases.packs().to_vec()))
}

/// POST /api/v1/purchases
///
/// 创建待支付购买并返回支付页地址
pub async fn initiate_purchase(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<InitiatePurchaseRequest>,
) -> Result<Json<ApiResponse<PurchaseCheckout>>> {
    req.validate()?;

    let consent = req.consent.map(|c| c.into_metadata(Utc::now()));
    let checkout = state
        .engine
        .purchases
        .initiate_purchase(&user.user_id, &req.pack_key, consent)
        .await?;
    Ok(Json(ApiResponse::success(checkout)))
}

/// GET /api/v1/purchases/{payment_session_id}
pub async fn get_purchase(
    State(state): State<AppState>,
    user: AuthUser,
    Path(payment_session_id): Path<String>,
) -> Result<Json<ApiResponse<Purchase>>> {
    let purchase = state
        .engine
        .purchases
        .get_purchase(&user.user_id, &payment_session_id)
        .await?;
    Ok(Json(ApiResponse::success(purchase)))
}
