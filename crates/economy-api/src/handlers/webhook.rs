//! 支付回调处理器
//!
//! 原始请求体参与验签，必须在反序列化前保留字节

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};

use economy_engine::ReconcileOutcome;
use economy_engine::payment::SIGNATURE_HEADER;

use crate::dto::ApiResponse;
use crate::error::Result;
use crate::state::AppState;

/// POST /api/v1/webhooks/payment
///
/// 重复投递返回 200（outcome = duplicate），便于支付方停止重试
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<ReconcileOutcome>>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.engine.purchases.reconcile(&body, signature).await?;
    Ok(Json(ApiResponse::success(outcome)))
}
