//! 用户级限流中间件
//!
//! 作用于消耗提示、发起购买和排位赛答题三类写接口，按 JWT sub 计数。
//! 计数器是进程内的固定窗口，随应用状态创建。

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::warn;

use crate::auth::Claims;
use crate::state::AppState;

/// 放在认证中间件之后，需要 Claims 中的用户 ID
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(user_id) = request.extensions().get::<Claims>().map(|c| c.sub.clone()) else {
        return next.run(request).await;
    };

    let decision = state.limiter.check(&user_id);
    if !decision.allowed {
        warn!(
            user_id = %user_id,
            path = %request.uri().path(),
            "用户限流触发"
        );
        return too_many_requests_response(
            state.limiter.max_requests(),
            decision.retry_after.as_secs().max(1),
        );
    }

    next.run(request).await
}

/// 429，带 Retry-After 头
fn too_many_requests_response(limit: u32, retry_after_secs: u64) -> Response {
    let body = json!({
        "success": false,
        "code": "RATE_LIMITED",
        "message": "请求过于频繁，请稍后再试",
        "data": {
            "limit": limit,
            "retry_after_seconds": retry_after_secs
        }
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
    if let Ok(val) = HeaderValue::from_str(&retry_after_secs.to_string()) {
        response.headers_mut().insert("Retry-After", val);
    }
    response
}
