//! 运营密钥中间件
//!
//! 运营接口通过 X-Admin-Key 头认证，比较的是密钥的 SHA256

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::{AppState, hash_api_key};

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

pub async fn admin_key_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_key_hash.as_deref() else {
        warn!(target: "security", "运营密钥未配置，拒绝运营请求");
        return ApiError::Forbidden("运营接口未启用".to_string()).into_response();
    };

    let provided = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if constant_time_eq(hash_api_key(key).as_bytes(), expected.as_bytes()) => {
            next.run(request).await
        }
        Some(_) => {
            warn!(target: "security", path = %request.uri().path(), "运营密钥错误");
            ApiError::Unauthorized("无效的运营密钥".to_string()).into_response()
        }
        None => ApiError::Unauthorized("缺少运营密钥".to_string()).into_response(),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
