//! 认证模块
//!
//! JWT 校验与当前用户提取

mod jwt;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub use jwt::{Claims, JwtVerifier};

use crate::error::ApiError;

/// 当前登录用户，由认证中间件注入
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .map(|claims| AuthUser {
                user_id: claims.sub.clone(),
            })
            .ok_or_else(|| ApiError::Unauthorized("缺少认证信息".to_string()))
    }
}
