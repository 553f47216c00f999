//! JWT Token 校验
//!
//! 身份由上游认证服务签发，本服务只校验签名与过期时间并取出用户 ID

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use quiz_shared::config::AuthConfig;

use crate::error::ApiError;

/// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// 用户 ID
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

#[derive(Clone)]
pub struct JwtVerifier {
    issuer: Option<String>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            issuer: config.jwt_issuer.clone().filter(|iss| !iss.is_empty()),
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        }
    }

    /// 签发 Token，供本地联调和测试使用
    pub fn generate_token(&self, user_id: &str, ttl: Duration) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.issuer.clone(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("JWT 生成失败: {e}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::default();
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::Unauthorized("Token 已过期".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    ApiError::Unauthorized("无效的 Token".to_string())
                }
                _ => ApiError::Unauthorized(format!("Token 验证失败: {e}")),
            }
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(ApiError::Unauthorized("Token 缺少用户 ID".to_string()));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(issuer: Option<&str>) -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: issuer.map(str::to_string),
            admin_api_key: None,
        }
    }

    #[test]
    fn test_generate_and_verify() {
        let verifier = JwtVerifier::new(&config(Some("quiz-auth")));
        let token = verifier.generate_token("user-1", Duration::hours(1)).unwrap();
        let claims = verifier.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.iss.as_deref(), Some("quiz-auth"));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let verifier = JwtVerifier::new(&config(None));
        let token = verifier
            .generate_token("user-1", Duration::hours(-2))
            .unwrap();
        assert!(matches!(
            verifier.verify_token(&token),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_wrong_issuer_is_rejected() {
        let issuer_a = JwtVerifier::new(&config(Some("a")));
        let issuer_b = JwtVerifier::new(&config(Some("b")));
        let token = issuer_a.generate_token("user-1", Duration::hours(1)).unwrap();
        assert!(issuer_b.verify_token(&token).is_err());
    }
}
