//! 中间件模块
//!
//! 提供用户认证、运营密钥认证和用户级限流

mod admin_key;
mod auth;
mod rate_limit;

pub use admin_key::{ADMIN_KEY_HEADER, admin_key_middleware};
pub use auth::auth_middleware;
pub use rate_limit::rate_limit_middleware;
