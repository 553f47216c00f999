//! 答题经济 REST 服务
//!
//! 把经济引擎的公开操作暴露为 HTTP 接口。
//!
//! ## 模块结构
//!
//! - `auth`: JWT 校验与当前用户提取
//! - `dto`: 请求和响应体
//! - `error`: 错误到 HTTP 状态码的映射
//! - `handlers`: 请求处理器
//! - `middleware`: 用户认证、运营密钥、用户级限流
//! - `routes`: 路由配置
//! - `state`: 应用状态
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 数据验证：validator
//! - 身份：jsonwebtoken（HS256）

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use dto::ApiResponse;
pub use error::{ApiError, Result};
pub use state::AppState;
