//! HTTP 请求处理器

pub mod health;
pub mod progress;
pub mod purchase;
pub mod ranked;
pub mod wallet;
pub mod webhook;
