//! 路由配置
//!
//! 所有业务接口挂在 /api/v1 下；消耗类写接口额外经过用户级限流

use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::timeout::TimeoutLayer;

use quiz_shared::observability::middleware as obs_middleware;

use crate::handlers;
use crate::middleware::{admin_key_middleware, auth_middleware, rate_limit_middleware};
use crate::state::AppState;

/// 受限流保护的路由：消耗提示、发起购买、排位赛答题
fn limited_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/wallet/hints/use", post(handlers::wallet::use_hint))
        .route("/purchases", post(handlers::purchase::initiate_purchase))
        .route(
            "/ranked/sessions/{id}/attempts",
            post(handlers::ranked::record_attempt),
        )
        .route_layer(middleware::from_fn_with_state(state, rate_limit_middleware))
}

fn user_routes() -> Router<AppState> {
    Router::new()
        // 钱包
        .route("/wallet", get(handlers::wallet::get_wallet))
        .route("/wallet/history", get(handlers::wallet::get_history))
        // 学习进度
        .route("/streak/check", post(handlers::progress::check_streak))
        .route("/streak/boost", get(handlers::progress::get_boost))
        .route("/answers", post(handlers::progress::record_answer))
        .route("/progress", get(handlers::progress::get_progress))
        // 排位赛
        .route("/ranked/sessions", post(handlers::ranked::start_session))
        .route("/ranked/sessions/{id}", get(handlers::ranked::get_session))
        .route(
            "/ranked/sessions/{id}/end",
            post(handlers::ranked::end_session),
        )
        .route("/ranked/me", get(handlers::ranked::get_my_rank))
        .route("/leaderboard", get(handlers::ranked::get_leaderboard))
        // 购买
        .route("/shop/packs", get(handlers::purchase::list_packs))
        .route(
            "/purchases/{payment_session_id}",
            get(handlers::purchase::get_purchase),
        )
        // 支付回调（验签，不走用户认证）
        .route("/webhooks/payment", post(handlers::webhook::payment_webhook))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/wallet/credit", post(handlers::wallet::admin_credit))
        .route_layer(middleware::from_fn_with_state(state, admin_key_middleware))
}

pub fn api_routes(state: AppState) -> Router<AppState> {
    user_routes()
        .merge(limited_routes(state.clone()))
        .nest("/admin", admin_routes(state))
}

/// 完整应用路由（不含 CORS，由启动代码按环境配置）
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .nest("/api/v1", api_routes(state.clone()))
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
