//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册指标描述，出现在 /metrics 端点的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!("hints_used_total", "Hints consumed, by source");
    metrics::describe_counter!("wallet_credits_total", "Wallet credits, by source");
    metrics::describe_counter!("xp_awarded_total", "Learning XP awarded after boosts");
    metrics::describe_counter!("streak_updates_total", "Streak checks, by transition");
    metrics::describe_counter!("milestone_boosts_total", "XP boosts granted, by milestone kind");
    metrics::describe_counter!("ranked_sessions_total", "Ranked session lifecycle events");
    metrics::describe_counter!("purchases_total", "Purchases, by status");
    metrics::describe_counter!("payment_events_total", "Payment webhook deliveries, by outcome");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("指标服务监听于 {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("指标服务异常退出: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录提示消耗（source: free / paid）
#[inline]
pub fn record_hint_used(source: &str) {
    metrics::counter!("hints_used_total", "source" => source.to_string()).increment(1);
}

/// 记录钱包入账
#[inline]
pub fn record_wallet_credit(source: &str, amount: i64) {
    metrics::counter!("wallet_credits_total", "source" => source.to_string())
        .increment(amount.max(0) as u64);
}

/// 记录学习经验值发放
#[inline]
pub fn record_xp_awarded(amount: i64) {
    metrics::counter!("xp_awarded_total").increment(amount.max(0) as u64);
}

/// 记录打卡结果
#[inline]
pub fn record_streak_update(transition: &str) {
    metrics::counter!("streak_updates_total", "transition" => transition.to_string()).increment(1);
}

/// 记录里程碑加成发放（kind: streak / xp）
#[inline]
pub fn record_milestone_boost(kind: &str) {
    metrics::counter!("milestone_boosts_total", "kind" => kind.to_string()).increment(1);
}

/// 记录排位赛生命周期事件（action: started / attempt / ended / force_closed）
#[inline]
pub fn record_ranked_session(action: &str) {
    metrics::counter!("ranked_sessions_total", "action" => action.to_string()).increment(1);
}

/// 记录购买状态变化
#[inline]
pub fn record_purchase(status: &str) {
    metrics::counter!("purchases_total", "status" => status.to_string()).increment(1);
}

/// 记录支付回调处理结果
#[inline]
pub fn record_payment_event(outcome: &str) {
    metrics::counter!("payment_events_total", "outcome" => outcome.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_http_request("GET", "/api/v1/wallet", 200, 0.1);
        record_hint_used("free");
        record_wallet_credit("purchase", 10);
        record_wallet_credit("manual", -1);
        record_xp_awarded(42);
        record_streak_update("continued");
        record_milestone_boost("streak");
        record_ranked_session("started");
        record_purchase("succeeded");
        record_payment_event("credited");
    }

    #[test]
    fn test_handle_absent_before_init() {
        // 测试进程中不安装 recorder
        assert!(get_handle().is_none());
    }
}
