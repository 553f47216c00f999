//! 支付方结账接口
//!
//! 引擎只依赖 `PaymentProcessor` trait；生产环境使用基于 reqwest 的 HTTP 实现。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

use super::catalog::HintPack;
use crate::error::{EconomyError, Result};
use crate::models::PurchaseMetadata;

/// 创建结账会话的请求
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub pack: HintPack,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    /// 原样回传到回调事件中
    pub metadata: PurchaseMetadata,
}

/// 支付方返回的结账会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: String,
}

/// 支付方客户端
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;
}

#[derive(Serialize)]
struct LineItem<'a> {
    name: &'a str,
    quantity: i64,
    unit_amount: i64,
}

#[derive(Serialize)]
struct CheckoutBody<'a> {
    mode: &'static str,
    currency: &'a str,
    client_reference_id: &'a str,
    line_items: Vec<LineItem<'a>>,
    success_url: &'a str,
    cancel_url: &'a str,
    metadata: CheckoutMetadata<'a>,
}

#[derive(Serialize)]
struct CheckoutMetadata<'a> {
    user_id: &'a str,
    pack_key: &'a str,
    quantity: String,
}

#[derive(Deserialize)]
struct CheckoutResponse {
    id: String,
    url: String,
}

/// HTTP 支付方客户端
///
/// 不做内部重试：下单失败直接返回给调用方。
#[derive(Clone)]
pub struct HttpPaymentProcessor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentProcessor {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EconomyError::PaymentProcessor(format!("创建 HTTP 客户端失败: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn checkout_url(&self) -> String {
        format!("{}/v1/checkout/sessions", self.base_url)
    }
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    #[instrument(skip(self, request), fields(user_id = %request.metadata.user_id, pack_key = %request.pack.key))]
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let body = CheckoutBody {
            mode: "payment",
            currency: &request.currency,
            client_reference_id: &request.metadata.user_id,
            line_items: vec![LineItem {
                name: &request.pack.name,
                quantity: 1,
                unit_amount: request.pack.unit_amount,
            }],
            success_url: &request.success_url,
            cancel_url: &request.cancel_url,
            metadata: CheckoutMetadata {
                user_id: &request.metadata.user_id,
                pack_key: &request.metadata.pack_key,
                quantity: request.metadata.quantity.to_string(),
            },
        };

        let resp = self
            .client
            .post(self.checkout_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EconomyError::PaymentProcessor(format!("请求支付方失败: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(EconomyError::PaymentProcessor(format!(
                "支付方返回 HTTP {}: {}",
                status, text
            )));
        }

        let parsed: CheckoutResponse = resp
            .json()
            .await
            .map_err(|e| EconomyError::PaymentProcessor(format!("解析支付方响应失败: {e}")))?;

        info!(session_id = %parsed.id, "结账会话已创建");

        Ok(CheckoutSession {
            session_id: parsed.id,
            redirect_url: parsed.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_url_trims_trailing_slash() {
        let processor =
            HttpPaymentProcessor::new("https://pay.example.com/", "sk_test", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            processor.checkout_url(),
            "https://pay.example.com/v1/checkout/sessions"
        );
    }

    #[test]
    fn test_checkout_body_echoes_metadata() {
        let body = CheckoutBody {
            mode: "payment",
            currency: "usd",
            client_reference_id: "u1",
            line_items: vec![LineItem {
                name: "50 Hints",
                quantity: 1,
                unit_amount: 799,
            }],
            success_url: "https://app/s",
            cancel_url: "https://app/c",
            metadata: CheckoutMetadata {
                user_id: "u1",
                pack_key: "hints_50",
                quantity: "50".to_string(),
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["metadata"]["pack_key"], "hints_50");
        assert_eq!(json["metadata"]["quantity"], "50");
        assert_eq!(json["line_items"][0]["unit_amount"], 799);
    }

    #[tokio::test]
    async fn test_unreachable_processor_maps_error() {
        let processor =
            HttpPaymentProcessor::new("http://127.0.0.1:9", "sk_test", Duration::from_millis(200))
                .unwrap();
        let request = CheckoutRequest {
            pack: HintPack::new("hints_10", "10 Hints", 10, 199).unwrap(),
            currency: "usd".to_string(),
            success_url: "https://app/s".to_string(),
            cancel_url: "https://app/c".to_string(),
            metadata: PurchaseMetadata {
                user_id: "u1".to_string(),
                pack_key: "hints_10".to_string(),
                quantity: 10,
            },
        };
        let err = processor.create_checkout_session(&request).await.unwrap_err();
        assert!(matches!(err, EconomyError::PaymentProcessor(_)));
        assert!(err.is_retryable());
    }
}
