//! 支付方回调事件
//!
//! 只解析对账需要的字段，其余字段忽略。

use serde::{Deserialize, Deserializer};

use crate::error::{EconomyError, Result};
use crate::models::PurchaseMetadata;

/// 事件类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEventKind {
    Succeeded,
    /// 支付失败或会话过期
    Failed,
    /// 其他事件，确认收到后忽略
    Other(String),
}

impl PaymentEventKind {
    fn parse(event_type: &str) -> Self {
        match event_type {
            "payment_succeeded" => Self::Succeeded,
            "payment_failed" | "payment_expired" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

/// 下单时回传的元数据（支付方通常把数值转成字符串回传）
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventMetadata {
    pub user_id: String,
    pub pack_key: String,
    #[serde(deserialize_with = "int_or_string")]
    pub quantity: i64,
}

impl From<EventMetadata> for PurchaseMetadata {
    fn from(m: EventMetadata) -> Self {
        Self {
            user_id: m.user_id,
            pack_key: m.pack_key,
            quantity: m.quantity,
        }
    }
}

fn int_or_string<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(v) => Ok(v),
        IntOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEventData {
    pub session_id: String,
    #[serde(default)]
    pub metadata: Option<EventMetadata>,
}

/// 支付回调事件
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentEventData,
}

impl PaymentEvent {
    /// 从已验签的原始请求体解析
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let event: Self = serde_json::from_slice(raw)
            .map_err(|e| EconomyError::InvalidPaymentEvent(e.to_string()))?;
        if event.data.session_id.trim().is_empty() {
            return Err(EconomyError::InvalidPaymentEvent(
                "缺少支付会话 ID".to_string(),
            ));
        }
        Ok(event)
    }

    pub fn kind(&self) -> PaymentEventKind {
        PaymentEventKind::parse(&self.event_type)
    }

    pub fn session_id(&self) -> &str {
        &self.data.session_id
    }

    /// 成功事件必须携带元数据
    pub fn require_metadata(&self) -> Result<PurchaseMetadata> {
        self.data
            .metadata
            .clone()
            .map(PurchaseMetadata::from)
            .ok_or_else(|| {
                EconomyError::InvalidPaymentEvent(format!(
                    "事件 {} 缺少下单元数据",
                    self.id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_event_with_string_quantity() {
        let raw = br#"{
            "id": "evt_1",
            "type": "payment_succeeded",
            "created": 1767225600,
            "data": {
                "session_id": "cs_1",
                "metadata": {"user_id": "u1", "pack_key": "hints_50", "quantity": "50"}
            }
        }"#;
        let event = PaymentEvent::parse(raw).unwrap();
        assert_eq!(event.kind(), PaymentEventKind::Succeeded);
        assert_eq!(event.session_id(), "cs_1");
        let metadata = event.require_metadata().unwrap();
        assert_eq!(metadata.quantity, 50);
        assert_eq!(metadata.pack_key, "hints_50");
    }

    #[test]
    fn test_event_kinds() {
        assert_eq!(PaymentEventKind::parse("payment_failed"), PaymentEventKind::Failed);
        assert_eq!(PaymentEventKind::parse("payment_expired"), PaymentEventKind::Failed);
        assert_eq!(
            PaymentEventKind::parse("refund_created"),
            PaymentEventKind::Other("refund_created".to_string())
        );
    }

    #[test]
    fn test_failure_event_without_metadata() {
        let raw = br#"{"id":"evt_2","type":"payment_expired","data":{"session_id":"cs_2"}}"#;
        let event = PaymentEvent::parse(raw).unwrap();
        assert_eq!(event.kind(), PaymentEventKind::Failed);
        assert!(event.require_metadata().is_err());
    }

    #[test]
    fn test_invalid_payloads() {
        assert!(PaymentEvent::parse(b"not json").is_err());
        assert!(PaymentEvent::parse(br#"{"id":"e","type":"payment_succeeded","data":{"session_id":" "}}"#).is_err());
        assert!(PaymentEvent::parse(br#"{"id":"e","type":"payment_succeeded","data":{"session_id":"cs","metadata":{"user_id":"u","pack_key":"p","quantity":"many"}}}"#).is_err());
    }
}
