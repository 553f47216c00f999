//! 支付回调签名校验
//!
//! 签名头格式 `t=<unix 秒>,v1=<hex(HMAC-SHA256)>`，签名内容为 `"{t}.{原始请求体}"`。
//! 允许出现多个 v1（密钥轮换期间），任意一个匹配即通过。

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{EconomyError, Result};

type HmacSha256 = Hmac<Sha256>;

/// 签名请求头
pub const SIGNATURE_HEADER: &str = "Payment-Signature";

/// 回调签名校验器
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

struct ParsedHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<ParsedHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = value.parse::<i64>().ok();
            }
            "v1" => {
                // 无法解码的签名直接忽略，其余签名仍参与比较
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        EconomyError::SignatureVerificationFailed("签名头缺少时间戳".to_string())
    })?;
    if signatures.is_empty() {
        return Err(EconomyError::SignatureVerificationFailed(
            "签名头缺少 v1 签名".to_string(),
        ));
    }
    Ok(ParsedHeader {
        timestamp,
        signatures,
    })
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>, tolerance: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            tolerance,
        }
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| EconomyError::Internal(format!("初始化 HMAC 失败: {}", e)))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    /// 校验时间戳与签名
    pub fn verify(&self, payload: &[u8], header: &str, now: DateTime<Utc>) -> Result<()> {
        let parsed = parse_header(header)?;

        // 时间戳来自请求方，差值可能超出 i64
        let age = now.timestamp().abs_diff(parsed.timestamp);
        if age > self.tolerance.num_seconds().unsigned_abs() {
            return Err(EconomyError::SignatureVerificationFailed(format!(
                "签名时间戳超出容忍窗口: {} 秒",
                age
            )));
        }

        for signature in &parsed.signatures {
            // verify_slice 为常量时间比较
            if self
                .mac(parsed.timestamp, payload)?
                .verify_slice(signature)
                .is_ok()
            {
                return Ok(());
            }
        }

        Err(EconomyError::SignatureVerificationFailed(
            "签名不匹配".to_string(),
        ))
    }

    /// 生成签名头（测试与本地联调使用）
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let digest = self.mac(timestamp, payload)?.finalize().into_bytes();
        Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
    }
}
