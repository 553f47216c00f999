//! 购买与支付对账服务
//!
//! ## 对账流程
//!
//! 1. 用共享密钥校验签名，失败直接拒绝，不改任何状态
//! 2. 按支付会话 ID 查找购买记录，找不到则记录后忽略
//! 3. 已成功的购买视为重复投递，直接返回
//! 4. 待支付的购买在同一事务内标记成功并入账
//!
//! 支付方保证至少一次投递，本服务不做重试，只保证重复调用安全。

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use quiz_shared::observability::metrics as app_metrics;

use crate::clock::{Clock, LocalCalendar};
use crate::consent::ConsentLogger;
use crate::error::{EconomyError, Result};
use crate::models::{ConsentMetadata, FailureOutcome, FulfillmentOutcome, Purchase, PurchaseMetadata};
use crate::payment::{
    CheckoutRequest, HintPack, PackCatalog, PaymentEvent, PaymentEventKind, PaymentProcessor,
    SignatureVerifier,
};
use crate::repository::PurchaseRepositoryTrait;

/// 结账跳转配置
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// 下单结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseCheckout {
    pub purchase_id: Uuid,
    pub payment_session_id: String,
    pub redirect_url: String,
    pub pack_key: String,
    pub quantity: i64,
    pub amount: i64,
    pub currency: String,
}

/// 一次回调的对账结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Credited {
        payment_session_id: String,
        user_id: String,
        quantity: i64,
        balance_after: i64,
    },
    /// 重复投递，幂等命中
    Duplicate { payment_session_id: String },
    MarkedFailed { payment_session_id: String },
    /// 购买已处于终态，忽略本次回调
    IgnoredTerminal { payment_session_id: String },
    /// 不是本系统创建的支付会话
    UnknownPurchase { payment_session_id: String },
    IgnoredEventType { event_type: String },
}

impl ReconcileOutcome {
    pub fn metric_label(&self) -> &'static str {
        match self {
            Self::Credited { .. } => "credited",
            Self::Duplicate { .. } => "duplicate",
            Self::MarkedFailed { .. } => "marked_failed",
            Self::IgnoredTerminal { .. } => "ignored_terminal",
            Self::UnknownPurchase { .. } => "unknown_purchase",
            Self::IgnoredEventType { .. } => "ignored_event_type",
        }
    }
}

pub struct PurchaseService {
    repo: Arc<dyn PurchaseRepositoryTrait>,
    processor: Arc<dyn PaymentProcessor>,
    consent_logger: Arc<dyn ConsentLogger>,
    catalog: PackCatalog,
    verifier: SignatureVerifier,
    checkout: CheckoutSettings,
    clock: Arc<dyn Clock>,
    calendar: LocalCalendar,
}

impl PurchaseService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn PurchaseRepositoryTrait>,
        processor: Arc<dyn PaymentProcessor>,
        consent_logger: Arc<dyn ConsentLogger>,
        catalog: PackCatalog,
        verifier: SignatureVerifier,
        checkout: CheckoutSettings,
        clock: Arc<dyn Clock>,
        calendar: LocalCalendar,
    ) -> Self {
        Self {
            repo,
            processor,
            consent_logger,
            catalog,
            verifier,
            checkout,
            clock,
            calendar,
        }
    }

    pub fn packs(&self) -> &[HintPack] {
        self.catalog.packs()
    }

    /// 发起购买：校验提示包、向支付方创建结账会话、落一条待支付记录
    ///
    /// 不触碰钱包。同意记录写入失败只告警。
    #[instrument(skip(self, consent), fields(user_id = %user_id, pack_key = %pack_key))]
    pub async fn initiate_purchase(
        &self,
        user_id: &str,
        pack_key: &str,
        consent: Option<ConsentMetadata>,
    ) -> Result<PurchaseCheckout> {
        let pack = self.catalog.get(pack_key)?.clone();
        let request = CheckoutRequest {
            currency: self.checkout.currency.clone(),
            success_url: self.checkout.success_url.clone(),
            cancel_url: self.checkout.cancel_url.clone(),
            metadata: PurchaseMetadata {
                user_id: user_id.to_string(),
                pack_key: pack.key.clone(),
                quantity: pack.quantity,
            },
            pack,
        };

        let session = self.processor.create_checkout_session(&request).await?;

        let purchase = Purchase::new_pending(
            user_id,
            session.session_id.clone(),
            request.pack.key.clone(),
            request.pack.quantity,
            request.pack.unit_amount,
            request.currency.clone(),
            consent.clone(),
            self.clock.now(),
        )?;
        self.repo.create_pending(&purchase).await?;
        app_metrics::record_purchase(purchase.status.as_str());

        if let Some(consent) = &consent {
            if let Err(e) = self
                .consent_logger
                .log_purchase_consent(user_id, purchase.id, consent)
                .await
            {
                warn!(user_id, purchase_id = %purchase.id, error = %e, "同意记录写入失败");
            }
        }

        info!(
            user_id,
            payment_session_id = %purchase.payment_session_id,
            quantity = purchase.quantity,
            "购买已创建，等待支付"
        );

        Ok(PurchaseCheckout {
            purchase_id: purchase.id,
            payment_session_id: purchase.payment_session_id,
            redirect_url: session.redirect_url,
            pack_key: purchase.pack_key,
            quantity: purchase.quantity,
            amount: purchase.amount,
            currency: purchase.currency,
        })
    }

    /// 处理一次支付回调
    #[instrument(skip(self, raw, signature))]
    pub async fn reconcile(&self, raw: &[u8], signature: Option<&str>) -> Result<ReconcileOutcome> {
        let now = self.clock.now();

        let verified = match signature {
            Some(header) => self.verifier.verify(raw, header, now),
            None => Err(EconomyError::SignatureVerificationFailed(
                "缺少签名头".to_string(),
            )),
        };
        if let Err(e) = verified {
            warn!(target: "security", error = %e, "支付回调签名校验失败");
            app_metrics::record_payment_event("rejected");
            return Err(e);
        }

        let event = PaymentEvent::parse(raw)?;
        let payment_session_id = event.session_id().to_string();

        let outcome = match event.kind() {
            PaymentEventKind::Succeeded => {
                let metadata = event.require_metadata()?;
                let today = self.calendar.date_of(now);
                match self
                    .repo
                    .fulfill(&payment_session_id, &metadata, today, now)
                    .await
                {
                    Ok(FulfillmentOutcome::Credited {
                        purchase,
                        balance_after,
                    }) => {
                        app_metrics::record_purchase(purchase.status.as_str());
                        app_metrics::record_wallet_credit("purchase", purchase.quantity);
                        ReconcileOutcome::Credited {
                            payment_session_id,
                            user_id: purchase.user_id,
                            quantity: purchase.quantity,
                            balance_after,
                        }
                    }
                    Ok(FulfillmentOutcome::AlreadySucceeded(_)) => {
                        info!(%payment_session_id, event_id = %event.id, "重复的支付成功回调，忽略");
                        ReconcileOutcome::Duplicate { payment_session_id }
                    }
                    Ok(FulfillmentOutcome::AlreadyFailed(_)) => {
                        ReconcileOutcome::IgnoredTerminal { payment_session_id }
                    }
                    Ok(FulfillmentOutcome::UnknownPurchase) => {
                        warn!(%payment_session_id, event_id = %event.id, "回调对应的购买不存在");
                        ReconcileOutcome::UnknownPurchase { payment_session_id }
                    }
                    Err(e @ EconomyError::PaymentEventMismatch { .. }) => {
                        warn!(target: "security", error = %e, "回调元数据与购买记录不一致");
                        app_metrics::record_payment_event("rejected");
                        return Err(e);
                    }
                    Err(e) => return Err(e),
                }
            }
            PaymentEventKind::Failed => match self.repo.mark_failed(&payment_session_id, now).await? {
                FailureOutcome::MarkedFailed(purchase) => {
                    app_metrics::record_purchase(purchase.status.as_str());
                    info!(%payment_session_id, "购买已标记失败");
                    ReconcileOutcome::MarkedFailed { payment_session_id }
                }
                FailureOutcome::AlreadyTerminal(_) => {
                    ReconcileOutcome::IgnoredTerminal { payment_session_id }
                }
                FailureOutcome::UnknownPurchase => {
                    warn!(%payment_session_id, event_id = %event.id, "回调对应的购买不存在");
                    ReconcileOutcome::UnknownPurchase { payment_session_id }
                }
            },
            PaymentEventKind::Other(event_type) => {
                info!(%event_type, "忽略无关事件类型");
                ReconcileOutcome::IgnoredEventType { event_type }
            }
        };

        app_metrics::record_payment_event(outcome.metric_label());
        Ok(outcome)
    }

    /// 查询购买状态；非本人的购买按不存在处理
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_purchase(&self, user_id: &str, payment_session_id: &str) -> Result<Purchase> {
        match self.repo.get_by_session_id(payment_session_id).await? {
            Some(purchase) if purchase.user_id == user_id => Ok(purchase),
            _ => Err(EconomyError::PurchaseNotFound(payment_session_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::consent::MockConsentLogger;
    use crate::models::PurchaseStatus;
    use crate::payment::CheckoutSession;
    use crate::payment::processor::MockPaymentProcessor;
    use crate::repository::{MemoryStore, WalletRepositoryTrait};
    use chrono::{Duration, Utc};

    const SECRET: &str = "whsec_test";

    struct Fixture {
        service: PurchaseService,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        verifier: SignatureVerifier,
    }

    fn fixture(processor: MockPaymentProcessor, consent: MockConsentLogger) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let verifier = SignatureVerifier::new(SECRET, Duration::seconds(300));
        let service = PurchaseService::new(
            store.clone(),
            Arc::new(processor),
            Arc::new(consent),
            PackCatalog::default(),
            verifier.clone(),
            CheckoutSettings {
                currency: "usd".to_string(),
                success_url: "https://app/s".to_string(),
                cancel_url: "https://app/c".to_string(),
            },
            clock.clone(),
            LocalCalendar::utc(),
        );
        Fixture {
            service,
            store,
            clock,
            verifier,
        }
    }

    fn processor_returning(session_id: &'static str) -> MockPaymentProcessor {
        let mut processor = MockPaymentProcessor::new();
        processor.expect_create_checkout_session().returning(move |_| {
            Ok(CheckoutSession {
                session_id: session_id.to_string(),
                redirect_url: format!("https://pay/{session_id}"),
            })
        });
        processor
    }

    fn success_event(session_id: &str, user_id: &str, quantity: i64) -> Vec<u8> {
        serde_json::json!({
            "id": format!("evt_{session_id}"),
            "type": "payment_succeeded",
            "data": {
                "session_id": session_id,
                "metadata": {"user_id": user_id, "pack_key": "hints_50", "quantity": quantity.to_string()}
            }
        })
        .to_string()
        .into_bytes()
    }

    impl Fixture {
        fn sign(&self, body: &[u8]) -> String {
            self.verifier.sign(body, self.clock.now().timestamp()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_redelivered_success_credits_once() {
        let f = fixture(processor_returning("cs_50"), MockConsentLogger::new());
        let checkout = f.service.initiate_purchase("u1", "hints_50", None).await.unwrap();
        assert_eq!(checkout.quantity, 50);

        let body = success_event("cs_50", "u1", 50);
        let header = f.sign(&body);

        let first = f.service.reconcile(&body, Some(&header)).await.unwrap();
        assert!(matches!(first, ReconcileOutcome::Credited { balance_after: 50, .. }));
        let second = f.service.reconcile(&body, Some(&header)).await.unwrap();
        assert!(matches!(second, ReconcileOutcome::Duplicate { .. }));

        let wallet = f.store.get_wallet("u1").await.unwrap().unwrap();
        assert_eq!(wallet.balance, 50);
        let purchase = f.service.get_purchase("u1", "cs_50").await.unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_bad_signature_changes_nothing() {
        let f = fixture(processor_returning("cs_50"), MockConsentLogger::new());
        f.service.initiate_purchase("u1", "hints_50", None).await.unwrap();

        let body = success_event("cs_50", "u1", 50);
        let forged = SignatureVerifier::new("wrong", Duration::seconds(300))
            .sign(&body, f.clock.now().timestamp())
            .unwrap();

        let err = f.service.reconcile(&body, Some(&forged)).await.unwrap_err();
        assert!(matches!(err, EconomyError::SignatureVerificationFailed(_)));
        let err = f.service.reconcile(&body, None).await.unwrap_err();
        assert!(matches!(err, EconomyError::SignatureVerificationFailed(_)));

        assert!(f.store.get_wallet("u1").await.unwrap().is_none());
        let purchase = f.service.get_purchase("u1", "cs_50").await.unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Pending);
    }

    #[tokio::test]
    async fn test_tampered_metadata_is_rejected() {
        let f = fixture(processor_returning("cs_50"), MockConsentLogger::new());
        f.service.initiate_purchase("u1", "hints_50", None).await.unwrap();

        let body = success_event("cs_50", "u1", 500);
        let header = f.sign(&body);
        let err = f.service.reconcile(&body, Some(&header)).await.unwrap_err();
        assert!(matches!(err, EconomyError::PaymentEventMismatch { field: "quantity", .. }));
        assert!(f.store.get_wallet("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_then_late_success_never_credits() {
        let f = fixture(processor_returning("cs_50"), MockConsentLogger::new());
        f.service.initiate_purchase("u1", "hints_50", None).await.unwrap();

        let failed = br#"{"id":"evt_f","type":"payment_expired","data":{"session_id":"cs_50"}}"#;
        let outcome = f.service.reconcile(failed, Some(&f.sign(failed))).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::MarkedFailed { .. }));

        let body = success_event("cs_50", "u1", 50);
        let outcome = f.service.reconcile(&body, Some(&f.sign(&body))).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::IgnoredTerminal { .. }));
        assert!(f.store.get_wallet("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_session_and_event_type_are_acknowledged() {
        let f = fixture(MockPaymentProcessor::new(), MockConsentLogger::new());

        let body = success_event("cs_unknown", "u1", 50);
        let outcome = f.service.reconcile(&body, Some(&f.sign(&body))).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::UnknownPurchase { .. }));

        let other = br#"{"id":"evt_o","type":"customer_updated","data":{"session_id":"cs_x"}}"#;
        let outcome = f.service.reconcile(other, Some(&f.sign(other))).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::IgnoredEventType {
                event_type: "customer_updated".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_pack_never_reaches_processor() {
        let mut processor = MockPaymentProcessor::new();
        processor.expect_create_checkout_session().times(0);
        let f = fixture(processor, MockConsentLogger::new());

        let err = f
            .service
            .initiate_purchase("u1", "hints_9999", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EconomyError::InvalidPackKey(_)));
    }

    #[tokio::test]
    async fn test_consent_failure_does_not_fail_checkout() {
        let mut consent = MockConsentLogger::new();
        consent
            .expect_log_purchase_consent()
            .times(1)
            .returning(|_, _, _| Err(EconomyError::Internal("consent store down".to_string())));
        let f = fixture(processor_returning("cs_10"), consent);

        let checkout = f
            .service
            .initiate_purchase(
                "u1",
                "hints_10",
                Some(ConsentMetadata {
                    terms_version: "2026-01".to_string(),
                    waived_withdrawal_right: true,
                    accepted_at: Utc::now(),
                }),
            )
            .await
            .unwrap();
        assert_eq!(checkout.payment_session_id, "cs_10");

        let purchase = f.service.get_purchase("u1", "cs_10").await.unwrap();
        assert!(purchase.consent.is_some());
    }

    #[tokio::test]
    async fn test_foreign_purchase_is_not_found() {
        let f = fixture(processor_returning("cs_10"), MockConsentLogger::new());
        f.service.initiate_purchase("owner", "hints_10", None).await.unwrap();

        let err = f.service.get_purchase("other", "cs_10").await.unwrap_err();
        assert!(matches!(err, EconomyError::PurchaseNotFound(_)));
    }
}
