//! 支付集成：提示包目录、回调事件、签名校验与支付方客户端

pub mod catalog;
pub mod event;
pub mod processor;
pub mod signature;

pub use catalog::{HintPack, PackCatalog};
pub use event::{PaymentEvent, PaymentEventKind};
pub use processor::{CheckoutRequest, CheckoutSession, HttpPaymentProcessor, PaymentProcessor};
pub use signature::{SIGNATURE_HEADER, SignatureVerifier};
