//! WhatsApp Cloud API: signed webhook in, Graph API out.

pub mod payload;
pub mod sender;
pub mod signature;
pub mod webhook;
pub mod worker;

pub use payload::{to_e164, WebhookPayload};
pub use sender::WhatsAppSender;
pub use signature::{signature_header, verify_signature, SIGNATURE_HEADER};
pub use webhook::{router, WebhookState};
pub use worker::{MessageWorker, QUEUE_CAPACITY};
