//! Chat transport adapters for famcal.
//!
//! Signal arrives over the `signal-cli` JSON-RPC daemon, WhatsApp over the Cloud API webhook.
//! Both feed [`IngressEvent`]s into the [`InboundMessageService`], which applies the family
//! gate and hands text messages to the agent runtime.

pub mod gate;
pub mod pool;
pub mod service;
pub mod signal;
pub mod whatsapp;

pub use gate::{AccessGate, GateDecision, RejectionCache};
pub use pool::IngressPool;
pub use service::{InboundMessageService, IngressEvent, IngressOutcome};
