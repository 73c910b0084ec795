// --- File: crates/tunnelgate_payment/src/lib.rs ---
//! Payment gateway client: payment creation, status lookups and verification
//! of signed settlement webhooks.

pub mod client;
pub mod error;
pub mod service;
pub mod webhook;

pub use client::PaymentClient;
pub use error::PaymentError;
pub use webhook::SIGNATURE_HEADER;
