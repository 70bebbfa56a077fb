//! Opaque identifier generation.
//!
//! Share tokens are bearer credentials: 24 bytes from the thread-local
//! CSPRNG, hex-encoded to 48 characters (192 bits of entropy). Document
//! numbers only need to be unique and human-legible, not unguessable.

use chrono::Utc;
use rand::RngCore;

/// Unguessable, URL-safe share token for the anonymous approval page.
pub fn share_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn document_number(prefix: &str) -> String {
    let mut bytes = [0u8; 3];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "{}-{}-{}",
        prefix,
        Utc::now().format("%Y%m%d"),
        hex::encode(bytes).to_uppercase()
    )
}

pub fn proforma_number() -> String {
    document_number("PF")
}

pub fn order_number() -> String {
    document_number("ORD")
}

pub fn payment_reference() -> String {
    document_number("PAY")
}
