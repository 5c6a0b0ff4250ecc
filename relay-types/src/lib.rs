//! # cipher-relay-types
//!
//! Wire format types for the cipher-relay message relay.
//!
//! Every frame exchanged with the relay, in either direction, is a single
//! JSON object with fixed field names:
//!
//! ```json
//! { "recipientID": "...", "senderID": "...", "encryptedContent": "..." }
//! ```
//!
//! The payload is opaque ciphertext; the relay never interprets it.
//!
//! This crate provides:
//! - [`UserId`] - validated (non-empty) user identifier
//! - [`Message`] - the wire message
//! - [`WireError`] - encoding/validation errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod message;

pub use error::WireError;
pub use ids::UserId;
pub use message::Message;
