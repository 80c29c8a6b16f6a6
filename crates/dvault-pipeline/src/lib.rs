//! dvault-pipeline: the document pipeline
//!
//! Upload: validate → ensure signing key → encrypt → hash → HMAC → sign →
//! blob put → metadata create (blob deleted again if the record write fails).
//!
//! Download: record → access gate → blob get → HMAC → decrypt → hash →
//! signature. Each gate fails closed with its own error kind.

pub mod access;
pub mod pipeline;

pub use access::{StaticUserState, UserState};
pub use pipeline::{CheckStatus, DocumentPipeline, VerificationReport};
