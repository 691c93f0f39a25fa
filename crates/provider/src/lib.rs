//! HTTP client for the external GPU generation provider.
//!
//! The provider runs generation jobs asynchronously: submission returns
//! an opaque job handle immediately, and the outcome arrives later via a
//! webhook callback or a status poll against the same handle.
//!
//! - [`client`] — the REST client (submit, status poll).
//! - [`types`] — wire payloads and the provider status vocabulary.

pub mod client;
pub mod types;

pub use client::{ProviderClient, ProviderError};
pub use types::{ProviderJobStatus, SubmitJobRequest, SubmitJobResponse, WebhookPayload};
