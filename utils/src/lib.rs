//! Shared infrastructure utilities for Glimpse.
//!
//! Cross-cutting helpers that several crates need but that don't belong in
//! the domain-pure `glimpse-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`security`**: Credential redaction for logs and error messages

pub mod atomic_write;
pub mod security;

pub use atomic_write::{
    AtomicWriteOptions, PersistMode, atomic_write, atomic_write_with_options, recover_bak_file,
};
pub use security::{SecretRedactor, redact_api_keys, sanitize_upstream_error};
