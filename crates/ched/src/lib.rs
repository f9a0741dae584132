//! A chat client for the course assistant backend.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to embed the chat session into your own host apps.

#![deny(missing_docs)]

pub mod commands;

use ched_core::SessionBuilder;
use ched_http_backend::{HttpBackend, HttpBackendConfig};

/// Re-exports of [`ched_core`] crate.
pub mod core {
    pub use ched_core::*;
}

/// Re-exports of [`ched_http_backend`] crate.
pub mod http {
    pub use ched_http_backend::*;
}

/// Creates a session builder talking to the backend described by `config`.
#[inline]
pub fn connect(config: HttpBackendConfig) -> SessionBuilder {
    SessionBuilder::with_backend(HttpBackend::new(config))
}
