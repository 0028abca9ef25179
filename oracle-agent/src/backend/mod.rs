//! Oracle service abstraction layer.
//!
//! Provides a trait-based interface over the remote ledger writer:
//! - HTTP/JSON oracle service
//! - In-process mock backend for testing

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpBackend;
pub use mock::MockBackend;
pub use traits::{BackendError, ConsultRequest, OracleBackend};
