//! Integration tests module
//!
//! End-to-end tests over an in-process cluster:
//! - Entry migration when segment ownership moves
//! - Retry and owner re-resolution during dispatch
//! - Supersession of in-flight schedule sweeps

pub mod fixtures;
pub mod migration_test;
pub mod retry_test;
pub mod supersession_test;
