#![warn(missing_docs)]
//! AhOps sync engine
//!
//! Walks the AhOps storage maps page by page, caches what it finds and keeps the relay chain block
//! number fresh enough to turn unlock blocks into day estimates.
//!
//! Entrypoint: [`crate::sync::sync`]

pub mod address;
pub mod alias;
pub mod cache;
pub mod client;
pub mod clock;
pub mod connection;
pub mod error;
#[cfg(any(test, feature = "test-features"))]
pub mod mocks;
pub mod primitives;
pub mod schema;
pub mod sort;
pub mod submit;
pub mod sync;
pub mod watch;
