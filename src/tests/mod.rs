//! Unit and integration tests for Bildwald.
//!
//! - **identity_tests**: file id derivation
//! - **walker_tests**: media enumeration and exclusion rules
//! - **codec_tests**: thumbnail artifact contract, HEIC chain order, raster path
//! - **reconciler_tests**: orphan cleanup
//! - **store_tests**: JSON persistence and caches
//! - **broadcaster_tests**: observer registry
//! - **scanner_tests**: scan state machine end to end
//! - **library_tests**: id resolution and listing
//! - **config_tests**, **error_tests**, **api_tests**: service plumbing
//!
//! Run a single module with `cargo test scanner_tests`.

pub mod support;

pub mod api_tests;
pub mod codec_tests;
