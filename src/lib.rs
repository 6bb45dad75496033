//! # Bildwald Backend Library
//!
//! Bildwald indexes photo and video directories for a self-hosted gallery and
//! keeps a square JPEG thumbnail cache consistent with them across repeated,
//! possibly interrupted scans.
//!
//! ## Architecture
//!
//! - **Axum**: HTTP server, routing and server-sent events
//! - **Tokio**: async runtime, external codec processes, blocking filesystem work
//! - **Serde**: JSON persistence of scan state and caches
//!
//! ## Core Components
//!
//! - [`identity`]: content-addressed file and album ids
//! - [`walker`]: recursive media enumeration with exclusion rules
//! - [`codec`]: thumbnail synthesis (image, HEIC fallback chain, video frame) and duration probing
//! - [`reconciler`]: orphan removal across thumbnails and auxiliary caches
//! - [`scanner`]: scan lock and the scan state machine
//! - [`broadcaster`]: fan-out of progress snapshots to live observers
//! - [`store`]: atomic JSON persistence for scan state, location and date caches
//! - [`library`]: read paths (id resolution, listing, media roots)
//! - [`config`], [`error`], [`metrics`], [`routes`], [`state`], [`types`]: service plumbing

pub mod broadcaster;
pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod library;
pub mod metrics;
pub mod reconciler;
pub mod routes;
pub mod scanner;
pub mod state;
pub mod store;
pub mod types;
pub mod walker;

#[cfg(test)]
mod tests;
