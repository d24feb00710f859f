//! Rate-limit counting for a certificate authority's storage layer.
//!
//! Records certificate issuances against registrable-domain buckets and new
//! orders against accounts, and answers "how many in `[from, to)`?" for the
//! policy layer that enforces thresholds.

pub mod bucket;
pub mod cancel;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod suffix;
