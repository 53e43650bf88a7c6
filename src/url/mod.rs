//! URL handling module
//!
//! Normalization used by fingerprinting and host extraction used by the
//! per-host throttle.

mod domain;
mod normalize;

pub use domain::extract_host;
pub use normalize::normalize_url;
