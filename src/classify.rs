//! Log classification: weighted signal scoring and fingerprint matching.

pub mod fingerprint;
pub mod scorer;

pub use fingerprint::{match_fingerprints, Fingerprint, FingerprintHit};
pub use scorer::score_logs;
