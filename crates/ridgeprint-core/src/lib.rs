//! Fingerprint enrollment and verification.
//!
//! The [`fingerprint`] module holds the image pipeline (quality gate,
//! enhancement, skeleton minutiae, oriented binary descriptors) and the
//! rotation-aware matcher, together with the template store the pipeline
//! reads from and writes to.

pub mod errors;
pub mod fingerprint;
