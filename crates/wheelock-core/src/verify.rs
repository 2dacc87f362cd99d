//! Hash gate between retrieved bytes and trust.

use crate::CoreError;
use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::debug;
use wheelock_schema::PackageFile;

/// Algorithms [`StandardDigests`] can compute.
pub const SUPPORTED_ALGORITHMS: &[&str] = &["sha256", "sha384", "sha512", "blake3"];

/// Computes a lowercase hex digest, or `None` for an unknown algorithm.
pub trait DigestComputer: Send + Sync {
    fn digest(&self, algorithm: &str, bytes: &[u8]) -> Option<String>;
}

/// SHA-2 family via `sha2`, plus BLAKE3.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDigests;

impl DigestComputer for StandardDigests {
    fn digest(&self, algorithm: &str, bytes: &[u8]) -> Option<String> {
        match algorithm {
            "sha256" => Some(hex::encode(Sha256::digest(bytes))),
            "sha384" => Some(hex::encode(Sha384::digest(bytes))),
            "sha512" => Some(hex::encode(Sha512::digest(bytes))),
            "blake3" => Some(blake3::hash(bytes).to_hex().to_string()),
            _ => None,
        }
    }
}

/// The recorded digest that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub algorithm: String,
    pub digest: String,
}

/// Trust `bytes` as `file` only if some recorded digest matches.
///
/// Every recorded algorithm the computer supports is tried; one match is
/// enough. No match, including the case where no recorded algorithm is
/// supported, is a `HashMismatch`.
pub fn verify(
    file: &PackageFile,
    bytes: &[u8],
    digests: &dyn DigestComputer,
) -> Result<Verified, CoreError> {
    let mut checked = Vec::new();
    for (algorithm, expected) in &file.hashes {
        let Some(actual) = digests.digest(algorithm, bytes) else {
            debug!("{}: skipping unsupported algorithm {algorithm}", file.filename());
            continue;
        };
        checked.push(algorithm.clone());
        if actual.eq_ignore_ascii_case(expected) {
            return Ok(Verified {
                algorithm: algorithm.clone(),
                digest: expected.to_string(),
            });
        }
    }
    Err(CoreError::HashMismatch {
        file: file.filename().to_owned(),
        checked,
    })
}
