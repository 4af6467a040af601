//! Idempotency guard: deduplicates operations keyed by a caller-supplied
//! reference.
//!
//! The admission record itself is written by the store, atomically with the
//! caller's own insert; this module owns the operation fingerprint and the
//! replay-versus-conflict decision.

use crate::domain::ports::Admission;
use crate::error::{LedgerError, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, warn};

/// SHA-256 digest over an operation's canonical parameters, hex encoded.
///
/// Two requests with the same reference are a retry only if their
/// fingerprints match; otherwise the reference was reused for a logically
/// different operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_ref().as_bytes());
            // unit separator, so ["ab","c"] and ["a","bc"] digest differently
            hasher.update([0x1f]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request that passed the guard.
#[derive(Debug)]
pub enum Admitted<T> {
    /// First admission; side effects must run.
    Fresh(T),
    /// Identical retry; the stored record is returned without re-executing
    /// side effects.
    Replayed(T),
}

/// Evaluate a store admission against the incoming request's fingerprint.
pub fn resolve<T>(
    reference: &str,
    fingerprint: &Fingerprint,
    admission: Admission<T>,
) -> Result<Admitted<T>> {
    match admission {
        Admission::Created(record) => Ok(Admitted::Fresh(record)),
        Admission::Existing {
            record,
            fingerprint: stored,
        } => {
            if stored == fingerprint.as_str() {
                debug!(reference, "duplicate request replayed");
                Ok(Admitted::Replayed(record))
            } else {
                warn!(reference, "reference reused with different parameters");
                Err(LedgerError::ReferenceConflict(reference.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = Fingerprint::compute(["500", "USD", "payment"]);
        let b = Fingerprint::compute(["500", "USD", "payment"]);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_per_parameters() {
        let a = Fingerprint::compute(["500", "USD"]);
        let b = Fingerprint::compute(["501", "USD"]);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_separates_fields() {
        let a = Fingerprint::compute(["ab", "c"]);
        let b = Fingerprint::compute(["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_fresh_and_replayed() {
        let fp = Fingerprint::compute(["x"]);
        assert!(matches!(
            resolve("r1", &fp, Admission::Created(1)),
            Ok(Admitted::Fresh(1))
        ));
        assert!(matches!(
            resolve(
                "r1",
                &fp,
                Admission::Existing {
                    record: 1,
                    fingerprint: fp.as_str().to_string()
                }
            ),
            Ok(Admitted::Replayed(1))
        ));
    }

    #[test]
    fn resolve_rejects_mismatched_fingerprint() {
        let fp = Fingerprint::compute(["x"]);
        let result = resolve(
            "r1",
            &fp,
            Admission::Existing {
                record: 1,
                fingerprint: Fingerprint::compute(["y"]).as_str().to_string(),
            },
        );
        assert!(matches!(result, Err(LedgerError::ReferenceConflict(_))));
    }
}
