//! Query fingerprints.
//!
//! A fingerprint identifies the shape of a query together with its bound
//! variables. Sessions compare fingerprints to tell whether a caller handed
//! in a different query for an existing registration.

use crate::ast::{QueryNode, Variables};
use core::hash::{Hash, Hasher};

/// A simple hasher for computing query fingerprints.
/// Uses FNV-1a algorithm which is fast, stable across runs and has good
/// distribution.
#[derive(Default)]
struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    fn new() -> Self {
        Self {
            state: Self::FNV_OFFSET,
        }
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= *byte as u64;
            self.state = self.state.wrapping_mul(Self::FNV_PRIME);
        }
    }
}

/// Computes the fingerprint of a query and its variables.
///
/// Equal queries with equal bindings always share a fingerprint.
pub fn fingerprint(query: &QueryNode, variables: &Variables) -> u64 {
    let mut hasher = FnvHasher::new();
    hasher.write(b"query");
    query.hash(&mut hasher);
    hasher.write(b"vars");
    variables.hash(&mut hasher);
    hasher.finish()
}
