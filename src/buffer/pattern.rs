//! Delimiter patterns with a precomputed failure function.
//!
//! The failure table is built once when the detector is configured, so every
//! search over the ring buffer stays linear in the number of buffered bytes.

use bytes::Bytes;

/// A byte sequence prepared for linear-time substring search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern {
    bytes: Bytes,
    /// `failure[i]` = length of the longest proper prefix of `bytes[..=i]`
    /// that is also a suffix of it.
    failure: Vec<usize>,
}

impl Pattern {
    /// Build a pattern and its failure table.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let failure = failure_table(&bytes);
        Self { bytes, failure }
    }

    /// Get the raw delimiter bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Delimiter length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Empty patterns never match.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub(crate) fn failure(&self) -> &[usize] {
        &self.failure
    }
}

impl From<&[u8]> for Pattern {
    fn from(bytes: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(bytes))
    }
}

fn failure_table(pattern: &[u8]) -> Vec<usize> {
    let mut table = vec![0; pattern.len()];
    let mut k = 0;

    for i in 1..pattern.len() {
        while k > 0 && pattern[i] != pattern[k] {
            k = table[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        table[i] = k;
    }

    table
}
