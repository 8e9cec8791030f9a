//! The orb's color cycle.
//!
//! A cycle is up to six regular palette indices followed by the
//! distinguished index, which is appended automatically and always sits in
//! the last slot. Updates that leave no usable entries fall back to
//! [`DEFAULT_CYCLE`].

use alloc::vec::Vec;

use crate::types::{DEFAULT_CYCLE, MAX_CYCLE_ENTRIES, PINK_INDEX};
use crate::wire::unpack_cycle_config;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleConfiguration {
    entries: Vec<u8>,
    position: usize,
}

impl Default for CycleConfiguration {
    fn default() -> Self {
        Self::from_indices(&DEFAULT_CYCLE)
    }
}

impl CycleConfiguration {
    /// Build a cycle from raw indices, starting at the first entry.
    pub fn from_indices(indices: &[u8]) -> Self {
        Self {
            entries: normalize(indices),
            position: 0,
        }
    }

    /// All entries, distinguished index last.
    pub fn entries(&self) -> &[u8] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: the distinguished entry is always present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Palette index at the current position.
    pub fn current(&self) -> u8 {
        self.entries.get(self.position).copied().unwrap_or(PINK_INDEX)
    }

    /// Step to the next entry, wrapping, and return its palette index.
    pub fn advance(&mut self) -> u8 {
        self.position = (self.position + 1) % self.entries.len().max(1);
        self.current()
    }

    pub fn position_of(&self, index: u8) -> Option<usize> {
        self.entries.iter().position(|&e| e == index)
    }

    /// Move to the slot holding `index`. Returns false if it is not in the cycle.
    pub fn select(&mut self, index: u8) -> bool {
        match self.position_of(index) {
            Some(pos) => {
                self.position = pos;
                true
            }
            None => false,
        }
    }

    /// Replace the entries from a cycle configuration word.
    ///
    /// The current palette index keeps its position if it survives the
    /// update; otherwise the position moves to the distinguished slot.
    pub fn apply_word(&mut self, word: i32) {
        self.apply_indices(&unpack_cycle_config(word));
    }

    /// Replace the entries from raw indices, keeping the position as
    /// `apply_word` does.
    pub fn apply_indices(&mut self, indices: &[u8]) {
        let old = self.current();
        self.entries = normalize(indices);
        self.position = self
            .position_of(old)
            .unwrap_or(self.entries.len() - 1);
    }
}

/// Drop reserved indices, collapse consecutive repeats, fall back to the
/// default when nothing is left, then append the distinguished index.
fn normalize(indices: &[u8]) -> Vec<u8> {
    let mut entries: Vec<u8> = indices
        .iter()
        .copied()
        .filter(|&i| i < PINK_INDEX)
        .take(MAX_CYCLE_ENTRIES)
        .collect();
    entries.dedup();
    if entries.is_empty() {
        entries.extend_from_slice(&DEFAULT_CYCLE);
    }
    entries.push(PINK_INDEX);
    entries
}
