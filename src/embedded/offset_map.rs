//! Original offset → shadow body offset table.

use std::cmp::min;

/// `table[i]` is the offset in the shadow body of original offset `i`.
///
/// The table has one entry per original byte plus one for the end of the
/// text, starts at 0 and never decreases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetMap {
    table: Vec<usize>,
}

impl OffsetMap {
    /// Identity mapping for a text of `len` bytes.
    pub fn identity(len: usize) -> Self {
        Self {
            table: (0..=len).collect(),
        }
    }

    /// Length of the original text.
    pub fn original_len(&self) -> usize {
        self.table.len() - 1
    }

    /// Length of the shadow body.
    pub fn shadow_len(&self) -> usize {
        self.table.last().copied().unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.table
    }

    pub fn shadow_offset(&self, original: usize) -> Option<usize> {
        self.table.get(original).copied()
    }

    /// Greatest original offset mapping exactly to `shadow`; `None` for
    /// shadow text inserted by a rewrite.
    pub fn original_offset(&self, shadow: usize) -> Option<usize> {
        let after = self.table.partition_point(|&v| v <= shadow);
        let candidate = after.checked_sub(1)?;
        (self.table[candidate] == shadow).then_some(candidate)
    }

    /// Records that original `[start, end)`, currently at
    /// `table[start]..table[end]` in the shadow body, was replaced by
    /// `new_len` bytes.
    pub fn apply_rewrite(&mut self, start: usize, end: usize, new_len: usize) {
        let len = self.original_len();
        if start > end || end > len {
            return;
        }
        let adjusted_start = self.table[start];
        let adjusted_end = self.table[end];
        let old_len = adjusted_end - adjusted_start;

        for i in start + 1..end {
            self.table[i] = adjusted_start + min(i - start, new_len);
        }
        if new_len >= old_len {
            let delta = new_len - old_len;
            for entry in &mut self.table[end..] {
                *entry += delta;
            }
        } else {
            let delta = old_len - new_len;
            for entry in &mut self.table[end..] {
                *entry -= delta;
            }
        }
    }

    pub fn is_monotonic(&self) -> bool {
        self.table.first() == Some(&0) && self.table.windows(2).all(|w| w[0] <= w[1])
    }
}
