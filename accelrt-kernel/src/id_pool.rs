// SPDX-License-Identifier: AGPL-3.0-or-later
// AccelRT - Host-side Acceleration Runtime
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Fixed-capacity identifier pools
//!
//! Resources and sessions draw their IDs from separate pools. IDs are small
//! and reused so that companion tables stay dense; acquisition always hands
//! out the lowest ID not currently issued.

use crate::error::{AccelError, AccelResult};

/// Identifier issued by an [`IdPool`]. Valid IDs are `1..=capacity`.
pub type Id = u32;

/// Reserved "invalid / exhausted" identifier
pub const INVALID_ID: Id = 0;

const WORD_BITS: u32 = u64::BITS;

/// Bitmap-backed pool of reusable identifiers
#[derive(Debug)]
pub struct IdPool {
    capacity: u32,
    /// Bit `n` of the bitmap tracks ID `n + 1`; a set bit means issued.
    words: Vec<u64>,
    issued: u32,
}

impl IdPool {
    /// Create a pool issuing IDs `1..=capacity`
    pub fn new(capacity: u32) -> AccelResult<Self> {
        if capacity == 0 {
            return Err(AccelError::InvalidArgument(
                "ID pool capacity must be non-zero".into(),
            ));
        }

        let len = capacity.div_ceil(WORD_BITS) as usize;
        let mut words = Vec::new();
        words.try_reserve_exact(len).map_err(|e| {
            AccelError::OutOfMemory(format!("ID pool of {} slots: {}", capacity, e))
        })?;
        words.resize(len, 0);

        Ok(Self {
            capacity,
            words,
            issued: 0,
        })
    }

    /// Issue the lowest free ID, or `None` when the pool is exhausted
    pub fn acquire(&mut self) -> Option<Id> {
        let (index, word) = self
            .words
            .iter_mut()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)?;

        let bit = (!*word).trailing_zeros();
        let id = index as u32 * WORD_BITS + bit + 1;
        if id > self.capacity {
            // only the padding bits of the last word were free
            return None;
        }

        *word |= 1u64 << bit;
        self.issued += 1;
        Some(id)
    }

    /// Return an issued ID to the pool
    ///
    /// Releasing [`INVALID_ID`], an ID outside the pool, or an ID that is not
    /// currently issued is rejected without touching the bitmap.
    pub fn release(&mut self, id: Id) -> AccelResult<()> {
        if id == INVALID_ID || id > self.capacity {
            return Err(AccelError::InvalidArgument(format!(
                "ID {} outside pool range 1..={}",
                id, self.capacity
            )));
        }

        let (index, mask) = Self::slot(id);
        if self.words[index] & mask == 0 {
            return Err(AccelError::InvalidArgument(format!(
                "ID {} is not currently issued",
                id
            )));
        }

        self.words[index] &= !mask;
        self.issued -= 1;
        Ok(())
    }

    /// Whether `id` is currently issued
    pub fn is_issued(&self, id: Id) -> bool {
        if id == INVALID_ID || id > self.capacity {
            return false;
        }
        let (index, mask) = Self::slot(id);
        self.words[index] & mask != 0
    }

    /// Number of IDs the pool can issue
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of IDs currently issued
    pub fn issued(&self) -> u32 {
        self.issued
    }

    /// Free the backing storage, returning how many IDs were still issued
    pub fn destroy(self) -> u32 {
        if self.issued > 0 {
            tracing::debug!(
                issued = self.issued,
                capacity = self.capacity,
                "destroying ID pool with outstanding IDs"
            );
        }
        self.issued
    }

    fn slot(id: Id) -> (usize, u64) {
        let bit = id - 1;
        ((bit / WORD_BITS) as usize, 1u64 << (bit % WORD_BITS))
    }
}
