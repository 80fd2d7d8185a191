//! Block and epoch partitioning of the amount array.
//!
//! Both the sampling pass and the simulation pass take their block ranges
//! and epoch numbers from the same [`BlockLayout`], so peak sets trained on
//! an epoch are always applied to exactly that epoch's amounts.

use std::ops::Range;

use crate::chain::BlockIndex;
use crate::error::{ChainError, ConfigError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockLayout {
    starts: Vec<usize>,
    amount_count: usize,
    blocks_per_epoch: usize,
}

impl BlockLayout {
    /// Validate raw offsets against the amount array length.
    pub fn from_offsets(
        offsets: &[i64],
        amount_count: usize,
        blocks_per_epoch: usize,
    ) -> Result<Self> {
        if blocks_per_epoch == 0 {
            return Err(ConfigError::Invalid("blocks_per_epoch must be positive".into()).into());
        }
        if offsets.is_empty() {
            return Err(ChainError::Empty.into());
        }

        let mut starts = Vec::with_capacity(offsets.len());
        let mut previous = 0i64;
        for (height, &offset) in offsets.iter().enumerate() {
            if offset < 0 || offset as u64 > amount_count as u64 {
                return Err(ChainError::OffsetOutOfRange {
                    height,
                    offset,
                    amounts: amount_count,
                }
                .into());
            }
            if offset < previous {
                return Err(ChainError::NonMonotonicOffset {
                    height,
                    previous,
                    offset,
                }
                .into());
            }
            starts.push(offset as usize);
            previous = offset;
        }

        Ok(Self {
            starts,
            amount_count,
            blocks_per_epoch,
        })
    }

    /// Read every block's offset from a [`BlockIndex`].
    pub fn from_index(
        index: &dyn BlockIndex,
        amount_count: usize,
        blocks_per_epoch: usize,
    ) -> Result<Self> {
        let offsets = (0..index.block_count())
            .map(|height| index.first_amount_index(height))
            .collect::<std::result::Result<Vec<_>, ChainError>>()?;
        Self::from_offsets(&offsets, amount_count, blocks_per_epoch)
    }

    pub fn block_count(&self) -> usize {
        self.starts.len()
    }

    pub fn amount_count(&self) -> usize {
        self.amount_count
    }

    pub fn blocks_per_epoch(&self) -> usize {
        self.blocks_per_epoch
    }

    /// Number of epochs, including a possibly partial last one.
    pub fn epoch_count(&self) -> usize {
        self.block_count() / self.blocks_per_epoch + 1
    }

    pub fn epoch_of(&self, height: usize) -> usize {
        height / self.blocks_per_epoch
    }

    /// Indices into the amount array owned by block `height`.
    ///
    /// The last block runs to the end of the array.
    pub fn amount_range(&self, height: usize) -> Range<usize> {
        let start = self.starts[height];
        let end = self
            .starts
            .get(height + 1)
            .copied()
            .unwrap_or(self.amount_count);
        start..end
    }
}
