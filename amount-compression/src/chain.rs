//! Chain collaborators: where amounts and block offsets come from.
//!
//! The pipeline only needs two things from a chain: the flat array of
//! output amounts, and for every block the index of its first amount in
//! that array. [`InMemoryChain`] holds both directly; [`FlatFileChain`]
//! reads them from a directory of little-endian `i64` records.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::ChainError;

/// File holding one little-endian `i64` per output amount.
pub const AMOUNTS_FILE: &str = "amounts.bin";

/// File holding one little-endian `i64` per block: the first amount index.
pub const BLOCK_OFFSETS_FILE: &str = "block_offsets.bin";

/// Block height → first amount index.
pub trait BlockIndex {
    /// Chain height + 1.
    fn block_count(&self) -> usize;

    /// Index of the first amount of block `height`. Non-decreasing in height.
    fn first_amount_index(&self, height: usize) -> Result<i64, ChainError>;
}

/// The complete amount array, loaded once.
pub trait AmountSource {
    fn load_amounts(&self) -> Result<Vec<i64>, ChainError>;
}

/// A chain held entirely in memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InMemoryChain {
    pub amounts: Vec<i64>,
    pub block_offsets: Vec<i64>,
}

impl InMemoryChain {
    pub fn new(amounts: Vec<i64>, block_offsets: Vec<i64>) -> Self {
        Self {
            amounts,
            block_offsets,
        }
    }

    /// Build a chain from per-block amount lists.
    pub fn from_blocks<I>(blocks: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<[i64]>,
    {
        let mut chain = Self::default();
        for block in blocks {
            chain.block_offsets.push(chain.amounts.len() as i64);
            chain.amounts.extend_from_slice(block.as_ref());
        }
        chain
    }
}

impl BlockIndex for InMemoryChain {
    fn block_count(&self) -> usize {
        self.block_offsets.len()
    }

    fn first_amount_index(&self, height: usize) -> Result<i64, ChainError> {
        self.block_offsets
            .get(height)
            .copied()
            .ok_or(ChainError::OffsetOutOfRange {
                height,
                offset: -1,
                amounts: self.amounts.len(),
            })
    }
}

impl AmountSource for InMemoryChain {
    fn load_amounts(&self) -> Result<Vec<i64>, ChainError> {
        Ok(self.amounts.clone())
    }
}

/// A chain stored as two flat files in a directory.
///
/// Offsets are read eagerly on open; amounts are read by [`AmountSource::load_amounts`].
#[derive(Clone, Debug)]
pub struct FlatFileChain {
    dir: PathBuf,
    block_offsets: Vec<i64>,
}

impl FlatFileChain {
    pub fn open(dir: &Path) -> Result<Self, ChainError> {
        let block_offsets = read_i64s(&dir.join(BLOCK_OFFSETS_FILE))?;
        if block_offsets.is_empty() {
            return Err(ChainError::Empty);
        }
        info!(dir = %dir.display(), blocks = block_offsets.len(), "Opened flat-file chain");
        Ok(Self {
            dir: dir.to_path_buf(),
            block_offsets,
        })
    }

    /// Write a chain in the layout [`FlatFileChain::open`] expects.
    pub fn write(dir: &Path, chain: &InMemoryChain) -> Result<(), ChainError> {
        write_i64s(&dir.join(AMOUNTS_FILE), &chain.amounts)?;
        write_i64s(&dir.join(BLOCK_OFFSETS_FILE), &chain.block_offsets)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl BlockIndex for FlatFileChain {
    fn block_count(&self) -> usize {
        self.block_offsets.len()
    }

    fn first_amount_index(&self, height: usize) -> Result<i64, ChainError> {
        self.block_offsets
            .get(height)
            .copied()
            .ok_or(ChainError::OffsetOutOfRange {
                height,
                offset: -1,
                amounts: 0,
            })
    }
}

impl AmountSource for FlatFileChain {
    fn load_amounts(&self) -> Result<Vec<i64>, ChainError> {
        let amounts = read_i64s(&self.dir.join(AMOUNTS_FILE))?;
        info!(amounts = amounts.len(), "Loaded amounts");
        Ok(amounts)
    }
}

fn read_i64s(path: &Path) -> Result<Vec<i64>, ChainError> {
    let bytes = fs::read(path).map_err(|source| ChainError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.len() % 8 != 0 {
        return Err(ChainError::Truncated {
            path: path.to_path_buf(),
            len: bytes.len() as u64,
        });
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            i64::from_le_bytes(buf)
        })
        .collect())
}

fn write_i64s(path: &Path, values: &[i64]) -> Result<(), ChainError> {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    fs::write(path, bytes).map_err(|source| ChainError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_blocks_offsets() {
        let chain = InMemoryChain::from_blocks([vec![1, 2], vec![], vec![3]]);
        assert_eq!(chain.amounts, vec![1, 2, 3]);
        assert_eq!(chain.block_offsets, vec![0, 2, 2]);
        assert_eq!(chain.block_count(), 3);
        assert_eq!(chain.first_amount_index(2).unwrap(), 2);
        assert!(chain.first_amount_index(3).is_err());
    }

    #[test]
    fn test_flat_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let chain = InMemoryChain::from_blocks([vec![0, -5, i64::MAX], vec![100]]);
        FlatFileChain::write(dir.path(), &chain).unwrap();

        let opened = FlatFileChain::open(dir.path()).unwrap();
        assert_eq!(opened.block_count(), 2);
        assert_eq!(opened.first_amount_index(1).unwrap(), 3);
        assert_eq!(opened.load_amounts().unwrap(), chain.amounts);
    }

    #[test]
    fn test_flat_file_truncated() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(BLOCK_OFFSETS_FILE), [0u8; 12]).unwrap();
        assert!(matches!(
            FlatFileChain::open(dir.path()),
            Err(ChainError::Truncated { len: 12, .. })
        ));
    }

    #[test]
    fn test_flat_file_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(FlatFileChain::open(&missing), Err(ChainError::Io { .. })));
    }

    #[test]
    fn test_flat_file_empty_chain() {
        let dir = TempDir::new().unwrap();
        FlatFileChain::write(dir.path(), &InMemoryChain::default()).unwrap();
        assert!(matches!(FlatFileChain::open(dir.path()), Err(ChainError::Empty)));
    }
}
