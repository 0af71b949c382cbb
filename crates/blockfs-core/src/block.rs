//! Fixed-capacity blocks and the per-file chain that strings them together.
//!
//! A file's bytes live in an ordered `Vec<Block>`. Every block except the last
//! is full, so logical offset `o` sits in block `o / block_size` at position
//! `o % block_size`.

use crate::error::{BlockfsError, Result};

/// One fixed-capacity chunk of file data.
#[derive(Debug)]
pub struct Block {
    memory: Box<[u8]>,
    occupied: usize,
}

impl Block {
    fn allocate(capacity: usize) -> Result<Self> {
        let mut memory = Vec::new();
        memory
            .try_reserve_exact(capacity)
            .map_err(|_| BlockfsError::AllocationFailure("block"))?;
        memory.resize(capacity, 0);
        Ok(Self {
            memory: memory.into_boxed_slice(),
            occupied: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    fn is_full(&self) -> bool {
        self.occupied == self.memory.len()
    }

    fn bytes(&self) -> &[u8] {
        &self.memory[..self.occupied]
    }
}

/// Engine-wide cap on the number of live blocks.
///
/// `None` means the only limit is the allocator itself.
#[derive(Debug, Clone)]
pub(crate) struct BlockBudget {
    limit: Option<usize>,
    live: usize,
}

impl BlockBudget {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self { limit, live: 0 }
    }

    fn take(&mut self) -> Result<()> {
        match self.limit {
            Some(limit) if self.live >= limit => {
                Err(BlockfsError::AllocationFailure("block budget"))
            }
            _ => {
                self.live += 1;
                Ok(())
            }
        }
    }

    pub(crate) fn give_back(&mut self, blocks: usize) {
        self.live = self.live.saturating_sub(blocks);
    }

    pub(crate) fn reset(&mut self) {
        self.live = 0;
    }

    #[cfg(test)]
    pub(crate) fn live(&self) -> usize {
        self.live
    }
}

/// Ordered blocks holding one file's contents.
#[derive(Debug)]
pub struct BlockChain {
    blocks: Vec<Block>,
    block_size: usize,
    size: usize,
}

impl BlockChain {
    pub fn new(block_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            block_size,
            size: 0,
        }
    }

    /// Total bytes stored.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Occupancy of each block, front to back.
    pub fn layout(&self) -> Vec<usize> {
        self.blocks.iter().map(Block::occupied).collect()
    }

    /// Copy `data` into the chain starting at `offset`.
    ///
    /// Bytes below the current size are overwritten in place; the rest is
    /// appended, growing the chain a block at a time. The write is clamped so
    /// the file never exceeds `limit` bytes, and fails with
    /// `SizeLimitExceeded` only if nothing fits. A failed block allocation
    /// aborts the call but keeps whatever was already copied.
    pub(crate) fn write_at(
        &mut self,
        offset: usize,
        data: &[u8],
        limit: usize,
        budget: &mut BlockBudget,
    ) -> Result<usize> {
        debug_assert!(offset <= self.size, "write past end of file");
        let offset = offset.min(self.size);

        if data.is_empty() {
            return Ok(0);
        }

        let room = limit.saturating_sub(offset);
        if room == 0 {
            return Err(BlockfsError::SizeLimitExceeded { limit });
        }
        let data = &data[..data.len().min(room)];

        let mut written = 0;

        // Overwrite phase: walk the occupied range.
        while written < data.len() && offset + written < self.size {
            let pos = offset + written;
            let block = &mut self.blocks[pos / self.block_size];
            let within = pos % self.block_size;
            let n = (block.occupied - within).min(data.len() - written);
            block.memory[within..within + n].copy_from_slice(&data[written..written + n]);
            written += n;
        }

        // Append phase: fill the tail block, then grow.
        while written < data.len() {
            if self.blocks.last().map_or(true, Block::is_full) {
                self.grow(budget)?;
            }
            let Some(block) = self.blocks.last_mut() else {
                break;
            };
            let start = block.occupied;
            let n = (block.capacity() - start).min(data.len() - written);
            block.memory[start..start + n].copy_from_slice(&data[written..written + n]);
            block.occupied += n;
            self.size += n;
            written += n;
        }

        Ok(written)
    }

    fn grow(&mut self, budget: &mut BlockBudget) -> Result<()> {
        self.blocks
            .try_reserve(1)
            .map_err(|_| BlockfsError::AllocationFailure("block list"))?;
        budget.take()?;
        match Block::allocate(self.block_size) {
            Ok(block) => {
                self.blocks.push(block);
                Ok(())
            }
            Err(e) => {
                budget.give_back(1);
                Err(e)
            }
        }
    }

    /// Copy bytes starting at `offset` into `buf`, stopping at end of file.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        if offset >= self.size {
            return 0;
        }

        let want = buf.len().min(self.size - offset);
        let mut read = 0;
        while read < want {
            let pos = offset + read;
            let block = &self.blocks[pos / self.block_size];
            let within = pos % self.block_size;
            let src = &block.bytes()[within..];
            let n = src.len().min(want - read);
            buf[read..read + n].copy_from_slice(&src[..n]);
            read += n;
        }
        read
    }
}
