use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::error::{BlockfsError, Result};
use crate::file::FileRef;

/// Small non-negative handle returned by `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Fd(pub usize);

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open file: the counted file reference plus a private cursor.
#[derive(Debug)]
pub struct Descriptor {
    file: FileRef,
    cursor: usize,
}

impl Descriptor {
    pub fn file(&self) -> &FileRef {
        &self.file
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    /// Give up the descriptor, handing back its file reference.
    pub fn into_file(self) -> FileRef {
        self.file
    }
}

/// Slot array of open descriptors.
///
/// Freed slots are emptied immediately and handed out again lowest-first.
#[derive(Debug, Default)]
pub struct DescriptorTable {
    slots: Vec<Option<Descriptor>>,
    free: BTreeSet<usize>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: BTreeSet::new(),
        }
    }

    /// Make sure the next [`allocate`](Self::allocate) will not need to grow.
    pub fn reserve(&mut self) -> Result<()> {
        if self.free.is_empty() {
            self.slots
                .try_reserve(1)
                .map_err(|_| BlockfsError::AllocationFailure("descriptor slot"))?;
        }
        Ok(())
    }

    /// Install a descriptor at the lowest free slot, cursor at 0.
    pub fn allocate(&mut self, file: FileRef) -> Fd {
        let descriptor = Descriptor { file, cursor: 0 };
        match self.free.pop_first() {
            Some(index) => {
                self.slots[index] = Some(descriptor);
                Fd(index)
            }
            None => {
                self.slots.push(Some(descriptor));
                Fd(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, fd: Fd) -> Result<&Descriptor> {
        self.slots
            .get(fd.0)
            .and_then(Option::as_ref)
            .ok_or(BlockfsError::InvalidDescriptor(fd))
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut Descriptor> {
        self.slots
            .get_mut(fd.0)
            .and_then(Option::as_mut)
            .ok_or(BlockfsError::InvalidDescriptor(fd))
    }

    /// Empty a slot and return what it held.
    pub fn release(&mut self, fd: Fd) -> Result<Descriptor> {
        let descriptor = self
            .slots
            .get_mut(fd.0)
            .and_then(Option::take)
            .ok_or(BlockfsError::InvalidDescriptor(fd))?;
        self.free.insert(fd.0);
        Ok(descriptor)
    }

    /// Drop every descriptor without touching the files they reference.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }

    /// Number of occupied slots.
    pub fn open_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}
