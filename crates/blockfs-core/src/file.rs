//! Named files and the generational table that owns them.
//!
//! Files live in an arena of slots addressed by [`FileId`]. Each slot carries a
//! generation that is bumped when its file is destroyed, so an id held past
//! destruction resolves to `NoSuchFile` instead of a recycled file.
//!
//! References from descriptors are [`FileRef`] tokens. A token is minted by
//! [`FileTable::acquire`] and consumed by [`FileTable::release`]; since it is
//! neither `Clone` nor `Copy`, a reference cannot be dropped twice.

use std::collections::HashMap;

use crate::block::BlockChain;
use crate::error::{BlockfsError, Result};

/// Arena address of a file: slot index plus the slot's generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    index: usize,
    generation: u32,
}

/// Counted reference held by an open descriptor.
#[derive(Debug, PartialEq, Eq)]
pub struct FileRef {
    id: FileId,
}

impl FileRef {
    pub fn id(&self) -> FileId {
        self.id
    }
}

#[derive(Debug)]
pub struct File {
    name: String,
    chain: BlockChain,
    ref_count: usize,
    tombstoned: bool,
}

impl File {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.chain.size()
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned
    }

    pub fn chain(&self) -> &BlockChain {
        &self.chain
    }

    pub(crate) fn chain_mut(&mut self) -> &mut BlockChain {
        &mut self.chain
    }
}

fn owned_name(name: &str) -> Result<String> {
    let mut owned = String::new();
    owned
        .try_reserve_exact(name.len())
        .map_err(|_| BlockfsError::AllocationFailure("file name"))?;
    owned.push_str(name);
    Ok(owned)
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    file: Option<File>,
}

/// Registry of files: the arena plus the name index of live ones.
#[derive(Debug, Default)]
pub struct FileTable {
    slots: Vec<Slot>,
    free: Vec<usize>,
    names: HashMap<String, FileId>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live (not tombstoned) file by exact name.
    pub fn resolve(&self, name: &str) -> Option<FileId> {
        self.names.get(name).copied()
    }

    /// Insert an empty file under `name`.
    ///
    /// The caller has already checked that `name` does not resolve.
    pub fn create(&mut self, name: &str, block_size: usize) -> Result<FileId> {
        debug_assert!(self.resolve(name).is_none());

        let oom = |_| BlockfsError::AllocationFailure("file");
        let file_name = owned_name(name)?;
        let index_key = owned_name(name)?;
        self.names.try_reserve(1).map_err(oom)?;

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.try_reserve(1).map_err(oom)?;
                self.free.try_reserve(self.slots.len() + 1).map_err(oom)?;
                self.slots.push(Slot::default());
                self.slots.len() - 1
            }
        };

        let slot = &mut self.slots[index];
        slot.file = Some(File {
            name: file_name,
            chain: BlockChain::new(block_size),
            ref_count: 0,
            tombstoned: false,
        });
        let id = FileId {
            index,
            generation: slot.generation,
        };
        self.names.insert(index_key, id);
        Ok(id)
    }

    pub fn get(&self, id: FileId) -> Result<&File> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.file.as_ref())
            .ok_or_else(|| BlockfsError::NoSuchFile(format!("<file #{}>", id.index)))
    }

    pub fn get_mut(&mut self, id: FileId) -> Result<&mut File> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.file.as_mut())
            .ok_or_else(|| BlockfsError::NoSuchFile(format!("<file #{}>", id.index)))
    }

    /// Take a counted reference on a file.
    pub fn acquire(&mut self, id: FileId) -> Result<FileRef> {
        let file = self.get_mut(id)?;
        file.ref_count += 1;
        Ok(FileRef { id })
    }

    /// Drop a counted reference.
    ///
    /// Returns the file if this was the last reference to a tombstoned file,
    /// in which case it has been removed from the arena.
    pub fn release(&mut self, file_ref: FileRef) -> Option<File> {
        let id = file_ref.id;
        let file = self.get_mut(id).ok()?;
        debug_assert!(file.ref_count > 0);
        file.ref_count = file.ref_count.saturating_sub(1);
        self.reap(id)
    }

    /// Unbind `name` and mark its file deleted. Blocks and refcount are untouched.
    pub fn tombstone(&mut self, name: &str) -> Result<FileId> {
        let id = self
            .names
            .remove(name)
            .ok_or_else(|| BlockfsError::NoSuchFile(name.to_string()))?;
        self.get_mut(id)?.tombstoned = true;
        Ok(id)
    }

    /// Destroy a tombstoned file that nothing references any more.
    pub fn reap(&mut self, id: FileId) -> Option<File> {
        let file = self.get(id).ok()?;
        if file.tombstoned && file.ref_count == 0 {
            self.destroy(id.index)
        } else {
            None
        }
    }

    fn destroy(&mut self, index: usize) -> Option<File> {
        let slot = self.slots.get_mut(index)?;
        let file = slot.file.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        // Capacity for every slot was reserved when the slot was created.
        self.free.push(index);
        Some(file)
    }

    /// Destroy every file regardless of state. Returns how many blocks were freed.
    pub fn clear(&mut self) -> usize {
        self.names.clear();
        let mut blocks = 0;
        for index in 0..self.slots.len() {
            if let Some(file) = self.destroy(index) {
                blocks += file.chain.block_count();
            }
        }
        blocks
    }

    /// Iterate over every file still in the arena, tombstoned ones included.
    pub fn iter(&self) -> impl Iterator<Item = &File> {
        self.slots.iter().filter_map(|slot| slot.file.as_ref())
    }

    /// Names of live files, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_resolve() {
        let mut table = FileTable::new();
        let id = table.create("notes", 512).unwrap();

        assert_eq!(table.resolve("notes"), Some(id));
        assert_eq!(table.resolve("other"), None);

        let file = table.get(id).unwrap();
        assert_eq!(file.name(), "notes");
        assert_eq!(file.size(), 0);
        assert_eq!(file.ref_count(), 0);
        assert!(!file.is_tombstoned());
    }

    #[test]
    fn test_file_and_index_hold_separate_name_copies() {
        let mut table = FileTable::new();
        let id = table.create("journal", 512).unwrap();

        assert_eq!(owned_name("journal").unwrap(), "journal");
        assert_eq!(table.get(id).unwrap().name(), "journal");
        assert_eq!(table.names(), vec!["journal"]);

        table.tombstone("journal").unwrap();
        assert_eq!(table.get(id).unwrap().name(), "journal");
        assert!(table.names().is_empty());
    }

    #[test]
    fn test_tombstone_hides_name_but_keeps_file() {
        let mut table = FileTable::new();
        let id = table.create("f", 512).unwrap();
        let file_ref = table.acquire(id).unwrap();

        assert_eq!(table.tombstone("f").unwrap(), id);
        assert_eq!(table.resolve("f"), None);
        assert!(table.get(id).unwrap().is_tombstoned());
        assert!(table.reap(id).is_none());

        let destroyed = table.release(file_ref).expect("last reference destroys");
        assert_eq!(destroyed.name(), "f");
        assert!(matches!(table.get(id), Err(BlockfsError::NoSuchFile(_))));
    }

    #[test]
    fn test_tombstone_unknown_name() {
        let mut table = FileTable::new();
        assert_eq!(
            table.tombstone("ghost").unwrap_err(),
            BlockfsError::NoSuchFile("ghost".to_string())
        );
    }

    #[test]
    fn test_release_live_file_keeps_it() {
        let mut table = FileTable::new();
        let id = table.create("f", 512).unwrap();
        let file_ref = table.acquire(id).unwrap();

        assert!(table.release(file_ref).is_none());
        assert_eq!(table.get(id).unwrap().ref_count(), 0);
        assert_eq!(table.resolve("f"), Some(id));
    }

    #[test]
    fn test_recycled_slot_rejects_stale_id() {
        let mut table = FileTable::new();
        let old = table.create("a", 512).unwrap();
        table.tombstone("a").unwrap();
        assert!(table.reap(old).is_some());

        let new = table.create("b", 512).unwrap();

        assert_eq!(new.index, old.index);
        assert_ne!(new.generation, old.generation);
        assert!(table.get(old).is_err());
        assert_eq!(table.get(new).unwrap().name(), "b");
    }

    #[test]
    fn test_same_name_after_delete_is_a_new_file() {
        let mut table = FileTable::new();
        let first = table.create("f", 512).unwrap();
        let held = table.acquire(first).unwrap();
        table.tombstone("f").unwrap();

        let second = table.create("f", 512).unwrap();

        assert_ne!(first, second);
        assert_eq!(table.resolve("f"), Some(second));
        assert!(table.get(first).unwrap().is_tombstoned());
        table.release(held);
        assert!(table.get(first).is_err());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut table = FileTable::new();
        let a = table.create("a", 512).unwrap();
        table.create("b", 512).unwrap();
        let _held = table.acquire(a).unwrap();

        table.clear();
        assert_eq!(table.iter().count(), 0);
        assert!(table.names().is_empty());
        assert!(table.get(a).is_err());

        assert_eq!(table.clear(), 0);
    }

    #[test]
    fn test_names_sorted() {
        let mut table = FileTable::new();
        for name in ["zeta", "alpha", "mid"] {
            table.create(name, 512).unwrap();
        }
        assert_eq!(table.names(), vec!["alpha", "mid", "zeta"]);
    }
}
