//! The public face of the storage engine.
//!
//! An [`Engine`] owns both registries. Each instance is independent, so tests
//! and embedders can run as many as they like side by side.

use blockfs_config::{
    log_engine_debug, log_engine_info, log_engine_warn, ConfigError, EngineConfig,
};
use serde::Serialize;
use tracing::instrument;

use crate::block::BlockBudget;
use crate::error::{BlockfsError, ErrorCode, Result};
use crate::fd_table::{DescriptorTable, Fd};
use crate::file::{File, FileTable};

/// Point-in-time counters for an engine instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub live_files: usize,
    pub tombstoned_files: usize,
    pub blocks: usize,
    pub open_descriptors: usize,
    pub bytes_stored: usize,
}

/// In-memory block-structured file store.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    files: FileTable,
    descriptors: DescriptorTable,
    budget: BlockBudget,
    last_error: ErrorCode,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with 512-byte blocks and a 100 MiB file size limit.
    pub fn new() -> Self {
        Self::build(EngineConfig::default())
    }

    /// Engine with custom geometry. Rejects a config that fails
    /// [`EngineConfig::validate`].
    pub fn with_config(config: EngineConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        Self {
            files: FileTable::new(),
            descriptors: DescriptorTable::with_capacity(config.initial_descriptors),
            budget: BlockBudget::new(config.max_blocks),
            last_error: ErrorCode::NoError,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open `name`, creating it first when `create` is set.
    ///
    /// Every call yields a fresh descriptor with its cursor at 0.
    pub fn open(&mut self, name: &str, create: bool) -> Result<Fd> {
        let result = self.open_inner(name, create);
        self.record(result)
    }

    fn open_inner(&mut self, name: &str, create: bool) -> Result<Fd> {
        if name.is_empty() {
            return Err(BlockfsError::NoSuchFile(String::new()));
        }

        let id = match self.files.resolve(name) {
            Some(id) => id,
            None if create => {
                let id = self.files.create(name, self.config.block_size)?;
                log_engine_debug!("File created", name = name);
                id
            }
            None => return Err(BlockfsError::NoSuchFile(name.to_string())),
        };

        self.descriptors.reserve()?;
        let file_ref = self.files.acquire(id)?;
        let fd = self.descriptors.allocate(file_ref);
        log_engine_debug!("Descriptor allocated", fd = fd.0, name = name);
        Ok(fd)
    }

    /// Write `data` at the descriptor's cursor and advance it by the count written.
    ///
    /// The count is short when the file size limit cuts the write off.
    #[instrument(skip(self, data), level = "debug", fields(len = data.len()))]
    pub fn write(&mut self, fd: Fd, data: &[u8]) -> Result<usize> {
        let result = self.write_inner(fd, data);
        self.record(result)
    }

    fn write_inner(&mut self, fd: Fd, data: &[u8]) -> Result<usize> {
        let limit = self.config.max_file_size;
        let descriptor = self.descriptors.get_mut(fd)?;
        let file = self.files.get_mut(descriptor.file().id())?;

        let written = file
            .chain_mut()
            .write_at(descriptor.cursor(), data, limit, &mut self.budget)?;
        descriptor.advance(written);

        if written < data.len() {
            log_engine_warn!(
                "Short write at file size limit",
                fd = fd.0,
                requested = data.len(),
                written = written,
                limit = limit,
            );
        }
        Ok(written)
    }

    /// Read up to `max_len` bytes from the descriptor's cursor.
    ///
    /// Returns an empty buffer at end of file.
    #[instrument(skip(self), level = "debug")]
    pub fn read(&mut self, fd: Fd, max_len: usize) -> Result<Vec<u8>> {
        let result = self.read_inner(fd, max_len);
        self.record(result)
    }

    fn read_inner(&mut self, fd: Fd, max_len: usize) -> Result<Vec<u8>> {
        let descriptor = self.descriptors.get_mut(fd)?;
        let file = self.files.get(descriptor.file().id())?;

        let available = file.size().saturating_sub(descriptor.cursor());
        let len = max_len.min(available);
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| BlockfsError::AllocationFailure("read buffer"))?;
        buf.resize(len, 0);

        let n = file.chain().read_at(descriptor.cursor(), &mut buf);
        buf.truncate(n);
        descriptor.advance(n);
        Ok(buf)
    }

    /// Read into a caller-supplied buffer, returning the byte count.
    pub fn read_into(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let result = self.read_into_inner(fd, buf);
        self.record(result)
    }

    fn read_into_inner(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let descriptor = self.descriptors.get_mut(fd)?;
        let file = self.files.get(descriptor.file().id())?;
        let n = file.chain().read_at(descriptor.cursor(), buf);
        descriptor.advance(n);
        Ok(n)
    }

    /// Close a descriptor. The last close of a deleted file destroys it.
    pub fn close(&mut self, fd: Fd) -> Result<()> {
        let result = self.close_inner(fd);
        self.record(result)
    }

    fn close_inner(&mut self, fd: Fd) -> Result<()> {
        let descriptor = self.descriptors.release(fd)?;
        log_engine_debug!("Descriptor released", fd = fd.0);
        if let Some(file) = self.files.release(descriptor.into_file()) {
            self.dispose(file);
        }
        Ok(())
    }

    /// Remove `name` from the namespace.
    ///
    /// Open descriptors keep working; storage is freed when the last one closes.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let result = self.delete_inner(name);
        self.record(result)
    }

    fn delete_inner(&mut self, name: &str) -> Result<()> {
        let id = self.files.tombstone(name)?;
        match self.files.reap(id) {
            Some(file) => self.dispose(file),
            None => log_engine_debug!(
                "File tombstoned, destruction deferred",
                name = name,
                refs = self.files.get(id).map(File::ref_count).unwrap_or(0),
            ),
        }
        Ok(())
    }

    /// Free every file and block and invalidate every descriptor.
    ///
    /// Safe to call repeatedly; the engine is empty and usable afterwards.
    pub fn destroy_all(&mut self) {
        let open = self.descriptors.open_count();
        self.descriptors.clear();
        let blocks = self.files.clear();
        self.budget.reset();
        self.last_error = ErrorCode::NoError;
        log_engine_info!("Engine torn down", descriptors = open, blocks = blocks);
    }

    /// Code of the most recent failed operation.
    pub fn last_error(&self) -> ErrorCode {
        self.last_error
    }

    /// Current size of the file behind `fd`.
    pub fn file_size(&self, fd: Fd) -> Result<usize> {
        let descriptor = self.descriptors.get(fd)?;
        Ok(self.files.get(descriptor.file().id())?.size())
    }

    /// Cursor position of `fd`.
    pub fn tell(&self, fd: Fd) -> Result<usize> {
        Ok(self.descriptors.get(fd)?.cursor())
    }

    /// Whether `name` currently resolves.
    pub fn exists(&self, name: &str) -> bool {
        self.files.resolve(name).is_some()
    }

    /// Names of all live files, sorted.
    pub fn file_names(&self) -> Vec<&str> {
        self.files.names()
    }

    /// Per-block occupancy of a live file.
    pub fn block_layout(&self, name: &str) -> Option<Vec<usize>> {
        let id = self.files.resolve(name)?;
        self.files.get(id).ok().map(|file| file.chain().layout())
    }

    pub fn stats(&self) -> EngineStats {
        let mut stats = EngineStats {
            open_descriptors: self.descriptors.open_count(),
            ..EngineStats::default()
        };
        for file in self.files.iter() {
            if file.is_tombstoned() {
                stats.tombstoned_files += 1;
            } else {
                stats.live_files += 1;
            }
            stats.blocks += file.chain().block_count();
            stats.bytes_stored += file.size();
        }
        stats
    }

    fn dispose(&mut self, file: File) {
        let blocks = file.chain().block_count();
        self.budget.give_back(blocks);
        log_engine_debug!(
            "File destroyed",
            name = file.name(),
            blocks = blocks,
            size = file.size(),
        );
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.last_error = e.code();
            log_engine_debug!("Operation failed", error = e.code().as_str());
        }
        result
    }
}
