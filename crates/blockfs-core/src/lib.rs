//! # blockfs-core
//!
//! In-memory block-structured file storage engine.
//!
//! Files are chains of fixed-size blocks reached through small integer
//! descriptors. Several descriptors may share one file, each with its own
//! cursor; a deleted file stays readable through them until the last one is
//! closed.
//!
//! ```
//! use blockfs_core::Engine;
//!
//! let mut engine = Engine::new();
//! let fd = engine.open("greeting", true).unwrap();
//! engine.write(fd, b"hello").unwrap();
//!
//! let reader = engine.open("greeting", false).unwrap();
//! assert_eq!(engine.read(reader, 16).unwrap(), b"hello");
//! ```

pub mod block;
pub mod engine;
pub mod error;
pub mod fd_table;
pub mod file;

pub use blockfs_config::{ConfigError, EngineConfig, BLOCK_SIZE, MAX_FILE_SIZE};
pub use engine::{Engine, EngineStats};
pub use error::{BlockfsError, ErrorCode, Result};
pub use fd_table::Fd;
