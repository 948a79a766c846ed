//! In-memory table engine core: a multi-index DML executor (the
//! "space") plus a write-ahead-log/checkpoint retention coordinator
//! (the "GC coordinator").
//!
//! The network decoder, the WAL writer and replicator, the
//! transaction manager, on-disk snapshot layout, tuple byte encoding,
//! and the individual index data structures beyond this crate's own
//! {hash, tree, r-tree, bitset} implementations are all external
//! collaborators consumed through small interfaces rather than owned
//! here.

#[macro_use]
pub mod error;

pub mod config;
pub mod extent;
pub mod format;
pub mod gc;
pub mod index;
pub mod key;
pub mod request;
pub mod row;
pub mod snapshot_iter;
pub mod space;
pub mod tuple;
pub mod update;
pub mod validate;
pub mod vclock;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use format::{FieldType, Format};
pub use index::{Index, IndexContract, IndexDef, IndexKind, IteratorType, ReplaceMode};
pub use key::{Key, KeyDef, KeyPart};
pub use request::{Opcode, Request, Statement};
pub use row::{FieldValue, Row};
pub use space::{RecoveryMode, Space};
pub use tuple::Tuple;
pub use vclock::Vclock;

#[cfg(test)]
#[path = "scenarios_test.rs"]
mod scenarios_test;
