//! Crate-wide error type.
//!
//! Follows the `rdms` convention: a single flat `Error` enum and an
//! `err_at!` macro that stamps the file/line of the call site onto
//! whatever underlying failure is being wrapped, so diagnostics read the
//! same way regardless of which layer raised them.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the space executor, the index layer and the GC
/// coordinator.
///
/// Variant names mirror the client-visible error codes in spec §6 where
/// one exists (`NullablePrimary`, `Unsupported`, `ModifyIndex`,
/// `IndexType`, `CantUpdatePrimaryKey`, `UnknownRequestType`,
/// `Injection`), plus the generic index-layer errors (`DuplicateKey`,
/// `NotFound`) and two internal kinds (`Fatal`, `OutOfMemory`).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// A primary-key index was declared with a nullable part.
    NullablePrimary(String),
    /// A structural error (spec §7): bad key part count, malformed row
    /// encoding, a field-type mismatch against a space's format, or an
    /// index type that does not support the requested feature. Surfaced
    /// synchronously with no state change — never a reason to abort the
    /// process, unlike `Fatal`.
    Unsupported(String),
    /// `check_index_def` rejected an index definition; the string is the
    /// human-readable reason reported to the client.
    ModifyIndex(String),
    /// Unknown or unsupported index type.
    IndexType(String),
    /// UPSERT (or UPDATE) attempted to change the primary key.
    CantUpdatePrimaryKey,
    /// Request carried an operation code the executor doesn't recognize.
    UnknownRequestType(u32),
    /// Fault-injection hook fired.
    Injection(String),
    /// Uniqueness violation inside an index's `replace`.
    DuplicateKey(String),
    /// `replace`/`get`/`delete` target was not found.
    NotFound(String),
    /// Allocator slack ran out despite `ExtentReserve`; logically
    /// impossible per spec §5, reservation discipline — kept as a real
    /// variant rather than a panic so the rollback path in
    /// `space::all_keys_replace` can assert on it (spec §9 open question).
    OutOfMemory(String),
    /// A recovery-mode write path was driven outside its contract
    /// (`no_keys` invoked, or `apply_initial_join_row` saw a badly typed
    /// request after validation already should have caught it). The
    /// original engine `panic()`s here; we keep the distinction so
    /// callers can choose to abort the process themselves.
    Fatal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NullablePrimary(space) => {
                write!(f, "primary key of space {} can not be nullable", space)
            }
            Error::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            Error::ModifyIndex(msg) => write!(f, "cannot modify index: {}", msg),
            Error::IndexType(name) => write!(f, "unsupported index type for {}", name),
            Error::CantUpdatePrimaryKey => write!(f, "cannot update primary key"),
            Error::UnknownRequestType(code) => write!(f, "unknown request type {}", code),
            Error::Injection(point) => write!(f, "error injection at {}", point),
            Error::DuplicateKey(key) => write!(f, "duplicate key {}", key),
            Error::NotFound(key) => write!(f, "key {} not found", key),
            Error::OutOfMemory(msg) => write!(f, "out of memory: {}", msg),
            Error::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Wrap a fallible expression, stamping the call-site location onto the
/// error on failure. Mirrors the teacher crate's `err_at!` macro:
///
/// ```ignore
/// let idx = err_at!(NotFound, self.get(key), "key {:?}", key)?;
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err($crate::error::Error::$v(format!("{} {}", prefix, format!($($arg),+))))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::error::Error::$v(format!("{} {}", prefix, err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::error::Error::$v(format!(
                    "{} {} {}",
                    prefix, format!($($arg),+), err
                )))
            }
        }
    }};
}
