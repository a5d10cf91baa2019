// src/error.rs
//! Flat error taxonomy for the asset and resource subsystem.
//!
//! Every fallible public operation returns a [`Result<T>`]. Error kinds are
//! never mapped onto panics or language-specific exceptions — a worker that
//! hits one of these posts it back to the main thread as a message instead
//! of unwinding.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Remediation hints attached to [`Error::AllocError`], so the caller (the
/// resource manager) can decide between growing the pool and defragmenting
/// it instead of just failing the allocation outright.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocErrorFlags {
    pub pool_out_of_memory: bool,
    pub alloc_size_greater_than_pool_size: bool,
    pub pool_fragmented: bool,
}

impl fmt::Display for AllocErrorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(3);
        if self.pool_out_of_memory {
            parts.push("pool_out_of_memory");
        }
        if self.alloc_size_greater_than_pool_size {
            parts.push("alloc_size_greater_than_pool_size");
        }
        if self.pool_fragmented {
            parts.push("pool_fragmented");
        }
        write!(f, "{}", parts.join("|"))
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    IOError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file not found: {}", .0.display())]
    FileNotFoundError(PathBuf),

    #[error("string conversion failed: {0}")]
    StringConversionError(String),

    #[error("parser contract violated: {0}")]
    ParserFail(String),

    #[error("pool allocation of {failed_size} bytes denied ({flags})")]
    AllocError {
        failed_size: usize,
        flags: AllocErrorFlags,
    },

    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),
}

impl Error {
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Error::FileNotFoundError(path.into());
        }
        Error::IOError {
            path: path.into(),
            source,
        }
    }

    #[inline]
    pub fn parser_fail(msg: impl Into<String>) -> Self {
        Error::ParserFail(msg.into())
    }

    #[inline]
    pub fn duplicate(what: impl Into<String>) -> Self {
        Error::DuplicateRegistration(what.into())
    }

    #[inline]
    pub fn string_conversion(msg: impl Into<String>) -> Self {
        Error::StringConversionError(msg.into())
    }

    #[inline]
    pub fn is_io(&self) -> bool {
        matches!(self, Error::IOError { .. } | Error::FileNotFoundError(_))
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::FileNotFoundError(_))
    }

    #[inline]
    pub fn is_alloc(&self) -> bool {
        matches!(self, Error::AllocError { .. })
    }

    #[inline]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::DuplicateRegistration(_))
    }

    #[inline]
    pub fn is_parser_fail(&self) -> bool {
        matches!(self, Error::ParserFail(_))
    }

    /// The [`AllocErrorFlags`], if this is an [`Error::AllocError`].
    pub fn alloc_flags(&self) -> Option<AllocErrorFlags> {
        match self {
            Error::AllocError { flags, .. } => Some(*flags),
            _ => None,
        }
    }
}

/// Convenient `Result` alias — use `crate::Result<T>` everywhere.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_error_flags_display_lists_only_set_flags() {
        let flags = AllocErrorFlags {
            pool_out_of_memory: true,
            alloc_size_greater_than_pool_size: false,
            pool_fragmented: true,
        };
        assert_eq!(flags.to_string(), "pool_out_of_memory|pool_fragmented");
    }

    #[test]
    fn predicates_match_their_variant() {
        let e = Error::AllocError {
            failed_size: 64,
            flags: AllocErrorFlags::default(),
        };
        assert!(e.is_alloc());
        assert!(!e.is_io());
    }

    #[test]
    fn io_constructor_maps_not_found_kind() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let e = Error::io("/tmp/missing.iasset", source);
        assert!(e.is_not_found());
    }
}
