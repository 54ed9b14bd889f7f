//! Error kinds: a struct wrapping a private enum with manual `Display`/`Error` impls, rather
//! than a `thiserror` derive.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    pub(crate) fn missing_field(path: String) -> Self {
        Error {
            kind: ErrorKind::MissingField { path },
        }
    }

    pub(crate) fn write(message: String, document: String) -> Self {
        Error {
            kind: ErrorKind::Write { message, document },
        }
    }

    pub(crate) fn id_downgrade(key: String) -> Self {
        Error {
            kind: ErrorKind::IdDowngrade { key },
        }
    }

    pub(crate) fn no_fragment_name() -> Self {
        Error {
            kind: ErrorKind::NoFragmentName,
        }
    }

    pub(crate) fn circular_query_key() -> Self {
        Error {
            kind: ErrorKind::CircularQueryKey,
        }
    }

    pub(crate) fn eviction_unsupported() -> Self {
        Error {
            kind: ErrorKind::EvictionUnsupported,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

/// The distinct error kinds this crate can report.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A required field was absent and `returnPartialData` was not set.
    MissingField { path: String },
    /// The writer refused to apply a result because it violated an invariant.
    Write { message: String, document: String },
    /// The writer refused to overwrite a real id with a generated one.
    IdDowngrade { key: String },
    /// `readFragment`/`writeFragment` was given a multi-fragment document without naming which
    /// fragment to use.
    NoFragmentName,
    /// The canonical-key builder detected a cycle while walking the query AST.
    CircularQueryKey,
    /// `evict` was called; eviction is reserved but not implemented.
    EvictionUnsupported,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::MissingField { path } => {
                write!(f, "missing field required by query at `{path}`")
            }
            ErrorKind::Write { message, document } => {
                write!(f, "write failed: {message}\n  while writing:\n{document}")
            }
            ErrorKind::IdDowngrade { key } => write!(
                f,
                "refusing to overwrite record `{key}`, which has a real id, with a result carrying no id"
            ),
            ErrorKind::NoFragmentName => {
                f.write_str("document contains multiple fragments; a fragment name is required")
            }
            ErrorKind::CircularQueryKey => f.write_str("cycle detected while building a canonical query key"),
            ErrorKind::EvictionUnsupported => f.write_str("eviction is not supported by this cache"),
        }
    }
}

impl std::error::Error for Error {}
