//! Error types for property tree operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::node::NodeKind;

/// Result type alias for proptree operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while accessing or (re)loading a property tree.
///
/// Missing paths and undecodable scalar text are deliberately *not* errors:
/// reads fall back to the caller-supplied default so hand-edited
/// configuration degrades gracefully. What remains are contract violations
/// (kind mismatches) and backing-file failures.
#[derive(Debug, Error)]
pub enum Error {
    /// A node already committed to one composite kind was accessed as the
    /// other (keyed access on an array, indexed access on a map).
    #[error("node `{path}` is {actual}, accessed as {requested}")]
    KindMismatch {
        /// Dot-joined path of the offending node (empty for the root)
        path: String,
        /// The kind implied by the access
        requested: NodeKind,
        /// The kind the node is committed to
        actual: NodeKind,
    },

    /// A path segment addressed an array child but was not a valid index.
    #[error("segment `{segment}` of `{path}` does not index an array node")]
    BadIndexSegment {
        /// Dot-joined path of the array node
        path: String,
        /// The non-numeric segment
        segment: String,
    },

    /// Reading or writing the backing file failed.
    ///
    /// On reload this is raised before the in-memory tree is touched, so the
    /// prior tree contents stay intact.
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing document could not be parsed. No partial tree is
    /// published.
    #[error("malformed document: {message}")]
    Parse { message: String },

    /// The backing file parsed but contained no document.
    #[error("document is empty")]
    EmptyDocument,

    /// Load, reload, or save was requested on a tree with no backing file.
    #[error("tree has no backing file")]
    NoSource,
}

impl From<yaml_rust2::ScanError> for Error {
    fn from(err: yaml_rust2::ScanError) -> Self {
        Error::Parse {
            message: err.to_string(),
        }
    }
}
