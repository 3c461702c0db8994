//! Error types for tree hashes and tree resolution.

/// Errors produced while decoding or building a [`TreeHash`](crate::TreeHash).
///
/// Every variant reports the `BADHASH` code so callers can answer clients
/// with a single stable error code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeHashError {
    /// The input is not valid URL-safe base64.
    #[error("Invalid hash: bad base64 input")]
    Base64,

    /// The leading tag is not `mendel`.
    #[error("Invalid hash: not generated by mendel")]
    Magic,

    /// The version byte is not supported.
    #[error("Invalid hash: version mismatch, found {found}")]
    Version {
        /// The version byte found in the input.
        found: u8,
    },

    /// The branch list ran out of input before its terminator.
    #[error("Invalid hash: unterminated branch list")]
    Unterminated,

    /// Fewer than two bytes remained for the file count.
    #[error("Invalid hash: missing file count")]
    MissingFileCount,

    /// The trailing digest is not exactly 20 bytes.
    #[error("Invalid hash: short or missing sha, got {len} bytes")]
    Digest {
        /// Number of trailing bytes found.
        len: usize,
    },

    /// A branch index collides with the list terminator.
    #[error("Invalid hash: branch index {index} out of range")]
    BranchOutOfRange {
        /// The offending branch index.
        index: usize,
    },
}

impl TreeHashError {
    /// The stable error code reported to clients.
    pub fn code(&self) -> &'static str {
        "BADHASH"
    }
}

/// Errors produced while resolving a tree from variations or a hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The tree hash could not be decoded.
    #[error(transparent)]
    Hash(#[from] TreeHashError),

    /// A module has more variants than a branch byte can address.
    #[error("module {id} has {count} variants, more than a tree hash can address")]
    TooManyVariants {
        /// Normalized id of the module.
        id: String,
        /// Number of variants found.
        count: usize,
    },

    /// The tree has more files than the file count field can hold.
    #[error("tree has {count} files, more than a tree hash can address")]
    TooManyFiles {
        /// Number of files in the tree.
        count: usize,
    },

    /// The hash does not describe a tree of the current bundle graph.
    #[error("tree hash does not match the current build: {reason}")]
    Mismatch {
        /// What differed.
        reason: String,
    },
}

impl TreeError {
    /// The stable error code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            TreeError::Hash(e) => e.code(),
            TreeError::TooManyVariants { .. } | TreeError::TooManyFiles { .. } => "TREE",
            TreeError::Mismatch { .. } => "MISMATCH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_hash_error_is_badhash() {
        let errors = [
            TreeHashError::Base64,
            TreeHashError::Magic,
            TreeHashError::Version { found: 2 },
            TreeHashError::Unterminated,
            TreeHashError::MissingFileCount,
            TreeHashError::Digest { len: 3 },
            TreeHashError::BranchOutOfRange { index: 255 },
        ];
        for err in errors {
            assert_eq!(err.code(), "BADHASH");
            assert!(err.to_string().starts_with("Invalid hash:"));
        }
    }

    #[test]
    fn tree_error_display() {
        let err = TreeError::TooManyVariants {
            id: "main.js".into(),
            count: 300,
        };
        assert!(err.to_string().contains("main.js"));
        assert_eq!(err.code(), "TREE");

        let err = TreeError::from(TreeHashError::Magic);
        assert_eq!(err.code(), "BADHASH");
        assert_eq!(err.to_string(), "Invalid hash: not generated by mendel");
    }
}
