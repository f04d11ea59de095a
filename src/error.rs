//! Error types for repository access and per-branch ancestry resolution.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reaching the repository itself. These abort the whole run.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No repository was discovered at or above the given path.
    #[error("no git repository found at {}", .path.display())]
    NotFound { path: PathBuf },

    /// A repository exists but could not be opened.
    #[error("unable to open git repository at {}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    /// The local branch refs could not be enumerated.
    #[error("unable to list local branches")]
    Refs {
        #[source]
        source: git2::Error,
    },
}

/// Failures resolving a single branch's position in the tree.
///
/// These are reported per branch: the affected branch is shown as an annotated
/// root and the rest of the tree is still rendered.
#[derive(Debug, Error)]
pub enum AncestryError {
    /// The branch ref does not point at a readable commit.
    #[error("tip of '{branch}' does not resolve to a commit")]
    UnresolvedTip { branch: String },

    /// This branch's own history could not be walked, e.g. a parent commit
    /// object is missing.
    #[error("ancestry query for '{branch}' failed: {source}")]
    Query {
        branch: String,
        #[source]
        source: git2::Error,
    },

    /// The configured upstreams form a loop through this branch.
    #[error("upstream of '{branch}' loops back through: {}", .cycle.join(" -> "))]
    UpstreamCycle { branch: String, cycle: Vec<String> },
}
