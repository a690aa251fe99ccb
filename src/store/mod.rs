//! Store Module - result state management
//!
//! Thread-safe storage for named operation results.
//! Uses DashMap for lock-free concurrent access.
//!
//! Key types:
//! - `ResultStore`: Slot reservation (queue time) and assignment (completion time)
//! - `ResultEntry`: `Scalar` for a single call, `Sequence` for repeated calls
//! - `Results`: Immutable snapshot handed to resolvers and returned by `go`

mod results;

// Re-export all public types
pub use results::{ResultEntry, ResultStore, Results};
