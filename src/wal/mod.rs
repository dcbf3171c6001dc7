//! Write-Ahead Buffer Module
//!
//! Batches index changes between commits.
//!
//! ## Responsibilities
//! - Record one delta per put/delete, in order
//! - Answer reads for keys changed since the last commit
//! - Hand the deltas to the index at commit time
//! - Recover uncommitted document blocks after a crash
//!
//! ## Durability
//! Document blocks are appended to the file before their delta is recorded,
//! so the file itself is the log. A commit writes index nodes, syncs and
//! bumps the header; whatever lies beyond the header's `data_end` is the
//! uncommitted tail that recovery scans on the next open.
//!
//! ```text
//! ┌────────┬──────────────────────────────┬──────────────────────────┐
//! │ Header │ committed blocks ... data_end│ uncommitted tail ... EOF │
//! └────────┴──────────────────────────────┴──────────────────────────┘
//! ```

mod buffer;
mod delta;
mod recovery;

pub use buffer::WriteAheadBuffer;
pub use delta::Delta;
pub use recovery::{RecoveryResult, WalRecovery};
