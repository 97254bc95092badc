//! dvx-tasks: the catalog-facing half of the system.
//!
//! The host owns the media catalog; this crate consumes it through the
//! [`Catalog`] trait and exposes three [`ScheduledTask`]s:
//!
//! - [`RemuxLibraryTask`] walks the library, classifies each item, and remuxes
//!   (optionally downmuxing first) those that need it
//! - [`VersionMergeTask`] links a discovered derived item back to its source
//!   as an alternate version
//! - [`CleanupTask`] deletes a derived item once both halves of the pair are
//!   confirmed watched by the primary user
//!
//! Classification itself lives in [`classify`] as pure predicates so each rule
//! is testable without a catalog or a subprocess.

pub mod catalog;
pub mod classify;
pub mod cleanup;
pub mod merge;
pub mod remux_task;
pub mod task;
pub mod testing;

pub use catalog::Catalog;
pub use classify::{classify, needs_cleanup, needs_merge, needs_remux, Disposition, SkipReason};
pub use cleanup::CleanupTask;
pub use merge::VersionMergeTask;
pub use remux_task::RemuxLibraryTask;
pub use task::{Progress, ScheduledTask, TaskTrigger};
