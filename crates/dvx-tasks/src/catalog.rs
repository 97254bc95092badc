//! The seam between this system and the host's media catalog.
//!
//! The catalog owns every item, stream, and watch flag; this trait is the
//! read-mostly view the tasks consume. The only writes are
//! [`Catalog::persist`] (primary-version link set by the merge task) and
//! [`Catalog::delete_item`] (cleanup task). Reads are a snapshot that may be
//! stale by the time a write lands, which is why the orchestrator re-checks
//! the final path on disk before renaming.

use std::path::Path;

use async_trait::async_trait;

use dvx_core::ids::{ItemId, UserId};
use dvx_core::media::{MediaItem, MediaSource, MediaStream, WatchState};
use dvx_core::Result;

#[async_trait]
pub trait Catalog: Send + Sync {
    /// All video items, optionally scoped to the given ancestor folders.
    /// An empty slice means the whole library.
    async fn query_videos(&self, ancestors: &[ItemId]) -> Result<Vec<MediaItem>>;

    /// Probed elementary streams of an item.
    async fn streams(&self, item: ItemId) -> Result<Vec<MediaStream>>;

    /// All file representations of an item, alternate versions included.
    async fn media_sources(&self, item: ItemId) -> Result<Vec<MediaSource>>;

    /// Look up a standalone item by its file path.
    async fn find_by_path(&self, path: &Path) -> Result<Option<MediaItem>>;

    /// Resolve a user name to an id; `None` when no such user exists.
    async fn resolve_user(&self, name: &str) -> Result<Option<UserId>>;

    /// Playback state of `item` for `user`.
    async fn watch_state(&self, user: UserId, item: ItemId) -> Result<WatchState>;

    /// Delete an item, and its backing file when `delete_file` is set.
    async fn delete_item(&self, item: ItemId, delete_file: bool) -> Result<()>;

    /// Write an item's primary-version link back to the catalog.
    async fn persist(&self, item: &MediaItem) -> Result<()>;

    /// Ask the host to rescan the library so freshly-written artifacts get
    /// discovered.
    async fn queue_library_scan(&self) -> Result<()>;
}
