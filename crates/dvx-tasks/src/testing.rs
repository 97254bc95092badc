//! In-memory [`Catalog`] and item builders for tests.
//!
//! [`MemoryCatalog`] keeps everything behind one `parking_lot` lock and
//! records every write (persists, deletes, queued scans) so scenario tests
//! can assert on exactly what the tasks did.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;

use dvx_core::ids::{ItemId, UserId};
use dvx_core::media::{MediaItem, MediaSource, MediaStream, StreamKind, WatchState};
use dvx_core::Result;

use crate::catalog::Catalog;

#[derive(Default)]
struct State {
    items: Vec<MediaItem>,
    streams: HashMap<ItemId, Vec<MediaStream>>,
    sources: HashMap<ItemId, Vec<MediaSource>>,
    users: HashMap<String, UserId>,
    watch: HashMap<(UserId, ItemId), WatchState>,

    persisted: Vec<MediaItem>,
    deleted: Vec<(ItemId, bool)>,
    scans_queued: usize,
}

/// A catalog living entirely in memory.
#[derive(Default)]
pub struct MemoryCatalog {
    state: RwLock<State>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(
        &self,
        item: MediaItem,
        streams: Vec<MediaStream>,
        sources: Vec<MediaSource>,
    ) -> ItemId {
        let id = item.id;
        let mut state = self.state.write();
        state.streams.insert(id, streams);
        state.sources.insert(id, sources);
        state.items.push(item);
        id
    }

    pub fn add_user(&self, name: &str) -> UserId {
        let id = UserId::new();
        self.state.write().users.insert(name.to_string(), id);
        id
    }

    pub fn set_watched(&self, user: UserId, item: ItemId, played: bool) {
        let watch_state = if played {
            WatchState::played()
        } else {
            WatchState::default()
        };
        self.state.write().watch.insert((user, item), watch_state);
    }

    pub fn remove_item(&self, id: ItemId) {
        self.state.write().items.retain(|i| i.id != id);
    }

    /// Items as the catalog currently sees them.
    pub fn items(&self) -> Vec<MediaItem> {
        self.state.read().items.clone()
    }

    /// Every item handed to [`Catalog::persist`], in order.
    pub fn persisted(&self) -> Vec<MediaItem> {
        self.state.read().persisted.clone()
    }

    /// Every [`Catalog::delete_item`] call, in order.
    pub fn deleted(&self) -> Vec<(ItemId, bool)> {
        self.state.read().deleted.clone()
    }

    pub fn scans_queued(&self) -> usize {
        self.state.read().scans_queued
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn query_videos(&self, _ancestors: &[ItemId]) -> Result<Vec<MediaItem>> {
        Ok(self.state.read().items.clone())
    }

    async fn streams(&self, item: ItemId) -> Result<Vec<MediaStream>> {
        Ok(self.state.read().streams.get(&item).cloned().unwrap_or_default())
    }

    async fn media_sources(&self, item: ItemId) -> Result<Vec<MediaSource>> {
        Ok(self.state.read().sources.get(&item).cloned().unwrap_or_default())
    }

    async fn find_by_path(&self, path: &Path) -> Result<Option<MediaItem>> {
        Ok(self
            .state
            .read()
            .items
            .iter()
            .find(|i| i.path == path)
            .cloned())
    }

    async fn resolve_user(&self, name: &str) -> Result<Option<UserId>> {
        Ok(self.state.read().users.get(name).copied())
    }

    async fn watch_state(&self, user: UserId, item: ItemId) -> Result<WatchState> {
        Ok(self
            .state
            .read()
            .watch
            .get(&(user, item))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_item(&self, item: ItemId, delete_file: bool) -> Result<()> {
        let mut state = self.state.write();
        if delete_file {
            if let Some(entry) = state.items.iter().find(|i| i.id == item) {
                if entry.path.exists() {
                    std::fs::remove_file(&entry.path)?;
                }
            }
        }
        state.items.retain(|i| i.id != item);
        state.deleted.push((item, delete_file));
        Ok(())
    }

    async fn persist(&self, item: &MediaItem) -> Result<()> {
        let mut state = self.state.write();
        if let Some(existing) = state.items.iter_mut().find(|i| i.id == item.id) {
            *existing = item.clone();
        }
        state.persisted.push(item.clone());
        Ok(())
    }

    async fn queue_library_scan(&self) -> Result<()> {
        self.state.write().scans_queued += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn mkv_item(name: &str, path: impl Into<PathBuf>) -> MediaItem {
    MediaItem {
        id: ItemId::new(),
        name: name.to_string(),
        container: "mkv".to_string(),
        path: path.into(),
        primary_version_id: None,
        has_alternate_versions: false,
    }
}

pub fn mp4_item(name: &str, path: impl Into<PathBuf>) -> MediaItem {
    MediaItem {
        container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
        ..mkv_item(name, path)
    }
}

pub fn dovi_video_stream(profile: u8) -> MediaStream {
    MediaStream {
        index: 0,
        kind: StreamKind::Video,
        codec: "hevc".to_string(),
        language: None,
        dv_profile: Some(profile),
        dv_version_major: Some(1),
        is_text_subtitle: false,
    }
}

pub fn audio_stream(index: u32, codec: &str) -> MediaStream {
    MediaStream {
        index,
        kind: StreamKind::Audio,
        codec: codec.to_string(),
        language: Some("eng".to_string()),
        dv_profile: None,
        dv_version_major: None,
        is_text_subtitle: false,
    }
}

pub fn text_subtitle_stream(index: u32) -> MediaStream {
    MediaStream {
        index,
        kind: StreamKind::Subtitle,
        codec: "subrip".to_string(),
        language: Some("eng".to_string()),
        dv_profile: None,
        dv_version_major: None,
        is_text_subtitle: true,
    }
}

pub fn mkv_source(path: impl Into<PathBuf>) -> MediaSource {
    MediaSource {
        id: dvx_core::ids::MediaSourceId::new(),
        container: "mkv".to_string(),
        path: path.into(),
    }
}

pub fn mp4_source(path: impl Into<PathBuf>) -> MediaSource {
    MediaSource {
        container: "mp4".to_string(),
        ..mkv_source(path)
    }
}
