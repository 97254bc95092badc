//! Pure classification predicates over catalog data views.
//!
//! The remux, merge, and cleanup rules share one data model but are three
//! independent predicates, each testable without a catalog or a subprocess.
//! The caller gathers the views (streams, sources, sibling lookups, watch
//! flags) and these functions only decide.
//!
//! Missing or corrupt probe data always excludes an item; classification
//! never errors.

use std::fmt;

use dvx_core::media::{source_path_of, MediaItem, MediaSource, MediaStream};

/// Why an item was not remuxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Item is not in the source container.
    NotMkv,
    /// No video stream carries a Dolby Vision profile.
    NoDolbyVision,
    /// A sibling MP4 source is already attached to the item.
    DerivedSourceExists,
    /// A standalone catalog item already sits at the derived path.
    DerivedItemExists,
    /// The primary user has already watched this item.
    WatchedByPrimary,
    /// The video is Profile 7 but downmuxing is disabled in config.
    DownmuxDisabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotMkv => "not an mkv",
            Self::NoDolbyVision => "no Dolby Vision video stream",
            Self::DerivedSourceExists => "derived mp4 source already attached",
            Self::DerivedItemExists => "item already exists at derived path",
            Self::WatchedByPrimary => "already watched by primary user",
            Self::DownmuxDisabled => "profile 7 but downmuxing disabled",
        };
        f.write_str(s)
    }
}

/// What the orchestrator should do with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Skip(SkipReason),
    /// Remux the source directly (Profile 8 and friends).
    DirectRemux,
    /// Run the downmux pipeline first, then remux with its artifact as the
    /// video input (Profile 7).
    DownmuxThenRemux,
}

/// Everything the classifier needs to know about one item, gathered by the
/// caller from the catalog.
#[derive(Debug, Clone, Copy)]
pub struct ItemView<'a> {
    pub item: &'a MediaItem,
    pub streams: &'a [MediaStream],
    pub sources: &'a [MediaSource],
    /// A standalone catalog item exists at the derived sibling path.
    pub derived_item_exists: bool,
    /// Watch flag for the primary user; `None` when no primary user is
    /// configured.
    pub watched_by_primary: Option<bool>,
}

/// Decide what to do with an item.
pub fn classify(view: ItemView<'_>, downmux_enabled: bool) -> Disposition {
    if !view.item.is_mkv() {
        return Disposition::Skip(SkipReason::NotMkv);
    }

    let Some(dovi) = view.streams.iter().find(|s| s.is_dovi_video()) else {
        return Disposition::Skip(SkipReason::NoDolbyVision);
    };

    if view.sources.iter().any(|s| s.is_mp4()) {
        return Disposition::Skip(SkipReason::DerivedSourceExists);
    }

    if view.derived_item_exists {
        return Disposition::Skip(SkipReason::DerivedItemExists);
    }

    if view.watched_by_primary == Some(true) {
        return Disposition::Skip(SkipReason::WatchedByPrimary);
    }

    if dovi.dv_profile == Some(7) {
        if downmux_enabled {
            Disposition::DownmuxThenRemux
        } else {
            Disposition::Skip(SkipReason::DownmuxDisabled)
        }
    } else {
        Disposition::DirectRemux
    }
}

/// Whether an item is a remux candidate at all, independent of whether the
/// downmux stage is enabled.
pub fn needs_remux(view: ItemView<'_>) -> bool {
    !matches!(classify(view, true), Disposition::Skip(_))
}

/// Whether a source/derived pair should be linked as alternate versions.
///
/// `derived` is the catalog item found at the source's derived sibling path,
/// if any. Already-linked pairs on either side are left alone, so the merge
/// task is idempotent; that includes a source that is itself somebody else's
/// alternate version. The source path must also carry the `.mkv` extension,
/// since that is what makes the derived sibling recognizable to cleanup
/// later.
pub fn needs_merge(
    source: &MediaItem,
    source_streams: &[MediaStream],
    derived: Option<&MediaItem>,
) -> bool {
    if !source.is_mkv()
        || source.has_alternate_versions
        || source.primary_version_id.is_some()
    {
        return false;
    }

    // Same spelling source_path_of() recognizes when inverting the derived
    // path, so merge and cleanup agree on what counts as a pair.
    if source.path.extension().and_then(|e| e.to_str()) != Some("mkv") {
        return false;
    }

    if !source_streams
        .iter()
        .any(|s| s.is_dovi_video() && s.dv_profile == Some(8))
    {
        return false;
    }

    derived.is_some_and(|d| d.primary_version_id.is_none())
}

/// Whether a derived item is safe to delete.
///
/// The derived item must be a recognized output of this system (derived-path
/// suffix, MP4 container, a Dolby Vision stream), its source must still be
/// locatable, and **both** items must be watched by the primary user. The
/// host merges watch state inconsistently across linked versions, so a lone
/// watched flag on either side is not trusted.
pub fn needs_cleanup(
    derived: &MediaItem,
    derived_streams: &[MediaStream],
    source: Option<&MediaItem>,
    derived_watched: bool,
    source_watched: bool,
) -> bool {
    if source_path_of(&derived.path).is_none() {
        return false;
    }

    if !derived.is_mp4() {
        return false;
    }

    if !derived_streams.iter().any(|s| s.is_dovi_video()) {
        return false;
    }

    if source.is_none() {
        return false;
    }

    derived_watched && source_watched
}
