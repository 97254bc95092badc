//! Catalog data model: items, streams, sources, and watch state.
//!
//! These mirror what the external catalog hands us. Everything here is
//! read-only to dovimux except [`MediaItem::primary_version_id`], which the
//! version-merge task sets and persists back through the catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::ids::{ItemId, MediaSourceId};

/// Derived artifacts live beside their source as `<source-path>.mp4`, so a
/// remuxed MKV always carries this double extension.
pub const DERIVED_SUFFIX: &str = ".mkv.mp4";

// ---------------------------------------------------------------------------
// StreamKind
// ---------------------------------------------------------------------------

/// Type of elementary stream within a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Subtitle => write!(f, "subtitle"),
        }
    }
}

// ---------------------------------------------------------------------------
// MediaStream
// ---------------------------------------------------------------------------

/// One elementary stream as reported by the catalog's probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStream {
    /// Stream index within the container.
    pub index: u32,
    pub kind: StreamKind,
    /// Codec tag as reported by the probe (e.g. "hevc", "truehd", "subrip").
    pub codec: String,
    /// ISO language tag, if the container carries one.
    pub language: Option<String>,
    /// Dolby Vision profile number, for video streams that carry DV metadata.
    pub dv_profile: Option<u8>,
    /// Dolby Vision major version.
    pub dv_version_major: Option<u8>,
    /// Whether a subtitle stream is text-based (image-based subtitles have no
    /// MP4 equivalent and are dropped by the remux).
    pub is_text_subtitle: bool,
}

impl MediaStream {
    /// Whether this is a video stream carrying a Dolby Vision profile.
    ///
    /// A video stream with no profile value is never a remux basis, even if
    /// other probe fields hint at DV; missing probe data excludes the item.
    pub fn is_dovi_video(&self) -> bool {
        self.kind == StreamKind::Video && self.dv_profile.is_some()
    }
}

// ---------------------------------------------------------------------------
// MediaSource
// ---------------------------------------------------------------------------

/// One file representation of a logical item (e.g. the original MKV and a
/// derived MP4 are two sources of the same title).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSource {
    pub id: MediaSourceId,
    /// Container tag; may be a comma-separated extension list (the catalog
    /// reports MP4 as "mov,mp4,m4a,..." style lists).
    pub container: String,
    pub path: PathBuf,
}

impl MediaSource {
    pub fn is_mkv(&self) -> bool {
        container_matches(&self.container, "mkv")
    }

    pub fn is_mp4(&self) -> bool {
        container_matches(&self.container, "mp4")
    }
}

// ---------------------------------------------------------------------------
// MediaItem
// ---------------------------------------------------------------------------

/// A catalog entry for one video item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: ItemId,
    /// Display name, used only for logging.
    pub name: String,
    /// Container tag; see [`MediaSource::container`] for the list caveat.
    pub container: String,
    pub path: PathBuf,
    /// Link to the primary version when this item is an alternate version.
    /// The only field dovimux ever writes.
    pub primary_version_id: Option<ItemId>,
    /// Whether this item already links alternate versions of itself.
    pub has_alternate_versions: bool,
}

impl MediaItem {
    pub fn is_mkv(&self) -> bool {
        container_matches(&self.container, "mkv")
    }

    pub fn is_mp4(&self) -> bool {
        container_matches(&self.container, "mp4")
    }
}

// ---------------------------------------------------------------------------
// WatchState
// ---------------------------------------------------------------------------

/// Per (user, item) playback state, owned entirely by the external catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchState {
    pub played: bool,
    pub last_played: Option<DateTime<Utc>>,
}

impl WatchState {
    pub fn played() -> Self {
        Self {
            played: true,
            last_played: Some(Utc::now()),
        }
    }
}

// ---------------------------------------------------------------------------
// Path convention
// ---------------------------------------------------------------------------

/// The sibling path where the derived MP4 for a source lands.
pub fn derived_path(source: &Path) -> PathBuf {
    let mut s = source.as_os_str().to_os_string();
    s.push(".mp4");
    PathBuf::from(s)
}

/// Invert [`derived_path`]: the source path for a recognized derived artifact,
/// or `None` if the path does not follow the `.mkv.mp4` convention (in which
/// case we assume somebody else created the file and leave it alone).
pub fn source_path_of(derived: &Path) -> Option<PathBuf> {
    let s = derived.to_str()?;
    s.strip_suffix(".mp4")
        .filter(|stripped| stripped.ends_with(".mkv"))
        .map(PathBuf::from)
}

/// Case-insensitive membership test against a possibly comma-separated
/// container tag list.
fn container_matches(container: &str, tag: &str) -> bool {
    container
        .split(',')
        .any(|c| c.trim().eq_ignore_ascii_case(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(container: &str, path: &str) -> MediaItem {
        MediaItem {
            id: ItemId::new(),
            name: "test".into(),
            container: container.into(),
            path: PathBuf::from(path),
            primary_version_id: None,
            has_alternate_versions: false,
        }
    }

    #[test]
    fn stream_kind_display_and_serde() {
        assert_eq!(StreamKind::Video.to_string(), "video");
        let json = serde_json::to_string(&StreamKind::Subtitle).unwrap();
        assert_eq!(json, r#""subtitle""#);
        let back: StreamKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StreamKind::Subtitle);
    }

    #[test]
    fn container_list_membership() {
        let i = item("mov,mp4,m4a,3gp,3g2,mj2", "/m/a.mkv.mp4");
        assert!(i.is_mp4());
        assert!(!i.is_mkv());
        assert!(item("mkv", "/m/a.mkv").is_mkv());
        assert!(item("MKV", "/m/a.mkv").is_mkv());
    }

    #[test]
    fn derived_path_appends_full_suffix() {
        let p = derived_path(Path::new("/media/Movie (2021).mkv"));
        assert_eq!(p, PathBuf::from("/media/Movie (2021).mkv.mp4"));
        assert!(p.to_str().unwrap().ends_with(DERIVED_SUFFIX));
    }

    #[test]
    fn source_path_roundtrip() {
        let src = PathBuf::from("/media/Movie.mkv");
        let derived = derived_path(&src);
        assert_eq!(source_path_of(&derived), Some(src));
    }

    #[test]
    fn source_path_rejects_foreign_mp4() {
        // A plain MP4 that we did not create has no source counterpart.
        assert_eq!(source_path_of(Path::new("/media/Other.mp4")), None);
        assert_eq!(source_path_of(Path::new("/media/Other.avi.mp4")), None);
    }

    #[test]
    fn dovi_video_detection() {
        let mut s = MediaStream {
            index: 0,
            kind: StreamKind::Video,
            codec: "hevc".into(),
            language: None,
            dv_profile: Some(7),
            dv_version_major: Some(1),
            is_text_subtitle: false,
        };
        assert!(s.is_dovi_video());
        s.dv_profile = None;
        assert!(!s.is_dovi_video());
        s.dv_profile = Some(8);
        s.kind = StreamKind::Audio;
        assert!(!s.is_dovi_video());
    }
}
