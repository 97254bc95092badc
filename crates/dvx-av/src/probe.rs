//! ffprobe-backed prober for standalone (catalog-less) use.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format
//! -show_streams` and maps the JSON into the crate's media data model,
//! including the Dolby Vision configuration record from the stream side data.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use dvx_core::media::{MediaStream, StreamKind};
use dvx_core::{Error, Result};

use crate::pipe::{ProcessPipe, StdinMode, StdoutMode};
use crate::tools::ToolRegistry;

/// Subtitle codecs ffmpeg can re-tag to `mov_text`; everything else is
/// image-based and has no MP4 representation.
const TEXT_SUBTITLE_CODECS: &[&str] =
    &["subrip", "srt", "ass", "ssa", "mov_text", "webvtt", "text"];

/// What a probe of one file yields.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProbeResult {
    pub path: PathBuf,
    /// Normalized container name ("mkv", "mp4", or ffprobe's first token).
    pub container: String,
    pub streams: Vec<MediaStream>,
}

impl ProbeResult {
    /// The video stream carrying a Dolby Vision profile, if any.
    pub fn dovi_video(&self) -> Option<&MediaStream> {
        self.streams.iter().find(|s| s.is_dovi_video())
    }
}

/// Probe `path` with ffprobe.
///
/// # Errors
///
/// [`Error::Probe`] when ffprobe's output cannot be parsed; the usual
/// launch/tool/cancel errors otherwise.
pub async fn probe_file(
    tools: &ToolRegistry,
    path: &Path,
    log_dir: &Path,
    cancel: &CancellationToken,
) -> Result<ProbeResult> {
    let ffprobe = tools.require("ffprobe")?.path.clone();

    let args: Vec<String> = [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        &path.to_string_lossy(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let nonce = &uuid::Uuid::new_v4().to_string()[..8];
    let log_path = log_dir.join(format!("ffprobe_{nonce}.log"));

    let mut pipe = ProcessPipe::spawn(
        "ffprobe",
        &ffprobe,
        &args,
        StdinMode::Null,
        StdoutMode::Piped,
        &log_path,
    )?;

    let mut stdout = pipe
        .take_stdout()
        .ok_or_else(|| Error::Probe("ffprobe stdout was not piped".to_string()))?;

    // Probe output is small; drain it fully before reaping the process.
    let mut json = String::new();
    stdout
        .read_to_string(&mut json)
        .await
        .map_err(|e| Error::Probe(format!("reading ffprobe output: {e}")))?;

    pipe.wait(cancel).await?;

    let output: FfprobeOutput = serde_json::from_str(&json)
        .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    Ok(parse_probe_output(path, output))
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    side_data_type: Option<String>,
    dv_profile: Option<u8>,
    dv_version_major: Option<u8>,
}

fn parse_probe_output(path: &Path, output: FfprobeOutput) -> ProbeResult {
    let container = normalize_container(output.format.format_name.as_deref().unwrap_or(""));

    let streams = output
        .streams
        .into_iter()
        .filter_map(|stream| {
            let kind = match stream.codec_type.as_deref() {
                Some("video") => StreamKind::Video,
                Some("audio") => StreamKind::Audio,
                Some("subtitle") => StreamKind::Subtitle,
                _ => return None,
            };

            let codec = stream.codec_name.unwrap_or_default();
            let (dv_profile, dv_version_major) = dovi_side_data(&stream.side_data_list);

            Some(MediaStream {
                index: stream.index,
                kind,
                is_text_subtitle: kind == StreamKind::Subtitle
                    && TEXT_SUBTITLE_CODECS.contains(&codec.as_str()),
                codec,
                language: stream.tags.language,
                dv_profile,
                dv_version_major,
            })
        })
        .collect();

    ProbeResult {
        path: path.to_path_buf(),
        container,
        streams,
    }
}

fn dovi_side_data(side_data: &[FfprobeSideData]) -> (Option<u8>, Option<u8>) {
    for sd in side_data {
        if sd.side_data_type.as_deref() == Some("DOVI configuration record") {
            return (sd.dv_profile, sd.dv_version_major);
        }
    }
    (None, None)
}

/// ffprobe reports muxer family names like "matroska,webm" or
/// "mov,mp4,m4a,3gp,3g2,mj2"; fold them onto the two container names the
/// classifier speaks.
fn normalize_container(format_name: &str) -> String {
    let lower = format_name.to_ascii_lowercase();
    if lower.contains("matroska") {
        "mkv".to_string()
    } else if lower.split(',').any(|t| t == "mp4") {
        "mp4".to_string()
    } else {
        lower.split(',').next().unwrap_or("").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "format": { "format_name": "matroska,webm" },
        "streams": [
            {
                "index": 0,
                "codec_type": "video",
                "codec_name": "hevc",
                "side_data_list": [
                    {
                        "side_data_type": "DOVI configuration record",
                        "dv_profile": 7,
                        "dv_version_major": 1
                    }
                ]
            },
            {
                "index": 1,
                "codec_type": "audio",
                "codec_name": "truehd",
                "tags": { "language": "eng" }
            },
            {
                "index": 2,
                "codec_type": "subtitle",
                "codec_name": "subrip",
                "tags": { "language": "eng" }
            },
            {
                "index": 3,
                "codec_type": "subtitle",
                "codec_name": "hdmv_pgs_subtitle"
            },
            {
                "index": 4,
                "codec_type": "attachment",
                "codec_name": "ttf"
            }
        ]
    }"#;

    #[test]
    fn parses_streams_and_dovi_side_data() {
        let output: FfprobeOutput = serde_json::from_str(SAMPLE).unwrap();
        let result = parse_probe_output(Path::new("/media/film.mkv"), output);

        assert_eq!(result.container, "mkv");
        // The attachment stream is dropped.
        assert_eq!(result.streams.len(), 4);

        let video = result.dovi_video().unwrap();
        assert_eq!(video.index, 0);
        assert_eq!(video.dv_profile, Some(7));
        assert_eq!(video.dv_version_major, Some(1));

        let srt = &result.streams[2];
        assert!(srt.is_text_subtitle);
        assert_eq!(srt.language.as_deref(), Some("eng"));

        let pgs = &result.streams[3];
        assert!(!pgs.is_text_subtitle);
    }

    #[test]
    fn container_normalization() {
        assert_eq!(normalize_container("matroska,webm"), "mkv");
        assert_eq!(normalize_container("mov,mp4,m4a,3gp,3g2,mj2"), "mp4");
        assert_eq!(normalize_container("avi"), "avi");
        assert_eq!(normalize_container(""), "");
    }

    #[test]
    fn missing_side_data_means_no_profile() {
        let json = r#"{
            "format": { "format_name": "matroska,webm" },
            "streams": [
                { "index": 0, "codec_type": "video", "codec_name": "hevc" }
            ]
        }"#;
        let output: FfprobeOutput = serde_json::from_str(json).unwrap();
        let result = parse_probe_output(Path::new("/media/x.mkv"), output);
        assert!(result.dovi_video().is_none());
        assert_eq!(result.streams[0].dv_profile, None);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let parsed: std::result::Result<FfprobeOutput, _> = serde_json::from_str("{not json");
        assert!(parsed.is_err());
    }
}
