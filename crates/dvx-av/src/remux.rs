//! Direct stream-copy remux: MKV into an MP4 sibling via ffmpeg.
//!
//! Nothing is re-encoded. The video stream is copied and tagged `dvh1` with
//! the `hevc_mp4toannexb` bitstream filter; audio streams are copied except
//! TrueHD, which many consumer MP4 decoders reject; text subtitles are
//! re-tagged to `mov_text` because MP4 has no home for the MKV image-based
//! subtitle codecs. Metadata and chapters are stripped, language tags are
//! carried over per stream.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use dvx_core::media::{MediaStream, StreamKind};
use dvx_core::{Error, Result};

use crate::pipe::{ProcessPipe, StdinMode, StdoutMode};
use crate::tools::ToolRegistry;

/// Poll interval while waiting on a long-running remux.
const REMUX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One remux invocation.
#[derive(Debug, Clone)]
pub struct RemuxJob {
    /// Input supplying the video stream. For Profile 7 sources this is the
    /// downmux artifact rather than the original file.
    pub video_input: PathBuf,
    /// A second input supplying audio and subtitle streams, used when
    /// `video_input` is a downmux artifact that carries only video.
    pub audio_subs_input: Option<PathBuf>,
    /// Where the remuxed MP4 is written. Callers pass a temp path and rename
    /// into place themselves.
    pub output: PathBuf,
}

impl RemuxJob {
    /// Direct remux: one input carries everything.
    pub fn direct(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            video_input: input.into(),
            audio_subs_input: None,
            output: output.into(),
        }
    }

    /// Remux with the video substituted by a downmux artifact; audio and
    /// subtitles still come from the original source.
    pub fn with_substituted_video(
        artifact: impl Into<PathBuf>,
        source: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            video_input: artifact.into(),
            audio_subs_input: Some(source.into()),
            output: output.into(),
        }
    }
}

/// Build the full ffmpeg argument list for a remux job.
///
/// `streams` describes the original source; stream indexes in it select what
/// gets mapped out of the audio/subtitle input.
///
/// # Errors
///
/// [`Error::Validation`] when no usable (non-TrueHD) audio stream exists.
/// Remuxing a film with no audio a player can decode produces a broken file,
/// so the item fails instead.
pub fn build_remux_args(job: &RemuxJob, streams: &[MediaStream]) -> Result<Vec<String>> {
    // Which ffmpeg input the audio and subtitles are mapped from.
    let av_input = if job.audio_subs_input.is_some() { 1 } else { 0 };

    let audio: Vec<&MediaStream> = streams
        .iter()
        .filter(|s| s.kind == StreamKind::Audio && s.codec != "truehd")
        .collect();
    if audio.is_empty() {
        return Err(Error::Validation(
            "no audio stream suitable for MP4 stream copy".to_string(),
        ));
    }

    let subtitles: Vec<&MediaStream> = streams
        .iter()
        .filter(|s| s.kind == StreamKind::Subtitle && s.is_text_subtitle)
        .collect();

    let mut args: Vec<String> = vec![
        "-y".into(),
        "-analyzeduration".into(),
        "200M".into(),
        "-probesize".into(),
        "1G".into(),
        "-fflags".into(),
        "+genpts".into(),
        "-i".into(),
        job.video_input.to_string_lossy().into_owned(),
    ];

    if let Some(source) = &job.audio_subs_input {
        args.push("-i".into());
        args.push(source.to_string_lossy().into_owned());
    }

    args.extend([
        "-map_metadata".to_string(),
        "-1".to_string(),
        "-map_chapters".to_string(),
        "-1".to_string(),
        "-threads".to_string(),
        "0".to_string(),
    ]);

    // Video always comes from input 0, which is either the whole source or
    // the downmux artifact (whose only stream is the video).
    args.push("-map".into());
    args.push("0:v:0".into());

    for s in &audio {
        args.push("-map".into());
        args.push(format!("{av_input}:{}", s.index));
    }
    for s in &subtitles {
        args.push("-map".into());
        args.push(format!("{av_input}:{}", s.index));
    }

    args.extend([
        "-codec:v:0".to_string(),
        "copy".to_string(),
        "-tag:v:0".to_string(),
        "dvh1".to_string(),
        "-strict".to_string(),
        "experimental".to_string(),
        "-bsf:v".to_string(),
        "hevc_mp4toannexb".to_string(),
        "-start_at_zero".to_string(),
    ]);

    for (i, _) in audio.iter().enumerate() {
        args.push(format!("-codec:a:{i}"));
        args.push("copy".into());
    }
    for (i, _) in subtitles.iter().enumerate() {
        args.push(format!("-codec:s:{i}"));
        args.push("mov_text".into());
    }

    for (i, s) in audio.iter().enumerate() {
        if let Some(lang) = &s.language {
            args.push(format!("-metadata:s:a:{i}"));
            args.push(format!("language={lang}"));
        }
    }
    for (i, s) in subtitles.iter().enumerate() {
        if let Some(lang) = &s.language {
            args.push(format!("-metadata:s:s:{i}"));
            args.push(format!("language={lang}"));
        }
    }

    args.extend([
        "-copyts".to_string(),
        "-avoid_negative_ts".to_string(),
        "disabled".to_string(),
        "-max_muxing_queue_size".to_string(),
        "2048".to_string(),
        job.output.to_string_lossy().into_owned(),
    ]);

    Ok(args)
}

/// Execute a remux job, waiting on the subprocess with a coarse poll.
///
/// The caller is responsible for the temp-path/rename dance around
/// `job.output`.
pub async fn run_remux(
    tools: &ToolRegistry,
    job: &RemuxJob,
    streams: &[MediaStream],
    log_path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let ffmpeg = tools.require("ffmpeg")?.path.clone();
    let args = build_remux_args(job, streams)?;

    let mut pipe = ProcessPipe::spawn(
        "ffmpeg",
        &ffmpeg,
        &args,
        StdinMode::Null,
        StdoutMode::Null,
        log_path,
    )?;

    pipe.wait_polling(REMUX_POLL_INTERVAL, cancel).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(index: u32) -> MediaStream {
        MediaStream {
            index,
            kind: StreamKind::Video,
            codec: "hevc".into(),
            language: None,
            dv_profile: Some(8),
            dv_version_major: Some(1),
            is_text_subtitle: false,
        }
    }

    fn audio(index: u32, codec: &str, lang: Option<&str>) -> MediaStream {
        MediaStream {
            index,
            kind: StreamKind::Audio,
            codec: codec.into(),
            language: lang.map(|l| l.to_string()),
            dv_profile: None,
            dv_version_major: None,
            is_text_subtitle: false,
        }
    }

    fn subtitle(index: u32, codec: &str, text: bool, lang: Option<&str>) -> MediaStream {
        MediaStream {
            index,
            kind: StreamKind::Subtitle,
            codec: codec.into(),
            language: lang.map(|l| l.to_string()),
            dv_profile: None,
            dv_version_major: None,
            is_text_subtitle: text,
        }
    }

    #[test]
    fn direct_remux_maps_and_tags() {
        let streams = vec![
            video(0),
            audio(1, "eac3", Some("eng")),
            audio(2, "truehd", Some("eng")),
            subtitle(3, "subrip", true, Some("eng")),
            subtitle(4, "hdmv_pgs_subtitle", false, Some("eng")),
        ];
        let job = RemuxJob::direct("/media/film.mkv", "/tmp/12345.mp4");
        let args = build_remux_args(&job, &streams).unwrap();
        let joined = args.join(" ");

        // Video stream copy, tagged for Dolby Vision in MP4.
        assert!(joined.contains("-map 0:v:0"));
        assert!(joined.contains("-codec:v:0 copy -tag:v:0 dvh1"));
        assert!(joined.contains("-bsf:v hevc_mp4toannexb"));

        // TrueHD is dropped, the image-based subtitle is dropped.
        assert!(joined.contains("-map 0:1"));
        assert!(!joined.contains("-map 0:2"));
        assert!(joined.contains("-map 0:3"));
        assert!(!joined.contains("-map 0:4"));

        // Text subtitles become mov_text, languages survive.
        assert!(joined.contains("-codec:s:0 mov_text"));
        assert!(joined.contains("-metadata:s:a:0 language=eng"));
        assert!(joined.contains("-metadata:s:s:0 language=eng"));

        // Container/timing flags and the output path close the list.
        assert!(joined.contains("-map_metadata -1 -map_chapters -1"));
        assert!(joined.contains("-copyts -avoid_negative_ts disabled"));
        assert_eq!(args.last().unwrap(), "/tmp/12345.mp4");
    }

    #[test]
    fn substituted_video_pulls_audio_from_second_input() {
        let streams = vec![video(0), audio(1, "ac3", None), subtitle(2, "ass", true, None)];
        let job = RemuxJob::with_substituted_video(
            "/tmp/work/abc_profile8.mp4",
            "/media/film.mkv",
            "/tmp/out.mp4",
        );
        let args = build_remux_args(&job, &streams).unwrap();
        let joined = args.join(" ");

        // Two inputs: artifact first, original source second.
        assert!(joined.contains("-i /tmp/work/abc_profile8.mp4 -i /media/film.mkv"));
        // Video from the artifact, audio and subtitles from the source.
        assert!(joined.contains("-map 0:v:0"));
        assert!(joined.contains("-map 1:1"));
        assert!(joined.contains("-map 1:2"));
    }

    #[test]
    fn only_truehd_audio_is_rejected() {
        let streams = vec![video(0), audio(1, "truehd", Some("eng"))];
        let job = RemuxJob::direct("/media/film.mkv", "/tmp/out.mp4");
        let err = build_remux_args(&job, &streams).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn no_audio_at_all_is_rejected() {
        let streams = vec![video(0)];
        let job = RemuxJob::direct("/media/film.mkv", "/tmp/out.mp4");
        assert!(build_remux_args(&job, &streams).is_err());
    }

    #[test]
    fn language_metadata_omitted_when_untagged() {
        let streams = vec![video(0), audio(1, "aac", None)];
        let job = RemuxJob::direct("/media/film.mkv", "/tmp/out.mp4");
        let args = build_remux_args(&job, &streams).unwrap();
        assert!(!args.iter().any(|a| a.starts_with("-metadata:s:a:")));
    }
}
