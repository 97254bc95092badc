//! The downmux pipeline: Dolby Vision Profile 7 MKV to Profile 8.1 MP4.
//!
//! Three stages, driven entirely through external tools:
//!
//! 1. ffmpeg extracts the bare HEVC elementary stream to stdout (no
//!    container, non-video discarded)
//! 2. dovi_tool reads it from stdin, rewrites the RPU metadata to 8.1 and
//!    discards the enhancement layer, writing an HEVC file
//! 3. MP4Box muxes that file into an MP4 tagged as Profile 8.1 with in-band
//!    parameter sets
//!
//! Stages 1 and 2 run concurrently, joined by the transfer loop; their exits
//! are observed independently because a tool may close its output before
//! fully exiting. Stage 3 only starts once stage 2's file is confirmed on
//! disk. Every exit path, including cancellation, leaves no running process
//! and no intermediate or partial file behind.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use dvx_core::{Config, Error, Result};

use crate::pipe::{ProcessPipe, StdinMode, StdoutMode};
use crate::tools::ToolRegistry;
use crate::transfer::{transfer, DEFAULT_CHUNK_SIZE};

/// Removes whatever temp files are still registered when dropped, so partial
/// artifacts disappear on failure and cancellation paths too.
struct TempCleanup {
    paths: Vec<PathBuf>,
}

impl TempCleanup {
    fn new(paths: impl Into<Vec<PathBuf>>) -> Self {
        Self {
            paths: paths.into(),
        }
    }

    /// Stop tracking a path, keeping the file on disk.
    fn release(&mut self, keep: &Path) {
        self.paths.retain(|p| p != keep);
    }
}

impl Drop for TempCleanup {
    fn drop(&mut self) {
        for path in &self.paths {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), "failed to remove temp file: {e}");
                }
            }
        }
    }
}

/// The Profile 7 to Profile 8.1 conversion pipeline.
pub struct DownmuxPipeline {
    tools: ToolRegistry,
    temp_dir: PathBuf,
    log_dir: PathBuf,
}

impl DownmuxPipeline {
    pub fn new(tools: ToolRegistry, config: &Config) -> Self {
        Self {
            tools,
            temp_dir: config.temp_dir.clone(),
            log_dir: config.log_dir.clone(),
        }
    }

    /// Run the full pipeline for `source`, returning the path of the
    /// Profile 8.1 MP4 artifact.
    ///
    /// `job_tag` uniquely names this invocation's temp and log files (the
    /// caller passes the media source id).
    ///
    /// The returned artifact is an intermediate for the remux step; the
    /// caller owns deleting it once consumed.
    pub async fn run(
        &self,
        source: &Path,
        job_tag: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.temp_dir)?;

        let converted = self.temp_dir.join(format!("dovi_tool_{job_tag}.hevc"));
        let artifact = self.temp_dir.join(format!("{job_tag}_profile8.mp4"));

        let mut cleanup = TempCleanup::new(vec![converted.clone(), artifact.clone()]);

        self.extract_and_convert(source, &converted, job_tag, cancel)
            .await?;

        if !converted.exists() {
            return Err(Error::missing_output("dovi_tool", converted));
        }

        self.mux(&converted, &artifact, job_tag, cancel).await?;

        if !artifact.exists() {
            return Err(Error::missing_output("MP4Box", artifact));
        }

        // The stage-B intermediate is no longer needed; the cleanup guard
        // removes it, but the artifact survives.
        cleanup.release(&artifact);
        drop(cleanup);

        tracing::info!(artifact = %artifact.display(), "downmux complete");
        Ok(artifact)
    }

    /// Stages 1 and 2: extractor piped into converter via the transfer loop.
    async fn extract_and_convert(
        &self,
        source: &Path,
        converted: &Path,
        job_tag: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ffmpeg = self.tools.require("ffmpeg")?.path.clone();
        let dovi_tool = self.tools.require("dovi_tool")?.path.clone();

        let extract_args: Vec<String> = [
            "-y",
            "-i",
            &source.to_string_lossy(),
            "-dn",
            "-c:v",
            "copy",
            "-f",
            "hevc",
            "-",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let convert_args: Vec<String> = [
            "-m",
            "2",
            "convert",
            "--discard",
            "-",
            "-o",
            &converted.to_string_lossy(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let mut extractor = ProcessPipe::spawn(
            "ffmpeg",
            &ffmpeg,
            &extract_args,
            StdinMode::Null,
            StdoutMode::Piped,
            &self.log_path("ffmpeg_hevc", job_tag),
        )?;

        let mut converter = ProcessPipe::spawn(
            "dovi_tool",
            &dovi_tool,
            &convert_args,
            StdinMode::Piped,
            StdoutMode::Null,
            &self.log_path("dovi_tool", job_tag),
        )?;

        let reader = extractor
            .take_stdout()
            .ok_or_else(|| Error::transfer("extractor stdout was not piped"))?;
        let writer = converter
            .take_stdin()
            .ok_or_else(|| Error::transfer("converter stdin was not piped"))?;

        // One narrowed token for this stage pair: the first failing unit
        // cancels the others, which kills any still-live process.
        let stage_cancel = cancel.child_token();
        let (extract_res, convert_res, transfer_res) = {
            let c_a = stage_cancel.clone();
            let c_b = stage_cancel.clone();
            let c_t = stage_cancel.clone();
            tokio::join!(
                async {
                    let r = extractor.wait(&c_a).await;
                    if r.is_err() {
                        c_a.cancel();
                    }
                    r
                },
                async {
                    let r = converter.wait(&c_b).await;
                    if r.is_err() {
                        c_b.cancel();
                    }
                    r
                },
                async {
                    let r = transfer(reader, writer, DEFAULT_CHUNK_SIZE, &c_t).await;
                    if r.is_err() {
                        c_t.cancel();
                    }
                    r
                },
            )
        };

        // Cancellation requested from outside wins over whatever the stages
        // reported while being torn down.
        if cancel.is_cancelled() {
            return Err(Error::Canceled);
        }

        first_failure([
            extract_res.map(|_| ()),
            convert_res.map(|_| ()),
            transfer_res.map(|_| ()),
        ])
    }

    /// Stage 3: mux the converted stream into a Profile 8.1 MP4.
    async fn mux(
        &self,
        converted: &Path,
        artifact: &Path,
        job_tag: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mp4box = self.tools.require("MP4Box")?.path.clone();

        let mux_args: Vec<String> = vec![
            "-add".into(),
            format!(
                "{}:dvp=8.1:xps_inband:hdr=none",
                converted.to_string_lossy()
            ),
            "-brand".into(),
            "mp42isom".into(),
            "-ab".into(),
            "dby1".into(),
            "-no-iod".into(),
            artifact.to_string_lossy().into_owned(),
            "-tmp".into(),
            self.temp_dir.to_string_lossy().into_owned(),
        ];

        let mut muxer = ProcessPipe::spawn(
            "MP4Box",
            &mp4box,
            &mux_args,
            StdinMode::Null,
            StdoutMode::Null,
            &self.log_path("mp4box", job_tag),
        )?;

        muxer.wait(cancel).await?;
        Ok(())
    }

    fn log_path(&self, stage: &str, job_tag: &str) -> PathBuf {
        let nonce = &uuid::Uuid::new_v4().to_string()[..8];
        self.log_dir.join(format!("{stage}_{job_tag}_{nonce}.log"))
    }
}

/// Pick the most meaningful error out of the joined stage results: a real
/// failure beats the `Canceled` produced by tearing the other stages down.
fn first_failure(results: [Result<()>; 3]) -> Result<()> {
    let mut canceled = false;
    let mut first_error = None;

    for result in results {
        match result {
            Ok(()) => {}
            Err(Error::Canceled) => canceled = true,
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match (first_error, canceled) {
        (Some(e), _) => Err(e),
        (None, true) => Err(Error::Canceled),
        (None, false) => Ok(()),
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    /// Write an executable shell script standing in for a tool binary.
    fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Shell snippet that pulls the value following `-o` out of "$@".
    const FIND_OUTPUT_ARG: &str = r#"out=""; prev=""
for a in "$@"; do
  [ "$prev" = "-o" ] && out="$a"
  prev="$a"
done"#;

    /// Shell snippet that resolves MP4Box-style `-add in:opts ... -no-iod out`.
    const FIND_MUX_ARGS: &str = r#"in=""; out=""; prev=""
for a in "$@"; do
  [ "$prev" = "-add" ] && in="${a%%:*}"
  [ "$prev" = "-no-iod" ] && out="$a"
  prev="$a"
done"#;

    struct Fixture {
        _bin: tempfile::TempDir,
        temp: tempfile::TempDir,
        pipeline: DownmuxPipeline,
        source: PathBuf,
    }

    fn fixture(ffmpeg_body: &str, dovi_body: &str, mp4box_body: &str) -> Fixture {
        let bin = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();

        let ffmpeg = fake_tool(bin.path(), "ffmpeg", ffmpeg_body);
        let dovi = fake_tool(bin.path(), "dovi_tool", dovi_body);
        let mp4box = fake_tool(bin.path(), "MP4Box", mp4box_body);

        let tools = ToolRegistry::with_tools([
            ("ffmpeg".to_string(), ffmpeg),
            ("dovi_tool".to_string(), dovi),
            ("MP4Box".to_string(), mp4box),
        ]);

        let config = Config {
            temp_dir: temp.path().join("work"),
            log_dir: temp.path().join("logs"),
            ..Config::default()
        };

        let source = temp.path().join("source.mkv");
        std::fs::write(&source, b"not really an mkv").unwrap();

        Fixture {
            pipeline: DownmuxPipeline::new(tools, &config),
            _bin: bin,
            temp,
            source,
        }
    }

    fn leftover_files(dir: &Path) -> Vec<PathBuf> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn success_produces_artifact_and_removes_intermediate() {
        let fx = fixture(
            "printf 'HEVC-ELEMENTARY-DATA'",
            &format!("{FIND_OUTPUT_ARG}\ncat - > \"$out\""),
            &format!("{FIND_MUX_ARGS}\ncp \"$in\" \"$out\""),
        );

        let artifact = fx
            .pipeline
            .run(&fx.source, "job1", &CancellationToken::new())
            .await
            .unwrap();

        assert!(artifact.to_string_lossy().ends_with("job1_profile8.mp4"));
        assert_eq!(
            std::fs::read_to_string(&artifact).unwrap(),
            "HEVC-ELEMENTARY-DATA"
        );

        // Only the final artifact remains in the work dir.
        let work = fx.temp.path().join("work");
        assert_eq!(leftover_files(&work), vec![artifact]);
    }

    #[tokio::test]
    async fn converter_failure_fails_pipeline_and_cleans_up() {
        let fx = fixture(
            "printf 'DATA'",
            "exit 7",
            &format!("{FIND_MUX_ARGS}\ncp \"$in\" \"$out\""),
        );

        let err = fx
            .pipeline
            .run(&fx.source, "job2", &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Tool { tool, code } => {
                assert_eq!(tool, "dovi_tool");
                assert_eq!(code, Some(7));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(leftover_files(&fx.temp.path().join("work")).is_empty());
    }

    #[tokio::test]
    async fn missing_converter_output_is_detected() {
        let fx = fixture(
            "printf 'DATA'",
            "cat - > /dev/null",
            &format!("{FIND_MUX_ARGS}\ncp \"$in\" \"$out\""),
        );

        let err = fx
            .pipeline
            .run(&fx.source, "job3", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingOutput { .. }));
        assert!(leftover_files(&fx.temp.path().join("work")).is_empty());
    }

    #[tokio::test]
    async fn muxer_failure_removes_converted_stream() {
        let fx = fixture(
            "printf 'DATA'",
            &format!("{FIND_OUTPUT_ARG}\ncat - > \"$out\""),
            "exit 2",
        );

        let err = fx
            .pipeline
            .run(&fx.source, "job4", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Tool { code: Some(2), .. }));
        assert!(leftover_files(&fx.temp.path().join("work")).is_empty());
    }

    #[tokio::test]
    async fn extractor_launch_failure() {
        let bin = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let dovi = fake_tool(bin.path(), "dovi_tool", "exit 0");
        let mp4box = fake_tool(bin.path(), "MP4Box", "exit 0");

        let tools = ToolRegistry::with_tools([
            ("ffmpeg".to_string(), bin.path().join("missing_ffmpeg")),
            ("dovi_tool".to_string(), dovi),
            ("MP4Box".to_string(), mp4box),
        ]);
        let config = Config {
            temp_dir: temp.path().join("work"),
            log_dir: temp.path().join("logs"),
            ..Config::default()
        };
        let pipeline = DownmuxPipeline::new(tools, &config);

        let source = temp.path().join("s.mkv");
        std::fs::write(&source, b"x").unwrap();

        let err = pipeline
            .run(&source, "job5", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
        assert!(leftover_files(&temp.path().join("work")).is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_transfer_stops_everything() {
        let fx = fixture(
            "printf 'SOME-DATA'; sleep 30",
            &format!("{FIND_OUTPUT_ARG}\ncat - > \"$out\""),
            &format!("{FIND_MUX_ARGS}\ncp \"$in\" \"$out\""),
        );

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let start = std::time::Instant::now();
        let err = fx.pipeline.run(&fx.source, "job6", &cancel).await.unwrap_err();
        assert!(err.is_canceled(), "got: {err}");
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(leftover_files(&fx.temp.path().join("work")).is_empty());
    }

    #[test]
    fn first_failure_prefers_real_error_over_teardown_cancel() {
        let r = first_failure([
            Err(Error::Canceled),
            Err(Error::tool("dovi_tool", Some(1))),
            Ok(()),
        ]);
        assert!(matches!(r, Err(Error::Tool { .. })));

        let r = first_failure([Ok(()), Ok(()), Err(Error::Canceled)]);
        assert!(matches!(r, Err(Error::Canceled)));

        assert!(first_failure([Ok(()), Ok(()), Ok(())]).is_ok());
    }
}
