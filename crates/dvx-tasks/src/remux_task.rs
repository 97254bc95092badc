//! The library remux task: walk the catalog, classify, remux.
//!
//! Items are processed strictly one at a time to bound I/O and external-tool
//! contention; the only concurrency lives inside a single downmux pipeline
//! invocation. One item's failure is logged with its id and the iteration
//! moves on; only cancellation stops the queue.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use dvx_av::remux::{run_remux, RemuxJob};
use dvx_av::tools::ToolRegistry;
use dvx_av::DownmuxPipeline;
use dvx_core::ids::UserId;
use dvx_core::media::{derived_path, MediaItem};
use dvx_core::{Config, Error, Result};

use crate::catalog::Catalog;
use crate::classify::{classify, Disposition, ItemView};
use crate::task::{Progress, ScheduledTask, TaskTrigger};

pub struct RemuxLibraryTask {
    config: Arc<Config>,
    tools: ToolRegistry,
}

impl RemuxLibraryTask {
    pub fn new(config: Arc<Config>, tools: ToolRegistry) -> Self {
        Self { config, tools }
    }

    /// Resolve the configured primary user, if any.
    ///
    /// A primary user that is configured but unknown to the catalog is a
    /// task-level error: every watched-state decision would silently come out
    /// wrong.
    async fn primary_user(&self, catalog: &dyn Catalog) -> Result<Option<UserId>> {
        match &self.config.primary_user {
            None => Ok(None),
            Some(name) => match catalog.resolve_user(name).await? {
                Some(id) => Ok(Some(id)),
                None => Err(Error::Validation(format!(
                    "configured primary user {name:?} does not exist"
                ))),
            },
        }
    }

    async fn run_items(
        &self,
        catalog: &dyn Catalog,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> (bool, Result<()>) {
        let user = match self.primary_user(catalog).await {
            Ok(user) => user,
            Err(e) => return (false, Err(e)),
        };

        let items = match catalog.query_videos(&self.config.include_ancestors()).await {
            Ok(items) => items,
            Err(e) => return (false, Err(e)),
        };

        let total = items.len();
        let done = AtomicUsize::new(0);
        let mut produced_any = false;

        tracing::info!(total, "remux scan starting");

        for item in items {
            if cancel.is_cancelled() {
                return (produced_any, Err(Error::Canceled));
            }

            match self.process_item(catalog, user, &item, cancel).await {
                Ok(true) => produced_any = true,
                Ok(false) => {}
                Err(e) if e.is_canceled() => {
                    tracing::info!(item = %item.id, "remux scan canceled");
                    return (produced_any, Err(Error::Canceled));
                }
                Err(e) => {
                    tracing::error!(item = %item.id, name = %item.name, "item failed: {e}");
                }
            }

            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            let percent = if total == 0 {
                100.0
            } else {
                finished as f32 / total as f32 * 100.0
            };
            progress.report(percent, &item.name);
        }

        (produced_any, Ok(()))
    }

    /// Process one item end to end. Returns `true` when a new artifact was
    /// written to its final path.
    async fn process_item(
        &self,
        catalog: &dyn Catalog,
        user: Option<UserId>,
        item: &MediaItem,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let streams = catalog.streams(item.id).await?;
        let sources = catalog.media_sources(item.id).await?;

        let derived = derived_path(&item.path);
        let derived_item_exists = catalog.find_by_path(&derived).await?.is_some();

        let watched_by_primary = match user {
            None => None,
            Some(user) => Some(catalog.watch_state(user, item.id).await?.played),
        };

        let view = ItemView {
            item,
            streams: &streams,
            sources: &sources,
            derived_item_exists,
            watched_by_primary,
        };

        let disposition = classify(view, self.config.downmux_enabled);
        let profile7 = match disposition {
            Disposition::Skip(reason) => {
                tracing::debug!(item = %item.id, name = %item.name, "skipped: {reason}");
                return Ok(false);
            }
            Disposition::DirectRemux => false,
            Disposition::DownmuxThenRemux => true,
        };

        // Prefer the MKV source's own path and id; fall back to the item's.
        let (input_path, job_tag) = sources
            .iter()
            .find(|s| s.is_mkv())
            .map(|s| (s.path.clone(), s.id.to_string()))
            .unwrap_or_else(|| (item.path.clone(), item.id.to_string()));

        let final_path = derived_path(&input_path);
        if final_path.exists() {
            return Err(Error::race(final_path));
        }

        // Temp output beside neither the source nor the final path: the
        // rename at the end is the only write the library directory sees.
        let temp_path = self.temp_output_path(&final_path);
        if temp_path.exists() {
            tracing::warn!(path = %temp_path.display(), "deleting stale temp output");
            std::fs::remove_file(&temp_path)?;
        }
        std::fs::create_dir_all(&self.config.temp_dir)?;

        tracing::info!(
            item = %item.id,
            name = %item.name,
            profile7,
            "remuxing {} -> {}",
            input_path.display(),
            final_path.display()
        );

        let downmux_artifact = if profile7 {
            let pipeline = DownmuxPipeline::new(self.tools.clone(), &self.config);
            Some(pipeline.run(&input_path, &job_tag, cancel).await?)
        } else {
            None
        };

        let job = match &downmux_artifact {
            Some(artifact) => {
                RemuxJob::with_substituted_video(artifact, &input_path, &temp_path)
            }
            None => RemuxJob::direct(&input_path, &temp_path),
        };

        let nonce = &uuid::Uuid::new_v4().to_string()[..8];
        let log_path = self
            .config
            .log_dir
            .join(format!("ffmpeg_remux_{job_tag}_{nonce}.log"));

        let remux_result = run_remux(&self.tools, &job, &streams, &log_path, cancel).await;

        // The downmux artifact is an intermediate either way.
        if let Some(artifact) = &downmux_artifact {
            if let Err(e) = std::fs::remove_file(artifact) {
                tracing::warn!(path = %artifact.display(), "failed to remove downmux artifact: {e}");
            }
        }

        if let Err(e) = remux_result {
            if temp_path.exists() {
                let _ = std::fs::remove_file(&temp_path);
            }
            return Err(e);
        }

        // The catalog snapshot is stale by now; re-check before exposing the
        // artifact.
        if final_path.exists() {
            let _ = std::fs::remove_file(&temp_path);
            return Err(Error::race(final_path));
        }
        std::fs::rename(&temp_path, &final_path)?;

        Ok(true)
    }

    fn temp_output_path(&self, final_path: &Path) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        final_path.hash(&mut hasher);
        self.config.temp_dir.join(format!("{:016x}.mp4", hasher.finish()))
    }
}

#[async_trait]
impl ScheduledTask for RemuxLibraryTask {
    fn name(&self) -> &'static str {
        "Remux Dolby Vision library"
    }

    fn key(&self) -> &'static str {
        "DoViRemuxLibrary"
    }

    fn description(&self) -> &'static str {
        "Remuxes Dolby Vision MKV files into MP4 siblings, downmuxing Profile 7 to 8.1 first"
    }

    fn default_triggers(&self) -> Vec<TaskTrigger> {
        Vec::new()
    }

    async fn execute(
        &self,
        catalog: &dyn Catalog,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (produced_any, result) = self.run_items(catalog, progress, cancel).await;

        // Ask for a rescan whenever something new landed, even when the run
        // was cut short afterwards.
        if produced_any {
            catalog.queue_library_scan().await?;
        }

        result
    }
}
