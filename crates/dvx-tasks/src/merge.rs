//! Version-merge task: link a discovered derived item to its source.
//!
//! After the host's library scan picks up a freshly-remuxed MP4, it sits in
//! the catalog as a standalone item. This task finds such pairs and sets the
//! derived item's primary-version link to the source id, making the two show
//! up as one title with two versions. Already-linked pairs are left alone, so
//! running the task twice writes nothing the second time.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use dvx_core::media::derived_path;
use dvx_core::{Config, Error, Result};

use crate::catalog::Catalog;
use crate::classify::needs_merge;
use crate::task::{Progress, ScheduledTask, TaskTrigger};

pub struct VersionMergeTask {
    config: Arc<Config>,
}

impl VersionMergeTask {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ScheduledTask for VersionMergeTask {
    fn name(&self) -> &'static str {
        "Merge remuxed versions"
    }

    fn key(&self) -> &'static str {
        "DoViMergeVersions"
    }

    fn description(&self) -> &'static str {
        "Links remuxed MP4 files to their MKV sources as alternate versions"
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
        let items = catalog.query_videos(&self.config.include_ancestors()).await?;
        let total = items.len();

        for (i, item) in items.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Canceled);
            }

            if item.is_mkv() {
                if let Err(e) = merge_one(catalog, &item).await {
                    tracing::error!(item = %item.id, name = %item.name, "merge failed: {e}");
                }
            }

            if total > 0 {
                progress.report((i + 1) as f32 / total as f32 * 100.0, &item.name);
            }
        }

        Ok(())
    }
}

async fn merge_one(catalog: &dyn Catalog, source: &dvx_core::media::MediaItem) -> Result<()> {
    let streams = catalog.streams(source.id).await?;
    let derived = catalog.find_by_path(&derived_path(&source.path)).await?;

    if !needs_merge(source, &streams, derived.as_ref()) {
        return Ok(());
    }

    // needs_merge returned true, so the derived item exists.
    let Some(mut derived) = derived else {
        return Ok(());
    };

    tracing::info!(
        source = %source.id,
        derived = %derived.id,
        name = %source.name,
        "linking derived version"
    );

    derived.primary_version_id = Some(source.id);
    catalog.persist(&derived).await
}
