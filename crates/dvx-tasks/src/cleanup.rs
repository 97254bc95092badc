//! Cleanup task: delete a derived item once the pair is fully watched.
//!
//! Only items this system recognizably produced are candidates (derived-path
//! suffix, MP4 container, a Dolby Vision stream), and only when both the
//! derived item and its located source are watched by the primary user. The
//! source file is never touched.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use dvx_core::ids::UserId;
use dvx_core::media::{source_path_of, MediaItem};
use dvx_core::{Config, Error, Result};

use crate::catalog::Catalog;
use crate::classify::needs_cleanup;
use crate::task::{Progress, ScheduledTask, TaskTrigger};

pub struct CleanupTask {
    config: Arc<Config>,
}

impl CleanupTask {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ScheduledTask for CleanupTask {
    fn name(&self) -> &'static str {
        "Clean up watched remuxes"
    }

    fn key(&self) -> &'static str {
        "DoViCleanupWatched"
    }

    fn description(&self) -> &'static str {
        "Deletes remuxed MP4 files once both the source and the remux are watched"
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
        // Without a primary user there is no watched signal to trust, so
        // nothing is ever deleted.
        let Some(name) = &self.config.primary_user else {
            tracing::info!("no primary user configured; cleanup is a no-op");
            return Ok(());
        };
        let Some(user) = catalog.resolve_user(name).await? else {
            return Err(Error::Validation(format!(
                "configured primary user {name:?} does not exist"
            )));
        };

        let items = catalog.query_videos(&self.config.include_ancestors()).await?;
        let total = items.len();

        for (i, item) in items.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Canceled);
            }

            if let Err(e) = cleanup_one(catalog, user, &item).await {
                tracing::error!(item = %item.id, name = %item.name, "cleanup failed: {e}");
            }

            if total > 0 {
                progress.report((i + 1) as f32 / total as f32 * 100.0, &item.name);
            }
        }

        Ok(())
    }
}

async fn cleanup_one(catalog: &dyn Catalog, user: UserId, derived: &MediaItem) -> Result<()> {
    // Fast path: not something this system produced.
    let Some(source_path) = source_path_of(&derived.path) else {
        return Ok(());
    };

    let streams = catalog.streams(derived.id).await?;
    let source = catalog.find_by_path(&source_path).await?;

    let derived_watched = catalog.watch_state(user, derived.id).await?.played;
    let source_watched = match &source {
        Some(source) => catalog.watch_state(user, source.id).await?.played,
        None => false,
    };

    if !needs_cleanup(
        derived,
        &streams,
        source.as_ref(),
        derived_watched,
        source_watched,
    ) {
        return Ok(());
    }

    tracing::info!(
        derived = %derived.id,
        name = %derived.name,
        "deleting watched remux {}",
        derived.path.display()
    );
    catalog.delete_item(derived.id, true).await
}
