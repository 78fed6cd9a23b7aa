//! Episode stage.

use super::result::SKIP_PARENT_NOT_FOUND;
use super::upserter::{Lookup, UpsertHandler};
use crate::concurrency::SingleFlight;
use crate::config::MediaConfig;
use crate::error::{Result, SeedError};
use crate::media::MediaPipeline;
use crate::schema::EpisodeRecord;
use crate::store::{EpisodeData, SeedStore};
use async_trait::async_trait;
use std::sync::Arc;

/// Upserts episodes keyed by `(parent work, number)`.
///
/// Episodes whose parent work is not in the store are skipped, never inserted.
pub struct EpisodeHandler {
    store: Arc<dyn SeedStore>,
    media: Arc<MediaPipeline>,
    /// Parent slug to work id; only found parents are remembered.
    parents: SingleFlight<String, i64>,
}

impl EpisodeHandler {
    pub fn new(store: Arc<dyn SeedStore>, media: Arc<MediaPipeline>) -> Self {
        Self {
            store,
            media,
            parents: SingleFlight::new(),
        }
    }

    async fn parent_id(&self, slug: &str) -> Result<Option<i64>> {
        if let Some(id) = self.parents.get(&slug.to_string()) {
            return Ok(Some(id));
        }
        let found = self.store.find_work(slug).await?.map(|row| row.id);
        if let Some(id) = found {
            self.parents.insert(slug.to_string(), id);
        }
        Ok(found)
    }

    async fn to_row(&self, episode: &EpisodeRecord) -> Result<EpisodeData> {
        let work_id = self
            .parent_id(&episode.parent_slug)
            .await?
            .ok_or_else(|| SeedError::persistence(&episode.slug, SKIP_PARENT_NOT_FOUND))?;

        let folder = format!("{}/{}", MediaConfig::EPISODE_PAGE_FOLDER, episode.parent_slug);
        let image_urls = self.media.relocate_all(&episode.image_urls, &folder).await;

        Ok(EpisodeData {
            work_id,
            number: episode.number,
            slug: episode.slug.clone(),
            title: episode.title.clone(),
            image_urls,
            release_date: episode.release_date.map(|d| d.to_rfc3339()),
            views: episode.views,
        })
    }
}

#[async_trait]
impl UpsertHandler for EpisodeHandler {
    type Record = EpisodeRecord;

    async fn lookup(&self, episode: &EpisodeRecord) -> Result<Lookup> {
        let Some(work_id) = self.parent_id(&episode.parent_slug).await? else {
            return Ok(Lookup::Skip(SKIP_PARENT_NOT_FOUND.to_string()));
        };
        Ok(match self.store.find_episode(work_id, episode.number).await? {
            Some(row) => Lookup::Existing(row.id),
            None => Lookup::Absent,
        })
    }

    async fn insert(&self, episode: &EpisodeRecord) -> Result<i64> {
        let row = self.to_row(episode).await?;
        self.store.insert_episode(&row).await
    }

    async fn update(&self, id: i64, episode: &EpisodeRecord) -> Result<()> {
        let row = self.to_row(episode).await?;
        self.store.update_episode(id, &row).await
    }
}
