//! Work stage.

use super::upserter::{Lookup, UpsertHandler};
use crate::config::MediaConfig;
use crate::error::Result;
use crate::media::MediaPipeline;
use crate::resolver::RelationshipResolver;
use crate::schema::WorkRecord;
use crate::store::{RefKind, SeedStore, WorkData, WorkLinks};
use async_trait::async_trait;
use std::sync::Arc;

/// Upserts works keyed by slug.
///
/// Contributors, genres and the category are resolved to reference rows
/// before anything is uploaded, so a resolution failure leaves no orphaned
/// media behind.
pub struct WorkHandler {
    store: Arc<dyn SeedStore>,
    resolver: Arc<RelationshipResolver>,
    media: Arc<MediaPipeline>,
}

impl WorkHandler {
    pub fn new(
        store: Arc<dyn SeedStore>,
        resolver: Arc<RelationshipResolver>,
        media: Arc<MediaPipeline>,
    ) -> Self {
        Self {
            store,
            resolver,
            media,
        }
    }

    async fn to_row(&self, work: &WorkRecord) -> Result<(WorkData, WorkLinks)> {
        let category = work.category.as_deref().unwrap_or_default();
        let category_id = self.resolver.get_or_create(RefKind::Category, category).await?;
        let links = WorkLinks {
            authors: self.resolver.resolve_all(RefKind::Author, &work.authors).await?,
            artists: self.resolver.resolve_all(RefKind::Artist, &work.artists).await?,
            genres: self.resolver.resolve_all(RefKind::Genre, &work.genres).await?,
        };

        let cover_url = self
            .media
            .relocate_opt(work.cover_url.as_deref(), MediaConfig::WORK_COVER_FOLDER)
            .await;

        let data = WorkData {
            slug: work.slug.clone(),
            title: work.title.clone(),
            alternative_titles: work.alternative_titles.clone(),
            description: work.description.clone(),
            cover_url,
            status: work.status.as_str().to_string(),
            category_id: Some(category_id),
            release_year: work.release_year,
            rating: work.rating,
            views: work.views,
        };
        Ok((data, links))
    }
}

#[async_trait]
impl UpsertHandler for WorkHandler {
    type Record = WorkRecord;

    async fn lookup(&self, work: &WorkRecord) -> Result<Lookup> {
        Ok(match self.store.find_work(&work.slug).await? {
            Some(row) => Lookup::Existing(row.id),
            None => Lookup::Absent,
        })
    }

    async fn insert(&self, work: &WorkRecord) -> Result<i64> {
        let (data, links) = self.to_row(work).await?;
        self.store.insert_work(&data, &links).await
    }

    async fn update(&self, id: i64, work: &WorkRecord) -> Result<()> {
        let (data, links) = self.to_row(work).await?;
        self.store.update_work(id, &data, &links).await
    }
}
