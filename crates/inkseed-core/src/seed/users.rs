//! User stage.

use super::upserter::{Lookup, UpsertHandler};
use crate::config::MediaConfig;
use crate::error::Result;
use crate::media::MediaPipeline;
use crate::schema::UserRecord;
use crate::store::{SeedStore, UserData};
use async_trait::async_trait;
use std::sync::Arc;

/// Upserts users keyed by email; avatars go through the media pipeline.
pub struct UserHandler {
    store: Arc<dyn SeedStore>,
    media: Arc<MediaPipeline>,
}

impl UserHandler {
    pub fn new(store: Arc<dyn SeedStore>, media: Arc<MediaPipeline>) -> Self {
        Self { store, media }
    }

    async fn to_row(&self, user: &UserRecord) -> UserData {
        let avatar_url = self
            .media
            .relocate_opt(user.avatar_url.as_deref(), MediaConfig::USER_AVATAR_FOLDER)
            .await;
        UserData {
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.as_str().to_string(),
            avatar_url,
            bio: user.bio.clone(),
        }
    }
}

#[async_trait]
impl UpsertHandler for UserHandler {
    type Record = UserRecord;

    async fn lookup(&self, user: &UserRecord) -> Result<Lookup> {
        Ok(match self.store.find_user(&user.email).await? {
            Some(row) => Lookup::Existing(row.id),
            None => Lookup::Absent,
        })
    }

    async fn insert(&self, user: &UserRecord) -> Result<i64> {
        let row = self.to_row(user).await;
        self.store.insert_user(&row).await
    }

    async fn update(&self, id: i64, user: &UserRecord) -> Result<()> {
        let row = self.to_row(user).await;
        self.store.update_user(id, &row).await
    }
}
