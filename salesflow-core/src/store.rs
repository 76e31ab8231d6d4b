use crate::{Campaign, CommentRecord, CoreError, Post, PostStatus};
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence boundary for campaigns, their posts and comment history.
///
/// The discovery pipeline only produces in-memory posts; everything that
/// outlives a run goes through this trait.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<(), CoreError>;

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, CoreError>;

    async fn list_campaigns(&self) -> Result<Vec<Campaign>, CoreError>;

    async fn update_campaign(&self, campaign: &Campaign) -> Result<(), CoreError>;

    /// Removes the campaign together with its posts and comments.
    async fn delete_campaign(&self, id: Uuid) -> Result<(), CoreError>;

    async fn create_posts(&self, posts: &[Post]) -> Result<(), CoreError>;

    async fn list_posts(&self, campaign_id: Uuid) -> Result<Vec<Post>, CoreError>;

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, CoreError>;

    async fn update_post_status(&self, id: Uuid, status: PostStatus) -> Result<(), CoreError>;

    async fn save_comment(&self, comment: &CommentRecord) -> Result<(), CoreError>;

    async fn list_comments(&self, campaign_id: Uuid) -> Result<Vec<CommentRecord>, CoreError>;
}
