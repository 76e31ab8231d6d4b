use async_trait::async_trait;
use salesflow_core::{
    Campaign, CampaignStore, CommentRecord, CoreError, DatabaseError, Post, PostStatus,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    campaigns: HashMap<Uuid, Campaign>,
    posts: Vec<Post>,
    comments: Vec<CommentRecord>,
}

/// In-process `CampaignStore`, used for dry runs and tests.
///
/// Mirrors the SQLite store: posts are unique per `(campaign_id, url)` and
/// duplicates are ignored on insert.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(resource: &str, id: Uuid) -> CoreError {
    CoreError::NotFound {
        resource: format!("{} {}", resource, id),
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        if tables.campaigns.contains_key(&campaign.id) {
            return Err(CoreError::Database(DatabaseError::ConstraintViolation {
                constraint: "campaigns.id".to_string(),
            }));
        }
        tables.campaigns.insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, CoreError> {
        Ok(self.tables.read().await.campaigns.get(&id).cloned())
    }

    async fn list_campaigns(&self) -> Result<Vec<Campaign>, CoreError> {
        let tables = self.tables.read().await;
        let mut campaigns: Vec<Campaign> = tables.campaigns.values().cloned().collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns)
    }

    async fn update_campaign(&self, campaign: &Campaign) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        match tables.campaigns.get_mut(&campaign.id) {
            Some(existing) => {
                *existing = campaign.clone();
                Ok(())
            }
            None => Err(not_found("campaign", campaign.id)),
        }
    }

    async fn delete_campaign(&self, id: Uuid) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        if tables.campaigns.remove(&id).is_none() {
            return Err(not_found("campaign", id));
        }
        tables.posts.retain(|p| p.campaign_id != id);
        tables.comments.retain(|c| c.campaign_id != id);
        Ok(())
    }

    async fn create_posts(&self, posts: &[Post]) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        // All or nothing, like the SQLite transaction.
        if posts
            .iter()
            .any(|post| !tables.campaigns.contains_key(&post.campaign_id))
        {
            return Err(CoreError::Database(DatabaseError::ConstraintViolation {
                constraint: "posts.campaign_id".to_string(),
            }));
        }
        for post in posts {
            let duplicate = tables
                .posts
                .iter()
                .any(|p| p.campaign_id == post.campaign_id && p.url == post.url);
            if !duplicate {
                tables.posts.push(post.clone());
            }
        }
        Ok(())
    }

    async fn list_posts(&self, campaign_id: Uuid) -> Result<Vec<Post>, CoreError> {
        let tables = self.tables.read().await;
        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .filter(|p| p.campaign_id == campaign_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.relevance.cmp(&a.relevance));
        Ok(posts)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn update_post_status(&self, id: Uuid, status: PostStatus) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        match tables.posts.iter_mut().find(|p| p.id == id) {
            Some(post) => {
                post.status = status;
                Ok(())
            }
            None => Err(not_found("post", id)),
        }
    }

    async fn save_comment(&self, comment: &CommentRecord) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        if !tables.posts.iter().any(|p| p.id == comment.post_id) {
            return Err(CoreError::Database(DatabaseError::ConstraintViolation {
                constraint: "comments.post_id".to_string(),
            }));
        }
        tables.comments.push(comment.clone());
        Ok(())
    }

    async fn list_comments(&self, campaign_id: Uuid) -> Result<Vec<CommentRecord>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .iter()
            .filter(|c| c.campaign_id == campaign_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use salesflow_core::{CandidatePost, DateRange, LeadSource, NewCampaign, ScoredPost};

    fn campaign() -> Campaign {
        Campaign::new(NewCampaign {
            name: "Test".to_string(),
            description: None,
            keywords: vec!["crm".to_string()],
            negative_keywords: vec![],
            subreddits: vec![],
            website_url: None,
            date_range: DateRange::LastWeek,
            lead_sources: vec![LeadSource::Reddit],
        })
    }

    fn post(campaign_id: Uuid, id: &str, relevance: u8) -> Post {
        Post::from_scored(
            campaign_id,
            ScoredPost {
                post: CandidatePost {
                    source: LeadSource::Reddit,
                    url: format!("https://www.reddit.com/r/crm/comments/{}/x/", id),
                    source_name: "r/crm".to_string(),
                    title: "t".to_string(),
                    content: "c".to_string(),
                    author_url: None,
                    engagement: None,
                    created_at: None,
                },
                relevance,
            },
        )
    }

    #[tokio::test]
    async fn test_posts_are_unique_per_campaign_url() {
        let store = MemoryStore::new();
        let campaign = campaign();
        store.create_campaign(&campaign).await.unwrap();

        let first = post(campaign.id, "a", 80);
        let duplicate = post(campaign.id, "a", 99);
        let second = post(campaign.id, "b", 95);
        store.create_posts(&[first, duplicate, second]).await.unwrap();

        let posts = store.list_posts(campaign.id).await.unwrap();
        let relevances: Vec<u8> = posts.iter().map(|p| p.relevance).collect();
        assert_eq!(relevances, vec![95, 80]);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = MemoryStore::new();
        let campaign = campaign();
        store.create_campaign(&campaign).await.unwrap();
        let post = post(campaign.id, "a", 80);
        store.create_posts(&[post.clone()]).await.unwrap();
        store
            .save_comment(&CommentRecord::new(campaign.id, post.id, "hi".to_string()))
            .await
            .unwrap();

        store.delete_campaign(campaign.id).await.unwrap();
        assert!(store.get_campaign(campaign.id).await.unwrap().is_none());
        assert!(store.get_post(post.id).await.unwrap().is_none());
        assert!(store.list_comments(campaign.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_rows() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.update_post_status(id, PostStatus::Hidden).await,
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.create_posts(&[post(id, "a", 80)]).await,
            Err(CoreError::Database(DatabaseError::ConstraintViolation { .. }))
        ));
    }

    #[tokio::test]
    async fn test_rejected_batch_inserts_nothing() {
        let store = MemoryStore::new();
        let campaign = campaign();
        store.create_campaign(&campaign).await.unwrap();

        let result = store
            .create_posts(&[post(campaign.id, "a", 80), post(Uuid::new_v4(), "b", 90)])
            .await;
        assert!(matches!(
            result,
            Err(CoreError::Database(DatabaseError::ConstraintViolation { .. }))
        ));
        assert!(store.list_posts(campaign.id).await.unwrap().is_empty());
    }
}
