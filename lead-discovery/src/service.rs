use crate::pipeline::{DiscoveryPipeline, SourceReport};
use chrono::Utc;
use llm_interface::CommentGenerator;
use salesflow_core::{
    Campaign, CampaignStatus, CampaignStore, CommentRecord, CoreError, ErrorExt, NewCampaign,
    Post, PostStatus,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const NO_RESULTS_NOTICE: &str = "No results found, try refreshing";

/// Result of one refresh: the updated campaign and the posts it gained.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub campaign: Campaign,
    pub new_posts: Vec<Post>,
    pub run_id: Uuid,
    pub sources: Vec<SourceReport>,
}

impl RefreshOutcome {
    /// Shown to the user when a run found nothing new.
    pub fn notice(&self) -> Option<&'static str> {
        self.new_posts.is_empty().then_some(NO_RESULTS_NOTICE)
    }
}

pub struct CampaignService {
    store: Arc<dyn CampaignStore>,
    pipeline: DiscoveryPipeline,
    comments: CommentGenerator,
    high_potential_threshold: u8,
}

impl CampaignService {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        pipeline: DiscoveryPipeline,
        comments: CommentGenerator,
        high_potential_threshold: u8,
    ) -> Self {
        Self {
            store,
            pipeline,
            comments,
            high_potential_threshold,
        }
    }

    pub fn pipeline(&self) -> &DiscoveryPipeline {
        &self.pipeline
    }

    /// Validates and stores the campaign, then runs its first discovery.
    /// A failed first run removes the campaign again.
    pub async fn create_campaign(&self, input: NewCampaign) -> Result<RefreshOutcome, CoreError> {
        let campaign = Campaign::new(input);
        campaign.validate()?;
        self.store.create_campaign(&campaign).await?;
        info!(campaign_id = %campaign.id, name = %campaign.name, "campaign created");

        match self.refresh_campaign(campaign.id).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(campaign_id = %campaign.id, error = %e, "first discovery failed, removing campaign");
                if let Err(cleanup) = self.store.delete_campaign(campaign.id).await {
                    cleanup.log_warn();
                }
                Err(e)
            }
        }
    }

    pub async fn list_campaigns(&self) -> Result<Vec<Campaign>, CoreError> {
        self.store.list_campaigns().await
    }

    pub async fn get_campaign(&self, id: Uuid) -> Result<Campaign, CoreError> {
        self.store.get_campaign(id).await?.ok_or_else(|| CoreError::NotFound {
            resource: format!("campaign {}", id),
        })
    }

    #[instrument(skip(self))]
    pub async fn refresh_campaign(&self, id: Uuid) -> Result<RefreshOutcome, CoreError> {
        let mut campaign = self.get_campaign(id).await?;
        let report = self.pipeline.run(&campaign).await?;

        let known: HashSet<String> = self
            .store
            .list_posts(id)
            .await?
            .into_iter()
            .map(|p| p.url)
            .collect();

        let new_posts: Vec<Post> = report
            .posts
            .into_iter()
            .filter(|scored| !known.contains(&scored.post.url))
            .map(|scored| Post::from_scored(id, scored))
            .collect();

        if !new_posts.is_empty() {
            self.store.create_posts(&new_posts).await?;
        }

        let high_potential = new_posts
            .iter()
            .filter(|p| p.relevance >= self.high_potential_threshold)
            .count() as u32;
        campaign.leads_found += new_posts.len() as u32;
        campaign.high_potential += high_potential;
        campaign.updated_at = Utc::now();
        self.store.update_campaign(&campaign).await?;

        info!(
            new_posts = new_posts.len(),
            high_potential,
            leads_found = campaign.leads_found,
            "campaign refreshed"
        );

        Ok(RefreshOutcome {
            campaign,
            new_posts,
            run_id: report.run_id,
            sources: report.sources,
        })
    }

    /// Posts for a campaign, best first. Hidden posts are left out unless
    /// asked for.
    pub async fn list_posts(&self, campaign_id: Uuid, include_hidden: bool) -> Result<Vec<Post>, CoreError> {
        let posts = self.store.list_posts(campaign_id).await?;
        Ok(posts
            .into_iter()
            .filter(|p| include_hidden || p.status != PostStatus::Hidden)
            .collect())
    }

    async fn get_post(&self, id: Uuid) -> Result<Post, CoreError> {
        self.store.get_post(id).await?.ok_or_else(|| CoreError::NotFound {
            resource: format!("post {}", id),
        })
    }

    /// Marks a post contacted. The campaign counter only moves on the first
    /// transition.
    pub async fn mark_contacted(&self, post_id: Uuid) -> Result<Post, CoreError> {
        let mut post = self.get_post(post_id).await?;
        if post.status == PostStatus::Contacted {
            return Ok(post);
        }

        self.store
            .update_post_status(post_id, PostStatus::Contacted)
            .await?;
        post.status = PostStatus::Contacted;

        let mut campaign = self.get_campaign(post.campaign_id).await?;
        campaign.contacted += 1;
        campaign.updated_at = Utc::now();
        self.store.update_campaign(&campaign).await?;

        info!(%post_id, campaign_id = %campaign.id, "post marked contacted");
        Ok(post)
    }

    pub async fn hide_post(&self, post_id: Uuid) -> Result<(), CoreError> {
        self.get_post(post_id).await?;
        self.store.update_post_status(post_id, PostStatus::Hidden).await
    }

    pub async fn set_campaign_status(&self, id: Uuid, status: CampaignStatus) -> Result<Campaign, CoreError> {
        let mut campaign = self.get_campaign(id).await?;
        if campaign.status != status {
            campaign.status = status;
            campaign.updated_at = Utc::now();
            self.store.update_campaign(&campaign).await?;
            info!(campaign_id = %id, status = status.as_str(), "campaign status changed");
        }
        Ok(campaign)
    }

    pub async fn delete_campaign(&self, id: Uuid) -> Result<(), CoreError> {
        self.store.delete_campaign(id).await?;
        info!(campaign_id = %id, "campaign deleted");
        Ok(())
    }

    /// Writes an outreach comment for a post and keeps it in the history.
    pub async fn generate_comment(&self, post_id: Uuid) -> Result<CommentRecord, CoreError> {
        let post = self.get_post(post_id).await?;
        let campaign = self.get_campaign(post.campaign_id).await?;

        let text = self.comments.generate(&campaign, &post).await?;
        let record = CommentRecord::new(campaign.id, post.id, text);
        self.store.save_comment(&record).await?;
        Ok(record)
    }

    pub async fn list_comments(&self, campaign_id: Uuid) -> Result<Vec<CommentRecord>, CoreError> {
        self.store.list_comments(campaign_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DiscoveryPipeline;
    use crate::sources::testing::{reddit_post, FixedStrategy};
    use crate::sources::SourceChain;
    use crate::store::MemoryStore;
    use crate::testing::ScoringProvider;
    use llm_interface::RelevanceScorer;
    use salesflow_core::{CandidatePost, DateRange, LeadSource, MergeSettings};

    fn invoicing_campaign() -> NewCampaign {
        NewCampaign {
            name: "Invoicing".to_string(),
            description: Some("Invoicing for small businesses".to_string()),
            keywords: vec!["invoicing software".to_string()],
            negative_keywords: vec![],
            subreddits: vec!["smallbusiness".to_string()],
            website_url: Some("https://invoices.example".to_string()),
            date_range: DateRange::LastWeek,
            lead_sources: vec![LeadSource::Reddit],
        }
    }

    fn service(posts: Vec<CandidatePost>, provider: ScoringProvider) -> (CampaignService, Arc<MemoryStore>) {
        let provider = Arc::new(provider);
        let reddit = SourceChain::new(
            LeadSource::Reddit,
            vec![Box::new(FixedStrategy::ok("reddit", LeadSource::Reddit, posts))],
        );
        let twitter = SourceChain::new(LeadSource::Twitter, vec![]);
        let pipeline = DiscoveryPipeline::new(
            reddit,
            twitter,
            RelevanceScorer::new(provider.clone()),
            MergeSettings::default(),
        );
        let store = Arc::new(MemoryStore::new());
        let service = CampaignService::new(store.clone(), pipeline, CommentGenerator::new(provider), 90);
        (service, store)
    }

    fn three_posts() -> Vec<CandidatePost> {
        vec![reddit_post("a"), reddit_post("b"), reddit_post("c")]
    }

    #[tokio::test]
    async fn test_end_to_end_discovery() {
        let provider = ScoringProvider::with_scores(&[("a", 95), ("b", 72), ("c", 40)]);
        let (service, store) = service(three_posts(), provider);

        let outcome = service.create_campaign(invoicing_campaign()).await.unwrap();
        assert_eq!(outcome.new_posts.len(), 2);
        assert_eq!(outcome.campaign.leads_found, 2);
        assert_eq!(outcome.campaign.high_potential, 1);
        assert_eq!(outcome.notice(), None);

        let stored = store.list_posts(outcome.campaign.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|p| p.status == PostStatus::New));
    }

    #[tokio::test]
    async fn test_failed_first_run_leaves_no_campaign() {
        let provider = Arc::new(ScoringProvider::with_scores(&[]));
        let reddit = SourceChain::new(LeadSource::Reddit, vec![])
            .with_missing_credentials("reddit.client_id");
        let pipeline = DiscoveryPipeline::new(
            reddit,
            SourceChain::new(LeadSource::Twitter, vec![]),
            RelevanceScorer::new(provider.clone()),
            MergeSettings::default(),
        );
        let store = Arc::new(MemoryStore::new());
        let service = CampaignService::new(store.clone(), pipeline, CommentGenerator::new(provider), 90);

        let result = service.create_campaign(invoicing_campaign()).await;
        assert!(result.unwrap_err().is_configuration());
        assert!(store.list_campaigns().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_skips_known_posts() {
        let provider = ScoringProvider::with_scores(&[("a", 95), ("b", 72), ("c", 40)]);
        let (service, _store) = service(three_posts(), provider);

        let first = service.create_campaign(invoicing_campaign()).await.unwrap();
        let second = service.refresh_campaign(first.campaign.id).await.unwrap();

        assert!(second.new_posts.is_empty());
        assert_eq!(second.notice(), Some(NO_RESULTS_NOTICE));
        assert_eq!(second.campaign.leads_found, 2);
        assert_eq!(second.campaign.high_potential, 1);
    }

    #[tokio::test]
    async fn test_zero_results_is_success_with_notice() {
        let (service, _store) = service(vec![], ScoringProvider::with_scores(&[]));
        let outcome = service.create_campaign(invoicing_campaign()).await.unwrap();
        assert_eq!(outcome.notice(), Some(NO_RESULTS_NOTICE));
        assert_eq!(outcome.campaign.leads_found, 0);
    }

    #[tokio::test]
    async fn test_invalid_campaign_is_rejected_before_storing() {
        let (service, store) = service(vec![], ScoringProvider::with_scores(&[]));
        let mut input = invoicing_campaign();
        input.keywords = vec!["  ".to_string()];

        assert!(matches!(
            service.create_campaign(input).await,
            Err(CoreError::InvalidInput { .. })
        ));
        assert!(store.list_campaigns().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_contacted_counts_once() {
        let provider = ScoringProvider::with_scores(&[("a", 95)]);
        let (service, _store) = service(vec![reddit_post("a")], provider);
        let outcome = service.create_campaign(invoicing_campaign()).await.unwrap();
        let post_id = outcome.new_posts[0].id;

        service.mark_contacted(post_id).await.unwrap();
        let post = service.mark_contacted(post_id).await.unwrap();
        assert_eq!(post.status, PostStatus::Contacted);

        let campaign = service.get_campaign(outcome.campaign.id).await.unwrap();
        assert_eq!(campaign.contacted, 1);
    }

    #[tokio::test]
    async fn test_hide_and_list_posts() {
        let provider = ScoringProvider::with_scores(&[("a", 95), ("b", 80)]);
        let (service, _store) = service(vec![reddit_post("a"), reddit_post("b")], provider);
        let outcome = service.create_campaign(invoicing_campaign()).await.unwrap();
        let id = outcome.campaign.id;

        service.hide_post(outcome.new_posts[0].id).await.unwrap();
        assert_eq!(service.list_posts(id, false).await.unwrap().len(), 1);
        assert_eq!(service.list_posts(id, true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_status_and_delete() {
        let (service, _store) = service(vec![], ScoringProvider::with_scores(&[]));
        let outcome = service.create_campaign(invoicing_campaign()).await.unwrap();
        let id = outcome.campaign.id;

        let paused = service.set_campaign_status(id, CampaignStatus::Paused).await.unwrap();
        assert_eq!(paused.status, CampaignStatus::Paused);

        service.delete_campaign(id).await.unwrap();
        assert!(matches!(
            service.get_campaign(id).await,
            Err(CoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_generate_comment_is_stored() {
        let provider = ScoringProvider::with_scores(&[("a", 95)])
            .with_comment("Have you looked at dedicated invoicing tools?");
        let (service, _store) = service(vec![reddit_post("a")], provider);
        let outcome = service.create_campaign(invoicing_campaign()).await.unwrap();

        let record = service.generate_comment(outcome.new_posts[0].id).await.unwrap();
        assert_eq!(record.comment, "Have you looked at dedicated invoicing tools?");

        let history = service.list_comments(outcome.campaign.id).await.unwrap();
        assert_eq!(history, vec![record]);
    }
}
