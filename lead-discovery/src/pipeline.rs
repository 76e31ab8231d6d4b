use crate::sources::SourceChain;
use llm_interface::{LlmProvider, RelevanceScorer, ScoringContext};
use salesflow_core::{
    dedup_by_url, merge_results, normalize_url, AppConfig, Campaign, CandidatePost, CoreError,
    ErrorRecovery, LeadSource, MergeSettings, QueryBuilder, ScoredPost,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// What one source contributed to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: LeadSource,
    pub candidates: usize,
    pub scored: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub run_id: Uuid,
    pub posts: Vec<ScoredPost>,
    pub sources: Vec<SourceReport>,
}

pub struct DiscoveryPipeline {
    reddit: SourceChain,
    twitter: SourceChain,
    scorer: RelevanceScorer,
    merge: MergeSettings,
}

impl DiscoveryPipeline {
    pub fn new(
        reddit: SourceChain,
        twitter: SourceChain,
        scorer: RelevanceScorer,
        merge: MergeSettings,
    ) -> Self {
        Self {
            reddit,
            twitter,
            scorer,
            merge,
        }
    }

    pub fn from_config(config: &AppConfig, provider: Arc<dyn LlmProvider>) -> Result<Self, CoreError> {
        Ok(Self::new(
            SourceChain::reddit(config, Some(provider.clone()))?,
            SourceChain::twitter(config, Some(provider.clone()))?,
            RelevanceScorer::new(provider),
            config.pipeline.merge_settings(),
        ))
    }

    /// Searches every source the campaign targets and returns the merged,
    /// ranked posts. Sources fail independently; only configuration errors
    /// abort the run.
    pub async fn run(&self, campaign: &Campaign) -> Result<DiscoveryReport, CoreError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("discovery_run", campaign_id = %campaign.id, %run_id);
        self.discover(campaign, run_id).instrument(span).await
    }

    async fn discover(&self, campaign: &Campaign, run_id: Uuid) -> Result<DiscoveryReport, CoreError> {
        let context = ScoringContext::from_campaign(campaign);

        let (reddit, twitter) = tokio::join!(
            self.run_source(campaign, &context, &self.reddit),
            self.run_source(campaign, &context, &self.twitter),
        );

        let mut sources = Vec::new();
        let mut per_source = Vec::new();
        for (report, posts) in [reddit?, twitter?].into_iter().flatten() {
            sources.push(report);
            per_source.push(posts);
        }

        let posts = merge_results(per_source, &self.merge);
        info!(results = posts.len(), "discovery run finished");

        Ok(DiscoveryReport {
            run_id,
            posts,
            sources,
        })
    }

    async fn run_source(
        &self,
        campaign: &Campaign,
        context: &ScoringContext,
        chain: &SourceChain,
    ) -> Result<Option<(SourceReport, Vec<ScoredPost>)>, CoreError> {
        let source = chain.source();
        if !campaign.targets(source) {
            return Ok(None);
        }

        let report = self
            .search_and_score(campaign, context, chain)
            .instrument(info_span!("source", source = %source))
            .await?;
        Ok(Some(report))
    }

    /// Fetch, validate, score and dedupe for one source. Per-step failures
    /// degrade to an empty list.
    async fn search_and_score(
        &self,
        campaign: &Campaign,
        context: &ScoringContext,
        chain: &SourceChain,
    ) -> Result<(SourceReport, Vec<ScoredPost>), CoreError> {
        let source = chain.source();
        let query = QueryBuilder::build(campaign, source);
        debug!(query = %query.query, window = query.time_window.token(), "source query built");

        let fetched = ErrorRecovery::recover_source(chain.fetch(&query).await, source.as_str())?;
        let candidates = validate_candidates(source, fetched);
        let candidate_count = candidates.len();

        let scored = ErrorRecovery::recover_source(
            self.scorer.score(context, source, candidates).await,
            source.as_str(),
        )?;
        let scored = dedup_by_url(scored);

        info!(candidates = candidate_count, scored = scored.len(), "source finished");
        Ok((
            SourceReport {
                source,
                candidates: candidate_count,
                scored: scored.len(),
            },
            scored,
        ))
    }
}

/// Canonicalizes URLs, drops invalid ones and dedupes.
fn validate_candidates(source: LeadSource, candidates: Vec<CandidatePost>) -> Vec<CandidatePost> {
    let valid = candidates
        .into_iter()
        .filter(|c| c.source == source)
        .filter_map(|mut c| {
            c.url = normalize_url(source, &c.url)?;
            Some(c)
        })
        .collect();
    dedup_by_url(valid)
}
