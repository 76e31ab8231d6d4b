use crate::ScoredPost;
use tracing::debug;

pub const DEFAULT_RELEVANCE_THRESHOLD: u8 = 70;
pub const DEFAULT_MAX_RESULTS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSettings {
    pub relevance_threshold: u8,
    pub max_results: usize,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// Merges per-source results into the final lead list.
///
/// Entries under the threshold or missing a required field are dropped, the
/// rest are sorted by relevance (stable, no secondary key) and capped.
/// Deduplication is the source pipelines' job.
pub fn merge_results(per_source: Vec<Vec<ScoredPost>>, settings: &MergeSettings) -> Vec<ScoredPost> {
    let mut merged: Vec<ScoredPost> = Vec::new();

    for source_posts in per_source {
        let before = source_posts.len();
        let kept: Vec<ScoredPost> = source_posts
            .into_iter()
            .filter(|p| p.relevance >= settings.relevance_threshold)
            .filter(ScoredPost::has_required_fields)
            .collect();
        debug!(before, kept = kept.len(), "filtered source results");
        merged.extend(kept);
    }

    merged.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    merged.truncate(settings.max_results);
    merged
}
