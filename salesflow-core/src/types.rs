use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadSource {
    Reddit,
    Twitter,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::Reddit => "reddit",
            LeadSource::Twitter => "twitter",
        }
    }
}

impl fmt::Display for LeadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reddit" => Ok(LeadSource::Reddit),
            "twitter" | "x" => Ok(LeadSource::Twitter),
            other => Err(CoreError::invalid_input(format!(
                "unknown lead source '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            other => Err(CoreError::invalid_input(format!(
                "unknown campaign status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateRange {
    LastDay,
    LastWeek,
    LastMonth,
}

impl DateRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateRange::LastDay => "lastDay",
            DateRange::LastWeek => "lastWeek",
            DateRange::LastMonth => "lastMonth",
        }
    }
}

impl FromStr for DateRange {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lastday" | "day" => Ok(DateRange::LastDay),
            "lastweek" | "week" => Ok(DateRange::LastWeek),
            "lastmonth" | "month" => Ok(DateRange::LastMonth),
            other => Err(CoreError::invalid_input(format!(
                "unknown date range '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    New,
    Contacted,
    Hidden,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::New => "new",
            PostStatus::Contacted => "contacted",
            PostStatus::Hidden => "hidden",
        }
    }
}

impl FromStr for PostStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(PostStatus::New),
            "contacted" => Ok(PostStatus::Contacted),
            "hidden" => Ok(PostStatus::Hidden),
            other => Err(CoreError::invalid_input(format!(
                "unknown post status '{}'",
                other
            ))),
        }
    }
}

/// Fields a user fills in when creating a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCampaign {
    pub name: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub negative_keywords: Vec<String>,
    #[serde(default)]
    pub subreddits: Vec<String>,
    pub website_url: Option<String>,
    pub date_range: DateRange,
    pub lead_sources: Vec<LeadSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: CampaignStatus,
    pub keywords: Vec<String>,
    pub negative_keywords: Vec<String>,
    pub subreddits: Vec<String>,
    pub website_url: Option<String>,
    pub date_range: DateRange,
    pub lead_sources: Vec<LeadSource>,
    pub leads_found: u32,
    pub high_potential: u32,
    pub contacted: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(input: NewCampaign) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            description: input.description.filter(|d| !d.trim().is_empty()),
            status: CampaignStatus::Active,
            keywords: clean_list(input.keywords),
            negative_keywords: clean_list(input.negative_keywords),
            subreddits: input
                .subreddits
                .into_iter()
                .map(|s| s.trim().trim_start_matches("r/").to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            website_url: input.website_url.filter(|u| !u.trim().is_empty()),
            date_range: input.date_range,
            lead_sources: input.lead_sources,
            leads_found: 0,
            high_potential: 0,
            contacted: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.is_empty() {
            return Err(CoreError::invalid_input("campaign name is required"));
        }
        if self.keywords.is_empty() {
            return Err(CoreError::invalid_input(
                "campaign needs at least one keyword",
            ));
        }
        if self.lead_sources.is_empty() {
            return Err(CoreError::invalid_input(
                "campaign needs at least one lead source",
            ));
        }
        Ok(())
    }

    pub fn targets(&self, source: LeadSource) -> bool {
        self.lead_sources.contains(&source)
    }

    /// What the campaign sells, as handed to the scoring and comment prompts.
    pub fn product_description(&self) -> String {
        match &self.description {
            Some(description) => description.clone(),
            None => format!("A product related to: {}", self.keywords.join(", ")),
        }
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub likes: u64,
    pub reposts: u64,
    pub replies: u64,
}

/// A raw, unscored post returned by a source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePost {
    pub source: LeadSource,
    pub url: String,
    pub source_name: String,
    pub title: String,
    pub content: String,
    pub author_url: Option<String>,
    pub engagement: Option<Engagement>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPost {
    pub post: CandidatePost,
    pub relevance: u8,
}

impl ScoredPost {
    pub fn has_required_fields(&self) -> bool {
        !self.post.url.trim().is_empty()
            && !self.post.source_name.trim().is_empty()
            && !self.post.title.trim().is_empty()
            && !self.post.content.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub source: LeadSource,
    pub url: String,
    pub source_name: String,
    pub title: String,
    pub content: String,
    pub relevance: u8,
    pub status: PostStatus,
    pub author_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn from_scored(campaign_id: Uuid, scored: ScoredPost) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            source: scored.post.source,
            url: scored.post.url,
            source_name: scored.post.source_name,
            title: scored.post.title,
            content: scored.post.content,
            relevance: scored.relevance,
            status: PostStatus::New,
            author_url: scored.post.author_url,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub post_id: Uuid,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl CommentRecord {
    pub fn new(campaign_id: Uuid, post_id: Uuid, comment: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            post_id,
            comment,
            created_at: Utc::now(),
        }
    }
}

pub trait HasUrl {
    fn url(&self) -> &str;
}

impl HasUrl for CandidatePost {
    fn url(&self) -> &str {
        &self.url
    }
}

impl HasUrl for ScoredPost {
    fn url(&self) -> &str {
        &self.post.url
    }
}

/// Deduplicates by URL. A later item replaces an earlier one with the same
/// URL but keeps the earlier item's position.
pub fn dedup_by_url<T: HasUrl>(items: Vec<T>) -> Vec<T> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut unique: Vec<T> = Vec::with_capacity(items.len());

    for item in items {
        match positions.get(item.url()) {
            Some(&index) => unique[index] = item,
            None => {
                positions.insert(item.url().to_string(), unique.len());
                unique.push(item);
            }
        }
    }

    unique
}
