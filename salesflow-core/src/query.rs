use crate::{Campaign, DateRange, LeadSource};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Search window handed to the source APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Day,
    Week,
    Month,
}

impl TimeWindow {
    /// Token understood by Reddit's `t=` parameter.
    pub fn token(&self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Day => Duration::days(1),
            TimeWindow::Week => Duration::days(7),
            TimeWindow::Month => Duration::days(30),
        }
    }

    pub fn start_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

impl DateRange {
    pub fn time_window(&self) -> TimeWindow {
        match self {
            DateRange::LastDay => TimeWindow::Day,
            DateRange::LastWeek => TimeWindow::Week,
            DateRange::LastMonth => TimeWindow::Month,
        }
    }
}

/// A source-specific search request derived from a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceQuery {
    pub source: LeadSource,
    pub query: String,
    pub time_window: TimeWindow,
    pub keywords: Vec<String>,
    pub negative_keywords: Vec<String>,
    pub subreddits: Vec<String>,
}

pub struct QueryBuilder;

impl QueryBuilder {
    pub fn build(campaign: &Campaign, source: LeadSource) -> SourceQuery {
        let keywords: Vec<String> = campaign
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let negative_keywords: Vec<String> = campaign
            .negative_keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let mut query = Self::positive_clause(&keywords);
        if source == LeadSource::Reddit {
            for negative in &negative_keywords {
                query.push_str(&format!(" NOT {}", quote(negative)));
            }
        }

        let subreddits = match source {
            LeadSource::Reddit => campaign.subreddits.clone(),
            LeadSource::Twitter => Vec::new(),
        };

        SourceQuery {
            source,
            query,
            time_window: campaign.date_range.time_window(),
            keywords,
            negative_keywords,
            subreddits,
        }
    }

    fn positive_clause(keywords: &[String]) -> String {
        let quoted: Vec<String> = keywords.iter().map(|k| quote(k)).collect();
        match quoted.len() {
            0 => String::new(),
            1 => quoted[0].clone(),
            _ => format!("({})", quoted.join(" OR ")),
        }
    }
}

fn quote(term: &str) -> String {
    format!("\"{}\"", term.replace('"', ""))
}
