//! SQLite persistence for campaigns, posts and comment history.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use salesflow_core::{
    Campaign, CampaignStore, CommentRecord, CoreError, DatabaseError, Post, PostStatus,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;


pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and applies pending
    /// migrations.
    ///
    /// # Example URLs
    /// - `sqlite://sales-flow.db`
    /// - `sqlite::memory:`
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(sql_error)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` opens its own database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(url, "database ready");
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self, CoreError> {
        Self::connect("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn sql_error(e: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_foreign_key_violation() || db.is_unique_violation() {
            return DatabaseError::ConstraintViolation {
                constraint: db.message().to_string(),
            }
            .into();
        }
    }
    DatabaseError::Sql(e).into()
}

fn corrupt(details: impl Into<String>) -> CoreError {
    DatabaseError::CorruptRecord {
        details: details.into(),
    }
    .into()
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| corrupt(format!("invalid timestamp '{}': {}", raw, e)))
}

fn parse_id(raw: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(raw).map_err(|e| corrupt(format!("invalid id '{}': {}", raw, e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CoreError> {
    Ok(serde_json::to_string(value)?)
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, CoreError> {
    serde_json::from_str(raw).map_err(|e| corrupt(format!("invalid JSON column: {}", e)))
}

fn count(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

#[derive(Debug, FromRow)]
struct CampaignRow {
    id: String,
    name: String,
    description: Option<String>,
    status: String,
    keywords: String,
    negative_keywords: String,
    subreddits: String,
    website_url: Option<String>,
    date_range: String,
    lead_sources: String,
    leads_found: i64,
    high_potential: i64,
    contacted: i64,
    created_at: String,
    updated_at: String,
}

impl CampaignRow {
    fn into_campaign(self) -> Result<Campaign, CoreError> {
        Ok(Campaign {
            id: parse_id(&self.id)?,
            name: self.name,
            description: self.description,
            status: self.status.parse()?,
            keywords: from_json(&self.keywords)?,
            negative_keywords: from_json(&self.negative_keywords)?,
            subreddits: from_json(&self.subreddits)?,
            website_url: self.website_url,
            date_range: self.date_range.parse()?,
            lead_sources: from_json(&self.lead_sources)?,
            leads_found: count(self.leads_found),
            high_potential: count(self.high_potential),
            contacted: count(self.contacted),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct PostRow {
    id: String,
    campaign_id: String,
    source: String,
    url: String,
    source_name: String,
    title: String,
    content: String,
    relevance: i64,
    status: String,
    author_url: Option<String>,
    created_at: String,
}

impl PostRow {
    fn into_post(self) -> Result<Post, CoreError> {
        Ok(Post {
            id: parse_id(&self.id)?,
            campaign_id: parse_id(&self.campaign_id)?,
            source: self.source.parse()?,
            url: self.url,
            source_name: self.source_name,
            title: self.title,
            content: self.content,
            relevance: self.relevance.clamp(0, 100) as u8,
            status: self.status.parse()?,
            author_url: self.author_url,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct CommentRow {
    id: String,
    campaign_id: String,
    post_id: String,
    comment: String,
    created_at: String,
}

impl CommentRow {
    fn into_record(self) -> Result<CommentRecord, CoreError> {
        Ok(CommentRecord {
            id: parse_id(&self.id)?,
            campaign_id: parse_id(&self.campaign_id)?,
            post_id: parse_id(&self.post_id)?,
            comment: self.comment,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

const CAMPAIGN_COLUMNS: &str = "id, name, description, status, keywords, negative_keywords, \
     subreddits, website_url, date_range, lead_sources, leads_found, high_potential, \
     contacted, created_at, updated_at";

const POST_COLUMNS: &str = "id, campaign_id, source, url, source_name, title, content, \
     relevance, status, author_url, created_at";

#[async_trait]
impl CampaignStore for SqliteStore {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<(), CoreError> {
        sqlx::query(&format!(
            "INSERT INTO campaigns ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            CAMPAIGN_COLUMNS
        ))
        .bind(campaign.id.to_string())
        .bind(&campaign.name)
        .bind(&campaign.description)
        .bind(campaign.status.as_str())
        .bind(to_json(&campaign.keywords)?)
        .bind(to_json(&campaign.negative_keywords)?)
        .bind(to_json(&campaign.subreddits)?)
        .bind(&campaign.website_url)
        .bind(campaign.date_range.as_str())
        .bind(to_json(&campaign.lead_sources)?)
        .bind(i64::from(campaign.leads_found))
        .bind(i64::from(campaign.high_potential))
        .bind(i64::from(campaign.contacted))
        .bind(timestamp(&campaign.created_at))
        .bind(timestamp(&campaign.updated_at))
        .execute(&self.pool)
        .await
        .map_err(sql_error)?;

        debug!(campaign_id = %campaign.id, "campaign inserted");
        Ok(())
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, CoreError> {
        let row: Option<CampaignRow> = sqlx::query_as(&format!(
            "SELECT {} FROM campaigns WHERE id = ?",
            CAMPAIGN_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(sql_error)?;

        row.map(CampaignRow::into_campaign).transpose()
    }

    async fn list_campaigns(&self) -> Result<Vec<Campaign>, CoreError> {
        let rows: Vec<CampaignRow> = sqlx::query_as(&format!(
            "SELECT {} FROM campaigns ORDER BY created_at DESC",
            CAMPAIGN_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(sql_error)?;

        rows.into_iter().map(CampaignRow::into_campaign).collect()
    }

    async fn update_campaign(&self, campaign: &Campaign) -> Result<(), CoreError> {
        let result = sqlx::query(
            "UPDATE campaigns SET name = ?, description = ?, status = ?, keywords = ?, \
             negative_keywords = ?, subreddits = ?, website_url = ?, date_range = ?, \
             lead_sources = ?, leads_found = ?, high_potential = ?, contacted = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(&campaign.name)
        .bind(&campaign.description)
        .bind(campaign.status.as_str())
        .bind(to_json(&campaign.keywords)?)
        .bind(to_json(&campaign.negative_keywords)?)
        .bind(to_json(&campaign.subreddits)?)
        .bind(&campaign.website_url)
        .bind(campaign.date_range.as_str())
        .bind(to_json(&campaign.lead_sources)?)
        .bind(i64::from(campaign.leads_found))
        .bind(i64::from(campaign.high_potential))
        .bind(i64::from(campaign.contacted))
        .bind(timestamp(&campaign.updated_at))
        .bind(campaign.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(sql_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound {
                resource: format!("campaign {}", campaign.id),
            });
        }
        Ok(())
    }

    async fn delete_campaign(&self, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(sql_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound {
                resource: format!("campaign {}", id),
            });
        }
        Ok(())
    }

    async fn create_posts(&self, posts: &[Post]) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(sql_error)?;
        let mut inserted = 0u64;

        for post in posts {
            let result = sqlx::query(&format!(
                "INSERT OR IGNORE INTO posts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                POST_COLUMNS
            ))
            .bind(post.id.to_string())
            .bind(post.campaign_id.to_string())
            .bind(post.source.as_str())
            .bind(&post.url)
            .bind(&post.source_name)
            .bind(&post.title)
            .bind(&post.content)
            .bind(i64::from(post.relevance))
            .bind(post.status.as_str())
            .bind(&post.author_url)
            .bind(timestamp(&post.created_at))
            .execute(&mut *tx)
            .await
            .map_err(sql_error)?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(sql_error)?;
        debug!(requested = posts.len(), inserted, "posts inserted");
        Ok(())
    }

    async fn list_posts(&self, campaign_id: Uuid) -> Result<Vec<Post>, CoreError> {
        let rows: Vec<PostRow> = sqlx::query_as(&format!(
            "SELECT {} FROM posts WHERE campaign_id = ? ORDER BY relevance DESC, created_at DESC",
            POST_COLUMNS
        ))
        .bind(campaign_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(sql_error)?;

        rows.into_iter().map(PostRow::into_post).collect()
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>, CoreError> {
        let row: Option<PostRow> =
            sqlx::query_as(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(sql_error)?;

        row.map(PostRow::into_post).transpose()
    }

    async fn update_post_status(&self, id: Uuid, status: PostStatus) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(sql_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound {
                resource: format!("post {}", id),
            });
        }
        Ok(())
    }

    async fn save_comment(&self, comment: &CommentRecord) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO comments (id, campaign_id, post_id, comment, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(comment.id.to_string())
        .bind(comment.campaign_id.to_string())
        .bind(comment.post_id.to_string())
        .bind(&comment.comment)
        .bind(timestamp(&comment.created_at))
        .execute(&self.pool)
        .await
        .map_err(sql_error)?;
        Ok(())
    }

    async fn list_comments(&self, campaign_id: Uuid) -> Result<Vec<CommentRecord>, CoreError> {
        let rows: Vec<CommentRow> = sqlx::query_as(
            "SELECT id, campaign_id, post_id, comment, created_at FROM comments \
             WHERE campaign_id = ? ORDER BY created_at",
        )
        .bind(campaign_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(sql_error)?;

        rows.into_iter().map(CommentRow::into_record).collect()
    }
}
