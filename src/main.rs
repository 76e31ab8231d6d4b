use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use database::SqliteStore;
use lead_discovery::{CampaignService, DiscoveryPipeline, RefreshOutcome, SubscriptionChecker};
use llm_interface::{CommentGenerator, CompanySearch, GeminiProvider, LeadScraper, LlmProvider};
use salesflow_core::{
    AppConfig, Campaign, CampaignStatus, CoreError, DateRange, ErrorExt, LeadSource, NewCampaign,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "sales-flow")]
#[command(about = "Find people on Reddit and X who are asking for what you sell")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "SALES_FLOW_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage campaigns
    Campaign {
        #[command(subcommand)]
        command: CampaignCommand,
    },

    /// List a campaign's posts, best first
    Posts {
        campaign: Uuid,
        #[arg(long)]
        include_hidden: bool,
    },

    /// Mark a post as contacted
    Contacted { post: Uuid },

    /// Hide a post from the campaign's list
    Hide { post: Uuid },

    /// Draft an outreach comment for a post
    Comment { post: Uuid },

    /// Run discovery once without storing anything
    Discover(CampaignArgs),

    /// Find companies in an industry
    Scrape {
        #[arg(long)]
        industry: String,
        #[arg(long)]
        location: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Check whether an email has an active membership
    Subscription { email: String },
}

#[derive(Subcommand)]
enum CampaignCommand {
    /// Create a campaign and run its first discovery
    Create(CampaignArgs),
    List,
    /// Search again for new posts
    Refresh { id: Uuid },
    Pause { id: Uuid },
    Resume { id: Uuid },
    Delete { id: Uuid },
}

#[derive(Args)]
struct CampaignArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: Option<String>,
    /// Repeat for each keyword
    #[arg(long = "keyword", required = true)]
    keywords: Vec<String>,
    #[arg(long = "negative")]
    negative_keywords: Vec<String>,
    #[arg(long = "subreddit")]
    subreddits: Vec<String>,
    #[arg(long)]
    website: Option<String>,
    /// lastDay, lastWeek or lastMonth
    #[arg(long, default_value = "lastWeek")]
    date_range: DateRange,
    /// reddit or twitter; repeat for both
    #[arg(long = "source", default_values_t = [LeadSource::Reddit])]
    sources: Vec<LeadSource>,
}

impl From<CampaignArgs> for NewCampaign {
    fn from(args: CampaignArgs) -> Self {
        NewCampaign {
            name: args.name,
            description: args.description,
            keywords: args.keywords,
            negative_keywords: args.negative_keywords,
            subreddits: args.subreddits,
            website_url: args.website,
            date_range: args.date_range,
            lead_sources: args.sources,
        }
    }
}

#[derive(Serialize)]
struct Membership<'a> {
    email: &'a str,
    active: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sales_flow=info,lead_discovery=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", failure_message(&err));
            ExitCode::FAILURE
        }
    }
}

/// Logs the full error chain and returns the line shown to the user.
/// Domain errors get their friendly message, anything else its context chain.
fn failure_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<CoreError>() {
        Some(core) => core.log_error().user_friendly_message(),
        None => {
            error!(error = %format!("{:#}", err), "command failed");
            format!("{:#}", err)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Subscription { email } => {
            let active = SubscriptionChecker::new(&config.subscription)
                .has_active_membership(&email)
                .await;
            print_json(&Membership {
                email: &email,
                active,
            })
        }
        Commands::Scrape {
            industry,
            location,
            limit,
        } => {
            let scraper = LeadScraper::new(llm(&config)?);
            let leads = scraper
                .find_companies(&CompanySearch {
                    industry,
                    location,
                    limit,
                })
                .await?;
            print_json(&leads)
        }
        Commands::Discover(args) => {
            let campaign = Campaign::new(args.into());
            campaign.validate()?;
            let pipeline = DiscoveryPipeline::from_config(&config, llm(&config)?)?;
            let report = pipeline.run(&campaign).await?;
            print_json(&report)
        }
        Commands::Campaign { command } => {
            let service = service(&config).await?;
            campaign_command(&service, command).await
        }
        Commands::Posts {
            campaign,
            include_hidden,
        } => {
            let service = service(&config).await?;
            print_json(&service.list_posts(campaign, include_hidden).await?)
        }
        Commands::Contacted { post } => {
            let service = service(&config).await?;
            print_json(&service.mark_contacted(post).await?)
        }
        Commands::Hide { post } => {
            let service = service(&config).await?;
            service.hide_post(post).await?;
            print_json(&serde_json::json!({ "hidden": post }))
        }
        Commands::Comment { post } => {
            let service = service(&config).await?;
            print_json(&service.generate_comment(post).await?)
        }
    }
}

async fn campaign_command(service: &CampaignService, command: CampaignCommand) -> Result<()> {
    match command {
        CampaignCommand::Create(args) => {
            let outcome = service.create_campaign(args.into()).await?;
            print_outcome(&outcome)
        }
        CampaignCommand::List => print_json(&service.list_campaigns().await?),
        CampaignCommand::Refresh { id } => {
            let outcome = service.refresh_campaign(id).await?;
            print_outcome(&outcome)
        }
        CampaignCommand::Pause { id } => {
            print_json(&service.set_campaign_status(id, CampaignStatus::Paused).await?)
        }
        CampaignCommand::Resume { id } => {
            print_json(&service.set_campaign_status(id, CampaignStatus::Active).await?)
        }
        CampaignCommand::Delete { id } => {
            service.delete_campaign(id).await?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
    }
}

fn print_outcome(outcome: &RefreshOutcome) -> Result<()> {
    if let Some(notice) = outcome.notice() {
        eprintln!("{}", notice);
    }
    print_json(outcome)
}

fn llm(config: &AppConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider = GeminiProvider::from_config(&config.gemini).context("Gemini is not configured")?;
    Ok(Arc::new(provider))
}

async fn service(config: &AppConfig) -> Result<CampaignService> {
    let provider = llm(config)?;
    let store = SqliteStore::connect(&config.database.url)
        .await
        .with_context(|| format!("failed to open database {}", config.database.url))?;
    let pipeline = DiscoveryPipeline::from_config(config, provider.clone())?;

    Ok(CampaignService::new(
        Arc::new(store),
        pipeline,
        CommentGenerator::new(provider),
        config.pipeline.high_potential_threshold,
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use salesflow_core::ConfigError;

    #[test]
    fn test_domain_failure_shows_friendly_message() {
        let err = anyhow::Error::new(CoreError::missing_field("reddit.client_id"))
            .context("failed to load configuration");
        assert_eq!(
            failure_message(&err),
            "Required configuration field 'reddit.client_id' is missing."
        );

        let err = anyhow::Error::new(CoreError::Config(ConfigError::ValidationFailed {
            reason: "no lead sources".to_string(),
        }));
        assert!(failure_message(&err).contains("no lead sources"));
    }

    #[test]
    fn test_other_failure_shows_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("failed to open database");
        assert_eq!(
            failure_message(&err),
            "failed to open database: connection refused"
        );
    }
}
