pub mod pipeline;
pub mod service;
pub mod sources;
pub mod store;
pub mod subscription;

pub use pipeline::{DiscoveryPipeline, DiscoveryReport, SourceReport};
pub use service::{CampaignService, RefreshOutcome, NO_RESULTS_NOTICE};
pub use sources::{GroundedStrategy, RedditStrategy, SourceChain, SourceStrategy, TwitterProxyStrategy};
pub use store::MemoryStore;
pub use subscription::SubscriptionChecker;
