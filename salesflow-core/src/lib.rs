pub mod config;
pub mod error;
pub mod error_recovery;
pub mod error_utils;
pub mod merge;
pub mod query;
pub mod retry;
pub mod store;
pub mod types;
pub mod urls;

pub use config::*;
pub use error::*;
pub use error_recovery::*;
pub use error_utils::*;
pub use merge::*;
pub use query::*;
pub use store::*;
pub use types::*;
pub use urls::*;
