//! Error recovery strategies for the discovery path.
//!
//! Maps the error taxonomy onto what the pipeline does next: rotate the API
//! key, fall back to a lighter model, degrade a source to zero results, skip a
//! malformed item or fail the whole run.

use crate::{CoreError, ErrorExt, LlmError};
use tracing::warn;

/// Recovery strategy for handling errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Rotate to the next API key and retry the same call once
    RotateKey,
    /// Retry once against a lighter model tier
    Fallback,
    /// Continue with zero results for the affected source
    Degrade,
    /// Drop the offending item and continue
    Skip,
    /// Surface the error to the caller
    Fail,
}

/// Error recovery handler that provides strategies for different error types
pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError) -> RecoveryStrategy {
        match error {
            // Missing credentials need user intervention
            CoreError::Config(_) => RecoveryStrategy::Fail,

            CoreError::Llm(llm_error) => match llm_error {
                e if e.is_key_failure() => RecoveryStrategy::RotateKey,
                e if e.is_overloaded() => RecoveryStrategy::Fallback,
                LlmError::InvalidResponseFormat { .. } => RecoveryStrategy::Skip,
                _ => RecoveryStrategy::Degrade,
            },

            CoreError::Serialization(_) => RecoveryStrategy::Skip,
            CoreError::InvalidInput { .. } => RecoveryStrategy::Skip,

            // Persistence sits outside the pipeline; its failures are never hidden
            CoreError::Database(_) => RecoveryStrategy::Fail,

            CoreError::RedditApi(_)
            | CoreError::TwitterApi(_)
            | CoreError::Network(_)
            | CoreError::Timeout { .. }
            | CoreError::RequestFailed { .. }
            | CoreError::NotFound { .. }
            | CoreError::Io(_)
            | CoreError::Internal { .. } => RecoveryStrategy::Degrade,
        }
    }

    /// Collapses a failed per-source step into an empty result unless the
    /// error must reach the caller.
    pub fn recover_source<T>(
        result: Result<Vec<T>, CoreError>,
        source: &str,
    ) -> Result<Vec<T>, CoreError> {
        match result {
            Ok(items) => Ok(items),
            Err(error) => match Self::determine_strategy(&error) {
                RecoveryStrategy::Fail => Err(error),
                strategy => {
                    warn!(
                        source,
                        ?strategy,
                        code = %error.error_code(),
                        error = %error,
                        "source step failed, continuing with zero results"
                    );
                    Ok(Vec::new())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfigError, DatabaseError, RedditApiError};

    #[test]
    fn test_determine_strategy() {
        let config_error = CoreError::Config(ConfigError::MissingField {
            field: "reddit.client_id".to_string(),
        });
        assert_eq!(
            ErrorRecovery::determine_strategy(&config_error),
            RecoveryStrategy::Fail
        );

        let quota = CoreError::Llm(LlmError::QuotaExceeded {
            provider: "gemini".to_string(),
        });
        assert_eq!(
            ErrorRecovery::determine_strategy(&quota),
            RecoveryStrategy::RotateKey
        );

        let overloaded = CoreError::Llm(LlmError::Overloaded {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
        });
        assert_eq!(
            ErrorRecovery::determine_strategy(&overloaded),
            RecoveryStrategy::Fallback
        );

        let reddit = CoreError::RedditApi(RedditApiError::ServerError { status_code: 502 });
        assert_eq!(
            ErrorRecovery::determine_strategy(&reddit),
            RecoveryStrategy::Degrade
        );

        let db = CoreError::Database(DatabaseError::ConnectionFailed {
            reason: "closed".to_string(),
        });
        assert_eq!(
            ErrorRecovery::determine_strategy(&db),
            RecoveryStrategy::Fail
        );
    }

    #[test]
    fn test_recover_source_degrades_transient_errors() {
        let result: Result<Vec<u8>, CoreError> =
            Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
        let recovered = ErrorRecovery::recover_source(result, "reddit").unwrap();
        assert!(recovered.is_empty());
    }

    #[test]
    fn test_recover_source_surfaces_configuration_errors() {
        let result: Result<Vec<u8>, CoreError> = Err(CoreError::missing_field("reddit"));
        let recovered = ErrorRecovery::recover_source(result, "reddit");
        assert!(matches!(recovered, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_recover_source_passes_results_through() {
        let recovered = ErrorRecovery::recover_source(Ok(vec![1, 2, 3]), "twitter").unwrap();
        assert_eq!(recovered, vec![1, 2, 3]);
    }
}
