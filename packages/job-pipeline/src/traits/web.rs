//! Web extraction trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ParserStrategy;

/// Fetches the text content of a page.
///
/// Implementations own navigation, rendering and selector matching, and
/// any timeout policy. Failures should be reported as
/// [`PipelineError::Fetch`](crate::error::PipelineError::Fetch) so they
/// classify as retryable.
#[async_trait]
pub trait WebExtractor: Send + Sync {
    /// Fetch `url` and return the content matched by `selectors`.
    ///
    /// An empty selector list means the whole page.
    async fn fetch_content(
        &self,
        url: &str,
        selectors: &[String],
        strategy: &ParserStrategy,
    ) -> Result<String>;
}
