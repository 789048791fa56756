//! Seam to the tool that understands an embedded sub-language.
//!
//! Every request is expressed in shadow coordinates against a shadow URI;
//! callers translate results back with [`crate::embedded::translate`].

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{CompletionItem, Diagnostic, Hover, Location, Position, TextEdit, Url};

use crate::analysis::SubLanguage;
use crate::embedded::synthesizer::ShadowDocument;

/// A position-based request against one shadow document.
#[derive(Debug, Clone)]
pub struct ShadowRequest {
    /// URI of the shadow file
    pub uri: Url,
    pub language: SubLanguage,
    /// Position in shadow coordinates
    pub position: Position,
    pub document: Arc<ShadowDocument>,
}

/// Language features for embedded code. Every method has an empty default
/// so a service only implements what its tool supports; a cancelled
/// request yields the empty result.
#[tower_lsp::async_trait]
pub trait EmbeddedLanguageService: Send + Sync {
    async fn completion(&self, _request: &ShadowRequest, _cancel: &CancellationToken) -> Vec<CompletionItem> {
        Vec::new()
    }

    async fn hover(&self, _request: &ShadowRequest, _cancel: &CancellationToken) -> Option<Hover> {
        None
    }

    async fn definition(&self, _request: &ShadowRequest, _cancel: &CancellationToken) -> Vec<Location> {
        Vec::new()
    }

    async fn references(&self, _request: &ShadowRequest, _cancel: &CancellationToken) -> Vec<Location> {
        Vec::new()
    }

    /// Edits to the shadow document at `request.uri`.
    async fn rename(
        &self,
        _request: &ShadowRequest,
        _new_name: &str,
        _cancel: &CancellationToken,
    ) -> Vec<TextEdit> {
        Vec::new()
    }

    async fn diagnostics(
        &self,
        _uri: &Url,
        _document: &Arc<ShadowDocument>,
        _cancel: &CancellationToken,
    ) -> Vec<Diagnostic> {
        Vec::new()
    }
}

/// Service used when embedded features are disabled.
pub struct NoopService;

#[tower_lsp::async_trait]
impl EmbeddedLanguageService for NoopService {}

/// Runs `future` unless `cancel` fires first, in which case the default
/// value is returned.
pub async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> T
where
    T: Default,
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => T::default(),
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_future_yields_default() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Vec<u32> = cancellable(&cancel, std::future::pending()).await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_uncancelled_future_completes() {
        let cancel = CancellationToken::new();
        let result = cancellable(&cancel, async { vec![1, 2] }).await;
        assert_eq!(result, vec![1, 2]);
    }
}
