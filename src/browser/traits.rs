use crate::browser::{LaunchOptions, PdfOptions, RequestFilter, Viewport, WaitUntil};
use async_trait::async_trait;

/// Starts browser sessions. One session per render request.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> anyhow::Result<Box<dyn BrowserSession>>;
}

/// A running browser process
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> anyhow::Result<Box<dyn PageHandle>>;

    /// Shuts the browser down. Called exactly once, after the page is closed.
    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// A single tab inside a [`BrowserSession`].
///
/// None of these methods time out on their own, callers bound them.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn set_viewport(&self, viewport: Viewport) -> anyhow::Result<()>;

    /// Emulate the `screen` media type so print-only rules stay dormant
    async fn emulate_screen_media(&self) -> anyhow::Result<()>;

    /// Start intercepting sub-resource requests, deciding each one with `filter`
    async fn enable_request_filter(&self, filter: RequestFilter) -> anyhow::Result<()>;

    /// Loads `url` and resolves once `wait_until` is satisfied
    async fn navigate(&self, url: &str, wait_until: WaitUntil) -> anyhow::Result<()>;

    /// Evaluates a script in the document, awaiting promises, returning the value as JSON
    async fn evaluate(&self, script: &str) -> anyhow::Result<serde_json::Value>;

    async fn is_closed(&self) -> bool;

    async fn print_to_pdf(&self, options: &PdfOptions) -> anyhow::Result<Vec<u8>>;

    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}
