// (C) Coralbits SL 2025
// This file is part of PDF Generator and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::browser::{BrowserSession, PageHandle};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the browser session and its page for one request.
///
/// `release` closes the page and then the session. If the scope is dropped
/// without being released (panic, aborted task) the same teardown is spawned
/// on the current runtime.
pub struct SessionScope {
    session: Option<Box<dyn BrowserSession>>,
    page: Option<Box<dyn PageHandle>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    pub page_closed: bool,
    pub session_closed: bool,
}

impl SessionScope {
    pub fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Some(session),
            page: None,
        }
    }

    /// Opens the single page of this session
    pub async fn open_page(&mut self) -> anyhow::Result<&dyn PageHandle> {
        if self.page.is_some() {
            return Err(anyhow::anyhow!("A page is already open in this session"));
        }
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Browser session already released"))?;
        let page = session.new_page().await?;
        Ok(&**self.page.insert(page))
    }

    pub async fn release(mut self) -> TeardownReport {
        teardown(self.page.take(), self.session.take()).await
    }
}

impl Drop for SessionScope {
    fn drop(&mut self) {
        let page = self.page.take();
        let session = self.session.take();
        if page.is_none() && session.is_none() {
            return;
        }
        warn!("Browser session dropped without release, closing it in the background");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(teardown(page, session));
            }
            Err(_) => error!("No async runtime to close the browser session, it may leak"),
        }
    }
}

/// Page first, then session. A failure on one does not skip the other.
async fn teardown(
    page: Option<Box<dyn PageHandle>>,
    session: Option<Box<dyn BrowserSession>>,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    if let Some(page) = page {
        if page.is_closed().await {
            debug!("Page already closed");
        } else {
            match tokio::time::timeout(CLOSE_TIMEOUT, page.close()).await {
                Ok(Ok(())) => report.page_closed = true,
                Ok(Err(e)) => warn!("Error closing page: {:?}", e),
                Err(_) => warn!("Timed out closing page after {:?}", CLOSE_TIMEOUT),
            }
        }
    }

    if let Some(session) = session {
        match tokio::time::timeout(CLOSE_TIMEOUT, session.close()).await {
            Ok(Ok(())) => report.session_closed = true,
            Ok(Err(e)) => warn!("Error closing browser: {:?}", e),
            Err(_) => warn!("Timed out closing browser after {:?}", CLOSE_TIMEOUT),
        }
    }

    info!(
        page_closed = report.page_closed,
        session_closed = report.session_closed,
        "Browser resources released"
    );
    report
}
