// (C) Coralbits SL 2025
// This file is part of PDF Generator and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::browser::{
    BrowserLauncher, ChromiumLauncher, LaunchOptions, PageHandle, PdfOptions, RequestFilter,
    Viewport,
};
use crate::config::{Config, ContentConfig, NavigationConfig};
use crate::renderer::scope::SessionScope;
use crate::renderer::scripts;
use crate::types::{PdfArtifact, PdfError, RenderJob, RenderRequest};

const MAP_IMAGE_POLL: Duration = Duration::from_millis(250);

/// Where a request currently is. Teardown runs after any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    SessionOpen,
    PageReady,
    Navigating,
    ContentSettling,
    Exporting,
}

/// Everything one render needs, resolved from the config snapshot taken
/// when the request arrived.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub launch: LaunchOptions,
    pub launch_timeout: Duration,
    pub page_timeout: Duration,
    pub viewport: Viewport,
    pub navigation: NavigationConfig,
    pub content: ContentConfig,
    pub filter: Option<RequestFilter>,
    pub pdf: PdfOptions,
    pub export_timeout: Duration,
}

impl From<&Config> for RenderSettings {
    fn from(config: &Config) -> Self {
        Self {
            launch: LaunchOptions {
                chrome_path: config.browser.chrome_path.clone(),
                headless: config.browser.headless,
                viewport: config.browser.viewport,
                request_timeout: config.browser.default_timeout(),
            },
            launch_timeout: config.browser.launch_timeout(),
            page_timeout: config.browser.default_timeout(),
            viewport: config.browser.viewport,
            navigation: config.navigation.clone(),
            content: config.content.clone(),
            filter: config
                .filter
                .enabled
                .then(|| RequestFilter::new(&config.filter.allowed_domains)),
            pdf: PdfOptions {
                paper_width: config.export.paper_width_inches,
                paper_height: config.export.paper_height_inches,
                margin: config.export.margin_inches,
                scale: config.export.scale,
                print_background: config.export.print_background,
            },
            export_timeout: Duration::from_secs(config.export.timeout_secs),
        }
    }
}

/// Awaits `future` for at most `duration`
pub async fn bounded<T, F>(duration: Duration, what: &str, future: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("{} timed out after {:?}", what, duration)),
    }
}

/// Loads `url`, retrying with a fixed delay between attempts
pub async fn navigate_with_retry(
    page: &dyn PageHandle,
    url: &str,
    navigation: &NavigationConfig,
) -> Result<(), PdfError> {
    let attempts = navigation.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        info!(
            "Navigating to {} (attempt {}/{}, wait_until={})",
            url, attempt, attempts, navigation.wait_until
        );
        let result = bounded(
            navigation.attempt_timeout(),
            "navigation",
            page.navigate(url, navigation.wait_until),
        )
        .await;
        match result {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!("Navigation attempt {}/{} failed: {}", attempt, attempts, e);
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(navigation.retry_delay()).await;
                }
            }
        }
    }

    Err(PdfError::Navigation {
        attempts,
        message: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string()),
    })
}

pub struct PdfRenderer {
    launcher: Arc<dyn BrowserLauncher>,
}

impl std::fmt::Debug for PdfRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PdfRenderer")
    }
}

impl PdfRenderer {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { launcher }
    }

    pub fn chromium() -> Self {
        Self::new(Arc::new(ChromiumLauncher::new()))
    }

    /// Runs the render on its own task, so it finishes and cleans up even if
    /// the caller goes away.
    pub async fn render_detached(
        self: &Arc<Self>,
        request: RenderRequest,
        config: Config,
    ) -> Result<PdfArtifact, PdfError> {
        let renderer = self.clone();
        let task = tokio::spawn(async move { renderer.render(&request, &config).await });
        task.await.map_err(|e| {
            error!("Render task failed: {}", e);
            PdfError::Internal {
                message: format!("render task failed: {}", e),
            }
        })?
    }

    #[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4(), url = request.url.as_deref().unwrap_or_default()))]
    pub async fn render(
        &self,
        request: &RenderRequest,
        config: &Config,
    ) -> Result<PdfArtifact, PdfError> {
        let job = request.validate()?;
        let settings = RenderSettings::from(config);

        let session = bounded(
            settings.launch_timeout,
            "browser launch",
            self.launcher.launch(&settings.launch),
        )
        .await
        .map_err(|e| {
            error!("Browser launch failed: {:?}", e);
            PdfError::launch(e)
        })?;
        debug!(stage = ?RenderStage::SessionOpen);

        let mut scope = SessionScope::new(session);
        let result = self.run(&mut scope, &job, &settings).await;
        scope.release().await;

        match result {
            Ok(data) => {
                info!("Generated PDF {} ({} bytes)", job.filename, data.len());
                Ok(PdfArtifact {
                    filename: job.filename,
                    data,
                })
            }
            Err(e) => {
                error!(category = e.category(), "PDF generation failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        scope: &mut SessionScope,
        job: &RenderJob,
        settings: &RenderSettings,
    ) -> Result<Vec<u8>, PdfError> {
        let timeout = settings.page_timeout;

        let page = bounded(timeout, "opening page", scope.open_page())
            .await
            .map_err(PdfError::page)?;
        bounded(timeout, "setting viewport", page.set_viewport(settings.viewport))
            .await
            .map_err(PdfError::page)?;
        bounded(timeout, "media emulation", page.emulate_screen_media())
            .await
            .map_err(PdfError::page)?;
        if let Some(filter) = settings.filter.as_ref() {
            bounded(
                timeout,
                "enabling request filter",
                page.enable_request_filter(filter.clone()),
            )
            .await
            .map_err(PdfError::page)?;
        }
        debug!(stage = ?RenderStage::PageReady);

        debug!(stage = ?RenderStage::Navigating);
        navigate_with_retry(page, &job.url, &settings.navigation).await?;

        debug!(stage = ?RenderStage::ContentSettling);
        wait_for_map_images(page, &settings.content, timeout).await;
        self.apply_print_overrides(page, timeout).await?;

        tokio::time::sleep(settings.content.settle()).await;
        bounded(
            timeout,
            "waiting for load completion",
            page.evaluate(scripts::WAIT_FOR_LOAD_COMPLETE),
        )
        .await
        .map_err(PdfError::render)?;

        if page.is_closed().await {
            return Err(PdfError::PageClosed);
        }

        debug!(stage = ?RenderStage::Exporting);
        let data = bounded(
            settings.export_timeout,
            "PDF export",
            page.print_to_pdf(&settings.pdf),
        )
        .await
        .map_err(PdfError::export)?;
        if data.is_empty() {
            return Err(PdfError::Export {
                message: "browser returned an empty document".to_string(),
            });
        }
        Ok(data)
    }

    async fn apply_print_overrides(
        &self,
        page: &dyn PageHandle,
        timeout: Duration,
    ) -> Result<(), PdfError> {
        bounded(timeout, "style injection", page.evaluate(&scripts::inject_styles()))
            .await
            .map_err(PdfError::render)?;

        let swapped = bounded(timeout, "map swap", page.evaluate(scripts::SWAP_STATIC_MAPS))
            .await
            .map_err(PdfError::render)?;
        let breaks = bounded(
            timeout,
            "page break directives",
            page.evaluate(scripts::APPLY_PAGE_BREAKS),
        )
        .await
        .map_err(PdfError::render)?;
        debug!(
            "Print overrides applied, static maps: {}, page breaks: {}",
            swapped, breaks
        );
        Ok(())
    }
}

/// Gives map tiles a chance to render. Never fails the request.
async fn wait_for_map_images(page: &dyn PageHandle, content: &ContentConfig, timeout: Duration) {
    let has_map = bounded(
        timeout,
        "map lookup",
        page.evaluate(&scripts::has_element(&content.map_selector)),
    )
    .await;
    match has_map {
        Ok(value) if value.as_bool() == Some(true) => {}
        Ok(_) => return,
        Err(e) => {
            warn!("Could not look for map container: {}", e);
            return;
        }
    }

    let probe = scripts::has_images_in(&content.map_selector);
    let waited = tokio::time::timeout(content.map_wait(), async {
        loop {
            match page.evaluate(&probe).await {
                Ok(value) if value.as_bool() == Some(true) => return,
                Ok(_) => {}
                Err(e) => debug!("Map image probe failed: {}", e),
            }
            tokio::time::sleep(MAP_IMAGE_POLL).await;
        }
    })
    .await;
    if waited.is_err() {
        warn!(
            "Map images did not appear within {:?}, continuing",
            content.map_wait()
        );
    }

    tokio::time::sleep(content.map_settle()).await;
}
