// (C) Coralbits SL 2025
// This file is part of PDF Generator and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetEmulatedMediaParams,
};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, LoaderId,
    ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventLifecycleEvent, NavigateParams, PrintToPdfParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::browser::{
    BrowserLauncher, BrowserSession, FilterDecision, LaunchOptions, NetworkIdleTracker,
    PageHandle, PdfOptions, RequestDescriptor, RequestFilter, ResourceKind, Viewport, WaitUntil,
};

const DOM_CONTENT_LOADED: &str = "DOMContentLoaded";
const LIVENESS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Launches a local Chromium through the DevTools protocol
#[derive(Debug, Default)]
pub struct ChromiumLauncher {}

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self {}
    }

    fn browser_config(options: &LaunchOptions) -> anyhow::Result<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder()
            .window_size(options.viewport.width, options.viewport.height)
            .request_timeout(options.request_timeout);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = options.chrome_path.as_ref() {
            builder = builder.chrome_executable(path);
        }
        builder = builder.args(Self::launch_args());
        builder.build().map_err(anyhow::Error::msg)
    }

    /// Extra command line flags. The sandbox is only turned off through these.
    fn launch_args() -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        for arg in LaunchOptions::SERVER_ARGS {
            if !args.iter().any(|known| known == arg) {
                args.push(arg.to_string());
            }
        }
        args
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &LaunchOptions) -> anyhow::Result<Box<dyn BrowserSession>> {
        let config = Self::browser_config(options)?;
        let (browser, mut handler) = Browser::launch(config).await?;

        // The handler drives the DevTools connection; nothing works without it
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });
        info!("Browser launched");

        Ok(Box::new(ChromiumSession {
            browser,
            handler_task,
        }))
    }
}

pub struct ChromiumSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_page(&self) -> anyhow::Result<Box<dyn PageHandle>> {
        let page = self.browser.new_page("about:blank").await?;
        Ok(Box::new(ChromiumPage {
            page,
            interceptor: Mutex::new(None),
        }))
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        let ChromiumSession {
            mut browser,
            handler_task,
        } = *self;

        let result = match browser.close().await {
            Ok(_) => browser.wait().await.map(|_| ()).map_err(anyhow::Error::from),
            Err(e) => {
                warn!("Browser did not close cleanly, killing it: {}", e);
                if let Some(Err(kill_err)) = browser.kill().await {
                    warn!("Failed to kill browser process: {}", kill_err);
                }
                Err(e.into())
            }
        };
        handler_task.abort();
        result
    }
}

pub struct ChromiumPage {
    page: Page,
    interceptor: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumPage {
    /// Waits for `name` on the document created by navigation `loader_id`,
    /// ignoring lifecycle events of the document being replaced.
    async fn wait_for_lifecycle(
        lifecycle: &mut EventStream<EventLifecycleEvent>,
        loader_id: &LoaderId,
        name: &str,
    ) -> anyhow::Result<()> {
        while let Some(event) = lifecycle.next().await {
            if belongs_to_navigation(&event.loader_id, &event.name, loader_id, name) {
                return Ok(());
            }
        }
        Err(anyhow::anyhow!("page closed before {}", name))
    }

    async fn wait_for_network_idle(network: &mut NetworkEvents) -> anyhow::Result<()> {
        let mut tracker = NetworkIdleTracker::new(Instant::now());
        loop {
            let deadline = tracker.idle_deadline();
            let idle = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                Some(event) = network.sent.next() => {
                    tracker.request_started(event.request_id.inner());
                }
                Some(event) = network.finished.next() => {
                    tracker.request_finished(event.request_id.inner(), Instant::now());
                }
                Some(event) = network.failed.next() => {
                    tracker.request_finished(event.request_id.inner(), Instant::now());
                }
                _ = idle => {
                    debug!("Network idle with {} requests in flight", tracker.inflight());
                    return Ok(());
                }
            }
        }
    }

    fn stop_interceptor(&self) {
        let task = match self.interceptor.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
        }
    }
}

/// True for the `name` lifecycle event of the document loaded by `loader_id`
fn belongs_to_navigation(
    event_loader: &LoaderId,
    event_name: &str,
    loader_id: &LoaderId,
    name: &str,
) -> bool {
    event_loader == loader_id && event_name == name
}

/// Request lifecycle streams, subscribed before navigating so nothing of the
/// new document is missed.
struct NetworkEvents {
    sent: EventStream<EventRequestWillBeSent>,
    finished: EventStream<EventLoadingFinished>,
    failed: EventStream<EventLoadingFailed>,
}

impl NetworkEvents {
    async fn subscribe(page: &Page) -> anyhow::Result<Self> {
        Ok(Self {
            sent: page.event_listener::<EventRequestWillBeSent>().await?,
            finished: page.event_listener::<EventLoadingFinished>().await?,
            failed: page.event_listener::<EventLoadingFailed>().await?,
        })
    }
}

fn resource_kind(resource_type: &ResourceType) -> ResourceKind {
    match resource_type {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Media => ResourceKind::Media,
        ResourceType::TextTrack => ResourceKind::TextTrack,
        ResourceType::WebSocket => ResourceKind::WebSocket,
        ResourceType::EventSource => ResourceKind::EventSource,
        ResourceType::Xhr => ResourceKind::Xhr,
        ResourceType::Fetch => ResourceKind::Fetch,
        _ => ResourceKind::Other,
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn set_viewport(&self, viewport: Viewport) -> anyhow::Result<()> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(anyhow::Error::msg)?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn emulate_screen_media(&self) -> anyhow::Result<()> {
        let params = SetEmulatedMediaParams::builder().media("screen").build();
        self.page.execute(params).await?;
        Ok(())
    }

    async fn enable_request_filter(&self, filter: RequestFilter) -> anyhow::Result<()> {
        let mut paused = self.page.event_listener::<EventRequestPaused>().await?;
        self.page.execute(fetch::EnableParams::default()).await?;

        let page = self.page.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let descriptor =
                    RequestDescriptor::new(resource_kind(&event.resource_type), &event.request.url);
                let result = match filter.classify(&descriptor) {
                    FilterDecision::Allow => page
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ()),
                    FilterDecision::Block => {
                        debug!("Blocking {:?} request to {}", descriptor.kind, descriptor.url);
                        page.execute(FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                        .map(|_| ())
                    }
                };
                if let Err(e) = result {
                    debug!("Failed to resolve intercepted request {}: {}", descriptor.url, e);
                }
            }
        });

        let previous = match self.interceptor.lock() {
            Ok(mut guard) => guard.replace(task),
            Err(poisoned) => poisoned.into_inner().replace(task),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    async fn navigate(&self, url: &str, wait_until: WaitUntil) -> anyhow::Result<()> {
        if wait_until == WaitUntil::Load {
            self.page.goto(NavigateParams::new(url)).await?;
            self.page.wait_for_navigation().await?;
            return Ok(());
        }

        let mut lifecycle = self.page.event_listener::<EventLifecycleEvent>().await?;
        let mut network = match wait_until {
            WaitUntil::NetworkIdle => Some(NetworkEvents::subscribe(&self.page).await?),
            _ => None,
        };

        let response = self.page.execute(NavigateParams::new(url)).await?;
        if let Some(error_text) = response.result.error_text.as_ref() {
            return Err(anyhow::anyhow!("{} at {}", error_text, url));
        }

        // Same-document navigations have no loader and no lifecycle events
        if let Some(loader_id) = response.result.loader_id.as_ref() {
            Self::wait_for_lifecycle(&mut lifecycle, loader_id, DOM_CONTENT_LOADED).await?;
        }
        if let Some(network) = network.as_mut() {
            Self::wait_for_network_idle(network).await?;
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> anyhow::Result<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(anyhow::Error::msg)?;
        let result = self.page.evaluate_expression(params).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn is_closed(&self) -> bool {
        !matches!(
            tokio::time::timeout(LIVENESS_PROBE_TIMEOUT, self.evaluate("true")).await,
            Ok(Ok(_))
        )
    }

    async fn print_to_pdf(&self, options: &PdfOptions) -> anyhow::Result<Vec<u8>> {
        let params = PrintToPdfParams::builder()
            .print_background(options.print_background)
            .scale(options.scale)
            .paper_width(options.paper_width)
            .paper_height(options.paper_height)
            .margin_top(options.margin)
            .margin_bottom(options.margin)
            .margin_left(options.margin)
            .margin_right(options.margin)
            .build();
        Ok(self.page.pdf(params).await?)
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.stop_interceptor();
        let ChromiumPage { page, .. } = *self;
        page.close().await?;
        Ok(())
    }
}
