// (C) Coralbits SL 2025
// This file is part of PDF Generator and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

//! Scripted in-memory browser for exercising the workflow without Chromium.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::browser::{
    BrowserLauncher, BrowserSession, LaunchOptions, PageHandle, PdfOptions, RequestFilter,
    Viewport, WaitUntil,
};
use crate::renderer::scripts;

pub const FAKE_PDF: &[u8] = b"%PDF-1.7\n%fake\n%%EOF\n";

#[derive(Debug, Clone)]
pub enum PdfOutcome {
    Bytes(Vec<u8>),
    Empty,
    Error,
}

#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub fail_launch: bool,
    pub hang_launch: bool,
    /// Number of navigations that fail before one succeeds
    pub failing_navigations: usize,
    pub map_present: bool,
    pub map_images: bool,
    pub closed_before_export: bool,
    pub fail_page_close: bool,
    pub fail_session_close: bool,
    pub pdf: PdfOutcome,
    pub map_selector: String,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            fail_launch: false,
            hang_launch: false,
            failing_navigations: 0,
            map_present: false,
            map_images: false,
            closed_before_export: false,
            fail_page_close: false,
            fail_session_close: false,
            pdf: PdfOutcome::Bytes(FAKE_PDF.to_vec()),
            map_selector: "#map".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub page_closes: AtomicUsize,
    pub session_closes: AtomicUsize,
    pub navigations: AtomicUsize,
    pub filters_enabled: AtomicUsize,
    pub pdf_calls: AtomicUsize,
    pub scripts: Mutex<Vec<String>>,
    pub viewport: Mutex<Option<Viewport>>,
    pub pdf_options: Mutex<Option<PdfOptions>>,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn ran_script(&self, script: &str) -> bool {
        self.scripts
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.as_str() == script)
    }
}

#[derive(Clone, Default)]
pub struct MockLauncher {
    pub behavior: MockBehavior,
    pub counters: Arc<Counters>,
}

impl MockLauncher {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            counters: Arc::new(Counters::default()),
        }
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> anyhow::Result<Box<dyn BrowserSession>> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        if self.behavior.hang_launch {
            std::future::pending::<()>().await;
        }
        if self.behavior.fail_launch {
            return Err(anyhow::anyhow!("Could not find chrome executable"));
        }
        Ok(Box::new(MockSession {
            behavior: self.behavior.clone(),
            counters: self.counters.clone(),
        }))
    }
}

pub struct MockSession {
    behavior: MockBehavior,
    counters: Arc<Counters>,
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn new_page(&self) -> anyhow::Result<Box<dyn PageHandle>> {
        self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPage {
            behavior: self.behavior.clone(),
            counters: self.counters.clone(),
        }))
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        if self.behavior.fail_session_close {
            return Err(anyhow::anyhow!("browser process already gone"));
        }
        self.counters.session_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockPage {
    behavior: MockBehavior,
    counters: Arc<Counters>,
}

#[async_trait]
impl PageHandle for MockPage {
    async fn set_viewport(&self, viewport: Viewport) -> anyhow::Result<()> {
        *self.counters.viewport.lock().unwrap() = Some(viewport);
        Ok(())
    }

    async fn emulate_screen_media(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn enable_request_filter(&self, _filter: RequestFilter) -> anyhow::Result<()> {
        self.counters.filters_enabled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn navigate(&self, url: &str, _wait_until: WaitUntil) -> anyhow::Result<()> {
        let previous = self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        if previous < self.behavior.failing_navigations {
            return Err(anyhow::anyhow!("net::ERR_NAME_NOT_RESOLVED at {}", url));
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> anyhow::Result<serde_json::Value> {
        self.counters
            .scripts
            .lock()
            .unwrap()
            .push(script.to_string());
        let selector = &self.behavior.map_selector;
        let value = if script == scripts::has_element(selector) {
            serde_json::Value::Bool(self.behavior.map_present)
        } else if script == scripts::has_images_in(selector) {
            serde_json::Value::Bool(self.behavior.map_images)
        } else if script == scripts::WAIT_FOR_LOAD_COMPLETE || script == scripts::inject_styles() {
            serde_json::Value::Bool(true)
        } else if script == scripts::APPLY_PAGE_BREAKS || script == scripts::SWAP_STATIC_MAPS {
            serde_json::json!(0)
        } else {
            serde_json::Value::Null
        };
        Ok(value)
    }

    async fn is_closed(&self) -> bool {
        self.behavior.closed_before_export
    }

    async fn print_to_pdf(&self, options: &PdfOptions) -> anyhow::Result<Vec<u8>> {
        self.counters.pdf_calls.fetch_add(1, Ordering::SeqCst);
        *self.counters.pdf_options.lock().unwrap() = Some(options.clone());
        match &self.behavior.pdf {
            PdfOutcome::Bytes(bytes) => Ok(bytes.clone()),
            PdfOutcome::Empty => Ok(Vec::new()),
            PdfOutcome::Error => Err(anyhow::anyhow!("Printing failed")),
        }
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        if self.behavior.fail_page_close {
            return Err(anyhow::anyhow!("Target closed"));
        }
        self.counters.page_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
