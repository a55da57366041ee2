use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
        }
    }
}

/// Load condition that ends a navigation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    /// DOM parsed
    DomContentLoaded,
    /// `load` event fired
    Load,
    /// At most two requests in flight for half a second
    NetworkIdle,
}

impl WaitUntil {
    pub const IDLE_CONNECTIONS: usize = 2;
    pub const IDLE_WINDOW: Duration = Duration::from_millis(500);
}

impl std::fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::Load => "load",
            WaitUntil::NetworkIdle => "networkidle",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub viewport: Viewport,
    /// Upper bound for each DevTools round-trip
    pub request_timeout: Duration,
}

impl LaunchOptions {
    /// Flags for running inside a server without a display, GPU or a large /dev/shm
    pub const SERVER_ARGS: [&'static str; 4] = [
        "--no-sandbox",
        "--disable-gpu",
        "--disable-software-rasterizer",
        "--disable-dev-shm-usage",
    ];
}

/// Parameters handed to the browser's print-to-PDF call. Sizes are in inches.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin: f64,
    pub scale: f64,
    pub print_background: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            paper_width: 8.27,
            paper_height: 11.69,
            margin: 0.4,
            scale: 0.85,
            print_background: true,
        }
    }
}

/// The resource types the request filter cares about. Everything the
/// browser reports that is not listed maps to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Image,
    Font,
    Script,
    Media,
    TextTrack,
    WebSocket,
    EventSource,
    Xhr,
    Fetch,
    Other,
}

/// What the filter gets to see of an outgoing request
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub kind: ResourceKind,
    pub url: String,
}

impl RequestDescriptor {
    pub fn new(kind: ResourceKind, url: &str) -> Self {
        Self {
            kind,
            url: url.to_string(),
        }
    }
}
