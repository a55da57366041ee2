// (C) Coralbits SL 2025
// This file is part of PDF Generator and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_FILENAME: &str = "document.pdf";
pub const SERVICE_NAME: &str = "PDF Generator";
pub const ERROR_SUMMARY: &str = "Failed to generate PDF";
/// Schemes the browser is allowed to load
const ALLOWED_SCHEMES: [&str; 2] = ["http", "https"];

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("Failed to launch browser: {message}")]
    Launch { message: String },
    #[error("Failed to prepare page: {message}")]
    Page { message: String },
    #[error("Failed to load page after {attempts} attempts: {message}")]
    Navigation { attempts: u32, message: String },
    #[error("Failed to prepare page content: {message}")]
    Render { message: String },
    #[error("Page was closed before the PDF could be generated")]
    PageClosed,
    #[error("PDF generation failed: {message}")]
    Export { message: String },
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PdfError {
    pub fn category(&self) -> &'static str {
        match self {
            // A request without a usable url never reaches the browser, but it
            // is reported as a navigation problem.
            PdfError::InvalidRequest { .. } => "NAVIGATION_FAILED",
            PdfError::Launch { .. } => "LAUNCH_FAILED",
            PdfError::Page { .. } => "PAGE_SETUP_FAILED",
            PdfError::Navigation { .. } => "NAVIGATION_FAILED",
            PdfError::Render { .. } => "RENDER_FAILED",
            PdfError::PageClosed => "PAGE_CLOSED",
            PdfError::Export { .. } => "EXPORT_FAILED",
            PdfError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn launch(error: impl std::fmt::Display) -> Self {
        PdfError::Launch {
            message: error.to_string(),
        }
    }

    pub fn page(error: impl std::fmt::Display) -> Self {
        PdfError::Page {
            message: error.to_string(),
        }
    }

    pub fn render(error: impl std::fmt::Display) -> Self {
        PdfError::Render {
            message: error.to_string(),
        }
    }

    pub fn export(error: impl std::fmt::Display) -> Self {
        PdfError::Export {
            message: error.to_string(),
        }
    }
}

/// Body of `POST /generate-pdf`.
///
/// `url` is optional at the schema level so that a missing url is reported
/// through the regular error payload instead of a framework rejection.
#[derive(Object, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderRequest {
    pub url: Option<String>,
    pub filename: Option<String>,
}

impl RenderRequest {
    pub fn new(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    /// Checks the url and resolves the filename
    pub fn validate(&self) -> Result<RenderJob, PdfError> {
        let raw = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| PdfError::InvalidRequest {
                message: "URL is required".to_string(),
            })?;

        let url = url::Url::parse(raw).map_err(|e| PdfError::InvalidRequest {
            message: format!("Invalid URL '{}': {}", raw, e),
        })?;
        if !ALLOWED_SCHEMES.contains(&url.scheme()) {
            return Err(PdfError::InvalidRequest {
                message: format!(
                    "Unsupported URL scheme '{}', only http and https are rendered",
                    url.scheme()
                ),
            });
        }

        Ok(RenderJob {
            url: url.to_string(),
            filename: sanitize_filename(self.filename.as_deref()),
        })
    }
}

/// A validated request, ready for the render workflow
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub url: String,
    pub filename: String,
}

/// The exported document. Owned by the response once produced.
#[derive(Debug)]
pub struct PdfArtifact {
    pub filename: String,
    pub data: Vec<u8>,
}

impl PdfArtifact {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

/// Removes characters that cannot live inside a quoted header parameter.
pub fn sanitize_filename(filename: Option<&str>) -> String {
    let cleaned: String = filename
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

#[derive(Object, Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
}

impl HealthResponse {
    pub fn now() -> Self {
        Self {
            status: "OK".to_string(),
            service: SERVICE_NAME.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Object, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn from_pdf_error(error: &PdfError) -> Self {
        Self {
            error: ERROR_SUMMARY.to_string(),
            message: error.to_string(),
        }
    }
}
