use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::ConfigManager;
use crate::renderer::PdfRenderer;
use crate::server::GeneratePdfResponse;
use crate::signals::shutdown_signal;
use crate::types::{HealthResponse, RenderRequest, SERVICE_NAME};
use poem::{
    listener::TcpListener,
    middleware::{NormalizePath, Tracing, TrailingSlash},
    Endpoint, EndpointExt, Route, Server,
};
use poem_openapi::{payload::Json, OpenApi, OpenApiService};

/// In-flight renders get this long to finish once shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(90);

pub struct Api {
    renderer: Arc<PdfRenderer>,
    config: ConfigManager,
}

#[OpenApi]
impl Api {
    pub fn new(renderer: PdfRenderer, config: ConfigManager) -> Self {
        Self {
            renderer: Arc::new(renderer),
            config,
        }
    }

    /// Liveness probe
    #[oai(path = "/health", method = "get")]
    async fn health(&self) -> Json<HealthResponse> {
        Json(HealthResponse::now())
    }

    /// Render a URL and return it as a PDF attachment
    #[oai(path = "/generate-pdf", method = "post")]
    async fn generate_pdf(&self, Json(request): Json<RenderRequest>) -> GeneratePdfResponse {
        let config = self.config.snapshot().await;
        info!("PDF requested for url={:?}", request.url);

        match self.renderer.render_detached(request, config).await {
            Ok(artifact) => GeneratePdfResponse::from_artifact(artifact),
            Err(e) => GeneratePdfResponse::from_error(&e),
        }
    }
}

pub fn app(api: Api) -> impl Endpoint {
    let api_service =
        OpenApiService::new(api, SERVICE_NAME, env!("CARGO_PKG_VERSION")).server("/");
    let docs = api_service.swagger_ui();
    let spec = api_service.spec_endpoint();

    Route::new()
        .nest("/docs", docs)
        .at("/openapi.json", spec)
        .nest("/", api_service)
        .with(Tracing)
        .with(NormalizePath::new(TrailingSlash::Trim))
}

pub async fn start(listen: &str, renderer: PdfRenderer, config: ConfigManager) -> Result<()> {
    let api = Api::new(renderer, config);

    info!("Listening on {}", listen);
    let listener = TcpListener::bind(listen);
    Server::new(listener)
        .run_with_graceful_shutdown(app(api), shutdown_signal(), Some(SHUTDOWN_GRACE))
        .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::renderer::mock::{Counters, MockBehavior, MockLauncher, FAKE_PDF};
    use poem::http::StatusCode;
    use poem::test::TestClient;

    fn client(behavior: MockBehavior) -> (TestClient<impl Endpoint>, MockLauncher) {
        let launcher = MockLauncher::new(behavior);
        let renderer = PdfRenderer::new(Arc::new(launcher.clone()));
        let api = Api::new(renderer, ConfigManager::with_config(Config::empty()));
        (TestClient::new(app(api)), launcher)
    }

    #[tokio::test]
    async fn test_health() {
        let (cli, launcher) = client(MockBehavior::default());
        for _ in 0..2 {
            let resp = cli.get("/health").send().await;
            resp.assert_status_is_ok();
            let json = resp.json().await;
            let body = json.value().object();
            body.get("status").assert_string("OK");
            body.get("service").assert_string("PDF Generator");
            let timestamp = body.get("timestamp").string().to_string();
            assert!(chrono::DateTime::parse_from_rfc3339(&timestamp).is_ok());
        }
        assert_eq!(Counters::get(&launcher.counters.launches), 0);
    }

    #[tokio::test]
    async fn test_health_while_render_in_flight() {
        let (cli, launcher) = client(MockBehavior {
            hang_launch: true,
            ..Default::default()
        });
        let generate = cli
            .post("/generate-pdf")
            .body_json(&serde_json::json!({ "url": "https://example.com" }))
            .send();
        tokio::pin!(generate);

        // drive the render until it is stuck launching the browser
        tokio::select! {
            _ = &mut generate => panic!("render finished while the launch hangs"),
            _ = async {
                while Counters::get(&launcher.counters.launches) == 0 {
                    tokio::task::yield_now().await;
                }
            } => {}
        }

        let resp = cli.get("/health").send().await;
        resp.assert_status_is_ok();
        resp.json().await.value().object().get("status").assert_string("OK");

        assert_eq!(Counters::get(&launcher.counters.launches), 1);
        assert_eq!(Counters::get(&launcher.counters.session_closes), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_pdf_default_filename() {
        let (cli, launcher) = client(MockBehavior::default());
        let resp = cli
            .post("/generate-pdf")
            .body_json(&serde_json::json!({ "url": "https://example.com" }))
            .send()
            .await;

        resp.assert_status_is_ok();
        resp.assert_content_type("application/pdf");
        resp.assert_header("Content-Disposition", "attachment; filename=\"document.pdf\"");
        resp.assert_header("Content-Length", FAKE_PDF.len().to_string());
        let body = resp.0.into_body().into_vec().await.unwrap();
        assert_eq!(body, FAKE_PDF);

        assert_eq!(Counters::get(&launcher.counters.page_closes), 1);
        assert_eq!(Counters::get(&launcher.counters.session_closes), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_pdf_custom_filename() {
        let (cli, _launcher) = client(MockBehavior::default());
        let resp = cli
            .post("/generate-pdf")
            .body_json(&serde_json::json!({ "url": "https://example.com", "filename": "trip.pdf" }))
            .send()
            .await;
        resp.assert_status_is_ok();
        resp.assert_header("Content-Disposition", "attachment; filename=\"trip.pdf\"");
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_pdf_unreachable() {
        let (cli, launcher) = client(MockBehavior {
            failing_navigations: usize::MAX,
            ..Default::default()
        });
        let resp = cli
            .post("/generate-pdf")
            .body_json(&serde_json::json!({ "url": "https://unreachable.invalid" }))
            .send()
            .await;

        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let json = resp.json().await;
        let body = json.value().object();
        body.get("error").assert_string("Failed to generate PDF");
        let message = body.get("message").string().to_string();
        assert!(message.contains("3 attempts"), "{}", message);
        assert_eq!(Counters::get(&launcher.counters.session_closes), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_pdf_missing_url() {
        let (cli, launcher) = client(MockBehavior::default());
        let resp = cli
            .post("/generate-pdf")
            .body_json(&serde_json::json!({ "filename": "x.pdf" }))
            .send()
            .await;

        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let json = resp.json().await;
        let message = json.value().object().get("message").string().to_string();
        assert!(message.contains("URL is required"), "{}", message);
        assert_eq!(Counters::get(&launcher.counters.launches), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_pdf_page_closed() {
        let (cli, launcher) = client(MockBehavior {
            closed_before_export: true,
            ..Default::default()
        });
        let resp = cli
            .post("/generate-pdf")
            .body_json(&serde_json::json!({ "url": "https://example.com/redirect" }))
            .send()
            .await;

        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let json = resp.json().await;
        let message = json.value().object().get("message").string().to_string();
        assert!(message.contains("closed"), "{}", message);
        assert_eq!(Counters::get(&launcher.counters.session_closes), 1);
    }
}
