mod config;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use extract::{Annotator, DandelionClient, Extractor, UsageSnapshot};
use forest::{Direction, ExpandReport, ForestError, NodeId, PageView, PaperClient};
use ingest::{Chunker, ChunkerConfig, PdftoppmRenderer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

pub const LOG_JSON_ENV: &str = "RECURSE_PAPER_LOG_JSON";

// One session, one writer: every request takes the lock for its whole run.
struct AppState<A> {
    client: Arc<Mutex<PaperClient<A>>>,
}

impl<A> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    active_paper: Option<String>,
}

#[derive(Deserialize)]
struct SelectRequest {
    filename: String,
}

#[derive(Serialize)]
struct PageResponse {
    view: PageView,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct ExpandResponse {
    report: ExpandReport,
    view: PageView,
}

#[derive(Serialize)]
struct SaveResponse {
    saved: bool,
    warning: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load()?;

    // Refuse to start without a credential
    let annotator = DandelionClient::from_env(config.dandelion.clone())?;
    let chunker = Chunker::new(ChunkerConfig {
        max_chars: config.chunk_chars,
    });

    let mut client = PaperClient::new(config.library(), Extractor::new(annotator, chunker));
    if let Some(command) = &config.render.command {
        client = client.with_renderer(Arc::new(PdftoppmRenderer::new(command.clone())));
    }

    let state = AppState {
        client: Arc::new(Mutex::new(client)),
    };
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    tracing::info!(
        papers_dir = %config.papers_dir.display(),
        cache_dir = %config.cache_dir.display(),
        "Server listening on http://{}",
        config.bind_addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Persist whatever was open when the application closes
    if let Err(e) = state.client.lock().await.shutdown() {
        tracing::error!(error = %e, "Failed to save active paper on shutdown");
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var_os(LOG_JSON_ENV).is_some() {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    tracing::info!("Shutting down");
}

fn router<A: Annotator + 'static>(state: AppState<A>) -> Router {
    Router::new()
        .route("/health", get(health_check::<A>))
        .route("/papers", get(list_papers::<A>))
        .route("/papers/select", post(select_paper::<A>))
        .route("/page", get(current_page::<A>))
        .route("/page/next", post(next_page::<A>))
        .route("/page/previous", post(previous_page::<A>))
        .route("/entities/:id/expand", post(expand_entity::<A>))
        .route("/entities/:id/close", post(close_entity::<A>))
        .route("/save", post(save_paper::<A>))
        .route("/usage", get(get_usage::<A>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn reject(e: ForestError) -> StatusCode {
    let status = match &e {
        ForestError::UnknownNode(_) => StatusCode::NOT_FOUND,
        ForestError::NoActivePaper => StatusCode::CONFLICT,
        ForestError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
        ForestError::Document { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ForestError::Persist { .. } | ForestError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %e, "Request failed");
    } else {
        tracing::warn!(error = %e, "Request rejected");
    }
    status
}

async fn health_check<A: Annotator>(
    State(state): State<AppState<A>>,
) -> Json<HealthResponse> {
    let client = state.client.lock().await;

    Json(HealthResponse {
        status: "ok",
        active_paper: client.active().map(|p| p.filename().to_string()),
    })
}

async fn list_papers<A: Annotator>(
    State(state): State<AppState<A>>,
) -> Result<Json<Vec<String>>, StatusCode> {
    let client = state.client.lock().await;
    let papers = client.available_papers().await.map_err(reject)?;

    Ok(Json(papers))
}

async fn select_paper<A: Annotator>(
    State(state): State<AppState<A>>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<PageResponse>, StatusCode> {
    let mut client = state.client.lock().await;
    let paper = client.select(&req.filename).await.map_err(reject)?;

    Ok(Json(PageResponse {
        warnings: paper.take_notices(),
        view: paper.view(),
    }))
}

async fn current_page<A: Annotator>(
    State(state): State<AppState<A>>,
) -> Result<Json<PageResponse>, StatusCode> {
    let mut client = state.client.lock().await;
    let paper = client.active_mut().map_err(reject)?;

    Ok(Json(PageResponse {
        warnings: paper.take_notices(),
        view: paper.view(),
    }))
}

async fn next_page<A: Annotator>(
    State(state): State<AppState<A>>,
) -> Result<Json<PageView>, StatusCode> {
    navigate(state, Direction::Next).await
}

async fn previous_page<A: Annotator>(
    State(state): State<AppState<A>>,
) -> Result<Json<PageView>, StatusCode> {
    navigate(state, Direction::Previous).await
}

async fn navigate<A: Annotator>(
    state: AppState<A>,
    direction: Direction,
) -> Result<Json<PageView>, StatusCode> {
    let mut client = state.client.lock().await;
    let view = client.navigate(direction).map_err(reject)?;

    Ok(Json(view))
}

async fn expand_entity<A: Annotator>(
    State(state): State<AppState<A>>,
    Path(id): Path<NodeId>,
) -> Result<Json<ExpandResponse>, StatusCode> {
    let mut client = state.client.lock().await;
    let report = client.expand(id).await.map_err(reject)?;
    let view = client.view().map_err(reject)?;

    Ok(Json(ExpandResponse { report, view }))
}

async fn close_entity<A: Annotator>(
    State(state): State<AppState<A>>,
    Path(id): Path<NodeId>,
) -> Result<Json<PageView>, StatusCode> {
    let mut client = state.client.lock().await;
    let view = client.close(id).map_err(reject)?;

    Ok(Json(view))
}

async fn save_paper<A: Annotator>(
    State(state): State<AppState<A>>,
) -> Result<Json<SaveResponse>, StatusCode> {
    let client = state.client.lock().await;

    match client.save() {
        Ok(()) => Ok(Json(SaveResponse {
            saved: true,
            warning: None,
        })),
        Err(ForestError::NoActivePaper) => Err(reject(ForestError::NoActivePaper)),
        // The tree in memory is still good; tell the user and carry on
        Err(e) => {
            tracing::warn!(error = %e, "Save failed");
            Ok(Json(SaveResponse {
                saved: false,
                warning: Some(e.to_string()),
            }))
        }
    }
}

async fn get_usage<A: Annotator>(
    State(state): State<AppState<A>>,
) -> Json<Option<UsageSnapshot>> {
    let client = state.client.lock().await;
    Json(client.usage())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use extract::{Annotation, ExtractError};
    use forest::LibraryConfig;
    use tower::ServiceExt;

    struct SilentAnnotator;

    impl Annotator for SilentAnnotator {
        async fn annotate(&mut self, _text: &str) -> Result<Vec<Annotation>, ExtractError> {
            Ok(Vec::new())
        }
    }

    fn app(root: &std::path::Path) -> Router {
        let client = PaperClient::new(
            LibraryConfig {
                papers_dir: root.join("papers"),
                cache_dir: root.join("cache"),
                zoom: 1.0,
            },
            Extractor::new(SilentAnnotator, Chunker::default()),
        );
        router(AppState {
            client: Arc::new(Mutex::new(client)),
        })
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let root = tempfile::tempdir().unwrap();
        let (status, body) = call(app(root.path()), "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["active_paper"].is_null());
    }

    #[tokio::test]
    async fn test_page_requires_active_paper() {
        let root = tempfile::tempdir().unwrap();

        for (method, uri) in [
            ("GET", "/page"),
            ("POST", "/page/next"),
            ("POST", "/save"),
            ("POST", "/entities/67e55044-10b1-426f-9247-bb680e5fe0c8/expand"),
        ] {
            let (status, _) = call(app(root.path()), method, uri, None).await;
            assert_eq!(status, StatusCode::CONFLICT, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn test_malformed_node_id() {
        let root = tempfile::tempdir().unwrap();
        let (status, _) = call(app(root.path()), "POST", "/entities/not-a-uuid/close", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_select_rejects_paths() {
        let root = tempfile::tempdir().unwrap();
        let (status, _) = call(
            app(root.path()),
            "POST",
            "/papers/select",
            Some(r#"{"filename": "../etc/passwd.pdf"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_select_unreadable_pdf() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("papers")).unwrap();
        std::fs::write(root.path().join("papers/broken.pdf"), b"not a pdf").unwrap();

        let (status, _) = call(
            app(root.path()),
            "POST",
            "/papers/select",
            Some(r#"{"filename": "broken.pdf"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_list_papers() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("papers")).unwrap();
        std::fs::write(root.path().join("papers/attention.pdf"), b"%PDF").unwrap();

        let (status, body) = call(app(root.path()), "GET", "/papers", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"["attention.pdf"]"#);
    }

    #[tokio::test]
    async fn test_usage_without_meter() {
        let root = tempfile::tempdir().unwrap();
        let (status, body) = call(app(root.path()), "GET", "/usage", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "null");
    }
}
