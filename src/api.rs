//! # HTTP API Module
//!
//! ## Purpose
//! Exposes the search service over HTTP: a health endpoint, the search
//! endpoint, and a chunked plain-text stream of server log lines for
//! operational dashboards.
//!
//! ## Input/Output Specification
//! - **Input**: JSON search requests, streaming connections
//! - **Output**: JSON search responses, chunked log lines
//! - **Error contract**: Search handler failures are reported in-band as
//!   `{"success": false, "error": ...}` rather than transport-level errors.
//!
//! ## Key Features
//! - CORS policy driven by configuration
//! - Default hybrid search when no methods are requested
//! - Lossy log streaming that reports dropped lines instead of stalling

use crate::search::SearchFilters;
use crate::AppState;
use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use tokio::sync::broadcast;

/// Body of the search endpoint
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub search_methods: Option<Vec<String>>,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn error_body(message: &str) -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "error": message,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

/// GET / - service health
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "Law case search API is running"
    }))
}

/// POST /new-search - run the requested strategies and return ranked results
async fn new_search(
    state: web::Data<AppState>,
    request: web::Json<SearchRequest>,
) -> impl Responder {
    let query = request
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());
    let Some(query) = query else {
        return HttpResponse::Ok().json(error_body("Query must not be empty"));
    };

    let limit = request
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(state.config.search.default_limit);

    let response = state
        .search_service
        .search(
            query,
            request.search_methods.as_deref(),
            &request.filters,
            limit,
        )
        .await;

    HttpResponse::Ok().json(response)
}

/// GET /logs/stream - chunked plain-text feed of server log lines
async fn stream_logs(state: web::Data<AppState>) -> HttpResponse {
    let receiver = state.log_feed.subscribe();
    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        let chunk: Option<std::result::Result<web::Bytes, actix_web::Error>> =
            match receiver.recv().await {
                Ok(line) => Some(Ok(web::Bytes::from(format!("{}\n", line)))),
                Err(broadcast::error::RecvError::Lagged(skipped)) => Some(Ok(web::Bytes::from(
                    format!("... {} log line(s) dropped\n", skipped),
                ))),
                Err(broadcast::error::RecvError::Closed) => None,
            };
        chunk.map(|chunk| (chunk, receiver))
    });

    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .streaming(stream)
}

fn cors_policy(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST"])
        .allow_any_header()
        .max_age(3600);

    if allowed_origins.iter().any(|origin| origin == "*") {
        cors = cors.allow_any_origin();
    } else {
        for origin in allowed_origins {
            cors = cors.allowed_origin(origin);
        }
    }
    cors
}

/// Mount all routes onto an application
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health))
        .route("/new-search", web::post().to(new_search))
        .route("/logs/stream", web::get().to(stream_logs));
}

/// Run the HTTP server until shutdown
pub async fn run(state: AppState) -> std::io::Result<()> {
    let host = state.config.server.host.clone();
    let port = state.config.server.port;
    let allowed_origins = state.config.server.allowed_origins.clone();

    tracing::info!("Starting search API on {}:{}", host, port);
    HttpServer::new(move || {
        App::new()
            .wrap(cors_policy(&allowed_origins))
            .app_data(web::Data::new(state.clone()))
            .configure(configure)
    })
    .bind((host, port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::EmbeddingClient;
    use crate::logging::LogFeed;
    use crate::search::SearchService;
    use crate::store::StoreClient;
    use actix_web::test;
    use std::sync::Arc;

    fn test_state() -> AppState {
        let mut config = Config::default();
        config.store.url = "http://127.0.0.1:9".to_string();
        config.store.service_key = "key".to_string();

        let store = Arc::new(StoreClient::new(config.store.clone()).unwrap());
        let embedding = Arc::new(EmbeddingClient::new(config.embedding.clone()).unwrap());
        let search_service = Arc::new(SearchService::new(
            config.search.clone(),
            store,
            embedding,
        ));

        AppState {
            config: Arc::new(config),
            search_service,
            log_feed: LogFeed::new(8),
        }
    }

    #[actix_web::test]
    async fn health_reports_running() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .configure(configure),
        )
        .await;

        let request = test::TestRequest::get().uri("/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, request).await;
        assert!(body["message"].as_str().unwrap().contains("running"));
    }

    #[actix_web::test]
    async fn empty_query_is_rejected_in_band() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .configure(configure),
        )
        .await;

        for body in [
            serde_json::json!({}),
            serde_json::json!({"query": "   "}),
        ] {
            let request = test::TestRequest::post()
                .uri("/new-search")
                .set_json(body)
                .to_request();
            let response: serde_json::Value = test::call_and_read_body_json(&app, request).await;
            assert_eq!(response["success"], serde_json::json!(false));
            assert!(response["error"].as_str().unwrap().contains("Query"));
        }
    }

    #[actix_web::test]
    async fn search_with_unreachable_store_still_succeeds() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .configure(configure),
        )
        .await;

        // Strategies degrade to empty result sets, the envelope stays 200
        let request = test::TestRequest::post()
            .uri("/new-search")
            .set_json(serde_json::json!({"query": "損害賠償", "search_methods": ["keyword"]}))
            .to_request();
        let response: serde_json::Value = test::call_and_read_body_json(&app, request).await;

        assert_eq!(response["success"], serde_json::json!(true));
        assert_eq!(response["total_count"], serde_json::json!(0));
        assert_eq!(response["query"], serde_json::json!("損害賠償"));
    }

    #[actix_web::test]
    async fn log_stream_delivers_published_lines() {
        use actix_web::body::MessageBody;

        let state = test_state();
        let feed = state.log_feed.clone();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let request = test::TestRequest::get().uri("/logs/stream").to_request();
        let response = test::call_service(&app, request).await;
        assert!(response.status().is_success());

        feed.publish("ingestion finished".to_string());
        let mut body = response.into_body();
        let chunk = futures::future::poll_fn(|cx| {
            std::pin::Pin::new(&mut body).poll_next(cx)
        })
        .await
        .unwrap()
        .unwrap();
        assert!(String::from_utf8_lossy(&chunk).contains("ingestion finished"));
    }
}
