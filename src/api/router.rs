//! HTTP router for the reconciliation service.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;

/// Upper bound on a request body. Documents arrive base64-encoded, so this
/// sits comfortably above the decoded document limit.
pub const MAX_BODY_BYTES: usize = 30 * 1024 * 1024;

/// Build the API router.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn api_router(ctx: ApiContext) -> Router {
    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/documents", post(endpoints::documents::submit))
        .route("/documents/:id", get(endpoints::documents::fetch))
        .route("/work-orders", post(endpoints::work_orders::create))
        .route("/reviews", get(endpoints::reviews::list))
        .route("/reviews/:id", get(endpoints::reviews::detail))
        .route("/reviews/:id/resolve", post(endpoints::reviews::resolve))
        .route("/templates/:sender_key", put(endpoints::templates::put))
        .with_state(ctx);

    Router::new()
        .nest("/api", routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use base64::Engine;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::pipeline::extraction::pdfium::MockPdfText;
    use crate::pipeline::extraction::{ExtractionOrchestrator, ExtractionSettings};
    use crate::pipeline::reconcile::assets::FsAssetStore;
    use crate::pipeline::reconcile::identity::IdentityResolver;
    use crate::pipeline::reconcile::legacy::NoopLegacyStore;
    use crate::pipeline::reconcile::writer::PersistenceWriter;
    use crate::pipeline::reconcile::ReconciliationPipeline;

    /// Router over a temp database and asset directory. Every submitted
    /// document reads as `page_text`. The tempdir guard must outlive the test.
    fn test_app(page_text: &str) -> (Router, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let orchestrator = ExtractionOrchestrator::new(
            Box::new(MockPdfText::new(&[page_text])),
            ExtractionSettings::default(),
        );
        let legacy = Arc::new(NoopLegacyStore);
        let resolver = IdentityResolver::new(true, 0.80, legacy.clone());
        let assets = Arc::new(FsAssetStore::new(&tmp.path().join("assets")).unwrap());
        let writer = PersistenceWriter::new(assets, legacy);
        let pipeline = ReconciliationPipeline::new(orchestrator, resolver, writer);
        let ctx = ApiContext::new(pipeline, &tmp.path().join("countersign.db"));
        (api_router(ctx), tmp)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn json_of(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn acme_template() -> serde_json::Value {
        serde_json::json!({
            "page_index": 1,
            "x": 400.0,
            "y": 40.0,
            "width": 150.0,
            "height": 30.0,
            "page_width_pt": 612.0,
            "page_height_pt": 792.0,
            "expected_digits": 7
        })
    }

    fn submission(sender: &str) -> serde_json::Value {
        serde_json::json!({
            "sender_key": sender,
            "document_base64": base64::engine::general_purpose::STANDARD.encode(b"%PDF signed"),
            "filename": "wo.pdf"
        })
    }

    #[tokio::test]
    async fn health_reports_empty_queue() {
        let (app, _tmp) = test_app("");
        let response = send(&app, get_request("/api/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["unresolved_reviews"], 0);
    }

    #[tokio::test]
    async fn not_found_for_unknown_route() {
        let (app, _tmp) = test_app("");
        let response = send(&app, get_request("/api/nonexistent")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn submitted_document_is_applied_and_fetchable() {
        let (app, _tmp) = test_app("Northwind Services\nWO 4521983\nSigned");

        let response = send(&app, json_request("PUT", "/api/templates/acme", acme_template())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(
            &app,
            json_request(
                "POST",
                "/api/work-orders",
                serde_json::json!({"identifier": "4521983", "job_reference": "JOB-77"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = send(&app, json_request("POST", "/api/documents", submission("acme"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert_eq!(json["outcome"], "applied");
        assert_eq!(json["identifier"], "4521983");

        let doc_id = json["signed_document_id"].as_str().unwrap().to_string();
        let response = send(&app, get_request(&format!("/api/documents/{doc_id}"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert_eq!(json["filename"], "wo.pdf");
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(json["document_base64"].as_str().unwrap())
            .unwrap();
        assert_eq!(bytes, b"%PDF signed");
    }

    #[tokio::test]
    async fn unknown_identifier_is_queued_and_resolvable() {
        let (app, _tmp) = test_app("WO 7770001");
        send(&app, json_request("PUT", "/api/templates/acme", acme_template())).await;

        let response = send(&app, json_request("POST", "/api/documents", submission("acme"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_of(response).await;
        assert_eq!(json["outcome"], "needs_review");
        let review_id = json["review_item_id"].as_str().unwrap().to_string();

        let response = send(&app, get_request("/api/reviews?sender_key=acme")).await;
        let json = json_of(response).await;
        assert_eq!(json["unresolved_count"], 1);
        assert_eq!(json["items"][0]["id"], review_id.as_str());

        send(
            &app,
            json_request(
                "POST",
                "/api/work-orders",
                serde_json::json!({"identifier": "7770002", "job_reference": "JOB-2"}),
            ),
        )
        .await;

        let uri = format!("/api/reviews/{review_id}/resolve");
        let wrong_sender = serde_json::json!({"sender_key": "globex", "identifier": "7770002"});
        let response = send(&app, json_request("POST", &uri, wrong_sender)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = serde_json::json!({"sender_key": "acme", "identifier": "7770002", "note": "misprint"});
        let response = send(&app, json_request("POST", &uri, body.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_of(response).await["outcome"], "applied");

        let response = send(&app, json_request("POST", &uri, body)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(&app, get_request(&format!("/api/reviews/{review_id}"))).await;
        let json = json_of(response).await;
        assert_eq!(json["resolution_state"], "resolved");
        assert_eq!(json["resolved_identifier"], "7770002");
    }

    #[tokio::test]
    async fn bad_base64_is_400() {
        let (app, _tmp) = test_app("");
        let body = serde_json::json!({"sender_key": "acme", "document_base64": "not base64!!"});
        let response = send(&app, json_request("POST", "/api/documents", body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_of(response).await["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn duplicate_work_order_is_409() {
        let (app, _tmp) = test_app("");
        let body = serde_json::json!({"identifier": "4521983", "job_reference": "JOB-77"});
        let first = send(&app, json_request("POST", "/api/work-orders", body.clone())).await;
        assert_eq!(first.status(), StatusCode::CREATED);
        let second = send(&app, json_request("POST", "/api/work-orders", body)).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn non_numeric_work_order_identifier_is_400() {
        let (app, _tmp) = test_app("");
        let body = serde_json::json!({"identifier": "WO-12", "job_reference": "JOB-1"});
        let response = send(&app, json_request("POST", "/api/work-orders", body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn template_outside_page_is_400() {
        let (app, _tmp) = test_app("");
        let mut body = acme_template();
        body["x"] = serde_json::json!(600.0);
        let response = send(&app, json_request("PUT", "/api/templates/acme", body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_ids_are_400() {
        let (app, _tmp) = test_app("");
        let response = send(&app, get_request("/api/reviews/not-a-uuid")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = send(&app, get_request(&format!("/api/documents/{}", uuid::Uuid::new_v4()))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
