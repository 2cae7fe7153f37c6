//! Router tests against in-memory SQLite and mock providers.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use docmind_common::config::AppConfig;
use docmind_common::db::{DbPool, Repository};
use docmind_common::embeddings::HashingEmbedder;
use docmind_common::llm::MockLanguageModel;
use docmind_common::speech::SilentSpeech;
use docmind_gateway::{create_router, AppState};
use docmind_ingestion::testing::simple_pdf;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "docmind-test-boundary";

struct TestApp {
    _dir: tempfile::TempDir,
    router: Router,
}

async fn app_with(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.storage.root = dir.path().to_string_lossy().to_string();
    config.rate_limit.enabled = false;
    configure(&mut config);

    let repository = Repository::new(DbPool::in_memory().await.unwrap());
    let state = AppState::new(
        config,
        repository,
        Arc::new(HashingEmbedder::new(384)),
        Arc::new(MockLanguageModel::new()),
        Arc::new(SilentSpeech::new()),
    );
    state.storage.init().await.unwrap();

    TestApp {
        _dir: dir,
        router: create_router(state),
    }
}

async fn app() -> TestApp {
    app_with(|_| {}).await
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn upload(&self, uri: &str, files: &[(&str, Vec<u8>)], collection_name: Option<&str>) -> (StatusCode, Value) {
        let mut body = Vec::new();
        if let Some(name) = collection_name {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"collection_name\"\r\n\r\n{}\r\n",
                    BOUNDARY, name
                )
                .as_bytes(),
            );
        }
        for (file_name, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: application/pdf\r\n\r\n",
                    BOUNDARY, file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn create_collection(&self, name: &str) -> String {
        let (status, body) = self.json(Method::POST, "/v1/collections", json!({ "name": name })).await;
        assert_eq!(status, StatusCode::CREATED);
        body["collection_id"].as_str().unwrap().to_string()
    }

    /// Collection with A.pdf (revenue) and B.pdf (gardening); returns (collection, A's id)
    async fn seeded_collection(&self) -> (String, String) {
        let collection_id = self.create_collection("Strategy").await;
        let (status, body) = self
            .upload(
                &format!("/v1/collections/{}/documents/upload", collection_id),
                &[
                    (
                        "A.pdf",
                        simple_pdf(
                            "Revenue Growth Strategy",
                            &["Our revenue growth strategy focuses on pricing and retention in new markets."],
                        ),
                    ),
                    (
                        "B.pdf",
                        simple_pdf(
                            "Garden Notes",
                            &["An unrelated topic about planting tomatoes and watering the garden daily."],
                        ),
                    ),
                ],
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let doc_a = body["documents"][0]["doc_id"].as_str().unwrap().to_string();
        (collection_id, doc_a)
    }
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = app().await;

    let (status, body) = app.get("/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.get("/v1/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["database"]["status"], "up");
    assert_eq!(body["checks"]["storage"]["status"], "up");
}

#[tokio::test]
async fn test_collection_crud() {
    let app = app().await;
    let id = app.create_collection("Research").await;

    let (status, body) = app
        .json(
            Method::PATCH,
            &format!("/v1/collections/{}", id),
            json!({ "description": "Quarterly reports", "tags": ["finance"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Research");
    assert_eq!(body["description"], "Quarterly reports");
    assert_eq!(body["tags"], json!(["finance"]));

    let (status, body) = app.get("/v1/collections").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["document_count"], 0);

    let (status, body) = app.get("/v1/collections/collection_missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "COLLECTION_NOT_FOUND");

    let (status, _) = app.json(Method::POST, "/v1/collections", json!({ "name": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_extracts_and_indexes() {
    let app = app().await;
    let (collection_id, doc_a) = app.seeded_collection().await;

    let (status, body) = app.get(&format!("/v1/documents/{}", doc_a)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["doc_title"], "Revenue Growth Strategy");
    assert_eq!(body["is_processed"], "success");
    assert_eq!(body["is_embedding_created"], "success");
    assert!(!body["outline"].as_array().unwrap().is_empty());
    assert_eq!(body["outline"][0]["page"], 1);

    let (status, body) = app.get(&format!("/v1/collections/{}/documents", collection_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = app.get(&format!("/v1/collections/{}", collection_id)).await;
    assert_eq!(body["document_count"], 2);
}

#[tokio::test]
async fn test_corrupt_pdf_is_recorded_as_failed() {
    let app = app().await;
    let collection_id = app.create_collection("Broken").await;

    let (status, body) = app
        .upload(
            &format!("/v1/collections/{}/documents/upload", collection_id),
            &[("broken.pdf", b"this is not a pdf".to_vec())],
            None,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documents"][0]["is_processed"], "failed");
    assert_eq!(body["documents"][0]["is_embedding_created"], "failed");
    assert!(body["failures"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_without_collection_uses_default_or_named() {
    let app = app().await;
    let pdf = simple_pdf("Notes", &["Some body text for the notes document."]);

    let (status, body) = app.upload("/v1/documents/upload", &[("notes.pdf", pdf.clone())], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["collection"]["name"], "Default Uploads");

    let (status, body) = app
        .upload("/v1/documents/upload", &[("notes.pdf", pdf)], Some("Board Pack"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["collection"]["name"], "Board Pack");

    let (status, _) = app.upload("/v1/documents/upload", &[], None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_text_recommendation_ranks_relevant_document_first() {
    let app = app().await;
    let (collection_id, doc_a) = app.seeded_collection().await;

    let (status, body) = app
        .json(
            Method::POST,
            "/v1/recommendations/text",
            json!({ "selected_text": "revenue growth", "collection_ids": [collection_id] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["doc_id"], doc_a.as_str());
    assert_eq!(body["items"][0]["page_number"], 1);
    assert!(!body["items"][0]["snippet_text"].as_str().unwrap().is_empty());

    let id = body["recommendation_id"].as_str().unwrap();
    let (status, stored) = app.get(&format!("/v1/recommendations/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["items"], body["items"]);

    let (_, listed) = app.get(&format!("/v1/collections/{}/recommendations", collection_id)).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, body) = app
        .json(Method::DELETE, "/v1/recommendations", json!({ "recommendation_ids": [id, "rec_missing"] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    let (status, body) = app.get(&format!("/v1/recommendations/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "RECOMMENDATION_NOT_FOUND");
}

#[tokio::test]
async fn test_recommendation_validation() {
    let app = app().await;

    let (status, body) = app
        .json(Method::POST, "/v1/recommendations/text", json!({ "selected_text": "anything" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["items"].as_array().unwrap().is_empty());

    let (status, body) = app
        .json(
            Method::POST,
            "/v1/recommendations/persona",
            json!({ "persona": "Investor", "job_to_be_done": "" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "job_to_be_done");

    // Absent fields fail the same way as empty ones
    let (status, body) = app
        .json(Method::POST, "/v1/recommendations/persona", json!({ "persona": "Investor" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"]["field"], "job_to_be_done");

    let (status, body) = app
        .json(Method::POST, "/v1/recommendations/persona", json!({ "job_to_be_done": "Plan a budget" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "persona");
}

#[tokio::test]
async fn test_insights() {
    let app = app().await;
    let empty = app.create_collection("Empty").await;

    let (status, _) = app.json(Method::POST, "/v1/insights", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.json(Method::POST, "/v1/insights", json!({ "collection_id": empty })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["type"], "generation_error");

    let insight_id = body["insight_id"].as_str().unwrap();
    let (status, _) = app.get(&format!("/v1/insights/{}", insight_id)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .json(Method::POST, "/v1/insights", json!({ "document_id": "doc_missing" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_podcasts() {
    let app = app().await;
    let (collection_id, _) = app.seeded_collection().await;

    let (status, _) = app
        .json(Method::POST, "/v1/podcasts/recommendations/rec_missing", json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // the mock LLM does not return a script, so the podcast fails but is returned
    let (status, body) = app
        .json(
            Method::POST,
            &format!("/v1/podcasts/collections/{}", collection_id),
            json!({ "min_duration_seconds": 60, "max_duration_seconds": 90 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert!(body["error_message"].as_str().is_some());

    let podcast_id = body["podcast_id"].as_str().unwrap();
    let (status, body) = app.get(&format!("/v1/podcasts/{}", podcast_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");

    let (status, _) = app
        .json(
            Method::POST,
            &format!("/v1/podcasts/collections/{}", collection_id),
            json!({ "min_duration_seconds": 300, "max_duration_seconds": 60 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_collection_delete_cascades() {
    let app = app().await;
    let (collection_id, doc_a) = app.seeded_collection().await;

    let (status, body) = app
        .send(
            Request::delete(format!("/v1/collections/{}", collection_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documents_removed"], 2);

    let (status, _) = app.get(&format!("/v1/documents/{}", doc_a)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get(&format!("/v1/collections/{}", collection_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_document_delete() {
    let app = app().await;
    let (collection_id, doc_a) = app.seeded_collection().await;

    let (status, _) = app
        .send(Request::delete(format!("/v1/documents/{}", doc_a)).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get(&format!("/v1/documents/{}", doc_a)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app
        .json(
            Method::POST,
            "/v1/recommendations/text",
            json!({ "selected_text": "revenue growth", "collection_ids": [collection_id] }),
        )
        .await;
    assert!(body["items"]
        .as_array()
        .unwrap()
        .iter()
        .all(|item| item["doc_id"] != doc_a.as_str()));
}

#[tokio::test]
async fn test_generation_routes_are_rate_limited() {
    let app = app_with(|config| {
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
    })
    .await;
    let body = json!({ "selected_text": "revenue" });

    let (status, _) = app.json(Method::POST, "/v1/recommendations/text", body.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.json(Method::POST, "/v1/recommendations/text", body).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    // other routes are not limited
    let (status, _) = app.get("/v1/collections").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_stored_files_are_served() {
    let app = app().await;
    let collection_id = app.create_collection("Files").await;
    let pdf = simple_pdf("Served", &["Body text."]);

    let (_, body) = app
        .upload(
            &format!("/v1/collections/{}/documents/upload", collection_id),
            &[("served.pdf", pdf.clone())],
            None,
        )
        .await;
    let url = body["documents"][0]["doc_url"].as_str().unwrap();
    let path = &url[url.find("/storage/").unwrap()..];

    let response = app
        .router
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.to_vec(), pdf);
}
