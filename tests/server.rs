//! HTTP front-door tests: a real axum server on a random port, backed by a
//! temporary storage root and a mocked provider.

#![cfg(feature = "server")]

use httpmock::{Method, MockServer};
use pdf2matriz::server::{create_router, AppState};
use pdf2matriz::{LlmClient, OpenAiClient, ProcessConfig, PromptCatalog};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A spawned server plus the resources it depends on.
struct TestApp {
    address: String,
    client: reqwest::Client,
    mock_server: MockServer,
    storage: TempDir,
    _server_handle: JoinHandle<()>,
}

impl TestApp {
    async fn spawn() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let mock_server = MockServer::start();
        let storage = tempfile::tempdir().unwrap();
        let config = ProcessConfig::builder()
            .api_base_url(mock_server.url("/v1"))
            .api_key("sk-test")
            .storage_root(storage.path())
            .build()
            .unwrap();
        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(&config).unwrap());
        let app = create_router(AppState::new(config, llm, PromptCatalog::builtin()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        let server_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("[TestApp] Server error: {}", e);
            }
        });

        Self {
            address,
            client: reqwest::Client::new(),
            mock_server,
            storage,
            _server_handle: server_handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn upload(&self, name: &str) -> Value {
        let form = Form::new()
            .part(
                "pdf",
                Part::bytes(b"%PDF-1.4 mock".to_vec())
                    .file_name(name.to_string())
                    .mime_str("application/pdf")
                    .unwrap(),
            )
            .text("initial_prompt", "ficha_tecnica");
        let response = self
            .client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.unwrap()
    }

    fn mock_provider(&self, completion: &str) {
        self.mock_server.mock(|when, then| {
            when.method(Method::POST).path("/v1/files");
            then.status(200).json_body(json!({"id": "file-srv"}));
        });
        let body = json!({"output": [{"content": [{"type": "output_text", "text": completion}]}]});
        self.mock_server.mock(|when, then| {
            when.method(Method::POST).path("/v1/responses");
            then.status(200).json_body(body);
        });
    }

    async fn process(&self, fields: &[(&str, &str)]) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url("/process"))
            .form(fields)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_health_and_prompts() {
    let app = TestApp::spawn().await;

    let health: Value = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "ok"}));

    let prompts: Value = app
        .client
        .get(app.url("/prompts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(prompts["prompts"][0]["key"], "ficha_tecnica");
}

#[tokio::test]
async fn test_upload_then_process() {
    let app = TestApp::spawn().await;
    app.mock_provider(r#"{"Matriz": [{"nombre_del_producto": "Filtro", "micras": 5}]}"#);

    let uploaded = app.upload("Filtro F-5.pdf").await;
    assert_eq!(uploaded["state"], "awaiting_confirmation");
    assert_eq!(uploaded["receipt"]["name"], "Filtro F-5.pdf");
    assert_eq!(uploaded["receipt"]["prompt_key"], "ficha_tecnica");
    let path = uploaded["receipt"]["path"].as_str().unwrap().to_string();
    assert!(path.contains("Filtro_F-5"));

    let (status, body) = app
        .process(&[
            ("filepath", path.as_str()),
            ("prompt_select", "ficha_tecnica"),
            ("parametro_2", "gpt-5.1"),
        ])
        .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["state"], "completed");
    assert_eq!(body["output"]["element_count"], 1);
    assert_eq!(body["output"]["strategy"], "whole_response");

    let canonical = body["output"]["canonical_json"].as_str().unwrap();
    let tables: Value = app
        .client
        .post(app.url("/visualize"))
        .form(&[("json_data", canonical)])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tables["tables"][0]["title"], "Filtro");
    assert!(tables["tables"][0]["markup"]
        .as_str()
        .unwrap()
        .contains("<th>Micras</th>"));
}

#[tokio::test]
async fn test_process_failure_keeps_receipt() {
    let app = TestApp::spawn().await;
    app.mock_provider("Lo siento, no encontré datos.");

    let uploaded = app.upload("doc.pdf").await;
    let path = uploaded["receipt"]["path"].as_str().unwrap().to_string();

    let (status, body) = app.process(&[("filepath", path.as_str())]).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["state"], "failed");
    assert_eq!(body["receipt"]["path"], path.as_str());
    assert!(body["message"].as_str().unwrap().starts_with("Processing error"));
}

#[tokio::test]
async fn test_provider_error_body_not_shown_to_user() {
    let app = TestApp::spawn().await;
    app.mock_server.mock(|when, then| {
        when.method(Method::POST).path("/v1/files");
        then.status(500).body("Traceback: internal secret org-123");
    });

    let uploaded = app.upload("doc.pdf").await;
    let path = uploaded["receipt"]["path"].as_str().unwrap().to_string();

    let (status, body) = app.process(&[("filepath", path.as_str())]).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let message = body["message"].as_str().unwrap();
    assert!(!message.contains("Traceback"), "message: {message}");
    assert!(!message.contains("org-123"), "message: {message}");
}

#[tokio::test]
async fn test_process_rejects_path_outside_storage() {
    let app = TestApp::spawn().await;
    let outside = tempfile::NamedTempFile::new().unwrap();
    let outside_path = outside.path().to_string_lossy().into_owned();

    let (status, body) = app.process(&[("filepath", outside_path.as_str())]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["state"], "failed");
    assert!(!body["message"].as_str().unwrap().contains(&outside_path));

    let missing = app.storage.path().join("nope").join("nope.pdf");
    let (status, _) = app
        .process(&[("filepath", missing.to_string_lossy().as_ref())])
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.process(&[("prompt_select", "x")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_without_pdf_field() {
    let app = TestApp::spawn().await;
    let response = app
        .client
        .post(app.url("/upload"))
        .multipart(Form::new().text("initial_prompt", "ficha_tecnica"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["state"], "failed");
    assert_eq!(body["receipt"], Value::Null);
}

#[tokio::test]
async fn test_visualize_raw_body_and_html() {
    let app = TestApp::spawn().await;

    let raw = r#"[{"titulo": "Dimensiones", "tabla": "<table><tr><td>1</td></tr></table>"}]"#;
    let html = app
        .client
        .post(app.url("/visualize?format=html"))
        .header("content-type", "application/json")
        .body(raw)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(html.contains("<h2>Dimensiones</h2>"));
    assert!(html.contains("<table><tr><td>1</td></tr></table>"));

    let response = app
        .client
        .post(app.url("/visualize"))
        .form(&[("json_data", "{not json")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .client
        .post(app.url("/visualize"))
        .form(&[("json_data", "")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
