use std::{fs, path::PathBuf};

use axum::{
    extract::Path,
    http::{header, HeaderMap, StatusCode, Uri},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::task::JoinHandle;
use webtest::delay::DelayRequest;
use webtest::http::StatusRange;
use webtest::rest::{RestRequest, RestValidator};
use webtest::result::render_text;
use webtest::soap::SoapRequest;
use webtest::{
    DelayStep, Engine, Endpoint, EndpointRef, ExecutionContext, Outcome, RestStep, SoapStep,
    TestCase, TestConfiguration, TestRunner, TestSuite,
};

const FAULT: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><soap:Fault><faultcode>soap:Client</faultcode><faultstring>Unknown operation</faultstring></soap:Fault></soap:Body></soap:Envelope>"#;

struct TestServer {
    base_url: String,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

fn between<'a>(text: &'a str, open: &str, close: &str) -> &'a str {
    text.split_once(open)
        .and_then(|(_, rest)| rest.split_once(close))
        .map(|(inner, _)| inner)
        .unwrap_or_default()
}

fn forecast(city: &str) -> String {
    format!(
        r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><w:Forecast xmlns:w="urn:weather"><w:City>{city}</w:City><w:Degrees>21</w:Degrees><w:From>2018-10-29T10:00:00</w:From><w:To>2018-10-29T11:00:00</w:To></w:Forecast></soap:Body></soap:Envelope>"#
    )
}

fn mtom(received: &str) -> String {
    format!(
        "--MIMEBoundary\r\n\
         Content-Type: application/xop+xml; charset=UTF-8; type=\"text/xml\"\r\n\
         Content-ID: <root>\r\n\
         \r\n\
         <soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body><w:Received xmlns:w=\"urn:weather\">{received}</w:Received></soap:Body></soap:Envelope>\r\n\
         --MIMEBoundary\r\n\
         Content-Type: application/octet-stream\r\n\
         Content-ID: <photo>\r\n\
         \r\n\
         DATA\r\n\
         --MIMEBoundary--\r\n"
    )
}

impl TestServer {
    async fn spawn() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route(
                "/rest/items",
                get(|| async move {
                    (
                        [("X-Trace", "abc")],
                        Json(json!([{
                            "id": 7,
                            "foo": {"bar": [2018, 29, 10]},
                            "test": null,
                            "day": [2018, 10, 29],
                            "created": "2018-10-29 10:15:00",
                            "updated": "2018-10-29 10:15:01"
                        }])),
                    )
                }),
            )
            .route(
                "/rest/echo/:id",
                post(
                    |Path(_id): Path<String>, uri: Uri, headers: HeaderMap, body: String| async move {
                        let client = headers
                            .get("X-Client")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        let received: serde_json::Value =
                            serde_json::from_str(&body).unwrap_or_default();
                        (
                            StatusCode::CREATED,
                            [("X-Client-Seen", client)],
                            Json(json!({"received": received, "path": uri.path()})),
                        )
                    },
                ),
            )
            .route(
                "/rest/missing",
                get(|| async move { (StatusCode::NOT_FOUND, "not here") }),
            )
            .route(
                "/soap/weather",
                post(|headers: HeaderMap, body: String| async move {
                    let action = headers
                        .get("SOAPAction")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    let content_type = [(header::CONTENT_TYPE, "text/xml; charset=utf-8".to_string())];
                    if body.contains("Fail") {
                        return (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            content_type,
                            [("X-Soap-Action", action)],
                            FAULT.to_string(),
                        );
                    }
                    let city = between(&body, "<w:City>", "</w:City>").to_string();
                    (StatusCode::OK, content_type, [("X-Soap-Action", action)], forecast(&city))
                }),
            )
            .route(
                "/soap/mtom",
                post(|body: String| async move {
                    let received = between(&body, "<w:Photo xmlns:w=\"urn:weather\">", "</w:Photo>");
                    (
                        [(
                            header::CONTENT_TYPE,
                            "multipart/related; type=\"application/xop+xml\"; boundary=MIMEBoundary",
                        )],
                        mtom(received),
                    )
                }),
            );

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

        let handle = tokio::spawn(async move {
            if let Err(err) = server.await {
                eprintln!("test server error: {err}");
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                let _ = handle.await;
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn load_suite(path: &str, replacements: &[(&str, &str)]) -> TestSuite {
    let suite_path = manifest_dir().join("tests/fixtures").join(path);
    let mut content = fs::read_to_string(&suite_path)
        .unwrap_or_else(|e| panic!("failed to read {suite_path:?}: {e}"));
    for (placeholder, value) in replacements {
        content = content.replace(placeholder, value);
    }
    TestSuite::from_yaml(&content).unwrap_or_else(|e| panic!("failed to parse suite yaml: {e}"))
}

fn assert_all_passed(results: &webtest::Results) {
    assert!(results.success(), "run should succeed:\n{}", render_text(results).unwrap());
}

#[tokio::test]
async fn rest_steps_chain_values_through_properties() {
    let server = TestServer::spawn().await;
    let suite = load_suite("rest_chain.yaml", &[("__BASE_URL__", &server.base_url)]);
    let mut context = ExecutionContext::new(suite.config.clone());

    let results = Engine::new().run_tests(&suite.tests, &mut context).await;

    assert_all_passed(&results);
    assert_eq!(context.property("item_id"), Some("7"));
    assert_eq!(context.property("sent_owner"), Some("alice"));

    server.shutdown().await;
}

#[tokio::test]
async fn soap_plain_fault_and_mtom_responses() {
    let server = TestServer::spawn().await;
    let resources = manifest_dir().join("tests/resources");
    let suite = load_suite(
        "soap_weather.yaml",
        &[
            ("__BASE_URL__", &server.base_url),
            ("__RESOURCE_DIR__", &resources.display().to_string()),
        ],
    );
    let mut context = ExecutionContext::new(suite.config.clone());

    let results = Engine::new().run_tests(&suite.tests, &mut context).await;

    assert_all_passed(&results);
    assert_eq!(context.property("degrees"), Some("21"));
    assert_eq!(context.property("asked"), Some("Utrecht"));

    server.shutdown().await;
}

#[tokio::test]
async fn jdbc_suite_against_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("products.db");
    let connection = rusqlite_setup(&db);
    drop(connection);

    let suite = load_suite(
        "jdbc_products.yaml",
        &[("__DB_PATH__", &db.display().to_string())],
    );
    let results = Engine::new().run(&suite).await;

    assert_all_passed(&results);
    let steps = &results.tests[0].steps;
    assert_eq!(steps[0].validation_results.len(), 6);
    assert_eq!(steps[0].after_results.len(), 1);
}

fn rusqlite_setup(path: &std::path::Path) -> rusqlite::Connection {
    let connection = rusqlite::Connection::open(path).unwrap();
    connection
        .execute_batch("CREATE TABLE PRODUCT (ID INTEGER, NAME TEXT, COMMENT TEXT, CREATED TEXT);")
        .unwrap();
    let names = ["pen", "pencil", "paper", "eraser", "ruler", "stapler", "tape", "glue"];
    for (idx, name) in names.iter().enumerate() {
        let comment = match idx {
            0 | 5 => Some("duur"),
            1 => Some(""),
            _ => None,
        };
        connection
            .execute(
                "INSERT INTO PRODUCT VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    idx as i64,
                    name,
                    comment,
                    format!("2018-10-29 10:15:0{idx}")
                ],
            )
            .unwrap();
    }
    connection
}

#[tokio::test]
async fn failed_validation_is_reported_and_run_continues() {
    let server = TestServer::spawn().await;
    let mut configuration = TestConfiguration::default();
    configuration.rest.endpoint = Some(EndpointRef::Inline(Endpoint::new(format!(
        "{}/rest",
        server.base_url
    ))));
    let test = TestCase::new("missing")
        .step(
            RestStep::new(RestRequest::get("/missing"))
                .named("expect ok")
                .validate(RestValidator::HttpStatus(StatusRange::exact(200))),
        )
        .step(DelayStep::new(DelayRequest { millis: 1 }));
    let suite = TestSuite {
        config: configuration,
        ..TestSuite::new("failing")
    }
    .test(test);

    let results = Engine::new().run(&suite).await;

    assert!(!results.success());
    assert!(results.aborted.is_none());
    let steps = &results.tests[0].steps;
    assert_eq!(steps.len(), 2);
    assert!(steps[0].request_success);
    assert_eq!(
        steps[0].validation_results[0].message.as_deref(),
        Some("HTTP response code 404 not in range 200..200")
    );
    assert!(steps[1].success());
    let report = render_text(&results).unwrap();
    assert!(report.contains("[ FAIL ] - Step: expect ok (REST)"));

    server.shutdown().await;
}

#[tokio::test]
async fn missing_include_file_aborts_the_run() {
    let server = TestServer::spawn().await;
    let mut configuration = TestConfiguration::default();
    configuration.resource_dir = manifest_dir().join("tests/resources");
    configuration.soap.endpoint = Some(EndpointRef::Inline(Endpoint::new(format!(
        "{}/soap/weather",
        server.base_url
    ))));
    let suite = TestSuite {
        config: configuration,
        ..TestSuite::new("abort")
    }
    .test(TestCase::new("first").step(DelayStep::new(DelayRequest { millis: 0 })))
    .test(
        TestCase::new("second")
            .step(SoapStep::new(SoapRequest::text("<a>%{does-not-exist.bin}</a>")))
            .step(DelayStep::new(DelayRequest { millis: 0 })),
    )
    .test(TestCase::new("never").step(DelayStep::new(DelayRequest { millis: 0 })));

    let results = Engine::new().run(&suite).await;

    assert!(!results.success());
    assert_eq!(results.tests.len(), 2);
    assert!(results.tests[0].success());
    assert!(results.aborted.as_deref().unwrap().contains("does-not-exist.bin"));
    assert!(render_text(&results).unwrap().contains("[ABORT]"));

    server.shutdown().await;
}
