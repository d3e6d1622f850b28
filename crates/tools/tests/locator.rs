//! Provider locator against an in-process WebDriver endpoint

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use chia_config::LocatorConfig;
use chia_tools::{LocatorError, ProviderDirectory, ProviderLocator, SearchProviderTool, Tool};

const RESULTS_PAGE: &str = r#"<html><body>
<div class="locator-results-item">
  <h3>Providence Clinic</h3>
  <span>375 Allens Ave, Providence, RI 02906</span>
  <span>(401) 444-0000</span>
  <span>Distance from your location: 5.2 miles</span>
</div>
<div class="locator-results-item">
  <h3>Boston Health</h3>
  <span>1 Boylston St, Boston, MA 02116</span>
  <span>(617) 555-0100</span>
  <span>Distance from your location: 45 miles</span>
</div>
</body></html>"#;

#[derive(Default)]
struct Driver {
    calls: Mutex<Vec<String>>,
    fail_click: bool,
    stall_source: bool,
}

impl Driver {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

fn value(value: Value) -> Json<Value> {
    Json(json!({ "value": value }))
}

async fn new_session(State(driver): State<Arc<Driver>>) -> Json<Value> {
    driver.record("new");
    value(json!({ "sessionId": "session-1", "capabilities": {} }))
}

async fn navigate(State(driver): State<Arc<Driver>>, Json(body): Json<Value>) -> Json<Value> {
    driver.record(format!("goto:{}", body["url"].as_str().unwrap_or_default()));
    value(Value::Null)
}

async fn find_element() -> Json<Value> {
    value(json!({ "element-6066-11e4-a52e-4f735466cecf": "element-1" }))
}

async fn find_elements() -> Json<Value> {
    value(json!([
        { "element-6066-11e4-a52e-4f735466cecf": "result-1" },
        { "element-6066-11e4-a52e-4f735466cecf": "result-2" }
    ]))
}

async fn clear(State(driver): State<Arc<Driver>>) -> Json<Value> {
    driver.record("clear");
    value(Value::Null)
}

async fn send_keys(State(driver): State<Arc<Driver>>, Json(body): Json<Value>) -> Json<Value> {
    driver.record(format!("keys:{}", body["text"].as_str().unwrap_or_default()));
    value(Value::Null)
}

async fn click(State(driver): State<Arc<Driver>>) -> Response {
    driver.record("click");
    if driver.fail_click {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            value(json!({ "error": "unknown error", "message": "boom" })),
        )
            .into_response();
    }
    value(Value::Null).into_response()
}

async fn page_source(State(driver): State<Arc<Driver>>) -> Json<Value> {
    driver.record("source");
    if driver.stall_source {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
    value(json!(RESULTS_PAGE))
}

async fn quit(State(driver): State<Arc<Driver>>) -> Json<Value> {
    driver.record("quit");
    value(Value::Null)
}

async fn spawn_driver(driver: Arc<Driver>) -> String {
    let app = Router::new()
        .route("/session", post(new_session))
        .route("/session/:id", delete(quit))
        .route("/session/:id/url", post(navigate))
        .route("/session/:id/element", post(find_element))
        .route("/session/:id/elements", post(find_elements))
        .route("/session/:id/element/:element/clear", post(clear))
        .route("/session/:id/element/:element/value", post(send_keys))
        .route("/session/:id/element/:element/click", post(click))
        .route("/session/:id/source", get(page_source))
        .with_state(driver);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn locator(webdriver_url: String) -> ProviderLocator {
    ProviderLocator::new(LocatorConfig {
        webdriver_url,
        base_url: "https://directory.test/".to_string(),
        page_load_wait_ms: 0,
        results_wait_ms: 500,
        poll_interval_ms: 10,
        ..LocatorConfig::default()
    })
    .unwrap()
}

async fn wait_for_call(driver: &Driver, call: &str) -> bool {
    for _ in 0..100 {
        if driver.calls().iter().any(|c| c == call) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_search_keeps_providers_within_radius() {
    let driver = Arc::new(Driver::default());
    let locator = locator(spawn_driver(driver.clone()).await);

    let records = locator.locate_providers(" 02906 ").await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "Providence Clinic");
    assert_eq!(records[0].phone, "(401) 444-0000");
    assert_eq!(records[0].distance_miles, Some(5.2));

    assert_eq!(
        driver.calls(),
        vec![
            "new",
            "goto:https://directory.test/",
            "clear",
            "keys:02906",
            "click",
            "source",
            "quit",
        ]
    );
    assert_eq!(locator.available_sessions(), 2);
}

#[tokio::test]
async fn test_driver_failure_still_closes_session() {
    let driver = Arc::new(Driver {
        fail_click: true,
        ..Driver::default()
    });
    let locator = locator(spawn_driver(driver.clone()).await);

    let err = locator.locate_providers("02906").await.unwrap_err();

    assert!(matches!(err, LocatorError::WebDriver { .. }));
    assert_eq!(
        err.to_string(),
        "WebDriver error unknown error (HTTP 500): boom"
    );
    let calls = driver.calls();
    assert_eq!(calls.last().map(String::as_str), Some("quit"));
    assert!(!calls.iter().any(|c| c == "source"));
    assert_eq!(locator.available_sessions(), 2);
}

#[tokio::test]
async fn test_driver_failure_is_tool_payload() {
    let driver = Arc::new(Driver {
        fail_click: true,
        ..Driver::default()
    });
    let tool = SearchProviderTool::new(Arc::new(locator(spawn_driver(driver).await)));

    let output = tool.execute(json!({ "zip_code": "02906" })).await.unwrap();

    assert!(output.is_error);
    let payload: Value = serde_json::from_str(&output.text_content()).unwrap();
    assert!(payload["error"].as_str().unwrap().contains("boom"));
}

#[tokio::test]
async fn test_cancelled_search_deletes_session() {
    let driver = Arc::new(Driver {
        stall_source: true,
        ..Driver::default()
    });
    let locator = locator(spawn_driver(driver.clone()).await);

    let outcome =
        tokio::time::timeout(Duration::from_millis(300), locator.locate_providers("02906")).await;
    assert!(outcome.is_err());

    assert!(wait_for_call(&driver, "quit").await);
    assert_eq!(locator.available_sessions(), 2);
}
