//! Minimal W3C WebDriver client
//!
//! Covers the handful of commands the locator needs (new session, navigate,
//! find, clear, type, click, page source, delete session) over `reqwest`.

use serde_json::{json, Value};
use std::time::Duration;

use super::LocatorError;

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// WebDriver endpoint client
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    http: reqwest::Client,
    base_url: String,
    browser_args: Vec<String>,
}

impl WebDriverClient {
    pub fn new(base_url: &str, browser_args: Vec<String>) -> Result<Self, LocatorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LocatorError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            browser_args,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Session creation payload
    pub fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": self.browser_args }
                }
            }
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, LocatorError> {
        let response = request
            .send()
            .await
            .map_err(|e| LocatorError::Transport(e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| LocatorError::Transport(e.to_string()))?;

        let value = body.get("value").cloned().unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(error_from_value(&value, status.as_u16()));
        }
        Ok(value)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, LocatorError> {
        self.send(self.http.post(self.url(path)).json(&body)).await
    }

    async fn get(&self, path: &str) -> Result<Value, LocatorError> {
        self.send(self.http.get(self.url(path))).await
    }

    async fn delete(&self, path: &str) -> Result<Value, LocatorError> {
        self.send(self.http.delete(self.url(path))).await
    }

    /// Start a browser session
    pub async fn new_session(&self) -> Result<BrowserSession, LocatorError> {
        let value = self.post("/session", self.capabilities()).await?;
        let id = value
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LocatorError::Session("Missing sessionId in response".to_string()))?
            .to_string();

        tracing::debug!(session = %id, "WebDriver session started");

        Ok(BrowserSession {
            client: self.clone(),
            id,
            closed: false,
        })
    }
}

/// Error carried in a WebDriver error response body
fn error_from_value(value: &Value, status: u16) -> LocatorError {
    let error = value
        .get("error")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    if error == "no such element" {
        LocatorError::ElementNotFound(message.to_string())
    } else {
        LocatorError::WebDriver {
            error: format!("{} (HTTP {})", error, status),
            message: message.to_string(),
        }
    }
}

/// Exclusive browser session
///
/// Call [`BrowserSession::quit`] when done. If the session is dropped without
/// quitting (early return or task cancellation) the delete request is spawned
/// on the current runtime.
pub struct BrowserSession {
    client: WebDriverClient,
    id: String,
    closed: bool,
}

impl BrowserSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{}", self.id, suffix)
    }

    pub async fn goto(&self, url: &str) -> Result<(), LocatorError> {
        self.client.post(&self.path("/url"), json!({ "url": url })).await?;
        Ok(())
    }

    /// First element matching a CSS selector
    pub async fn find(&self, css: &str) -> Result<String, LocatorError> {
        let value = self
            .client
            .post(
                &self.path("/element"),
                json!({ "using": "css selector", "value": css }),
            )
            .await
            .map_err(|e| match e {
                LocatorError::ElementNotFound(_) => LocatorError::ElementNotFound(css.to_string()),
                other => other,
            })?;
        element_id(&value).ok_or_else(|| LocatorError::ElementNotFound(css.to_string()))
    }

    /// All elements matching a CSS selector
    pub async fn find_all(&self, css: &str) -> Result<Vec<String>, LocatorError> {
        let value = self
            .client
            .post(
                &self.path("/elements"),
                json!({ "using": "css selector", "value": css }),
            )
            .await?;
        Ok(value
            .as_array()
            .map(|items| items.iter().filter_map(element_id).collect())
            .unwrap_or_default())
    }

    pub async fn clear(&self, element: &str) -> Result<(), LocatorError> {
        self.client
            .post(&self.path(&format!("/element/{}/clear", element)), json!({}))
            .await?;
        Ok(())
    }

    pub async fn send_keys(&self, element: &str, text: &str) -> Result<(), LocatorError> {
        self.client
            .post(
                &self.path(&format!("/element/{}/value", element)),
                json!({ "text": text }),
            )
            .await?;
        Ok(())
    }

    pub async fn click(&self, element: &str) -> Result<(), LocatorError> {
        self.client
            .post(&self.path(&format!("/element/{}/click", element)), json!({}))
            .await?;
        Ok(())
    }

    pub async fn page_source(&self) -> Result<String, LocatorError> {
        let value = self.client.get(&self.path("/source")).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LocatorError::Session("Page source was not a string".to_string()))
    }

    /// Close the browser
    pub async fn quit(mut self) -> Result<(), LocatorError> {
        self.closed = true;
        self.client.delete(&format!("/session/{}", self.id)).await?;
        tracing::debug!(session = %self.id, "WebDriver session closed");
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let client = self.client.clone();
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.delete(&format!("/session/{}", id)).await {
                        tracing::warn!(session = %id, error = %e, "Failed to close abandoned WebDriver session");
                    }
                });
            },
            Err(_) => {
                tracing::warn!(session = %id, "WebDriver session dropped outside a runtime");
            },
        }
    }
}

fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        let client = WebDriverClient::new(
            "http://127.0.0.1:9515/",
            vec!["--headless".to_string(), "--no-sandbox".to_string()],
        )
        .unwrap();

        assert_eq!(client.url("/session"), "http://127.0.0.1:9515/session");
        let caps = client.capabilities();
        assert_eq!(caps["capabilities"]["alwaysMatch"]["browserName"], "chrome");
        assert_eq!(
            caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"],
            json!(["--headless", "--no-sandbox"])
        );
    }

    #[test]
    fn test_element_id() {
        let value = json!({ "element-6066-11e4-a52e-4f735466cecf": "abc-123" });
        assert_eq!(element_id(&value).as_deref(), Some("abc-123"));
        assert_eq!(element_id(&json!({})), None);
    }

    #[test]
    fn test_error_mapping() {
        let missing = error_from_value(
            &json!({"error": "no such element", "message": "Unable to locate"}),
            404,
        );
        assert!(matches!(missing, LocatorError::ElementNotFound(_)));

        let other = error_from_value(
            &json!({"error": "session not created", "message": "Chrome failed to start"}),
            500,
        );
        assert_eq!(
            other.to_string(),
            "WebDriver error session not created (HTTP 500): Chrome failed to start"
        );
    }

    #[tokio::test]
    async fn test_unreachable_driver() {
        let client = WebDriverClient::new("http://127.0.0.1:1", Vec::new()).unwrap();
        assert!(matches!(
            client.new_session().await,
            Err(LocatorError::Transport(_))
        ));
    }
}
