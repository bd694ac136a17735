//! W3C WebDriver implementation of the automation facade
//!
//! Talks JSON over HTTP to a running chromedriver. One `WebDriverSession`
//! is one browser instance bound to one account profile directory.

use super::driver::{AutomationDriver, AutomationError, DriverFactory, ElementRect, ElementRef, ELEMENT_KEY};
use crate::config::StudioSettings;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches chromedriver sessions with the configured browser arguments
pub struct WebDriverFactory {
    http_client: reqwest::Client,
    settings: StudioSettings,
}

impl WebDriverFactory {
    pub fn new(settings: StudioSettings) -> Result<Self, AutomationError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AutomationError::Http(e.to_string()))?;
        Ok(Self {
            http_client,
            settings,
        })
    }

    fn capabilities(&self, profile_dir: &Path) -> Value {
        let mut args: Vec<String> = self.settings.chrome_args.clone();
        args.push(format!("--user-data-dir={}", profile_dir.display()));
        args.push(format!("--user-agent={}", self.settings.user_agent));
        if self.settings.headless {
            args.push("--headless=new".to_string());
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "excludeSwitches": ["enable-automation"],
                        "useAutomationExtension": false
                    }
                }
            }
        })
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn launch(&self, profile_dir: &Path) -> Result<Arc<dyn AutomationDriver>, AutomationError> {
        let base_url = self.settings.webdriver_url.trim_end_matches('/').to_string();
        let response = self
            .http_client
            .post(format!("{}/session", base_url))
            .json(&self.capabilities(profile_dir))
            .send()
            .await
            .map_err(|e| AutomationError::Session(format!("cannot reach webdriver: {}", e)))?;
        let body = decode(response).await?;

        let session_id = body
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AutomationError::Protocol("new session response has no sessionId".into()))?
            .to_string();

        info!(
            session_id = %session_id,
            profile = %profile_dir.display(),
            headless = self.settings.headless,
            "Browser session started"
        );

        Ok(Arc::new(WebDriverSession {
            http_client: self.http_client.clone(),
            base_url,
            session_id: RwLock::new(Some(session_id)),
        }))
    }
}

/// Unwrap a W3C response: `{"value": ...}` on success, `{"value": {"error", "message"}}` on failure
async fn decode(response: reqwest::Response) -> Result<Value, AutomationError> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| AutomationError::Protocol(format!("invalid JSON from webdriver: {}", e)))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();
    Err(match error {
        "no such element" | "stale element reference" => AutomationError::ElementNotFound(message),
        "timeout" | "script timeout" => AutomationError::Timeout(message),
        "invalid session id" | "session not created" | "no such window" => AutomationError::Session(message),
        "javascript error" => AutomationError::Script(message),
        other => AutomationError::Protocol(format!("{}: {}", other, message)),
    })
}

pub struct WebDriverSession {
    http_client: reqwest::Client,
    base_url: String,
    session_id: RwLock<Option<String>>,
}

impl WebDriverSession {
    async fn session_url(&self, path: &str) -> Result<String, AutomationError> {
        let session = self.session_id.read().await;
        let id = session
            .as_deref()
            .ok_or_else(|| AutomationError::Session("session closed".into()))?;
        Ok(format!("{}/session/{}{}", self.base_url, id, path))
    }

    async fn get(&self, path: &str) -> Result<Value, AutomationError> {
        let url = self.session_url(path).await?;
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| AutomationError::Http(e.to_string()))?;
        decode(response).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, AutomationError> {
        let url = self.session_url(path).await?;
        let response = self
            .http_client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AutomationError::Http(e.to_string()))?;
        decode(response).await
    }

    async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        self.post("/url", json!({ "url": url })).await.map(|_| ())
    }

    fn element_from(value: &Value) -> Result<ElementRef, AutomationError> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| ElementRef(id.to_string()))
            .ok_or_else(|| AutomationError::Protocol("element reference missing".into()))
    }
}

#[async_trait]
impl AutomationDriver for WebDriverSession {
    async fn open_tabs(&self, url: &str, count: usize) -> Result<Vec<String>, AutomationError> {
        let mut handles = Vec::with_capacity(count);
        if count == 0 {
            return Ok(handles);
        }

        let first = self.get("/window").await?;
        let first = first
            .as_str()
            .ok_or_else(|| AutomationError::Protocol("window handle is not a string".into()))?
            .to_string();
        self.navigate(url).await?;
        handles.push(first);

        for _ in 1..count {
            let created = self.post("/window/new", json!({ "type": "tab" })).await?;
            let handle = created
                .get("handle")
                .and_then(Value::as_str)
                .ok_or_else(|| AutomationError::Protocol("new window has no handle".into()))?
                .to_string();
            self.switch_to_tab(&handle).await?;
            self.navigate(url).await?;
            handles.push(handle);
        }
        debug!(tabs = handles.len(), url = %url, "Tabs opened");
        Ok(handles)
    }

    async fn switch_to_tab(&self, handle: &str) -> Result<(), AutomationError> {
        self.post("/window", json!({ "handle": handle })).await.map(|_| ())
    }

    async fn find_element(&self, xpath: &str, wait: Duration) -> Result<ElementRef, AutomationError> {
        let deadline = Instant::now() + wait;
        loop {
            match self
                .post("/element", json!({ "using": "xpath", "value": xpath }))
                .await
            {
                Ok(value) => return Self::element_from(&value),
                Err(AutomationError::ElementNotFound(_)) if Instant::now() < deadline => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(AutomationError::ElementNotFound(_)) => {
                    return Err(AutomationError::ElementNotFound(xpath.to_string()))
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn find_elements(&self, xpath: &str) -> Result<Vec<ElementRef>, AutomationError> {
        let value = self
            .post("/elements", json!({ "using": "xpath", "value": xpath }))
            .await?;
        value
            .as_array()
            .map(|items| items.iter().map(Self::element_from).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn click(&self, element: &ElementRef) -> Result<(), AutomationError> {
        self.post(&format!("/element/{}/click", element.0), json!({}))
            .await
            .map(|_| ())
    }

    async fn set_text(&self, element: &ElementRef, text: &str) -> Result<(), AutomationError> {
        self.post(&format!("/element/{}/clear", element.0), json!({}))
            .await?;
        self.post(&format!("/element/{}/value", element.0), json!({ "text": text }))
            .await
            .map(|_| ())
    }

    async fn text(&self, element: &ElementRef) -> Result<String, AutomationError> {
        let value = self.get(&format!("/element/{}/text", element.0)).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, AutomationError> {
        let value = self
            .get(&format!("/element/{}/attribute/{}", element.0, name))
            .await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn rect(&self, element: &ElementRef) -> Result<ElementRect, AutomationError> {
        let value = self.get(&format!("/element/{}/rect", element.0)).await?;
        let field = |name: &str| value.get(name).and_then(Value::as_f64).unwrap_or(0.0);
        Ok(ElementRect {
            x: field("x"),
            y: field("y"),
            width: field("width"),
            height: field("height"),
        })
    }

    async fn drag_by(&self, element: &ElementRef, x_offset: i64) -> Result<(), AutomationError> {
        let actions = json!({
            "actions": [{
                "type": "pointer",
                "id": "mouse",
                "parameters": { "pointerType": "mouse" },
                "actions": [
                    { "type": "pointerMove", "duration": 0, "origin": element.to_script_arg(), "x": 0, "y": 0 },
                    { "type": "pointerDown", "button": 0 },
                    { "type": "pointerMove", "duration": 150, "origin": "pointer", "x": x_offset, "y": 0 },
                    { "type": "pointerUp", "button": 0 }
                ]
            }]
        });
        self.post("/actions", actions).await?;
        // Release input state so the next action starts clean
        let url = self.session_url("/actions").await?;
        if let Err(e) = self.http_client.delete(url).send().await {
            debug!(error = %e, "Failed to release pointer actions");
        }
        Ok(())
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, AutomationError> {
        self.post("/execute/sync", json!({ "script": script, "args": args }))
            .await
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        let value = self.get("/url").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> Result<(), AutomationError> {
        let Some(id) = self.session_id.write().await.take() else {
            return Ok(());
        };
        let url = format!("{}/session/{}", self.base_url, id);
        match self.http_client.delete(url).send().await {
            Ok(_) => {
                info!(session_id = %id, "Browser session closed");
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "Failed to close browser session");
                Err(AutomationError::Http(e.to_string()))
            }
        }
    }
}
