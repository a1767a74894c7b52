use crate::browser::{BrowserDriver, DriverResult, ElementHandle, Locator, Snapshot};
use crate::error::DriverError;
use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::thread;
use std::time::{Duration, Instant};
use url::Url;

// W3C WebDriver element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a07c-4f31b5d30c3e";
const ENTER_KEY: &str = "\u{E007}";

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Needed when Chrome runs as root.
    pub no_sandbox: bool,
    pub window_size: (u32, u32),
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        BrowserOptions {
            headless: false,
            no_sandbox: false,
            window_size: (1920, 1080),
            request_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl BrowserOptions {
    fn capabilities(&self) -> Value {
        let mut args = Vec::new();
        if self.headless {
            args.push("--headless=new".to_string());
            args.push(format!("--window-size={},{}", self.window_size.0, self.window_size.1));
            args.push("--enable-javascript".to_string());
        }
        if self.no_sandbox {
            args.push("--no-sandbox".to_string());
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

fn element_id(value: &Value) -> Option<String> {
    value.get(ELEMENT_KEY)?.as_str().map(String::from)
}

fn wire_error(status: u16, body: &Value) -> DriverError {
    let error = body.pointer("/value/error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = body.pointer("/value/message").and_then(Value::as_str).unwrap_or("");
    DriverError::Protocol {
        status,
        message: format!("{}: {}", error, message),
    }
}

fn is_missing_element(err: &DriverError) -> bool {
    matches!(err, DriverError::Protocol { message, .. }
        if message.starts_with("no such element") || message.starts_with("stale element reference"))
}

/// A browser session held by a WebDriver server such as chromedriver.
pub struct WebDriverSession {
    client: Client,
    endpoint: String,
    session_id: String,
    poll_interval: Duration,
    closed: bool,
}

impl WebDriverSession {
    /// Opens a new browser session at `endpoint` (e.g. `http://localhost:9515`).
    pub fn connect(endpoint: &str, options: &BrowserOptions) -> DriverResult<Self> {
        let base = Url::parse(endpoint)
            .map_err(|e| DriverError::Network(format!("invalid WebDriver URL '{}': {}", endpoint, e)))?;
        let client = Client::builder().timeout(options.request_timeout).build()?;

        let endpoint = base.as_str().trim_end_matches('/').to_string();
        let request = client.post(format!("{}/session", endpoint)).json(&options.capabilities());
        let value = Self::send(request)?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol {
                status: 200,
                message: "new session response without sessionId".to_string(),
            })?
            .to_string();
        info!("Browser session {} started via {}", session_id, endpoint);

        let session = WebDriverSession {
            client,
            endpoint,
            session_id,
            poll_interval: options.poll_interval,
            closed: false,
        };
        if !options.headless {
            session.post("/window/maximize", json!({}))?;
        }
        Ok(session)
    }

    fn send(request: RequestBuilder) -> DriverResult<Value> {
        let resp = request.send()?;
        let status = resp.status();
        let text = resp.text()?;
        let mut body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| DriverError::Protocol {
                status: status.as_u16(),
                message: format!("unreadable response: {}", e),
            })?
        };

        if !status.is_success() {
            return Err(wire_error(status.as_u16(), &body));
        }
        Ok(body.get_mut("value").map(Value::take).unwrap_or(Value::Null))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.endpoint, self.session_id, path)
    }

    fn post(&self, path: &str, body: Value) -> DriverResult<Value> {
        Self::send(self.client.post(self.url(path)).json(&body))
    }

    fn get(&self, path: &str) -> DriverResult<Value> {
        Self::send(self.client.get(self.url(path)))
    }

    // Element lookups carry their own limit so one slow reply cannot outlast
    // the caller's deadline.
    fn find(&self, locator: &Locator, limit: Duration) -> DriverResult<Option<ElementHandle>> {
        let (using, value) = locator.strategy();
        let request = self
            .client
            .post(self.url("/element"))
            .json(&json!({ "using": using, "value": value }))
            .timeout(limit);
        match Self::send(request) {
            Ok(found) => element_id(&found)
                .map(|id| Some(ElementHandle(id)))
                .ok_or_else(|| DriverError::Protocol {
                    status: 200,
                    message: format!("element response without reference for {}", locator),
                }),
            Err(e) if is_missing_element(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn is_displayed(&self, element: &ElementHandle, limit: Duration) -> DriverResult<bool> {
        let request = self
            .client
            .get(self.url(&format!("/element/{}/displayed", element.0)))
            .timeout(limit);
        match Self::send(request) {
            Ok(value) => Ok(value.as_bool().unwrap_or(false)),
            Err(e) if is_missing_element(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl BrowserDriver for WebDriverSession {
    fn navigate(&mut self, url: &str) -> DriverResult<()> {
        debug!("Navigating to {}", url);
        self.post("/url", json!({ "url": url }))?;
        Ok(())
    }

    fn scroll_to(&mut self, offset: u32) -> DriverResult<()> {
        self.post(
            "/execute/sync",
            json!({ "script": "window.scrollTo(0, arguments[0]);", "args": [offset] }),
        )?;
        Ok(())
    }

    fn locate(&mut self, locator: &Locator, timeout: Duration) -> DriverResult<ElementHandle> {
        let deadline = Instant::now() + timeout;
        let timed_out = || DriverError::Timeout(locator.to_string());
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out());
            }
            let found = match self.find(locator, remaining) {
                Err(DriverError::Timeout(_)) => return Err(timed_out()),
                Err(_) if Instant::now() >= deadline => return Err(timed_out()),
                other => other?,
            };
            if let Some(element) = found {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(timed_out());
                }
                match self.is_displayed(&element, remaining) {
                    Ok(true) => return Ok(element),
                    Ok(false) => {}
                    Err(DriverError::Timeout(_)) => return Err(timed_out()),
                    Err(_) if Instant::now() >= deadline => return Err(timed_out()),
                    Err(e) => return Err(e),
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out());
            }
            thread::sleep(self.poll_interval.min(remaining));
        }
    }

    fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.post(&format!("/element/{}/click", element.0), json!({}))?;
        Ok(())
    }

    fn clear(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.post(&format!("/element/{}/clear", element.0), json!({}))?;
        Ok(())
    }

    fn type_text(&mut self, element: &ElementHandle, text: &str, per_char_delay: Duration) -> DriverResult<()> {
        let path = format!("/element/{}/value", element.0);
        for character in text.chars() {
            self.post(&path, json!({ "text": character.to_string() }))?;
            if !per_char_delay.is_zero() {
                thread::sleep(per_char_delay);
            }
        }
        Ok(())
    }

    fn press_enter(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.post(&format!("/element/{}/value", element.0), json!({ "text": ENTER_KEY }))?;
        Ok(())
    }

    fn current_snapshot(&mut self) -> DriverResult<Snapshot> {
        let source = self.get("/source")?;
        match source {
            Value::String(html) => Ok(Snapshot::new(html)),
            other => Err(DriverError::Protocol {
                status: 200,
                message: format!("page source is not a string: {}", other),
            }),
        }
    }

    fn quit(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        Self::send(self.client.delete(self.url("")))?;
        self.closed = true;
        info!("Browser session {} closed", self.session_id);
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if let Err(e) = self.quit() {
            warn!("Failed to close browser session {}: {}", self.session_id, e);
        }
    }
}
