//! Automation driver facade
//!
//! The batch engine and form filler only talk to a browser through this
//! trait. The production implementation speaks W3C WebDriver; tests use a
//! scripted in-memory driver.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// W3C key under which element references are exchanged
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Automation errors
#[derive(Debug, Clone, Error)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Browser session missing, closed or failed to start
    #[error("Session error: {0}")]
    Session(String),

    #[error("Script error: {0}")]
    Script(String),

    /// Driver returned something outside the protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Opaque reference to an element in the current tab
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl ElementRef {
    /// Form used to pass this element as a script argument
    pub fn to_script_arg(&self) -> Value {
        json!({ ELEMENT_KEY: self.0 })
    }
}

/// Element position and size in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Browser capability used by the song creation flow
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Open `count` tabs on `url`; returns their handles in order
    async fn open_tabs(&self, url: &str, count: usize) -> Result<Vec<String>, AutomationError>;

    async fn switch_to_tab(&self, handle: &str) -> Result<(), AutomationError>;

    /// Locate one element, polling until `wait` elapses
    async fn find_element(&self, xpath: &str, wait: Duration) -> Result<ElementRef, AutomationError>;

    /// Every element currently matching (no wait)
    async fn find_elements(&self, xpath: &str) -> Result<Vec<ElementRef>, AutomationError>;

    async fn click(&self, element: &ElementRef) -> Result<(), AutomationError>;

    /// Clear a field and type `text` into it
    async fn set_text(&self, element: &ElementRef, text: &str) -> Result<(), AutomationError>;

    async fn text(&self, element: &ElementRef) -> Result<String, AutomationError>;

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>, AutomationError>;

    async fn rect(&self, element: &ElementRef) -> Result<ElementRect, AutomationError>;

    /// Press on the element's center, move horizontally by `x_offset`, release
    async fn drag_by(&self, element: &ElementRef, x_offset: i64) -> Result<(), AutomationError>;

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, AutomationError>;

    async fn current_url(&self) -> Result<String, AutomationError>;

    /// Tear down the whole browser session; safe to call more than once
    async fn close(&self) -> Result<(), AutomationError>;
}

/// Starts one driver per batch, bound to an account's browser profile
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self, profile_dir: &Path) -> Result<Arc<dyn AutomationDriver>, AutomationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_script_arg() {
        let arg = ElementRef("abc".into()).to_script_arg();
        assert_eq!(arg[ELEMENT_KEY], "abc");
    }
}
