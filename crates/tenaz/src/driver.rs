//! Page driver seam.
//!
//! The resolver only ever talks to a [`PageDriver`]: navigate, read the URL,
//! query every element matching one [`Selector`], take a screenshot, close.
//! Element state comes back as plain [`ElementSnapshot`] values, so the
//! resolver never holds live DOM handles across polls.
//!
//! Implementations:
//!
//! - [`MockDriver`]: in-memory page with timed element appearance and failure
//!   injection, driven by the tokio clock
//! - `ChromiumDriver` (feature `browser`): CDP via chromiumoxide

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::result::{TenazError, TenazResult};
use crate::selector::Selector;

/// Observable state of an element at query time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementState {
    /// Rendered with a non-empty box and not hidden by style
    pub visible: bool,
    /// Not disabled (directly, via fieldset, or `aria-disabled`)
    pub enabled: bool,
    /// Accepts text input
    pub editable: bool,
    /// Checkbox/radio/`aria-checked` state; `None` when not checkable
    pub checked: Option<bool>,
}

impl Default for ElementState {
    fn default() -> Self {
        Self {
            visible: true,
            enabled: true,
            editable: false,
            checked: None,
        }
    }
}

impl ElementState {
    /// Present in the DOM but not visible
    #[must_use]
    pub const fn hidden() -> Self {
        Self {
            visible: false,
            enabled: true,
            editable: false,
            checked: None,
        }
    }

    /// Set visibility
    #[must_use]
    pub const fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Set enabled flag
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set editable flag
    #[must_use]
    pub const fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    /// Set checked state
    #[must_use]
    pub const fn with_checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }
}

/// Read-only view of one element, as returned by [`PageDriver::query_all`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Lowercase tag name
    pub tag: String,
    /// Explicit or implicit ARIA role
    #[serde(default)]
    pub role: Option<String>,
    /// Accessible name
    #[serde(default)]
    pub name: String,
    /// Whitespace-normalized rendered text
    #[serde(default)]
    pub text: String,
    /// Associated label text
    #[serde(default)]
    pub label: Option<String>,
    /// DOM attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// State flags
    #[serde(default)]
    pub state: ElementState,
}

impl ElementSnapshot {
    /// Create a visible, enabled element with the given tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            role: None,
            name: String::new(),
            text: String::new(),
            label: None,
            attributes: BTreeMap::new(),
            state: ElementState::default(),
        }
    }

    /// Set ARIA role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set accessible name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set label text
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Replace the state flags
    #[must_use]
    pub const fn with_state(mut self, state: ElementState) -> Self {
        self.state = state;
        self
    }

    /// Attribute value
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

impl fmt::Display for ElementSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        if let Some(id) = self.attribute("id") {
            write!(f, " id=\"{id}\"")?;
        }
        if let Some(role) = &self.role {
            write!(f, " role={role}")?;
        }
        if !self.name.is_empty() {
            write!(f, " name=\"{}\"", self.name)?;
        }
        write!(
            f,
            "> visible={} enabled={} editable={}",
            self.state.visible, self.state.enabled, self.state.editable
        )?;
        if let Some(checked) = self.state.checked {
            write!(f, " checked={checked}")?;
        }
        Ok(())
    }
}

/// Screenshot data with metadata
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Raw PNG data
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Timestamp when screenshot was taken
    pub timestamp: std::time::SystemTime,
}

impl Screenshot {
    /// Create a new screenshot
    #[must_use]
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: std::time::SystemTime::now(),
        }
    }

    /// Get the size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check if screenshot is valid (has data)
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && self.width > 0 && self.height > 0
    }
}

/// Browser launch options
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Device scale factor
    pub device_scale_factor: f64,
    /// Emulate a mobile device
    pub is_mobile: bool,
    /// Emulate touch support
    pub has_touch: bool,
    /// User agent string
    pub user_agent: Option<String>,
    /// Timeout for navigation and CDP requests
    pub navigation_timeout: Duration,
    /// Path to chromium binary (None = auto-detect)
    pub executable_path: Option<PathBuf>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            device_scale_factor: 1.0,
            is_mobile: false,
            has_touch: false,
            user_agent: None,
            navigation_timeout: Duration::from_secs(30),
            executable_path: None,
            sandbox: true,
        }
    }
}

impl BrowserConfig {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set user agent
    #[must_use]
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set navigation timeout
    #[must_use]
    pub const fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Apply a device descriptor's viewport, scale, input and user agent
    #[must_use]
    pub fn with_device(mut self, device: &DeviceDescriptor) -> Self {
        self.viewport_width = device.viewport_width;
        self.viewport_height = device.viewport_height;
        self.device_scale_factor = device.device_scale_factor;
        self.is_mobile = device.is_mobile;
        self.has_touch = device.has_touch;
        self.user_agent = Some(device.user_agent.to_string());
        self
    }
}

/// Device descriptor for emulation
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    /// Device name
    pub name: &'static str,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Device scale factor
    pub device_scale_factor: f64,
    /// Is mobile device
    pub is_mobile: bool,
    /// Has touch support
    pub has_touch: bool,
    /// Default user agent
    pub user_agent: &'static str,
}

impl DeviceDescriptor {
    /// Desktop Chrome
    pub const DESKTOP_CHROME: Self = Self {
        name: "Desktop Chrome",
        viewport_width: 1280,
        viewport_height: 720,
        device_scale_factor: 1.0,
        is_mobile: false,
        has_touch: false,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    };

    /// Desktop Firefox
    pub const DESKTOP_FIREFOX: Self = Self {
        name: "Desktop Firefox",
        viewport_width: 1280,
        viewport_height: 720,
        device_scale_factor: 1.0,
        is_mobile: false,
        has_touch: false,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    };

    /// Desktop Safari
    pub const DESKTOP_SAFARI: Self = Self {
        name: "Desktop Safari",
        viewport_width: 1280,
        viewport_height: 720,
        device_scale_factor: 2.0,
        is_mobile: false,
        has_touch: false,
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    };

    /// Pixel 5
    pub const PIXEL_5: Self = Self {
        name: "Pixel 5",
        viewport_width: 393,
        viewport_height: 851,
        device_scale_factor: 2.75,
        is_mobile: true,
        has_touch: true,
        user_agent: "Mozilla/5.0 (Linux; Android 11; Pixel 5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    };

    /// iPhone 13
    pub const IPHONE_13: Self = Self {
        name: "iPhone 13",
        viewport_width: 390,
        viewport_height: 844,
        device_scale_factor: 3.0,
        is_mobile: true,
        has_touch: true,
        user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 15_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.0 Mobile/15E148 Safari/604.1",
    };

    /// Convert to launch options
    #[must_use]
    pub fn to_config(&self) -> BrowserConfig {
        BrowserConfig::default().with_device(self)
    }
}

/// Abstract page driver
///
/// # Implementations
///
/// - `ChromiumDriver` - CDP via chromiumoxide (feature `browser`)
/// - [`MockDriver`] - in-memory page for unit tests
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to URL
    async fn navigate(&mut self, url: &str) -> TenazResult<()>;

    /// Get current URL
    async fn current_url(&self) -> TenazResult<String>;

    /// Snapshot every element matching `selector`, in document order
    async fn query_all(&self, selector: &Selector) -> TenazResult<Vec<ElementSnapshot>>;

    /// Take screenshot
    async fn screenshot(&self) -> TenazResult<Screenshot>;

    /// Close the page and release the browser
    async fn close(&mut self) -> TenazResult<()>;
}

/// Driver chosen at runtime (what a `DriverFactory` hands out)
pub type BoxedDriver = Box<dyn PageDriver>;

#[async_trait]
impl<P: PageDriver + ?Sized> PageDriver for Box<P> {
    async fn navigate(&mut self, url: &str) -> TenazResult<()> {
        (**self).navigate(url).await
    }

    async fn current_url(&self) -> TenazResult<String> {
        (**self).current_url().await
    }

    async fn query_all(&self, selector: &Selector) -> TenazResult<Vec<ElementSnapshot>> {
        (**self).query_all(selector).await
    }

    async fn screenshot(&self) -> TenazResult<Screenshot> {
        (**self).screenshot().await
    }

    async fn close(&mut self) -> TenazResult<()> {
        (**self).close().await
    }
}

/// An element on a [`MockDriver`] page with optional timed transitions.
///
/// Offsets are measured on the tokio clock from the moment the driver was created.
#[derive(Debug, Clone)]
pub struct MockElement {
    snapshot: ElementSnapshot,
    appear_after: Duration,
    visible_after: Option<Duration>,
    enabled_after: Option<Duration>,
    detach_after: Option<Duration>,
}

impl MockElement {
    /// Element present from the start
    #[must_use]
    pub const fn new(snapshot: ElementSnapshot) -> Self {
        Self {
            snapshot,
            appear_after: Duration::ZERO,
            visible_after: None,
            enabled_after: None,
            detach_after: None,
        }
    }

    /// Attach to the DOM only after `delay`
    #[must_use]
    pub const fn appear_after(mut self, delay: Duration) -> Self {
        self.appear_after = delay;
        self
    }

    /// Hidden until `delay`, visible afterwards
    #[must_use]
    pub const fn visible_after(mut self, delay: Duration) -> Self {
        self.visible_after = Some(delay);
        self
    }

    /// Disabled until `delay`, enabled afterwards
    #[must_use]
    pub const fn enabled_after(mut self, delay: Duration) -> Self {
        self.enabled_after = Some(delay);
        self
    }

    /// Removed from the DOM at `delay`
    #[must_use]
    pub const fn detach_after(mut self, delay: Duration) -> Self {
        self.detach_after = Some(delay);
        self
    }

    fn snapshot_at(&self, elapsed: Duration) -> Option<ElementSnapshot> {
        if elapsed < self.appear_after || self.detach_after.is_some_and(|d| elapsed >= d) {
            return None;
        }
        let mut snapshot = self.snapshot.clone();
        if let Some(at) = self.visible_after {
            snapshot.state.visible = elapsed >= at;
        }
        if let Some(at) = self.enabled_after {
            let enabled = elapsed >= at;
            snapshot.state.enabled = enabled;
            snapshot.state.editable &= enabled;
        }
        Some(snapshot)
    }
}

impl From<ElementSnapshot> for MockElement {
    fn from(snapshot: ElementSnapshot) -> Self {
        Self::new(snapshot)
    }
}

#[derive(Debug, Clone)]
enum InjectedFailure {
    PageClosed { after: Duration },
    Query { selector: String, message: String },
    Navigation { url: String, message: String },
}

/// Shared call log of a [`MockDriver`], usable after the driver moved into a session
#[derive(Debug, Clone, Default)]
pub struct CallHistory(Arc<Mutex<Vec<String>>>);

impl CallHistory {
    fn push(&self, call: String) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }

    /// Recorded calls in order
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(method))
    }

    /// Number of calls starting with `prefix`
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

/// Mock driver for unit testing
#[derive(Debug)]
pub struct MockDriver {
    url: String,
    elements: Vec<MockElement>,
    failures: Vec<InjectedFailure>,
    screenshot_data: Option<Screenshot>,
    epoch: Instant,
    closed: bool,
    history: CallHistory,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create an empty page at `about:blank`
    #[must_use]
    pub fn new() -> Self {
        Self {
            url: "about:blank".to_string(),
            elements: Vec::new(),
            failures: Vec::new(),
            screenshot_data: Some(Screenshot::new(PLACEHOLDER_PNG.to_vec(), 1, 1)),
            epoch: Instant::now(),
            closed: false,
            history: CallHistory::default(),
        }
    }

    /// Add an element (present immediately unless timed)
    #[must_use]
    pub fn with_element(mut self, element: impl Into<MockElement>) -> Self {
        self.elements.push(element.into());
        self
    }

    /// Add a mock element
    pub fn add_element(&mut self, element: impl Into<MockElement>) {
        self.elements.push(element.into());
    }

    /// Every query fails with `PageClosed` once `after` has elapsed
    #[must_use]
    pub fn close_page_after(mut self, after: Duration) -> Self {
        self.failures.push(InjectedFailure::PageClosed { after });
        self
    }

    /// Queries for `selector` fail with a driver error
    #[must_use]
    pub fn fail_query(mut self, selector: &Selector, message: impl Into<String>) -> Self {
        self.failures.push(InjectedFailure::Query {
            selector: selector.to_string(),
            message: message.into(),
        });
        self
    }

    /// Navigation to `url` fails
    #[must_use]
    pub fn fail_navigation(mut self, url: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.push(InjectedFailure::Navigation {
            url: url.into(),
            message: message.into(),
        });
        self
    }

    /// Set mock screenshot
    pub fn set_screenshot(&mut self, screenshot: Screenshot) {
        self.screenshot_data = Some(screenshot);
    }

    /// Make `screenshot` fail
    #[must_use]
    pub fn without_screenshot(mut self) -> Self {
        self.screenshot_data = None;
        self
    }

    /// Shared handle on the call history
    #[must_use]
    pub fn history(&self) -> CallHistory {
        self.history.clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.history.was_called(method)
    }

    /// Whether `close` has been called
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> TenazResult<()> {
        if self.closed {
            return Err(TenazError::page_closed("mock page was closed"));
        }
        let elapsed = self.epoch.elapsed();
        for failure in &self.failures {
            if let InjectedFailure::PageClosed { after } = failure {
                if elapsed >= *after {
                    return Err(TenazError::page_closed("target closed"));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn navigate(&mut self, url: &str) -> TenazResult<()> {
        self.history.push(format!("navigate:{url}"));
        self.ensure_open()?;
        for failure in &self.failures {
            if let InjectedFailure::Navigation { url: failing, message } = failure {
                if failing == url {
                    return Err(TenazError::NavigationError {
                        url: url.to_string(),
                        message: message.clone(),
                    });
                }
            }
        }
        self.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> TenazResult<String> {
        self.history.push("current_url".to_string());
        self.ensure_open()?;
        Ok(self.url.clone())
    }

    async fn query_all(&self, selector: &Selector) -> TenazResult<Vec<ElementSnapshot>> {
        self.history.push(format!("query_all:{selector}"));
        self.ensure_open()?;

        let rendered = selector.to_string();
        for failure in &self.failures {
            if let InjectedFailure::Query { selector, message } = failure {
                if *selector == rendered {
                    return Err(TenazError::driver(message.clone()));
                }
            }
        }

        let elapsed = self.epoch.elapsed();
        let mut found = Vec::new();
        for element in &self.elements {
            let Some(snapshot) = element.snapshot_at(elapsed) else {
                continue;
            };
            match selector.matches(&snapshot) {
                Some(true) => found.push(snapshot),
                Some(false) => {}
                None => {
                    tracing::debug!(%selector, "mock page cannot evaluate selector");
                    return Ok(Vec::new());
                }
            }
        }
        Ok(found)
    }

    async fn screenshot(&self) -> TenazResult<Screenshot> {
        self.history.push("screenshot".to_string());
        self.ensure_open()?;
        self.screenshot_data
            .clone()
            .ok_or_else(|| TenazError::ScreenshotError {
                message: "No mock screenshot set".to_string(),
            })
    }

    async fn close(&mut self) -> TenazResult<()> {
        self.history.push("close".to_string());
        self.closed = true;
        Ok(())
    }
}

/// 1x1 transparent PNG
const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];
