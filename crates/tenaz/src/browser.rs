//! Chromium page driver over CDP.
//!
//! Requires the `browser` feature. Queries run the selector's browser-side
//! engine ([`Selector::to_query_all`]) in the page and deserialize the
//! returned snapshots.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTouchEmulationEnabledParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::BrowserKind;
use crate::driver::{BoxedDriver, BrowserConfig, ElementSnapshot, PageDriver, Screenshot};
use crate::result::{TenazError, TenazResult};
use crate::runner::{DriverFactory, LaunchRequest};
use crate::selector::Selector;

/// Environment variable consulted when no executable is configured
pub const CHROMIUM_PATH_ENV: &str = "CHROMIUM_PATH";

/// One Chromium process with one page
#[derive(Debug)]
pub struct ChromiumDriver {
    config: BrowserConfig,
    browser: Mutex<CdpBrowser>,
    page: CdpPage,
    handler: JoinHandle<()>,
    closed: bool,
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank page
    ///
    /// # Errors
    ///
    /// `BrowserLaunchError` when the process cannot be started, `ConnectionFailed`
    /// when the first page cannot be opened.
    pub async fn launch(config: BrowserConfig) -> TenazResult<Self> {
        let mut builder = CdpConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .request_timeout(config.navigation_timeout);

        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = config
            .executable_path
            .clone()
            .or_else(|| std::env::var_os(CHROMIUM_PATH_ENV).map(PathBuf::from))
        {
            builder = builder.chrome_executable(path);
        }
        if let Some(ua) = &config.user_agent {
            builder = builder.arg(format!("--user-agent={ua}"));
        }

        let cdp_config = builder
            .build()
            .map_err(|message| TenazError::BrowserLaunchError { message })?;

        let (browser, mut handler) =
            CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| TenazError::BrowserLaunchError {
                    message: e.to_string(),
                })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| TenazError::ConnectionFailed {
                message: e.to_string(),
            })?;

        let driver = Self {
            config,
            browser: Mutex::new(browser),
            page,
            handler,
            closed: false,
        };
        driver.emulate_device().await?;
        debug!(
            width = driver.config.viewport_width,
            height = driver.config.viewport_height,
            headless = driver.config.headless,
            "chromium launched"
        );
        Ok(driver)
    }

    /// Launch options in use
    #[must_use]
    pub const fn config(&self) -> &BrowserConfig {
        &self.config
    }

    async fn emulate_device(&self) -> TenazResult<()> {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(self.config.viewport_width))
            .height(i64::from(self.config.viewport_height))
            .device_scale_factor(self.config.device_scale_factor)
            .mobile(self.config.is_mobile)
            .build()
            .map_err(TenazError::driver)?;
        self.page.execute(metrics).await.map_err(cdp_error)?;

        if self.config.has_touch {
            self.page
                .execute(SetTouchEmulationEnabledParams::new(true))
                .await
                .map_err(cdp_error)?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> TenazResult<()> {
        if self.closed {
            return Err(TenazError::page_closed("driver was closed"));
        }
        Ok(())
    }
}

/// Closed targets and dropped connections become `PageClosed`
fn cdp_error(err: impl std::fmt::Display) -> TenazError {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("closed")
        || lowered.contains("no target")
        || lowered.contains("channel")
        || lowered.contains("no response")
    {
        TenazError::PageClosed { message }
    } else {
        TenazError::Driver { message }
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str) -> TenazResult<()> {
        self.ensure_open()?;
        self.page.goto(url).await.map_err(|e| match cdp_error(e) {
            closed @ TenazError::PageClosed { .. } => closed,
            other => TenazError::NavigationError {
                url: url.to_string(),
                message: other.to_string(),
            },
        })?;
        Ok(())
    }

    async fn current_url(&self) -> TenazResult<String> {
        self.ensure_open()?;
        let url = self.page.url().await.map_err(cdp_error)?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn query_all(&self, selector: &Selector) -> TenazResult<Vec<ElementSnapshot>> {
        self.ensure_open()?;
        let result = self
            .page
            .evaluate(selector.to_query_all())
            .await
            .map_err(cdp_error)?;
        result
            .into_value::<Vec<ElementSnapshot>>()
            .map_err(|e| TenazError::driver(format!("unexpected query result for `{selector}`: {e}")))
    }

    async fn screenshot(&self) -> TenazResult<Screenshot> {
        self.ensure_open()?;
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let shot = self
            .page
            .execute(params)
            .await
            .map_err(|e| TenazError::ScreenshotError {
                message: e.to_string(),
            })?;

        use base64::Engine;
        let data = base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(|e| TenazError::ScreenshotError {
                message: e.to_string(),
            })?;
        Ok(Screenshot::new(
            data,
            self.config.viewport_width,
            self.config.viewport_height,
        ))
    }

    async fn close(&mut self) -> TenazResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = {
            let browser = self.browser.get_mut();
            match browser.close().await {
                Ok(_) => browser.wait().await.map(|_| ()).map_err(|e| TenazError::driver(e.to_string())),
                Err(e) => Err(TenazError::driver(e.to_string())),
            }
        };
        self.handler.abort();
        result
    }
}

/// Opens a [`ChromiumDriver`] per attempt
#[derive(Debug, Clone)]
pub struct ChromiumFactory {
    executable: Option<PathBuf>,
    sandbox: bool,
}

impl ChromiumFactory {
    /// Factory with sandboxing on and auto-detected executable
    #[must_use]
    pub const fn new() -> Self {
        Self {
            executable: None,
            sandbox: true,
        }
    }

    /// Use this Chromium binary
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Disable the sandbox (containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

impl Default for ChromiumFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DriverFactory for ChromiumFactory {
    async fn open(&self, request: &LaunchRequest) -> TenazResult<BoxedDriver> {
        if request.project.browser != BrowserKind::Chromium {
            return Err(TenazError::BrowserLaunchError {
                message: format!(
                    "project `{}` targets {}, only chromium can be driven",
                    request.project.name, request.project.browser
                ),
            });
        }
        if let Some(path) = &request.storage_state {
            warn!(path = %path.display(), "storage state is not applied by the chromium driver");
        }
        if request.record_video.is_some() {
            debug!(project = %request.project.name, "video recording requested but not supported by CDP driver");
        }

        let mut config = request.browser.clone();
        if let Some(path) = &self.executable {
            config = config.with_executable(path.clone());
        }
        if !self.sandbox {
            config = config.with_no_sandbox();
        }
        Ok(Box::new(ChromiumDriver::launch(config).await?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cdp_error_classification() {
        assert!(matches!(
            cdp_error("Target closed"),
            TenazError::PageClosed { .. }
        ));
        assert!(matches!(
            cdp_error("ChannelSendError"),
            TenazError::PageClosed { .. }
        ));
        assert!(matches!(
            cdp_error("Uncaught SyntaxError"),
            TenazError::Driver { .. }
        ));
    }

    #[tokio::test]
    async fn test_factory_rejects_other_engines() {
        let request = LaunchRequest {
            project: crate::config::Project::new(
                "webkit",
                BrowserKind::Webkit,
                crate::config::Device::DesktopSafari,
            ),
            browser: BrowserConfig::default(),
            storage_state: None,
            record_video: None,
            attempt: 0,
        };
        let err = ChromiumFactory::new().open(&request).await.err().expect("open should fail for non-chromium engines");
        assert!(err.to_string().contains("only chromium"));
    }
}
