use std::time::{Duration, Instant};

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SiteProfile;
use crate::error::NavigationError;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const CHECKPOINT_WAIT: Duration = Duration::from_secs(5);
const LOAD_SETTLE: Duration = Duration::from_secs(2);
const REVEAL_SETTLE: Duration = Duration::from_millis(1500);
const URL_CHANGE_TIMEOUT: Duration = Duration::from_secs(15);
const URL_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Browser session driving the exam site one page at a time.
#[allow(async_fn_in_trait)]
pub trait Navigator {
    /// Navigate and block until the question list renders. A security
    /// checkpoint is waited out; the overall wait is bounded by the load timeout.
    async fn load(&mut self, url: &str) -> Result<(), NavigationError>;

    /// Click every "show answer" control. Failures are logged, never returned.
    async fn reveal_answers(&mut self);

    /// Rendered HTML of the current page.
    async fn snapshot(&mut self) -> Result<String, NavigationError>;

    /// Go to the next page. `false` means there is no next page or it could
    /// not be reached; both end the scrape.
    async fn advance_page(&mut self) -> bool;

    async fn close(&mut self);
}

pub struct ChromeNavigator {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    profile: SiteProfile,
    load_timeout: Duration,
}

impl ChromeNavigator {
    pub async fn launch(
        profile: SiteProfile,
        headless: bool,
        load_timeout: Duration,
    ) -> Result<Self, NavigationError> {
        let mut builder = BrowserConfig::builder().window_size(1920, 1080).args([
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--lang=en-US",
        ]);
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(NavigationError::Launch)?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|e| NavigationError::Launch(e.to_string()))?;

        // The CDP connection only makes progress while its handler is polled.
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        debug!("Chrome session started (headless: {}).", headless);

        Ok(ChromeNavigator {
            browser,
            handler,
            page,
            profile,
            load_timeout,
        })
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, NavigationError> {
        Ok(self.page.evaluate(script).await?.into_value()?)
    }

    async fn has_content(&self) -> Result<bool, NavigationError> {
        let sel = js_str(&self.profile.content_ready);
        self.eval(format!("() => document.querySelector({sel}) !== null"))
            .await
    }

    async fn title(&self) -> Result<String, NavigationError> {
        self.eval("() => document.title".to_string()).await
    }

    async fn current_url(&self) -> Result<String, NavigationError> {
        self.eval("() => window.location.href".to_string()).await
    }

    async fn click_next(&self) -> Result<String, NavigationError> {
        let text = js_str(&self.profile.next_button_text);
        self.eval(format!(
            r#"() => {{
                const btn = Array.from(document.querySelectorAll('button'))
                    .find(b => b.textContent.trim() === {text});
                if (!btn) return 'missing';
                if (btn.disabled || btn.getAttribute('aria-disabled') === 'true') return 'disabled';
                btn.click();
                return 'clicked';
            }}"#
        ))
        .await
    }

    async fn wait_for_url_change(&self, from: &str) -> Result<bool, NavigationError> {
        let deadline = Instant::now() + URL_CHANGE_TIMEOUT;
        while Instant::now() < deadline {
            if self.current_url().await? != from {
                return Ok(true);
            }
            tokio::time::sleep(URL_POLL_INTERVAL).await;
        }
        Ok(false)
    }

    async fn try_advance(&self) -> Result<bool, NavigationError> {
        let before = self.current_url().await?;
        match self.click_next().await?.as_str() {
            "missing" => {
                info!("Next button not found. End of exam.");
                return Ok(false);
            }
            "disabled" => {
                info!("Next button is disabled.");
                return Ok(false);
            }
            _ => {}
        }
        if !self.wait_for_url_change(&before).await? {
            error!("Pagination error: URL did not change within {:?}", URL_CHANGE_TIMEOUT);
            return Ok(false);
        }
        tokio::time::sleep(LOAD_SETTLE).await;
        Ok(true)
    }
}

impl Navigator for ChromeNavigator {
    async fn load(&mut self, url: &str) -> Result<(), NavigationError> {
        info!("Navigating to {}", url);
        self.page.goto(url).await?;

        let deadline = Instant::now() + self.load_timeout;
        while Instant::now() < deadline {
            if self.has_content().await.unwrap_or(false) {
                debug!("Page loaded successfully.");
                tokio::time::sleep(LOAD_SETTLE).await;
                return Ok(());
            }
            let title = self.title().await.unwrap_or_default();
            if title.contains(&self.profile.checkpoint_title) {
                warn!("Detected security checkpoint. Waiting...");
                tokio::time::sleep(CHECKPOINT_WAIT).await;
                continue;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        error!("Timeout waiting for page load.");
        Err(NavigationError::Timeout(self.load_timeout))
    }

    async fn reveal_answers(&mut self) {
        let text = js_str(&self.profile.reveal_button_text);
        let clicked: Result<u64, _> = self
            .eval(format!(
                r#"() => {{
                    const buttons = Array.from(document.querySelectorAll('button'))
                        .filter(b => b.textContent.includes({text}));
                    buttons.forEach(b => b.click());
                    return buttons.length;
                }}"#
            ))
            .await;

        match clicked {
            Ok(0) => {}
            Ok(n) => {
                debug!("Revealing answers for {} questions...", n);
                // Let the highlight transitions apply before reading styles.
                tokio::time::sleep(REVEAL_SETTLE).await;
            }
            Err(e) => warn!("Could not reveal answers: {}", e),
        }
    }

    async fn snapshot(&mut self) -> Result<String, NavigationError> {
        let list = js_str(&self.profile.options_list);
        self.eval(format!(
            r#"() => {{
                document.querySelectorAll({list}).forEach(options => {{
                    Array.from(options.children).forEach(row => {{
                        row.setAttribute('data-border-color', getComputedStyle(row).borderColor);
                    }});
                }});
                return document.documentElement.outerHTML;
            }}"#
        ))
        .await
    }

    async fn advance_page(&mut self) -> bool {
        match self.try_advance().await {
            Ok(moved) => moved,
            Err(e) => {
                error!("Pagination error: {}", e);
                false
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser wait: {}", e);
        }
        self.handler.abort();
    }
}

/// JavaScript string literal for `s`.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_literals_are_escaped() {
        assert_eq!(js_str("Next"), "\"Next\"");
        assert_eq!(js_str("div[class*='a\"b']"), "\"div[class*='a\\\"b']\"");
    }
}
