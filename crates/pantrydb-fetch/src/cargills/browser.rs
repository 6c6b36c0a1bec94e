//! Scoped browser session for the Cargills storefront.
//!
//! Owns the browser process, its CDP event handler task, and the single
//! page used for the session script. [`BrowserSession::close`] tears all
//! three down together; callers must invoke it on every exit path.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::error::FetchError;

pub(crate) struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
}

impl BrowserSession {
    /// Launches a headless browser and opens `start_url` in a fresh page.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Browser`] if the browser cannot be launched or
    /// the page cannot be opened. The partially-launched browser is torn
    /// down before the error is surfaced.
    pub(crate) async fn launch(start_url: &str) -> Result<Self, FetchError> {
        let config = BrowserConfig::builder()
            .build()
            .map_err(FetchError::Browser)?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Browser(format!("launch: {e}")))?;

        // The CDP event stream must be drained for the browser to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page(start_url).await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(FetchError::Browser(format!("open {start_url}: {e}")));
            }
        };

        Ok(Self {
            browser,
            handler_task,
            page,
        })
    }

    /// Runs a script in the page and reads its boolean result.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Browser`] if evaluation fails or the script
    /// does not produce a boolean.
    pub(crate) async fn eval_bool(&self, script: &str) -> Result<bool, FetchError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| FetchError::Browser(format!("evaluate: {e}")))?;
        result
            .into_value::<bool>()
            .map_err(|e| FetchError::Browser(format!("evaluate result: {e}")))
    }

    /// Folds the cookies the site set during the session script into a
    /// single `Cookie` header value for direct backend calls.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Browser`] if the cookies cannot be read.
    pub(crate) async fn cookie_header(&self) -> Result<String, FetchError> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| FetchError::Browser(format!("get cookies: {e}")))?;
        Ok(cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "))
    }

    /// Shuts the browser down and stops the event handler task.
    pub(crate) async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!(error = %e, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}
