use std::sync::Arc;

use anyhow::{Context, Result};
use chromiumoxide::Browser;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::errors::AdapterError;
use crate::page::ChromiumPage;

/// A launched or attached Chromium and the task pumping its DevTools
/// connection.
pub struct ChromiumSession {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    config: CdpConfig,
}

impl ChromiumSession {
    /// Launch Chromium, or attach when `websocket_url` is set.
    pub async fn launch(config: CdpConfig) -> Result<Self> {
        let (browser, mut handler) = match &config.websocket_url {
            Some(ws) => {
                info!(url = %ws, "attaching to running chromium");
                Browser::connect(ws.clone())
                    .await
                    .with_context(|| format!("failed to attach to {ws}"))?
            }
            None => {
                let browser_config = config.browser_config()?;
                info!(
                    executable = %config.executable.display(),
                    headless = config.headless,
                    "launching chromium"
                );
                Browser::launch(browser_config)
                    .await
                    .context("failed to launch chromium")?
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "devtools handler reported an error");
                }
            }
            warn!("chromium event loop exited");
        });

        Ok(Self {
            browser: Arc::new(browser),
            handler,
            config,
        })
    }

    pub fn config(&self) -> &CdpConfig {
        &self.config
    }

    /// Open a tab at `url` and hand it out as the page a loop drives.
    pub async fn open_page(&self, url: &str) -> Result<ChromiumPage, AdapterError> {
        let page = self.browser.new_page(url).await?;
        Ok(ChromiumPage::new(
            Arc::clone(&self.browser),
            page,
            self.config.clone(),
        ))
    }

    /// Stop pumping events. Chromium is killed once the last page handle
    /// drops.
    pub fn shutdown(self) {
        self.handler.abort();
        info!("chromium session shut down");
    }
}
