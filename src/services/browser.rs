// src/services/browser.rs

//! Headless Chrome sessions for comment harvesting (chromiumoxide over CDP).

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{ClearBrowserCookiesParams, CookieParam};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::{CommentConfig, CookieEntry};
use crate::services::harvester::{AutomationSession, SessionFactory, StepError, StepResult};

/// Launches one browser process per session.
#[derive(Debug, Clone)]
pub struct ChromeSessionFactory {
    executable: Option<String>,
    headless: bool,
}

impl ChromeSessionFactory {
    pub fn new(config: &CommentConfig) -> Self {
        Self {
            executable: config.chrome_executable.clone(),
            headless: config.headless,
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-notifications")
            .arg("--blink-settings=imagesEnabled=false");
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(AppError::browser)
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open(&self) -> Result<Box<dyn AutomationSession>> {
        let (browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .map_err(AppError::browser)?;
        let events = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(error) => {
                let mut session = ChromeSession {
                    browser,
                    page: None,
                    events,
                };
                let _ = session.close().await;
                return Err(AppError::browser(error));
            }
        };

        Ok(Box::new(ChromeSession {
            browser,
            page: Some(page),
            events,
        }))
    }
}

/// One browser process with a single tab.
pub struct ChromeSession {
    browser: Browser,
    page: Option<Page>,
    events: JoinHandle<()>,
}

impl ChromeSession {
    fn page(&self) -> StepResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| StepError::Fault("session is closed".into()))
    }
}

fn step_error(error: CdpError) -> StepError {
    match error {
        CdpError::Timeout => StepError::Timeout,
        CdpError::NotFound => StepError::NotFound,
        other => StepError::Fault(other.to_string()),
    }
}

/// JavaScript expression: is the first match of `selector` laid out and shown?
fn visibility_script(selector: &str) -> StepResult<String> {
    let selector =
        serde_json::to_string(selector).map_err(|e| StepError::Fault(e.to_string()))?;
    Ok(format!(
        r#"(() => {{
            const el = document.querySelector({selector});
            if (!el) return false;
            const rect = el.getBoundingClientRect();
            const style = window.getComputedStyle(el);
            return rect.width > 0 && rect.height > 0
                && style.visibility !== "hidden" && style.display !== "none";
        }})()"#
    ))
}

fn cookie_param(cookie: &CookieEntry) -> StepResult<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone());
    if let Some(domain) = &cookie.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(path) = &cookie.path {
        builder = builder.path(path.clone());
    }
    builder.build().map_err(StepError::Fault)
}

#[async_trait]
impl AutomationSession for ChromeSession {
    async fn goto(&mut self, url: &str) -> StepResult<()> {
        self.page()?
            .goto(url.to_string())
            .await
            .map_err(|e| StepError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn current_url(&mut self) -> StepResult<String> {
        let url = self.page()?.url().await.map_err(step_error)?;
        Ok(url.unwrap_or_default())
    }

    async fn reset_cookies(&mut self, cookies: &[CookieEntry]) -> StepResult<()> {
        let page = self.page()?;
        page.execute(ClearBrowserCookiesParams::default())
            .await
            .map_err(step_error)?;
        let params = cookies
            .iter()
            .map(cookie_param)
            .collect::<StepResult<Vec<_>>>()?;
        if !params.is_empty() {
            page.set_cookies(params).await.map_err(step_error)?;
        }
        Ok(())
    }

    async fn is_visible(&mut self, selector: &str) -> StepResult<bool> {
        let script = visibility_script(selector)?;
        self.page()?
            .evaluate(script.as_str())
            .await
            .map_err(step_error)?
            .into_value::<bool>()
            .map_err(|e| StepError::Fault(e.to_string()))
    }

    async fn click(&mut self, selector: &str) -> StepResult<()> {
        let element = self.page()?.find_element(selector).await.map_err(step_error)?;
        element.click().await.map_err(step_error)?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, selector: &str) -> StepResult<()> {
        let element = self.page()?.find_element(selector).await.map_err(step_error)?;
        element.scroll_into_view().await.map_err(step_error)?;
        Ok(())
    }

    async fn content(&mut self) -> StepResult<String> {
        self.page()?.content().await.map_err(step_error)
    }

    async fn close(&mut self) -> StepResult<()> {
        self.page = None;
        let closed = self.browser.close().await.map(|_| ()).map_err(step_error);
        let _ = self.browser.wait().await;
        self.events.abort();
        closed
    }
}
