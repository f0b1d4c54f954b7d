// src/services/testing.rs

//! In-memory fetchers, browser sessions and markup fixtures for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::CookieEntry;
use crate::services::harvester::{
    AutomationSession, HOT_SORT, LAST_COMMENT, LOAD_MORE, SessionFactory, StepError, StepResult,
};
use crate::utils::http::PageFetcher;

/// Serves canned pages and records every requested URL.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, String>,
    routes: Vec<(Vec<String>, String)>,
    requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    /// Serve `html` for exactly `url`.
    pub fn with(mut self, url: &str, html: String) -> Self {
        self.pages.insert(url.to_string(), html);
        self
    }

    /// Serve `html` for any URL containing all `needles`; first match wins.
    pub fn route(mut self, needles: &[&str], html: String) -> Self {
        self.routes
            .push((needles.iter().map(|n| n.to_string()).collect(), html));
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());
        if let Some(html) = self.pages.get(url) {
            return Ok(html.clone());
        }
        self.routes
            .iter()
            .find(|(needles, _)| needles.iter().all(|n| url.contains(n.as_str())))
            .map(|(_, html)| html.clone())
            .ok_or_else(|| AppError::fetch(url, "no fixture"))
    }
}

/// Delays every fetch of a [`FakeFetcher`] and records the peak number of
/// fetches in flight.
pub struct SlowFetcher {
    inner: FakeFetcher,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowFetcher {
    pub fn new(inner: FakeFetcher, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.inner.requests()
    }
}

#[async_trait]
impl PageFetcher for SlowFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let result = self.inner.fetch(url).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// A minimal result card.
pub fn card_html(mid: &str, comments: &str) -> String {
    format!(
        r#"<div class="card-wrap" mid="{mid}"><div class="card"><div class="card-feed">
        <div class="content"><div class="info"><div></div>
          <div><a href="//weibo.com/100{mid}" nick-name="user{mid}">user{mid}</a></div></div>
          <p class="txt" node-type="feed_list_content">
                post {mid}</p>
          <p class="from"><a href="//weibo.com/100{mid}/B{mid}">2020年11月20日 08:00</a><a>web</a></p>
        </div></div>
        <div class="card-act"><ul>
          <li><a action-type="feed_list_forward">转发</a></li>
          <li><a action-type="feed_list_comment">评论 {comments}</a></li>
          <li><a action-type="feed_list_like"><em>1</em></a></li>
        </ul></div></div></div>"#
    )
}

/// A results page with `window` navigation strip items.
pub fn page_html(mids: &[&str], window: usize, next: Option<&str>) -> String {
    let strip: String = (1..=window).map(|i| format!("<li>第{i}页</li>")).collect();
    let next = next
        .map(|href| format!(r#"<a class="next" href="{href}">下一页</a>"#))
        .unwrap_or_default();
    let cards: String = mids.iter().map(|mid| card_html(mid, "0")).collect();
    format!(
        r#"<html><body>{cards}<div class="m-page"><ul class="s-scroll">{strip}</ul>{next}</div></body></html>"#
    )
}

/// A results page that fits in one window.
pub fn results_page(mids: &[&str], next: Option<&str>) -> String {
    page_html(mids, 1, next)
}

/// A page carrying the "no results" marker.
pub fn empty_page() -> String {
    r#"<html><body><div class="card card-no-result s-pt20b40"><p>抱歉，未找到相关结果。</p></div></body></html>"#
        .to_string()
}

/// A detail view with `count` comments `c0..`.
pub fn comment_page(count: usize) -> String {
    let blocks: String = (0..count)
        .map(|i| {
            format!(
                r#"<div comment_id="c{i}"><div class="list_con">
                <div class="WB_text"><a href="//weibo.com/u/{i}">u{i}</a>：comment {i}</div>
                <div class="WB_func clearfix"><div class="WB_from S_txt2">今天 08:0{}</div></div>
                </div></div>"#,
                i % 10
            )
        })
        .collect();
    format!(
        r#"<html><body><div class="list_box"><div class="list_ul">{blocks}</div></div></body></html>"#
    )
}

/// Behaviour of every session a [`FakeSessionFactory`] opens.
#[derive(Clone)]
pub struct SessionScript {
    /// Markup returned by `content`
    pub html: String,
    /// URLs reported by successive `current_url` calls; the last navigated URL afterwards
    pub landing_urls: Vec<String>,
    /// Number of leading `goto` calls that fail
    pub failing_gotos: usize,
    pub hot_sort_visible: bool,
    /// Clicks after which "load more" disappears; `None` keeps it forever
    pub load_more_rounds: Option<usize>,
}

impl Default for SessionScript {
    fn default() -> Self {
        Self {
            html: String::new(),
            landing_urls: Vec::new(),
            failing_gotos: 0,
            hot_sort_visible: true,
            load_more_rounds: Some(0),
        }
    }
}

#[derive(Default)]
struct SessionLog {
    gotos: Vec<String>,
    clicks: Vec<String>,
    cookie_resets: usize,
    opened: usize,
    closed: usize,
}

/// Opens scripted sessions that share one call log.
pub struct FakeSessionFactory {
    script: SessionScript,
    log: Arc<Mutex<SessionLog>>,
}

impl FakeSessionFactory {
    pub fn new(script: SessionScript) -> Self {
        Self {
            script,
            log: Arc::new(Mutex::new(SessionLog::default())),
        }
    }

    pub fn gotos(&self) -> Vec<String> {
        self.log.lock().unwrap().gotos.clone()
    }

    pub fn clicks(&self, selector: &str) -> usize {
        let log = self.log.lock().unwrap();
        log.clicks.iter().filter(|s| s.as_str() == selector).count()
    }

    pub fn cookie_resets(&self) -> usize {
        self.log.lock().unwrap().cookie_resets
    }

    pub fn opened(&self) -> usize {
        self.log.lock().unwrap().opened
    }

    /// Every opened session was closed.
    pub fn closed(&self) -> bool {
        let log = self.log.lock().unwrap();
        log.opened > 0 && log.opened == log.closed
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn open(&self) -> Result<Box<dyn AutomationSession>> {
        self.log.lock().unwrap().opened += 1;
        Ok(Box::new(FakeSession {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            gotos: 0,
            landings: 0,
            load_more_clicks: 0,
            last_url: String::new(),
        }))
    }
}

struct FakeSession {
    script: SessionScript,
    log: Arc<Mutex<SessionLog>>,
    gotos: usize,
    landings: usize,
    load_more_clicks: usize,
    last_url: String,
}

#[async_trait]
impl AutomationSession for FakeSession {
    async fn goto(&mut self, url: &str) -> StepResult<()> {
        self.log.lock().unwrap().gotos.push(url.to_string());
        self.gotos += 1;
        if self.gotos <= self.script.failing_gotos {
            return Err(StepError::Navigation("connection reset".into()));
        }
        self.last_url = url.to_string();
        Ok(())
    }

    async fn current_url(&mut self) -> StepResult<String> {
        let url = self
            .script
            .landing_urls
            .get(self.landings)
            .cloned()
            .unwrap_or_else(|| self.last_url.clone());
        self.landings += 1;
        Ok(url)
    }

    async fn reset_cookies(&mut self, _cookies: &[CookieEntry]) -> StepResult<()> {
        self.log.lock().unwrap().cookie_resets += 1;
        Ok(())
    }

    async fn is_visible(&mut self, selector: &str) -> StepResult<bool> {
        Ok(match selector {
            HOT_SORT => self.script.hot_sort_visible,
            LOAD_MORE => self
                .script
                .load_more_rounds
                .is_none_or(|rounds| self.load_more_clicks < rounds),
            LAST_COMMENT => true,
            _ => false,
        })
    }

    async fn click(&mut self, selector: &str) -> StepResult<()> {
        self.log.lock().unwrap().clicks.push(selector.to_string());
        if selector == LOAD_MORE {
            self.load_more_clicks += 1;
        }
        Ok(())
    }

    async fn scroll_into_view(&mut self, _selector: &str) -> StepResult<()> {
        Ok(())
    }

    async fn content(&mut self) -> StepResult<String> {
        Ok(self.script.html.clone())
    }

    async fn close(&mut self) -> StepResult<()> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}
