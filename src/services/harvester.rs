// src/services/harvester.rs

//! Comment harvesting through a browser automation session.
//!
//! The detail view loads its thread lazily, so the harvester drives the page
//! through a fixed sequence of steps before reading the comments out of a
//! markup snapshot:
//!
//! 1. navigate, re-installing the cookie set once on a login redirect
//! 2. switch the thread to "most liked" ordering when the control shows up
//! 3. scroll the last comment into view to trigger lazy loading
//! 4. click "load more" until it disappears or the click budget runs out
//! 5. extract every comment block from the final markup
//!
//! Waits that time out mean "not there" and end the current step. Only a
//! failed re-navigation aborts the harvest.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{Comment, CommentConfig, CookieEntry, HarvestRequest, OTHER_USER_TYPE};
use crate::services::normalize::{self, Rendering};
use crate::utils::last_path_segment;

/// Hot-sort control of the comment tab.
pub const HOT_SORT: &str = r#"div[node-type="feed_cate"] ul[class="clearfix"] a[suda-uatrack="key=comment&value=hotcomm"]"#;
/// "Load more comments" control.
pub const LOAD_MORE: &str =
    r#"div[class="list_box"] > div[class="list_ul"] > a[action-type="click_more_comment"]"#;
/// The last loaded comment block.
pub const LAST_COMMENT: &str = r#"div[class="list_box"] > div[class="list_ul"] > div:last-of-type"#;

const LIKE_PLACEHOLDER: &str = "赞";

/// Outcome of a single automation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// The element did not show up in time
    Timeout,
    /// The element is not on the page
    NotFound,
    /// The page could not be loaded
    Navigation(String),
    /// Anything else the browser reported
    Fault(String),
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepError::Timeout => write!(f, "timed out"),
            StepError::NotFound => write!(f, "element not found"),
            StepError::Navigation(message) => write!(f, "navigation failed: {message}"),
            StepError::Fault(message) => write!(f, "{message}"),
        }
    }
}

pub type StepResult<T> = std::result::Result<T, StepError>;

/// One exclusive browser tab.
#[async_trait]
pub trait AutomationSession: Send {
    async fn goto(&mut self, url: &str) -> StepResult<()>;

    async fn current_url(&mut self) -> StepResult<String>;

    /// Drop all cookies and install `cookies` instead.
    async fn reset_cookies(&mut self, cookies: &[CookieEntry]) -> StepResult<()>;

    /// Whether an element matching `selector` is rendered and visible right now.
    async fn is_visible(&mut self, selector: &str) -> StepResult<bool>;

    async fn click(&mut self, selector: &str) -> StepResult<()>;

    async fn scroll_into_view(&mut self, selector: &str) -> StepResult<()>;

    /// Serialized markup of the current document.
    async fn content(&mut self) -> StepResult<String>;

    async fn close(&mut self) -> StepResult<()>;
}

/// Opens a fresh session per harvest.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn AutomationSession>>;
}

/// Timing and limits of one harvest.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub detail_base: String,
    pub max_comments: usize,
    pub settle_delay: Duration,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    pub max_load_more: usize,
    pub overall_timeout: Duration,
}

impl From<&CommentConfig> for HarvestSettings {
    fn from(config: &CommentConfig) -> Self {
        Self {
            detail_base: config.detail_base.clone(),
            max_comments: config.max_comments,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            wait_timeout: Duration::from_millis(config.wait_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_load_more: config.max_load_more,
            overall_timeout: Duration::from_secs(config.harvest_timeout_secs),
        }
    }
}

/// Whether the page is worth reading after the interaction steps.
#[derive(Debug, PartialEq, Eq)]
enum Drive {
    Loaded,
    Aborted,
}

/// Compiled selectors for the comment list markup.
struct CommentSelectors {
    blocks: Selector,
    like: Selector,
    from: Selector,
}

impl CommentSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            blocks: parse_selector(r#"div[class="list_box"] > div[class="list_ul"] > div"#)?,
            like: parse_selector(r#"ul[class="clearfix"] li span[node-type="like_status"]"#)?,
            from: parse_selector(
                r#"div[class="list_con"] > div[class="WB_func clearfix"] > div[class="WB_from S_txt2"]"#,
            )?,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Drives detail views and extracts their comment threads.
pub struct CommentHarvester {
    factory: Arc<dyn SessionFactory>,
    cookies: Arc<Vec<CookieEntry>>,
    settings: HarvestSettings,
    selectors: CommentSelectors,
}

impl CommentHarvester {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        cookies: Arc<Vec<CookieEntry>>,
        settings: HarvestSettings,
    ) -> Result<Self> {
        Ok(Self {
            factory,
            cookies,
            settings,
            selectors: CommentSelectors::new()?,
        })
    }

    /// Harvest the thread of one post.
    ///
    /// Returns at most `max_comments` comments in page order. Only a failure
    /// to open a session is reported as an error; every later problem
    /// reduces the result to what was loaded so far.
    pub async fn harvest(&self, request: &HarvestRequest) -> Result<Vec<Comment>> {
        let url = request.detail_url(&self.settings.detail_base);
        let mut session = self.factory.open().await?;

        let drive =
            match tokio::time::timeout(self.settings.overall_timeout, self.drive(session.as_mut(), &url))
                .await
            {
                Ok(drive) => drive,
                Err(_) => {
                    log::debug!("Harvest budget exhausted for {}, keeping loaded comments", url);
                    Drive::Loaded
                }
            };

        let comments = match drive {
            Drive::Aborted => Vec::new(),
            Drive::Loaded => match session.content().await {
                Ok(html) => self.extract_comments(&html, request),
                Err(error) => {
                    log::debug!("Cannot read comment markup of {}: {}", url, error);
                    Vec::new()
                }
            },
        };

        if let Err(error) = session.close().await {
            log::debug!("Closing session for {} failed: {}", url, error);
        }

        log::debug!("Harvested {} comments from {}", comments.len(), url);
        Ok(comments)
    }

    async fn drive(&self, session: &mut dyn AutomationSession, url: &str) -> Drive {
        if let Err(error) = self.navigate(session, url).await {
            log::warn!("Giving up on {}: {}", url, error);
            return Drive::Aborted;
        }
        if let Err(error) = self.sort_by_likes(session).await {
            log::debug!("Keeping default comment order for {}: {}", url, error);
        }
        if let Err(error) = self.load_all(session).await {
            log::debug!("Stopped loading comments for {}: {}", url, error);
        }
        Drive::Loaded
    }

    /// Open `url`; on an error or a redirect away from it, reinstall the
    /// cookie set and try once more.
    async fn navigate(&self, session: &mut dyn AutomationSession, url: &str) -> StepResult<()> {
        let landed = match session.goto(url).await {
            Ok(()) => {
                self.settle().await;
                match session.current_url().await {
                    Ok(current) => same_page(&current, url),
                    Err(_) => false,
                }
            }
            Err(error) => {
                log::debug!("First navigation to {} failed: {}", url, error);
                false
            }
        };
        if landed {
            return Ok(());
        }

        log::debug!("Reinstalling cookies before retrying {}", url);
        if let Err(error) = session.reset_cookies(&self.cookies).await {
            log::debug!("Cookie reset failed: {}", error);
        }
        session.goto(url).await?;
        self.settle().await;
        Ok(())
    }

    async fn sort_by_likes(&self, session: &mut dyn AutomationSession) -> StepResult<()> {
        self.wait_visible(session, HOT_SORT).await?;
        session.click(HOT_SORT).await?;
        self.settle().await;
        Ok(())
    }

    async fn load_all(&self, session: &mut dyn AutomationSession) -> StepResult<()> {
        self.wait_visible(session, LAST_COMMENT).await?;
        for _ in 0..3 {
            self.scroll_to_last(session).await?;
        }

        self.wait_visible(session, LOAD_MORE).await?;
        for _ in 0..self.settings.max_load_more {
            session.click(LOAD_MORE).await?;
            self.settle().await;
            for _ in 0..2 {
                self.scroll_to_last(session).await?;
            }
            self.wait_visible(session, LOAD_MORE).await?;
        }
        log::debug!(
            "Load-more budget of {} clicks exhausted",
            self.settings.max_load_more
        );
        Ok(())
    }

    async fn scroll_to_last(&self, session: &mut dyn AutomationSession) -> StepResult<()> {
        session.scroll_into_view(LAST_COMMENT).await?;
        self.settle().await;
        Ok(())
    }

    /// Poll until `selector` is visible or the wait timeout passes.
    async fn wait_visible(&self, session: &mut dyn AutomationSession, selector: &str) -> StepResult<()> {
        let deadline = Instant::now() + self.settings.wait_timeout;
        loop {
            if session.is_visible(selector).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(StepError::Timeout);
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn settle(&self) {
        if !self.settings.settle_delay.is_zero() {
            tokio::time::sleep(self.settings.settle_delay).await;
        }
    }

    /// Read comments out of a detail view snapshot, in document order.
    pub fn extract_comments(&self, html: &str, request: &HarvestRequest) -> Vec<Comment> {
        let document = Html::parse_document(html);
        document
            .select(&self.selectors.blocks)
            .filter_map(|block| self.parse_comment(block, request))
            .take(self.settings.max_comments)
            .collect()
    }

    fn parse_comment(&self, block: ElementRef<'_>, request: &HarvestRequest) -> Option<Comment> {
        let body = normalize::children_named(block, "div")
            .find(|div| normalize::has_class(*div, "list_con"))
            .and_then(|con| {
                normalize::children_named(con, "div").find(|div| normalize::has_class(*div, "WB_text"))
            })?;

        let mut comment = Comment {
            id: block.value().attr("comment_id").unwrap_or_default().to_string(),
            weibo_id: request.post_id.clone(),
            weibo_bid: request.bid.clone(),
            weibo_user_id: request.user_id.clone(),
            text: normalize::clean_text(&normalize::text_of(body), Rendering::Plain, ""),
            user_type: comment_user_type(body),
            ..Comment::default()
        };

        if let Some(author) = normalize::children_named(body, "a").next() {
            comment.user_id = last_path_segment(author.value().attr("href").unwrap_or_default());
            comment.screen_name = normalize::text_of(author).trim().to_string();
        }

        comment.attitudes_count = block
            .select(&self.selectors.like)
            .next()
            .and_then(|span| normalize::children_named(span, "em").last())
            .map(|em| normalize::text_of(em).trim().to_string())
            .filter(|likes| !likes.is_empty() && likes != LIKE_PLACEHOLDER)
            .unwrap_or_else(|| "0".to_string());

        comment.created_at = block
            .select(&self.selectors.from)
            .next()
            .map(|from| normalize::compact_time(&normalize::text_of(from)))
            .unwrap_or_default();

        Some(comment)
    }
}

/// Badge titles of a comment author joined with `;`.
fn comment_user_type(body: ElementRef<'_>) -> String {
    let badge = normalize::children_named(body, "a")
        .filter(|a| a.value().attr("suda-data").is_some())
        .find_map(|a| normalize::children_named(a, "i").next())
        .and_then(|i| i.value().attr("title"));
    let action = normalize::children_named(body, "a")
        .find(|a| a.value().attr("action-type").is_some())
        .and_then(|a| a.value().attr("title"));

    let titles: Vec<&str> = [badge, action].into_iter().flatten().collect();
    if titles.is_empty() {
        OTHER_USER_TYPE.to_string()
    } else {
        titles.join(";")
    }
}

fn same_page(current: &str, requested: &str) -> bool {
    current.trim_end_matches('/') == requested.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{FakeSessionFactory, SessionScript, comment_page};

    fn settings() -> HarvestSettings {
        HarvestSettings {
            detail_base: "https://weibo.com".to_string(),
            max_comments: 100,
            settle_delay: Duration::ZERO,
            wait_timeout: Duration::ZERO,
            poll_interval: Duration::ZERO,
            max_load_more: 1000,
            overall_timeout: Duration::from_secs(60),
        }
    }

    fn request() -> HarvestRequest {
        HarvestRequest {
            post_id: "4575".into(),
            bid: "JuK3a".into(),
            user_id: "1669879400".into(),
        }
    }

    const DETAIL: &str = "https://weibo.com/1669879400/JuK3a";

    fn harvester(factory: Arc<FakeSessionFactory>, settings: HarvestSettings) -> CommentHarvester {
        let cookies = vec![CookieEntry {
            name: "SUB".into(),
            value: "token".into(),
            ..CookieEntry::default()
        }];
        CommentHarvester::new(factory, Arc::new(cookies), settings).unwrap()
    }

    #[tokio::test]
    async fn extracts_loaded_comments_and_closes_session() {
        let factory = Arc::new(FakeSessionFactory::new(SessionScript {
            html: comment_page(3),
            load_more_rounds: Some(2),
            ..SessionScript::default()
        }));
        let comments = harvester(factory.clone(), settings())
            .harvest(&request())
            .await
            .unwrap();

        assert_eq!(comments.len(), 3);
        assert_eq!(comments[0].weibo_id, "4575");
        assert_eq!(factory.clicks(LOAD_MORE), 2);
        assert_eq!(factory.clicks(HOT_SORT), 1);
        assert!(factory.closed());
    }

    #[tokio::test]
    async fn load_loop_is_bounded_when_control_never_disappears() {
        let factory = Arc::new(FakeSessionFactory::new(SessionScript {
            html: comment_page(2),
            load_more_rounds: None,
            ..SessionScript::default()
        }));
        let settings = HarvestSettings {
            max_load_more: 7,
            ..settings()
        };
        let comments = harvester(factory.clone(), settings)
            .harvest(&request())
            .await
            .unwrap();

        assert_eq!(comments.len(), 2);
        assert_eq!(factory.clicks(LOAD_MORE), 7);
        assert!(factory.closed());
    }

    #[tokio::test]
    async fn max_comments_caps_output() {
        let factory = Arc::new(FakeSessionFactory::new(SessionScript {
            html: comment_page(10),
            ..SessionScript::default()
        }));
        let settings = HarvestSettings {
            max_comments: 4,
            ..settings()
        };
        let comments = harvester(factory, settings).harvest(&request()).await.unwrap();
        assert_eq!(comments.len(), 4);
        assert_eq!(comments[3].id, "c3");
    }

    #[tokio::test]
    async fn redirect_reinstalls_cookies_once() {
        let factory = Arc::new(FakeSessionFactory::new(SessionScript {
            html: comment_page(1),
            landing_urls: vec!["https://passport.weibo.com/visitor".into(), DETAIL.into()],
            ..SessionScript::default()
        }));
        let comments = harvester(factory.clone(), settings())
            .harvest(&request())
            .await
            .unwrap();

        assert_eq!(comments.len(), 1);
        assert_eq!(factory.gotos(), vec![DETAIL, DETAIL]);
        assert_eq!(factory.cookie_resets(), 1);
    }

    #[tokio::test]
    async fn landing_on_the_page_needs_no_cookie_reset() {
        let factory = Arc::new(FakeSessionFactory::new(SessionScript {
            html: comment_page(1),
            ..SessionScript::default()
        }));
        harvester(factory.clone(), settings())
            .harvest(&request())
            .await
            .unwrap();
        assert_eq!(factory.gotos(), vec![DETAIL]);
        assert_eq!(factory.cookie_resets(), 0);
    }

    #[tokio::test]
    async fn persistent_navigation_failure_yields_nothing() {
        let factory = Arc::new(FakeSessionFactory::new(SessionScript {
            html: comment_page(5),
            failing_gotos: 2,
            ..SessionScript::default()
        }));
        let comments = harvester(factory.clone(), settings())
            .harvest(&request())
            .await
            .unwrap();
        assert!(comments.is_empty());
        assert_eq!(factory.gotos().len(), 2);
        assert!(factory.closed());
    }

    #[tokio::test]
    async fn missing_sort_control_is_tolerated() {
        let factory = Arc::new(FakeSessionFactory::new(SessionScript {
            html: comment_page(2),
            hot_sort_visible: false,
            ..SessionScript::default()
        }));
        let comments = harvester(factory.clone(), settings())
            .harvest(&request())
            .await
            .unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(factory.clicks(HOT_SORT), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overall_budget_keeps_partial_results() {
        let factory = Arc::new(FakeSessionFactory::new(SessionScript {
            html: comment_page(2),
            load_more_rounds: None,
            ..SessionScript::default()
        }));
        let settings = HarvestSettings {
            settle_delay: Duration::from_secs(1),
            overall_timeout: Duration::from_secs(30),
            ..settings()
        };
        let comments = harvester(factory.clone(), settings)
            .harvest(&request())
            .await
            .unwrap();
        assert_eq!(comments.len(), 2);
        assert!(factory.clicks(LOAD_MORE) < 1000);
        assert!(factory.closed());
    }

    #[test]
    fn parses_comment_fields() {
        let html = r#"<div class="list_box"><div class="list_ul">
            <div comment_id="4576">
              <div class="list_con">
                <div class="WB_text"><a href="//weibo.com/u/123">评论者</a><a suda-data="x"><i title="微博会员"></i></a><a action-type="x" title="达人"></a>：说得好 </div>
                <div class="WB_func clearfix"><div class="WB_from S_txt2">5分钟前</div>
                  <ul class="clearfix"><li><span node-type="like_status"><em></em><em>12</em></span></li></ul>
                </div>
              </div>
            </div>
            <div comment_id="4577">
              <div class="list_con"><div class="WB_text"><a href="//weibo.com/u/456">路人</a>：嗯</div>
                <ul class="clearfix"><li><span node-type="like_status"><em></em><em>赞</em></span></li></ul>
              </div>
            </div>
            <div comment_id="4578"><div class="list_con"></div></div>
            <a action-type="click_more_comment">查看更多</a>
            </div></div>"#;
        let factory = Arc::new(FakeSessionFactory::new(SessionScript::default()));
        let comments = harvester(factory, settings()).extract_comments(html, &request());

        assert_eq!(comments.len(), 2);
        let first = &comments[0];
        assert_eq!(first.id, "4576");
        assert_eq!(first.weibo_bid, "JuK3a");
        assert_eq!(first.weibo_user_id, "1669879400");
        assert_eq!(first.user_id, "123");
        assert_eq!(first.screen_name, "评论者");
        assert_eq!(first.user_type, "微博会员;达人");
        assert_eq!(first.text, "评论者：说得好");
        assert_eq!(first.attitudes_count, "12");
        assert_eq!(first.created_at, "5分钟");

        let second = &comments[1];
        assert_eq!(second.user_type, OTHER_USER_TYPE);
        assert_eq!(second.attitudes_count, "0");
        assert_eq!(second.created_at, "");
    }
}
