// src/services/extractor.rs

//! Post extraction from rendered search result pages.
//!
//! Reads one results page into normalized [`Post`] records. A forwarded post
//! is unwrapped into its own [`SearchRecord::Retweet`] emitted right before
//! the post that embeds it. Posts with busy comment threads are reported as
//! [`HarvestRequest`]s.
//!
//! Search pages served to an unauthenticated session lack the structure
//! below; a missing required field is reported as
//! [`AppError::InvalidSession`], which stops the whole crawl.

use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{HarvestRequest, OTHER_USER_TYPE, Post, SearchRecord};
use crate::services::normalize::{self, Rendering};
use crate::utils::date::standardize_date;
use crate::utils::last_path_segment;

/// Everything the crawler needs from one results page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultPage {
    /// The "no results" marker is present
    pub is_empty: bool,

    /// Items in the page navigation strip; saturates at the window cap
    pub window_len: usize,

    /// Raw href of the "next page" link
    pub next_href: Option<String>,

    /// Posts and retweets in page order
    pub records: Vec<SearchRecord>,

    /// Posts whose comment threads should be harvested
    pub harvests: Vec<HarvestRequest>,
}

/// Compiled selectors for the search result markup.
struct PageSelectors {
    no_result: Selector,
    window_items: Selector,
    next: Selector,
    card: Selector,
    info: Selector,
    from: Selector,
    txt: Selector,
    full_txt: Selector,
    retweet: Selector,
    forward_content: Selector,
    forward: Selector,
    comment: Selector,
    like: Selector,
    em: Selector,
    act_items: Selector,
    piclist: Selector,
    video: Selector,
}

impl PageSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            no_result: parse_selector(r#"div[class="card card-no-result s-pt20b40"]"#)?,
            window_items: parse_selector(r#"ul[class="s-scroll"] > li"#)?,
            next: parse_selector(r#"a[class="next"]"#)?,
            card: parse_selector(r#"div[class="card-wrap"]"#)?,
            info: parse_selector(
                r#"div[class="card"] > div[class="card-feed"] > div[class="content"] > div[class="info"]"#,
            )?,
            from: parse_selector(r#"p[class="from"]"#)?,
            txt: parse_selector(r#"p[class="txt"]"#)?,
            full_txt: parse_selector(r#"p[node-type="feed_list_content_full"]"#)?,
            retweet: parse_selector(r#"div[class="card-comment"]"#)?,
            forward_content: parse_selector(r#"div[node-type="feed_list_forwardContent"]"#)?,
            forward: parse_selector(r#"a[action-type="feed_list_forward"]"#)?,
            comment: parse_selector(r#"a[action-type="feed_list_comment"]"#)?,
            like: parse_selector(r#"a[action-type="feed_list_like"]"#)?,
            em: parse_selector("em")?,
            act_items: parse_selector(r#"ul[class="act s-fr"] > li"#)?,
            piclist: parse_selector(r#"div[class="media media-piclist"]"#)?,
            video: parse_selector(r#"div[class="thumbnail"] > a"#)?,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| AppError::invalid_session(field))
}

/// Body text paragraphs chosen for a card and its forwarded post.
struct Bodies<'a> {
    post: ElementRef<'a>,
    post_rendering: Rendering,
    retweet: Option<ElementRef<'a>>,
    retweet_rendering: Rendering,
}

/// Media found anywhere in a card.
#[derive(Default)]
struct Media {
    pics: Vec<String>,
    video_url: String,
}

/// Extracts posts from search result pages.
pub struct PostExtractor {
    selectors: PageSelectors,
    harvest_threshold: u64,
}

impl PostExtractor {
    /// Create an extractor queueing posts with more than `harvest_threshold` comments.
    pub fn new(harvest_threshold: u64) -> Result<Self> {
        Ok(Self {
            selectors: PageSelectors::new()?,
            harvest_threshold,
        })
    }

    /// Read a results page, normalizing relative publish times against the local clock.
    pub fn read_page(&self, html: &str) -> Result<ResultPage> {
        self.read_page_at(html, chrono::Local::now().naive_local())
    }

    /// Read a results page, normalizing relative publish times against `now`.
    pub fn read_page_at(&self, html: &str, now: NaiveDateTime) -> Result<ResultPage> {
        let document = Html::parse_document(html);
        let sel = &self.selectors;

        if document.select(&sel.no_result).next().is_some() {
            return Ok(ResultPage {
                is_empty: true,
                ..ResultPage::default()
            });
        }

        let mut page = ResultPage {
            window_len: document.select(&sel.window_items).count(),
            next_href: document
                .select(&sel.next)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::to_string),
            ..ResultPage::default()
        };

        for card in document.select(&sel.card) {
            let Some(info) = card.select(&sel.info).next() else {
                continue;
            };
            self.extract_card(card, info, now, &mut page)?;
        }

        Ok(page)
    }

    fn extract_card(
        &self,
        card: ElementRef<'_>,
        info: ElementRef<'_>,
        now: NaiveDateTime,
        page: &mut ResultPage,
    ) -> Result<()> {
        let sel = &self.selectors;
        let retweet_block = card.select(&sel.retweet).next();
        let bodies = self.choose_bodies(card, retweet_block)?;
        let media = self.media(card);

        let mut post = Post {
            id: required(card.value().attr("mid"), "mid")?.to_string(),
            ..Post::default()
        };

        let from = required(card.select(&sel.from).last(), "p.from")?;
        self.fill_provenance(&mut post, from, now, "permalink")?;

        let author = required(
            normalize::children_named(info, "div")
                .nth(1)
                .and_then(|div| normalize::children_named(div, "a").next()),
            "author link",
        )?;
        post.user_id =
            last_path_segment(required(author.value().attr("href"), "author href")?);
        post.screen_name = author.value().attr("nick-name").unwrap_or_default().to_string();
        post.user_type = user_type(
            normalize::children_named(info, "div")
                .nth(1)
                .and_then(|div| normalize::children_named(div, "a").nth(1)),
        );

        fill_body(&mut post, bodies.post, bodies.post_rendering);

        let forward = required(card.select(&sel.forward).next(), "feed_list_forward")?;
        post.reposts_count = normalize::count_text(Some(&normalize::text_of(forward)));
        post.comments_count = normalize::count_text(
            card.select(&sel.comment)
                .next()
                .map(normalize::text_of)
                .as_deref(),
        );
        post.attitudes_count = normalize::count_text(
            card.select(&sel.like)
                .last()
                .and_then(|like| like.select(&sel.em).next())
                .map(normalize::text_of)
                .as_deref(),
        );

        if retweet_block.is_none() {
            post.pics = media.pics;
            post.video_url = media.video_url;
        } else if let Some(retweet) =
            self.extract_retweet(retweet_block, bodies.retweet, bodies.retweet_rendering, media, now)?
        {
            if normalize::exceeds_threshold(&retweet.comments_count, self.harvest_threshold) {
                page.harvests.push(retweet.harvest_request());
            }
            post.retweet_id = retweet.id.clone();
            page.records.push(SearchRecord::Retweet(retweet));
        }

        if normalize::exceeds_threshold(&post.comments_count, self.harvest_threshold) {
            page.harvests.push(post.harvest_request());
        }
        page.records.push(SearchRecord::Post(post));
        Ok(())
    }

    /// Prefer the "full text" expansions over the truncated bodies.
    fn choose_bodies<'a>(
        &self,
        card: ElementRef<'a>,
        retweet_block: Option<ElementRef<'a>>,
    ) -> Result<Bodies<'a>> {
        let sel = &self.selectors;
        let mut bodies = Bodies {
            post: required(card.select(&sel.txt).next(), "p.txt")?,
            post_rendering: Rendering::Truncated,
            retweet: retweet_block.and_then(|block| block.select(&sel.txt).next()),
            retweet_rendering: Rendering::Truncated,
        };

        let full: Vec<_> = card.select(&sel.full_txt).collect();
        let Some(&first_full) = full.first() else {
            return Ok(bodies);
        };

        match retweet_block {
            None => {
                bodies.post = first_full;
                bodies.post_rendering = Rendering::Full;
            }
            Some(_) if full.len() == 2 => {
                bodies.post = first_full;
                bodies.post_rendering = Rendering::Full;
                bodies.retweet = Some(full[1]);
                bodies.retweet_rendering = Rendering::Full;
            }
            Some(block) => match block.select(&sel.full_txt).next() {
                Some(retweet_full) => {
                    bodies.retweet = Some(retweet_full);
                    bodies.retweet_rendering = Rendering::Full;
                }
                None => {
                    bodies.post = first_full;
                    bodies.post_rendering = Rendering::Full;
                }
            },
        }
        Ok(bodies)
    }

    fn media(&self, card: ElementRef<'_>) -> Media {
        let sel = &self.selectors;
        let pics = card
            .select(&sel.piclist)
            .next()
            .and_then(|list| normalize::children_named(list, "ul").next())
            .map(|ul| {
                normalize::children_named(ul, "li")
                    .flat_map(|li| normalize::children_named(li, "img"))
                    .filter_map(|img| img.value().attr("src"))
                    .map(normalize::large_image_url)
                    .collect()
            })
            .unwrap_or_default();
        let video_url = card
            .select(&sel.video)
            .find_map(|a| a.value().attr("action-data"))
            .map(normalize::video_url)
            .unwrap_or_default();
        Media { pics, video_url }
    }

    /// Permalink short id, publish time and client from a `p.from` paragraph.
    fn fill_provenance(
        &self,
        post: &mut Post,
        from: ElementRef<'_>,
        now: NaiveDateTime,
        field: &str,
    ) -> Result<()> {
        let mut anchors = normalize::children_named(from, "a");
        let permalink = required(anchors.next(), field)?;
        post.bid = last_path_segment(required(permalink.value().attr("href"), field)?);
        post.created_at = standardize_date(
            &normalize::compact_time(&normalize::text_of(permalink)),
            now,
        );
        post.source = anchors.next().map(normalize::text_of).unwrap_or_default();
        Ok(())
    }

    /// Build the forwarded post, if the block still references its author.
    fn extract_retweet(
        &self,
        block: Option<ElementRef<'_>>,
        body: Option<ElementRef<'_>>,
        rendering: Rendering,
        media: Media,
        now: NaiveDateTime,
    ) -> Result<Option<Post>> {
        let sel = &self.selectors;
        let Some(block) = block else {
            return Ok(None);
        };
        let Some(content) = block.select(&sel.forward_content).next() else {
            return Ok(None);
        };
        let Some(author) = normalize::children_named(content, "a").next() else {
            return Ok(None);
        };

        let like = required(block.select(&sel.like).next(), "retweet feed_list_like")?;
        let action_data = required(like.value().attr("action-data"), "retweet mid")?;

        let mut retweet = Post {
            id: action_data
                .strip_prefix("mid=")
                .unwrap_or(action_data)
                .to_string(),
            user_id: last_path_segment(author.value().attr("href").unwrap_or_default()),
            screen_name: author.value().attr("nick-name").unwrap_or_default().to_string(),
            user_type: user_type(normalize::children_named(content, "a").nth(1)),
            pics: media.pics,
            video_url: media.video_url,
            ..Post::default()
        };

        let from = required(block.select(&sel.from).next(), "retweet p.from")?;
        self.fill_provenance(&mut retweet, from, now, "retweet permalink")?;

        if let Some(body) = body {
            fill_body(&mut retweet, body, rendering);
        }

        let mut act = block.select(&sel.act_items);
        let mut act_count = |item: Option<ElementRef<'_>>| {
            normalize::count_text(
                item.and_then(|li| normalize::children_named(li, "a").next())
                    .map(normalize::text_of)
                    .as_deref(),
            )
        };
        retweet.reposts_count = act_count(act.next());
        retweet.comments_count = act_count(act.next());
        retweet.attitudes_count = normalize::count_text(
            like.select(&sel.em)
                .next()
                .map(normalize::text_of)
                .as_deref(),
        );

        Ok(Some(retweet))
    }
}

/// Text, location, article link, mentions and topics of a body paragraph.
fn fill_body(post: &mut Post, body: ElementRef<'_>, rendering: Rendering) {
    post.location = normalize::location(body);
    post.text = normalize::clean_text(
        &normalize::text_of(body),
        rendering,
        &normalize::location_marker(body),
    );
    post.article_url = normalize::article_url(body);
    post.at_users = normalize::at_users(body);
    post.topics = normalize::topics(body);
}

fn user_type(badge: Option<ElementRef<'_>>) -> String {
    badge
        .and_then(|a| a.value().attr("title"))
        .filter(|title| !title.is_empty())
        .unwrap_or(OTHER_USER_TYPE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"<html><body><div class="m-page"><ul class="s-scroll"><li>1</li><li>2</li></ul>
        <a class="next" href="/weibo?q=k&page=2">下一页</a></div>"#;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2020-11-20 12:00", "%Y-%m-%d %H:%M").unwrap()
    }

    fn card(mid: &str, body: &str, comments: &str, extra: &str) -> String {
        format!(
            r#"<div class="card-wrap" mid="{mid}"><div class="card"><div class="card-feed">
            <div class="avator"></div>
            <div class="content">
              <div class="info">
                <div class="menu"></div>
                <div><a href="//weibo.com/1669879400?refer_flag=1001030103_" nick-name="作者">作者</a><a title="微博个人认证"><i></i></a></div>
              </div>
              <p class="txt" node-type="feed_list_content">{body}</p>
              {extra}
              <p class="from"><a href="//weibo.com/1669879400/JuK3a?refer_flag=1001030103_">
                  2019年12月31日 23:59 </a><a rel="nofollow">iPhone客户端</a></p>
            </div></div>
            <div class="card-act"><ul>
              <li><a action-type="feed_list_forward">转发 3</a></li>
              <li><a action-type="feed_list_comment">评论 {comments}</a></li>
              <li><a action-type="feed_list_like" action-data="mid={mid}"><em>7</em></a></li>
            </ul></div></div></div>"#
        )
    }

    fn page(cards: &[String]) -> String {
        format!("{HEADER}{}</body></html>", cards.concat())
    }

    fn extractor() -> PostExtractor {
        PostExtractor::new(20).unwrap()
    }

    fn posts(page: &ResultPage) -> Vec<&Post> {
        page.records.iter().map(SearchRecord::post).collect()
    }

    #[test]
    fn empty_marker_short_circuits() {
        let html = r#"<div class="card card-no-result s-pt20b40">抱歉</div>"#;
        let page = extractor().read_page_at(html, now()).unwrap();
        assert!(page.is_empty);
        assert!(page.records.is_empty());
    }

    #[test]
    fn reads_window_and_next_link() {
        let page = extractor().read_page_at(&page(&[]), now()).unwrap();
        assert!(!page.is_empty);
        assert_eq!(page.window_len, 2);
        assert_eq!(page.next_href.as_deref(), Some("/weibo?q=k&page=2"));
    }

    #[test]
    fn extracts_post_fields() {
        let body = r#"
                  ​今天 <a href="//weibo.com/n/%E5%B0%8F%E6%98%8E">@小明</a>
                  <a href="//s.weibo.com/weibo?q=%23早安%23">#早安#</a>
                  <a href="//weibo.com/p/1"><i class="wbicon">2</i>北京·三里屯</a>"#;
        let html = page(&[card("4587", body, "15", "")]);
        let page = extractor().read_page_at(&html, now()).unwrap();

        assert_eq!(page.records.len(), 1);
        let post = posts(&page)[0];
        assert_eq!(post.id, "4587");
        assert_eq!(post.bid, "JuK3a");
        assert_eq!(post.user_id, "1669879400");
        assert_eq!(post.screen_name, "作者");
        assert_eq!(post.user_type, "微博个人认证");
        assert_eq!(post.location, "北京·三里屯");
        assert_eq!(post.text, "今天@小明\n#早安#");
        assert_eq!(post.at_users, vec!["小明"]);
        assert_eq!(post.topics, vec!["早安"]);
        assert_eq!(post.reposts_count, "3");
        assert_eq!(post.comments_count, "15");
        assert_eq!(post.attitudes_count, "7");
        assert_eq!(post.created_at, "2019-12-31 23:59");
        assert_eq!(post.source, "iPhone客户端");
        assert_eq!(post.retweet_id, "");
        assert!(page.harvests.is_empty());
    }

    #[test]
    fn article_share_is_not_harvested_below_threshold() {
        let body = r#"
            发布了头条文章  some text <a href="http://t.cn/A6x"><i class="wbicon">O</i>标题</a>"#;
        let html = page(&[card("1", body, "15", "")]);
        let page = extractor().read_page_at(&html, now()).unwrap();
        let post = posts(&page)[0];
        assert_eq!(post.article_url, "http://t.cn/A6x");
        assert_eq!(post.location, "");
        assert_eq!(post.comments_count, "15");
        assert!(page.harvests.is_empty());
    }

    #[test]
    fn ten_thousand_marker_queues_harvest() {
        let html = page(&[card("9", "\n  正文", "2万", "")]);
        let page = extractor().read_page_at(&html, now()).unwrap();
        assert_eq!(
            page.harvests,
            vec![HarvestRequest {
                post_id: "9".into(),
                bid: "JuK3a".into(),
                user_id: "1669879400".into(),
            }]
        );
    }

    #[test]
    fn missing_badge_defaults_to_other() {
        let html = page(&[card("1", "\n 正文", "0", "")]).replace(
            r#"<a title="微博个人认证"><i></i></a>"#,
            "",
        );
        let page = extractor().read_page_at(&html, now()).unwrap();
        assert_eq!(posts(&page)[0].user_type, OTHER_USER_TYPE);
    }

    #[test]
    fn full_text_expansion_is_preferred() {
        let full = r#"<p class="txt" node-type="feed_list_content_full">
              很长很长的 正文 全部 收起全文<i class="wbicon">d</i></p>"#;
        let html = page(&[card("1", "\n  很长很长的…展开全文", "0", full)]);
        let page = extractor().read_page_at(&html, now()).unwrap();
        assert_eq!(posts(&page)[0].text, "很长很长的正文全部");
    }

    #[test]
    fn media_belongs_to_post_without_retweet() {
        let media = r#"<div class="media media-piclist"><ul><li><img src="//wx1.sinaimg.cn/thumb150/a.jpg"></li>
            <li><img src="//wx2.sinaimg.cn/orj360/b.jpg"></li></ul></div>"#;
        let html = page(&[card("1", "\n 图", "0", media)]);
        let page = extractor().read_page_at(&html, now()).unwrap();
        assert_eq!(
            posts(&page)[0].pics,
            vec![
                "http://wx1.sinaimg.cn/large/a.jpg",
                "http://wx2.sinaimg.cn/large/b.jpg"
            ]
        );
    }

    fn retweet_block(comments: &str, with_media: bool) -> String {
        let media = if with_media {
            r#"<div class="thumbnail"><a action-data="type=feedvideo&video_src=%2F%2Ff.video.cn%2Fv.mp4"></a></div>"#
        } else {
            ""
        };
        format!(
            r#"<div class="card-comment"><div node-type="feed_list_forwardContent">
              <a href="//weibo.com/2803301701" nick-name="原作者">@原作者</a><a title="微博官方认证"></a>
              <p class="txt" node-type="feed_list_content">
                原文 <a href="//s.weibo.com/weibo?q=%23话题%23">#话题#</a></p></div>
              {media}
              <div class="func"><ul class="act s-fr">
                <li><a href="//weibo.com/x">转发 100</a></li>
                <li><a href="//weibo.com/y">评论 {comments}</a></li>
                <li><a action-type="feed_list_like" action-data="mid=4500"><em>99</em></a></li>
              </ul>
              <p class="from"><a href="//weibo.com/2803301701/Jt9aB?refer_flag=1">11月19日 08:30</a><a>微博 weibo.com</a></p>
              </div></div>"#
        )
    }

    #[test]
    fn retweet_is_emitted_as_sibling_record() {
        let html = page(&[card("10", "\n 转发理由", "3", &retweet_block("1.2万", true))]);
        let page = extractor().read_page_at(&html, now()).unwrap();

        assert_eq!(page.records.len(), 2);
        let SearchRecord::Retweet(retweet) = &page.records[0] else {
            panic!("expected retweet first");
        };
        let SearchRecord::Post(post) = &page.records[1] else {
            panic!("expected post second");
        };

        assert_eq!(retweet.id, "4500");
        assert_eq!(retweet.bid, "Jt9aB");
        assert_eq!(retweet.user_id, "2803301701");
        assert_eq!(retweet.screen_name, "原作者");
        assert_eq!(retweet.user_type, "微博官方认证");
        assert_eq!(retweet.text, "原文#话题#");
        assert_eq!(retweet.topics, vec!["话题"]);
        assert_eq!(retweet.reposts_count, "100");
        assert_eq!(retweet.comments_count, "1.2万");
        assert_eq!(retweet.attitudes_count, "99");
        assert_eq!(retweet.created_at, "2020-11-19 08:30");
        assert_eq!(retweet.retweet_id, "");
        assert_eq!(retweet.video_url, "http://f.video.cn/v.mp4");

        assert_eq!(post.retweet_id, retweet.id);
        assert!(post.pics.is_empty());
        assert_eq!(post.video_url, "");
        assert_eq!(post.text, "转发理由");
        assert_eq!(post.reposts_count, "3");

        // The retweet is harvested under its own identity.
        assert_eq!(
            page.harvests,
            vec![HarvestRequest {
                post_id: "4500".into(),
                bid: "Jt9aB".into(),
                user_id: "2803301701".into(),
            }]
        );
    }

    #[test]
    fn outer_media_cleared_even_when_retweet_has_none() {
        let html = page(&[card("10", "\n 转发", "3", &retweet_block("0", false))]);
        let page = extractor().read_page_at(&html, now()).unwrap();
        let SearchRecord::Post(post) = &page.records[1] else {
            panic!("expected post");
        };
        assert!(post.pics.is_empty());
        assert_eq!(post.video_url, "");
    }

    #[test]
    fn missing_forward_control_means_invalid_session() {
        let html = page(&[card("1", "\n 正文", "0", "")]).replace("feed_list_forward", "x");
        let err = extractor().read_page_at(&html, now()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_mid_means_invalid_session() {
        let html = page(&[card("1", "\n 正文", "0", "")]).replace(r#"mid="1""#, "");
        assert!(matches!(
            extractor().read_page_at(&html, now()),
            Err(AppError::InvalidSession { .. })
        ));
    }

    #[test]
    fn cards_without_info_are_skipped() {
        let html = page(&[r#"<div class="card-wrap"><div class="card card-top">热门</div></div>"#.to_string()]);
        let page = extractor().read_page_at(&html, now()).unwrap();
        assert!(page.records.is_empty());
    }
}
