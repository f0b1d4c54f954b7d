// src/services/normalize.rs

//! Field normalization for post and comment markup.
//!
//! Pure functions turning a markup fragment into cleaned text, the embedded
//! article link, the location, mentioned users and topics.

use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;

/// Prefix of the headline-article share text.
pub const ARTICLE_PREFIX: &str = "发布了头条文章";
/// Short-link domain prefix of article links.
pub const SHORT_LINK_PREFIX: &str = "http://t.cn";
/// The "collapse" affordance appended to a fully expanded body.
pub const FOLD_SUFFIX: &str = "收起全文d";
/// Unit marker for counts in the ten-thousands.
pub const TEN_THOUSAND: char = '万';

const ARTICLE_ICON: &str = "O";
const LOCATION_ICON: &str = "2";
const ZERO_WIDTH: [char; 2] = ['\u{200b}', '\u{e627}'];

static COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+.*").expect("valid regex"));
static SIZE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/.*?/").expect("valid regex"));

/// How a post body was rendered, which decides the cleanup applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendering {
    /// Text that carries no markers (comment bodies)
    Plain,
    /// The inline, possibly truncated body
    Truncated,
    /// The "show full text" expansion, which ends with the fold affordance
    Full,
}

/// Concatenated text content of an element.
pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect()
}

/// Whether the element's `class` attribute is exactly `class`.
pub fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element.value().attr("class") == Some(class)
}

/// Direct element children with the given tag name.
pub fn children_named<'a>(
    element: ElementRef<'a>,
    tag: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |child| child.value().name() == tag)
}

/// All `<a>` descendants in document order.
pub fn links<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    element
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|node| node.value().name() == "a")
}

/// Text of the `<i class="wbicon">` icon directly inside a link, if any.
fn icon_of(link: ElementRef<'_>) -> Option<String> {
    children_named(link, "i")
        .find(|i| has_class(*i, "wbicon"))
        .map(text_of)
}

/// Strip the body markers according to how the text was rendered.
///
/// Zero-width characters and the raw text of the location link (`marker`,
/// icon included) are always removed. Re-applying the cleanup to its own
/// output is a no-op.
pub fn clean_text(raw: &str, rendering: Rendering, marker: &str) -> String {
    let mut text: String = raw.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect();
    if !marker.is_empty() {
        text = text.replace(marker, "");
    }

    match rendering {
        Rendering::Plain => text.trim().to_string(),
        Rendering::Truncated => strip_leading(&text).trim_end().to_string(),
        Rendering::Full => strip_trailing(&strip_leading(&text)),
    }
}

/// Drop the line break and indentation in front of the body, and all spaces.
fn strip_leading(text: &str) -> String {
    text.trim_start().replace(' ', "")
}

fn strip_trailing(text: &str) -> String {
    let text = text.trim_end();
    let text = text
        .strip_suffix(FOLD_SUFFIX)
        .or_else(|| text.strip_suffix("收起全文"))
        .unwrap_or(text);
    text.trim_end().to_string()
}

/// Headline article link of a body, empty unless the body is an article share.
pub fn article_url(body: ElementRef<'_>) -> String {
    let compact: String = text_of(body)
        .chars()
        .filter(|c| !ZERO_WIDTH.contains(c) && *c != '\n' && *c != ' ')
        .collect();
    if !compact.starts_with(ARTICLE_PREFIX) {
        return String::new();
    }

    links(body)
        .filter(|link| icon_of(*link).as_deref() == Some(ARTICLE_ICON))
        .filter_map(|link| link.value().attr("href"))
        .find(|href| href.starts_with(SHORT_LINK_PREFIX))
        .unwrap_or_default()
        .to_string()
}

fn location_link<'a>(body: ElementRef<'a>) -> Option<ElementRef<'a>> {
    links(body).find(|link| icon_of(*link).as_deref() == Some(LOCATION_ICON))
}

/// Location attached to a body through the location marker icon.
pub fn location(body: ElementRef<'_>) -> String {
    location_link(body)
        .map(|link| {
            let label = text_of(link);
            let label = label.trim();
            label
                .strip_prefix(LOCATION_ICON)
                .unwrap_or(label)
                .trim()
                .to_string()
        })
        .unwrap_or_default()
}

/// Raw text of the location link, icon and whitespace included, as it
/// appears in the body text. Empty when the body has no location.
pub fn location_marker(body: ElementRef<'_>) -> String {
    location_link(body).map(text_of).unwrap_or_default()
}

/// Screen names of mentioned users, first-seen order.
///
/// A link is a mention when its decoded target ends with the profile path
/// of its own label (`@name` → `.../n/name`).
pub fn at_users(body: ElementRef<'_>) -> Vec<String> {
    let names = links(body).filter_map(|link| {
        let href = link.value().attr("href")?;
        let target = urlencoding::decode(href).ok()?;
        let label = text_of(link);
        let name = label.trim().strip_prefix('@')?;
        if name.is_empty() || !target.ends_with(&format!("/n/{name}")) {
            return None;
        }
        Some(name.to_string())
    });
    dedup(names)
}

/// Topic names (label between two `#`), first-seen order.
pub fn topics(body: ElementRef<'_>) -> Vec<String> {
    let names = links(body).filter_map(|link| {
        let label = text_of(link);
        let label = label.trim();
        if label.chars().count() <= 2 {
            return None;
        }
        label
            .strip_prefix('#')
            .and_then(|rest| rest.strip_suffix('#'))
            .map(str::to_string)
    });
    dedup(names)
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Count as shown by an action control (`转发 12` → `12`), `0` when absent.
///
/// The site's formatting is kept, so `1.2万` stays `1.2万`.
pub fn count_text(raw: Option<&str>) -> String {
    raw.and_then(|text| COUNT.find(text))
        .map(|m| m.as_str().trim().to_string())
        .filter(|count| !count.is_empty())
        .unwrap_or_else(|| "0".to_string())
}

/// Whether a comment count warrants harvesting the thread.
pub fn exceeds_threshold(count: &str, threshold: u64) -> bool {
    count.contains(TEN_THOUSAND) || count.parse::<u64>().is_ok_and(|n| n > threshold)
}

/// Publish time text with whitespace removed and the `前` ("ago") part dropped.
pub fn compact_time(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    compact.split('前').next().unwrap_or_default().to_string()
}

/// Thumbnail URL (`//host/thumb150/x.jpg`) rewritten to its large rendition.
pub fn large_image_url(src: &str) -> String {
    let path = src.strip_prefix("//").unwrap_or(src);
    format!("http://{}", SIZE_TOKEN.replacen(path, 1, "/large/"))
}

/// Absolute video URL from a thumbnail's `action-data`.
pub fn video_url(action_data: &str) -> String {
    let decoded = urlencoding::decode(action_data)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| action_data.to_string());
    let source = decoded.rsplit("video_src=//").next().unwrap_or_default();
    format!("http://{source}")
}
