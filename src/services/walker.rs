// src/services/walker.rs

//! Pagination over one partition's result pages.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;

use crate::error::{AppError, Result};
use crate::services::extractor::{PostExtractor, ResultPage};
use crate::utils::{http::PageFetcher, resolve};

/// Stream of result pages for one partition.
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = Result<ResultPage>> + Send + 'a>>;

/// Follows "next page" links from an already fetched first page.
pub struct PageWalker {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<PostExtractor>,
    search_base: String,
    delay: Duration,
}

impl PageWalker {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<PostExtractor>,
        search_base: impl Into<String>,
        delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            search_base: search_base.into(),
            delay,
        }
    }

    /// Yield `first`, fetched from `first_url`, then every following page
    /// until the links run out.
    ///
    /// No page limit is applied; the walk ends when the site stops linking a
    /// next page. Each URL, `first_url` included, is fetched at most once. A
    /// failed fetch ends the walk after yielding the error; pages already
    /// yielded stay valid.
    pub fn walk(&self, first_url: &str, first: ResultPage) -> PageStream<'_> {
        let first_url =
            resolve(&self.search_base, first_url).unwrap_or_else(|| first_url.to_string());
        Box::pin(stream! {
            let mut visited = HashSet::from([first_url]);
            let mut next = first.next_href.clone();
            yield Ok(first);

            while let Some(href) = next.take() {
                let Some(url) = resolve(&self.search_base, &href) else {
                    yield Err(AppError::crawl(href, "cannot resolve next page link"));
                    break;
                };
                if !visited.insert(url.clone()) {
                    log::debug!("Next page link loops back to {}", url);
                    break;
                }

                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }

                let page = match self.fetcher.fetch(&url).await {
                    Ok(html) => self.extractor.read_page(&html),
                    Err(error) => Err(error),
                };
                match page {
                    Ok(page) if page.is_empty => break,
                    Ok(page) => {
                        next = page.next_href.clone();
                        yield Ok(page);
                    }
                    Err(error) => {
                        yield Err(error);
                        break;
                    }
                }
            }
        })
    }
}
