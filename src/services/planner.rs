// src/services/planner.rs

//! Query planning over the result window cap.
//!
//! The search surface only exposes a limited window of result pages per
//! query. A partition whose first page shows a full navigation strip is
//! split into finer partitions, following the escalation ladder
//!
//! ```text
//! whole range -> days -> hours -> regions (nationwide only) -> cities
//! ```
//!
//! Partitions are reported depth-first in catalog order, while siblings are
//! probed concurrently. Each partition is probed with one fetch; that page is
//! reused as the first page of the walk when the partition fits.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::stream::{self, Stream, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{Config, HarvestRequest, Partition, RegionCatalog, SearchRecord};
use crate::services::extractor::{PostExtractor, ResultPage};
use crate::services::walker::PageWalker;
use crate::utils::http::{BoundedFetcher, PageFetcher};

/// Something the planner found or decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerEvent {
    Record(SearchRecord),
    Harvest(HarvestRequest),
    /// The probe showed the "no results" marker
    Empty(Partition),
    /// The partition was too large and has been replaced by `children` partitions
    Escalated { partition: Partition, children: usize },
    /// The partition was paginated to the end
    Walked {
        partition: Partition,
        pages: usize,
        /// The window was still full at the finest granularity
        saturated: bool,
    },
}

/// Lazy sequence of planner events for one root partition.
pub type PlannerStream<'a> = Pin<Box<dyn Stream<Item = Result<PlannerEvent>> + Send + 'a>>;

/// Enumerates a root partition through the escalation ladder.
pub struct QueryPlanner {
    config: Arc<Config>,
    catalog: Arc<RegionCatalog>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<PostExtractor>,
    walker: PageWalker,
}

impl QueryPlanner {
    pub fn new(
        config: Arc<Config>,
        catalog: Arc<RegionCatalog>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self> {
        let fetcher: Arc<dyn PageFetcher> =
            Arc::new(BoundedFetcher::new(fetcher, config.crawler.max_concurrent));
        let extractor = Arc::new(PostExtractor::new(config.comments.harvest_threshold)?);
        let walker = PageWalker::new(
            Arc::clone(&fetcher),
            Arc::clone(&extractor),
            config.search.search_base.clone(),
            Duration::from_millis(config.crawler.request_delay_ms),
        );
        Ok(Self {
            config,
            catalog,
            fetcher,
            extractor,
            walker,
        })
    }

    /// Enumerate everything under `root`.
    ///
    /// Errors scoped to one partition are yielded and enumeration continues
    /// with the next partition. An invalid session is yielded last and ends
    /// the stream.
    ///
    /// Sibling partitions are explored up to `crawler.max_concurrent` at a
    /// time; their events are still yielded in catalog order, each sibling's
    /// events once it has finished.
    pub fn enumerate(&self, root: Partition) -> PlannerStream<'_> {
        self.explore(root, false)
    }

    fn explore(&self, partition: Partition, delayed: bool) -> PlannerStream<'_> {
        Box::pin(stream! {
            let delay = Duration::from_millis(self.config.crawler.request_delay_ms);
            if delayed && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let url = partition.search_url(&self.config.search);
            let page = match self.probe(&url).await {
                Ok(page) => page,
                Err(error) if error.is_fatal() => {
                    log::error!("Stopping at {}: {}", partition, error);
                    yield Err(error);
                    return;
                }
                Err(error) => {
                    log::warn!("Probe failed for {}: {}", partition, error);
                    yield Err(AppError::crawl(partition.to_string(), error));
                    return;
                }
            };

            if page.is_empty {
                log::debug!("No results for {}", partition);
                yield Ok(PlannerEvent::Empty(partition));
                return;
            }

            let saturated = page.window_len >= self.config.search.window_cap;
            if saturated {
                if let Some(children) = partition.refine(&self.catalog) {
                    log::debug!(
                        "{} fills the result window, splitting into {} partitions",
                        partition,
                        children.len()
                    );
                    let count = children.len();
                    yield Ok(PlannerEvent::Escalated { partition, children: count });

                    let mut siblings = stream::iter(children)
                        .map(|child| self.explore(child, true).collect::<Vec<_>>())
                        .buffered(self.config.crawler.max_concurrent.max(1));
                    while let Some(events) = siblings.next().await {
                        for event in events {
                            let fatal = matches!(&event, Err(error) if error.is_fatal());
                            yield event;
                            if fatal {
                                return;
                            }
                        }
                    }
                    return;
                }
                log::warn!(
                    "{} still fills the result window and cannot be split further; results past the window are lost",
                    partition
                );
            } else {
                log::debug!("{} fits in {} result pages", partition, page.window_len);
            }

            let mut pages = 0;
            let mut walk = self.walker.walk(&url, page);
            while let Some(result) = walk.next().await {
                match result {
                    Ok(page) => {
                        pages += 1;
                        for record in page.records {
                            yield Ok(PlannerEvent::Record(record));
                        }
                        for request in page.harvests {
                            yield Ok(PlannerEvent::Harvest(request));
                        }
                    }
                    Err(error) if error.is_fatal() => {
                        log::error!("Stopping at {}: {}", partition, error);
                        yield Err(error);
                        return;
                    }
                    Err(error) => {
                        log::warn!("Pagination stopped for {}: {}", partition, error);
                        yield Err(AppError::crawl(partition.to_string(), error));
                    }
                }
            }

            yield Ok(PlannerEvent::Walked { partition, pages, saturated });
        })
    }

    /// Fetch and read the first page of a partition.
    async fn probe(&self, url: &str) -> Result<ResultPage> {
        let html = self.fetcher.fetch(url).await?;
        self.extractor.read_page(&html)
    }
}
