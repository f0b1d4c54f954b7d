// src/pipeline/search.rs

//! Search crawling pipeline.
//!
//! Stage 1 enumerates every keyword × region root partition concurrently and
//! streams the records into the sink. Stage 2 harvests the comment threads
//! queued during stage 1 with a bounded number of browser sessions.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{Config, HarvestRequest, Partition, RegionCatalog, SearchRecord};
use crate::services::{CommentHarvester, PlannerEvent, QueryPlanner};
use crate::storage::RecordSink;
use crate::utils::http::PageFetcher;

/// Summary of a search run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    pub root_partitions: usize,
    pub posts: usize,
    pub retweets: usize,
    pub duplicates: usize,
    pub pages: usize,
    pub empty_partitions: usize,
    pub escalations: usize,
    pub walked_partitions: usize,
    /// Finest-granularity partitions whose window was still full
    pub saturated_partitions: usize,
    pub partition_failures: usize,
    pub harvests_attempted: usize,
    pub harvest_failures: usize,
    pub comments: usize,
}

impl SearchOutcome {
    fn merge(&mut self, other: &SearchOutcome) {
        self.posts += other.posts;
        self.retweets += other.retweets;
        self.duplicates += other.duplicates;
        self.pages += other.pages;
        self.empty_partitions += other.empty_partitions;
        self.escalations += other.escalations;
        self.walked_partitions += other.walked_partitions;
        self.saturated_partitions += other.saturated_partitions;
        self.partition_failures += other.partition_failures;
    }
}

/// Records and queued harvests of one root partition.
#[derive(Default)]
struct RootOutcome {
    stats: SearchOutcome,
    harvests: Vec<(String, HarvestRequest)>,
}

/// Root partitions: every keyword over the whole date range, once per
/// selected region or once without a region filter.
pub fn root_partitions(config: &Config, catalog: &RegionCatalog) -> Result<Vec<Partition>> {
    let (first, last) = config.search.date_range()?;
    let regions = if config.search.is_nationwide() {
        vec![None]
    } else {
        catalog
            .select(&config.search.regions)?
            .into_iter()
            .map(Some)
            .collect()
    };

    let mut roots = Vec::new();
    for keyword in &config.search.keywords {
        for region in &regions {
            roots.push(Partition::root(
                keyword.clone(),
                first,
                last,
                region.as_ref(),
            )?);
        }
    }
    Ok(roots)
}

/// Run the search crawler.
///
/// Comments are only harvested when a `harvester` is given. An invalid
/// session stops the run and is returned as the error; records written
/// before it stay in the sink.
pub async fn run_search(
    config: Arc<Config>,
    catalog: Arc<RegionCatalog>,
    fetcher: Arc<dyn PageFetcher>,
    harvester: Option<&CommentHarvester>,
    sink: &dyn RecordSink,
) -> Result<SearchOutcome> {
    let start_time = Utc::now();
    let roots = root_partitions(&config, &catalog)?;
    log::info!(
        "Searching {} keywords in {} root partitions",
        config.search.keywords.len(),
        roots.len()
    );

    let mut outcome = SearchOutcome {
        root_partitions: roots.len(),
        ..SearchOutcome::default()
    };
    let planner = QueryPlanner::new(Arc::clone(&config), catalog, fetcher)?;
    let concurrency = config.crawler.max_concurrent.max(1);

    // Stage 1: enumerate root partitions concurrently.
    let mut queued = Vec::new();
    let mut root_stream = stream::iter(roots)
        .map(|root| {
            let planner = &planner;
            async move { enumerate_root(planner, sink, root).await }
        })
        .buffer_unordered(concurrency);

    while let Some(result) = root_stream.next().await {
        let root = result?;
        outcome.merge(&root.stats);
        queued.extend(root.harvests);
    }
    drop(root_stream);

    // Stage 2: harvest comment threads, one session per post.
    let mut seen = HashSet::new();
    let jobs: Vec<_> = queued
        .into_iter()
        .filter(|(_, request)| seen.insert(request.post_id.clone()))
        .collect();

    match harvester {
        Some(harvester) if config.comments.enabled => {
            outcome.harvests_attempted = jobs.len();
            log::info!("Harvesting comments of {} posts", jobs.len());

            let mut harvest_stream = stream::iter(jobs)
                .map(|(keyword, request)| async move {
                    let result = harvester.harvest(&request).await;
                    (keyword, request, result)
                })
                .buffer_unordered(config.comments.max_sessions.max(1));

            while let Some((keyword, request, result)) = harvest_stream.next().await {
                match result {
                    Ok(comments) => {
                        for comment in &comments {
                            if sink.write_comment(&keyword, comment).await? {
                                outcome.comments += 1;
                            }
                        }
                    }
                    Err(error) => {
                        outcome.harvest_failures += 1;
                        log::warn!("Comment harvest failed for {}: {}", request.post_id, error);
                    }
                }
            }
        }
        _ => {
            if !jobs.is_empty() {
                log::info!("Comment harvesting disabled, skipping {} posts", jobs.len());
            }
        }
    }

    let elapsed = Utc::now() - start_time;
    log_summary(&outcome, elapsed.num_seconds());
    Ok(outcome)
}

async fn enumerate_root(
    planner: &QueryPlanner,
    sink: &dyn RecordSink,
    root: Partition,
) -> Result<RootOutcome> {
    let keyword = root.keyword.clone();
    let mut outcome = RootOutcome::default();
    let stats = &mut outcome.stats;

    let mut events = planner.enumerate(root);
    while let Some(event) = events.next().await {
        match event {
            Ok(PlannerEvent::Record(record)) => {
                let new = sink.write_record(&keyword, &record).await?;
                match (&record, new) {
                    (_, false) => stats.duplicates += 1,
                    (SearchRecord::Post(_), true) => stats.posts += 1,
                    (SearchRecord::Retweet(_), true) => stats.retweets += 1,
                }
            }
            Ok(PlannerEvent::Harvest(request)) => {
                outcome.harvests.push((keyword.clone(), request));
            }
            Ok(PlannerEvent::Empty(_)) => stats.empty_partitions += 1,
            Ok(PlannerEvent::Escalated { .. }) => stats.escalations += 1,
            Ok(PlannerEvent::Walked {
                pages, saturated, ..
            }) => {
                stats.walked_partitions += 1;
                stats.pages += pages;
                if saturated {
                    stats.saturated_partitions += 1;
                }
            }
            Err(error) if error.is_fatal() => return Err(error),
            Err(_) => stats.partition_failures += 1,
        }
    }
    Ok(outcome)
}

fn log_summary(outcome: &SearchOutcome, seconds: i64) {
    log::info!("[SUMMARY] Search finished in {}s", seconds);
    log::info!(
        "    records: {} posts, {} retweets, {} duplicates dropped, {} pages",
        outcome.posts,
        outcome.retweets,
        outcome.duplicates,
        outcome.pages
    );
    log::info!(
        "    partitions: {} roots, {} empty, {} escalated, {} walked, {} failed",
        outcome.root_partitions,
        outcome.empty_partitions,
        outcome.escalations,
        outcome.walked_partitions,
        outcome.partition_failures
    );
    if outcome.saturated_partitions > 0 {
        log::warn!(
            "    {} partitions were still saturated at city level; some results were not reachable",
            outcome.saturated_partitions
        );
    }
    log::info!(
        "    comments: {} from {} harvested posts ({} failed)",
        outcome.comments,
        outcome.harvests_attempted,
        outcome.harvest_failures
    );
}
