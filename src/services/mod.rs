//! Service layer for the search crawler.
//!
//! This module contains the business logic for:
//! - Query planning over the result window cap (`QueryPlanner`)
//! - Pagination of one partition (`PageWalker`)
//! - Post and retweet extraction (`PostExtractor`)
//! - Comment harvesting through a browser session (`CommentHarvester`)

#[cfg(feature = "browser")]
mod browser;
pub mod extractor;
pub mod harvester;
pub mod normalize;
pub mod planner;
pub mod walker;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(feature = "browser")]
pub use browser::{ChromeSession, ChromeSessionFactory};
pub use extractor::{PostExtractor, ResultPage};
pub use harvester::{
    AutomationSession, CommentHarvester, HarvestSettings, SessionFactory, StepError, StepResult,
};
pub use planner::{PlannerEvent, PlannerStream, QueryPlanner};
pub use walker::{PageStream, PageWalker};
