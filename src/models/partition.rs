// src/models/partition.rs

//! Query partitions: one bounded slice of keyword × time × region × city.

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{AppError, Result};
use crate::models::config::SearchConfig;
use crate::models::region::{City, Region, RegionCatalog};

/// Region filter carried by a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionFilter {
    pub name: String,
    pub code: String,
}

impl From<&Region> for RegionFilter {
    fn from(region: &Region) -> Self {
        Self {
            name: region.name.clone(),
            code: region.code.clone(),
        }
    }
}

/// Width of a partition's time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// The whole configured date range
    Range,
    Day,
    Hour,
}

/// One concrete, boundable search query.
///
/// Partitions are immutable once built; refinement produces new values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub keyword: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub granularity: Granularity,
    pub region: Option<RegionFilter>,
    pub city: Option<City>,
    pub page: Option<u32>,
}

impl Partition {
    /// Root partition covering `first..=last` (whole days), optionally for one region.
    pub fn root(
        keyword: impl Into<String>,
        first: NaiveDate,
        last: NaiveDate,
        region: Option<&Region>,
    ) -> Result<Self> {
        let start = first.and_hms_opt(0, 0, 0).unwrap_or_default();
        let end = (last + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap_or_default();
        Self::new(
            keyword.into(),
            start,
            end,
            Granularity::Range,
            region.map(RegionFilter::from),
            None,
            None,
        )
    }

    fn new(
        keyword: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
        granularity: Granularity,
        region: Option<RegionFilter>,
        city: Option<City>,
        page: Option<u32>,
    ) -> Result<Self> {
        if end <= start {
            return Err(AppError::validation(format!(
                "Partition window {start} .. {end} is empty"
            )));
        }
        if city.is_some() && region.is_none() {
            return Err(AppError::validation("Partition has a city but no region"));
        }
        Ok(Self {
            keyword,
            start,
            end,
            granularity,
            region,
            city,
            page,
        })
    }

    fn child(&self, start: NaiveDateTime, end: NaiveDateTime, granularity: Granularity) -> Self {
        Self {
            start,
            end,
            granularity,
            page: Some(1),
            ..self.clone()
        }
    }

    /// Whether this partition is already at the finest granularity.
    pub fn is_finest(&self) -> bool {
        self.city.is_some()
    }

    /// Children at the next rung of the escalation ladder, in catalog order.
    ///
    /// Returns `None` when the partition cannot be refined any further.
    pub fn refine(&self, catalog: &RegionCatalog) -> Option<Vec<Partition>> {
        match (self.granularity, &self.region, &self.city) {
            (_, _, Some(_)) => None,
            (Granularity::Range, _, _) => {
                let mut days = Vec::new();
                let mut day = self.start;
                while day < self.end {
                    let next = day + Duration::days(1);
                    days.push(self.child(day, next.min(self.end), Granularity::Day));
                    day = next;
                }
                Some(days)
            }
            (Granularity::Day, _, _) => {
                let mut hours = Vec::with_capacity(24);
                let mut hour = self.start;
                while hour < self.end {
                    let next = hour + Duration::hours(1);
                    hours.push(self.child(hour, next.min(self.end), Granularity::Hour));
                    hour = next;
                }
                Some(hours)
            }
            (Granularity::Hour, None, None) => Some(
                catalog
                    .regions()
                    .iter()
                    .map(|region| Partition {
                        region: Some(RegionFilter::from(region)),
                        ..self.child(self.start, self.end, Granularity::Hour)
                    })
                    .collect(),
            ),
            (Granularity::Hour, Some(region), None) => {
                let cities = &catalog.get(&region.name)?.cities;
                if cities.is_empty() {
                    return None;
                }
                Some(
                    cities
                        .iter()
                        .map(|city| Partition {
                            city: Some(city.clone()),
                            ..self.child(self.start, self.end, Granularity::Hour)
                        })
                        .collect(),
                )
            }
        }
    }

    /// Search URL for this partition's first page.
    pub fn search_url(&self, search: &SearchConfig) -> String {
        let mut url = format!(
            "{}/weibo?q={}",
            search.search_base.trim_end_matches('/'),
            urlencoding::encode(&self.keyword)
        );
        match (&self.region, &self.city) {
            (Some(region), Some(city)) => {
                url.push_str(&format!("&region=custom:{}:{}", region.code, city.code))
            }
            (Some(region), None) => url.push_str(&format!("&region=custom:{}:1000", region.code)),
            _ => {}
        }
        url.push_str(search.post_type.query_param());
        url.push_str(search.contain_type.query_param());
        url.push_str(&format!(
            "&timescope=custom:{}:{}",
            timescope(self.start),
            timescope(self.end)
        ));
        if let Some(page) = self.page {
            url.push_str(&format!("&page={page}"));
        }
        url
    }
}

/// `YYYY-MM-DD-H`, hour without a leading zero.
fn timescope(instant: NaiveDateTime) -> String {
    format!("{}-{}", instant.format("%Y-%m-%d"), instant.hour())
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' {}..{}",
            self.keyword,
            timescope(self.start),
            timescope(self.end)
        )?;
        if let Some(region) = &self.region {
            write!(f, " {}", region.name)?;
        }
        if let Some(city) = &self.city {
            write!(f, "/{}", city.name)?;
        }
        Ok(())
    }
}
