//! Filter, ordering and page-window construction for the listing endpoints.
//!
//! Request parameters arrive as raw strings and are validated here, so a malformed value
//! fails with [`ApiError::InvalidParameter`] instead of reaching the store as a bogus
//! constraint. The same filter feeds both the count and the data query, which keeps
//! `totalRecords` and `totalPages` consistent with the returned slice.

use std::str::FromStr;

use mongodb::bson::{doc, Document};
use regex::escape;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::store::{Collection, FindSpec};

pub const DEFAULT_LISTING_LIMIT: u64 = 9;
pub const DEFAULT_PROFILE_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

pub const PRICE_FIELD: &str = "regularPrice";
pub const RATING_FIELD: &str = "rating";
pub const NAME_FIELD: &str = "name";
pub const CATEGORY_FIELD: &str = "category";
pub const AGE_FIELD: &str = "age";
pub const DIVISION_FIELD: &str = "permanentDivision";

/// Query string of the bike listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingParams {
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Query string of the biodata listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileParams {
    pub age_range: Option<String>,
    pub gender: Option<String>,
    pub division: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    PriceLow,
    PriceHigh,
    Rating,
    Unspecified,
}

impl SortOrder {
    /// Unknown values fall back to the store's natural order.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("price-low") => SortOrder::PriceLow,
            Some("price-high") => SortOrder::PriceHigh,
            Some("rating") => SortOrder::Rating,
            _ => SortOrder::Unspecified,
        }
    }

    pub fn spec(self) -> Option<Document> {
        match self {
            SortOrder::PriceLow => Some(doc! { PRICE_FIELD: 1 }),
            SortOrder::PriceHigh => Some(doc! { PRICE_FIELD: -1 }),
            SortOrder::Rating => Some(doc! { RATING_FIELD: -1 }),
            SortOrder::Unspecified => None,
        }
    }
}

/// Inclusive age bounds written as `"min-max"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeRange {
    pub min: u32,
    pub max: u32,
}

impl FromStr for AgeRange {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self> {
        let malformed = || {
            ApiError::InvalidParameter(format!(
                "ageRange must look like \"min-max\", got {:?}",
                value
            ))
        };

        let bounds: Vec<&str> = value.split('-').map(str::trim).collect();
        let (min, max) = match bounds.as_slice() {
            [min, max] => (
                min.parse::<u32>().map_err(|_| malformed())?,
                max.parse::<u32>().map_err(|_| malformed())?,
            ),
            _ => return Err(malformed()),
        };

        if min > max {
            return Err(ApiError::InvalidParameter(format!(
                "ageRange lower bound {} exceeds upper bound {}",
                min, max
            )));
        }

        Ok(AgeRange { min, max })
    }
}

/// One page of a filtered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub limit: u64,
}

impl PageWindow {
    pub fn parse(page: Option<&str>, limit: Option<&str>, default_limit: u64) -> Result<Self> {
        let page = positive("page", page)?.unwrap_or(1);
        let limit = positive("limit", limit)?.unwrap_or(default_limit);

        if limit > MAX_LIMIT {
            return Err(ApiError::InvalidParameter(format!(
                "limit must not exceed {}",
                MAX_LIMIT
            )));
        }

        Ok(PageWindow { page, limit })
    }

    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

/// Filter, ordering and window ready to run against a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedQuery {
    pub filter: Document,
    pub sort: Option<Document>,
    pub window: PageWindow,
}

impl PlannedQuery {
    pub fn find_spec(&self) -> FindSpec {
        FindSpec {
            sort: self.sort.clone(),
            skip: Some(self.window.skip()),
            limit: Some(self.window.limit as i64),
        }
    }
}

impl ListingParams {
    pub fn plan(&self) -> Result<PlannedQuery> {
        let mut filter = Document::new();

        if let Some(category) = present(&self.category) {
            filter.insert(CATEGORY_FIELD, category);
        }

        let min_price = price("minPrice", present(&self.min_price))?;
        let max_price = price("maxPrice", present(&self.max_price))?;
        if let (Some(min), Some(max)) = (min_price, max_price) {
            if min > max {
                return Err(ApiError::InvalidParameter(format!(
                    "minPrice {} exceeds maxPrice {}",
                    min, max
                )));
            }
        }

        let mut range = Document::new();
        if let Some(min) = min_price {
            range.insert("$gte", min);
        }
        if let Some(max) = max_price {
            range.insert("$lte", max);
        }
        if !range.is_empty() {
            filter.insert(PRICE_FIELD, range);
        }

        if let Some(search) = present(&self.search) {
            filter.insert("$or", contains_any(&[NAME_FIELD, CATEGORY_FIELD], search));
        }

        Ok(PlannedQuery {
            filter,
            sort: SortOrder::from_param(present(&self.sort)).spec(),
            window: PageWindow::parse(
                present(&self.page),
                present(&self.limit),
                DEFAULT_LISTING_LIMIT,
            )?,
        })
    }
}

impl ProfileParams {
    pub fn plan(&self) -> Result<PlannedQuery> {
        let mut filter = Document::new();

        if let Some(range) = present(&self.age_range) {
            let AgeRange { min, max } = range.parse::<AgeRange>()?;
            filter.insert(AGE_FIELD, doc! { "$gte": i64::from(min), "$lte": i64::from(max) });
        }
        if let Some(gender) = present(&self.gender) {
            filter.insert(CATEGORY_FIELD, gender);
        }
        if let Some(division) = present(&self.division) {
            filter.insert(DIVISION_FIELD, division);
        }

        Ok(PlannedQuery {
            filter,
            sort: None,
            window: PageWindow::parse(
                present(&self.page),
                present(&self.limit),
                DEFAULT_PROFILE_LIMIT,
            )?,
        })
    }
}

/// A page of records plus the metadata describing the whole filtered set.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u64,
    pub total_pages: u64,
    pub total_records: u64,
}

impl<T> Page<T> {
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            data: self.data.into_iter().map(f).collect(),
            page: self.page,
            total_pages: self.total_pages,
            total_records: self.total_records,
        }
    }
}

/// Counts the filtered set, then fetches the requested window of it.
///
/// The two calls are not isolated from each other; a concurrent write between them can make
/// the count and the page disagree.
pub async fn paginate(collection: &dyn Collection, query: &PlannedQuery) -> Result<Page<Document>> {
    let total_records = collection.count(query.filter.clone()).await?;
    // A window starting past the last record is empty; such a skip may not fit the driver's i64.
    let data = if query.window.skip() >= total_records {
        Vec::new()
    } else {
        collection
            .find(query.filter.clone(), query.find_spec())
            .await?
    };

    Ok(Page {
        data,
        page: query.window.page,
        total_pages: query.window.total_pages(total_records),
        total_records,
    })
}

/// Case-insensitive substring match of `needle` against any of `fields`.
pub fn contains_any(fields: &[&str], needle: &str) -> Vec<Document> {
    let pattern = escape(needle);
    fields
        .iter()
        .map(|field| doc! { *field: { "$regex": pattern.as_str(), "$options": "i" } })
        .collect()
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn price(name: &str, value: Option<&str>) -> Result<Option<f64>> {
    value
        .map(|value| match value.parse::<f64>() {
            Ok(price) if price.is_finite() => Ok(price),
            _ => Err(ApiError::InvalidParameter(format!(
                "{} must be a number, got {:?}",
                name, value
            ))),
        })
        .transpose()
}

fn positive(name: &str, value: Option<&str>) -> Result<Option<u64>> {
    value
        .map(|value| match value.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ApiError::InvalidParameter(format!(
                "{} must be a positive integer, got {:?}",
                name, value
            ))),
        })
        .transpose()
}
