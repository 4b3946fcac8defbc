use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

lazy_static! {
    static ref SORT_FIELD: Regex = Regex::new(r"^([+-])?([A-Za-z][A-Za-z0-9_]*)$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderField {
    pub name: String,
    pub direction: OrderDirection,
}

impl OrderField {
    pub fn ascending(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            direction: OrderDirection::Ascending,
        }
    }

    pub fn descending(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            direction: OrderDirection::Descending,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvalidListQuery {
    #[error("Sort field '{field}' is malformed, expected `name`, `+name` or `-name`")]
    MalformedSortField { field: String },
    #[error("Limit {limit} exceeds the maximum of {max}")]
    LimitTooLarge { limit: u64, max: u64 },
    #[error("Limit must be greater than zero")]
    ZeroLimit,
    #[error("Offset {offset} exceeds the maximum of {max}")]
    OffsetTooLarge { offset: u64, max: u64 },
}

/// Ordering and paging of a list request. The same value is echoed back in the
/// response so that clients can continue paging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQueryParameters {
    pub sort_fields: Vec<OrderField>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ListQueryParameters {
    pub const DEFAULT_LIMIT: u64 = 20;
    /// Offsets end up in signed 64 bit SQL parameters.
    pub const MAX_OFFSET: u64 = i64::MAX as u64;

    pub fn new(sort_fields: Vec<OrderField>, limit: u64, offset: u64) -> Self {
        Self {
            sort_fields,
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Parses a comma separated sort expression like `name,-createdAt`.
    pub fn parse_sort(value: &str) -> Result<Vec<OrderField>, InvalidListQuery> {
        let mut fields = Vec::new();
        for raw in value.split(',').map(str::trim).filter(|it| !it.is_empty()) {
            let captures = SORT_FIELD
                .captures(raw)
                .ok_or_else(|| InvalidListQuery::MalformedSortField {
                    field: raw.to_owned(),
                })?;
            let direction = match captures.get(1).map(|it| it.as_str()) {
                Some("-") => OrderDirection::Descending,
                _ => OrderDirection::Ascending,
            };
            fields.push(OrderField {
                name: captures[2].to_owned(),
                direction,
            });
        }

        Ok(fields)
    }

    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> u64 {
        self.offset.unwrap_or(0)
    }

    /// Fills in the default limit and rejects limits above `max` as well as
    /// offsets the database cannot represent.
    pub fn normalized(mut self, default_limit: u64, max: u64) -> Result<Self, InvalidListQuery> {
        let limit = self.limit.unwrap_or(default_limit);
        if limit == 0 {
            return Err(InvalidListQuery::ZeroLimit);
        }
        if limit > max {
            return Err(InvalidListQuery::LimitTooLarge { limit, max });
        }
        let offset = self.offset();
        if offset > Self::MAX_OFFSET {
            return Err(InvalidListQuery::OffsetTooLarge {
                offset,
                max: Self::MAX_OFFSET,
            });
        }

        self.limit = Some(limit);
        self.offset = Some(offset);
        Ok(self)
    }

    pub fn has_more(&self, total: u64) -> bool {
        self.offset().saturating_add(self.limit()) < total
    }
}

/// One page of a listing together with the parameters that produced it.
#[derive(Debug, Clone)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub query: ListQueryParameters,
}

impl<T> ListResult<T> {
    pub fn has_more(&self) -> bool {
        self.query.has_more(self.total_count)
    }

    pub fn map<U, F>(self, f: F) -> ListResult<U>
    where
        F: FnMut(T) -> U,
    {
        ListResult {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            query: self.query,
        }
    }
}

#[test]
fn validate_has_more() {
    assert!(ListQueryParameters::new(vec![], 50, 0).has_more(100));
    assert!(!ListQueryParameters::new(vec![], 50, 0).has_more(10));
    assert!(ListQueryParameters::new(vec![], 50, 500).has_more(551));
    assert!(!ListQueryParameters::new(vec![], 50, 350).has_more(400));
    assert!(!ListQueryParameters::new(vec![], 50, u64::MAX).has_more(u64::MAX));
}

#[test]
fn validate_parse_sort() {
    assert_eq!(
        ListQueryParameters::parse_sort("name,-createdAt, +id").unwrap(),
        vec![
            OrderField::ascending("name"),
            OrderField::descending("createdAt"),
            OrderField::ascending("id"),
        ]
    );
    assert_eq!(ListQueryParameters::parse_sort("").unwrap(), vec![]);
    assert_eq!(
        ListQueryParameters::parse_sort("name;drop").unwrap_err(),
        InvalidListQuery::MalformedSortField {
            field: "name;drop".to_owned()
        }
    );
}

#[test]
fn validate_normalized() {
    let query = ListQueryParameters::default().normalized(20, 100).unwrap();
    assert_eq!(query.limit, Some(20));
    assert_eq!(query.offset, Some(0));

    assert_eq!(
        ListQueryParameters::new(vec![], 101, 0)
            .normalized(20, 100)
            .unwrap_err(),
        InvalidListQuery::LimitTooLarge {
            limit: 101,
            max: 100
        }
    );
    assert_eq!(
        ListQueryParameters::new(vec![], 0, 0)
            .normalized(20, 100)
            .unwrap_err(),
        InvalidListQuery::ZeroLimit
    );

    let max = ListQueryParameters::MAX_OFFSET;
    assert_eq!(
        ListQueryParameters::new(vec![], 20, max)
            .normalized(20, 100)
            .unwrap()
            .offset,
        Some(max)
    );
    assert_eq!(
        ListQueryParameters::new(vec![], 20, u64::MAX)
            .normalized(20, 100)
            .unwrap_err(),
        InvalidListQuery::OffsetTooLarge {
            offset: u64::MAX,
            max
        }
    );
}
