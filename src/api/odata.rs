// src/api/odata.rs

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use regex::Regex;
use serde::Deserialize;

use crate::error::AppError;

/// Characters escaped inside query option values. Parentheses, commas,
/// single quotes and slashes stay readable since OData uses them as syntax.
const ODATA_VALUE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'[')
    .add(b']');

static PROPERTY_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(/[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("property path pattern is valid")
});

/// Envelope of an OData collection response.
#[derive(Debug, Clone, Deserialize)]
pub struct ODataPage<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.count", default)]
    pub count: Option<u64>,
}

impl<T> ODataPage<T> {
    /// Total matching rows; falls back to the page length when `$count` was not requested.
    pub fn total(&self) -> u64 {
        self.count.unwrap_or(self.value.len() as u64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Str(String),
    Bool(bool),
    DateTime(DateTime<Utc>),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Bool(v) => write!(f, "{}", v),
            Literal::Str(v) => write!(f, "'{}'", escape_string(v)),
            Literal::DateTime(v) => {
                write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
        }
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Str(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::Str(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Bool(v)
    }
}

impl From<DateTime<Utc>> for Literal {
    fn from(v: DateTime<Utc>) -> Self {
        Literal::DateTime(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Compare {
        field: String,
        op: &'static str,
        value: Literal,
    },
    Contains {
        field: String,
        needle: String,
    },
}

/// Builder for the `$count/$skip/$top/$filter/$orderby` query options.
///
/// Filters are joined with `and`. Property names are validated when the query
/// string is rendered.
#[derive(Debug, Clone, Default)]
pub struct ODataQuery {
    count: bool,
    skip: Option<u64>,
    top: Option<u64>,
    filters: Vec<Filter>,
    order_by: Vec<(String, SortDirection)>,
}

impl ODataQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn top(mut self, top: u64) -> Self {
        self.top = Some(top);
        self
    }

    /// 1-based page number. Page 0 is treated as page 1.
    pub fn page(self, page: u32, page_size: u32) -> Self {
        let skip = u64::from(page.max(1) - 1) * u64::from(page_size);
        self.skip(skip).top(u64::from(page_size))
    }

    pub fn eq(self, field: &str, value: impl Into<Literal>) -> Self {
        self.compare(field, "eq", value.into())
    }

    pub fn ge(self, field: &str, value: impl Into<Literal>) -> Self {
        self.compare(field, "ge", value.into())
    }

    pub fn le(self, field: &str, value: impl Into<Literal>) -> Self {
        self.compare(field, "le", value.into())
    }

    /// `contains(field,'needle')`. Blank needles are ignored so an empty
    /// search box does not narrow the result.
    pub fn contains(mut self, field: &str, needle: &str) -> Self {
        let needle = needle.trim();
        if !needle.is_empty() {
            self.filters.push(Filter::Contains {
                field: field.to_string(),
                needle: needle.to_string(),
            });
        }
        self
    }

    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by.push((field.to_string(), direction));
        self
    }

    fn compare(mut self, field: &str, op: &'static str, value: Literal) -> Self {
        self.filters.push(Filter::Compare {
            field: field.to_string(),
            op,
            value,
        });
        self
    }

    /// The raw `$filter` expression, before percent-encoding.
    pub fn filter_expression(&self) -> Result<Option<String>, AppError> {
        if self.filters.is_empty() {
            return Ok(None);
        }
        let mut parts = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            let part = match filter {
                Filter::Compare { field, op, value } => {
                    format!("{} {} {}", check_property(field)?, op, value)
                }
                Filter::Contains { field, needle } => format!(
                    "contains({},'{}')",
                    check_property(field)?,
                    escape_string(needle)
                ),
            };
            parts.push(part);
        }
        Ok(Some(parts.join(" and ")))
    }

    /// Renders the query string without the leading `?`. Empty when no
    /// option is set.
    pub fn to_query_string(&self) -> Result<String, AppError> {
        let mut params: Vec<String> = Vec::new();

        if self.count {
            params.push("$count=true".to_string());
        }
        if let Some(skip) = self.skip {
            params.push(format!("$skip={}", skip));
        }
        if let Some(top) = self.top {
            params.push(format!("$top={}", top));
        }
        if let Some(filter) = self.filter_expression()? {
            params.push(format!("$filter={}", encode_value(&filter)));
        }
        if !self.order_by.is_empty() {
            let mut clauses = Vec::with_capacity(self.order_by.len());
            for (field, direction) in &self.order_by {
                let dir = match direction {
                    SortDirection::Asc => "asc",
                    SortDirection::Desc => "desc",
                };
                clauses.push(format!("{} {}", check_property(field)?, dir));
            }
            params.push(format!("$orderby={}", encode_value(&clauses.join(","))));
        }

        Ok(params.join("&"))
    }
}

/// OData string literals escape a single quote by doubling it.
pub fn escape_string(raw: &str) -> String {
    raw.replace('\'', "''")
}

fn encode_value(raw: &str) -> String {
    utf8_percent_encode(raw, ODATA_VALUE_SET).to_string()
}

fn check_property(field: &str) -> Result<&str, AppError> {
    if PROPERTY_PATH.is_match(field) {
        Ok(field)
    } else {
        Err(AppError::BadRequest(format!(
            "Invalid OData property name: {}",
            field
        )))
    }
}
