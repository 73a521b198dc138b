//! Query filter parsing.
//!
//! Simple comparisons (`userName eq "bjensen"`, `emails[type eq "work"]`,
//! `title pr`) become a structured predicate. Compound expressions are passed through
//! as raw text for the connector, except for OR chains of equality clauses on one
//! attribute, which become a [`FilterPlan::Union`] the orchestrator resolves itself.

use crate::codec::path::unquote;
use crate::error::FilterError;
use crate::model::CanonicalResource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute names that may never be filtered on.
const SECRET_ATTRIBUTES: &[&str] = &["password"];

/// Page size applied when only `startIndex` is given.
pub const DEFAULT_COUNT: usize = 200;

/// SCIM filter comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    /// Equal comparison
    #[serde(rename = "eq")]
    Equal,

    /// Not equal comparison
    #[serde(rename = "ne")]
    NotEqual,

    /// Contains operation for strings
    #[serde(rename = "co")]
    Contains,

    /// Starts with operation for strings
    #[serde(rename = "sw")]
    StartsWith,

    /// Ends with operation for strings
    #[serde(rename = "ew")]
    EndsWith,

    /// Present (attribute exists)
    #[serde(rename = "pr")]
    Present,

    /// Greater than
    #[serde(rename = "gt")]
    GreaterThan,

    /// Greater than or equal
    #[serde(rename = "ge")]
    GreaterThanOrEqual,

    /// Less than
    #[serde(rename = "lt")]
    LessThan,

    /// Less than or equal
    #[serde(rename = "le")]
    LessThanOrEqual,
}

impl FilterOperator {
    /// Parse a case-insensitive operator token.
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "eq" => Some(Self::Equal),
            "ne" => Some(Self::NotEqual),
            "co" => Some(Self::Contains),
            "sw" => Some(Self::StartsWith),
            "ew" => Some(Self::EndsWith),
            "pr" => Some(Self::Present),
            "gt" => Some(Self::GreaterThan),
            "ge" => Some(Self::GreaterThanOrEqual),
            "lt" => Some(Self::LessThan),
            "le" => Some(Self::LessThanOrEqual),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::Contains => "co",
            Self::StartsWith => "sw",
            Self::EndsWith => "ew",
            Self::Present => "pr",
            Self::GreaterThan => "gt",
            Self::GreaterThanOrEqual => "ge",
            Self::LessThan => "lt",
            Self::LessThanOrEqual => "le",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a connector is asked to match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// `attribute operator value`; `value` is `None` only for `pr`
    Simple {
        attribute: String,
        operator: FilterOperator,
        value: Option<String>,
    },
    /// Compound expression left for the connector to interpret
    Raw(String),
}

/// `sortOrder` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    /// Anything other than `descending` (any case) sorts ascending.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("descending") {
            Self::Descending
        } else {
            Self::Ascending
        }
    }
}

/// Parsed query: optional predicate, 1-based pagination, ordering and the attributes
/// the client asked to leave out.
///
/// The inclusion list travels as the separate `attributes` argument of the connector
/// query methods.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GetFilter {
    pub predicate: Option<Predicate>,
    pub start_index: Option<usize>,
    pub count: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    pub excluded_attributes: Vec<String>,
}

impl GetFilter {
    /// List everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Equality lookup, as used for `id eq` and `members.value eq` queries.
    pub fn equals(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            predicate: Some(Predicate::Simple {
                attribute: attribute.into(),
                operator: FilterOperator::Equal,
                value: Some(value.into()),
            }),
            ..Self::default()
        }
    }

    /// Apply pagination defaults: `startIndex` 1 when only `count` is given, `count`
    /// `default_count` when only `startIndex` is given.
    pub fn with_pagination(
        mut self,
        start_index: Option<usize>,
        count: Option<usize>,
        default_count: usize,
    ) -> Self {
        let (start_index, count) = match (start_index, count) {
            (None, None) => (None, None),
            (Some(start), None) => (Some(start.max(1)), Some(default_count)),
            (None, Some(count)) => (Some(1), Some(count)),
            (Some(start), Some(count)) => (Some(start.max(1)), Some(count)),
        };
        self.start_index = start_index;
        self.count = count;
        self
    }

    pub fn with_sort(mut self, sort_by: Option<&str>, sort_order: Option<&str>) -> Self {
        self.sort_by = sort_by
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        self.sort_order = sort_order.map(SortOrder::parse).unwrap_or_default();
        self
    }

    pub fn with_excluded_attributes(mut self, excluded: &[String]) -> Self {
        self.excluded_attributes = excluded.to_vec();
        self
    }

    /// Order `resources` by the first value of `sort_by`, compared case-insensitively.
    /// Resources without the attribute come last ascending and first descending.
    pub fn sort(&self, resources: &mut [CanonicalResource]) {
        let Some(sort_by) = &self.sort_by else {
            return;
        };
        resources.sort_by_cached_key(|resource| {
            let key = resource
                .values_at(sort_by)
                .into_iter()
                .next()
                .map(|value| value.to_lowercase());
            (key.is_none(), key)
        });
        if self.sort_order == SortOrder::Descending {
            resources.reverse();
        }
    }

    pub fn attribute(&self) -> Option<&str> {
        match &self.predicate {
            Some(Predicate::Simple { attribute, .. }) => Some(attribute),
            _ => None,
        }
    }

    pub fn operator(&self) -> Option<FilterOperator> {
        match &self.predicate {
            Some(Predicate::Simple { operator, .. }) => Some(*operator),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match &self.predicate {
            Some(Predicate::Simple { value, .. }) => value.as_deref(),
            _ => None,
        }
    }

    pub fn raw_filter(&self) -> Option<&str> {
        match &self.predicate {
            Some(Predicate::Raw(raw)) => Some(raw),
            _ => None,
        }
    }

    pub fn is_list_all(&self) -> bool {
        self.predicate.is_none()
    }
}

/// How a query is executed against the connector.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterPlan {
    /// One connector lookup
    Single(GetFilter),
    /// One equality lookup per clause, results unioned
    Union {
        attribute: String,
        clauses: Vec<GetFilter>,
    },
}

/// Split on whitespace outside double quotes. Quotes stay attached to their token.
fn tokenize(filter: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for c in filter.chars() {
        match c {
            _ if escaped => {
                current.push(c);
                escaped = false;
            }
            '\\' => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_keyword(token: &str, keyword: &str) -> bool {
    token.eq_ignore_ascii_case(keyword)
}

fn is_compound(tokens: &[String]) -> bool {
    tokens.iter().any(|t| {
        is_keyword(t, "and")
            || is_keyword(t, "or")
            || is_keyword(t, "not")
            || t.to_ascii_lowercase().starts_with("not(")
    })
}

fn reject_secret_attributes(tokens: &[String]) -> Result<(), FilterError> {
    for token in tokens.iter().filter(|t| !t.starts_with('"')) {
        let names = token
            .split(|c: char| matches!(c, '(' | ')' | '[' | ']' | '.' | ':'))
            .filter(|part| !part.is_empty());
        for name in names {
            if SECRET_ATTRIBUTES
                .iter()
                .any(|secret| name.eq_ignore_ascii_case(secret))
            {
                return Err(FilterError::SecretAttribute {
                    attribute: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn strip_parens(expression: &str) -> &str {
    let mut current = expression.trim();
    while let Some(inner) = current
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        current = inner.trim();
    }
    current
}

fn malformed(filter: &str, details: &str) -> FilterError {
    FilterError::Malformed {
        filter: filter.to_string(),
        details: details.to_string(),
    }
}

/// Position of a value-path `[`; only the attribute token, before any space or quote,
/// may open one.
fn value_path_open(expression: &str) -> Option<usize> {
    let head_end = expression
        .find(|c: char| c.is_whitespace() || c == '"')
        .unwrap_or(expression.len());
    expression[..head_end].find('[')
}

/// First `]` after `open` that is not inside a quoted value.
fn value_path_close(expression: &str, open: usize) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (index, c) in expression[open + 1..].char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ']' if !in_quotes => return Some(open + 1 + index),
            _ => {}
        }
    }
    None
}

/// Parse one comparison, including the bracket form `attr[sub op "value"]`.
fn parse_simple(expression: &str) -> Result<Predicate, FilterError> {
    let expression = strip_parens(expression);

    if let Some(open) = value_path_open(expression) {
        let close = value_path_close(expression, open)
            .ok_or_else(|| malformed(expression, "unbalanced brackets"))?;
        if !expression[close + 1..].trim().is_empty() {
            return Err(malformed(expression, "unexpected text after ']'"));
        }
        let parent = expression[..open].trim();
        if parent.is_empty() {
            return Err(malformed(expression, "missing attribute before '['"));
        }
        return match parse_simple(&expression[open + 1..close])? {
            Predicate::Simple {
                attribute,
                operator,
                value,
            } => Ok(Predicate::Simple {
                attribute: format!("{}.{}", parent, attribute),
                operator,
                value,
            }),
            Predicate::Raw(_) => Err(malformed(expression, "compound bracket filters are not supported")),
        };
    }

    let tokens = tokenize(expression);
    let (Some(attribute), Some(operator_token)) = (tokens.first(), tokens.get(1)) else {
        return Err(malformed(expression, "expected '<attribute> <operator> <value>'"));
    };
    let operator =
        FilterOperator::parse(operator_token).ok_or_else(|| FilterError::UnsupportedOperator {
            operator: operator_token.clone(),
        })?;

    if operator == FilterOperator::Present {
        if tokens.len() != 2 {
            return Err(malformed(expression, "'pr' takes no value"));
        }
        return Ok(Predicate::Simple {
            attribute: attribute.clone(),
            operator,
            value: None,
        });
    }
    if tokens.len() < 3 {
        return Err(malformed(expression, "missing comparison value"));
    }
    Ok(Predicate::Simple {
        attribute: attribute.clone(),
        operator,
        value: Some(unquote(&tokens[2..].join(" "))),
    })
}

/// Recognize `(a eq "x") or (a eq "y") ...` on one attribute.
fn parse_or_union(tokens: &[String]) -> Option<(String, Vec<GetFilter>)> {
    if tokens
        .iter()
        .any(|t| is_keyword(t, "and") || is_keyword(t, "not") || t.to_ascii_lowercase().starts_with("not("))
    {
        return None;
    }
    let clauses: Vec<&[String]> = tokens.split(|t| is_keyword(t, "or")).collect();
    if clauses.len() < 2 || clauses.iter().any(|clause| clause.is_empty()) {
        return None;
    }

    let mut attribute: Option<String> = None;
    let mut filters = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let predicate = parse_simple(&clause.join(" ")).ok()?;
        let Predicate::Simple {
            attribute: clause_attribute,
            operator: FilterOperator::Equal,
            value: Some(value),
        } = predicate
        else {
            return None;
        };
        match &attribute {
            Some(first) if !first.eq_ignore_ascii_case(&clause_attribute) => return None,
            Some(_) => {}
            None => attribute = Some(clause_attribute.clone()),
        }
        filters.push(GetFilter::equals(clause_attribute, value));
    }
    attribute.map(|attribute| (attribute, filters))
}

/// Parse a `filter` query parameter into an execution plan.
///
/// Pagination is attached by the caller with [`GetFilter::with_pagination`].
pub fn parse_filter(filter: Option<&str>) -> Result<FilterPlan, FilterError> {
    let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
        return Ok(FilterPlan::Single(GetFilter::all()));
    };

    let tokens = tokenize(filter);
    reject_secret_attributes(&tokens)?;

    if is_compound(&tokens) {
        if let Some((attribute, clauses)) = parse_or_union(&tokens) {
            return Ok(FilterPlan::Union { attribute, clauses });
        }
        return Ok(FilterPlan::Single(GetFilter {
            predicate: Some(Predicate::Raw(filter.to_string())),
            ..GetFilter::default()
        }));
    }

    Ok(FilterPlan::Single(GetFilter {
        predicate: Some(parse_simple(filter)?),
        ..GetFilter::default()
    }))
}
