//! PostgREST-style query parser: turns the request's URL query string and
//! `Prefer` header into a `ParsedQuery`, per §4.4.

pub mod builder;
pub mod row;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    pub fn sql_operator(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Neq => "!=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::IsNull | FilterOp::IsNotNull => unreachable!("IS filters render specially"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct OrderSpec {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Return {
    #[default]
    Minimal,
    Representation,
}

#[derive(Debug, Clone, Default)]
pub struct Prefer {
    pub return_: Return,
    pub count_exact: bool,
}

impl Prefer {
    pub fn parse(header_value: Option<&str>) -> Self {
        let mut prefer = Prefer::default();
        let Some(value) = header_value else {
            return prefer;
        };
        for part in value.split(',') {
            let part = part.trim();
            if part == "return=representation" {
                prefer.return_ = Return::Representation;
            } else if part == "return=minimal" {
                prefer.return_ = Return::Minimal;
            } else if part == "count=exact" {
                prefer.count_exact = true;
            }
        }
        prefer
    }
}

const RESERVED_PARAMS: &[&str] = &["select", "order", "limit", "offset"];

#[derive(Debug, Clone, Default)]
pub struct ParsedQuery {
    pub select: Vec<String>,
    pub order: Vec<OrderSpec>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub filters: Vec<Filter>,
}

impl ParsedQuery {
    /// Parse PostgREST-shaped query params. `raw` is the undecoded query
    /// string (everything after `?`).
    pub fn parse(raw: &str) -> Result<Self> {
        let mut query = ParsedQuery::default();

        for pair in url::form_urlencoded::parse(raw.as_bytes()) {
            let (key, value) = pair;
            let key = key.as_ref();
            let value = value.as_ref();

            match key {
                "select" => {
                    query.select = value.split(',').map(|s| s.trim().to_string()).collect();
                }
                "order" => {
                    query.order = value
                        .split(',')
                        .filter(|s| !s.is_empty())
                        .map(parse_order_spec)
                        .collect::<Result<Vec<_>>>()?;
                }
                "limit" => {
                    query.limit = Some(
                        value
                            .parse()
                            .map_err(|_| Error::Validation(format!("invalid limit: {value}")))?,
                    );
                }
                "offset" => {
                    query.offset = Some(
                        value
                            .parse()
                            .map_err(|_| Error::Validation(format!("invalid offset: {value}")))?,
                    );
                }
                _ if RESERVED_PARAMS.contains(&key) => {}
                column => {
                    query.filters.push(parse_filter(column, value)?);
                }
            }
        }

        if query.select.is_empty() {
            query.select = vec!["*".to_string()];
        }

        Ok(query)
    }
}

fn parse_order_spec(spec: &str) -> Result<OrderSpec> {
    let mut parts = spec.split('.');
    let column = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation(format!("invalid order spec: {spec}")))?
        .to_string();
    let direction = match parts.next() {
        None | Some("asc") => SortDirection::Asc,
        Some("desc") => SortDirection::Desc,
        Some(other) => {
            return Err(Error::Validation(format!(
                "invalid order direction: {other}"
            )));
        }
    };
    Ok(OrderSpec { column, direction })
}

fn parse_filter(column: &str, raw: &str) -> Result<Filter> {
    let (op_str, value) = raw
        .split_once('.')
        .ok_or_else(|| Error::Validation(format!("invalid filter for {column}: {raw}")))?;

    let op = match op_str {
        "eq" => FilterOp::Eq,
        "neq" => FilterOp::Neq,
        "gt" => FilterOp::Gt,
        "gte" => FilterOp::Gte,
        "lt" => FilterOp::Lt,
        "lte" => FilterOp::Lte,
        "is" => {
            return match value {
                "null" => Ok(Filter {
                    column: column.to_string(),
                    op: FilterOp::IsNull,
                    value: String::new(),
                }),
                "not.null" => Ok(Filter {
                    column: column.to_string(),
                    op: FilterOp::IsNotNull,
                    value: String::new(),
                }),
                other => Err(Error::Validation(format!("invalid is-filter value: {other}"))),
            };
        }
        other => return Err(Error::Validation(format!("unsupported filter operator: {other}"))),
    };

    Ok(Filter {
        column: column.to_string(),
        op,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_select_order_limit_offset() {
        let q = ParsedQuery::parse("select=id,name&order=name.desc,id&limit=10&offset=5").unwrap();
        assert_eq!(q.select, vec!["id", "name"]);
        assert_eq!(q.order[0].column, "name");
        assert_eq!(q.order[0].direction, SortDirection::Desc);
        assert_eq!(q.order[1].direction, SortDirection::Asc);
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.offset, Some(5));
    }

    #[test]
    fn parses_is_null_without_binding() {
        let q = ParsedQuery::parse("deleted_at=is.null").unwrap();
        assert_eq!(q.filters[0].op, FilterOp::IsNull);
        let q = ParsedQuery::parse("deleted_at=is.not.null").unwrap();
        assert_eq!(q.filters[0].op, FilterOp::IsNotNull);
    }

    #[test]
    fn parses_comparison_filters() {
        let q = ParsedQuery::parse("price=gte.10").unwrap();
        assert_eq!(q.filters[0].op, FilterOp::Gte);
        assert_eq!(q.filters[0].value, "10");
    }

    #[test]
    fn defaults_select_to_star() {
        let q = ParsedQuery::parse("").unwrap();
        assert_eq!(q.select, vec!["*"]);
    }

    #[test]
    fn prefer_header_parses_flags() {
        let p = Prefer::parse(Some("return=representation, count=exact"));
        assert_eq!(p.return_, Return::Representation);
        assert!(p.count_exact);
    }
}
