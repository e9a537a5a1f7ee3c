//! Filtered, sorted, paginated session listing.
//!
//! Raw query strings are parsed into a [`SessionFilter`] up front; anything
//! unrecognized is rejected rather than silently dropped. Sort column and
//! direction come from fixed allow-lists and are the only pieces of SQL text
//! ever derived from input. Everything else is a bound parameter.

use calltrack_core::config::ListingConfig;
use calltrack_core::error::CallTrackError;
use calltrack_core::models::{Session, SessionPage, SessionStatus};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};

/// Query parameters exactly as received.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    pub caller_id: Option<String>,
    pub callee_id: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    StartedAt,
    EndedAt,
    CreatedAt,
    UpdatedAt,
    CallerId,
    CalleeId,
    Status,
}

impl SortColumn {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "started_at" => Some(Self::StartedAt),
            "ended_at" => Some(Self::EndedAt),
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            "caller_id" => Some(Self::CallerId),
            "callee_id" => Some(Self::CalleeId),
            "status" => Some(Self::Status),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::StartedAt => "started_at",
            Self::EndedAt => "ended_at",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::CallerId => "caller_id",
            Self::CalleeId => "callee_id",
            Self::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Some(Self::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(Self::Desc)
        } else {
            None
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: Option<SessionStatus>,
    pub caller_id: Option<String>,
    pub callee_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
    pub sort_by: SortColumn,
    pub sort_order: SortOrder,
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

fn bad(msg: impl Into<String>) -> CallTrackError {
    CallTrackError::Validation(msg.into())
}

fn parse_date(field: &str, v: &Option<String>) -> Result<Option<DateTime<Utc>>, CallTrackError> {
    present(v)
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|_| bad(format!("{field} must be an RFC 3339 timestamp")))
        })
        .transpose()
}

impl SessionFilter {
    pub fn parse(params: &ListParams, config: &ListingConfig) -> Result<Self, CallTrackError> {
        let start_date = parse_date("start_date", &params.start_date)?;
        let end_date = parse_date("end_date", &params.end_date)?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(bad("start_date must not be after end_date"));
            }
        }

        let status = present(&params.status)
            .map(str::parse::<SessionStatus>)
            .transpose()?;

        let limit = match present(&params.limit) {
            None => config.default_limit,
            Some(s) => match s.parse::<i64>() {
                Ok(n) if n > 0 && n <= config.max_limit => n,
                _ => {
                    return Err(bad(format!(
                        "limit must be an integer between 1 and {}",
                        config.max_limit
                    )))
                }
            },
        };

        let offset = match present(&params.offset) {
            None => 0,
            Some(s) => match s.parse::<i64>() {
                Ok(n) if n >= 0 => n,
                _ => return Err(bad("offset must be a non-negative integer")),
            },
        };

        let sort_by = match present(&params.sort_by) {
            None => SortColumn::StartedAt,
            Some(s) => SortColumn::parse(s).ok_or_else(|| bad(format!("invalid sort_by: {s}")))?,
        };
        let sort_order = match present(&params.sort_order) {
            None => SortOrder::Desc,
            Some(s) => SortOrder::parse(s).ok_or_else(|| bad(format!("invalid sort_order: {s}")))?,
        };

        Ok(Self {
            start_date,
            end_date,
            status,
            caller_id: present(&params.caller_id).map(str::to_string),
            callee_id: present(&params.callee_id).map(str::to_string),
            limit,
            offset,
            sort_by,
            sort_order,
        })
    }
}

fn push_conditions(qb: &mut QueryBuilder<'_, Postgres>, filter: &SessionFilter) {
    qb.push(" WHERE TRUE");
    if let Some(start) = filter.start_date {
        qb.push(" AND started_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND started_at <= ").push_bind(end);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(caller) = &filter.caller_id {
        qb.push(" AND caller_id = ").push_bind(caller.clone());
    }
    if let Some(callee) = &filter.callee_id {
        qb.push(" AND callee_id = ").push_bind(callee.clone());
    }
}

pub fn count_query(filter: &SessionFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM sessions");
    push_conditions(&mut qb, filter);
    qb
}

pub fn page_query(filter: &SessionFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT id, started_at, ended_at, caller_id, callee_id, status, initial_metadata, disposition, created_at, updated_at FROM sessions",
    );
    push_conditions(&mut qb, filter);
    let dir = filter.sort_order.as_sql();
    qb.push(" ORDER BY ")
        .push(filter.sort_by.as_sql())
        .push(" ")
        .push(dir)
        .push(", id ")
        .push(dir);
    qb.push(" LIMIT ").push_bind(filter.limit);
    qb.push(" OFFSET ").push_bind(filter.offset);
    qb
}

/// `total` counts every matching row regardless of the page window.
pub async fn list_sessions(
    pool: &PgPool,
    filter: &SessionFilter,
) -> Result<SessionPage, CallTrackError> {
    let mut count = count_query(filter);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await
        .map_err(CallTrackError::from_db)?;

    let mut page = page_query(filter);
    let sessions = page
        .build_query_as::<Session>()
        .fetch_all(pool)
        .await
        .map_err(CallTrackError::from_db)?;

    Ok(SessionPage {
        total,
        limit: filter.limit,
        offset: filter.offset,
        sessions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ListingConfig {
        ListingConfig {
            default_limit: 50,
            max_limit: 500,
        }
    }

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let mut p = ListParams::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "start_date" => p.start_date = v,
                "end_date" => p.end_date = v,
                "status" => p.status = v,
                "caller_id" => p.caller_id = v,
                "callee_id" => p.callee_id = v,
                "limit" => p.limit = v,
                "offset" => p.offset = v,
                "sort_by" => p.sort_by = v,
                "sort_order" => p.sort_order = v,
                other => panic!("unknown param {other}"),
            }
        }
        p
    }

    #[test]
    fn test_defaults() {
        let f = SessionFilter::parse(&ListParams::default(), &cfg()).unwrap();
        assert_eq!(f.limit, 50);
        assert_eq!(f.offset, 0);
        assert_eq!(f.sort_by, SortColumn::StartedAt);
        assert_eq!(f.sort_order, SortOrder::Desc);
        assert!(f.status.is_none());
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let f = SessionFilter::parse(&params(&[("status", ""), ("caller_id", "")]), &cfg()).unwrap();
        assert!(f.status.is_none());
        assert!(f.caller_id.is_none());
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = SessionFilter::parse(&params(&[("status", "ended")]), &cfg()).unwrap_err();
        assert_eq!(err.to_string(), "invalid status value");
    }

    #[test]
    fn test_sort_allow_list() {
        let err = SessionFilter::parse(&params(&[("sort_by", "id; DROP TABLE sessions")]), &cfg());
        assert!(err.is_err());
        assert!(SessionFilter::parse(&params(&[("sort_order", "sideways")]), &cfg()).is_err());
        let f = SessionFilter::parse(&params(&[("sort_by", "caller_id"), ("sort_order", "ASC")]), &cfg())
            .unwrap();
        assert_eq!(f.sort_by, SortColumn::CallerId);
        assert_eq!(f.sort_order, SortOrder::Asc);
    }

    #[test]
    fn test_limit_bounds() {
        assert!(SessionFilter::parse(&params(&[("limit", "0")]), &cfg()).is_err());
        assert!(SessionFilter::parse(&params(&[("limit", "501")]), &cfg()).is_err());
        assert!(SessionFilter::parse(&params(&[("limit", "ten")]), &cfg()).is_err());
        assert!(SessionFilter::parse(&params(&[("offset", "-1")]), &cfg()).is_err());
        let f = SessionFilter::parse(&params(&[("limit", "500"), ("offset", "20")]), &cfg()).unwrap();
        assert_eq!((f.limit, f.offset), (500, 20));
    }

    #[test]
    fn test_date_range() {
        let f = SessionFilter::parse(
            &params(&[
                ("start_date", "2025-01-01T00:00:00Z"),
                ("end_date", "2025-01-31T23:59:59+02:00"),
            ]),
            &cfg(),
        )
        .unwrap();
        assert_eq!(f.start_date.unwrap().to_rfc3339(), "2025-01-01T00:00:00+00:00");
        assert_eq!(f.end_date.unwrap().to_rfc3339(), "2025-01-31T21:59:59+00:00");

        assert!(SessionFilter::parse(&params(&[("start_date", "yesterday")]), &cfg()).is_err());
        assert!(SessionFilter::parse(
            &params(&[
                ("start_date", "2025-02-01T00:00:00Z"),
                ("end_date", "2025-01-01T00:00:00Z"),
            ]),
            &cfg(),
        )
        .is_err());
    }

    #[test]
    fn test_count_query_ignores_pagination() {
        let f = SessionFilter::parse(
            &params(&[("status", "ongoing"), ("caller_id", "A"), ("limit", "5"), ("offset", "10")]),
            &cfg(),
        )
        .unwrap();
        let count = count_query(&f);
        assert_eq!(
            count.sql(),
            "SELECT COUNT(*) FROM sessions WHERE TRUE AND status = $1 AND caller_id = $2"
        );
    }

    #[test]
    fn test_page_query_shape() {
        let f = SessionFilter::parse(
            &params(&[("callee_id", "B"), ("sort_by", "ended_at"), ("sort_order", "asc")]),
            &cfg(),
        )
        .unwrap();
        let page = page_query(&f);
        assert!(page.sql().ends_with(
            "WHERE TRUE AND callee_id = $1 ORDER BY ended_at ASC, id ASC LIMIT $2 OFFSET $3"
        ));
    }
}
