// Tag query construction with validated identifiers and typed time bounds
use crate::domain::telemetry::{TagSeriesRequest, MAX_ROWS};

const NANOS_PER_MILLI: i64 = 1_000_000;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum QueryError {
    #[error("invalid table name {0:?}: only [A-Za-z0-9_.] is allowed")]
    InvalidTable(String),
    #[error("invalid tag name {0:?}: only [A-Za-z0-9_.:/-] is allowed")]
    InvalidTag(String),
}

/// A bounded `(time, value)` query for one tag.
///
/// Identifiers are checked against an allow-list when the query is built, so
/// rendering the statement never has to escape anything.
#[derive(Debug, Clone, PartialEq)]
pub struct TagQuery {
    table: String,
    tag: String,
    from_ns: i64,
    to_ns: i64,
    limit: usize,
}

impl TagQuery {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Inclusive window bounds in the store's native unit (nanoseconds).
    pub fn window_ns(&self) -> (i64, i64) {
        (self.from_ns, self.to_ns)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn to_sql(&self) -> String {
        let (from_ns, to_ns) = self.window_ns();
        format!(
            "SELECT time, value FROM {} WHERE name = '{}' AND time BETWEEN {} AND {} LIMIT 0, {}",
            self.table(),
            self.tag(),
            from_ns,
            to_ns,
            self.limit()
        )
    }

    /// Query-string parameters for the store's `/db/query` endpoint.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("q", self.to_sql()),
            ("format", "json".to_string()),
            ("timeformat", "ms".to_string()),
        ]
    }
}

/// Build the query for `request` ending at `now_ms`.
pub fn build_tag_query(request: &TagSeriesRequest, now_ms: i64) -> Result<TagQuery, QueryError> {
    if !is_valid_table(&request.table_name) {
        return Err(QueryError::InvalidTable(request.table_name.clone()));
    }
    if !is_valid_tag(&request.tag_name) {
        return Err(QueryError::InvalidTag(request.tag_name.clone()));
    }

    let range_ms = i64::try_from(request.range_secs)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000);
    let from_ms = now_ms.saturating_sub(range_ms);

    Ok(TagQuery {
        table: request.table_name.clone(),
        tag: request.tag_name.clone(),
        from_ns: from_ms.saturating_mul(NANOS_PER_MILLI),
        to_ns: now_ms.saturating_mul(NANOS_PER_MILLI),
        limit: MAX_ROWS,
    })
}

/// Build the query for `request` ending at the current wall-clock time.
pub fn build_tag_query_now(request: &TagSeriesRequest) -> Result<TagQuery, QueryError> {
    build_tag_query(request, chrono::Utc::now().timestamp_millis())
}

fn is_valid_table(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

// Tag literals also carry device paths ("disk./.used_percent") and prefixes ("host:").
fn is_valid_tag(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '/' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW_MS: i64 = 1_700_000_000_000;

    #[test]
    fn test_window_is_expressed_in_nanoseconds() {
        let request = TagSeriesRequest::new("EXAMPLE", "cpu.percent", 300);
        let query = build_tag_query(&request, NOW_MS).unwrap();

        let (from, to) = query.window_ns();
        assert_eq!(to, NOW_MS * 1_000_000);
        assert_eq!(from, (NOW_MS - 300_000) * 1_000_000);
        assert_eq!(query.limit(), 1_000_000);
    }

    #[test]
    fn test_to_sql() {
        let request = TagSeriesRequest::new("machbasedb.sys.EXAMPLE", "load1", 1);
        let query = build_tag_query(&request, 2).unwrap();
        assert_eq!(
            query.to_sql(),
            "SELECT time, value FROM machbasedb.sys.EXAMPLE WHERE name = 'load1' AND time BETWEEN -998000000 AND 2000000 LIMIT 0, 1000000"
        );
    }

    #[test]
    fn test_zero_range_collapses_window() {
        let request = TagSeriesRequest::new("EXAMPLE", "load1", 0);
        let query = build_tag_query(&request, NOW_MS).unwrap();
        let (from, to) = query.window_ns();
        assert_eq!(from, to);
    }

    #[test]
    fn test_rejects_injection_attempts() {
        let request = TagSeriesRequest::new("EXAMPLE; DROP TABLE x", "load1", 60);
        assert!(matches!(build_tag_query(&request, NOW_MS), Err(QueryError::InvalidTable(_))));

        let request = TagSeriesRequest::new("EXAMPLE", "x' OR '1'='1", 60);
        assert!(matches!(build_tag_query(&request, NOW_MS), Err(QueryError::InvalidTag(_))));

        let request = TagSeriesRequest::new("", "load1", 60);
        assert!(build_tag_query(&request, NOW_MS).is_err());
    }

    #[test]
    fn test_accepts_device_paths_in_tags() {
        let request = TagSeriesRequest::new("EXAMPLE", "host-1:disk./var/lib.used_percent", 60);
        let query = build_tag_query(&request, NOW_MS).unwrap();
        assert_eq!(query.tag(), "host-1:disk./var/lib.used_percent");
    }

    #[test]
    fn test_params_request_json_with_millisecond_times() {
        let request = TagSeriesRequest::new("EXAMPLE", "load1", 60);
        let params = build_tag_query(&request, NOW_MS).unwrap().params();
        assert!(params.contains(&("format", "json".to_string())));
        assert!(params.contains(&("timeformat", "ms".to_string())));
        assert_eq!(params[0].0, "q");
    }
}
