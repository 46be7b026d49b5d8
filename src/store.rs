//! Point repository over the `points` table.
//!
//! A series is a metric name plus an exact tag set. Read paths take a tag
//! filter instead: a stored point matches when it carries every filter tag
//! with the same value, regardless of any extra tags it has.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};

use crate::aggregation::{Point, Tags};

pub(crate) fn encode_tags(tags: &Tags) -> rusqlite::Result<String> {
    serde_json::to_string(tags).map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))
}

/// Appends ` AND json_extract(tags, ?) = ?` per filter tag.
fn push_tag_filter(sql: &mut String, args: &mut Vec<SqlValue>, tags: &Tags) {
    for (key, value) in tags {
        sql.push_str(" AND json_extract(tags, ?) = ?");
        args.push(SqlValue::Text(format!("$.\"{key}\"")));
        args.push(SqlValue::Text(value.clone()));
    }
}

pub fn insert_points(
    conn: &Connection,
    metric: &str,
    tags: &Tags,
    points: &[Point],
) -> rusqlite::Result<usize> {
    let encoded = encode_tags(tags)?;
    let mut stmt =
        conn.prepare_cached("INSERT INTO points (metric, tags, ts, value) VALUES (?1, ?2, ?3, ?4)")?;
    for point in points {
        stmt.execute(params![metric, encoded, point.timestamp, point.value])?;
    }
    Ok(points.len())
}

/// Points of `metric` matching the tag filter with `start <= ts <= end`,
/// ascending by timestamp. A `limit` of 0 means unlimited.
pub fn query_raw_points(
    conn: &Connection,
    metric: &str,
    tags: &Tags,
    start: i64,
    end: i64,
    limit: usize,
) -> rusqlite::Result<Vec<Point>> {
    let mut sql = String::from("SELECT ts, value FROM points WHERE metric = ? AND ts >= ? AND ts <= ?");
    let mut args = vec![
        SqlValue::Text(metric.to_string()),
        SqlValue::Integer(start),
        SqlValue::Integer(end),
    ];
    push_tag_filter(&mut sql, &mut args, tags);
    sql.push_str(" ORDER BY ts ASC, rowid ASC");
    if limit > 0 {
        sql.push_str(" LIMIT ?");
        args.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args), |row| {
        Ok(Point::new(row.get(0)?, row.get(1)?))
    })?;
    rows.collect()
}

/// Overwrites the value stored at `point.timestamp` for the exact series, or
/// inserts it when no such row exists. Returns true when a row was updated.
pub fn upsert_point(
    conn: &Connection,
    metric: &str,
    tags: &Tags,
    point: &Point,
) -> rusqlite::Result<bool> {
    let encoded = encode_tags(tags)?;
    let updated = conn.execute(
        "UPDATE points SET value = ?1 WHERE metric = ?2 AND tags = ?3 AND ts = ?4",
        params![point.value, metric, encoded, point.timestamp],
    )?;
    if updated > 0 {
        return Ok(true);
    }
    conn.execute(
        "INSERT INTO points (metric, tags, ts, value) VALUES (?1, ?2, ?3, ?4)",
        params![metric, encoded, point.timestamp, point.value],
    )?;
    Ok(false)
}

fn timestamp_bound(
    conn: &Connection,
    aggregate: &str,
    metric: &str,
    tags: &Tags,
) -> rusqlite::Result<Option<i64>> {
    let mut sql = format!("SELECT {aggregate}(ts) FROM points WHERE metric = ?");
    let mut args = vec![SqlValue::Text(metric.to_string())];
    push_tag_filter(&mut sql, &mut args, tags);
    conn.query_row(&sql, params_from_iter(args), |row| row.get(0))
}

/// `None` when no point of `metric` matches the filter.
pub fn earliest_timestamp(
    conn: &Connection,
    metric: &str,
    tags: &Tags,
) -> rusqlite::Result<Option<i64>> {
    timestamp_bound(conn, "MIN", metric, tags)
}

pub fn latest_timestamp(
    conn: &Connection,
    metric: &str,
    tags: &Tags,
) -> rusqlite::Result<Option<i64>> {
    timestamp_bound(conn, "MAX", metric, tags)
}

pub fn list_metrics(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT metric FROM points ORDER BY metric")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn query_filters_by_range_and_tags() {
        let conn = db::open_in_memory().expect("db");
        let east = tags(&[("host", "a"), ("region", "east")]);
        let west = tags(&[("host", "b"), ("region", "west")]);
        insert_points(
            &conn,
            "cpu",
            &east,
            &[Point::new(30, 3.0), Point::new(10, 1.0), Point::new(20, 2.0)],
        )
        .expect("insert east");
        insert_points(&conn, "cpu", &west, &[Point::new(15, 9.0)]).expect("insert west");
        insert_points(&conn, "mem", &east, &[Point::new(15, 7.0)]).expect("insert mem");

        let all = query_raw_points(&conn, "cpu", &Tags::new(), 0, 100, 0).expect("query");
        assert_eq!(
            all.iter().map(|p| p.timestamp).collect::<Vec<_>>(),
            vec![10, 15, 20, 30]
        );

        let filtered =
            query_raw_points(&conn, "cpu", &tags(&[("region", "east")]), 15, 30, 0).expect("query");
        assert_eq!(
            filtered.iter().map(|p| p.value).collect::<Vec<_>>(),
            vec![2.0, 3.0]
        );

        let limited = query_raw_points(&conn, "cpu", &Tags::new(), 0, 100, 2).expect("query");
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn timestamp_bounds_are_none_without_rows() {
        let conn = db::open_in_memory().expect("db");
        assert_eq!(earliest_timestamp(&conn, "cpu", &Tags::new()).expect("min"), None);
        assert_eq!(latest_timestamp(&conn, "cpu", &Tags::new()).expect("max"), None);

        insert_points(&conn, "cpu", &tags(&[("host", "a")]), &[Point::new(5, 1.0), Point::new(50, 2.0)])
            .expect("insert");
        assert_eq!(earliest_timestamp(&conn, "cpu", &Tags::new()).expect("min"), Some(5));
        assert_eq!(latest_timestamp(&conn, "cpu", &Tags::new()).expect("max"), Some(50));
        assert_eq!(
            latest_timestamp(&conn, "cpu", &tags(&[("host", "z")])).expect("max"),
            None
        );
    }

    #[test]
    fn upsert_updates_exact_series_only() {
        let conn = db::open_in_memory().expect("db");
        let series = tags(&[("host", "a")]);
        assert!(!upsert_point(&conn, "cpu", &series, &Point::new(10, 1.0)).expect("insert"));
        assert!(upsert_point(&conn, "cpu", &series, &Point::new(10, 4.0)).expect("update"));

        let points = query_raw_points(&conn, "cpu", &series, 0, 100, 0).expect("query");
        assert_eq!(points, vec![Point::new(10, 4.0)]);
    }

    #[test]
    fn list_metrics_is_sorted_and_distinct() {
        let conn = db::open_in_memory().expect("db");
        for metric in ["mem", "cpu", "mem"] {
            insert_points(&conn, metric, &Tags::new(), &[Point::new(1, 1.0)]).expect("insert");
        }
        assert_eq!(list_metrics(&conn).expect("list"), vec!["cpu", "mem"]);
    }
}
