//! Helpers for the Wayback Machine: CDX snapshot index queries and
//! snapshot URL construction.

use crate::error::Result;

/// CDX query for every distinct successful capture of `feed_url`, timestamps only.
pub fn cdx_query_url(cdx_endpoint: &str, feed_url: &str) -> String {
    format!(
        "{}?url={}&output=json&fl=timestamp&filter=statuscode:200&collapse=digest",
        cdx_endpoint,
        urlencoding::encode(feed_url)
    )
}

/// Raw (un-rewritten) body of the capture taken at `timestamp`.
pub fn snapshot_url(archive_base: &str, timestamp: &str, feed_url: &str) -> String {
    format!("{}/{}id_/{}", archive_base.trim_end_matches('/'), timestamp, feed_url)
}

/// Parse a CDX JSON response: an array of rows whose first row is the
/// header. Returns timestamps in ascending order, deduplicated.
pub fn parse_cdx_timestamps(body: &[u8]) -> Result<Vec<String>> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }
    let rows: Vec<Vec<String>> = serde_json::from_slice(body)?;
    let mut timestamps: Vec<String> = rows
        .into_iter()
        .skip(1)
        .filter_map(|row| row.into_iter().next())
        .filter(|ts| !ts.is_empty() && ts.bytes().all(|b| b.is_ascii_digit()))
        .collect();
    timestamps.sort();
    timestamps.dedup();
    Ok(timestamps)
}

/// Thin a sorted timestamp list to at most `cap` entries spread evenly over
/// its whole range. The oldest and newest entries always survive.
pub fn sample_evenly(timestamps: Vec<String>, cap: usize) -> Vec<String> {
    let len = timestamps.len();
    if len <= cap {
        return timestamps;
    }
    if cap < 2 {
        return timestamps.into_iter().take(cap).collect();
    }

    let step = (len - 1) as f64 / (cap - 1) as f64;
    let mut picked: Vec<usize> = (0..cap)
        .map(|i| ((i as f64 * step).round() as usize).min(len - 1))
        .collect();
    picked.dedup();

    picked.into_iter().map(|i| timestamps[i].clone()).collect()
}
