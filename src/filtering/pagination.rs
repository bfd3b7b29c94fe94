use axum::http::header::{CONTENT_RANGE, HeaderMap, HeaderValue};

use crate::errors::FindError;

/// Largest accepted range bound. Offsets and limits are bound as signed
/// 64-bit integers by every supported driver.
pub const MAX_RANGE_BOUND: u64 = i64::MAX as u64;

/// Parse an inclusive `start..=end` index range.
///
/// `start` is validated first, so a non-numeric start fails whatever `end`
/// holds.
///
/// # Errors
///
/// Invalid-range error when a bound is missing, is not a non-negative
/// integer, exceeds [`MAX_RANGE_BOUND`], or `end < start`.
pub fn parse_range(start: Option<&str>, end: Option<&str>) -> Result<Option<(u64, u64)>, FindError> {
    let (start, end) = match (start, end) {
        (None, None) => return Ok(None),
        (None, Some(_)) => {
            return Err(FindError::invalid_range("range end given without range start"));
        }
        (Some(start), end) => {
            let start = parse_bound("start", start)?;
            let end = end.ok_or_else(|| FindError::invalid_range("range start given without range end"))?;
            (start, parse_bound("end", end)?)
        }
    };
    if end < start {
        return Err(FindError::invalid_range(format!(
            "range end {end} is before range start {start}"
        )));
    }
    Ok(Some((start, end)))
}

fn parse_bound(which: &str, value: &str) -> Result<u64, FindError> {
    let bound = value.trim().parse::<u64>().map_err(|_| {
        FindError::invalid_range(format!(
            "range {which} \"{value}\" is not a non-negative integer"
        ))
    })?;
    if bound > MAX_RANGE_BOUND {
        return Err(FindError::invalid_range(format!(
            "range {which} {bound} is larger than {MAX_RANGE_BOUND}"
        )));
    }
    Ok(bound)
}

/// Row limit of the inclusive range `start..=end`, capped at [`MAX_RANGE_BOUND`].
#[must_use]
pub fn range_limit(start: u64, end: u64) -> u64 {
    end.saturating_sub(start)
        .saturating_add(1)
        .min(MAX_RANGE_BOUND)
}

/// Sanitize resource name by removing control characters for HTTP headers
fn sanitize_resource_name(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii() && !c.is_ascii_control()).collect()
}

/// `Content-Range` header for an inclusive range of a result with `total`
/// rows, e.g. `persons 2-4/10`. A range starting at or past `total` is
/// unsatisfied and renders as `persons */10`.
#[must_use]
pub fn content_range(start: u64, end: u64, total: u64, resource_name: &str) -> HeaderMap {
    let safe_name = sanitize_resource_name(resource_name);
    let range = if start >= total {
        format!("{safe_name} */{total}")
    } else {
        format!("{safe_name} {start}-{}/{total}", end.min(total - 1))
    };

    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&range)
        .unwrap_or_else(|_| HeaderValue::from_static("items */0"));
    headers.insert(CONTENT_RANGE, value);
    headers
}
