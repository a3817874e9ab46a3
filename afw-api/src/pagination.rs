//! Pagination bounds
//!
//! Out-of-range requests are clamped to the configured limits, never
//! rejected.

use afw_common::config::QueryLimits;

/// Sanitized LIMIT/OFFSET pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: i64,
    pub offset: i64,
}

/// Clamp a requested window into `limits`
///
/// # Examples
/// ```
/// use afw_api::pagination::clamp_window;
/// use afw_common::config::QueryLimits;
///
/// let limits = QueryLimits { default_limit: 50, max_limit: 500, max_offset: 1000 };
///
/// let w = clamp_window(&limits, None, None);
/// assert_eq!((w.limit, w.offset), (50, 0));
///
/// let w = clamp_window(&limits, Some(10_000), Some(5_000));
/// assert_eq!((w.limit, w.offset), (500, 1000));
/// ```
pub fn clamp_window(limits: &QueryLimits, limit: Option<i64>, offset: Option<i64>) -> PageWindow {
    let max_limit = limits.max_limit.max(1);
    let limit = limit
        .unwrap_or(limits.default_limit)
        .clamp(1, max_limit);
    let offset = offset.unwrap_or(0).clamp(0, limits.max_offset.max(0));

    PageWindow { limit, offset }
}
