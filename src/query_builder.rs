use crate::config::CrawlConfig;

/// Composes the search text typed into the site's search box.
///
/// Time bounds win over date bounds: when either `since_time` or
/// `until_time` is set, both date bounds are left out. Both kinds use the
/// same `since:`/`until:` operators.
pub fn build(config: &CrawlConfig) -> String {
    let bounds = if config.has_time_filter() {
        &config.time_range
    } else {
        &config.date_range
    };

    let mut query = config.query.clone();
    if let Some(since) = &bounds.since {
        query.push_str(&format!(" since:{}", since));
    }
    if let Some(until) = &bounds.until {
        query.push_str(&format!(" until:{}", until));
    }
    query
}
