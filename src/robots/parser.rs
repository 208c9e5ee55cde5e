//! Robots.txt decisions backed by the robotstxt crate

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Allow/deny decisions for one host's robots.txt
///
/// Matching is delegated to `robotstxt`; this type only keeps the raw body and
/// answers questions about it.
#[derive(Debug, Clone, Default)]
pub struct ParsedRobots {
    /// Raw robots.txt body (empty means no restrictions)
    content: String,
}

impl ParsedRobots {
    /// Wraps a raw robots.txt body
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// A robots file with no restrictions
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Returns the raw robots.txt body
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks whether `agent` may fetch `url`
    ///
    /// `url` should be absolute (e.g. `https://example.com/page`) and `agent`
    /// the crawler's product token.
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, agent, url)
    }

    /// Returns the `Crawl-delay` that applies to `agent`
    ///
    /// A group naming the agent wins over the `*` group.
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        let agent = agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in self.content.lines() {
            // Strip comments
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                if !in_agent_lines {
                    group.clear();
                }
                group.push(value.to_lowercase());
                in_agent_lines = true;
                continue;
            }
            in_agent_lines = false;

            if key != "crawl-delay" {
                continue;
            }
            let Some(delay) = parse_delay(value) else {
                continue;
            };
            if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                specific = Some(delay);
            } else if group.iter().any(|ua| ua == "*") {
                wildcard = Some(delay);
            }
        }

        specific.or(wildcard)
    }
}

fn parse_delay(value: &str) -> Option<Duration> {
    let seconds = value.parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}
