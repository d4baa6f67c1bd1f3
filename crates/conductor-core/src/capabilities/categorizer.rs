//! Capability categorization
//!
//! Categories are coarse tags the query analyzer and planner match against.
//! Built-in tools are tagged by toolkit; everything else goes through
//! keyword rules, falling back to the server name or `workflow`.

use once_cell::sync::Lazy;

use super::types::CapabilitySource;

/// Category assigned to workflows no rule matches
pub const WORKFLOW_CATEGORY: &str = "workflow";

/// Assigns a category to a capability
pub trait Categorizer: Send + Sync {
    fn categorize(&self, name: &str, description: &str, source: &CapabilitySource) -> String;
}

/// Keywords that map to one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    pub category: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    /// Create a rule
    pub fn new(category: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            category: category.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Check whether any keyword occurs in `text`
    ///
    /// Hyphenated keywords match as substrings of the normalized text; plain
    /// keywords must match a whole word, so `ads` does not match `downloads`.
    pub fn matches(&self, text: &str) -> bool {
        let normalized = normalize(text);
        let words: Vec<&str> = normalized
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        self.keywords.iter().any(|keyword| {
            if keyword.contains('-') {
                normalized.contains(keyword.as_str())
            } else {
                words.iter().any(|w| *w == keyword)
            }
        })
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['_', ' '], "-")
}

static DEFAULT_RULES: Lazy<Vec<KeywordRule>> = Lazy::new(|| {
    vec![
        KeywordRule::new("google-ads", &["google-ads", "googleads", "adwords", "ads", "campaign", "campaigns"]),
        KeywordRule::new("analytics", &["analytics", "ga4", "traffic", "pageviews", "sessions"]),
        KeywordRule::new("search-console", &["search-console", "seo", "impressions"]),
        KeywordRule::new("spreadsheet", &["sheet", "sheets", "spreadsheet", "csv"]),
        KeywordRule::new("email", &["mail", "email", "gmail", "inbox"]),
        KeywordRule::new("calendar", &["calendar", "meeting", "meetings", "event", "events"]),
        KeywordRule::new("files", &["file", "files", "fs", "filesystem", "directory"]),
        KeywordRule::new("web", &["http", "fetch", "url", "web", "website"]),
        KeywordRule::new("chart", &["chart", "charts", "graph", "plot", "visualize", "visualization"]),
    ]
});

/// Keyword rule categorizer
#[derive(Debug, Clone)]
pub struct KeywordCategorizer {
    rules: Vec<KeywordRule>,
}

impl KeywordCategorizer {
    /// Create with the default rules
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }

    /// Create with custom rules
    pub fn with_rules(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    /// Rules in priority order
    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// First rule matching `text`
    pub fn match_text(&self, text: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(text))
            .map(|rule| rule.category.as_str())
    }
}

impl Default for KeywordCategorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Categorizer for KeywordCategorizer {
    fn categorize(&self, name: &str, description: &str, source: &CapabilitySource) -> String {
        match source {
            CapabilitySource::Builtin { toolkit, .. } => toolkit.clone(),
            CapabilitySource::Remote { server, tool } => self
                .match_text(&format!("{} {}", server, tool))
                .map(str::to_string)
                .unwrap_or_else(|| server.clone()),
            CapabilitySource::Workflow { .. } => self
                .match_text(&format!("{} {}", name, description))
                .map(str::to_string)
                .unwrap_or_else(|| WORKFLOW_CATEGORY.to_string()),
        }
    }
}
