//! Search-text normalization for proposal lookups.

/// Desktop-level wildcard configuration.
///
/// `auto_prefix` prepends a `*` so that "berg" also finds "Heidelberg"; the
/// trailing `*` is mandatory either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WildcardPolicy {
    pub auto_prefix: bool,
}

impl Default for WildcardPolicy {
    fn default() -> Self {
        Self { auto_prefix: false }
    }
}

/// A normalized search parameter, ready to become a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchParam {
    /// Empty input or a lone `*`: browse everything.
    BrowseAll,
    /// Wildcard-normalized text pattern.
    Text(String),
}

impl SearchParam {
    pub fn for_text(raw: &str, policy: &WildcardPolicy) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return SearchParam::BrowseAll;
        }
        let mut pattern = String::new();
        if policy.auto_prefix && !trimmed.starts_with('*') {
            pattern.push('*');
        }
        pattern.push_str(trimmed);
        if !pattern.ends_with('*') {
            pattern.push('*');
        }
        SearchParam::Text(pattern)
    }

    pub fn is_browse_all(&self) -> bool {
        matches!(self, SearchParam::BrowseAll)
    }
}
