//! Append-time filtering policy (spec §4.4): requests matching any
//! exclusion are never journaled at all, so they can never trigger
//! recovery.

use stellane_types::{RecoverySection, RequestFingerprint};

/// A user-supplied predicate consulted last, after the configured
/// exclusion sets. Boxed so `Journal` doesn't need to be generic over it.
pub type Predicate = Box<dyn Fn(&RequestFingerprint) -> bool + Send + Sync>;

pub struct FilterPolicy {
    excluded_methods: Vec<String>,
    excluded_path_patterns: Vec<String>,
    excluded_content_types: Vec<String>,
    min_body_size: usize,
    max_body_size: usize,
    predicate: Option<Predicate>,
}

impl FilterPolicy {
    pub fn from_config(config: &RecoverySection) -> Self {
        Self {
            excluded_methods: config
                .excluded_methods
                .iter()
                .map(|m| m.to_ascii_uppercase())
                .collect(),
            excluded_path_patterns: config.excluded_path_patterns.clone(),
            excluded_content_types: config.excluded_content_types.clone(),
            min_body_size: config.min_body_size,
            max_body_size: config.max_body_size,
            predicate: None,
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// `true` means the request should be journaled; `false` means it's
    /// excluded and the caller must skip `append` entirely.
    pub fn should_journal(&self, fingerprint: &RequestFingerprint) -> bool {
        if self
            .excluded_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&fingerprint.method))
        {
            return false;
        }

        if self
            .excluded_path_patterns
            .iter()
            .any(|pattern| path_matches(pattern, &fingerprint.path))
        {
            return false;
        }

        if let Some(content_type) = fingerprint.header("Content-Type") {
            if self
                .excluded_content_types
                .iter()
                .any(|pattern| content_type.contains(pattern.as_str()))
            {
                return false;
            }
        }

        let body_len = fingerprint.body.len();
        if body_len < self.min_body_size || body_len > self.max_body_size {
            return false;
        }

        if let Some(predicate) = &self.predicate {
            if !predicate(fingerprint) {
                return false;
            }
        }

        true
    }
}

/// Minimal glob matcher supporting a single trailing `*` (e.g.
/// `/health*`), the only wildcard form spec §4.4's path-pattern exclusion
/// needs. Patterns without a `*` match exactly.
fn path_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => pattern == path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RecoverySection {
        let mut c = RecoverySection::default();
        c.excluded_methods = vec!["GET".into(), "HEAD".into()];
        c.excluded_path_patterns = vec!["/health*".into()];
        c.excluded_content_types = vec!["multipart/form-data".into()];
        c.min_body_size = 1;
        c.max_body_size = 1024;
        c
    }

    #[test]
    fn excludes_configured_method() {
        let policy = FilterPolicy::from_config(&config());
        let fp = RequestFingerprint::new("GET", "/orders", vec![1]);
        assert!(!policy.should_journal(&fp));
    }

    #[test]
    fn excludes_path_prefix_pattern() {
        let policy = FilterPolicy::from_config(&config());
        let fp = RequestFingerprint::new("POST", "/health/live", vec![1]);
        assert!(!policy.should_journal(&fp));
    }

    #[test]
    fn excludes_out_of_range_body_size() {
        let policy = FilterPolicy::from_config(&config());
        let empty = RequestFingerprint::new("POST", "/orders", vec![]);
        assert!(!policy.should_journal(&empty));
    }

    #[test]
    fn excludes_via_custom_predicate() {
        let policy = FilterPolicy::from_config(&config())
            .with_predicate(Box::new(|fp| !fp.path.contains("internal")));
        let fp = RequestFingerprint::new("POST", "/internal/debug", vec![1]);
        assert!(!policy.should_journal(&fp));
    }

    #[test]
    fn admits_an_ordinary_mutating_request() {
        let policy = FilterPolicy::from_config(&config());
        let fp = RequestFingerprint::new("POST", "/orders", vec![1, 2, 3]);
        assert!(policy.should_journal(&fp));
    }
}
