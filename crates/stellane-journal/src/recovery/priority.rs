//! Recovery task priority computation (spec §4.5 step 2): explicit
//! method mapping, then path-pattern mapping, then a user-supplied
//! function, falling back to `Priority::NORMAL`.

use std::collections::HashMap;
use std::sync::Arc;

use stellane_types::{Priority, RequestFingerprint};

type CustomFn = Arc<dyn Fn(&RequestFingerprint) -> Option<Priority> + Send + Sync>;

#[derive(Clone, Default)]
pub struct RecoveryPriorityMap {
    by_method: HashMap<String, Priority>,
    by_path_pattern: Vec<(String, Priority)>,
    custom: Option<CustomFn>,
}

impl RecoveryPriorityMap {
    pub fn with_method(mut self, method: impl Into<String>, priority: Priority) -> Self {
        self.by_method.insert(method.into().to_ascii_uppercase(), priority);
        self
    }

    pub fn with_path_pattern(mut self, pattern: impl Into<String>, priority: Priority) -> Self {
        self.by_path_pattern.push((pattern.into(), priority));
        self
    }

    pub fn with_custom(
        mut self,
        f: impl Fn(&RequestFingerprint) -> Option<Priority> + Send + Sync + 'static,
    ) -> Self {
        self.custom = Some(Arc::new(f));
        self
    }

    pub fn compute(&self, fingerprint: &RequestFingerprint) -> Priority {
        if let Some(priority) = self.by_method.get(&fingerprint.method.to_ascii_uppercase()) {
            return *priority;
        }

        for (pattern, priority) in &self.by_path_pattern {
            if path_matches(pattern, &fingerprint.path) {
                return *priority;
            }
        }

        if let Some(custom) = &self.custom {
            if let Some(priority) = custom(fingerprint) {
                return priority;
            }
        }

        Priority::NORMAL
    }
}

fn path_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => pattern == path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_mapping_wins_over_default() {
        let map = RecoveryPriorityMap::default().with_method("DELETE", Priority::HIGH);
        let fp = RequestFingerprint::new("DELETE", "/accounts/1", vec![]);
        assert_eq!(map.compute(&fp), Priority::HIGH);
    }

    #[test]
    fn path_pattern_applies_when_method_unmapped() {
        let map = RecoveryPriorityMap::default().with_path_pattern("/payments*", Priority::HIGH);
        let fp = RequestFingerprint::new("POST", "/payments/charge", vec![]);
        assert_eq!(map.compute(&fp), Priority::HIGH);
    }

    #[test]
    fn falls_back_to_normal_with_no_mapping() {
        let map = RecoveryPriorityMap::default();
        let fp = RequestFingerprint::new("POST", "/orders", vec![]);
        assert_eq!(map.compute(&fp), Priority::NORMAL);
    }

    #[test]
    fn custom_function_is_consulted_last() {
        let map = RecoveryPriorityMap::default().with_custom(|fp| {
            if fp.path.starts_with("/webhooks") {
                Some(Priority::LOW)
            } else {
                None
            }
        });
        let fp = RequestFingerprint::new("POST", "/webhooks/stripe", vec![]);
        assert_eq!(map.compute(&fp), Priority::LOW);
    }
}
