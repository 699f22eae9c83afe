use crate::error::CorralError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Namespace assumed for pods that do not set one
pub const DEFAULT_NAMESPACE: &str = "default";

/// PodKey uniquely identifies a pod across the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodKey {
    /// Namespace of the pod
    pub namespace: String,
    /// Pod name
    pub name: String,
}

impl PodKey {
    /// Create a new PodKey
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Equality-based label selector
///
/// An empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Selector matching every object
    pub fn everything() -> Self {
        Self::default()
    }

    /// Add a required `key=value` pair
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty()
    }

    /// Check whether a label set satisfies every requirement
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        self.match_labels
            .iter()
            .all(|(key, value)| labels.and_then(|l| l.get(key)) == Some(value))
    }
}

impl FromStr for LabelSelector {
    type Err = CorralError;

    /// Parse `app=web,tier=frontend`; the empty string selects everything
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selector = LabelSelector::everything();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| CorralError::invalid_selector(s))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CorralError::invalid_selector(s));
            }
            selector = selector.with_label(key, value.trim());
        }
        Ok(selector)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .match_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{}", pairs.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_key_display() {
        let key = PodKey::new("default", "nginx");
        assert_eq!(key.to_string(), "default/nginx");
    }

    #[test]
    fn test_selector_everything_matches_unlabelled() {
        let selector = LabelSelector::everything();
        assert!(selector.matches(None));
        assert!(selector.matches(Some(&BTreeMap::new())));
    }

    #[test]
    fn test_selector_requires_all_labels() {
        let selector = LabelSelector::everything()
            .with_label("app", "web")
            .with_label("tier", "frontend");

        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "web".to_string());
        assert!(!selector.matches(Some(&labels)));

        labels.insert("tier".to_string(), "frontend".to_string());
        assert!(selector.matches(Some(&labels)));
        assert!(!selector.matches(None));
    }

    #[test]
    fn test_selector_parse() {
        let selector: LabelSelector = "app=web, tier=frontend".parse().unwrap();
        assert_eq!(selector.match_labels.len(), 2);
        assert_eq!(selector.to_string(), "app=web,tier=frontend");

        let empty: LabelSelector = "".parse().unwrap();
        assert!(empty.is_empty());

        assert!("app".parse::<LabelSelector>().is_err());
        assert!("=web".parse::<LabelSelector>().is_err());
    }
}
