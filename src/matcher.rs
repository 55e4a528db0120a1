// src/matcher.rs
//! Case-insensitive substring matching of domains against watch targets

/// Immutable target list plus optional scope keyword
#[derive(Debug, Clone)]
pub struct TargetMatcher {
    /// (as configured, lowercased)
    targets: Vec<(String, String)>,
    scope: Option<String>,
}

impl TargetMatcher {
    /// Build a matcher. Blank targets are ignored; a blank scope means no scope filter.
    pub fn new(targets: &[String], scope: Option<&str>) -> Self {
        let targets = targets
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| (t.to_string(), t.to_lowercase()))
            .collect();

        let scope = scope
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        Self { targets, scope }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|(original, _)| original.as_str())
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Every target `domain` matches, in configuration order
    pub fn matching_targets(&self, domain: &str) -> Vec<&str> {
        let domain = domain.to_lowercase();

        if let Some(ref scope) = self.scope {
            if !domain.contains(scope.as_str()) {
                return Vec::new();
            }
        }

        self.targets
            .iter()
            .filter(|(_, lower)| domain.contains(lower.as_str()))
            .map(|(original, _)| original.as_str())
            .collect()
    }

    pub fn matches(&self, domain: &str) -> bool {
        !self.matching_targets(domain).is_empty()
    }
}
