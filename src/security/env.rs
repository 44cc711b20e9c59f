//! Filtering of sensitive variables from inherited environments.

use std::collections::HashMap;
use std::ffi::OsStr;

/// Variable-name prefixes that are withheld from child processes.
const SENSITIVE_PREFIXES: &[&str] = &[
    "AWS_SECRET",
    "GITHUB_TOKEN",
    "GITLAB_TOKEN",
    "NPM_TOKEN",
    "DOCKER_PASSWORD",
    "DATABASE_PASSWORD",
    "API_KEY",
    "SECRET",
    "PRIVATE_KEY",
];

/// Removes credentials from the environment a child inherits.
///
/// A variable is sensitive when its upper-cased name equals one of the
/// prefixes or starts with the prefix followed by `_`. Individual commands
/// can be granted access to specific sensitive variables.
#[derive(Debug, Clone)]
pub struct EnvSanitizer {
    prefixes: Vec<String>,
    grants: HashMap<String, Vec<String>>,
}

impl Default for EnvSanitizer {
    fn default() -> Self {
        let mut grants = HashMap::new();
        grants.insert(
            "goreleaser".to_string(),
            vec![
                "GITHUB_TOKEN".to_string(),
                "GITLAB_TOKEN".to_string(),
                "GITEA_TOKEN".to_string(),
            ],
        );

        Self {
            prefixes: SENSITIVE_PREFIXES.iter().map(|p| p.to_string()).collect(),
            grants,
        }
    }
}

impl EnvSanitizer {
    /// A sanitizer that passes every variable through.
    pub fn passthrough() -> Self {
        Self {
            prefixes: Vec::new(),
            grants: HashMap::new(),
        }
    }

    /// Allow `command` to see the sensitive variable `var`.
    pub fn grant(mut self, command: impl Into<String>, var: impl Into<String>) -> Self {
        self.grants
            .entry(command.into())
            .or_default()
            .push(var.into().to_uppercase());
        self
    }

    /// Whether `var` would be withheld from `command`.
    pub fn is_withheld(&self, var: &str, command: &str) -> bool {
        let upper = var.to_uppercase();

        let sensitive = self.prefixes.iter().any(|prefix| {
            upper
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('_'))
        });
        if !sensitive {
            return false;
        }

        !self
            .grants
            .get(command)
            .is_some_and(|vars| vars.iter().any(|v| *v == upper))
    }

    /// Filter an environment for `command`.
    ///
    /// Names that are not valid Unicode are judged on their lossy
    /// rendering, so `SECRET_\xff` is still withheld.
    pub fn filter<I, K, V>(&self, vars: I, command: &str) -> Vec<(K, V)>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
    {
        vars.into_iter()
            .filter(|(key, _)| !self.is_withheld(&key.as_ref().to_string_lossy(), command))
            .collect()
    }

    /// Whether this sanitizer removes anything at all.
    pub fn is_passthrough(&self) -> bool {
        self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_filters_sensitive_variables() {
        let sanitizer = EnvSanitizer::default();
        let filtered = sanitizer.filter(
            env(&[
                ("PATH", "/usr/bin"),
                ("AWS_SECRET_ACCESS_KEY", "x"),
                ("GITHUB_TOKEN", "x"),
                ("SECRET", "x"),
                ("HOME", "/root"),
            ]),
            "go",
        );

        let keys: Vec<_> = filtered.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["PATH", "HOME"]);
    }

    #[test]
    fn test_prefix_must_end_at_boundary() {
        let sanitizer = EnvSanitizer::default();

        assert!(sanitizer.is_withheld("API_KEY_PROD", "go"));
        assert!(!sanitizer.is_withheld("SECRETARY", "go"));
        assert!(!sanitizer.is_withheld("API_KEYRING", "go"));
    }

    #[test]
    fn test_case_insensitive_names() {
        let sanitizer = EnvSanitizer::default();
        assert!(sanitizer.is_withheld("github_token", "git"));
    }

    #[test]
    fn test_goreleaser_sees_release_tokens() {
        let sanitizer = EnvSanitizer::default();

        assert!(!sanitizer.is_withheld("GITHUB_TOKEN", "goreleaser"));
        assert!(!sanitizer.is_withheld("GITLAB_TOKEN", "goreleaser"));
        assert!(sanitizer.is_withheld("AWS_SECRET_ACCESS_KEY", "goreleaser"));
        assert!(sanitizer.is_withheld("GITHUB_TOKEN", "go"));
    }

    #[test]
    fn test_custom_grant() {
        let sanitizer = EnvSanitizer::default().grant("npm", "npm_token");
        assert!(!sanitizer.is_withheld("NPM_TOKEN", "npm"));
        assert!(sanitizer.is_withheld("NPM_TOKEN", "yarn"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_unicode_entries() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let sanitizer = EnvSanitizer::default();
        let filtered = sanitizer.filter(
            vec![
                (OsString::from("LANG"), OsString::from_vec(b"\xff\xfe".to_vec())),
                (OsString::from_vec(b"SECRET_\xff".to_vec()), OsString::from("x")),
                (OsString::from_vec(b"PLAIN_\xff".to_vec()), OsString::from("y")),
            ],
            "go",
        );

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].0, "LANG");
        assert_eq!(filtered[1].1, "y");
    }

    #[test]
    fn test_passthrough() {
        let sanitizer = EnvSanitizer::passthrough();
        assert!(sanitizer.is_passthrough());
        assert!(!sanitizer.is_withheld("GITHUB_TOKEN", "go"));
    }
}
