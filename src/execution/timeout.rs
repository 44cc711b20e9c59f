//! Per-command timeout tiers.
//!
//! Long-running build, test and release tools get generous budgets while
//! everyday utilities fail fast. The table is a plain ordered list of rules,
//! evaluated first-match-wins, ending in a single default.

use std::time::Duration;

/// Matches the executable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPattern {
    /// Exactly this name.
    Exact(String),
    /// Any of these names.
    OneOf(Vec<String>),
}

impl CommandPattern {
    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == name,
            Self::OneOf(names) => names.iter().any(|n| n == name),
        }
    }
}

/// Matches the first argument (the subcommand).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgPattern {
    /// Anything, including no arguments at all.
    Any,
    /// First argument equals this value.
    Exact(String),
    /// First argument is one of these values.
    OneOf(Vec<String>),
    /// First argument starts with this prefix.
    Prefix(String),
}

impl ArgPattern {
    fn matches(&self, first: Option<&str>) -> bool {
        match (self, first) {
            (Self::Any, _) => true,
            (_, None) => false,
            (Self::Exact(expected), Some(arg)) => expected == arg,
            (Self::OneOf(values), Some(arg)) => values.iter().any(|v| v == arg),
            (Self::Prefix(prefix), Some(arg)) => arg.starts_with(prefix.as_str()),
        }
    }
}

/// One row of the timeout table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutRule {
    pub command: CommandPattern,
    pub arg: ArgPattern,
    pub duration: Duration,
}

impl TimeoutRule {
    /// Rule matching `command` with any arguments.
    pub fn command(command: &str, duration: Duration) -> Self {
        Self {
            command: CommandPattern::Exact(command.to_string()),
            arg: ArgPattern::Any,
            duration,
        }
    }

    /// Rule matching `command` whose first argument is `subcommand`.
    pub fn subcommand(command: &str, subcommand: &str, duration: Duration) -> Self {
        Self {
            command: CommandPattern::Exact(command.to_string()),
            arg: ArgPattern::Exact(subcommand.to_string()),
            duration,
        }
    }

    /// Whether the rule applies to this invocation.
    pub fn matches<S: AsRef<str>>(&self, name: &str, args: &[S]) -> bool {
        self.command.matches(name) && self.arg.matches(args.first().map(AsRef::as_ref))
    }
}

const MINUTE: Duration = Duration::from_secs(60);

/// Timeout for anything the table does not mention.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Ordered first-match-wins timeout table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    rules: Vec<TimeoutRule>,
    default: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl TimeoutPolicy {
    /// Build a policy from explicit rules and a fallback duration.
    pub fn new(rules: Vec<TimeoutRule>, default: Duration) -> Self {
        Self { rules, default }
    }

    /// The built-in table for Go toolchains, mage targets and linters.
    pub fn standard() -> Self {
        let strings =
            |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };

        let rules = vec![
            TimeoutRule::subcommand("go", "test", 10 * MINUTE),
            TimeoutRule::subcommand("go", "install", 5 * MINUTE),
            TimeoutRule::subcommand("go", "build", 3 * MINUTE),
            TimeoutRule::command("go", 2 * MINUTE),
            TimeoutRule {
                command: CommandPattern::Exact("mage".into()),
                arg: ArgPattern::OneOf(strings(&["test", "testDefault"])),
                duration: 10 * MINUTE,
            },
            TimeoutRule {
                command: CommandPattern::Exact("mage".into()),
                arg: ArgPattern::Prefix("test:".into()),
                duration: 10 * MINUTE,
            },
            TimeoutRule::command("mage", 3 * MINUTE),
            TimeoutRule::command("goreleaser", 30 * MINUTE),
            TimeoutRule::command("golangci-lint", 5 * MINUTE),
            TimeoutRule {
                command: CommandPattern::OneOf(strings(&["staticcheck", "gosec", "govulncheck"])),
                arg: ArgPattern::Any,
                duration: 3 * MINUTE,
            },
        ];

        Self::new(rules, DEFAULT_TIMEOUT)
    }

    /// Resolve the timeout tier for an invocation.
    pub fn resolve<S: AsRef<str>>(&self, name: &str, args: &[S]) -> Duration {
        self.rules
            .iter()
            .find(|rule| rule.matches(name, args))
            .map_or(self.default, |rule| rule.duration)
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[TimeoutRule] {
        &self.rules
    }

    /// Duration used when no rule matches.
    pub fn default_timeout(&self) -> Duration {
        self.default
    }

    /// Insert a rule ahead of the existing ones.
    pub fn with_rule(mut self, rule: TimeoutRule) -> Self {
        self.rules.insert(0, rule);
        self
    }
}
