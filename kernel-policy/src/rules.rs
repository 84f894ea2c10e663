//! Ordered tool-name to permission rules.

use glob::Pattern;
use kernel_primitives::Permission;
use thiserror::Error;
use tracing::debug;

/// Permission required by tools that no rule matches.
pub const DEFAULT_PERMISSION: Permission = Permission::ReadAnalysis;

/// Errors surfaced while building permission rules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// Rule configuration error.
    #[error("invalid permission rule: {0}")]
    InvalidRule(&'static str),
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Glob pattern over tool names. `*` matches any run of characters,
/// including dots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPattern {
    pattern: Pattern,
}

impl ToolPattern {
    /// Parses a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRule`] when the pattern is blank or is
    /// not a valid glob.
    pub fn new(pattern: impl Into<String>) -> PolicyResult<Self> {
        let raw = pattern.into();
        if raw.trim().is_empty() {
            return Err(PolicyError::InvalidRule("pattern cannot be empty"));
        }
        let pattern = Pattern::new(&raw).map_err(|err| PolicyError::InvalidRule(err.msg))?;
        Ok(Self { pattern })
    }

    /// Returns the pattern source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// Returns `true` when `tool_name` matches the pattern.
    #[must_use]
    pub fn matches(&self, tool_name: &str) -> bool {
        self.pattern.matches(tool_name)
    }
}

/// Rule mapping a tool-name pattern to the permission it requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRule {
    name: String,
    pattern: ToolPattern,
    permission: Permission,
}

impl PermissionRule {
    /// Creates a new rule.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRule`] when the rule name or pattern is
    /// empty.
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        permission: Permission,
    ) -> PolicyResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PolicyError::InvalidRule("rule name cannot be empty"));
        }

        Ok(Self {
            name,
            pattern: ToolPattern::new(pattern)?,
            permission,
        })
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tool-name pattern.
    #[must_use]
    pub fn pattern(&self) -> &ToolPattern {
        &self.pattern
    }

    /// Returns the permission the rule requires.
    #[must_use]
    pub const fn permission(&self) -> Permission {
        self.permission
    }
}

/// Ordered rule chain. Evaluation is first-match-wins in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionRules {
    rules: Vec<PermissionRule>,
}

impl PermissionRules {
    /// Creates an empty chain; every tool then requires
    /// [`DEFAULT_PERMISSION`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The rule chain used by the standard deployment.
    ///
    /// # Panics
    ///
    /// Never in practice: every built-in rule has a non-empty name and
    /// pattern.
    #[must_use]
    pub fn standard() -> Self {
        const BUILT_IN: [(&str, &str, Permission); 6] = [
            ("decision-namespace", "decision.*", Permission::ExecuteDecisions),
            ("decision-verbs", "*.make_*_decision", Permission::ExecuteDecisions),
            ("user-administration", "admin.users.*", Permission::AdminUsers),
            ("server-administration", "admin.*", Permission::AdminServers),
            ("reporter-namespace", "reporter.*", Permission::WriteReports),
            ("report-generation", "*.generate_report", Permission::WriteReports),
        ];

        let mut rules = Self::new();
        for (name, pattern, permission) in BUILT_IN {
            rules.push(PermissionRule::new(name, pattern, permission).expect("built-in rule"));
        }
        rules
    }

    /// Appends a rule at the lowest precedence.
    pub fn push(&mut self, rule: PermissionRule) {
        self.rules.push(rule);
    }

    /// Appends a rule, returning the chain for chaining.
    #[must_use]
    pub fn with_rule(mut self, rule: PermissionRule) -> Self {
        self.push(rule);
        self
    }

    /// Returns the rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[PermissionRule] {
        &self.rules
    }

    /// Returns the permission required to invoke `tool_name`.
    #[must_use]
    pub fn required_permission(&self, tool_name: &str) -> Permission {
        for rule in &self.rules {
            if rule.pattern.matches(tool_name) {
                debug!(rule = rule.name(), tool = tool_name, permission = %rule.permission, "permission rule matched");
                return rule.permission;
            }
        }

        DEFAULT_PERMISSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_patterns_match() {
        let pattern = ToolPattern::new("decision.*").unwrap();
        assert!(pattern.matches("decision.make_investment_decision"));
        assert!(pattern.matches("decision."));
        assert!(!pattern.matches("decisions.list"));

        let pattern = ToolPattern::new("*.make_*_decision").unwrap();
        assert!(pattern.matches("core.make_drilling_decision"));
        assert!(!pattern.matches("core.make_decision_log"));

        let exact = ToolPattern::new("geowiz.parse_las_file").unwrap();
        assert!(exact.matches("geowiz.parse_las_file"));
        assert!(!exact.matches("geowiz.parse_las_file_v2"));
    }

    #[test]
    fn first_match_wins() {
        let rules = PermissionRules::new()
            .with_rule(PermissionRule::new("users", "admin.users.*", Permission::AdminUsers).unwrap())
            .with_rule(PermissionRule::new("admin", "admin.*", Permission::AdminServers).unwrap());

        assert_eq!(rules.required_permission("admin.users.create"), Permission::AdminUsers);
        assert_eq!(rules.required_permission("admin.restart"), Permission::AdminServers);

        let reversed = PermissionRules::new()
            .with_rule(PermissionRule::new("admin", "admin.*", Permission::AdminServers).unwrap())
            .with_rule(PermissionRule::new("users", "admin.users.*", Permission::AdminUsers).unwrap());
        assert_eq!(
            reversed.required_permission("admin.users.create"),
            Permission::AdminServers
        );
    }

    #[test]
    fn unmatched_tools_default_to_read_analysis() {
        let rules = PermissionRules::standard();
        for tool in ["geowiz.parse_las_file", "econobot.npv", "", "unknown"] {
            assert_eq!(rules.required_permission(tool), Permission::ReadAnalysis);
        }
    }

    #[test]
    fn standard_rules_cover_sensitive_namespaces() {
        let rules = PermissionRules::standard();
        assert_eq!(
            rules.required_permission("decision.make_investment_decision"),
            Permission::ExecuteDecisions
        );
        assert_eq!(
            rules.required_permission("the_core.make_investment_decision"),
            Permission::ExecuteDecisions
        );
        assert_eq!(rules.required_permission("admin.users.grant"), Permission::AdminUsers);
        assert_eq!(rules.required_permission("admin.servers.restart"), Permission::AdminServers);
        assert_eq!(rules.required_permission("reporter.render"), Permission::WriteReports);
        assert_eq!(
            rules.required_permission("riskranger.generate_report"),
            Permission::WriteReports
        );
    }

    #[test]
    fn blank_rules_are_rejected() {
        assert_eq!(
            PermissionRule::new("", "x.*", Permission::ReadAnalysis).unwrap_err(),
            PolicyError::InvalidRule("rule name cannot be empty")
        );
        assert_eq!(
            PermissionRule::new("x", " ", Permission::ReadAnalysis).unwrap_err(),
            PolicyError::InvalidRule("pattern cannot be empty")
        );
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        let err = ToolPattern::new("[decision").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidRule(_)));
        assert!(PermissionRule::new("broken", "admin.[", Permission::AdminServers).is_err());
        assert_eq!(ToolPattern::new("admin.*").unwrap().as_str(), "admin.*");
    }
}
