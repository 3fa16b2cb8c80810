//! Rule-based balance validation
//!
//! Validation is a pure function of its inputs and the active rule set. It
//! never fails: problems are reported as [`ValidationIssue`]s and the caller
//! decides what to do with them.

use crate::types::{BalanceSnapshot, BalanceSource};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Issue severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Error and critical issues make a result invalid
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::Error | Severity::Critical)
    }
}

/// Validation rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    NegativeBalance,
    NegativeFreeBalance,
    HoldExceedsBalance,
    PrecisionOverflow,
    StaleData,
    UnrealisticBalance,
    AllZeroBalances,
    SourceInconsistency,
    /// Asset reported by only one of two compared sources
    MissingFromSource,
}

impl ValidationRule {
    pub const ALL: [ValidationRule; 9] = [
        ValidationRule::NegativeBalance,
        ValidationRule::NegativeFreeBalance,
        ValidationRule::HoldExceedsBalance,
        ValidationRule::PrecisionOverflow,
        ValidationRule::StaleData,
        ValidationRule::UnrealisticBalance,
        ValidationRule::AllZeroBalances,
        ValidationRule::SourceInconsistency,
        ValidationRule::MissingFromSource,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ValidationRule::NegativeBalance => "negative_balance",
            ValidationRule::NegativeFreeBalance => "negative_free_balance",
            ValidationRule::HoldExceedsBalance => "hold_exceeds_balance",
            ValidationRule::PrecisionOverflow => "precision_overflow",
            ValidationRule::StaleData => "stale_data",
            ValidationRule::UnrealisticBalance => "unrealistic_balance",
            ValidationRule::AllZeroBalances => "all_zero_balances",
            ValidationRule::SourceInconsistency => "source_inconsistency",
            ValidationRule::MissingFromSource => "missing_from_source",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            ValidationRule::NegativeBalance | ValidationRule::HoldExceedsBalance => Severity::Error,
            ValidationRule::MissingFromSource => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValidationRule {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ValidationRule::ALL
            .iter()
            .copied()
            .find(|rule| rule.name() == name)
            .ok_or_else(|| format!("Unknown validation rule: {name}"))
    }
}

/// Severity overrides keyed by rule name in config files
mod severity_overrides {
    use super::{Severity, ValidationRule};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::{BTreeMap, HashMap};

    pub fn serialize<S>(overrides: &HashMap<ValidationRule, Severity>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let by_name: BTreeMap<&str, Severity> = overrides
            .iter()
            .map(|(rule, severity)| (rule.name(), *severity))
            .collect();
        by_name.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<HashMap<ValidationRule, Severity>, D::Error>
    where
        D: Deserializer<'de>,
    {
        HashMap::<String, Severity>::deserialize(deserializer)?
            .into_iter()
            .map(|(name, severity)| Ok((name.parse().map_err(D::Error::custom)?, severity)))
            .collect()
    }
}

/// Validator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub stale_threshold_secs: u64,
    pub unrealistic_balance_threshold: Decimal,
    pub max_fractional_digits: u32,
    /// Relative disagreement tolerated between two sources (0.01 = 1%)
    pub source_inconsistency_threshold: Decimal,
    pub disabled_rules: Vec<ValidationRule>,
    #[serde(with = "severity_overrides")]
    pub severity_overrides: HashMap<ValidationRule, Severity>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: 300,
            unrealistic_balance_threshold: dec!(1000000),
            max_fractional_digits: 12,
            source_inconsistency_threshold: dec!(0.01),
            disabled_rules: Vec::new(),
            severity_overrides: HashMap::new(),
        }
    }
}

impl ValidatorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.stale_threshold_secs == 0 {
            return Err("Stale threshold must be greater than 0".to_string());
        }
        if self.unrealistic_balance_threshold <= Decimal::ZERO {
            return Err("Unrealistic balance threshold must be positive".to_string());
        }
        if self.source_inconsistency_threshold < Decimal::ZERO {
            return Err("Source inconsistency threshold must not be negative".to_string());
        }
        Ok(())
    }
}

/// A single rule violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub rule: ValidationRule,
    pub severity: Severity,
    pub message: String,
    pub asset: Option<String>,
    pub current_value: Option<Decimal>,
    pub expected_value: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl ValidationIssue {
    pub fn rule_name(&self) -> &'static str {
        self.rule.name()
    }
}

/// Outcome of a validation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// False iff any issue is error or critical
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub duration: Duration,
    pub assets_validated: usize,
}

impl ValidationResult {
    fn from_issues(issues: Vec<ValidationIssue>, assets_validated: usize, started: Instant) -> Self {
        Self {
            is_valid: !issues.iter().any(|issue| issue.severity.is_blocking()),
            issues,
            duration: started.elapsed(),
            assets_validated,
        }
    }

    pub fn has_rule(&self, rule: ValidationRule) -> bool {
        self.issues.iter().any(|issue| issue.rule == rule)
    }

    pub fn issue(&self, rule: ValidationRule) -> Option<&ValidationIssue> {
        self.issues.iter().find(|issue| issue.rule == rule)
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|issue| issue.severity).max()
    }
}

/// Stateless rule engine
#[derive(Debug, Clone)]
pub struct BalanceValidator {
    config: ValidatorConfig,
    disabled: BTreeSet<ValidationRule>,
}

impl Default for BalanceValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl BalanceValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        let disabled = config.disabled_rules.iter().copied().collect();
        Self { config, disabled }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn set_rule_enabled(&mut self, rule: ValidationRule, enabled: bool) {
        if enabled {
            self.disabled.remove(&rule);
        } else {
            self.disabled.insert(rule);
        }
    }

    pub fn is_enabled(&self, rule: ValidationRule) -> bool {
        !self.disabled.contains(&rule)
    }

    pub fn set_severity(&mut self, rule: ValidationRule, severity: Severity) {
        self.config.severity_overrides.insert(rule, severity);
    }

    pub fn severity_for(&self, rule: ValidationRule) -> Severity {
        self.config
            .severity_overrides
            .get(&rule)
            .copied()
            .unwrap_or_else(|| rule.default_severity())
    }

    fn push_issue(
        &self,
        issues: &mut Vec<ValidationIssue>,
        rule: ValidationRule,
        asset: Option<&str>,
        message: String,
        current_value: Option<Decimal>,
        expected_value: Option<Decimal>,
    ) {
        if !self.is_enabled(rule) {
            return;
        }
        issues.push(ValidationIssue {
            rule,
            severity: self.severity_for(rule),
            message,
            asset: asset.map(str::to_string),
            current_value,
            expected_value,
            timestamp: Utc::now(),
        });
    }

    fn fractional_digits(value: Decimal) -> u32 {
        value.normalize().scale()
    }

    fn check_single(
        &self,
        issues: &mut Vec<ValidationIssue>,
        asset: &str,
        balance: Decimal,
        hold: Decimal,
        source: BalanceSource,
        timestamp: Option<DateTime<Utc>>,
    ) {
        let free = balance - hold;
        let asset_ref = Some(asset);

        if balance < Decimal::ZERO {
            self.push_issue(
                issues,
                ValidationRule::NegativeBalance,
                asset_ref,
                format!("{asset} balance is negative ({balance}) from {source}"),
                Some(balance),
                Some(Decimal::ZERO),
            );
        }

        if free < Decimal::ZERO {
            self.push_issue(
                issues,
                ValidationRule::NegativeFreeBalance,
                asset_ref,
                format!("{asset} free balance is negative ({free})"),
                Some(free),
                Some(Decimal::ZERO),
            );
        }

        if hold > balance {
            self.push_issue(
                issues,
                ValidationRule::HoldExceedsBalance,
                asset_ref,
                format!("{asset} hold {hold} exceeds balance {balance}"),
                Some(hold),
                Some(balance),
            );
        }

        let digits = Self::fractional_digits(balance).max(Self::fractional_digits(hold));
        if digits > self.config.max_fractional_digits {
            self.push_issue(
                issues,
                ValidationRule::PrecisionOverflow,
                asset_ref,
                format!(
                    "{asset} carries {digits} fractional digits (max {})",
                    self.config.max_fractional_digits
                ),
                Some(balance),
                None,
            );
        }

        if let Some(timestamp) = timestamp {
            let age = Utc::now() - timestamp;
            let threshold = chrono::Duration::seconds(self.config.stale_threshold_secs as i64);
            if age > threshold {
                self.push_issue(
                    issues,
                    ValidationRule::StaleData,
                    asset_ref,
                    format!(
                        "{asset} data is {}s old (threshold {}s)",
                        age.num_seconds(),
                        self.config.stale_threshold_secs
                    ),
                    None,
                    None,
                );
            }
        }

        if balance > self.config.unrealistic_balance_threshold {
            self.push_issue(
                issues,
                ValidationRule::UnrealisticBalance,
                asset_ref,
                format!(
                    "{asset} balance {balance} exceeds {}",
                    self.config.unrealistic_balance_threshold
                ),
                Some(balance),
                Some(self.config.unrealistic_balance_threshold),
            );
        }
    }

    /// Validate one balance
    pub fn validate_single(
        &self,
        asset: &str,
        balance: Decimal,
        hold: Decimal,
        source: BalanceSource,
        timestamp: Option<DateTime<Utc>>,
    ) -> ValidationResult {
        let started = Instant::now();
        let mut issues = Vec::new();
        self.check_single(&mut issues, asset, balance, hold, source, timestamp);
        ValidationResult::from_issues(issues, 1, started)
    }

    /// Validate a batch of snapshots, including batch-level rules
    pub fn validate_multiple(&self, balances: &HashMap<String, BalanceSnapshot>) -> ValidationResult {
        let started = Instant::now();
        let mut issues = Vec::new();

        let mut assets: Vec<&String> = balances.keys().collect();
        assets.sort();
        for asset in assets {
            let snapshot = &balances[asset];
            self.check_single(
                &mut issues,
                asset,
                snapshot.balance,
                snapshot.hold,
                snapshot.source,
                Some(snapshot.timestamp),
            );
        }

        if !balances.is_empty() && balances.values().all(|s| s.balance.is_zero()) {
            self.push_issue(
                &mut issues,
                ValidationRule::AllZeroBalances,
                None,
                format!("All {} balances are zero", balances.len()),
                Some(Decimal::ZERO),
                None,
            );
        }

        ValidationResult::from_issues(issues, balances.len(), started)
    }

    /// Cross-check two sources for the same account
    pub fn compare_sources(
        &self,
        first: &HashMap<String, BalanceSnapshot>,
        second: &HashMap<String, BalanceSnapshot>,
    ) -> ValidationResult {
        let started = Instant::now();
        let mut issues = Vec::new();

        let assets: BTreeSet<&String> = first.keys().chain(second.keys()).collect();
        for asset in &assets {
            match (first.get(*asset), second.get(*asset)) {
                (Some(a), Some(b)) => {
                    let reference = a.balance.abs().max(b.balance.abs());
                    if reference.is_zero() {
                        continue;
                    }
                    let relative = (a.balance - b.balance).abs() / reference;
                    if relative > self.config.source_inconsistency_threshold {
                        self.push_issue(
                            &mut issues,
                            ValidationRule::SourceInconsistency,
                            Some(asset.as_str()),
                            format!(
                                "{asset} differs between {} ({}) and {} ({})",
                                a.source, a.balance, b.source, b.balance
                            ),
                            Some(a.balance),
                            Some(b.balance),
                        );
                    }
                }
                (Some(present), None) | (None, Some(present)) => {
                    self.push_issue(
                        &mut issues,
                        ValidationRule::MissingFromSource,
                        Some(asset.as_str()),
                        format!("{asset} only reported by {}", present.source),
                        Some(present.balance),
                        None,
                    );
                }
                (None, None) => {}
            }
        }

        ValidationResult::from_issues(issues, assets.len(), started)
    }
}
