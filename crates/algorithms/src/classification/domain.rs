//! Interval-to-class classification
//!
//! A rule maps an interval written with reversed brackets for open ends
//! (`[0,1[` is 0 ≤ v < 1, `],-1]` is v ≤ -1, `[2,[` is v ≥ 2) to a class.
//! Rules are tried in declaration order and the first match wins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use landgrid_core::raster::Raster;
use landgrid_core::{Algorithm, Error, Result};

use crate::diagnostics::Diagnostics;
use crate::maybe_rayon::*;

/// One `(domain-class)` rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainRule {
    /// `-inf` when unbounded
    pub lower: f64,
    pub lower_inclusive: bool,
    /// `+inf` when unbounded
    pub upper: f64,
    pub upper_inclusive: bool,
    pub class: f64,
}

impl DomainRule {
    pub fn contains(&self, v: f64) -> bool {
        let above = if self.lower_inclusive { v >= self.lower } else { v > self.lower };
        let below = if self.upper_inclusive { v <= self.upper } else { v < self.upper };
        above && below
    }

    /// Whether no value can match
    pub fn is_empty(&self) -> bool {
        self.lower == self.upper && !(self.lower_inclusive && self.upper_inclusive)
    }

    fn same_domain(&self, other: &DomainRule) -> bool {
        self.lower == other.lower
            && self.upper == other.upper
            && self.lower_inclusive == other.lower_inclusive
            && self.upper_inclusive == other.upper_inclusive
    }

    fn parse_bound(text: &str, rule: &str) -> Result<Option<f64>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        text.parse::<f64>()
            .map(Some)
            .map_err(|_| Error::config(format!("invalid bound '{text}' in domain '{rule}'")))
    }

    /// Parse a domain such as `[0,1[` into (lower, lower_inclusive, upper, upper_inclusive)
    pub fn parse_domain(domain: &str) -> Result<(f64, bool, f64, bool)> {
        let d = domain.trim();
        let bad = || Error::config(format!("invalid domain '{domain}'"));
        let (first, last) = (d.chars().next().ok_or_else(bad)?, d.chars().last().ok_or_else(bad)?);
        if d.len() < 3 || !matches!(first, '[' | ']') || !matches!(last, '[' | ']') {
            return Err(bad());
        }
        let (lo, hi) = d[1..d.len() - 1].split_once(',').ok_or_else(bad)?;
        let lower = Self::parse_bound(lo, domain)?;
        let upper = Self::parse_bound(hi, domain)?;
        if lower.is_none() && upper.is_none() {
            return Err(Error::config(format!("domain '{domain}' needs at least one bound")));
        }

        let lower_inclusive = first == '[' && lower.is_some();
        let upper_inclusive = last == ']' && upper.is_some();
        let lower = lower.unwrap_or(f64::NEG_INFINITY);
        let upper = upper.unwrap_or(f64::INFINITY);
        if lower > upper {
            return Err(Error::config(format!("domain '{domain}' has its bounds reversed")));
        }
        Ok((lower, lower_inclusive, upper, upper_inclusive))
    }
}

fn format_bound(v: f64) -> String {
    if v.is_finite() { v.to_string() } else { String::new() }
}

impl fmt::Display for DomainRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{},{}{}-{}",
            if self.lower_inclusive { '[' } else { ']' },
            format_bound(self.lower),
            format_bound(self.upper),
            if self.upper_inclusive { ']' } else { '[' },
            self.class
        )
    }
}

impl FromStr for DomainRule {
    type Err = Error;

    /// `domain-class`, optionally wrapped in parentheses: `([0,1[-1)`
    fn from_str(s: &str) -> Result<Self> {
        let rule = s.trim();
        let rule = rule
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(rule)
            .trim();
        // the domain ends at the second bracket
        let end = rule
            .char_indices()
            .skip(1)
            .find(|(_, c)| matches!(c, '[' | ']'))
            .map(|(i, _)| i + 1)
            .ok_or_else(|| Error::config(format!("missing domain in rule '{s}'")))?;
        let (domain, rest) = rule.split_at(end);
        let class = rest
            .trim()
            .strip_prefix('-')
            .ok_or_else(|| Error::config(format!("missing class in rule '{s}'")))?
            .trim();
        let class = class
            .parse::<f64>()
            .map_err(|_| Error::config(format!("invalid class '{class}' in rule '{s}'")))?;

        let (lower, lower_inclusive, upper, upper_inclusive) = DomainRule::parse_domain(domain)?;
        Ok(Self {
            lower,
            lower_inclusive,
            upper,
            upper_inclusive,
            class,
        })
    }
}

impl TryFrom<String> for DomainRule {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DomainRule> for String {
    fn from(rule: DomainRule) -> Self {
        rule.to_string()
    }
}

/// Parse `(domain-class);(domain-class);…`
pub fn parse_rules(text: &str) -> Result<Vec<DomainRule>> {
    text.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Parameters of a classification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub rules: Vec<DomainRule>,
}

/// Classified raster plus rule warnings
#[derive(Debug, Clone)]
pub struct ClassificationOutput {
    pub raster: Raster<f64>,
    pub diagnostics: Diagnostics,
}

/// Flag empty, duplicate and shadowed rules.
///
/// Membership only changes at rule bounds, so testing every bound, the
/// midpoints between consecutive bounds and one value past each end is
/// enough to decide whether a rule can ever be the first match.
pub fn check_rules(rules: &[DomainRule], diagnostics: &mut Diagnostics) {
    let mut bounds: Vec<f64> = rules
        .iter()
        .flat_map(|r| [r.lower, r.upper])
        .filter(|v| v.is_finite())
        .collect();
    bounds.sort_by(f64::total_cmp);
    bounds.dedup();

    let mut samples = bounds.clone();
    samples.extend(bounds.windows(2).map(|w| (w[0] + w[1]) / 2.0));
    match (bounds.first(), bounds.last()) {
        (Some(lo), Some(hi)) => {
            samples.push(lo - 1.0);
            samples.push(hi + 1.0);
        }
        _ => samples.push(0.0),
    }

    for (i, rule) in rules.iter().enumerate() {
        if rule.is_empty() {
            diagnostics.warn_config(format!("rule {} ({rule}) matches no value", i + 1));
            continue;
        }
        if let Some(j) = rules[..i].iter().position(|r| r.same_domain(rule)) {
            diagnostics.warn_config(format!("rule {} ({rule}) duplicates rule {}", i + 1, j + 1));
            continue;
        }
        let reachable = samples
            .iter()
            .any(|&v| rule.contains(v) && !rules[..i].iter().any(|r| r.contains(v)));
        if !reachable {
            diagnostics.warn_config(format!("rule {} ({rule}) is shadowed by earlier rules", i + 1));
        }
    }
}

/// Classify every cell with the first matching rule; unmatched and nodata
/// cells become nodata (NaN)
pub fn classify(grid: &Raster<f64>, config: &ClassificationConfig) -> Result<ClassificationOutput> {
    if config.rules.is_empty() {
        return Err(Error::config("classification needs at least one rule"));
    }
    let mut diagnostics = Diagnostics::new();
    check_rules(&config.rules, &mut diagnostics);
    debug!(rules = config.rules.len(), "classification");

    let (rows, cols) = grid.shape();
    let rules = &config.rules;
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let v = unsafe { grid.get_unchecked(row, col) };
                if grid.is_nodata(v) {
                    continue;
                }
                if let Some(rule) = rules.iter().find(|r| r.contains(v)) {
                    *out = rule.class;
                }
            }
            row_data
        })
        .collect();

    let mut raster = grid.with_same_meta::<f64>(rows, cols);
    raster.set_nodata(Some(f64::NAN));
    raster.replace_data(data)?;

    let unmatched = raster.data().iter().filter(|v| v.is_nan()).count();
    diagnostics.log_summary("classification");
    info!(unmatched, "classification done");
    Ok(ClassificationOutput { raster, diagnostics })
}

/// Classification as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct Classification;

impl Algorithm for Classification {
    type Input = Raster<f64>;
    type Output = ClassificationOutput;
    type Params = ClassificationConfig;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Classification"
    }

    fn description(&self) -> &'static str {
        "Map value intervals to classes, first matching rule wins"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        classify(&input, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_domains() {
        let r: DomainRule = "[0,1[-1".parse().unwrap();
        assert!(r.contains(0.0) && r.contains(0.5) && !r.contains(1.0));

        let r: DomainRule = "(],-1]-2)".parse().unwrap();
        assert!(r.contains(-1.0) && r.contains(-1e9) && !r.contains(-0.5));
        assert_eq!(r.lower, f64::NEG_INFINITY);

        let r: DomainRule = "[2,[-3".parse().unwrap();
        assert!(r.contains(2.0) && r.contains(1e9) && !r.contains(1.99));

        let r: DomainRule = "]0,5]--4".parse().unwrap();
        assert_eq!(r.class, -4.0);
        assert!(!r.contains(0.0) && r.contains(5.0));
    }

    #[test]
    fn test_invalid_domains() {
        assert!("[,[-1".parse::<DomainRule>().is_err());
        assert!("[5,1]-1".parse::<DomainRule>().is_err());
        assert!("0,1-1".parse::<DomainRule>().is_err());
        assert!("[0,1[".parse::<DomainRule>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let rules = parse_rules("([0,1[-1);(],-1]-2);([2,[-3)").unwrap();
        assert_eq!(rules[0].to_string(), "[0,1[-1");
        assert_eq!(rules[1].to_string(), "],-1]-2");
        assert_eq!(rules[1].to_string().parse::<DomainRule>().unwrap(), rules[1]);
    }

    #[test]
    fn test_rule_warnings() {
        let rules = parse_rules("([0,10[-1);([2,5]-2);([0,10[-3);([4,4[-4);([8,20]-5)").unwrap();
        let mut d = Diagnostics::new();
        check_rules(&rules, &mut d);
        let warnings: Vec<&str> = d.config_warnings().collect();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("rule 2"));
        assert!(warnings[1].contains("duplicates rule 1"));
        assert!(warnings[2].contains("matches no value"));
    }

    #[test]
    fn test_classify_first_match() {
        let mut grid = Raster::from_vec(vec![-2.0, 0.5, 1.5, 3.0, -9999.0, 1.0], 2, 3).unwrap();
        grid.set_nodata(Some(-9999.0));
        let config = ClassificationConfig {
            rules: parse_rules("([0,1[-1);(],-1]-2);([2,[-3);([0,2]-4)").unwrap(),
        };
        let out = classify(&grid, &config).unwrap();
        let v: Vec<f64> = out.raster.data().iter().copied().collect();
        assert_eq!(v[0], 2.0);
        assert_eq!(v[1], 1.0);
        assert_eq!(v[2], 4.0);
        assert_eq!(v[3], 3.0);
        assert!(v[4].is_nan());
        assert_eq!(v[5], 4.0);
        assert!(out.diagnostics.is_empty());
    }
}
