//! Value classification pre-passes
//!
//! - **domain**: interval rules mapped to classes, first match wins
//! - **replace**: explicit value-to-value replacement

mod domain;
mod replace;

pub use domain::{
    check_rules, classify, parse_rules, Classification, ClassificationConfig, ClassificationOutput,
    DomainRule,
};
pub use replace::{parse_changes, search_and_replace, ReplaceConfig, ReplaceOutput, SearchReplace};
