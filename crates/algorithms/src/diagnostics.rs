//! Non-fatal conditions collected during a run
//!
//! Skipped windows, unreachable cells and suspicious configuration never
//! abort an analysis. They are gathered here and returned with the output.

use std::fmt;

use tracing::warn;

/// One non-fatal condition
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A position skipped because its window exceeded the missing-value rate
    DataQuality {
        row: isize,
        col: isize,
        missing_rate: f64,
    },
    /// Cells a distance transform could not reach (within its cutoff)
    Unreachable { context: String, cells: usize },
    /// A configuration that runs but probably does not do what was meant
    ConfigWarning(String),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DataQuality {
                row,
                col,
                missing_rate,
            } => write!(
                f,
                "window at ({row}, {col}) skipped: {:.1}% missing values",
                missing_rate * 100.0
            ),
            Diagnostic::Unreachable { context, cells } => {
                write!(f, "{context}: {cells} unreachable cells")
            }
            Diagnostic::ConfigWarning(msg) => write!(f, "configuration: {msg}"),
        }
    }
}

/// Per-run list of diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn warn_config(&mut self, message: impl Into<String>) {
        self.entries.push(Diagnostic::ConfigWarning(message.into()));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of positions skipped for missing data
    pub fn data_quality_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| matches!(d, Diagnostic::DataQuality { .. }))
            .count()
    }

    /// Configuration warnings only
    pub fn config_warnings(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|d| match d {
            Diagnostic::ConfigWarning(m) => Some(m.as_str()),
            _ => None,
        })
    }

    /// Emit an aggregated `warn!` summary; per-position entries are not logged one by one
    pub fn log_summary(&self, run: &str) {
        let skipped = self.data_quality_count();
        if skipped > 0 {
            warn!(run, skipped, "positions skipped for missing values");
        }
        for d in &self.entries {
            match d {
                Diagnostic::DataQuality { .. } => {}
                other => warn!(run, "{other}"),
            }
        }
    }
}
