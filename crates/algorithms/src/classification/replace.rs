//! Search and replace of raster values

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use landgrid_core::raster::Raster;
use landgrid_core::{Algorithm, Error, Result};

use crate::diagnostics::Diagnostics;
use crate::maybe_rayon::*;

/// Parameters of a search and replace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaceConfig {
    /// `(from, to)` pairs; the first pair for a value wins
    pub changes: Vec<(f64, f64)>,
    /// Nodata of the output; the input's nodata (or NaN) when unset
    pub nodata_value: Option<f64>,
}

/// Parse `(from,to);(from,to);…`
pub fn parse_changes(text: &str) -> Result<Vec<(f64, f64)>> {
    let mut out = Vec::new();
    for item in text.trim().trim_start_matches('{').trim_end_matches('}').split(';') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let inner = item
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(item);
        let parsed = inner
            .split_once(',')
            .and_then(|(a, b)| Some((a.trim().parse::<f64>().ok()?, b.trim().parse::<f64>().ok()?)));
        match parsed {
            Some(pair) => out.push(pair),
            None => return Err(Error::config(format!("invalid change '{item}', expected (from,to)"))),
        }
    }
    Ok(out)
}

/// Replaced raster plus warnings
#[derive(Debug, Clone)]
pub struct ReplaceOutput {
    pub raster: Raster<f64>,
    pub diagnostics: Diagnostics,
}

/// Replace every value listed in `config.changes`; other values are kept
/// and nodata cells take the output nodata value
pub fn search_and_replace(grid: &Raster<f64>, config: &ReplaceConfig) -> Result<ReplaceOutput> {
    if config.changes.is_empty() {
        return Err(Error::config("search and replace needs at least one change"));
    }
    let mut diagnostics = Diagnostics::new();
    for (i, (from, _)) in config.changes.iter().enumerate() {
        if config.changes[..i].iter().any(|(f, _)| f == from) {
            diagnostics.warn_config(format!("value {from} is replaced more than once, first change wins"));
        }
    }

    let nodata = config.nodata_value.or(grid.nodata()).unwrap_or(f64::NAN);
    debug!(changes = config.changes.len(), nodata, "search and replace");

    let (rows, cols) = grid.shape();
    let changes = &config.changes;
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![nodata; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let v = unsafe { grid.get_unchecked(row, col) };
                if grid.is_nodata(v) {
                    continue;
                }
                *out = changes
                    .iter()
                    .find(|(from, _)| (v - from).abs() < f64::EPSILON)
                    .map_or(v, |(_, to)| *to);
            }
            row_data
        })
        .collect();

    let mut raster = grid.with_same_meta::<f64>(rows, cols);
    raster.set_nodata(Some(nodata));
    raster.replace_data(data)?;

    diagnostics.log_summary("search and replace");
    info!("search and replace done");
    Ok(ReplaceOutput { raster, diagnostics })
}

/// Search and replace as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct SearchReplace;

impl Algorithm for SearchReplace {
    type Input = Raster<f64>;
    type Output = ReplaceOutput;
    type Params = ReplaceConfig;
    type Error = Error;

    fn name(&self) -> &'static str {
        "SearchReplace"
    }

    fn description(&self) -> &'static str {
        "Replace listed raster values, keeping the others"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        search_and_replace(&input, &params)
    }
}
