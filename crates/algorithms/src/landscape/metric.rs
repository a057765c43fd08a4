//! Metric identifiers
//!
//! Metrics are named by their textual identifiers (`SHDI`, `pNV_3`,
//! `NC_1-2` ...). Per-class metrics carry their class in the name; a bare
//! prefix such as `NV_` asks for one metric per class present in the grid.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr, VariantNames};

use landgrid_core::{Error, Result};

use crate::diagnostics::Diagnostics;

/// Metric families, usable as shorthands in metric selections
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    Display, EnumString, EnumIter, IntoStaticStr, VariantNames,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MetricFamily {
    Basic,
    Value,
    Couple,
    Diversity,
    Patch,
    Quantitative,
    Distance,
}

/// Scalar metrics that do not depend on a class
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    Display, EnumString, EnumIter, IntoStaticStr, VariantNames,
)]
pub enum BaseMetric {
    #[strum(serialize = "N-total")]
    NTotal,
    #[strum(serialize = "N-valid")]
    NValid,
    #[strum(serialize = "pN-valid")]
    PNValid,
    #[strum(serialize = "NC-valid")]
    NcValid,
    #[strum(serialize = "pNC-valid")]
    PNcValid,
    #[strum(serialize = "Nclass")]
    NClass,
    #[strum(serialize = "Central")]
    Central,
    #[strum(serialize = "pCentral")]
    PCentral,
    #[strum(serialize = "Majority")]
    Majority,
    #[strum(serialize = "NC-hete")]
    NcHete,
    #[strum(serialize = "pNC-hete")]
    PNcHete,
    #[strum(serialize = "SHDI")]
    Shdi,
    #[strum(serialize = "SHEI")]
    Shei,
    #[strum(serialize = "HET")]
    Het,
    #[strum(serialize = "HET-frag")]
    HetFrag,
    #[strum(serialize = "NP")]
    Np,
    #[strum(serialize = "LPI")]
    Lpi,
    #[strum(serialize = "MPS")]
    Mps,
    #[strum(serialize = "average")]
    Average,
    #[strum(serialize = "sum")]
    Sum,
    #[strum(serialize = "standard_deviation")]
    StandardDeviation,
    #[strum(serialize = "minimum")]
    Minimum,
    #[strum(serialize = "maximum")]
    Maximum,
    #[strum(serialize = "vCentral")]
    VCentral,
}

impl BaseMetric {
    pub fn family(&self) -> MetricFamily {
        use BaseMetric::*;
        match self {
            NTotal | NValid | PNValid | NcValid | PNcValid => MetricFamily::Basic,
            NClass | Central | PCentral | Majority => MetricFamily::Value,
            NcHete | PNcHete => MetricFamily::Couple,
            Shdi | Shei | Het | HetFrag => MetricFamily::Diversity,
            Np | Lpi | Mps => MetricFamily::Patch,
            Average | Sum | StandardDeviation | Minimum | Maximum | VCentral => MetricFamily::Quantitative,
        }
    }
}

/// Metrics computed for one class `x`, written `<prefix><x>`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    Display, EnumString, EnumIter, IntoStaticStr, VariantNames,
)]
pub enum ClassMetric {
    /// Weighted count of class cells
    #[strum(serialize = "NV_")]
    Nv,
    /// Share of class cells among valid cells
    #[strum(serialize = "pNV_")]
    PNv,
    /// Number of patches of the class
    #[strum(serialize = "NP-class_")]
    NpClass,
    /// Largest patch of the class over valid cells
    #[strum(serialize = "LPI-class_")]
    LpiClass,
    /// Mean patch size of the class
    #[strum(serialize = "MPS-class_")]
    MpsClass,
    /// Mean distance to the nearest cell of the class
    #[strum(serialize = "MD_")]
    MeanDistance,
}

/// Metrics computed for a pair of classes `x-y`, written `<prefix><x>-<y>`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    Display, EnumString, EnumIter, IntoStaticStr, VariantNames,
)]
pub enum CoupleMetric {
    /// Weighted count of valid couples joining the two classes
    #[strum(serialize = "NC_")]
    Nc,
    /// Share of those couples among valid couples
    #[strum(serialize = "pNC_")]
    PNc,
}

/// A fully resolved metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Base(BaseMetric),
    Class(ClassMetric, i64),
    /// Classes are stored ordered, `x <= y`
    Couple(CoupleMetric, i64, i64),
}

/// What a metric reads from the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricInput {
    /// Class values (rounded cell values)
    Categorical,
    /// Raw cell values
    Quantitative,
    /// A request-wide distance field (friction-weighted when friction is given)
    DistanceField,
}

/// Number of outputs a metric request produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricArity {
    Scalar,
    /// One output per class present in the grid
    PerClass,
    /// One output per pair of classes present in the grid
    PerCouple,
}

/// Description of a metric request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSpec {
    pub name: String,
    pub family: MetricFamily,
    pub input: MetricInput,
    pub arity: MetricArity,
}

fn class_metric_family(m: ClassMetric) -> MetricFamily {
    match m {
        ClassMetric::Nv | ClassMetric::PNv => MetricFamily::Value,
        ClassMetric::NpClass | ClassMetric::LpiClass | ClassMetric::MpsClass => MetricFamily::Patch,
        ClassMetric::MeanDistance => MetricFamily::Distance,
    }
}

fn class_metric_input(m: ClassMetric) -> MetricInput {
    match m {
        ClassMetric::MeanDistance => MetricInput::DistanceField,
        _ => MetricInput::Categorical,
    }
}

impl Metric {
    pub fn family(&self) -> MetricFamily {
        match self {
            Metric::Base(b) => b.family(),
            Metric::Class(m, _) => class_metric_family(*m),
            Metric::Couple(..) => MetricFamily::Couple,
        }
    }

    /// Patch metrics need a 4-connected labelling of the window
    pub fn is_patch(&self) -> bool {
        self.family() == MetricFamily::Patch
    }

    /// Metrics that need couples of 4-adjacent cells
    pub fn needs_couples(&self) -> bool {
        matches!(
            self,
            Metric::Base(
                BaseMetric::NcValid
                    | BaseMetric::PNcValid
                    | BaseMetric::NcHete
                    | BaseMetric::PNcHete
                    | BaseMetric::HetFrag
            ) | Metric::Couple(..)
        )
    }

    /// Class whose distance field the metric reads
    pub fn distance_class(&self) -> Option<i64> {
        match self {
            Metric::Class(ClassMetric::MeanDistance, x) => Some(*x),
            _ => None,
        }
    }

    pub fn spec(&self) -> MetricSpec {
        let input = match self {
            Metric::Base(b) if b.family() == MetricFamily::Quantitative => MetricInput::Quantitative,
            Metric::Base(_) | Metric::Couple(..) => MetricInput::Categorical,
            Metric::Class(m, _) => class_metric_input(*m),
        };
        MetricSpec {
            name: self.to_string(),
            family: self.family(),
            input,
            arity: MetricArity::Scalar,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Base(b) => write!(f, "{b}"),
            Metric::Class(m, x) => write!(f, "{m}{x}"),
            Metric::Couple(m, x, y) => write!(f, "{m}{x}-{y}"),
        }
    }
}

fn parse_class(text: &str, full: &str) -> Result<i64> {
    text.parse::<i64>()
        .map_err(|_| Error::config(format!("invalid class '{text}' in metric '{full}'")))
}

/// Split `x-y` where either class may be negative
fn parse_couple(text: &str, full: &str) -> Result<(i64, i64)> {
    let split = text
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '-')
        .map(|(i, _)| i)
        .ok_or_else(|| Error::config(format!("metric '{full}' needs two classes 'x-y'")))?;
    let x = parse_class(&text[..split], full)?;
    let y = parse_class(&text[split + 1..], full)?;
    Ok((x.min(y), x.max(y)))
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(b) = s.parse::<BaseMetric>() {
            return Ok(Metric::Base(b));
        }
        for m in CoupleMetric::iter() {
            let prefix: &'static str = m.into();
            if let Some(rest) = s.strip_prefix(prefix)
                && !rest.is_empty()
            {
                let (x, y) = parse_couple(rest, s)?;
                return Ok(Metric::Couple(m, x, y));
            }
        }
        for m in ClassMetric::iter() {
            let prefix: &'static str = m.into();
            if let Some(rest) = s.strip_prefix(prefix)
                && !rest.is_empty()
            {
                return Ok(Metric::Class(m, parse_class(rest, s)?));
            }
        }
        Err(Error::config(format!("unknown metric '{s}'")))
    }
}

/// One item of a metric selection, before expansion against the grid's classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricRequest {
    Single(Metric),
    /// Bare per-class prefix, e.g. `NV_`
    PerClass(ClassMetric),
    /// Bare per-couple prefix, e.g. `NC_`
    PerCouple(CoupleMetric),
    /// Every base metric of a family
    Family(MetricFamily),
}

impl FromStr for MetricRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(m) = s.parse::<ClassMetric>() {
            return Ok(MetricRequest::PerClass(m));
        }
        if let Ok(m) = s.parse::<CoupleMetric>() {
            return Ok(MetricRequest::PerCouple(m));
        }
        if let Ok(f) = s.parse::<MetricFamily>() {
            return Ok(MetricRequest::Family(f));
        }
        s.parse::<Metric>().map(MetricRequest::Single)
    }
}

impl MetricRequest {
    pub fn spec(&self) -> MetricSpec {
        match self {
            MetricRequest::Single(m) => m.spec(),
            MetricRequest::PerClass(m) => MetricSpec {
                name: m.to_string(),
                family: class_metric_family(*m),
                input: class_metric_input(*m),
                arity: MetricArity::PerClass,
            },
            MetricRequest::PerCouple(m) => MetricSpec {
                name: m.to_string(),
                family: MetricFamily::Couple,
                input: MetricInput::Categorical,
                arity: MetricArity::PerCouple,
            },
            MetricRequest::Family(f) => MetricSpec {
                name: f.to_string(),
                family: *f,
                input: if *f == MetricFamily::Quantitative {
                    MetricInput::Quantitative
                } else {
                    MetricInput::Categorical
                },
                arity: MetricArity::Scalar,
            },
        }
    }
}

/// Resolve a textual metric selection into concrete metrics.
///
/// Prefixes expand over `classes` (sorted ascending), families over their
/// base metrics. Duplicates keep their first position. With `fast`, patch
/// metrics are dropped and a configuration warning is recorded.
pub fn expand_metrics<S: AsRef<str>>(
    names: &[S],
    classes: &[i64],
    fast: bool,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Metric>> {
    let mut out: Vec<Metric> = Vec::new();
    let mut seen: BTreeSet<Metric> = BTreeSet::new();
    let mut push = |m: Metric, out: &mut Vec<Metric>| {
        if seen.insert(m) {
            out.push(m);
        }
    };

    for name in names {
        match name.as_ref().parse::<MetricRequest>()? {
            MetricRequest::Single(m) => push(m, &mut out),
            MetricRequest::PerClass(m) => {
                for &x in classes {
                    push(Metric::Class(m, x), &mut out);
                }
            }
            MetricRequest::PerCouple(m) => {
                for (i, &x) in classes.iter().enumerate() {
                    for &y in &classes[i..] {
                        push(Metric::Couple(m, x, y), &mut out);
                    }
                }
            }
            MetricRequest::Family(f) => {
                for b in BaseMetric::iter().filter(|b| b.family() == f) {
                    push(Metric::Base(b), &mut out);
                }
            }
        }
    }

    if fast {
        let before = out.len();
        out.retain(|m| !m.is_patch());
        if out.len() < before {
            diagnostics.warn_config(format!(
                "fast mode drops {} patch metric(s)",
                before - out.len()
            ));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_and_class_metrics() {
        assert_eq!("SHDI".parse::<Metric>().unwrap(), Metric::Base(BaseMetric::Shdi));
        assert_eq!("pNC-hete".parse::<Metric>().unwrap(), Metric::Base(BaseMetric::PNcHete));
        assert_eq!("NP".parse::<Metric>().unwrap(), Metric::Base(BaseMetric::Np));
        assert_eq!("NP-class_4".parse::<Metric>().unwrap(), Metric::Class(ClassMetric::NpClass, 4));
        assert_eq!("pNV_-1".parse::<Metric>().unwrap(), Metric::Class(ClassMetric::PNv, -1));
        assert_eq!("MD_2".parse::<Metric>().unwrap(), Metric::Class(ClassMetric::MeanDistance, 2));
        assert!("shdi".parse::<Metric>().is_err());
        assert!("NV_x".parse::<Metric>().is_err());
    }

    #[test]
    fn test_parse_couples() {
        assert_eq!("NC_3-1".parse::<Metric>().unwrap(), Metric::Couple(CoupleMetric::Nc, 1, 3));
        assert_eq!("pNC_-2-5".parse::<Metric>().unwrap(), Metric::Couple(CoupleMetric::PNc, -2, 5));
        assert_eq!(Metric::Couple(CoupleMetric::Nc, 1, 3).to_string(), "NC_1-3");
        assert!("NC_3".parse::<Metric>().is_err());
    }

    #[test]
    fn test_display_roundtrip_names() {
        for name in ["N-total", "HET-frag", "vCentral", "LPI-class_12", "pNV_0"] {
            assert_eq!(name.parse::<Metric>().unwrap().to_string(), name);
        }
    }

    #[test]
    fn test_expand_prefixes_and_families() {
        let mut d = Diagnostics::new();
        let metrics = expand_metrics(&["NV_", "SHDI", "NC_", "NV_1"], &[1, 2], false, &mut d).unwrap();
        let names: Vec<String> = metrics.iter().map(|m| m.to_string()).collect();
        assert_eq!(names, vec!["NV_1", "NV_2", "SHDI", "NC_1-1", "NC_1-2", "NC_2-2"]);

        let diversity = expand_metrics(&["diversity"], &[], false, &mut d).unwrap();
        assert_eq!(diversity.len(), 4);
        assert!(d.is_empty());
    }

    #[test]
    fn test_fast_mode_drops_patches() {
        let mut d = Diagnostics::new();
        let metrics = expand_metrics(&["NP", "SHDI", "LPI-class_1"], &[1], true, &mut d).unwrap();
        assert_eq!(metrics, vec![Metric::Base(BaseMetric::Shdi)]);
        assert_eq!(d.config_warnings().count(), 1);
    }

    #[test]
    fn test_specs() {
        let spec = "NV_".parse::<MetricRequest>().unwrap().spec();
        assert_eq!(spec.arity, MetricArity::PerClass);
        assert_eq!("MD_3".parse::<Metric>().unwrap().spec().input, MetricInput::DistanceField);
        assert_eq!("average".parse::<Metric>().unwrap().spec().input, MetricInput::Quantitative);
        assert_eq!(
            "NC_".parse::<MetricRequest>().unwrap().spec().arity,
            MetricArity::PerCouple
        );
    }
}
