//! Run configurations
//!
//! A [`RunConfig`] is one complete request: input files, outputs and a
//! [`Treatment`] with its parameters. It is read from a flat properties file
//! (`treatment=sliding`, `sizes={3;5}`, …) or from JSON, and written back as
//! the properties snapshot of a successful run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use landgrid_core::io::{PointFields, Properties};
use landgrid_core::raster::WindowShape;
use landgrid_core::{Error, Result};

use crate::classification::{parse_changes, parse_rules, ClassificationConfig, ReplaceConfig};
use crate::cluster::{ClusterConfig, ClusterType};
use crate::combine::{CombineConfig, Factor};
use crate::distance::function::{AnalyzeType, DistanceFunction};
use crate::distance::map::{DistanceConfig, DistanceType};
use crate::landscape::scanner::{AnalysisConfig, Positions, ScanOutputs};
use crate::landscape::zones::ZoneConfig;

/// Analysis requested by a run, with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Treatment {
    /// Sliding windows, one scan per size
    Sliding { sizes: Vec<usize>, analysis: AnalysisConfig },
    /// Windows at the points of one or more point files, one scan per size and file
    Selected {
        sizes: Vec<usize>,
        point_files: Vec<PathBuf>,
        fields: PointFields,
        analysis: AnalysisConfig,
    },
    /// Square tiles, one analysis per tile size
    Grid { sizes: Vec<usize>, zone: ZoneConfig },
    Map { zone: ZoneConfig },
    Entity { entity_raster: PathBuf, zone: ZoneConfig },
    Cluster { cluster: ClusterConfig },
    Distance { distance: DistanceConfig },
    Classification { classification: ClassificationConfig },
    SearchAndReplace { replace: ReplaceConfig },
    /// Formula over named factor rasters
    Combine { combine: CombineConfig },
}

impl Treatment {
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// One complete request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub input_raster: PathBuf,
    /// Friction for functional windows, distance metrics, functional
    /// clusters and functional distance maps
    #[serde(default)]
    pub friction_raster: Option<PathBuf>,
    #[serde(default)]
    pub output_raster: Option<PathBuf>,
    #[serde(default)]
    pub output_csv: Option<PathBuf>,
    pub treatment: Treatment,
}

fn parse_items<T: std::str::FromStr>(props: &Properties, key: &str) -> Result<Vec<T>> {
    props
        .get_list(key)
        .unwrap_or_default()
        .iter()
        .map(|item| {
            item.parse::<T>()
                .map_err(|_| Error::config(format!("invalid item '{item}' in property '{key}'")))
        })
        .collect()
}

fn first_of<'p>(props: &'p Properties, keys: &[&str]) -> Option<&'p str> {
    keys.iter().find_map(|k| props.get(k))
}

/// Percent form of a rate, trimmed so that `percent / 100` gives the rate back
fn percent(rate: f64) -> f64 {
    (rate * 100.0 * 1e9).round() / 1e9
}

/// Missing-value rate, written in percent
fn parse_rate(props: &Properties) -> Result<Option<f64>> {
    match first_of(props, &["maximum_nodata_value_rate", "maximum_rate_nodata_value"]) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<f64>()
            .map(|p| Some(p / 100.0))
            .map_err(|_| Error::config(format!("invalid missing-value rate '{v}'"))),
    }
}

fn parse_metrics(props: &Properties) -> Result<Vec<String>> {
    props
        .get_list("metrics")
        .filter(|m| !m.is_empty())
        .ok_or_else(|| Error::config("missing property 'metrics'"))
}

fn parse_sizes(props: &Properties) -> Result<Vec<usize>> {
    let sizes: Vec<usize> = parse_items(props, "sizes")?;
    if sizes.is_empty() {
        return Err(Error::config("missing property 'sizes'"));
    }
    Ok(sizes)
}

fn parse_analysis(props: &Properties, outputs: ScanOutputs) -> Result<AnalysisConfig> {
    let mut analysis = AnalysisConfig {
        metrics: parse_metrics(props)?,
        outputs,
        ..Default::default()
    };
    if let Some(rate) = parse_rate(props)? {
        analysis.max_missing_rate = rate;
    }
    if let Some(shape) = props.get_parsed::<WindowShape>("shape")? {
        analysis.shape = shape;
    }
    if let Some(f) = props.get_parsed::<DistanceFunction>("distance_function")? {
        analysis.distance_function = f;
        analysis.analyze_type = AnalyzeType::WeightedDistance;
    }
    if let Some(t) = props.get_parsed::<AnalyzeType>("analyze_type")? {
        analysis.analyze_type = t;
    }
    if let Some(delta) = props.get_parsed::<usize>("delta_displacement")? {
        analysis.positions = Positions::Lattice { delta };
    }
    analysis.interpolate = props.get_bool("interpolation")?.unwrap_or(false);
    analysis.filters = parse_items(props, "filters")?;
    analysis.unfilters = parse_items(props, "unfilters")?;
    analysis.fast = props.get_bool("fast")?.unwrap_or(false);
    Ok(analysis)
}

fn parse_zone(props: &Properties) -> Result<ZoneConfig> {
    let mut zone = ZoneConfig {
        metrics: parse_metrics(props)?,
        ..Default::default()
    };
    if let Some(rate) = parse_rate(props)? {
        zone.max_missing_rate = rate;
    }
    zone.fast = props.get_bool("fast")?.unwrap_or(false);
    Ok(zone)
}

/// `(path,name)` items; the name follows the last comma
fn parse_factors(props: &Properties) -> Result<Vec<Factor>> {
    let factors: Vec<Factor> = props
        .get_list("factors")
        .unwrap_or_default()
        .iter()
        .map(|item| {
            let inner = item.trim().trim_start_matches('(').trim_end_matches(')');
            let (path, name) = inner
                .rsplit_once(',')
                .ok_or_else(|| Error::config(format!("invalid factor '{item}', expected (path,name)")))?;
            Ok(Factor {
                name: name.trim().to_string(),
                raster: PathBuf::from(path.trim()),
            })
        })
        .collect::<Result<_>>()?;
    if factors.is_empty() {
        return Err(Error::config("missing property 'factors'"));
    }
    Ok(factors)
}

fn parse_max_distance(props: &Properties) -> Result<Option<f64>> {
    props.get_parsed::<f64>("max_distance")
}

impl RunConfig {
    /// Build a run from properties.
    ///
    /// `export_csv=false` / `export_ascii=false` disable the matching output
    /// even when its path is set. Combine runs may omit `input_raster`: the
    /// first factor is the reference grid then.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let treatment = props.require("treatment")?.trim().to_ascii_lowercase();
        let friction_raster = first_of(props, &["friction", "friction_raster", "distance_raster"]).map(PathBuf::from);

        let output_raster = props
            .get("output_raster")
            .filter(|_| !matches!(props.get_bool("export_ascii"), Ok(Some(false))))
            .map(PathBuf::from);
        let output_csv = props
            .get("output_csv")
            .filter(|_| !matches!(props.get_bool("export_csv"), Ok(Some(false))))
            .map(PathBuf::from);
        let outputs = ScanOutputs {
            raster: output_raster.is_some(),
            table: output_csv.is_some(),
        };

        let treatment = match treatment.as_str() {
            "sliding" => Treatment::Sliding {
                sizes: parse_sizes(props)?,
                analysis: parse_analysis(props, outputs)?,
            },
            "selected" => {
                let (point_files, fields) = match (props.get_list("pixels"), props.get_list("points")) {
                    (Some(files), _) => (files, PointFields::pixels()),
                    (None, Some(files)) => (files, PointFields::coordinates()),
                    (None, None) => return Err(Error::config("selected analysis needs 'pixels' or 'points'")),
                };
                let fields = match props.get_list("point_fields").as_deref() {
                    Some([a, b]) => match fields {
                        PointFields::Pixel { .. } => PointFields::Pixel { row: a.clone(), col: b.clone() },
                        PointFields::Coordinate { .. } => PointFields::Coordinate { x: a.clone(), y: b.clone() },
                    },
                    Some(_) => return Err(Error::config("'point_fields' needs exactly two field names")),
                    None => fields,
                };
                let mut analysis = parse_analysis(props, outputs)?;
                // selected runs store the analyse type under `distance_type`
                if let Some(t) = props.get_parsed::<AnalyzeType>("distance_type")? {
                    analysis.analyze_type = t;
                }
                Treatment::Selected {
                    sizes: parse_sizes(props)?,
                    point_files: point_files.into_iter().map(PathBuf::from).collect(),
                    fields,
                    analysis,
                }
            }
            "grid" => Treatment::Grid {
                sizes: parse_sizes(props)?,
                zone: parse_zone(props)?,
            },
            "map" => Treatment::Map { zone: parse_zone(props)? },
            "entity" => Treatment::Entity {
                entity_raster: PathBuf::from(props.require("entity_raster")?),
                zone: parse_zone(props)?,
            },
            "cluster" => {
                let mut cluster_type = props.get_parsed::<ClusterType>("cluster_type")?.unwrap_or_default();
                if cluster_type == ClusterType::Euclidean && friction_raster.is_some() {
                    cluster_type = ClusterType::Functional;
                }
                Treatment::Cluster {
                    cluster: ClusterConfig {
                        values: parse_items(props, "cluster_sources")?,
                        cluster_type,
                        max_distance: parse_max_distance(props)?,
                    },
                }
            }
            "distance" => Treatment::Distance {
                distance: DistanceConfig {
                    sources: parse_items(props, "distance_sources")?,
                    distance_type: props.get_parsed::<DistanceType>("distance_type")?.unwrap_or_default(),
                    max_distance: parse_max_distance(props)?,
                },
            },
            "classification" => Treatment::Classification {
                classification: ClassificationConfig {
                    rules: parse_rules(props.require("domains")?)?,
                },
            },
            "search_and_replace" => Treatment::SearchAndReplace {
                replace: ReplaceConfig {
                    changes: parse_changes(props.require("changes")?)?,
                    nodata_value: props.get_parsed::<f64>("nodata_value")?,
                },
            },
            "combine" => Treatment::Combine {
                combine: CombineConfig {
                    formula: props.require("combination")?.trim().to_string(),
                    factors: parse_factors(props)?,
                },
            },
            other => return Err(Error::config(format!("unknown treatment '{other}'"))),
        };

        let input_raster = match (props.get("input_raster"), &treatment) {
            (Some(path), _) => PathBuf::from(path),
            (None, Treatment::Combine { combine }) if !combine.factors.is_empty() => {
                combine.factors[0].raster.clone()
            }
            (None, _) => PathBuf::from(props.require("input_raster")?),
        };

        Ok(Self {
            input_raster,
            friction_raster,
            output_raster,
            output_csv,
            treatment,
        })
    }

    /// Snapshot of the resolved configuration, in a stable key order
    pub fn to_properties(&self) -> Properties {
        let mut p = Properties::new();
        p.set("treatment", self.treatment.name());
        p.set("input_raster", self.input_raster.display());
        if let Some(path) = &self.friction_raster {
            p.set("friction", path.display());
        }
        if let Some(path) = &self.output_raster {
            p.set("output_raster", path.display());
        }
        if let Some(path) = &self.output_csv {
            p.set("output_csv", path.display());
        }

        match &self.treatment {
            Treatment::Sliding { sizes, analysis } => {
                p.set_list("sizes", sizes);
                write_analysis(&mut p, analysis);
            }
            Treatment::Selected {
                sizes,
                point_files,
                fields,
                analysis,
            } => {
                p.set_list("sizes", sizes);
                let files = point_files.iter().map(|f| f.display());
                match fields {
                    PointFields::Pixel { row, col } => {
                        p.set_list("pixels", files);
                        p.set_list("point_fields", [row, col]);
                    }
                    PointFields::Coordinate { x, y } => {
                        p.set_list("points", files);
                        p.set_list("point_fields", [x, y]);
                    }
                }
                write_analysis(&mut p, analysis);
            }
            Treatment::Grid { sizes, zone } => {
                p.set_list("sizes", sizes);
                write_zone(&mut p, zone);
            }
            Treatment::Map { zone } => write_zone(&mut p, zone),
            Treatment::Entity { entity_raster, zone } => {
                p.set("entity_raster", entity_raster.display());
                write_zone(&mut p, zone);
            }
            Treatment::Cluster { cluster } => {
                p.set_list("cluster_sources", &cluster.values);
                p.set("cluster_type", cluster.cluster_type);
                if let Some(max) = cluster.max_distance {
                    p.set("max_distance", max);
                }
            }
            Treatment::Distance { distance } => {
                p.set_list("distance_sources", &distance.sources);
                p.set("distance_type", distance.distance_type);
                if let Some(max) = distance.max_distance {
                    p.set("max_distance", max);
                }
            }
            Treatment::Classification { classification } => {
                let rules = classification.rules.iter().map(|r| format!("({r})"));
                p.set_list("domains", rules);
            }
            Treatment::SearchAndReplace { replace } => {
                let changes = replace.changes.iter().map(|(from, to)| format!("({from},{to})"));
                p.set_list("changes", changes);
                if let Some(nodata) = replace.nodata_value {
                    p.set("nodata_value", nodata);
                }
            }
            Treatment::Combine { combine } => {
                p.set("combination", &combine.formula);
                let factors = combine
                    .factors
                    .iter()
                    .map(|f| format!("({},{})", f.raster.display(), f.name));
                p.set_list("factors", factors);
            }
        }
        p.set("export_csv", self.output_csv.is_some());
        p.set("export_ascii", self.output_raster.is_some());
        p
    }

    /// Parse a JSON run configuration
    pub fn from_json(text: &str, source_name: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::parse(source_name, e.line(), e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Other(e.to_string()))
    }

    /// Read a run from a `.json` or properties file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            let text = std::fs::read_to_string(path)?;
            Self::from_json(&text, &path.display().to_string())
        } else {
            Self::from_properties(&Properties::read(path)?)
        }
    }

    /// Analyses of a sliding or selected run: one per size, sharing every
    /// other parameter
    pub fn analyses(&self) -> Vec<AnalysisConfig> {
        match &self.treatment {
            Treatment::Sliding { sizes, analysis } | Treatment::Selected { sizes, analysis, .. } => sizes
                .iter()
                .map(|&size| AnalysisConfig {
                    size,
                    ..analysis.clone()
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn write_analysis(p: &mut Properties, a: &AnalysisConfig) {
    p.set_list("metrics", &a.metrics);
    p.set("maximum_nodata_value_rate", percent(a.max_missing_rate));
    p.set("shape", &a.shape);
    p.set("analyze_type", a.analyze_type);
    if a.analyze_type == AnalyzeType::WeightedDistance {
        p.set("distance_function", a.distance_function);
    }
    if let Positions::Lattice { delta } = a.positions {
        p.set("delta_displacement", delta);
    }
    p.set("interpolation", a.interpolate);
    if !a.filters.is_empty() {
        p.set_list("filters", &a.filters);
    }
    if !a.unfilters.is_empty() {
        p.set_list("unfilters", &a.unfilters);
    }
    if a.fast {
        p.set("fast", true);
    }
}

fn write_zone(p: &mut Properties, z: &ZoneConfig) {
    p.set_list("metrics", &z.metrics);
    p.set("maximum_nodata_value_rate", percent(z.max_missing_rate));
    if z.fast {
        p.set("fast", true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLIDING: &str = "\
treatment=sliding
input_raster=/data/land.asc
output_raster=/out/land.tif
output_csv=/out/land.csv
sizes={3;5}
maximum_nodata_value_rate=50
distance_function=exp(-pow(distance, 2)/pow(dmax/2, 2))
metrics={SHDI;HET;NV_}
delta_displacement=2
shape=CIRCLE
interpolation=true
filters={1;2}
export_csv=true
export_ascii=true
";

    #[test]
    fn test_sliding_from_properties() {
        let props = Properties::parse(SLIDING, "test").unwrap();
        let run = RunConfig::from_properties(&props).unwrap();
        let analyses = run.analyses();
        assert_eq!(analyses.len(), 2);
        let a = &analyses[1];
        assert_eq!(a.size, 5);
        assert_eq!(a.shape, WindowShape::Circle);
        assert_eq!(a.max_missing_rate, 0.5);
        assert_eq!(a.analyze_type, AnalyzeType::WeightedDistance);
        assert_eq!(a.positions, Positions::Lattice { delta: 2 });
        assert_eq!(a.filters, vec![1, 2]);
        assert!(a.interpolate);
        assert_eq!(a.outputs, ScanOutputs { raster: true, table: true });
    }

    #[test]
    fn test_snapshot_round_trips() {
        let props = Properties::parse(SLIDING, "test").unwrap();
        let run = RunConfig::from_properties(&props).unwrap();
        let again = RunConfig::from_properties(&run.to_properties()).unwrap();
        assert_eq!(run, again);
    }

    #[test]
    fn test_export_flags_disable_outputs() {
        let text = SLIDING.replace("export_csv=true", "export_csv=false");
        let run = RunConfig::from_properties(&Properties::parse(&text, "test").unwrap()).unwrap();
        assert!(run.output_csv.is_none());
        assert!(!run.analyses()[0].outputs.table);
    }

    #[test]
    fn test_tool_treatments() {
        let text = "treatment=cluster\ninput_raster=a.tif\noutput_raster=c.tif\ncluster_sources={1;3}\ncluster_type=DISTANCE\ndistance_raster=f.tif\nmax_distance=100\n";
        let run = RunConfig::from_properties(&Properties::parse(text, "t").unwrap()).unwrap();
        match &run.treatment {
            Treatment::Cluster { cluster } => {
                assert_eq!(cluster.values, vec![1, 3]);
                assert_eq!(cluster.cluster_type, ClusterType::Functional);
                assert_eq!(cluster.max_distance, Some(100.0));
            }
            other => panic!("unexpected treatment {other:?}"),
        }

        let text = "treatment=classification\ninput_raster=a.tif\ndomains={([0,1[-1);(],-1]-2)}\n";
        let run = RunConfig::from_properties(&Properties::parse(text, "t").unwrap()).unwrap();
        let again = RunConfig::from_properties(&run.to_properties()).unwrap();
        assert_eq!(run, again);

        let text = "treatment=search_and_replace\ninput_raster=a.tif\nchanges={(1,2);(3,4)}\nnodata_value=-1\n";
        let run = RunConfig::from_properties(&Properties::parse(text, "t").unwrap()).unwrap();
        assert_eq!(run.treatment.name(), "search_and_replace");
    }

    #[test]
    fn test_load_reads_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunConfig::from_properties(&Properties::parse(SLIDING, "test").unwrap()).unwrap();

        let props = dir.path().join("run.properties");
        run.to_properties().write(&props, " saved run").unwrap();
        assert_eq!(RunConfig::load(&props).unwrap(), run);

        let json = dir.path().join("run.JSON");
        std::fs::write(&json, run.to_json().unwrap()).unwrap();
        assert_eq!(RunConfig::load(&json).unwrap(), run);

        std::fs::write(&json, "{ \"treatment\": ").unwrap();
        assert!(matches!(RunConfig::load(&json), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_json_round_trip() {
        let props = Properties::parse(SLIDING, "test").unwrap();
        let run = RunConfig::from_properties(&props).unwrap();
        let json = run.to_json().unwrap();
        assert_eq!(RunConfig::from_json(&json, "run.json").unwrap(), run);
        assert!(RunConfig::from_json("{ \"input_raster\": 3 }", "bad.json").is_err());
    }

    #[test]
    fn test_errors() {
        let missing = Properties::parse("treatment=sliding\ninput_raster=a.asc\nsizes={3}\n", "t").unwrap();
        assert!(RunConfig::from_properties(&missing).unwrap_err().is_configuration());
        let unknown = Properties::parse("treatment=merge\ninput_raster=a.asc\n", "t").unwrap();
        assert!(RunConfig::from_properties(&unknown).is_err());
        let no_input = Properties::parse("treatment=map\nmetrics={SHDI}\n", "t").unwrap();
        assert!(RunConfig::from_properties(&no_input).unwrap_err().is_configuration());
    }

    #[test]
    fn test_rate_survives_snapshot() {
        for rate in [0.07, 0.1, 0.29, 0.555, 0.0, 1.0] {
            let text = SLIDING.replace("maximum_nodata_value_rate=50\n", "");
            let mut run = RunConfig::from_properties(&Properties::parse(&text, "t").unwrap()).unwrap();
            if let Treatment::Sliding { analysis, .. } = &mut run.treatment {
                analysis.max_missing_rate = rate;
            }
            let again = RunConfig::from_properties(&run.to_properties()).unwrap();
            assert_eq!(again.analyses()[0].max_missing_rate, run.analyses()[0].max_missing_rate, "rate {rate}");
        }
        assert_eq!(percent(0.07), 7.0);
    }

    #[test]
    fn test_combine_from_properties() {
        let text = "treatment=combine\ncombination=2 * (land == 3) + slope\nfactors={(/data/land.asc,land);(/data/slope.asc,slope)}\noutput_raster=/out/mix.asc\n";
        let run = RunConfig::from_properties(&Properties::parse(text, "t").unwrap()).unwrap();
        assert_eq!(run.input_raster, PathBuf::from("/data/land.asc"));
        match &run.treatment {
            Treatment::Combine { combine } => {
                assert_eq!(combine.formula, "2 * (land == 3) + slope");
                assert_eq!(combine.factors.len(), 2);
                assert_eq!(combine.factors[1].name, "slope");
                assert_eq!(combine.factors[1].raster, PathBuf::from("/data/slope.asc"));
            }
            other => panic!("unexpected treatment {other:?}"),
        }
        let again = RunConfig::from_properties(&run.to_properties()).unwrap();
        assert_eq!(run, again);

        let missing = Properties::parse("treatment=combine\ncombination=a\n", "t").unwrap();
        assert!(RunConfig::from_properties(&missing).unwrap_err().is_configuration());
    }

    #[test]
    fn test_json_custom_mask_is_validated() {
        let text = SLIDING.replace("shape=CIRCLE", "shape=CUSTOM:010/111/010").replace("sizes={3;5}", "sizes={3}");
        let run = RunConfig::from_properties(&Properties::parse(&text, "t").unwrap()).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&run.to_json().unwrap()).unwrap();
        assert_eq!(value["treatment"]["sliding"]["analysis"]["shape"]["CUSTOM"]["size"], 3);

        value["treatment"]["sliding"]["analysis"]["shape"]["CUSTOM"]["cells"] = serde_json::json!([true]);
        let err = RunConfig::from_json(&value.to_string(), "run.json").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));

        value["treatment"]["sliding"]["analysis"]["shape"]["CUSTOM"] =
            serde_json::json!({ "size": 4, "cells": vec![true; 16] });
        assert!(RunConfig::from_json(&value.to_string(), "run.json").is_err());
    }
}
