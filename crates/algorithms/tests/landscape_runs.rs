//! End-to-end runs over small synthetic grids.

use approx::assert_relative_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use landgrid_algorithms::cancel::CancelToken;
use landgrid_algorithms::cluster::{cluster, ClusterConfig, ClusterType};
use landgrid_algorithms::diagnostics::Diagnostic;
use landgrid_algorithms::distance::{distance_map, DistanceConfig, DistanceType};
use landgrid_algorithms::landscape::{AnalysisConfig, Positions, ScanOutputs, ScanStatus, WindowScanner};
use landgrid_algorithms::run::{RunConfig, Treatment};
use landgrid_core::io::{AnalysisPoint, Properties};
use landgrid_core::{Error, Raster};

const NODATA: f64 = -9999.0;

fn grid(data: Vec<f64>, rows: usize, cols: usize) -> Raster<f64> {
    let mut g = Raster::from_vec(data, rows, cols).unwrap();
    g.set_nodata(Some(NODATA));
    g
}

fn analysis(metrics: &[&str], size: usize, max_missing_rate: f64) -> AnalysisConfig {
    AnalysisConfig {
        metrics: metrics.iter().map(|s| s.to_string()).collect(),
        size,
        max_missing_rate,
        ..Default::default()
    }
}

#[test]
fn uniform_grid_skips_border_windows() {
    let g = grid(vec![1.0; 25], 5, 5);
    let report = WindowScanner::new(&g)
        .run(&analysis(&["SHDI"], 3, 0.0))
        .unwrap();
    assert!(report.is_complete());

    let shdi = report.raster("SHDI").unwrap();
    for r in 0..5 {
        for c in 0..5 {
            let v = shdi.get(r, c).unwrap();
            if (1..4).contains(&r) && (1..4).contains(&c) {
                assert_relative_eq!(v, 0.0);
            } else {
                assert!(v.is_nan(), "border cell ({r}, {c}) should be nodata");
            }
        }
    }
    assert_eq!(report.diagnostics.data_quality_count(), 16);
}

#[test]
fn window_over_missing_rate_is_nodata() {
    // 15 of 25 cells missing
    let mut data = vec![1.0; 25];
    for v in data.iter_mut().take(15) {
        *v = NODATA;
    }
    let g = grid(data, 5, 5);
    let mut config = analysis(&["N-valid"], 5, 0.5);
    config.positions = Positions::Points(vec![AnalysisPoint::Pixel { row: 2, col: 2 }]);
    config.outputs = ScanOutputs { raster: true, table: true };

    let report = WindowScanner::new(&g).run(&config).unwrap();
    assert!(report.raster("N-valid").unwrap().get(2, 2).unwrap().is_nan());
    let skipped: Vec<_> = report
        .diagnostics
        .entries()
        .iter()
        .filter_map(|d| match d {
            Diagnostic::DataQuality { row, col, missing_rate } => Some((*row, *col, *missing_rate)),
            _ => None,
        })
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!((skipped[0].0, skipped[0].1), (2, 2));
    assert_relative_eq!(skipped[0].2, 0.6);

    let table = report.table.unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.column("N-valid").unwrap()[0].is_nan());
}

#[test]
fn cancelled_scan_keeps_finished_prefix() {
    let g = grid((0..36).map(|i| (i % 3) as f64).collect(), 6, 6);
    let token = CancelToken::new();
    let trigger = token.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();

    let mut scanner = WindowScanner::new(&g)
        .with_chunk_size(5)
        .with_cancel(token)
        .with_progress(move |done, _total| {
            seen.fetch_add(1, Ordering::SeqCst);
            if done >= 10 {
                trigger.cancel();
            }
        });
    let report = scanner.run(&analysis(&["N-valid"], 3, 1.0)).unwrap();

    assert_eq!(report.status, ScanStatus::Interrupted { completed: 10, total: 36 });
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let values = report.raster("N-valid").unwrap();
    for (i, v) in values.data().iter().enumerate() {
        if i < 10 {
            assert!(v.is_finite(), "position {i} should be evaluated");
        } else {
            assert!(v.is_nan(), "position {i} should be nodata");
        }
    }
    assert!(matches!(report.into_result(), Err(Error::Interrupted { completed: 10, total: 36 })));
}

#[test]
fn cancelled_before_start_evaluates_nothing() {
    let g = grid(vec![1.0; 9], 3, 3);
    let token = CancelToken::new();
    token.cancel();
    let report = WindowScanner::new(&g)
        .with_cancel(token)
        .run(&analysis(&["SHDI"], 3, 1.0))
        .unwrap();
    assert_eq!(report.status, ScanStatus::Interrupted { completed: 0, total: 9 });
    assert!(report.raster("SHDI").unwrap().data().iter().all(|v| v.is_nan()));
}

#[test]
fn repeated_runs_are_identical() {
    let data: Vec<f64> = (0..49).map(|i| ((i * 7) % 4) as f64).collect();
    let g = grid(data, 7, 7);
    let config = analysis(&["SHDI", "HET", "NP", "MD_1"], 3, 0.5);

    let mut scanner = WindowScanner::new(&g);
    let first = scanner.run(&config).unwrap();
    let second = scanner.run(&config).unwrap();
    let fresh = WindowScanner::new(&g).run(&config).unwrap();

    for other in [&second, &fresh] {
        assert_eq!(first.metrics, other.metrics);
        for (a, b) in first.rasters.iter().zip(&other.rasters) {
            for (x, y) in a.raster.data().iter().zip(b.raster.data().iter()) {
                assert!(x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan()));
            }
        }
    }
}

#[test]
fn invalid_configurations_fail_before_scanning() {
    let g = grid(vec![1.0; 9], 3, 3);
    let mut scanner = WindowScanner::new(&g);

    let even = scanner.run(&analysis(&["SHDI"], 4, 1.0)).unwrap_err();
    assert!(matches!(even, Error::InvalidWindowSize { size: 4 }));

    let none = scanner.run(&analysis(&[], 3, 1.0)).unwrap_err();
    assert!(none.is_configuration());

    let mut no_outputs = analysis(&["SHDI"], 3, 1.0);
    no_outputs.outputs = ScanOutputs { raster: false, table: false };
    assert!(scanner.run(&no_outputs).unwrap_err().is_configuration());
}

#[test]
fn batch_reports_each_size() {
    let g = grid((0..25).map(|i| (i % 2) as f64).collect(), 5, 5);
    let configs = vec![analysis(&["SHDI"], 3, 1.0), analysis(&["SHDI"], 2, 1.0), analysis(&["SHDI"], 5, 1.0)];
    let reports = WindowScanner::new(&g).run_batch(&configs);
    assert!(reports[0].is_ok());
    assert!(reports[1].is_err());
    assert!(reports[2].is_ok());
}

#[test]
fn cluster_of_one_region() {
    let g = grid(vec![1.0, 1.0, 1.0, 2.0, 2.0], 1, 5);
    let config = ClusterConfig {
        values: vec![1],
        cluster_type: ClusterType::Rook,
        max_distance: None,
    };
    let out = cluster(&g, None, &config).unwrap();
    assert_eq!(out.clusters.len(), 1);
    assert_eq!(out.clusters[0].size, 3);
    let ids: Vec<i32> = out.raster.data().iter().copied().collect();
    assert_eq!(ids, vec![1, 1, 1, 0, 0]);
    assert_eq!(out.raster.nodata(), Some(0));
}

#[test]
fn cluster_run_survives_properties_snapshot() {
    let text = "treatment=cluster\ninput_raster=land.asc\noutput_raster=clusters.tif\ncluster_sources={1}\ncluster_type=QUEEN\n";
    let run = RunConfig::from_properties(&Properties::parse(text, "cluster.properties").unwrap()).unwrap();
    let again = RunConfig::from_properties(&run.to_properties()).unwrap();
    assert_eq!(run, again);
    match again.treatment {
        Treatment::Cluster { cluster } => assert_eq!(cluster.cluster_type, ClusterType::Queen),
        other => panic!("unexpected treatment {other:?}"),
    }
}

#[test]
fn uniform_friction_matches_euclidean_along_axes_and_diagonals() {
    let mut data = vec![0.0; 49];
    data[3 * 7 + 3] = 1.0;
    let g = grid(data, 7, 7);
    let config = DistanceConfig {
        sources: vec![1],
        distance_type: DistanceType::Euclidean,
        max_distance: None,
    };
    let euclidean = distance_map(&g, None, &config).unwrap().raster;

    let friction = g.like(1.0);
    let functional = distance_map(
        &g,
        Some(&friction),
        &DistanceConfig {
            distance_type: DistanceType::Functional,
            ..config
        },
    )
    .unwrap()
    .raster;

    for (r, c) in [(3, 0), (0, 3), (6, 3), (0, 0), (6, 6), (1, 5)] {
        assert_relative_eq!(
            euclidean.get(r, c).unwrap(),
            functional.get(r, c).unwrap(),
            epsilon = 1e-9
        );
    }
}

/// Cells of different clusters never meet the linking criterion, and every
/// cell of a multi-cell cluster meets it with another cell of its cluster
fn check_cluster_criterion(g: &Raster<f64>, ids: &Raster<i32>, linked: impl Fn((usize, usize), (usize, usize)) -> bool) {
    let (rows, cols) = g.shape();
    let cells: Vec<(usize, usize)> = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .filter(|&(r, c)| ids.get(r, c).unwrap() != 0)
        .collect();
    for &a in &cells {
        let id_a = ids.get(a.0, a.1).unwrap();
        let mut has_partner = false;
        let mut cluster_size = 0;
        for &b in &cells {
            if a == b {
                continue;
            }
            let id_b = ids.get(b.0, b.1).unwrap();
            let same_value = g.get(a.0, a.1).unwrap() == g.get(b.0, b.1).unwrap();
            if id_a == id_b {
                cluster_size += 1;
                has_partner |= linked(a, b);
            } else if same_value {
                assert!(!linked(a, b), "cells {a:?} and {b:?} should share a cluster");
            }
        }
        assert!(cluster_size == 0 || has_partner, "cell {a:?} is disconnected from its cluster");
    }
}

#[test]
fn cluster_ids_respect_the_linking_criterion() {
    let data: Vec<f64> = (0..64).map(|i| if (i * 37 + i / 8) % 5 < 2 { 1.0 } else { 0.0 }).collect();
    let g = grid(data, 8, 8);

    let queen = cluster(
        &g,
        None,
        &ClusterConfig {
            values: vec![1],
            cluster_type: ClusterType::Queen,
            max_distance: None,
        },
    )
    .unwrap();
    check_cluster_criterion(&g, &queen.raster, |a, b| a.0.abs_diff(b.0) <= 1 && a.1.abs_diff(b.1) <= 1);

    let euclidean = cluster(
        &g,
        None,
        &ClusterConfig {
            values: vec![1],
            cluster_type: ClusterType::Euclidean,
            max_distance: Some(2.0),
        },
    )
    .unwrap();
    check_cluster_criterion(&g, &euclidean.raster, |a, b| {
        let (dr, dc) = (a.0.abs_diff(b.0) as f64, a.1.abs_diff(b.1) as f64);
        (dr * dr + dc * dc).sqrt() <= 2.0
    });
    assert!(euclidean.clusters.len() <= queen.clusters.len());
}
