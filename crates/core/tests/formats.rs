//! Conversions between the file formats a run reads and writes.

use approx::assert_relative_eq;
use landgrid_core::io::{read_points, read_raster, write_raster, AnalysisPoint, PointFields, Properties, Table};
use landgrid_core::{GeoTransform, Raster};

fn landuse() -> Raster<f64> {
    let mut r = Raster::from_vec(vec![1.0, 2.0, -9999.0, 3.0, 3.0, 1.0], 2, 3).unwrap();
    r.set_nodata(Some(-9999.0));
    r.set_transform(GeoTransform::new(500.0, 900.0, 25.0, -25.0));
    r
}

#[test]
fn geotiff_to_ascii_keeps_cells_and_grid() {
    let dir = tempfile::tempdir().unwrap();
    let tif = dir.path().join("landuse.tif");
    let asc = dir.path().join("landuse.asc");

    write_raster(&landuse(), &tif).unwrap();
    let from_tif: Raster<f64> = read_raster(&tif).unwrap();
    write_raster(&from_tif, &asc).unwrap();
    let from_asc: Raster<f64> = read_raster(&asc).unwrap();

    assert_eq!(from_asc.shape(), (2, 3));
    assert!(from_asc.transform().same_grid(landuse().transform()));
    assert!(from_asc.is_nodata_at(0, 2).unwrap());
    assert_relative_eq!(from_asc.get(1, 0).unwrap(), 3.0);
    assert_eq!(from_asc.distinct_classes(), vec![1, 2, 3]);
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    assert!(write_raster(&landuse(), dir.path().join("landuse.png")).is_err());
}

#[test]
fn table_keeps_nodata_cells() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.csv");
    let mut table = Table::new(vec!["row".into(), "col".into(), "SHDI".into()]);
    table.push_row(vec![0.0, 0.0, f64::NAN]).unwrap();
    table.push_row(vec![0.0, 1.0, 0.6931471805599453]).unwrap();
    table.write(&path).unwrap();

    let back = Table::read(&path).unwrap();
    assert_eq!(back.columns(), table.columns());
    let shdi = back.column("SHDI").unwrap();
    assert!(shdi[0].is_nan());
    assert_eq!(shdi[1], 0.6931471805599453);
}

#[test]
fn points_and_properties_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let points = dir.path().join("plots.csv");
    std::fs::write(&points, "id,X,Y\n1,512.5,887.5\n2,560.0,860.0\n").unwrap();
    let read = read_points(
        &points,
        &PointFields::Coordinate {
            x: "x".into(),
            y: "y".into(),
        },
    )
    .unwrap();
    assert_eq!(read, vec![AnalysisPoint::Coordinate { x: 512.5, y: 887.5 }, AnalysisPoint::Coordinate { x: 560.0, y: 860.0 }]);

    let snapshot = dir.path().join("run.properties");
    let mut props = Properties::new();
    props.set("treatment", "sliding");
    props.set_list("sizes", [3, 5]);
    props.write(&snapshot, " sliding run").unwrap();
    let back = Properties::read(&snapshot).unwrap();
    assert_eq!(back, props);
    assert_eq!(back.get_list("sizes").unwrap(), vec!["3", "5"]);
}
