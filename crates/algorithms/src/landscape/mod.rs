//! Landscape metrics
//!
//! - **metric**: metric identifiers and selection expansion
//! - **sample**: extraction of window or zone cells with their weights
//! - **summary**: evaluation of every metric over one sample
//! - **scanner**: sliding-window and point analyses
//! - **zones**: tile, whole-map and entity analyses

mod interpolate;
pub mod metric;
pub mod sample;
pub mod scanner;
pub mod summary;
pub mod zones;

pub use metric::{
    expand_metrics, BaseMetric, ClassMetric, CoupleMetric, Metric, MetricArity, MetricFamily,
    MetricInput, MetricRequest, MetricSpec,
};
pub use sample::{Weighting, WindowSample};
pub use scanner::{
    AnalysisConfig, MetricRaster, Positions, ScanOutputs, ScanReport, ScanStatus, SlidingWindow,
    SlidingWindowInput, WindowScanner, DEFAULT_CHUNK_SIZE,
};
pub use summary::{SampleSummary, SummaryNeeds};
pub use zones::{entity_analysis, grid_analysis, map_analysis, ZoneConfig, ZoneReport};
