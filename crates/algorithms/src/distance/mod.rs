//! Distance transforms and distance-decay functions
//!
//! - **friction**: multi-source Dijkstra over a friction (cost) surface
//! - **edt**: exact Euclidean distance transform
//! - **function**: weights for distance-weighted windows
//! - **map**: distance-to-values analysis

pub mod edt;
pub mod friction;
pub mod function;
pub mod map;

pub use edt::euclidean_distance;
pub use friction::{
    friction_distance, DistanceField, Extent, FrictionDistanceParams, FrictionSurface,
};
pub use function::{AnalyzeType, DistanceFunction};
pub use map::{
    distance_map, distance_to_values, DistanceConfig, DistanceMap, DistanceMapInput,
    DistanceMapOutput, DistanceType,
};
