//! Coordinate reference system metadata
//!
//! Reprojection is out of scope: rasters entering an analysis already share
//! one CRS. The only question analyses ask is whether map units are metric,
//! since distance windows and friction costs are meaningless in degrees.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
        }
    }

    /// Parse `EPSG:<code>`, a bare code, or fall back to WKT text
    pub fn parse(text: &str) -> Self {
        let t = text.trim();
        let code = t
            .strip_prefix("EPSG:")
            .or_else(|| t.strip_prefix("epsg:"))
            .unwrap_or(t);
        match code.parse::<u32>() {
            Ok(c) => Self::from_epsg(c),
            Err(_) => Self::from_wkt(t),
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether coordinates are angular (latitude/longitude).
    ///
    /// EPSG codes 4000..=4999 are the geographic 2D systems; WKT is checked
    /// for a `GEOGCS`/`GEOGCRS` root.
    pub fn is_geographic(&self) -> bool {
        if let Some(code) = self.epsg {
            return (4000..=4999).contains(&code);
        }
        if let Some(wkt) = &self.wkt {
            let root = wkt.trim_start().to_ascii_uppercase();
            return root.starts_with("GEOGCS") || root.starts_with("GEOGCRS");
        }
        false
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            let end = wkt.char_indices().nth(50).map_or(wkt.len(), |(i, _)| i);
            return format!("WKT:{}", &wkt[..end]);
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}
