// cis.rs

use std::fmt;
use std::str::FromStr;

use crate::error::BmaError;
use crate::model::{Feature, MarkerCatalog, MarkerId};

/// Feature boundary(ies) the cis window is anchored on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CisAnchor {
    /// Feature start site only: [start - len, start + len].
    Fss,
    /// Feature start and end sites: [start - len, end + len].
    FssFes,
}

impl fmt::Display for CisAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CisAnchor::Fss => f.write_str("FSS"),
            CisAnchor::FssFes => f.write_str("FSS+FES"),
        }
    }
}

impl FromStr for CisAnchor {
    type Err = BmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FSS" => Ok(CisAnchor::Fss),
            "FSS+FES" => Ok(CisAnchor::FssFes),
            other => Err(BmaError::config(format!(
                "anchor should be 'FSS' or 'FSS+FES', got '{}'",
                other
            ))),
        }
    }
}

/// Where a marker lies relative to a cis window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CisPosition {
    Upstream,
    Inside,
    Downstream,
}

pub fn cis_position(coord: u64, start: u64, end: u64, anchor: CisAnchor, half_window: u64) -> CisPosition {
    let lower = start.saturating_sub(half_window);
    let upper = match anchor {
        CisAnchor::Fss => start,
        CisAnchor::FssFes => end,
    } + half_window;
    if coord > upper {
        CisPosition::Downstream
    } else if coord >= lower {
        CisPosition::Inside
    } else {
        CisPosition::Upstream
    }
}

/// Markers of the feature's chromosome inside its cis window, by position.
///
/// The catalog is sorted, so the scan stops at the first downstream marker.
pub fn find_cis_markers(
    feature: &Feature,
    catalog: &MarkerCatalog,
    anchor: CisAnchor,
    half_window: u64,
) -> Vec<MarkerId> {
    let mut cis = Vec::new();
    for (id, marker) in catalog.on_chromosome(&feature.chr) {
        match cis_position(marker.coord, feature.start, feature.end, anchor, half_window) {
            CisPosition::Upstream => continue,
            CisPosition::Inside => cis.push(id),
            CisPosition::Downstream => break,
        }
    }
    cis
}
