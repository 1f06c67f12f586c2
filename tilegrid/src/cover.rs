//! Tile coverage of bounding boxes and polygon sets.

use crate::{crossed_degrees, floor_deg, BBox, TileId};
use geo::{
    geometry::{Point, Polygon},
    Contains,
};
use log::debug;
use std::collections::BTreeSet;

/// Per-tile coverage verdict.
///
/// `check_poly` marks a tile whose overlap with the polygon set could
/// not be decided exactly; downstream consumers must clip such tiles
/// against the original polygons instead of trusting their whole
/// content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageDecision {
    pub needed: bool,
    pub check_poly: bool,
}

/// Returns every tile a polygon boundary cuts through.
///
/// Walks each ring edge and collects, for every whole-degree meridian
/// or parallel the edge crosses, the tiles on both sides of the
/// crossing. Those tiles can never be classified by corner testing
/// alone.
pub fn intersect_tiles(polygons: &[Polygon<f64>], corr_x: f64, corr_y: f64) -> BTreeSet<TileId> {
    let mut crossed = BTreeSet::new();
    for polygon in polygons {
        for edge in polygon.exterior().lines() {
            let (x0, y0) = (edge.start.x - corr_x, edge.start.y - corr_y);
            let (x1, y1) = (edge.end.x - corr_x, edge.end.y - corr_y);
            crossed.insert(TileId::new(floor_deg(x1), floor_deg(y1)));
            if x1 == x0 {
                // runs along a meridian, no slope to compute
                for lat in crossed_degrees(y0, y1) {
                    crossed.insert(TileId::new(floor_deg(x1), lat));
                }
            } else if y1 == y0 {
                // runs along a parallel
                for lon in crossed_degrees(x0, x1) {
                    crossed.insert(TileId::new(lon, floor_deg(y1)));
                }
            } else {
                let slope = (y1 - y0) / (x1 - x0);
                let intercept = y0 - x0 * slope;
                for lon in crossed_degrees(x0, x1) {
                    let lat = floor_deg(slope * f64::from(lon) + intercept);
                    crossed.insert(TileId::new(lon - 1, lat)); // west of the meridian
                    crossed.insert(TileId::new(lon, lat)); // east of it
                }
                for lat in crossed_degrees(y0, y1) {
                    let lon = floor_deg((f64::from(lat) - intercept) / slope);
                    crossed.insert(TileId::new(lon, lat - 1)); // south of the parallel
                    crossed.insert(TileId::new(lon, lat)); // north of it
                }
            }
        }
    }
    crossed
}

/// Decides whether the tile with south-west corner (`lon`, `lat`) is
/// needed to cover the polygon set.
///
/// Tests the tile's four corners against every ring. All corners
/// inside means the tile is wholly needed, none means it is not;
/// anything in between is ambiguous (a ring vertex may sit exactly on
/// the tile border, where corner testing is unreliable) and the tile
/// is kept with `check_poly` set.
pub fn area_needed(
    lon: i32,
    lat: i32,
    bbox: &BBox,
    polygons: Option<&[Polygon<f64>]>,
    corr_x: f64,
    corr_y: f64,
) -> CoverageDecision {
    let Some(polygons) = polygons else {
        return CoverageDecision {
            needed: true,
            check_poly: false,
        };
    };
    let min_lon = f64::from(lon) + corr_x;
    let max_lon = min_lon + 1.0;
    let min_lat = f64::from(lat) + corr_y;
    let max_lat = min_lat + 1.0;

    debug!(
        "checking if tile {} intersects the polygon set",
        TileId::new(lon, lat)
    );
    if min_lon == f64::from(bbox.min_lon) + corr_x
        && min_lat == f64::from(bbox.min_lat) + corr_y
        && max_lon == f64::from(bbox.max_lon) + corr_x
        && max_lat == f64::from(bbox.max_lat) + corr_y
    {
        // the polygon set fits inside this single tile
        return CoverageDecision {
            needed: true,
            check_poly: true,
        };
    }

    let corners = [
        Point::new(min_lon, min_lat),
        Point::new(min_lon, max_lat),
        Point::new(max_lon, min_lat),
        Point::new(max_lon, max_lat),
    ];
    let mut inside = [0_u32; 4];
    for polygon in polygons {
        for (count, corner) in inside.iter_mut().zip(&corners) {
            if polygon.contains(corner) {
                *count += 1;
            }
        }
    }
    if inside.iter().all(|&count| count > 0) {
        CoverageDecision {
            needed: true,
            check_poly: false,
        }
    } else if inside.iter().all(|&count| count == 0) {
        CoverageDecision {
            needed: false,
            check_poly: false,
        }
    } else {
        CoverageDecision {
            needed: true,
            check_poly: true,
        }
    }
}

/// Returns the tiles needed to cover `bbox` restricted to `polygons`,
/// in longitude-major order, each with its exactness flag.
///
/// Boundary-crossing tiles always carry the flag; the remaining cells
/// are classified by [`area_needed`] and dropped when wholly outside
/// the polygon set.
pub fn tiles_for_area(
    bbox: &BBox,
    polygons: Option<&[Polygon<f64>]>,
    corr_x: f64,
    corr_y: f64,
) -> Vec<(TileId, bool)> {
    let crossed = polygons
        .map(|polygons| intersect_tiles(polygons, corr_x, corr_y))
        .unwrap_or_default();
    let mut tiles = Vec::new();
    for lon in bbox.lon_range() {
        for lat in bbox.lat_range() {
            let tile = TileId::new(lon, lat);
            if crossed.contains(&tile) {
                tiles.push((tile, true));
            } else {
                let decision = area_needed(lon, lat, bbox, polygons, corr_x, corr_y);
                if decision.needed {
                    tiles.push((tile, decision.check_poly));
                }
            }
        }
    }
    tiles
}

/// Like [`tiles_for_area`], rendered to identifier strings for
/// sources whose filenames are case sensitive.
pub fn tile_names_for_area(
    bbox: &BBox,
    polygons: Option<&[Polygon<f64>]>,
    corr_x: f64,
    corr_y: f64,
    lowercase: bool,
) -> Vec<(String, bool)> {
    tiles_for_area(bbox, polygons, corr_x, corr_y)
        .into_iter()
        .map(|(tile, check_poly)| {
            let name = tile.to_string();
            let name = if lowercase { name.to_lowercase() } else { name };
            (name, check_poly)
        })
        .collect()
}
