//! Remote coverage manifests.
//!
//! A source's manifest describes the area it has data for as KML
//! polygons, possibly with holes. Tile membership is derived from it
//! by testing each candidate tile's center point: manifest boundaries
//! follow whole-degree grid lines, so center containment is
//! equivalent to full-tile coverage and sidesteps edge ambiguity.

use crate::SourceError;
use geo::{
    geometry::{LineString, MultiPolygon, Point, Polygon},
    BoundingRect, Contains,
};
use kml::{types::Geometry, Kml};
use rstar::{RTree, AABB};
use std::collections::BTreeSet;
use tilegrid::TileId;

/// Parses a KML coverage manifest into the polygons it declares.
pub fn parse_manifest(kml_text: &str) -> Result<MultiPolygon<f64>, SourceError> {
    let kml = kml_text
        .parse::<Kml<f64>>()
        .map_err(|e| SourceError::Manifest(e.to_string()))?;
    let mut polygons = Vec::new();
    collect_from_kml(&kml, &mut polygons);
    if polygons.is_empty() {
        return Err(SourceError::Manifest("no polygons found".to_owned()));
    }
    Ok(MultiPolygon(polygons))
}

/// Derives the covered tile set from manifest polygons.
///
/// Candidate tile centers spanning the manifest bounds go into a
/// spatial index; each polygon then only tests the candidates inside
/// its own envelope, which keeps large manifests (tens of thousands
/// of tiles) near-linear.
pub fn covered_tiles(coverage: &MultiPolygon<f64>) -> Vec<TileId> {
    let Some(bounds) = coverage.bounding_rect() else {
        return Vec::new();
    };
    let mut centers = Vec::new();
    let mut lon = bounds.min().x.floor() + 0.5;
    while lon < bounds.max().x {
        let mut lat = bounds.min().y.floor() + 0.5;
        while lat < bounds.max().y {
            centers.push([lon, lat]);
            lat += 1.0;
        }
        lon += 1.0;
    }
    let index: RTree<[f64; 2]> = RTree::bulk_load(centers);

    let mut tiles = BTreeSet::new();
    for polygon in &coverage.0 {
        let Some(rect) = polygon.bounding_rect() else {
            continue;
        };
        let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        for center in index.locate_in_envelope(&envelope) {
            if polygon.contains(&Point::new(center[0], center[1])) {
                tiles.insert(sw_corner(center[0], center[1]));
            }
        }
    }
    tiles.into_iter().collect()
}

/// Tile whose south-west corner contains the given center point.
#[allow(clippy::cast_possible_truncation)]
fn sw_corner(lon: f64, lat: f64) -> TileId {
    TileId::new(lon.floor() as i32, lat.floor() as i32)
}

fn collect_from_kml(node: &Kml<f64>, out: &mut Vec<Polygon<f64>>) {
    match node {
        Kml::KmlDocument(document) => {
            for element in document.elements.iter() {
                collect_from_kml(element, out);
            }
        }
        Kml::Document { elements, .. } | Kml::Folder { elements, .. } => {
            for element in elements.iter() {
                collect_from_kml(element, out);
            }
        }
        Kml::Placemark(placemark) => {
            if let Some(geometry) = &placemark.geometry {
                collect_from_geometry(geometry, out);
            }
        }
        Kml::Polygon(polygon) => out.push(to_geo_polygon(polygon)),
        Kml::MultiGeometry(multi) => {
            for geometry in multi.geometries.iter() {
                collect_from_geometry(geometry, out);
            }
        }
        _ => {}
    }
}

fn collect_from_geometry(geometry: &Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(polygon) => out.push(to_geo_polygon(polygon)),
        Geometry::MultiGeometry(multi) => {
            for geometry in multi.geometries.iter() {
                collect_from_geometry(geometry, out);
            }
        }
        _ => {}
    }
}

fn to_geo_polygon(polygon: &kml::types::Polygon<f64>) -> Polygon<f64> {
    let to_ring = |ring: &kml::types::LinearRing<f64>| {
        LineString::from(
            ring.coords
                .iter()
                .map(|coord| (coord.x, coord.y))
                .collect::<Vec<_>>(),
        )
    };
    Polygon::new(
        to_ring(&polygon.outer),
        polygon.inner.iter().map(to_ring).collect(),
    )
}
