//! Ordered multi-source tile resolution.

use crate::{
    source::{Registry, SourceConfig, TileSource},
    SourceError,
};
use geo::geometry::Polygon;
use log::{debug, info, warn};
use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
};
use tilegrid::{tiles_for_area, BBox};

/// Resolves tiles against data sources in caller preference order.
pub struct Pool {
    sources: HashMap<String, Box<dyn TileSource>>,
}

impl Pool {
    pub fn new(sources: Vec<Box<dyn TileSource>>) -> Self {
        let sources = sources
            .into_iter()
            .map(|source| (source.nickname().to_owned(), source))
            .collect();
        Self { sources }
    }

    /// Builds a pool holding every source named in `specs`,
    /// constructed through the registry.
    pub fn from_registry(
        registry: &Registry,
        config: &SourceConfig,
        specs: &[&str],
    ) -> Result<Self, SourceError> {
        let mut sources = Vec::new();
        let mut seen = HashSet::new();
        for spec in specs {
            let (nickname, _) = parse_source_spec(spec)?;
            if seen.insert(nickname.to_owned()) {
                sources.push(registry.construct(nickname, config)?);
            }
        }
        Ok(Self::new(sources))
    }

    pub fn source(&self, nickname: &str) -> Option<&dyn TileSource> {
        self.sources.get(nickname).map(|source| source.as_ref())
    }

    /// Resolves every tile needed to cover `area` restricted to
    /// `polygons`, trying the sources in the order given by
    /// `source_prefs`; the first source that has a tile wins. Tiles no
    /// source provides are omitted from the result, which otherwise
    /// preserves the longitude-major tile order.
    pub fn resolve(
        &self,
        area: &str,
        polygons: Option<&[Polygon<f64>]>,
        corr_x: f64,
        corr_y: f64,
        source_prefs: &[&str],
    ) -> Result<Vec<(PathBuf, bool)>, SourceError> {
        let bbox = BBox::from_area(area, corr_x, corr_y)?;
        let tiles = tiles_for_area(&bbox, polygons, corr_x, corr_y);

        // Sources whose index cannot be built are dropped for the
        // rest of the request instead of failing on every tile.
        let mut disabled: HashSet<(String, u8)> = HashSet::new();

        let mut resolved = Vec::new();
        for (tile, check_poly) in &tiles {
            let mut found = None;
            for spec in source_prefs {
                let (nickname, resolution) = parse_source_spec(spec)?;
                if disabled.contains(&(nickname.to_owned(), resolution)) {
                    continue;
                }
                let Some(source) = self.sources.get(nickname) else {
                    return Err(SourceError::UnknownSource((*spec).to_owned()));
                };
                if !source.supported_resolutions().contains(&resolution) {
                    debug!("{spec}: resolution not supported, skipping");
                    continue;
                }
                debug!("{tile}: trying {spec}");
                match source.get_tile(tile, resolution) {
                    Ok(path) => {
                        found = Some(path);
                        break;
                    }
                    Err(SourceError::NotFound) => {
                        debug!("{tile}: not available from {spec}");
                    }
                    Err(e @ SourceError::Auth(_)) => return Err(e),
                    Err(SourceError::IndexUnavailable(reason)) => {
                        warn!("{spec}: coverage index unavailable, disabling source: {reason}");
                        disabled.insert((nickname.to_owned(), resolution));
                    }
                    Err(e) => {
                        warn!("{tile}: {spec} failed: {e}");
                    }
                }
            }
            match found {
                Some(path) => resolved.push((path, *check_poly)),
                None => info!("{tile}: no source has this tile"),
            }
        }
        Ok(resolved)
    }
}

/// Splits a `"srtm1"`-style source preference into nickname and
/// resolution.
pub fn parse_source_spec(spec: &str) -> Result<(&str, u8), SourceError> {
    let mk_err = || SourceError::UnknownSource(spec.to_owned());
    if spec.len() < 2 || !spec.is_ascii() {
        return Err(mk_err());
    }
    let (nickname, resolution) = spec.split_at(spec.len() - 1);
    let resolution = resolution.parse::<u8>().map_err(|_| mk_err())?;
    Ok((nickname, resolution))
}

#[cfg(test)]
mod tests {
    use super::{parse_source_spec, Pool};
    use crate::{
        source::{Registry, SourceConfig, TileSource},
        SourceError, SrtmConfig,
    };
    use std::{
        path::PathBuf,
        sync::{Arc, Mutex},
    };
    use tilegrid::TileId;

    type CallLog = Arc<Mutex<Vec<(TileId, u8)>>>;

    struct FakeSource {
        nickname: &'static str,
        resolutions: &'static [u8],
        missing: Vec<TileId>,
        index_unavailable: bool,
        calls: CallLog,
    }

    impl FakeSource {
        fn new(nickname: &'static str) -> (Self, CallLog) {
            let calls = CallLog::default();
            (
                Self {
                    nickname,
                    resolutions: &[1, 3],
                    missing: Vec::new(),
                    index_unavailable: false,
                    calls: calls.clone(),
                },
                calls,
            )
        }

        fn missing(mut self, tiles: &[&str]) -> Self {
            self.missing = tiles.iter().map(|name| name.parse().unwrap()).collect();
            self
        }
    }

    impl TileSource for FakeSource {
        fn nickname(&self) -> &'static str {
            self.nickname
        }

        fn file_extension(&self) -> &'static str {
            "hgt"
        }

        fn supported_resolutions(&self) -> &'static [u8] {
            self.resolutions
        }

        fn banner(&self) -> &'static str {
            "synthetic test data"
        }

        fn get_tile(&self, tile: &TileId, resolution: u8) -> Result<PathBuf, SourceError> {
            self.calls.lock().unwrap().push((*tile, resolution));
            if self.index_unavailable {
                return Err(SourceError::IndexUnavailable("no manifest".to_owned()));
            }
            if self.missing.contains(tile) {
                return Err(SourceError::NotFound);
            }
            Ok(PathBuf::from(format!(
                "{}{resolution}/{tile}.hgt",
                self.nickname.to_uppercase()
            )))
        }
    }

    fn paths(resolved: &[(PathBuf, bool)]) -> Vec<String> {
        resolved
            .iter()
            .map(|(path, _)| path.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_parse_source_spec() {
        assert_eq!(parse_source_spec("srtm1").unwrap(), ("srtm", 1));
        assert_eq!(parse_source_spec("srtm3").unwrap(), ("srtm", 3));
        assert_eq!(parse_source_spec("alfa3").unwrap(), ("alfa", 3));
        assert!(parse_source_spec("").is_err());
        assert!(parse_source_spec("x").is_err());
        assert!(parse_source_spec("srtmx").is_err());
    }

    #[test]
    fn test_from_registry_builds_each_source_once() {
        let registry = Registry::builtin();
        let config = SourceConfig {
            srtm: Some(SrtmConfig::new("testuser", "testpass")),
            ..SourceConfig::default()
        };
        let pool = Pool::from_registry(&registry, &config, &["srtm1", "srtm3"]).unwrap();
        assert!(pool.source("srtm").is_some());
        assert!(pool.source("view").is_none());
    }

    #[test]
    fn test_single_source_no_polygon() {
        let (alfa, calls) = FakeSource::new("alfa");
        let pool = Pool::new(vec![Box::new(alfa)]);

        let resolved = pool.resolve("1:2:3:4", None, 0.0, 0.0, &["alfa3"]).unwrap();

        assert_eq!(
            calls
                .lock()
                .unwrap()
                .iter()
                .map(|(tile, resolution)| (tile.to_string(), *resolution))
                .collect::<Vec<_>>(),
            [
                ("N02E001".to_owned(), 3),
                ("N03E001".to_owned(), 3),
                ("N02E002".to_owned(), 3),
                ("N03E002".to_owned(), 3),
            ]
        );
        assert_eq!(
            paths(&resolved),
            [
                "ALFA3/N02E001.hgt",
                "ALFA3/N03E001.hgt",
                "ALFA3/N02E002.hgt",
                "ALFA3/N03E002.hgt",
            ]
        );
    }

    #[test]
    fn test_fallback_preserves_priority() {
        let (alfa, alfa_calls) = FakeSource::new("alfa");
        let alfa = alfa.missing(&["N02E001"]);
        let (brav, brav_calls) = FakeSource::new("brav");
        let pool = Pool::new(vec![Box::new(alfa), Box::new(brav)]);

        let resolved = pool
            .resolve("1:2:3:4", None, 0.0, 0.0, &["alfa3", "brav1"])
            .unwrap();

        // Every tile is tried on the preferred source first; only the
        // missing one falls through.
        assert_eq!(alfa_calls.lock().unwrap().len(), 4);
        assert_eq!(
            *brav_calls.lock().unwrap(),
            vec![("N02E001".parse::<TileId>().unwrap(), 1_u8)]
        );
        assert_eq!(
            paths(&resolved),
            [
                "BRAV1/N02E001.hgt",
                "ALFA3/N03E001.hgt",
                "ALFA3/N02E002.hgt",
                "ALFA3/N03E002.hgt",
            ]
        );
    }

    #[test]
    fn test_tile_missing_everywhere_is_omitted() {
        let (alfa, _) = FakeSource::new("alfa");
        let alfa = alfa.missing(&["N02E001"]);
        let (brav, _) = FakeSource::new("brav");
        let brav = brav.missing(&["N02E001"]);
        let pool = Pool::new(vec![Box::new(alfa), Box::new(brav)]);

        let resolved = pool
            .resolve("1:2:3:4", None, 0.0, 0.0, &["alfa3", "brav3"])
            .unwrap();
        assert_eq!(resolved.len(), 3);
        assert!(!paths(&resolved).iter().any(|path| path.contains("N02E001")));
    }

    #[test]
    fn test_unknown_source_is_an_error() {
        let (alfa, _) = FakeSource::new("alfa");
        let pool = Pool::new(vec![Box::new(alfa)]);
        let result = pool.resolve("1:2:3:4", None, 0.0, 0.0, &["view3"]);
        assert!(matches!(result, Err(SourceError::UnknownSource(_))));
    }

    #[test]
    fn test_bad_area_string_is_an_error() {
        let (alfa, _) = FakeSource::new("alfa");
        let pool = Pool::new(vec![Box::new(alfa)]);
        let result = pool.resolve("1:2:3", None, 0.0, 0.0, &["alfa3"]);
        assert!(matches!(result, Err(SourceError::Grid(_))));
    }

    #[test]
    fn test_index_unavailable_disables_source() {
        let (alfa, alfa_calls) = FakeSource::new("alfa");
        let alfa = FakeSource {
            index_unavailable: true,
            ..alfa
        };
        let (brav, brav_calls) = FakeSource::new("brav");
        let pool = Pool::new(vec![Box::new(alfa), Box::new(brav)]);

        let resolved = pool
            .resolve("0:0:2:2", None, 0.0, 0.0, &["alfa1", "brav1"])
            .unwrap();

        // The broken source is tried once, then dropped for the rest
        // of the request.
        assert_eq!(alfa_calls.lock().unwrap().len(), 1);
        assert_eq!(brav_calls.lock().unwrap().len(), 4);
        assert_eq!(resolved.len(), 4);
    }

    #[test]
    fn test_unsupported_resolution_is_skipped() {
        let (alfa, calls) = FakeSource::new("alfa");
        let alfa = FakeSource {
            resolutions: &[3],
            ..alfa
        };
        let pool = Pool::new(vec![Box::new(alfa)]);

        let resolved = pool.resolve("0:0:1:1", None, 0.0, 0.0, &["alfa1"]).unwrap();
        assert!(resolved.is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_auth_failure_aborts_resolution() {
        struct BrokenLogin;

        impl TileSource for BrokenLogin {
            fn nickname(&self) -> &'static str {
                "alfa"
            }

            fn file_extension(&self) -> &'static str {
                "hgt"
            }

            fn supported_resolutions(&self) -> &'static [u8] {
                &[1]
            }

            fn banner(&self) -> &'static str {
                ""
            }

            fn get_tile(&self, _tile: &TileId, _resolution: u8) -> Result<PathBuf, SourceError> {
                Err(SourceError::Auth("login page changed".to_owned()))
            }
        }

        let pool = Pool::new(vec![Box::new(BrokenLogin)]);
        let result = pool.resolve("0:0:2:2", None, 0.0, 0.0, &["alfa1"]);
        assert!(matches!(result, Err(SourceError::Auth(_))));
    }

    #[test]
    fn test_check_poly_flag_is_passed_through() {
        let (alfa, _) = FakeSource::new("alfa");
        let pool = Pool::new(vec![Box::new(alfa)]);

        let polygons = [geo::geometry::Polygon::new(
            geo::geometry::LineString::from(vec![
                (0.5, 0.5),
                (2.5, 0.5),
                (2.5, 2.5),
                (0.5, 2.5),
                (0.5, 0.5),
            ]),
            vec![],
        )];
        let resolved = pool
            .resolve("0.5:0.5:2.5:2.5", Some(&polygons), 0.0, 0.0, &["alfa3"])
            .unwrap();

        // 3x3 tiles, all boundary tiles flagged, the center not.
        assert_eq!(resolved.len(), 9);
        let flagged = resolved
            .iter()
            .filter(|(_, check_poly)| *check_poly)
            .count();
        assert_eq!(flagged, 8);
        let (center_path, center_flag) = &resolved[4];
        assert!(center_path.to_string_lossy().contains("N01E001"));
        assert!(!center_flag);
    }
}
