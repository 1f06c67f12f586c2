//! Persistent per-source existence indexes.

use crate::{coverage, SourceError};
use log::info;
use std::{
    collections::BTreeSet,
    fs,
    io::{BufRead, BufReader, ErrorKind, Write},
    path::{Path, PathBuf},
};
use tilegrid::TileId;

/// Bumped when the file header or entry format changes.
const INDEX_VERSION: u32 = 2;

/// Set of tiles known to exist at one (source, resolution).
///
/// Loaded from a local file when present, otherwise rebuilt from the
/// source's remote coverage manifest and persisted immediately. The
/// set never shrinks: a tile absent from it is treated as known
/// nonexistent, sparing a network round-trip.
pub struct TileIndex {
    nickname: String,
    resolution: u8,
    path: PathBuf,
    entries: BTreeSet<TileId>,
}

impl TileIndex {
    pub fn new(index_dir: &Path, nickname: &str, resolution: u8) -> Self {
        let path = index_dir.join(format!("{nickname}Index_{resolution}_v{INDEX_VERSION}.txt"));
        Self {
            nickname: nickname.to_owned(),
            resolution,
            path,
            entries: BTreeSet::new(),
        }
    }

    pub fn contains(&self, tile: &TileId) -> bool {
        self.entries.contains(tile)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, tile: TileId) {
        self.entries.insert(tile);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads entries from the local index file, skipping comments.
    pub fn load(&mut self) -> Result<(), SourceError> {
        let file = fs::File::open(&self.path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.entries.insert(line.parse()?);
        }
        Ok(())
    }

    /// Saves entries to the local index file, overwriting it.
    pub fn save(&self) -> Result<(), SourceError> {
        let mut file = fs::File::create(&self.path)?;
        writeln!(
            file,
            "# {}{} index file, VERSION={}",
            self.nickname.to_uppercase(),
            self.resolution,
            INDEX_VERSION
        )?;
        let mut names: Vec<String> = self.entries.iter().map(ToString::to_string).collect();
        names.sort_unstable();
        for name in names {
            writeln!(file, "{name}")?;
        }
        info!("saved index to {}", self.path.display());
        Ok(())
    }

    /// Loads the local index file, rebuilding it from the remote
    /// coverage manifest (and persisting the result) when no file
    /// exists yet.
    pub fn ensure<F>(&mut self, fetch_manifest: F) -> Result<(), SourceError>
    where
        F: FnOnce() -> Result<String, SourceError>,
    {
        match self.load() {
            Ok(()) => Ok(()),
            Err(SourceError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "building {}{} index from coverage manifest",
                    self.nickname, self.resolution
                );
                let manifest =
                    fetch_manifest().map_err(|e| SourceError::IndexUnavailable(e.to_string()))?;
                let polygons = coverage::parse_manifest(&manifest)
                    .map_err(|e| SourceError::IndexUnavailable(e.to_string()))?;
                self.entries = coverage::covered_tiles(&polygons).into_iter().collect();
                self.save()?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TileIndex;
    use crate::SourceError;
    use tempfile::TempDir;
    use tilegrid::TileId;

    const SMALL_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Placemark>
      <Polygon>
        <outerBoundaryIs>
          <LinearRing>
            <coordinates>6,0,0 8,0,0 8,1,0 6,1,0 6,0,0</coordinates>
          </LinearRing>
        </outerBoundaryIs>
      </Polygon>
    </Placemark>
  </Document>
</kml>"#;

    fn tile(name: &str) -> TileId {
        name.parse().unwrap()
    }

    #[test]
    fn test_save_format() {
        let dir = TempDir::new().unwrap();
        let mut index = TileIndex::new(dir.path(), "srtm", 1);
        index.insert(tile("N42W092"));
        index.insert(tile("N00E006"));
        index.insert(tile("S56W072"));
        index.save().unwrap();

        let content = std::fs::read_to_string(index.path()).unwrap();
        assert_eq!(
            content,
            "# SRTM1 index file, VERSION=2\nN00E006\nN42W092\nS56W072\n"
        );
    }

    #[test]
    fn test_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut index = TileIndex::new(dir.path(), "srtm", 3);
        index.insert(tile("N00E006"));
        index.insert(tile("S16W143"));
        index.save().unwrap();

        let mut reloaded = TileIndex::new(dir.path(), "srtm", 3);
        reloaded.load().unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains(&tile("N00E006")));
        assert!(reloaded.contains(&tile("S16W143")));
        assert!(!reloaded.contains(&tile("N00E009")));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let mut index = TileIndex::new(dir.path(), "srtm", 1);
        assert!(matches!(index.load(), Err(SourceError::Io(_))));
    }

    #[test]
    fn test_ensure_prefers_local_file() {
        let dir = TempDir::new().unwrap();
        let mut index = TileIndex::new(dir.path(), "srtm", 1);
        index.insert(tile("N00E006"));
        index.save().unwrap();

        let mut index = TileIndex::new(dir.path(), "srtm", 1);
        index
            .ensure(|| panic!("local index present, manifest must not be fetched"))
            .unwrap();
        assert!(index.contains(&tile("N00E006")));
    }

    #[test]
    fn test_ensure_rebuilds_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut index = TileIndex::new(dir.path(), "srtm", 1);
        index.ensure(|| Ok(SMALL_MANIFEST.to_owned())).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.contains(&tile("N00E006")));
        assert!(index.contains(&tile("N00E007")));

        // The rebuilt index is persisted for the next process run.
        let mut reloaded = TileIndex::new(dir.path(), "srtm", 1);
        reloaded.load().unwrap();
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn test_ensure_maps_fetch_failure() {
        let dir = TempDir::new().unwrap();
        let mut index = TileIndex::new(dir.path(), "srtm", 1);
        let result = index.ensure(|| {
            Err(SourceError::Status(503, "https://example.com/kml".to_owned()))
        });
        assert!(matches!(result, Err(SourceError::IndexUnavailable(_))));
    }
}
