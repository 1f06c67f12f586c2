use crate::GridError;
use std::{fmt, str::FromStr};

/// A 1°×1° tile, identified by its south-west corner.
///
/// Renders as `[N|S]LL[E|W]LLL` (`N43E006`, `S16W142`). Two tiles
/// with the same corner always serialize identically; the rendered
/// name is the key used for local cache files, existence index
/// entries and download URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileId {
    lon: i32,
    lat: i32,
}

impl TileId {
    pub fn new(lon: i32, lat: i32) -> Self {
        Self { lon, lat }
    }

    /// Longitude of the south-west corner.
    pub fn lon(&self) -> i32 {
        self.lon
    }

    /// Latitude of the south-west corner.
    pub fn lat(&self) -> i32 {
        self.lat
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n_s, lat) = {
            let lat = self.lat.abs();
            let n_s = if self.lat.is_negative() { 'S' } else { 'N' };
            (n_s, lat)
        };
        let (e_w, lon) = {
            let lon = self.lon.abs();
            let e_w = if self.lon.is_negative() { 'W' } else { 'E' };
            (e_w, lon)
        };
        write!(f, "{n_s}{lat:02}{e_w}{lon:03}")
    }
}

impl FromStr for TileId {
    type Err = GridError;

    /// Parses `N43E006`-style names, upper- or lowercase.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let mk_err = || GridError::TileName(name.to_owned());
        if name.len() != 7 || !name.is_ascii() {
            return Err(mk_err());
        }
        let lat_sign = match &name[0..1] {
            "N" | "n" => 1,
            "S" | "s" => -1,
            _ => return Err(mk_err()),
        };
        let lat = lat_sign * i32::from(name[1..3].parse::<u8>().map_err(|_| mk_err())?);
        let lon_sign = match &name[3..4] {
            "E" | "e" => 1,
            "W" | "w" => -1,
            _ => return Err(mk_err()),
        };
        let lon = lon_sign * i32::from(name[4..7].parse::<u16>().map_err(|_| mk_err())?);
        Ok(Self { lon, lat })
    }
}
