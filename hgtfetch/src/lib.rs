//! Acquisition of 1°×1° elevation tiles from pluggable remote
//! sources.
//!
//! Callers hand [`Pool::resolve`] an area string, an optional polygon
//! set and an ordered source preference list; it answers with local
//! file paths for every tile it could acquire, each flagged when
//! exact polygon clipping is still required downstream. Each source
//! keeps a persistent index of the tiles it actually has, derived
//! from its remote coverage manifest, so repeat requests for missing
//! tiles never leave the machine.

mod coverage;
mod error;
mod http;
mod index;
mod pool;
mod source;
mod srtm;

pub use crate::{
    coverage::{covered_tiles, parse_manifest},
    error::SourceError,
    http::{HttpClient, HttpResponse, ReqwestClient},
    index::TileIndex,
    pool::{parse_source_spec, Pool},
    source::{Registry, SourceConfig, TileSource},
    srtm::{Srtm, SrtmConfig},
};
pub use tilegrid::TileId;
