//! NASA SRTM v3.0 downloader.
//!
//! Coverage is discovered from the mission's remote KML coverage map
//! and cached in a local existence index; downloads go through an
//! authenticated session on the EROS registration system.

use crate::{
    http::{HttpClient, HttpResponse, ReqwestClient},
    index::TileIndex,
    source::{SourceConfig, TileSource},
    SourceError,
};
use dashmap::DashMap;
use log::debug;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tilegrid::TileId;

pub const NICKNAME: &str = "srtm";

const FILE_EXTENSION: &str = "tif";

const SUPPORTED_RESOLUTIONS: &[u8] = &[1, 3];

const BANNER: &str = "You're downloading from NASA Shuttle Radar Topography Mission v3.0. \
     Please consider visiting https://www.earthdata.nasa.gov/ to support the data provider.";

const LOGIN_URL: &str = "https://ers.cr.usgs.gov/";

const LOGIN_PAGE_TITLE: &str = "Login - EROS Registration System";

const TILE_CONTENT_TYPE: &str = "image/tiff";

/// Per-resolution download endpoints.
fn download_url(resolution: u8, tile: &TileId) -> String {
    match resolution {
        1 => format!("https://earthexplorer.usgs.gov/download/5e83a3efe0103743/SRTM1{tile}V3/EE"),
        _ => format!("https://earthexplorer.usgs.gov/download/5e83a43cb348f8ec/SRTM3{tile}V2/EE"),
    }
}

fn coverage_url(resolution: u8) -> String {
    format!("https://dds.cr.usgs.gov/ee-data/coveragemaps/kml/ee/srtm_v3_srtmgl{resolution}.kml")
}

/// SRTM plugin settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SrtmConfig {
    pub user: String,

    pub password: String,

    /// Download error messages treated as "tile does not exist". The
    /// backend answers HTTP 200 with a JSON error body for tiles it
    /// does not have; this list is a heuristic over an undocumented
    /// API and deliberately configurable.
    #[serde(default = "default_not_found_markers")]
    pub not_found_markers: Vec<String>,
}

impl SrtmConfig {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            not_found_markers: default_not_found_markers(),
        }
    }
}

fn default_not_found_markers() -> Vec<String> {
    vec![
        "invalid product".to_owned(),
        "product not available".to_owned(),
    ]
}

/// Shape of the JSON body the backend returns instead of a tile.
#[derive(Deserialize)]
struct RemoteError {
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

pub struct Srtm {
    config: SrtmConfig,

    /// Root directory for downloaded tiles.
    cache_dir: PathBuf,

    /// Directory holding the persisted existence indexes.
    index_dir: PathBuf,

    client: Arc<dyn HttpClient>,

    /// True once the login handshake has completed; the flag also
    /// serializes concurrent bootstrap attempts.
    session: Mutex<bool>,

    /// Existence indexes, built at most once per resolution.
    indexes: DashMap<u8, Arc<TileIndex>>,
}

impl Srtm {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        Self::with_client(config, Arc::new(ReqwestClient::new(None)?))
    }

    pub fn boxed(config: &SourceConfig) -> Result<Box<dyn TileSource>, SourceError> {
        Ok(Box::new(Self::new(config)?))
    }

    /// Constructs the source around a caller-supplied HTTP client.
    pub fn with_client(
        config: &SourceConfig,
        client: Arc<dyn HttpClient>,
    ) -> Result<Self, SourceError> {
        let srtm_config = config
            .srtm
            .clone()
            .ok_or(SourceError::Credentials(NICKNAME))?;
        if srtm_config.user.is_empty() || srtm_config.password.is_empty() {
            return Err(SourceError::Credentials(NICKNAME));
        }
        Ok(Self {
            config: srtm_config,
            cache_dir: config.cache_dir.clone(),
            index_dir: config.config_dir.clone(),
            client,
            session: Mutex::new(false),
            indexes: DashMap::new(),
        })
    }
}

/// Private API.
impl Srtm {
    fn cache_path(&self, tile: &TileId, resolution: u8) -> PathBuf {
        self.cache_dir
            .join(format!("{}{resolution}", NICKNAME.to_uppercase()))
            .join(format!("{tile}.{FILE_EXTENSION}"))
    }

    /// Returns the existence index for `resolution`, building it at
    /// most once per process.
    fn index(&self, resolution: u8) -> Result<Arc<TileIndex>, SourceError> {
        self.indexes
            .entry(resolution)
            .or_try_insert_with(|| {
                let mut index = TileIndex::new(&self.index_dir, NICKNAME, resolution);
                index.ensure(|| {
                    let response = self.client.get(&coverage_url(resolution))?;
                    if response.status >= 400 {
                        return Err(SourceError::Status(response.status, response.final_url));
                    }
                    Ok(response.text())
                })?;
                Ok(Arc::new(index))
            })
            .map(|index| index.clone())
    }

    /// Performs the login handshake once; later calls are no-ops.
    ///
    /// Cookies set during the handshake authenticate every download
    /// issued on the same client afterwards.
    fn ensure_session(&self) -> Result<(), SourceError> {
        let mut session = self.session.lock().unwrap();
        if *session {
            return Ok(());
        }

        let response = self.client.get(LOGIN_URL)?;
        let page = Html::parse_document(&response.text());

        let title_selector = Selector::parse("title").expect("valid selector");
        let title = page
            .select(&title_selector)
            .next()
            .map(|element| element.text().collect::<String>());
        if title.as_deref().map(str::trim) != Some(LOGIN_PAGE_TITLE) {
            return Err(SourceError::Auth(format!(
                "unexpected login page title {title:?}"
            )));
        }

        let mut fields = vec![
            ("username".to_owned(), self.config.user.clone()),
            ("password".to_owned(), self.config.password.clone()),
        ];
        // Hidden inputs carry anti-forgery tokens; echo them back
        // verbatim.
        let hidden_selector =
            Selector::parse(r#"form#loginForm input[type="hidden"]"#).expect("valid selector");
        for input in page.select(&hidden_selector) {
            if let (Some(name), Some(value)) =
                (input.value().attr("name"), input.value().attr("value"))
            {
                fields.push((name.to_owned(), value.to_owned()));
            }
        }

        let response = self.client.post_form(&response.final_url, &fields)?;
        if response.status >= 400 {
            return Err(SourceError::Auth(format!(
                "login submission failed with HTTP {}",
                response.status
            )));
        }
        *session = true;
        Ok(())
    }

    /// Accepts a tile payload, or maps a recognized error body to
    /// [`SourceError::NotFound`].
    fn check_payload(&self, response: &HttpResponse) -> Result<(), SourceError> {
        let actual = response.content_type.clone().unwrap_or_default();
        if actual.starts_with(TILE_CONTENT_TYPE) {
            return Ok(());
        }
        if let Ok(remote) = serde_json::from_slice::<RemoteError>(&response.body) {
            if let Some(message) = remote.error_message {
                let message_lower = message.to_lowercase();
                if self
                    .config
                    .not_found_markers
                    .iter()
                    .any(|marker| message_lower.contains(&marker.to_lowercase()))
                {
                    debug!("remote reports missing tile: {message}");
                    return Err(SourceError::NotFound);
                }
            }
        }
        Err(SourceError::ContentType {
            expected: TILE_CONTENT_TYPE.to_owned(),
            actual,
        })
    }
}

impl TileSource for Srtm {
    fn nickname(&self) -> &'static str {
        NICKNAME
    }

    fn file_extension(&self) -> &'static str {
        FILE_EXTENSION
    }

    fn supported_resolutions(&self) -> &'static [u8] {
        SUPPORTED_RESOLUTIONS
    }

    fn banner(&self) -> &'static str {
        BANNER
    }

    fn get_tile(&self, tile: &TileId, resolution: u8) -> Result<PathBuf, SourceError> {
        if !SUPPORTED_RESOLUTIONS.contains(&resolution) {
            return Err(SourceError::NotFound);
        }

        let cache_path = self.cache_path(tile, resolution);
        if cache_path.exists() {
            debug!("{tile}: cache hit at {}", cache_path.display());
            return Ok(cache_path);
        }

        if !self.index(resolution)?.contains(tile) {
            debug!("{tile}: not in SRTM{resolution} index");
            return Err(SourceError::NotFound);
        }

        self.ensure_session()?;

        let response = self.client.get(&download_url(resolution, tile))?;
        if response.status >= 400 {
            return Err(SourceError::Status(response.status, response.final_url));
        }
        self.check_payload(&response)?;

        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&cache_path, &response.body)?;
        debug!("{tile}: saved to {}", cache_path.display());
        Ok(cache_path)
    }
}

/// Writes `bytes` through a temp file so a crashed download never
/// leaves a truncated tile behind.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SourceError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
