use std::{
    fs, io,
    path::{Path, PathBuf},
};

use super::{SourceError, TileId};

/// Where raw tile bytes come from on a cache miss. Remote and local sources are
/// interchangeable once bytes are in hand.
pub trait ElevationSource: Send + Sync {
    fn fetch_tile(&self, tile: TileId) -> Result<Vec<u8>, SourceError>;

    fn describe(&self) -> String {
        "elevation source".to_string()
    }
}

/// Reads `<root>/<stem>.hgt` files, e.g. a pre-seeded mirror.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ElevationSource for DirectorySource {
    fn fetch_tile(&self, tile: TileId) -> Result<Vec<u8>, SourceError> {
        let path = self.root.join(tile.file_name());
        fs::read(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SourceError::NotFound { tile }
            } else {
                SourceError::Read { tile, path, source }
            }
        })
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

/// Blocking HTTP download of `<base_url>/<stem>.hgt`.
#[cfg(feature = "http-source")]
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http-source")]
impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

#[cfg(feature = "http-source")]
impl ElevationSource for HttpSource {
    fn fetch_tile(&self, tile: TileId) -> Result<Vec<u8>, SourceError> {
        let url = format!("{}/{}", self.base_url, tile.file_name());
        let remote = |err: reqwest::Error| SourceError::Remote {
            tile,
            message: err.to_string(),
        };
        let response = self.client.get(&url).send().map_err(remote)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound { tile });
        }
        let response = response.error_for_status().map_err(remote)?;
        let bytes = response.bytes().map_err(remote)?;
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        format!("http {}", self.base_url)
    }
}
