//! Source classification and the Source Resolver
//!
//! Each source token is classified once into a [`Scheme`] when it is parsed; nothing downstream
//! looks at the raw string to decide how to treat it.

use tracing::instrument;

use crate::container::{self, ContainerReader};
use crate::error::Error;
use crate::objstore::ObjectStoreProvider;
use crate::transfer::TransferMode;

/// Where a source lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Local,
    Http,
    Https,
    Ftp,
    S3,
}

impl Scheme {
    /// Remote sources must be downloaded to a local temporary file before they can be opened
    #[must_use]
    pub fn needs_staging(self) -> bool {
        matches!(self, Scheme::Http | Scheme::Https | Scheme::Ftp)
    }
}

/// One entry of the source list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub raw_token: String,
    pub scheme: Scheme,
    /// Set for staged downloads, which must be deleted once processed
    pub is_temporary: bool,
}

impl SourceSpec {
    /// Classify a source token; anything that isn't a recognized uri is a local path
    #[must_use]
    pub fn parse(token: &str) -> Self {
        let scheme = match url::Url::parse(token) {
            Ok(url) => match url.scheme() {
                "http" => Scheme::Http,
                "https" => Scheme::Https,
                "ftp" => Scheme::Ftp,
                "s3" => Scheme::S3,
                _ => Scheme::Local,
            },
            Err(_) => Scheme::Local,
        };
        Self {
            raw_token: token.to_string(),
            scheme,
            is_temporary: false,
        }
    }

    /// A local copy of a remote source
    #[must_use]
    pub fn staged(path: &std::path::Path) -> Self {
        Self {
            raw_token: path.to_string_lossy().to_string(),
            scheme: Scheme::Local,
            is_temporary: true,
        }
    }

    /// Final path component of the source, used to name it inside a destination folder
    #[must_use]
    pub fn basename(&self) -> Option<String> {
        match self.scheme {
            Scheme::Local => std::path::Path::new(&self.raw_token)
                .file_name()
                .map(|name| name.to_string_lossy().to_string()),
            _ => url::Url::parse(&self.raw_token).ok().and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|segment| !segment.is_empty())
                    .map(String::from)
            }),
        }
    }
}

/// An opened, verified source container
pub struct SourceHandle {
    location: String,
    reader: Box<dyn ContainerReader>,
    superblock_offset: u64,
    locator: Option<String>,
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("location", &self.location)
            .field("size", &self.reader.size())
            .field("superblock_offset", &self.superblock_offset)
            .field("locator", &self.locator)
            .finish()
    }
}

impl SourceHandle {
    /// Path or uri the container was opened from
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn reader(&self) -> &dyn ContainerReader {
        self.reader.as_ref()
    }

    #[must_use]
    pub fn superblock_offset(&self) -> u64 {
        self.superblock_offset
    }

    /// Storage locator forwarded to the transfer: set in link mode and for object storage
    #[must_use]
    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }
}

async fn verify(
    location: &str,
    reader: Box<dyn ContainerReader>,
    locator: Option<String>,
) -> Result<SourceHandle, Error> {
    let superblock = container::find_superblock(reader.as_ref())
        .await
        .map_err(|source| Error::SourceOpen {
            location: location.to_string(),
            source,
        })?;
    let Some(superblock_offset) = superblock else {
        return Err(Error::SourceOpen {
            location: location.to_string(),
            source: anyhow::anyhow!("not an HDF5 file (no superblock signature found)"),
        });
    };
    Ok(SourceHandle {
        location: location.to_string(),
        reader,
        superblock_offset,
        locator,
    })
}

/// Open a source for reading.
///
/// Object storage sources go through the object store provider; a missing capability or an
/// object that can't be opened ends the run. Everything else is a local path (possibly a staged
/// download), which in link mode must be relative: only the locator string is stored and the
/// server resolves it against its own root.
#[instrument(skip(object_store))]
pub async fn resolve(
    spec: &SourceSpec,
    mode: TransferMode,
    object_store: Option<&dyn ObjectStoreProvider>,
) -> Result<SourceHandle, Error> {
    let location = spec.raw_token.as_str();
    match spec.scheme {
        Scheme::S3 => {
            let Some(object_store) = object_store else {
                return Err(Error::CapabilityUnavailable(format!(
                    "object storage support is not available, cannot load {location} \
                    (build with the `s3` feature to load s3 files)"
                )));
            };
            let reader = object_store
                .open(location)
                .await
                .map_err(|source| Error::SourceOpen {
                    location: location.to_string(),
                    source,
                })?;
            verify(location, reader, Some(location.to_string())).await
        }
        Scheme::Local => {
            let locator = if mode == TransferMode::Link {
                if std::path::Path::new(location).is_absolute() {
                    return Err(Error::Configuration(format!(
                        "source file {location} must be an s3 path (for servers using S3 storage) \
                        or a path relative to the server root directory (for servers using POSIX \
                        storage) when using --link"
                    )));
                }
                Some(location.to_string())
            } else {
                None
            };
            let reader = container::LocalReader::open(std::path::Path::new(location))
                .await
                .map_err(|source| Error::SourceOpen {
                    location: location.to_string(),
                    source,
                })?;
            verify(location, Box::new(reader), locator).await
        }
        Scheme::Http | Scheme::Https | Scheme::Ftp => Err(Error::Configuration(format!(
            "remote source {location} must be staged before it can be opened"
        ))),
    }
}
