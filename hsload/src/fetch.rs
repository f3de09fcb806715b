//! Remote Fetcher: stage http/https/ftp sources into local temporary files

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

/// Prefix and suffix of staged file names, e.g. `hsload.Xa3fG1.h5`
pub const STAGED_PREFIX: &str = "hsload.";
pub const STAGED_SUFFIX: &str = ".h5";

/// Address family used to reach remote hosts while staging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpFamily {
    #[default]
    Any,
    V4,
    V6,
}

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub ip_family: IpFamily,
    pub verify_tls: bool,
    /// Print progress to stdout
    pub verbose: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            ip_family: IpFamily::Any,
            verify_tls: true,
            verbose: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// No backend can download this kind of uri
    #[error("no download support for {uri}")]
    Unavailable { uri: String },

    /// The download failed; `partial` names the file left behind if bytes were already written
    #[error("failed to stage {uri}: {source:#}")]
    Failed {
        uri: String,
        partial: Option<std::path::PathBuf>,
        #[source]
        source: anyhow::Error,
    },
}

/// A downloaded source living in a temporary file
///
/// The file is removed by [`StagedFile::close`], or on drop if the owner goes away first (e.g. the
/// run is interrupted).
#[derive(Debug)]
pub struct StagedFile {
    path: tempfile::TempPath,
}

impl StagedFile {
    /// Allocate a uniquely named, empty staging file in `dir` (system temp dir if `None`)
    pub fn create(dir: Option<&std::path::Path>) -> std::io::Result<(Self, std::fs::File)> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGED_PREFIX).suffix(STAGED_SUFFIX);
        let named = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (file, path) = named.into_parts();
        Ok((Self { path }, file))
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Delete the staged file, reporting failure
    pub fn close(self) -> std::io::Result<()> {
        self.path.close()
    }
}

/// Downloads remote sources to local temporary files
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn stage(&self, uri: &str, options: &FetchOptions) -> Result<StagedFile, FetchError>;
}

/// Fetcher for http and https uris built on `reqwest`
#[derive(Debug, Default)]
pub struct HttpFetcher {
    temp_dir: Option<std::path::PathBuf>,
}

impl HttpFetcher {
    /// Stage into `dir` instead of the system temporary directory
    #[must_use]
    pub fn with_temp_dir(dir: &std::path::Path) -> Self {
        Self {
            temp_dir: Some(dir.to_path_buf()),
        }
    }

    fn client(options: &FetchOptions) -> anyhow::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("hsload/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!options.verify_tls);
        builder = match options.ip_family {
            IpFamily::Any => builder,
            IpFamily::V4 => {
                builder.local_address(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED))
            }
            IpFamily::V6 => {
                builder.local_address(std::net::IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED))
            }
        };
        builder.build().context("failed to build http client")
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[tracing::instrument(skip(self))]
    async fn stage(&self, uri: &str, options: &FetchOptions) -> Result<StagedFile, FetchError> {
        let failed = |source: anyhow::Error| FetchError::Failed {
            uri: uri.to_string(),
            partial: None,
            source,
        };
        let url = url::Url::parse(uri)
            .with_context(|| format!("invalid uri {uri:?}"))
            .map_err(failed)?;
        match url.scheme() {
            "http" | "https" => {}
            _ => {
                return Err(FetchError::Unavailable {
                    uri: uri.to_string(),
                });
            }
        }
        if options.verbose {
            println!("staging {uri}");
        }
        let (staged, file) = StagedFile::create(self.temp_dir.as_deref())
            .context("failed to create staging file")
            .map_err(failed)?;
        tracing::info!("staging {uri} to {:?}", staged.path());
        let client = Self::client(options).map_err(failed)?;
        let response = client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .with_context(|| format!("request for {uri} failed"))
            .map_err(failed)?;
        let mut file = tokio::fs::File::from_std(file);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        let streamed: anyhow::Result<()> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.context("download interrupted")?;
                file.write_all(&chunk)
                    .await
                    .with_context(|| format!("failed writing to {:?}", staged.path()))?;
                written += chunk.len() as u64;
            }
            file.flush()
                .await
                .with_context(|| format!("failed writing to {:?}", staged.path()))?;
            Ok(())
        }
        .await;
        match streamed {
            Ok(()) => {
                tracing::info!("staged {written} bytes from {uri}");
                Ok(staged)
            }
            Err(source) => {
                // leave what was already written for inspection
                let partial = match staged.path.keep() {
                    Ok(path) => Some(path),
                    Err(error) => {
                        tracing::warn!("failed to keep partial download: {error}");
                        None
                    }
                };
                Err(FetchError::Failed {
                    uri: uri.to_string(),
                    partial,
                    source,
                })
            }
        }
    }
}
