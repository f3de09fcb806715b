//! Ingestion Sequencer
//!
//! Sources are processed one at a time, in the order given:
//!
//! ```text
//! stage (remote only) -> target name -> open source -> open domain -> transfer -> cleanup
//! ```
//!
//! A remote source that cannot be staged is logged and skipped. Every other failure ends the run:
//! sources already loaded stay loaded and nothing is rolled back. A staged copy is deleted once its
//! source has been processed, whether the transfer worked or not.

use common::Credentials;
use tracing::instrument;

use crate::destination::DestinationSpec;
use crate::domain::{DomainError, DomainService, WriteMode};
use crate::error::Error;
use crate::fetch::{FetchError, FetchOptions, Fetcher, StagedFile};
use crate::objstore::ObjectStoreProvider;
use crate::source::{self, SourceSpec};
use crate::transfer::{self, Transfer, TransferMode, TransferRequest};

/// Settings shared by every source of one invocation, fixed before the first one is touched
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub mode: TransferMode,
    pub write_mode: WriteMode,
    /// Deflate level for the loaded data; `None` keeps the source compression
    pub compression: Option<u8>,
    pub verbose: bool,
    pub fetch: FetchOptions,
}

/// Backends the sequencer works through
///
/// A missing fetcher or object store is a valid configuration: sources needing it are skipped
/// (remote) or end the run (object storage).
pub struct Capabilities {
    pub fetcher: Option<Box<dyn Fetcher>>,
    pub object_store: Option<Box<dyn ObjectStoreProvider>>,
    pub domains: Box<dyn DomainService>,
    pub transfer: Box<dyn Transfer>,
}

/// A source that made it into its domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Default)]
pub struct Summary {
    pub completed: Vec<Completion>,
    /// Remote sources that could not be staged
    pub skipped: Vec<String>,
}

impl Summary {
    #[must_use]
    pub fn uploaded(&self) -> usize {
        self.completed.len()
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "files uploaded: {}, files skipped: {}",
            self.uploaded(),
            self.skipped.len()
        )
    }
}

pub struct Ingest {
    settings: Settings,
    capabilities: Capabilities,
}

impl Ingest {
    #[must_use]
    pub fn new(settings: Settings, capabilities: Capabilities) -> Self {
        Self {
            settings,
            capabilities,
        }
    }

    /// Load every source into its domain under `destination`
    pub async fn run(
        &self,
        sources: &[SourceSpec],
        destination: &DestinationSpec,
    ) -> Result<Summary, Error> {
        if self.settings.mode == TransferMode::Link {
            transfer::check_link_support(self.capabilities.transfer.as_ref()).await?;
        }
        let mut summary = Summary::default();
        for spec in sources {
            let staged = if spec.scheme.needs_staging() {
                match self.stage(spec).await {
                    Some(staged) => Some(staged),
                    None => {
                        summary.skipped.push(spec.raw_token.clone());
                        continue;
                    }
                }
            } else {
                None
            };
            let result = self.load(spec, staged.as_ref(), destination).await;
            if let Some(staged) = staged {
                let path = staged.path().to_path_buf();
                match staged.close() {
                    Ok(()) => tracing::debug!("removed staged file {path:?}"),
                    Err(error) => {
                        tracing::warn!("failed to remove staged file {path:?}: {error}");
                    }
                }
            }
            summary.completed.push(result?);
        }
        Ok(summary)
    }

    /// Download a remote source; `None` means the source is skipped
    async fn stage(&self, spec: &SourceSpec) -> Option<StagedFile> {
        let Some(fetcher) = &self.capabilities.fetcher else {
            tracing::error!(
                "no download support available, skipping {}",
                spec.raw_token
            );
            return None;
        };
        match fetcher.stage(&spec.raw_token, &self.settings.fetch).await {
            Ok(staged) => {
                tracing::info!("staged {} as {:?}", spec.raw_token, staged.path());
                Some(staged)
            }
            Err(FetchError::Unavailable { uri }) => {
                tracing::error!("no download support for {uri}, skipping it");
                None
            }
            Err(FetchError::Failed {
                uri,
                partial,
                source,
            }) => {
                match partial {
                    Some(partial) => tracing::error!(
                        "failed to stage {uri}: {source:#}, skipping it \
                        (partial download left at {partial:?})"
                    ),
                    None => tracing::error!("failed to stage {uri}: {source:#}, skipping it"),
                }
                None
            }
        }
    }

    #[instrument(skip(self, spec, staged, destination), fields(source = %spec.raw_token))]
    async fn load(
        &self,
        spec: &SourceSpec,
        staged: Option<&StagedFile>,
        destination: &DestinationSpec,
    ) -> Result<Completion, Error> {
        // the target is named after the source as given, not after its staged copy
        let target = destination.target_for(spec)?;
        let staged_spec = staged.map(|staged| SourceSpec::staged(staged.path()));
        let source = source::resolve(
            staged_spec.as_ref().unwrap_or(spec),
            self.settings.mode,
            self.capabilities.object_store.as_deref(),
        )
        .await?;
        let domain = self
            .capabilities
            .domains
            .open(&target, self.settings.write_mode, &self.settings.credentials)
            .await
            .inspect_err(|error| match error {
                DomainError::NotFound { domain } => tracing::error!("domain: {domain} not found"),
                DomainError::PermissionDenied { domain } => {
                    tracing::error!("no write access to domain: {domain}");
                }
                DomainError::AlreadyExists { domain } => {
                    tracing::error!("domain: {domain} already exists");
                }
                DomainError::OpenFailed { .. } => tracing::error!("{error}"),
            })?;
        let request = TransferRequest {
            source: &source,
            destination: &domain,
            verbose: self.settings.verbose,
            mode: self.settings.mode,
            locator: source.locator(),
            compression: self.settings.compression,
        };
        self.capabilities
            .transfer
            .transfer(&request)
            .await
            .map_err(|error| Error::Transfer {
                location: spec.raw_token.clone(),
                domain: target.clone(),
                source: error,
            })?;
        tracing::info!("file {} uploaded to domain: {target}", spec.raw_token);
        if self.settings.verbose {
            println!("File {} uploaded to domain: {target}", spec.raw_token);
        }
        Ok(Completion {
            source: spec.raw_token.clone(),
            target,
        })
    }
}
