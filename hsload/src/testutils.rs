//! In-memory capability providers for tests

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use common::Credentials;
use common::version::LibraryVersions;

use crate::container::{self, ContainerReader};
use crate::domain::{DomainError, DomainHandle, DomainService, WriteMode};
use crate::fetch::{FetchError, FetchOptions, Fetcher, StagedFile};
use crate::objstore::ObjectStoreProvider;
use crate::source::{self, SourceHandle, SourceSpec};
use crate::transfer::{Transfer, TransferMode, TransferRequest};

/// Bytes of a minimal container: superblock signature followed by some padding
pub fn container_bytes() -> Vec<u8> {
    let mut bytes = container::SIGNATURE.to_vec();
    bytes.extend_from_slice(&[0u8; 120]);
    bytes
}

pub fn write_container(dir: &std::path::Path, name: &str) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, container_bytes())?;
    Ok(path)
}

pub async fn open_container(dir: &std::path::Path, name: &str) -> anyhow::Result<SourceHandle> {
    let path = write_container(dir, name)?;
    let spec = SourceSpec::parse(&path.to_string_lossy());
    Ok(source::resolve(&spec, TransferMode::Ingest, None).await?)
}

/// Entries in `dir`, sorted by name
pub fn list_dir(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

/// Serves registered uris from memory into staging files under `dir`
#[derive(Debug)]
pub struct MockFetcher {
    dir: std::path::PathBuf,
    contents: BTreeMap<String, Vec<u8>>,
    pub staged: Mutex<Vec<std::path::PathBuf>>,
    pub requested: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new(dir: &std::path::Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            contents: BTreeMap::new(),
            staged: Mutex::new(vec![]),
            requested: Mutex::new(vec![]),
        }
    }

    #[must_use]
    pub fn with(mut self, uri: &str, contents: Vec<u8>) -> Self {
        self.contents.insert(uri.to_string(), contents);
        self
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn stage(&self, uri: &str, _options: &FetchOptions) -> Result<StagedFile, FetchError> {
        self.requested.lock().unwrap().push(uri.to_string());
        if uri.starts_with("ftp://") {
            return Err(FetchError::Unavailable {
                uri: uri.to_string(),
            });
        }
        let Some(contents) = self.contents.get(uri) else {
            return Err(FetchError::Failed {
                uri: uri.to_string(),
                partial: None,
                source: anyhow::anyhow!("404 Not Found"),
            });
        };
        let (staged, mut file) = StagedFile::create(Some(&self.dir)).unwrap();
        file.write_all(contents).unwrap();
        self.staged
            .lock()
            .unwrap()
            .push(staged.path().to_path_buf());
        Ok(staged)
    }
}

/// Domain service keeping domains in a set
#[derive(Debug, Default)]
pub struct MockDomains {
    pub existing: Mutex<BTreeSet<String>>,
    pub forbidden: BTreeSet<String>,
    /// Domains whose parent folder is missing
    pub missing_parent: BTreeSet<String>,
    pub opened: Mutex<Vec<(String, WriteMode)>>,
}

impl MockDomains {
    #[must_use]
    pub fn with_existing(self, domain: &str) -> Self {
        self.existing.lock().unwrap().insert(domain.to_string());
        self
    }

    #[must_use]
    pub fn with_forbidden(mut self, domain: &str) -> Self {
        self.forbidden.insert(domain.to_string());
        self
    }

    #[must_use]
    pub fn with_missing_parent(mut self, domain: &str) -> Self {
        self.missing_parent.insert(domain.to_string());
        self
    }

    pub fn opened_domains(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|(domain, _)| domain.clone())
            .collect()
    }
}

#[async_trait]
impl DomainService for MockDomains {
    async fn open(
        &self,
        domain: &str,
        mode: WriteMode,
        _credentials: &Credentials,
    ) -> Result<DomainHandle, DomainError> {
        self.opened.lock().unwrap().push((domain.to_string(), mode));
        let domain = domain.to_string();
        if self.forbidden.contains(&domain) {
            return Err(DomainError::PermissionDenied { domain });
        }
        if self.missing_parent.contains(&domain) {
            return Err(DomainError::NotFound { domain });
        }
        let mut existing = self.existing.lock().unwrap();
        let created = match (existing.contains(&domain), mode) {
            (true, WriteMode::Create) => return Err(DomainError::AlreadyExists { domain }),
            (true, WriteMode::Append) => false,
            (false, _) => {
                existing.insert(domain.clone());
                true
            }
        };
        Ok(DomainHandle {
            domain,
            root: Some("g-mock".to_string()),
            created,
        })
    }
}

/// One recorded transfer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCall {
    pub location: String,
    pub domain: String,
    pub mode: TransferMode,
    pub locator: Option<String>,
    pub compression: Option<u8>,
    pub verbose: bool,
    pub source_size: u64,
}

#[derive(Debug)]
pub struct MockTransfer {
    pub hdf5_version: String,
    /// Fail transfers into this domain
    pub fail_domain: Option<String>,
    /// Delete the source file during the transfer
    pub remove_source: bool,
    /// Never finish a transfer once it was recorded
    pub hang: bool,
    pub calls: Mutex<Vec<TransferCall>>,
}

impl Default for MockTransfer {
    fn default() -> Self {
        Self {
            hdf5_version: "1.12.2".to_string(),
            fail_domain: None,
            remove_source: false,
            hang: false,
            calls: Mutex::new(vec![]),
        }
    }
}

impl MockTransfer {
    pub fn calls(&self) -> Vec<TransferCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transfer for MockTransfer {
    async fn library_versions(&self) -> anyhow::Result<LibraryVersions> {
        Ok(LibraryVersions {
            loader: Some("mock".to_string()),
            hdf5: self.hdf5_version.clone(),
        })
    }

    async fn transfer(&self, request: &TransferRequest<'_>) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(TransferCall {
            location: request.source.location().to_string(),
            domain: request.destination.domain.clone(),
            mode: request.mode,
            locator: request.locator.map(String::from),
            compression: request.compression,
            verbose: request.verbose,
            source_size: request.source.reader().size(),
        });
        if self.remove_source {
            std::fs::remove_file(request.source.location())?;
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail_domain.as_deref() == Some(request.destination.domain.as_str()) {
            return Err(anyhow::anyhow!("dataset copy failed"));
        }
        Ok(())
    }
}

/// Object storage held in memory, keyed by full `s3://` uri
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: BTreeMap<String, bytes::Bytes>,
}

impl MemoryObjectStore {
    pub fn with_container(uri: &str) -> Self {
        let mut store = Self::default();
        store
            .objects
            .insert(uri.to_string(), bytes::Bytes::from(container_bytes()));
        store
    }
}

struct MemoryReader {
    data: bytes::Bytes,
}

#[async_trait]
impl ContainerReader for MemoryReader {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_at(&self, offset: u64, len: usize) -> anyhow::Result<bytes::Bytes> {
        let len = container::read_len(self.size(), offset, len);
        let start = usize::try_from(offset)?.min(self.data.len());
        Ok(self.data.slice(start..start + len))
    }
}

#[async_trait]
impl ObjectStoreProvider for MemoryObjectStore {
    async fn open(&self, uri: &str) -> anyhow::Result<Box<dyn ContainerReader>> {
        crate::objstore::split_uri(uri)?;
        let data = self
            .objects
            .get(uri)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{uri} not found"))?;
        Ok(Box::new(MemoryReader { data }))
    }
}
