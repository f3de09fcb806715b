//! Domain Provisioner: open or create destination domains on the data service

use async_trait::async_trait;
use common::Credentials;

/// How the destination domain is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create a new domain; an existing one is an error
    Create,
    /// Open the domain, creating it if it does not exist yet
    Append,
}

impl WriteMode {
    #[must_use]
    pub fn from_append(append: bool) -> Self {
        if append {
            WriteMode::Append
        } else {
            WriteMode::Create
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("domain {domain} not found")]
    NotFound { domain: String },

    #[error("no write access to domain {domain}")]
    PermissionDenied { domain: String },

    #[error("domain {domain} already exists (use --append to load into it)")]
    AlreadyExists { domain: String },

    #[error("failed to open domain {domain}: {source:#}")]
    OpenFailed {
        domain: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DomainError {
    #[must_use]
    pub fn domain(&self) -> &str {
        match self {
            DomainError::NotFound { domain }
            | DomainError::PermissionDenied { domain }
            | DomainError::AlreadyExists { domain }
            | DomainError::OpenFailed { domain, .. } => domain,
        }
    }
}

/// An opened destination domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainHandle {
    pub domain: String,
    /// Id of the root group; folders have none
    pub root: Option<String>,
    /// True if this open created the domain
    pub created: bool,
}

#[async_trait]
pub trait DomainService: Send + Sync {
    async fn open(
        &self,
        domain: &str,
        mode: WriteMode,
        credentials: &Credentials,
    ) -> Result<DomainHandle, DomainError>;
}

#[derive(Debug, serde::Deserialize)]
struct DomainInfo {
    root: Option<String>,
}

/// [`DomainService`] speaking the data service REST api
#[derive(Debug, Clone)]
pub struct HsdsClient {
    client: reqwest::Client,
}

impl HsdsClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("hsload/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| anyhow::anyhow!("failed to build http client: {err}"))?;
        Ok(Self { client })
    }

    fn domain_url(domain: &str, credentials: &Credentials) -> anyhow::Result<url::Url> {
        let endpoint = credentials
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no endpoint configured"))?;
        let mut url = url::Url::parse(endpoint)
            .map_err(|err| anyhow::anyhow!("invalid endpoint {endpoint:?}: {err}"))?;
        // requests go to "<endpoint path>/", keeping any prefix the service is mounted under
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("endpoint {endpoint:?} cannot be a base url"))?
            .pop_if_empty()
            .push("");
        url.set_query(None);
        url.set_fragment(None);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("domain", domain);
            if let Some(bucket) = &credentials.bucket {
                query.append_pair("bucket", bucket);
            }
        }
        Ok(url)
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: url::Url,
        credentials: &Credentials,
    ) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &credentials.username {
            Some(username) => request.basic_auth(username, credentials.password.as_ref()),
            None => request,
        }
    }

    async fn send(
        &self,
        method: reqwest::Method,
        domain: &str,
        credentials: &Credentials,
    ) -> Result<reqwest::Response, DomainError> {
        let open_failed = |source: anyhow::Error| DomainError::OpenFailed {
            domain: domain.to_string(),
            source,
        };
        let url = Self::domain_url(domain, credentials).map_err(open_failed)?;
        tracing::debug!("{method} {url}");
        self.request(method, url, credentials)
            .send()
            .await
            .map_err(|err| open_failed(err.into()))
    }

    async fn handle(
        response: reqwest::Response,
        domain: &str,
        created: bool,
    ) -> Result<DomainHandle, DomainError> {
        let status = response.status();
        if let Some(error) = status_error(status, domain) {
            return Err(error);
        }
        let info: DomainInfo = response.json().await.map_err(|err| DomainError::OpenFailed {
            domain: domain.to_string(),
            source: anyhow::anyhow!("invalid response from data service: {err}"),
        })?;
        Ok(DomainHandle {
            domain: domain.to_string(),
            root: info.root,
            created,
        })
    }
}

/// Map a failing response status to its domain error
fn status_error(status: reqwest::StatusCode, domain: &str) -> Option<DomainError> {
    let domain = domain.to_string();
    if status.is_success() {
        None
    } else if status == reqwest::StatusCode::NOT_FOUND {
        Some(DomainError::NotFound { domain })
    } else if status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
    {
        Some(DomainError::PermissionDenied { domain })
    } else if status == reqwest::StatusCode::CONFLICT {
        Some(DomainError::AlreadyExists { domain })
    } else {
        Some(DomainError::OpenFailed {
            domain,
            source: anyhow::anyhow!("data service responded with {status}"),
        })
    }
}

#[async_trait]
impl DomainService for HsdsClient {
    #[tracing::instrument(skip(self, credentials))]
    async fn open(
        &self,
        domain: &str,
        mode: WriteMode,
        credentials: &Credentials,
    ) -> Result<DomainHandle, DomainError> {
        if mode == WriteMode::Append {
            let response = self.send(reqwest::Method::GET, domain, credentials).await?;
            if response.status() != reqwest::StatusCode::NOT_FOUND {
                return Self::handle(response, domain, false).await;
            }
            tracing::info!("domain {domain} does not exist yet, creating it");
        }
        let response = self.send(reqwest::Method::PUT, domain, credentials).await?;
        Self::handle(response, domain, true).await
    }
}
