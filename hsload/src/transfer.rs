//! Transfer Collaborator: the program that copies container structure and data into a domain
//!
//! The copy itself is done by an external loader. This module only decides how to call it: which
//! mode, which storage locator and which compression level, with the credentials passed through
//! the environment rather than on the command line.

use async_trait::async_trait;
use common::Credentials;
use common::version::LibraryVersions;

use crate::domain::DomainHandle;
use crate::error::Error;
use crate::source::SourceHandle;

/// Name of the loader program searched next to `hsload` and on `PATH`
pub const LOADER_NAME: &str = "hsload-loader";

/// What gets reproduced on the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Copy structure and data
    #[default]
    Ingest,
    /// Copy structure only
    NoData,
    /// Copy structure and record where the data chunks live instead of copying them
    Link,
}

impl TransferMode {
    /// Mode selected by the `--nodata` and `--link` flags
    pub fn from_flags(nodata: bool, link: bool) -> Result<Self, Error> {
        match (nodata, link) {
            (true, true) => Err(Error::Usage(
                "--nodata flag can't be used with --link flag".to_string(),
            )),
            (true, false) => Ok(TransferMode::NoData),
            (false, true) => Ok(TransferMode::Link),
            (false, false) => Ok(TransferMode::Ingest),
        }
    }
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransferMode::Ingest => "ingest",
            TransferMode::NoData => "nodata",
            TransferMode::Link => "link",
        };
        write!(f, "{name}")
    }
}

/// Everything the loader needs to copy one source
#[derive(Debug)]
pub struct TransferRequest<'a> {
    pub source: &'a SourceHandle,
    pub destination: &'a DomainHandle,
    pub verbose: bool,
    pub mode: TransferMode,
    /// Where the source data lives, for link mode and object storage sources
    pub locator: Option<&'a str>,
    /// Deflate level 0-9; `None` keeps the compression of the source
    pub compression: Option<u8>,
}

#[async_trait]
pub trait Transfer: Send + Sync {
    /// Versions of the libraries the transfer is built on
    async fn library_versions(&self) -> anyhow::Result<LibraryVersions>;

    async fn transfer(&self, request: &TransferRequest<'_>) -> anyhow::Result<()>;
}

/// Fail unless the transfer can create link domains
pub async fn check_link_support(transfer: &dyn Transfer) -> Result<(), Error> {
    let versions = transfer.library_versions().await.map_err(|err| {
        Error::Configuration(format!("cannot determine hdf5 library version: {err:#}"))
    })?;
    tracing::debug!("library versions: {versions:?}");
    versions
        .check_link_prerequisites()
        .map_err(|err| Error::Configuration(format!("{err:#}")))
}

/// Runs the external loader program
#[derive(Debug, Clone)]
pub struct LoaderCommand {
    program: std::path::PathBuf,
    credentials: Credentials,
}

impl LoaderCommand {
    #[must_use]
    pub fn new(program: std::path::PathBuf, credentials: Credentials) -> Self {
        Self {
            program,
            credentials,
        }
    }

    #[must_use]
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    /// Find the loader program
    ///
    /// An explicitly configured loader is used as given (a bare name is looked up on `PATH`).
    /// Otherwise the loader is searched:
    /// 1. in the same directory as the current executable
    /// 2. on `PATH`
    pub fn locate(explicit: Option<&str>) -> Result<std::path::PathBuf, Error> {
        if let Some(explicit) = explicit {
            let path = std::path::Path::new(explicit);
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            return which::which(explicit).map_err(|err| {
                Error::CapabilityUnavailable(format!("loader {explicit:?} not found: {err}"))
            });
        }
        let mut searched = vec![];
        let current_exe = std::env::current_exe().ok();
        if let Some(bin_dir) = current_exe.as_deref().and_then(std::path::Path::parent) {
            let path = bin_dir.join(LOADER_NAME);
            if path.is_file() {
                tracing::debug!("found loader at {path:?}");
                return Ok(path);
            }
            searched.push(path.display().to_string());
        }
        match which::which(LOADER_NAME) {
            Ok(path) => {
                tracing::debug!("found loader on PATH at {path:?}");
                Ok(path)
            }
            Err(_) => {
                searched.push("PATH".to_string());
                Err(Error::CapabilityUnavailable(format!(
                    "no {LOADER_NAME} program found (searched: {}), use --loader to select one",
                    searched.join(", ")
                )))
            }
        }
    }

    /// Command line for one transfer
    #[must_use]
    pub fn arguments(&self, request: &TransferRequest<'_>) -> Vec<String> {
        let mut args = vec!["--mode".to_string(), request.mode.to_string()];
        if request.verbose {
            args.push("--verbose".to_string());
        }
        if let Some(locator) = request.locator {
            args.extend(["--s3path".to_string(), locator.to_string()]);
        }
        if let Some(level) = request.compression {
            args.extend(["--deflate".to_string(), level.to_string()]);
        }
        if let Some(endpoint) = &self.credentials.endpoint {
            args.extend(["--endpoint".to_string(), endpoint.clone()]);
        }
        if let Some(bucket) = &self.credentials.bucket {
            args.extend(["--bucket".to_string(), bucket.clone()]);
        }
        args.push(request.source.location().to_string());
        args.push(request.destination.domain.clone());
        args
    }

    fn command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.kill_on_drop(true);
        if let Some(username) = &self.credentials.username {
            command.env("HS_USERNAME", username);
        }
        if let Some(password) = &self.credentials.password {
            command.env("HS_PASSWORD", password);
        }
        command
    }
}

#[async_trait]
impl Transfer for LoaderCommand {
    async fn library_versions(&self) -> anyhow::Result<LibraryVersions> {
        let output = self
            .command()
            .arg("--library-version")
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|err| anyhow::anyhow!("failed to run {:?}: {err}", self.program))?;
        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "{:?} --library-version failed ({}): {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        LibraryVersions::from_json(&String::from_utf8_lossy(&output.stdout))
    }

    #[tracing::instrument(
        skip(self, request),
        fields(source = request.source.location(), domain = %request.destination.domain)
    )]
    async fn transfer(&self, request: &TransferRequest<'_>) -> anyhow::Result<()> {
        let args = self.arguments(request);
        tracing::debug!("running {:?} {args:?}", self.program);
        let status = self
            .command()
            .args(&args)
            .stdin(std::process::Stdio::null())
            .status()
            .await
            .map_err(|err| anyhow::anyhow!("failed to run {:?}: {err}", self.program))?;
        if !status.success() {
            return Err(anyhow::anyhow!("loader exited with {status}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils;

    fn credentials() -> Credentials {
        Credentials {
            endpoint: Some("http://hsds.test:5101".to_string()),
            username: Some("test_user1".to_string()),
            password: Some("secret".to_string()),
            bucket: None,
        }
    }

    fn destination(domain: &str) -> DomainHandle {
        DomainHandle {
            domain: domain.to_string(),
            root: Some("g-1".to_string()),
            created: true,
        }
    }

    #[test]
    fn mode_from_flags() {
        assert_eq!(TransferMode::from_flags(false, false).unwrap(), TransferMode::Ingest);
        assert_eq!(TransferMode::from_flags(true, false).unwrap(), TransferMode::NoData);
        assert_eq!(TransferMode::from_flags(false, true).unwrap(), TransferMode::Link);
        assert!(TransferMode::from_flags(true, true).unwrap_err().is_usage());
    }

    #[tokio::test]
    async fn loader_arguments() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let source = testutils::open_container(tmp_dir.path(), "a.h5").await?;
        let destination = destination("/home/test_user1/a.h5");
        let mut credentials = credentials();
        credentials.bucket = Some("hdf5.sample".to_string());
        let loader = LoaderCommand::new("hsload-loader".into(), credentials);
        let request = TransferRequest {
            source: &source,
            destination: &destination,
            verbose: true,
            mode: TransferMode::Ingest,
            locator: None,
            compression: Some(4),
        };
        let args = loader.arguments(&request);
        assert_eq!(
            args,
            vec![
                "--mode".to_string(),
                "ingest".to_string(),
                "--verbose".to_string(),
                "--deflate".to_string(),
                "4".to_string(),
                "--endpoint".to_string(),
                "http://hsds.test:5101".to_string(),
                "--bucket".to_string(),
                "hdf5.sample".to_string(),
                source.location().to_string(),
                "/home/test_user1/a.h5".to_string(),
            ]
        );
        // the password never shows up on the command line
        assert!(!args.iter().any(|arg| arg.contains("secret")));
        Ok(())
    }

    #[tokio::test]
    async fn link_arguments_carry_locator() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let source = testutils::open_container(tmp_dir.path(), "a.h5").await?;
        let destination = destination("/home/test_user1/a.h5");
        let loader = LoaderCommand::new("hsload-loader".into(), credentials());
        let request = TransferRequest {
            source: &source,
            destination: &destination,
            verbose: false,
            mode: TransferMode::Link,
            locator: Some("data/a.h5"),
            compression: None,
        };
        let args = loader.arguments(&request);
        assert_eq!(&args[..4], ["--mode", "link", "--s3path", "data/a.h5"]);
        assert!(!args.contains(&"--deflate".to_string()));
        assert!(!args.contains(&"--verbose".to_string()));
        Ok(())
    }

    #[test]
    fn explicit_missing_loader_is_unavailable() {
        let error = LoaderCommand::locate(Some("/nonexistent/dir/hsload-loader")).unwrap_err();
        assert!(matches!(error, Error::CapabilityUnavailable(_)));
    }

    #[cfg(unix)]
    fn write_script(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-loader");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn explicit_loader_path_is_used() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let script = write_script(tmp_dir.path(), "exit 0");
        let found = LoaderCommand::locate(Some(script.to_str().unwrap())).unwrap();
        assert_eq!(found, script);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn transfer_runs_loader_with_credentials_in_env() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let record = tmp_dir.path().join("record.txt");
        let script = write_script(
            tmp_dir.path(),
            &format!("echo \"$HS_USERNAME:$HS_PASSWORD $*\" > {}", record.display()),
        );
        let source = testutils::open_container(tmp_dir.path(), "a.h5").await?;
        let destination = destination("/home/test_user1/a.h5");
        let loader = LoaderCommand::new(script, credentials());
        loader
            .transfer(&TransferRequest {
                source: &source,
                destination: &destination,
                verbose: false,
                mode: TransferMode::NoData,
                locator: None,
                compression: None,
            })
            .await?;
        let recorded = std::fs::read_to_string(&record)?;
        assert!(recorded.starts_with("test_user1:secret --mode nodata"));
        assert!(recorded.trim_end().ends_with("/home/test_user1/a.h5"));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_loader_is_transfer_failure() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let script = write_script(tmp_dir.path(), "exit 3");
        let source = testutils::open_container(tmp_dir.path(), "a.h5").await?;
        let destination = destination("/home/test_user1/a.h5");
        let loader = LoaderCommand::new(script, credentials());
        let error = loader
            .transfer(&TransferRequest {
                source: &source,
                destination: &destination,
                verbose: false,
                mode: TransferMode::Ingest,
                locator: None,
                compression: None,
            })
            .await
            .unwrap_err();
        assert!(error.to_string().contains("loader exited with"));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn link_support_follows_reported_hdf5_version() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let new_enough = write_script(
            tmp_dir.path(),
            r#"echo '{"loader": "0.1.0", "hdf5": "1.12.2"}'"#,
        );
        check_link_support(&LoaderCommand::new(new_enough, credentials())).await?;

        let old_dir = tempfile::tempdir()?;
        let too_old = write_script(old_dir.path(), r#"echo '{"hdf5": "1.10.4"}'"#);
        let error = check_link_support(&LoaderCommand::new(too_old, credentials()))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Configuration(_)));
        assert!(error.to_string().contains("1.10.6 or higher"));

        let broken_dir = tempfile::tempdir()?;
        let broken = write_script(broken_dir.path(), "echo garbage");
        let error = check_link_support(&LoaderCommand::new(broken, credentials()))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Configuration(_)));
        Ok(())
    }
}
