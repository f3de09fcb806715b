//! Credential and config file loading
//!
//! The config file is a plain list of `key = value` lines:
//!
//! ```text
//! # default
//! hs_username = <username>
//! hs_password = <passwd>
//! hs_endpoint = http://hsdshdflab.hdfgroup.org
//! ```
//!
//! Values are layered: config file first, then `HS_*` environment variables, then command line
//! flags (applied by the caller with [`Config::override_with`]). The merged result is frozen into
//! [`Credentials`] once and passed by reference from then on.

use anyhow::Context;

/// Name of the config file searched in the working directory and in `$HOME`
pub const CONFIG_FILE_NAME: &str = ".hscfg";

pub const ENDPOINT: &str = "hs_endpoint";
pub const USERNAME: &str = "hs_username";
pub const PASSWORD: &str = "hs_password";
pub const BUCKET: &str = "hs_bucket";
pub const LOADER: &str = "hs_loader";

const KNOWN_KEYS: [&str; 5] = [ENDPOINT, USERNAME, PASSWORD, BUCKET, LOADER];

/// Example printed by `--cnf-eg`
pub const EXAMPLE: &str = "# default
hs_username = <username>
hs_password = <passwd>
hs_endpoint = http://hsdshdflab.hdfgroup.org
";

/// Connection settings for the data service, immutable once built
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub endpoint: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bucket: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("bucket", &self.bucket)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    values: std::collections::BTreeMap<String, String>,
}

fn normalize_value(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(value.to_string())
    }
}

impl Config {
    /// Parse config file contents; malformed lines are skipped
    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let mut config = Self::default();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                tracing::warn!("ignoring config line {}: {line:?}", lineno + 1);
                continue;
            };
            config.set(key.trim(), normalize_value(value));
        }
        config
    }

    /// Pick the config file to read.
    ///
    /// An explicitly given file must exist. Otherwise `<cwd>/.hscfg` wins over `<home>/.hscfg`
    /// and having neither is fine.
    pub fn locate(
        explicit: Option<&std::path::Path>,
        cwd: &std::path::Path,
        home: Option<&std::path::Path>,
    ) -> anyhow::Result<Option<std::path::PathBuf>> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(anyhow::anyhow!("config file {path:?} not found"));
            }
            return Ok(Some(path.to_path_buf()));
        }
        let local = cwd.join(CONFIG_FILE_NAME);
        if local.is_file() {
            return Ok(Some(local));
        }
        Ok(home
            .map(|home| home.join(CONFIG_FILE_NAME))
            .filter(|path| path.is_file()))
    }

    /// Read the config file (if any) and apply `HS_*` environment overrides
    pub fn load(explicit: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("cannot determine working directory")?;
        let home = std::env::var_os("HOME").map(std::path::PathBuf::from);
        let mut config = match Self::locate(explicit, &cwd, home.as_deref())? {
            Some(path) => {
                tracing::debug!("reading config from {path:?}");
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed reading config file {path:?}"))?;
                Self::parse(&contents)
            }
            None => Self::default(),
        };
        config.apply_env(std::env::vars());
        Ok(config)
    }

    /// Override known keys from environment variables named after the upper-cased key
    pub fn apply_env(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (name, value) in vars {
            let key = name.to_ascii_lowercase();
            if KNOWN_KEYS.contains(&key.as_str()) {
                self.set(&key, normalize_value(&value));
            }
        }
    }

    /// Set or clear a value; `None` removes the key
    pub fn set(&mut self, key: &str, value: Option<String>) {
        match value {
            Some(value) => {
                self.values.insert(key.to_string(), value);
            }
            None => {
                self.values.remove(key);
            }
        }
    }

    /// Set a value only when the override is present (command line flags)
    pub fn override_with(&mut self, key: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.set(key, Some(value.to_string()));
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            endpoint: self.get(ENDPOINT).map(String::from),
            username: self.get(USERNAME).map(String::from),
            password: self.get(PASSWORD).map(String::from),
            bucket: self.get(BUCKET).map(String::from),
        }
    }
}
