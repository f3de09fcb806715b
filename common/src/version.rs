// library version information for the link-mode prerequisite check

use serde::Deserialize;

/// Oldest HDF5 library able to report chunk locations, which link mode relies on
pub const MIN_LINK_HDF5: SemVer = SemVer {
    major: 1,
    minor: 10,
    patch: 6,
};

/// Library versions reported by the external loader
///
/// The loader prints this as JSON when invoked with `--library-version`, e.g.
/// `{"loader":"0.9.2","hdf5":"1.12.2"}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LibraryVersions {
    /// Version of the loader program itself
    ///
    /// Only used for diagnostics.
    #[serde(default)]
    pub loader: Option<String>,

    /// Version of the HDF5 library the loader is linked against
    pub hdf5: String,
}

impl LibraryVersions {
    /// Deserialize from JSON string
    ///
    /// # Errors
    ///
    /// Returns an error if JSON deserialization fails or the format is invalid.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json.trim())
            .map_err(|e| anyhow::anyhow!("failed to parse library version JSON: {e:#}"))
    }

    /// Check that link mode can be used with these libraries
    ///
    /// # Errors
    ///
    /// Returns an error naming the required version if the HDF5 library is too old or its
    /// version cannot be parsed.
    pub fn check_link_prerequisites(&self) -> anyhow::Result<()> {
        let hdf5: SemVer = self.hdf5.parse()?;
        if hdf5 < MIN_LINK_HDF5 {
            return Err(anyhow::anyhow!(
                "link option requires hdf5 lib version {MIN_LINK_HDF5} or higher (found {hdf5})"
            ));
        }
        Ok(())
    }
}

/// `major.minor.patch` triple; missing trailing components read as zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl std::str::FromStr for SemVer {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || anyhow::anyhow!("invalid version string {s:?}");
        // drop pre-release/build suffixes: "1.12.2-1" or "1.14.0+debian"
        let core = s
            .trim()
            .trim_start_matches('v')
            .split(['-', '+', ' '])
            .next()
            .unwrap_or_default();
        let mut parts = core.split('.');
        let mut next = || -> anyhow::Result<u32> {
            match parts.next() {
                Some(part) => part.parse().map_err(|_| invalid()),
                None => Ok(0),
            }
        };
        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        if core.is_empty() || parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl std::fmt::Display for SemVer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
