//! Destination Resolver: map every source to the domain it is loaded into
//!
//! A destination ending in [`FOLDER_SEPARATOR`] is a folder and each source keeps its own file
//! name inside it (`a.h5 -> /proj/` becomes `/proj/a.h5`). Any other destination is the new name
//! of the one and only source.

use crate::error::Error;
use crate::source::SourceSpec;

pub const FOLDER_SEPARATOR: char = '/';

/// Where the sources of one invocation go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationSpec {
    pub target_path: String,
    pub is_folder: bool,
}

/// Split the positional arguments into source tokens and the destination token
pub fn split_positionals(positionals: &[String]) -> Result<(&[String], &str), Error> {
    match positionals {
        [sources @ .., destination] if !sources.is_empty() => Ok((sources, destination.as_str())),
        _ => Err(Error::Usage(
            "at least one source file and a destination domain are required".to_string(),
        )),
    }
}

/// Reject destinations ending in `.` or `..` components, which never name a domain
fn validate(destination: &str) -> Result<(), Error> {
    let last = destination
        .rsplit(FOLDER_SEPARATOR)
        .next()
        .unwrap_or(destination);
    if last == "." || last == ".." {
        return Err(Error::Usage(format!(
            "destination {destination:?} cannot end with '{last}', \
            end it with '{FOLDER_SEPARATOR}' to load into a folder"
        )));
    }
    Ok(())
}

/// Validate the destination against the source list before anything is opened
pub fn resolve_target(sources: &[SourceSpec], destination: &str) -> Result<DestinationSpec, Error> {
    if sources.is_empty() || destination.is_empty() {
        return Err(Error::Usage(
            "at least one source file and a destination domain are required".to_string(),
        ));
    }
    validate(destination)?;
    if sources.len() > 1
        && !(destination.starts_with(FOLDER_SEPARATOR) && destination.ends_with(FOLDER_SEPARATOR))
    {
        return Err(Error::Usage(format!(
            "multiple source files require a destination folder that starts and ends with \
            '{FOLDER_SEPARATOR}' (got {destination:?})"
        )));
    }
    Ok(DestinationSpec {
        target_path: destination.to_string(),
        is_folder: destination.ends_with(FOLDER_SEPARATOR),
    })
}

impl DestinationSpec {
    /// Domain that `source` is loaded into
    ///
    /// Uses the name the user gave, never that of a staged copy.
    pub fn target_for(&self, source: &SourceSpec) -> Result<String, Error> {
        if !self.is_folder {
            return Ok(self.target_path.clone());
        }
        let name = source.basename().ok_or_else(|| {
            Error::Usage(format!(
                "source {:?} does not have a file name to use in folder {}",
                source.raw_token, self.target_path
            ))
        })?;
        Ok(format!("{}{name}", self.target_path))
    }
}
