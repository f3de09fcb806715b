//! Load HDF5 container files into data service domains - `hsload`
//!
//! `hsload` copies one or more HDF5 files into a domain (or a folder of domains) on a remote data
//! service. Sources can be local files, `http(s)://` or `ftp://` resources that get downloaded
//! first, or objects in S3 (`s3://bucket/key`) that are read in place.
//!
//! # Usage
//!
//! ```bash
//! # Load one file, giving the domain its own name
//! hsload -e http://hsds.example.org data/tall.h5 /home/alice/tall.h5
//!
//! # Load several files into a folder; each domain is named after its source
//! hsload -v a.h5 https://example.org/data/b.h5 s3://bucket/c.h5 /home/alice/imports/
//!
//! # Recompress datasets while loading, or only copy the structure
//! hsload -z9 a.h5 /home/alice/a.h5
//! hsload --nodata a.h5 /home/alice/a.h5
//!
//! # Reference the data of an s3 object instead of copying it
//! hsload --link s3://bucket/c.h5 /home/alice/c.h5
//! ```
//!
//! Options must come before the source files. When several sources are given, the destination
//! must be a folder: a path that starts and ends with `/`.
//!
//! # Configuration
//!
//! Endpoint, username, password and bucket default to the values in `.hscfg` (working directory
//! first, then `$HOME`, or the file given with `-c`), can be overridden by `HS_ENDPOINT`,
//! `HS_USERNAME`, `HS_PASSWORD` and `HS_BUCKET`, and finally by command line flags.
//!
//! # Architecture
//!
//! Per source, in order:
//!
//! ```text
//! fetch::Fetcher          stage remote sources to a temp file (failure skips the source)
//! destination             pick the target domain name
//! source::resolve         open the container (local file or object store)
//! domain::DomainService   open or create the target domain
//! transfer::Transfer      copy structure/data through the external loader
//!                         remove the staged temp file
//! ```
//!
//! [`ingest::Ingest`] drives these steps. Each backend sits behind a trait and is handed to it in
//! [`ingest::Capabilities`], so a missing backend (no object storage support in this build, no
//! download support for `ftp://`) is an ordinary value rather than a build-time condition.

pub mod args;
pub mod container;
pub mod destination;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod objstore;
pub mod source;
pub mod transfer;

#[cfg(test)]
mod testutils;

pub use error::Error;
