//! Argument vector pre-scan
//!
//! Two rules of the command line can't be expressed through `clap` alone: options must come before
//! the first source file, and `-z` may be given without a level (meaning level 4). Both are
//! handled here on the raw arguments before they are parsed.

use crate::error::Error;

/// Compression level used for a bare `-z`
pub const DEFAULT_DEFLATE: u8 = 4;

/// Options whose value is the following argument
const VALUE_OPTIONS: [&str; 13] = [
    "-e",
    "--endpoint",
    "-u",
    "--username",
    "-p",
    "--password",
    "-c",
    "--conf",
    "--logfile",
    "--loglevel",
    "-b",
    "--bucket",
    "--loader",
];

fn is_option(arg: &str) -> bool {
    arg.len() > 1 && arg.starts_with('-')
}

/// Check option placement and expand a bare `-z`.
///
/// The first element is the program name and is passed through untouched. Everything after a
/// `--` separator is taken as positional.
pub fn normalize(args: impl IntoIterator<Item = String>) -> Result<Vec<String>, Error> {
    let mut args = args.into_iter();
    let mut normalized: Vec<String> = args.next().into_iter().collect();
    let mut first_positional: Option<String> = None;
    while let Some(arg) = args.next() {
        if arg == "--" {
            normalized.push(arg);
            normalized.extend(args.by_ref());
            break;
        }
        if !is_option(&arg) {
            first_positional.get_or_insert_with(|| arg.clone());
            normalized.push(arg);
            continue;
        }
        if let Some(source) = &first_positional {
            return Err(Error::Usage(format!(
                "option {arg} must be given before the source files (found after {source:?})"
            )));
        }
        if arg == "-z" {
            normalized.push(format!("-z{DEFAULT_DEFLATE}"));
            continue;
        }
        let takes_value = VALUE_OPTIONS.contains(&arg.as_str());
        normalized.push(arg);
        if takes_value {
            normalized.extend(args.next());
        }
    }
    Ok(normalized)
}
