use clap::{CommandFactory, Parser};

use common::config::{self, Config};
use hsload::destination;
use hsload::domain::{HsdsClient, WriteMode};
use hsload::fetch::{FetchOptions, HttpFetcher, IpFamily};
use hsload::ingest::{Capabilities, Ingest, Settings};
use hsload::source::SourceSpec;
use hsload::transfer::{LoaderCommand, TransferMode};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "hsload",
    version,
    about = "Load HDF5 files (local, http/ftp or s3 resident) into data service domains",
    long_about = "`hsload` copies HDF5 files into a domain, or into a folder of domains, on a \
remote data service.

Sources can be local paths, http(s):// or ftp:// uris (downloaded to a temporary file first) or \
s3:// uris (read in place). Options must be given before the source files. With more than one \
source the destination must be a folder, i.e. start and end with '/'.

EXAMPLES:
    # Load a local file into a new domain
    hsload -e http://hsds.example.org tall.h5 /home/alice/tall.h5

    # Load several files into a folder
    hsload -v a.h5 https://example.org/data/b.h5 /home/alice/imports/

    # Create a domain that references the data of an s3 object
    hsload --link s3://bucket/data/c.h5 /home/alice/c.h5

    # Print an example .hscfg
    hsload --cnf-eg"
)]
struct Args {
    // Load options
    /// Append to an existing domain instead of requiring a new one
    #[arg(short, long, help_heading = "Load options")]
    append: bool,

    /// Compress loaded datasets with deflate at LEVEL (0-9); a bare -z means 4
    #[arg(
        short = 'z',
        value_name = "LEVEL",
        value_parser = clap::value_parser!(u8).range(0..=9),
        help_heading = "Load options"
    )]
    deflate: Option<u8>,

    /// Copy the structure only, no dataset values
    #[arg(long, conflicts_with = "link", help_heading = "Load options")]
    nodata: bool,

    /// Reference the source data instead of copying it
    ///
    /// Local sources must be given relative to the data service storage root.
    #[arg(long, help_heading = "Load options")]
    link: bool,

    /// External loader program doing the actual copy (default: hsload-loader)
    #[arg(long, value_name = "PATH", help_heading = "Load options")]
    loader: Option<String>,

    // Connection
    /// Data service endpoint
    #[arg(short, long, value_name = "URL", help_heading = "Connection")]
    endpoint: Option<String>,

    /// User name
    #[arg(short, long, help_heading = "Connection")]
    username: Option<String>,

    /// Password
    #[arg(short, long, help_heading = "Connection")]
    password: Option<String>,

    /// Storage bucket of the destination domains
    #[arg(short, long, help_heading = "Connection")]
    bucket: Option<String>,

    /// Credential/config file (default: ./.hscfg, then ~/.hscfg)
    #[arg(short, long, value_name = "FILE", help_heading = "Connection")]
    conf: Option<std::path::PathBuf>,

    /// Print an example config file and exit
    #[arg(long = "cnf-eg", help_heading = "Connection")]
    cnf_eg: bool,

    /// Use IPv4 only when downloading remote sources
    #[arg(short = '4', conflicts_with = "ipv6", help_heading = "Connection")]
    ipv4: bool,

    /// Use IPv6 only when downloading remote sources
    #[arg(short = '6', help_heading = "Connection")]
    ipv6: bool,

    // Output
    /// Print a line for every file downloaded and uploaded
    #[arg(short, long, help_heading = "Output")]
    verbose: bool,

    /// Write log lines to FILE instead of stderr
    #[arg(long, value_name = "FILE", help_heading = "Output")]
    logfile: Option<std::path::PathBuf>,

    /// Log level (default: error)
    #[arg(long, value_enum, value_name = "LEVEL", help_heading = "Output")]
    loglevel: Option<common::LogLevel>,

    /// Source files followed by the destination domain or folder
    #[arg(value_name = "SOURCE... DESTINATION")]
    paths: Vec<String>,
}

fn usage_error(message: &str) -> ! {
    eprintln!("{message}\n\n{}", Args::command().render_help());
    std::process::exit(1);
}

fn fail(logging: &common::LoggingConfig, message: &str) -> ! {
    common::report(logging, message);
    std::process::exit(1);
}

fn ip_family(args: &Args) -> IpFamily {
    if args.ipv4 {
        IpFamily::V4
    } else if args.ipv6 {
        IpFamily::V6
    } else {
        IpFamily::Any
    }
}

fn main() {
    let argv = match hsload::args::normalize(std::env::args()) {
        Ok(argv) => argv,
        Err(error) => usage_error(&error.to_string()),
    };
    let args = match Args::try_parse_from(&argv) {
        Ok(args) => args,
        Err(error) => {
            // help and version go to stdout and are not failures
            let code = i32::from(error.use_stderr());
            if let Err(print_error) = error.print() {
                eprintln!("{print_error}");
            }
            std::process::exit(code);
        }
    };
    if args.cnf_eg {
        print!("{}", config::EXAMPLE);
        return;
    }
    let (source_tokens, destination_token) = match destination::split_positionals(&args.paths) {
        Ok(split) => split,
        Err(error) => usage_error(&error.to_string()),
    };
    let sources: Vec<SourceSpec> = source_tokens
        .iter()
        .map(|token| SourceSpec::parse(token))
        .collect();
    let destination = match destination::resolve_target(&sources, destination_token) {
        Ok(destination) => destination,
        Err(error) => usage_error(&error.to_string()),
    };
    let mode = match TransferMode::from_flags(args.nodata, args.link) {
        Ok(mode) => mode,
        Err(error) => usage_error(&error.to_string()),
    };

    let logging = common::LoggingConfig {
        level: args.loglevel.unwrap_or_default(),
        logfile: args.logfile.clone(),
    };
    if let Err(error) = common::setup_logging(&logging) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }

    let mut config = match Config::load(args.conf.as_deref()) {
        Ok(config) => config,
        Err(error) => fail(&logging, &format!("{error:#}")),
    };
    config.override_with(config::ENDPOINT, args.endpoint.as_deref());
    config.override_with(config::USERNAME, args.username.as_deref());
    config.override_with(config::PASSWORD, args.password.as_deref());
    config.override_with(config::BUCKET, args.bucket.as_deref());
    config.override_with(config::LOADER, args.loader.as_deref());
    let credentials = config.credentials();
    if credentials.endpoint.is_none() {
        fail(&logging, "No endpoint given, try -h for help");
    }
    tracing::info!("using endpoint {:?}", credentials.endpoint);

    let loader = match LoaderCommand::locate(config.get(config::LOADER)) {
        Ok(loader) => loader,
        Err(error) => fail(&logging, &error.to_string()),
    };
    let domains = match HsdsClient::new() {
        Ok(domains) => domains,
        Err(error) => fail(&logging, &format!("{error:#}")),
    };
    let settings = Settings {
        credentials: credentials.clone(),
        mode,
        write_mode: WriteMode::from_append(args.append),
        compression: args.deflate,
        verbose: args.verbose,
        fetch: FetchOptions {
            ip_family: ip_family(&args),
            verify_tls: true,
            verbose: args.verbose,
        },
    };
    let capabilities = Capabilities {
        fetcher: Some(Box::new(HttpFetcher::default())),
        object_store: hsload::objstore::default_provider(),
        domains: Box::new(domains),
        transfer: Box::new(LoaderCommand::new(loader, credentials)),
    };
    let ingest = Ingest::new(settings, capabilities);
    let res = common::run(&logging, || ingest.run(&sources, &destination));
    if res.is_none() {
        std::process::exit(1);
    }
}
