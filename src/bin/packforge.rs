//! Packforge CLI
//!
//! Build mode (default): reads <dir>/package.json and writes one .deb per
//! architecture into the output directory.
//! Create mode (-c NAME): scaffolds a package.json, with a service stub under -s.

use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::fmt;

use packforge::{Descriptor, HostFacts, Project, Service, Toolchain};

#[derive(Parser, Debug)]
#[command(name = "packforge")]
#[command(about = "Packforge - build Debian packages from package.json")]
struct Cli {
    /// Directory with package.json
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Create package instead of build
    #[arg(short, long)]
    create: bool,

    /// Create a service stub (for -c)
    #[arg(short, long, requires = "create")]
    service: bool,

    /// Package name as group-name, or name (for -c)
    name: Option<String>,

    /// Compiler program
    #[arg(long, default_value = "go")]
    compiler: String,

    /// Packager program
    #[arg(long, default_value = "dpkg-deb")]
    packager: String,

    /// Version-control program used for release notes
    #[arg(long, default_value = "git")]
    git: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    fmt()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .init();

    let result = if cli.create {
        create(&cli)
    } else {
        build(&cli)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn create(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let packet = cli.name.as_deref().ok_or("Requires package name")?;
    let author = HostFacts::detect()
        .user
        .ok_or("current user cannot be determined")?;

    let mut descriptor = Descriptor::scaffold(packet, &author);
    if cli.service {
        descriptor.service = Some(Service::stub());
    }
    descriptor.save(&cli.dir)?;
    info!("Created {}", cli.dir.join(packforge::PROJECT_PACKAGE_FILE).display());
    Ok(())
}

fn build(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    info!("Building");
    let tools = Toolchain::with_programs(&cli.compiler, &cli.packager, &cli.git);
    let mut project = Project::open(&cli.dir)?;
    let built = project.make(&cli.output, &tools)?;
    for package in &built {
        println!("{}", serde_json::to_string(package)?);
    }
    info!("Done");
    Ok(())
}
