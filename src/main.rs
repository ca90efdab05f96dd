use anyhow::Result;
use clap::Parser;
use modman::commands::{self, Project};
use std::path::PathBuf;

/// modman - module lifecycle manager
///
/// Registers the modules listed in the project's lock file, resolves their
/// dependencies and runs their installers.
///
/// Examples:
///   modman sync                 # Bring the registry in line with the lock file
///   modman install acme/blog    # Install acme/blog and its dependencies
#[derive(Parser, Debug)]
#[command(author, version = env!("MODMAN_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root directory (defaults to the current directory; also via MODMAN_ROOT)
    #[arg(
        long = "root",
        short = 'r',
        env = "MODMAN_ROOT",
        value_name = "PATH",
        global = true
    )]
    pub root: Option<PathBuf>,

    /// Additional global metadata source, a path or an http(s) URL
    #[arg(
        long = "metadata-source",
        env = "MODMAN_METADATA_SOURCES",
        value_name = "SOURCE",
        value_delimiter = ',',
        global = true
    )]
    pub metadata_sources: Vec<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// List the available packages with their status and version
    List,

    /// Install a package and the dependencies it is missing
    Install(PackageArgs),

    /// Uninstall a package and the installed packages depending on it
    Uninstall(PackageArgs),

    /// Register, install and remove packages to match the lock file
    Sync,
}

#[derive(clap::Args, Debug)]
pub struct PackageArgs {
    /// Package name in the format "vendor/name"
    #[arg(value_name = "VENDOR/NAME")]
    pub package: String,

    /// Apply multi-package plans without asking
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = modman::runtime::RealRuntime;

    let project = Project::load(&runtime, cli.root, cli.metadata_sources).await?;
    let mut manager = project.open(&runtime)?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::List => commands::list(&mut manager, &mut out)?,
        Commands::Install(args) => commands::install(&mut manager, &args.package, args.yes, &mut out)?,
        Commands::Uninstall(args) => {
            commands::uninstall(&mut manager, &args.package, args.yes, &mut out)?
        }
        Commands::Sync => commands::sync(&mut manager, &mut out)?,
    }
    Ok(())
}
