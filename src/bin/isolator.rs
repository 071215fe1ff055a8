//! isolator - container runtime CLI
//!
//! ```sh
//! isolator pull [image]                          # materialize a rootfs
//! isolator run [--gpu] [--gui] <rootfs> <cmd>…   # run a command inside it
//! isolator build <dir>                           # build a recipe (Isofile)
//! isolator exec <name>                           # run a configured command
//! isolator list / rm <rootfs> / config
//! ```
//!
//! The hidden `child` subcommand is the re-execution entry point for the
//! in-container init phase; it is spawned by `run` via `/proc/self/exe`
//! and is not meant to be invoked by users.

use clap::{Parser, Subcommand};
use isolator::constants::DEFAULT_IMAGE;
use isolator::{Builder, ChildConfig, Config, Launcher, Materializer, RootfsStore, RunConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Lightweight container tool: less isolation than a full runtime, in
/// exchange for running entirely without privileges.
#[derive(Parser)]
#[command(
    name = "isolator",
    version,
    about = "Run commands in lightweight namespace containers",
    long_about = "Isolator materializes root filesystems from OCI images (via podman)\n\
                  and runs commands inside them under fresh Linux namespaces.\n\
                  GPU and GUI applications are supported out of the box."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull an image and extract its rootfs
    Pull {
        /// Image reference (defaults to the Wolfi base image)
        image: Option<String>,
    },

    /// Build a derived rootfs from a recipe directory (Isofile)
    Build {
        /// Directory containing the recipe file
        dir: PathBuf,
    },

    /// Run a command in a container
    Run {
        /// Enable GPU support
        #[arg(long)]
        gpu: bool,

        /// Enable GUI support
        #[arg(long)]
        gui: bool,

        /// Rootfs name (as shown by `list`)
        rootfs: String,

        /// Command and arguments to run inside the container
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run a custom command defined in the configuration
    Exec {
        /// Name of the configured command
        name: String,
    },

    /// List available rootfs
    List,

    /// Remove a rootfs
    Rm {
        /// Rootfs name
        rootfs: String,
    },

    /// Print the effective configuration
    Config,

    /// Internal container init entry point (spawned via /proc/self/exe)
    #[command(hide = true)]
    Child {
        /// Absolute rootfs path
        rootfs: PathBuf,

        #[arg(long)]
        gpu: bool,

        #[arg(long)]
        gui: bool,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("isolator=info")),
        )
        .with_target(false)
        .without_time()
        .init();

    match run(Cli::parse()) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            eprintln!("isolator: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatches a parsed command, returning the process exit code.
fn run(cli: Cli) -> isolator::Result<i32> {
    let store = RootfsStore::new();

    match cli.command {
        Commands::Pull { image } => {
            let image = image.unwrap_or_else(|| DEFAULT_IMAGE.to_string());
            let slug = Materializer::new(store).materialize(&image)?;
            println!("{slug}");
            Ok(0)
        }

        Commands::Build { dir } => {
            let slug = Builder::new(store).build(&dir)?;
            println!("{slug}");
            Ok(0)
        }

        Commands::Run {
            gpu,
            gui,
            rootfs,
            command,
        } => {
            let config = Config::load()?;
            let mut run_cfg = RunConfig {
                rootfs,
                command,
                gpu,
                gui,
            };
            config.apply(&mut run_cfg);
            Launcher::new(store).launch(&run_cfg)
        }

        Commands::Exec { name } => {
            let config = Config::load()?;
            let run_cfg = config.resolve_custom(&name)?;
            Launcher::new(store).launch(&run_cfg)
        }

        Commands::List => {
            for name in store.list()? {
                println!("{name}");
            }
            Ok(0)
        }

        Commands::Rm { rootfs } => {
            store.remove(&rootfs)?;
            Ok(0)
        }

        Commands::Config => {
            let config = Config::load()?;
            print!("{}", config.to_toml()?);
            Ok(0)
        }

        Commands::Child {
            rootfs,
            gpu,
            gui,
            command,
        } => {
            let cfg = ChildConfig {
                rootfs,
                gpu,
                gui,
                command,
            };
            // Only returns on error; on success the user command has
            // replaced this process.
            match isolator::child::run(&cfg) {
                Ok(never) => match never {},
                Err(e) => Err(e),
            }
        }
    }
}
