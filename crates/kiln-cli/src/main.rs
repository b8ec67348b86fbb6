use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::PathBuf;

mod commands;
mod config;
mod error;
mod io;

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "CPU code generator for kiln tensor kernels", long_about = None)]
struct Args {
    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Compile a kernel manifest to an object file
    Build {
        /// Kernel manifest
        #[arg(value_name = "FILE")]
        manifest: PathBuf,
        /// Configuration file (defaults to kiln.toml next to the manifest)
        #[arg(short, long, value_name = "CONFIG")]
        config: Option<PathBuf>,
        /// Output file (defaults to the manifest name with .o extension)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },

    /// Print the Cranelift IR of every generated function
    Dump {
        /// Kernel manifest
        #[arg(value_name = "FILE")]
        manifest: PathBuf,
        /// Configuration file (defaults to kiln.toml next to the manifest)
        #[arg(short, long, value_name = "CONFIG")]
        config: Option<PathBuf>,
        /// Only print this function
        #[arg(short, long, value_name = "NAME")]
        function: Option<String>,
    },
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new().filter_level(args.verbose.log_level_filter()).init();

    match args.command {
        Command::Build { manifest, config, output } => {
            commands::build::handle_build(&manifest, config.as_deref(), output)?
        }
        Command::Dump { manifest, config, function } => {
            commands::dump::handle_dump(&manifest, config.as_deref(), function.as_deref())?
        }
    }
    Ok(())
}
