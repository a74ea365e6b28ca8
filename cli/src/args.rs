use std::path::PathBuf;

use clap::ArgAction;
use clap::Args as Arguments;
use clap::Parser;
use clap::Subcommand;


/// A command line interface for hipkern.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
    /// Increase verbosity (can be supplied multiple times).
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbosity: u8,
}


#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the kernels of a code object.
    Kernels(Kernels),
    /// List the entries of a clang offload bundle.
    Bundle(Bundle),
}


#[derive(Debug, Arguments)]
pub struct Kernels {
    /// The path to the code object or offload bundle.
    pub path: PathBuf,
    /// A target triple prefix to accept when selecting a code object
    /// from an offload bundle (can be supplied multiple times).
    ///
    /// Defaults to HIP code objects for amdgcn.
    #[clap(short, long = "target")]
    pub targets: Vec<String>,
    /// Report kernel names as they appear in the object.
    #[clap(long)]
    pub no_demangle: bool,
}


#[derive(Debug, Arguments)]
pub struct Bundle {
    /// The path to the offload bundle.
    pub path: PathBuf,
}
