//! mapotf cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; mapotf ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply the transforms of a configuration to terraform files
    ///
    /// Original files are backed up as `<file>.mptfbackup`, see `reset`.
    Transform(TransformCommand),

    /// Restore all files from their backups and delete the backups
    Reset(ResetCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct TerraformArgs {
    /// Directory of the terraform module
    #[clap(long = "tf-dir", default_value = ".")]
    pub tf_dir: PathBuf,
}

#[derive(Parser, Debug)]
pub struct MptfArgs {
    /// Directory with the `*.mptf.hcl` configuration
    #[clap(long = "mptf-dir", env = "MPTF_DIR")]
    pub mptf_dir: PathBuf,
}

#[derive(Parser, Debug)]
pub struct TransformCommand {
    #[clap(flatten)]
    pub terraform: TerraformArgs,

    #[clap(flatten)]
    pub mptf: MptfArgs,

    /// Also transform the local modules listed in `.terraform/modules/modules.json`
    #[clap(short = 'r', long = "recursive")]
    pub recursive: bool,
}

#[derive(Parser, Debug)]
pub struct ResetCommand {
    #[clap(flatten)]
    pub terraform: TerraformArgs,

    /// Also reset the local modules listed in `.terraform/modules/modules.json`
    #[clap(short = 'r', long = "recursive")]
    pub recursive: bool,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Values of all terraform blocks as the configuration sees them
    Blocks {
        #[clap(flatten)]
        terraform: TerraformArgs,
        #[clap(flatten)]
        output: OutputArgs,
    },
    /// Declarations in the order they would run
    Order {
        #[clap(flatten)]
        mptf: MptfArgs,
    },
}
