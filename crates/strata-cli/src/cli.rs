use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use strata_store::IndexKind;

#[derive(Parser)]
#[command(
    name = "strata",
    about = "Append-only versioned object store with persistent hash-trie indices",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with store settings
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum IndexArg {
    Write,
    Digest,
    Name,
}

impl From<IndexArg> for IndexKind {
    fn from(arg: IndexArg) -> Self {
        match arg {
            IndexArg::Write => IndexKind::Write,
            IndexArg::Digest => IndexKind::Digest,
            IndexArg::Name => IndexKind::Name,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty store
    Init(InitArgs),
    /// Add keys to the store's indices and commit a new revision
    Write(WriteArgs),
    /// Print the value stored for a key
    Read(ReadArgs),
    /// List the contents of an index
    List(ListArgs),
    /// Show keys written between two revisions
    Diff(DiffArgs),
    /// Dump an index trie in Graphviz DOT
    Structure(StructureArgs),
    /// Show the revision history
    Log(LogArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub db: PathBuf,
}

#[derive(Args)]
pub struct WriteArgs {
    pub db: PathBuf,
    /// Store VALUE under KEY in the write index
    #[arg(long = "add", value_name = "KEY=VALUE")]
    pub add: Vec<String>,
    /// Store the contents of PATH under KEY in the write index
    #[arg(long = "add-file", value_name = "KEY=PATH")]
    pub add_file: Vec<String>,
    /// Add NAME to the name index
    #[arg(long = "add-name", value_name = "NAME")]
    pub add_name: Vec<String>,
    /// Store VALUE under a 128-bit hex digest in the digest index
    #[arg(long = "add-digest", value_name = "HEX=VALUE")]
    pub add_digest: Vec<String>,
}

#[derive(Args)]
pub struct ReadArgs {
    pub db: PathBuf,
    pub key: String,
    #[arg(long, default_value = "write")]
    pub index: IndexArg,
    #[arg(short, long)]
    pub revision: Option<u32>,
}

#[derive(Args)]
pub struct ListArgs {
    pub db: PathBuf,
    #[arg(long, default_value = "write")]
    pub index: IndexArg,
    #[arg(short, long)]
    pub revision: Option<u32>,
}

#[derive(Args)]
pub struct DiffArgs {
    pub db: PathBuf,
    /// Newer revision (default: current)
    pub new: Option<u32>,
    /// Older revision (default: the one before NEW)
    pub old: Option<u32>,
}

#[derive(Args)]
pub struct StructureArgs {
    pub db: PathBuf,
    #[arg(long, default_value = "write")]
    pub index: IndexArg,
    #[arg(short, long)]
    pub revision: Option<u32>,
}

#[derive(Args)]
pub struct LogArgs {
    pub db: PathBuf,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}
