use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "punito",
    version,
    about = "Slice Java classes per public method and generate JUnit/Mockito tests with an LLM",
    after_help = "Settings are read from punito.toml in the current directory unless --config \
                  is given. Run 'punito init' to write one with every default spelled out."
)]
pub struct Cli {
    /// Config file (default: ./punito.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a Mockito test class for a Java class.
    ///
    /// Every public method is sliced into dependency bundles, each bundle runs
    /// through the configured LLM stages, and the results are merged into
    /// `<output_dir>/<version>/<timestamp>/<Class>/<Class><suffix>.java`.
    Generate {
        /// Java source file
        file: PathBuf,
    },

    /// Print the per-method dependency bundles of one or more classes
    Chunk {
        /// Java source files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Indented text listing instead of JSON
        #[arg(long)]
        text: bool,
    },

    /// Print a method with every method it transitively calls
    Context {
        /// Java source file
        file: PathBuf,
        /// Method name
        method: String,
    },

    /// Merge the fragments of a previous run into one test class
    Merge {
        /// Run or class directory (default: latest run of this version)
        dir: Option<PathBuf>,
        /// Class to merge when the run holds several
        #[arg(long)]
        class: Option<String>,
        /// Output file (default: the class file inside the class directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Remove structurally duplicate tests from a test class
    Dedupe {
        /// Java test file
        file: PathBuf,
        /// Rewrite the file instead of printing the result
        #[arg(long)]
        in_place: bool,
    },

    /// Write a punito.toml with the default settings
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}
