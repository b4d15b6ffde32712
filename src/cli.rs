use clap::{ArgAction, ArgGroup, Parser};
use std::path::PathBuf;

use crate::cascade::Mode;
use crate::utils::parse_size;

#[derive(Parser, Debug)]
#[command(name = "cascade-dups", version)]
#[command(about = "Recursively scan a directory and find probable duplicate files")]
#[command(after_help = "Example: cascade-dups ~/Pictures -s 100K -e jpg,png -w --full")]
#[command(group(ArgGroup::new("mode").args(["fast", "normal", "full"])))]
pub struct Cli {
    /// Directory to scan
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Minimum file size, e.g. 64K, 1M, 2.5G (default: 3K)
    #[arg(short = 's', long, value_name = "SIZE", value_parser = size_arg)]
    pub min_size: Option<u64>,

    /// Maximum file size, e.g. 256K, 5G (default: 300M)
    #[arg(short = 'S', long, value_name = "SIZE", value_parser = size_arg)]
    pub max_size: Option<u64>,

    /// Comma-separated extensions to include, e.g. txt,csv,tar.gz
    #[arg(short, long, value_name = "EXT", value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Stop after the middle-region hash (size, front, end, middle)
    #[arg(long)]
    pub fast: bool,

    /// Add first and third quarter hashes (the default)
    #[arg(long)]
    pub normal: bool,

    /// Confirm middle-region matches with a hash of the entire file
    #[arg(long)]
    pub full: bool,

    /// Look for duplicates instead of only listing matching files
    #[arg(short = 'w', long = "find")]
    pub find: bool,

    /// Number of parallel threads for hashing (default: number of CPU cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Do not print per-stage statistics
    #[arg(long)]
    pub no_stats: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Settings file (default: ./cascade-dups.toml when present)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Mode chosen on the command line, if any.
    pub fn mode(&self) -> Option<Mode> {
        if self.fast {
            Some(Mode::Fast)
        } else if self.full {
            Some(Mode::Full)
        } else if self.normal {
            Some(Mode::Normal)
        } else {
            None
        }
    }
}

fn size_arg(value: &str) -> Result<u64, String> {
    parse_size(value).map_err(|e| e.to_string())
}
