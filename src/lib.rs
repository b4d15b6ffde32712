pub mod cascade;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod fingerprint;
pub mod grouping;
pub mod logging;
pub mod record;
pub mod scanner;
pub mod utils;

pub use cascade::{CascadeOutcome, CascadePipeline, Mode, RunStats, Stage, StageStats, run};
pub use cli::Cli;
pub use config::Settings;
pub use duplicates::{JsonReport, print_file_list, print_results, print_stats};
pub use fingerprint::{Anchor, FingerprintEngine, SMALL_FILE_THRESHOLD, chunk_size};
pub use grouping::{Buckets, group, group_by_size};
pub use record::{CandidateGroup, Digest, FileRecord};
pub use scanner::{Filters, scan_directory};
pub use utils::parse_size;
