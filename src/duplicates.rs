use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use indicatif::{HumanBytes, HumanCount};
use log::info;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::cascade::{CascadeOutcome, Mode, RunStats};
use crate::record::{CandidateGroup, FileRecord, serialize_lossy_path};

fn relative<'a>(path: &'a Path, base_path: &Path) -> &'a Path {
    path.strip_prefix(base_path).unwrap_or(path)
}

/// Lists the files the catalog admitted, largest first.
pub fn print_file_list(files: &[FileRecord], base_path: &Path) {
    if files.is_empty() {
        println!("{}", "No files found matching criteria".yellow());
        return;
    }
    for file in files {
        println!(
            "{:>10}  {}",
            HumanBytes(file.size).to_string(),
            relative(&file.path, base_path).display()
        );
    }
    let total: u64 = files.iter().map(|file| file.size).sum();
    println!(
        "\n{} files, {}",
        HumanCount(files.len() as u64),
        HumanBytes(total)
    );
}

pub fn print_results(groups: &[CandidateGroup], base_path: &Path) {
    if groups.is_empty() {
        println!("{}", "No duplicates found".green());
        return;
    }

    let total_duplicates: usize = groups.iter().map(|group| group.files.len() - 1).sum();
    let total_wasted_space: u64 = groups.iter().map(CandidateGroup::wasted_bytes).sum();

    println!(
        "{}",
        format!("Found {} group(s) of probable duplicates:", groups.len()).green()
    );
    for (idx, group) in groups.iter().enumerate() {
        println!(
            "\n{} {} ({} files)",
            format!("Group {}", idx + 1).bold(),
            HumanBytes(group.size),
            group.files.len()
        );
        for path in &group.files {
            println!("  {}", relative(path, base_path).display());
        }
    }

    info!(
        "{} probable duplicate files wasting {} of space",
        HumanCount(total_duplicates as u64),
        HumanBytes(total_wasted_space)
    );
}

/// One line per stage that produced groups or took measurable time.
fn stats_lines(stats: &RunStats) -> Vec<String> {
    stats
        .iter()
        .filter(|(_, data)| data.group_count > 0 || !data.elapsed.is_zero())
        .map(|(stage, data)| {
            format!(
                "{}: {} (Total files: {}) / Time: {:.3}s",
                stage.label(),
                HumanCount(data.group_count as u64),
                HumanCount(data.file_count as u64),
                data.elapsed.as_secs_f64()
            )
        })
        .collect()
}

pub fn print_stats(stats: &RunStats, total_elapsed: Duration) {
    println!("\n{}", "Statistics:".bold());
    for line in stats_lines(stats) {
        println!("{line}");
    }
    println!(
        "\nTotal execution time: {:.3}s",
        total_elapsed.as_secs_f64()
    );
}

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub generated_at: String,
    #[serde(serialize_with = "serialize_lossy_path")]
    pub root: &'a Path,
    pub mode: Mode,
    pub groups: &'a [CandidateGroup],
    pub wasted_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<&'a RunStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_elapsed_secs: Option<f64>,
}

impl<'a> JsonReport<'a> {
    pub fn new(root: &'a Path, mode: Mode, outcome: &'a CascadeOutcome) -> Result<Self> {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Ok(Self {
            generated_at: now.format(&Rfc3339)?,
            root,
            mode,
            groups: &outcome.groups,
            wasted_bytes: outcome.groups.iter().map(CandidateGroup::wasted_bytes).sum(),
            stats: outcome.stats.as_ref(),
            total_elapsed_secs: outcome.total_elapsed.map(|elapsed| elapsed.as_secs_f64()),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
