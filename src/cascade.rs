use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize, Serializer};

use crate::fingerprint::{Anchor, FingerprintEngine};
use crate::grouping::{self, Buckets};
use crate::record::{CandidateGroup, Digest, FileRecord};

/// How far the cascade goes past the MIDDLE stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Stops at MIDDLE.
    Fast,
    /// Continues with FIRST_QUARTER and, unless it separated nothing,
    /// THIRD_QUARTER.
    #[default]
    Normal,
    /// Confirms MIDDLE survivors with a whole-file digest.
    Full,
}

impl Mode {
    /// Fixed transition table. `None` marks the terminal stage.
    pub fn next_stage(self, stage: Stage) -> Option<Stage> {
        match (self, stage) {
            (_, Stage::Size) => Some(Stage::Partial),
            (_, Stage::Partial) => Some(Stage::End),
            (_, Stage::End) => Some(Stage::Middle),
            (Mode::Fast, Stage::Middle) => None,
            (Mode::Normal, Stage::Middle) => Some(Stage::FirstQuarter),
            (Mode::Normal, Stage::FirstQuarter) => Some(Stage::ThirdQuarter),
            (Mode::Full, Stage::Middle) => Some(Stage::Full),
            _ => None,
        }
    }

    /// Stage after which the cascade ends early if bucketing produced no
    /// singletons.
    pub fn short_circuit_stage(self) -> Option<Stage> {
        match self {
            Mode::Normal => Some(Stage::FirstQuarter),
            Mode::Fast | Mode::Full => None,
        }
    }

    /// Every stage the mode can run, in order.
    pub fn stages(self) -> Vec<Stage> {
        let mut stages = vec![Stage::Size];
        let mut current = Stage::Size;
        while let Some(next) = self.next_stage(current) {
            stages.push(next);
            current = next;
        }
        stages
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Fast => "fast",
            Mode::Normal => "normal",
            Mode::Full => "full",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Size,
    Partial,
    End,
    Middle,
    FirstQuarter,
    ThirdQuarter,
    Full,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Size,
        Stage::Partial,
        Stage::End,
        Stage::Middle,
        Stage::FirstQuarter,
        Stage::ThirdQuarter,
        Stage::Full,
    ];

    /// Region sampled by this stage. `None` for SIZE (no I/O) and FULL
    /// (whole file).
    pub fn anchor(self) -> Option<Anchor> {
        match self {
            Stage::Partial => Some(Anchor::Front),
            Stage::End => Some(Anchor::End),
            Stage::Middle => Some(Anchor::Middle),
            Stage::FirstQuarter => Some(Anchor::FirstQuarter),
            Stage::ThirdQuarter => Some(Anchor::ThirdQuarter),
            Stage::Size | Stage::Full => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Size => "Size groups",
            Stage::Partial => "Front hash groups",
            Stage::End => "End hash groups",
            Stage::Middle => "Middle hash groups",
            Stage::FirstQuarter => "First quarter hash groups",
            Stage::ThirdQuarter => "Third quarter hash groups",
            Stage::Full => "Whole file hash groups",
        }
    }
}

fn serialize_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// Totals for one stage over a whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct StageStats {
    /// Buckets with at least two members.
    pub group_count: usize,
    /// Files in those buckets.
    pub file_count: usize,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl StageStats {
    fn add(&mut self, other: &StageStats) {
        self.group_count += other.group_count;
        self.file_count += other.file_count;
        self.elapsed += other.elapsed;
    }
}

/// Per-stage statistics; every stage is present even if it never ran.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RunStats {
    stages: BTreeMap<Stage, StageStats>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            stages: Stage::ALL
                .into_iter()
                .map(|stage| (stage, StageStats::default()))
                .collect(),
        }
    }
}

impl RunStats {
    pub fn get(&self, stage: Stage) -> StageStats {
        self.stages.get(&stage).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, &StageStats)> {
        self.stages.iter().map(|(stage, stats)| (*stage, stats))
    }

    fn record<K, T>(&mut self, stage: Stage, buckets: &Buckets<K, T>, elapsed: Duration)
    where
        K: Eq + std::hash::Hash + Clone,
    {
        let entry = self.stages.entry(stage).or_default();
        for (_, items) in buckets.iter().filter(|(_, items)| items.len() >= 2) {
            entry.group_count += 1;
            entry.file_count += items.len();
        }
        entry.elapsed += elapsed;
    }

    fn merge(&mut self, other: &RunStats) {
        for (stage, stats) in other.iter() {
            self.stages.entry(stage).or_default().add(stats);
        }
    }
}

/// Result of one cascade run.
#[derive(Debug)]
pub struct CascadeOutcome {
    pub groups: Vec<CandidateGroup>,
    /// Present when statistics were requested.
    pub stats: Option<RunStats>,
    /// Wall-clock duration of the run, present with `stats`.
    pub total_elapsed: Option<Duration>,
}

/// Runs the staged grouping over a catalog of files.
///
/// Size buckets are independent and are fingerprinted in parallel on a
/// dedicated pool; the pool size caps how many files are open at once.
#[derive(Debug, Default)]
pub struct CascadePipeline {
    mode: Mode,
    threads: Option<usize>,
    engine: FingerprintEngine,
}

impl CascadePipeline {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            threads: None,
            engine: FingerprintEngine::new(),
        }
    }

    /// Limits the number of worker threads; `1` processes size buckets
    /// sequentially.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn engine(&self) -> &FingerprintEngine {
        &self.engine
    }

    pub fn run(&self, records: &[FileRecord], collect_stats: bool) -> Result<CascadeOutcome> {
        let started = Instant::now();
        info!(
            "Looking for duplicates among {} files ({} mode)",
            records.len(),
            self.mode
        );

        let mut stats = collect_stats.then(RunStats::default);
        let timer = Instant::now();
        let size_buckets = grouping::group_by_size(records.iter().filter(|record| record.size > 0));
        if let Some(stats) = stats.as_mut() {
            stats.record(Stage::Size, &size_buckets, timer.elapsed());
        }
        let candidates = size_buckets.into_candidates();
        debug!("{} size groups with more than one file", candidates.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads.unwrap_or(0))
            .build()
            .context("Failed to build fingerprinting thread pool")?;
        let branches: Vec<Branch> = pool.install(|| {
            candidates
                .into_par_iter()
                .map(|(size, files)| {
                    let mut branch = Branch::new(self, size, collect_stats);
                    if let Some(next) = self.mode.next_stage(Stage::Size) {
                        branch.descend(next, files);
                    }
                    branch
                })
                .collect()
        });

        let mut groups = Vec::new();
        for branch in branches {
            if let (Some(total), Some(partial)) = (stats.as_mut(), branch.stats.as_ref()) {
                total.merge(partial);
            }
            groups.extend(branch.groups);
        }

        info!(
            "Found {} candidate groups ({} reads, {} bytes hashed)",
            groups.len(),
            self.engine.reads(),
            self.engine.bytes_read()
        );
        let total_elapsed = collect_stats.then(|| started.elapsed());
        Ok(CascadeOutcome {
            groups,
            stats,
            total_elapsed,
        })
    }

    fn fingerprint(&self, stage: Stage, record: &FileRecord) -> Result<Option<Digest>> {
        let digest = match stage.anchor() {
            Some(anchor) => self.engine.digest_region(record, anchor)?,
            None => self.engine.digest_whole(record)?,
        };
        Ok(Some(digest))
    }
}

/// Runs `records` through the cascade for `mode` on a default pipeline.
pub fn run(records: &[FileRecord], mode: Mode, collect_stats: bool) -> Result<CascadeOutcome> {
    CascadePipeline::new(mode).run(records, collect_stats)
}

/// Work and results for a single size bucket.
struct Branch<'p> {
    pipeline: &'p CascadePipeline,
    size: u64,
    stats: Option<RunStats>,
    groups: Vec<CandidateGroup>,
}

impl<'p> Branch<'p> {
    fn new(pipeline: &'p CascadePipeline, size: u64, collect_stats: bool) -> Self {
        Self {
            pipeline,
            size,
            stats: collect_stats.then(RunStats::default),
            groups: Vec::new(),
        }
    }

    fn descend(&mut self, stage: Stage, files: Vec<&FileRecord>) {
        let timer = Instant::now();
        let mut buckets =
            grouping::group(files, |record| self.pipeline.fingerprint(stage, record));
        if let Some(stats) = self.stats.as_mut() {
            stats.record(stage, &buckets, timer.elapsed());
        }

        let before = (buckets.len(), buckets.file_count());
        buckets.retain_candidates();
        let after = (buckets.len(), buckets.file_count());

        let mode = self.pipeline.mode;
        let next = if mode.short_circuit_stage() == Some(stage) && before == after {
            debug!(
                "{:?} produced no singletons for size {}, skipping {:?}",
                stage,
                self.size,
                mode.next_stage(stage)
            );
            None
        } else {
            mode.next_stage(stage)
        };

        for (_, bucket) in buckets {
            match next {
                Some(next) => self.descend(next, bucket),
                None => self.emit(bucket),
            }
        }
    }

    fn emit(&mut self, files: Vec<&FileRecord>) {
        self.groups.push(CandidateGroup {
            size: self.size,
            files: files.iter().map(|record| record.path.clone()).collect(),
        });
    }
}
