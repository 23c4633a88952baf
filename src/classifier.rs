//! Trial-file classifier
//!
//! Copies every raw trial file found under a root directory into
//! `root/by_condition/<condition>/<file name>`, where the condition is the
//! file name after the first underscore without the `.csv` suffix.
//!
//! Verify mode only writes a destination that is missing or whose size or
//! SHA-256 checksum differs from the source. Plain mode always copies.

use indicatif::ProgressBar;
use log::{debug, info};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

use crate::config::ClassifierOptions;
use crate::error::AnalysisError;

/// Checksums are computed over chunks of this size
const CHUNK_SIZE: usize = 1 << 20;

/// Plain mode logs progress after this many copies
const PROGRESS_EVERY: usize = 50;

fn trial_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^S.*_G.*_D.*_B.*_T.*\.csv$")
            .unwrap_or_else(|e| panic!("invalid trial file pattern: {e}"))
    })
}

/// Strict trial file name `S<subject>_G.._D.._B.._T...csv`
pub fn is_trial_file(name: &str) -> bool {
    trial_file_pattern().is_match(name)
}

/// Looser plain-mode match: starts with `S`, ends with `.csv` in any case, has an underscore
pub fn is_loose_trial_file(name: &str) -> bool {
    name.starts_with('S') && name.to_lowercase().ends_with(".csv") && name.contains('_')
}

/// Condition label of a trial file: the part after the first `_`, minus the extension
pub fn condition_of(name: &str) -> Option<&str> {
    let (_, rest) = name.split_once('_')?;
    let cut = rest.len().checked_sub(4)?;
    rest.get(..cut)
}

/// Counts reported by a classifier run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifySummary {
    /// Source files matched
    pub found: usize,
    /// Destinations that did not exist
    pub copied: usize,
    /// Destinations overwritten because size or checksum differed
    pub repaired: usize,
    /// Destinations left untouched
    pub unchanged: usize,
}

/// SHA-256 of a file, read in 1 MiB chunks
pub fn file_digest(path: &Path) -> Result<Vec<u8>, AnalysisError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

/// Whether `dst` already matches `src` by size and checksum
fn is_intact(src: &Path, dst: &Path) -> Result<bool, AnalysisError> {
    if !dst.exists() {
        return Ok(false);
    }
    if fs::metadata(src)?.len() != fs::metadata(dst)?.len() {
        return Ok(false);
    }
    Ok(file_digest(src)? == file_digest(dst)?)
}

/// Source files under the root, excluding the output subtree, in path order
pub fn find_sources(
    options: &ClassifierOptions,
    matches: impl Fn(&str) -> bool,
) -> Result<Vec<PathBuf>, AnalysisError> {
    if !options.root.is_dir() {
        return Err(AnalysisError::MissingInput(options.root.clone()));
    }
    let out = options.output_dir();
    let mut sources = Vec::new();
    let walker = WalkDir::new(&options.root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != out);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if matches(name) {
                sources.push(entry.into_path());
            }
        }
    }
    Ok(sources)
}

/// Destination of `src` under the output directory
fn destination(out: &Path, src: &Path) -> Option<PathBuf> {
    let name = src.file_name()?.to_str()?;
    Some(out.join(condition_of(name)?).join(name))
}

/// Verify mode: copy only what is missing or differs
pub fn classify_verify(options: &ClassifierOptions, progress: &ProgressBar) -> Result<ClassifySummary, AnalysisError> {
    let sources = find_sources(options, is_trial_file)?;
    let mut summary = ClassifySummary {
        found: sources.len(),
        ..Default::default()
    };
    if sources.is_empty() {
        info!("no trial files under {}", options.root.display());
        return Ok(summary);
    }

    let out = options.output_dir();
    progress.set_length(sources.len() as u64);
    for src in &sources {
        let Some(dst) = destination(&out, src) else {
            progress.inc(1);
            continue;
        };
        let existed = dst.exists();
        if is_intact(src, &dst)? {
            summary.unchanged += 1;
        } else {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(src, &dst)?;
            if existed {
                debug!("repaired {}", dst.display());
                summary.repaired += 1;
            } else {
                summary.copied += 1;
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();
    info!(
        "checked {} files: {} copied, {} repaired, {} unchanged",
        summary.found, summary.copied, summary.repaired, summary.unchanged
    );
    Ok(summary)
}

/// Plain mode: copy every loosely matching file, overwriting destinations
pub fn classify_plain(options: &ClassifierOptions) -> Result<ClassifySummary, AnalysisError> {
    let sources = find_sources(options, is_loose_trial_file)?;
    let out = options.output_dir();
    let mut summary = ClassifySummary {
        found: sources.len(),
        ..Default::default()
    };
    for src in &sources {
        let Some(dst) = destination(&out, src) else {
            continue;
        };
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, &dst)?;
        summary.copied += 1;
        if summary.copied % PROGRESS_EVERY == 0 {
            info!("copied {} files...", summary.copied);
        }
    }
    info!("copied {} files under {}", summary.copied, out.display());
    Ok(summary)
}
