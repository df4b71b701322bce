//! Corpus files on disk: discovery, whole-file rewrites and the parallel
//! per-file fan-out.

use crate::record::TxFile;
use anyhow::{anyhow, Context};
use glob::{glob_with, MatchOptions};
use log::{debug, error};
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// All `*.json` files under `root`, recursively, in path order. The extension
/// is matched case-insensitively.
pub fn find_json_files(root: impl AsRef<Path>) -> anyhow::Result<Vec<PathBuf>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(anyhow!("Not a directory: {}", root.display()));
    }
    let pattern = format!(
        "{}/**/*.json",
        glob::Pattern::escape(&root.to_string_lossy())
    );
    let options = MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    let mut files = Vec::new();
    for entry in glob_with(&pattern, options)? {
        let path = entry.with_context(|| format!("Walking {}", root.display()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn read_tx_file(path: &Path) -> anyhow::Result<TxFile> {
    let bytes = fs::read(path)?;
    Ok(TxFile::parse(&bytes)?)
}

/// Replaces `path` with the serialized `file`. The content goes to a temporary
/// file in the same directory first, so a failed write leaves the old file.
pub fn write_tx_file(path: &Path, file: &TxFile) -> anyhow::Result<()> {
    let bytes = file.to_pretty_vec()?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    if let Ok(metadata) = fs::metadata(path) {
        tmp.as_file().set_permissions(metadata.permissions())?;
    }
    tmp.persist(path).map_err(|e| anyhow!(e.error))?;
    Ok(())
}

/// Loads `path`, applies `f` and writes the result back.
pub fn rewrite<R>(path: &Path, f: impl FnOnce(&mut TxFile) -> R) -> anyhow::Result<R> {
    let mut file = read_tx_file(path)?;
    let result = f(&mut file);
    write_tx_file(path, &file)?;
    Ok(result)
}

/// Per-file results of one pass over the corpus.
#[derive(Debug)]
pub struct Batch<R> {
    pub results: Vec<(PathBuf, R)>,
    pub failed: Vec<PathBuf>,
}

impl<R> Batch<R> {
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }

    pub fn total(&self) -> usize {
        self.results.len() + self.failed.len()
    }

    pub fn values(self) -> impl Iterator<Item = R> {
        self.results.into_iter().map(|x| x.1)
    }
}

/// Runs `f` on every file in parallel. A failing file is logged and counted;
/// it never stops the others.
pub fn for_each_file<R, F>(files: &[PathBuf], f: F) -> Batch<R>
where
    R: Send,
    F: Fn(&Path) -> anyhow::Result<R> + Sync,
{
    let outcomes = files
        .par_iter()
        .map(|path| {
            let result = f(path)
                .with_context(|| format!("{}", path.display()));
            match &result {
                Ok(_) => debug!("OK {}", path.display()),
                Err(e) => error!("{:#}", e),
            }
            (path.clone(), result)
        })
        .collect::<Vec<_>>();

    let mut batch = Batch {
        results: Vec::with_capacity(outcomes.len()),
        failed: Vec::new(),
    };
    for (path, result) in outcomes {
        match result {
            Ok(r) => batch.results.push((path, r)),
            Err(_) => batch.failed.push(path),
        }
    }
    batch
}
