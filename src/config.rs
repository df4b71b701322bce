//! Command-line options shared by the binaries, and logging setup.

use crate::corpus::find_json_files;
use crate::outlier::IQR_MULTIPLIER;
use log::{info, warn, LevelFilter};
use std::io;
use std::path::{Path, PathBuf};

#[derive(clap::Args, Debug, Clone)]
pub struct CorpusArgs {
    /// Root directory of the JSON transaction corpus; searched recursively
    pub root: PathBuf,
    /// Worker threads
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub jobs: usize,
    /// Also write the log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    /// Log every processed file
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(clap::Args, Debug, Clone, Copy)]
pub struct FenceArgs {
    /// Multiplier m of the upper fence Q3 + m * IQR
    #[arg(long, default_value_t = IQR_MULTIPLIER)]
    pub iqr_multiplier: f64,
}

impl CorpusArgs {
    /// Sets up logging and the worker pool, and lists the corpus files.
    pub fn init(&self) -> anyhow::Result<Vec<PathBuf>> {
        let level = if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };
        set_up_logging(level, self.log_file.as_deref())?;

        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build_global()
        {
            warn!("Worker pool already initialized: {e}");
        }

        let files = find_json_files(&self.root)?;
        info!(
            "Found {} JSON files in '{}'",
            files.len(),
            self.root.display()
        );
        Ok(files)
    }
}

pub fn set_up_logging(level: LevelFilter, file: Option<&Path>) -> anyhow::Result<()> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stdout());
    if let Some(file) = file {
        dispatch = dispatch.chain(fern::log_file(file)?);
    }
    dispatch.apply()?;
    Ok(())
}
