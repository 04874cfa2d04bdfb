//! Per-source configuration, fixed for the lifetime of an orchestrator.

use std::{fmt, path::PathBuf, time::Duration};

use clap::ValueEnum;

use crate::crawl::CrawlFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum SourceKind {
    /// Gridded model output (bzip2 compressed GRIB2)
    Grib,
    /// MOSMIX point forecasts (CSV)
    Forecasts,
    /// Station weather reports (CSV)
    Reports,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Grib => "grib",
            SourceKind::Forecasts => "forecasts",
            SourceKind::Reports => "reports",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    Flat,
    Recursive,
}

/// How a downloaded file ends up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    /// Stored verbatim, never overwritten.
    Direct,
    /// Merged into one table per calendar date.
    Merge,
    /// Re-encoded from one archive codec to another by external commands.
    Transcode { from: String, to: String },
}

#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub base_url: String,
    pub crawl_mode: CrawlMode,
    pub filter: CrawlFilter,
    pub persistence: Persistence,
    /// Root of the download tree; each source writes below its own subtree.
    pub root: PathBuf,
    pub resolve_retry: Duration,
    pub crawl_retry: Duration,
    pub cycle_interval: Duration,
    pub file_delay: Duration,
}
