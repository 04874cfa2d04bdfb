//! Settings read from flags and environment, validated into one descriptor per source.

use std::{path::PathBuf, time::Duration};

use clap::Args;

use crate::{
    crawl::CrawlFilter,
    error::{Error, Result},
    source::{CrawlMode, Persistence, SourceDescriptor, SourceKind},
    transcode::{CodecCommand, Transcoder},
};

const RESOLVE_RETRY: Duration = Duration::from_secs(60);
const FILE_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Root of the download tree [default: <data dir>/dwd-crawler]
    #[arg(long, env = "DOWNLOAD_DIRECTORY_BASE_PATH", global = true)]
    pub download_dir: Option<PathBuf>,

    /// Sources to poll
    #[arg(
        long = "source",
        env = "DWD_SOURCES",
        value_enum,
        value_delimiter = ',',
        default_values = ["grib", "forecasts", "reports"],
        global = true
    )]
    pub sources: Vec<SourceKind>,

    #[arg(
        long,
        env = "DWD_GRIB_BASE_URL",
        default_value = "https://opendata.dwd.de/weather/nwp/icon-d2/grib/",
        global = true
    )]
    pub grib_url: String,

    #[arg(
        long,
        env = "DWD_FORECAST_BASE_URL",
        default_value = "https://opendata.dwd.de/weather/local_forecasts/poi/",
        global = true
    )]
    pub forecast_url: String,

    #[arg(
        long,
        env = "DWD_REPORT_BASE_URL",
        default_value = "https://opendata.dwd.de/weather/weather_reports/poi/",
        global = true
    )]
    pub report_url: String,

    #[arg(
        long,
        env = "GRIB_CRAWL_RETRY_WAIT_MINUTES",
        default_value_t = 1,
        global = true
    )]
    pub grib_crawl_retry_minutes: u64,

    #[arg(
        long,
        env = "GRIB_COMPLETE_CYCLE_WAIT_MINUTES",
        default_value_t = 10,
        global = true
    )]
    pub grib_cycle_minutes: u64,

    /// Crawl retry wait for the point data sources
    #[arg(long, env = "CRAWL_RETRY_WAIT_MINUTES", default_value_t = 1, global = true)]
    pub crawl_retry_minutes: u64,

    #[arg(
        long,
        env = "FORECAST_COMPLETE_CYCLE_WAIT_MINUTES",
        default_value_t = 120,
        global = true
    )]
    pub forecast_cycle_minutes: u64,

    #[arg(
        long,
        env = "REPORT_COMPLETE_CYCLE_WAIT_MINUTES",
        default_value_t = 30,
        global = true
    )]
    pub report_cycle_minutes: u64,

    /// Decompressor, reads the path given as last argument and writes to stdout
    #[arg(long, env = "DECOMPRESS_COMMAND", default_value = "bzip2 -d -c", global = true)]
    pub decompress_command: String,

    /// Compressor, reads the path given as last argument and writes to stdout
    #[arg(long, env = "COMPRESS_COMMAND", default_value = "lz4 -c", global = true)]
    pub compress_command: String,
}

fn minutes(name: &str, value: u64) -> Result<Duration> {
    if value == 0 {
        return Err(Error::Config(format!("{name} must be at least one minute")));
    }
    value
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| Error::Config(format!("{name} of {value} minutes is too long")))
}

impl Settings {
    pub fn download_root(&self) -> Result<PathBuf> {
        let root = match &self.download_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .map(|dir| dir.join("dwd-crawler"))
                .ok_or_else(|| Error::Config("no download directory given".to_string()))?,
        };

        if root.exists() && !root.is_dir() {
            return Err(Error::Config(format!(
                "download directory {} is not a directory",
                root.display()
            )));
        }

        Ok(root)
    }

    pub fn transcoder(&self) -> Result<Transcoder> {
        Ok(Transcoder::new(
            self.decompress_command.parse()?,
            self.compress_command.parse::<CodecCommand>()?,
        ))
    }

    /// Descriptors of the enabled sources, each listed once.
    pub fn descriptors(&self) -> Result<Vec<SourceDescriptor>> {
        let mut kinds: Vec<SourceKind> = Vec::new();
        for kind in &self.sources {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        if kinds.is_empty() {
            return Err(Error::Config("no source enabled".to_string()));
        }

        kinds.into_iter().map(|kind| self.descriptor(kind)).collect()
    }

    pub fn descriptor(&self, kind: SourceKind) -> Result<SourceDescriptor> {
        let root = self.download_root()?;

        let descriptor = match kind {
            SourceKind::Grib => SourceDescriptor {
                kind,
                base_url: self.grib_url.clone(),
                crawl_mode: CrawlMode::Recursive,
                filter: CrawlFilter {
                    extension: ".grib2.bz2".to_string(),
                    require_any: vec!["single-level".to_string(), "single_level".to_string()],
                    reject: vec!["_org_".to_string()],
                    exclude: vec!["latest".to_string()],
                },
                persistence: Persistence::Transcode {
                    from: "bz2".to_string(),
                    to: "lz4".to_string(),
                },
                root,
                resolve_retry: RESOLVE_RETRY,
                crawl_retry: minutes("grib crawl retry", self.grib_crawl_retry_minutes)?,
                cycle_interval: minutes("grib cycle", self.grib_cycle_minutes)?,
                file_delay: FILE_DELAY,
            },
            SourceKind::Forecasts | SourceKind::Reports => {
                let (base_url, persistence, cycle) = if kind == SourceKind::Forecasts {
                    (
                        self.forecast_url.clone(),
                        Persistence::Direct,
                        minutes("forecast cycle", self.forecast_cycle_minutes)?,
                    )
                } else {
                    (
                        self.report_url.clone(),
                        Persistence::Merge,
                        minutes("report cycle", self.report_cycle_minutes)?,
                    )
                };

                SourceDescriptor {
                    kind,
                    base_url,
                    crawl_mode: CrawlMode::Flat,
                    filter: CrawlFilter {
                        extension: ".csv".to_string(),
                        exclude: vec!["latest".to_string()],
                        ..CrawlFilter::default()
                    },
                    persistence,
                    root,
                    resolve_retry: RESOLVE_RETRY,
                    crawl_retry: minutes("crawl retry", self.crawl_retry_minutes)?,
                    cycle_interval: cycle,
                    file_delay: FILE_DELAY,
                }
            }
        };

        if !descriptor.base_url.starts_with("http") {
            return Err(Error::Config(format!(
                "{} base URL `{}` is not an http(s) URL",
                kind, descriptor.base_url
            )));
        }

        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn settings(args: &[&str]) -> Settings {
        let mut argv = vec!["dwd-crawler", "--download-dir", "/srv/dwd"];
        argv.extend_from_slice(args);
        argv.push("run");
        Cli::try_parse_from(argv).unwrap().settings
    }

    #[test]
    fn should_build_all_sources_by_default() {
        let descriptors = settings(&[]).descriptors().unwrap();
        let kinds: Vec<SourceKind> = descriptors.iter().map(|d| d.kind).collect();

        assert_eq!(
            kinds,
            vec![SourceKind::Grib, SourceKind::Forecasts, SourceKind::Reports]
        );
        assert_eq!(descriptors[0].cycle_interval, Duration::from_secs(600));
        assert_eq!(descriptors[0].crawl_mode, CrawlMode::Recursive);
        assert_eq!(descriptors[2].persistence, Persistence::Merge);
        assert!(descriptors
            .iter()
            .all(|d| d.root == PathBuf::from("/srv/dwd")));
    }

    #[test]
    fn should_enable_selected_sources_once() {
        let descriptors = settings(&["--source", "reports,reports,grib"])
            .descriptors()
            .unwrap();
        let kinds: Vec<SourceKind> = descriptors.iter().map(|d| d.kind).collect();

        assert_eq!(kinds, vec![SourceKind::Reports, SourceKind::Grib]);
    }

    #[test]
    fn should_reject_zero_cycle() {
        let err = settings(&["--report-cycle-minutes", "0"])
            .descriptor(SourceKind::Reports)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn should_reject_overflowing_minutes() {
        let max = u64::MAX.to_string();
        let err = settings(&["--grib-cycle-minutes", max.as_str()])
            .descriptor(SourceKind::Grib)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(minutes("cycle", 2).unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn should_parse_codec_commands() {
        let transcoder = settings(&["--compress-command", "zstd -q -c"])
            .transcoder()
            .unwrap();
        assert_eq!(transcoder.decompress.program, "bzip2");
        assert_eq!(transcoder.compress.args, vec!["-q", "-c"]);
    }
}
