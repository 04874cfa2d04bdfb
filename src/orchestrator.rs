//! The poll loop of one data source: resolve, crawl, download, sleep, repeat.

use std::time::Duration;

use indicatif::ProgressBar;
use tracing::{error, info, warn};

use crate::{
    crawl,
    csv_table::CsvTable,
    download::{resolve_endpoint, Fetch, HttpFetcher},
    error::{Error, Result},
    routing::{self, Routed},
    source::{Persistence, SourceDescriptor},
    store,
    transcode::Transcoder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ResolvingEndpoint,
    Crawling,
    Downloading,
    Sleeping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Written,
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub discovered: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Orchestrator {
    source: SourceDescriptor,
    transcoder: Transcoder,
}

impl Orchestrator {
    pub fn new(source: SourceDescriptor, transcoder: Transcoder) -> Self {
        Orchestrator { source, transcoder }
    }

    pub fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    /// Runs cycles until a write to the download tree fails.
    pub async fn run(&self) -> Result<()> {
        loop {
            let fetcher = self.resolve().await;
            let summary = self.run_cycle(&fetcher, None).await?;
            info!(
                phase = ?Phase::Sleeping,
                written = summary.written,
                skipped = summary.skipped,
                failed = summary.failed,
                "cycle finished, next one in {} minutes",
                self.source.cycle_interval.as_secs() / 60
            );
            tokio::time::sleep(self.source.cycle_interval).await;
        }
    }

    /// Pins the source's host to one address for the coming cycle.
    pub async fn resolve(&self) -> HttpFetcher {
        loop {
            let attempt = resolve_endpoint(&self.source.base_url)
                .await
                .and_then(|endpoint| {
                    info!(
                        phase = ?Phase::ResolvingEndpoint,
                        host = %endpoint.host,
                        addr = %endpoint.addr,
                        "resolved"
                    );
                    HttpFetcher::new(Some(&endpoint))
                });

            match attempt {
                Ok(fetcher) => return fetcher,
                Err(e) => {
                    warn!(phase = ?Phase::ResolvingEndpoint, error = %e, "resolution failed");
                    tokio::time::sleep(self.source.resolve_retry).await;
                }
            }
        }
    }

    /// One crawl and download pass without the trailing sleep.
    pub async fn run_cycle(
        &self,
        fetcher: &dyn Fetch,
        progress: Option<&ProgressBar>,
    ) -> Result<CycleSummary> {
        let urls = self.crawl_until_success(fetcher).await;
        if let Some(bar) = progress {
            bar.set_length(urls.len() as u64);
        }
        self.download_all(fetcher, &urls, progress).await
    }

    /// Crawls until it works. There is no cap: without a listing the source goes stale.
    pub async fn crawl_until_success(&self, fetcher: &dyn Fetch) -> Vec<String> {
        loop {
            info!(phase = ?Phase::Crawling, url = %self.source.base_url, "crawling");
            match crawl::crawl(fetcher, &self.source).await {
                Ok(urls) => {
                    info!(phase = ?Phase::Crawling, files = urls.len(), "crawl finished");
                    return urls;
                }
                Err(e) => {
                    error!(phase = ?Phase::Crawling, error = %e, "crawl failed");
                    info!(
                        "retrying crawl in {} seconds",
                        self.source.crawl_retry.as_secs()
                    );
                    tokio::time::sleep(self.source.crawl_retry).await;
                }
            }
        }
    }

    /// Handles each file in crawl order. Only fatal errors end the pass early.
    pub async fn download_all(
        &self,
        fetcher: &dyn Fetch,
        urls: &[String],
        progress: Option<&ProgressBar>,
    ) -> Result<CycleSummary> {
        let mut summary = CycleSummary {
            discovered: urls.len(),
            ..CycleSummary::default()
        };

        for (i, url) in urls.iter().enumerate() {
            if self.source.file_delay > Duration::ZERO {
                tokio::time::sleep(self.source.file_delay).await;
            }
            if i % 100 == 0 {
                info!(phase = ?Phase::Downloading, url = %url, "handling file {} of {}", i + 1, urls.len());
            }

            match self.process_file(fetcher, url).await {
                Ok(Outcome::Written) => summary.written += 1,
                Ok(Outcome::Skipped) => summary.skipped += 1,
                Err(e) if e.is_fatal() => {
                    error!(url = %url, error = %e, "cannot write to download directory");
                    return Err(e);
                }
                Err(e @ Error::IncompatibleHeader(_)) => {
                    error!(url = %url, error = %e, "table left unmerged, needs manual inspection");
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "skipping file");
                    summary.failed += 1;
                }
            }

            if let Some(bar) = progress {
                bar.inc(1);
            }
        }

        Ok(summary)
    }

    pub async fn process_file(&self, fetcher: &dyn Fetch, url: &str) -> Result<Outcome> {
        let routed = routing::route(url, &self.source)?;

        match &self.source.persistence {
            Persistence::Transcode { from, .. } => {
                self.store_transcoded(fetcher, url, &routed, from).await
            }
            Persistence::Direct => self.store_direct(fetcher, url, &routed).await,
            Persistence::Merge => self.store_merged(fetcher, url, &routed).await,
        }
    }

    async fn store_transcoded(
        &self,
        fetcher: &dyn Fetch,
        url: &str,
        routed: &Routed,
        from: &str,
    ) -> Result<Outcome> {
        let Some(path) = routed.target.fixed_path() else {
            return Err(Error::routing(url, "archive target depends on content"));
        };
        if path.exists() {
            return Ok(Outcome::Skipped);
        }

        let content = fetcher.fetch(url).await?;
        self.transcoder.transcode(&content, from, path).await?;

        Ok(Outcome::Written)
    }

    // Forecast tables are filed under the date of their first row and never rewritten.
    async fn store_direct(
        &self,
        fetcher: &dyn Fetch,
        url: &str,
        routed: &Routed,
    ) -> Result<Outcome> {
        if let Some(path) = routed.target.fixed_path() {
            if path.exists() {
                return Ok(Outcome::Skipped);
            }
        }

        let content = fetcher.fetch(url).await?;
        let table = CsvTable::parse(&String::from_utf8_lossy(&content));
        let date = table
            .first_data_date()
            .ok_or_else(|| Error::routing(url, "table has no dated first row"))?;

        let path = routed.target.path_for(date);
        if path.exists() {
            return Ok(Outcome::Skipped);
        }

        store::write_atomic(&path, &content)?;
        Ok(Outcome::Written)
    }

    // Report tables span several dates; each date's rows go into that date's partition.
    async fn store_merged(
        &self,
        fetcher: &dyn Fetch,
        url: &str,
        routed: &Routed,
    ) -> Result<Outcome> {
        let content = fetcher.fetch(url).await?;
        let incoming = CsvTable::parse(&String::from_utf8_lossy(&content));

        let dates = incoming.data_dates();
        if dates.is_empty() {
            return Err(Error::routing(url, "table has no dated rows"));
        }

        // A partition with a different stored header is left alone; the others still merge.
        let mut outcome = Outcome::Skipped;
        let mut merged_any = false;
        let mut rejected = None;
        for (date_key, date) in dates {
            let path = routed.target.path_for(date);
            let existing = store::read_existing(&path)?;

            let base = match &existing {
                Some(text) => CsvTable::parse(text),
                None => incoming.clone(),
            };
            let merged = match base.merge(&incoming, &date_key) {
                Ok(table) => table.serialize(),
                Err(e @ Error::IncompatibleHeader(_)) => {
                    error!(
                        url = %url,
                        path = %path.display(),
                        error = %e,
                        "partition left unmerged, needs manual inspection"
                    );
                    rejected = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            merged_any = true;

            if existing.as_deref() == Some(merged.as_str()) {
                continue;
            }

            store::write_atomic(&path, merged.as_bytes())?;
            outcome = Outcome::Written;
        }

        match rejected {
            Some(e) if !merged_any => Err(e),
            _ => Ok(outcome),
        }
    }
}

// -- Tests -------------------------------------------------------------------
