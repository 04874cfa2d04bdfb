use anyhow::Result;
use tracing::{info_span, Instrument};

use crate::{
    cli::create_progress_bar,
    config::Settings,
    orchestrator::{CycleSummary, Orchestrator},
    source::SourceKind,
};

/// Runs one resolve, crawl and download pass of `kind`.
pub async fn once(settings: &Settings, kind: SourceKind) -> Result<CycleSummary> {
    let orchestrator = Orchestrator::new(settings.descriptor(kind)?, settings.transcoder()?);

    let cycle = async {
        let fetcher = orchestrator.resolve().await;
        let bar = create_progress_bar(format!("{kind} files"));
        let summary = orchestrator.run_cycle(&fetcher, Some(&bar)).await;
        bar.finish_with_message(format!("{kind} cycle complete"));
        summary
    };

    Ok(cycle.instrument(info_span!("source", name = %kind)).await?)
}
