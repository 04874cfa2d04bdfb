use anyhow::{Error, Result};
use futures::future::try_join_all;
use tracing::{info, info_span, Instrument};

use crate::{config::Settings, orchestrator::Orchestrator};

/// Starts one orchestrator task per enabled source. Returns only when one of them
/// hits a fatal error.
pub async fn run(settings: &Settings) -> Result<()> {
    let transcoder = settings.transcoder()?;
    let descriptors = settings.descriptors()?;

    let tasks: Vec<_> = descriptors
        .into_iter()
        .map(|descriptor| {
            let orchestrator = Orchestrator::new(descriptor, transcoder.clone());
            let span = info_span!("source", name = %orchestrator.source().kind);
            info!(
                parent: &span,
                url = %orchestrator.source().base_url,
                root = %orchestrator.source().root.display(),
                "starting"
            );
            tokio::spawn(async move { orchestrator.run().await }.instrument(span))
        })
        .collect();

    try_join_all(tasks.into_iter().map(|task| async move {
        match task.await {
            Ok(result) => result.map_err(Error::from),
            Err(e) => Err(Error::from(e)),
        }
    }))
    .await?;

    Ok(())
}
