//! Crawl orchestration: fetch service, accumulation contexts, state machine
//!
//! The orchestrator drives dependent fetches (list, detail, branches,
//! downloads) and assembles complete records; the fetch service hides all
//! transport policy; the context registry tracks per-resource completion.

mod context;
mod fetcher;
mod orchestrator;

pub use context::{AccumulationContext, ContextRegistry, StaticFields};
pub use fetcher::{
    load_session_cookies, FetchError, FetchRequest, FetchResponse, FetchService, HttpFetchService,
    SessionCookie,
};
pub use orchestrator::{HarvestReport, Orchestrator};

use crate::config::Config;
use crate::output::{PartitionSummary, ShardWriter};
use crate::{HarvestError, Result};
use std::sync::{Arc, Mutex};
use url::Url;

/// Runs a full harvest from a loaded configuration
///
/// Wires the production fetch service, the shard writer, and the
/// orchestrator together, then finalizes the partitions. Returns the run
/// report together with the closing partition summaries.
pub async fn run_harvest(config: Config) -> Result<(HarvestReport, Vec<PartitionSummary>)> {
    let targets = config.harvest.targets().map_err(HarvestError::Config)?;
    let page_range = config.harvest.pages().map_err(HarvestError::Config)?;
    let base_url = Url::parse(&config.harvest.base_url)?;

    let fetcher = Arc::new(HttpFetchService::new(
        config.fetch.clone(),
        base_url.clone(),
        &config.session,
    ));

    let writer = Arc::new(Mutex::new(ShardWriter::new(&config.output, page_range)?));

    let orchestrator = Orchestrator::new(
        fetcher,
        Arc::clone(&writer),
        base_url,
        config.harvest.max_concurrent_fetches as usize,
        page_range,
    );

    let report = orchestrator.run(&targets).await;

    let summaries = {
        let mut writer = writer.lock().unwrap();
        writer.finalize()?
    };

    Ok((report, summaries))
}
