//! Crawl orchestrator - the multi-stage harvest state machine
//!
//! Drives the dependency chain per resource:
//!
//! ```text
//! list page -> detail page -> branch discovery -> (N parallel) download
//! listings -> one aggregated record
//! ```
//!
//! Catalogs run concurrently; within a catalog, list pages and detail chains
//! flow through a bounded `buffer_unordered`. The only cross-continuation
//! state is the [`ContextRegistry`], which makes the per-resource completion
//! check atomic. Fallback policies guarantee that parse degradation never
//! drops a resource:
//! - detail page without structured identifiers -> immediate degraded record
//! - failed or empty branch discovery -> one synthetic default branch
//! - failed download fetch -> branch kept with zero entries
//!
//! Completion is counted in attempts, not successes, so every registered
//! resource terminates.

use crate::crawler::context::{AccumulationContext, ContextRegistry, StaticFields};
use crate::crawler::fetcher::{FetchRequest, FetchService};
use crate::extract::{
    extract_coarse_downloads, parse_branches, parse_detail_page, parse_download_fragment,
    parse_list_page, resolve_catalog_name,
};
use crate::model::{AggregatedRecord, CrawlTarget, ListItem, ListPage, VersionBranch};
use crate::output::ShardWriter;
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

/// Closing counters for one harvest run
#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    /// Records handed to the shard writer
    pub emitted: u64,

    /// Subset of `emitted` built on the degraded (identifier-less) path
    pub degraded: u64,

    /// Resources still mid-assembly when the run ended
    pub abandoned: usize,
}

/// The harvest state machine
pub struct Orchestrator {
    fetcher: Arc<dyn FetchService>,
    writer: Arc<Mutex<ShardWriter>>,
    contexts: ContextRegistry,
    base: String,
    base_url: Url,
    concurrency: usize,
    page_range: Option<(u32, u32)>,
    emitted: AtomicU64,
    degraded: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn FetchService>,
        writer: Arc<Mutex<ShardWriter>>,
        base_url: Url,
        concurrency: usize,
        page_range: Option<(u32, u32)>,
    ) -> Self {
        Self {
            fetcher,
            writer,
            contexts: ContextRegistry::new(),
            base: base_url.as_str().trim_end_matches('/').to_string(),
            base_url,
            concurrency: concurrency.max(1),
            page_range,
            emitted: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
        }
    }

    /// Runs the harvest over all targets and returns the closing counters
    pub async fn run(&self, targets: &[CrawlTarget]) -> HarvestReport {
        let start = std::time::Instant::now();
        tracing::info!("Starting harvest of {} catalog(s)", targets.len());

        futures::future::join_all(targets.iter().map(|target| self.harvest_catalog(*target)))
            .await;

        let abandoned = self.contexts.in_flight();
        if abandoned > 0 {
            tracing::warn!("{} resource(s) left mid-assembly at shutdown", abandoned);
        }

        let report = HarvestReport {
            emitted: self.emitted.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            abandoned,
        };

        tracing::info!(
            "Harvest finished: {} records ({} degraded) in {:?}",
            report.emitted,
            report.degraded,
            start.elapsed()
        );

        report
    }

    /// Crawls one catalog: bootstrap page 1, fan out sibling pages, then run
    /// every discovered detail chain.
    async fn harvest_catalog(&self, target: CrawlTarget) {
        let catalog_id = target.catalog_id;
        let first_url = format!("{}/down/list/{}", self.base, catalog_id);

        let response = match self
            .fetcher
            .fetch(FetchRequest::page(&first_url, catalog_id))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Catalog {}: list page 1 failed: {}", catalog_id, e);
                return;
            }
        };

        let Ok(page_url) = Url::parse(&response.final_url) else {
            tracing::error!("Catalog {}: unparseable final URL {}", catalog_id, response.final_url);
            return;
        };

        // Page 1 resolves the catalog name and the page count; sibling pages
        // inherit both through the request context below.
        let catalog_name = resolve_catalog_name(&response.body, catalog_id);
        let page = parse_list_page(&response.body, &page_url, catalog_id, 1);
        let max_page = page.pagination_max.unwrap_or(1);

        tracing::info!(
            "Catalog {} ({}): {} page(s), {} item(s) on page 1",
            catalog_id,
            catalog_name,
            max_page,
            page.items.len()
        );

        let (range_start, range_end) = self.page_range.unwrap_or((1, u32::MAX));

        let mut work: Vec<(ListItem, String)> = Vec::new();
        if range_start <= 1 {
            let list_url = response.final_url.clone();
            work.extend(page.items.into_iter().map(|item| (item, list_url.clone())));
        }

        let sibling_pages: Vec<u32> = (2..=max_page)
            .filter(|p| *p >= range_start && *p <= range_end)
            .collect();

        let fetched: Vec<Option<(ListPage, String)>> = futures::stream::iter(sibling_pages)
            .map(|page_number| self.fetch_list_page(catalog_id, page_number))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (sibling, list_url) in fetched.into_iter().flatten() {
            work.extend(
                sibling
                    .items
                    .into_iter()
                    .map(|item| (item, list_url.clone())),
            );
        }

        tracing::info!("Catalog {}: {} detail page(s) to fetch", catalog_id, work.len());

        futures::stream::iter(work)
            .for_each_concurrent(self.concurrency, |(item, list_url)| {
                let catalog_name = catalog_name.clone();
                async move {
                    self.process_resource(catalog_id, &catalog_name, &list_url, item)
                        .await;
                }
            })
            .await;
    }

    /// Fetches and parses one sibling list page (pages 2+)
    async fn fetch_list_page(
        &self,
        catalog_id: u32,
        page_number: u32,
    ) -> Option<(ListPage, String)> {
        let url = format!("{}/down/list/{}/{}", self.base, catalog_id, page_number);

        match self.fetcher.fetch(FetchRequest::page(&url, catalog_id)).await {
            Ok(response) => {
                let page_url = Url::parse(&response.final_url).ok()?;
                let page = parse_list_page(&response.body, &page_url, catalog_id, page_number);
                tracing::debug!(
                    "Catalog {} page {}: {} item(s)",
                    catalog_id,
                    page_number,
                    page.items.len()
                );
                Some((page, response.final_url))
            }
            Err(e) => {
                tracing::warn!("Catalog {} page {} failed: {}", catalog_id, page_number, e);
                None
            }
        }
    }

    /// Runs one resource's chain from the detail fetch to emission
    async fn process_resource(
        &self,
        catalog_id: u32,
        catalog_name: &str,
        list_url: &str,
        item: ListItem,
    ) {
        let response = match self
            .fetcher
            .fetch(FetchRequest::page(&item.detail_url, catalog_id))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Detail fetch failed for {}: {}", item.detail_url, e);
                return;
            }
        };

        let Ok(page_url) = Url::parse(&response.final_url) else {
            tracing::warn!("Unparseable detail URL: {}", response.final_url);
            return;
        };

        let detail = parse_detail_page(&response.body, &page_url, catalog_id);

        // Fallback policy: no structured identifiers means no branch loop is
        // possible, but the resource still must not be dropped.
        let Some(resource_id) = detail.resource_id else {
            tracing::warn!(
                "No resource id on {} (stage: detail), emitting degraded record",
                item.detail_url
            );

            let mut branch = VersionBranch::synthetic_default(None);
            branch.downloads = extract_coarse_downloads(&response.body, &page_url);

            self.degraded.fetch_add(1, Ordering::Relaxed);
            self.emit(AggregatedRecord {
                resource_id: None,
                catalog_id,
                catalog_name: catalog_name.to_string(),
                title: detail.title,
                cover_image: item.cover_image,
                images: detail.images,
                intro_html: detail.intro_html,
                metadata: detail.metadata,
                branches: vec![branch],
                detail_url: response.final_url.clone(),
                list_url: list_url.to_string(),
            });
            return;
        };

        // Branch discovery; a failed fetch degrades to the synthetic default
        // instead of aborting the resource.
        let discovery_url = format!(
            "{}/down.php?mod=view&mid={}&show=toversion",
            self.base, resource_id
        );
        let mut branches = match self
            .fetcher
            .fetch(FetchRequest::ajax(&discovery_url, catalog_id))
            .await
        {
            Ok(response) => parse_branches(&response.body),
            Err(e) => {
                tracing::warn!(
                    "Branch discovery failed for resource {} (stage: branches): {}",
                    resource_id,
                    e
                );
                Vec::new()
            }
        };

        if branches.is_empty() {
            tracing::warn!(
                "No branches for resource {}, synthesizing default (vid={:?})",
                resource_id,
                detail.primary_branch_id
            );
            branches.push(VersionBranch::synthetic_default(detail.primary_branch_id));
        }

        let static_fields = StaticFields {
            resource_id,
            catalog_id,
            catalog_name: catalog_name.to_string(),
            title: detail.title,
            cover_image: item.cover_image,
            images: detail.images,
            intro_html: detail.intro_html,
            metadata: detail.metadata,
            detail_url: response.final_url.clone(),
            list_url: list_url.to_string(),
        };

        let expected = branches.len();
        if !self
            .contexts
            .register(resource_id, AccumulationContext::new(static_fields, expected))
        {
            // Same resource already mid-assembly from another list page
            return;
        }

        tracing::debug!(
            "Resource {}: fanning out {} branch download fetch(es)",
            resource_id,
            expected
        );

        futures::stream::iter(branches)
            .for_each_concurrent(self.concurrency, |branch| async move {
                let resolved = self
                    .resolve_branch_downloads(catalog_id, resource_id, branch)
                    .await;

                if let Some(record) = self.contexts.resolve_branch(resource_id, resolved) {
                    tracing::info!(
                        "Resource {} complete: {} branch(es), \"{}\"",
                        resource_id,
                        record.branches.len(),
                        record.title
                    );
                    self.emit(record);
                }
            })
            .await;
    }

    /// Fetches and classifies one branch's download listing. Failure leaves
    /// the branch with zero entries; the attempt still counts toward the
    /// owning resource's completion.
    async fn resolve_branch_downloads(
        &self,
        catalog_id: u32,
        resource_id: u64,
        mut branch: VersionBranch,
    ) -> VersionBranch {
        let Some(branch_id) = branch.branch_id else {
            return branch;
        };

        let url = format!(
            "{}/down.php?mod=view&mid={}&vid={}&show=todownload",
            self.base, resource_id, branch_id
        );

        match self.fetcher.fetch(FetchRequest::ajax(&url, catalog_id)).await {
            Ok(response) => {
                let listing = parse_download_fragment(&response.body, &self.base_url);
                branch.downloads = listing.entries;
                // The fragment carries the full description; the branch list
                // only had the short note
                if let Some(description) = listing.description_html {
                    branch.description_html = description;
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Download listing failed for resource {} branch {} (stage: downloads): {}",
                    resource_id,
                    branch_id,
                    e
                );
            }
        }

        branch
    }

    fn emit(&self, record: AggregatedRecord) {
        let mut writer = self.writer.lock().unwrap();
        match writer.append(&record) {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(
                    "Failed to write record for resource {:?}: {}",
                    record.resource_id,
                    e
                );
            }
        }
    }
}
