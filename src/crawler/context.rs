//! Per-resource accumulation state
//!
//! An [`AccumulationContext`] tracks one resource between branch fan-out and
//! record emission. Contexts live in a [`ContextRegistry`] owned by the
//! orchestrator: registered when the branch count becomes known, fed one
//! resolved branch at a time from any continuation, and destroyed the instant
//! the resolved count reaches the expected count. The registry's lock spans
//! the whole append-compare-remove step, so exactly one continuation observes
//! completion no matter how branch resolutions interleave.

use crate::model::{AggregatedRecord, VersionBranch};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// The fields captured from the detail stage, copied into every branch
/// continuation and finally into the emitted record
#[derive(Debug, Clone)]
pub struct StaticFields {
    pub resource_id: u64,
    pub catalog_id: u32,
    pub catalog_name: String,
    pub title: String,
    pub cover_image: Option<String>,
    pub images: Vec<String>,
    pub intro_html: String,
    pub metadata: BTreeMap<String, String>,
    pub detail_url: String,
    pub list_url: String,
}

/// Mutable per-resource state: how many branches are expected, and the ones
/// resolved so far (in resolution order)
#[derive(Debug)]
pub struct AccumulationContext {
    static_fields: StaticFields,
    expected_branch_count: usize,
    resolved_branches: Vec<VersionBranch>,
}

impl AccumulationContext {
    /// Creates a context expecting `expected_branch_count` resolutions.
    /// Callers guarantee at least one branch (synthesizing a default when
    /// discovery yields nothing), so a zero count is clamped defensively.
    pub fn new(static_fields: StaticFields, expected_branch_count: usize) -> Self {
        Self {
            static_fields,
            expected_branch_count: expected_branch_count.max(1),
            resolved_branches: Vec::with_capacity(expected_branch_count.max(1)),
        }
    }

    fn resolve(&mut self, branch: VersionBranch) {
        self.resolved_branches.push(branch);
    }

    fn is_complete(&self) -> bool {
        self.resolved_branches.len() >= self.expected_branch_count
    }

    fn into_record(self) -> AggregatedRecord {
        let fields = self.static_fields;
        AggregatedRecord {
            resource_id: Some(fields.resource_id),
            catalog_id: fields.catalog_id,
            catalog_name: fields.catalog_name,
            title: fields.title,
            cover_image: fields.cover_image,
            images: fields.images,
            intro_html: fields.intro_html,
            metadata: fields.metadata,
            branches: self.resolved_branches,
            detail_url: fields.detail_url,
            list_url: fields.list_url,
        }
    }
}

/// Registry of in-flight contexts, keyed by resource id
///
/// Scoped to one orchestrator run; cleared entry by entry as records emit, so
/// memory stays bounded by the number of resources mid-assembly.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    inner: Mutex<HashMap<u64, AccumulationContext>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a context for `resource_id`.
    ///
    /// Returns `false` (leaving the existing context untouched) when the
    /// resource is already mid-assembly: the same resource can appear on two
    /// list pages of one catalog, and the second chain must not tangle the
    /// first one's branch counting.
    pub fn register(&self, resource_id: u64, context: AccumulationContext) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.contains_key(&resource_id) {
            tracing::debug!(
                "Resource {} already mid-assembly, skipping duplicate chain",
                resource_id
            );
            return false;
        }
        inner.insert(resource_id, context);
        true
    }

    /// Appends one resolved branch and performs the completion check.
    ///
    /// Returns the assembled record exactly once: on the call that brings the
    /// resolved count up to the expected count. The append, the comparison,
    /// and the removal all happen under one lock acquisition.
    pub fn resolve_branch(
        &self,
        resource_id: u64,
        branch: VersionBranch,
    ) -> Option<AggregatedRecord> {
        let mut inner = self.inner.lock().unwrap();

        let Some(context) = inner.get_mut(&resource_id) else {
            tracing::warn!(
                "Branch resolution for unknown resource {} (already emitted?)",
                resource_id
            );
            return None;
        };

        context.resolve(branch);

        if context.is_complete() {
            // Remove first so no later resolution can observe the context
            let context = inner.remove(&resource_id)?;
            return Some(context.into_record());
        }

        None
    }

    /// Number of resources still mid-assembly
    pub fn in_flight(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}
