//! Candidate pass: which methods contain which templates.

use std::collections::BTreeSet;

use dashmap::DashMap;
use tracing::trace;

use crate::ir::MethodId;

use super::error::OutlineResult;
use super::scanner::{Candidate, CandidateHandler};
use super::template::Template;
use super::types::OutlineCounters;

/// Template -> owning methods, one entry per occurrence.
///
/// Only the template key is kept; sites are re-derived by the site pass.
#[derive(Debug, Default)]
pub struct CandidateAggregator {
    methods: DashMap<Template, Vec<MethodId>>,
}

impl CandidateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, template: Template, method: MethodId) {
        self.methods.entry(template).or_default().push(method);
    }

    /// Number of distinct templates seen
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Number of distinct methods containing `template`
    pub fn method_count(&self, template: &Template) -> usize {
        self.methods
            .get(template)
            .map(|methods| distinct(&methods).len())
            .unwrap_or(0)
    }

    /// Every method containing a template that occurs in at least
    /// `threshold` distinct methods
    pub fn select_methods(&self, threshold: usize) -> BTreeSet<MethodId> {
        let mut selected = BTreeSet::new();
        for entry in self.methods.iter() {
            let methods = distinct(entry.value());
            if methods.len() >= threshold {
                trace!(methods = methods.len(), "template selected");
                selected.extend(methods);
            }
        }
        selected
    }

    /// Drop all aggregates
    pub fn clear(&self) {
        self.methods.clear();
    }
}

fn distinct(methods: &[MethodId]) -> Vec<MethodId> {
    let mut methods = methods.to_vec();
    methods.sort_unstable();
    methods.dedup();
    methods
}

/// Candidate pass handler for one method
pub struct MethodIdentifier<'a> {
    aggregator: &'a CandidateAggregator,
    counters: &'a OutlineCounters,
    method: MethodId,
}

impl<'a> MethodIdentifier<'a> {
    pub(crate) fn new(
        aggregator: &'a CandidateAggregator,
        counters: &'a OutlineCounters,
        method: MethodId,
    ) -> Self {
        Self {
            aggregator,
            counters,
            method,
        }
    }
}

impl CandidateHandler for MethodIdentifier<'_> {
    fn on_candidate(&mut self, candidate: Candidate) -> OutlineResult<()> {
        OutlineCounters::add(&self.counters.candidates, 1);
        self.aggregator.record(candidate.template, self.method);
        Ok(())
    }
}
