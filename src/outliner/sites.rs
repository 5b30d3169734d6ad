//! Site pass: concrete occurrences per template.
//!
//! Templates are interned into an arena and addressed by [`TemplateId`];
//! sites live in per-template lists that the rewriting pass drains again.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::ir::{BlockId, MethodId};

use super::error::OutlineResult;
use super::scanner::{Candidate, CandidateHandler};
use super::template::Template;
use super::types::OutlineCounters;

/// Index into the template arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TemplateId(pub usize);

/// One occurrence of a template: window `[start, end)` of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Site {
    pub method: MethodId,
    pub block: BlockId,
    pub start: usize,
    pub end: usize,
}

impl Site {
    pub fn of(method: MethodId, candidate: &Candidate) -> Self {
        Self {
            method,
            block: candidate.block,
            start: candidate.start,
            end: candidate.end,
        }
    }
}

#[derive(Debug, Default)]
pub struct SiteTable {
    ids: DashMap<Template, TemplateId>,
    templates: RwLock<Vec<Template>>,
    sites: DashMap<TemplateId, Vec<Site>>,
}

impl SiteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `template`, allocating one on first sight
    pub fn intern(&self, template: Template) -> TemplateId {
        match self.ids.entry(template) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let mut templates = self.templates.write();
                let id = TemplateId(templates.len());
                templates.push(entry.key().clone());
                entry.insert(id);
                id
            }
        }
    }

    pub fn id_of(&self, template: &Template) -> Option<TemplateId> {
        self.ids.get(template).map(|id| *id)
    }

    pub fn template(&self, id: TemplateId) -> Option<Template> {
        self.templates.read().get(id.0).cloned()
    }

    /// Append a site; repeats within one method are kept
    pub fn record(&self, template: Template, site: Site) -> TemplateId {
        let id = self.intern(template);
        self.sites.entry(id).or_default().push(site);
        id
    }

    /// Remove exactly one matching site. Returns false if none matched.
    pub fn remove_site(&self, id: TemplateId, site: &Site) -> bool {
        let Some(mut sites) = self.sites.get_mut(&id) else {
            return false;
        };
        match sites.iter().position(|s| s == site) {
            Some(position) => {
                sites.swap_remove(position);
                true
            }
            None => false,
        }
    }

    /// Sites still recorded for `id`
    pub fn remaining(&self, id: TemplateId) -> usize {
        self.sites.get(&id).map(|sites| sites.len()).unwrap_or(0)
    }

    pub fn total_sites(&self) -> usize {
        self.sites.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Templates with at least `threshold` sites, in template order
    pub fn selected(&self, threshold: usize) -> Vec<(TemplateId, Template)> {
        let templates = self.templates.read();
        let mut selected: Vec<(TemplateId, Template)> = self
            .sites
            .iter()
            .filter(|entry| entry.value().len() >= threshold)
            .filter_map(|entry| {
                let id = *entry.key();
                templates.get(id.0).map(|template| (id, template.clone()))
            })
            .collect();
        selected.sort_by(|a, b| a.1.cmp(&b.1));
        selected
    }
}

/// Site pass handler for one method
pub struct SiteIdentifier<'a> {
    table: &'a SiteTable,
    counters: &'a OutlineCounters,
    method: MethodId,
}

impl<'a> SiteIdentifier<'a> {
    pub(crate) fn new(table: &'a SiteTable, counters: &'a OutlineCounters, method: MethodId) -> Self {
        Self {
            table,
            counters,
            method,
        }
    }
}

impl CandidateHandler for SiteIdentifier<'_> {
    fn on_candidate(&mut self, candidate: Candidate) -> OutlineResult<()> {
        let site = Site::of(self.method, &candidate);
        self.table.record(candidate.template, site);
        OutlineCounters::add(&self.counters.sites, 1);
        Ok(())
    }
}
