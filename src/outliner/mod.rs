//! Code Outliner
//!
//! Finds instruction sequences repeated across many methods, extracts each
//! into one static method of a synthesized holder class and replaces every
//! occurrence with a call.
//!
//! # Passes
//!
//! | Step | Operation | Result |
//! |------|-----------|--------|
//! | 1 | [`Outliner::run_pass1`] | template -> methods aggregates |
//! | 2 | [`Outliner::select_methods_for_pass2`] | methods with a frequent template |
//! | 3 | [`Outliner::run_pass2`] | template -> sites |
//! | 4 | [`Outliner::build_outline_holder`] | holder class, template -> outline |
//! | 5 | [`Outliner::run_pass3`] | rewritten methods, every site consumed |
//!
//! Every pass scans with the same window scanner and runs methods in parallel
//! on a rayon pool; joining the pool is the barrier between passes. Output
//! is deterministic because outlines are named in template order, never in
//! method processing order.
//!
//! # Example
//!
//! ```ignore
//! let mut outliner = Outliner::new(OutlineOptions::default())?;
//! let report = outliner.run(&mut program)?;
//! if let Some(holder) = report.holder {
//!     println!("{}", holder);
//! }
//! ```

mod aggregator;
mod builder;
mod classify;
mod error;
mod rewriter;
mod scanner;
mod sites;
mod template;
mod types;


use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::OutlineOptions;
use crate::ir::{DexType, Method, MethodId, Program};

pub use aggregator::{CandidateAggregator, MethodIdentifier};
pub use builder::{
    build_holder, synthesize, GeneratedOutline, GeneratedOutlines, SynthesizedClass,
    OUTLINE_SOURCE_FILE,
};
pub use classify::{classify, InstructionClass};
pub use error::{OutlineError, OutlineResult};
pub use scanner::{scan_method, Candidate, CandidateHandler, WindowLimits};
pub use sites::{Site, SiteIdentifier, SiteTable, TemplateId};
pub use template::{ArgumentSlot, Template, TemplateOperation, MAX_HASH_OPERATIONS};
pub use types::OutlineStats;

use types::OutlineCounters;

/// Pipeline progress; each pass requires the previous one to have finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Created,
    CandidatesIdentified,
    MethodsSelected,
    SitesRecorded,
    HolderBuilt,
    Rewritten,
}

/// Result of [`Outliner::run`]
#[derive(Debug, Clone)]
pub struct OutlineReport {
    /// The synthesized holder, if any outline was generated
    pub holder: Option<SynthesizedClass>,
    pub stats: OutlineStats,
}

/// Three-pass outliner. One instance drives one program.
pub struct Outliner {
    options: OutlineOptions,
    limits: WindowLimits,
    pool: rayon::ThreadPool,
    phase: Phase,
    candidates: CandidateAggregator,
    sites: SiteTable,
    generated: GeneratedOutlines,
    counters: OutlineCounters,
    stats: OutlineStats,
}

impl Outliner {
    pub fn new(options: OutlineOptions) -> OutlineResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .thread_name(|index| format!("outliner-{}", index))
            .build()
            .map_err(|e| OutlineError::ThreadPool(e.to_string()))?;
        Ok(Self {
            limits: WindowLimits::from_options(&options),
            options,
            pool,
            phase: Phase::Created,
            candidates: CandidateAggregator::new(),
            sites: SiteTable::new(),
            generated: GeneratedOutlines::new(),
            counters: OutlineCounters::default(),
            stats: OutlineStats::default(),
        })
    }

    #[inline]
    pub fn options(&self) -> &OutlineOptions {
        &self.options
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Recorded sites
    #[inline]
    pub fn sites(&self) -> &SiteTable {
        &self.sites
    }

    /// Template -> outline mapping, empty before the holder is built
    #[inline]
    pub fn generated(&self) -> &GeneratedOutlines {
        &self.generated
    }

    pub fn stats(&self) -> OutlineStats {
        let mut stats = self.stats.clone();
        self.counters.fill(&mut stats);
        stats
    }

    fn advance(&mut self, expected: Phase, next: Phase) -> OutlineResult<()> {
        if self.phase != expected {
            return Err(OutlineError::PassOrder {
                expected,
                actual: self.phase,
            });
        }
        self.phase = next;
        Ok(())
    }

    /// Pass 1: aggregate templates over every method
    pub fn run_pass1(&mut self, methods: &[Method]) -> OutlineResult<()> {
        self.advance(Phase::Created, Phase::CandidatesIdentified)?;
        let (limits, candidates, counters) = (&self.limits, &self.candidates, &self.counters);
        self.pool.install(|| {
            methods
                .par_iter()
                .filter(|method| !method.is_outline)
                .try_for_each(|method| {
                    OutlineCounters::add(&counters.methods_scanned, 1);
                    let mut handler = MethodIdentifier::new(candidates, counters, method.id);
                    scan_method(method, &method.def_use(), limits, &mut handler)
                })
        })?;
        self.stats.templates = self.candidates.len();
        debug!(templates = self.stats.templates, "candidate pass complete");
        Ok(())
    }

    /// Methods containing a template seen in at least `method_threshold`
    /// distinct methods. Aggregates are discarded afterwards.
    pub fn select_methods_for_pass2(&mut self) -> OutlineResult<BTreeSet<MethodId>> {
        self.advance(Phase::CandidatesIdentified, Phase::MethodsSelected)?;
        let selected = self.candidates.select_methods(self.options.method_threshold);
        self.candidates.clear();
        self.stats.methods_selected = selected.len();
        debug!(methods = selected.len(), "selected methods for outlining");
        Ok(selected)
    }

    /// Pass 2: record every site in the selected methods
    pub fn run_pass2(&mut self, methods: &[Method], selected: &BTreeSet<MethodId>) -> OutlineResult<()> {
        self.advance(Phase::MethodsSelected, Phase::SitesRecorded)?;
        let (limits, sites, counters) = (&self.limits, &self.sites, &self.counters);
        self.pool.install(|| {
            methods
                .par_iter()
                .filter(|method| !method.is_outline && selected.contains(&method.id))
                .try_for_each(|method| {
                    let mut handler = SiteIdentifier::new(sites, counters, method.id);
                    scan_method(method, &method.def_use(), limits, &mut handler)
                })
        })?;
        debug!(sites = self.sites.total_sites(), "site pass complete");
        Ok(())
    }

    /// Synthesize the holder class with one method per template that has
    /// at least `site_threshold` sites. Methods are numbered from `first_id`.
    pub fn build_outline_holder(&mut self, holder: DexType, first_id: MethodId) -> OutlineResult<SynthesizedClass> {
        if self.phase == Phase::SitesRecorded && self.sites.is_empty() {
            return Err(OutlineError::NoSitesRecorded);
        }
        self.advance(Phase::SitesRecorded, Phase::HolderBuilt)?;
        let selected = self.sites.selected(self.options.site_threshold);
        let (class, generated) = build_holder(holder, &self.options.method_prefix, &selected, first_id)?;
        self.generated = generated;
        self.stats.outlines = class.methods.len();
        info!(holder = %class.ty, outlines = class.methods.len(), "built outline holder");
        Ok(class)
    }

    /// Pass 3: rewrite the selected methods to call the generated outlines
    pub fn run_pass3(&mut self, methods: &mut [Method], selected: &BTreeSet<MethodId>) -> OutlineResult<()> {
        self.advance(Phase::HolderBuilt, Phase::Rewritten)?;
        let (limits, sites, counters, generated) =
            (&self.limits, &self.sites, &self.counters, &self.generated);
        self.pool.install(|| {
            methods
                .par_iter_mut()
                .filter(|method| !method.is_outline && selected.contains(&method.id))
                .try_for_each(|method| rewriter::rewrite_method(method, generated, sites, limits, counters))
        })?;
        if self.options.verify {
            self.check_all_sites_consumed()?;
        }
        debug!(
            rewritten = self.stats().sites_rewritten,
            "rewrite pass complete"
        );
        Ok(())
    }

    /// Every site recorded for a generated outline must have been rewritten
    pub fn check_all_sites_consumed(&self) -> OutlineResult<()> {
        let mut outlines: Vec<&GeneratedOutline> = self.generated.values().collect();
        outlines.sort_by(|a, b| a.method.name.cmp(&b.method.name));
        for outline in outlines {
            let remaining = self.sites.remaining(outline.template_id);
            if remaining > 0 {
                return Err(OutlineError::SitesRemaining {
                    outline: outline.method.clone(),
                    remaining,
                });
            }
        }
        Ok(())
    }

    /// Run every pass over `program` and append the holder's methods to it
    pub fn run(&mut self, program: &mut Program) -> OutlineResult<OutlineReport> {
        if !self.options.enabled {
            debug!("outlining disabled");
            return Ok(OutlineReport {
                holder: None,
                stats: self.stats(),
            });
        }

        self.run_pass1(&program.methods)?;
        let selected = self.select_methods_for_pass2()?;
        self.run_pass2(&program.methods, &selected)?;
        if self.sites.is_empty() {
            info!("no outline sites found");
            return Ok(OutlineReport {
                holder: None,
                stats: self.stats(),
            });
        }

        let first_id = MethodId(program.methods.len() as u32);
        let holder = self.build_outline_holder(self.options.holder_type.clone(), first_id)?;
        if holder.methods.is_empty() {
            info!("no template reached the site threshold");
            return Ok(OutlineReport {
                holder: None,
                stats: self.stats(),
            });
        }

        self.run_pass3(&mut program.methods, &selected)?;
        for method in &holder.methods {
            program.add_method(method.clone());
        }

        let stats = self.stats();
        info!(
            outlines = stats.outlines,
            sites = stats.sites_rewritten,
            removed = stats.instructions_removed,
            "outlining complete"
        );
        Ok(OutlineReport {
            holder: Some(holder),
            stats,
        })
    }
}
