//! Statistics for outlining.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics about one outlining run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutlineStats {
    /// Methods scanned in the candidate pass
    pub methods_scanned: usize,
    /// Windows accepted in the candidate pass
    pub candidates: usize,
    /// Distinct templates seen in the candidate pass
    pub templates: usize,
    /// Methods selected for site recording and rewriting
    pub methods_selected: usize,
    /// Sites recorded in the site pass
    pub sites: usize,
    /// Outline methods generated
    pub outlines: usize,
    /// Sites replaced by an outline call
    pub sites_rewritten: usize,
    /// Net number of instructions removed by rewriting
    pub instructions_removed: usize,
}

impl OutlineStats {
    /// Whether any code was outlined
    pub fn has_changes(&self) -> bool {
        self.sites_rewritten > 0
    }
}

impl std::fmt::Display for OutlineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "methods scanned:       {}", self.methods_scanned)?;
        writeln!(f, "candidates:            {}", self.candidates)?;
        writeln!(f, "templates:             {}", self.templates)?;
        writeln!(f, "methods selected:      {}", self.methods_selected)?;
        writeln!(f, "sites recorded:        {}", self.sites)?;
        writeln!(f, "outlines generated:    {}", self.outlines)?;
        writeln!(f, "sites rewritten:       {}", self.sites_rewritten)?;
        write!(f, "instructions removed:  {}", self.instructions_removed)
    }
}

/// Counters shared by pass workers
#[derive(Debug, Default)]
pub(crate) struct OutlineCounters {
    pub methods_scanned: AtomicUsize,
    pub candidates: AtomicUsize,
    pub sites: AtomicUsize,
    pub sites_rewritten: AtomicUsize,
    pub instructions_removed: AtomicUsize,
}

impl OutlineCounters {
    #[inline]
    pub fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Snapshot the counters into `stats`
    pub fn fill(&self, stats: &mut OutlineStats) {
        stats.methods_scanned = self.methods_scanned.load(Ordering::Relaxed);
        stats.candidates = self.candidates.load(Ordering::Relaxed);
        stats.sites = self.sites.load(Ordering::Relaxed);
        stats.sites_rewritten = self.sites_rewritten.load(Ordering::Relaxed);
        stats.instructions_removed = self.instructions_removed.load(Ordering::Relaxed);
    }
}
