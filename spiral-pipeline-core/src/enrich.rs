//! Scoring of catalog entries.
//!
//! Two interchangeable strategies fill the same [`Scores`]:
//! - [`heuristic`]: deterministic keyword and price rules, no I/O.
//! - [`assisted`]: one model call per entry, run in rate-limited concurrent groups.
//!
//! Both leave already-scored entries alone.

pub mod assisted;
pub mod heuristic;

use std::fmt;

use crate::catalog::{CatalogEntry, Scores};

/// Averages over a set of freshly enriched entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichmentStats {
    pub count: usize,
    pub overall: f64,
    pub value: f64,
    pub ease: f64,
    pub features: f64,
}

impl EnrichmentStats {
    /// `None` when no entry in `entries` is scored.
    pub fn from_entries(entries: &[CatalogEntry]) -> Option<Self> {
        let scores: Vec<Scores> = entries.iter().filter_map(CatalogEntry::scores).collect();
        if scores.is_empty() {
            return None;
        }
        let n = scores.len() as f64;
        let avg = |f: fn(&Scores) -> u8| scores.iter().map(|s| f64::from(f(s))).sum::<f64>() / n;
        Some(Self {
            count: scores.len(),
            overall: avg(|s| s.overall),
            value: avg(|s| s.value),
            ease: avg(|s| s.ease),
            features: avg(|s| s.features),
        })
    }
}

impl fmt::Display for EnrichmentStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Enrichment statistics ({} entries):", self.count)?;
        writeln!(f, "   Average TechieSpiral Score: {:.0}/100", self.overall)?;
        writeln!(f, "   Average Value Score: {:.1}/5", self.value)?;
        writeln!(f, "   Average Ease Score: {:.1}/5", self.ease)?;
        write!(f, "   Average Features Score: {:.1}/5", self.features)
    }
}
