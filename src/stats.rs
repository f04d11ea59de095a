use std::{cell::RefCell, collections::BTreeMap, time::Duration};

use colored::Colorize;

/// Timing for one kind of repository query.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryStats {
    pub count: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl QueryStats {
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.max_duration = self.max_duration.max(duration);
    }

    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

/// All queries made against the repository during this invocation.
#[derive(Debug, Default, Clone)]
pub struct RepoStats {
    /// Keyed by query kind ("open", "is-ancestor", ...).
    pub by_query: BTreeMap<&'static str, QueryStats>,
    pub total: QueryStats,
}

impl RepoStats {
    pub fn record(&mut self, query: &'static str, duration: Duration) {
        self.total.record(duration);
        self.by_query.entry(query).or_default().record(duration);
    }
}

thread_local! {
    static REPO_STATS: RefCell<RepoStats> = RefCell::new(RepoStats::default());
}

pub fn record_query(query: &'static str, duration: Duration) {
    REPO_STATS.with(|stats| stats.borrow_mut().record(query, duration));
}

pub fn get_stats() -> RepoStats {
    REPO_STATS.with(|stats| stats.borrow().clone())
}

/// Print a query timing table to stderr.
pub fn print_summary() {
    let stats = get_stats();
    if stats.total.count == 0 {
        return;
    }

    eprintln!();
    eprintln!("{}", "=== Repository Query Summary ===".yellow().bold());
    eprintln!();

    let mut queries: Vec<_> = stats.by_query.iter().collect();
    queries.sort_by(|a, b| b.1.total_duration.cmp(&a.1.total_duration));

    eprintln!(
        "{:<20} {:>8} {:>12} {:>12} {:>12}",
        "Query", "Count", "Total", "Avg", "Max"
    );
    eprintln!("{}", "-".repeat(64));
    for (query, query_stats) in queries {
        eprintln!(
            "{:<20} {:>8} {:>12.2?} {:>12.2?} {:>12.2?}",
            query,
            query_stats.count,
            query_stats.total_duration,
            query_stats.avg_duration(),
            query_stats.max_duration
        );
    }
    eprintln!("{}", "-".repeat(64));
    eprintln!(
        "{:<20} {:>8} {:>12.2?} {:>12.2?} {:>12.2?}",
        "TOTAL".bold(),
        stats.total.count,
        stats.total.total_duration,
        stats.total.avg_duration(),
        stats.total.max_duration
    );
    eprintln!();
}
