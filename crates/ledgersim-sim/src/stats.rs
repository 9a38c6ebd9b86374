//! Per-route operation statistics.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Counters for one operation route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStats {
    pub ok: u64,
    pub skipped: u64,
    /// Follow-up operations this route scheduled.
    pub scheduled: u64,
}

/// Operation outcomes of a run, keyed by route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    routes: BTreeMap<String, RouteStats>,
}

impl EventStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ok(&mut self, route: &str) {
        self.entry(route).ok += 1;
    }

    pub fn record_skip(&mut self, route: &str) {
        self.entry(route).skipped += 1;
    }

    pub fn record_scheduled(&mut self, route: &str, count: usize) {
        self.entry(route).scheduled += count as u64;
    }

    fn entry(&mut self, route: &str) -> &mut RouteStats {
        self.routes.entry(route.to_string()).or_default()
    }

    pub fn get(&self, route: &str) -> Option<&RouteStats> {
        self.routes.get(route)
    }

    pub fn routes(&self) -> impl Iterator<Item = (&str, &RouteStats)> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn total_ok(&self) -> u64 {
        self.routes.values().map(|s| s.ok).sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.routes.values().map(|s| s.skipped).sum()
    }

    pub fn total(&self) -> u64 {
        self.total_ok() + self.total_skipped()
    }
}

impl Display for EventStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self
            .routes
            .keys()
            .map(String::len)
            .max()
            .unwrap_or(5)
            .max(5);
        writeln!(f, "{:<width$}  {:>8}  {:>8}", "route", "ok", "skipped")?;
        for (route, s) in &self.routes {
            writeln!(f, "{route:<width$}  {:>8}  {:>8}", s.ok, s.skipped)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_per_route() {
        let mut stats = EventStats::new();
        stats.record_ok("bank/send");
        stats.record_ok("bank/send");
        stats.record_skip("bank/send");
        stats.record_skip("staking/delegate");
        stats.record_scheduled("gov/submit_text_proposal", 3);

        assert_eq!(stats.get("bank/send").unwrap().ok, 2);
        assert_eq!(stats.total_ok(), 2);
        assert_eq!(stats.total_skipped(), 2);
        assert_eq!(stats.get("gov/submit_text_proposal").unwrap().scheduled, 3);
        assert!(stats.to_string().contains("staking/delegate"));
    }
}
