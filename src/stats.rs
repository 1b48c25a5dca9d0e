use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::info;

const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(1);

/// Per-command counters of forwarded commands.
///
/// Counters are created lazily the first time a command name is seen and
/// are reset in place by [`CommandStats::report`].
#[derive(Debug, Default)]
pub struct CommandStats {
    counters: DashMap<String, AtomicU64>,
    overall: AtomicU64,
}

/// Counts gathered over one reporting interval.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsReport {
    pub counts: BTreeMap<String, u64>,

    /// Commands counted during the interval.
    pub total: u64,

    /// Commands counted since startup.
    pub overall: u64,
}

impl CommandStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, name: &str) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current count of a command since the last report.
    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn overall(&self) -> u64 {
        self.overall.load(Ordering::Relaxed)
    }

    /// Swap every counter with zero and accumulate the overall total.
    ///
    /// Increments racing with the swap land either in this report or the
    /// next one, never in neither.
    pub fn report(&self) -> StatsReport {
        let mut counts = BTreeMap::new();
        let mut total = 0;
        for entry in self.counters.iter() {
            let count = entry.value().swap(0, Ordering::Relaxed);
            counts.insert(entry.key().clone(), count);
            total += count;
        }
        let overall = self.overall.fetch_add(total, Ordering::Relaxed) + total;
        StatsReport {
            counts,
            total,
            overall,
        }
    }

    /// Log a report every `interval` until the task is dropped.
    ///
    /// Intervals shorter than a millisecond are raised to one millisecond.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let interval = interval.max(MIN_REPORT_INTERVAL);
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = self.report();
            for (command, count) in &report.counts {
                info!(command = %command, count, "Command processed");
            }
            info!(
                total = report.total,
                overall = report.overall,
                "Processed {} total commands in the last {:?}",
                report.total,
                interval
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn report_resets_counters() {
        let stats = CommandStats::new();
        stats.increment("set");
        stats.increment("set");
        stats.increment("lpush");

        let report = stats.report();
        assert_eq!(report.counts.get("set"), Some(&2));
        assert_eq!(report.counts.get("lpush"), Some(&1));
        assert_eq!(report.total, 3);
        assert_eq!(report.overall, 3);
        assert_eq!(stats.get("set"), 0);

        stats.increment("set");
        let report = stats.report();
        assert_eq!(report.counts.get("set"), Some(&1));
        assert_eq!(report.counts.get("lpush"), Some(&0));
        assert_eq!(report.total, 1);
        assert_eq!(report.overall, 4);
    }

    #[tokio::test]
    async fn ticker_swaps_counters_every_interval() {
        let stats = Arc::new(CommandStats::new());
        stats.increment("set");
        let ticker = tokio::spawn(stats.clone().run(Duration::from_millis(20)));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while stats.overall() < 1 {
            assert!(tokio::time::Instant::now() < deadline, "no report was made");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(stats.get("set"), 0);

        stats.increment("set");
        stats.increment("del");
        while stats.overall() < 3 {
            assert!(tokio::time::Instant::now() < deadline, "no second report");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(stats.overall(), 3);
        assert_eq!(stats.get("del"), 0);

        assert!(!ticker.is_finished());
        ticker.abort();
    }

    #[tokio::test]
    async fn zero_interval_does_not_stop_the_ticker() {
        let stats = Arc::new(CommandStats::new());
        stats.increment("set");
        let ticker = tokio::spawn(stats.clone().run(Duration::ZERO));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while stats.overall() < 1 {
            assert!(tokio::time::Instant::now() < deadline, "no report was made");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!ticker.is_finished());
        ticker.abort();
    }

    #[test]
    fn empty_report() {
        let report = CommandStats::new().report();
        assert_eq!(report, StatsReport::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_all_counted() {
        let stats = Arc::new(CommandStats::new());
        let tasks = 8;
        let per_task = 1_000;

        let handles: Vec<_> = (0..tasks)
            .map(|_| {
                let stats = stats.clone();
                tokio::spawn(async move {
                    for _ in 0..per_task {
                        stats.increment("set");
                    }
                })
            })
            .collect();
        futures::future::try_join_all(handles).await.unwrap();

        let report = stats.report();
        assert_eq!(report.counts.get("set"), Some(&(tasks * per_task)));
        assert_eq!(stats.get("set"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn increments_racing_reports_are_not_lost() {
        let stats = Arc::new(CommandStats::new());
        let writer = {
            let stats = stats.clone();
            tokio::spawn(async move {
                for i in 0..20_000u64 {
                    stats.increment("incr");
                    if i % 1_000 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        let mut seen = 0;
        while !writer.is_finished() {
            seen += stats.report().total;
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
        seen += stats.report().total;

        assert_eq!(seen, 20_000);
        assert_eq!(stats.overall(), 20_000);
    }
}
