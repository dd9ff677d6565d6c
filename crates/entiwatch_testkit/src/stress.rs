//! Stress tests for EntiWatch.
//!
//! These verify dispatch under heavy commit load, concurrent publishers and
//! registry churn while notifications are in flight.

use crate::fixtures::{Recorder, TestHarness};
use entiwatch_core::{FilterCriteria, FilteredObserver, ObjectId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of commits to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Number of filtered observers registered before the run.
    pub observers: usize,
    /// Number of objects seeded before the run.
    pub object_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            observers: 8,
            object_count: 256,
        }
    }
}

impl StressConfig {
    /// Creates a configuration small enough for unit tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            operations: 200,
            threads: 4,
            observers: 4,
            object_count: 16,
        }
    }
}

fn register_recorders(harness: &TestHarness, count: usize) -> Vec<Recorder> {
    (0..count)
        .map(|n| {
            let recorder = Recorder::new();
            harness.observer.add_filtered_observer(
                FilteredObserver::new(FilterCriteria::new().with_type("Item"), recorder.callback())
                    .with_label(format!("stress-{n}")),
            );
            recorder
        })
        .collect()
}

fn update_one(harness: &TestHarness, id: ObjectId, value: i64) -> bool {
    harness
        .store
        .transaction(|tx| tx.set(id, "n", value))
        .is_ok()
}

/// Run a sequential commit stress test.
///
/// Every commit updates one seeded object, so each recorder must see
/// exactly one delivery per successful commit.
pub fn stress_sequential_commits(harness: &TestHarness, config: &StressConfig) -> StressTestResult {
    let ids = harness.seed("Item", config.object_count.max(1));
    let recorders = register_recorders(harness, config.observers);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let id = ids[i % ids.len()];
        if update_one(harness, id, -(i as i64) - 1) {
            successful += 1;
        } else {
            failed += 1;
        }
    }

    for recorder in &recorders {
        assert_eq!(recorder.len(), successful, "recorder missed deliveries");
    }
    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a concurrent commit stress test.
///
/// Threads update disjoint slices of the seeded objects.
pub fn stress_concurrent_commits(
    harness: Arc<TestHarness>,
    config: &StressConfig,
) -> StressTestResult {
    let threads = config.threads.max(1);
    let ids = Arc::new(harness.seed("Item", config.object_count.max(threads)));
    let recorders = register_recorders(&harness, config.observers);

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let per_thread = config.operations / threads;

    let start = Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let harness = Arc::clone(&harness);
            let ids = Arc::clone(&ids);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            thread::spawn(move || {
                for i in 0..per_thread {
                    let id = ids[(i * threads + t) % ids.len()];
                    if update_one(&harness, id, (t * per_thread + i) as i64 + 1_000_000) {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let successful = successful.load(Ordering::Relaxed);
    for recorder in &recorders {
        assert_eq!(recorder.len(), successful, "recorder missed deliveries");
    }
    StressTestResult::new(successful, failed.load(Ordering::Relaxed), start.elapsed())
}

/// Run commits while another thread adds and removes filtered observers.
///
/// A long-lived recorder registered up front must still see every commit.
pub fn stress_registration_churn(
    harness: Arc<TestHarness>,
    config: &StressConfig,
) -> StressTestResult {
    let ids = harness.seed("Item", config.object_count.max(1));
    let steady = register_recorders(&harness, 1);
    let running = Arc::new(AtomicBool::new(true));

    let churn = {
        let harness = Arc::clone(&harness);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut cycles = 0usize;
            while running.load(Ordering::Relaxed) {
                let id = harness
                    .observer
                    .add_filtered_observer(FilteredObserver::all(|_, _, _| Ok(())));
                harness
                    .observer
                    .remove_filtered_observer(id)
                    .expect("Failed to remove just-registered observer");
                cycles += 1;
            }
            cycles
        })
    };

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;
    for i in 0..config.operations {
        if update_one(&harness, ids[i % ids.len()], -(i as i64) - 1) {
            successful += 1;
        } else {
            failed += 1;
        }
    }
    running.store(false, Ordering::Relaxed);
    let cycles = churn.join().expect("Churn thread panicked");

    assert_eq!(steady[0].len(), successful, "steady recorder missed deliveries");
    assert_eq!(harness.observer.filtered_observer_count(), 1);
    StressTestResult::new(successful + cycles, failed, start.elapsed())
}
