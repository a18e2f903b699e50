// src/miner/scheduler.rs
//! Worker pool
//!
//! Owns the worker threads and the one piece of state they share with the
//! rest of the process: the active job. The job is published by replacing
//! the whole value (`ArcSwapOption`), so a unit never observes a partially
//! updated job. The idle gate (mutex + condvar) exists only so paused or
//! jobless units sleep instead of spinning.

use crate::miner::algorithm::HashEngine;
use crate::miner::job::{Job, Solution};
use crate::miner::worker::Worker;
use crate::stats::hashrate::{Hashrate, HashrateSnapshot, format_rate};
use crate::utils::error::MinerError;
use crate::utils::platform;
use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// A worker unit terminated on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFault {
    /// Index of the unit that stopped
    pub index: usize,
    /// What went wrong
    pub reason: String,
}

/// State shared between the pool handle and every worker unit
pub(crate) struct Shared {
    job: ArcSwapOption<Job>,
    version: AtomicU64,
    enabled: AtomicBool,
    running: AtomicBool,
    gate: Mutex<()>,
    wake: Condvar,
}

impl Shared {
    fn new() -> Self {
        Shared {
            job: ArcSwapOption::empty(),
            version: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
            running: AtomicBool::new(false),
            gate: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    /// Applies a state change and wakes every idle unit
    ///
    /// Changes happen under the gate so a unit about to sleep cannot miss
    /// the wakeup.
    fn update(&self, change: impl FnOnce(&Self)) {
        let _gate = self.gate.lock();
        change(self);
        self.wake.notify_all();
    }

    pub(crate) fn active_version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Hot-loop check: keep hashing `version`?
    pub(crate) fn should_hash(&self, version: u64) -> bool {
        self.running.load(Ordering::Relaxed)
            && self.enabled.load(Ordering::Relaxed)
            && self.active_version() == version
    }

    /// Blocks until there is something to hash
    ///
    /// Returns `None` once the pool is stopping. `exhausted` names a job
    /// version the caller has no nonces left for.
    pub(crate) fn wait_for_work(&self, exhausted: Option<u64>) -> Option<Arc<Job>> {
        let mut gate = self.gate.lock();
        loop {
            if !self.running.load(Ordering::Acquire) {
                return None;
            }
            if self.enabled.load(Ordering::Acquire) {
                if let Some(job) = self.job.load_full() {
                    if job.version == self.active_version() && Some(job.version) != exhausted {
                        return Some(job);
                    }
                }
            }
            self.wake.wait(&mut gate);
        }
    }
}

/// Thread bookkeeping created by [`WorkerPool::start`]
struct Units {
    hashes: Arc<Vec<AtomicU64>>,
    affinity: Vec<Option<usize>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Fixed-size pool of hashing threads
pub struct WorkerPool {
    engine: Arc<dyn HashEngine>,
    shared: Arc<Shared>,
    solutions: UnboundedSender<Solution>,
    faults: UnboundedSender<UnitFault>,
    units: OnceLock<Units>,
    active: Arc<AtomicUsize>,
    last_version: AtomicU64,
    hashrate: Mutex<Hashrate>,
}

/// Decrements the live-unit count when a worker thread exits, panic or not
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerPool {
    /// Creates an idle pool
    ///
    /// # Arguments
    /// * `engine` - Hash engine that already passed its pre-flight check
    /// * `solutions` - Where units send digests that meet the target
    /// * `faults` - Where units report that they terminated
    pub fn new(
        engine: Arc<dyn HashEngine>,
        solutions: UnboundedSender<Solution>,
        faults: UnboundedSender<UnitFault>,
    ) -> Self {
        WorkerPool {
            engine,
            shared: Arc::new(Shared::new()),
            solutions,
            faults,
            units: OnceLock::new(),
            active: Arc::new(AtomicUsize::new(0)),
            last_version: AtomicU64::new(0),
            hashrate: Mutex::new(Hashrate::new(0)),
        }
    }

    /// Spawns `threads` worker units
    ///
    /// # Arguments
    /// * `threads` - Number of units, at least one
    /// * `affinity` - Optional CPU bit mask; unit `i` takes the `i`-th set bit
    /// * `priority` - Optional 0..=5 scheduling priority for every unit
    ///
    /// Exactly `threads` units are counted as active when this returns.
    pub fn start(
        &self,
        threads: usize,
        affinity: Option<u64>,
        priority: Option<u8>,
    ) -> Result<(), MinerError> {
        if threads == 0 {
            return Err(MinerError::ConfigError("thread count must be at least 1".into()));
        }

        let pinning: Vec<Option<usize>> = (0..threads)
            .map(|i| affinity.and_then(|mask| platform::affinity_for(i, mask)))
            .collect();
        let hashes: Arc<Vec<AtomicU64>> = Arc::new((0..threads).map(|_| AtomicU64::new(0)).collect());

        self.units
            .set(Units {
                hashes: Arc::clone(&hashes),
                affinity: pinning.clone(),
                handles: Mutex::new(Vec::with_capacity(threads)),
            })
            .map_err(|_| MinerError::WorkerError("worker pool already started".into()))?;
        let units = self
            .units
            .get()
            .ok_or_else(|| MinerError::WorkerError("worker pool state missing".into()))?;

        *self.hashrate.lock() = Hashrate::new(threads);
        self.shared.update(|s| s.running.store(true, Ordering::Release));

        for (index, cpu) in pinning.into_iter().enumerate() {
            let mut worker = Worker::new(
                index,
                threads,
                Arc::clone(&self.engine),
                Arc::clone(&self.shared),
                Arc::clone(&hashes),
                self.solutions.clone(),
            );
            let faults = self.faults.clone();

            self.active.fetch_add(1, Ordering::SeqCst);
            let guard = ActiveGuard(Arc::clone(&self.active));

            let spawned = std::thread::Builder::new()
                .name(format!("worker-{}", index))
                .spawn(move || {
                    prepare_thread(index, cpu, priority);

                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.run()));
                    let reason = match outcome {
                        Ok(Ok(())) => return,
                        Ok(Err(e)) => e.to_string(),
                        Err(payload) => panic_message(payload.as_ref()),
                    };
                    // Count the unit as gone before anyone hears about it.
                    drop(guard);
                    log::error!("thread #{} terminated: {}", index, reason);
                    let _ = faults.send(UnitFault { index, reason });
                });

            match spawned {
                Ok(handle) => units.handles.lock().push(handle),
                Err(e) => {
                    self.stop();
                    return Err(MinerError::WorkerError(format!(
                        "failed to spawn thread #{}: {}",
                        index, e
                    )));
                }
            }
        }

        log::info!(
            "READY threads {} ({} algo, affinity {}, priority {})",
            threads,
            self.engine.algorithm_type(),
            affinity.map_or_else(|| "auto".to_string(), |m| format!("{:#x}", m)),
            priority.map_or_else(|| "default".to_string(), |p| p.to_string()),
        );
        Ok(())
    }

    /// Stops and joins every unit
    ///
    /// No unit starts another hash loop iteration after this returns; one
    /// already in flight is allowed to finish first. Calling it again is a
    /// no-op.
    pub fn stop(&self) {
        self.shared.update(|s| s.running.store(false, Ordering::Release));

        let Some(units) = self.units.get() else {
            return;
        };
        let handles = std::mem::take(&mut *units.handles.lock());
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            let _ = handle.join();
        }
        log::debug!("worker pool stopped");
    }

    /// Soft pause: units stay alive but stop hashing
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.update(|s| s.enabled.store(enabled, Ordering::Release));
    }

    /// Last value passed to [`WorkerPool::set_enabled`]
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Makes `job` the active job
    ///
    /// Returns `false` and ignores the job if its version is not newer than
    /// every version published before.
    pub fn publish(&self, job: Job) -> bool {
        let version = job.version;
        if self.last_version.fetch_max(version, Ordering::AcqRel) >= version {
            log::warn!("ignoring out-of-order {}", job);
            return false;
        }

        let job = Arc::new(job);
        self.shared.update(|s| {
            s.job.store(Some(job));
            s.version.store(version, Ordering::Release);
        });
        true
    }

    /// Drops the active job; units idle until the next publish
    pub fn clear_job(&self) {
        self.shared.update(|s| {
            s.job.store(None);
            s.version.store(0, Ordering::Release);
        });
    }

    /// Currently active job, if any
    pub fn active_job(&self) -> Option<Arc<Job>> {
        self.shared.job.load_full()
    }

    /// Version of the active job, `0` when there is none
    pub fn active_version(&self) -> u64 {
        self.shared.active_version()
    }

    /// Units whose thread is still alive
    pub fn active_units(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Units the pool was started with
    pub fn thread_count(&self) -> usize {
        self.units.get().map_or(0, |u| u.hashes.len())
    }

    /// Hashes computed by all units since start
    pub fn total_hashes(&self) -> u64 {
        self.units.get().map_or(0, |u| {
            u.hashes.iter().map(|h| h.load(Ordering::Relaxed)).sum()
        })
    }

    /// Samples every unit's hash counter; called periodically by the engine
    pub fn tick_hashrate(&self) {
        let Some(units) = self.units.get() else {
            return;
        };
        let now = Instant::now();
        let mut hashrate = self.hashrate.lock();
        for (index, counter) in units.hashes.iter().enumerate() {
            hashrate.add(index, counter.load(Ordering::Relaxed), now);
        }
        hashrate.update_highest();
    }

    /// Total rates for the three reporting windows
    pub fn hashrate(&self) -> HashrateSnapshot {
        self.hashrate.lock().total()
    }

    /// Highest 10 s total seen so far
    pub fn highest_hashrate(&self) -> f64 {
        self.hashrate.lock().highest()
    }

    /// Logs current throughput, per unit when `detail` is set
    pub fn print_hashrate(&self, detail: bool) {
        let hashrate = self.hashrate.lock();

        if detail {
            if let Some(units) = self.units.get() {
                log::info!("| THREAD | AFFINITY | 10s H/s | 60s H/s | 15m H/s |");
                for (index, cpu) in units.affinity.iter().enumerate() {
                    let rate = hashrate.snapshot(index);
                    log::info!(
                        "| {:>6} | {:>8} | {:>7} | {:>7} | {:>7} |",
                        index,
                        cpu.map_or_else(|| "-".to_string(), |c| c.to_string()),
                        format_rate(rate.short),
                        format_rate(rate.medium),
                        format_rate(rate.large),
                    );
                }
            }
        }

        let total = hashrate.total();
        log::info!(
            "speed 10s/60s/15m {} {} {} H/s max {:.1} H/s",
            format_rate(total.short),
            format_rate(total.medium),
            format_rate(total.large),
            hashrate.highest(),
        );
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn prepare_thread(index: usize, cpu: Option<usize>, priority: Option<u8>) {
    if let Some(cpu) = cpu {
        if !platform::pin_current_thread(cpu) {
            log::warn!("thread #{} could not be pinned to CPU {}", index, cpu);
        }
    }
    if let Some(priority) = priority {
        if let Err(e) = platform::set_current_thread_priority(priority) {
            log::warn!("thread #{}: {}", index, e);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::testing::{FaultyEngine, NonceEngine};
    use crate::miner::job::{MIN_BLOB_SIZE, Target};
    use crate::types::AlgorithmType;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn pool_with(
        engine: Arc<dyn HashEngine>,
    ) -> (WorkerPool, UnboundedReceiver<Solution>, UnboundedReceiver<UnitFault>) {
        let (sol_tx, sol_rx) = mpsc::unbounded_channel();
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        (WorkerPool::new(engine, sol_tx, fault_tx), sol_rx, fault_rx)
    }

    fn job(version: u64, target: u64) -> Job {
        Job::new(
            format!("job-{}", version),
            AlgorithmType::RandomX,
            vec![0u8; MIN_BLOB_SIZE],
            Target::from_u64(target).unwrap(),
            0,
            1,
            version,
        )
        .unwrap()
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn start_and_stop_account_for_every_unit() {
        for threads in [1usize, 2, 5] {
            let (pool, _sol, _faults) = pool_with(Arc::new(NonceEngine));
            pool.start(threads, None, None).unwrap();
            assert_eq!(pool.active_units(), threads);
            assert_eq!(pool.thread_count(), threads);
            pool.stop();
            assert_eq!(pool.active_units(), 0);
            pool.stop();
        }
    }

    #[test]
    fn zero_threads_and_double_start_are_rejected() {
        let (pool, _sol, _faults) = pool_with(Arc::new(NonceEngine));
        assert!(pool.start(0, None, None).is_err());
        pool.start(1, None, None).unwrap();
        assert!(pool.start(1, None, None).is_err());
    }

    #[test]
    fn solutions_come_from_the_owning_unit() {
        let (pool, mut sol, _faults) = pool_with(Arc::new(NonceEngine));
        pool.start(4, None, None).unwrap();
        // Only nonces 0..3 meet the target; all live in unit 0's region.
        assert!(pool.publish(job(1, 3)));

        let mut found = Vec::new();
        assert!(wait_until(|| {
            while let Ok(s) = sol.try_recv() {
                found.push(s);
            }
            found.len() == 3
        }));
        pool.stop();

        let nonces: Vec<u32> = found.iter().map(|s| s.nonce).collect();
        assert_eq!(nonces, vec![0, 1, 2]);
        assert!(found.iter().all(|s| s.job_version == 1 && s.job_id == "job-1"));
    }

    #[test]
    fn superseded_job_yields_no_solutions() {
        let (pool, mut sol, _faults) = pool_with(Arc::new(NonceEngine));
        pool.set_enabled(false);
        pool.start(2, None, None).unwrap();

        assert!(pool.publish(job(1, 10)));
        assert!(pool.publish(job(2, 10)));
        pool.set_enabled(true);

        let mut found = Vec::new();
        assert!(wait_until(|| {
            while let Ok(s) = sol.try_recv() {
                found.push(s);
            }
            found.len() == 10
        }));
        pool.stop();
        assert!(found.iter().all(|s| s.job_version == 2));
    }

    #[test]
    fn out_of_order_versions_are_ignored() {
        let (pool, _sol, _faults) = pool_with(Arc::new(NonceEngine));
        assert!(pool.publish(job(5, 1)));
        assert!(!pool.publish(job(4, 1)));
        assert!(!pool.publish(job(5, 1)));
        assert_eq!(pool.active_version(), 5);

        pool.clear_job();
        assert_eq!(pool.active_version(), 0);
        assert!(pool.active_job().is_none());
        assert!(pool.publish(job(6, 1)));
    }

    #[test]
    fn disabling_idles_and_enabling_resumes() {
        let (pool, _sol, _faults) = pool_with(Arc::new(NonceEngine));
        pool.start(2, None, None).unwrap();
        pool.publish(job(1, 1));
        assert!(wait_until(|| pool.total_hashes() > 1000));

        pool.set_enabled(false);
        assert!(!pool.is_enabled());
        std::thread::sleep(Duration::from_millis(50));
        let paused = pool.total_hashes();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(pool.total_hashes(), paused);
        assert_eq!(pool.active_units(), 2);

        pool.set_enabled(true);
        assert!(wait_until(|| pool.total_hashes() > paused));
        pool.stop();
    }

    #[test]
    fn no_job_means_no_hashing() {
        let (pool, _sol, _faults) = pool_with(Arc::new(NonceEngine));
        pool.start(2, None, None).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(pool.total_hashes(), 0);
        pool.stop();
    }

    #[test]
    fn faulty_unit_stops_alone() {
        // Unit 1 of 2 starts at nonce 2^31 and fails on its first hash.
        let (pool, _sol, mut faults) = pool_with(Arc::new(FaultyEngine { fail_at: 1 << 31 }));
        pool.start(2, None, None).unwrap();
        pool.publish(job(1, 1));

        let mut fault = None;
        assert!(wait_until(|| {
            fault = faults.try_recv().ok();
            fault.is_some()
        }));
        let fault = fault.unwrap();
        assert_eq!(pool.active_units(), 1);
        assert_eq!(fault.index, 1);
        assert!(fault.reason.contains("bad nonce"));

        let before = pool.total_hashes();
        assert!(wait_until(|| pool.total_hashes() > before));
        pool.stop();
        assert_eq!(pool.active_units(), 0);
    }

    #[test]
    fn hashrate_is_sampled() {
        let (pool, _sol, _faults) = pool_with(Arc::new(NonceEngine));
        pool.start(1, None, None).unwrap();
        pool.publish(job(1, 1));
        pool.tick_hashrate();
        std::thread::sleep(Duration::from_millis(50));
        pool.tick_hashrate();
        assert!(pool.hashrate().short.is_some_and(|r| r > 0.0));
        pool.print_hashrate(true);
        pool.stop();
    }
}
