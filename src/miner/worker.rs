// src/miner/worker.rs
//! Worker unit hash loop
//!
//! One [`Worker`] runs on each pool thread. It takes the active job, walks
//! its own [`NonceRange`] and hands digests that meet the target to the
//! pool client. A newer job version, a pause, or a stop request ends the
//! current pass before the next hash call.

use crate::miner::algorithm::HashEngine;
use crate::miner::job::{Job, Solution, write_nonce};
use crate::miner::nonce::NonceRange;
use crate::miner::scheduler::Shared;
use crate::utils::error::MinerError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;

/// Why a pass over the nonce range ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Job changed, pool paused, or pool stopping
    Interrupted,
    /// Every nonce of the unit's region was hashed
    Exhausted,
}

/// State owned by a single worker unit
pub struct Worker {
    index: usize,
    units: usize,
    engine: Arc<dyn HashEngine>,
    shared: Arc<Shared>,
    hashes: Arc<Vec<AtomicU64>>,
    solutions: UnboundedSender<Solution>,
    range: Option<NonceRange>,
    blob: Vec<u8>,
}

impl Worker {
    pub(crate) fn new(
        index: usize,
        units: usize,
        engine: Arc<dyn HashEngine>,
        shared: Arc<Shared>,
        hashes: Arc<Vec<AtomicU64>>,
        solutions: UnboundedSender<Solution>,
    ) -> Self {
        Worker {
            index,
            units,
            engine,
            shared,
            hashes,
            solutions,
            range: None,
            blob: Vec::new(),
        }
    }

    /// Runs until the pool is stopped
    ///
    /// A hash error ends the unit; the caller reports it as a fault.
    pub fn run(&mut self) -> Result<(), MinerError> {
        let mut exhausted = None;

        while let Some(job) = self.shared.wait_for_work(exhausted) {
            exhausted = None;

            let stale = self
                .range
                .as_ref()
                .is_none_or(|range| range.job_version() != job.version);
            if stale {
                // Nothing from the previous version is worth finishing.
                self.range = Some(NonceRange::for_unit(job.version, self.index, self.units));
                self.blob.clear();
                self.blob.extend_from_slice(&job.blob);
            }

            if self.mine(&job)? == Pass::Exhausted {
                log::warn!(
                    "thread #{} exhausted its nonce range for {}, waiting for a new job",
                    self.index,
                    job
                );
                exhausted = Some(job.version);
            }
        }

        log::debug!("thread #{} stopped", self.index);
        Ok(())
    }

    fn mine(&mut self, job: &Job) -> Result<Pass, MinerError> {
        let Some(range) = self.range.as_mut() else {
            return Ok(Pass::Interrupted);
        };
        let counter = &self.hashes[self.index];

        loop {
            if !self.shared.should_hash(job.version) {
                return Ok(Pass::Interrupted);
            }
            let Some(nonce) = range.next_nonce() else {
                return Ok(Pass::Exhausted);
            };

            write_nonce(&mut self.blob, nonce);
            let digest = self.engine.hash(&self.blob)?;
            counter.fetch_add(1, Ordering::Relaxed);

            if job.target.is_met_by(&digest) {
                if self.shared.active_version() != job.version {
                    log::debug!("thread #{} dropped stale result for {}", self.index, job.id);
                    return Ok(Pass::Interrupted);
                }
                let solution = Solution {
                    job_id: job.id.clone(),
                    job_version: job.version,
                    nonce,
                    digest,
                };
                if self.solutions.send(solution).is_err() {
                    log::debug!("thread #{}: nobody is collecting solutions", self.index);
                }
            }
        }
    }
}
