// src/miner/nonce.rs
//! Per-unit nonce ranges
//!
//! The 32-bit nonce space is cut into one contiguous region per worker
//! unit, so two units can never hash the same `(job version, nonce)`.

/// A worker's private slice of the nonce space for one job version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceRange {
    job_version: u64,
    start: u64,
    end: u64,
    cursor: u64,
}

impl NonceRange {
    /// Region owned by unit `index` out of `units` for `job_version`
    ///
    /// The last unit absorbs the remainder of the space.
    pub fn for_unit(job_version: u64, index: usize, units: usize) -> Self {
        let units = units.max(1) as u64;
        let index = (index as u64).min(units - 1);
        let space = u32::MAX as u64 + 1;
        let span = space / units;
        let start = span * index;
        let end = if index == units - 1 {
            space
        } else {
            start + span
        };

        NonceRange {
            job_version,
            start,
            end,
            cursor: start,
        }
    }

    /// Job version this range was cut for
    pub fn job_version(&self) -> u64 {
        self.job_version
    }

    /// First nonce of the region
    pub fn start(&self) -> u64 {
        self.start
    }

    /// One past the last nonce of the region
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Nonces handed out so far
    pub fn consumed(&self) -> u64 {
        self.cursor - self.start
    }

    /// Whether every nonce of the region has been handed out
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.end
    }

    /// Takes the next nonce, advancing the cursor
    pub fn next_nonce(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        let nonce = self.cursor as u32;
        self.cursor += 1;
        Some(nonce)
    }
}
