// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process resource sampling.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors from sampling
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("process not found: {0}")]
    NotFound(u32),

    #[error("procfs read failed: {0}")]
    Read(String),
}

/// One observation of a process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceSample {
    /// CPU usage since the previous sample, percent of one core.
    pub cpu_percent: f64,
    pub rss_bytes: u64,
    pub open_handles: u64,
}

/// Samples one process by pid.
pub trait ResourceSampler: Clone + Send + Sync + 'static {
    fn sample(&self, pid: u32) -> Result<ResourceSample, SampleError>;
}

#[derive(Clone, Copy)]
struct CpuSnapshot {
    at: Instant,
    jiffies: u64,
}

/// Sampler reading `/proc/<pid>/{stat,statm,fd}` (Linux).
///
/// CPU percent is computed from the jiffy delta between consecutive samples
/// of the same pid; the first sample of a pid reports 0.
#[derive(Clone, Default)]
pub struct ProcfsSampler {
    cpu_state: Arc<Mutex<HashMap<u32, CpuSnapshot>>>,
}

// USER_HZ is 100 on every supported kernel configuration.
const USER_HZ: f64 = 100.0;

const PAGE_SIZE: u64 = 4096;

impl ProcfsSampler {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_jiffies(pid: u32) -> Result<u64, SampleError> {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .map_err(|_| SampleError::NotFound(pid))?;

        // comm may contain spaces; fields are stable after the closing paren
        let (_, after) = stat
            .rsplit_once(')')
            .ok_or_else(|| SampleError::Read(format!("malformed stat for pid {pid}")))?;
        let fields: Vec<&str> = after.split_whitespace().collect();

        // utime and stime are fields 14 and 15 overall, 11 and 12 after comm
        let utime: u64 = fields
            .get(11)
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| SampleError::Read(format!("missing utime for pid {pid}")))?;
        let stime: u64 = fields
            .get(12)
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| SampleError::Read(format!("missing stime for pid {pid}")))?;
        Ok(utime + stime)
    }

    fn read_rss(pid: u32) -> Result<u64, SampleError> {
        let statm = std::fs::read_to_string(format!("/proc/{pid}/statm"))
            .map_err(|_| SampleError::NotFound(pid))?;
        let pages: u64 = statm
            .split_whitespace()
            .nth(1)
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| SampleError::Read(format!("malformed statm for pid {pid}")))?;
        Ok(pages * PAGE_SIZE)
    }

    fn read_open_handles(pid: u32) -> Result<u64, SampleError> {
        let entries = std::fs::read_dir(format!("/proc/{pid}/fd"))
            .map_err(|_| SampleError::NotFound(pid))?;
        Ok(entries.count() as u64)
    }
}

impl ResourceSampler for ProcfsSampler {
    fn sample(&self, pid: u32) -> Result<ResourceSample, SampleError> {
        let rss_bytes = Self::read_rss(pid)?;
        let open_handles = Self::read_open_handles(pid)?;
        let jiffies = Self::read_jiffies(pid)?;
        let now = Instant::now();

        let cpu_percent = {
            let mut state = self.cpu_state.lock();
            let previous = state.insert(pid, CpuSnapshot { at: now, jiffies });
            match previous {
                Some(prev) if now > prev.at => {
                    let cpu_secs = jiffies.saturating_sub(prev.jiffies) as f64 / USER_HZ;
                    let elapsed = (now - prev.at).as_secs_f64();
                    (cpu_secs / elapsed) * 100.0
                }
                _ => 0.0,
            }
        };

        Ok(ResourceSample {
            cpu_percent,
            rss_bytes,
            open_handles,
        })
    }
}

/// Fake sampler for testing; scripted samples per pid, repeating the last.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct FakeSampler {
    inner: Arc<Mutex<HashMap<u32, std::collections::VecDeque<ResourceSample>>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script samples for a pid; consumed in order, the final one repeats.
    pub fn set_samples(&self, pid: u32, samples: Vec<ResourceSample>) {
        self.inner.lock().insert(pid, samples.into());
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ResourceSampler for FakeSampler {
    fn sample(&self, pid: u32) -> Result<ResourceSample, SampleError> {
        let mut inner = self.inner.lock();
        let Some(queue) = inner.get_mut(&pid) else {
            return Ok(ResourceSample::default());
        };
        match queue.len() {
            0 => Ok(ResourceSample::default()),
            1 => Ok(queue[0]),
            _ => queue.pop_front().ok_or(SampleError::NotFound(pid)),
        }
    }
}

#[cfg(test)]
#[path = "sampler_tests.rs"]
mod tests;
