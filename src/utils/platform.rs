// src/utils/platform.rs
//! OS primitives used by the worker pool and the supervisor
//!
//! Thin wrappers over `core_affinity`, `setpriority(2)` and the shell, so
//! the rest of the crate never touches them directly.

use crate::utils::error::MinerError;
use tokio::process::Command;

/// Picks the CPU a worker unit should be pinned to
///
/// Unit `index` gets the `index`-th set bit of `mask`, wrapping around when
/// there are more units than set bits. A zero mask means "do not pin".
pub fn affinity_for(index: usize, mask: u64) -> Option<usize> {
    let cpus: Vec<usize> = (0..64).filter(|bit| mask & (1u64 << bit) != 0).collect();
    if cpus.is_empty() {
        return None;
    }
    Some(cpus[index % cpus.len()])
}

/// Pins the calling thread to `cpu`
///
/// Returns `false` when the CPU does not exist or the OS refused.
pub fn pin_current_thread(cpu: usize) -> bool {
    let Some(ids) = core_affinity::get_core_ids() else {
        return false;
    };
    match ids.into_iter().find(|core| core.id == cpu) {
        Some(core) => core_affinity::set_for_current(core),
        None => false,
    }
}

/// Maps the 0..=5 priority scale onto a nice value
///
/// 0 is idle, 2 is "normal", 5 is the highest the miner will ask for.
pub fn nice_for(priority: u8) -> i32 {
    match priority {
        0 => 19,
        1 => 5,
        2 => 0,
        3 => -1,
        4 => -2,
        _ => -5,
    }
}

/// Applies a scheduling priority to the calling thread
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
pub fn set_current_thread_priority(priority: u8) -> Result<(), MinerError> {
    let nice = nice_for(priority);
    // On Linux PRIO_PROCESS with who = 0 targets the calling thread only.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if rc != 0 {
        return Err(MinerError::WorkerError(format!(
            "setpriority({}) failed: {}",
            nice,
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Applies a scheduling priority to the calling thread (unsupported here)
#[cfg(not(target_os = "linux"))]
pub fn set_current_thread_priority(priority: u8) -> Result<(), MinerError> {
    log::debug!("thread priority {} not supported on this platform", priority);
    Ok(())
}

/// Runs the operator-configured reboot command through the shell
///
/// The child is awaited on the runtime, so timers and other tasks keep
/// running while it executes.
pub async fn run_reboot_command(command: &str) -> Result<(), MinerError> {
    log::warn!("executing reboot command: {}", command);

    #[cfg(unix)]
    let status = Command::new("sh").arg("-c").arg(command).status().await?;
    #[cfg(windows)]
    let status = Command::new("cmd").arg("/C").arg(command).status().await?;

    if !status.success() {
        return Err(MinerError::TaskError(format!(
            "reboot command exited with {}",
            status
        )));
    }
    Ok(())
}
