use crate::sys::AffinityProvider;
use crate::{CpuSet, DiscoveryResult};

/// The CPU worker `worker_index` maps to, or `None` when discovery degraded.
///
/// Workers take the discovered CPUs in ascending order and wrap around once every CPU has one,
/// so `worker_index` and `worker_index + cpu_count` always land on the same CPU.
pub fn select_cpu(result: &DiscoveryResult, worker_index: usize) -> Option<usize> {
    if result.is_degraded() {
        return None;
    }
    let set = result.cpu_set()?;

    // One pass over the set is enough once the index is reduced.
    let mut remaining = worker_index % result.cpu_count().get();
    let mut cpu = 0;
    loop {
        if set.contains(cpu) {
            if remaining == 0 {
                return Some(cpu);
            }
            remaining -= 1;
        }

        cpu += 1;
        if cpu >= set.capacity() {
            cpu = 0;
        }
    }
}

/// Restrict the calling thread to the CPU selected for `worker_index`.
///
/// Pinning is advisory: a degraded `result` makes this a no-op and OS failures are only logged.
pub fn pin<P: AffinityProvider + ?Sized>(
    provider: &P,
    result: &DiscoveryResult,
    worker_index: usize,
) {
    let (Some(cpu), Some(discovered)) = (select_cpu(result, worker_index), result.cpu_set())
    else {
        return;
    };

    let target = CpuSet::from_cpus(discovered.capacity(), [cpu]);

    match provider.bind_current_thread(&target) {
        Ok(()) => log::trace!("Worker #{worker_index} pinned to CPU {cpu}"),
        Err(err) => log::debug!("Could not pin worker #{worker_index} to CPU {cpu}: {err}"),
    }
}
