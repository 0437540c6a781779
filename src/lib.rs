//! Discover the CPUs available to the process and pin worker threads to them.
//!
//! ```no_run
//! let workers = cpupin::cpu_count();
//! std::thread::scope(|s| {
//!     for index in 0..workers {
//!         s.spawn(move || {
//!             cpupin::pin_current_thread(index);
//!             // ... worker body ...
//!         });
//!     }
//! });
//! ```

use std::num::NonZeroUsize;
use std::sync::OnceLock;

mod binder;
mod cpu_set;
mod probe;
pub mod sys;

pub use binder::select_cpu;
pub use cpu_set::CpuSet;
pub use probe::{discover, DiscoveryResult, INITIAL_CAPACITY, MAX_CAPACITY};
pub use sys::{AffinityProvider, BuildTargetProvider, ProviderError};

/// Discovered CPUs together with the provider used to bind threads to them.
///
/// The discovery result never changes after construction, so a shared reference can be used
/// from every worker thread at once.
#[derive(Debug)]
pub struct Affinity<P = BuildTargetProvider> {
    provider: P,
    result: DiscoveryResult,
}

impl Affinity {
    /// The process-wide instance, discovered on first use.
    pub fn global() -> &'static Affinity {
        static GLOBAL: OnceLock<Affinity> = OnceLock::new();
        GLOBAL.get_or_init(|| Affinity::with_provider(BuildTargetProvider::default()))
    }
}

impl<P: AffinityProvider> Affinity<P> {
    /// Run discovery through `provider`.
    pub fn with_provider(provider: P) -> Self {
        let result = discover(&provider);
        Self { provider, result }
    }

    /// Use an already known result instead of asking the provider.
    pub fn from_parts(provider: P, result: DiscoveryResult) -> Self {
        Self { provider, result }
    }

    /// Number of CPUs available to the process. At least one, even when discovery failed.
    pub fn cpu_count(&self) -> NonZeroUsize {
        self.result.cpu_count()
    }

    /// The discovery result this handle pins against.
    pub fn result(&self) -> &DiscoveryResult {
        &self.result
    }

    /// The CPU that [`pin`](Self::pin) binds worker `worker_index` to.
    pub fn select_cpu(&self, worker_index: usize) -> Option<usize> {
        select_cpu(&self.result, worker_index)
    }

    /// Pin the calling thread to the CPU selected for `worker_index`.
    ///
    /// Must be called from the worker thread itself. Never fails; see [`select_cpu`] for the
    /// mapping.
    pub fn pin(&self, worker_index: usize) {
        binder::pin(&self.provider, &self.result, worker_index);
    }
}

/// Number of CPUs available to the process, from [`Affinity::global`].
pub fn cpu_count() -> usize {
    Affinity::global().cpu_count().get()
}

/// Pin the calling thread using [`Affinity::global`].
pub fn pin_current_thread(worker_index: usize) {
    Affinity::global().pin(worker_index);
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::sys::MockAffinityProvider;

    #[test]
    fn discovers_once_and_pins_through_provider() {
        let bound = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&bound);

        let mut provider = MockAffinityProvider::new();
        provider
            .expect_process_affinity()
            .times(1)
            .returning(|set: &mut CpuSet| {
                for cpu in 0..4 {
                    set.insert(cpu);
                }
                Ok(())
            });
        provider
            .expect_bind_current_thread()
            .times(4)
            .returning(move |set: &CpuSet| {
                seen.lock().unwrap().push(set.first().unwrap());
                Ok(())
            });

        let affinity = Affinity::with_provider(provider);
        assert_eq!(affinity.cpu_count().get(), 4);

        for index in [0, 3, 4, 5] {
            affinity.pin(index);
        }
        assert_eq!(*bound.lock().unwrap(), vec![0, 3, 0, 1]);
    }

    #[test]
    fn pins_from_many_threads() {
        let bound = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&bound);

        let mut provider = MockAffinityProvider::new();
        provider
            .expect_bind_current_thread()
            .times(6)
            .returning(move |set: &CpuSet| {
                seen.lock().unwrap().push(set.first().unwrap());
                Ok(())
            });

        let result = DiscoveryResult::from_set(CpuSet::from_cpus(1024, [2, 5, 7]));
        let affinity = Affinity::from_parts(provider, result);

        std::thread::scope(|s| {
            for index in 0..6 {
                let affinity = &affinity;
                s.spawn(move || affinity.pin(index));
            }
        });

        let mut bound = bound.lock().unwrap().clone();
        bound.sort_unstable();
        assert_eq!(bound, vec![2, 2, 5, 5, 7, 7]);
    }

    #[test]
    fn failed_discovery_keeps_working() {
        let mut provider = MockAffinityProvider::new();
        provider
            .expect_process_affinity()
            .times(1)
            .returning(|_| Err(ProviderError::Unsupported));
        provider.expect_bind_current_thread().never();

        let affinity = Affinity::with_provider(provider);
        assert_eq!(affinity.cpu_count().get(), 1);
        assert_eq!(affinity.select_cpu(0), None);
        affinity.pin(0);
        affinity.pin(42);
    }
}
