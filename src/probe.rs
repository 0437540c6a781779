use std::num::NonZeroUsize;

use crate::sys::{AffinityProvider, ProviderError};
use crate::CpuSet;

/// Number of CPU slots the first probe attempt allocates.
pub const INITIAL_CAPACITY: usize = 1024;

/// Probing gives up once the set would grow past this many slots.
pub const MAX_CAPACITY: usize = 1 << 20;

/// What discovery learned about the CPUs available to the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    cpu_set: Option<CpuSet>,
    cpu_count: NonZeroUsize,
    set_size: usize,
}

impl DiscoveryResult {
    /// The result used when nothing could be discovered: one CPU, no usable set.
    pub fn degraded() -> Self {
        Self {
            cpu_set: None,
            cpu_count: NonZeroUsize::MIN,
            set_size: 0,
        }
    }

    /// Wrap a populated set. An empty set yields the degraded result.
    pub fn from_set(cpu_set: CpuSet) -> Self {
        match NonZeroUsize::new(cpu_set.count()) {
            Some(cpu_count) => Self {
                set_size: cpu_set.byte_size(),
                cpu_set: Some(cpu_set),
                cpu_count,
            },
            None => Self::degraded(),
        }
    }

    /// The discovered set, `None` when discovery degraded.
    pub fn cpu_set(&self) -> Option<&CpuSet> {
        self.cpu_set.as_ref()
    }

    /// Number of discovered CPUs, at least one.
    pub fn cpu_count(&self) -> NonZeroUsize {
        self.cpu_count
    }

    /// Byte size of the discovered set; zero when discovery degraded.
    pub fn set_size(&self) -> usize {
        self.set_size
    }

    pub fn is_degraded(&self) -> bool {
        self.set_size == 0
    }

    /// Discovered CPU ids, ascending. Empty when discovery degraded.
    pub fn cpus(&self) -> impl Iterator<Item = usize> + '_ {
        self.cpu_set.iter().flat_map(|set| set.iter())
    }
}

/// Ask `provider` for the process affinity mask, doubling the set until it fits.
///
/// Never fails: any error other than "too small" yields [`DiscoveryResult::degraded`].
pub fn discover<P: AffinityProvider + ?Sized>(provider: &P) -> DiscoveryResult {
    let mut capacity = INITIAL_CAPACITY;

    while capacity <= MAX_CAPACITY {
        let mut set = CpuSet::with_capacity(capacity);

        match provider.process_affinity(&mut set) {
            Ok(()) => {
                let result = DiscoveryResult::from_set(set);
                if result.is_degraded() {
                    log::warn!("Process affinity mask is empty, assuming a single CPU");
                } else {
                    log::debug!(
                        "Discovered {} CPUs in a set of {} slots",
                        result.cpu_count(),
                        capacity
                    );
                }
                return result;
            }
            Err(ProviderError::TooSmall { .. }) => {
                log::debug!("CPU set of {capacity} slots is too small, retrying");
                capacity *= 2;
            }
            Err(err) => {
                log::warn!("CPU discovery failed, assuming a single CPU: {err}");
                return DiscoveryResult::degraded();
            }
        }
    }

    log::warn!("No CPU set up to {MAX_CAPACITY} slots was large enough, assuming a single CPU");
    DiscoveryResult::degraded()
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::sys::MockAffinityProvider;

    #[test]
    fn failure_degrades_to_one_cpu() {
        let mut provider = MockAffinityProvider::new();
        provider
            .expect_process_affinity()
            .times(1)
            .returning(|_| Err(io::Error::from(io::ErrorKind::PermissionDenied).into()));

        let result = discover(&provider);

        assert_eq!(result.cpu_count().get(), 1);
        assert_eq!(result.set_size(), 0);
        assert!(result.cpu_set().is_none());
        assert!(result.is_degraded());
    }

    #[test]
    fn unsupported_degrades_to_one_cpu() {
        let mut provider = MockAffinityProvider::new();
        provider
            .expect_process_affinity()
            .times(1)
            .returning(|_| Err(ProviderError::Unsupported));

        assert_eq!(discover(&provider), DiscoveryResult::degraded());
    }

    #[test]
    fn grows_until_mask_fits() {
        const THRESHOLD: usize = 5000;
        let attempts = Arc::new(Mutex::new(Vec::new()));

        let mut provider = MockAffinityProvider::new();
        let seen = Arc::clone(&attempts);
        provider
            .expect_process_affinity()
            .times(4)
            .returning(move |set: &mut CpuSet| {
                seen.lock().unwrap().push(set.capacity());
                if set.capacity() < THRESHOLD {
                    return Err(ProviderError::TooSmall {
                        capacity: set.capacity(),
                    });
                }
                for cpu in [0, 1, 2, 4095, 4999] {
                    set.insert(cpu);
                }
                Ok(())
            });

        let result = discover(&provider);

        assert_eq!(*attempts.lock().unwrap(), vec![1024, 2048, 4096, 8192]);
        assert_eq!(result.cpu_count().get(), 5);
        assert_eq!(result.set_size(), 8192 / 8);
        assert_eq!(result.cpus().collect::<Vec<_>>(), vec![0, 1, 2, 4095, 4999]);
    }

    #[test]
    fn first_attempt_uses_initial_capacity() {
        let mut provider = MockAffinityProvider::new();
        provider
            .expect_process_affinity()
            .times(1)
            .returning(|set: &mut CpuSet| {
                assert_eq!(set.capacity(), INITIAL_CAPACITY);
                set.insert(3);
                Ok(())
            });

        let result = discover(&provider);

        assert_eq!(result.cpu_count().get(), 1);
        assert!(!result.is_degraded());
        assert_eq!(result.set_size(), INITIAL_CAPACITY / 8);
    }

    #[test]
    fn growth_is_capped() {
        let mut provider = MockAffinityProvider::new();
        // 1024 doubled up to and including 2^20.
        provider
            .expect_process_affinity()
            .times(11)
            .returning(|set: &mut CpuSet| {
                Err(ProviderError::TooSmall {
                    capacity: set.capacity(),
                })
            });

        assert_eq!(discover(&provider), DiscoveryResult::degraded());
    }

    #[test]
    fn empty_mask_degrades() {
        let mut provider = MockAffinityProvider::new();
        provider
            .expect_process_affinity()
            .times(1)
            .returning(|_| Ok(()));

        assert_eq!(discover(&provider), DiscoveryResult::degraded());
    }
}
