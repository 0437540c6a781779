//! Platform capability shim.
//!
//! Every native affinity primitive is reached through [`AffinityProvider`], so the probing and
//! binding logic is written once against [`CpuSet`]. The provider for the build target is picked
//! at compile time and exposed as [`BuildTargetProvider`].

use std::io;
use std::num::NonZeroI32;

use crate::CpuSet;

#[cfg(target_vendor = "apple")]
mod apple;
#[cfg(any(target_os = "linux", target_os = "android"))]
mod linux;
#[cfg(not(any(target_os = "linux", target_os = "android", target_vendor = "apple")))]
mod unsupported;

#[cfg(target_vendor = "apple")]
pub use apple::PlacementHintProvider;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use linux::NativeMaskProvider;
#[cfg(not(any(target_os = "linux", target_os = "android", target_vendor = "apple")))]
pub use unsupported::UnsupportedProvider;

/// The provider for the platform this crate was built for.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub type BuildTargetProvider = NativeMaskProvider;
/// The provider for the platform this crate was built for.
#[cfg(target_vendor = "apple")]
pub type BuildTargetProvider = PlacementHintProvider;
/// The provider for the platform this crate was built for.
#[cfg(not(any(target_os = "linux", target_os = "android", target_vendor = "apple")))]
pub type BuildTargetProvider = UnsupportedProvider;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The set handed to the OS cannot represent every CPU of the host.
    #[error("a cpu set of {capacity} slots is too small for this host")]
    TooSmall { capacity: usize },

    #[error("the affinity call failed")]
    Os(#[from] io::Error),

    #[error("cpu affinity is not supported on this platform")]
    Unsupported,
}

/// Native affinity primitives, translated into the [`CpuSet`] model.
#[cfg_attr(test, mockall::automock)]
pub trait AffinityProvider: Send + Sync {
    /// Fill `set` with the CPUs the current process may run on.
    ///
    /// Must return [`ProviderError::TooSmall`] when the capacity of `set` is below what the
    /// host needs; the caller then retries with a larger set.
    fn process_affinity(&self, set: &mut CpuSet) -> Result<(), ProviderError>;

    /// Restrict the calling thread to the CPUs in `set`.
    fn bind_current_thread(&self, set: &CpuSet) -> Result<(), ProviderError>;
}

/// Set the first `count` CPUs of `set`, for platforms that report a CPU count instead of a mask.
#[cfg_attr(not(target_vendor = "apple"), allow(dead_code))]
pub(crate) fn fill_first(set: &mut CpuSet, count: usize) -> Result<(), ProviderError> {
    if count > set.capacity() {
        return Err(ProviderError::TooSmall {
            capacity: set.capacity(),
        });
    }

    set.clear();
    for cpu in 0..count {
        set.insert(cpu);
    }
    Ok(())
}

/// Placement tag for the first CPU of `set`. Tag 0 clears the hint, so CPU `n` maps to `n + 1`.
#[cfg_attr(not(target_vendor = "apple"), allow(dead_code))]
pub(crate) fn placement_tag(set: &CpuSet) -> Option<NonZeroI32> {
    let cpu = set.first()?;
    i32::try_from(cpu).ok()?.checked_add(1).and_then(NonZeroI32::new)
}
