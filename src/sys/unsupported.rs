use super::{AffinityProvider, ProviderError};
use crate::CpuSet;

/// Fallback for targets without an affinity primitive. Discovery degrades to a single CPU and
/// pinning does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedProvider;

impl AffinityProvider for UnsupportedProvider {
    fn process_affinity(&self, _set: &mut CpuSet) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported)
    }

    fn bind_current_thread(&self, _set: &CpuSet) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported)
    }
}
