use std::io;

use rustix::io::Errno;
use rustix::thread::gettid;

use super::{AffinityProvider, ProviderError};
use crate::CpuSet;

/// Direct access to `sched_getaffinity`/`sched_setaffinity`.
///
/// The masks are passed with their real byte size, so sets larger than the libc
/// `cpu_set_t` work on hosts with more than 1024 CPUs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeMaskProvider;

impl AffinityProvider for NativeMaskProvider {
    fn process_affinity(&self, set: &mut CpuSet) -> Result<(), ProviderError> {
        let capacity = set.capacity();
        let size = set.byte_size();
        let mask = set.words_mut().as_mut_ptr().cast::<libc::cpu_set_t>();

        // 0 means the calling thread, which carries the process mask until someone changes it.
        // SAFETY: `mask` points to `size` writable bytes aligned like `cpu_set_t`.
        let result = unsafe { libc::sched_getaffinity(0, size, mask) };

        if result == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match Errno::from_io_error(&err) {
            // The kernel rejects masks smaller than its own CPU id range.
            Some(Errno::INVAL) => Err(ProviderError::TooSmall { capacity }),
            _ => Err(ProviderError::Os(err)),
        }
    }

    fn bind_current_thread(&self, set: &CpuSet) -> Result<(), ProviderError> {
        let mask = set.words().as_ptr().cast::<libc::cpu_set_t>();

        // SAFETY: `mask` points to `byte_size()` readable bytes aligned like `cpu_set_t`.
        let result = unsafe { libc::sched_setaffinity(0, set.byte_size(), mask) };

        if result == 0 {
            log::trace!("Thread {:?} bound to {:?}", gettid(), set);
            Ok(())
        } else {
            Err(io::Error::last_os_error().into())
        }
    }
}
