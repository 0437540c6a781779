//! Apple platforms have no affinity mask. The process is assumed to own every core, and
//! binding becomes a `THREAD_AFFINITY_POLICY` placement hint.

use std::ffi::CStr;
use std::io;
use std::mem::size_of;
use std::ptr;

use libc::{
    integer_t, kern_return_t, mach_msg_type_number_t, pthread_mach_thread_np, pthread_self,
    thread_policy_flavor_t, thread_policy_t, thread_t, KERN_SUCCESS, THREAD_AFFINITY_POLICY,
    THREAD_AFFINITY_POLICY_COUNT,
};

use super::{fill_first, placement_tag, AffinityProvider, ProviderError};
use crate::CpuSet;

const CORE_COUNT_SYSCTL: &CStr = c"machdep.cpu.core_count";

#[repr(C)]
struct ThreadAffinityPolicy {
    affinity_tag: integer_t,
}

#[link(name = "System", kind = "framework")]
extern "C" {
    fn thread_policy_set(
        thread: thread_t,
        flavor: thread_policy_flavor_t,
        policy_info: thread_policy_t,
        count: mach_msg_type_number_t,
    ) -> kern_return_t;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlacementHintProvider;

impl PlacementHintProvider {
    fn core_count() -> Result<usize, ProviderError> {
        let mut count: i32 = 0;
        let mut len = size_of::<i32>();

        // SAFETY: `count` and `len` outlive the call and `len` matches the buffer size.
        let result = unsafe {
            libc::sysctlbyname(
                CORE_COUNT_SYSCTL.as_ptr(),
                ptr::addr_of_mut!(count).cast(),
                ptr::addr_of_mut!(len),
                ptr::null_mut(),
                0,
            )
        };

        if result != 0 {
            return Err(io::Error::last_os_error().into());
        }

        match usize::try_from(count) {
            Ok(count) if count > 0 => Ok(count),
            _ => Err(io::Error::other(format!("sysctl reported {count} cores")).into()),
        }
    }
}

impl AffinityProvider for PlacementHintProvider {
    fn process_affinity(&self, set: &mut CpuSet) -> Result<(), ProviderError> {
        fill_first(set, Self::core_count()?)
    }

    fn bind_current_thread(&self, set: &CpuSet) -> Result<(), ProviderError> {
        let Some(tag) = placement_tag(set) else {
            return Err(io::Error::from(io::ErrorKind::InvalidInput).into());
        };
        let mut policy = ThreadAffinityPolicy {
            affinity_tag: tag.get(),
        };

        log::debug!("Binding to placement tag {tag}");

        // SAFETY: `policy` outlives the call and matches THREAD_AFFINITY_POLICY_COUNT.
        let result = unsafe {
            thread_policy_set(
                pthread_mach_thread_np(pthread_self()),
                THREAD_AFFINITY_POLICY as thread_policy_flavor_t,
                ptr::addr_of_mut!(policy).cast(),
                THREAD_AFFINITY_POLICY_COUNT,
            )
        };

        if result == KERN_SUCCESS {
            Ok(())
        } else {
            Err(io::Error::other(format!("thread_policy_set returned {result}")).into())
        }
    }
}
