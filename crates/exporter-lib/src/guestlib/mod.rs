//! Guest-info session abstraction
//!
//! The hypervisor publishes per-VM resource statistics to the guest through
//! `vmGuestLib`. This module defines the seam the collector reads through:
//! a [`GuestSession`] that can be refreshed and queried one [`Stat`] at a
//! time. The native implementation lives in [`ffi`].

pub mod ffi;

pub use ffi::{open_default_session, GuestLibSession, VmGuestLib};

use crate::error::Result;

/// Result of refreshing a session's cached statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Same session as the previous refresh
    Unchanged,
    /// The host-side session changed (vMotion, snapshot revert, ...)
    SessionChanged,
}

/// Native width of a statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatWidth {
    U32,
    U64,
}

/// One read exposed by the guest-info library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    HostMemUnmapped,
    HostMemMapped,
    HostMemKernOvhd,
    HostMemPhysFree,
    HostMemPhys,
    HostMemUsed,
    HostMemShared,
    HostMemSwapped,
    HostCpuUsed,
    CpuUsed,
    MemTargetSize,
    CpuStolen,
    TimeElapsed,
    HostNumCpuCores,
    MemUsed,
    MemSharedSaved,
    MemShared,
    MemSwapped,
    MemBallooned,
    MemOverhead,
    MemActive,
    MemMapped,
    MemShares,
    MemLimit,
    MemReservation,
    HostProcessorSpeed,
    CpuShares,
    CpuLimit,
    CpuReservation,
}

impl Stat {
    pub const ALL: [Stat; 29] = [
        Stat::HostMemUnmapped,
        Stat::HostMemMapped,
        Stat::HostMemKernOvhd,
        Stat::HostMemPhysFree,
        Stat::HostMemPhys,
        Stat::HostMemUsed,
        Stat::HostMemShared,
        Stat::HostMemSwapped,
        Stat::HostCpuUsed,
        Stat::CpuUsed,
        Stat::MemTargetSize,
        Stat::CpuStolen,
        Stat::TimeElapsed,
        Stat::HostNumCpuCores,
        Stat::MemUsed,
        Stat::MemSharedSaved,
        Stat::MemShared,
        Stat::MemSwapped,
        Stat::MemBallooned,
        Stat::MemOverhead,
        Stat::MemActive,
        Stat::MemMapped,
        Stat::MemShares,
        Stat::MemLimit,
        Stat::MemReservation,
        Stat::HostProcessorSpeed,
        Stat::CpuShares,
        Stat::CpuLimit,
        Stat::CpuReservation,
    ];

    /// Exported C symbol backing this statistic
    pub fn symbol(&self) -> &'static str {
        match self {
            Stat::HostMemUnmapped => "VMGuestLib_GetHostMemUnmappedMB",
            Stat::HostMemMapped => "VMGuestLib_GetHostMemMappedMB",
            Stat::HostMemKernOvhd => "VMGuestLib_GetHostMemKernOvhdMB",
            Stat::HostMemPhysFree => "VMGuestLib_GetHostMemPhysFreeMB",
            Stat::HostMemPhys => "VMGuestLib_GetHostMemPhysMB",
            Stat::HostMemUsed => "VMGuestLib_GetHostMemUsedMB",
            Stat::HostMemShared => "VMGuestLib_GetHostMemSharedMB",
            Stat::HostMemSwapped => "VMGuestLib_GetHostMemSwappedMB",
            Stat::HostCpuUsed => "VMGuestLib_GetHostCpuUsedMs",
            Stat::CpuUsed => "VMGuestLib_GetCpuUsedMs",
            Stat::MemTargetSize => "VMGuestLib_GetMemTargetSizeMB",
            Stat::CpuStolen => "VMGuestLib_GetCpuStolenMs",
            Stat::TimeElapsed => "VMGuestLib_GetElapsedMs",
            Stat::HostNumCpuCores => "VMGuestLib_GetHostNumCpuCores",
            Stat::MemUsed => "VMGuestLib_GetMemUsedMB",
            Stat::MemSharedSaved => "VMGuestLib_GetMemSharedSavedMB",
            Stat::MemShared => "VMGuestLib_GetMemSharedMB",
            Stat::MemSwapped => "VMGuestLib_GetMemSwappedMB",
            Stat::MemBallooned => "VMGuestLib_GetMemBalloonedMB",
            Stat::MemOverhead => "VMGuestLib_GetMemOverheadMB",
            Stat::MemActive => "VMGuestLib_GetMemActiveMB",
            Stat::MemMapped => "VMGuestLib_GetMemMappedMB",
            Stat::MemShares => "VMGuestLib_GetMemShares",
            Stat::MemLimit => "VMGuestLib_GetMemLimitMB",
            Stat::MemReservation => "VMGuestLib_GetMemReservationMB",
            Stat::HostProcessorSpeed => "VMGuestLib_GetHostProcessorSpeed",
            Stat::CpuShares => "VMGuestLib_GetCpuShares",
            Stat::CpuLimit => "VMGuestLib_GetCpuLimitMHz",
            Stat::CpuReservation => "VMGuestLib_GetCpuReservationMHz",
        }
    }

    /// Width of the out-parameter the native call writes
    pub fn width(&self) -> StatWidth {
        match self {
            Stat::HostMemUnmapped
            | Stat::HostMemMapped
            | Stat::HostMemKernOvhd
            | Stat::HostMemPhysFree
            | Stat::HostMemPhys
            | Stat::HostMemUsed
            | Stat::HostMemShared
            | Stat::HostMemSwapped
            | Stat::HostCpuUsed
            | Stat::CpuUsed
            | Stat::MemTargetSize
            | Stat::CpuStolen
            | Stat::TimeElapsed => StatWidth::U64,
            _ => StatWidth::U32,
        }
    }

    /// Read this statistic from a session as a float measurement
    pub fn read(&self, session: &dyn GuestSession) -> Result<f64> {
        session.read(*self).map(|raw| raw as f64)
    }
}

/// A live view of the hypervisor's guest statistics.
///
/// Implementations are driven from a single thread at a time; the collector
/// serializes access.
pub trait GuestSession: Send {
    /// Re-fetch statistics from the host.
    fn refresh(&mut self) -> Result<RefreshOutcome>;

    /// Read one statistic from the last refresh. 32-bit reads are widened.
    fn read(&self, stat: Stat) -> Result<u64>;
}
