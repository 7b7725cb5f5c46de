//! Metric descriptor table
//!
//! Maps each guest-info [`Stat`] to an exported Prometheus metric. The
//! native library reports memory in MB, frequencies in MHz and times in
//! milliseconds; [`UnitKind`] normalizes those to base units.

use crate::error::Result;
use crate::guestlib::{GuestSession, Stat};
use crate::models::ValueType;
use UnitKind::{Megabytes as MB, Megahertz as MHZ, MillisecondsCounter as MS, Unitless as NONE};

/// Prefix shared by every exported metric name
pub const NAMESPACE: &str = "vmwareguest_";

const MIB: f64 = 1024.0 * 1024.0;

/// Unit the native library reports a statistic in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Exported as bytes
    Megabytes,
    /// Exported as hertz
    Megahertz,
    /// Exported as-is
    Unitless,
    /// Exported as seconds. Every millisecond statistic the library
    /// reports is assumed to be an ever-increasing counter.
    MillisecondsCounter,
}

impl UnitKind {
    pub fn multiplier(&self) -> f64 {
        match self {
            UnitKind::Megabytes | UnitKind::Megahertz => MIB,
            UnitKind::Unitless => 1.0,
            UnitKind::MillisecondsCounter => 0.001,
        }
    }

    /// Suffix appended to the metric name, if any
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            UnitKind::Megabytes => Some("bytes"),
            UnitKind::Megahertz => Some("hertz"),
            UnitKind::Unitless => None,
            UnitKind::MillisecondsCounter => Some("seconds"),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            UnitKind::MillisecondsCounter => ValueType::Counter,
            _ => ValueType::Gauge,
        }
    }
}

/// Immutable descriptor for one exported metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub stat: Stat,
    pub name: &'static str,
    pub help: &'static str,
    pub unit: UnitKind,
}

impl MetricSpec {
    pub const fn new(stat: Stat, name: &'static str, help: &'static str, unit: UnitKind) -> Self {
        Self {
            stat,
            name,
            help,
            unit,
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.unit.multiplier()
    }

    pub fn value_type(&self) -> ValueType {
        self.unit.value_type()
    }

    /// Fully-qualified exported name: `vmwareguest_<name>[_<unit>]`
    pub fn fq_name(&self) -> String {
        match self.unit.suffix() {
            Some(suffix) => format!("{}{}_{}", NAMESPACE, self.name, suffix),
            None => format!("{}{}", NAMESPACE, self.name),
        }
    }

    /// Read the statistic and convert it to base units
    pub fn measure(&self, session: &dyn GuestSession) -> Result<f64> {
        Ok(self.stat.read(session)? * self.multiplier())
    }
}

#[rustfmt::skip]
const VMWARE_GUEST: &[(Stat, &str, &str, UnitKind)] = &[
    (Stat::HostMemUnmapped, "HostMemUnmapped", "total amount of unmapped memory on the host", MB),
    (Stat::HostMemMapped, "HostMemMapped", "total amount of mapped memory on the host", MB),
    (Stat::HostMemKernOvhd, "HostMemKernOvhd", "total amount of host kernel memory overhead", MB),
    (Stat::HostMemPhysFree, "HostMemPhysFree", "total amount of physical memory free on host", MB),
    (Stat::HostMemPhys, "HostMemPhys", "total amount of memory available to the host OS kernel", MB),
    (Stat::HostMemUsed, "HostMemUsed", "total amount of consumed memory on the host", MB),
    (Stat::HostMemShared, "HostMemShared", "total amount of COW (Copy-On-Write) memory on the host", MB),
    (Stat::HostMemSwapped, "HostMemSwapped", "total amount of memory swapped out on the host", MB),
    (Stat::HostCpuUsed, "HostCPUUsed", "total CPU time used by host.", MS),
    (Stat::CpuUsed, "CPUUsed", "time during which the virtual machine has been using the CPU.", MS),
    (Stat::MemTargetSize, "MemTargetSize", "memory target Size", MB),
    (Stat::CpuStolen, "CPUStolen", "time that the VM was runnable but not scheduled to run.", MS),
    (Stat::TimeElapsed, "TimeElapsed", "real time passed since the virtual machine started running on the current host system.", MS),
    (Stat::HostNumCpuCores, "HostNumCPUCores", "number of physical CPU cores on the host machine.", NONE),
    (Stat::MemUsed, "MemUsed", "estimated amount of physical host memory currently consumed for this virtual machine's physical memory.", MB),
    (Stat::MemSharedSaved, "MemSharedSaved", "estimated amount of physical memory on the host saved from copy-on-write (COW) shared guest physical memory.", MB),
    (Stat::MemShared, "MemShared", "physical memory associated with this virtual machine that is copy-on-write (COW) shared on the host.", MB),
    (Stat::MemSwapped, "MemSwapped", "memory associated with this virtual machine that has been swapped by the host system.", MB),
    (Stat::MemBallooned, "MemBallooned", "memory that has been reclaimed from this virtual machine via the VMware Memory Balloon mechanism.", MB),
    (Stat::MemOverhead, "MemOverhead", "overhead memory associated with this virtual machine consumed on the host system.", MB),
    (Stat::MemActive, "MemActive", "estimated amount of memory the virtual machine is actively using.", MB),
    (Stat::MemMapped, "MemMapped", "mapped memory size of this virtual machine.", MB),
    (Stat::MemShares, "MemShares", "number of memory shares allocated to the virtual machine.", NONE),
    (Stat::MemLimit, "MemLimit", "maximum amount of memory that is available to the virtual machine.", MB),
    (Stat::MemReservation, "MemReservation", "minimum amount of memory that is available to the virtual machine.", MB),
    (Stat::HostProcessorSpeed, "HostProcessorSpeed", "host processor speed.", MHZ),
    (Stat::CpuShares, "CPUShares", "number of CPU shares allocated to the virtual machine.", NONE),
    (Stat::CpuLimit, "CPULimit", "maximum processing power available to the virtual machine.", MHZ),
    (Stat::CpuReservation, "CPUReservation", "minimum processing power available to the virtual machine.", MHZ),
];

/// Ordered, immutable list of metric descriptors
#[derive(Debug, Clone)]
pub struct MetricTable {
    specs: Vec<MetricSpec>,
}

impl MetricTable {
    pub fn new(specs: Vec<MetricSpec>) -> Self {
        Self { specs }
    }

    /// The full set of statistics exported from a VMware guest
    pub fn vmware_guest() -> Self {
        Self::new(
            VMWARE_GUEST
                .iter()
                .map(|&(stat, name, help, unit)| MetricSpec::new(stat, name, help, unit))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for MetricTable {
    fn default() -> Self {
        Self::vmware_guest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuestLibError;
    use crate::guestlib::RefreshOutcome;
    use std::collections::HashSet;

    struct Fixed(u64);

    impl GuestSession for Fixed {
        fn refresh(&mut self) -> Result<RefreshOutcome> {
            Ok(RefreshOutcome::Unchanged)
        }

        fn read(&self, _stat: Stat) -> Result<u64> {
            Ok(self.0)
        }
    }

    struct Failing;

    impl GuestSession for Failing {
        fn refresh(&mut self) -> Result<RefreshOutcome> {
            Ok(RefreshOutcome::Unchanged)
        }

        fn read(&self, stat: Stat) -> Result<u64> {
            Err(GuestLibError::Native {
                call: stat.symbol(),
                code: 4,
                message: "requested statistic is not available".to_string(),
            })
        }
    }

    #[test]
    fn test_megabytes_conversion() {
        let spec = MetricSpec::new(Stat::HostMemUsed, "HostMemUsed", "", UnitKind::Megabytes);
        assert_eq!(spec.measure(&Fixed(2048)).unwrap(), 2048.0 * 1048576.0);
        assert_eq!(spec.value_type(), ValueType::Gauge);
    }

    #[test]
    fn test_milliseconds_conversion() {
        let spec = MetricSpec::new(Stat::CpuStolen, "CPUStolen", "", UnitKind::MillisecondsCounter);
        assert_eq!(spec.measure(&Fixed(2048)).unwrap(), 2048.0 * 0.001);
        assert_eq!(spec.value_type(), ValueType::Counter);
    }

    #[test]
    fn test_megahertz_and_unitless() {
        let mhz = MetricSpec::new(Stat::CpuLimit, "CPULimit", "", UnitKind::Megahertz);
        assert_eq!(mhz.measure(&Fixed(3)).unwrap(), 3.0 * 1048576.0);

        let shares = MetricSpec::new(Stat::CpuShares, "CPUShares", "", UnitKind::Unitless);
        assert_eq!(shares.measure(&Fixed(1000)).unwrap(), 1000.0);
    }

    #[test]
    fn test_measure_propagates_read_error() {
        let spec = MetricSpec::new(Stat::MemUsed, "MemUsed", "", UnitKind::Megabytes);
        assert!(spec.measure(&Failing).is_err());
    }

    #[test]
    fn test_fq_names() {
        let table = MetricTable::vmware_guest();
        let names: Vec<_> = table.iter().map(|s| s.fq_name()).collect();

        assert_eq!(names[0], "vmwareguest_HostMemUnmapped_bytes");
        assert!(names.contains(&"vmwareguest_CPUStolen_seconds".to_string()));
        assert!(names.contains(&"vmwareguest_HostProcessorSpeed_hertz".to_string()));
        assert!(names.contains(&"vmwareguest_HostNumCPUCores".to_string()));
    }

    #[test]
    fn test_table_covers_every_stat_once() {
        let table = MetricTable::vmware_guest();
        assert_eq!(table.len(), Stat::ALL.len());

        let stats: HashSet<_> = table.iter().map(|s| s.stat).collect();
        assert_eq!(stats.len(), Stat::ALL.len());

        let names: HashSet<_> = table.iter().map(|s| s.fq_name()).collect();
        assert_eq!(names.len(), table.len());
    }

    #[test]
    fn test_millisecond_stats_are_counters() {
        let table = MetricTable::vmware_guest();
        let counters: Vec<_> = table
            .iter()
            .filter(|s| s.value_type() == ValueType::Counter)
            .map(|s| s.name)
            .collect();
        assert_eq!(counters, vec!["HostCPUUsed", "CPUUsed", "CPUStolen", "TimeElapsed"]);
    }
}
