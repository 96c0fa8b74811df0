// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use dumpscope::{Cpu, Os};

/// Information about the system that produced a dump.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// The operating system that produced the dump.
    pub os: Os,
    /// A string identifying the version of the operating system,
    /// such as "10.0.19045 Service Pack 1".
    pub os_version: Option<String>,
    /// The operating system build number: "19045".
    pub os_build: Option<String>,
    /// The CPU on which the dump was produced.
    pub cpu: Cpu,
    /// A string further identifying the CPU, such as
    /// "GenuineIntel family 6 model 158 stepping 10".
    pub cpu_info: Option<String>,
    /// The combined level and model of the CPU, when the dump recorded one.
    pub cpu_revision: Option<u16>,
    /// The number of processors in the system.
    pub cpu_count: usize,
}
