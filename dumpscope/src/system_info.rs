// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! OS and CPU identifiers decoded from the raw system info values.

use std::borrow::Cow;
use std::fmt;

use dumpscope_common::format::{PlatformId, ProcessorArchitecture};
use num_traits::FromPrimitive;

/// The operating system that wrote the dump.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Os {
    Windows,
    MacOs,
    Ios,
    Linux,
    Solaris,
    Android,
    Ps3,
    NaCl,
    /// An unrecognized `platform_id` value.
    Unknown(u32),
}

impl Os {
    /// Decodes a raw `platform_id` value.
    pub fn from_platform_id(id: u32) -> Os {
        match PlatformId::from_u32(id) {
            Some(PlatformId::VER_PLATFORM_WIN32_NT) => Os::Windows,
            Some(PlatformId::MacOs) => Os::MacOs,
            Some(PlatformId::Ios) => Os::Ios,
            Some(PlatformId::Linux) => Os::Linux,
            Some(PlatformId::Solaris) => Os::Solaris,
            Some(PlatformId::Android) => Os::Android,
            Some(PlatformId::Ps3) => Os::Ps3,
            Some(PlatformId::NaCl) => Os::NaCl,
            _ => Os::Unknown(id),
        }
    }

    /// A descriptive name, the way crash reports traditionally spell it.
    pub fn long_name(&self) -> Cow<'_, str> {
        match *self {
            Os::Windows => Cow::Borrowed("Windows NT"),
            Os::MacOs => Cow::Borrowed("Mac OS X"),
            Os::Ios => Cow::Borrowed("iOS"),
            Os::Linux => Cow::Borrowed("Linux"),
            Os::Solaris => Cow::Borrowed("Solaris"),
            Os::Android => Cow::Borrowed("Android"),
            Os::Ps3 => Cow::Borrowed("PS3"),
            Os::NaCl => Cow::Borrowed("NaCl"),
            Os::Unknown(id) => Cow::Owned(format!("{:#010x}", id)),
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Os::Windows => write!(f, "windows"),
            Os::MacOs => write!(f, "mac os x"),
            Os::Ios => write!(f, "ios"),
            Os::Linux => write!(f, "linux"),
            Os::Solaris => write!(f, "solaris"),
            Os::Android => write!(f, "android"),
            Os::Ps3 => write!(f, "ps3"),
            Os::NaCl => write!(f, "nacl"),
            Os::Unknown(id) => write!(f, "unknown {:#010x}", id),
        }
    }
}

/// The CPU family the dumped process ran on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Cpu {
    X86,
    X86_64,
    Ppc,
    Ppc64,
    Sparc,
    Arm,
    Arm64,
    Mips,
    Mips64,
    /// An unrecognized `processor_architecture` value.
    Unknown(u16),
}

impl Cpu {
    /// Decodes a raw `processor_architecture` value.
    pub fn from_processor_architecture(arch: u16) -> Cpu {
        use ProcessorArchitecture::*;
        match ProcessorArchitecture::from_u16(arch) {
            // WOW64 processes dump as x86.
            Some(PROCESSOR_ARCHITECTURE_INTEL) | Some(PROCESSOR_ARCHITECTURE_IA32_ON_WIN64) => {
                Cpu::X86
            }
            Some(PROCESSOR_ARCHITECTURE_AMD64) => Cpu::X86_64,
            Some(PROCESSOR_ARCHITECTURE_PPC) => Cpu::Ppc,
            Some(PROCESSOR_ARCHITECTURE_PPC64) => Cpu::Ppc64,
            Some(PROCESSOR_ARCHITECTURE_SPARC) => Cpu::Sparc,
            Some(PROCESSOR_ARCHITECTURE_ARM) => Cpu::Arm,
            Some(PROCESSOR_ARCHITECTURE_ARM64) | Some(PROCESSOR_ARCHITECTURE_ARM64_OLD) => {
                Cpu::Arm64
            }
            Some(PROCESSOR_ARCHITECTURE_MIPS) => Cpu::Mips,
            Some(PROCESSOR_ARCHITECTURE_MIPS64) => Cpu::Mips64,
            _ => Cpu::Unknown(arch),
        }
    }

    /// The size of a pointer on this CPU in bytes, when the family is known.
    pub fn pointer_width(&self) -> Option<u64> {
        match self {
            Cpu::X86 | Cpu::Ppc | Cpu::Sparc | Cpu::Arm | Cpu::Mips => Some(4),
            Cpu::X86_64 | Cpu::Ppc64 | Cpu::Arm64 | Cpu::Mips64 => Some(8),
            Cpu::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Cpu::X86 => write!(f, "x86"),
            Cpu::X86_64 => write!(f, "amd64"),
            Cpu::Ppc => write!(f, "ppc"),
            Cpu::Ppc64 => write!(f, "ppc64"),
            Cpu::Sparc => write!(f, "sparc"),
            Cpu::Arm => write!(f, "arm"),
            Cpu::Arm64 => write!(f, "arm64"),
            Cpu::Mips => write!(f, "mips"),
            Cpu::Mips64 => write!(f, "mips64"),
            Cpu::Unknown(arch) => write!(f, "unknown {:#06x}", arch),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_os_from_platform_id() {
        assert_eq!(Os::from_platform_id(3), Os::Windows);
        assert_eq!(Os::from_platform_id(0x8201), Os::Linux);
        assert_eq!(Os::from_platform_id(0xdead), Os::Unknown(0xdead));
    }

    #[test]
    fn test_cpu_from_processor_architecture() {
        assert_eq!(Cpu::from_processor_architecture(0), Cpu::X86);
        assert_eq!(Cpu::from_processor_architecture(10), Cpu::X86);
        assert_eq!(Cpu::from_processor_architecture(9), Cpu::X86_64);
        assert_eq!(Cpu::from_processor_architecture(0xbeef), Cpu::Unknown(0xbeef));
    }

    #[test]
    fn test_pointer_width() {
        assert_eq!(Cpu::X86.pointer_width(), Some(4));
        assert_eq!(Cpu::X86_64.pointer_width(), Some(8));
        assert_eq!(Cpu::Unknown(77).pointer_width(), None);
    }
}
