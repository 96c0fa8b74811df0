// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Minidump structure definitions.
//!
//! Everything here mirrors the layouts documented in [Microsoft's headers][msdn], with
//! names converted to Rust conventions only at the field level. Struct names keep their
//! `MINIDUMP_` spelling so they can be cross-checked against minidumpapiset.h line by
//! line. These types describe bytes on disk; scroll's derived [`Pread`] does the actual
//! reading, and none of them validate anything beyond their own length.
//!
//! [msdn]: https://learn.microsoft.com/en-us/windows/win32/api/minidumpapiset/

#![allow(non_camel_case_types)]
#![allow(clippy::upper_case_acronyms)]

use bitflags::bitflags;
use enum_primitive_derive::Primitive;
use scroll::{Pread, SizeWith};
use smart_default::SmartDefault;

/// An offset from the start of the minidump file.
pub type RVA = u32;

/// A 64-bit offset from the start of the minidump file.
///
/// Only a handful of newer streams use this; most offsets in the format are 32-bit.
pub type RVA64 = u64;

/// The 4-byte magic number at the start of every minidump, `MDMP` when the file is
/// little-endian and read as ASCII.
pub const MINIDUMP_SIGNATURE: u32 = 0x504d444d;

/// The version number in [`MINIDUMP_HEADER::version`].
///
/// Only the low 16 bits are meaningful; writers stuff build metadata into the high bits,
/// so mask before comparing.
pub const MINIDUMP_VERSION: u32 = 42899;

/// The header at the start of a minidump file.
///
/// This struct matches the [Microsoft struct][msdn] of the same name.
///
/// [msdn]: https://learn.microsoft.com/en-us/windows/win32/api/minidumpapiset/ns-minidumpapiset-minidump_header
#[derive(Debug, Clone, Pread, SizeWith)]
pub struct MINIDUMP_HEADER {
    pub signature: u32,
    pub version: u32,
    pub stream_count: u32,
    pub stream_directory_rva: RVA,
    pub checksum: u32,
    pub time_date_stamp: u32,
    pub flags: u64,
}

/// A location within a minidump file, as a byte offset and size.
#[derive(Debug, Copy, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_LOCATION_DESCRIPTOR {
    pub data_size: u32,
    pub rva: RVA,
}

/// A range of process memory and the location of its contents in the file.
#[derive(Debug, Copy, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_MEMORY_DESCRIPTOR {
    /// The base address of this memory range in the crashed process.
    pub start_of_memory_range: u64,
    pub memory: MINIDUMP_LOCATION_DESCRIPTOR,
}

/// An entry in the stream directory pointed to by the header.
///
/// `stream_type` is nominally a [`MINIDUMP_STREAM_TYPE`] but is kept raw here because
/// dumps in the wild carry writer-defined types we have no enum variant for.
#[derive(Debug, Clone, Pread, SizeWith)]
pub struct MINIDUMP_DIRECTORY {
    pub stream_type: u32,
    pub location: MINIDUMP_LOCATION_DESCRIPTOR,
}

/// Known values of [`MINIDUMP_DIRECTORY::stream_type`].
///
/// Values below 0xffff are reserved for Microsoft's use.
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum MINIDUMP_STREAM_TYPE {
    UnusedStream = 0,
    ReservedStream0 = 1,
    ReservedStream1 = 2,
    ThreadListStream = 3,
    ModuleListStream = 4,
    MemoryListStream = 5,
    ExceptionStream = 6,
    SystemInfoStream = 7,
    ThreadExListStream = 8,
    Memory64ListStream = 9,
    CommentStreamA = 10,
    CommentStreamW = 11,
    HandleDataStream = 12,
    FunctionTable = 13,
    UnloadedModuleListStream = 14,
    MiscInfoStream = 15,
    MemoryInfoListStream = 16,
    ThreadInfoListStream = 17,
    HandleOperationListStream = 18,
    TokenStream = 19,
    JavaScriptDataStream = 20,
    SystemMemoryInfoStream = 21,
    ProcessVmCountersStream = 22,
    IptTraceStream = 23,
    ThreadNamesStream = 24,
    LastReservedStream = 0xffff,
}

impl From<MINIDUMP_STREAM_TYPE> for u32 {
    fn from(ty: MINIDUMP_STREAM_TYPE) -> Self {
        ty as u32
    }
}

/// Value for [`VS_FIXEDFILEINFO::signature`].
pub const VS_FFI_SIGNATURE: u32 = 0xfeef04bd;

/// Value for [`VS_FIXEDFILEINFO::struct_version`].
pub const VS_FFI_STRUCVERSION: u32 = 0x10000;

/// Version information for a file, embedded in each module record.
///
/// This struct matches the [Microsoft struct][msdn] of the same name.
///
/// [msdn]: https://learn.microsoft.com/en-us/windows/win32/api/verrsrc/ns-verrsrc-vs_fixedfileinfo
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct VS_FIXEDFILEINFO {
    /// Should contain [`VS_FFI_SIGNATURE`], but some writers leave it zeroed.
    pub signature: u32,
    pub struct_version: u32,
    pub file_version_hi: u32,
    pub file_version_lo: u32,
    pub product_version_hi: u32,
    pub product_version_lo: u32,
    pub file_flags_mask: u32,
    pub file_flags: u32,
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
    pub file_date_hi: u32,
    pub file_date_lo: u32,
}

/// An executable or shared library loaded in the crashed process.
///
/// This struct matches the [Microsoft struct][msdn] of the same name.
///
/// [msdn]: https://learn.microsoft.com/en-us/windows/win32/api/minidumpapiset/ns-minidumpapiset-minidump_module
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_MODULE {
    /// The address at which the image was mapped.
    pub base_of_image: u64,
    /// The size of the mapped image in bytes.
    pub size_of_image: u32,
    pub checksum: u32,
    /// Image timestamp, seconds since the epoch.
    pub time_date_stamp: u32,
    /// Offset of a length-prefixed UTF-16 path to the image.
    pub module_name_rva: RVA,
    pub version_info: VS_FIXEDFILEINFO,
    /// CodeView debug record, typically naming the matching PDB.
    pub cv_record: MINIDUMP_LOCATION_DESCRIPTOR,
    pub misc_record: MINIDUMP_LOCATION_DESCRIPTOR,
    pub reserved0: [u32; 2],
    pub reserved1: [u32; 2],
}

/// A thread captured in the dump.
///
/// This struct matches the [Microsoft struct][msdn] of the same name.
///
/// [msdn]: https://learn.microsoft.com/en-us/windows/win32/api/minidumpapiset/ns-minidumpapiset-minidump_thread
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_THREAD {
    pub thread_id: u32,
    pub suspend_count: u32,
    pub priority_class: u32,
    pub priority: u32,
    /// Address of the thread environment block.
    pub teb: u64,
    /// The memory holding this thread's stack.
    pub stack: MINIDUMP_MEMORY_DESCRIPTOR,
    /// Location of a CPU context record for this thread.
    pub thread_context: MINIDUMP_LOCATION_DESCRIPTOR,
}

/// An entry in the thread names stream.
///
/// Entries are packed 12-byte records; the name itself is stored out of line as a
/// length-prefixed UTF-16 string. Note the offset is 64-bit, unlike nearly every other
/// RVA in the format.
#[derive(Debug, Clone, Pread, SizeWith)]
pub struct MINIDUMP_THREAD_NAME {
    pub thread_id: u32,
    pub thread_name_rva: RVA64,
}

/// Processor and operating system information.
///
/// This struct matches the [Microsoft struct][msdn] of the same name.
///
/// [msdn]: https://learn.microsoft.com/en-us/windows/win32/api/minidumpapiset/ns-minidumpapiset-minidump_system_info
#[derive(Debug, Clone, Pread, SizeWith)]
pub struct MINIDUMP_SYSTEM_INFO {
    /// The system's processor architecture, a [`ProcessorArchitecture`] value.
    pub processor_architecture: u16,
    /// x86 (5 = 586, 6 = Pentium II, ...) or ARM (6 = ARMv6, 7 = ARMv7) CPU level.
    pub processor_level: u16,
    /// For x86, packs the CPU model in the high byte and stepping in the low byte.
    pub processor_revision: u16,
    pub number_of_processors: u8,
    pub product_type: u8,
    pub major_version: u32,
    pub minor_version: u32,
    pub build_number: u32,
    /// The operating system, a [`PlatformId`] value.
    pub platform_id: u32,
    /// Offset of a length-prefixed UTF-16 string with OS version details.
    ///
    /// On Windows this is the service pack name. Breakpad-style writers on other
    /// platforms store the `uname` information here instead.
    pub csd_version_rva: RVA,
    pub suite_mask: u16,
    pub reserved2: u16,
    pub cpu: CPU_INFORMATION,
}

/// Architecture-dependent CPU details from [`MINIDUMP_SYSTEM_INFO`].
///
/// In Microsoft's headers this is a union; here it is raw bytes that callers re-read as
/// [`X86CpuInfo`] or [`OtherCpuInfo`] once the architecture is known.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct CPU_INFORMATION {
    pub data: [u8; 24],
}

/// The x86 arm of [`CPU_INFORMATION`], raw `cpuid` results.
#[derive(Debug, Copy, Clone, Default, Pread, SizeWith)]
pub struct X86CpuInfo {
    /// The three registers of `cpuid 0`, spelling the vendor string in ASCII.
    pub vendor_id: [u32; 3],
    pub version_information: u32,
    pub feature_information: u32,
    pub amd_extended_cpu_features: u32,
}

/// The non-x86 arm of [`CPU_INFORMATION`].
#[derive(Debug, Copy, Clone, Default, Pread, SizeWith)]
pub struct OtherCpuInfo {
    pub processor_features: [u64; 2],
}

/// Known values of [`MINIDUMP_SYSTEM_INFO::processor_architecture`].
#[repr(u16)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum ProcessorArchitecture {
    PROCESSOR_ARCHITECTURE_INTEL = 0,
    PROCESSOR_ARCHITECTURE_MIPS = 1,
    PROCESSOR_ARCHITECTURE_ALPHA = 2,
    PROCESSOR_ARCHITECTURE_PPC = 3,
    PROCESSOR_ARCHITECTURE_SHX = 4,
    PROCESSOR_ARCHITECTURE_ARM = 5,
    PROCESSOR_ARCHITECTURE_IA64 = 6,
    PROCESSOR_ARCHITECTURE_ALPHA64 = 7,
    PROCESSOR_ARCHITECTURE_MSIL = 8,
    PROCESSOR_ARCHITECTURE_AMD64 = 9,
    /// WOW64, a 32-bit process on 64-bit Windows.
    PROCESSOR_ARCHITECTURE_IA32_ON_WIN64 = 10,
    PROCESSOR_ARCHITECTURE_NEUTRAL = 11,
    PROCESSOR_ARCHITECTURE_ARM64 = 12,
    /// Breakpad-defined value for SPARC.
    PROCESSOR_ARCHITECTURE_SPARC = 0x8001,
    /// Breakpad-defined value for PPC64.
    PROCESSOR_ARCHITECTURE_PPC64 = 0x8002,
    /// Breakpad-defined value for ARM64, predating Microsoft's.
    PROCESSOR_ARCHITECTURE_ARM64_OLD = 0x8003,
    /// Breakpad-defined value for MIPS64.
    PROCESSOR_ARCHITECTURE_MIPS64 = 0x8004,
    PROCESSOR_ARCHITECTURE_UNKNOWN = 0xffff,
}

/// Known values of [`MINIDUMP_SYSTEM_INFO::platform_id`].
///
/// The values above 0x8000 are Breakpad extensions for non-Windows systems.
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum PlatformId {
    /// Windows 3.1
    VER_PLATFORM_WIN32s = 1,
    /// Windows 95-98-Me
    VER_PLATFORM_WIN32_WINDOWS = 2,
    /// Windows NT, 2000+
    VER_PLATFORM_WIN32_NT = 3,
    /// Windows CE, Windows Mobile
    VER_PLATFORM_WIN32_CE = 4,
    /// Generic Unix-ish
    Unix = 0x8000,
    MacOs = 0x8101,
    Ios = 0x8102,
    Linux = 0x8201,
    Solaris = 0x8202,
    Android = 0x8203,
    Ps3 = 0x8204,
    NaCl = 0x8205,
}

/// Detailed information about an exception.
///
/// This struct matches the [Microsoft struct][msdn] of the same name.
///
/// [msdn]: https://learn.microsoft.com/en-us/windows/win32/api/minidumpapiset/ns-minidumpapiset-minidump_exception
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_EXCEPTION {
    /// OS-specific reason code, see the crate's `errors` module for Windows values.
    pub exception_code: u32,
    pub exception_flags: u32,
    pub exception_record: u64,
    /// The address the exception occurred at, for faults the faulting instruction.
    pub exception_address: u64,
    /// How many leading entries of `exception_information` are meaningful.
    pub number_parameters: u32,
    pub __align: u32,
    /// Code-specific parameters, e.g. access violations store the access direction in
    /// `[0]` and the address being accessed in `[1]`.
    pub exception_information: [u64; 15],
}

/// The exception stream, present when the dump was written because something crashed.
///
/// This struct matches the [Microsoft struct][msdn] of the same name.
///
/// [msdn]: https://learn.microsoft.com/en-us/windows/win32/api/minidumpapiset/ns-minidumpapiset-minidump_exception_stream
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct MINIDUMP_EXCEPTION_STREAM {
    /// The thread the exception happened on.
    pub thread_id: u32,
    pub __align: u32,
    pub exception_record: MINIDUMP_EXCEPTION,
    /// CPU context at the point of the exception.
    ///
    /// Prefer this over the faulting thread's own context record, which on Windows holds
    /// the state inside the exception handler that wrote the dump.
    pub thread_context: MINIDUMP_LOCATION_DESCRIPTOR,
}

/// A Windows `SYSTEMTIME`, a date and time broken out into fields.
#[derive(Debug, Copy, Clone, Default, Pread, SizeWith)]
pub struct SYSTEMTIME {
    pub year: u16,
    pub month: u16,
    pub day_of_week: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub milliseconds: u16,
}

/// A Windows `TIME_ZONE_INFORMATION`, the time zone settings at the time of the dump.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct TIME_ZONE_INFORMATION {
    /// Offset from UTC in minutes.
    pub bias: i32,
    pub standard_name: [u16; 32],
    pub standard_date: SYSTEMTIME,
    pub standard_bias: i32,
    pub daylight_name: [u16; 32],
    pub daylight_date: SYSTEMTIME,
    pub daylight_bias: i32,
}

bitflags! {
    /// Flags in the `flags1` field of the misc info stream, declaring which of the
    /// stream's fields actually hold data.
    pub struct MiscInfoFlags: u32 {
        const MINIDUMP_MISC1_PROCESS_ID            = 0x00000001;
        const MINIDUMP_MISC1_PROCESS_TIMES         = 0x00000002;
        const MINIDUMP_MISC1_PROCESSOR_POWER_INFO  = 0x00000004;
        const MINIDUMP_MISC3_PROCESS_INTEGRITY     = 0x00000010;
        const MINIDUMP_MISC3_PROCESS_EXECUTE_FLAGS = 0x00000020;
        const MINIDUMP_MISC3_TIMEZONE              = 0x00000040;
        const MINIDUMP_MISC3_PROTECTED_PROCESS     = 0x00000080;
        const MINIDUMP_MISC4_BUILDSTRING           = 0x00000100;
        const MINIDUMP_MISC5_PROCESS_COOKIE        = 0x00000200;
    }
}

/// Declares a chain of structs where each struct repeats every field of the one before
/// it and then adds its own, which is how Microsoft versions MINIDUMP_MISC_INFO.
macro_rules! layered_structs {
    // Chain exhausted, nothing left to declare.
    (@carry { $($carried:tt)* }) => {};
    // Prepend the carried fields to the next struct in the chain.
    (@carry { $($carried:tt)* } $(#[$attr:meta])* pub struct $name:ident { $($cur:tt)* } $($tail:tt)*) => {
        layered_structs!($(#[$attr])* pub struct $name { $($carried)* $($cur)* } $($tail)*);
    };
    // Declare one struct, then carry its full field list forward.
    ($(#[$attr:meta])* pub struct $name:ident { $($(#[$fattr:meta])* pub $field:ident: $t:tt,)* } $($tail:tt)*) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Pread, SizeWith)]
        pub struct $name {
            $($(#[$fattr])* pub $field: $t,)*
        }
        layered_structs!(@carry { $($(#[$fattr])* pub $field: $t,)* } $($tail)*);
    };
}

layered_structs! {
    /// Miscellaneous process information, original revision.
    ///
    /// Every field after `size_of_info` is only valid if the matching [`MiscInfoFlags`]
    /// bit is set in `flags1`.
    pub struct MINIDUMP_MISC_INFO {
        pub size_of_info: u32,
        pub flags1: u32,
        pub process_id: u32,
        pub process_create_time: u32,
        pub process_user_time: u32,
        pub process_kernel_time: u32,
    }
    /// Misc info revision 2, adds processor power information.
    pub struct MINIDUMP_MISC_INFO_2 {
        pub processor_max_mhz: u32,
        pub processor_current_mhz: u32,
        pub processor_mhz_limit: u32,
        pub processor_max_idle_state: u32,
        pub processor_current_idle_state: u32,
    }
    /// Misc info revision 3, adds process integrity and time zone details.
    pub struct MINIDUMP_MISC_INFO_3 {
        pub process_integrity_level: u32,
        pub process_execute_flags: u32,
        pub protected_process: u32,
        pub time_zone_id: u32,
        pub time_zone: TIME_ZONE_INFORMATION,
    }
    /// Misc info revision 4, adds OS build strings.
    pub struct MINIDUMP_MISC_INFO_4 {
        pub build_string: [u16; 260],
        pub dbg_bld_str: [u16; 40],
    }
}

// TODO: MINIDUMP_MISC_INFO_5, which adds xstate layout and the process cookie. Nothing
// we consume needs it yet, and its XSTATE_CONFIG_FEATURE_MSC_INFO member is large.

/// The portion of `context_flags` that identifies the CPU family.
///
/// The remaining low bits are per-CPU validity flags for groups of registers.
pub const CONTEXT_CPU_MASK: u32 = 0xffffff00;

bitflags! {
    /// CPU family values found in the `context_flags` field of a context record.
    pub struct ContextFlagsCpu: u32 {
        const CONTEXT_X86 = 0x10000;
        const CONTEXT_IA64 = 0x80000;
        const CONTEXT_AMD64 = 0x100000;
        const CONTEXT_ARM64 = 0x400000;
        const CONTEXT_ARM = 0x40000000;
    }
}

impl ContextFlagsCpu {
    /// Extracts the CPU family bits from a raw `context_flags` value.
    pub fn from_flags(flags: u32) -> ContextFlagsCpu {
        ContextFlagsCpu::from_bits_truncate(flags & CONTEXT_CPU_MASK)
    }
}

/// x87 FPU state saved in a [`CONTEXT_X86`].
#[derive(Debug, Clone, SmartDefault, Pread, SizeWith)]
pub struct FLOATING_SAVE_AREA_X86 {
    pub control_word: u32,
    pub status_word: u32,
    pub tag_word: u32,
    pub error_offset: u32,
    pub error_selector: u32,
    pub data_offset: u32,
    pub data_selector: u32,
    #[default([0; 80])]
    pub register_area: [u8; 80],
    pub cr0_npx_state: u32,
}

/// An x86 (32-bit) CPU context.
///
/// This struct matches the `CONTEXT` struct from 32-bit winnt.h.
#[derive(Debug, Clone, SmartDefault, Pread, SizeWith)]
pub struct CONTEXT_X86 {
    pub context_flags: u32,
    pub dr0: u32,
    pub dr1: u32,
    pub dr2: u32,
    pub dr3: u32,
    pub dr6: u32,
    pub dr7: u32,
    pub float_save: FLOATING_SAVE_AREA_X86,
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub ebp: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
    #[default([0; 512])]
    pub extended_registers: [u8; 512],
}

/// An x86-64 CPU context.
///
/// This struct matches the `CONTEXT` struct from 64-bit winnt.h, minus its 16-byte
/// alignment requirement, which does not survive the trip through a dump file anyway.
#[derive(Debug, Clone, SmartDefault, Pread, SizeWith)]
pub struct CONTEXT_AMD64 {
    pub p1_home: u64,
    pub p2_home: u64,
    pub p3_home: u64,
    pub p4_home: u64,
    pub p5_home: u64,
    pub p6_home: u64,
    pub context_flags: u32,
    pub mx_csr: u32,
    pub cs: u16,
    pub ds: u16,
    pub es: u16,
    pub fs: u16,
    pub gs: u16,
    pub ss: u16,
    pub eflags: u32,
    pub dr0: u64,
    pub dr1: u64,
    pub dr2: u64,
    pub dr3: u64,
    pub dr6: u64,
    pub dr7: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rbx: u64,
    pub rsp: u64,
    pub rbp: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    /// FXSAVE image of the SSE and x87 state, left undecoded.
    #[default([0; 512])]
    pub float_save: [u8; 512],
    pub vector_register: [u128; 26],
    pub vector_control: u64,
    pub debug_control: u64,
    pub last_branch_to_rip: u64,
    pub last_branch_from_rip: u64,
    pub last_exception_to_rip: u64,
    pub last_exception_from_rip: u64,
}

#[cfg(test)]
mod test {
    use super::*;
    use scroll::ctx::SizeWith;
    use scroll::LE;

    #[test]
    fn test_sizes_match_winnt() {
        // Sizes from minidumpapiset.h / winnt.h. If one of these trips, a field was
        // added or dropped and every RVA computed past it will be garbage.
        assert_eq!(MINIDUMP_HEADER::size_with(&LE), 32);
        assert_eq!(MINIDUMP_DIRECTORY::size_with(&LE), 12);
        assert_eq!(MINIDUMP_MODULE::size_with(&LE), 108);
        assert_eq!(MINIDUMP_THREAD::size_with(&LE), 48);
        assert_eq!(MINIDUMP_THREAD_NAME::size_with(&LE), 12);
        assert_eq!(MINIDUMP_SYSTEM_INFO::size_with(&LE), 56);
        assert_eq!(MINIDUMP_EXCEPTION_STREAM::size_with(&LE), 168);
        assert_eq!(MINIDUMP_MISC_INFO::size_with(&LE), 24);
        assert_eq!(MINIDUMP_MISC_INFO_2::size_with(&LE), 44);
        assert_eq!(MINIDUMP_MISC_INFO_4::size_with(&LE), 832);
        assert_eq!(CONTEXT_X86::size_with(&LE), 716);
        assert_eq!(CONTEXT_AMD64::size_with(&LE), 1232);
    }

    #[test]
    fn test_context_flags_cpu() {
        let flags = ContextFlagsCpu::from_flags(0x1003f);
        assert_eq!(flags, ContextFlagsCpu::CONTEXT_X86);
        let flags = ContextFlagsCpu::from_flags(0x10001f);
        assert_eq!(flags, ContextFlagsCpu::CONTEXT_AMD64);
    }
}
