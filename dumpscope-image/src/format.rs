// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! PE/COFF structure definitions.
//!
//! Everything here mirrors the layouts documented in [Microsoft's PE format
//! reference][msdn], with names converted to Rust conventions only at the field level.
//! Struct names keep their `IMAGE_` spelling so they can be cross-checked against
//! winnt.h line by line. These types describe bytes on disk; scroll's derived
//! [`Pread`] does the actual reading, and none of them validate anything beyond their
//! own length.
//!
//! [msdn]: https://learn.microsoft.com/en-us/windows/win32/debug/pe-format

#![allow(non_camel_case_types)]
#![allow(clippy::upper_case_acronyms)]

use scroll::{Pread, SizeWith};

/// `MZ`, the magic number at the start of the DOS header.
pub const IMAGE_DOS_SIGNATURE: u16 = 0x5a4d;

/// `PE\0\0`, the magic number at the start of the NT headers.
pub const IMAGE_NT_SIGNATURE: u32 = 0x0000_4550;

/// The optional header magic for a 32-bit image.
pub const IMAGE_NT_OPTIONAL_HDR32_MAGIC: u16 = 0x10b;

/// The optional header magic for a 64-bit image.
pub const IMAGE_NT_OPTIONAL_HDR64_MAGIC: u16 = 0x20b;

pub const IMAGE_FILE_MACHINE_I386: u16 = 0x14c;
pub const IMAGE_FILE_MACHINE_AMD64: u16 = 0x8664;

/// How many slots the data directory array can hold.
pub const IMAGE_NUMBEROF_DIRECTORY_ENTRIES: usize = 16;
/// Index of the export table in the data directory array.
pub const IMAGE_DIRECTORY_ENTRY_EXPORT: usize = 0;
/// Index of the import table in the data directory array.
pub const IMAGE_DIRECTORY_ENTRY_IMPORT: usize = 1;

/// The bit marking an import thunk as an ordinal import in a 32-bit image.
pub const IMAGE_ORDINAL_FLAG32: u32 = 0x8000_0000;
/// The bit marking an import thunk as an ordinal import in a 64-bit image.
pub const IMAGE_ORDINAL_FLAG64: u64 = 0x8000_0000_0000_0000;

/// The DOS stub header at the start of every PE file.
///
/// Only `e_magic` and `e_lfanew` matter to a PE reader; the rest is the relic
/// real-mode program header.
#[derive(Debug, Clone, Pread, SizeWith)]
pub struct IMAGE_DOS_HEADER {
    pub e_magic: u16,
    pub e_cblp: u16,
    pub e_cp: u16,
    pub e_crlc: u16,
    pub e_cparhdr: u16,
    pub e_minalloc: u16,
    pub e_maxalloc: u16,
    pub e_ss: u16,
    pub e_sp: u16,
    pub e_csum: u16,
    pub e_ip: u16,
    pub e_cs: u16,
    pub e_lfarlc: u16,
    pub e_ovno: u16,
    pub e_res: [u16; 4],
    pub e_oemid: u16,
    pub e_oeminfo: u16,
    pub e_res2: [u16; 10],
    /// File offset of the NT headers.
    pub e_lfanew: u32,
}

/// The COFF file header, immediately after the `PE\0\0` signature.
#[derive(Debug, Clone, Pread, SizeWith)]
pub struct IMAGE_FILE_HEADER {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// One entry of the optional header's data directory array.
#[derive(Debug, Copy, Clone, Default, Pread, SizeWith)]
pub struct IMAGE_DATA_DIRECTORY {
    pub virtual_address: u32,
    pub size: u32,
}

/// The fixed part of the 32-bit optional header, without the trailing data
/// directory array.
#[derive(Debug, Clone, Pread, SizeWith)]
pub struct IMAGE_OPTIONAL_HEADER32 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: u32,
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u32,
    pub size_of_stack_commit: u32,
    pub size_of_heap_reserve: u32,
    pub size_of_heap_commit: u32,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

/// The fixed part of the 64-bit optional header, without the trailing data
/// directory array.
#[derive(Debug, Clone, Pread, SizeWith)]
pub struct IMAGE_OPTIONAL_HEADER64 {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

/// One entry of the section table.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct IMAGE_SECTION_HEADER {
    /// The section name, NUL-padded when shorter than 8 bytes.
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

/// The export directory, referenced by data directory entry 0.
#[derive(Debug, Clone, Pread, SizeWith)]
pub struct IMAGE_EXPORT_DIRECTORY {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    /// RVA of the exporting module's own name.
    pub name: u32,
    /// The ordinal base added to a function's table index to form its ordinal.
    pub base: u32,
    pub number_of_functions: u32,
    pub number_of_names: u32,
    pub address_of_functions: u32,
    pub address_of_names: u32,
    pub address_of_name_ordinals: u32,
}

/// One entry of the import descriptor table, referenced by data directory
/// entry 1. The table ends at an all-zero entry.
#[derive(Debug, Clone, Default, Pread, SizeWith)]
pub struct IMAGE_IMPORT_DESCRIPTOR {
    /// RVA of the import lookup table. Some linkers leave this 0 and only fill
    /// in `first_thunk`.
    pub original_first_thunk: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    /// RVA of the imported DLL's name.
    pub name: u32,
    /// RVA of the import address table.
    pub first_thunk: u32,
}
