// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! A reader for PE/COFF executable images.
//!
//! [`PeImage::parse`] walks the DOS header, NT headers, section table, and the
//! export and import directories of a Windows image and keeps the raw bytes
//! around for address queries. The reader is built for crash analysis rather
//! than loading: it never applies relocations, and a malformed export or import
//! directory degrades to an empty table instead of failing the whole image.
//! Only damage to the headers themselves is fatal.
//!
//! The central query is [`PeImage::rva_to_file_offset`], which turns a relative
//! virtual address into an offset into the file through the section table. That
//! is what lets a caller take an address out of a crashed process, subtract the
//! module base, and find the same bytes in the image on disk.

#![warn(missing_debug_implementations)]

#[cfg(doctest)]
doc_comment::doctest!("../README.md");

pub mod format;

use std::fs::File;
use std::io::{self, Write};
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;
use scroll::{Pread, LE};
use tracing::warn;

use crate::format as pe;

/// Errors encountered while reading an image.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    #[error("the file could not be opened")]
    FileNotFound,
    #[error("the file could not be memory mapped")]
    IoError,
    #[error("the buffer is smaller than a DOS header")]
    MissingDosHeader,
    #[error("the DOS header signature is not MZ")]
    DosSignatureMismatch,
    #[error("the NT headers are missing or out of bounds")]
    MissingNtHeaders,
    #[error("the NT header signature is not PE\\0\\0")]
    NtSignatureMismatch,
    #[error("the optional header magic {0:#x} names no known image flavor")]
    UnknownOptionalHeaderMagic(u16),
    #[error("the section table runs past the end of the buffer")]
    SectionTableTruncated,
}

impl Error {
    /// A stable identifier for this error, for logs and telemetry.
    pub fn name(&self) -> &'static str {
        match self {
            Error::FileNotFound => "FileNotFound",
            Error::IoError => "IoError",
            Error::MissingDosHeader => "MissingDosHeader",
            Error::DosSignatureMismatch => "DosSignatureMismatch",
            Error::MissingNtHeaders => "MissingNtHeaders",
            Error::NtSignatureMismatch => "NtSignatureMismatch",
            Error::UnknownOptionalHeaderMagic(_) => "UnknownOptionalHeaderMagic",
            Error::SectionTableTruncated => "SectionTableTruncated",
        }
    }
}

/// The optional header, in whichever of its two layouts the image uses.
///
/// The magic field decides the layout, and with it the image's bitness; the
/// machine field of the file header is descriptive, the magic is load-bearing.
#[derive(Debug, Clone)]
pub enum OptionalHeader {
    Pe32(pe::IMAGE_OPTIONAL_HEADER32),
    Pe32Plus(pe::IMAGE_OPTIONAL_HEADER64),
}

/// One section of the image.
#[derive(Debug, Clone)]
pub struct PeSection {
    /// The raw section header.
    pub raw: pe::IMAGE_SECTION_HEADER,
    name: String,
}

impl PeSection {
    /// Wraps a raw section header, decoding its name field.
    pub fn read(raw: pe::IMAGE_SECTION_HEADER) -> PeSection {
        let len = raw.name.iter().position(|&b| b == 0).unwrap_or(8);
        let name = String::from_utf8_lossy(&raw.name[..len]).into_owned();
        PeSection { raw, name }
    }

    /// The section's name, e.g. `.text`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `rva` falls inside this section's virtual span.
    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.raw.virtual_address
            && rva.wrapping_sub(self.raw.virtual_address) < self.raw.virtual_size
    }

    /// Maps `rva` to an offset into the file.
    ///
    /// The virtual span of a section routinely extends past its raw data, the
    /// tail being zero-filled at load time. An rva in that tail has no bytes in
    /// the file, so the mapping is clipped to `size_of_raw_data`.
    pub fn rva_to_file_offset(&self, rva: u32) -> Option<usize> {
        if !self.contains_rva(rva) {
            return None;
        }
        let delta = rva - self.raw.virtual_address;
        if delta >= self.raw.size_of_raw_data {
            return None;
        }
        Some(self.raw.pointer_to_raw_data as usize + delta as usize)
    }
}

/// One entry of the image's export table.
#[derive(Debug, Clone)]
pub struct PeExport {
    /// The exported name, absent for ordinal-only exports.
    pub name: Option<String>,
    /// The biased ordinal, as an importer would reference it.
    pub ordinal: u32,
    /// Where the exported symbol lives in the loaded image.
    pub rva: u32,
    /// Where the exported symbol lives in the file, when a section maps it.
    pub file_offset: Option<usize>,
}

/// One symbol of the image's import table.
#[derive(Debug, Clone)]
pub struct PeImport {
    /// The imported name, absent for imports by ordinal.
    pub name: Option<String>,
    /// The DLL the symbol is imported from.
    pub dll: String,
    /// The ordinal for imports by ordinal, or the loader hint for imports by
    /// name.
    pub ordinal: u16,
}

/// A parsed PE/COFF image.
///
/// Generic over any byte source, so owned buffers, borrowed slices, and memory
/// maps all work. Headers, sections, exports, and imports are decoded during
/// [`PeImage::parse`]; the raw bytes stay available through [`PeImage::bytes`]
/// for callers that want to read code or data out of the file afterwards.
#[derive(Debug)]
pub struct PeImage<T>
where
    T: Deref<Target = [u8]>,
{
    data: T,
    /// The raw DOS header.
    pub dos_header: pe::IMAGE_DOS_HEADER,
    /// The raw COFF file header.
    pub file_header: pe::IMAGE_FILE_HEADER,
    /// The optional header, whose layout fixes the image's bitness.
    pub optional_header: OptionalHeader,
    data_directories: Vec<pe::IMAGE_DATA_DIRECTORY>,
    sections: Vec<PeSection>,
    exports: Vec<PeExport>,
    imports: Vec<PeImport>,
}

impl PeImage<Mmap> {
    /// Memory-maps the file at `path` and parses it as an image.
    pub fn parse_path<P: AsRef<Path>>(path: P) -> Result<PeImage<Mmap>, Error> {
        let file = File::open(path).or(Err(Error::FileNotFound))?;
        // Safety: the map is never written through. If another process truncates the
        // file underneath us we can still fault, which is the usual caveat of mapping
        // files one does not own.
        let mmap = unsafe { Mmap::map(&file) }.or(Err(Error::IoError))?;
        PeImage::parse(mmap)
    }
}

impl<T> PeImage<T>
where
    T: Deref<Target = [u8]>,
{
    /// Parses an image out of a buffer of bytes.
    ///
    /// Header damage is fatal. A bad export or import directory is not; those
    /// decode into empty tables with a logged warning, because a crash dump is
    /// still worth analyzing against an image whose directories are damaged.
    pub fn parse(data: T) -> Result<PeImage<T>, Error> {
        let dos_header: pe::IMAGE_DOS_HEADER =
            data.pread_with(0, LE).or(Err(Error::MissingDosHeader))?;
        if dos_header.e_magic != pe::IMAGE_DOS_SIGNATURE {
            return Err(Error::DosSignatureMismatch);
        }

        let mut offset = dos_header.e_lfanew as usize;
        let signature: u32 = data
            .gread_with(&mut offset, LE)
            .or(Err(Error::MissingNtHeaders))?;
        if signature != pe::IMAGE_NT_SIGNATURE {
            return Err(Error::NtSignatureMismatch);
        }
        let file_header: pe::IMAGE_FILE_HEADER = data
            .gread_with(&mut offset, LE)
            .or(Err(Error::MissingNtHeaders))?;

        let optional_offset = offset;
        let magic: u16 = data
            .pread_with(optional_offset, LE)
            .or(Err(Error::MissingNtHeaders))?;
        let optional_header = match magic {
            pe::IMAGE_NT_OPTIONAL_HDR32_MAGIC => {
                let header: pe::IMAGE_OPTIONAL_HEADER32 = data
                    .gread_with(&mut offset, LE)
                    .or(Err(Error::MissingNtHeaders))?;
                OptionalHeader::Pe32(header)
            }
            pe::IMAGE_NT_OPTIONAL_HDR64_MAGIC => {
                let header: pe::IMAGE_OPTIONAL_HEADER64 = data
                    .gread_with(&mut offset, LE)
                    .or(Err(Error::MissingNtHeaders))?;
                OptionalHeader::Pe32Plus(header)
            }
            other => return Err(Error::UnknownOptionalHeaderMagic(other)),
        };

        // The directory array sits between the fixed optional header and the
        // section table. Its declared count is untrusted; 16 slots is all the
        // format ever defined.
        let declared = match &optional_header {
            OptionalHeader::Pe32(h) => h.number_of_rva_and_sizes,
            OptionalHeader::Pe32Plus(h) => h.number_of_rva_and_sizes,
        };
        let count = declared.min(pe::IMAGE_NUMBEROF_DIRECTORY_ENTRIES as u32) as usize;
        let mut data_directories = Vec::with_capacity(count);
        for _ in 0..count {
            match data.gread_with::<pe::IMAGE_DATA_DIRECTORY>(&mut offset, LE) {
                Ok(dir) => data_directories.push(dir),
                Err(_) => {
                    warn!("data directory array is truncated, continuing without the rest");
                    break;
                }
            }
        }

        // The section table's position is fixed by the declared optional header
        // size, not by how much of it we understood.
        let mut offset = optional_offset + file_header.size_of_optional_header as usize;
        let mut sections = Vec::with_capacity(file_header.number_of_sections as usize);
        for _ in 0..file_header.number_of_sections {
            let raw: pe::IMAGE_SECTION_HEADER = data
                .gread_with(&mut offset, LE)
                .or(Err(Error::SectionTableTruncated))?;
            sections.push(PeSection::read(raw));
        }

        let exports = read_exports(&data, &sections, &data_directories);
        let imports = read_imports(
            &data,
            &sections,
            &data_directories,
            matches!(optional_header, OptionalHeader::Pe32Plus(_)),
        );

        Ok(PeImage {
            data,
            dos_header,
            file_header,
            optional_header,
            data_directories,
            sections,
            exports,
            imports,
        })
    }

    /// The underlying file bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Whether the image is 64-bit, from the optional header magic.
    pub fn is_64bit(&self) -> bool {
        matches!(self.optional_header, OptionalHeader::Pe32Plus(_))
    }

    /// The COFF machine id, e.g. 0x8664 for x86-64.
    pub fn machine(&self) -> u16 {
        self.file_header.machine
    }

    /// The link timestamp from the file header.
    pub fn time_date_stamp(&self) -> u32 {
        self.file_header.time_date_stamp
    }

    /// The address the image asked to be loaded at.
    pub fn image_base(&self) -> u64 {
        match &self.optional_header {
            OptionalHeader::Pe32(h) => h.image_base as u64,
            OptionalHeader::Pe32Plus(h) => h.image_base,
        }
    }

    /// The entry point, as an rva.
    pub fn entry_point(&self) -> u32 {
        match &self.optional_header {
            OptionalHeader::Pe32(h) => h.address_of_entry_point,
            OptionalHeader::Pe32Plus(h) => h.address_of_entry_point,
        }
    }

    /// The header checksum, 0 when the linker did not fill one in.
    pub fn checksum(&self) -> u32 {
        match &self.optional_header {
            OptionalHeader::Pe32(h) => h.check_sum,
            OptionalHeader::Pe32Plus(h) => h.check_sum,
        }
    }

    /// The loaded size of the image in bytes.
    pub fn size_of_image(&self) -> u32 {
        match &self.optional_header {
            OptionalHeader::Pe32(h) => h.size_of_image,
            OptionalHeader::Pe32Plus(h) => h.size_of_image,
        }
    }

    /// The sections in file order.
    pub fn sections(&self) -> &[PeSection] {
        &self.sections
    }

    /// The section named `name`, if the image has one.
    pub fn section(&self, name: &str) -> Option<&PeSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// The decoded export table, forwarders excluded.
    pub fn exports(&self) -> &[PeExport] {
        &self.exports
    }

    /// The decoded import table.
    pub fn imports(&self) -> &[PeImport] {
        &self.imports
    }

    /// The data directory at `index`, when the header declares that many.
    pub fn data_directory(&self, index: usize) -> Option<&pe::IMAGE_DATA_DIRECTORY> {
        self.data_directories.get(index)
    }

    /// Maps an rva to an offset into the file through the section table.
    ///
    /// Absent when no section's virtual span contains the rva, and when the rva
    /// lands in a section's zero-filled tail past its raw data.
    pub fn rva_to_file_offset(&self, rva: u32) -> Option<usize> {
        rva_to_file_offset_in(&self.sections, rva)
    }

    /// Reads `len` bytes at `rva`, when a section maps them and the file has them.
    pub fn read_at_rva(&self, rva: u32, len: usize) -> Option<&[u8]> {
        let offset = self.rva_to_file_offset(rva)?;
        self.data.get(offset..offset.checked_add(len)?)
    }

    /// Writes a human-readable description of the image.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        write!(
            f,
            "PE image
  machine                = {:#x}
  bitness                = {}
  number_of_sections     = {}
  time_date_stamp        = {:#x}
  image_base             = {:#x}
  address_of_entry_point = {:#x}
  size_of_image          = {:#x}
  check_sum              = {:#x}

",
            self.machine(),
            if self.is_64bit() { 64 } else { 32 },
            self.file_header.number_of_sections,
            self.time_date_stamp(),
            self.image_base(),
            self.entry_point(),
            self.size_of_image(),
            self.checksum(),
        )?;
        writeln!(f, "Sections:")?;
        for section in &self.sections {
            writeln!(
                f,
                "  {:<8}  va={:#x}  vsize={:#x}  raw={:#x}  rawsize={:#x}",
                section.name,
                section.raw.virtual_address,
                section.raw.virtual_size,
                section.raw.pointer_to_raw_data,
                section.raw.size_of_raw_data,
            )?;
        }
        if !self.exports.is_empty() {
            writeln!(f, "\nExports:")?;
            for export in &self.exports {
                writeln!(
                    f,
                    "  {:>5}  {:#010x}  {}",
                    export.ordinal,
                    export.rva,
                    export.name.as_deref().unwrap_or("<by ordinal>"),
                )?;
            }
        }
        if !self.imports.is_empty() {
            writeln!(f, "\nImports:")?;
            for import in &self.imports {
                match &import.name {
                    Some(name) => writeln!(f, "  {}!{}", import.dll, name)?,
                    None => writeln!(f, "  {}!#{}", import.dll, import.ordinal)?,
                }
            }
        }
        writeln!(f)
    }
}

fn rva_to_file_offset_in(sections: &[PeSection], rva: u32) -> Option<usize> {
    sections.iter().find_map(|s| s.rva_to_file_offset(rva))
}

fn read_cstring_at_rva(data: &[u8], sections: &[PeSection], rva: u32) -> Option<String> {
    let offset = rva_to_file_offset_in(sections, rva)?;
    let bytes = data.get(offset..)?;
    let len = bytes.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&bytes[..len]).ok().map(str::to_owned)
}

fn nonempty_directory<'d>(
    directories: &'d [pe::IMAGE_DATA_DIRECTORY],
    index: usize,
) -> Option<&'d pe::IMAGE_DATA_DIRECTORY> {
    directories
        .get(index)
        .filter(|dir| dir.virtual_address != 0 && dir.size != 0)
}

/// Decodes the export directory into a flat list, skipping forwarders.
///
/// A forwarder's function rva points back inside the export directory itself,
/// at a `DLL.Name` string rather than code; nothing in a crash report can use
/// one, so they are dropped here.
fn read_exports(
    data: &[u8],
    sections: &[PeSection],
    directories: &[pe::IMAGE_DATA_DIRECTORY],
) -> Vec<PeExport> {
    let dir = match nonempty_directory(directories, pe::IMAGE_DIRECTORY_ENTRY_EXPORT) {
        Some(dir) => dir,
        None => return Vec::new(),
    };
    let dir_start = dir.virtual_address;
    let dir_end = dir.virtual_address.saturating_add(dir.size);

    let offset = match rva_to_file_offset_in(sections, dir.virtual_address) {
        Some(offset) => offset,
        None => {
            warn!("export directory rva maps to no section, skipping exports");
            return Vec::new();
        }
    };
    let export_dir: pe::IMAGE_EXPORT_DIRECTORY = match data.pread_with(offset, LE) {
        Ok(dir) => dir,
        Err(_) => {
            warn!("export directory is unreadable, skipping exports");
            return Vec::new();
        }
    };

    // The function count is untrusted input; anything past what the buffer
    // could even hold is corruption.
    let count = export_dir.number_of_functions as usize;
    if count > data.len() / 4 {
        warn!(
            "export directory claims {} functions in a {} byte file, skipping exports",
            count,
            data.len()
        );
        return Vec::new();
    }

    let mut functions = Vec::with_capacity(count);
    if let Some(mut offset) = rva_to_file_offset_in(sections, export_dir.address_of_functions) {
        for _ in 0..count {
            match data.gread_with::<u32>(&mut offset, LE) {
                Ok(rva) => functions.push(rva),
                Err(_) => break,
            }
        }
    }

    // Names are a parallel pair of tables: a name rva and the index of the
    // function it belongs to.
    let mut names: Vec<Option<String>> = vec![None; functions.len()];
    let name_count = (export_dir.number_of_names as usize).min(functions.len());
    if let (Some(names_offset), Some(ordinals_offset)) = (
        rva_to_file_offset_in(sections, export_dir.address_of_names),
        rva_to_file_offset_in(sections, export_dir.address_of_name_ordinals),
    ) {
        for i in 0..name_count {
            let name_rva = data.pread_with::<u32>(names_offset + i * 4, LE);
            let index = data.pread_with::<u16>(ordinals_offset + i * 2, LE);
            if let (Ok(name_rva), Ok(index)) = (name_rva, index) {
                if let Some(slot) = names.get_mut(index as usize) {
                    *slot = read_cstring_at_rva(data, sections, name_rva);
                }
            }
        }
    }

    let mut exports = Vec::new();
    for (i, &rva) in functions.iter().enumerate() {
        if rva == 0 {
            // A hole in the ordinal space.
            continue;
        }
        if rva >= dir_start && rva < dir_end {
            // Forwarder entry.
            continue;
        }
        exports.push(PeExport {
            name: names[i].take(),
            ordinal: export_dir.base.wrapping_add(i as u32),
            rva,
            file_offset: rva_to_file_offset_in(sections, rva),
        });
    }
    exports
}

/// Decodes the import descriptors and their lookup tables.
fn read_imports(
    data: &[u8],
    sections: &[PeSection],
    directories: &[pe::IMAGE_DATA_DIRECTORY],
    is_64: bool,
) -> Vec<PeImport> {
    let dir = match nonempty_directory(directories, pe::IMAGE_DIRECTORY_ENTRY_IMPORT) {
        Some(dir) => dir,
        None => return Vec::new(),
    };

    let mut imports = Vec::new();
    let mut descriptor_rva = dir.virtual_address;
    // The descriptor table ends at an all-zero entry; the cap covers tables
    // whose terminator is missing or unmapped.
    let max_descriptors = (dir.size as usize / 20).max(1);
    for _ in 0..max_descriptors {
        let offset = match rva_to_file_offset_in(sections, descriptor_rva) {
            Some(offset) => offset,
            None => {
                warn!("import descriptor rva maps to no section, stopping imports");
                break;
            }
        };
        let desc: pe::IMAGE_IMPORT_DESCRIPTOR = match data.pread_with(offset, LE) {
            Ok(desc) => desc,
            Err(_) => {
                warn!("import descriptor is unreadable, stopping imports");
                break;
            }
        };
        if desc.name == 0 && desc.original_first_thunk == 0 && desc.first_thunk == 0 {
            break;
        }
        descriptor_rva = descriptor_rva.wrapping_add(20);

        let dll = match read_cstring_at_rva(data, sections, desc.name) {
            Some(dll) => dll,
            None => {
                warn!("import descriptor has no readable dll name, skipping it");
                continue;
            }
        };

        // Prefer the lookup table; some linkers only emit the address table,
        // which holds the same entries before the loader binds it.
        let thunks = if desc.original_first_thunk != 0 {
            desc.original_first_thunk
        } else {
            desc.first_thunk
        };
        read_import_thunks(data, sections, thunks, is_64, &dll, &mut imports);
    }
    imports
}

fn read_import_thunks(
    data: &[u8],
    sections: &[PeSection],
    thunks_rva: u32,
    is_64: bool,
    dll: &str,
    imports: &mut Vec<PeImport>,
) {
    let mut offset = match rva_to_file_offset_in(sections, thunks_rva) {
        Some(offset) => offset,
        None => {
            warn!("import thunks of {} map to no section, skipping them", dll);
            return;
        }
    };
    // The ordinal space caps how many distinct imports one descriptor can name.
    for _ in 0..0x1_0000 {
        let (entry, by_ordinal) = if is_64 {
            match data.gread_with::<u64>(&mut offset, LE) {
                Ok(entry) => (entry, entry & pe::IMAGE_ORDINAL_FLAG64 != 0),
                Err(_) => break,
            }
        } else {
            match data.gread_with::<u32>(&mut offset, LE) {
                Ok(entry) => (entry as u64, entry & pe::IMAGE_ORDINAL_FLAG32 != 0),
                Err(_) => break,
            }
        };
        if entry == 0 {
            break;
        }
        if by_ordinal {
            imports.push(PeImport {
                name: None,
                dll: dll.to_owned(),
                ordinal: entry as u16,
            });
            continue;
        }
        // A hint/name entry: a u16 loader hint, then the symbol name.
        let hint_rva = (entry as u32) & 0x7fff_ffff;
        let hint_offset = match rva_to_file_offset_in(sections, hint_rva) {
            Some(offset) => offset,
            None => continue,
        };
        let hint = data.pread_with::<u16>(hint_offset, LE).unwrap_or(0);
        let name = data
            .get(hint_offset + 2..)
            .and_then(|bytes| bytes.iter().position(|&b| b == 0).map(|len| &bytes[..len]))
            .and_then(|bytes| std::str::from_utf8(bytes).ok());
        match name {
            Some(name) => imports.push(PeImport {
                name: Some(name.to_owned()),
                dll: dll.to_owned(),
                ordinal: hint,
            }),
            None => warn!("import of {} has no readable symbol name, skipping it", dll),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[ctor::ctor]
    fn init_logging() {
        env_logger::init();
    }

    fn section(name: &[u8], va: u32, vsize: u32, raw: u32, rawsize: u32) -> PeSection {
        let mut header = pe::IMAGE_SECTION_HEADER::default();
        header.name[..name.len()].copy_from_slice(name);
        header.virtual_address = va;
        header.virtual_size = vsize;
        header.pointer_to_raw_data = raw;
        header.size_of_raw_data = rawsize;
        PeSection::read(header)
    }

    #[test]
    fn test_section_name_trimmed() {
        let s = section(b".text", 0x1000, 0x100, 0x400, 0x100);
        assert_eq!(s.name(), ".text");
        let s = section(b".textbss", 0x1000, 0x100, 0x400, 0x100);
        assert_eq!(s.name(), ".textbss");
    }

    #[test]
    fn test_rva_mapping_inside_section() {
        let s = section(b".text", 0x1000, 0x100, 0x400, 0x100);
        assert_eq!(s.rva_to_file_offset(0x1000), Some(0x400));
        assert_eq!(s.rva_to_file_offset(0x1050), Some(0x450));
        assert_eq!(s.rva_to_file_offset(0x10ff), Some(0x4ff));
        assert_eq!(s.rva_to_file_offset(0x1100), None);
        assert_eq!(s.rva_to_file_offset(0xfff), None);
    }

    #[test]
    fn test_rva_mapping_clips_to_raw_data() {
        // Virtual span runs to 0x1200 but the file only holds 0x80 bytes; the
        // zero-filled tail maps to nothing.
        let s = section(b".data", 0x1000, 0x200, 0x600, 0x80);
        assert_eq!(s.rva_to_file_offset(0x1040), Some(0x640));
        assert_eq!(s.rva_to_file_offset(0x1080), None);
        assert_eq!(s.rva_to_file_offset(0x11ff), None);
    }

    #[test]
    fn test_rva_mapping_picks_containing_section() {
        let sections = vec![
            section(b".text", 0x1000, 0x1000, 0x400, 0x1000),
            section(b".data", 0x2000, 0x1000, 0x1400, 0x1000),
        ];
        assert_eq!(rva_to_file_offset_in(&sections, 0x1010), Some(0x410));
        assert_eq!(rva_to_file_offset_in(&sections, 0x2010), Some(0x1410));
        assert_eq!(rva_to_file_offset_in(&sections, 0x3010), None);
    }

    #[test]
    fn test_not_an_image() {
        assert_eq!(
            PeImage::parse(&b""[..]).err().unwrap(),
            Error::MissingDosHeader
        );
        let mut bytes = vec![0u8; 0x40];
        bytes[0] = b'Z';
        bytes[1] = b'M';
        assert_eq!(
            PeImage::parse(&bytes[..]).err().unwrap(),
            Error::DosSignatureMismatch
        );
    }

    #[test]
    fn test_truncated_nt_headers() {
        // A valid DOS header pointing past the end of the buffer.
        let mut bytes = vec![0u8; 0x40];
        bytes[0] = b'M';
        bytes[1] = b'Z';
        bytes[0x3c] = 0x80;
        assert_eq!(
            PeImage::parse(&bytes[..]).err().unwrap(),
            Error::MissingNtHeaders
        );
    }
}
