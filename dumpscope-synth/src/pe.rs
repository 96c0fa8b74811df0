// Copyright 2016 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Synthetic PE images for testing.
//!
//! Same philosophy as the dump side: every header field is written out by hand
//! rather than through dumpscope-image's layouts, so the two cannot agree on a
//! shared mistake. The builder lays sections out the way a linker would, with
//! 0x1000 virtual and 0x200 file alignment, and can synthesize export and
//! import directories from symbol lists.

use test_assembler::*;

const DOS_MAGIC: u16 = 0x5a4d;
const NT_SIGNATURE: u32 = 0x0000_4550;
const HDR32_MAGIC: u16 = 0x10b;
const HDR64_MAGIC: u16 = 0x20b;
const MACHINE_I386: u16 = 0x14c;
const MACHINE_AMD64: u16 = 0x8664;
const ORDINAL_FLAG32: u32 = 0x8000_0000;
const ORDINAL_FLAG64: u64 = 0x8000_0000_0000_0000;
const SECTION_ALIGNMENT: u32 = 0x1000;
const FILE_ALIGNMENT: u32 = 0x200;
const IMPORT_DESCRIPTOR_SIZE: u32 = 20;

fn align(value: u32, alignment: u32) -> u32 {
    value
        .checked_add(alignment - 1)
        .expect("section layout overflow")
        / alignment
        * alignment
}

/// One section of a synthetic image.
pub struct SynthSection {
    name: [u8; 8],
    virtual_address: u32,
    virtual_size: Option<u32>,
    characteristics: u32,
    data: Vec<u8>,
}

impl SynthSection {
    pub fn new(name: &str, virtual_address: u32) -> SynthSection {
        assert!(name.len() <= 8, "section names cap at 8 bytes");
        let mut padded = [0u8; 8];
        padded[..name.len()].copy_from_slice(name.as_bytes());
        SynthSection {
            name: padded,
            virtual_address,
            virtual_size: None,
            characteristics: 0x6000_0020,
            data: Vec::new(),
        }
    }

    /// Sets the section's raw contents.
    pub fn data(mut self, bytes: &[u8]) -> SynthSection {
        self.data = bytes.to_vec();
        self
    }

    /// Overrides the virtual size, for sections whose loaded span outgrows
    /// their raw data.
    pub fn virtual_size(mut self, size: u32) -> SynthSection {
        self.virtual_size = Some(size);
        self
    }

    pub fn characteristics(mut self, flags: u32) -> SynthSection {
        self.characteristics = flags;
        self
    }

    fn effective_virtual_size(&self) -> u32 {
        self.virtual_size.unwrap_or(self.data.len() as u32)
    }
}

enum SynthExport {
    Symbol { name: Option<String>, rva: u32 },
    Forwarder { name: String, target: String },
}

impl SynthExport {
    fn name(&self) -> Option<&str> {
        match self {
            SynthExport::Symbol { name, .. } => name.as_deref(),
            SynthExport::Forwarder { name, .. } => Some(name),
        }
    }
}

/// The export table of a synthetic image, one function slot per entry, ordinal
/// base 1.
pub struct SynthExports {
    dll_name: String,
    entries: Vec<SynthExport>,
}

impl SynthExports {
    pub fn new(dll_name: &str) -> SynthExports {
        SynthExports {
            dll_name: dll_name.to_owned(),
            entries: Vec::new(),
        }
    }

    /// Adds a named export pointing at `rva`.
    pub fn symbol(mut self, name: &str, rva: u32) -> SynthExports {
        self.entries.push(SynthExport::Symbol {
            name: Some(name.to_owned()),
            rva,
        });
        self
    }

    /// Adds an export reachable only through its ordinal.
    pub fn symbol_by_ordinal(mut self, rva: u32) -> SynthExports {
        self.entries.push(SynthExport::Symbol { name: None, rva });
        self
    }

    /// Adds a forwarder to `target` (e.g. `NTDLL.RtlAllocateHeap`), whose
    /// function slot points back inside the export directory.
    pub fn forwarder(mut self, name: &str, target: &str) -> SynthExports {
        self.entries.push(SynthExport::Forwarder {
            name: name.to_owned(),
            target: target.to_owned(),
        });
        self
    }

    fn build(&self, va: u32) -> Vec<u8> {
        let nfuncs = self.entries.len() as u32;
        let named: Vec<(usize, &str)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.name().map(|n| (i, n)))
            .collect();
        let nnames = named.len() as u32;

        let functions_off = 40;
        let names_off = functions_off + 4 * nfuncs;
        let ordinals_off = names_off + 4 * nnames;
        let mut strings_off = ordinals_off + 2 * nnames;

        let dll_name_off = strings_off;
        strings_off += self.dll_name.len() as u32 + 1;
        let name_offs: Vec<u32> = named
            .iter()
            .map(|(_, name)| {
                let off = strings_off;
                strings_off += name.len() as u32 + 1;
                off
            })
            .collect();
        let forwarder_offs: Vec<u32> = self
            .entries
            .iter()
            .filter_map(|e| match e {
                SynthExport::Forwarder { target, .. } => {
                    let off = strings_off;
                    strings_off += target.len() as u32 + 1;
                    Some(off)
                }
                _ => None,
            })
            .collect();

        let mut section = Section::with_endian(Endian::Little)
            .D32(0) // characteristics
            .D32(0) // time_date_stamp
            .D16(0)
            .D16(0) // version
            .D32(va + dll_name_off)
            .D32(1) // ordinal base
            .D32(nfuncs)
            .D32(nnames)
            .D32(va + functions_off)
            .D32(va + names_off)
            .D32(va + ordinals_off);
        let mut forwarders = forwarder_offs.iter();
        for entry in &self.entries {
            section = match entry {
                SynthExport::Symbol { rva, .. } => section.D32(*rva),
                // A forwarder's slot points at its target string, inside the
                // directory span.
                SynthExport::Forwarder { .. } => section.D32(va + forwarders.next().unwrap()),
            };
        }
        for off in &name_offs {
            section = section.D32(va + off);
        }
        for (index, _) in &named {
            section = section.D16(*index as u16);
        }
        section = section.append_bytes(self.dll_name.as_bytes()).D8(0);
        for (_, name) in &named {
            section = section.append_bytes(name.as_bytes()).D8(0);
        }
        for entry in &self.entries {
            if let SynthExport::Forwarder { target, .. } = entry {
                section = section.append_bytes(target.as_bytes()).D8(0);
            }
        }
        section.get_contents().unwrap()
    }
}

enum SynthImport {
    ByName(String),
    ByOrdinal(u16),
}

/// The import table of a synthetic image, grouped by source DLL.
#[derive(Default)]
pub struct SynthImports {
    dlls: Vec<(String, Vec<SynthImport>)>,
}

impl SynthImports {
    pub fn new() -> SynthImports {
        Default::default()
    }

    /// Adds an import of `symbol` from `dll`.
    pub fn by_name(mut self, dll: &str, symbol: &str) -> SynthImports {
        self.dll_entry(dll)
            .push(SynthImport::ByName(symbol.to_owned()));
        self
    }

    /// Adds an import of `ordinal` from `dll`.
    pub fn by_ordinal(mut self, dll: &str, ordinal: u16) -> SynthImports {
        self.dll_entry(dll).push(SynthImport::ByOrdinal(ordinal));
        self
    }

    fn dll_entry(&mut self, dll: &str) -> &mut Vec<SynthImport> {
        if !self.dlls.iter().any(|(name, _)| name == dll) {
            self.dlls.push((dll.to_owned(), Vec::new()));
        }
        &mut self.dlls.last_mut().unwrap().1
    }

    /// Writes the descriptor table, lookup tables, and name blobs. Returns the
    /// bytes and the directory size, which covers only the descriptors.
    fn build(&self, va: u32, is_64: bool) -> (Vec<u8>, u32) {
        let ptr = if is_64 { 8u32 } else { 4u32 };
        let dir_size = (self.dlls.len() as u32 + 1) * IMPORT_DESCRIPTOR_SIZE;

        let mut cursor = dir_size;
        let ilt_offs: Vec<u32> = self
            .dlls
            .iter()
            .map(|(_, symbols)| {
                let off = cursor;
                cursor += (symbols.len() as u32 + 1) * ptr;
                off
            })
            .collect();
        // Hint/name entries are word aligned.
        let mut hint_offs = Vec::new();
        for (_, symbols) in &self.dlls {
            for symbol in symbols {
                if let SynthImport::ByName(name) = symbol {
                    hint_offs.push(cursor);
                    cursor += 2 + name.len() as u32 + 1;
                    cursor += cursor & 1;
                }
            }
        }
        let dll_name_offs: Vec<u32> = self
            .dlls
            .iter()
            .map(|(dll, _)| {
                let off = cursor;
                cursor += dll.len() as u32 + 1;
                off
            })
            .collect();

        let mut section = Section::with_endian(Endian::Little);
        for (i, _) in self.dlls.iter().enumerate() {
            section = section
                .D32(va + ilt_offs[i]) // original_first_thunk
                .D32(0)
                .D32(0)
                .D32(va + dll_name_offs[i])
                .D32(va + ilt_offs[i]); // first_thunk
        }
        section = section.append_repeated(0, IMPORT_DESCRIPTOR_SIZE as usize);

        let mut hints = hint_offs.iter();
        for (_, symbols) in &self.dlls {
            for symbol in symbols {
                let entry = match symbol {
                    SynthImport::ByName(_) => u64::from(va + hints.next().unwrap()),
                    SynthImport::ByOrdinal(ordinal) => {
                        if is_64 {
                            ORDINAL_FLAG64 | u64::from(*ordinal)
                        } else {
                            u64::from(ORDINAL_FLAG32 | u32::from(*ordinal))
                        }
                    }
                };
                section = if is_64 {
                    section.D64(entry)
                } else {
                    section.D32(entry as u32)
                };
            }
            section = if is_64 { section.D64(0) } else { section.D32(0) };
        }
        for (_, symbols) in &self.dlls {
            for symbol in symbols {
                if let SynthImport::ByName(name) = symbol {
                    section = section.D16(0).append_bytes(name.as_bytes()).D8(0);
                    if (2 + name.len() + 1) & 1 == 1 {
                        section = section.D8(0);
                    }
                }
            }
        }
        for (dll, _) in &self.dlls {
            section = section.append_bytes(dll.as_bytes()).D8(0);
        }
        (section.get_contents().unwrap(), dir_size)
    }
}

/// A writer of synthetic PE images.
pub struct SynthPe {
    is_64: bool,
    machine: u16,
    image_base: u64,
    entry_point: u32,
    checksum: u32,
    time_date_stamp: u32,
    sections: Vec<SynthSection>,
    exports: Option<SynthExports>,
    imports: Option<SynthImports>,
}

impl SynthPe {
    /// Starts a 64-bit x86-64 image loaded at `image_base`.
    pub fn new_amd64(image_base: u64) -> SynthPe {
        SynthPe {
            is_64: true,
            machine: MACHINE_AMD64,
            image_base,
            entry_point: 0,
            checksum: 0,
            time_date_stamp: 0,
            sections: Vec::new(),
            exports: None,
            imports: None,
        }
    }

    /// Starts a 32-bit x86 image loaded at `image_base`.
    pub fn new_x86(image_base: u32) -> SynthPe {
        SynthPe {
            is_64: false,
            machine: MACHINE_I386,
            image_base: image_base as u64,
            ..SynthPe::new_amd64(0)
        }
    }

    pub fn entry_point(mut self, rva: u32) -> SynthPe {
        self.entry_point = rva;
        self
    }

    pub fn checksum(mut self, checksum: u32) -> SynthPe {
        self.checksum = checksum;
        self
    }

    pub fn time_date_stamp(mut self, timestamp: u32) -> SynthPe {
        self.time_date_stamp = timestamp;
        self
    }

    pub fn add_section(mut self, section: SynthSection) -> SynthPe {
        self.sections.push(section);
        self
    }

    /// Synthesizes an `.edata` section from `exports` at the next free virtual
    /// address.
    pub fn exports(mut self, exports: SynthExports) -> SynthPe {
        self.exports = Some(exports);
        self
    }

    /// Synthesizes an `.idata` section from `imports` at the next free virtual
    /// address.
    pub fn imports(mut self, imports: SynthImports) -> SynthPe {
        self.imports = Some(imports);
        self
    }

    fn next_virtual_address(&self) -> u32 {
        let end = self
            .sections
            .iter()
            .map(|s| s.virtual_address + s.effective_virtual_size())
            .max()
            .unwrap_or(0);
        align(end.max(SECTION_ALIGNMENT), SECTION_ALIGNMENT)
    }

    /// Lays the image out and returns its bytes.
    pub fn finish(mut self) -> Option<Vec<u8>> {
        let mut export_dir = (0u32, 0u32);
        if let Some(exports) = self.exports.take() {
            let va = self.next_virtual_address();
            let bytes = exports.build(va);
            export_dir = (va, bytes.len() as u32);
            self.sections.push(
                SynthSection::new(".edata", va)
                    .characteristics(0x4000_0040)
                    .data(&bytes),
            );
        }
        let mut import_dir = (0u32, 0u32);
        if let Some(imports) = self.imports.take() {
            let va = self.next_virtual_address();
            let (bytes, dir_size) = imports.build(va, self.is_64);
            import_dir = (va, dir_size);
            self.sections.push(
                SynthSection::new(".idata", va)
                    .characteristics(0x4000_0040)
                    .data(&bytes),
            );
        }

        let optional_size: u32 = if self.is_64 { 112 + 128 } else { 96 + 128 };
        let headers_end = 0x40 + 4 + 20 + optional_size + self.sections.len() as u32 * 40;
        let size_of_headers = align(headers_end, FILE_ALIGNMENT);

        let mut raw_offset = size_of_headers;
        let raws: Vec<(u32, u32)> = self
            .sections
            .iter()
            .map(|s| {
                let raw_size = align(s.data.len() as u32, FILE_ALIGNMENT);
                let place = (raw_offset, raw_size);
                raw_offset += raw_size;
                place
            })
            .collect();
        let size_of_image = align(
            self.sections
                .iter()
                .map(|s| s.virtual_address + s.effective_virtual_size())
                .max()
                .unwrap_or(SECTION_ALIGNMENT),
            SECTION_ALIGNMENT,
        );

        let mut section = Section::with_endian(Endian::Little)
            // DOS header: the signature, 58 bytes nobody reads anymore, and the
            // NT header offset.
            .D16(DOS_MAGIC)
            .append_repeated(0, 0x3a)
            .D32(0x40)
            .D32(NT_SIGNATURE)
            // COFF file header.
            .D16(self.machine)
            .D16(self.sections.len() as u16)
            .D32(self.time_date_stamp)
            .D32(0) // symbol table
            .D32(0)
            .D16(optional_size as u16)
            .D16(if self.is_64 { 0x0022 } else { 0x0102 });

        // Optional header.
        section = section
            .D16(if self.is_64 { HDR64_MAGIC } else { HDR32_MAGIC })
            .D8(14)
            .D8(0) // linker version
            .D32(0)
            .D32(0)
            .D32(0) // code/data sizes
            .D32(self.entry_point)
            .D32(SECTION_ALIGNMENT); // base_of_code
        if self.is_64 {
            section = section.D64(self.image_base);
        } else {
            section = section.D32(0).D32(self.image_base as u32); // base_of_data, image_base
        }
        section = section
            .D32(SECTION_ALIGNMENT)
            .D32(FILE_ALIGNMENT)
            .D16(6)
            .D16(0) // os version
            .D16(0)
            .D16(0) // image version
            .D16(6)
            .D16(0) // subsystem version
            .D32(0) // win32_version_value
            .D32(size_of_image)
            .D32(size_of_headers)
            .D32(self.checksum)
            .D16(3) // console subsystem
            .D16(0x8160);
        section = if self.is_64 {
            section.D64(0x10_0000).D64(0x1000).D64(0x10_0000).D64(0x1000)
        } else {
            section.D32(0x10_0000).D32(0x1000).D32(0x10_0000).D32(0x1000)
        };
        section = section
            .D32(0) // loader flags
            .D32(16); // number_of_rva_and_sizes

        // Data directories: export, import, 14 empty.
        section = section
            .D32(export_dir.0)
            .D32(export_dir.1)
            .D32(import_dir.0)
            .D32(import_dir.1)
            .append_repeated(0, 14 * 8);

        // Section table.
        for (s, &(raw, raw_size)) in self.sections.iter().zip(&raws) {
            section = section
                .append_bytes(&s.name)
                .D32(s.effective_virtual_size())
                .D32(s.virtual_address)
                .D32(raw_size)
                .D32(raw)
                .D32(0)
                .D32(0)
                .D16(0)
                .D16(0)
                .D32(s.characteristics);
        }
        section = section.append_repeated(0, (size_of_headers - headers_end) as usize);

        // Raw section data, each padded to its aligned size.
        for (s, &(_, raw_size)) in self.sections.iter().zip(&raws) {
            section = section
                .append_bytes(&s.data)
                .append_repeated(0, raw_size as usize - s.data.len());
        }

        section.get_contents()
    }
}
