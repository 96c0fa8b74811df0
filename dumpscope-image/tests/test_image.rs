// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use dumpscope_image::{Error, PeImage};
use dumpscope_synth::pe::{SynthExports, SynthImports, SynthPe, SynthSection};

#[ctor::ctor]
fn init_logging() {
    env_logger::init();
}

fn parse(synth: SynthPe) -> PeImage<Vec<u8>> {
    let bytes = synth.finish().unwrap();
    PeImage::parse(bytes).unwrap()
}

#[test]
fn test_parse_amd64() {
    let image = parse(
        SynthPe::new_amd64(0x1_4000_0000)
            .entry_point(0x1790)
            .checksum(0xf00d)
            .time_date_stamp(0x5f30_cafe)
            .add_section(SynthSection::new(".text", 0x1000).data(&[0x90; 0x40])),
    );
    assert!(image.is_64bit());
    assert_eq!(image.machine(), 0x8664);
    assert_eq!(image.image_base(), 0x1_4000_0000);
    assert_eq!(image.entry_point(), 0x1790);
    assert_eq!(image.checksum(), 0xf00d);
    assert_eq!(image.time_date_stamp(), 0x5f30_cafe);
    assert_eq!(image.size_of_image(), 0x2000);
    assert_eq!(image.sections().len(), 1);
    assert_eq!(image.sections()[0].name(), ".text");
    assert!(image.exports().is_empty());
    assert!(image.imports().is_empty());
}

#[test]
fn test_parse_x86() {
    let image = parse(
        SynthPe::new_x86(0x40_0000)
            .entry_point(0x1000)
            .add_section(SynthSection::new(".text", 0x1000).data(&[0xc3; 0x10])),
    );
    assert!(!image.is_64bit());
    assert_eq!(image.machine(), 0x14c);
    assert_eq!(image.image_base(), 0x40_0000);
    assert_eq!(image.entry_point(), 0x1000);
}

#[test]
fn test_rva_to_file_offset() {
    let image = parse(
        SynthPe::new_amd64(0x1_4000_0000)
            .add_section(SynthSection::new(".text", 0x1000).data(&[0x90; 0x40]))
            .add_section(SynthSection::new(".data", 0x2000).data(&[0xaa; 0x10])),
    );
    // Raw data starts at the first file-alignment boundary past the headers;
    // sections pack at file alignment after that.
    let text = image.section(".text").unwrap();
    let text_raw = text.raw.pointer_to_raw_data as usize;
    assert_eq!(image.rva_to_file_offset(0x1000), Some(text_raw));
    assert_eq!(image.rva_to_file_offset(0x1010), Some(text_raw + 0x10));
    assert_eq!(
        image.rva_to_file_offset(0x2004),
        Some(text_raw + 0x200 + 0x4)
    );
    // Nothing maps the gap between sections or addresses past the image.
    assert_eq!(image.rva_to_file_offset(0x0), None);
    assert_eq!(image.rva_to_file_offset(0x3000), None);

    // The mapped bytes are the section's own.
    assert_eq!(image.read_at_rva(0x1000, 4).unwrap(), &[0x90; 4]);
    assert_eq!(image.read_at_rva(0x2000, 2).unwrap(), &[0xaa; 2]);
}

#[test]
fn test_rva_in_zero_filled_tail_is_unmapped() {
    // Virtual span of 0x3000 but only 0x20 raw bytes (padded to 0x200 in the
    // file): the span past the raw data exists only at load time.
    let image = parse(
        SynthPe::new_amd64(0x1_4000_0000)
            .add_section(
                SynthSection::new(".bss", 0x1000)
                    .data(&[0u8; 0x20])
                    .virtual_size(0x3000),
            ),
    );
    assert!(image.rva_to_file_offset(0x11ff).is_some());
    assert_eq!(image.rva_to_file_offset(0x1200), None);
    assert_eq!(image.rva_to_file_offset(0x3fff), None);
    assert_eq!(image.size_of_image(), 0x4000);
}

#[test]
fn test_exports() {
    let image = parse(
        SynthPe::new_amd64(0x1_4000_0000)
            .add_section(SynthSection::new(".text", 0x1000).data(&[0xcc; 0x100]))
            .exports(
                SynthExports::new("app.exe")
                    .symbol("initialize", 0x1010)
                    .symbol("run", 0x1050)
                    .symbol_by_ordinal(0x1080)
                    .forwarder("alloc", "NTDLL.RtlAllocateHeap"),
            ),
    );
    let exports = image.exports();
    // The forwarder entry is dropped; the other three survive with ordinals
    // biased from 1.
    assert_eq!(exports.len(), 3);
    assert_eq!(exports[0].name.as_deref(), Some("initialize"));
    assert_eq!(exports[0].ordinal, 1);
    assert_eq!(exports[0].rva, 0x1010);
    assert_eq!(exports[1].name.as_deref(), Some("run"));
    assert_eq!(exports[1].ordinal, 2);
    assert_eq!(exports[2].name, None);
    assert_eq!(exports[2].ordinal, 3);
    assert_eq!(exports[2].rva, 0x1080);

    // Exported rvas land in .text, so they map to file offsets.
    let text_raw = image.section(".text").unwrap().raw.pointer_to_raw_data as usize;
    assert_eq!(exports[0].file_offset, Some(text_raw + 0x10));
}

#[test]
fn test_imports_amd64() {
    let image = parse(
        SynthPe::new_amd64(0x1_4000_0000)
            .add_section(SynthSection::new(".text", 0x1000).data(&[0xcc; 0x10]))
            .imports(
                SynthImports::new()
                    .by_name("KERNEL32.dll", "ExitProcess")
                    .by_name("KERNEL32.dll", "VirtualAlloc")
                    .by_ordinal("WS2_32.dll", 151),
            ),
    );
    let imports = image.imports();
    assert_eq!(imports.len(), 3);
    assert_eq!(imports[0].dll, "KERNEL32.dll");
    assert_eq!(imports[0].name.as_deref(), Some("ExitProcess"));
    assert_eq!(imports[1].dll, "KERNEL32.dll");
    assert_eq!(imports[1].name.as_deref(), Some("VirtualAlloc"));
    assert_eq!(imports[2].dll, "WS2_32.dll");
    assert_eq!(imports[2].name, None);
    assert_eq!(imports[2].ordinal, 151);
}

#[test]
fn test_imports_x86() {
    // Same table through 32-bit thunks.
    let image = parse(
        SynthPe::new_x86(0x40_0000)
            .add_section(SynthSection::new(".text", 0x1000).data(&[0xcc; 0x10]))
            .imports(
                SynthImports::new()
                    .by_name("USER32.dll", "MessageBoxW")
                    .by_ordinal("COMCTL32.dll", 17),
            ),
    );
    let imports = image.imports();
    assert_eq!(imports.len(), 2);
    assert_eq!(imports[0].dll, "USER32.dll");
    assert_eq!(imports[0].name.as_deref(), Some("MessageBoxW"));
    assert_eq!(imports[1].dll, "COMCTL32.dll");
    assert_eq!(imports[1].ordinal, 17);
}

#[test]
fn test_not_a_pe() {
    // Shorter than a DOS header.
    let err = PeImage::parse(&b"not an executable"[..]).err().unwrap();
    assert_eq!(err, Error::MissingDosHeader);
    assert_eq!(err.name(), "MissingDosHeader");

    // Long enough, but no MZ.
    let err = PeImage::parse(&[0x41u8; 0x80][..]).err().unwrap();
    assert_eq!(err, Error::DosSignatureMismatch);
    assert_eq!(err.name(), "DosSignatureMismatch");
}

#[test]
fn test_print_smoke() {
    let image = parse(
        SynthPe::new_amd64(0x1_4000_0000)
            .add_section(SynthSection::new(".text", 0x1000).data(&[0x90; 0x40]))
            .exports(SynthExports::new("app.exe").symbol("run", 0x1000))
            .imports(SynthImports::new().by_name("KERNEL32.dll", "ExitProcess")),
    );
    let mut out = Vec::new();
    image.print(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("machine"));
    assert!(text.contains(".text"));
    assert!(text.contains("run"));
    assert!(text.contains("KERNEL32.dll!ExitProcess"));
}
