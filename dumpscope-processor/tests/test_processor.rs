// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! End-to-end tests feeding synthesized dumps (and images) through `process`.

use dumpscope::format as md;
use dumpscope::{Cpu, Dump, Os};
use dumpscope_image::PeImage;
use dumpscope_processor::{process, CallOutcome, FrameTrust, WarningKind};
use dumpscope_synth::pe::{SynthPe, SynthSection};
use dumpscope_synth::{
    amd64_context, amd64_context_with_frame, x86_context_with_frame, DumpString, Exception, Memory,
    MiscFieldsProcessTimes, MiscStream, Module, SynthDump, SystemInfo, Thread, ThreadName,
};
use test_assembler::*;

fn read_synth_dump<'a>(dump: SynthDump) -> Dump<'a, Vec<u8>> {
    Dump::read(dump.finish().unwrap()).unwrap()
}

fn windows_amd64_system_info() -> SystemInfo {
    let mut info = SystemInfo::new(Endian::Little)
        .set_processor_architecture(md::ProcessorArchitecture::PROCESSOR_ARCHITECTURE_AMD64 as u16)
        .set_platform_id(md::PlatformId::VER_PLATFORM_WIN32_NT as u32);
    info.major_version = 10;
    info.minor_version = 0;
    info.build_number = 19045;
    info.number_of_processors = 8;
    info
}

#[test]
fn test_process_full_dump() {
    const MODULE_BASE: u64 = 0x1_4000_0000;
    const STACK_BASE: u64 = 0x7fff_0000_1000;
    const THREAD_ID: u32 = 0x4106;
    const FAULT_ADDR: u64 = 0x16;

    let module_name = DumpString::new("C:\\app\\widget.exe", Endian::Little);
    let module = Module::new(
        Endian::Little,
        MODULE_BASE,
        0x10000,
        &module_name,
        0x5a6b_7c8d,
        0,
        None,
    );

    // One frame pointer hop: the context frame's %rbp points at a saved
    // (%rbp, return address) pair leading back into widget.exe.
    let stack_section = Section::with_endian(Endian::Little)
        .D64(0) // junk
        .D64(0) // junk
        .D64(STACK_BASE + 0x30) // saved %rbp
        .D64(MODULE_BASE + 0x2345) // return address
        .append_repeated(0, 0x20);
    let stack = Memory::with_section(stack_section, STACK_BASE);

    // The thread record's context is the handler that wrote the dump; the
    // exception stream's context is the state at the fault.
    let handler_context = amd64_context_with_frame(
        Endian::Little,
        MODULE_BASE + 0x9999,
        STACK_BASE,
        STACK_BASE + 0x10,
    );
    let fault_context = amd64_context_with_frame(
        Endian::Little,
        MODULE_BASE + 0x1d0,
        STACK_BASE,
        STACK_BASE + 0x10,
    );
    let thread = Thread::new(Endian::Little, THREAD_ID, &stack, &handler_context);

    let name = DumpString::new("MainThread", Endian::Little);
    let thread_name = ThreadName::new(Endian::Little, THREAD_ID, Some(&name));

    let mut exception = Exception::new(Endian::Little).set_thread_context(&fault_context);
    exception.thread_id = THREAD_ID;
    exception.exception_record.exception_code = 0xc0000005; // EXCEPTION_ACCESS_VIOLATION
    exception.exception_record.exception_address = MODULE_BASE + 0x1d0;
    exception.exception_record.number_parameters = 2;
    exception.exception_record.exception_information[0] = 1; // write
    exception.exception_record.exception_information[1] = FAULT_ADDR;

    let mut misc = MiscStream::new(Endian::Little);
    misc.process_id = Some(3141);
    misc.process_times = Some(MiscFieldsProcessTimes {
        process_create_time: 0x5e9f_0abc,
        process_user_time: 11,
        process_kernel_time: 22,
    });

    let dump = SynthDump::with_endian(Endian::Little)
        .add(module_name)
        .add_module(module)
        .add_thread(thread)
        .add(handler_context)
        .add(stack)
        .add(name)
        .add_thread_name(thread_name)
        .add_system_info(windows_amd64_system_info())
        .add_stream(misc)
        .add_exception(exception)
        .add(fault_context);
    let dump = read_synth_dump(dump);

    let report = process(&dump, None::<&PeImage<Vec<u8>>>);

    assert!(report.warnings.is_empty());

    let system = report.system.as_ref().unwrap();
    assert_eq!(system.os, Os::Windows);
    assert_eq!(system.cpu, Cpu::X86_64);
    assert_eq!(system.os_version.as_deref(), Some("10.0.19045"));
    assert_eq!(system.os_build.as_deref(), Some("19045"));
    assert_eq!(system.cpu_count, 8);

    assert!(report.crashed());
    let exception = report.exception.as_ref().unwrap();
    assert_eq!(
        exception.reason.to_string(),
        "EXCEPTION_ACCESS_VIOLATION_WRITE"
    );
    assert_eq!(exception.address, FAULT_ADDR);
    assert_eq!(exception.faulting_thread_id, THREAD_ID);

    let metadata = report.metadata.as_ref().unwrap();
    assert_eq!(metadata.process_id, Some(3141));
    assert_eq!(metadata.process_create_time, Some(0x5e9f_0abc));
    assert_eq!(metadata.main_module_name.as_deref(), Some("C:\\app\\widget.exe"));
    assert_eq!(metadata.main_module_base, Some(MODULE_BASE));

    assert_eq!(report.threads.len(), 1);
    let thread = &report.threads[0];
    assert_eq!(thread.thread_id, THREAD_ID);
    assert_eq!(thread.name.as_deref(), Some("MainThread"));
    assert_eq!(thread.outcome, CallOutcome::Ok);
    assert_eq!(thread.stack_range, Some((STACK_BASE, STACK_BASE + 0x40)));
    assert_eq!(thread.frames.len(), 2);
    assert_eq!(report.faulting_thread().unwrap().thread_id, THREAD_ID);

    // The walk starts from the exception context, not the handler context.
    let f0 = &thread.frames[0];
    assert_eq!(f0.trust, FrameTrust::Context);
    assert_eq!(f0.instruction, MODULE_BASE + 0x1d0);
    assert_eq!(f0.module.as_ref().unwrap().code_file(), "C:\\app\\widget.exe");
    assert_eq!(f0.rva, Some(0x1d0));
    assert!(f0.disassembly.is_none());

    let f1 = &thread.frames[1];
    assert_eq!(f1.trust, FrameTrust::FramePointer);
    assert_eq!(f1.resume_address, MODULE_BASE + 0x2345);
    assert_eq!(f1.instruction, MODULE_BASE + 0x2344);
    assert_eq!(f1.rva, Some(0x2344));

    assert!(report.image.is_none());

    let mut buf = Vec::new();
    report.print(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains("Operating system: Windows NT"));
    assert!(text.contains("Crash reason:  EXCEPTION_ACCESS_VIOLATION_WRITE"));
    assert!(text.contains("Crash address: 0x16"));
    assert!(text.contains("Thread 0 MainThread (crashed)"));
    assert!(text.contains("widget.exe + 0x1d0"));
    assert!(text.contains("Found by: given as instruction pointer in context"));
    assert!(text.contains("Found by: previous frame's frame pointer"));
    assert!(text.contains("(main)"));
}

#[test]
fn test_process_x86_dump() {
    const MODULE_BASE: u32 = 0x40_0000;
    const STACK_BASE: u32 = 0x12_f000;

    let module_name = DumpString::new("C:\\legacy\\app32.exe", Endian::Little);
    let module = Module::new(
        Endian::Little,
        MODULE_BASE as u64,
        0x10000,
        &module_name,
        0x4567_89ab,
        0,
        None,
    );

    let stack_section = Section::with_endian(Endian::Little)
        .D32(0) // junk
        .D32(0) // junk
        .D32(STACK_BASE + 0x18) // saved %ebp
        .D32(MODULE_BASE + 0x1100) // return address
        .append_repeated(0, 0x10);
    let stack = Memory::with_section(stack_section, STACK_BASE as u64);

    let context =
        x86_context_with_frame(Endian::Little, MODULE_BASE + 0x100, STACK_BASE, STACK_BASE + 8);
    let thread = Thread::new(Endian::Little, 0x300, &stack, &context);

    let mut system_info = SystemInfo::new(Endian::Little)
        .set_processor_architecture(md::ProcessorArchitecture::PROCESSOR_ARCHITECTURE_INTEL as u16)
        .set_platform_id(md::PlatformId::VER_PLATFORM_WIN32_NT as u32);
    system_info.major_version = 5;
    system_info.minor_version = 1;
    system_info.build_number = 2600;
    system_info.number_of_processors = 1;

    let dump = SynthDump::with_endian(Endian::Little)
        .add(module_name)
        .add_module(module)
        .add_thread(thread)
        .add(context)
        .add(stack)
        .add_system_info(system_info);
    let dump = read_synth_dump(dump);

    let report = process(&dump, None::<&PeImage<Vec<u8>>>);

    assert!(!report.crashed());
    assert!(report.metadata.is_none());
    assert_eq!(report.system.as_ref().unwrap().cpu, Cpu::X86);

    let thread = &report.threads[0];
    assert_eq!(thread.outcome, CallOutcome::Ok);
    assert_eq!(thread.frames.len(), 2);
    assert_eq!(thread.frames[0].trust, FrameTrust::Context);
    assert_eq!(thread.frames[0].instruction, (MODULE_BASE + 0x100) as u64);
    let f1 = &thread.frames[1];
    assert_eq!(f1.trust, FrameTrust::FramePointer);
    assert_eq!(f1.resume_address, (MODULE_BASE + 0x1100) as u64);
    assert_eq!(f1.rva, Some(0x10ff));
}

#[test]
fn test_image_disassembly_window() {
    const MODULE_BASE: u64 = 0x1_4000_0000;
    const TEXT_RVA: u32 = 0x1000;
    const RESUME: u64 = MODULE_BASE + TEXT_RVA as u64 + 16;
    const STACK_BASE: u64 = 0x7fff_0000_2000;

    // A ret at the resume address, nops on both sides.
    let mut text = vec![0x90u8; 16];
    text.push(0xc3);
    text.extend_from_slice(&[0x90; 19]);

    let pe = SynthPe::new_amd64(MODULE_BASE)
        .checksum(0xf00d)
        .time_date_stamp(0x5a6b_7c8d)
        .add_section(
            SynthSection::new(".text", TEXT_RVA)
                .data(&text)
                .virtual_size(0x1000),
        );
    let image = PeImage::parse(pe.finish().unwrap()).unwrap();

    let module_name = DumpString::new("C:\\app\\widget.exe", Endian::Little);
    let module = Module::new(
        Endian::Little,
        MODULE_BASE,
        0x10000,
        &module_name,
        0x5a6b_7c8d,
        0xf00d,
        None,
    );

    let stack = Memory::with_section(
        Section::with_endian(Endian::Little).append_repeated(0, 0x20),
        STACK_BASE,
    );
    let context = amd64_context(Endian::Little, RESUME, STACK_BASE);
    let thread = Thread::new(Endian::Little, 0x11, &stack, &context);

    let dump = SynthDump::with_endian(Endian::Little)
        .add(module_name)
        .add_module(module)
        .add_thread(thread)
        .add(context)
        .add(stack)
        .add_system_info(windows_amd64_system_info());
    let dump = read_synth_dump(dump);

    let report = process(&dump, Some(&image));

    assert!(report.warnings.is_empty());
    let summary = report.image.as_ref().unwrap();
    assert!(summary.is_64bit);
    assert_eq!(summary.image_base, MODULE_BASE);
    assert_eq!(summary.checksum, 0xf00d);

    let f0 = &report.threads[0].frames[0];
    assert_eq!(f0.rva, Some(TEXT_RVA as u64 + 16));
    let window = f0.disassembly.as_ref().unwrap();
    assert_eq!(window.instructions.len(), 36);
    assert_eq!(window.selected, 16);
    let selected = window.selected_instruction();
    assert_eq!(selected.address, RESUME);
    assert_eq!(selected.text, "ret");
    // The window reaches back into the bytes before the resume address.
    assert_eq!(window.instructions[0].address, MODULE_BASE + TEXT_RVA as u64);
}

#[test]
fn test_image_checksum_mismatch() {
    const MODULE_BASE: u64 = 0x1_4000_0000;
    const STACK_BASE: u64 = 0x7fff_0000_2000;

    let pe = SynthPe::new_amd64(MODULE_BASE).checksum(0x600d).add_section(
        SynthSection::new(".text", 0x1000)
            .data(&[0x90; 64])
            .virtual_size(0x1000),
    );
    let image = PeImage::parse(pe.finish().unwrap()).unwrap();

    let module_name = DumpString::new("C:\\app\\widget.exe", Endian::Little);
    let module = Module::new(
        Endian::Little,
        MODULE_BASE,
        0x10000,
        &module_name,
        0,
        0xf00d,
        None,
    );

    let stack = Memory::with_section(
        Section::with_endian(Endian::Little).append_repeated(0, 0x20),
        STACK_BASE,
    );
    let context = amd64_context(Endian::Little, MODULE_BASE + 0x1010, STACK_BASE);
    let thread = Thread::new(Endian::Little, 0x11, &stack, &context);

    let dump = SynthDump::with_endian(Endian::Little)
        .add(module_name)
        .add_module(module)
        .add_thread(thread)
        .add(context)
        .add(stack)
        .add_system_info(windows_amd64_system_info());
    let dump = read_synth_dump(dump);

    let report = process(&dump, Some(&image));

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::ImageMismatch);
    // No disassembly off a file that is not the module in the dump, but the
    // summary block still describes what was supplied.
    assert!(report.threads[0].frames[0].disassembly.is_none());
    assert!(report.image.is_some());
}

#[test]
fn test_missing_thread_list() {
    let dump = SynthDump::with_endian(Endian::Little).add_system_info(windows_amd64_system_info());
    let dump = read_synth_dump(dump);
    let report = process(&dump, None::<&PeImage<Vec<u8>>>);

    assert!(report.threads.is_empty());
    assert!(!report.crashed());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::Malformed);
}

#[test]
fn test_unsupported_cpu() {
    const STACK_BASE: u64 = 0x6000;

    let stack = Memory::with_section(
        Section::with_endian(Endian::Little).append_repeated(0, 0x20),
        STACK_BASE,
    );
    // The context bytes never decode for a CPU this crate cannot walk.
    let context = amd64_context(Endian::Little, 0x1000, STACK_BASE);
    let thread = Thread::new(Endian::Little, 0x21, &stack, &context);

    let mut info = SystemInfo::new(Endian::Little)
        .set_processor_architecture(md::ProcessorArchitecture::PROCESSOR_ARCHITECTURE_ARM64 as u16)
        .set_platform_id(md::PlatformId::VER_PLATFORM_WIN32_NT as u32);
    info.number_of_processors = 4;

    let dump = SynthDump::with_endian(Endian::Little)
        .add_thread(thread)
        .add(context)
        .add(stack)
        .add_system_info(info);
    let dump = read_synth_dump(dump);

    let report = process(&dump, None::<&PeImage<Vec<u8>>>);

    assert_eq!(report.system.as_ref().unwrap().cpu, Cpu::Arm64);
    assert_eq!(report.threads.len(), 1);
    assert_eq!(report.threads[0].outcome, CallOutcome::UnsupportedCpu);
    assert!(report.threads[0].frames.is_empty());
}

// Processing keeps no state between calls, so the same bytes always produce
// the same report.
#[test]
fn test_process_same_bytes_twice() {
    const MODULE_BASE: u64 = 0x1_4000_0000;
    const STACK_BASE: u64 = 0x7fff_0000_3000;

    let module_name = DumpString::new("C:\\app\\widget.exe", Endian::Little);
    let module = Module::new(
        Endian::Little,
        MODULE_BASE,
        0x10000,
        &module_name,
        0x5a6b_7c8d,
        0,
        None,
    );

    let stack_section = Section::with_endian(Endian::Little)
        .D64(STACK_BASE + 0x18) // saved %rbp
        .D64(MODULE_BASE + 0x400) // return address
        .append_repeated(0, 0x18);
    let stack = Memory::with_section(stack_section, STACK_BASE);
    let context =
        amd64_context_with_frame(Endian::Little, MODULE_BASE + 0x100, STACK_BASE, STACK_BASE);
    let thread = Thread::new(Endian::Little, 0x42, &stack, &context);

    let mut misc = MiscStream::new(Endian::Little);
    misc.process_id = Some(999);
    misc.process_times = Some(MiscFieldsProcessTimes {
        process_create_time: 0x5e9f_0abc,
        process_user_time: 1,
        process_kernel_time: 2,
    });

    let dump = SynthDump::with_endian(Endian::Little)
        .add(module_name)
        .add_module(module)
        .add_thread(thread)
        .add(context)
        .add(stack)
        .add_system_info(windows_amd64_system_info())
        .add_stream(misc);
    let bytes = dump.finish().unwrap();

    let dump_a = Dump::read(bytes.clone()).unwrap();
    let dump_b = Dump::read(bytes).unwrap();
    let mut text_a = Vec::new();
    process(&dump_a, None::<&PeImage<Vec<u8>>>)
        .print(&mut text_a)
        .unwrap();
    let mut text_b = Vec::new();
    process(&dump_b, None::<&PeImage<Vec<u8>>>)
        .print(&mut text_b)
        .unwrap();

    assert!(!text_a.is_empty());
    assert_eq!(text_a, text_b);
}
