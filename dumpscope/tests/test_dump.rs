// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Tests driving the public API over fully synthesized dumps.

use dumpscope::format as md;
use dumpscope::{
    Cpu, Dump, DumpException, DumpMemoryList, DumpMiscInfo, DumpModuleList, DumpSystemInfo,
    DumpThreadList, DumpThreadNames, Error, Os,
};
use dumpscope_synth::{
    amd64_context, DumpString, Exception, Memory, MiscFieldsProcessTimes, MiscStream, Module,
    SynthDump, SystemInfo, Thread, ThreadName,
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
fn test_read_path() {
    let bytes = SynthDump::with_endian(Endian::Little).finish().unwrap();
    let path = std::env::temp_dir().join("dumpscope_test_read_path.dmp");
    std::fs::write(&path, &bytes).unwrap();
    let dump = Dump::read_path(&path).unwrap();
    assert_eq!(dump.header.signature, md::MINIDUMP_SIGNATURE);
    assert_eq!(dump.get_raw_stream(0x99), Err(Error::StreamNotFound));
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_overlapping_modules_prefer_tightest() {
    let outer_name = DumpString::new("outer.dll", Endian::Little);
    let inner_name = DumpString::new("inner.dll", Endian::Little);
    let outer = Module::new(Endian::Little, 0x2000, 0x1000, &outer_name, 0, 0, None);
    let inner = Module::new(Endian::Little, 0x2100, 0x200, &inner_name, 0, 0, None);
    let dump = SynthDump::with_endian(Endian::Little)
        .add(outer_name)
        .add(inner_name)
        .add_module(outer)
        .add_module(inner);
    let dump = read_synth_dump(dump);

    let modules = dump.get_stream::<DumpModuleList>().unwrap();
    assert_eq!(modules.len(), 2);
    // Both records cover 0x2100..0x2300; the tighter one wins.
    assert_eq!(
        modules.module_at_address(0x2200).unwrap().code_file(),
        "inner.dll"
    );
    assert_eq!(
        modules.module_at_address(0x2050).unwrap().code_file(),
        "outer.dll"
    );
    assert_eq!(
        modules.module_at_address(0x2ff0).unwrap().code_file(),
        "outer.dll"
    );
    assert!(modules.module_at_address(0x3000).is_none());
    // The first record in the stream is the executable, wherever it loads.
    assert_eq!(modules.main_module().unwrap().code_file(), "outer.dll");
}

#[test]
fn test_full_dump_streams() {
    const MODULE_BASE: u64 = 0x1_4000_0000;
    const STACK_BASE: u64 = 0x7fff_0000_1000;
    const THREAD_ID: u32 = 0x1bcd;

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
        Section::with_endian(Endian::Little)
            .D64(0x1122_3344_5566_7788)
            .append_repeated(0, 0x38),
        STACK_BASE,
    );
    let context = amd64_context(Endian::Little, MODULE_BASE + 0x1d0, STACK_BASE);
    let thread = Thread::new(Endian::Little, THREAD_ID, &stack, &context);

    let name = DumpString::new("PoolThread", Endian::Little);
    let thread_name = ThreadName::new(Endian::Little, THREAD_ID, Some(&name));

    // The exception cites the same context record as the thread.
    let mut exception = Exception::new(Endian::Little).set_thread_context(&context);
    exception.thread_id = THREAD_ID;
    exception.exception_record.exception_code = 0xc000_001d; // EXCEPTION_ILLEGAL_INSTRUCTION
    exception.exception_record.exception_address = MODULE_BASE + 0x1d0;

    let mut misc = MiscStream::new(Endian::Little);
    misc.process_id = Some(4242);
    misc.process_times = Some(MiscFieldsProcessTimes {
        process_create_time: 0x6543_2100,
        process_user_time: 1,
        process_kernel_time: 2,
    });

    // A captured region besides the thread's stack.
    let extra = Memory::with_section(
        Section::with_endian(Endian::Little).D32(0xcafe_f00d),
        0x9000,
    );

    let dump = SynthDump::with_endian(Endian::Little)
        .add(module_name)
        .add_module(module)
        .add_thread(thread)
        .add(context)
        .add(stack)
        .add_memory(extra)
        .add(name)
        .add_thread_name(thread_name)
        .add_system_info(windows_amd64_system_info())
        .add_stream(misc)
        .add_exception(exception);
    let dump = read_synth_dump(dump);

    let system = dump.get_stream::<DumpSystemInfo>().unwrap();
    assert_eq!(system.os, Os::Windows);
    assert_eq!(system.cpu, Cpu::X86_64);
    assert_eq!(system.os_build(), "19045");

    let modules = dump.get_stream::<DumpModuleList>().unwrap();
    assert_eq!(modules.len(), 1);
    let module = modules.main_module().unwrap();
    assert_eq!(module.code_file(), "C:\\app\\widget.exe");
    assert_eq!(module.base_address(), MODULE_BASE);
    assert_eq!(module.size(), 0x10000);
    assert_eq!(module.raw.checksum, 0xf00d);

    let memory_list = dump.get_stream::<DumpMemoryList>().unwrap();
    assert_eq!(memory_list.len(), 1);
    assert_eq!(
        memory_list
            .memory_at_address(0x9000)
            .unwrap()
            .get_memory_at_address::<u32>(0x9000),
        Some(0xcafe_f00d)
    );

    let threads = dump.get_stream::<DumpThreadList>().unwrap();
    assert_eq!(threads.len(), 1);
    let thread = threads.get_thread(THREAD_ID).unwrap();
    let stack = thread.stack_memory(&memory_list).unwrap();
    assert_eq!(stack.base_address, STACK_BASE);
    assert_eq!(stack.size, 0x40);
    assert_eq!(
        stack.get_memory_at_address::<u64>(STACK_BASE),
        Some(0x1122_3344_5566_7788)
    );
    let context = thread.context().unwrap();
    assert_eq!(context.get_instruction_pointer(), MODULE_BASE + 0x1d0);

    let names = dump.get_stream::<DumpThreadNames>().unwrap();
    assert_eq!(names.get_name(THREAD_ID), Some("PoolThread"));
    assert_eq!(names.get_name(0xdead), None);

    let misc = dump.get_stream::<DumpMiscInfo>().unwrap();
    assert_eq!(misc.process_id(), Some(&4242));
    assert_eq!(misc.process_create_time(), Some(&0x6543_2100));

    let exception = dump.get_stream::<DumpException>().unwrap();
    assert_eq!(exception.thread_id, THREAD_ID);
    assert_eq!(
        exception.get_crash_reason(Os::Windows).to_string(),
        "EXCEPTION_ILLEGAL_INSTRUCTION"
    );
    assert_eq!(
        exception.get_crash_address(Os::Windows, Cpu::X86_64),
        MODULE_BASE + 0x1d0
    );
    assert_eq!(
        exception.context.as_ref().unwrap().get_instruction_pointer(),
        MODULE_BASE + 0x1d0
    );
}

#[test]
fn test_print_smoke() {
    let dump = read_synth_dump(
        SynthDump::with_endian(Endian::Little).add_system_info(windows_amd64_system_info()),
    );
    let mut buf = Vec::new();
    dump.print(&mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains("MINIDUMP_HEADER"));
    assert!(text.contains("stream_count         = 1"));
}
