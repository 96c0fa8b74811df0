// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use std::ops::Deref;

use dumpscope::{
    Cpu, Dump, DumpException, DumpMemoryList, DumpMiscInfo, DumpModule, DumpModuleList,
    DumpSystemInfo, DumpThreadList, DumpThreadNames, Error, Os,
};
use dumpscope_image::PeImage;
use tracing::warn;

use crate::process_state::{
    CallOutcome, CrashReport, DecodeWarning, ExceptionInfo, ExecutableImage, ProcessMetadata,
    ThreadInfo, WarningKind,
};
use crate::stackwalker::walk_stack;
use crate::symbolicate::symbolicate;
use crate::system_info::SystemInfo;

fn push_warning(
    warnings: &mut Vec<DecodeWarning>,
    subject: &'static str,
    kind: WarningKind,
    error: Option<Error>,
) {
    let warning = DecodeWarning {
        subject,
        kind,
        error,
    };
    warn!("{}", warning);
    warnings.push(warning);
}

fn stream_warning_kind(error: &Error) -> WarningKind {
    match error {
        Error::StreamSizeMismatch { .. } => WarningKind::Truncated,
        _ => WarningKind::Malformed,
    }
}

/// Whether a standalone image plausibly is the dump's main module.
fn image_corresponds<T>(image: &PeImage<T>, main_module: &DumpModule) -> bool
where
    T: Deref<Target = [u8]>,
{
    let image_checksum = image.checksum();
    let module_checksum = main_module.raw.checksum;
    if image_checksum != 0 && module_checksum != 0 {
        return image_checksum == module_checksum;
    }
    // Not every linker fills in the checksum; fall back to comparing sizes.
    image.size_of_image() as u64 == main_module.size()
}

/// Produces a [`CrashReport`] from a dump, walking every thread's stack.
///
/// `image` is the executable the dump came from, when the caller has it on
/// hand; it supplies the code bytes for per-frame disassembly. Pass `None`
/// to process the dump alone.
///
/// Processing never fails outright: damage to any single stream yields a
/// [`DecodeWarning`] and an absent section in the report instead.
pub fn process<'a, T, U>(dump: &'a Dump<'a, T>, image: Option<&PeImage<U>>) -> CrashReport
where
    T: Deref<Target = [u8]> + 'a,
    U: Deref<Target = [u8]>,
{
    let mut warnings = Vec::new();

    let modules = match dump.get_stream::<DumpModuleList>() {
        Ok(modules) => modules,
        Err(Error::StreamNotFound) => DumpModuleList::new(),
        Err(e) => {
            push_warning(
                &mut warnings,
                "module list stream",
                stream_warning_kind(&e),
                Some(e),
            );
            DumpModuleList::new()
        }
    };

    let memory_list = match dump.get_stream::<DumpMemoryList>() {
        Ok(memory_list) => memory_list,
        Err(Error::StreamNotFound) => DumpMemoryList::new(),
        Err(e) => {
            push_warning(
                &mut warnings,
                "memory list stream",
                stream_warning_kind(&e),
                Some(e),
            );
            DumpMemoryList::new()
        }
    };

    // A dump without its thread list is barely a dump at all, so unlike the
    // other streams its absence is worth a warning too.
    let thread_list = match dump.get_stream::<DumpThreadList>() {
        Ok(thread_list) => Some(thread_list),
        Err(Error::StreamNotFound) => {
            push_warning(
                &mut warnings,
                "thread list stream",
                WarningKind::Malformed,
                Some(Error::StreamNotFound),
            );
            None
        }
        Err(e) => {
            push_warning(
                &mut warnings,
                "thread list stream",
                stream_warning_kind(&e),
                Some(e),
            );
            None
        }
    };

    let thread_names = match dump.get_stream::<DumpThreadNames>() {
        Ok(names) => names,
        Err(Error::StreamNotFound) => DumpThreadNames::default(),
        Err(e) => {
            push_warning(
                &mut warnings,
                "thread names stream",
                stream_warning_kind(&e),
                Some(e),
            );
            DumpThreadNames::default()
        }
    };

    let system_info = match dump.get_stream::<DumpSystemInfo>() {
        Ok(info) => Some(info),
        Err(Error::StreamNotFound) => None,
        Err(e) => {
            push_warning(
                &mut warnings,
                "system info stream",
                stream_warning_kind(&e),
                Some(e),
            );
            None
        }
    };

    let misc_info = match dump.get_stream::<DumpMiscInfo>() {
        Ok(info) => Some(info),
        Err(Error::StreamNotFound) => None,
        // The only way the misc stream fails to decode is being smaller
        // than its oldest revision, which reads as a revision this crate
        // does not know.
        Err(e @ Error::StreamReadFailure) => {
            push_warning(
                &mut warnings,
                "misc info stream",
                WarningKind::UnsupportedVersion,
                Some(e),
            );
            None
        }
        Err(e) => {
            push_warning(
                &mut warnings,
                "misc info stream",
                stream_warning_kind(&e),
                Some(e),
            );
            None
        }
    };

    let exception = match dump.get_stream::<DumpException>() {
        Ok(exception) => Some(exception),
        Err(Error::StreamNotFound) => None,
        Err(e) => {
            push_warning(
                &mut warnings,
                "exception stream",
                stream_warning_kind(&e),
                Some(e),
            );
            None
        }
    };

    let (os, cpu) = system_info
        .as_ref()
        .map(|info| (info.os, info.cpu))
        .unwrap_or((Os::Unknown(0), Cpu::Unknown(0)));

    let system = system_info.as_ref().map(|info| SystemInfo {
        os,
        os_version: Some(info.os_version()),
        os_build: Some(info.os_build()),
        cpu,
        cpu_info: info.cpu_info().map(str::to_owned),
        cpu_revision: match info.raw.processor_revision {
            0 => None,
            r => Some(r),
        },
        cpu_count: info.raw.number_of_processors as usize,
    });

    let exception_info = exception.as_ref().map(|e| ExceptionInfo {
        reason: e.get_crash_reason(os),
        address: e.get_crash_address(os, cpu),
        faulting_thread_id: e.thread_id,
    });
    let faulting_thread_id = exception_info.as_ref().map(|e| e.faulting_thread_id);
    let exception_context = exception.as_ref().and_then(|e| e.context.as_ref());

    // With no system info at all the contexts never decoded, which reads as
    // missing rather than unsupported.
    let unsupported_cpu = system_info
        .as_ref()
        .map_or(false, |info| !matches!(info.cpu, Cpu::X86 | Cpu::X86_64));

    let mut threads = Vec::new();
    if let Some(ref thread_list) = thread_list {
        for thread in &thread_list.threads {
            let thread_id = thread.raw.thread_id;
            // The exception stream's context records the state at the fault;
            // the faulting thread's own record holds the state inside the
            // handler that wrote the dump.
            let context = if faulting_thread_id == Some(thread_id) {
                exception_context.or_else(|| thread.context())
            } else {
                thread.context()
            };
            let stack = thread.stack_memory(&memory_list);
            let (frames, outcome) = if unsupported_cpu {
                (Vec::new(), CallOutcome::UnsupportedCpu)
            } else {
                walk_stack(context, stack.as_ref(), &modules)
            };
            threads.push(ThreadInfo {
                thread_id,
                name: thread_names.get_name(thread_id).map(str::to_owned),
                context: context.cloned(),
                stack_range: stack.as_ref().and_then(|s| s.memory_range()),
                frames,
                outcome,
            });
        }
    }

    let matched_image = image.and_then(|image| match modules.main_module() {
        Some(main_module) if image_corresponds(image, main_module) => Some(image),
        Some(_) => {
            push_warning(
                &mut warnings,
                "executable image",
                WarningKind::ImageMismatch,
                None,
            );
            None
        }
        None => None,
    });
    for thread in &mut threads {
        symbolicate(&mut thread.frames, &modules, matched_image);
    }

    let metadata = misc_info.as_ref().map(|misc| ProcessMetadata {
        process_id: misc.process_id().copied(),
        process_create_time: misc.process_create_time().copied(),
        dump_time: dump.header.time_date_stamp,
        main_module_name: modules.main_module().map(|m| m.code_file().to_owned()),
        main_module_base: modules.main_module().map(DumpModule::base_address),
    });

    CrashReport {
        metadata,
        system,
        exception: exception_info,
        threads,
        modules,
        warnings,
        image: image.map(ExecutableImage::from_image),
    }
}
