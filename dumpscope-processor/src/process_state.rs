// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The crash report and the types it is assembled from.
//!
//! Everything here is owned data: a [`CrashReport`] keeps no references into
//! the dump or image bytes it was built from, so callers can drop those as
//! soon as [`crate::process`] returns.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write};
use std::ops::Deref;

use dumpscope::{ContextValidity, CrashReason, DumpContext, DumpModule, DumpModuleList};
use dumpscope_image::{PeExport, PeImage, PeImport, PeSection};
use time::format_description::well_known::Rfc3339;

use crate::disasm::DisassemblyWindow;
use crate::system_info::SystemInfo;

/// How the unwinder arrived at a stack frame.
///
/// Ordered by quality: a scanned frame is a guess, a frame taken straight
/// from the CPU context is ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameTrust {
    /// The frame was found by scanning the stack for return addresses.
    Scan,
    /// The frame was derived from the previous frame's frame pointer.
    FramePointer,
    /// The frame comes from the thread's captured CPU context.
    Context,
}

impl FrameTrust {
    /// A short description of how the frame was found, for report output.
    pub fn description(&self) -> &'static str {
        match *self {
            FrameTrust::Context => "given as instruction pointer in context",
            FrameTrust::FramePointer => "previous frame's frame pointer",
            FrameTrust::Scan => "stack scanning",
        }
    }
}

/// A single frame of a walked stack.
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// The address of the instruction the thread is executing in this frame.
    ///
    /// For the topmost frame this is the resume address itself. For caller
    /// frames it is the resume address minus one, pulling the address back
    /// inside the call instruction so module lookups cannot slip into
    /// whatever follows the call.
    pub instruction: u64,
    /// The address execution resumes at in this frame, unadjusted.
    pub resume_address: u64,
    /// The module containing `instruction`, when one does.
    pub module: Option<DumpModule>,
    /// `instruction` relative to the containing module's base address.
    pub rva: Option<u64>,
    /// The code around `resume_address`, when image bytes were on hand.
    pub disassembly: Option<DisassemblyWindow>,
    /// How this frame was found.
    pub trust: FrameTrust,
    /// The CPU state in this frame.
    ///
    /// Registers the unwinder could not recover are marked invalid in
    /// `context.valid`.
    pub context: DumpContext,
}

impl StackFrame {
    /// Creates a frame from a CPU context, with nothing attributed yet.
    pub fn from_context(context: DumpContext, trust: FrameTrust) -> StackFrame {
        let instruction = context.get_instruction_pointer();
        StackFrame {
            instruction,
            resume_address: instruction,
            module: None,
            rva: None,
            disassembly: None,
            trust,
            context,
        }
    }
}

/// Whether a thread's stack walk ran, and if not, why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The walk ran to completion.
    Ok,
    /// The thread had no usable CPU context to start from.
    MissingContext,
    /// The dump captured no memory covering the thread's stack.
    MissingMemory,
    /// The dump's CPU is one the unwinder has no support for.
    UnsupportedCpu,
}

/// One thread of the crashed process, with its walked stack.
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    /// The thread id from the dump's thread record.
    pub thread_id: u32,
    /// The thread's name, when the dump carried one.
    pub name: Option<String>,
    /// The context the walk started from.
    ///
    /// For the faulting thread this is the exception stream's context, which
    /// records the state at the fault rather than inside the handler that
    /// wrote the dump.
    pub context: Option<DumpContext>,
    /// The `[start, end)` span of captured stack memory.
    pub stack_range: Option<(u64, u64)>,
    /// Frames from callee to caller; the first frame is where the thread was
    /// executing.
    pub frames: Vec<StackFrame>,
    /// Whether the walk ran, and why not if it did not.
    pub outcome: CallOutcome,
}

impl ThreadInfo {
    /// Writes a human-readable description of the stack.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        if self.frames.is_empty() {
            writeln!(f, "<no frames>")?;
        }
        for (i, frame) in self.frames.iter().enumerate() {
            write!(f, "{:2}  ", i)?;
            match (&frame.module, frame.rva) {
                (Some(module), Some(rva)) => {
                    writeln!(f, "{} + {:#x}", basename(module.code_file()), rva)?;
                }
                _ => writeln!(f, "{:#x}", frame.instruction)?,
            }
            print_registers(f, &frame.context)?;
            writeln!(f, "    Found by: {}", frame.trust.description())?;
            if let Some(ref window) = frame.disassembly {
                window.print(f)?;
            }
        }
        Ok(())
    }
}

/// Details about the dumped process itself, from the misc info stream.
#[derive(Debug, Clone)]
pub struct ProcessMetadata {
    pub process_id: Option<u32>,
    /// When the process started, as a time_t.
    pub process_create_time: Option<u32>,
    /// When the dump was written, from the dump header.
    pub dump_time: u32,
    /// Path of the main module, when the module list recorded one.
    pub main_module_name: Option<String>,
    pub main_module_base: Option<u64>,
}

/// What went wrong, from the exception stream.
#[derive(Debug, Clone)]
pub struct ExceptionInfo {
    /// The normalized crash reason.
    pub reason: CrashReason,
    /// The address most useful to report for the crash.
    ///
    /// For access violations and in-page errors this is the address the
    /// thread was touching; otherwise the address of the faulting
    /// instruction.
    pub address: u64,
    /// The id of the thread the exception was raised on.
    pub faulting_thread_id: u32,
}

/// A summary of the companion executable image, when one was supplied.
#[derive(Debug, Clone)]
pub struct ExecutableImage {
    /// True for PE32+, false for PE32.
    pub is_64bit: bool,
    /// The preferred load address from the optional header.
    pub image_base: u64,
    /// Entry point, relative to the image base.
    pub entry_point: u32,
    /// COFF machine value.
    pub machine: u16,
    /// The optional header checksum, zero when the linker left it out.
    pub checksum: u32,
    /// Link time, seconds since the epoch.
    pub time_date_stamp: u32,
    /// The image's extent in memory once mapped.
    pub size_of_image: u32,
    /// The image's sections.
    pub sections: Vec<PeSection>,
    /// Exported symbols.
    pub exports: Vec<PeExport>,
    /// Imported symbols.
    pub imports: Vec<PeImport>,
}

impl ExecutableImage {
    /// Summarizes a parsed image into owned data.
    pub fn from_image<T>(image: &PeImage<T>) -> ExecutableImage
    where
        T: Deref<Target = [u8]>,
    {
        ExecutableImage {
            is_64bit: image.is_64bit(),
            image_base: image.image_base(),
            entry_point: image.entry_point(),
            machine: image.machine(),
            checksum: image.checksum(),
            time_date_stamp: image.time_date_stamp(),
            size_of_image: image.size_of_image(),
            sections: image.sections().to_vec(),
            exports: image.exports().to_vec(),
            imports: image.imports().to_vec(),
        }
    }

    /// Writes a human-readable description of the image.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        write!(
            f,
            "Executable image:
  machine                = {:#x}
  bitness                = {}
  time_date_stamp        = {:#x} {}
  image_base             = {:#x}
  address_of_entry_point = {:#x}
  size_of_image          = {:#x}
  check_sum              = {:#x}
",
            self.machine,
            if self.is_64bit { 64 } else { 32 },
            self.time_date_stamp,
            format_time_t(self.time_date_stamp),
            self.image_base,
            self.entry_point,
            self.size_of_image,
            self.checksum,
        )?;
        for section in &self.sections {
            writeln!(
                f,
                "  {:<8}  va={:#x}  vsize={:#x}",
                section.name(),
                section.raw.virtual_address,
                section.raw.virtual_size,
            )?;
        }
        Ok(())
    }
}

/// Classifies [`DecodeWarning`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// A stream ended before its contents did.
    Truncated,
    /// A stream's contents could not be decoded.
    Malformed,
    /// A stream revision this crate does not understand.
    UnsupportedVersion,
    /// The supplied image does not correspond to the dump's main module.
    ImageMismatch,
}

/// A non-fatal problem found while assembling the report.
///
/// Damage to one stream never fails the report as a whole; it is recorded
/// here and the affected section of the report is left absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeWarning {
    /// What the warning is about, e.g. `"misc info stream"`.
    pub subject: &'static str,
    pub kind: WarningKind,
    /// The underlying read error, when one exists.
    pub error: Option<dumpscope::Error>,
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            WarningKind::Truncated => "is truncated",
            WarningKind::Malformed => "is malformed",
            WarningKind::UnsupportedVersion => "has an unsupported version",
            WarningKind::ImageMismatch => "does not match the dump",
        };
        write!(f, "{} {}", self.subject, what)?;
        if let Some(error) = self.error {
            write!(f, " ({})", error)?;
        }
        Ok(())
    }
}

/// Everything this crate can say about a dump.
#[derive(Debug, Clone)]
pub struct CrashReport {
    /// Details about the process, absent when the dump has no misc info
    /// stream.
    pub metadata: Option<ProcessMetadata>,
    /// The system the dump was written on.
    pub system: Option<SystemInfo>,
    /// What went wrong, absent when the dump did not record a crash.
    pub exception: Option<ExceptionInfo>,
    /// The process's threads, in dump order.
    pub threads: Vec<ThreadInfo>,
    /// The modules loaded in the process.
    pub modules: DumpModuleList,
    /// Non-fatal problems encountered while decoding.
    pub warnings: Vec<DecodeWarning>,
    /// The companion executable image, when one was supplied and parsed.
    pub image: Option<ExecutableImage>,
}

impl CrashReport {
    /// True when the dump recorded a crash rather than a requested snapshot.
    pub fn crashed(&self) -> bool {
        self.exception.is_some()
    }

    /// The thread the exception was raised on.
    pub fn faulting_thread(&self) -> Option<&ThreadInfo> {
        let id = self.exception.as_ref()?.faulting_thread_id;
        self.threads.iter().find(|thread| thread.thread_id == id)
    }

    /// Writes a human-readable crash report.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        if let Some(ref system) = self.system {
            writeln!(f, "Operating system: {}", system.os.long_name())?;
            if let Some(ref version) = system.os_version {
                writeln!(f, "                  {}", version)?;
            }
            writeln!(f, "CPU: {}", system.cpu)?;
            if let Some(ref cpu_info) = system.cpu_info {
                writeln!(f, "     {}", cpu_info)?;
            }
            writeln!(
                f,
                "     {} CPU{}",
                system.cpu_count,
                if system.cpu_count > 1 { "s" } else { "" }
            )?;
            writeln!(f)?;
        }

        if let Some(ref exception) = self.exception {
            writeln!(f, "Crash reason:  {}", exception.reason)?;
            writeln!(f, "Crash address: {:#x}", exception.address)?;
            writeln!(f, "Faulting thread: {:#x}", exception.faulting_thread_id)?;
        } else {
            writeln!(f, "No crash")?;
        }

        if let Some(ref metadata) = self.metadata {
            if let Some(pid) = metadata.process_id {
                writeln!(f, "Process id: {}", pid)?;
            }
            match metadata.process_create_time {
                Some(created) => {
                    writeln!(f, "Process created: {}", format_time_t(created))?;
                    writeln!(
                        f,
                        "Process uptime: {} seconds",
                        metadata.dump_time.saturating_sub(created)
                    )?;
                }
                None => writeln!(f, "Process uptime: not available")?,
            }
            writeln!(f, "Dump created: {}", format_time_t(metadata.dump_time))?;
        }
        writeln!(f)?;

        let faulting_thread_id = self.exception.as_ref().map(|e| e.faulting_thread_id);
        for (i, thread) in self.threads.iter().enumerate() {
            write!(f, "Thread {}", i)?;
            if let Some(ref name) = thread.name {
                write!(f, " {}", name)?;
            }
            if eq_some(faulting_thread_id, thread.thread_id) {
                write!(f, " (crashed)")?;
            }
            writeln!(f)?;
            thread.print(f)?;
            writeln!(f)?;
        }

        write!(f, "Loaded modules:\n")?;
        let main_address = self.modules.main_module().map(|m| m.base_address());
        for module in self.modules.by_addr() {
            // The main module is usually first in the list, but not always.
            let main_marker = if eq_some(main_address, module.base_address()) {
                "  (main)"
            } else {
                ""
            };
            writeln!(
                f,
                "{:#010x} - {:#010x}  {}  {}{}",
                module.base_address(),
                (module.base_address() + module.size()).saturating_sub(1),
                basename(module.code_file()),
                module.version().unwrap_or_else(|| String::from("???")),
                main_marker,
            )?;
        }

        if let Some(ref image) = self.image {
            writeln!(f)?;
            image.print(f)?;
        }

        if !self.warnings.is_empty() {
            writeln!(f, "\nWarnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  {}", warning)?;
            }
        }
        Ok(())
    }
}

/// Compares an `Option<T>` against a `T`, false when the option is `None`.
fn eq_some<T: PartialEq>(opt: Option<T>, val: T) -> bool {
    match opt {
        Some(v) => v == val,
        None => false,
    }
}

/// The file name at the end of a path, regardless of which slashes it uses.
fn basename(path: &str) -> &str {
    match path.rfind(|c| c == '/' || c == '\\') {
        None => path,
        Some(index) => &path[(index + 1)..],
    }
}

/// Renders a time_t as RFC 3339 for human-readable output.
fn format_time_t(t: u32) -> String {
    time::OffsetDateTime::from_unix_timestamp(t as i64)
        .ok()
        .and_then(|d| d.format(&Rfc3339).ok())
        .unwrap_or_else(|| "<invalid date>".to_owned())
}

/// Writes the valid registers of `context`, a few per line.
fn print_registers<W: Write>(f: &mut W, context: &DumpContext) -> io::Result<()> {
    let registers: Cow<'_, HashSet<&str>> = match context.valid {
        ContextValidity::All => {
            let gpr = context.general_purpose_registers();
            Cow::Owned(gpr.iter().cloned().collect())
        }
        ContextValidity::Some(ref which) => Cow::Borrowed(which),
    };
    let width = match context.cpu().pointer_width() {
        Some(4) => 10,
        _ => 18,
    };

    // Iterate over registers in a known order.
    let mut output = String::new();
    for reg in context.general_purpose_registers() {
        if !registers.contains(reg) {
            continue;
        }
        let reg_val = match context.get_register(reg) {
            Some(value) => format!("{:#0w$x}", value, w = width),
            None => "?".repeat(width),
        };
        let next = format!("   {} = {}", reg, reg_val);
        if output.chars().count() + next.chars().count() > 80 {
            // Flush the buffer.
            writeln!(f, " {}", output)?;
            output.truncate(0);
        }
        output.push_str(&next);
    }
    if !output.is_empty() {
        writeln!(f, " {}", output)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_frame_trust_order() {
        assert!(FrameTrust::Scan < FrameTrust::FramePointer);
        assert!(FrameTrust::FramePointer < FrameTrust::Context);
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename(r"C:\Windows\System32\ntdll.dll"), "ntdll.dll");
        assert_eq!(basename("/usr/lib/libc.so.6"), "libc.so.6");
        assert_eq!(basename("bare.exe"), "bare.exe");
    }

    #[test]
    fn test_warning_display() {
        let warning = DecodeWarning {
            subject: "misc info stream",
            kind: WarningKind::Truncated,
            error: None,
        };
        assert_eq!(warning.to_string(), "misc info stream is truncated");

        let warning = DecodeWarning {
            subject: "executable image",
            kind: WarningKind::ImageMismatch,
            error: None,
        };
        assert_eq!(
            warning.to_string(),
            "executable image does not match the dump"
        );
    }
}
