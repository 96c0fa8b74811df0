// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Turns minidumps into crash reports.
//!
//! The entry point is [`process`], which takes a parsed [`dumpscope::Dump`]
//! and produces a [`CrashReport`]: system information, the crash reason, and
//! every thread's stack walked with frame pointers and, failing that, stack
//! scanning. When the caller also has the executable the dump came from,
//! [`process`] disassembles the code around each frame's resume address.
//!
//! # Examples
//!
//! ```no_run
//! use dumpscope::Dump;
//! use dumpscope_image::PeImage;
//! use dumpscope_processor::process;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dump = Dump::read_path("app.dmp")?;
//!     let image = std::fs::read("app.exe")
//!         .ok()
//!         .and_then(|bytes| PeImage::parse(bytes).ok());
//!     let report = process(&dump, image.as_ref());
//!     report.print(&mut std::io::stdout())?;
//!     Ok(())
//! }
//! ```

#![warn(missing_debug_implementations)]

#[cfg(doctest)]
doc_comment::doctest!("../README.md");

mod disasm;
mod process_state;
mod processor;
mod stackwalker;
mod symbolicate;
mod system_info;

pub use crate::disasm::{
    disassemble_window, DisassembledInstruction, DisassemblyWindow, WINDOW_BYTES_AFTER,
    WINDOW_BYTES_BEFORE,
};
pub use crate::process_state::*;
pub use crate::processor::process;
pub use crate::stackwalker::{walk_stack, MAX_FRAMES};
pub use crate::system_info::SystemInfo;

// Route tracing's log records into the test harness output.
#[cfg(test)]
#[ctor::ctor]
fn init_logging() {
    env_logger::builder().is_test(true).init();
}
