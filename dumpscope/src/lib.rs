// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! A parser for the minidump file format.
//!
//! The primary API for this crate is the [`Dump`] struct, which can be
//! instantiated over any byte buffer with [`Dump::read`] or directly from a
//! file with [`Dump::read_path`]. Reading the dump validates only the header;
//! the individual streams inside it are decoded on demand with
//! [`Dump::get_stream`], so one corrupt stream never takes the others down
//! with it.
//!
//! # Examples
//!
//! ```no_run
//! use dumpscope::{Dump, DumpModuleList, DumpSystemInfo};
//!
//! fn main() -> Result<(), dumpscope::Error> {
//!     let dump = Dump::read_path("crash.dmp")?;
//!     let system = dump.get_stream::<DumpSystemInfo>()?;
//!     println!("crashed on {} / {}", system.os, system.cpu);
//!     let modules = dump.get_stream::<DumpModuleList>()?;
//!     for module in modules.by_addr() {
//!         println!("{:#018x} {}", module.base_address(), module.code_file());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_debug_implementations)]

#[cfg(doctest)]
doc_comment::doctest!("../README.md");

mod context;
mod dump;
mod range_index;
pub mod system_info;

pub use scroll::Endian;

pub use crate::context::*;
pub use crate::dump::*;
pub use crate::range_index::RangeIndex;
pub use crate::system_info::{Cpu, Os};

/// The on-disk structure definitions this crate reads.
pub mod format {
    pub use dumpscope_common::format::*;
}

// Route tracing's log records into the test harness output.
#[cfg(test)]
#[ctor::ctor]
fn init_logging() {
    env_logger::builder().is_test(true).init();
}
