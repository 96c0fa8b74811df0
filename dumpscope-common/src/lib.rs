// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! This crate defines [structs for the on-disk minidump format](format/index.html) as well
//! as [exception code values](errors/index.html). This is the lowest layer of the dumpscope
//! family of crates; nothing here reads files or interprets bytes beyond what scroll's
//! derived `Pread` implementations do.

#![warn(missing_debug_implementations)]

pub mod errors;
pub mod format;
