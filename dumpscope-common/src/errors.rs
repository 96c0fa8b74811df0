// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Values found in the `exception_code` field of an exception record.
//!
//! Codes are operating-system specific; only the Windows set is defined here since
//! Windows dumps are the only kind we decode end to end. Names are kept in winnt.h
//! spelling so they can be searched against Microsoft's documentation directly.

#![allow(non_camel_case_types)]
#![allow(clippy::upper_case_acronyms)]

use enum_primitive_derive::Primitive;

/// Windows exception codes, the NTSTATUS values most often seen in crash dumps.
#[repr(u32)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum ExceptionCodeWindows {
    /// Ctrl-C on a console process being debugged.
    DBG_CONTROL_C = 0x40010005u32,
    EXCEPTION_GUARD_PAGE = 0x80000001u32,
    EXCEPTION_DATATYPE_MISALIGNMENT = 0x80000002u32,
    EXCEPTION_BREAKPOINT = 0x80000003u32,
    EXCEPTION_SINGLE_STEP = 0x80000004u32,
    /// The big one, a read or write of memory the process has no right to touch.
    ///
    /// Refined further by the first two entries of `exception_information`.
    EXCEPTION_ACCESS_VIOLATION = 0xc0000005u32,
    /// A page fault that could not be satisfied, e.g. an I/O error paging in a
    /// memory-mapped file.
    EXCEPTION_IN_PAGE_ERROR = 0xc0000006u32,
    EXCEPTION_INVALID_HANDLE = 0xc0000008u32,
    EXCEPTION_ILLEGAL_INSTRUCTION = 0xc000001du32,
    EXCEPTION_NONCONTINUABLE_EXCEPTION = 0xc0000025u32,
    EXCEPTION_INVALID_DISPOSITION = 0xc0000026u32,
    EXCEPTION_BOUNDS_EXCEEDED = 0xc000008cu32,
    EXCEPTION_FLT_DENORMAL_OPERAND = 0xc000008du32,
    EXCEPTION_FLT_DIVIDE_BY_ZERO = 0xc000008eu32,
    EXCEPTION_FLT_INEXACT_RESULT = 0xc000008fu32,
    EXCEPTION_FLT_INVALID_OPERATION = 0xc0000090u32,
    EXCEPTION_FLT_OVERFLOW = 0xc0000091u32,
    EXCEPTION_FLT_STACK_CHECK = 0xc0000092u32,
    EXCEPTION_FLT_UNDERFLOW = 0xc0000093u32,
    EXCEPTION_INT_DIVIDE_BY_ZERO = 0xc0000094u32,
    EXCEPTION_INT_OVERFLOW = 0xc0000095u32,
    EXCEPTION_PRIV_INSTRUCTION = 0xc0000096u32,
    EXCEPTION_STACK_OVERFLOW = 0xc00000fdu32,
    EXCEPTION_POSSIBLE_DEADLOCK = 0xc0000194u32,
    /// Heap corruption detected by the heap manager.
    STATUS_HEAP_CORRUPTION = 0xc0000374u32,
    /// /GS stack buffer overrun, also raised for many fastfail conditions.
    STATUS_STACK_BUFFER_OVERRUN = 0xc0000409u32,
    /// Raised by Chromium-family allocators when an allocation fails.
    OUT_OF_MEMORY = 0xe0000008u32,
    /// A C++ exception left the building via `RaiseException`.
    UNHANDLED_CPP_EXCEPTION = 0xe06d7363u32,
    /// A dump requested without a real exception, used by dump-on-demand tooling.
    SIMULATED = 0x0517a7edu32,
}

/// The access direction stored in `exception_information[0]` of an
/// `EXCEPTION_ACCESS_VIOLATION` record.
#[repr(u64)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum ExceptionCodeWindowsAccessType {
    READ = 0,
    WRITE = 1,
    EXEC = 8,
}

/// The access direction stored in `exception_information[0]` of an
/// `EXCEPTION_IN_PAGE_ERROR` record.
#[repr(u64)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Primitive)]
pub enum ExceptionCodeWindowsInPageErrorType {
    READ = 0,
    WRITE = 1,
    EXEC = 8,
}
