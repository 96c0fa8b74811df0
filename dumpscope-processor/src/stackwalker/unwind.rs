// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use dumpscope::{ContextValidity, DumpMemory, DumpModuleList};

use crate::process_state::{FrameTrust, StackFrame};

/// A trait for things that can unwind to a caller's frame.
pub trait Unwind {
    /// Get the caller frame of this frame.
    fn get_caller_frame(
        &self,
        valid: &ContextValidity,
        trust: FrameTrust,
        stack_memory: Option<&DumpMemory<'_>>,
        modules: &DumpModuleList,
    ) -> Option<StackFrame>;
}
