// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Unwind stack frames for a thread.

mod amd64;
mod unwind;
mod x86;

use std::collections::HashSet;

use dumpscope::{DumpContext, DumpMemory, DumpModuleList, RawContext};
use tracing::trace;

use crate::process_state::{CallOutcome, FrameTrust, StackFrame};

use self::unwind::Unwind;

/// The most frames a single walk will produce.
///
/// A corrupt stack can keep yielding values that look like plausible callers;
/// this bounds the damage.
pub const MAX_FRAMES: usize = 256;

fn get_caller_frame(
    frame: &StackFrame,
    stack_memory: Option<&DumpMemory<'_>>,
    modules: &DumpModuleList,
) -> Option<StackFrame> {
    match frame.context.raw {
        RawContext::X86(ref ctx) => {
            ctx.get_caller_frame(&frame.context.valid, frame.trust, stack_memory, modules)
        }
        RawContext::Amd64(ref ctx) => {
            ctx.get_caller_frame(&frame.context.valid, frame.trust, stack_memory, modules)
        }
    }
}

/// Walk a thread's stack, producing frames from callee to caller.
///
/// Begins with the context frame and keeps deriving callers until a
/// derivation fails. Without stack memory the walk still yields the
/// context frame, with the outcome recording what was missing.
pub fn walk_stack(
    maybe_context: Option<&DumpContext>,
    stack_memory: Option<&DumpMemory<'_>>,
    modules: &DumpModuleList,
) -> (Vec<StackFrame>, CallOutcome) {
    let outcome = match (maybe_context, stack_memory) {
        (None, _) => CallOutcome::MissingContext,
        (Some(_), None) => CallOutcome::MissingMemory,
        (Some(_), Some(_)) => CallOutcome::Ok,
    };

    let mut frames = Vec::new();
    if let Some(context) = maybe_context {
        trace!(
            "unwind: starting at ip {:#x}",
            context.get_instruction_pointer()
        );
        let mut seen = HashSet::new();
        let mut maybe_frame = Some(StackFrame::from_context(
            context.clone(),
            FrameTrust::Context,
        ));
        while let Some(frame) = maybe_frame {
            if frames.len() >= MAX_FRAMES {
                trace!("unwind: frame limit reached, giving up");
                break;
            }
            // A frame that resumes where an earlier one did means the walk
            // is going in circles.
            if !seen.insert(frame.resume_address) {
                trace!("unwind: repeated return address, giving up");
                break;
            }
            maybe_frame = get_caller_frame(&frame, stack_memory, modules);
            frames.push(frame);
        }
        trace!("unwind: produced {} frame(s)", frames.len());
    }
    (frames, outcome)
}

#[cfg(test)]
mod amd64_unittest;
#[cfg(test)]
mod x86_unittest;
