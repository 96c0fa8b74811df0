// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use dumpscope::format::CONTEXT_X86;
use dumpscope::{
    ContextValidity, DumpContext, DumpMemory, DumpModule, DumpModuleList, Endian, RawContext,
};
use test_assembler::*;

use crate::process_state::{CallOutcome, FrameTrust, StackFrame};
use crate::stackwalker::{walk_stack, MAX_FRAMES};
use crate::symbolicate::symbolicate;

struct TestFixture {
    pub raw: CONTEXT_X86,
    pub modules: DumpModuleList,
}

impl TestFixture {
    pub fn new() -> TestFixture {
        TestFixture {
            raw: CONTEXT_X86::default(),
            // Give the two modules reasonable standard locations and names
            // for tests to play with.
            modules: DumpModuleList::from_modules(vec![
                DumpModule::new(0x40000000, 0x10000, "module1"),
                DumpModule::new(0x50000000, 0x10000, "module2"),
            ]),
        }
    }

    pub fn walk_stack(&self, stack: Section) -> Vec<StackFrame> {
        let context = DumpContext {
            raw: RawContext::X86(self.raw.clone()),
            valid: ContextValidity::All,
        };
        let base = stack.start().value().unwrap();
        let size = stack.size();
        let stack = stack.get_contents().unwrap();
        let stack_memory = DumpMemory {
            desc: Default::default(),
            base_address: base,
            size,
            bytes: &stack,
            endian: Endian::Little,
        };
        let (mut frames, outcome) = walk_stack(Some(&context), Some(&stack_memory), &self.modules);
        assert_eq!(outcome, CallOutcome::Ok);
        symbolicate::<Vec<u8>>(&mut frames, &self.modules, None);
        frames
    }
}

#[test]
fn test_simple() {
    let mut f = TestFixture::new();
    let mut stack = Section::new();
    stack.start().set_const(0x80000000);
    stack = stack.D32(0).D32(0); // end-of-stack marker
    f.raw.eip = 0x40000200;
    f.raw.ebp = 0x80000000;
    let frames = f.walk_stack(stack);
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    let module = frame.module.as_ref().unwrap();
    assert_eq!(module.code_file(), "module1");
    assert_eq!(frame.rva, Some(0x200));
}

// Walk a traditional frame. A traditional frame saves the caller's
// %ebp just below the return address, and has its own %ebp pointing
// at the saved %ebp.
#[test]
fn test_traditional() {
    let mut f = TestFixture::new();
    let frame0_ebp = Label::new();
    let frame1_ebp = Label::new();
    let mut stack = Section::new();
    stack.start().set_const(0x80000000);
    stack = stack
        .append_repeated(0, 12) // frame 0: space
        .mark(&frame0_ebp) // frame 0 %ebp points here
        .D32(&frame1_ebp) // frame 0: saved %ebp
        .D32(0x40008679) // frame 0: return address
        .append_repeated(0, 8) // frame 1: space
        .mark(&frame1_ebp) // frame 1 %ebp points here
        .D32(0) // frame 1: saved %ebp (stack end)
        .D32(0); // frame 1: return address (stack end)
    f.raw.eip = 0x4000c7a5;
    f.raw.esp = stack.start().value().unwrap() as u32;
    f.raw.ebp = frame0_ebp.value().unwrap() as u32;
    let frames = f.walk_stack(stack);
    assert_eq!(frames.len(), 2);
    {
        let f0 = &frames[0];
        assert_eq!(f0.trust, FrameTrust::Context);
        assert_eq!(f0.context.valid, ContextValidity::All);
        assert_eq!(f0.instruction, 0x4000c7a5);
    }
    {
        let f1 = &frames[1];
        assert_eq!(f1.trust, FrameTrust::FramePointer);
        assert_eq!(f1.instruction, 0x40008678);
        assert_eq!(f1.resume_address, 0x40008679);
        if let RawContext::X86(ref ctx) = f1.context.raw {
            assert_eq!(ctx.eip, 0x40008679);
            assert_eq!(ctx.esp, 0x80000000 + 20);
            assert_eq!(ctx.ebp, frame1_ebp.value().unwrap() as u32);
        } else {
            unreachable!();
        }
    }
}

// Walk a traditional frame, but use a bogus %ebp value, forcing a scan
// of the stack for something that looks like a return address.
#[test]
fn test_traditional_scan() {
    let mut f = TestFixture::new();
    let frame1_esp = Label::new();
    let frame1_ebp = Label::new();
    let mut stack = Section::new();
    let stack_start = 0x80000000;
    stack.start().set_const(stack_start);
    stack = stack
        // frame 0
        .D32(0xf065dc76) // locals area:
        .D32(0x46ee2167) // garbage that doesn't look like
        .D32(0xbab023ec) // a return address
        .D32(&frame1_ebp) // saved %ebp (%ebp fails to point here, forcing scan)
        .D32(0x4000129d) // return address
        // frame 1
        .mark(&frame1_esp)
        .append_repeated(0, 8) // space
        .mark(&frame1_ebp) // %ebp points here
        .D32(0) // saved %ebp (stack end)
        .D32(0); // return address (stack end)

    f.raw.eip = 0x4000f49d;
    f.raw.esp = stack.start().value().unwrap() as u32;
    // Make the frame pointer bogus, to make the stackwalker scan the stack
    // for something that looks like a return address.
    f.raw.ebp = 0xd43eed6e;

    let frames = f.walk_stack(stack);
    assert_eq!(frames.len(), 2);

    {
        let f0 = &frames[0];
        assert_eq!(f0.trust, FrameTrust::Context);
        assert_eq!(f0.context.valid, ContextValidity::All);
        assert_eq!(f0.instruction, 0x4000f49d);

        if let RawContext::X86(ref ctx) = f0.context.raw {
            assert_eq!(ctx.eip, 0x4000f49d);
            assert_eq!(ctx.esp, stack_start as u32);
            assert_eq!(ctx.ebp, 0xd43eed6e);
        } else {
            unreachable!();
        }
    }

    {
        let f1 = &frames[1];
        assert_eq!(f1.trust, FrameTrust::Scan);
        if let ContextValidity::Some(ref which) = f1.context.valid {
            assert!(which.contains("eip"));
            assert!(which.contains("esp"));
            assert!(which.contains("ebp"));
        } else {
            unreachable!();
        }
        assert_eq!(f1.instruction + 1, 0x4000129d);

        if let RawContext::X86(ref ctx) = f1.context.raw {
            assert_eq!(ctx.eip, 0x4000129d);
            assert_eq!(ctx.esp, frame1_esp.value().unwrap() as u32);
            assert_eq!(ctx.ebp, frame1_ebp.value().unwrap() as u32);
        } else {
            unreachable!();
        }
    }
}

// Force scanning for a return address a long way down the stack. The
// context frame gets the extended scan range, so the walk still finds it.
#[test]
fn test_traditional_scan_long_way() {
    let mut f = TestFixture::new();
    let frame1_esp = Label::new();
    let frame1_ebp = Label::new();
    let mut stack = Section::new();
    let stack_start = 0x80000000;
    stack.start().set_const(stack_start);

    stack = stack
        // frame 0
        .D32(0xf065dc76) // locals area:
        .D32(0x46ee2167) // garbage that doesn't look like
        .D32(0xbab023ec) // a return address
        .append_repeated(0, 80 * 4) // a bunch of space, past the default range
        .D32(&frame1_ebp) // saved %ebp (%ebp fails to point here, forcing scan)
        .D32(0x4000129d) // return address
        // frame 1
        .mark(&frame1_esp)
        .append_repeated(0, 8) // space
        .mark(&frame1_ebp) // %ebp points here
        .D32(0) // saved %ebp (stack end)
        .D32(0); // return address (stack end)

    f.raw.eip = 0x4000f49d;
    f.raw.esp = stack.start().value().unwrap() as u32;
    // Make the frame pointer bogus, to make the stackwalker scan the stack
    // for something that looks like a return address.
    f.raw.ebp = 0xd43eed6e;

    let frames = f.walk_stack(stack);
    assert_eq!(frames.len(), 2);

    let f1 = &frames[1];
    assert_eq!(f1.trust, FrameTrust::Scan);
    assert_eq!(f1.instruction + 1, 0x4000129d);
    if let RawContext::X86(ref ctx) = f1.context.raw {
        assert_eq!(ctx.eip, 0x4000129d);
        assert_eq!(ctx.esp, frame1_esp.value().unwrap() as u32);
        assert_eq!(ctx.ebp, frame1_ebp.value().unwrap() as u32);
    } else {
        unreachable!();
    }
}

// Frames after the first only get the default scan range, so a return
// address buried deeper than that ends the walk.
#[test]
fn test_scan_default_range_after_first_frame() {
    let mut f = TestFixture::new();
    let mut stack = Section::new();
    stack.start().set_const(0x80000000);
    stack = stack
        .D32(0xbab023ec) // garbage
        .D32(0x40002000) // return address, found by the context frame's scan
        .append_repeated(0, 45 * 4) // more space than the default scan range
        .D32(0x40003000) // a return address the second scan must not reach
        .append_repeated(0, 8);

    f.raw.eip = 0x40000200;
    f.raw.esp = 0x80000000;

    let frames = f.walk_stack(stack);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].trust, FrameTrust::Scan);
    assert_eq!(frames[1].resume_address, 0x40002000);
}

// A scanned return address that was already used ends the walk instead of
// looping.
#[test]
fn test_repeated_return_address() {
    let mut f = TestFixture::new();
    let mut stack = Section::new();
    stack.start().set_const(0x80000000);
    stack = stack
        .D32(0)
        .D32(0x40002000) // return address
        .D32(0)
        .D32(0x40002000) // the same return address again
        .D32(0)
        .D32(0);

    f.raw.eip = 0x40000200;
    f.raw.esp = 0x80000000;

    let frames = f.walk_stack(stack);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].resume_address, 0x40002000);
}

// A corrupt stack that keeps producing plausible callers stops at the
// frame limit.
#[test]
fn test_frame_cap() {
    let mut f = TestFixture::new();
    let mut stack = Section::new();
    let base: u32 = 0x80000000;
    stack.start().set_const(base as u64);
    // A long chain of fully-linked frames, each 8 bytes: the saved %ebp
    // points at the next frame, with a distinct return address beside it.
    for i in 0..300u32 {
        stack = stack.D32(base + (i + 1) * 8).D32(0x40000100 + 4 * i);
    }
    stack = stack.D32(0).D32(0);

    f.raw.eip = 0x40008000;
    f.raw.esp = base;
    f.raw.ebp = base;

    let frames = f.walk_stack(stack);
    assert_eq!(frames.len(), MAX_FRAMES);
    assert_eq!(frames[1].trust, FrameTrust::FramePointer);
}
