// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use dumpscope::format::CONTEXT_AMD64;
use dumpscope::{
    ContextValidity, DumpContext, DumpMemory, DumpModule, DumpModuleList, Endian, RawContext,
};
use test_assembler::*;

use crate::process_state::{CallOutcome, FrameTrust, StackFrame};
use crate::stackwalker::walk_stack;
use crate::symbolicate::symbolicate;

struct TestFixture {
    pub raw: CONTEXT_AMD64,
    pub modules: DumpModuleList,
}

impl TestFixture {
    pub fn new() -> TestFixture {
        TestFixture {
            raw: CONTEXT_AMD64::default(),
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
            raw: RawContext::Amd64(self.raw.clone()),
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
    stack = stack.D64(0).D64(0); // end-of-stack marker
    f.raw.rip = 0x40000200;
    f.raw.rbp = 0x80000000;
    let frames = f.walk_stack(stack);
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    let module = frame.module.as_ref().unwrap();
    assert_eq!(module.code_file(), "module1");
    assert_eq!(frame.rva, Some(0x200));
}

// Walk a stack where the callee pushed the caller's %rbp and copied
// %rsp into %rbp, the way frame-pointed x64 code does.
#[test]
fn test_caller_pushed_bp() {
    let mut f = TestFixture::new();
    let frame0_rbp = Label::new();
    let frame1_rbp = Label::new();
    let mut stack = Section::new();
    stack.start().set_const(0x80000000);
    stack = stack
        .append_repeated(0, 16) // frame 0: space
        .mark(&frame0_rbp) // frame 0 %rbp points here
        .D64(&frame1_rbp) // frame 0: saved %rbp
        .D64(0x40008679) // frame 0: return address
        .append_repeated(0, 16) // frame 1: space
        .mark(&frame1_rbp) // frame 1 %rbp points here
        .D64(0) // frame 1: saved %rbp (stack end)
        .D64(0); // frame 1: return address (stack end)
    f.raw.rip = 0x4000c7a5;
    f.raw.rsp = stack.start().value().unwrap();
    f.raw.rbp = frame0_rbp.value().unwrap();

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
        if let ContextValidity::Some(ref which) = f1.context.valid {
            assert!(which.contains("rip"));
            assert!(which.contains("rsp"));
            assert!(which.contains("rbp"));
        } else {
            unreachable!();
        }
        if let RawContext::Amd64(ref ctx) = f1.context.raw {
            assert_eq!(ctx.rip, 0x40008679);
            assert_eq!(ctx.rsp, frame0_rbp.value().unwrap() + 16);
            assert_eq!(ctx.rbp, frame1_rbp.value().unwrap());
        } else {
            unreachable!();
        }
    }
}

// A bogus %rbp forces a scan; the saved %rbp next to the found return
// address is picked back up along the way.
#[test]
fn test_scan_without_bp() {
    let mut f = TestFixture::new();
    let frame1_rsp = Label::new();
    let frame1_rbp = Label::new();
    let mut stack = Section::new();
    stack.start().set_const(0x80000000);
    stack = stack
        // frame 0
        .D64(0xf065dc76_f065dc76) // locals area:
        .D64(0x46ee2167_46ee2167) // garbage that doesn't look like
        .D64(0xbab023ec_bab023ec) // a return address
        .D64(&frame1_rbp) // saved %rbp (%rbp fails to point here, forcing scan)
        .D64(0x4000129d) // return address
        // frame 1
        .mark(&frame1_rsp)
        .append_repeated(0, 16) // space
        .mark(&frame1_rbp) // %rbp points here
        .D64(0) // saved %rbp (stack end)
        .D64(0); // return address (stack end)

    f.raw.rip = 0x4000f49d;
    f.raw.rsp = stack.start().value().unwrap();
    // Make the frame pointer bogus, to make the stackwalker scan the stack
    // for something that looks like a return address.
    f.raw.rbp = 0xd43eed6e;

    let frames = f.walk_stack(stack);
    assert_eq!(frames.len(), 2);

    let f1 = &frames[1];
    assert_eq!(f1.trust, FrameTrust::Scan);
    if let ContextValidity::Some(ref which) = f1.context.valid {
        assert!(which.contains("rip"));
        assert!(which.contains("rsp"));
        assert!(which.contains("rbp"));
    } else {
        unreachable!();
    }
    assert_eq!(f1.instruction + 1, 0x4000129d);
    if let RawContext::Amd64(ref ctx) = f1.context.raw {
        assert_eq!(ctx.rip, 0x4000129d);
        assert_eq!(ctx.rsp, frame1_rsp.value().unwrap());
        assert_eq!(ctx.rbp, frame1_rbp.value().unwrap());
    } else {
        unreachable!();
    }
}

// A saved %rbp that points backwards, below the caller's stack pointer,
// fails the frame pointer derivation's ordering check; the frame is still
// found, but by scanning.
#[test]
fn test_fp_rejects_backwards_bp() {
    let mut f = TestFixture::new();
    let frame0_rbp = Label::new();
    let mut stack = Section::new();
    stack.start().set_const(0x80000000);
    stack = stack
        .append_repeated(0, 16) // frame 0: space
        .mark(&frame0_rbp) // frame 0 %rbp points here
        .D64(0x80000008) // frame 0: saved %rbp, pointing backwards
        .D64(0x40008679) // frame 0: return address
        .append_repeated(0, 16)
        .D64(0)
        .D64(0);
    f.raw.rip = 0x4000c7a5;
    f.raw.rsp = stack.start().value().unwrap();
    f.raw.rbp = frame0_rbp.value().unwrap();

    let frames = f.walk_stack(stack);
    assert_eq!(frames.len(), 2);

    let f1 = &frames[1];
    assert_eq!(f1.trust, FrameTrust::Scan);
    assert_eq!(f1.resume_address, 0x40008679);
    if let ContextValidity::Some(ref which) = f1.context.valid {
        assert!(which.contains("rip"));
        assert!(which.contains("rsp"));
        assert!(!which.contains("rbp"));
    } else {
        unreachable!();
    }
}

// Values in the non-canonical address hole never count as return addresses.
#[test]
fn test_scan_rejects_non_canonical() {
    let mut f = TestFixture::new();
    let mut stack = Section::new();
    stack.start().set_const(0x80000000);
    stack = stack
        .D64(0)
        .D64(0xfabc_0000_4000_1000) // non-canonical, must be skipped
        .D64(0x40002000) // return address
        .D64(0)
        .D64(0);

    f.raw.rip = 0x40000200;
    f.raw.rsp = 0x80000000;

    let frames = f.walk_stack(stack);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].resume_address, 0x40002000);
}
