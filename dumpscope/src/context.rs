// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! CPU context records.

use std::collections::HashSet;
use std::io::{self, Write};

use dumpscope_common::format as md;
use md::ContextFlagsCpu;
use scroll::{Endian, Pread};
use tracing::warn;

use crate::system_info::Cpu;

/// General purpose registers of [`md::CONTEXT_X86`], in display order.
pub static X86_REGS: [&str; 10] = [
    "eip", "esp", "ebp", "ebx", "esi", "edi", "eax", "ecx", "edx", "efl",
];

/// General purpose registers of [`md::CONTEXT_AMD64`], in display order.
pub static AMD64_REGS: [&str; 17] = [
    "rip", "rsp", "rbp", "rbx", "rsi", "rdi", "rax", "rcx", "rdx", "r8", "r9", "r10", "r11",
    "r12", "r13", "r14", "r15",
];

/// The CPU-specific arm of a [`DumpContext`].
#[derive(Debug, Clone)]
pub enum RawContext {
    X86(md::CONTEXT_X86),
    Amd64(md::CONTEXT_AMD64),
}

/// Which registers of a context hold trustworthy values.
///
/// A context read out of the dump vouches for everything. Contexts recovered by
/// unwinding only vouch for the registers the unwind actually produced, and
/// consumers must not read the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextValidity {
    All,
    Some(HashSet<&'static str>),
}

/// A CPU context along with a record of which of its registers are valid.
#[derive(Debug, Clone)]
pub struct DumpContext {
    pub raw: RawContext,
    pub valid: ContextValidity,
}

/// Errors from [`DumpContext::read`].
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum ContextError {
    #[error("the context record was truncated or malformed")]
    ReadFailure,
    #[error("the context is for a CPU this crate does not walk")]
    UnsupportedCpu,
}

impl DumpContext {
    /// Wraps a raw context that is valid in its entirety.
    pub fn from_raw(raw: RawContext) -> DumpContext {
        DumpContext {
            raw,
            valid: ContextValidity::All,
        }
    }

    /// Reads a context record for the CPU the dump's system info names.
    ///
    /// The record's own `context_flags` must agree on the CPU family; a record naming
    /// some other CPU than the rest of the dump is treated as malformed.
    pub fn read(bytes: &[u8], endian: Endian, cpu: Cpu) -> Result<DumpContext, ContextError> {
        let raw = match cpu {
            Cpu::X86 => {
                let ctx: md::CONTEXT_X86 = bytes
                    .pread_with(0, endian)
                    .or(Err(ContextError::ReadFailure))?;
                if !ContextFlagsCpu::from_flags(ctx.context_flags)
                    .contains(ContextFlagsCpu::CONTEXT_X86)
                {
                    return Err(ContextError::ReadFailure);
                }
                RawContext::X86(ctx)
            }
            Cpu::X86_64 => {
                let ctx: md::CONTEXT_AMD64 = bytes
                    .pread_with(0, endian)
                    .or(Err(ContextError::ReadFailure))?;
                if !ContextFlagsCpu::from_flags(ctx.context_flags)
                    .contains(ContextFlagsCpu::CONTEXT_AMD64)
                {
                    return Err(ContextError::ReadFailure);
                }
                RawContext::Amd64(ctx)
            }
            other => {
                warn!("can't read context for unsupported cpu {}", other);
                return Err(ContextError::UnsupportedCpu);
            }
        };
        Ok(DumpContext::from_raw(raw))
    }

    /// The CPU family this context belongs to.
    pub fn cpu(&self) -> Cpu {
        match self.raw {
            RawContext::X86(_) => Cpu::X86,
            RawContext::Amd64(_) => Cpu::X86_64,
        }
    }

    pub fn get_instruction_pointer(&self) -> u64 {
        match self.raw {
            RawContext::X86(ref ctx) => ctx.eip as u64,
            RawContext::Amd64(ref ctx) => ctx.rip,
        }
    }

    pub fn get_stack_pointer(&self) -> u64 {
        match self.raw {
            RawContext::X86(ref ctx) => ctx.esp as u64,
            RawContext::Amd64(ref ctx) => ctx.rsp,
        }
    }

    /// The named register, honoring the validity set.
    pub fn get_register(&self, reg: &str) -> Option<u64> {
        match self.valid {
            ContextValidity::All => {}
            ContextValidity::Some(ref valid) => {
                if !valid.contains(reg) {
                    return None;
                }
            }
        }
        self.get_register_always(reg)
    }

    /// The named register without consulting the validity set.
    pub fn get_register_always(&self, reg: &str) -> Option<u64> {
        match self.raw {
            RawContext::X86(ref ctx) => {
                let value = match reg {
                    "eip" => ctx.eip,
                    "esp" => ctx.esp,
                    "ebp" => ctx.ebp,
                    "ebx" => ctx.ebx,
                    "esi" => ctx.esi,
                    "edi" => ctx.edi,
                    "eax" => ctx.eax,
                    "ecx" => ctx.ecx,
                    "edx" => ctx.edx,
                    "efl" => ctx.eflags,
                    _ => return None,
                };
                Some(value as u64)
            }
            RawContext::Amd64(ref ctx) => {
                let value = match reg {
                    "rip" => ctx.rip,
                    "rsp" => ctx.rsp,
                    "rbp" => ctx.rbp,
                    "rbx" => ctx.rbx,
                    "rsi" => ctx.rsi,
                    "rdi" => ctx.rdi,
                    "rax" => ctx.rax,
                    "rcx" => ctx.rcx,
                    "rdx" => ctx.rdx,
                    "r8" => ctx.r8,
                    "r9" => ctx.r9,
                    "r10" => ctx.r10,
                    "r11" => ctx.r11,
                    "r12" => ctx.r12,
                    "r13" => ctx.r13,
                    "r14" => ctx.r14,
                    "r15" => ctx.r15,
                    _ => return None,
                };
                Some(value)
            }
        }
    }

    /// Register names for this CPU, in display order.
    pub fn general_purpose_registers(&self) -> &'static [&'static str] {
        match self.raw {
            RawContext::X86(_) => &X86_REGS,
            RawContext::Amd64(_) => &AMD64_REGS,
        }
    }

    /// Writes a human-readable dump of the raw context.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        match self.raw {
            RawContext::X86(ref raw) => write!(
                f,
                "CONTEXT_X86
  context_flags = {:#x}
  eip = {:#010x}   esp = {:#010x}   ebp = {:#010x}
  eax = {:#010x}   ebx = {:#010x}   ecx = {:#010x}   edx = {:#010x}
  esi = {:#010x}   edi = {:#010x}   efl = {:#010x}

",
                raw.context_flags,
                raw.eip,
                raw.esp,
                raw.ebp,
                raw.eax,
                raw.ebx,
                raw.ecx,
                raw.edx,
                raw.esi,
                raw.edi,
                raw.eflags,
            ),
            RawContext::Amd64(ref raw) => write!(
                f,
                "CONTEXT_AMD64
  context_flags = {:#x}
  rip = {:#018x}   rsp = {:#018x}   rbp = {:#018x}
  rax = {:#018x}   rbx = {:#018x}   rcx = {:#018x}
  rdx = {:#018x}   rsi = {:#018x}   rdi = {:#018x}
  r8  = {:#018x}   r9  = {:#018x}   r10 = {:#018x}
  r11 = {:#018x}   r12 = {:#018x}   r13 = {:#018x}
  r14 = {:#018x}   r15 = {:#018x}

",
                raw.context_flags,
                raw.rip,
                raw.rsp,
                raw.rbp,
                raw.rax,
                raw.rbx,
                raw.rcx,
                raw.rdx,
                raw.rsi,
                raw.rdi,
                raw.r8,
                raw.r9,
                raw.r10,
                raw.r11,
                raw.r12,
                raw.r13,
                raw.r14,
                raw.r15,
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validity_gates_registers() {
        let mut raw = md::CONTEXT_AMD64::default();
        raw.rip = 0x1000;
        raw.rsp = 0x2000;
        raw.rbp = 0x3000;
        let mut valid = HashSet::new();
        valid.insert("rip");
        valid.insert("rsp");
        let ctx = DumpContext {
            raw: RawContext::Amd64(raw),
            valid: ContextValidity::Some(valid),
        };
        assert_eq!(ctx.get_register("rip"), Some(0x1000));
        assert_eq!(ctx.get_register("rbp"), None);
        assert_eq!(ctx.get_register_always("rbp"), Some(0x3000));
    }

    #[test]
    fn test_x86_widening() {
        let mut raw = md::CONTEXT_X86::default();
        raw.eip = 0xfffe_0000;
        let ctx = DumpContext::from_raw(RawContext::X86(raw));
        // 32-bit registers widen with zeroes, never a sign bit.
        assert_eq!(ctx.get_instruction_pointer(), 0xfffe_0000);
        assert_eq!(ctx.cpu(), Cpu::X86);
    }
}
