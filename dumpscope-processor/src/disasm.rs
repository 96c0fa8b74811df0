// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! Disassembly of the code around a frame's resume address.
//!
//! x86 instructions are variable-length and unaligned, so a window of bytes
//! cut around an address usually starts in the middle of an instruction.
//! Decoding from such a start produces garbage that may or may not resync
//! before the address of interest. [`disassemble_window`] deals with this by
//! trying successive start offsets until it finds one from which decoding
//! lands exactly on the resume address, and only then keeps the listing.

use std::io::{self, Write};

/// How many bytes before the resume address a window covers.
pub const WINDOW_BYTES_BEFORE: usize = 16;
/// How many bytes at and after the resume address a window covers.
pub const WINDOW_BYTES_AFTER: usize = 20;

/// One decoded instruction of a [`DisassemblyWindow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassembledInstruction {
    /// The instruction's address.
    pub address: u64,
    /// Intel-syntax text, e.g. `mov rax, [rcx + 0x8]`.
    pub text: String,
}

/// A short disassembly listing around a frame's resume address.
#[derive(Debug, Clone)]
pub struct DisassemblyWindow {
    /// The decoded instructions, in address order.
    pub instructions: Vec<DisassembledInstruction>,
    /// Index into `instructions` of the one at the resume address.
    pub selected: usize,
}

impl DisassemblyWindow {
    /// The instruction at the resume address.
    pub fn selected_instruction(&self) -> &DisassembledInstruction {
        &self.instructions[self.selected]
    }

    /// Writes the listing, marking the resume address.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        for (i, instruction) in self.instructions.iter().enumerate() {
            let marker = if i == self.selected { "-->" } else { "   " };
            writeln!(
                f,
                "    {} {:#018x}  {}",
                marker, instruction.address, instruction.text
            )?;
        }
        Ok(())
    }
}

/// Disassembles a window of code bytes around a resume address.
///
/// `window` holds [`WINDOW_BYTES_BEFORE`] bytes preceding the resume address
/// followed by the bytes at and after it. Returns `None` when no start
/// offset decodes cleanly to the resume address, or when the bytes there do
/// not decode; a listing that does not contain the address of interest would
/// only mislead.
pub fn disassemble_window(
    window: &[u8],
    resume_address: u64,
    is_64bit: bool,
) -> Option<DisassemblyWindow> {
    if window.len() < WINDOW_BYTES_BEFORE {
        return None;
    }
    let base_address = resume_address.checked_sub(WINDOW_BYTES_BEFORE as u64)?;

    let instructions = if is_64bit {
        let start = (0..WINDOW_BYTES_BEFORE)
            .find(|&start| amd64::lands_on(window, start, WINDOW_BYTES_BEFORE))?;
        amd64::decode_from(window, start, base_address)
    } else {
        let start = (0..WINDOW_BYTES_BEFORE)
            .find(|&start| x86::lands_on(window, start, WINDOW_BYTES_BEFORE))?;
        x86::decode_from(window, start, base_address)
    };

    let selected = instructions
        .iter()
        .position(|instruction| instruction.address == resume_address)?;
    Some(DisassemblyWindow {
        instructions,
        selected,
    })
}

mod amd64 {
    use yaxpeax_arch::LengthedInstruction;
    use yaxpeax_x86::amd64::InstDecoder;

    use super::DisassembledInstruction;

    /// Whether decoding from `start` arrives exactly at `target`.
    pub(super) fn lands_on(window: &[u8], start: usize, target: usize) -> bool {
        let decoder = InstDecoder::default();
        let mut offset = start as u64;
        while offset < target as u64 {
            match decoder.decode_slice(&window[offset as usize..]) {
                Ok(instruction) => offset = offset + instruction.len(),
                Err(_) => return false,
            }
        }
        offset == target as u64
    }

    /// Decodes from `start` to the end of the window, stopping at the first
    /// undecodable byte.
    pub(super) fn decode_from(
        window: &[u8],
        start: usize,
        base_address: u64,
    ) -> Vec<DisassembledInstruction> {
        let decoder = InstDecoder::default();
        let mut instructions = Vec::new();
        let mut offset = start as u64;
        while (offset as usize) < window.len() {
            match decoder.decode_slice(&window[offset as usize..]) {
                Ok(instruction) => {
                    instructions.push(DisassembledInstruction {
                        address: base_address + offset,
                        text: instruction.to_string(),
                    });
                    offset = offset + instruction.len();
                }
                Err(_) => break,
            }
        }
        instructions
    }
}

mod x86 {
    use yaxpeax_arch::LengthedInstruction;
    use yaxpeax_x86::protected_mode::InstDecoder;

    use super::DisassembledInstruction;

    /// Whether decoding from `start` arrives exactly at `target`.
    pub(super) fn lands_on(window: &[u8], start: usize, target: usize) -> bool {
        let decoder = InstDecoder::default();
        let mut offset = start as u32;
        while offset < target as u32 {
            match decoder.decode_slice(&window[offset as usize..]) {
                Ok(instruction) => offset = offset + instruction.len(),
                Err(_) => return false,
            }
        }
        offset == target as u32
    }

    /// Decodes from `start` to the end of the window, stopping at the first
    /// undecodable byte.
    pub(super) fn decode_from(
        window: &[u8],
        start: usize,
        base_address: u64,
    ) -> Vec<DisassembledInstruction> {
        let decoder = InstDecoder::default();
        let mut instructions = Vec::new();
        let mut offset = start as u32;
        while (offset as usize) < window.len() {
            match decoder.decode_slice(&window[offset as usize..]) {
                Ok(instruction) => {
                    instructions.push(DisassembledInstruction {
                        address: base_address + offset as u64,
                        text: instruction.to_string(),
                    });
                    offset = offset + instruction.len();
                }
                Err(_) => break,
            }
        }
        instructions
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // A window whose first 16 bytes are single-byte instructions decodes
    // from offset zero and selects the resume address exactly.
    #[test]
    fn test_window_of_nops() {
        let mut window = vec![0x90u8; WINDOW_BYTES_BEFORE];
        window.push(0xc3);
        window.extend_from_slice(&[0x90; WINDOW_BYTES_AFTER - 1]);

        let dw = disassemble_window(&window, 0x1000, true).unwrap();
        assert_eq!(dw.selected_instruction().address, 0x1000);
        assert_eq!(dw.selected_instruction().text, "ret");
        assert_eq!(dw.instructions[0].address, 0x1000 - 16);
        // Every byte before the resume point was a one-byte nop.
        assert_eq!(dw.selected, WINDOW_BYTES_BEFORE);
    }

    #[test]
    fn test_resync_past_partial_instruction() {
        // A jmp rel32 near the end of the leading bytes swallows everything
        // up to and past the resume point when decoding starts at offset
        // zero, so only a start inside its displacement lands cleanly.
        let mut window = vec![0x90u8; 12];
        window.push(0xe9);
        window.extend_from_slice(&[0x90; 3]);
        window.push(0xc3);
        window.extend_from_slice(&[0x90; WINDOW_BYTES_AFTER - 1]);

        let dw = disassemble_window(&window, 0x2000, true).unwrap();
        assert_eq!(dw.selected_instruction().address, 0x2000);
        assert_eq!(dw.selected_instruction().text, "ret");
        // The listing begins past the jmp's tail, not at the window start.
        assert!(dw.instructions[0].address > 0x2000 - 16);
    }

    #[test]
    fn test_window_too_small() {
        assert!(disassemble_window(&[0x90; 4], 0x1000, true).is_none());
    }

    #[test]
    fn test_undecodable_resume_address() {
        // A lone 0x0f needs a second opcode byte, so the resume address
        // never decodes and no window should be produced.
        let mut window = vec![0x90u8; WINDOW_BYTES_BEFORE];
        window.push(0x0f);
        assert!(disassemble_window(&window, 0x1000, true).is_none());
    }

    #[test]
    fn test_32bit_window() {
        let mut window = vec![0x90u8; WINDOW_BYTES_BEFORE];
        window.push(0xc3);
        window.extend_from_slice(&[0x90; WINDOW_BYTES_AFTER - 1]);

        let dw = disassemble_window(&window, 0x40001000, false).unwrap();
        assert_eq!(dw.selected_instruction().text, "ret");
    }
}
