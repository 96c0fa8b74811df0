// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

use std::convert::TryFrom;
use std::ops::Deref;

use dumpscope::{DumpModule, DumpModuleList};
use dumpscope_image::PeImage;
use tracing::trace;

use crate::disasm::{disassemble_window, DisassemblyWindow, WINDOW_BYTES_AFTER, WINDOW_BYTES_BEFORE};
use crate::process_state::StackFrame;

/// Attributes each frame to the module covering its instruction, and pulls a
/// disassembly window out of `image` for frames that resume in the main
/// module.
pub(crate) fn symbolicate<T>(
    frames: &mut [StackFrame],
    modules: &DumpModuleList,
    image: Option<&PeImage<T>>,
) where
    T: Deref<Target = [u8]>,
{
    let main_base = modules.main_module().map(DumpModule::base_address);
    for frame in frames {
        let module = match modules.module_at_address(frame.instruction) {
            Some(module) => module,
            None => continue,
        };
        frame.module = Some(module.clone());
        frame.rva = Some(frame.instruction - module.base_address());

        if let (Some(image), Some(main_base)) = (image, main_base) {
            // Only the main module's bytes are on hand.
            if module.base_address() == main_base {
                frame.disassembly = disassembly_at(image, main_base, frame.resume_address);
            }
        }
    }
}

/// Cuts a window of code bytes around `resume_address` out of the image and
/// disassembles it.
fn disassembly_at<T>(
    image: &PeImage<T>,
    module_base: u64,
    resume_address: u64,
) -> Option<DisassemblyWindow>
where
    T: Deref<Target = [u8]>,
{
    let rva = u32::try_from(resume_address.checked_sub(module_base)?).ok()?;
    let offset = image.rva_to_file_offset(rva)?;
    let start = offset.checked_sub(WINDOW_BYTES_BEFORE)?;
    let end = offset.checked_add(WINDOW_BYTES_AFTER)?;
    let window = image.bytes().get(start..end)?;
    let disassembled = disassemble_window(window, resume_address, image.is_64bit());
    if disassembled.is_none() {
        trace!("no clean disassembly around {:#x}", resume_address);
    }
    disassembled
}
