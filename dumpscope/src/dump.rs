// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The container reader and the per-stream decoders.
//!
//! [`Dump::read`] validates nothing but the header; everything else is decoded
//! on demand through [`Dump::get_stream`], one independent stream at a time.
//! Streams that are damaged report their own errors without affecting their
//! siblings, which matters in practice because truncated and partially
//! overwritten dumps are a routine input, not an edge case.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::mem;
use std::ops::Deref;
use std::path::Path;

use dumpscope_common::errors::{
    ExceptionCodeWindows, ExceptionCodeWindowsAccessType, ExceptionCodeWindowsInPageErrorType,
};
use dumpscope_common::format as md;
use encoding_rs::{UTF_16BE, UTF_16LE};
use memmap2::Mmap;
use num_traits::FromPrimitive;
use scroll::ctx::{SizeWith, TryFromCtx};
use scroll::{Endian, Pread, BE, LE};
use time::format_description::well_known::Rfc3339;
use tracing::warn;

use crate::context::DumpContext;
use crate::range_index::RangeIndex;
use crate::system_info::{Cpu, Os};

/// Errors encountered while reading a dump.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    #[error("the file could not be opened")]
    FileNotFound,
    #[error("the file could not be memory mapped")]
    IoError,
    #[error("the buffer is smaller than a dump header")]
    MissingHeader,
    #[error("the header signature matches neither byte order, not a minidump")]
    SignatureMismatch,
    #[error("the header version field does not match")]
    VersionMismatch,
    #[error("the stream directory is missing or out of bounds")]
    MissingDirectory,
    #[error("the stream could not be read at its directory location")]
    StreamReadFailure,
    #[error("the stream size disagrees with its contents, expected {expected} bytes, found {actual}")]
    StreamSizeMismatch { expected: usize, actual: usize },
    #[error("the requested stream is not present in the dump")]
    StreamNotFound,
    #[error("a module record was unusable")]
    ModuleReadFailure,
    #[error("a memory descriptor pointed at no usable bytes")]
    MemoryReadFailure,
    #[error("a field referenced data outside the dump")]
    DataError,
}

impl Error {
    /// A stable identifier for this error, for logs and telemetry.
    pub fn name(&self) -> &'static str {
        match self {
            Error::FileNotFound => "FileNotFound",
            Error::IoError => "IoError",
            Error::MissingHeader => "MissingHeader",
            Error::SignatureMismatch => "SignatureMismatch",
            Error::VersionMismatch => "VersionMismatch",
            Error::MissingDirectory => "MissingDirectory",
            Error::StreamReadFailure => "StreamReadFailure",
            Error::StreamSizeMismatch { .. } => "StreamSizeMismatch",
            Error::StreamNotFound => "StreamNotFound",
            Error::ModuleReadFailure => "ModuleReadFailure",
            Error::MemoryReadFailure => "MemoryReadFailure",
            Error::DataError => "DataError",
        }
    }
}

/// A parsed minidump.
///
/// Generic over any byte source, so owned buffers, borrowed slices, and memory
/// maps all work. Construction validates the header and locates the stream
/// directory; everything else happens in [`Dump::get_stream`].
#[derive(Debug)]
pub struct Dump<'a, T>
where
    T: Deref<Target = [u8]> + 'a,
{
    data: T,
    /// The raw dump header.
    pub header: md::MINIDUMP_HEADER,
    /// Byte order of the container, detected from the header signature.
    pub endian: Endian,
    /// Directory entries by stream type, each with its directory index.
    streams: HashMap<u32, (u32, md::MINIDUMP_DIRECTORY)>,
    /// Pre-decoded system info, which other streams consult while decoding.
    system_info: Option<DumpSystemInfo>,
    _phantom: PhantomData<&'a [u8]>,
}

/// A stream of a [`Dump`] that this crate knows how to decode.
pub trait DumpStream<'a>: Sized {
    /// The directory stream type this decoder handles.
    const STREAM_TYPE: md::MINIDUMP_STREAM_TYPE;

    /// Decodes the stream from its raw bytes.
    ///
    /// `all` is the entire dump, for following offsets that point outside the
    /// stream itself. `system_info` is available once the system info stream has
    /// been located, which some streams need to pick a CPU.
    fn read(
        bytes: &'a [u8],
        all: &'a [u8],
        endian: Endian,
        system_info: Option<&DumpSystemInfo>,
    ) -> Result<Self, Error>;
}

/// Reads a length-prefixed UTF-16 string at `offset`, advancing past it.
///
/// The prefix counts bytes, not code units. Odd lengths, out-of-bounds reads, and
/// unpaired surrogates all yield `None` rather than a lossy string.
fn read_string_utf16(offset: &mut usize, bytes: &[u8], endian: Endian) -> Option<String> {
    let size = bytes.gread_with::<u32>(offset, endian).ok()? as usize;
    let end = offset.checked_add(size)?;
    if size % 2 != 0 || end > bytes.len() {
        return None;
    }
    let encoding = match endian {
        Endian::Little => UTF_16LE,
        Endian::Big => UTF_16BE,
    };
    let s = encoding.decode_without_bom_handling_and_without_replacement(&bytes[*offset..end])?;
    *offset = end;
    Some(s.into_owned())
}

/// Bounds-checks the slice a location descriptor points at.
#[inline]
fn location_slice<'a>(
    bytes: &'a [u8],
    loc: &md::MINIDUMP_LOCATION_DESCRIPTOR,
) -> Result<&'a [u8], Error> {
    let start = loc.rva as usize;
    start
        .checked_add(loc.data_size as usize)
        .and_then(|end| bytes.get(start..end))
        .ok_or(Error::StreamReadFailure)
}

/// Checks that `count` records of `entry_size` bytes fit in `bytes` after `offset`,
/// returning the total they occupy.
fn ensure_count_in_bound(
    bytes: &[u8],
    count: usize,
    entry_size: usize,
    offset: usize,
) -> Result<usize, Error> {
    let counted = count
        .checked_mul(entry_size)
        .and_then(|n| n.checked_add(offset))
        .ok_or(Error::StreamReadFailure)?;
    if bytes.len() < counted {
        return Err(Error::StreamSizeMismatch {
            expected: counted,
            actual: bytes.len(),
        });
    }
    Ok(counted)
}

/// Reads a u32-count-prefixed array of fixed-size records, the layout shared by the
/// thread, module, memory, and thread name streams.
fn read_stream_list<'a, T>(
    offset: &mut usize,
    bytes: &'a [u8],
    endian: Endian,
) -> Result<Vec<T>, Error>
where
    T: TryFromCtx<'a, Endian, [u8], Error = scroll::Error>,
    T: SizeWith<Endian>,
{
    let count = bytes
        .gread_with::<u32>(offset, endian)
        .or(Err(Error::StreamReadFailure))? as usize;
    let counted = ensure_count_in_bound(bytes, count, <T>::size_with(&endian), mem::size_of::<u32>())?;
    // Some writers align the first record to 8 bytes, leaving 4 bytes of padding
    // after the count.
    match bytes.len() - counted {
        0 => {}
        4 => {
            *offset += 4;
        }
        _ => {
            return Err(Error::StreamSizeMismatch {
                expected: counted,
                actual: bytes.len(),
            });
        }
    }
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let entry: T = bytes
            .gread_with(offset, endian)
            .or(Err(Error::StreamReadFailure))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Renders a time_t as RFC 3339 for human-readable output.
fn format_time_t(t: u32) -> String {
    time::OffsetDateTime::from_unix_timestamp(t as i64)
        .ok()
        .and_then(|d| d.format(&Rfc3339).ok())
        .unwrap_or_else(|| "<invalid date>".to_owned())
}

/// The name of a stream type for logs and printed output.
fn stream_type_name(stream_type: u32) -> String {
    match md::MINIDUMP_STREAM_TYPE::from_u32(stream_type) {
        Some(ty) => format!("{:?}", ty),
        None => format!("{:#x}", stream_type),
    }
}

impl<'a> Dump<'a, Mmap> {
    /// Memory-maps the file at `path` and reads it as a dump.
    pub fn read_path<P: AsRef<Path>>(path: P) -> Result<Dump<'a, Mmap>, Error> {
        let file = File::open(path).or(Err(Error::FileNotFound))?;
        // Safety: the map is never written through. If another process truncates the
        // file underneath us we can still fault, which is the usual caveat of mapping
        // files one does not own.
        let mmap = unsafe { Mmap::map(&file) }.or(Err(Error::IoError))?;
        Dump::read(mmap)
    }
}

impl<'a, T> Dump<'a, T>
where
    T: Deref<Target = [u8]> + 'a,
{
    /// Reads a dump out of a buffer of bytes.
    ///
    /// This is the only place the container as a whole can be rejected: a bad
    /// signature or version is fatal, a directory that does not fit the buffer is
    /// fatal, and nothing else is. Damage inside an individual stream surfaces
    /// later, from [`Dump::get_stream`], and only for that stream.
    pub fn read(data: T) -> Result<Dump<'a, T>, Error> {
        let mut endian = LE;
        let mut offset = 0;
        let mut header: md::MINIDUMP_HEADER = data
            .gread_with(&mut offset, endian)
            .or(Err(Error::MissingHeader))?;
        if header.signature != md::MINIDUMP_SIGNATURE {
            if header.signature.swap_bytes() != md::MINIDUMP_SIGNATURE {
                return Err(Error::SignatureMismatch);
            }
            // A big-endian dump. Start over in the other byte order.
            endian = BE;
            offset = 0;
            header = data
                .gread_with(&mut offset, endian)
                .or(Err(Error::MissingHeader))?;
            if header.signature != md::MINIDUMP_SIGNATURE {
                return Err(Error::SignatureMismatch);
            }
        }
        if (header.version & 0x0000ffff) != md::MINIDUMP_VERSION {
            return Err(Error::VersionMismatch);
        }

        let mut offset = header.stream_directory_rva as usize;
        ensure_count_in_bound(
            &data,
            header.stream_count as usize,
            md::MINIDUMP_DIRECTORY::size_with(&endian),
            offset,
        )
        .or(Err(Error::MissingDirectory))?;

        let mut streams = HashMap::with_capacity(header.stream_count as usize);
        for i in 0..header.stream_count {
            let dir: md::MINIDUMP_DIRECTORY = data
                .gread_with(&mut offset, endian)
                .or(Err(Error::MissingDirectory))?;
            if let Some((prev_i, prev)) = streams.insert(dir.stream_type, (i, dir.clone())) {
                // Keep the later entry; it is the one a writer appending a fixed-up
                // stream meant us to see.
                warn!(
                    "dump contains duplicate streams of type {}: entry {} ({} bytes) and entry {} ({} bytes), keeping the latter",
                    stream_type_name(prev.stream_type),
                    prev_i,
                    prev.location.data_size,
                    i,
                    dir.location.data_size,
                );
            }
        }

        // Decode system info up front; other streams need it to pick a CPU while
        // decoding, and it is cheap.
        let system_info = streams
            .get(&u32::from(md::MINIDUMP_STREAM_TYPE::SystemInfoStream))
            .and_then(|(_, dir)| {
                let bytes = location_slice(&data, &dir.location).ok()?;
                DumpSystemInfo::read(bytes, &data, endian, None).ok()
            });

        Ok(Dump {
            data,
            header,
            endian,
            streams,
            system_info,
            _phantom: PhantomData,
        })
    }

    /// Decodes and returns the stream `S`, if the dump contains one.
    ///
    /// Nothing is cached; each call re-decodes from the underlying bytes.
    pub fn get_stream<S>(&'a self) -> Result<S, Error>
    where
        S: DumpStream<'a>,
    {
        let bytes = self.get_raw_stream(S::STREAM_TYPE.into())?;
        S::read(bytes, &self.data, self.endian, self.system_info.as_ref())
    }

    /// The raw bytes of the given stream type, bounds-checked against the buffer.
    pub fn get_raw_stream(&'a self, stream_type: u32) -> Result<&'a [u8], Error> {
        match self.streams.get(&stream_type) {
            Some((_, dir)) => location_slice(&self.data, &dir.location),
            None => Err(Error::StreamNotFound),
        }
    }

    /// Writes a human-readable description of the header and stream directory.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        write!(
            f,
            "MINIDUMP_HEADER
  signature            = {:#x}
  version              = {:#x}
  stream_count         = {}
  stream_directory_rva = {:#x}
  checksum             = {:#x}
  time_date_stamp      = {:#x} {}
  flags                = {:#x}

",
            self.header.signature,
            self.header.version,
            self.header.stream_count,
            self.header.stream_directory_rva,
            self.header.checksum,
            self.header.time_date_stamp,
            format_time_t(self.header.time_date_stamp),
            self.header.flags,
        )?;
        let mut entries: Vec<_> = self.streams.values().collect();
        entries.sort_by_key(|&&(i, _)| i);
        for &(i, ref dir) in entries {
            write!(
                f,
                "directory[{}]
MINIDUMP_DIRECTORY
  stream_type        = {:#x} ({})
  location.data_size = {}
  location.rva       = {:#x}

",
                i,
                dir.stream_type,
                stream_type_name(dir.stream_type),
                dir.location.data_size,
                dir.location.rva,
            )?;
        }
        Ok(())
    }
}

/// Information about the system that produced the dump.
#[derive(Debug, Clone)]
pub struct DumpSystemInfo {
    /// The raw stream contents.
    pub raw: md::MINIDUMP_SYSTEM_INFO,
    /// The operating system, from `raw.platform_id`.
    pub os: Os,
    /// The CPU family, from `raw.processor_architecture`.
    pub cpu: Cpu,
    csd_version: Option<String>,
    cpu_info: Option<String>,
}

impl DumpSystemInfo {
    /// The OS version details string referenced by the stream, e.g. the service pack
    /// name on Windows.
    pub fn csd_version(&self) -> Option<&str> {
        self.csd_version.as_deref()
    }

    /// A human-oriented CPU description synthesized from the cpuid fields.
    pub fn cpu_info(&self) -> Option<&str> {
        self.cpu_info.as_deref()
    }

    /// The numeric OS build rendered as a string.
    pub fn os_build(&self) -> String {
        self.raw.build_number.to_string()
    }

    /// The OS version, with service pack or uname details appended when present.
    pub fn os_version(&self) -> String {
        let (version, extra) = self.os_parts();
        match extra {
            Some(extra) => format!("{} {}", version, extra),
            None => version,
        }
    }

    /// Splits version information into "major.minor.build" and the leftovers.
    ///
    /// Breakpad's writers on Linux leave the version fields zeroed and store the
    /// whole uname line in the csd string, so when that shape appears the kernel
    /// release is pulled out of the string instead.
    fn os_parts(&self) -> (String, Option<String>) {
        let os_version = format!(
            "{}.{}.{}",
            self.raw.major_version, self.raw.minor_version, self.raw.build_number
        );
        let csd_version = self
            .csd_version()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned);
        if self.os == Os::Linux && os_version == "0.0.0" {
            // "Linux 5.15.0-56-generic #62 SMP ... x86_64"
            if let Some(csd) = &csd_version {
                let mut parts = csd.splitn(3, ' ');
                if let (Some(_kernel), Some(version)) = (parts.next(), parts.next()) {
                    return (version.to_owned(), parts.next().map(str::to_owned));
                }
            }
        }
        (os_version, csd_version)
    }

    /// Writes a human-readable description of the stream.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        write!(
            f,
            "MINIDUMP_SYSTEM_INFO
  processor_architecture = {:#x}
  processor_level        = {}
  processor_revision     = {:#x}
  number_of_processors   = {}
  major_version          = {}
  minor_version          = {}
  build_number           = {}
  platform_id            = {:#x}
  csd_version            = \"{}\"
  cpu_info               = \"{}\"

",
            self.raw.processor_architecture,
            self.raw.processor_level,
            self.raw.processor_revision,
            self.raw.number_of_processors,
            self.raw.major_version,
            self.raw.minor_version,
            self.raw.build_number,
            self.raw.platform_id,
            self.csd_version().unwrap_or(""),
            self.cpu_info().unwrap_or(""),
        )
    }
}

impl<'a> DumpStream<'a> for DumpSystemInfo {
    const STREAM_TYPE: md::MINIDUMP_STREAM_TYPE = md::MINIDUMP_STREAM_TYPE::SystemInfoStream;

    fn read(
        bytes: &'a [u8],
        all: &'a [u8],
        endian: Endian,
        system_info: Option<&DumpSystemInfo>,
    ) -> Result<Self, Error> {
        // The container decodes this stream once while reading the directory; hand
        // the cached copy back instead of decoding twice.
        if let Some(info) = system_info {
            return Ok(info.clone());
        }
        let raw: md::MINIDUMP_SYSTEM_INFO = bytes
            .pread_with(0, endian)
            .or(Err(Error::StreamReadFailure))?;
        let os = Os::from_platform_id(raw.platform_id);
        let cpu = Cpu::from_processor_architecture(raw.processor_architecture);

        let mut csd_offset = raw.csd_version_rva as usize;
        let csd_version = read_string_utf16(&mut csd_offset, all, endian);

        let cpu_info = synth_cpu_info(&raw, endian, cpu);

        Ok(DumpSystemInfo {
            raw,
            os,
            cpu,
            csd_version,
            cpu_info,
        })
    }
}

/// Builds the "GenuineIntel family 6 model 158 stepping 10" style description from
/// the raw cpuid words, for the CPUs where those words are defined.
fn synth_cpu_info(raw: &md::MINIDUMP_SYSTEM_INFO, endian: Endian, cpu: Cpu) -> Option<String> {
    use std::fmt::Write;
    match cpu {
        Cpu::X86 | Cpu::X86_64 => {
            let mut out = String::new();
            if cpu == Cpu::X86 {
                if let Ok(x86_info) = raw.cpu.data.pread_with::<md::X86CpuInfo>(0, endian) {
                    let vendor: String = x86_info
                        .vendor_id
                        .iter()
                        .flat_map(|reg| IntoIterator::into_iter(reg.to_le_bytes()))
                        .map(char::from)
                        .collect();
                    let _ = write!(out, "{} ", vendor);
                }
            }
            let _ = write!(
                out,
                "family {} model {} stepping {}",
                raw.processor_level,
                (raw.processor_revision >> 8) & 0xff,
                raw.processor_revision & 0xff
            );
            Some(out)
        }
        _ => None,
    }
}

/// The misc info stream, at whichever revision the writer produced.
#[derive(Debug, Clone)]
pub enum RawMiscInfo {
    MiscInfo(md::MINIDUMP_MISC_INFO),
    MiscInfo2(md::MINIDUMP_MISC_INFO_2),
    MiscInfo3(md::MINIDUMP_MISC_INFO_3),
    MiscInfo4(md::MINIDUMP_MISC_INFO_4),
}

/// Miscellaneous process information.
#[derive(Debug, Clone)]
pub struct DumpMiscInfo {
    pub raw: RawMiscInfo,
}

// Accessors for the versioned fields. Each returns Some only when the stream revision
// carries the field and, where the format demands it, the matching flags1 bit is set.
macro_rules! misc_accessors {
    () => {};
    (always $name:ident in [$($variant:ident),+]: $t:ty; $($rest:tt)*) => {
        #[allow(unreachable_patterns)]
        pub fn $name(&self) -> Option<&$t> {
            match self.raw {
                $(RawMiscInfo::$variant(ref raw) => Some(&raw.$name),)+
                _ => None,
            }
        }
        misc_accessors!($($rest)*);
    };
    (flagged($flag:ident) $name:ident in [$($variant:ident),+]: $t:ty; $($rest:tt)*) => {
        #[allow(unreachable_patterns)]
        pub fn $name(&self) -> Option<&$t> {
            match self.raw {
                $(RawMiscInfo::$variant(ref raw) => {
                    if md::MiscInfoFlags::from_bits_truncate(raw.flags1)
                        .contains(md::MiscInfoFlags::$flag)
                    {
                        Some(&raw.$name)
                    } else {
                        None
                    }
                })+
                _ => None,
            }
        }
        misc_accessors!($($rest)*);
    };
}

impl DumpMiscInfo {
    misc_accessors!(
        always size_of_info in [MiscInfo, MiscInfo2, MiscInfo3, MiscInfo4]: u32;
        always flags1 in [MiscInfo, MiscInfo2, MiscInfo3, MiscInfo4]: u32;
        flagged(MINIDUMP_MISC1_PROCESS_ID)
            process_id in [MiscInfo, MiscInfo2, MiscInfo3, MiscInfo4]: u32;
        flagged(MINIDUMP_MISC1_PROCESS_TIMES)
            process_create_time in [MiscInfo, MiscInfo2, MiscInfo3, MiscInfo4]: u32;
        flagged(MINIDUMP_MISC1_PROCESS_TIMES)
            process_user_time in [MiscInfo, MiscInfo2, MiscInfo3, MiscInfo4]: u32;
        flagged(MINIDUMP_MISC1_PROCESS_TIMES)
            process_kernel_time in [MiscInfo, MiscInfo2, MiscInfo3, MiscInfo4]: u32;
        flagged(MINIDUMP_MISC1_PROCESSOR_POWER_INFO)
            processor_max_mhz in [MiscInfo2, MiscInfo3, MiscInfo4]: u32;
        flagged(MINIDUMP_MISC1_PROCESSOR_POWER_INFO)
            processor_current_mhz in [MiscInfo2, MiscInfo3, MiscInfo4]: u32;
        flagged(MINIDUMP_MISC3_PROCESS_INTEGRITY)
            process_integrity_level in [MiscInfo3, MiscInfo4]: u32;
        flagged(MINIDUMP_MISC3_PROCESS_EXECUTE_FLAGS)
            process_execute_flags in [MiscInfo3, MiscInfo4]: u32;
        flagged(MINIDUMP_MISC3_PROTECTED_PROCESS)
            protected_process in [MiscInfo3, MiscInfo4]: u32;
        flagged(MINIDUMP_MISC3_TIMEZONE)
            time_zone_id in [MiscInfo3, MiscInfo4]: u32;
        flagged(MINIDUMP_MISC3_TIMEZONE)
            time_zone in [MiscInfo3, MiscInfo4]: md::TIME_ZONE_INFORMATION;
        flagged(MINIDUMP_MISC4_BUILDSTRING)
            build_string in [MiscInfo4]: [u16; 260];
        flagged(MINIDUMP_MISC4_BUILDSTRING)
            dbg_bld_str in [MiscInfo4]: [u16; 40];
    );

    /// Writes a human-readable description of the stream.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        writeln!(f, "MINIDUMP_MISC_INFO")?;
        if let Some(flags) = self.flags1() {
            writeln!(f, "  flags1              = {:#x}", flags)?;
        }
        if let Some(pid) = self.process_id() {
            writeln!(f, "  process_id          = {}", pid)?;
        }
        if let Some(t) = self.process_create_time() {
            writeln!(f, "  process_create_time = {:#x} {}", t, format_time_t(*t))?;
        }
        if let Some(t) = self.process_user_time() {
            writeln!(f, "  process_user_time   = {}", t)?;
        }
        if let Some(t) = self.process_kernel_time() {
            writeln!(f, "  process_kernel_time = {}", t)?;
        }
        if let Some(mhz) = self.processor_max_mhz() {
            writeln!(f, "  processor_max_mhz   = {}", mhz)?;
        }
        writeln!(f)
    }
}

impl<'a> DumpStream<'a> for DumpMiscInfo {
    const STREAM_TYPE: md::MINIDUMP_STREAM_TYPE = md::MINIDUMP_STREAM_TYPE::MiscInfoStream;

    fn read(
        bytes: &'a [u8],
        _all: &'a [u8],
        endian: Endian,
        _system_info: Option<&DumpSystemInfo>,
    ) -> Result<Self, Error> {
        // Decode the largest revision the stream has room for. size_of_info is not
        // trustworthy; plenty of writers fill it in wrong.
        macro_rules! try_read {
            ($variant:ident, $t:ty) => {
                if bytes.len() >= <$t>::size_with(&endian) {
                    let raw = bytes
                        .pread_with(0, endian)
                        .or(Err(Error::StreamReadFailure))?;
                    return Ok(DumpMiscInfo {
                        raw: RawMiscInfo::$variant(raw),
                    });
                }
            };
        }
        try_read!(MiscInfo4, md::MINIDUMP_MISC_INFO_4);
        try_read!(MiscInfo3, md::MINIDUMP_MISC_INFO_3);
        try_read!(MiscInfo2, md::MINIDUMP_MISC_INFO_2);
        try_read!(MiscInfo, md::MINIDUMP_MISC_INFO);
        Err(Error::StreamReadFailure)
    }
}

/// An executable image that was loaded in the crashed process.
#[derive(Debug, Clone)]
pub struct DumpModule {
    /// The raw module record.
    pub raw: md::MINIDUMP_MODULE,
    name: String,
}

impl DumpModule {
    /// Decodes one module record, following its name offset.
    pub fn read(raw: md::MINIDUMP_MODULE, all: &[u8], endian: Endian) -> Result<DumpModule, Error> {
        let mut offset = raw.module_name_rva as usize;
        let name = read_string_utf16(&mut offset, all, endian).ok_or(Error::ModuleReadFailure)?;
        Ok(DumpModule { raw, name })
    }

    /// Constructs a bare module, mainly a convenience for tests.
    pub fn new(base: u64, size: u32, name: &str) -> DumpModule {
        DumpModule {
            raw: md::MINIDUMP_MODULE {
                base_of_image: base,
                size_of_image: size,
                ..Default::default()
            },
            name: name.to_owned(),
        }
    }

    /// The image's path as the writer recorded it.
    pub fn code_file(&self) -> &str {
        &self.name
    }

    pub fn base_address(&self) -> u64 {
        self.raw.base_of_image
    }

    pub fn size(&self) -> u64 {
        self.raw.size_of_image as u64
    }

    /// The file version from the embedded version record, when the writer filled
    /// one in.
    pub fn version(&self) -> Option<String> {
        let vi = &self.raw.version_info;
        if vi.signature == md::VS_FFI_SIGNATURE && vi.struct_version == md::VS_FFI_STRUCVERSION {
            Some(format!(
                "{}.{}.{}.{}",
                vi.file_version_hi >> 16,
                vi.file_version_hi & 0xffff,
                vi.file_version_lo >> 16,
                vi.file_version_lo & 0xffff
            ))
        } else {
            None
        }
    }

    /// Writes a human-readable description of the module.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        write!(
            f,
            "MINIDUMP_MODULE
  base_of_image   = {:#x}
  size_of_image   = {:#x}
  checksum        = {:#x}
  time_date_stamp = {:#x} {}
  module_name_rva = {:#x}
  (code_file)     = \"{}\"
  (version)       = \"{}\"

",
            self.raw.base_of_image,
            self.raw.size_of_image,
            self.raw.checksum,
            self.raw.time_date_stamp,
            format_time_t(self.raw.time_date_stamp),
            self.raw.module_name_rva,
            self.name,
            self.version().unwrap_or_default(),
        )
    }
}

/// The modules of a dump, with lookup by address.
#[derive(Debug, Clone, Default)]
pub struct DumpModuleList {
    modules: Vec<DumpModule>,
    by_addr: RangeIndex<usize>,
}

impl DumpModuleList {
    /// An empty list.
    pub fn new() -> DumpModuleList {
        Default::default()
    }

    /// Builds a list from already-decoded modules.
    pub fn from_modules(modules: Vec<DumpModule>) -> DumpModuleList {
        let by_addr = RangeIndex::from_ranges(modules.iter().enumerate().filter_map(|(i, m)| {
            let end = m.raw.base_of_image.checked_add(m.raw.size_of_image as u64)?;
            Some((m.raw.base_of_image, end, i))
        }));
        DumpModuleList { modules, by_addr }
    }

    /// The module whose image range contains `addr`.
    ///
    /// Overlapping records do turn up in real dumps; lookup resolves them by
    /// preferring the smallest enclosing range, then the lowest base address, so
    /// repeated queries always name the same module.
    pub fn module_at_address(&self, addr: u64) -> Option<&DumpModule> {
        self.by_addr.get(addr).map(|&i| &self.modules[i])
    }

    /// The process executable, by loader convention the first module in the stream.
    pub fn main_module(&self) -> Option<&DumpModule> {
        self.modules.first()
    }

    /// Modules in the order the dump records them.
    pub fn iter(&self) -> impl Iterator<Item = &DumpModule> {
        self.modules.iter()
    }

    /// Modules in ascending base address order.
    pub fn by_addr(&self) -> impl Iterator<Item = &DumpModule> {
        self.by_addr.iter().map(move |(_, _, &i)| &self.modules[i])
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Writes a human-readable description of the list.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        write!(
            f,
            "DumpModuleList
  module_count = {}

",
            self.modules.len()
        )?;
        for (i, module) in self.modules.iter().enumerate() {
            writeln!(f, "module[{}]", i)?;
            module.print(f)?;
        }
        Ok(())
    }
}

impl<'a> DumpStream<'a> for DumpModuleList {
    const STREAM_TYPE: md::MINIDUMP_STREAM_TYPE = md::MINIDUMP_STREAM_TYPE::ModuleListStream;

    fn read(
        bytes: &'a [u8],
        all: &'a [u8],
        endian: Endian,
        _system_info: Option<&DumpSystemInfo>,
    ) -> Result<Self, Error> {
        let mut offset = 0;
        let raw_modules: Vec<md::MINIDUMP_MODULE> = read_stream_list(&mut offset, bytes, endian)?;
        let mut modules = Vec::with_capacity(raw_modules.len());
        for raw in raw_modules {
            if raw.size_of_image == 0 || raw.size_of_image as u64 > u64::MAX - raw.base_of_image {
                warn!(
                    "module at {:#018x} has impossible size {:#x}",
                    raw.base_of_image, raw.size_of_image
                );
                return Err(Error::ModuleReadFailure);
            }
            modules.push(DumpModule::read(raw, all, endian)?);
        }
        Ok(DumpModuleList::from_modules(modules))
    }
}

/// A region of the crashed process's memory, with its captured bytes.
#[derive(Debug, Clone)]
pub struct DumpMemory<'a> {
    /// The raw descriptor.
    pub desc: md::MINIDUMP_MEMORY_DESCRIPTOR,
    /// Address of the start of this region in the crashed process.
    pub base_address: u64,
    /// Length of the region in bytes.
    pub size: u64,
    /// The captured bytes.
    pub bytes: &'a [u8],
    /// Byte order for typed reads out of the region.
    pub endian: Endian,
}

impl<'a> DumpMemory<'a> {
    /// Resolves one memory descriptor against the dump's bytes.
    pub fn read(
        desc: &md::MINIDUMP_MEMORY_DESCRIPTOR,
        data: &'a [u8],
        endian: Endian,
    ) -> Result<DumpMemory<'a>, Error> {
        if desc.memory.rva == 0 || desc.memory.data_size == 0 {
            // Writers emit null descriptors for memory they chose not to capture.
            return Err(Error::MemoryReadFailure);
        }
        let bytes = location_slice(data, &desc.memory).or(Err(Error::MemoryReadFailure))?;
        Ok(DumpMemory {
            desc: *desc,
            base_address: desc.start_of_memory_range,
            size: desc.memory.data_size as u64,
            bytes,
            endian,
        })
    }

    /// Reads a `T` out of this region at an absolute process address.
    pub fn get_memory_at_address<T>(&self, addr: u64) -> Option<T>
    where
        T: TryFromCtx<'a, Endian, [u8], Error = scroll::Error>,
        T: SizeWith<Endian>,
    {
        let start = addr.checked_sub(self.base_address)? as usize;
        self.bytes.pread_with::<T>(start, self.endian).ok()
    }

    /// The `[start, end)` range this region covers, when it is well formed.
    pub fn memory_range(&self) -> Option<(u64, u64)> {
        if self.size == 0 {
            return None;
        }
        let end = self.base_address.checked_add(self.size)?;
        Some((self.base_address, end))
    }

    /// Writes a hex dump of the region's contents.
    pub fn print_contents<W: Write>(&self, f: &mut W) -> io::Result<()> {
        const ROW: usize = 16;
        for (i, row) in self.bytes.chunks(ROW).enumerate() {
            write!(f, "  {:#010x}  ", self.base_address + (i * ROW) as u64)?;
            for byte in row {
                write!(f, "{:02x} ", byte)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// The memory regions captured in a dump.
#[derive(Debug, Clone, Default)]
pub struct DumpMemoryList<'a> {
    regions: Vec<DumpMemory<'a>>,
    by_addr: RangeIndex<usize>,
}

impl<'a> DumpMemoryList<'a> {
    /// An empty list.
    pub fn new() -> DumpMemoryList<'a> {
        Default::default()
    }

    /// Builds a list from already-resolved regions.
    pub fn from_regions(regions: Vec<DumpMemory<'a>>) -> DumpMemoryList<'a> {
        let by_addr = RangeIndex::from_ranges(
            regions
                .iter()
                .enumerate()
                .filter_map(|(i, r)| r.memory_range().map(|(start, end)| (start, end, i))),
        );
        DumpMemoryList { regions, by_addr }
    }

    /// The region containing `addr`.
    pub fn memory_at_address(&self, addr: u64) -> Option<&DumpMemory<'a>> {
        self.by_addr.get(addr).map(|&i| &self.regions[i])
    }

    /// Regions in the order the dump records them.
    pub fn iter(&self) -> impl Iterator<Item = &DumpMemory<'a>> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Writes a human-readable description of the list.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        write!(
            f,
            "DumpMemoryList
  region_count = {}

",
            self.regions.len()
        )?;
        for (i, region) in self.regions.iter().enumerate() {
            writeln!(
                f,
                "region[{}] {:#018x} ({} bytes)",
                i, region.base_address, region.size
            )?;
            region.print_contents(f)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

impl<'a> DumpStream<'a> for DumpMemoryList<'a> {
    const STREAM_TYPE: md::MINIDUMP_STREAM_TYPE = md::MINIDUMP_STREAM_TYPE::MemoryListStream;

    fn read(
        bytes: &'a [u8],
        all: &'a [u8],
        endian: Endian,
        _system_info: Option<&DumpSystemInfo>,
    ) -> Result<Self, Error> {
        let mut offset = 0;
        let descriptors: Vec<md::MINIDUMP_MEMORY_DESCRIPTOR> =
            read_stream_list(&mut offset, bytes, endian)?;
        let regions = descriptors
            .iter()
            .filter_map(|desc| match DumpMemory::read(desc, all, endian) {
                Ok(region) => Some(region),
                Err(_) => {
                    // Drop just this region, not the whole stream.
                    warn!(
                        "memory region at {:#018x} has no usable bytes",
                        desc.start_of_memory_range
                    );
                    None
                }
            })
            .collect();
        Ok(DumpMemoryList::from_regions(regions))
    }
}

/// A thread captured in the dump.
#[derive(Debug, Clone)]
pub struct DumpThread<'a> {
    /// The raw thread record.
    pub raw: md::MINIDUMP_THREAD,
    context: Option<DumpContext>,
    stack: Option<DumpMemory<'a>>,
}

impl<'a> DumpThread<'a> {
    /// The thread's captured CPU context, when one was recorded and readable.
    pub fn context(&self) -> Option<&DumpContext> {
        self.context.as_ref()
    }

    /// The memory covering this thread's stack.
    ///
    /// Windows writers sometimes null out the thread record's own stack descriptor;
    /// the memory list is then consulted for a region containing the recorded stack
    /// base.
    pub fn stack_memory(&self, memory_list: &DumpMemoryList<'a>) -> Option<DumpMemory<'a>> {
        self.stack.clone().or_else(|| {
            memory_list
                .memory_at_address(self.raw.stack.start_of_memory_range)
                .cloned()
        })
    }

    /// Writes a human-readable description of the thread.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        write!(
            f,
            "MINIDUMP_THREAD
  thread_id      = {:#x}
  suspend_count  = {}
  priority_class = {:#x}
  priority       = {:#x}
  teb            = {:#x}
  stack          = {:#x} ({} bytes)

",
            self.raw.thread_id,
            self.raw.suspend_count,
            self.raw.priority_class,
            self.raw.priority,
            self.raw.teb,
            self.raw.stack.start_of_memory_range,
            self.raw.stack.memory.data_size,
        )?;
        match self.context {
            Some(ref ctx) => ctx.print(f)?,
            None => writeln!(f, "  (no context)")?,
        }
        Ok(())
    }
}

/// The threads of a dump, with lookup by thread id.
#[derive(Debug, Clone)]
pub struct DumpThreadList<'a> {
    /// Threads in the order the dump records them.
    pub threads: Vec<DumpThread<'a>>,
    thread_ids: HashMap<u32, usize>,
}

impl<'a> DumpThreadList<'a> {
    /// The thread with the given id.
    pub fn get_thread(&self, thread_id: u32) -> Option<&DumpThread<'a>> {
        self.thread_ids.get(&thread_id).map(|&i| &self.threads[i])
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Writes a human-readable description of the list.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        write!(
            f,
            "DumpThreadList
  thread_count = {}

",
            self.threads.len()
        )?;
        for (i, thread) in self.threads.iter().enumerate() {
            writeln!(f, "thread[{}]", i)?;
            thread.print(f)?;
        }
        Ok(())
    }
}

impl<'a> DumpStream<'a> for DumpThreadList<'a> {
    const STREAM_TYPE: md::MINIDUMP_STREAM_TYPE = md::MINIDUMP_STREAM_TYPE::ThreadListStream;

    fn read(
        bytes: &'a [u8],
        all: &'a [u8],
        endian: Endian,
        system_info: Option<&DumpSystemInfo>,
    ) -> Result<Self, Error> {
        let mut offset = 0;
        let raw_threads: Vec<md::MINIDUMP_THREAD> = read_stream_list(&mut offset, bytes, endian)?;
        let mut threads = Vec::with_capacity(raw_threads.len());
        let mut thread_ids = HashMap::with_capacity(raw_threads.len());
        for raw in raw_threads {
            thread_ids.insert(raw.thread_id, threads.len());
            // A context or stack that does not decode leaves that field empty; the
            // thread itself is still worth keeping.
            let context = system_info.and_then(|info| {
                let context_bytes = location_slice(all, &raw.thread_context).ok()?;
                DumpContext::read(context_bytes, endian, info.cpu).ok()
            });
            let stack = DumpMemory::read(&raw.stack, all, endian).ok();
            threads.push(DumpThread {
                raw,
                context,
                stack,
            });
        }
        Ok(DumpThreadList {
            threads,
            thread_ids,
        })
    }
}

/// Names assigned to threads, from the thread names stream.
#[derive(Debug, Clone, Default)]
pub struct DumpThreadNames {
    names: HashMap<u32, String>,
}

impl DumpThreadNames {
    /// The name of the thread with the given id.
    pub fn get_name(&self, thread_id: u32) -> Option<&str> {
        self.names.get(&thread_id).map(String::as_str)
    }

    /// Writes a human-readable description of the stream.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        writeln!(f, "DumpThreadNames")?;
        let mut entries: Vec<_> = self.names.iter().collect();
        entries.sort();
        for (thread_id, name) in entries {
            writeln!(f, "  thread {:#x} = \"{}\"", thread_id, name)?;
        }
        writeln!(f)
    }
}

impl<'a> DumpStream<'a> for DumpThreadNames {
    const STREAM_TYPE: md::MINIDUMP_STREAM_TYPE = md::MINIDUMP_STREAM_TYPE::ThreadNamesStream;

    fn read(
        bytes: &'a [u8],
        all: &'a [u8],
        endian: Endian,
        _system_info: Option<&DumpSystemInfo>,
    ) -> Result<Self, Error> {
        let mut offset = 0;
        let raw_names: Vec<md::MINIDUMP_THREAD_NAME> = read_stream_list(&mut offset, bytes, endian)?;
        let mut names = HashMap::with_capacity(raw_names.len());
        for raw in raw_names {
            let name = usize::try_from(raw.thread_name_rva).ok().and_then(|start| {
                let mut name_offset = start;
                read_string_utf16(&mut name_offset, all, endian)
            });
            match name {
                Some(name) => {
                    names.insert(raw.thread_id, name);
                }
                None => {
                    // Drop just this name, not the whole stream.
                    warn!("couldn't read name for thread {:#x}", raw.thread_id);
                }
            }
        }
        Ok(DumpThreadNames { names })
    }
}

/// A normalized, symbolic reason for a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashReason {
    WindowsGeneral(ExceptionCodeWindows),
    WindowsAccessViolation(ExceptionCodeWindowsAccessType),
    /// In-page error with its access type and underlying NTSTATUS.
    WindowsInPageError(ExceptionCodeWindowsInPageErrorType, u64),
    /// Stack buffer overrun with its FAST_FAIL code.
    WindowsStackBufferOverrun(u64),
    /// Anything the tables don't cover, as raw code and flags.
    Unknown(u32, u32),
}

impl CrashReason {
    /// Derives a reason from a Windows exception record, refining the handful of
    /// codes whose parameters carry more detail.
    pub fn from_windows_error(record: &md::MINIDUMP_EXCEPTION) -> CrashReason {
        let info = &record.exception_information;
        let num_params = record.number_parameters as usize;
        match ExceptionCodeWindows::from_u32(record.exception_code) {
            Some(code @ ExceptionCodeWindows::EXCEPTION_ACCESS_VIOLATION) => {
                match ExceptionCodeWindowsAccessType::from_u64(info[0]) {
                    Some(ty) if num_params >= 1 => CrashReason::WindowsAccessViolation(ty),
                    _ => CrashReason::WindowsGeneral(code),
                }
            }
            Some(code @ ExceptionCodeWindows::EXCEPTION_IN_PAGE_ERROR) => {
                match ExceptionCodeWindowsInPageErrorType::from_u64(info[0]) {
                    Some(ty) if num_params >= 3 => CrashReason::WindowsInPageError(ty, info[2]),
                    _ => CrashReason::WindowsGeneral(code),
                }
            }
            Some(ExceptionCodeWindows::STATUS_STACK_BUFFER_OVERRUN) if num_params >= 1 => {
                CrashReason::WindowsStackBufferOverrun(info[0])
            }
            Some(code) => CrashReason::WindowsGeneral(code),
            None => CrashReason::Unknown(record.exception_code, record.exception_flags),
        }
    }
}

impl fmt::Display for CrashReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CrashReason::WindowsGeneral(ExceptionCodeWindows::OUT_OF_MEMORY) => {
                write!(f, "Out of Memory")
            }
            CrashReason::WindowsGeneral(ExceptionCodeWindows::UNHANDLED_CPP_EXCEPTION) => {
                write!(f, "Unhandled C++ Exception")
            }
            CrashReason::WindowsGeneral(ExceptionCodeWindows::SIMULATED) => {
                write!(f, "Simulated Exception")
            }
            CrashReason::WindowsGeneral(code) => write!(f, "{:?}", code),
            CrashReason::WindowsAccessViolation(ty) => {
                write!(f, "EXCEPTION_ACCESS_VIOLATION_{:?}", ty)
            }
            CrashReason::WindowsInPageError(ty, status) => {
                write!(f, "EXCEPTION_IN_PAGE_ERROR_{:?} / {:#010x}", ty, status)
            }
            CrashReason::WindowsStackBufferOverrun(fast_fail) => {
                write!(f, "STATUS_STACK_BUFFER_OVERRUN / FAST_FAIL_{}", fast_fail)
            }
            CrashReason::Unknown(code, flags) => {
                write!(f, "unknown {:#010x} / {:#010x}", code, flags)
            }
        }
    }
}

/// The exception stream, present when the dump recorded a crash.
#[derive(Debug, Clone)]
pub struct DumpException {
    /// The raw stream contents.
    pub raw: md::MINIDUMP_EXCEPTION_STREAM,
    /// The thread the exception was raised on.
    pub thread_id: u32,
    /// CPU context at the point of the exception.
    ///
    /// Prefer this to the faulting thread's own context record, which holds the
    /// state inside the exception handler that wrote the dump.
    pub context: Option<DumpContext>,
}

impl DumpException {
    /// The symbolic reason for the crash.
    pub fn get_crash_reason(&self, os: Os) -> CrashReason {
        let record = &self.raw.exception_record;
        match os {
            Os::Windows => CrashReason::from_windows_error(record),
            _ => CrashReason::Unknown(record.exception_code, record.exception_flags),
        }
    }

    /// The address most useful to report for the crash.
    ///
    /// For access violations and in-page errors this is the address being accessed,
    /// from the exception parameters; for everything else it is the address of the
    /// faulting instruction. 32-bit addresses are zero-extended, never sign-extended.
    pub fn get_crash_address(&self, os: Os, cpu: Cpu) -> u64 {
        let record = &self.raw.exception_record;
        let addr = match (os, ExceptionCodeWindows::from_u32(record.exception_code)) {
            (Os::Windows, Some(ExceptionCodeWindows::EXCEPTION_ACCESS_VIOLATION))
            | (Os::Windows, Some(ExceptionCodeWindows::EXCEPTION_IN_PAGE_ERROR))
                if record.number_parameters >= 2 =>
            {
                record.exception_information[1]
            }
            _ => record.exception_address,
        };
        if cpu.pointer_width() == Some(4) {
            addr as u32 as u64
        } else {
            addr
        }
    }

    /// Writes a human-readable description of the stream.
    pub fn print<W: Write>(&self, f: &mut W) -> io::Result<()> {
        let record = &self.raw.exception_record;
        write!(
            f,
            "MINIDUMP_EXCEPTION
  thread_id         = {:#x}
  exception_code    = {:#x}
  exception_flags   = {:#x}
  exception_address = {:#x}
  number_parameters = {}

",
            self.thread_id,
            record.exception_code,
            record.exception_flags,
            record.exception_address,
            record.number_parameters,
        )?;
        if let Some(ref ctx) = self.context {
            ctx.print(f)?;
        }
        Ok(())
    }
}

impl<'a> DumpStream<'a> for DumpException {
    const STREAM_TYPE: md::MINIDUMP_STREAM_TYPE = md::MINIDUMP_STREAM_TYPE::ExceptionStream;

    fn read(
        bytes: &'a [u8],
        all: &'a [u8],
        endian: Endian,
        system_info: Option<&DumpSystemInfo>,
    ) -> Result<Self, Error> {
        let raw: md::MINIDUMP_EXCEPTION_STREAM = bytes
            .pread_with(0, endian)
            .or(Err(Error::StreamReadFailure))?;
        let thread_id = raw.thread_id;
        let context = system_info.and_then(|info| {
            let context_bytes = location_slice(all, &raw.thread_context).ok()?;
            DumpContext::read(context_bytes, endian, info.cpu).ok()
        });
        Ok(DumpException {
            raw,
            thread_id,
            context,
        })
    }
}
