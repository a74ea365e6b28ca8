//! Decoding of the AMDGPU kernel metadata note.
//!
//! The note carries a MessagePack document with one map per kernel.
//! Rather than deserializing the document as a whole, we anchor on the
//! keys we care about and decode the values following them. Within a
//! kernel's map, keys are emitted in sorted order, which is the order
//! in which we look for them.

mod token;

use std::collections::BTreeMap;

use crate::kernel::ArgDesc;
use crate::kernel::ArgKind;
use crate::kernel::KernelMetadata;
use crate::kernel::DESCRIPTOR_SUFFIX;
use crate::log::debug;
use crate::log::trace;
use crate::util::find_subslice;
use crate::Error;
use crate::ErrorExt as _;
use crate::Result;

use self::token::Key;
use self::token::Tokenizer;


/// The vendor name preceding the metadata document.
pub const VENDOR_MARKER: &str = "AMDGPU";


/// Limits applied while decoding metadata.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Limits {
    /// The maximum size of the note section, in bytes.
    pub max_note_size: usize,
    /// The maximum number of arguments a single kernel may have.
    pub max_kernel_args: usize,
}


fn to_u32(value: u64, key: Key) -> Result<u32> {
    u32::try_from(value).map_err(|_err| {
        Error::with_invalid_field(format!(
            "value {value} of {} does not fit into 32 bit",
            key.name()
        ))
    })
}

fn uint32_field(tokenizer: &mut Tokenizer<'_>, key: Key, end: usize) -> Result<u32> {
    tokenizer
        .uint_field(key, end)
        .and_then(|value| to_u32(value, key))
}

fn opt_uint32_field(tokenizer: &mut Tokenizer<'_>, key: Key, end: usize) -> Result<Option<u32>> {
    tokenizer
        .opt_uint_field(key, end)?
        .map(|value| to_u32(value, key))
        .transpose()
}


/// Decode the arguments of the kernel whose map ends at `end`.
fn decode_args(tokenizer: &mut Tokenizer<'_>, end: usize, limits: &Limits) -> Result<Vec<ArgDesc>> {
    let mut args = Vec::new();

    while tokenizer.seek(Key::Offset, end) {
        if args.len() >= limits.max_kernel_args {
            return Err(Error::with_limit_exceeded(format!(
                "kernel has more than {} arguments",
                limits.max_kernel_args
            )))
        }

        let offset = tokenizer
            .uint()
            .with_context(|| format!("failed to decode offset of argument {}", args.len()))?;
        let size = tokenizer.uint_field(Key::Size, end)?;
        let text = tokenizer.text_field(Key::ValueKind, end)?;
        let kind = ArgKind::from_value_kind(text)
            .ok_or_else(|| Error::with_unknown_argument_kind(text.to_string()))?;
        trace!("argument {}: {kind:?} at {offset:#x} ({size} bytes)", args.len());

        let () = args.push(ArgDesc { offset, size, kind });
    }
    Ok(args)
}

/// Decode the remainder of a kernel's map, following its arguments,
/// up to `end`, the position of the `.wavefront_size` key.
fn decode_kernel<'data>(
    tokenizer: &mut Tokenizer<'data>,
    end: usize,
    limits: &Limits,
) -> Result<(&'data str, KernelMetadata)> {
    let args = decode_args(tokenizer, end, limits)?;
    let group_segment_size = uint32_field(tokenizer, Key::GroupSegmentFixedSize, end)?;
    let kernarg_segment_align = uint32_field(tokenizer, Key::KernargSegmentAlign, end)?;
    let kernarg_segment_size = uint32_field(tokenizer, Key::KernargSegmentSize, end)?;
    let private_segment_size = opt_uint32_field(tokenizer, Key::PrivateSegmentFixedSize, end)?;
    let sgpr_count = opt_uint32_field(tokenizer, Key::SgprCount, end)?;

    let symbol = tokenizer.text_field(Key::Symbol, end)?;
    let name = symbol
        .strip_suffix(DESCRIPTOR_SUFFIX)
        .ok_or_else(|| Error::with_malformed_descriptor_name(symbol.to_string()))?;
    let vgpr_count = uint32_field(tokenizer, Key::VgprCount, end)?;
    // The window ends at the `.wavefront_size` key, so it is found
    // right where we continue.
    let wavefront_size = uint32_field(tokenizer, Key::WavefrontSize, usize::MAX)?;

    let metadata = KernelMetadata {
        kernarg_segment_align,
        kernarg_segment_size,
        group_segment_size,
        private_segment_size,
        vgpr_count,
        sgpr_count,
        wavefront_size,
        args,
    };
    Ok((name, metadata))
}


/// Decode the per-kernel metadata from the contents of the note
/// section.
///
/// `expected` is the number of kernels found in the symbol table. If it
/// is zero, no decoding takes place and the note is not required to be
/// present. Otherwise, exactly `expected` kernels have to be described
/// by the metadata.
#[cfg_attr(feature = "tracing", crate::log::instrument(skip_all, fields(expected)))]
pub(crate) fn decode_metadata(
    note: Option<&[u8]>,
    expected: usize,
    limits: &Limits,
) -> Result<BTreeMap<String, KernelMetadata>> {
    let mut kernels = BTreeMap::new();
    if expected == 0 {
        return Ok(kernels)
    }

    let note = note.ok_or_else(Error::with_note_section_missing)?;
    if note.len() > limits.max_note_size {
        return Err(Error::with_limit_exceeded(format!(
            "note section of {} bytes exceeds maximum of {} bytes",
            note.len(),
            limits.max_note_size
        )))
    }

    let vendor = find_subslice(note, VENDOR_MARKER.as_bytes())
        .ok_or_else(|| Error::with_vendor_marker_not_found(VENDOR_MARKER))?;
    let mut tokenizer = Tokenizer::new(note, vendor + VENDOR_MARKER.len());
    let fence = tokenizer
        .find(Key::Version, note.len())
        .ok_or_else(|| Error::with_schema_version_not_found(Key::Version.name()))?;
    debug!("metadata span {:#x}..{fence:#x}", tokenizer.pos());

    while tokenizer.seek(Key::Args, fence) {
        let idx = kernels.len();
        let end = tokenizer
            .find(Key::WavefrontSize, fence)
            .ok_or_else(|| Error::with_field_missing(Key::WavefrontSize.name()))
            .with_context(|| format!("metadata of kernel {idx} are incomplete"))?;
        let (name, metadata) = decode_kernel(&mut tokenizer, end, limits)
            .with_context(|| format!("failed to decode metadata of kernel {idx}"))?;
        debug!(
            "kernel {name}: {} arguments, kernarg segment of {} bytes",
            metadata.args.len(),
            metadata.kernarg_segment_size
        );

        if kernels.insert(name.to_string(), metadata).is_some() {
            return Err(Error::with_metadata_count_mismatch(format!(
                "kernel {name} is described more than once"
            )))
        }
    }

    if kernels.len() != expected {
        return Err(Error::with_metadata_count_mismatch(format!(
            "found metadata for {} kernels but {expected} kernel symbols",
            kernels.len()
        )))
    }
    Ok(kernels)
}
