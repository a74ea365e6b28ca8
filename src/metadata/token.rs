//! Tokenization of the kernel metadata stream.
//!
//! The metadata are a MessagePack document, but we do not deserialize
//! it generically. Instead, keys are located by searching for their
//! encoded form (a `fixstr` header followed by the key text) and the
//! value directly following a key is decoded in place.

use std::str;

use crate::util::ReadRaw as _;
use crate::Error;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Result;


/// Tag of a MessagePack `uint 8`.
const TAG_U8: u8 = 0xcc;
/// Tag of a MessagePack `uint 16`.
const TAG_U16: u8 = 0xcd;
/// Tag of a MessagePack `uint 32`.
const TAG_U32: u8 = 0xce;
/// Tag of a MessagePack `uint 64`.
const TAG_U64: u8 = 0xcf;
/// Tag of a MessagePack `str 8`.
const TAG_STR8: u8 = 0xd9;
/// Tag of a MessagePack `str 16`.
const TAG_STR16: u8 = 0xda;
/// Tag of a MessagePack `str 32`.
const TAG_STR32: u8 = 0xdb;
/// Base value of a MessagePack `fixstr` tag.
const TAG_FIXSTR: u8 = 0xa0;
/// Mask of the length bits of a `fixstr` tag.
const FIXSTR_LEN_MASK: u8 = 0x1f;


/// A metadata map key we are interested in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Key {
    /// The argument list of a kernel.
    Args,
    /// The offset of an argument.
    Offset,
    /// The size of an argument.
    Size,
    /// The semantic kind of an argument.
    ValueKind,
    GroupSegmentFixedSize,
    KernargSegmentAlign,
    KernargSegmentSize,
    PrivateSegmentFixedSize,
    SgprCount,
    /// The kernel descriptor symbol of a kernel.
    Symbol,
    VgprCount,
    /// The last key of each kernel map.
    WavefrontSize,
    /// The schema version; follows all kernels.
    Version,
}

impl Key {
    /// Retrieve the key's text.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Args => ".args",
            Self::Offset => ".offset",
            Self::Size => ".size",
            Self::ValueKind => ".value_kind",
            Self::GroupSegmentFixedSize => ".group_segment_fixed_size",
            Self::KernargSegmentAlign => ".kernarg_segment_align",
            Self::KernargSegmentSize => ".kernarg_segment_size",
            Self::PrivateSegmentFixedSize => ".private_segment_fixed_size",
            Self::SgprCount => ".sgpr_count",
            Self::Symbol => ".symbol",
            Self::VgprCount => ".vgpr_count",
            Self::WavefrontSize => ".wavefront_size",
            Self::Version => "amdhsa.version",
        }
    }

    /// The length of the key's encoded form.
    #[inline]
    fn encoded_len(&self) -> usize {
        1 + self.name().len()
    }

    /// The `fixstr` tag preceding the key's text.
    #[inline]
    fn tag(&self) -> u8 {
        // All our keys are shorter than 32 bytes.
        debug_assert!(self.name().len() <= usize::from(FIXSTR_LEN_MASK));
        TAG_FIXSTR | self.name().len() as u8
    }
}


/// Decode a packed unsigned integer, advancing `data` past it.
///
/// A leading byte with the high bit clear is the value itself.
/// Otherwise it is a tag announcing the width of the magnitude that
/// follows, which is stored least significant byte first.
pub(crate) fn decode_uint(data: &mut &[u8]) -> Result<u64> {
    let tag = data
        .read_u8()
        .ok_or_truncated(|| "packed integer is truncated")?;
    if tag & 0x80 == 0 {
        return Ok(u64::from(tag))
    }

    let width = match tag {
        TAG_U8 => 1,
        TAG_U16 => 2,
        TAG_U32 => 4,
        TAG_U64 => 8,
        _ => {
            return Err(Error::with_invalid_field(format!(
                "encountered unexpected integer tag {tag:#04x}"
            )))
        }
    };

    let bytes = data
        .read_slice(width)
        .ok_or_truncated(|| format!("packed integer of {width} bytes is truncated"))?;
    let value = bytes
        .iter()
        .rev()
        .fold(0u64, |value, byte| (value << 8) | u64::from(*byte));
    Ok(value)
}

/// Decode a text token, advancing `data` past it.
///
/// Lengths wider than a byte are stored least significant byte first,
/// just like packed integers.
pub(crate) fn decode_str<'data>(data: &mut &'data [u8]) -> Result<&'data str> {
    let tag = data
        .read_u8()
        .ok_or_truncated(|| "text token is truncated")?;
    let len = match tag {
        TAG_FIXSTR..=0xbf => usize::from(tag & FIXSTR_LEN_MASK),
        TAG_STR8 => usize::from(
            data.read_u8()
                .ok_or_truncated(|| "text token length is truncated")?,
        ),
        TAG_STR16 => usize::from(u16::from_le(
            data.read_pod::<u16>()
                .ok_or_truncated(|| "text token length is truncated")?,
        )),
        TAG_STR32 => {
            let len = u32::from_le(
                data.read_pod::<u32>()
                    .ok_or_truncated(|| "text token length is truncated")?,
            );
            usize::try_from(len)
                .ok()
                .ok_or_truncated(|| format!("text token of {len} bytes is truncated"))?
        }
        _ => {
            return Err(Error::with_invalid_field(format!(
                "encountered unexpected string tag {tag:#04x}"
            )))
        }
    };

    let bytes = data
        .read_slice(len)
        .ok_or_truncated(|| format!("text token of {len} bytes is truncated"))?;
    str::from_utf8(bytes)
        .ok()
        .ok_or_invalid_field(|| "text token is not valid UTF-8")
}


/// A cursor over the metadata stream yielding the values following
/// keys.
///
/// All searches are bounded by an explicit end position, which itself
/// is clamped to the stream. Decoded values may extend up to the end
/// of the stream, but never past it.
#[derive(Debug)]
pub(crate) struct Tokenizer<'data> {
    data: &'data [u8],
    pos: usize,
}

impl<'data> Tokenizer<'data> {
    pub fn new(data: &'data [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Find the position of the next occurrence of `key` that fully
    /// lies before `end`, without advancing.
    pub fn find(&self, key: Key, end: usize) -> Option<usize> {
        let end = end.min(self.data.len());
        let tag = key.tag();
        let name = key.name().as_bytes();
        let last = end.checked_sub(key.encoded_len())?;

        (self.pos..=last).find(|&idx| {
            self.data[idx] == tag && self.data[idx + 1..idx + key.encoded_len()] == *name
        })
    }

    /// Advance past the next occurrence of `key` before `end`.
    ///
    /// Returns `false` and leaves the position untouched if the key
    /// was not found.
    pub fn seek(&mut self, key: Key, end: usize) -> bool {
        if let Some(idx) = self.find(key, end) {
            self.pos = idx + key.encoded_len();
            true
        } else {
            false
        }
    }

    /// Decode a packed integer at the current position.
    pub fn uint(&mut self) -> Result<u64> {
        // SANITY: `pos` is always kept within `data`.
        let mut data = &self.data[self.pos..];
        let value = decode_uint(&mut data)?;
        self.pos = self.data.len() - data.len();
        Ok(value)
    }

    /// Decode a text token at the current position.
    pub fn text(&mut self) -> Result<&'data str> {
        let mut data = &self.data[self.pos..];
        let value = decode_str(&mut data)?;
        self.pos = self.data.len() - data.len();
        Ok(value)
    }

    /// Decode the packed integer following the next `key` before
    /// `end`, if the key is present.
    pub fn opt_uint_field(&mut self, key: Key, end: usize) -> Result<Option<u64>> {
        if !self.seek(key, end) {
            return Ok(None)
        }
        self.uint()
            .with_context(|| format!("failed to decode value of {}", key.name()))
            .map(Some)
    }

    /// Decode the packed integer following the next `key` before `end`.
    pub fn uint_field(&mut self, key: Key, end: usize) -> Result<u64> {
        self.opt_uint_field(key, end)?
            .ok_or_else(|| Error::with_field_missing(key.name()))
    }

    /// Decode the text token following the next `key` before `end`.
    pub fn text_field(&mut self, key: Key, end: usize) -> Result<&'data str> {
        if !self.seek(key, end) {
            return Err(Error::with_field_missing(key.name()))
        }
        self.text()
            .with_context(|| format!("failed to decode value of {}", key.name()))
    }
}
