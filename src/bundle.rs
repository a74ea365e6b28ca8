//! Support for clang offload bundles.
//!
//! An offload bundle concatenates the device code objects built for a
//! number of targets. It starts with a fixed magic string, followed by
//! the number of entries and a directory of variable sized entry
//! descriptions. All integers are little endian.
//!
//! ```text
//! "__CLANG_OFFLOAD_BUNDLE__"     magic (24 bytes)
//! u64                            number of entries
//! { u64 offset, u64 size, u64 triple_len, [u8; triple_len] triple }...
//! ```
//!
//! Because each entry's position depends on the length of the previous
//! entry's triple, entries can only be visited in order.

use std::borrow::Cow;

use crate::log::debug;
use crate::log::trace;
use crate::util::ReadRaw as _;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Result;


/// The magic string every offload bundle starts with.
pub const BUNDLE_MAGIC: &[u8] = b"__CLANG_OFFLOAD_BUNDLE__";

/// Target triple prefixes accepted by default.
pub const DEFAULT_TARGETS: [&str; 2] = ["hip-amdgcn-amd-amdhsa", "hcc-amdgcn-amd-amdhsa-"];


/// Check whether the provided data is an offload bundle.
#[inline]
pub fn is_bundle(data: &[u8]) -> bool {
    data.starts_with(BUNDLE_MAGIC)
}


/// A single code object description inside an offload bundle.
#[derive(Clone, Debug, PartialEq)]
pub struct BundleEntry<'data> {
    /// The target triple the code object was built for.
    pub triple: Cow<'data, str>,
    /// The offset of the code object from the beginning of the bundle.
    pub offset: u64,
    /// The size of the code object, in bytes.
    pub size: u64,
    /// The code object's data.
    pub data: &'data [u8],
}


/// An iterator over the entries of an offload bundle.
#[derive(Debug)]
pub struct BundleEntryIter<'data> {
    /// The complete bundle data.
    bundle_data: &'data [u8],
    /// Read pointer into the entry directory.
    ///
    /// This read pointer will be advanced as entries are read.
    entry_data: &'data [u8],
    /// The number of remaining entries.
    remaining_entries: u64,
}

impl<'data> BundleEntryIter<'data> {
    /// Create an iterator over the entries of the bundle in `data`.
    ///
    /// The function fails if `data` does not start with
    /// [`BUNDLE_MAGIC`] or if the entry count cannot be read.
    pub fn new(data: &'data [u8]) -> Result<Self> {
        let mut entry_data = data
            .strip_prefix(BUNDLE_MAGIC)
            .ok_or_header_invalid(|| "data does not contain offload bundle magic")?;
        let remaining_entries = entry_data
            .read_u64_le()
            .ok_or_truncated(|| "failed to read offload bundle entry count")?;

        let slf = Self {
            bundle_data: data,
            entry_data,
            remaining_entries,
        };
        Ok(slf)
    }

    fn parse_next_entry(&mut self) -> Result<BundleEntry<'data>> {
        let offset = self
            .entry_data
            .read_u64_le()
            .ok_or_truncated(|| "failed to read bundle entry offset")?;
        let size = self
            .entry_data
            .read_u64_le()
            .ok_or_truncated(|| "failed to read bundle entry size")?;
        let triple_len = self
            .entry_data
            .read_u64_le()
            .ok_or_truncated(|| "failed to read bundle entry triple length")?;
        let triple = usize::try_from(triple_len)
            .ok()
            .and_then(|len| self.entry_data.read_slice(len))
            .ok_or_truncated(|| format!("bundle entry triple of {triple_len} bytes is truncated"))?;
        let triple = String::from_utf8_lossy(triple);

        let data = usize::try_from(offset)
            .ok()
            .zip(usize::try_from(size).ok())
            .and_then(|(offset, size)| {
                let end = offset.checked_add(size)?;
                self.bundle_data.get(offset..end)
            })
            .ok_or_truncated(|| {
                format!(
                    "bundle entry for {triple} ({offset:#x}, {size} bytes) exceeds bundle of {} bytes",
                    self.bundle_data.len()
                )
            })?;

        let entry = BundleEntry {
            triple,
            offset,
            size,
            data,
        };
        Ok(entry)
    }
}

impl<'data> Iterator for BundleEntryIter<'data> {
    type Item = Result<BundleEntry<'data>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.remaining_entries = self.remaining_entries.checked_sub(1)?;
        let result = self.parse_next_entry();
        if result.is_err() {
            // A corrupted directory makes all subsequent entries
            // unreachable.
            self.remaining_entries = 0;
        }
        Some(result)
    }
}


/// Find the offset of the code object for one of the given `targets`
/// in `data`.
///
/// A target matches an entry if the entry's triple starts with it. If
/// `data` is not an offload bundle, or if no entry matches, `0` is
/// returned, meaning that the data is to be treated as a bare code
/// object.
pub fn find_code_object<T>(data: &[u8], targets: &[T]) -> Result<u64>
where
    T: AsRef<str>,
{
    if !is_bundle(data) {
        return Ok(0)
    }

    for entry in BundleEntryIter::new(data)? {
        let entry = entry.context("failed to read offload bundle directory")?;
        trace!(
            "bundle entry {} at {:#x} ({} bytes)",
            entry.triple,
            entry.offset,
            entry.size
        );

        if targets
            .iter()
            .any(|target| entry.triple.starts_with(target.as_ref()))
        {
            debug!(
                "using code object for {} at offset {:#x}",
                entry.triple, entry.offset
            );
            return Ok(entry.offset)
        }
    }

    debug!("offload bundle contains no code object for any of the accepted targets");
    Ok(0)
}


#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::test_helper::bundle;
    use crate::ErrorKind;


    /// Check that data without bundle magic is reported at offset 0.
    #[test]
    fn bare_object_fallback() {
        let data = b"\x7fELF\x02\x01\x01";
        assert!(!is_bundle(data));
        assert_eq!(find_code_object(data, &DEFAULT_TARGETS).unwrap(), 0);
        assert_eq!(find_code_object(&[], &DEFAULT_TARGETS).unwrap(), 0);
    }

    /// Check that we can iterate over the entries of a bundle.
    #[test]
    fn entry_iteration() {
        let data = bundle(&[
            ("host-x86_64-unknown-linux-gnu", b"".as_slice()),
            ("hip-amdgcn-amd-amdhsa--gfx906", b"gfx906".as_slice()),
            ("hip-amdgcn-amd-amdhsa--gfx90a", b"gfx90a!".as_slice()),
        ]);

        let entries = BundleEntryIter::new(&data)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].triple, "host-x86_64-unknown-linux-gnu");
        assert_eq!(entries[0].size, 0);
        assert_eq!(entries[1].triple, "hip-amdgcn-amd-amdhsa--gfx906");
        assert_eq!(entries[1].data, b"gfx906");
        assert_eq!(entries[2].data, b"gfx90a!");
        assert_eq!(entries[2].size, 7);
    }

    /// Make sure that the first accepted target wins.
    #[test]
    fn target_selection() {
        let data = bundle(&[
            ("host-x86_64-unknown-linux-gnu", b"".as_slice()),
            ("hip-amdgcn-amd-amdhsa--gfx906", b"gfx906".as_slice()),
            ("hip-amdgcn-amd-amdhsa--gfx90a", b"gfx90a".as_slice()),
        ]);

        let offset = find_code_object(&data, &DEFAULT_TARGETS).unwrap();
        let entry = BundleEntryIter::new(&data).unwrap().nth(1).unwrap().unwrap();
        assert_eq!(offset, entry.offset);
        assert_ne!(offset, 0);

        let offset = find_code_object(&data, &["hip-amdgcn-amd-amdhsa--gfx90a"]).unwrap();
        let entry = BundleEntryIter::new(&data).unwrap().nth(2).unwrap().unwrap();
        assert_eq!(offset, entry.offset);
    }

    /// Check that an unrecognized triple leads to offset 0.
    #[test]
    fn no_matching_target() {
        let data = bundle(&[("host-x86_64-unknown-linux-gnu", b"host".as_slice())]);
        let offset = find_code_object(&data, &DEFAULT_TARGETS).unwrap();
        assert_eq!(offset, 0);
    }

    /// Make sure that we detect truncated bundle directories.
    #[test]
    fn truncated_directory() {
        let data = bundle(&[("hip-amdgcn-amd-amdhsa--gfx906", b"gfx906".as_slice())]);

        // Cut inside of the entry count.
        let err = find_code_object(&data[..BUNDLE_MAGIC.len() + 4], &DEFAULT_TARGETS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated, "{err:#}");

        // Cut inside of the triple.
        let err = find_code_object(&data[..BUNDLE_MAGIC.len() + 8 + 24 + 3], &DEFAULT_TARGETS)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated, "{err:#}");
    }

    /// Check that entries pointing outside of the bundle are rejected.
    #[test]
    fn entry_out_of_bounds() {
        let mut data = BUNDLE_MAGIC.to_vec();
        let () = data.extend_from_slice(&1u64.to_le_bytes());
        let () = data.extend_from_slice(&0x1000u64.to_le_bytes());
        let () = data.extend_from_slice(&u64::MAX.to_le_bytes());
        let triple = b"hip-amdgcn-amd-amdhsa--gfx906";
        let () = data.extend_from_slice(&(triple.len() as u64).to_le_bytes());
        let () = data.extend_from_slice(triple);

        let err = find_code_object(&data, &DEFAULT_TARGETS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated, "{err:#}");

        // A bogus entry count must not lead to more than one error.
        let mut iter = BundleEntryIter::new(&data).unwrap();
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }
}
