use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap as Mapping;
use memmap2::MmapOptions;

use crate::Error;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Result;


/// A read-only memory mapping of an entire file.
///
/// The mapping is released when the object is dropped, on every exit
/// path of the code that created it.
#[derive(Debug)]
pub(crate) struct Mmap {
    /// The actual memory mapping, if any. Empty files are not mapped.
    mapping: Option<Mapping>,
}

impl Mmap {
    /// Memory map the file at the provided `path`.
    pub(crate) fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Self::map(&file).with_context(|| format!("failed to memory map {}", path.display()))
    }

    /// Map the provided file into memory, in its entirety.
    pub(crate) fn map(file: &File) -> Result<Self> {
        let len = usize::try_from(file.metadata()?.len())
            .ok()
            .ok_or_truncated(|| "file is too large to mmap")?;

        // The kernel does not allow mmap'ing a region of size 0. We
        // want to enable this case transparently, though.
        let mapping = if len == 0 {
            None
        } else {
            // SAFETY: The mapping is read-only; concurrent modification
            //         of the file by other processes is outside of our
            //         control, as it is for any reader of the file.
            let mapping = unsafe { MmapOptions::new().len(len).map(file) }.map_err(Error::from)?;
            Some(mapping)
        };
        Ok(Self { mapping })
    }
}

impl Deref for Mmap {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        if let Some(mapping) = &self.mapping {
            mapping.deref()
        } else {
            &[]
        }
    }
}
