use std::path::Path;

use crate::bundle::find_code_object;
use crate::bundle::DEFAULT_TARGETS;
use crate::catalog::reconcile;
use crate::catalog::Catalog;
use crate::elf::ElfIndex;
use crate::kernel::extract_kernels;
use crate::log::debug;
use crate::metadata::decode_metadata;
use crate::metadata::Limits;
use crate::mmap::Mmap;
use crate::ErrorExt as _;
use crate::Result;


/// The default maximum size of the metadata note section.
pub const DEFAULT_MAX_NOTE_SIZE: usize = 64 * 1024 * 1024;
/// The default maximum number of arguments per kernel.
pub const DEFAULT_MAX_KERNEL_ARGS: usize = 1024;


/// A builder for configurable construction of [`Extractor`] objects.
///
/// By default, code objects for the targets in
/// [`DEFAULT_TARGETS`][crate::bundle::DEFAULT_TARGETS] are picked from
/// offload bundles, note sections of up to [`DEFAULT_MAX_NOTE_SIZE`]
/// bytes are decoded, and kernels may have up to
/// [`DEFAULT_MAX_KERNEL_ARGS`] arguments.
#[derive(Clone, Debug)]
pub struct Builder {
    /// See [`Builder::targets`].
    targets: Vec<String>,
    /// See [`Builder::max_note_size`].
    max_note_size: usize,
    /// See [`Builder::max_kernel_args`].
    max_kernel_args: usize,
}

impl Builder {
    /// Set the target triple prefixes to accept when selecting a code
    /// object from an offload bundle.
    ///
    /// The first bundle entry whose triple starts with any of the
    /// prefixes is used.
    pub fn targets<I, S>(mut self, targets: I) -> Builder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(S::into).collect();
        self
    }

    /// Set the maximum size of the metadata note section, in bytes.
    pub fn max_note_size(mut self, size: usize) -> Builder {
        self.max_note_size = size;
        self
    }

    /// Set the maximum number of arguments a single kernel may have.
    pub fn max_kernel_args(mut self, count: usize) -> Builder {
        self.max_kernel_args = count;
        self
    }

    /// Create the [`Extractor`] object.
    pub fn build(self) -> Extractor {
        let Builder {
            targets,
            max_note_size,
            max_kernel_args,
        } = self;

        Extractor {
            targets,
            limits: Limits {
                max_note_size,
                max_kernel_args,
            },
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            targets: DEFAULT_TARGETS.iter().map(|target| target.to_string()).collect(),
            max_note_size: DEFAULT_MAX_NOTE_SIZE,
            max_kernel_args: DEFAULT_MAX_KERNEL_ARGS,
        }
    }
}


/// An object for extracting the kernel catalogue of GPU code objects.
///
/// An extractor carries no mutable state and can be shared freely.
#[derive(Clone, Debug)]
pub struct Extractor {
    targets: Vec<String>,
    limits: Limits,
}

impl Extractor {
    /// Create a new [`Extractor`] with the default configuration.
    #[inline]
    pub fn new() -> Self {
        Builder::default().build()
    }

    /// Retrieve a [`Builder`] object for configurable construction of
    /// an [`Extractor`].
    #[inline]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Extract the kernel catalogue from the code object in `data`.
    ///
    /// `data` may either be a bare code object or a clang offload
    /// bundle containing one for any of the configured targets.
    #[cfg_attr(feature = "tracing", crate::log::instrument(skip_all, fields(len = data.len())))]
    pub fn extract(&self, data: &[u8]) -> Result<Catalog> {
        let offset = find_code_object(data, &self.targets)?;
        let index = ElfIndex::open(data, offset)
            .with_context(|| format!("failed to index code object at offset {offset:#x}"))?;

        let kernels = extract_kernels(&index, offset)?;
        debug!("found {} kernel symbols", kernels.len());

        let note = index.note().map(|view| view.data);
        let metadata = decode_metadata(note, kernels.len(), &self.limits)
            .context("failed to decode kernel metadata")?;
        reconcile(kernels, metadata)
    }

    /// Extract the kernel catalogue from the code object file at `path`.
    ///
    /// The file is memory mapped for the duration of the call.
    #[cfg_attr(feature = "tracing", crate::log::instrument(skip_all, fields(path = ?path.as_ref())))]
    pub fn extract_file<P>(&self, path: P) -> Result<Catalog>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let mmap = Mmap::open(path)?;
        self.extract(&mmap)
            .with_context(|| format!("failed to extract kernels from {}", path.display()))
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}
