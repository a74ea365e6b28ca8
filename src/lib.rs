//! **hipkern** is a library for extracting the catalogue of compute
//! kernels from AMD GPU code objects.
//!
//! Given a code object (an ELF64 file for the `amdgcn` architecture),
//! possibly wrapped inside of a clang offload bundle, it reports for
//! every kernel the location of its machine code and of its kernel
//! descriptor as well as, decoded from the object's metadata note,
//! the layout of its arguments and its resource usage.
//!
//! ```no_run
//! use hipkern::Extractor;
//!
//! # fn main() -> hipkern::Result<()> {
//! let extractor = Extractor::new();
//! let catalog = extractor.extract_file("vector_add.hipfb")?;
//! for (name, kernel) in &catalog {
//!     println!("{name}: code at {:#x} ({} bytes)", kernel.code_addr, kernel.code_size);
//! }
//! # Ok(())
//! # }
//! ```

#![allow(clippy::let_and_return, clippy::let_unit_value)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bundle;
mod catalog;
pub mod elf;
mod error;
mod extractor;
mod kernel;
mod log;
mod metadata;
mod mmap;
#[cfg(any(test, feature = "test"))]
#[doc(hidden)]
pub mod test_helper;
mod util;


pub use crate::catalog::Catalog;
pub use crate::error::Error;
pub use crate::error::ErrorExt;
pub use crate::error::ErrorKind;
pub use crate::error::IntoCowStr;
pub use crate::extractor::Builder;
pub use crate::extractor::Extractor;
pub use crate::extractor::DEFAULT_MAX_KERNEL_ARGS;
pub use crate::extractor::DEFAULT_MAX_NOTE_SIZE;
#[cfg(feature = "demangle")]
#[cfg_attr(docsrs, doc(cfg(feature = "demangle")))]
pub use crate::kernel::demangled_name;
pub use crate::kernel::ArgDesc;
pub use crate::kernel::ArgKind;
pub use crate::kernel::KernelMetadata;
pub use crate::kernel::KernelRecord;
pub use crate::kernel::ARG_VALUE_KINDS;
pub use crate::metadata::VENDOR_MARKER;

pub(crate) use crate::error::IntoError;


/// A type representing addresses.
pub type Addr = u64;

/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;
