//! Types describing the kernels of a code object.

mod symbols;

#[cfg(feature = "demangle")]
use std::borrow::Cow;

pub(crate) use symbols::extract_kernels;
pub(crate) use symbols::DESCRIPTOR_SUFFIX;

use crate::Addr;


/// The semantic kind of a kernel argument.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArgKind {
    /// An argument passed by value.
    ValueObject,
    /// A pointer to global, shared, or pipe memory.
    MemoryObject,
    /// An image handle.
    ImageObject,
    /// A sampler handle.
    SamplerObject,
    /// A device queue handle.
    QueueObject,
    /// A reference to an object passed by reference.
    ReferenceObject,
    /// A hidden argument that is not used by the kernel.
    HiddenNone,
    /// The hidden X component of the global offset.
    HiddenGlobalOffsetX,
    /// The hidden Y component of the global offset.
    HiddenGlobalOffsetY,
    /// The hidden Z component of the global offset.
    HiddenGlobalOffsetZ,
    /// The hidden pointer to the printf buffer.
    HiddenPrintfBuffer,
    /// The hidden default device queue.
    HiddenDefaultQueue,
    /// The hidden completion action for device enqueue.
    HiddenCompletionAction,
    /// The hidden multi-grid synchronization argument.
    HiddenMultiGridSync,
    /// The hidden host call buffer.
    HiddenHostcallBuffer,
}

/// Mapping of `.value_kind` texts to argument kinds.
pub const ARG_VALUE_KINDS: [(&str, ArgKind); 16] = [
    ("by_value", ArgKind::ValueObject),
    ("global_buffer", ArgKind::MemoryObject),
    ("dynamic_shared_pointer", ArgKind::MemoryObject),
    ("sampler", ArgKind::SamplerObject),
    ("image", ArgKind::ImageObject),
    ("pipe", ArgKind::MemoryObject),
    ("queue", ArgKind::QueueObject),
    ("hidden_global_offset_x", ArgKind::HiddenGlobalOffsetX),
    ("hidden_global_offset_y", ArgKind::HiddenGlobalOffsetY),
    ("hidden_global_offset_z", ArgKind::HiddenGlobalOffsetZ),
    ("hidden_none", ArgKind::HiddenNone),
    ("hidden_printf_buffer", ArgKind::HiddenPrintfBuffer),
    ("hidden_default_queue", ArgKind::HiddenDefaultQueue),
    ("hidden_completion_action", ArgKind::HiddenCompletionAction),
    ("hidden_multigrid_sync_arg", ArgKind::HiddenMultiGridSync),
    ("hidden_hostcall_buffer", ArgKind::HiddenHostcallBuffer),
];

impl ArgKind {
    /// Look up the argument kind for a `.value_kind` text.
    pub fn from_value_kind(text: &str) -> Option<Self> {
        ARG_VALUE_KINDS
            .iter()
            .find_map(|(name, kind)| (*name == text).then_some(*kind))
    }

    /// Check whether the argument is injected by the runtime rather
    /// than provided by the caller.
    pub fn is_hidden(&self) -> bool {
        matches!(
            self,
            Self::HiddenNone
                | Self::HiddenGlobalOffsetX
                | Self::HiddenGlobalOffsetY
                | Self::HiddenGlobalOffsetZ
                | Self::HiddenPrintfBuffer
                | Self::HiddenDefaultQueue
                | Self::HiddenCompletionAction
                | Self::HiddenMultiGridSync
                | Self::HiddenHostcallBuffer
        )
    }
}


/// The description of a single kernel argument.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArgDesc {
    /// The offset of the argument within the kernarg segment.
    pub offset: u64,
    /// The size of the argument, in bytes.
    pub size: u64,
    /// The argument's semantic kind.
    pub kind: ArgKind,
}


/// Metadata about a kernel, as decoded from the note section.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KernelMetadata {
    /// The required alignment of the kernarg segment.
    pub kernarg_segment_align: u32,
    /// The size of the kernarg segment.
    pub kernarg_segment_size: u32,
    /// The amount of group (local) memory statically used.
    pub group_segment_size: u32,
    /// The amount of private (scratch) memory statically used per
    /// work item, if reported.
    pub private_segment_size: Option<u32>,
    /// The number of vector registers used.
    pub vgpr_count: u32,
    /// The number of scalar registers used, if reported.
    pub sgpr_count: Option<u32>,
    /// The wavefront size the kernel was compiled for.
    pub wavefront_size: u32,
    /// The kernel's arguments, in declaration order.
    pub args: Vec<ArgDesc>,
}


/// Information about a single kernel.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KernelRecord {
    /// The offset of the code object inside of the bundle containing
    /// it, or `0` for a bare code object.
    pub bundle_offset: u64,
    /// The address of the kernel's machine code.
    pub code_addr: Addr,
    /// The size of the kernel's machine code.
    pub code_size: u64,
    /// The address of the kernel descriptor.
    pub desc_addr: Addr,
    /// The size of the kernel descriptor.
    pub desc_size: u64,
    /// The kernel's metadata.
    pub metadata: Option<KernelMetadata>,
}


/// Demangle a kernel name.
///
/// Names that are not mangled are returned as-is.
#[cfg(feature = "demangle")]
#[cfg_attr(docsrs, doc(cfg(feature = "demangle")))]
pub fn demangled_name(name: &str) -> Cow<'_, str> {
    use cpp_demangle::DemangleOptions;
    use cpp_demangle::Symbol;

    Symbol::new(name)
        .ok()
        .and_then(|symbol| symbol.demangle(&DemangleOptions::default()).ok())
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed(name))
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;


    /// Check that each entry of the kind table maps to its kind.
    #[test]
    fn value_kind_table() {
        for (text, kind) in ARG_VALUE_KINDS {
            assert_eq!(ArgKind::from_value_kind(text), Some(kind), "{text}");
        }

        assert_eq!(
            ArgKind::from_value_kind("global_buffer"),
            Some(ArgKind::MemoryObject)
        );
        assert_eq!(
            ArgKind::from_value_kind("by_value"),
            Some(ArgKind::ValueObject)
        );
        assert_eq!(
            ArgKind::from_value_kind("hidden_multigrid_sync_arg"),
            Some(ArgKind::HiddenMultiGridSync)
        );
    }

    /// Make sure that texts outside of the table are not mapped.
    #[test]
    fn unknown_value_kinds() {
        let texts = ARG_VALUE_KINDS
            .iter()
            .map(|(text, _kind)| *text)
            .collect::<HashSet<_>>();
        assert_eq!(texts.len(), ARG_VALUE_KINDS.len());

        for text in ["", "hidden_heap_v1", "by_value ", "Global_Buffer", "hidden"] {
            assert_eq!(ArgKind::from_value_kind(text), None, "{text}");
        }
    }

    /// Check hidden argument classification.
    #[test]
    fn hidden_args() {
        assert!(!ArgKind::ValueObject.is_hidden());
        assert!(!ArgKind::MemoryObject.is_hidden());
        assert!(ArgKind::HiddenHostcallBuffer.is_hidden());
        assert!(ArgKind::HiddenGlobalOffsetY.is_hidden());
    }

    /// Check that we can demangle kernel names.
    #[cfg(feature = "demangle")]
    #[test]
    fn demangling() {
        assert_eq!(
            demangled_name("_Z9vectorAddPKiS0_Pii"),
            "vectorAdd(int const*, int const*, int*, int)"
        );
        assert_eq!(demangled_name("vectorAdd"), "vectorAdd");
    }
}
