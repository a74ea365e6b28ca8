use std::collections::btree_map;
use std::collections::BTreeMap;
use std::ops::Index;

use crate::kernel::KernelMetadata;
use crate::kernel::KernelRecord;
use crate::Error;
use crate::Result;


/// The catalogue of kernels contained in a code object, ordered by
/// kernel name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalog {
    kernels: BTreeMap<String, KernelRecord>,
}

impl Catalog {
    /// Look up a kernel by its (mangled) name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&KernelRecord> {
        self.kernels.get(name)
    }

    /// Iterate over all kernels, in name order.
    #[inline]
    pub fn iter(&self) -> btree_map::Iter<'_, String, KernelRecord> {
        self.kernels.iter()
    }

    /// Retrieve the number of kernels.
    #[inline]
    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    /// Check whether the catalogue contains no kernels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    /// Convert the catalogue into the underlying map.
    #[inline]
    pub fn into_inner(self) -> BTreeMap<String, KernelRecord> {
        self.kernels
    }
}

impl Index<&str> for Catalog {
    type Output = KernelRecord;

    fn index(&self, name: &str) -> &Self::Output {
        &self.kernels[name]
    }
}

impl<'cat> IntoIterator for &'cat Catalog {
    type Item = (&'cat String, &'cat KernelRecord);
    type IntoIter = btree_map::Iter<'cat, String, KernelRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for Catalog {
    type Item = (String, KernelRecord);
    type IntoIter = btree_map::IntoIter<String, KernelRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.kernels.into_iter()
    }
}


/// Attach decoded metadata to the kernels found in the symbol table.
///
/// Both sides have to describe the very same set of kernels.
pub(crate) fn reconcile(
    mut kernels: BTreeMap<String, KernelRecord>,
    metadata: BTreeMap<String, KernelMetadata>,
) -> Result<Catalog> {
    if metadata.len() != kernels.len() {
        return Err(Error::with_metadata_count_mismatch(format!(
            "found metadata for {} kernels but {} kernel symbols",
            metadata.len(),
            kernels.len()
        )))
    }

    for (name, meta) in metadata {
        let record = kernels.get_mut(&name).ok_or_else(|| {
            Error::with_metadata_count_mismatch(format!("metadata describe unknown kernel {name}"))
        })?;
        record.metadata = Some(meta);
    }

    Ok(Catalog { kernels })
}
