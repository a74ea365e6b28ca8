use std::collections::BTreeMap;

use crate::elf::ElfIndex;
use crate::elf::SymbolBind;
use crate::elf::SymbolType;
use crate::log::trace;
use crate::Error;
use crate::ErrorExt as _;
use crate::Result;

use super::KernelRecord;


/// The suffix of kernel descriptor symbol names.
pub(crate) const DESCRIPTOR_SUFFIX: &str = ".kd";


/// Build the kernel skeleton map from the global symbols of an object.
///
/// Global functions provide a kernel's code location, global data
/// objects named `<kernel>.kd` its descriptor. Any other global data
/// object is reported as [`ErrorKind::MalformedDescriptorName`][crate::ErrorKind::MalformedDescriptorName].
pub(crate) fn extract_kernels(
    index: &ElfIndex<'_>,
    bundle_offset: u64,
) -> Result<BTreeMap<String, KernelRecord>> {
    let mut kernels = BTreeMap::<String, KernelRecord>::new();

    for sym in index.symbols()? {
        let sym = sym.context("failed to read symbol table")?;
        if sym.bind != SymbolBind::Global {
            continue
        }

        match sym.type_ {
            SymbolType::Function => {
                trace!("kernel code {} at {:#x} ({} bytes)", sym.name, sym.value, sym.size);
                let record = kernels.entry(sym.name.to_string()).or_default();
                record.bundle_offset = bundle_offset;
                record.code_addr = sym.value;
                record.code_size = sym.size;
            }
            SymbolType::Object => {
                let name = sym
                    .name
                    .strip_suffix(DESCRIPTOR_SUFFIX)
                    .ok_or_else(|| Error::with_malformed_descriptor_name(sym.name.to_string()))
                    .context("global data object is not a kernel descriptor")?;
                trace!("kernel descriptor {} at {:#x} ({} bytes)", sym.name, sym.value, sym.size);
                let record = kernels.entry(name.to_string()).or_default();
                record.bundle_offset = bundle_offset;
                record.desc_addr = sym.value;
                record.desc_size = sym.size;
            }
            SymbolType::Other(..) => (),
        }
    }

    Ok(kernels)
}


#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    use crate::test_helper::ElfBuilder;
    use crate::ErrorKind;


    /// Check that code and descriptor symbols are merged by kernel name.
    #[test]
    fn code_and_descriptor() {
        let elf = ElfBuilder::new()
            .func("vectorAdd", 0x1000, 596)
            .object("vectorAdd.kd", 0xb80, 64)
            .build();
        let index = ElfIndex::open(&elf, 0).unwrap();
        let kernels = extract_kernels(&index, 0x1000).unwrap();

        assert_eq!(kernels.len(), 1);
        let record = kernels.get("vectorAdd").unwrap();
        assert_eq!(
            record,
            &KernelRecord {
                bundle_offset: 0x1000,
                code_addr: 0x1000,
                code_size: 596,
                desc_addr: 0xb80,
                desc_size: 64,
                metadata: None,
            }
        );
    }

    /// Make sure that local and weak symbols are ignored.
    #[test]
    fn non_global_symbols() {
        let elf = ElfBuilder::new()
            .local_func("helper", 0x2000, 32)
            .symbol("weak", 2, 2, 0x3000, 8)
            .symbol("local_data", 0, 1, 0x4000, 8)
            .symbol("section", 1, 3, 0x0, 0)
            .build();
        let index = ElfIndex::open(&elf, 0).unwrap();
        let kernels = extract_kernels(&index, 0).unwrap();
        assert!(kernels.is_empty(), "{kernels:?}");
    }

    /// Check that global data objects need the descriptor suffix.
    #[test]
    fn malformed_descriptor_name() {
        let elf = ElfBuilder::new()
            .func("vectorAdd", 0x1000, 596)
            .object("vectorAdd.descriptor", 0xb80, 64)
            .build();
        let index = ElfIndex::open(&elf, 0).unwrap();
        let err = extract_kernels(&index, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedDescriptorName);
        assert_eq!(err.detail(), Some("vectorAdd.descriptor"));
    }

    /// Check that the descriptor is recorded even without code symbol.
    #[test]
    fn descriptor_only() {
        let elf = ElfBuilder::new().object("foo.kd", 0x40, 64).build();
        let index = ElfIndex::open(&elf, 0).unwrap();
        let kernels = extract_kernels(&index, 0).unwrap();
        let record = kernels.get("foo").unwrap();
        assert_eq!(record.desc_addr, 0x40);
        assert_eq!(record.code_addr, 0);
        assert!(!kernels.contains_key("foo.kd"));
    }
}
