use hipkern::test_helper::bundle;
use hipkern::test_helper::code_object;
use hipkern::test_helper::ElfBuilder;
use hipkern::test_helper::KernelDesc;
use hipkern::test_helper::NoteBuilder;
use hipkern::ArgDesc;
use hipkern::ArgKind;
use hipkern::ErrorKind;
use hipkern::Extractor;
use hipkern::KernelMetadata;
use hipkern::KernelRecord;

use test_log::test;

use super::common::temp_file;
use super::common::vector_add_object;


/// Check the catalogue of the `vectorAdd` code object.
#[test]
fn vector_add() {
    let file = temp_file(&vector_add_object());
    let catalog = Extractor::new().extract_file(file.path()).unwrap();

    let expected = KernelRecord {
        bundle_offset: 0,
        code_addr: 0x1000,
        code_size: 596,
        desc_addr: 0xb80,
        desc_size: 64,
        metadata: Some(KernelMetadata {
            kernarg_segment_align: 8,
            kernarg_segment_size: 12,
            group_segment_size: 0,
            private_segment_size: Some(0),
            vgpr_count: 4,
            sgpr_count: Some(16),
            wavefront_size: 64,
            args: vec![
                ArgDesc {
                    offset: 0,
                    size: 8,
                    kind: ArgKind::MemoryObject,
                },
                ArgDesc {
                    offset: 8,
                    size: 4,
                    kind: ArgKind::ValueObject,
                },
            ],
        }),
    };
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.get("vectorAdd"), Some(&expected));
}

/// Check that kernels are reported in name order, each with its own
/// metadata.
#[test]
fn multiple_kernels() {
    let kernels = [
        KernelDesc::new("_Z5scalePfi")
            .arg(0, 8, "global_buffer")
            .arg(8, 4, "by_value")
            .vgpr_count(7),
        KernelDesc::new("_Z4fillPfj")
            .arg(0, 8, "global_buffer")
            .arg(8, 4, "by_value")
            .arg(16, 8, "hidden_global_offset_x")
            .vgpr_count(3),
        KernelDesc::new("_Z4noopv").vgpr_count(0),
    ];
    let data = code_object(&kernels);
    let catalog = Extractor::new().extract(&data).unwrap();

    let names = catalog
        .iter()
        .map(|(name, _kernel)| name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["_Z4fillPfj", "_Z4noopv", "_Z5scalePfi"]);

    for (name, vgprs, args) in [("_Z4fillPfj", 3, 3), ("_Z4noopv", 0, 0), ("_Z5scalePfi", 7, 2)] {
        let metadata = catalog.get(name).unwrap().metadata.as_ref().unwrap();
        assert_eq!(metadata.vgpr_count, vgprs, "{name}");
        assert_eq!(metadata.args.len(), args, "{name}");
    }
}

/// Check that the kernel descriptor symbol is matched to the metadata
/// regardless of the order of kernels in either of them.
#[test]
fn symbol_order_independence() {
    let note = NoteBuilder::new()
        .kernel(KernelDesc::new("b").arg(0, 4, "by_value"))
        .kernel(KernelDesc::new("a").arg(0, 8, "global_buffer"))
        .build();
    let elf = ElfBuilder::new()
        .kernel("a", 0x1000, 16, 0x800)
        .kernel("b", 0x1100, 16, 0x840)
        .note(note)
        .build();

    let catalog = Extractor::new().extract(&elf).unwrap();
    let a = catalog.get("a").unwrap();
    assert_eq!(a.code_addr, 0x1000);
    assert_eq!(
        a.metadata.as_ref().unwrap().args[0].kind,
        ArgKind::MemoryObject
    );
    let b = catalog.get("b").unwrap();
    assert_eq!(b.desc_addr, 0x840);
    assert_eq!(b.metadata.as_ref().unwrap().args[0].kind, ArgKind::ValueObject);
}

/// Check extraction from a multi-target offload bundle.
#[test]
fn bundled_kernels() {
    let gfx906 = code_object(&[KernelDesc::vector_add()]);
    let gfx90a = code_object(&[KernelDesc::vector_add().vgpr_count(128)]);
    let data = bundle(&[
        ("host-x86_64-unknown-linux-gnu", b"".as_slice()),
        ("hip-amdgcn-amd-amdhsa--gfx906", gfx906.as_slice()),
        ("hip-amdgcn-amd-amdhsa--gfx90a", gfx90a.as_slice()),
    ]);
    let file = temp_file(&data);

    let catalog = Extractor::new().extract_file(file.path()).unwrap();
    let kernel = catalog.get("vectorAdd").unwrap();
    assert_eq!(kernel.metadata.as_ref().unwrap().vgpr_count, 4);

    let catalog = Extractor::builder()
        .targets(["hip-amdgcn-amd-amdhsa--gfx90a"])
        .build()
        .extract_file(file.path())
        .unwrap();
    let kernel = catalog.get("vectorAdd").unwrap();
    assert_eq!(kernel.metadata.as_ref().unwrap().vgpr_count, 128);
    assert!(kernel.bundle_offset as usize + gfx90a.len() <= data.len());
}

/// Check that errors of the individual stages surface with their kind.
#[test]
fn error_kinds() {
    let extractor = Extractor::new();

    let err = extractor.extract(b"definitely not a code object").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HeaderInvalid);

    let elf = ElfBuilder::new().func("vectorAdd", 0x1000, 596).build();
    let err = extractor.extract(&elf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoteSectionMissing);

    let elf = ElfBuilder::new()
        .func("vectorAdd", 0x1000, 596)
        .object("vectorAdd_descriptor", 0xb80, 64)
        .build();
    let err = extractor.extract(&elf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedDescriptorName);
    assert_eq!(err.detail(), Some("vectorAdd_descriptor"));

    let note = NoteBuilder::new()
        .kernel(KernelDesc::new("vectorAdd").arg(0, 8, "hidden_heap_v1"))
        .build();
    let elf = ElfBuilder::new()
        .kernel("vectorAdd", 0x1000, 596, 0xb80)
        .note(note)
        .build();
    let err = extractor.extract(&elf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownArgumentKind);
    assert_eq!(err.detail(), Some("hidden_heap_v1"));
    assert!(format!("{err:#}").contains("hidden_heap_v1"), "{err:#}");

    let elf = ElfBuilder::new().without_strtab().func("k", 0, 4).build();
    let err = extractor.extract(&elf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SectionMissing);

    let err = extractor.extract_file("/does-not-exist/vector_add.hsaco").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

/// Make sure that a kernel missing from the metadata is reported.
#[test]
fn metadata_count_mismatch() {
    let note = NoteBuilder::new().kernel(KernelDesc::vector_add()).build();
    let elf = ElfBuilder::new()
        .kernel("vectorAdd", 0x1000, 596, 0xb80)
        .kernel("vectorMul", 0x1300, 596, 0xbc0)
        .note(note)
        .build();
    let err = Extractor::new().extract(&elf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MetadataCountMismatch);
}

/// Make sure that arbitrarily truncated code objects never cause a
/// panic.
#[test]
fn truncated_object() {
    let data = vector_add_object();
    let extractor = Extractor::new();
    for len in 0..data.len() {
        let result = extractor.extract(&data[..len]);
        assert!(result.is_err(), "{len}");
    }
}

/// Check that kernel names can be demangled.
#[cfg(feature = "demangle")]
#[test]
fn demangled_names() {
    let data = code_object(&[KernelDesc::new("_Z9vectorAddPKiS0_Pii").arg(0, 8, "global_buffer")]);
    let catalog = Extractor::new().extract(&data).unwrap();
    let (name, _kernel) = catalog.iter().next().unwrap();
    assert_eq!(
        hipkern::demangled_name(name),
        "vectorAdd(int const*, int const*, int*, int)"
    );
}
