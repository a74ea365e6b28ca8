use hipkern::bundle::find_code_object;
use hipkern::bundle::is_bundle;
use hipkern::bundle::BundleEntryIter;
use hipkern::bundle::DEFAULT_TARGETS;
use hipkern::elf::ElfIndex;
use hipkern::test_helper::bundle;
use hipkern::ErrorKind;

use test_log::test;

use super::common::vector_add_object;


/// Check that the located code object can be indexed in place.
#[test]
fn index_bundled_object() {
    let object = vector_add_object();
    let data = bundle(&[
        ("host-x86_64-unknown-linux-gnu", b"".as_slice()),
        ("hip-amdgcn-amd-amdhsa--gfx906", object.as_slice()),
    ]);
    assert!(is_bundle(&data));

    let offset = find_code_object(&data, &DEFAULT_TARGETS).unwrap();
    let index = ElfIndex::open(&data, offset).unwrap();
    assert_eq!(index.data(), object.as_slice());
    assert!(index.note().is_some());
}

/// Check that legacy HCC triples are accepted as well.
#[test]
fn hcc_triple() {
    let object = vector_add_object();
    let data = bundle(&[
        ("host-x86_64-unknown-linux-gnu", b"".as_slice()),
        ("hcc-amdgcn-amd-amdhsa--gfx803", object.as_slice()),
    ]);

    let entry = BundleEntryIter::new(&data)
        .unwrap()
        .nth(1)
        .unwrap()
        .unwrap();
    let offset = find_code_object(&data, &DEFAULT_TARGETS).unwrap();
    assert_eq!(offset, entry.offset);
    assert_eq!(entry.data, object.as_slice());
}

/// Make sure that no truncation of a bundle leads to a panic.
#[test]
fn truncated_bundle() {
    let object = vector_add_object();
    let data = bundle(&[("hip-amdgcn-amd-amdhsa--gfx906", object.as_slice())]);
    let offset = find_code_object(&data, &DEFAULT_TARGETS).unwrap() as usize;

    for len in 0..offset {
        match find_code_object(&data[..len], &DEFAULT_TARGETS) {
            Ok(offset) => assert_eq!(offset, 0, "{len}"),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Truncated, "{len}: {err:#}"),
        }
    }

    // The entry's data range has to be covered as well.
    let err = find_code_object(&data[..data.len() - 1], &DEFAULT_TARGETS).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Truncated);
}
