use std::io::Write as _;

use hipkern::test_helper::ElfBuilder;
use hipkern::test_helper::KernelDesc;
use hipkern::test_helper::NoteBuilder;

use tempfile::NamedTempFile;


/// Build the `vectorAdd` code object, with the kernel's code at
/// 0x1000 (596 bytes) and its descriptor at 0xb80 (64 bytes).
pub fn vector_add_object() -> Vec<u8> {
    let note = NoteBuilder::new().kernel(KernelDesc::vector_add()).build();
    ElfBuilder::new()
        .func("vectorAdd", 0x1000, 596)
        .object("vectorAdd.kd", 0xb80, 64)
        .note(note)
        .build()
}

/// Write `data` to a temporary file.
pub fn temp_file(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    let () = file.write_all(data).unwrap();
    let () = file.flush().unwrap();
    file
}
