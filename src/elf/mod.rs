//! Indexing of ELF64 code objects.
//!
//! Only little endian ELF64 objects are supported. Opening an object
//! parses its header and section header table once and classifies
//! the symbol table with its string table as well as the note carrying
//! the kernel metadata.

mod parser;
pub(crate) mod types;

pub use parser::ElfIndex;
pub use parser::Section;
pub use parser::SectionView;
pub use parser::SymbolBind;
pub use parser::SymbolIter;
pub use parser::SymbolRecord;
pub use parser::SymbolType;
pub use parser::STRTAB;
pub use parser::SYMTAB;
