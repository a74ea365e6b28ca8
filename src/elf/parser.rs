use std::mem::size_of;

use crate::log::debug;
use crate::log::warn;
use crate::util::ReadRaw as _;
use crate::Addr;
use crate::Error;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Result;

use super::types::Elf64_Ehdr;
use super::types::Elf64_Shdr;
use super::types::Elf64_Sym;
use super::types::EI_CLASS;
use super::types::EI_DATA;
use super::types::ELFCLASS64;
use super::types::ELFDATA2LSB;
use super::types::ELFMAG;
use super::types::EM_AMDGPU;
use super::types::SHN_XINDEX;
use super::types::SHT_NOBITS;
use super::types::SHT_NOTE;
use super::types::SHT_STRTAB;
use super::types::SHT_SYMTAB;
use super::types::STB_GLOBAL;
use super::types::STB_LOCAL;
use super::types::STB_WEAK;
use super::types::STT_FUNC;
use super::types::STT_OBJECT;


/// The name of the string table holding symbol names.
pub const STRTAB: &str = ".strtab";
/// The name of the symbol table.
pub const SYMTAB: &str = ".symtab";


/// A read-only view on the contents of a section.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectionView<'data> {
    /// The section's index in the section header table.
    pub idx: usize,
    /// The section's name, as resolved through the section name string
    /// table.
    pub name: &'data str,
    /// The section's contents.
    pub data: &'data [u8],
}


/// A section, classified by the role it plays for kernel extraction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Section<'data> {
    /// The string table holding symbol names (`.strtab`).
    StringTable(SectionView<'data>),
    /// The symbol table.
    SymbolTable(SectionView<'data>),
    /// The note section holding kernel metadata.
    Note(SectionView<'data>),
    /// Any other section, including string tables other than `.strtab`.
    Other(SectionView<'data>),
}

impl<'data> Section<'data> {
    /// Retrieve the view on the section's contents.
    #[inline]
    pub fn view(&self) -> &SectionView<'data> {
        match self {
            Self::StringTable(view)
            | Self::SymbolTable(view)
            | Self::Note(view)
            | Self::Other(view) => view,
        }
    }
}


/// The binding of a symbol.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolBind {
    /// The symbol is not visible outside of the object.
    Local,
    /// The symbol is visible to all objects.
    Global,
    /// A global symbol of lower precedence.
    Weak,
    /// Any other (OS or processor specific) binding.
    Other(u8),
}

impl From<u8> for SymbolBind {
    fn from(bind: u8) -> Self {
        match bind {
            STB_LOCAL => Self::Local,
            STB_GLOBAL => Self::Global,
            STB_WEAK => Self::Weak,
            _ => Self::Other(bind),
        }
    }
}


/// The type of a symbol.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolType {
    /// The symbol references code.
    Function,
    /// The symbol references a data object.
    Object,
    /// Any other symbol type.
    Other(u8),
}

impl From<u8> for SymbolType {
    fn from(type_: u8) -> Self {
        match type_ {
            STT_FUNC => Self::Function,
            STT_OBJECT => Self::Object,
            _ => Self::Other(type_),
        }
    }
}


/// A symbol as recorded in the symbol table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SymbolRecord<'data> {
    /// The symbol's name.
    pub name: &'data str,
    /// The symbol's binding.
    pub bind: SymbolBind,
    /// The symbol's type.
    pub type_: SymbolType,
    /// The symbol's value, i.e., its address.
    pub value: Addr,
    /// The size of the entity the symbol references.
    pub size: u64,
}


/// An iterator over the records of a symbol table.
#[derive(Debug)]
pub struct SymbolIter<'data> {
    /// The not yet visited symbol table entries.
    syms: &'data [u8],
    /// The string table used for resolving symbol names.
    strs: &'data [u8],
}

impl<'data> SymbolIter<'data> {
    fn parse_next(&mut self) -> Result<SymbolRecord<'data>> {
        let sym = self
            .syms
            .read_pod::<Elf64_Sym>()
            .ok_or_truncated(|| "failed to read Elf64_Sym")?;
        let name = symbol_name(self.strs, &sym)?;
        let record = SymbolRecord {
            name,
            bind: SymbolBind::from(sym.bind()),
            type_: SymbolType::from(sym.type_()),
            value: u64::from_le(sym.st_value),
            size: u64::from_le(sym.st_size),
        };
        Ok(record)
    }
}

impl<'data> Iterator for SymbolIter<'data> {
    type Item = Result<SymbolRecord<'data>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.syms.is_empty() {
            return None
        }

        let result = self.parse_next();
        if result.is_err() {
            self.syms = &[];
        }
        Some(result)
    }
}


fn read_str<'data>(strs: &'data [u8], idx: u32) -> Option<Result<&'data str>> {
    let cstr = strs.get(idx as usize..)?.read_cstr()?;
    let s = cstr
        .to_str()
        .map_err(|_err| Error::with_header_invalid(format!("string at index {idx} is not valid UTF-8")));
    Some(s)
}

fn symbol_name<'data>(strtab: &'data [u8], sym: &Elf64_Sym) -> Result<&'data str> {
    let idx = u32::from_le(sym.st_name);
    read_str(strtab, idx)
        .ok_or_truncated(|| format!("symbol name index {idx} is out of string table bounds"))?
        .context("invalid symbol name")
}


/// Read the data of the section described by `shdr` from `elf_data`.
fn section_data<'data>(elf_data: &'data [u8], shdr: &Elf64_Shdr) -> Result<&'data [u8]> {
    if u32::from_le(shdr.sh_type) == SHT_NOBITS {
        return Ok(&[])
    }

    let offset = u64::from_le(shdr.sh_offset);
    let size = u64::from_le(shdr.sh_size);
    usize::try_from(offset)
        .ok()
        .and_then(|offset| elf_data.get(offset..))
        .and_then(|mut data| data.read_slice(usize::try_from(size).ok()?))
        .ok_or_truncated(|| {
            format!(
                "section data ({offset:#x}, {size} bytes) exceeds object of {} bytes",
                elf_data.len()
            )
        })
}


/// An index over the sections of an ELF64 code object.
///
/// All sections are classified once, when the index is created. The
/// index borrows the data it was created from and never copies section
/// contents.
#[derive(Debug)]
pub struct ElfIndex<'data> {
    /// The data of the object, starting at its ELF header.
    elf_data: &'data [u8],
    /// The classified sections, in section header table order.
    sections: Box<[Section<'data>]>,
    /// Position of the `.strtab` section in `sections`.
    strtab: Option<usize>,
    /// Position of the symbol table in `sections`.
    symtab: Option<usize>,
    /// Position of the note section in `sections`.
    note: Option<usize>,
}

impl<'data> ElfIndex<'data> {
    /// Index the ELF object starting at `offset` in `data`.
    pub fn open(data: &'data [u8], offset: u64) -> Result<Self> {
        let elf_data = usize::try_from(offset)
            .ok()
            .and_then(|offset| data.get(offset..))
            .ok_or_header_invalid(|| {
                format!("object offset {offset:#x} is out of bounds of {} bytes", data.len())
            })?;

        let ehdr = Self::parse_ehdr(elf_data)?;
        let shdrs = Self::parse_shdrs(elf_data, &ehdr)?;
        let shstrndx = Self::shstrndx(&ehdr, &shdrs)?;
        let shstrtab = shdrs
            .get(shstrndx)
            .ok_or_header_invalid(|| {
                format!("section name string table index ({shstrndx}) out of bounds")
            })
            .and_then(|shdr| section_data(elf_data, shdr))
            .context("failed to read section name string table")?;

        let mut strtab = None;
        let mut symtab = None;
        let mut note = None;
        let mut sections = Vec::with_capacity(shdrs.len());

        for (idx, shdr) in shdrs.iter().enumerate() {
            let name_idx = u32::from_le(shdr.sh_name);
            let name = read_str(shstrtab, name_idx)
                .ok_or_header_invalid(|| format!("name of section {idx} is out of bounds"))??;
            let data = section_data(elf_data, shdr)
                .with_context(|| format!("failed to read contents of section {name}"))?;
            let view = SectionView { idx, name, data };

            let section = match u32::from_le(shdr.sh_type) {
                // Multiple string tables may exist (`.dynstr`,
                // `.shstrtab`, ...), only the one by this name holds the
                // names of `.symtab` entries.
                SHT_STRTAB if name == STRTAB && strtab.is_none() => {
                    strtab = Some(idx);
                    Section::StringTable(view)
                }
                SHT_SYMTAB if symtab.is_none() => {
                    symtab = Some(idx);
                    Section::SymbolTable(view)
                }
                SHT_NOTE if note.is_none() => {
                    note = Some(idx);
                    Section::Note(view)
                }
                SHT_NOTE => {
                    warn!("ignoring additional note section {name} at index {idx}");
                    Section::Other(view)
                }
                _ => Section::Other(view),
            };
            let () = sections.push(section);
        }

        debug!(
            "indexed {} sections; strtab: {strtab:?}, symtab: {symtab:?}, note: {note:?}",
            sections.len()
        );

        let slf = Self {
            elf_data,
            sections: sections.into_boxed_slice(),
            strtab,
            symtab,
            note,
        };
        Ok(slf)
    }

    fn parse_ehdr(mut elf_data: &[u8]) -> Result<Elf64_Ehdr> {
        let ehdr = elf_data
            .read_pod::<Elf64_Ehdr>()
            .ok_or_header_invalid(|| "failed to read Elf64_Ehdr")?;
        if ehdr.e_ident[..ELFMAG.len()] != ELFMAG {
            return Err(Error::with_header_invalid(format!(
                "encountered unexpected e_ident: {:x?}",
                &ehdr.e_ident[0..4]
            )))
        }
        if ehdr.e_ident[EI_CLASS] != ELFCLASS64 || ehdr.e_ident[EI_DATA] != ELFDATA2LSB {
            return Err(Error::with_header_invalid(format!(
                "only little endian ELF64 objects are supported (class {}, data {})",
                ehdr.e_ident[EI_CLASS], ehdr.e_ident[EI_DATA]
            )))
        }

        let machine = u16::from_le(ehdr.e_machine);
        if machine != EM_AMDGPU {
            debug!("object has unexpected machine type {machine}");
        }
        Ok(ehdr)
    }

    /// Read the very first section header.
    ///
    /// ELF contains a couple of clauses that special case data ranges
    /// of certain member variables to reference data from this header,
    /// which otherwise is zeroed out.
    fn read_first_shdr(elf_data: &[u8], ehdr: &Elf64_Ehdr) -> Result<Elf64_Shdr> {
        let shoff = u64::from_le(ehdr.e_shoff);
        usize::try_from(shoff)
            .ok()
            .and_then(|shoff| elf_data.get(shoff..))
            .and_then(|mut data| data.read_pod::<Elf64_Shdr>())
            .ok_or_header_invalid(|| format!("Elf64_Ehdr::e_shoff ({shoff:#x}) is invalid"))
    }

    fn parse_shdrs(elf_data: &[u8], ehdr: &Elf64_Ehdr) -> Result<Vec<Elf64_Shdr>> {
        // "If the number of entries in the section header table is larger than
        // or equal to SHN_LORESERVE, e_shnum holds the value zero and the real
        // number of entries in the section header table is held in the sh_size
        // member of the initial entry in section header table."
        let shnum = match u16::from_le(ehdr.e_shnum) {
            0 if ehdr.e_shoff == 0 => 0,
            0 => {
                let shdr = Self::read_first_shdr(elf_data, ehdr)?;
                let size = u64::from_le(shdr.sh_size);
                usize::try_from(size).ok().ok_or_header_invalid(|| {
                    format!("ELF file contains unsupported number of sections ({size})")
                })?
            }
            shnum => usize::from(shnum),
        };

        let shoff = u64::from_le(ehdr.e_shoff);
        let mut data = usize::try_from(shoff)
            .ok()
            .and_then(|shoff| elf_data.get(shoff..))
            .and_then(|mut data| data.read_slice(shnum.checked_mul(size_of::<Elf64_Shdr>())?))
            .ok_or_header_invalid(|| {
                format!("section header table ({shnum} entries at {shoff:#x}) is out of bounds")
            })?;

        let shdrs = (0..shnum)
            // SANITY: The length of `data` has been checked above.
            .map(|_| data.read_pod::<Elf64_Shdr>().unwrap())
            .collect();
        Ok(shdrs)
    }

    fn shstrndx(ehdr: &Elf64_Ehdr, shdrs: &[Elf64_Shdr]) -> Result<usize> {
        // "If the index of section name string table section is larger
        // than or equal to SHN_LORESERVE (0xff00), this member holds
        // SHN_XINDEX (0xffff) and  the real index of the section name
        // string table section is held in the sh_link member of the
        // initial entry in section header table."
        let shstrndx = if u16::from_le(ehdr.e_shstrndx) == SHN_XINDEX {
            let shdr = shdrs
                .first()
                .ok_or_header_invalid(|| "no section header present for SHN_XINDEX")?;
            u32::from_le(shdr.sh_link)
        } else {
            u32::from(u16::from_le(ehdr.e_shstrndx))
        };

        let shstrndx = usize::try_from(shstrndx).ok().ok_or_header_invalid(|| {
            format!("ELF file contains unsupported section name string table index ({shstrndx})")
        })?;
        Ok(shstrndx)
    }

    /// Retrieve the raw data of the object, starting at its ELF header.
    #[inline]
    pub fn data(&self) -> &'data [u8] {
        self.elf_data
    }

    /// Retrieve all sections, in section header table order.
    #[inline]
    pub fn sections(&self) -> &[Section<'data>] {
        &self.sections
    }

    /// Find the first section with the given name.
    pub fn find_section(&self, name: &str) -> Option<&Section<'data>> {
        self.sections
            .iter()
            .find(|section| section.view().name == name)
    }

    /// Retrieve the contents of the first section with the given name.
    pub fn section_data(&self, name: &str) -> Option<&'data [u8]> {
        self.find_section(name).map(|section| section.view().data)
    }

    fn section_at(&self, idx: Option<usize>, name: &'static str) -> Result<&SectionView<'data>> {
        idx.and_then(|idx| self.sections.get(idx))
            .map(Section::view)
            .ok_or_else(|| Error::with_section_missing(name))
    }

    /// Retrieve the `.strtab` string table.
    pub fn strtab(&self) -> Result<&SectionView<'data>> {
        self.section_at(self.strtab, STRTAB)
    }

    /// Retrieve the symbol table.
    pub fn symtab(&self) -> Result<&SectionView<'data>> {
        self.section_at(self.symtab, SYMTAB)
    }

    /// Retrieve the note section, if any.
    pub fn note(&self) -> Option<&SectionView<'data>> {
        self.section_at(self.note, "note").ok()
    }

    /// Create an iterator over all records in the symbol table.
    ///
    /// The first iterated record is the reserved null symbol.
    pub fn symbols(&self) -> Result<SymbolIter<'data>> {
        let symtab = self.symtab()?;
        let strtab = self.strtab()?;

        if symtab.data.len() % size_of::<Elf64_Sym>() != 0 {
            return Err(Error::with_truncated(format!(
                "size of symbol table section ({} bytes) is not a multiple of {}",
                symtab.data.len(),
                size_of::<Elf64_Sym>()
            )))
        }

        let iter = SymbolIter {
            syms: symtab.data,
            strs: strtab.data,
        };
        Ok(iter)
    }
}
