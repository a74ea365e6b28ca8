//! In-memory fixtures for tests and benchmarks.
//!
//! Everything in here panics freely; it is not meant for production
//! use.

#![allow(missing_docs, clippy::missing_panics_doc)]

use crate::bundle::BUNDLE_MAGIC;
use crate::elf::types::SHT_NOTE;
use crate::elf::types::SHT_NULL;
use crate::elf::types::SHT_PROGBITS;
use crate::elf::types::SHT_STRTAB;
use crate::elf::types::SHT_SYMTAB;
use crate::elf::types::STB_GLOBAL;
use crate::elf::types::STB_LOCAL;
use crate::elf::types::STT_FUNC;
use crate::elf::types::STT_NOTYPE;
use crate::elf::types::STT_OBJECT;
use crate::elf::types::EM_AMDGPU;


/// The note type of AMDGPU MessagePack metadata.
const NT_AMDGPU_METADATA: u32 = 32;
/// The size of an `Elf64_Ehdr`.
const EHDR_SIZE: usize = 64;
/// The size of an `Elf64_Shdr`.
const SHDR_SIZE: usize = 64;
/// The size of an `Elf64_Sym`.
const SYM_SIZE: usize = 24;


/// Encode `value` as a packed unsigned integer, using the smallest
/// form it fits.
pub fn encode_uint(value: u64) -> Vec<u8> {
    match value {
        0..=0x7f => vec![value as u8],
        0x80..=0xff => vec![0xcc, value as u8],
        0x100..=0xffff => {
            let mut data = vec![0xcd];
            let () = data.extend_from_slice(&(value as u16).to_le_bytes());
            data
        }
        0x1_0000..=0xffff_ffff => {
            let mut data = vec![0xce];
            let () = data.extend_from_slice(&(value as u32).to_le_bytes());
            data
        }
        _ => {
            let mut data = vec![0xcf];
            let () = data.extend_from_slice(&value.to_le_bytes());
            data
        }
    }
}

/// Encode `s` as a text token.
pub fn encode_str(s: &str) -> Vec<u8> {
    let len = s.len();
    let mut data = match len {
        0..=31 => vec![0xa0 | len as u8],
        32..=0xff => vec![0xd9, len as u8],
        0x100..=0xffff => {
            let mut data = vec![0xda];
            let () = data.extend_from_slice(&(len as u16).to_le_bytes());
            data
        }
        _ => {
            let mut data = vec![0xdb];
            let () = data.extend_from_slice(&(len as u32).to_le_bytes());
            data
        }
    };
    let () = data.extend_from_slice(s.as_bytes());
    data
}


/// A MessagePack value, as far as our fixtures need it.
#[derive(Clone, Debug)]
enum Value {
    Uint(u64),
    Str(String),
    Array(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    fn str(s: &str) -> Self {
        Self::Str(s.to_string())
    }

    fn encode(&self, data: &mut Vec<u8>) {
        match self {
            Self::Uint(value) => data.extend_from_slice(&encode_uint(*value)),
            Self::Str(s) => data.extend_from_slice(&encode_str(s)),
            Self::Array(values) => {
                let len = values.len();
                if len < 16 {
                    let () = data.push(0x90 | len as u8);
                } else {
                    let () = data.push(0xdc);
                    let () = data.extend_from_slice(&(len as u16).to_be_bytes());
                }
                for value in values {
                    let () = value.encode(data);
                }
            }
            Self::Map(entries) => {
                let len = entries.len();
                assert!(len < 16, "map with {len} entries is not supported");
                let () = data.push(0x80 | len as u8);
                for (key, value) in entries {
                    let () = data.extend_from_slice(&encode_str(key));
                    let () = value.encode(data);
                }
            }
        }
    }
}


/// The description of a kernel argument in the metadata.
#[derive(Clone, Debug)]
struct ArgDef {
    name: Option<String>,
    offset: u64,
    size: u64,
    value_kind: String,
}


/// The metadata of a single kernel, as emitted by the compiler.
#[derive(Clone, Debug)]
pub struct KernelDesc {
    pub name: String,
    pub symbol: String,
    pub group_segment_fixed_size: u64,
    pub kernarg_segment_align: u64,
    pub kernarg_segment_size: u64,
    pub private_segment_fixed_size: Option<u64>,
    pub sgpr_count: Option<u64>,
    pub vgpr_count: u64,
    pub wavefront_size: Option<u64>,
    args: Vec<ArgDef>,
}

impl KernelDesc {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            symbol: format!("{name}.kd"),
            group_segment_fixed_size: 0,
            kernarg_segment_align: 8,
            kernarg_segment_size: 0,
            private_segment_fixed_size: Some(0),
            sgpr_count: Some(16),
            vgpr_count: 4,
            wavefront_size: Some(64),
            args: Vec::new(),
        }
    }

    /// The metadata of the `vectorAdd` kernel used throughout tests.
    pub fn vector_add() -> Self {
        Self::new("vectorAdd")
            .arg(0, 8, "global_buffer")
            .arg(8, 4, "by_value")
    }

    /// Add an argument, adjusting the kernarg segment size to cover it.
    pub fn arg(mut self, offset: u64, size: u64, value_kind: &str) -> Self {
        let name = (!value_kind.starts_with("hidden_")).then(|| format!("arg{}", self.args.len()));
        let () = self.args.push(ArgDef {
            name,
            offset,
            size,
            value_kind: value_kind.to_string(),
        });
        self.kernarg_segment_size = self.kernarg_segment_size.max(offset + size);
        self
    }

    pub fn symbol(mut self, symbol: &str) -> Self {
        self.symbol = symbol.to_string();
        self
    }

    pub fn group_segment_fixed_size(mut self, size: u64) -> Self {
        self.group_segment_fixed_size = size;
        self
    }

    pub fn private_segment_fixed_size(mut self, size: Option<u64>) -> Self {
        self.private_segment_fixed_size = size;
        self
    }

    pub fn sgpr_count(mut self, count: Option<u64>) -> Self {
        self.sgpr_count = count;
        self
    }

    pub fn vgpr_count(mut self, count: u64) -> Self {
        self.vgpr_count = count;
        self
    }

    pub fn wavefront_size(mut self, size: Option<u64>) -> Self {
        self.wavefront_size = size;
        self
    }

    fn to_value(&self) -> Value {
        let args = self
            .args
            .iter()
            .map(|arg| {
                let mut entries = Vec::new();
                if let Some(name) = &arg.name {
                    let () = entries.push((".address_space".to_string(), Value::str("global")));
                    let () = entries.push((".name".to_string(), Value::str(name)));
                }
                let () = entries.push((".offset".to_string(), Value::Uint(arg.offset)));
                let () = entries.push((".size".to_string(), Value::Uint(arg.size)));
                let () = entries.push((".value_kind".to_string(), Value::str(&arg.value_kind)));
                Value::Map(entries)
            })
            .collect();

        // Keys are sorted, the way the compiler emits them.
        let mut entries = vec![
            (".agpr_count".to_string(), Value::Uint(0)),
            (".args".to_string(), Value::Array(args)),
            (
                ".group_segment_fixed_size".to_string(),
                Value::Uint(self.group_segment_fixed_size),
            ),
            (
                ".kernarg_segment_align".to_string(),
                Value::Uint(self.kernarg_segment_align),
            ),
            (
                ".kernarg_segment_size".to_string(),
                Value::Uint(self.kernarg_segment_size),
            ),
            (".language".to_string(), Value::str("OpenCL C")),
            (
                ".max_flat_workgroup_size".to_string(),
                Value::Uint(1024),
            ),
            (".name".to_string(), Value::str(&self.name)),
        ];
        if let Some(size) = self.private_segment_fixed_size {
            let () = entries.push((".private_segment_fixed_size".to_string(), Value::Uint(size)));
        }
        if let Some(count) = self.sgpr_count {
            let () = entries.push((".sgpr_count".to_string(), Value::Uint(count)));
        }
        let () = entries.push((".symbol".to_string(), Value::str(&self.symbol)));
        let () = entries.push((".vgpr_count".to_string(), Value::Uint(self.vgpr_count)));
        if let Some(size) = self.wavefront_size {
            let () = entries.push((".wavefront_size".to_string(), Value::Uint(size)));
        }

        Value::Map(entries)
    }
}


/// A builder for an AMDGPU metadata note.
#[derive(Clone, Debug)]
pub struct NoteBuilder {
    vendor: String,
    version: bool,
    kernels: Vec<KernelDesc>,
}

impl NoteBuilder {
    pub fn new() -> Self {
        Self {
            vendor: "AMDGPU".to_string(),
            version: true,
            kernels: Vec::new(),
        }
    }

    pub fn kernel(mut self, kernel: KernelDesc) -> Self {
        let () = self.kernels.push(kernel);
        self
    }

    /// Override the note owner name.
    pub fn vendor(mut self, vendor: &str) -> Self {
        self.vendor = vendor.to_string();
        self
    }

    /// Omit the `amdhsa.version` entry.
    pub fn without_version(mut self) -> Self {
        self.version = false;
        self
    }

    /// Build the MessagePack metadata document on its own.
    pub fn metadata(&self) -> Vec<u8> {
        let kernels = self.kernels.iter().map(KernelDesc::to_value).collect();
        let mut entries = vec![
            ("amdhsa.kernels".to_string(), Value::Array(kernels)),
            (
                "amdhsa.target".to_string(),
                Value::str("amdgcn-amd-amdhsa--gfx906"),
            ),
        ];
        if self.version {
            let () = entries.push((
                "amdhsa.version".to_string(),
                Value::Array(vec![Value::Uint(1), Value::Uint(1)]),
            ));
        }

        let mut data = Vec::new();
        let () = Value::Map(entries).encode(&mut data);
        data
    }

    /// Build the complete note record.
    pub fn build(&self) -> Vec<u8> {
        let desc = self.metadata();
        let mut name = self.vendor.as_bytes().to_vec();
        let () = name.push(b'\0');

        let mut data = Vec::new();
        let () = data.extend_from_slice(&(name.len() as u32).to_le_bytes());
        let () = data.extend_from_slice(&(desc.len() as u32).to_le_bytes());
        let () = data.extend_from_slice(&NT_AMDGPU_METADATA.to_le_bytes());
        let () = data.extend_from_slice(&name);
        let () = pad(&mut data, 4);
        let () = data.extend_from_slice(&desc);
        let () = pad(&mut data, 4);
        data
    }
}

impl Default for NoteBuilder {
    fn default() -> Self {
        Self::new()
    }
}


fn pad(data: &mut Vec<u8>, align: usize) {
    let len = data.len().next_multiple_of(align);
    let () = data.resize(len, 0);
}

fn add_str(strs: &mut Vec<u8>, s: &str) -> u32 {
    let idx = strs.len() as u32;
    let () = strs.extend_from_slice(s.as_bytes());
    let () = strs.push(b'\0');
    idx
}


#[derive(Clone, Debug)]
struct SymDef {
    name: String,
    bind: u8,
    type_: u8,
    addr: u64,
    size: u64,
}

#[derive(Debug)]
struct SectionDef {
    name: &'static str,
    type_: u32,
    data: Vec<u8>,
    link: u32,
    entsize: u64,
}


/// A builder for minimal little endian ELF64 AMDGPU code objects.
///
/// The produced object has the sections `.text`, `.dynstr`, an
/// optional `.note`, `.symtab`, `.strtab`, and `.shstrtab`, in this
/// order and preceded by the null section. Section contents follow
/// the ELF header, the section header table comes last.
#[derive(Clone, Debug)]
pub struct ElfBuilder {
    syms: Vec<SymDef>,
    note: Option<Vec<u8>>,
    strtab: bool,
    symtab: bool,
}

impl ElfBuilder {
    pub fn new() -> Self {
        Self {
            syms: Vec::new(),
            note: None,
            strtab: true,
            symtab: true,
        }
    }

    /// Add a symbol with explicit binding and type.
    pub fn symbol(mut self, name: &str, bind: u8, type_: u8, addr: u64, size: u64) -> Self {
        let () = self.syms.push(SymDef {
            name: name.to_string(),
            bind,
            type_,
            addr,
            size,
        });
        self
    }

    /// Add a global function symbol.
    pub fn func(self, name: &str, addr: u64, size: u64) -> Self {
        self.symbol(name, STB_GLOBAL, STT_FUNC, addr, size)
    }

    /// Add a global data object symbol.
    pub fn object(self, name: &str, addr: u64, size: u64) -> Self {
        self.symbol(name, STB_GLOBAL, STT_OBJECT, addr, size)
    }

    /// Add a local function symbol.
    pub fn local_func(self, name: &str, addr: u64, size: u64) -> Self {
        self.symbol(name, STB_LOCAL, STT_FUNC, addr, size)
    }

    /// Add code and descriptor symbols of a kernel.
    pub fn kernel(self, name: &str, code_addr: u64, code_size: u64, desc_addr: u64) -> Self {
        self.func(name, code_addr, code_size)
            .object(&format!("{name}.kd"), desc_addr, 64)
    }

    pub fn note(mut self, note: Vec<u8>) -> Self {
        self.note = Some(note);
        self
    }

    /// Omit the `.strtab` section; `.dynstr` is still present.
    pub fn without_strtab(mut self) -> Self {
        self.strtab = false;
        self
    }

    pub fn without_symtab(mut self) -> Self {
        self.symtab = false;
        self
    }

    fn symtab_data(&self) -> (Vec<u8>, Vec<u8>) {
        let mut strs = vec![b'\0'];
        let mut syms = vec![0; SYM_SIZE];

        for sym in &self.syms {
            let name = add_str(&mut strs, &sym.name);
            let () = syms.extend_from_slice(&name.to_le_bytes());
            let () = syms.push((sym.bind << 4) | (sym.type_ & 0xf));
            // st_other
            let () = syms.push(0);
            let shndx = if sym.type_ == STT_NOTYPE { 0u16 } else { 1u16 };
            let () = syms.extend_from_slice(&shndx.to_le_bytes());
            let () = syms.extend_from_slice(&sym.addr.to_le_bytes());
            let () = syms.extend_from_slice(&sym.size.to_le_bytes());
        }
        (syms, strs)
    }

    pub fn build(&self) -> Vec<u8> {
        let (syms, strs) = self.symtab_data();

        let mut sections = vec![
            SectionDef {
                name: "",
                type_: SHT_NULL,
                data: Vec::new(),
                link: 0,
                entsize: 0,
            },
            SectionDef {
                name: ".text",
                type_: SHT_PROGBITS,
                // s_endpgm
                data: [0x00u8, 0x00, 0x81, 0xbf].repeat(4),
                link: 0,
                entsize: 0,
            },
            SectionDef {
                name: ".dynstr",
                type_: SHT_STRTAB,
                data: b"\0hipModuleLaunchKernel\0vectorAdd\0".to_vec(),
                link: 0,
                entsize: 0,
            },
        ];
        if let Some(note) = &self.note {
            let () = sections.push(SectionDef {
                name: ".note",
                type_: SHT_NOTE,
                data: note.clone(),
                link: 0,
                entsize: 0,
            });
        }
        // The symbol table links to the string table following it.
        let strtab_idx = sections.len() as u32 + u32::from(self.symtab);
        if self.symtab {
            let () = sections.push(SectionDef {
                name: ".symtab",
                type_: SHT_SYMTAB,
                data: syms,
                link: strtab_idx,
                entsize: SYM_SIZE as u64,
            });
        }
        if self.strtab {
            let () = sections.push(SectionDef {
                name: ".strtab",
                type_: SHT_STRTAB,
                data: strs,
                link: 0,
                entsize: 0,
            });
        }

        let mut shstrtab = Vec::new();
        let mut names = sections
            .iter()
            .map(|section| add_str(&mut shstrtab, section.name))
            .collect::<Vec<_>>();
        let () = names.push(add_str(&mut shstrtab, ".shstrtab"));
        let () = sections.push(SectionDef {
            name: ".shstrtab",
            type_: SHT_STRTAB,
            data: shstrtab,
            link: 0,
            entsize: 0,
        });

        let mut data = vec![0; EHDR_SIZE];
        let mut offsets = Vec::with_capacity(sections.len());
        for section in &sections {
            let () = pad(&mut data, 8);
            let () = offsets.push(data.len() as u64);
            let () = data.extend_from_slice(&section.data);
        }
        let () = pad(&mut data, 8);
        let shoff = data.len() as u64;

        for ((section, name), offset) in sections.iter().zip(names).zip(offsets) {
            let offset = if section.type_ == SHT_NULL { 0 } else { offset };
            let () = data.extend_from_slice(&name.to_le_bytes());
            let () = data.extend_from_slice(&section.type_.to_le_bytes());
            // sh_flags
            let () = data.extend_from_slice(&0u64.to_le_bytes());
            // sh_addr
            let () = data.extend_from_slice(&0u64.to_le_bytes());
            let () = data.extend_from_slice(&offset.to_le_bytes());
            let () = data.extend_from_slice(&(section.data.len() as u64).to_le_bytes());
            let () = data.extend_from_slice(&section.link.to_le_bytes());
            // sh_info
            let () = data.extend_from_slice(&0u32.to_le_bytes());
            // sh_addralign
            let () = data.extend_from_slice(&8u64.to_le_bytes());
            let () = data.extend_from_slice(&section.entsize.to_le_bytes());
        }

        let shnum = sections.len() as u16;
        let mut ehdr = Vec::with_capacity(EHDR_SIZE);
        // ELFCLASS64, ELFDATA2LSB, EV_CURRENT, ELFOSABI_AMDGPU_HSA, ABI
        // version 2 (code object v4).
        let () = ehdr.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 64, 2]);
        let () = ehdr.resize(16, 0);
        // ET_DYN
        let () = ehdr.extend_from_slice(&3u16.to_le_bytes());
        let () = ehdr.extend_from_slice(&EM_AMDGPU.to_le_bytes());
        let () = ehdr.extend_from_slice(&1u32.to_le_bytes());
        // e_entry, e_phoff
        let () = ehdr.extend_from_slice(&0u64.to_le_bytes());
        let () = ehdr.extend_from_slice(&0u64.to_le_bytes());
        let () = ehdr.extend_from_slice(&shoff.to_le_bytes());
        // e_flags
        let () = ehdr.extend_from_slice(&0u32.to_le_bytes());
        let () = ehdr.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
        // e_phentsize, e_phnum
        let () = ehdr.extend_from_slice(&56u16.to_le_bytes());
        let () = ehdr.extend_from_slice(&0u16.to_le_bytes());
        let () = ehdr.extend_from_slice(&(SHDR_SIZE as u16).to_le_bytes());
        let () = ehdr.extend_from_slice(&shnum.to_le_bytes());
        let () = ehdr.extend_from_slice(&(shnum - 1).to_le_bytes());
        assert_eq!(ehdr.len(), EHDR_SIZE);

        let () = data[..EHDR_SIZE].copy_from_slice(&ehdr);
        data
    }
}

impl Default for ElfBuilder {
    fn default() -> Self {
        Self::new()
    }
}


/// Create a code object holding the given kernels along with their
/// metadata.
pub fn code_object(kernels: &[KernelDesc]) -> Vec<u8> {
    let note = kernels
        .iter()
        .cloned()
        .fold(NoteBuilder::new(), NoteBuilder::kernel)
        .build();

    kernels
        .iter()
        .enumerate()
        .fold(ElfBuilder::new(), |builder, (idx, kernel)| {
            let idx = idx as u64;
            builder.kernel(&kernel.name, 0x1000 + idx * 0x100, 0x100, 0x800 + idx * 0x40)
        })
        .note(note)
        .build()
}


/// Create a clang offload bundle from `(triple, data)` entries.
///
/// Entry data are laid out back to back after the directory, each
/// starting at an 8 byte aligned offset.
pub fn bundle(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let dir_size = BUNDLE_MAGIC.len()
        + 8
        + entries
            .iter()
            .map(|(triple, _data)| 24 + triple.len())
            .sum::<usize>();

    let mut offset = dir_size.next_multiple_of(8);
    let mut placed = Vec::with_capacity(entries.len());
    for (_triple, data) in entries {
        let () = placed.push(offset);
        offset = (offset + data.len()).next_multiple_of(8);
    }

    let mut bundle = BUNDLE_MAGIC.to_vec();
    let () = bundle.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    for ((triple, data), offset) in entries.iter().zip(&placed) {
        let () = bundle.extend_from_slice(&(*offset as u64).to_le_bytes());
        let () = bundle.extend_from_slice(&(data.len() as u64).to_le_bytes());
        let () = bundle.extend_from_slice(&(triple.len() as u64).to_le_bytes());
        let () = bundle.extend_from_slice(triple.as_bytes());
    }
    assert_eq!(bundle.len(), dir_size);

    for ((_triple, data), offset) in entries.iter().zip(&placed) {
        let () = bundle.resize(*offset, 0);
        let () = bundle.extend_from_slice(data);
    }
    bundle
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Sanity check the generated ELF layout.
    #[test]
    fn elf_layout() {
        let elf = ElfBuilder::new().func("k", 0x1000, 4).build();
        assert_eq!(&elf[..4], b"\x7fELF");
        let shoff = u64::from_le_bytes(elf[40..48].try_into().unwrap()) as usize;
        let shnum = u16::from_le_bytes(elf[60..62].try_into().unwrap()) as usize;
        assert_eq!(shoff + shnum * SHDR_SIZE, elf.len());
        assert_eq!(shnum, 6);
    }

    /// Check that the note name is padded.
    #[test]
    fn note_layout() {
        let note = NoteBuilder::new().build();
        assert_eq!(u32::from_le_bytes(note[0..4].try_into().unwrap()), 7);
        assert_eq!(&note[12..18], b"AMDGPU");
        assert_eq!(note.len() % 4, 0);
    }
}
