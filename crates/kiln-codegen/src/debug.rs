//! Subprogram and base-type metadata for emitted functions.
//!
//! Records are always kept in memory when enabled; object output additionally gets DWARF
//! `.debug_abbrev`, `.debug_info` and `.debug_str` sections.

use cranelift_codegen::gimli::write::{
    AttributeValue, DwarfUnit, EndianVec, Sections, UnitEntryId, Writer,
};
use cranelift_codegen::gimli::{self, DwAte, Encoding, Format, RunTimeEndian, SectionId};
use kiln_tir::{DataType, TypeCode, Var};
use rustc_hash::FxHashMap;

use crate::{CodegenError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseType {
    pub name: String,
    pub byte_size: u8,
    pub encoding: DwAte,
    /// Handles are described as `void*` rather than as a base type.
    pub pointer: bool,
}

impl BaseType {
    pub fn of(dtype: DataType, pointer_bytes: u8) -> Self {
        let (encoding, pointer) = match dtype.code {
            TypeCode::Int => (gimli::DW_ATE_signed, false),
            TypeCode::UInt => (gimli::DW_ATE_unsigned, false),
            TypeCode::Float => (gimli::DW_ATE_float, false),
            TypeCode::Bool => (gimli::DW_ATE_boolean, false),
            TypeCode::Handle | TypeCode::Void => (gimli::DW_ATE_address, true),
        };
        let byte_size = if pointer { pointer_bytes } else { dtype.bytes().max(1) as u8 };
        BaseType { name: dtype.to_string(), byte_size, encoding, pointer }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugParam {
    pub name: String,
    pub ty: BaseType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subprogram {
    pub name: String,
    pub params: Vec<DebugParam>,
    pub ret: BaseType,
    /// Not visible outside the module.
    pub local: bool,
}

/// Collects subprogram records; every method is a no-op when disabled.
#[derive(Debug, Clone)]
pub struct DebugInfoEmitter {
    enabled: bool,
    pointer_bytes: u8,
    subprograms: Vec<Subprogram>,
}

impl DebugInfoEmitter {
    pub fn new(enabled: bool, pointer_bytes: u8) -> Self {
        DebugInfoEmitter { enabled, pointer_bytes, subprograms: Vec::new() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn add_function(&mut self, name: &str, params: &[Var], local: bool) {
        if !self.enabled {
            return;
        }
        let params = params
            .iter()
            .map(|var| DebugParam {
                name: var.name.clone(),
                ty: BaseType::of(var.dtype, self.pointer_bytes),
            })
            .collect();
        log::debug!("Recording debug info for {name}");
        self.subprograms.push(Subprogram {
            name: name.to_string(),
            params,
            ret: BaseType::of(DataType::int32(), self.pointer_bytes),
            local,
        });
    }

    pub fn subprograms(&self) -> &[Subprogram] {
        &self.subprograms
    }

    pub fn into_subprograms(self) -> Vec<Subprogram> {
        self.subprograms
    }

    /// Writes the compile unit for `module_name`. Returns `None` when disabled.
    pub fn write_dwarf(&self, module_name: &str, endian: RunTimeEndian) -> Result<Option<DwarfSections>> {
        if !self.enabled {
            return Ok(None);
        }
        let encoding = Encoding {
            format: Format::Dwarf32,
            version: 4,
            address_size: self.pointer_bytes,
        };
        let mut dwarf = DwarfUnit::new(encoding);
        let producer = dwarf.strings.add(format!("kiln-codegen {}", env!("CARGO_PKG_VERSION")));
        let name = dwarf.strings.add(module_name);
        let root = dwarf.unit.root();
        let cu = dwarf.unit.get_mut(root);
        cu.set(gimli::DW_AT_producer, AttributeValue::StringRef(producer));
        cu.set(gimli::DW_AT_name, AttributeValue::StringRef(name));
        cu.set(gimli::DW_AT_language, AttributeValue::Language(gimli::DW_LANG_C99));

        let mut types: FxHashMap<BaseType, UnitEntryId> = FxHashMap::default();
        for sub in &self.subprograms {
            let ret = type_entry(&mut dwarf, &mut types, &sub.ret);
            let params: Vec<(String, UnitEntryId)> = sub
                .params
                .iter()
                .map(|p| (p.name.clone(), type_entry(&mut dwarf, &mut types, &p.ty)))
                .collect();

            let name = dwarf.strings.add(sub.name.as_str());
            let entry = dwarf.unit.add(root, gimli::DW_TAG_subprogram);
            let die = dwarf.unit.get_mut(entry);
            die.set(gimli::DW_AT_name, AttributeValue::StringRef(name));
            die.set(gimli::DW_AT_external, AttributeValue::Flag(!sub.local));
            die.set(gimli::DW_AT_prototyped, AttributeValue::Flag(true));
            die.set(gimli::DW_AT_type, AttributeValue::UnitRef(ret));
            for (param_name, ty) in params {
                let param_name = dwarf.strings.add(param_name);
                let param = dwarf.unit.add(entry, gimli::DW_TAG_formal_parameter);
                let die = dwarf.unit.get_mut(param);
                die.set(gimli::DW_AT_name, AttributeValue::StringRef(param_name));
                die.set(gimli::DW_AT_type, AttributeValue::UnitRef(ty));
            }
        }

        let mut sections = Sections::new(RelocWriter::new(endian));
        dwarf
            .write(&mut sections)
            .map_err(|e| CodegenError::DebugInfo(e.to_string()))?;

        let mut out = DwarfSections::default();
        sections
            .for_each(|id, writer| {
                if !writer.inner.slice().is_empty() {
                    out.sections.push(DwarfSection {
                        id,
                        data: writer.inner.slice().to_vec(),
                        relocs: writer.relocs.clone(),
                    });
                }
                Ok::<(), gimli::write::Error>(())
            })
            .map_err(|e| CodegenError::DebugInfo(e.to_string()))?;
        Ok(Some(out))
    }
}

fn type_entry(
    dwarf: &mut DwarfUnit,
    types: &mut FxHashMap<BaseType, UnitEntryId>,
    ty: &BaseType,
) -> UnitEntryId {
    if let Some(id) = types.get(ty) {
        return *id;
    }
    let root = dwarf.unit.root();
    let id = if ty.pointer {
        let id = dwarf.unit.add(root, gimli::DW_TAG_pointer_type);
        dwarf
            .unit
            .get_mut(id)
            .set(gimli::DW_AT_byte_size, AttributeValue::Data1(ty.byte_size));
        id
    } else {
        let name = dwarf.strings.add(ty.name.as_str());
        let id = dwarf.unit.add(root, gimli::DW_TAG_base_type);
        let die = dwarf.unit.get_mut(id);
        die.set(gimli::DW_AT_name, AttributeValue::StringRef(name));
        die.set(gimli::DW_AT_byte_size, AttributeValue::Data1(ty.byte_size));
        die.set(gimli::DW_AT_encoding, AttributeValue::Encoding(ty.encoding));
        id
    };
    types.insert(ty.clone(), id);
    id
}

/// Reference from one debug section into another, resolved by the linker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugReloc {
    pub offset: u32,
    pub size: u8,
    pub target: SectionId,
    pub addend: i64,
}

#[derive(Debug, Clone)]
pub struct DwarfSection {
    pub id: SectionId,
    pub data: Vec<u8>,
    pub relocs: Vec<DebugReloc>,
}

#[derive(Debug, Clone, Default)]
pub struct DwarfSections {
    pub sections: Vec<DwarfSection>,
}

/// Section writer that records cross-section offsets as relocations.
#[derive(Clone)]
struct RelocWriter {
    inner: EndianVec<RunTimeEndian>,
    relocs: Vec<DebugReloc>,
}

impl RelocWriter {
    fn new(endian: RunTimeEndian) -> Self {
        RelocWriter { inner: EndianVec::new(endian), relocs: Vec::new() }
    }
}

impl Writer for RelocWriter {
    type Endian = RunTimeEndian;

    fn endian(&self) -> Self::Endian {
        self.inner.endian()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn write(&mut self, bytes: &[u8]) -> gimli::write::Result<()> {
        self.inner.write(bytes)
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) -> gimli::write::Result<()> {
        self.inner.write_at(offset, bytes)
    }

    fn write_offset(&mut self, val: usize, section: SectionId, size: u8) -> gimli::write::Result<()> {
        self.relocs.push(DebugReloc {
            offset: self.len() as u32,
            size,
            target: section,
            addend: val as i64,
        });
        self.write_udata(val as u64, size)
    }
}
