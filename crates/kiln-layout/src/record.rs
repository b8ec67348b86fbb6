use crate::LayoutError;
use cranelift_codegen::ir::{types, Type as ClifType};
use repc::layout::{BuiltinType, Record, RecordField, RecordKind, Type, TypeVariant};
use repc::Target;

/// Scalar or nested record type of an ABI field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Ptr,
    Record(Box<RecordLayout>),
}

impl AbiType {
    /// Cranelift value type used to load or store a field of this type.
    /// Records have none.
    pub fn clif_type(&self, pointer_type: ClifType) -> Option<ClifType> {
        Some(match self {
            AbiType::I8 | AbiType::U8 => types::I8,
            AbiType::I16 | AbiType::U16 => types::I16,
            AbiType::I32 | AbiType::U32 => types::I32,
            AbiType::I64 | AbiType::U64 => types::I64,
            AbiType::F32 => types::F32,
            AbiType::F64 => types::F64,
            AbiType::Ptr => pointer_type,
            AbiType::Record(_) => return None,
        })
    }

    /// Field type matching a Cranelift value type.
    pub fn from_clif(ty: ClifType) -> Result<Self, LayoutError> {
        Ok(match ty {
            types::I8 => AbiType::I8,
            types::I16 => AbiType::I16,
            types::I32 => AbiType::I32,
            types::I64 => AbiType::I64,
            types::F32 => AbiType::F32,
            types::F64 => AbiType::F64,
            other => return Err(LayoutError::UnsupportedSlotType(other.to_string())),
        })
    }

    fn to_repc(&self) -> Type<()> {
        let builtin = |b: BuiltinType| Type {
            layout: (),
            annotations: vec![],
            variant: TypeVariant::Builtin(b),
        };
        match self {
            AbiType::I8 => builtin(BuiltinType::Char),
            AbiType::U8 => builtin(BuiltinType::UnsignedChar),
            AbiType::I16 => builtin(BuiltinType::Short),
            AbiType::U16 => builtin(BuiltinType::UnsignedShort),
            AbiType::I32 => builtin(BuiltinType::Int),
            AbiType::U32 => builtin(BuiltinType::UnsignedInt),
            AbiType::I64 => builtin(BuiltinType::LongLong),
            AbiType::U64 => builtin(BuiltinType::UnsignedLongLong),
            AbiType::F32 => builtin(BuiltinType::Float),
            AbiType::F64 => builtin(BuiltinType::Double),
            AbiType::Ptr => builtin(BuiltinType::Pointer),
            AbiType::Record(record) => record.to_repc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: &'static str,
    pub offset: u32,
    pub size: u32,
    pub ty: AbiType,
}

/// C layout of a struct, as computed by `repc` for the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    pub name: String,
    pub size: u32,
    pub align: u32,
    pub fields: Vec<FieldLayout>,
}

impl RecordLayout {
    /// Lays out `fields` in order with C struct rules.
    pub fn compute(
        target: Target,
        name: impl Into<String>,
        fields: Vec<(&'static str, AbiType)>,
    ) -> Result<Self, LayoutError> {
        let name = name.into();
        let record_type = Type {
            layout: (),
            annotations: vec![],
            variant: TypeVariant::Record(Record {
                kind: RecordKind::Struct,
                fields: fields
                    .iter()
                    .map(|(_, ty)| RecordField {
                        layout: None,
                        annotations: vec![],
                        named: true,
                        bit_width: None,
                        ty: ty.to_repc(),
                    })
                    .collect(),
            }),
        };

        let computed = repc::compute_layout(target, &record_type)?;
        let repc_record = match computed.variant {
            TypeVariant::Record(record) => record,
            _ => return Err(LayoutError::NotARecord(name)),
        };

        let mut laid_out = Vec::with_capacity(fields.len());
        for (index, ((field_name, ty), field)) in fields.into_iter().zip(repc_record.fields.iter()).enumerate() {
            let field_layout = field
                .layout
                .ok_or_else(|| LayoutError::MissingFieldLayout(name.clone(), index))?;
            laid_out.push(FieldLayout {
                name: field_name,
                offset: (field_layout.offset_bits / 8) as u32,
                size: (field.ty.layout.size_bits / 8) as u32,
                ty,
            });
        }

        log::debug!(
            "Computed layout for {}: {} bytes, align {}",
            name,
            computed.layout.size_bits / 8,
            computed.layout.pointer_alignment_bits / 8
        );

        Ok(RecordLayout {
            name,
            size: (computed.layout.size_bits / 8) as u32,
            align: (computed.layout.pointer_alignment_bits / 8) as u32,
            fields: laid_out,
        })
    }

    pub fn field(&self, index: usize) -> Result<&FieldLayout, LayoutError> {
        self.fields
            .get(index)
            .ok_or_else(|| LayoutError::InvalidFieldIndex(self.name.clone(), index))
    }

    /// Byte offset and type of the field reached by following `path` through nested records.
    pub fn offset_of(&self, path: &[usize]) -> Result<(u32, &AbiType), LayoutError> {
        let (first, rest) = path
            .split_first()
            .ok_or_else(|| LayoutError::InvalidFieldIndex(self.name.clone(), 0))?;
        let field = self.field(*first)?;
        if rest.is_empty() {
            return Ok((field.offset, &field.ty));
        }
        match &field.ty {
            AbiType::Record(inner) => {
                let (inner_offset, ty) = inner.offset_of(rest)?;
                Ok((field.offset + inner_offset, ty))
            }
            _ => Err(LayoutError::NotARecord(field.name.to_string())),
        }
    }

    fn to_repc(&self) -> Type<()> {
        Type {
            layout: (),
            annotations: vec![],
            variant: TypeVariant::Record(Record {
                kind: RecordKind::Struct,
                fields: self
                    .fields
                    .iter()
                    .map(|field| RecordField {
                        layout: None,
                        annotations: vec![],
                        named: true,
                        bit_width: None,
                        ty: field.ty.to_repc(),
                    })
                    .collect(),
            }),
        }
    }
}
