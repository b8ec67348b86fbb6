use crate::record::{AbiType, RecordLayout};
use crate::LayoutError;
use cranelift_codegen::ir::Type as ClifType;
use repc::Target;
use std::fmt;

/// Field positions inside the ABI records.
pub mod field {
    pub const DEVICE_TYPE: usize = 0;
    pub const DEVICE_ID: usize = 1;

    pub const DTYPE_CODE: usize = 0;
    pub const DTYPE_BITS: usize = 1;
    pub const DTYPE_LANES: usize = 2;

    pub const ARRAY_DATA: usize = 0;
    pub const ARRAY_DEVICE: usize = 1;
    pub const ARRAY_NDIM: usize = 2;
    pub const ARRAY_DTYPE: usize = 3;
    pub const ARRAY_SHAPE: usize = 4;
    pub const ARRAY_STRIDES: usize = 5;
    pub const ARRAY_BYTE_OFFSET: usize = 6;

    pub const ANY_TYPE_INDEX: usize = 0;
    pub const ANY_PADDING: usize = 1;
    pub const ANY_PAYLOAD: usize = 2;

    pub const PENV_SYNC_HANDLE: usize = 0;
    pub const PENV_NUM_TASK: usize = 1;
}

/// Runtime type indices stored in the first word of a tagged value.
pub mod type_index {
    pub const NONE: i32 = 0;
    pub const INT: i32 = 1;
    pub const BOOL: i32 = 2;
    pub const FLOAT: i32 = 3;
    pub const OPAQUE_PTR: i32 = 4;
    pub const DATA_TYPE: i32 = 5;
    pub const DEVICE: i32 = 6;
    pub const ARRAY_PTR: i32 = 7;
    pub const RAW_STR: i32 = 8;
}

/// Layouts of every record shared with the runtime.
///
/// Built once per code generation session; field order is part of the cross-module ABI.
#[derive(Clone)]
pub struct AbiTypeCatalog {
    target: Target,
    pub pointer_bytes: u32,
    pub shape_index: AbiType,
    pub device: RecordLayout,
    pub dtype: RecordLayout,
    pub array: RecordLayout,
    pub ffi_any: RecordLayout,
    pub parallel_env: RecordLayout,
}

impl fmt::Debug for AbiTypeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbiTypeCatalog")
            .field("pointer_bytes", &self.pointer_bytes)
            .field("array", &self.array.size)
            .field("ffi_any", &self.ffi_any.size)
            .field("parallel_env", &self.parallel_env.size)
            .finish()
    }
}

impl AbiTypeCatalog {
    pub fn for_host() -> Result<Self, LayoutError> {
        let target = repc::HOST_TARGET.ok_or(LayoutError::UnsupportedHost)?;
        Self::new(target)
    }

    /// Catalog for the C ABI of `triple`, a rustc-style target triple.
    pub fn for_triple(triple: &str) -> Result<Self, LayoutError> {
        let target = repc::TARGET_MAP
            .iter()
            .find(|(name, _)| *name == triple)
            .map(|(_, target)| *target)
            .ok_or_else(|| LayoutError::UnsupportedTarget(triple.to_string()))?;
        Self::new(target)
    }

    pub fn new(target: Target) -> Result<Self, LayoutError> {
        let device = RecordLayout::compute(
            target,
            "Device",
            vec![("device_type", AbiType::I32), ("device_id", AbiType::I32)],
        )?;
        let dtype = RecordLayout::compute(
            target,
            "DataType",
            vec![("code", AbiType::U8), ("bits", AbiType::U8), ("lanes", AbiType::U16)],
        )?;
        let array = RecordLayout::compute(
            target,
            "ArrayDescriptor",
            vec![
                ("data", AbiType::Ptr),
                ("device", AbiType::Record(Box::new(device.clone()))),
                ("ndim", AbiType::I32),
                ("dtype", AbiType::Record(Box::new(dtype.clone()))),
                ("shape", AbiType::Ptr),
                ("strides", AbiType::Ptr),
                ("byte_offset", AbiType::U64),
            ],
        )?;
        let ffi_any = RecordLayout::compute(
            target,
            "FfiAny",
            vec![
                ("type_index", AbiType::I32),
                ("padding", AbiType::I32),
                ("payload", AbiType::U64),
            ],
        )?;
        let parallel_env = RecordLayout::compute(
            target,
            "ParallelGroupEnv",
            vec![("sync_handle", AbiType::Ptr), ("num_task", AbiType::I32)],
        )?;
        let pointer = RecordLayout::compute(target, "Pointer", vec![("ptr", AbiType::Ptr)])?;

        Ok(AbiTypeCatalog {
            target,
            pointer_bytes: pointer.size,
            shape_index: AbiType::I64,
            device,
            dtype,
            array,
            ffi_any,
            parallel_env,
        })
    }

    /// Size in bytes of one element of the shape index type.
    pub fn shape_index_bytes(&self) -> u32 {
        8
    }

    /// Record layout for a closure capturing values of the given Cranelift types, in order.
    pub fn closure_layout(&self, name: &str, slots: &[ClifType]) -> Result<RecordLayout, LayoutError> {
        let fields = slots
            .iter()
            .map(|ty| AbiType::from_clif(*ty).map(|abi| ("slot", abi)))
            .collect::<Result<Vec<_>, _>>()?;
        RecordLayout::compute(self.target, name, fields)
    }
}

#[cfg(all(test, target_pointer_width = "64"))]
mod tests {
    use super::*;
    use cranelift_codegen::ir::types;

    fn catalog() -> AbiTypeCatalog {
        AbiTypeCatalog::for_host().expect("host target should be supported")
    }

    #[test]
    fn array_descriptor_matches_c_layout() {
        let catalog = catalog();
        assert_eq!(catalog.array.size, 48);
        assert_eq!(catalog.array.align, 8);
        assert_eq!(catalog.ffi_any.align, 8);
        assert_eq!(catalog.parallel_env.align, 8);
        assert_eq!(catalog.device.align, 4);
        assert_eq!(catalog.dtype.align, 2);
        let offsets: Vec<u32> = catalog.array.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16, 20, 24, 32, 40]);
    }

    #[test]
    fn nested_fields_resolve_through_records() {
        let catalog = catalog();
        let (offset, ty) = catalog.array.offset_of(&[field::ARRAY_DTYPE, field::DTYPE_LANES]).unwrap();
        assert_eq!(offset, 22);
        assert_eq!(*ty, AbiType::U16);
        let (offset, ty) = catalog.array.offset_of(&[field::ARRAY_DEVICE, field::DEVICE_ID]).unwrap();
        assert_eq!(offset, 12);
        assert_eq!(*ty, AbiType::I32);
    }

    #[test]
    fn tagged_value_is_sixteen_bytes() {
        let catalog = catalog();
        assert_eq!(catalog.ffi_any.size, 16);
        assert_eq!(catalog.ffi_any.field(field::ANY_PAYLOAD).unwrap().offset, 8);
        assert_eq!(catalog.parallel_env.size, 16);
        assert_eq!(catalog.parallel_env.field(field::PENV_NUM_TASK).unwrap().offset, 8);
        assert_eq!(catalog.pointer_bytes, 8);
    }

    #[test]
    fn closure_layout_pads_between_slots() {
        let catalog = catalog();
        let layout = catalog.closure_layout("closure", &[types::I32, types::I64, types::I8]).unwrap();
        let offsets: Vec<u32> = layout.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16]);
        assert_eq!(layout.size, 24);
        assert_eq!(layout.align, 8);
    }

    #[test]
    fn closure_layout_rejects_vectors() {
        let catalog = catalog();
        assert!(matches!(
            catalog.closure_layout("closure", &[types::I32X4]),
            Err(LayoutError::UnsupportedSlotType(_))
        ));
    }
}

#[cfg(test)]
mod target_tests {
    use super::*;

    #[test]
    fn i686_records_use_four_byte_pointers() {
        let catalog = AbiTypeCatalog::for_triple("i686-unknown-linux-gnu").unwrap();
        assert_eq!(catalog.pointer_bytes, 4);
        assert_eq!(catalog.parallel_env.size, 8);
        assert_eq!(catalog.parallel_env.field(field::PENV_NUM_TASK).unwrap().offset, 4);
        let offsets: Vec<u32> = catalog.array.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 12, 16, 20, 24, 28]);
        assert_eq!(catalog.ffi_any.size, 16);
        assert_eq!(catalog.ffi_any.field(field::ANY_PAYLOAD).unwrap().offset, 8);
    }

    #[test]
    fn aarch64_records_match_x86_64() {
        let arm = AbiTypeCatalog::for_triple("aarch64-unknown-linux-gnu").unwrap();
        let x86 = AbiTypeCatalog::for_triple("x86_64-unknown-linux-gnu").unwrap();
        assert_eq!(arm.pointer_bytes, 8);
        assert_eq!(arm.array.size, x86.array.size);
        assert_eq!(arm.array.align, x86.array.align);
        assert_eq!(arm.ffi_any.align, 8);
    }

    #[test]
    fn unknown_triples_are_rejected() {
        assert!(matches!(
            AbiTypeCatalog::for_triple("kiln-unknown-none"),
            Err(LayoutError::UnsupportedTarget(t)) if t == "kiln-unknown-none"
        ));
    }
}
