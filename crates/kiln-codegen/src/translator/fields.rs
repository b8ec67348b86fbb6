// Typed addresses of fields of array descriptors and tagged values.

use cranelift_codegen::ir::{types, Type, Value};
use cranelift_module::Module;
use kiln_layout::field;
use kiln_tir::{DataType, StructField};

use super::FunctionTranslator;
use crate::{CodegenError, Result};

/// Address of one field and the type it is stored as.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldRef {
    pub addr: Value,
    pub ty: Type,
    /// IR type the stored value corresponds to.
    pub dtype: DataType,
}

impl<M: Module> FunctionTranslator<'_, '_, '_, M> {
    pub(crate) fn decode_field(&self, tag: i64) -> Result<StructField> {
        StructField::try_from(tag).map_err(|_| CodegenError::UnknownStructField {
            func: self.func_name.clone(),
            tag,
        })
    }

    /// Address of field `kind` in the `index`-th record at `base`.
    ///
    /// `dtype` only matters for the tagged-value payload, whose stored type depends on what is
    /// read or written.
    pub(crate) fn struct_field_ref(
        &mut self,
        dtype: DataType,
        base: Value,
        index: Value,
        kind: StructField,
    ) -> Result<FieldRef> {
        let catalog = &self.session.catalog;
        let array = |path: &[usize]| -> Result<(u32, u32)> {
            Ok((catalog.array.size, catalog.array.offset_of(path)?.0))
        };
        let any = |path: &[usize]| -> Result<(u32, u32)> {
            Ok((catalog.ffi_any.size, catalog.ffi_any.offset_of(path)?.0))
        };
        let ((stride, offset), natural) = match kind {
            StructField::ArrAddr => ((catalog.array.size, 0), DataType::handle()),
            StructField::ArrData => (array(&[field::ARRAY_DATA])?, DataType::handle()),
            StructField::ArrShape => (array(&[field::ARRAY_SHAPE])?, DataType::handle()),
            StructField::ArrStrides => (array(&[field::ARRAY_STRIDES])?, DataType::handle()),
            StructField::ArrNDim => (array(&[field::ARRAY_NDIM])?, DataType::int32()),
            StructField::ArrTypeCode => {
                (array(&[field::ARRAY_DTYPE, field::DTYPE_CODE])?, DataType::uint(8))
            }
            StructField::ArrTypeBits => {
                (array(&[field::ARRAY_DTYPE, field::DTYPE_BITS])?, DataType::uint(8))
            }
            StructField::ArrTypeLanes => {
                (array(&[field::ARRAY_DTYPE, field::DTYPE_LANES])?, DataType::uint(16))
            }
            StructField::ArrByteOffset => (array(&[field::ARRAY_BYTE_OFFSET])?, DataType::uint(64)),
            StructField::ArrDeviceId => {
                (array(&[field::ARRAY_DEVICE, field::DEVICE_ID])?, DataType::int32())
            }
            StructField::ArrDeviceType => {
                (array(&[field::ARRAY_DEVICE, field::DEVICE_TYPE])?, DataType::int32())
            }
            StructField::AnyTypeIndex => (any(&[field::ANY_TYPE_INDEX])?, DataType::int32()),
            StructField::AnyUnionValue => (any(&[field::ANY_PAYLOAD])?, self.payload_type(dtype)?),
        };

        let addr = self.emitter.element_addr(base, index, stride, offset);
        let ty = self.clif_type(natural)?;
        Ok(FieldRef { addr, ty, dtype: natural })
    }

    /// How a value of `dtype` sits in the payload of a tagged value.
    fn payload_type(&self, dtype: DataType) -> Result<DataType> {
        let payload = if !dtype.is_scalar() {
            None
        } else if dtype.is_bool() || dtype.is_handle() {
            Some(dtype)
        } else if (dtype.is_int() || dtype.is_float()) && dtype.bits == 64 {
            Some(dtype)
        } else {
            None
        };
        payload.ok_or_else(|| CodegenError::UnsupportedPayloadType {
            func: self.func_name.clone(),
            dtype,
        })
    }

    /// Stores `value` into a payload field, clearing the whole slot first when the value is
    /// narrower than it.
    pub(crate) fn store_payload(&mut self, field: FieldRef, value: Value) {
        if field.ty.bytes() < 8 {
            let zero = self.emitter.iconst(types::I64, 0);
            self.emitter.store(zero, field.addr, 0);
        }
        self.emitter.store(value, field.addr, 0);
    }
}
