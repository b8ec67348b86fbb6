use crate::TirError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Intrinsic operations that may appear as the callee of an `Expr::Call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Builtin {
    /// `(name, stack, begin, end)`: packed call through a handle resolved by name.
    CallPackedLowered,
    /// `(name, stack, begin, end, traced)`: packed call that keeps `traced` when the callee
    /// returned nothing.
    CallTracePackedLowered,
    /// `(name, stack, begin, end)`: packed call to a C symbol linked into the module.
    CallCPackedLowered,
    /// `()`: address of a fresh module-private pointer cell.
    StaticHandle,
    /// `()`: return -1 from the current function.
    ThrowLastError,
    /// `(base, index, field)`.
    StructGet,
    /// `(base, index, field, value)`.
    StructSet,
    /// `(type, count)`: stack array of ABI records.
    StackAlloca,
    /// `(name, args...)`: plain C call.
    CallExtern,
    /// `(value)`: bit-level reinterpretation to the call's dtype.
    Reinterpret,
    /// `(handle)`: whether the handle is null.
    IsNullPointer,
    /// `(cond)`: branch hint, lowered as its argument.
    Likely,
    /// `(value)`: return `value` from the current function.
    Ret,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::CallPackedLowered => "call_packed_lowered",
            Builtin::CallTracePackedLowered => "call_trace_packed_lowered",
            Builtin::CallCPackedLowered => "call_cpacked_lowered",
            Builtin::StaticHandle => "static_handle",
            Builtin::ThrowLastError => "throw_last_error",
            Builtin::StructGet => "struct_get",
            Builtin::StructSet => "struct_set",
            Builtin::StackAlloca => "stack_alloca",
            Builtin::CallExtern => "call_extern",
            Builtin::Reinterpret => "reinterpret",
            Builtin::IsNullPointer => "isnullptr",
            Builtin::Likely => "likely",
            Builtin::Ret => "ret",
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field tags accepted by `struct_get` / `struct_set`.
///
/// The numeric values are the IR encoding; tags below `ARRAY_KIND_BOUND` address fields of an
/// array descriptor, the rest address fields of a tagged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructField {
    ArrAddr = 0,
    ArrData = 1,
    ArrShape = 2,
    ArrStrides = 3,
    ArrNDim = 4,
    ArrTypeCode = 5,
    ArrTypeBits = 6,
    ArrTypeLanes = 7,
    ArrByteOffset = 8,
    ArrDeviceId = 9,
    ArrDeviceType = 10,
    AnyTypeIndex = 12,
    AnyUnionValue = 13,
}

impl StructField {
    pub const ARRAY_KIND_BOUND: i64 = 11;

    pub fn is_array_field(&self) -> bool {
        (*self as i64) < Self::ARRAY_KIND_BOUND
    }
}

impl TryFrom<i64> for StructField {
    type Error = TirError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => StructField::ArrAddr,
            1 => StructField::ArrData,
            2 => StructField::ArrShape,
            3 => StructField::ArrStrides,
            4 => StructField::ArrNDim,
            5 => StructField::ArrTypeCode,
            6 => StructField::ArrTypeBits,
            7 => StructField::ArrTypeLanes,
            8 => StructField::ArrByteOffset,
            9 => StructField::ArrDeviceId,
            10 => StructField::ArrDeviceType,
            12 => StructField::AnyTypeIndex,
            13 => StructField::AnyUnionValue,
            other => return Err(TirError::UnknownStructField(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_tags_decode() {
        assert_eq!(StructField::try_from(1).unwrap(), StructField::ArrData);
        assert_eq!(StructField::try_from(13).unwrap(), StructField::AnyUnionValue);
        assert!(StructField::ArrDeviceType.is_array_field());
        assert!(!StructField::AnyTypeIndex.is_array_field());
    }

    #[test]
    fn kind_bound_is_not_a_field() {
        assert!(matches!(
            StructField::try_from(StructField::ARRAY_KIND_BOUND),
            Err(TirError::UnknownStructField(11))
        ));
    }
}
