//! `#[repr(C)]` mirrors of the records generated code reads and writes.
//!
//! Field order and widths follow `kiln_layout::AbiTypeCatalog`; the layout tests below keep the
//! two in sync.

use kiln_layout::type_index;
use std::ffi::c_void;
use std::fmt;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Device {
    pub device_type: i32,
    pub device_id: i32,
}

impl Device {
    pub const CPU: i32 = 1;

    pub fn cpu() -> Self {
        Device { device_type: Self::CPU, device_id: 0 }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DLDataType {
    pub code: u8,
    pub bits: u8,
    pub lanes: u16,
}

/// Descriptor of a strided array passed to generated code.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ArrayDescriptor {
    pub data: *mut c_void,
    pub device: Device,
    pub ndim: i32,
    pub dtype: DLDataType,
    pub shape: *mut i64,
    pub strides: *mut i64,
    pub byte_offset: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union FfiValue {
    pub v_int64: i64,
    pub v_float64: f64,
    pub v_handle: *mut c_void,
    pub raw: u64,
}

/// Tagged value of the packed calling convention.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfiAny {
    pub type_index: i32,
    pub padding: i32,
    pub value: FfiValue,
}

impl FfiAny {
    pub fn none() -> Self {
        FfiAny { type_index: type_index::NONE, padding: 0, value: FfiValue { raw: 0 } }
    }

    pub fn int(value: i64) -> Self {
        FfiAny { type_index: type_index::INT, padding: 0, value: FfiValue { v_int64: value } }
    }

    pub fn float(value: f64) -> Self {
        FfiAny { type_index: type_index::FLOAT, padding: 0, value: FfiValue { v_float64: value } }
    }

    pub fn bool(value: bool) -> Self {
        FfiAny { type_index: type_index::BOOL, padding: 0, value: FfiValue { v_int64: value as i64 } }
    }

    pub fn opaque(ptr: *mut c_void) -> Self {
        FfiAny { type_index: type_index::OPAQUE_PTR, padding: 0, value: FfiValue { v_handle: ptr } }
    }

    pub fn array(desc: *mut ArrayDescriptor) -> Self {
        FfiAny {
            type_index: type_index::ARRAY_PTR,
            padding: 0,
            value: FfiValue { v_handle: desc.cast() },
        }
    }

    pub fn is_none(&self) -> bool {
        self.type_index == type_index::NONE
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.type_index {
            // SAFETY: the type index says the payload holds an integer.
            type_index::INT | type_index::BOOL => Some(unsafe { self.value.v_int64 }),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.type_index {
            // SAFETY: the type index says the payload holds a float.
            type_index::FLOAT => Some(unsafe { self.value.v_float64 }),
            _ => None,
        }
    }

    /// The payload as raw bits, whatever its type.
    pub fn raw(&self) -> u64 {
        // SAFETY: every payload variant is 8 plain bytes.
        unsafe { self.value.raw }
    }
}

impl fmt::Debug for FfiAny {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfiAny")
            .field("type_index", &self.type_index)
            .field("payload", &format_args!("{:#x}", self.raw()))
            .finish()
    }
}

/// Environment of one task of a parallel launch.
#[repr(C)]
#[derive(Debug)]
pub struct ParallelGroupEnv {
    /// Barrier shared by every task of the launch.
    pub sync_handle: *mut c_void,
    pub num_task: i32,
}

/// `(self, args, nargs, result) -> status`
pub type PackedCFunc =
    unsafe extern "C" fn(*mut c_void, *const FfiAny, i32, *mut FfiAny) -> i32;

/// `(task_id, penv, cdata) -> status`
pub type ParallelLambda = unsafe extern "C" fn(i32, *const ParallelGroupEnv, *mut c_void) -> i32;

/// `(cdata) -> status`
pub type StaticInitCallback = unsafe extern "C" fn(*mut c_void) -> i32;

#[cfg(all(test, target_pointer_width = "64"))]
mod tests {
    use super::*;
    use kiln_layout::{field, AbiTypeCatalog};
    use std::mem::{align_of, offset_of, size_of};

    #[test]
    fn records_match_the_code_generator_layouts() {
        let catalog = AbiTypeCatalog::for_host().unwrap();
        assert_eq!(size_of::<ArrayDescriptor>() as u32, catalog.array.size);
        assert_eq!(align_of::<ArrayDescriptor>() as u32, catalog.array.align);
        let offsets = [
            offset_of!(ArrayDescriptor, data),
            offset_of!(ArrayDescriptor, device),
            offset_of!(ArrayDescriptor, ndim),
            offset_of!(ArrayDescriptor, dtype),
            offset_of!(ArrayDescriptor, shape),
            offset_of!(ArrayDescriptor, strides),
            offset_of!(ArrayDescriptor, byte_offset),
        ];
        let expected: Vec<usize> = catalog.array.fields.iter().map(|f| f.offset as usize).collect();
        assert_eq!(offsets.to_vec(), expected);

        assert_eq!(size_of::<FfiAny>() as u32, catalog.ffi_any.size);
        assert_eq!(
            offset_of!(FfiAny, value) as u32,
            catalog.ffi_any.field(field::ANY_PAYLOAD).unwrap().offset
        );
        assert_eq!(size_of::<ParallelGroupEnv>() as u32, catalog.parallel_env.size);
        assert_eq!(
            offset_of!(ParallelGroupEnv, num_task) as u32,
            catalog.parallel_env.field(field::PENV_NUM_TASK).unwrap().offset
        );
    }

    #[test]
    fn tagged_values_report_their_payload() {
        assert_eq!(FfiAny::int(-3).as_int(), Some(-3));
        assert_eq!(FfiAny::float(1.5).as_float(), Some(1.5));
        assert_eq!(FfiAny::float(1.5).as_int(), None);
        assert_eq!(FfiAny::bool(true).raw(), 1);
        assert!(FfiAny::none().is_none());
    }
}
