//! Scratch memory requested by generated code on the CPU device.

use crate::abi::Device;
use crate::last_error;
use std::alloc::{self, Layout};
use std::ffi::c_void;

const ALIGN: usize = 64;
/// Bytes in front of every block, holding its total size.
const HEADER: usize = ALIGN;

/// # Safety
///
/// The returned block must be released with `kiln_backend_free_workspace`.
#[no_mangle]
pub unsafe extern "C" fn kiln_backend_alloc_workspace(
    device_type: i32,
    _device_id: i32,
    nbytes: u64,
    _dtype_code: i32,
    _dtype_bits: i32,
) -> *mut c_void {
    if device_type != Device::CPU {
        last_error::set("RuntimeError", &format!("no workspace on device type {device_type}"));
        return std::ptr::null_mut();
    }
    let layout = usize::try_from(nbytes)
        .ok()
        .and_then(|n| n.checked_add(HEADER))
        .and_then(|size| Layout::from_size_align(size, ALIGN).ok());
    let Some(layout) = layout else {
        last_error::set("RuntimeError", &format!("workspace of {nbytes} bytes is too large"));
        return std::ptr::null_mut();
    };
    let base = alloc::alloc(layout);
    if base.is_null() {
        last_error::set("RuntimeError", "workspace allocation failed");
        return std::ptr::null_mut();
    }
    base.cast::<usize>().write(layout.size());
    base.add(HEADER).cast()
}

/// # Safety
///
/// `ptr` must come from `kiln_backend_alloc_workspace` and not have been freed.
#[no_mangle]
pub unsafe extern "C" fn kiln_backend_free_workspace(device_type: i32, _device_id: i32, ptr: *mut c_void) -> i32 {
    if device_type != Device::CPU {
        last_error::set("RuntimeError", &format!("no workspace on device type {device_type}"));
        return -1;
    }
    if ptr.is_null() {
        return 0;
    }
    let base = ptr.cast::<u8>().sub(HEADER);
    let size = base.cast::<usize>().read();
    alloc::dealloc(base, Layout::from_size_align_unchecked(size, ALIGN));
    0
}
