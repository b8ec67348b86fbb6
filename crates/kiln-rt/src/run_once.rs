//! One-time initialization of static handle cells.

use crate::abi::StaticInitCallback;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, OnceLock};

/// Written to a cell once its initializer has succeeded.
const DONE: *mut c_void = 1 as *mut c_void;

fn cell_lock(cell: usize) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<usize, Arc<Mutex<()>>>>> = OnceLock::new();
    let locks = LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    locks.lock().entry(cell).or_default().clone()
}

/// Runs `callback(cdata)` unless the cell was already initialized.
///
/// A failed initializer leaves the cell untouched, so the next caller retries.
///
/// # Safety
///
/// `cell` must be a pointer-sized, pointer-aligned global that is only written here.
#[no_mangle]
pub unsafe extern "C" fn kiln_backend_run_once(
    cell: *mut *mut c_void,
    callback: StaticInitCallback,
    cdata: *mut c_void,
    _nbytes: i32,
) -> i32 {
    // SAFETY: the caller guarantees `cell` is a valid, aligned pointer cell.
    let state = AtomicPtr::from_ptr(cell);
    if !state.load(Ordering::Acquire).is_null() {
        return 0;
    }
    let lock = cell_lock(cell as usize);
    let _guard = lock.lock();
    if !state.load(Ordering::Acquire).is_null() {
        return 0;
    }
    let status = callback(cdata);
    if status == 0 {
        state.store(DONE, Ordering::Release);
        log::debug!("Static initializer for cell {cell:p} finished");
    }
    status
}
