//! Global registry of packed functions and the calls generated code makes into it.

use crate::abi::{FfiAny, PackedCFunc};
use crate::last_error;
use parking_lot::RwLock;
use std::ffi::{c_char, c_void, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A registered packed function. Its address is the handle generated code caches.
#[derive(Debug)]
pub struct PackedFunction {
    pub name: String,
    func: PackedCFunc,
    /// Passed to `func` as its `self` argument.
    resource: usize,
    lookups: AtomicUsize,
}

pub type FunctionHandle = *const PackedFunction;

// Entries are leaked so handles stay valid for the life of the process.
static REGISTRY: RwLock<Vec<&'static PackedFunction>> = RwLock::new(Vec::new());

/// Registers `func` under `name`, replacing any earlier registration for later lookups.
pub fn register_packed(name: &str, func: PackedCFunc, resource: *mut c_void) -> FunctionHandle {
    let entry: &'static PackedFunction = Box::leak(Box::new(PackedFunction {
        name: name.to_string(),
        func,
        resource: resource as usize,
        lookups: AtomicUsize::new(0),
    }));
    let mut registry = REGISTRY.write();
    if let Some(slot) = registry.iter_mut().find(|existing| existing.name == name) {
        log::warn!("Replacing packed function {name}");
        *slot = entry;
    } else {
        log::debug!("Registered packed function {name}");
        registry.push(entry);
    }
    entry
}

pub fn find_packed(name: &str) -> Option<&'static PackedFunction> {
    REGISTRY.read().iter().find(|entry| entry.name == name).copied()
}

/// How many times generated code looked `name` up.
pub fn lookup_count(name: &str) -> usize {
    find_packed(name).map_or(0, |entry| entry.lookups.load(Ordering::Relaxed))
}

/// Calls a packed function by handle.
///
/// # Safety
///
/// `handle` must come from `register_packed`; `args` and `result` must point to `nargs` and one
/// valid tagged values.
#[no_mangle]
pub unsafe extern "C" fn kiln_ffi_function_call(
    handle: FunctionHandle,
    args: *const FfiAny,
    nargs: i32,
    result: *mut FfiAny,
) -> i32 {
    let Some(entry) = handle.as_ref() else {
        last_error::set("ValueError", "call through a null function handle");
        return -1;
    };
    (entry.func)(entry.resource as *mut c_void, args, nargs, result)
}

/// Resolves `name` for a module and writes the handle to `out`.
///
/// # Safety
///
/// `name` must be a NUL-terminated string and `out` writable.
#[no_mangle]
pub unsafe extern "C" fn kiln_backend_get_func_from_env(
    _module_ctx: *mut c_void,
    name: *const c_char,
    out: *mut FunctionHandle,
) -> i32 {
    let name = CStr::from_ptr(name).to_string_lossy();
    match find_packed(&name) {
        Some(entry) => {
            entry.lookups.fetch_add(1, Ordering::Relaxed);
            *out = entry;
            0
        }
        None => {
            last_error::set("AttributeError", &format!("packed function {name} is not registered"));
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    unsafe extern "C" fn answer(_: *mut c_void, _: *const FfiAny, _: i32, result: *mut FfiAny) -> i32 {
        *result = FfiAny::int(42);
        0
    }

    #[test]
    fn lookup_counts_and_calls() {
        register_packed("registry_test.answer", answer, ptr::null_mut());
        let name = CString::new("registry_test.answer").unwrap();
        let mut handle: FunctionHandle = ptr::null();
        let mut result = FfiAny::none();
        unsafe {
            assert_eq!(kiln_backend_get_func_from_env(ptr::null_mut(), name.as_ptr(), &mut handle), 0);
            assert_eq!(kiln_ffi_function_call(handle, ptr::null(), 0, &mut result), 0);
        }
        assert_eq!(result.as_int(), Some(42));
        assert_eq!(lookup_count("registry_test.answer"), 1);
    }

    #[test]
    fn missing_function_raises() {
        let name = CString::new("registry_test.missing").unwrap();
        let mut handle: FunctionHandle = ptr::null();
        let status = unsafe { kiln_backend_get_func_from_env(ptr::null_mut(), name.as_ptr(), &mut handle) };
        assert_eq!(status, -1);
        let err = last_error::take().unwrap();
        assert_eq!(err.kind, "AttributeError");
        assert!(err.message.contains("registry_test.missing"));
    }
}
