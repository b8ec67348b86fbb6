//! Symbols registered by system-library modules at startup.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr};
use std::sync::OnceLock;

fn table() -> &'static RwLock<HashMap<String, usize>> {
    static TABLE: OnceLock<RwLock<HashMap<String, usize>>> = OnceLock::new();
    TABLE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Address registered under `name`, if any.
pub fn system_lib_symbol(name: &str) -> Option<*const c_void> {
    table().read().get(name).map(|addr| *addr as *const c_void)
}

/// # Safety
///
/// `name` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn kiln_backend_register_system_lib_symbol(name: *const c_char, ptr: *mut c_void) -> i32 {
    let name = CStr::from_ptr(name).to_string_lossy().into_owned();
    let previous = table().write().insert(name.clone(), ptr as usize);
    match previous {
        Some(old) if old != ptr as usize => log::warn!("System symbol {name} registered twice"),
        _ => log::debug!("Registered system symbol {name}"),
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn registered_symbols_are_found() {
        let name = CString::new("system_lib_test.sym").unwrap();
        let mut target = 0u8;
        let ptr = &mut target as *mut u8 as *mut c_void;
        assert_eq!(unsafe { kiln_backend_register_system_lib_symbol(name.as_ptr(), ptr) }, 0);
        assert_eq!(system_lib_symbol("system_lib_test.sym"), Some(ptr as *const c_void));
        assert_eq!(system_lib_symbol("system_lib_test.other"), None);
    }
}
