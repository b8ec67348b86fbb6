//! Thread-local last error, set by generated code and packed functions before returning a
//! nonzero status.

use crate::error::RaisedError;
use std::cell::RefCell;
use std::ffi::{c_char, CStr};

thread_local! {
    static LAST_ERROR: RefCell<Option<RaisedError>> = const { RefCell::new(None) };
}

pub fn set(kind: &str, message: &str) {
    log::debug!("Raised {kind}: {message}");
    restore(RaisedError { kind: kind.to_string(), message: message.to_string() });
}

/// Puts back an error taken on another thread.
pub fn restore(err: RaisedError) {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err));
}

/// Takes the last error raised on this thread.
pub fn take() -> Option<RaisedError> {
    LAST_ERROR.with(|slot| slot.borrow_mut().take())
}

/// # Safety
///
/// Both arguments must be NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn kiln_ffi_error_set_raised(kind: *const c_char, message: *const c_char) {
    let kind = CStr::from_ptr(kind).to_string_lossy();
    let message = CStr::from_ptr(message).to_string_lossy();
    set(&kind, &message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_per_thread() {
        set("ValueError", "bad shape");
        std::thread::spawn(|| assert!(take().is_none())).join().unwrap();
        let err = take().unwrap();
        assert_eq!(err, RaisedError { kind: "ValueError".into(), message: "bad shape".into() });
        assert!(take().is_none());
    }
}
