//! Host functions exported to native units.
//!
//! A native entry point typically looks like:
//!
//! ```c
//! void capsule_init_fast(void) {
//!     capsule_unit_register("fast");
//!     capsule_unit_set_int("answer", 42);
//! }
//! ```
//!
//! The attribute functions return `0` on success and `-1` when there is no
//! initialization in progress on the calling thread or an argument is
//! invalid. The host binary must export its dynamic symbols (`-rdynamic`)
//! so libraries can resolve these.

use super::context::with_current;
use crate::unit::Value;
use std::ffi::{c_char, c_int, CStr};
use tracing::{debug, warn};

const OK: c_int = 0;
const ERR: c_int = -1;

/// Register (or reuse) the unit for `name`, qualified through the current context.
///
/// # Safety
///
/// `name` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn capsule_unit_register(name: *const c_char) -> c_int {
    let Some(name) = borrow_str(name) else {
        return ERR;
    };

    with_current(|ctx| match ctx {
        Some(ctx) => {
            let qualified = ctx.qualify(name);
            let (unit, _) = ctx.registry().get_or_create(&qualified);
            debug!("Native initializer registered {}", qualified);
            ctx.set_registered(unit);
            OK
        }
        None => {
            warn!("capsule_unit_register({}) called outside a native load", name);
            ERR
        }
    })
}

/// Set a string attribute on the most recently registered unit.
///
/// # Safety
///
/// `key` and `value` must be null or valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn capsule_unit_set_str(key: *const c_char, value: *const c_char) -> c_int {
    let (Some(key), Some(value)) = (borrow_str(key), borrow_str(value)) else {
        return ERR;
    };
    set_attr(key, Value::Str(value.to_string()))
}

/// Set an integer attribute on the most recently registered unit.
///
/// # Safety
///
/// `key` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn capsule_unit_set_int(key: *const c_char, value: i64) -> c_int {
    let Some(key) = borrow_str(key) else {
        return ERR;
    };
    set_attr(key, Value::Int(value))
}

/// Reclamation suspension depth of the loading runtime, `-1` outside a native load.
#[no_mangle]
pub extern "C" fn capsule_reclamation_depth() -> c_int {
    with_current(|ctx| match ctx.and_then(|ctx| ctx.reclamation()) {
        Some(gate) => c_int::try_from(gate.depth()).unwrap_or(c_int::MAX),
        None => ERR,
    })
}

/// Addresses of the exported host functions.
///
/// The native loader takes these so every executable able to load native
/// units links the functions in.
pub fn exported_functions() -> [usize; 4] {
    [
        capsule_unit_register as usize,
        capsule_unit_set_str as usize,
        capsule_unit_set_int as usize,
        capsule_reclamation_depth as usize,
    ]
}

fn set_attr(key: &str, value: Value) -> c_int {
    with_current(|ctx| match ctx.and_then(|ctx| ctx.registered()) {
        Some(unit) => {
            unit.set_attr(key, value);
            OK
        }
        None => ERR,
    })
}

/// # Safety
///
/// `ptr` must be null or a valid NUL-terminated string outliving `'a`.
unsafe fn borrow_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}
