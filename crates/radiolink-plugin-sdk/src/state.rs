//! Helpers for the private-state slot passed to plugin hooks.
//!
//! The host hands every hook a `*mut *mut c_void` pointing at one slot per
//! loaded record. These helpers store a boxed Rust value there and get it back.

use std::ffi::c_void;

/// Store `value` in the slot, returning the previous value if one was set.
///
/// # Safety
/// `slot` must be a valid state slot, and any value already in it must have
/// been stored by this function with the same `T`.
pub unsafe fn store<T>(slot: *mut *mut c_void, value: T) -> Option<Box<T>> {
    let previous = take::<T>(slot);
    *slot = Box::into_raw(Box::new(value)) as *mut c_void;
    previous
}

/// Take the value out of the slot, leaving it empty.
///
/// # Safety
/// Same contract as [`store`].
pub unsafe fn take<T>(slot: *mut *mut c_void) -> Option<Box<T>> {
    if slot.is_null() || (*slot).is_null() {
        return None;
    }
    let raw = std::mem::replace(&mut *slot, std::ptr::null_mut());
    Some(Box::from_raw(raw as *mut T))
}

/// Borrow the value in the slot.
///
/// # Safety
/// Same contract as [`store`]; the caller must not hold the reference past
/// the plugin's `remove` hook.
pub unsafe fn get<'a, T>(slot: *mut *mut c_void) -> Option<&'a T> {
    if slot.is_null() {
        return None;
    }
    (*slot as *const T).as_ref()
}

/// Borrow the caller argument given at load time.
///
/// # Safety
/// `arg` must be null or point to a live `T`.
pub unsafe fn arg<'a, T>(arg: *mut c_void) -> Option<&'a T> {
    (arg as *const T).as_ref()
}
