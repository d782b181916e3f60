use std::cell::RefCell;

use tarry_core::remember;

/// The value passed on the previous pass; `None` on the first one.
pub fn use_previous<T: Clone + 'static>(value: T) -> Option<T> {
    let slot = remember(|| RefCell::new(None::<T>));
    slot.replace(Some(value))
}
