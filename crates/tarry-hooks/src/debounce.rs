use std::cell::RefCell;

use tarry_core::{DelayController, DelayPolicy, Signal, remember};

use crate::hook_loop;

/// Remembered [`DelayController`] around `f`.
///
/// `f` replaces the previous pass's operation without touching timing state.
/// A different `policy` throws the old controller away (cancelled and retired)
/// and starts from scratch.
pub fn use_debounced_callback<A: 'static, R: Clone + 'static>(
    f: impl Fn(A) -> R + 'static,
    policy: DelayPolicy,
) -> DelayController<A, R> {
    let cell = remember(|| RefCell::new(None::<DelayController<A, R>>));
    let mut slot = cell.borrow_mut();

    if let Some(current) = slot.as_ref()
        && current.policy() == policy
    {
        current.set_operation(f);
        return current.clone();
    }

    if let Some(old) = slot.take() {
        log::debug!("policy changed from {:?}; rebuilding controller", old.policy());
        old.cancel();
        old.retire();
    }
    let controller = DelayController::new(f, policy, &hook_loop());
    *slot = Some(controller.clone());
    controller
}

/// Debounced copy of `value`: the returned state only follows `value` through
/// the controller, so it changes when the policy lets a call through.
///
/// The controller is returned too, for `cancel` / `flush` / `is_pending`.
pub fn use_debounced_value<T: Clone + PartialEq + 'static>(
    value: T,
    policy: DelayPolicy,
) -> (T, DelayController<T, ()>) {
    use_debounced_value_by(value, policy, |a: &T, b: &T| a == b)
}

/// [`use_debounced_value`] with a caller-supplied equality.
pub fn use_debounced_value_by<T: Clone + 'static>(
    value: T,
    policy: DelayPolicy,
    eq: impl Fn(&T, &T) -> bool,
) -> (T, DelayController<T, ()>) {
    let state = remember(|| Signal::new(value.clone()));
    let previous = remember(|| RefCell::new(value.clone()));

    let controller = use_debounced_callback(
        {
            let state = (*state).clone();
            move |v: T| state.set(v)
        },
        policy,
    );

    let changed = !eq(&previous.borrow(), &value);
    if changed {
        if let Err(err) = controller.call(value.clone()) {
            log::error!("debounced value update failed: {err:#}");
        }
        *previous.borrow_mut() = value;
    }

    (state.get(), controller)
}
