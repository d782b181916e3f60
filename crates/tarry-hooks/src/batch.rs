use std::cell::RefCell;
use std::rc::Rc;

use tarry_core::{DelayController, DelayPolicy, remember};
use web_time::Duration;

use crate::debounce::use_debounced_callback;

/// Items pushed during a burst, handed over in one batch once pushes stop
/// for the configured delay.
pub struct BatchStack<T: 'static> {
    items: Rc<RefCell<Vec<T>>>,
    controller: DelayController<(), ()>,
}

impl<T: 'static> Clone for BatchStack<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            controller: self.controller.clone(),
        }
    }
}

impl<T: 'static> BatchStack<T> {
    pub fn push(&self, item: T) {
        self.items.borrow_mut().push(item);
        if let Err(err) = self.controller.call(()) {
            log::error!("batch delivery failed: {err:#}");
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn is_pending(&self) -> bool {
        self.controller.is_pending()
    }

    /// Delivers the current batch now instead of waiting.
    pub fn flush(&self) {
        if let Err(err) = self.controller.flush() {
            log::error!("batch delivery failed: {err:#}");
        }
    }

    /// Drops the pending batch without delivering it and returns it.
    pub fn clear(&self) -> Vec<T> {
        self.controller.cancel();
        std::mem::take(&mut *self.items.borrow_mut())
    }
}

/// Remembered [`BatchStack`]. `on_flush` receives items in push order; the
/// latest `on_flush` is the one called.
pub fn use_batched_stack<T: 'static>(
    delay: Duration,
    on_flush: impl Fn(Vec<T>) + 'static,
) -> BatchStack<T> {
    let items = remember(|| Rc::new(RefCell::new(Vec::<T>::new())));

    let controller = use_debounced_callback(
        {
            let items = (*items).clone();
            move |()| {
                let batch = std::mem::take(&mut *items.borrow_mut());
                if !batch.is_empty() {
                    log::debug!("delivering batch of {}", batch.len());
                    on_flush(batch);
                }
            }
        },
        DelayPolicy::new().delay(delay),
    );

    BatchStack {
        items: (*items).clone(),
        controller,
    }
}
