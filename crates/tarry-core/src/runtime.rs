use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::event_loop::EventLoop;
use crate::scope::Scope;

thread_local! {
    static CURRENT: RefCell<Option<Rc<CompositionInner>>> = const { RefCell::new(None) };
}

#[derive(Default)]
struct Composer {
    slots: Vec<Box<dyn Any>>,
    cursor: usize,
    keyed_slots: HashMap<String, Box<dyn Any>>,
}

struct CompositionInner {
    scope: Scope,
    event_loop: EventLoop,
    composer: RefCell<Composer>,
    passes: Cell<u64>,
}

/// Slot storage plus the scope that owns everything remembered in it.
///
/// Each [`Composition::compose`] call is one pass: `remember` slots are
/// matched by call order, the scope and event loop are current for hooks.
#[derive(Clone)]
pub struct Composition {
    inner: Rc<CompositionInner>,
}

/// Makes a composition current for the duration of a pass.
pub struct ComposeGuard {
    prev: Option<Rc<CompositionInner>>,
}

impl ComposeGuard {
    fn begin(inner: Rc<CompositionInner>) -> Self {
        inner.composer.borrow_mut().cursor = 0;
        inner.passes.set(inner.passes.get() + 1);
        let prev = CURRENT.with(|c| c.borrow_mut().replace(inner));
        ComposeGuard { prev }
    }
}

impl Drop for ComposeGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT.with(|c| *c.borrow_mut() = prev);
    }
}

impl Composition {
    pub fn new(event_loop: EventLoop) -> Self {
        Self {
            inner: Rc::new(CompositionInner {
                scope: Scope::new(),
                event_loop,
                composer: RefCell::new(Composer::default()),
                passes: Cell::new(0),
            }),
        }
    }

    pub fn compose<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = ComposeGuard::begin(self.inner.clone());
        self.inner.scope.run(f)
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    /// Number of passes run so far.
    pub fn passes(&self) -> u64 {
        self.inner.passes.get()
    }

    /// Disposes the scope (retiring its controllers) and forgets every slot.
    pub fn dispose(&self) {
        self.inner.scope.dispose();
        let mut c = self.inner.composer.borrow_mut();
        c.slots.clear();
        c.keyed_slots.clear();
    }
}

fn current() -> Option<Rc<CompositionInner>> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Event loop of the composition being run, if any.
pub fn current_loop() -> Option<EventLoop> {
    current().map(|c| c.event_loop.clone())
}

/// Slot-based remember (sequential composition only)
pub fn remember<T: 'static>(init: impl FnOnce() -> T) -> Rc<T> {
    let Some(comp) = current() else {
        log::warn!("remember called outside of a composition; value is not kept");
        return Rc::new(init());
    };

    let cursor = {
        let mut c = comp.composer.borrow_mut();
        let cursor = c.cursor;
        c.cursor += 1;

        match c.slots.get(cursor) {
            Some(slot) => {
                if let Some(rc) = slot.downcast_ref::<Rc<T>>() {
                    return rc.clone();
                }
                log::warn!(
                    "remember: slot {} type changed; replacing. \
                     If this is due to conditional composition, prefer remember_with_key.",
                    cursor
                );
            }
            // reserve the slot so remembers nested in `init` land after it
            None => c.slots.push(Box::new(())),
        }
        cursor
    };

    let rc: Rc<T> = Rc::new(init());
    comp.composer.borrow_mut().slots[cursor] = Box::new(rc.clone());
    rc
}

/// Key-based remember
pub fn remember_with_key<T: 'static>(key: impl Into<String>, init: impl FnOnce() -> T) -> Rc<T> {
    let key = key.into();
    let Some(comp) = current() else {
        log::warn!("remember_with_key('{key}') called outside of a composition; value is not kept");
        return Rc::new(init());
    };

    if let Some(existing) = comp.composer.borrow().keyed_slots.get(&key) {
        if let Some(rc) = existing.downcast_ref::<Rc<T>>() {
            return rc.clone();
        }
        log::warn!(
            "remember_with_key: key '{}' reused with a different type; replacing.",
            key
        );
    }

    let rc: Rc<T> = Rc::new(init());
    comp.composer
        .borrow_mut()
        .keyed_slots
        .insert(key, Box::new(rc.clone()));
    rc
}

pub fn remember_state<T: 'static>(init: impl FnOnce() -> T) -> Rc<RefCell<T>> {
    remember(|| RefCell::new(init()))
}

pub fn remember_state_with_key<T: 'static>(
    key: impl Into<String>,
    init: impl FnOnce() -> T,
) -> Rc<RefCell<T>> {
    remember_with_key(key, || RefCell::new(init()))
}
