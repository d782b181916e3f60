use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tarry_core::*;
use tarry_hooks::*;
use web_time::Duration;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

#[test]
fn debounced_value_follows_after_quiet_period() {
    init_logs();
    let (lp, _clock) = EventLoop::manual();
    let ui = Composition::new(lp.clone());
    let policy = DelayPolicy::new().delay(ms(100));
    let render = |v: &str| ui.compose(|| use_debounced_value(v.to_string(), policy).0);

    assert_eq!(render("a"), "a");
    assert_eq!(render("ab"), "a");
    lp.run_for(ms(50));
    assert_eq!(render("abc"), "a");

    lp.run_for(ms(99));
    assert_eq!(render("abc"), "a");
    lp.run_for(ms(1));
    assert_eq!(render("abc"), "abc");
}

#[test]
fn debounced_value_with_leading_edge_updates_at_once() {
    let (lp, _clock) = EventLoop::manual();
    let ui = Composition::new(lp.clone());
    let policy = DelayPolicy::new().delay(ms(100)).leading(true);
    let render = |v: u32| ui.compose(|| use_debounced_value(v, policy).0);

    assert_eq!(render(1), 1);
    assert_eq!(render(2), 2);
    assert_eq!(render(3), 2);
    lp.run_until_idle();
    assert_eq!(render(3), 3);
}

#[test]
fn equality_fn_decides_what_counts_as_a_change() {
    let (lp, _clock) = EventLoop::manual();
    let ui = Composition::new(lp.clone());
    let policy = DelayPolicy::new().delay(ms(100));
    let render = |v: &str| {
        ui.compose(|| {
            use_debounced_value_by(v.to_string(), policy, |a: &String, b: &String| {
                a.eq_ignore_ascii_case(b)
            })
        })
    };

    render("Hi");
    let (_, controller) = render("HI");
    assert!(!controller.is_pending());

    let (shown, controller) = render("bye");
    assert_eq!(shown, "Hi");
    assert!(controller.is_pending());
}

#[test]
fn returned_controller_flushes_and_cancels() {
    let (lp, _clock) = EventLoop::manual();
    let ui = Composition::new(lp.clone());
    let policy = DelayPolicy::new().delay(ms(100));
    let render = |v: u32| ui.compose(|| use_debounced_value(v, policy));

    render(1);
    let (_, controller) = render(2);
    controller.flush().unwrap();
    assert_eq!(render(2).0, 2);

    let (_, controller) = render(3);
    controller.cancel();
    lp.run_until_idle();
    assert_eq!(render(3).0, 2);
}

#[test]
fn policy_change_rebuilds_controller() {
    let (lp, _clock) = EventLoop::manual();
    let ui = Composition::new(lp.clone());
    let short = DelayPolicy::new().delay(ms(100));
    let long = DelayPolicy::new().delay(ms(200));

    ui.compose(|| use_debounced_value(1, short));
    let (_, first) = ui.compose(|| use_debounced_value(2, short));
    assert!(first.is_pending());

    let (shown, second) = ui.compose(|| use_debounced_value(2, long));
    assert_eq!(shown, 1);
    assert!(!first.is_live());
    assert!(!first.is_pending());
    assert!(second.is_live());
    assert_eq!(second.policy(), long);

    assert_eq!(lp.run_until_idle(), 0);
    assert_eq!(ui.compose(|| use_debounced_value(2, long)).0, 1);
}

#[test]
fn repeated_policy_changes_do_not_pile_up_disposers() {
    let (lp, _clock) = EventLoop::manual();
    let ui = Composition::new(lp.clone());

    ui.compose(|| use_debounced_value(1, DelayPolicy::new().delay(ms(100))));
    let registered = ui.scope().pending_disposers();
    for step in 2..=20u64 {
        ui.compose(|| use_debounced_value(1, DelayPolicy::new().delay(ms(100 * step))));
    }
    assert_eq!(ui.scope().pending_disposers(), registered);

    let (_, controller) = ui.compose(|| use_debounced_value(2, DelayPolicy::new().delay(ms(50))));
    ui.dispose();
    assert!(!controller.is_live());
}

#[test]
fn debounced_callback_runs_latest_closure() {
    let (lp, _clock) = EventLoop::manual();
    let ui = Composition::new(lp.clone());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let policy = DelayPolicy::new().delay(ms(100));

    for pass in 1..=3u32 {
        let seen = seen.clone();
        ui.compose(move || {
            let cb = use_debounced_callback(
                move |x: u32| seen.borrow_mut().push(format!("pass{pass}:{x}")),
                policy,
            );
            cb.call(pass).unwrap();
        });
        lp.run_for(ms(10));
    }
    lp.run_until_idle();

    assert_eq!(*seen.borrow(), vec!["pass3:3".to_string()]);
}

#[test]
fn disposed_composition_never_invokes() {
    let (lp, _clock) = EventLoop::manual();
    let ui = Composition::new(lp.clone());
    let seen = Rc::new(RefCell::new(Vec::new()));

    let s = seen.clone();
    let cb = ui.compose(move || {
        use_debounced_callback(
            move |x: u32| s.borrow_mut().push(x),
            DelayPolicy::new().delay(ms(100)),
        )
    });
    cb.call(7).unwrap();
    ui.dispose();

    assert_eq!(lp.run_until_idle(), 1);
    assert_eq!(cb.flush().unwrap(), None);
    assert!(seen.borrow().is_empty());
}

#[test]
fn previous_value_lags_one_pass() {
    let (lp, _clock) = EventLoop::manual();
    let ui = Composition::new(lp);
    let prev = |v: i32| ui.compose(move || use_previous(v));

    assert_eq!(prev(1), None);
    assert_eq!(prev(2), Some(1));
    assert_eq!(prev(2), Some(2));
    assert_eq!(prev(5), Some(2));
}

#[test]
fn stored_state_reads_and_writes_through() {
    init_logs();
    let (lp, _clock) = EventLoop::manual();
    let ui = Composition::new(lp);
    let storage = MemoryStorage::new();
    storage.set("theme", "\"dark\"".to_string());
    storage.set("count", "not json".to_string());
    let shared: Rc<dyn Storage> = Rc::new(storage.clone());

    let (theme, count) = ui.compose(|| {
        (
            use_stored_state(shared.clone(), "theme", || "light".to_string()),
            use_stored_state(shared.clone(), "count", || 0u32),
        )
    });
    assert_eq!(theme.get(), "dark");
    assert_eq!(count.get(), 0);

    count.set(5).unwrap();
    assert_eq!(storage.get("count").as_deref(), Some("5"));

    let again = ui.compose(|| use_stored_state(shared.clone(), "count", || 0u32));
    assert_eq!(again.get(), 5);

    again.update(|c| *c += 1).unwrap();
    assert_eq!(count.get(), 6);
    assert_eq!(storage.get("count").as_deref(), Some("6"));

    theme.reset("light".to_string());
    assert_eq!(storage.get("theme"), None);
    assert_eq!(theme.get(), "light");
}

#[test]
fn stored_state_subscriber_can_normalise_through_set() {
    let storage = MemoryStorage::new();
    let shared: Rc<dyn Storage> = Rc::new(storage.clone());
    let state = StoredState::load(shared, "volume", || 5u32);

    let writer = state.clone();
    state.subscribe(move |v| {
        if *v > 10 {
            writer.set(10).unwrap();
        }
    });

    state.set(42).unwrap();
    assert_eq!(state.get(), 10);
    assert_eq!(storage.get("volume").as_deref(), Some("10"));
}

#[test]
fn stored_state_keeps_old_value_when_encoding_fails() {
    let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
    let state = StoredState::load(storage.clone(), "grid", HashMap::<(u8, u8), u8>::new);

    let mut grid = HashMap::new();
    grid.insert((1, 2), 3);
    match state.set(grid) {
        Err(StorageError::Encode { key, .. }) => assert_eq!(key, "grid"),
        other => panic!("expected encode error, got {other:?}"),
    }
    assert!(state.get().is_empty());
    assert_eq!(storage.get("grid"), None);
}

#[test]
fn batched_stack_delivers_burst_in_push_order() {
    let (lp, _clock) = EventLoop::manual();
    let ui = Composition::new(lp.clone());
    let delivered: Rc<RefCell<Vec<Vec<u32>>>> = Rc::new(RefCell::new(Vec::new()));

    let d = delivered.clone();
    let stack = ui.compose(move || {
        use_batched_stack(ms(50), move |batch: Vec<u32>| d.borrow_mut().push(batch))
    });

    stack.push(1);
    lp.run_for(ms(20));
    stack.push(2);
    stack.push(3);
    assert_eq!(stack.len(), 3);

    lp.run_for(ms(49));
    assert!(delivered.borrow().is_empty());
    lp.run_for(ms(1));
    assert_eq!(*delivered.borrow(), vec![vec![1, 2, 3]]);
    assert!(stack.is_empty());

    stack.push(4);
    stack.flush();
    assert_eq!(*delivered.borrow(), vec![vec![1, 2, 3], vec![4]]);

    stack.push(5);
    assert_eq!(stack.clear(), vec![5]);
    assert!(!stack.is_pending());
    lp.run_until_idle();
    assert_eq!(delivered.borrow().len(), 2);
}

#[test]
fn delayed_queue_runs_jobs_one_delay_apart() {
    let (lp, clock) = EventLoop::manual();
    let ui = Composition::new(lp.clone());
    let t0 = clock.now();
    let ran: Rc<RefCell<Vec<(u64, &str)>>> = Rc::new(RefCell::new(Vec::new()));

    let queue = ui.compose(|| use_delayed_queue(ms(100)));
    for name in ["a", "b", "c"] {
        let ran = ran.clone();
        let clock = clock.clone();
        queue.enqueue(move || {
            ran.borrow_mut()
                .push(((clock.now() - t0).as_millis() as u64, name));
            Ok(())
        });
    }
    assert_eq!(queue.len(), 3);
    assert!(queue.is_running());

    lp.run_until_idle();
    assert_eq!(*ran.borrow(), vec![(100, "a"), (200, "b"), (300, "c")]);
    assert!(!queue.is_running());
}

#[test]
fn delayed_queue_keeps_going_after_a_failed_job() {
    let (lp, _clock) = EventLoop::manual();
    let queue = DelayedQueue::new(&lp, ms(10));
    let done = Rc::new(RefCell::new(false));

    queue.enqueue(|| anyhow::bail!("first job failed"));
    let d = done.clone();
    queue.enqueue(move || {
        *d.borrow_mut() = true;
        Ok(())
    });
    lp.run_until_idle();

    assert!(*done.borrow());
    let errs = lp.take_unhandled();
    assert_eq!(errs.len(), 1);
    assert_eq!(errs[0].to_string(), "first job failed");
}

#[test]
fn delayed_queue_stops_with_its_composition() {
    let (lp, _clock) = EventLoop::manual();
    let ui = Composition::new(lp.clone());
    let ran = Rc::new(RefCell::new(0));

    let queue = ui.compose(|| use_delayed_queue(ms(100)));
    let r = ran.clone();
    queue.enqueue(move || {
        *r.borrow_mut() += 1;
        Ok(())
    });
    ui.dispose();

    assert!(queue.is_empty());
    assert!(!queue.is_running());
    let r = ran.clone();
    queue.enqueue(move || {
        *r.borrow_mut() += 1;
        Ok(())
    });
    lp.run_until_idle();
    assert_eq!(*ran.borrow(), 0);
}
