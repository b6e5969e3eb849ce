// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scheduler behavior, run once per context backend.
//!
//! Each case is generic over the backend; `backend_suite!` stamps out a
//! `#[test]` per case for every backend available on the target.

use std::cell::{Cell, RefCell};
use std::hint::black_box;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;

use rask_coro::{CoError, CoId, CoStatus, ExecContext, Scheduler, SchedulerConfig};

fn start<C: ExecContext>() -> Pin<Box<Scheduler<C>>> {
    Scheduler::<C>::with_backend(SchedulerConfig::default()).unwrap()
}

fn ids_count_up_from_zero<C: ExecContext>() {
    let sched = start::<C>();
    let ids: Vec<CoId> = (0..5).map(|_| sched.create(|_| {})).collect();
    let expected: Vec<CoId> = (0..5).map(CoId::from).collect();
    assert_eq!(ids, expected);
    for id in ids {
        assert_eq!(sched.status(id), CoStatus::Ready);
    }
    assert_eq!(sched.running(), None);
    assert_eq!(sched.len(), 5);
}

fn returning_without_yield_is_dead<C: ExecContext>() {
    let sched = start::<C>();
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    let id = sched.create(move |_| flag.set(true));

    sched.resume(id);
    assert!(ran.get());
    assert_eq!(sched.status(id), CoStatus::Dead);
    assert_eq!(sched.running(), None);
    assert!(sched.is_empty());
}

fn yields_record_one_two_three<C: ExecContext>() {
    let sched = start::<C>();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let id = sched.create(move |s| {
        log.borrow_mut().push(1);
        s.yield_now();
        log.borrow_mut().push(2);
        s.yield_now();
        log.borrow_mut().push(3);
    });

    let mut statuses = Vec::new();
    for _ in 0..3 {
        sched.resume(id);
        assert_eq!(sched.running(), None);
        statuses.push(sched.status(id));
    }
    assert_eq!(
        statuses,
        vec![CoStatus::Suspended, CoStatus::Suspended, CoStatus::Dead]
    );
    assert_eq!(*seen.borrow(), vec![1, 2, 3]);
}

fn locals_survive_yields<C: ExecContext>() {
    let sched = start::<C>();
    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = out.clone();
    let id = sched.create(move |s| {
        let mut counter = 0u32;
        let mut text = String::from("co");
        for _ in 0..3 {
            counter += 1;
            text.push('!');
            s.yield_now();
        }
        sink.borrow_mut().push(format!("{} {}", counter, text));
    });

    while sched.status(id) != CoStatus::Dead {
        sched.resume(id);
    }
    assert_eq!(*out.borrow(), vec!["3 co!!!".to_string()]);
}

fn running_names_only_the_active_coroutine<C: ExecContext>() {
    let sched = start::<C>();
    let seen: Rc<RefCell<Vec<Option<CoId>>>> = Rc::new(RefCell::new(Vec::new()));

    let mut ids = Vec::new();
    for _ in 0..2 {
        let log = seen.clone();
        ids.push(sched.create(move |s| {
            for _ in 0..2 {
                log.borrow_mut().push(s.running());
                s.yield_now();
            }
        }));
    }

    for _ in 0..3 {
        for &id in &ids {
            sched.resume(id);
            assert_eq!(sched.running(), None);
        }
    }

    let seen = seen.borrow();
    assert_eq!(
        *seen,
        vec![Some(ids[0]), Some(ids[1]), Some(ids[0]), Some(ids[1])]
    );
}

fn growth_keeps_ids_and_state<C: ExecContext>() {
    let config = SchedulerConfig::new().initial_capacity(4);
    let sched = Scheduler::<C>::with_backend(config).unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let mut ids = Vec::new();
    for n in 0..4u32 {
        let log = log.clone();
        ids.push(sched.create(move |s| {
            let local = n * 10;
            s.yield_now();
            log.borrow_mut().push((n, local));
        }));
    }
    for &id in &ids {
        sched.resume(id);
        assert_eq!(sched.status(id), CoStatus::Suspended);
    }

    let extra = sched.create(|_| {});
    assert_eq!(extra, CoId::from(4));
    assert_eq!(sched.capacity(), 8);
    for (n, &id) in ids.iter().enumerate() {
        assert_eq!(id, CoId::from(n));
        assert_eq!(sched.status(id), CoStatus::Suspended);
    }

    for &id in &ids {
        sched.resume(id);
        assert_eq!(sched.status(id), CoStatus::Dead);
    }
    assert_eq!(*log.borrow(), vec![(0, 0), (1, 10), (2, 20), (3, 30)]);
}

#[inline(never)]
fn descend<C: ExecContext>(s: &Scheduler<C>, depth: usize, intact: &Cell<bool>) -> u64 {
    let mut frame = [0u8; 128];
    for (i, b) in frame.iter_mut().enumerate() {
        *b = (depth * 31 + i) as u8;
    }
    black_box(&mut frame);

    let below = if depth == 0 {
        s.yield_now();
        0
    } else {
        descend(s, depth - 1, intact)
    };

    black_box(&frame);
    if !frame
        .iter()
        .enumerate()
        .all(|(i, &b)| b == (depth * 31 + i) as u8)
    {
        intact.set(false);
    }
    below + frame.iter().map(|&b| b as u64).sum::<u64>()
}

fn expected_sum(depth: usize) -> u64 {
    (0..=depth)
        .map(|d| (0..128).map(|i| ((d * 31 + i) as u8) as u64).sum::<u64>())
        .sum()
}

fn deep_and_shallow_snapshots_stay_separate<C: ExecContext>() {
    const DEPTH: usize = 40;
    let sched = start::<C>();
    let a_intact = Rc::new(Cell::new(true));
    let a_sum = Rc::new(Cell::new(0u64));
    let b_intact = Rc::new(Cell::new(true));

    let (ok, sum) = (a_intact.clone(), a_sum.clone());
    let a = sched.create(move |s| {
        sum.set(descend(s, DEPTH, &ok));
    });

    let ok = b_intact.clone();
    let b = sched.create(move |s| {
        let mut local = [0xB0u8; 32];
        for round in 0..5 {
            local[round] = round as u8;
            black_box(&mut local);
            s.yield_now();
            if local[round] != round as u8 || local[31] != 0xB0 {
                ok.set(false);
            }
        }
    });

    sched.resume(a);
    let deep = sched.snapshot_len(a).unwrap();
    for _ in 0..3 {
        sched.resume(b);
        assert_eq!(sched.status(b), CoStatus::Suspended);
    }
    assert!(sched.snapshot_len(b).unwrap() < deep);
    assert_eq!(sched.snapshot_len(a), Some(deep));

    sched.resume(a);
    assert_eq!(sched.status(a), CoStatus::Dead);
    assert!(a_intact.get());
    assert_eq!(a_sum.get(), expected_sum(DEPTH));

    while sched.status(b) != CoStatus::Dead {
        sched.resume(b);
    }
    assert!(b_intact.get());
}

fn resuming_dead_or_empty_is_a_no_op<C: ExecContext>() {
    let sched = start::<C>();
    let id = sched.create(|_| {});
    sched.resume(id);
    assert_eq!(sched.status(id), CoStatus::Dead);

    sched.resume(id);
    assert_eq!(sched.status(id), CoStatus::Dead);
    assert_eq!(sched.running(), None);

    let empty = CoId::from(7);
    assert!(sched.try_resume(empty).is_ok());
    assert_eq!(sched.status(empty), CoStatus::Dead);
    assert_eq!(sched.running(), None);
}

fn dead_ids_are_recycled<C: ExecContext>() {
    let sched = start::<C>();
    let first = sched.create(|_| {});
    sched.resume(first);
    let second = sched.create(|_| {});
    assert_eq!(second, first);
    assert_eq!(sched.status(second), CoStatus::Ready);
}

fn out_of_range_resume_is_reported<C: ExecContext>() {
    let sched = start::<C>();
    let bad = CoId::from(sched.capacity());
    match sched.try_resume(bad) {
        Err(CoError::OutOfRange { id, capacity }) => {
            assert_eq!(id, bad);
            assert_eq!(capacity, 16);
        }
        other => panic!("expected OutOfRange, got {:?}", other),
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| sched.resume(bad)));
    assert!(result.is_err());
    assert_eq!(sched.running(), None);
}

fn resume_from_inside_a_coroutine_is_reported<C: ExecContext>() {
    let sched = start::<C>();
    let outcome = Rc::new(RefCell::new(None));
    let other = sched.create(|_| {});

    let slot = outcome.clone();
    let id = sched.create(move |s| {
        let busy = matches!(
            s.try_resume(other),
            Err(CoError::Busy { requested, .. }) if requested == other
        );
        *slot.borrow_mut() = Some((busy, s.running()));
    });

    sched.resume(id);
    assert_eq!(*outcome.borrow(), Some((true, Some(id))));
    assert_eq!(sched.status(other), CoStatus::Ready);
}

fn yield_outside_a_coroutine_is_reported<C: ExecContext>() {
    let sched = start::<C>();
    assert!(matches!(sched.try_yield(), Err(CoError::NotRunning)));
    let result = panic::catch_unwind(AssertUnwindSafe(|| sched.yield_now()));
    assert!(result.is_err());
}

fn coroutines_can_spawn_coroutines<C: ExecContext>() {
    let sched = start::<C>();
    let child = Rc::new(Cell::new(None));
    let hits = Rc::new(Cell::new(0));

    let (slot, counter) = (child.clone(), hits.clone());
    let parent = sched.create(move |s| {
        let c = counter.clone();
        slot.set(Some(s.create(move |_| c.set(c.get() + 1))));
        s.yield_now();
        counter.set(counter.get() + 10);
    });

    sched.resume(parent);
    let child = child.get().unwrap();
    assert_ne!(child, parent);
    assert_eq!(sched.status(child), CoStatus::Ready);

    sched.resume(child);
    sched.resume(parent);
    assert_eq!(hits.get(), 11);
    assert!(sched.is_empty());
}

fn round_robin_many<C: ExecContext>() {
    let sched = start::<C>();
    let total = Rc::new(Cell::new(0u64));
    let ids: Vec<CoId> = (0..100u64)
        .map(|n| {
            let total = total.clone();
            sched.create(move |s| {
                let mut mine = 0;
                for step in 0..10 {
                    mine += n * step;
                    s.yield_now();
                }
                total.set(total.get() + mine);
            })
        })
        .collect();
    assert_eq!(sched.capacity(), 128);

    while !sched.is_empty() {
        for &id in &ids {
            sched.resume(id);
        }
    }
    // sum over n of n * (0 + 1 + .. + 9)
    assert_eq!(total.get(), 45 * (0..100).sum::<u64>());
}

fn schedulers_are_independent<C: ExecContext>() {
    let one = start::<C>();
    let two = start::<C>();
    let log = Rc::new(RefCell::new(Vec::new()));

    let l = log.clone();
    let a = one.create(move |s| {
        l.borrow_mut().push("one:a");
        s.yield_now();
        l.borrow_mut().push("one:b");
    });
    let l = log.clone();
    let b = two.create(move |s| {
        l.borrow_mut().push("two:a");
        s.yield_now();
        l.borrow_mut().push("two:b");
    });
    assert_eq!(a, b);

    one.resume(a);
    two.resume(b);
    assert_eq!(one.running(), None);
    assert_eq!(two.running(), None);
    one.resume(a);
    two.resume(b);
    assert_eq!(*log.borrow(), vec!["one:a", "two:a", "one:b", "two:b"]);
    one.close();
    two.close();
}

fn close_with_suspended_coroutines<C: ExecContext>() {
    let sched = start::<C>();
    for _ in 0..3 {
        let id = sched.create(|s| loop {
            s.yield_now();
        });
        sched.resume(id);
    }
    sched.create(|_| {});
    assert_eq!(sched.len(), 4);
    sched.close();
}

fn small_stack_config<C: ExecContext>() {
    let config = SchedulerConfig::new().stack_size(64 * 1024);
    let sched = Scheduler::<C>::with_backend(config).unwrap();
    assert!(sched.stack_size() >= 64 * 1024);
    let ok = Rc::new(Cell::new(true));
    let flag = ok.clone();
    let id = sched.create(move |s| {
        descend(s, 8, &flag);
    });
    sched.resume(id);
    sched.resume(id);
    assert_eq!(sched.status(id), CoStatus::Dead);
    assert!(ok.get());
}

macro_rules! backend_suite {
    ($($case:ident),* $(,)?) => {
        mod register {
            $(
                #[test]
                fn $case() {
                    super::$case::<rask_coro::RegisterContext>();
                }
            )*
        }

        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        mod ucontext {
            $(
                #[test]
                fn $case() {
                    super::$case::<rask_coro::UContext>();
                }
            )*
        }
    };
}

backend_suite!(
    ids_count_up_from_zero,
    returning_without_yield_is_dead,
    yields_record_one_two_three,
    locals_survive_yields,
    running_names_only_the_active_coroutine,
    growth_keeps_ids_and_state,
    deep_and_shallow_snapshots_stay_separate,
    resuming_dead_or_empty_is_a_no_op,
    dead_ids_are_recycled,
    out_of_range_resume_is_reported,
    resume_from_inside_a_coroutine_is_reported,
    yield_outside_a_coroutine_is_reported,
    coroutines_can_spawn_coroutines,
    round_robin_many,
    schedulers_are_independent,
    close_with_suspended_coroutines,
    small_stack_config,
);

#[test]
fn invalid_config_is_rejected() {
    let config = SchedulerConfig::new().initial_capacity(0);
    assert!(matches!(
        Scheduler::with_config(config),
        Err(CoError::InvalidConfig(_))
    ));
}
