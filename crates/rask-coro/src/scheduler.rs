// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Coroutine manager.
//!
//! One scheduler owns a slot table of coroutines, the scratch stack they
//! all run on, and the context of whoever is calling `resume`. Exactly one
//! coroutine or the caller is executing at any instant:
//!
//! - `running == None`: the caller is executing, every coroutine is Ready
//!   or Suspended and every Suspended stack lives in its snapshot.
//! - `running == Some(id)`: coroutine `id` owns the scratch stack.
//!
//! Misuse (resuming while something runs, bad ids, yielding from outside a
//! coroutine) is fatal through `resume`/`yield_now` and reported through
//! `try_resume`/`try_yield`. Resuming an empty slot is a quiet no-op.

use std::any::Any;
use std::cell::{Cell, RefCell, UnsafeCell};
use std::marker::PhantomPinned;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;

use crate::config::SchedulerConfig;
use crate::context::{DefaultContext, ExecContext};
use crate::coroutine::{CoId, CoStatus, Coroutine};
use crate::error::CoError;
use crate::stack::ScratchStack;
use crate::table::SlotTable;

/// Cooperative scheduler for stackful coroutines sharing one stack.
///
/// Always lives pinned on the heap: suspended coroutines hold `&Scheduler`
/// in their saved frames, so it must not move.
///
/// ```no_run
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use rask_coro::{CoStatus, Scheduler};
///
/// let sched = Scheduler::start().unwrap();
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let log = seen.clone();
/// let id = sched.create(move |s| {
///     for n in 1..=3 {
///         log.borrow_mut().push(n);
///         s.yield_now();
///     }
/// });
/// while sched.status(id) != CoStatus::Dead {
///     sched.resume(id);
/// }
/// assert_eq!(*seen.borrow(), vec![1, 2, 3]);
/// sched.close();
/// ```
pub struct Scheduler<C: ExecContext = DefaultContext> {
    table: RefCell<SlotTable<Coroutine<C>>>,
    running: Cell<Option<CoId>>,
    /// Where `yield` and a finished coroutine return to.
    main: UnsafeCell<C>,
    /// Sink for the final switch out of a finished coroutine.
    exit: UnsafeCell<C>,
    /// Payload of a coroutine that panicked, re-raised by `resume`.
    panicked: Cell<Option<Box<dyn Any + Send>>>,
    stack: ScratchStack,
    _pinned: PhantomPinned,
}

impl Scheduler {
    /// Start a scheduler with the default config and backend.
    pub fn start() -> Result<Pin<Box<Self>>, CoError> {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Result<Pin<Box<Self>>, CoError> {
        Self::with_backend(config)
    }
}

impl<C: ExecContext> Scheduler<C> {
    /// Start a scheduler on an explicit context backend.
    pub fn with_backend(config: SchedulerConfig) -> Result<Pin<Box<Self>>, CoError> {
        config.validate()?;
        let stack = ScratchStack::map(config.stack_size)?;
        Ok(Box::pin(Self {
            table: RefCell::new(SlotTable::with_capacity(config.initial_capacity)),
            running: Cell::new(None),
            main: UnsafeCell::new(C::empty()),
            exit: UnsafeCell::new(C::empty()),
            panicked: Cell::new(None),
            stack,
            _pinned: PhantomPinned,
        }))
    }

    /// Destroy every coroutine, whatever its state, and unmap the stack.
    ///
    /// Unstarted coroutines drop their closures. Suspended ones are freed
    /// without unwinding, so values living in their frames are not dropped.
    pub fn close(self: Pin<Box<Self>>) {
        drop(self);
    }

    /// Register `f` as a new Ready coroutine. It runs on the first
    /// `resume` of the returned id and receives this scheduler.
    pub fn create<F>(&self, f: F) -> CoId
    where
        F: FnOnce(&Scheduler<C>) + 'static,
    {
        let id = self.table.borrow_mut().insert(Coroutine::new(Box::new(f)));
        CoId::from(id)
    }

    /// Run coroutine `id` until it yields or returns.
    ///
    /// Panics on the errors `try_resume` reports, and re-raises a panic
    /// from inside the coroutine.
    pub fn resume(&self, id: CoId) {
        if let Err(err) = self.try_resume(id) {
            panic!("{}", err);
        }
    }

    pub fn try_resume(&self, id: CoId) -> Result<(), CoError> {
        if let Some(running) = self.running.get() {
            return Err(CoError::Busy {
                running,
                requested: id,
            });
        }

        let target = {
            let mut table = self.table.borrow_mut();
            let capacity = table.capacity();
            if id.index() >= capacity {
                return Err(CoError::OutOfRange { id, capacity });
            }
            let Some(co) = table.get_mut(id.index()) else {
                return Ok(());
            };
            match co.status {
                CoStatus::Dead => return Ok(()),
                CoStatus::Running => {
                    return Err(CoError::Busy {
                        running: id,
                        requested: id,
                    })
                }
                CoStatus::Ready => {
                    let arg = self as *const Self as usize;
                    // SAFETY: nothing is running, the scratch stack is free.
                    co.context = unsafe { C::bind(self.stack.region(), trampoline::<C>, arg) };
                }
                CoStatus::Suspended => {
                    // SAFETY: nothing is running and the snapshot came from
                    // this stack.
                    unsafe { self.stack.restore(&co.snapshot) };
                }
            }
            co.status = CoStatus::Running;
            &co.context as *const C
        };

        self.running.set(Some(id));
        // SAFETY: `target` is boxed in the table and only its own
        // coroutine can remove it, which happens after its final switch.
        unsafe { C::switch(self.main.get(), target) };
        self.after_switch(id)
    }

    /// Back on the caller's stack after coroutine `id` yielded or finished.
    fn after_switch(&self, id: CoId) -> Result<(), CoError> {
        if let Some(payload) = self.panicked.take() {
            panic::resume_unwind(payload);
        }

        let mut table = self.table.borrow_mut();
        let Some(co) = table.get_mut(id.index()) else {
            // Finished; the trampoline already cleared the slot.
            return Ok(());
        };
        debug_assert_eq!(co.status, CoStatus::Suspended);

        // The coroutine is frozen now, so its frames can be copied out
        // exactly: `[saved sp, top)`.
        let sp = co.context.stack_pointer();
        // SAFETY: no context runs on the scratch stack at this point.
        match unsafe { self.stack.save(sp, &mut co.snapshot) } {
            Ok(_) => Ok(()),
            Err(depth) => {
                // Its stack is incomplete; it can never run again.
                table.remove(id.index());
                Err(CoError::StackOverflow {
                    id,
                    depth,
                    limit: self.stack.size(),
                })
            }
        }
    }

    /// Suspend the running coroutine and return control to `resume`.
    ///
    /// Only meaningful from inside a coroutine. Panics if nothing runs.
    pub fn yield_now(&self) {
        if let Err(err) = self.try_yield() {
            panic!("{}", err);
        }
    }

    pub fn try_yield(&self) -> Result<(), CoError> {
        let id = self.running.get().ok_or(CoError::NotRunning)?;
        let ctx = {
            let mut table = self.table.borrow_mut();
            let co = table.get_mut(id.index()).ok_or(CoError::NotRunning)?;
            co.status = CoStatus::Suspended;
            &mut co.context as *mut C
        };
        self.running.set(None);
        // SAFETY: `main` was saved by the `resume` that is driving us.
        unsafe { C::switch(ctx, self.main.get()) };
        Ok(())
    }

    /// Dead for empty slots and ids never handed out.
    pub fn status(&self, id: CoId) -> CoStatus {
        self.table
            .borrow()
            .get(id.index())
            .map_or(CoStatus::Dead, |co| co.status)
    }

    pub fn running(&self) -> Option<CoId> {
        self.running.get()
    }

    /// Live (not Dead) coroutines.
    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots in the table. Grows by doubling, never shrinks.
    pub fn capacity(&self) -> usize {
        self.table.borrow().capacity()
    }

    /// Usable bytes of scratch stack.
    pub fn stack_size(&self) -> usize {
        self.stack.size()
    }

    /// Bytes saved at the coroutine's most recent yield.
    pub fn snapshot_len(&self, id: CoId) -> Option<usize> {
        self.table
            .borrow()
            .get(id.index())
            .map(|co| co.snapshot.len())
    }

    /// Largest stack depth the coroutine has been saved at so far.
    pub fn snapshot_capacity(&self, id: CoId) -> Option<usize> {
        self.table
            .borrow()
            .get(id.index())
            .map(|co| co.snapshot.capacity())
    }

    /// Trampoline body: run the current coroutine's closure to completion
    /// and destroy it.
    fn run_current(&self) {
        let Some(id) = self.running.get() else {
            return;
        };
        let entry = self
            .table
            .borrow_mut()
            .get_mut(id.index())
            .and_then(|co| co.entry.take());

        if let Some(entry) = entry {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| entry(self))) {
                self.panicked.set(Some(payload));
            }
        }

        drop(self.table.borrow_mut().remove(id.index()));
        self.running.set(None);
    }
}

/// First frame of every coroutine. Never returns: a finished coroutine
/// leaves by switching back to the caller of `resume` for good.
extern "C" fn trampoline<C: ExecContext>(arg: usize) -> ! {
    // SAFETY: `arg` is the pinned scheduler that bound this context; it
    // outlives every coroutine it owns.
    let sched = unsafe { &*(arg as *const Scheduler<C>) };
    sched.run_current();
    unsafe { C::switch(sched.exit.get(), sched.main.get()) };
    // Nothing switches back into `exit`.
    std::process::abort()
}

impl<C: ExecContext> std::fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.borrow();
        f.debug_struct("Scheduler")
            .field("running", &self.running.get())
            .field("len", &table.len())
            .field("capacity", &table.capacity())
            .field("stack", &self.stack)
            .field("coroutines", &table.iter().collect::<Vec<_>>())
            .finish()
    }
}
