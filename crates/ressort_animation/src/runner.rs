//! Async updates
//!
//! Two pieces live here:
//!
//! - [`schedule_props`] realizes the `delay`, `pause` and `cancel` props of
//!   one update, deferring its merge through frame-driven timeouts and the
//!   target's pause/resume queues.
//! - [`run_async`] drives a [`Script`] or a chain of updates against a
//!   target. Each step goes through [`ScriptContext::next`], which checks
//!   whether the run was cancelled or superseded and unwinds with an
//!   [`Interrupt`] instead of an error.
//!
//! Cancellation is by watermark: every update carries a call id, and
//! stopping a target records the latest id as cancelled. Pending work
//! compares its own id against the watermark when it wakes.

use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use thiserror::Error;

use crate::error::{AnimationError, Result};
use crate::result::{AnimationFuture, AnimationResult};
use crate::scheduler::{Runtime, SchedulerHandle, TimeoutId};

/// Why a script step did not run to completion
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// The target was stopped or cancelled
    #[error("animation was cancelled")]
    Cancelled,
    /// A newer script or update took over the target
    #[error("animation was superseded by a newer update")]
    Superseded,
    /// A real failure, passed through to the caller
    #[error(transparent)]
    Failed(#[from] AnimationError),
}

/// Something async updates can drive
pub trait AsyncTarget: Clone + 'static {
    type Props: Clone + 'static;
    type Output: Clone + Default + 'static;

    /// Start one step of a script. `parent_id` is the call id of the script.
    #[doc(hidden)]
    fn start_nested(
        &self,
        props: Self::Props,
        parent_id: u64,
    ) -> Result<AnimationFuture<Self::Output>>;

    /// Copy inheritable props of the update that launched a script
    #[doc(hidden)]
    fn inherit(props: &mut Self::Props, launcher: &Self::Props);

    /// The current value
    fn snapshot(&self) -> Self::Output;

    /// Stop the target's animations
    fn halt(&self) -> Result<()>;
}

/// How a pending call settles
pub(crate) enum Resolution<O> {
    Done(Result<AnimationResult<O>>),
    /// Settles with the outcome of an async run
    Async(Shared<AnimationFuture<O>>),
}

pub(crate) type Resolver<O> = oneshot::Sender<Resolution<O>>;

/// A future settled through a [`Resolver`]
pub(crate) fn resolution_future<O: Clone + 'static>(
    rx: oneshot::Receiver<Resolution<O>>,
) -> AnimationFuture<O> {
    Box::pin(async move {
        match rx.await {
            Ok(Resolution::Done(result)) => result,
            Ok(Resolution::Async(future)) => future.await,
            Err(oneshot::Canceled) => Err(AnimationError::Disposed),
        }
    })
}

/// A future that is already settled
pub(crate) fn ready<O: 'static>(result: Result<AnimationResult<O>>) -> AnimationFuture<O> {
    Box::pin(futures::future::ready(result))
}

enum ResumeEntry<O> {
    Call(Rc<ScheduledCall<O>>),
    Waiter(oneshot::Sender<()>),
}

/// Per-target async bookkeeping
pub struct AsyncState<O> {
    /// Call id of the script currently in charge
    pub(crate) async_id: Option<u64>,
    /// Identity of the running script or chain
    pub(crate) async_to: Option<usize>,
    pub(crate) promise: Option<Shared<AnimationFuture<O>>>,
    /// Calls with an id at or below this are cancelled
    pub(crate) cancel_id: u64,
    pub(crate) timeouts: Vec<TimeoutId>,
    pause_queue: Vec<Rc<ScheduledCall<O>>>,
    resume_queue: Vec<ResumeEntry<O>>,
    /// Updates are held until resumed
    pub(crate) paused: bool,
    /// An update is waiting out its delay
    pub(crate) delayed: bool,
}

impl<O> Default for AsyncState<O> {
    fn default() -> Self {
        Self {
            async_id: None,
            async_to: None,
            promise: None,
            cancel_id: 0,
            timeouts: Vec::new(),
            pause_queue: Vec::new(),
            resume_queue: Vec::new(),
            paused: false,
            delayed: false,
        }
    }
}

impl<O> fmt::Debug for AsyncState<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncState")
            .field("async_id", &self.async_id)
            .field("cancel_id", &self.cancel_id)
            .field("paused", &self.paused)
            .field("delayed", &self.delayed)
            .field("timeouts", &self.timeouts.len())
            .finish()
    }
}

impl<O: Clone + 'static> AsyncState<O> {
    pub(crate) fn new_shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }
}

/// Updates dropped by [`stop_async`], settled once the arena is released
#[must_use]
pub(crate) struct StoppedCalls<O> {
    timeouts: Vec<TimeoutId>,
    calls: Vec<Rc<ScheduledCall<O>>>,
}

impl<O: 'static> StoppedCalls<O> {
    /// Cancel the timeouts; the held updates resolve as cancelled after the
    /// current mutation
    pub fn settle(self, rt: &mut Runtime) {
        for timeout in self.timeouts {
            rt.cancel_timeout(timeout);
        }
        for call in self.calls {
            rt.defer(move || call.abort());
        }
    }
}

/// Drop every pending async step of a target.
///
/// With `cancel_id`, everything issued up to that id resolves as cancelled.
pub(crate) fn stop_async<O>(
    state: &Rc<RefCell<AsyncState<O>>>,
    cancel_id: Option<u64>,
) -> StoppedCalls<O> {
    let mut st = state.borrow_mut();
    let mut calls = std::mem::take(&mut st.pause_queue);
    for entry in std::mem::take(&mut st.resume_queue) {
        if let ResumeEntry::Call(call) = entry {
            calls.push(call);
        }
    }
    st.async_id = None;
    st.async_to = None;
    st.promise = None;
    st.delayed = false;
    if let Some(id) = cancel_id {
        st.cancel_id = st.cancel_id.max(id);
    }
    StoppedCalls {
        timeouts: std::mem::take(&mut st.timeouts),
        calls,
    }
}

/// Release every update and script step held by a pause
pub(crate) fn flush_resume_queue<O: 'static>(state: &Rc<RefCell<AsyncState<O>>>) {
    let entries = std::mem::take(&mut state.borrow_mut().resume_queue);
    for entry in entries {
        match entry {
            ResumeEntry::Call(call) => {
                if let Err(err) = call.on_resume(false) {
                    tracing::error!(%err, "resumed update failed");
                }
            }
            ResumeEntry::Waiter(tx) => {
                let _ = tx.send(());
            }
        }
    }
}

/// Put every delayed update of a target on hold
pub(crate) fn flush_pause_queue<O: 'static>(state: &Rc<RefCell<AsyncState<O>>>) {
    let calls = std::mem::take(&mut state.borrow_mut().pause_queue);
    for call in calls {
        call.on_pause();
    }
}

/// When and whether one update may run
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ScheduleRequest {
    pub call_id: u64,
    pub delay: f64,
    pub pause: Option<bool>,
    pub default_pause: bool,
    pub cancel: bool,
}

/// What the target does at each stage of a scheduled update
pub(crate) struct ScheduleActions {
    pub pause: Box<dyn Fn()>,
    pub resume: Box<dyn Fn()>,
    /// Merge the update; receives whether it was cancelled meanwhile
    pub start: Box<dyn FnOnce(bool) -> Result<()>>,
}

pub(crate) struct ScheduledCall<O> {
    call_id: u64,
    delay: Cell<f64>,
    cancel: Cell<bool>,
    timeout: Cell<Option<TimeoutId>>,
    start: RefCell<Option<Box<dyn FnOnce(bool) -> Result<()>>>>,
    sched: SchedulerHandle,
    state: Weak<RefCell<AsyncState<O>>>,
    this: Weak<ScheduledCall<O>>,
}

impl<O: 'static> ScheduledCall<O> {
    fn on_pause(&self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        if let Some(timeout) = self.timeout.take() {
            if let Ok(Some(remaining)) = self.sched.read(|rt| rt.timeout_remaining(timeout)) {
                self.delay.set(remaining);
            }
            let _ = self.sched.cancel_timeout(timeout);
            state.borrow_mut().timeouts.retain(|t| *t != timeout);
        }
        if let Some(this) = self.this.upgrade() {
            state.borrow_mut().resume_queue.push(ResumeEntry::Call(this));
        }
    }

    fn on_resume(&self, sync: bool) -> Result<()> {
        let skip = self
            .sched
            .read(|rt| rt.skip_animation())
            .unwrap_or(false);
        if self.delay.get() > 0.0 && !skip {
            let (Some(state), Some(this)) = (self.state.upgrade(), self.this.upgrade()) else {
                return Ok(());
            };
            let fire = this.clone();
            let timeout = self.sched.set_timeout(self.delay.get(), move || {
                if let Err(err) = fire.on_start(false) {
                    tracing::error!(%err, "delayed update failed");
                }
            })?;
            self.timeout.set(Some(timeout));
            let mut st = state.borrow_mut();
            st.delayed = true;
            st.timeouts.push(timeout);
            st.pause_queue.push(this);
            Ok(())
        } else {
            self.on_start(sync)
        }
    }

    fn abort(&self) {
        self.cancel.set(true);
        let _ = self.on_start(false);
    }

    fn on_start(&self, sync: bool) -> Result<()> {
        if let Some(state) = self.state.upgrade() {
            let mut st = state.borrow_mut();
            st.delayed = false;
            st.pause_queue.retain(|c| c.call_id != self.call_id);
            if let Some(timeout) = self.timeout.take() {
                st.timeouts.retain(|t| *t != timeout);
            }
            if self.call_id <= st.cancel_id {
                self.cancel.set(true);
            }
        }
        let Some(start) = self.start.borrow_mut().take() else {
            return Ok(());
        };
        let result = start(self.cancel.get());
        if !sync {
            if let Err(err) = &result {
                tracing::error!(%err, call = self.call_id, "deferred merge failed");
            }
        }
        result
    }
}

/// Run an update now, after its delay, or once its target resumes.
///
/// Errors are returned only when the merge ran synchronously.
pub(crate) fn schedule_props<O: 'static>(
    sched: &SchedulerHandle,
    state: &Rc<RefCell<AsyncState<O>>>,
    request: ScheduleRequest,
    actions: ScheduleActions,
) -> Result<()> {
    let ScheduleActions {
        pause,
        resume,
        start,
    } = actions;
    let call = Rc::new_cyclic(|this| ScheduledCall {
        call_id: request.call_id,
        delay: Cell::new(request.delay),
        cancel: Cell::new(request.cancel),
        timeout: Cell::new(None),
        start: RefCell::new(Some(start)),
        sched: sched.clone(),
        state: Rc::downgrade(state),
        this: this.clone(),
    });

    if request.cancel {
        return call.on_start(true);
    }

    let paused = {
        let mut st = state.borrow_mut();
        if let Some(pause) = request.pause {
            st.paused = pause;
        }
        request.default_pause || st.paused
    };

    if paused {
        state
            .borrow_mut()
            .resume_queue
            .push(ResumeEntry::Call(call));
        pause();
        Ok(())
    } else {
        resume();
        call.on_resume(true)
    }
}

type ScriptFn<T> =
    Rc<dyn Fn(ScriptContext<T>) -> LocalBoxFuture<'static, std::result::Result<(), Interrupt>>>;

/// A scripted sequence of updates.
///
/// The closure receives a [`ScriptContext`] and awaits
/// [`ScriptContext::next`] for each step. Propagating the step's error with
/// `?` is how a script notices it was stopped or replaced.
pub struct Script<T: AsyncTarget> {
    f: ScriptFn<T>,
}

impl<T: AsyncTarget> Clone for Script<T> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

impl<T: AsyncTarget> fmt::Debug for Script<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({:#x})", self.key())
    }
}

impl<T: AsyncTarget> Script<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ScriptContext<T>) -> Fut + 'static,
        Fut: Future<Output = std::result::Result<(), Interrupt>> + 'static,
    {
        Self {
            f: Rc::new(move |ctx| f(ctx).boxed_local()),
        }
    }

    fn key(&self) -> usize {
        Rc::as_ptr(&self.f) as *const () as usize
    }
}

/// What an async update runs
pub(crate) enum AsyncTo<T: AsyncTarget> {
    Script(Script<T>),
    Chain(Rc<[T::Props]>),
}

impl<T: AsyncTarget> AsyncTo<T> {
    fn key(&self) -> usize {
        match self {
            AsyncTo::Script(script) => script.key(),
            AsyncTo::Chain(chain) => Rc::as_ptr(chain) as *const () as usize,
        }
    }
}

/// Handle given to a running script
pub struct ScriptContext<T: AsyncTarget> {
    target: T,
    call_id: u64,
    launcher: Rc<T::Props>,
    state: Rc<RefCell<AsyncState<T::Output>>>,
    bailed: Rc<RefCell<Option<AnimationResult<T::Output>>>>,
}

impl<T: AsyncTarget> Clone for ScriptContext<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            call_id: self.call_id,
            launcher: self.launcher.clone(),
            state: self.state.clone(),
            bailed: self.bailed.clone(),
        }
    }
}

impl<T: AsyncTarget> ScriptContext<T> {
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Stop the target. The script unwinds at its next step.
    pub fn stop(&self) -> Result<()> {
        self.target.halt()
    }

    fn bail_if_ended(&self) -> std::result::Result<(), Interrupt> {
        let interrupt = {
            let st = self.state.borrow();
            if self.call_id <= st.cancel_id {
                Some(Interrupt::Cancelled)
            } else if st.async_id != Some(self.call_id) {
                Some(Interrupt::Superseded)
            } else {
                None
            }
        };
        match interrupt {
            Some(interrupt) => {
                let value = self.target.snapshot();
                let result = match interrupt {
                    Interrupt::Cancelled => AnimationResult::cancelled(value),
                    _ => AnimationResult::unfinished(value),
                };
                self.bailed.borrow_mut().get_or_insert(result);
                Err(interrupt)
            }
            None => Ok(()),
        }
    }

    /// Run one update and wait for it to settle.
    ///
    /// While the target is paused the step is held until it resumes.
    pub async fn next(
        &self,
        props: impl Into<T::Props>,
    ) -> std::result::Result<AnimationResult<T::Output>, Interrupt> {
        self.bail_if_ended()?;

        let mut props = props.into();
        T::inherit(&mut props, &self.launcher);
        let result = self.target.start_nested(props, self.call_id)?.await?;

        self.bail_if_ended()?;

        let resumed = {
            let mut st = self.state.borrow_mut();
            if st.paused {
                let (tx, rx) = oneshot::channel();
                st.resume_queue.push(ResumeEntry::Waiter(tx));
                Some(rx)
            } else {
                None
            }
        };
        if let Some(rx) = resumed {
            // A dropped sender means the queue was cleared by a stop
            let _ = rx.await;
            self.bail_if_ended()?;
        }
        Ok(result)
    }
}

/// Parameters of one async run
pub(crate) struct AsyncRun<T: AsyncTarget> {
    pub call_id: u64,
    pub parent_id: Option<u64>,
    pub reset: bool,
    pub skip_animation: bool,
    pub launcher: T::Props,
    pub on_rest: Option<Rc<dyn Fn(&AnimationResult<T::Output>)>>,
}

/// Drive a script or chain against `target`, whose async bookkeeping is
/// `state`.
///
/// Safe to call while the arena is borrowed: `target` is only touched once
/// the returned future is polled. Starting the same script again without
/// `reset` returns the run already in flight.
pub(crate) fn run_async<T: AsyncTarget>(
    target: T,
    state: Rc<RefCell<AsyncState<T::Output>>>,
    to: AsyncTo<T>,
    run: AsyncRun<T>,
) -> Shared<AnimationFuture<T::Output>> {
    let key = to.key();

    let (prev_to, prev_promise) = {
        let st = state.borrow();
        (st.async_to, st.promise.clone())
    };
    if run.parent_id.is_none() && prev_to == Some(key) && !run.reset {
        if let Some(promise) = &prev_promise {
            return promise.clone();
        }
    }

    let AsyncRun {
        call_id,
        parent_id,
        skip_animation,
        launcher,
        on_rest,
        ..
    } = run;

    if skip_animation {
        {
            let mut st = state.borrow_mut();
            st.async_id = None;
            st.async_to = None;
            st.promise = None;
        }
        let future: AnimationFuture<T::Output> =
            Box::pin(async move { Ok(AnimationResult::unfinished(target.snapshot())) });
        return future.shared();
    }

    {
        let mut st = state.borrow_mut();
        st.async_id = Some(call_id);
        st.async_to = Some(key);
    }

    let ctx = ScriptContext {
        target: target.clone(),
        call_id,
        launcher: Rc::new(launcher),
        state: state.clone(),
        bailed: Rc::new(RefCell::new(None)),
    };
    let store = state.clone();

    let future: AnimationFuture<T::Output> = Box::pin(async move {
        let outcome = match to {
            AsyncTo::Script(script) => (script.f)(ctx.clone()).await,
            AsyncTo::Chain(chain) => {
                let mut outcome = Ok(());
                for props in chain.iter() {
                    if let Err(interrupt) = ctx.next(props.clone()).await {
                        outcome = Err(interrupt);
                        break;
                    }
                }
                outcome
            }
        };

        let bailed = ctx.bailed.borrow_mut().take();
        let result = match (bailed, outcome) {
            (Some(result), _) => Ok(result),
            (None, Ok(())) => Ok(AnimationResult::finished(target.snapshot())),
            (None, Err(Interrupt::Failed(err))) => Err(err),
            (None, Err(Interrupt::Cancelled)) => Ok(AnimationResult::cancelled(target.snapshot())),
            (None, Err(Interrupt::Superseded)) => {
                Ok(AnimationResult::unfinished(target.snapshot()))
            }
        };

        {
            let mut st = state.borrow_mut();
            if st.async_id == Some(call_id) {
                st.async_id = parent_id;
                st.async_to = parent_id.and(prev_to);
                st.promise = parent_id.and(prev_promise);
            }
        }

        if let (Some(on_rest), Ok(result)) = (&on_rest, &result) {
            on_rest(result);
        }
        tracing::debug!(
            call = call_id,
            finished = result.as_ref().is_ok_and(|r| r.finished),
            "async run settled"
        );
        result
    });

    let shared = future.shared();
    store.borrow_mut().promise = Some(shared.clone());
    shared
}
