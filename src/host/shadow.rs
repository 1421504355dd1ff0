//! Explicit shadow call stacks for instrumented Rust code.
//!
//! Code opts in by holding a [`ScopeGuard`] for the duration of a call:
//!
//! ```
//! use callscope::host::ShadowStack;
//!
//! let host = ShadowStack::new();
//! let _outer = host.enter(callscope::call_site!("outer"));
//! {
//!     let _inner = host.enter(callscope::call_site!("inner"));
//! }
//! ```

use crate::collector::source::{SamplingSource, TraceHook, TracingSource};
use crate::frame::{CallSite, ContextId, Frame};
use crate::utils::error::CollectorError;
use log::debug;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_CONTEXT: ContextId = ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed));
}

/// Context of the calling thread
pub fn current_context() -> ContextId {
    CURRENT_CONTEXT.with(|context| *context)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// In-process host runtime
///
/// Keeps the current leaf frame of every thread that entered a scope, and
/// forwards call/return events to at most one attached [`TraceHook`].
#[derive(Default)]
pub struct ShadowStack {
    leaves: RwLock<HashMap<ContextId, Arc<Frame>>>,
    hook: RwLock<Option<Arc<dyn TraceHook>>>,
    sampler_registered: AtomicBool,
}

impl ShadowStack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Enter `site` on the calling thread
    ///
    /// **Public** - the instrumentation entry point
    ///
    /// The call ends when the returned guard is dropped. Guards must be
    /// dropped in reverse order of creation, which scoping gives for free.
    pub fn enter(&self, site: CallSite) -> ScopeGuard<'_> {
        let context = current_context();
        let frame = {
            let mut leaves = write(&self.leaves);
            let frame = Frame::push(leaves.get(&context), site);
            leaves.insert(context, Arc::clone(&frame));
            frame
        };

        if let Some(hook) = self.hook() {
            hook.on_call(context, &frame);
        }

        ScopeGuard {
            host: self,
            context,
            frame,
            _not_send: PhantomData,
        }
    }

    /// Run `f` inside a scope for `site`
    pub fn scope<R>(&self, site: CallSite, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter(site);
        f()
    }

    /// Leaf frame of the calling thread
    pub fn current(&self) -> Option<Arc<Frame>> {
        read(&self.leaves).get(&current_context()).cloned()
    }

    fn hook(&self) -> Option<Arc<dyn TraceHook>> {
        read(&self.hook).clone()
    }

    fn exit(&self, context: ContextId, frame: &Arc<Frame>) {
        if let Some(hook) = self.hook() {
            hook.on_return(context, frame);
        }

        let mut leaves = write(&self.leaves);
        match frame.caller_frame() {
            Some(caller) => {
                leaves.insert(context, Arc::clone(caller));
            }
            None => {
                leaves.remove(&context);
            }
        }
    }
}

impl TracingSource for ShadowStack {
    fn attach(&self, hook: Arc<dyn TraceHook>) -> Result<(), CollectorError> {
        let mut slot = write(&self.hook);
        if slot.is_some() {
            return Err(CollectorError::SourceBusy(
                "a trace hook is already attached to this shadow stack".to_string(),
            ));
        }
        *slot = Some(hook);
        debug!("Trace hook attached");
        Ok(())
    }

    fn detach(&self) {
        if write(&self.hook).take().is_some() {
            debug!("Trace hook detached");
        }
    }
}

impl SamplingSource for ShadowStack {
    fn register_sampler(&self) -> Result<(), CollectorError> {
        self.sampler_registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| {
                CollectorError::SourceBusy(
                    "a sampler is already registered on this shadow stack".to_string(),
                )
            })
    }

    fn unregister_sampler(&self) {
        self.sampler_registered.store(false, Ordering::Release);
    }

    fn active_contexts(&self) -> Vec<ContextId> {
        read(&self.leaves).keys().copied().collect()
    }

    fn current_frame(&self, context: ContextId) -> Option<Arc<Frame>> {
        read(&self.leaves).get(&context).cloned()
    }
}

/// An open call on a [`ShadowStack`]
///
/// Not `Send`: a call returns on the thread that made it.
#[must_use = "the call ends as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    host: &'a ShadowStack,
    context: ContextId,
    frame: Arc<Frame>,
    _not_send: PhantomData<*const ()>,
}

impl ScopeGuard<'_> {
    pub fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.host.exit(self.context, &self.frame);
    }
}
