//! Background execution of session actions.
//!
//! The driver thread runs the multi-hop scan and the generation wait so the
//! owner context stays responsive. Pair it with a [`crate::owner::ProxyHandle`]
//! so every caret call is still executed by the owner.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use caret_proxy::CaretWindowProxy;
use generation_provider::CancelSignal;
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::{ActionOutcome, CaptureSession, PipelineEvent, SessionAction};

/// Callback receiving the outcome of a background action.
pub type DoneCallback = Box<dyn FnOnce(Result<ActionOutcome, PipelineError>) + Send + 'static>;

/// Callback receiving progress events of a background action.
pub type ProgressCallback = Box<dyn FnMut(PipelineEvent) + Send + 'static>;

/// One action running on its own thread, holding the session until joined.
pub struct PipelineRun<P> {
    action: &'static str,
    cancel: CancelSignal,
    handle: JoinHandle<CaptureSession<P>>,
}

impl<P> PipelineRun<P> {
    pub fn action(&self) -> &'static str {
        self.action
    }

    /// Requests cancellation of the network phase. A scan in progress runs
    /// to completion first.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the action and hands the session back.
    pub fn join(self) -> Result<CaptureSession<P>, PipelineError> {
        self.handle
            .join()
            .map_err(|_| PipelineError::Worker(format!("{} action panicked", self.action)))
    }
}

/// Runs `action` on a named background thread.
///
/// `on_progress` sees every event in order and `on_done` the outcome, both
/// on the background thread. The session is returned by
/// [`PipelineRun::join`].
pub fn spawn_pipeline<P, F, D>(
    mut session: CaptureSession<P>,
    action: SessionAction,
    mut on_progress: F,
    on_done: D,
) -> Result<PipelineRun<P>, PipelineError>
where
    P: CaretWindowProxy + Send + 'static,
    F: FnMut(PipelineEvent) + Send + 'static,
    D: FnOnce(Result<ActionOutcome, PipelineError>) + Send + 'static,
{
    let name = action.name();
    let cancel = session.cancel_signal();
    cancel.store(false, Ordering::SeqCst);

    let handle = thread::Builder::new()
        .name(format!("caret-capture-{name}"))
        .spawn(move || {
            debug!(action = name, "background action started");
            let result = session.dispatch(action, &mut on_progress);
            on_done(result);
            session
        })
        .map_err(|error| PipelineError::Worker(format!("failed to spawn {name} action: {error}")))?;

    Ok(PipelineRun {
        action: name,
        cancel,
        handle,
    })
}

struct ActiveAction {
    action: &'static str,
    cancel: CancelSignal,
    handle: JoinHandle<()>,
}

/// Long-lived owner of a session that runs at most one action at a time.
///
/// Starting an action while another is in flight is rejected with
/// [`PipelineError::Busy`].
pub struct PipelineDriver<P> {
    session: Arc<Mutex<CaptureSession<P>>>,
    active: Mutex<Option<ActiveAction>>,
}

impl<P> PipelineDriver<P>
where
    P: CaretWindowProxy + Send + 'static,
{
    pub fn new(session: CaptureSession<P>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            active: Mutex::new(None),
        }
    }

    /// Starts `action` in the background.
    pub fn start(
        &self,
        action: SessionAction,
        mut on_progress: ProgressCallback,
        on_done: DoneCallback,
    ) -> Result<(), PipelineError> {
        let mut active = self.lock_active();
        if let Some(running) = active.take() {
            if !running.handle.is_finished() {
                *active = Some(running);
                return Err(PipelineError::Busy);
            }
            reap(running);
        }

        let cancel = {
            let session = lock_unpoisoned(&self.session);
            let cancel = session.cancel_signal();
            cancel.store(false, Ordering::SeqCst);
            cancel
        };

        let name = action.name();
        let session = Arc::clone(&self.session);
        let handle = thread::Builder::new()
            .name(format!("caret-capture-{name}"))
            .spawn(move || {
                let result = {
                    let mut session = lock_unpoisoned(&session);
                    session.dispatch(action, &mut on_progress)
                };
                on_done(result);
            })
            .map_err(|error| {
                PipelineError::Worker(format!("failed to spawn {name} action: {error}"))
            })?;

        *active = Some(ActiveAction {
            action: name,
            cancel,
            handle,
        });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Name of the action in flight, if any.
    pub fn running_action(&self) -> Option<&'static str> {
        self.lock_active()
            .as_ref()
            .filter(|running| !running.handle.is_finished())
            .map(|running| running.action)
    }

    pub fn cancel(&self) {
        if let Some(running) = self.lock_active().as_ref() {
            running.cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Blocks until the action in flight, if any, has finished.
    pub fn wait(&self) -> Result<(), PipelineError> {
        let running = self.lock_active().take();
        match running {
            Some(running) => running.handle.join().map_err(|_| {
                PipelineError::Worker(format!("{} action panicked", running.action))
            }),
            None => Ok(()),
        }
    }

    /// Runs `f` against the session when no action is in flight.
    pub fn with_session<R>(
        &self,
        f: impl FnOnce(&mut CaptureSession<P>) -> R,
    ) -> Result<R, PipelineError> {
        if self.is_running() {
            return Err(PipelineError::Busy);
        }
        let mut session = lock_unpoisoned(&self.session);
        Ok(f(&mut session))
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveAction>> {
        lock_unpoisoned(&self.active)
    }
}

fn reap(finished: ActiveAction) {
    if finished.handle.join().is_err() {
        debug!(action = finished.action, "previous action panicked");
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
