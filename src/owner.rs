//! Single-owner access to a caret proxy from another thread.
//!
//! Hosts require every caret call to come from the context that owns the
//! proxy. The background driver talks to that context through a
//! [`ProxyHandle`], which forwards each call as a request and blocks until
//! the owner has executed it and replied. The owner side drains a
//! [`ProxyInbox`], either from its own event loop (`serve_pending`) or from a
//! dedicated thread (`spawn_owner`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use caret_proxy::{CaretWindow, CaretWindowProxy};
use tracing::warn;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProxyRequest {
    ReadBefore,
    ReadAfter,
    ReadWindow,
    MoveCaret(isize),
    DeleteBackward,
    InsertText(String),
    UnmarkText,
    Ping,
}

#[derive(Debug)]
enum ProxyReply {
    Text(Option<String>),
    Window(CaretWindow),
    Done,
}

struct Envelope {
    request: ProxyRequest,
    reply: Sender<ProxyReply>,
}

/// Driver-side proxy forwarding every call to the owner context.
///
/// When the owner has gone away, reads return nothing and mutations are
/// dropped; both are logged, and [`CaretWindowProxy::is_available`] reports
/// `false` from then on.
#[derive(Clone)]
pub struct ProxyHandle {
    requests: Sender<Envelope>,
    lost: Arc<AtomicBool>,
}

/// Owner-side end of a [`proxy_channel`].
pub struct ProxyInbox {
    requests: Receiver<Envelope>,
}

/// Creates a connected handle and inbox.
pub fn proxy_channel() -> (ProxyHandle, ProxyInbox) {
    let (requests, inbox) = mpsc::channel();
    let handle = ProxyHandle {
        requests,
        lost: Arc::new(AtomicBool::new(false)),
    };
    (handle, ProxyInbox { requests: inbox })
}

impl ProxyHandle {
    fn round_trip(&self, request: ProxyRequest) -> Option<ProxyReply> {
        let (reply, response) = mpsc::channel();
        let label = request_label(&request);

        if self.requests.send(Envelope { request, reply }).is_err() {
            self.lost.store(true, Ordering::SeqCst);
            warn!(request = label, "proxy owner is gone, dropping caret call");
            return None;
        }

        match response.recv() {
            Ok(reply) => Some(reply),
            Err(_) => {
                self.lost.store(true, Ordering::SeqCst);
                warn!(request = label, "proxy owner closed before replying");
                None
            }
        }
    }

    fn read_text(&self, request: ProxyRequest) -> Option<String> {
        match self.round_trip(request) {
            Some(ProxyReply::Text(text)) => text,
            _ => None,
        }
    }

    fn command(&self, request: ProxyRequest) {
        let _ = self.round_trip(request);
    }
}

impl CaretWindowProxy for ProxyHandle {
    fn read_before(&mut self) -> Option<String> {
        self.read_text(ProxyRequest::ReadBefore)
    }

    fn read_after(&mut self) -> Option<String> {
        self.read_text(ProxyRequest::ReadAfter)
    }

    fn move_caret(&mut self, delta: isize) {
        self.command(ProxyRequest::MoveCaret(delta));
    }

    fn delete_backward(&mut self) {
        self.command(ProxyRequest::DeleteBackward);
    }

    fn insert_text(&mut self, text: &str) {
        self.command(ProxyRequest::InsertText(text.to_string()));
    }

    fn unmark_text(&mut self) {
        self.command(ProxyRequest::UnmarkText);
    }

    /// `false` once any call went undelivered, or when the owner no longer
    /// answers.
    fn is_available(&mut self) -> bool {
        !self.lost.load(Ordering::SeqCst) && self.round_trip(ProxyRequest::Ping).is_some()
    }

    // One round trip instead of two keeps both reads on the same owner turn.
    fn read_window(&mut self) -> CaretWindow {
        match self.round_trip(ProxyRequest::ReadWindow) {
            Some(ProxyReply::Window(window)) => window,
            _ => CaretWindow::default(),
        }
    }
}

impl ProxyInbox {
    /// Executes every request already queued, without blocking.
    ///
    /// Returns the number of requests served. Meant to be called from the
    /// owner's own event loop.
    pub fn serve_pending<P: CaretWindowProxy + ?Sized>(&self, proxy: &mut P) -> usize {
        let mut served = 0;
        while let Ok(envelope) = self.requests.try_recv() {
            execute(proxy, envelope);
            served += 1;
        }
        served
    }

    /// Waits up to `timeout` for a request, then drains the queue.
    ///
    /// Returns `false` once every handle has been dropped.
    pub fn serve_for<P: CaretWindowProxy + ?Sized>(
        &self,
        proxy: &mut P,
        timeout: Duration,
    ) -> bool {
        match self.requests.recv_timeout(timeout) {
            Ok(envelope) => {
                execute(proxy, envelope);
                self.serve_pending(proxy);
                true
            }
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Serves requests until every handle has been dropped.
    pub fn serve_until_closed<P: CaretWindowProxy + ?Sized>(&self, proxy: &mut P) -> usize {
        let mut served = 0;
        while let Ok(envelope) = self.requests.recv() {
            execute(proxy, envelope);
            served += 1;
        }
        served
    }
}

fn execute<P: CaretWindowProxy + ?Sized>(proxy: &mut P, envelope: Envelope) {
    let Envelope { request, reply } = envelope;
    let response = match request {
        ProxyRequest::ReadBefore => ProxyReply::Text(proxy.read_before()),
        ProxyRequest::ReadAfter => ProxyReply::Text(proxy.read_after()),
        ProxyRequest::ReadWindow => ProxyReply::Window(proxy.read_window()),
        ProxyRequest::MoveCaret(delta) => {
            proxy.move_caret(delta);
            ProxyReply::Done
        }
        ProxyRequest::DeleteBackward => {
            proxy.delete_backward();
            ProxyReply::Done
        }
        ProxyRequest::InsertText(text) => {
            proxy.insert_text(&text);
            ProxyReply::Done
        }
        ProxyRequest::UnmarkText => {
            proxy.unmark_text();
            ProxyReply::Done
        }
        ProxyRequest::Ping => ProxyReply::Done,
    };

    // The caller may have given up waiting; nothing to do then.
    let _ = reply.send(response);
}

fn request_label(request: &ProxyRequest) -> &'static str {
    match request {
        ProxyRequest::ReadBefore => "read_before",
        ProxyRequest::ReadAfter => "read_after",
        ProxyRequest::ReadWindow => "read_window",
        ProxyRequest::MoveCaret(_) => "move_caret",
        ProxyRequest::DeleteBackward => "delete_backward",
        ProxyRequest::InsertText(_) => "insert_text",
        ProxyRequest::UnmarkText => "unmark_text",
        ProxyRequest::Ping => "ping",
    }
}

/// Owner thread running [`ProxyInbox::serve_until_closed`] over a proxy.
pub struct OwnerThread<P> {
    handle: JoinHandle<P>,
}

impl<P> OwnerThread<P> {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for every [`ProxyHandle`] to be dropped and returns the proxy.
    pub fn join(self) -> Result<P, PipelineError> {
        self.handle
            .join()
            .map_err(|_| PipelineError::Worker("proxy owner thread panicked".to_string()))
    }
}

/// Moves `proxy` onto a dedicated owner thread and returns a handle to it.
pub fn spawn_owner<P>(mut proxy: P) -> Result<(ProxyHandle, OwnerThread<P>), PipelineError>
where
    P: CaretWindowProxy + Send + 'static,
{
    let (handle, inbox) = proxy_channel();
    let owner = thread::Builder::new()
        .name("caret-capture-owner".to_string())
        .spawn(move || {
            inbox.serve_until_closed(&mut proxy);
            proxy
        })
        .map_err(|error| PipelineError::Worker(format!("failed to spawn proxy owner: {error}")))?;

    Ok((handle, OwnerThread { handle: owner }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingProxy {
        text: String,
        caret: isize,
        log: Vec<String>,
    }

    impl CaretWindowProxy for RecordingProxy {
        fn read_before(&mut self) -> Option<String> {
            self.log.push("before".to_string());
            (!self.text.is_empty()).then(|| self.text.clone())
        }

        fn read_after(&mut self) -> Option<String> {
            self.log.push("after".to_string());
            None
        }

        fn move_caret(&mut self, delta: isize) {
            self.log.push(format!("move {delta}"));
            self.caret += delta;
        }

        fn delete_backward(&mut self) {
            self.log.push("delete".to_string());
            self.text.pop();
        }

        fn insert_text(&mut self, text: &str) {
            self.log.push(format!("insert {text}"));
            self.text.push_str(text);
        }
    }

    #[test]
    fn serve_pending_is_a_no_op_without_requests() {
        let (_handle, inbox) = proxy_channel();
        let mut proxy = RecordingProxy::default();

        assert_eq!(inbox.serve_pending(&mut proxy), 0);
        assert!(proxy.log.is_empty());
    }

    #[test]
    fn calls_through_owner_thread_run_in_order_and_return_the_proxy() {
        let proxy = RecordingProxy {
            text: "abc".to_string(),
            ..RecordingProxy::default()
        };
        let (mut handle, owner) = spawn_owner(proxy).expect("spawn owner");

        assert_eq!(handle.read_before().as_deref(), Some("abc"));
        handle.move_caret(-2);
        handle.delete_backward();
        handle.insert_text("Z");
        assert_eq!(handle.read_window(), CaretWindow::new("abZ", ""));
        drop(handle);

        let proxy = owner.join().expect("owner should finish");
        assert_eq!(proxy.caret, -2);
        assert_eq!(
            proxy.log,
            vec!["before", "move -2", "delete", "insert Z", "before", "after"]
        );
    }

    #[test]
    fn closed_owner_makes_reads_absent_and_mutations_no_ops() {
        let (mut handle, inbox) = proxy_channel();
        drop(inbox);

        assert_eq!(handle.read_before(), None);
        assert_eq!(handle.read_window(), CaretWindow::default());
        handle.insert_text("ignored");
        handle.move_caret(3);
    }

    #[test]
    fn availability_follows_the_owner() {
        let (mut handle, owner) = spawn_owner(RecordingProxy::default()).expect("spawn owner");
        assert!(handle.is_available());

        let (mut orphan, inbox) = proxy_channel();
        let mut clone = orphan.clone();
        drop(inbox);
        assert!(!orphan.is_available());
        assert!(!clone.is_available());

        drop(handle);
        let proxy = owner.join().expect("owner should finish");
        assert!(proxy.log.is_empty());
    }

    #[test]
    fn serve_for_reports_disconnect_after_handles_drop() {
        let (handle, inbox) = proxy_channel();
        let mut proxy = RecordingProxy::default();

        assert!(inbox.serve_for(&mut proxy, Duration::from_millis(1)));
        drop(handle);
        assert!(!inbox.serve_for(&mut proxy, Duration::from_millis(1)));
    }
}
