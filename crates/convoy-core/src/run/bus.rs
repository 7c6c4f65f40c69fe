//! Ordered multi-consumer event fan-out.
//!
//! Producers emit through [`EventSink`]s that all feed one bus; any number
//! of consumers iterate it. Every consumer observes the same sequence in
//! emission order. Hooks are invoked synchronously at emit time, so hook
//! callbacks always complete before queued iteration delivery of the same
//! event.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::events::AgentEvent;

/// Best-effort subscriber invoked inline on every emit. Errors are swallowed;
/// a hook must never destabilise the run it is observing.
pub trait EventHook: Send + Sync {
    fn on_event(&self, event: &AgentEvent) -> anyhow::Result<()>;
}

impl<F> EventHook for F
where
    F: Fn(&AgentEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &AgentEvent) -> anyhow::Result<()> {
        self(event)
    }
}

struct BusInner {
    hooks: Vec<Arc<dyn EventHook>>,
    consumers: Vec<mpsc::UnboundedSender<AgentEvent>>,
    closed: bool,
    close_reason: Option<String>,
}

/// Closeable broadcast bus for [`AgentEvent`]s.
///
/// Emission is non-blocking. Events emitted after [`EventBus::close`] are
/// dropped. Consumer streams complete cleanly once the bus closes and their
/// buffered events are drained.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                hooks: Vec::new(),
                consumers: Vec::new(),
                closed: false,
                close_reason: None,
            })),
        }
    }

    /// Register an inline hook. Hooks registered after events were emitted
    /// only observe subsequent events.
    pub fn subscribe(&self, hook: Arc<dyn EventHook>) {
        let mut inner = self.inner.lock().expect("bus lock");
        inner.hooks.push(hook);
    }

    /// Open a new consumer stream. A stream opened after close yields nothing.
    pub fn events(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("bus lock");
        if !inner.closed {
            inner.consumers.push(tx);
        }
        EventStream { rx }
    }

    /// Broadcast one event to all hooks, then all consumer queues.
    pub fn emit(&self, event: AgentEvent) {
        let mut inner = self.inner.lock().expect("bus lock");
        if inner.closed {
            tracing::debug!(?event.kind, "event dropped after bus close");
            return;
        }
        for hook in &inner.hooks {
            if let Err(e) = hook.on_event(&event) {
                tracing::debug!(error = %e, "event hook failed; ignoring");
            }
        }
        inner
            .consumers
            .retain(|consumer| consumer.send(event.clone()).is_ok());
    }

    /// Close the bus. Subsequent emits are dropped; consumers drain their
    /// buffered events and then complete.
    pub fn close(&self, reason: Option<String>) {
        let mut inner = self.inner.lock().expect("bus lock");
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.close_reason = reason;
        inner.consumers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("bus lock").closed
    }

    /// Terminal reason supplied at close time, if any.
    pub fn close_reason(&self) -> Option<String> {
        self.inner.lock().expect("bus lock").close_reason.clone()
    }
}

/// Where a producer (engine, executor, built-in tool) emits events.
///
/// The supervisor builds one sink per attempt that remaps provider-facing
/// tool names back to originals and feeds the outer bus; standalone callers
/// can point a sink at a bare bus or a closure.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<dyn Fn(AgentEvent) + Send + Sync>,
}

impl EventSink {
    pub fn new(emit: impl Fn(AgentEvent) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(emit),
        }
    }

    /// Sink that emits straight onto a bus.
    pub fn to_bus(bus: &EventBus) -> Self {
        let bus = bus.clone();
        Self::new(move |event| bus.emit(event))
    }

    /// Sink that drops everything.
    pub fn null() -> Self {
        Self::new(|_| {})
    }

    pub fn emit(&self, event: AgentEvent) {
        (self.inner)(event)
    }
}

/// One consumer's ordered view of the bus.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<AgentEvent>,
}

impl EventStream {
    /// Next event, or `None` once the bus has closed and the buffer drained.
    pub async fn next(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }

    /// Drain everything currently buffered without waiting.
    pub fn drain_ready(&mut self) -> Vec<AgentEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }

    /// Collect all events until the bus closes.
    pub async fn collect(mut self) -> Vec<AgentEvent> {
        let mut out = Vec::new();
        while let Some(event) = self.next().await {
            out.push(event);
        }
        out
    }
}
