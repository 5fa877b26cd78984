//! Dispatch pipeline: ranked handler descriptors run against one envelope.
//!
//! Descriptors are partitioned into layers, visited in ascending key order.
//! Inside a layer they are ordered by `(group, sub_priority)` with ties kept
//! in registration order. For every layer the enabled descriptors are tried
//! in that order and the first whose predicate accepts the event is invoked.
//! Its [`HookResult`] decides what comes next:
//!
//! | Result | Effect                                              |
//! |--------|-----------------------------------------------------|
//! | `Next` | keep looking for another match in the same layer    |
//! | `Stop` | this layer is done, continue with the next layer    |
//! | `Halt` | the event is done, no further layer sees it         |
//!
//! A layer without any match simply lets the event go.

use crate::envelope::Envelope;
use std::{
    borrow::Cow,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use strand_core::{
    Always, BoxPredicate, DispatchError, DynHandler, Handler, HookResult, IntoResponse, Message,
    Predicate,
};
use tracing::trace;

/// A handle for toggling a handler descriptor at runtime.
#[derive(Debug, Clone)]
pub struct EnabledHandle(Arc<AtomicBool>);

impl EnabledHandle {
    /// Create a new handle with the given initial state.
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    /// Check if the descriptor is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Enable the descriptor.
    pub fn enable(&self) {
        self.set(true);
    }

    /// Disable the descriptor.
    pub fn disable(&self) {
        self.set(false);
    }

    /// Flip the state, returning the new one.
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::AcqRel)
    }

    /// Set the state.
    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }
}

impl Default for EnabledHandle {
    fn default() -> Self {
        Self::new(true)
    }
}

/// A handler together with its ranking metadata and predicate.
///
/// # Example
///
/// ```rust,ignore
/// let confirm = HandlerDescriptor::new("confirm", confirm_handler)
///     .layer(1)
///     .group(-10)
///     .filter(|text: &String| text.starts_with("/confirm"));
/// ```
pub struct HandlerDescriptor<E: Message> {
    name: Cow<'static, str>,
    layer: i32,
    group: i32,
    sub_priority: i32,
    predicate: BoxPredicate<E>,
    handler: Arc<dyn DynHandler<Envelope<E>>>,
    enabled: EnabledHandle,
}

impl<E: Message> HandlerDescriptor<E> {
    /// Describe `handler` under `name`, accepting every event on layer 0.
    pub fn new<H>(name: impl Into<Cow<'static, str>>, handler: H) -> Self
    where
        H: Handler<Envelope<E>>,
        H::Output: IntoResponse,
    {
        Self {
            name: name.into(),
            layer: 0,
            group: 0,
            sub_priority: 0,
            predicate: Always.boxed(),
            handler: Arc::new(handler),
            enabled: EnabledHandle::default(),
        }
    }

    /// Place the descriptor on a layer. Layer 0 is the base chain.
    pub fn layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    /// Set the priority group (lower runs first).
    pub fn group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    /// Set the order inside the group (lower runs first).
    pub fn sub_priority(mut self, sub_priority: i32) -> Self {
        self.sub_priority = sub_priority;
        self
    }

    /// Only invoke the handler for events accepted by `predicate`.
    pub fn filter<P: Predicate<E>>(mut self, predicate: P) -> Self {
        self.predicate = predicate.boxed();
        self
    }

    /// Set the initial enabled state.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = EnabledHandle::new(enabled);
        self
    }

    /// Handle for toggling this descriptor after registration.
    pub fn enabled_handle(&self) -> EnabledHandle {
        self.enabled.clone()
    }

    /// The descriptor's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn rank(&self) -> (i32, i32, i32) {
        (self.layer, self.group, self.sub_priority)
    }

    fn accepts(&self, event: &E) -> bool {
        self.enabled.is_enabled() && self.predicate.matches(event)
    }
}

impl<E: Message> fmt::Debug for HandlerDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("layer", &self.layer)
            .field("group", &self.group)
            .field("sub_priority", &self.sub_priority)
            .field("enabled", &self.enabled.is_enabled())
            .finish_non_exhaustive()
    }
}

/// What happened to one event in the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Names of the invoked descriptors, in invocation order.
    pub invoked: Vec<String>,
    /// Whether a handler returned [`HookResult::Halt`].
    pub halted: bool,
}

/// An immutable, ranked set of handler descriptors.
///
/// Registering more descriptors produces a new pipeline; lanes take a
/// snapshot per event, so an event already in flight keeps the pipeline it
/// started with.
pub struct DispatchPipeline<E: Message> {
    registered: Vec<Arc<HandlerDescriptor<E>>>,
    layers: Vec<(i32, Vec<Arc<HandlerDescriptor<E>>>)>,
}

impl<E: Message> Default for DispatchPipeline<E> {
    fn default() -> Self {
        Self {
            registered: Vec::new(),
            layers: Vec::new(),
        }
    }
}

impl<E: Message> DispatchPipeline<E> {
    /// Build a pipeline from descriptors in registration order.
    pub fn new(descriptors: impl IntoIterator<Item = HandlerDescriptor<E>>) -> Self {
        Self::from_registered(descriptors.into_iter().map(Arc::new).collect())
    }

    /// A new pipeline with `descriptors` registered after the current ones.
    pub fn extended(&self, descriptors: impl IntoIterator<Item = HandlerDescriptor<E>>) -> Self {
        let registered = self
            .registered
            .iter()
            .cloned()
            .chain(descriptors.into_iter().map(Arc::new))
            .collect();
        Self::from_registered(registered)
    }

    fn from_registered(registered: Vec<Arc<HandlerDescriptor<E>>>) -> Self {
        let mut ranked = registered.clone();
        // Stable: equal ranks keep registration order.
        ranked.sort_by_key(|descriptor| descriptor.rank());

        let mut layers: Vec<(i32, Vec<Arc<HandlerDescriptor<E>>>)> = Vec::new();
        for descriptor in ranked {
            match layers.last_mut() {
                Some((key, chain)) if *key == descriptor.layer => chain.push(descriptor),
                _ => layers.push((descriptor.layer, vec![descriptor])),
            }
        }

        Self { registered, layers }
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    /// Returns `true` if no descriptor is registered.
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Layer keys in dispatch order.
    pub fn layer_keys(&self) -> impl Iterator<Item = i32> + '_ {
        self.layers.iter().map(|(key, _)| *key)
    }

    /// Enabled-state handle of the descriptor registered under `name`.
    pub fn enabled_handle(&self, name: &str) -> Option<EnabledHandle> {
        self.registered
            .iter()
            .find(|descriptor| descriptor.name() == name)
            .map(|descriptor| descriptor.enabled_handle())
    }

    /// Run the envelope through every layer.
    ///
    /// A handler error ends the event and is returned with the name of the
    /// failing descriptor.
    pub async fn dispatch(&self, envelope: &Envelope<E>) -> Result<DispatchReport, DispatchError> {
        let mut report = DispatchReport::default();

        'layers: for (layer, chain) in &self.layers {
            for descriptor in chain {
                if !descriptor.accepts(envelope.event()) {
                    continue;
                }
                trace!(
                    handler = %descriptor.name,
                    layer,
                    owner = %envelope.owner(),
                    sequence = envelope.sequence(),
                    "invoking handler"
                );
                report.invoked.push(descriptor.name.to_string());

                let result = descriptor
                    .handler
                    .call_dyn(envelope.clone())
                    .await
                    .map_err(|source| DispatchError::Handler {
                        handler: descriptor.name.to_string(),
                        source,
                    })?;

                match result {
                    HookResult::Next => continue,
                    HookResult::Stop => continue 'layers,
                    HookResult::Halt => {
                        report.halted = true;
                        break 'layers;
                    }
                }
            }
        }

        Ok(report)
    }
}

impl<E: Message> fmt::Debug for DispatchPipeline<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchPipeline")
            .field("descriptors", &self.registered.len())
            .field("layers", &self.layers.len())
            .finish()
    }
}
