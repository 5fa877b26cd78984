#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use strand::{Distributor, DistributorConfig, Envelope, HandlerDescriptor};

// ============================================================================
// Shared log
// ============================================================================

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

// ============================================================================
// Predicates and handlers
// ============================================================================

#[allow(clippy::ptr_arg)]
pub fn is_yes_no(text: &String) -> bool {
    text == "yes" || text == "no"
}

/// A handler that appends every event it sees to `log`.
pub fn recorder(
    log: &Log,
) -> impl Fn(Envelope<String>) -> std::future::Ready<()> + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |envelope: Envelope<String>| {
        push(&log, envelope.event().clone());
        std::future::ready(())
    }
}

// ============================================================================
// Setup
// ============================================================================

pub fn distributor(
    config: DistributorConfig,
    descriptors: Vec<HandlerDescriptor<String>>,
) -> Distributor<String> {
    Distributor::builder()
        .config(config)
        .handlers(descriptors)
        .build()
        .unwrap()
}

/// Yield to the runtime until `check` holds.
pub async fn until(mut check: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if check() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}
