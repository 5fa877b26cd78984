use crate::envelope::Envelope;
use std::borrow::Cow;
use strand_core::{Handler, Message};
use tracing::Instrument;

/// A handler wrapper that runs the inner handler inside an `info` span.
///
/// The span records the handler name and the envelope's owner, lane and
/// sequence number, so everything the handler logs (including its waits)
/// is attributed to the event.
#[derive(Debug, Clone)]
pub struct Traced<H> {
    inner: H,
    name: Cow<'static, str>,
}

impl<H> Traced<H> {
    /// Wrap `inner`, naming its span `name`.
    pub fn new(inner: H, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            inner,
            name: name.into(),
        }
    }

    /// The span name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<E, H> Handler<Envelope<E>> for Traced<H>
where
    E: Message,
    H: Handler<Envelope<E>>,
{
    type Output = H::Output;

    async fn call(&self, input: Envelope<E>) -> Self::Output {
        let span = tracing::info_span!(
            "handler",
            name = %self.name,
            owner = %input.owner(),
            lane = %input.lane(),
            sequence = input.sequence(),
        );
        self.inner.call(input).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::HookResult;

    #[tokio::test]
    async fn test_traced_passes_output_through() {
        let traced = Traced::new(
            |envelope: Envelope<u32>| async move {
                if *envelope.event() > 1 {
                    HookResult::Halt
                } else {
                    HookResult::Next
                }
            },
            "threshold",
        );
        assert_eq!(traced.name(), "threshold");
        assert_eq!(traced.call(Envelope::detached(1, 2)).await, HookResult::Halt);
        assert_eq!(traced.call(Envelope::detached(1, 0)).await, HookResult::Next);
    }
}
