//! Message trait for event types.

/// A marker trait for events flowing through the engine.
///
/// Messages must be `Send + Sync + 'static` so they can be queued on one task
/// and handled on another. Every type meeting those bounds is a `Message`.
///
/// # Example
///
/// ```rust
/// use strand_core::Message;
///
/// #[derive(Clone, Debug)]
/// struct ChatUpdate { text: String }
///
/// fn assert_message<M: Message>() {}
/// assert_message::<ChatUpdate>();
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a valid Message",
    label = "must be `Send + Sync + 'static`",
    note = "All events handled by Strand must be thread-safe and static."
)]
pub trait Message: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Message for T {}
