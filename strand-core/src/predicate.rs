//! # Predicates
//!
//! A predicate decides whether an event concerns a handler or a pending wait.
//! The engine never looks inside an event: content-based routing is entirely
//! the predicate's business.
//!
//! Any `Fn(&E) -> bool` closure is a predicate. Named predicate types can
//! implement [`Predicate`] directly, and predicates compose with
//! [`Predicate::and`], [`Predicate::or`] and [`Predicate::not`].
//!
//! ```rust
//! use strand_core::Predicate;
//!
//! let is_answer = |text: &String| text == "yes" || text == "no";
//! let not_empty = |text: &String| !text.is_empty();
//! let both = is_answer.and(not_empty);
//!
//! assert!(both.matches(&"yes".to_string()));
//! assert!(!both.matches(&"maybe".to_string()));
//! ```

/// A synchronous test over a borrowed event.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Predicate` over `{E}`",
    label = "missing `Predicate` implementation",
    note = "Implement `Predicate<{E}>` or pass a closure `Fn(&{E}) -> bool`."
)]
pub trait Predicate<E>: Send + Sync + 'static {
    /// Returns `true` when the event is accepted.
    fn matches(&self, event: &E) -> bool;

    /// Accepts events accepted by both predicates.
    fn and<P>(self, other: P) -> And<Self, P>
    where
        Self: Sized,
        P: Predicate<E>,
    {
        And {
            first: self,
            second: other,
        }
    }

    /// Accepts events accepted by either predicate.
    fn or<P>(self, other: P) -> Or<Self, P>
    where
        Self: Sized,
        P: Predicate<E>,
    {
        Or {
            first: self,
            second: other,
        }
    }

    /// Inverts this predicate.
    fn not(self) -> Not<Self>
    where
        Self: Sized,
    {
        Not { inner: self }
    }

    /// Erases the predicate's type.
    fn boxed(self) -> BoxPredicate<E>
    where
        Self: Sized,
    {
        BoxPredicate::new(self)
    }
}

impl<E, F> Predicate<E> for F
where
    F: Fn(&E) -> bool + Send + Sync + 'static,
{
    fn matches(&self, event: &E) -> bool {
        (self)(event)
    }
}

/// Accepts every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl<E> Predicate<E> for Always {
    fn matches(&self, _event: &E) -> bool {
        true
    }
}

/// Conjunction of two predicates, see [`Predicate::and`].
#[derive(Debug, Clone)]
pub struct And<A, B> {
    first: A,
    second: B,
}

impl<E, A, B> Predicate<E> for And<A, B>
where
    A: Predicate<E>,
    B: Predicate<E>,
{
    fn matches(&self, event: &E) -> bool {
        self.first.matches(event) && self.second.matches(event)
    }
}

/// Disjunction of two predicates, see [`Predicate::or`].
#[derive(Debug, Clone)]
pub struct Or<A, B> {
    first: A,
    second: B,
}

impl<E, A, B> Predicate<E> for Or<A, B>
where
    A: Predicate<E>,
    B: Predicate<E>,
{
    fn matches(&self, event: &E) -> bool {
        self.first.matches(event) || self.second.matches(event)
    }
}

/// Negation of a predicate, see [`Predicate::not`].
#[derive(Debug, Clone)]
pub struct Not<P> {
    inner: P,
}

impl<E, P> Predicate<E> for Not<P>
where
    P: Predicate<E>,
{
    fn matches(&self, event: &E) -> bool {
        !self.inner.matches(event)
    }
}

/// A type-erased predicate.
pub struct BoxPredicate<E> {
    inner: Box<dyn Predicate<E>>,
}

impl<E> BoxPredicate<E> {
    /// Box any predicate.
    pub fn new<P: Predicate<E>>(predicate: P) -> Self {
        Self {
            inner: Box::new(predicate),
        }
    }
}

impl<E: 'static> Predicate<E> for BoxPredicate<E> {
    fn matches(&self, event: &E) -> bool {
        self.inner.matches(event)
    }

    fn boxed(self) -> BoxPredicate<E> {
        self
    }
}

impl<E> std::fmt::Debug for BoxPredicate<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxPredicate").finish_non_exhaustive()
    }
}
