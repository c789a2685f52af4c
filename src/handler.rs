//! Handler trait, invocation outcomes and type erasure.
//!
//! # How handlers are stored
//!
//! A route points at a [`Target`]: either a type-erased function registered
//! directly, or a late-bound descriptor string such as `"Blog->show"` that the
//! invoker resolves against the class registry at call time.
//!
//! ```text
//! fn hello(cx: &mut Context, args: &[Value]) { … }   ← user writes this
//!        ↓ app.route("GET /", hello)
//! hello.into_target()                                  ← Handler blanket impl
//!        ↓
//! Target::Func(Arc::new(FnHandler(hello)))             ← shared, type-erased
//!        ↓
//! handler.call(cx, args)  at request time              ← one vtable dispatch
//! ```

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::hive::Value;

// ── Outcome ───────────────────────────────────────────────────────────────────

/// Result of invoking a handler or hook.
///
/// `Abort` stops the chain it occurs in: an aborting `beforeroute` hook
/// skips the handler and `afterroute`; an aborting handler skips
/// `afterroute`.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Continue(Value),
    Abort,
}

impl Outcome {
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort)
    }

    /// The carried value; `Null` for `Abort`.
    pub fn into_value(self) -> Value {
        match self {
            Self::Continue(v) => v,
            Self::Abort => Value::Null,
        }
    }
}

/// Conversion of a handler's return value into an [`Outcome`].
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<Outcome, Error>;
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> Result<Outcome, Error> { Ok(self) }
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<Outcome, Error> { Ok(Outcome::Continue(Value::Null)) }
}

impl IntoOutcome for Value {
    fn into_outcome(self) -> Result<Outcome, Error> { Ok(Outcome::Continue(self)) }
}

impl IntoOutcome for String {
    fn into_outcome(self) -> Result<Outcome, Error> { Ok(Outcome::Continue(Value::Str(self))) }
}

impl IntoOutcome for &'static str {
    fn into_outcome(self) -> Result<Outcome, Error> { Ok(Outcome::Continue(Value::from(self))) }
}

/// `Err` surfaces as a fatal error response.
impl<T: IntoOutcome> IntoOutcome for Result<T, Error> {
    fn into_outcome(self) -> Result<Outcome, Error> { self?.into_outcome() }
}

// ── Type erasure ──────────────────────────────────────────────────────────────

/// Internal dispatch interface.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, cx: &mut Context, args: &[Value]) -> Result<Outcome, Error>;
}

/// A type-erased handler shared by every request that routes to it.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Newtype wrapper bridging a concrete function to [`ErasedHandler`].
pub(crate) struct FnHandler<F>(pub(crate) F);

impl<F, R> ErasedHandler for FnHandler<F>
where
    F: Fn(&mut Context, &[Value]) -> R,
    R: IntoOutcome,
{
    fn call(&self, cx: &mut Context, args: &[Value]) -> Result<Outcome, Error> {
        (self.0)(cx, args).into_outcome()
    }
}

// ── Target ────────────────────────────────────────────────────────────────────

/// What a route or hook invokes.
#[derive(Clone)]
pub enum Target {
    /// A function registered directly.
    Func(BoxedHandler),
    /// A descriptor resolved at call time: `Type->member` (instance member),
    /// `Type::member` (static member) or the name of a registered function.
    Named(String),
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Func(_) => f.write_str("Func(..)"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for everything a route can point at.
///
/// You never implement this yourself. It is satisfied by:
///
/// ```text
/// fn name(cx: &mut Context, args: &[Value]) -> impl IntoOutcome
/// "Type->member" / "Type::member" / "function"   (&str or String)
/// ```
///
/// The trait is **sealed** so that only the impls below can satisfy it.
pub trait Handler: private::Sealed {
    #[doc(hidden)]
    fn into_target(self) -> Target;
}

mod private {
    pub trait Sealed {}
}

impl<F, R> private::Sealed for F
where
    F: Fn(&mut Context, &[Value]) -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
}

impl<F, R> Handler for F
where
    F: Fn(&mut Context, &[Value]) -> R + Send + Sync + 'static,
    R: IntoOutcome,
{
    fn into_target(self) -> Target {
        Target::Func(Arc::new(FnHandler(self)))
    }
}

impl private::Sealed for &str {}

impl Handler for &str {
    fn into_target(self) -> Target { Target::Named(self.to_owned()) }
}

impl private::Sealed for String {}

impl Handler for String {
    fn into_target(self) -> Target { Target::Named(self) }
}

impl private::Sealed for Target {}

impl Handler for Target {
    fn into_target(self) -> Target { self }
}
