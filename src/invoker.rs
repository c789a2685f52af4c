//! Class registry and handler invocation.
//!
//! Descriptor strings name handlers that are resolved per call:
//!
//! - `Type->member`: construct `Type` (or reuse its service instance) and
//!   call `member` on it, wrapped in the instance hooks.
//! - `Type::member`: call a static member, wrapped in the static hooks.
//! - anything else: a function registered with [`App::function`].
//!
//! Hooks are the members named `beforeroute` and `afterroute`. An `Abort`
//! from any step ends the sequence.
//!
//! [`App::function`]: crate::App::function

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, ReentrantMutex};
use regex::Regex;
use tracing::{debug, trace};

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxedHandler, FnHandler, IntoOutcome, Outcome, Target};
use crate::hive::Value;

/// Hooks wrapped around routed handlers.
pub const ROUTE_HOOKS: &str = "beforeroute,afterroute";

static DESCRIPTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*(->|::)\s*(\w+)$").expect("static regex"));

type Instance = Box<dyn Any + Send>;
/// A service instance. Other requests wait for the lock; a call from inside
/// one of the instance's own members finds the slot empty.
type Slot = Arc<ReentrantMutex<RefCell<Option<Instance>>>>;
type Constructor = Arc<dyn Fn(&mut Context) -> Instance + Send + Sync>;
type Member = Arc<dyn Fn(&mut (dyn Any + Send), &mut Context, &[Value]) -> Result<Outcome, Error> + Send + Sync>;

/// A registered handler type.
pub struct Class {
    name: String,
    construct: Constructor,
    members: HashMap<String, Member>,
    statics: HashMap<String, BoxedHandler>,
    service: bool,
}

impl Class {
    /// Starts describing type `T`, built by `construct` whenever an instance
    /// member is invoked.
    pub fn new<T, C>(name: &str, construct: C) -> ClassBuilder<T>
    where
        T: Send + 'static,
        C: Fn(&mut Context) -> T + Send + Sync + 'static,
    {
        ClassBuilder {
            class: Self {
                name: name.to_owned(),
                construct: Arc::new(move |cx: &mut Context| Box::new(construct(cx)) as Instance),
                members: HashMap::new(),
                statics: HashMap::new(),
                service: false,
            },
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance member names, hooks excluded.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members
            .keys()
            .map(String::as_str)
            .filter(|m| !matches!(*m, "beforeroute" | "afterroute"))
    }
}

/// Typed builder for a [`Class`].
pub struct ClassBuilder<T> {
    class: Class,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> ClassBuilder<T> {
    /// Registers an instance member. Member names are case-insensitive.
    pub fn method<F, R>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut T, &mut Context, &[Value]) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        let member: Member = Arc::new(move |obj: &mut (dyn Any + Send), cx: &mut Context, args: &[Value]| {
            let this = obj
                .downcast_mut::<T>()
                .ok_or_else(|| Error::Fatal("instance type mismatch".to_owned()))?;
            f(this, cx, args).into_outcome()
        });
        self.class.members.insert(name.to_ascii_lowercase(), member);
        self
    }

    /// Registers a static member.
    pub fn static_fn<F, R>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Context, &[Value]) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.class
            .statics
            .insert(name.to_ascii_lowercase(), Arc::new(FnHandler(f)));
        self
    }

    pub fn before_route<F, R>(self, f: F) -> Self
    where
        F: Fn(&mut T, &mut Context, &[Value]) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.method("beforeroute", f)
    }

    pub fn after_route<F, R>(self, f: F) -> Self
    where
        F: Fn(&mut T, &mut Context, &[Value]) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        self.method("afterroute", f)
    }

    /// Shares one lazily built instance across every call and request.
    ///
    /// Calls into the instance are serialised across requests. A member
    /// that calls back into its own service gets a fresh instance for the
    /// nested call.
    pub fn service(mut self) -> Self {
        self.class.service = true;
        self
    }
}

impl<T> From<ClassBuilder<T>> for Class {
    fn from(builder: ClassBuilder<T>) -> Self {
        builder.class
    }
}

/// Registered classes, free functions and live service instances.
#[derive(Default)]
pub struct Invoker {
    classes: HashMap<String, Class>,
    functions: HashMap<String, BoxedHandler>,
    services: Mutex<HashMap<String, Slot>>,
}

impl Invoker {
    pub(crate) fn add_class(&mut self, class: Class) {
        self.classes.insert(class.name.clone(), class);
    }

    pub(crate) fn add_function(&mut self, name: &str, handler: BoxedHandler) {
        self.functions.insert(name.to_owned(), handler);
    }

    pub fn class(&self, name: &str) -> Option<&Class> {
        self.classes.get(name)
    }

    /// Class named by a `Type->member` or `Type::member` descriptor.
    pub(crate) fn descriptor_class(descriptor: &str) -> Option<&str> {
        DESCRIPTOR.captures(descriptor).and_then(|c| c.get(1)).map(|m| m.as_str())
    }

    /// Invokes `target`, wrapping class members in the comma-separated
    /// `hooks` that the class defines.
    pub(crate) fn call(
        &self,
        cx: &mut Context,
        target: &Target,
        args: &[Value],
        hooks: &str,
    ) -> Result<Outcome, Error> {
        let descriptor = match target {
            Target::Func(f) => return f.call(cx, args),
            Target::Named(descriptor) => descriptor.as_str(),
        };
        trace!(handler = descriptor, "invoking");

        let Some(caps) = DESCRIPTOR.captures(descriptor) else {
            return self
                .functions
                .get(descriptor)
                .ok_or_else(|| Error::UninvocableHandler(descriptor.to_owned()))?
                .call(cx, args);
        };
        let class = self
            .classes
            .get(&caps[1])
            .ok_or_else(|| Error::UnknownClass(caps[1].to_owned()))?;
        let member = caps[3].to_ascii_lowercase();
        let hooks: Vec<&str> = hooks.split(',').map(str::trim).filter(|h| !h.is_empty()).collect();

        if &caps[2] == "::" {
            if !class.statics.contains_key(&member) {
                return Err(Error::UninvocableHandler(descriptor.to_owned()));
            }
            return sequence(&hooks, &member, cx, |name, cx| {
                class.statics.get(name).map(|f| f.call(cx, args))
            });
        }

        let Some(main) = class.members.get(&member) else {
            return Err(Error::UninvocableHandler(descriptor.to_owned()));
        };
        let run = |obj: &mut (dyn Any + Send), cx: &mut Context| {
            sequence(&hooks, &member, cx, |name, cx| {
                if name == member {
                    return Some(main(&mut *obj, cx, args));
                }
                class.members.get(name).map(|m| m(&mut *obj, cx, args))
            })
        };
        if class.service {
            let slot = self.service(class, cx);
            let guard = slot.lock();
            let taken = guard.borrow_mut().take();
            let Some(obj) = taken else {
                debug!(class = %class.name, "service re-entered, using a fresh instance");
                let mut obj = (class.construct)(cx);
                return run(&mut *obj, cx);
            };
            let mut lease = Lease { slot: &*guard, obj: Some(obj) };
            match lease.obj.as_mut() {
                Some(obj) => run(&mut **obj, cx),
                None => Err(Error::Fatal(format!("service {} lost its instance", class.name))),
            }
        } else {
            let mut obj = (class.construct)(cx);
            run(&mut *obj, cx)
        }
    }

    fn service(&self, class: &Class, cx: &mut Context) -> Slot {
        if let Some(slot) = self.services.lock().get(&class.name) {
            return Arc::clone(slot);
        }
        let built = Arc::new(ReentrantMutex::new(RefCell::new(Some((class.construct)(cx)))));
        Arc::clone(self.services.lock().entry(class.name.clone()).or_insert(built))
    }
}

/// A service instance taken out of its slot for one call. Dropping it puts
/// the instance back, also when the call panics.
struct Lease<'a> {
    slot: &'a RefCell<Option<Instance>>,
    obj: Option<Instance>,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        *self.slot.borrow_mut() = self.obj.take();
    }
}

/// Runs `beforeroute`, `member`, then `afterroute`, skipping hooks that are
/// not requested or not defined and stopping at the first `Abort`.
fn sequence(
    hooks: &[&str],
    member: &str,
    cx: &mut Context,
    mut step: impl FnMut(&str, &mut Context) -> Option<Result<Outcome, Error>>,
) -> Result<Outcome, Error> {
    if hooks.contains(&"beforeroute") {
        if let Some(Outcome::Abort) = step("beforeroute", cx).transpose()? {
            return Ok(Outcome::Abort);
        }
    }
    let out = step(member, cx).unwrap_or(Ok(Outcome::Abort))?;
    if out.is_abort() {
        return Ok(Outcome::Abort);
    }
    if hooks.contains(&"afterroute") {
        if let Some(Outcome::Abort) = step("afterroute", cx).transpose()? {
            return Ok(Outcome::Abort);
        }
    }
    Ok(out)
}
