use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// A typed key for values injected into a scope and inherited by its tasks.
///
/// Two keys match when both the name and the value type agree, so generic
/// code can build a key on demand instead of sharing a `static`.
///
/// ```
/// use enact::runtime::{Context, Runtime};
///
/// const THEME: Context<&'static str> = Context::new("app.theme");
///
/// let runtime = Runtime::new();
/// let scope = runtime.create_scope();
/// scope.set(&THEME, "dark");
/// let task = scope.run(|cx| async move { cx.expect(&THEME) });
/// runtime.run_until_stalled();
/// assert_eq!(task.try_take(), Some(Ok("dark")));
/// ```
pub struct Context<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> Context<T> {
    /// Declare a key. `name` shows up in [`Error::ContextMissing`](crate::Error::ContextMissing).
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    /// The name given at declaration.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: 'static> Context<T> {
    pub(crate) fn key(&self) -> ContextKey {
        ContextKey {
            name: self.name,
            type_id: TypeId::of::<T>(),
        }
    }
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Context<T> {}

impl<T> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ContextKey {
    name: &'static str,
    type_id: TypeId,
}

/// Context values bound directly on one frame.
#[derive(Default)]
pub(crate) struct Bindings {
    values: HashMap<ContextKey, Rc<dyn Any>>,
}

impl Bindings {
    pub(crate) fn insert<T: 'static>(&mut self, ctx: &Context<T>, value: T) {
        self.values.insert(ctx.key(), Rc::new(value));
    }

    pub(crate) fn get<T: Clone + 'static>(&self, ctx: &Context<T>) -> Option<T> {
        self.values
            .get(&ctx.key())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_distinguish_value_types() {
        let mut bindings = Bindings::default();
        bindings.insert(&Context::<u32>::new("n"), 7);
        assert_eq!(bindings.get(&Context::<u32>::new("n")), Some(7));
        assert_eq!(bindings.get(&Context::<i64>::new("n")), None);
        assert_eq!(bindings.get(&Context::<u32>::new("m")), None);
    }

    #[test]
    fn rebinding_replaces_value() {
        let key = Context::<String>::new("label");
        let mut bindings = Bindings::default();
        bindings.insert(&key, "a".to_string());
        bindings.insert(&key, "b".to_string());
        assert_eq!(bindings.get(&key).as_deref(), Some("b"));
    }
}
