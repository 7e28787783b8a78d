//! The declared interface of a mocked target.
//!
//! A proxy cannot reflect on arbitrary objects, so every target states per
//! method whether it is synchronous, asynchronous, or not callable at all.
//! A synchronous method may still hand back a future (`SyncOutcome::Deferred`);
//! the proxy then awaits that future instead of calling the method again.

use crate::types::{CallArgs, TargetError, CALL_METHOD};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

pub type TargetResult = Result<Value, TargetError>;
pub type TargetFuture = BoxFuture<'static, TargetResult>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Sync,
    Async,
    /// A data attribute: present, but not invokable.
    Field,
    Missing,
}

impl MethodKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
            Self::Field => "field",
            Self::Missing => "missing",
        }
    }
}

pub enum SyncOutcome {
    Ready(TargetResult),
    Deferred(TargetFuture),
}

impl From<TargetResult> for SyncOutcome {
    fn from(value: TargetResult) -> Self {
        Self::Ready(value)
    }
}

pub trait Target: Send {
    fn method_kind(&self, method: &str) -> MethodKind;

    fn call_sync(&mut self, method: &str, _args: &CallArgs) -> SyncOutcome {
        SyncOutcome::Ready(Err(attribute_error(method)))
    }

    fn call_async(&mut self, method: &str, _args: CallArgs) -> TargetFuture {
        futures::future::ready(Err(attribute_error(method))).boxed()
    }
}

/// Builds live targets from constructor arguments.
pub trait Factory: Send + Sync {
    fn construct(&self, args: &CallArgs) -> Result<Box<dyn Target>, TargetError>;
}

impl<F, T> Factory for F
where
    F: Fn(&CallArgs) -> Result<T, TargetError> + Send + Sync,
    T: Target + 'static,
{
    fn construct(&self, args: &CallArgs) -> Result<Box<dyn Target>, TargetError> {
        Ok(Box::new(self(args)?))
    }
}

fn attribute_error(method: &str) -> TargetError {
    TargetError::new("AttributeError").with_arg(method)
}

type SyncBody = Arc<dyn Fn(&CallArgs) -> SyncOutcome + Send + Sync>;
type AsyncBody = Arc<dyn Fn(CallArgs) -> TargetFuture + Send + Sync>;

#[derive(Clone)]
enum Body {
    Sync(SyncBody),
    Async(AsyncBody),
}

impl Body {
    fn kind(&self) -> MethodKind {
        match self {
            Self::Sync(_) => MethodKind::Sync,
            Self::Async(_) => MethodKind::Async,
        }
    }
}

/// A plain function seen as a class with a single `__call__` method.
///
/// Doubles as its own factory: constructing it takes no arguments and yields
/// a copy sharing the same function body.
#[derive(Clone)]
pub struct FunctionTarget {
    body: Body,
}

impl FunctionTarget {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&CallArgs) -> TargetResult + Send + Sync + 'static,
    {
        Self {
            body: Body::Sync(Arc::new(move |args: &CallArgs| SyncOutcome::Ready(f(args)))),
        }
    }

    /// A synchronous function that returns a future rather than a value.
    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn(&CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TargetResult> + Send + 'static,
    {
        Self {
            body: Body::Sync(Arc::new(move |args: &CallArgs| {
                SyncOutcome::Deferred(f(args).boxed())
            })),
        }
    }

    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TargetResult> + Send + 'static,
    {
        Self {
            body: Body::Async(Arc::new(move |args: CallArgs| f(args).boxed())),
        }
    }
}

impl Target for FunctionTarget {
    fn method_kind(&self, method: &str) -> MethodKind {
        if method == CALL_METHOD {
            self.body.kind()
        } else {
            MethodKind::Missing
        }
    }

    fn call_sync(&mut self, method: &str, args: &CallArgs) -> SyncOutcome {
        match (&self.body, method == CALL_METHOD) {
            (Body::Sync(f), true) => f(args),
            _ => SyncOutcome::Ready(Err(attribute_error(method))),
        }
    }

    fn call_async(&mut self, method: &str, args: CallArgs) -> TargetFuture {
        match (&self.body, method == CALL_METHOD) {
            (Body::Async(f), true) => f(args),
            _ => futures::future::ready(Err(attribute_error(method))).boxed(),
        }
    }
}

impl Factory for FunctionTarget {
    fn construct(&self, _args: &CallArgs) -> Result<Box<dyn Target>, TargetError> {
        Ok(Box::new(self.clone()))
    }
}

/// A target assembled from named closures, for objects that are easier to
/// describe method by method than with a dedicated `Target` impl.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: BTreeMap<String, Body>,
    fields: BTreeMap<String, Value>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sync<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&CallArgs) -> TargetResult + Send + Sync + 'static,
    {
        self.methods.insert(
            name.into(),
            Body::Sync(Arc::new(move |args: &CallArgs| SyncOutcome::Ready(f(args)))),
        );
        self
    }

    pub fn deferred<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TargetResult> + Send + 'static,
    {
        self.methods.insert(
            name.into(),
            Body::Sync(Arc::new(move |args: &CallArgs| {
                SyncOutcome::Deferred(f(args).boxed())
            })),
        );
        self
    }

    pub fn asynchronous<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TargetResult> + Send + 'static,
    {
        self.methods.insert(
            name.into(),
            Body::Async(Arc::new(move |args: CallArgs| f(args).boxed())),
        );
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field_value(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl Target for MethodTable {
    fn method_kind(&self, method: &str) -> MethodKind {
        if let Some(body) = self.methods.get(method) {
            body.kind()
        } else if self.fields.contains_key(method) {
            MethodKind::Field
        } else {
            MethodKind::Missing
        }
    }

    fn call_sync(&mut self, method: &str, args: &CallArgs) -> SyncOutcome {
        match self.methods.get(method) {
            Some(Body::Sync(f)) => f(args),
            _ => SyncOutcome::Ready(Err(attribute_error(method))),
        }
    }

    fn call_async(&mut self, method: &str, args: CallArgs) -> TargetFuture {
        match self.methods.get(method) {
            Some(Body::Async(f)) => f(args),
            _ => futures::future::ready(Err(attribute_error(method))).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Factory, FunctionTarget, MethodKind, MethodTable, SyncOutcome, Target, TargetResult,
    };
    use crate::types::{CallArgs, TargetError, CALL_METHOD};
    use serde_json::json;

    #[test]
    fn function_target_only_exposes_call() {
        let f = FunctionTarget::sync(|_| Ok(json!(1)));
        assert_eq!(f.method_kind(CALL_METHOD), MethodKind::Sync);
        assert_eq!(f.method_kind("other"), MethodKind::Missing);
        let g = FunctionTarget::asynchronous(|_| async { TargetResult::Ok(json!(1)) });
        assert_eq!(g.method_kind(CALL_METHOD), MethodKind::Async);
    }

    #[test]
    fn method_table_classifies_members() {
        let table = MethodTable::new()
            .sync("get", |_| Ok(json!(0)))
            .deferred("later", |_| async { TargetResult::Ok(json!(0)) })
            .asynchronous("fetch", |_| async { TargetResult::Ok(json!(0)) })
            .field("x", 1);
        assert_eq!(table.method_kind("get"), MethodKind::Sync);
        assert_eq!(table.method_kind("later"), MethodKind::Sync);
        assert_eq!(table.method_kind("fetch"), MethodKind::Async);
        assert_eq!(table.method_kind("x"), MethodKind::Field);
        assert_eq!(table.method_kind("nope"), MethodKind::Missing);
        assert_eq!(table.field_value("x"), Some(&json!(1)));
    }

    #[test]
    fn closures_are_factories() {
        let factory = |args: &CallArgs| {
            let x = args.get(0).and_then(|v| v.as_i64()).unwrap_or_default();
            Ok::<_, TargetError>(MethodTable::new().sync("x", move |_| Ok(json!(x))))
        };
        let mut target = factory
            .construct(&CallArgs::positional([4]))
            .expect("construct");
        match target.call_sync("x", &CallArgs::new()) {
            SyncOutcome::Ready(value) => assert_eq!(value.expect("value"), json!(4)),
            SyncOutcome::Deferred(_) => panic!("expected a ready value"),
        }
    }
}
