//! The replay proxy.
//!
//! Every construction and every call becomes a `Call` keyed by
//! `(instance_index, call_index)`. A key found in memory is replayed after an
//! exact `(method, request)` comparison; a missing key is executed against the
//! live target (unlocked mode only) and its resolution stored. A key is
//! resolved at most once, so repeated identical calls inside one recording
//! run still get their own records and replay in the same order.

use crate::codec::{default_codec, Codec};
use crate::debug::DebugHook;
use crate::errors::{AutomockError, CallError};
use crate::logging::{emit, JsonlLogger};
use crate::memory::{next_index, SharedMemory};
use crate::replay::call::Call;
use crate::replay::reply::{CallResult, Reply};
use crate::target::{
    Factory, FunctionTarget, MethodKind, SyncOutcome, Target, TargetFuture, TargetResult,
};
use crate::types::{CallArgs, CallType, CounterScope, CALL_METHOD, INIT_METHOD};
use futures::future::FutureExt;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

#[derive(Clone)]
pub struct AutomockOptions {
    /// Replay only: any call without a recorded resolution is an error.
    pub locked: bool,
    pub codec: Arc<dyn Codec>,
    pub debug: Option<DebugHook>,
    pub counter_scope: CounterScope,
    pub logger: Option<JsonlLogger>,
}

impl Default for AutomockOptions {
    fn default() -> Self {
        Self {
            locked: true,
            codec: default_codec(),
            debug: None,
            counter_scope: CounterScope::default(),
            logger: None,
        }
    }
}

impl AutomockOptions {
    pub fn locked() -> Self {
        Self::default()
    }

    pub fn unlocked() -> Self {
        Self {
            locked: false,
            ..Self::default()
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_debug(mut self, hook: DebugHook) -> Self {
        self.debug = Some(hook);
        self
    }

    pub fn with_counter_scope(mut self, scope: CounterScope) -> Self {
        self.counter_scope = scope;
        self
    }

    pub fn with_logger(mut self, logger: JsonlLogger) -> Self {
        self.logger = Some(logger);
        self
    }
}

impl fmt::Debug for AutomockOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomockOptions")
            .field("locked", &self.locked)
            .field("debug", &self.debug.is_some())
            .field("counter_scope", &self.counter_scope)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

/// A failed check, reported through `Context::fail` once the memory lock
/// is released.
struct Divergence {
    wanted: Call,
    saved: Option<Call>,
    error: AutomockError,
}

impl Divergence {
    fn new(wanted: Call, error: AutomockError) -> Self {
        Self {
            wanted,
            saved: None,
            error,
        }
    }
}

/// State shared by every proxy of one `Automock` and by their pending
/// asynchronous resolutions.
struct Context {
    memory: SharedMemory,
    locked: bool,
    codec: Arc<dyn Codec>,
    debug: Option<DebugHook>,
    logger: Option<JsonlLogger>,
}

impl Context {
    fn build_call(
        &self,
        instance_index: u64,
        call_index: Option<u64>,
        method: &str,
        args: &CallArgs,
    ) -> Result<Call, AutomockError> {
        let request = self
            .codec
            .encode(&args.to_request_value())
            .map_err(|e| AutomockError::Encoding {
                call: format!("request of {method} on instance {instance_index}"),
                source: Box::new(e),
            })?;
        Ok(Call::new(instance_index, call_index, method, request))
    }

    /// Runs the debug hook, logs the failure and hands the error back. Must
    /// not be called with the memory lock held: the hook may read the memory.
    fn fail(&self, divergence: Divergence) -> AutomockError {
        let Divergence {
            wanted,
            saved,
            error,
        } = divergence;
        if let Some(hook) = &self.debug {
            let memory = self.memory.snapshot();
            hook(&memory, &wanted, saved.as_ref());
        }
        emit(
            self.logger.as_ref(),
            "error",
            "automock.error",
            json!({
                "key": wanted.key().to_string(),
                "method": wanted.method,
                "error": error.to_string(),
            }),
        );
        error
    }

    /// The saved record at `wanted`'s key, if it matches. `Ok(None)` means
    /// the key is free.
    fn lookup(&self, wanted: &Call) -> Result<Option<Call>, Divergence> {
        let memory = self.memory.lock();
        let Some(saved) = memory.get(&wanted.key()) else {
            return Ok(None);
        };
        if wanted.matches(saved) {
            return Ok(Some(saved.clone()));
        }
        Err(Divergence {
            error: AutomockError::BrokenCall {
                wanted: wanted.describe(self.codec.as_ref()),
                saved: saved.describe(self.codec.as_ref()),
            },
            wanted: wanted.clone(),
            saved: Some(saved.clone()),
        })
    }

    fn recorded_keys(&self) -> String {
        self.memory
            .lock()
            .keys()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn check_if_can_call(&self, wanted: &Call) -> Result<(), AutomockError> {
        if self.locked {
            return Err(self.fail(Divergence::new(
                wanted.clone(),
                AutomockError::Locked(wanted.to_string()),
            )));
        }
        Ok(())
    }

    /// Serves a matched record from memory without touching the target.
    fn replay(&self, wanted: &Call, saved: Call) -> Result<Reply, AutomockError> {
        let reply = match &saved.call_type {
            Some(CallType::Sync) => Reply::Ready(self.deliver(&saved)),
            Some(CallType::Async) => Reply::Pending {
                method: saved.method.clone(),
                future: futures::future::ready(self.deliver(&saved)).boxed(),
            },
            _ => {
                let error = AutomockError::UnknownCallType(saved.to_string());
                return Err(self.fail(Divergence {
                    wanted: wanted.clone(),
                    saved: Some(saved),
                    error,
                }));
            }
        };
        self.log_resolution("automock.replay", &saved);
        Ok(reply)
    }

    fn deliver(&self, call: &Call) -> CallResult {
        match call.outcome(self.codec.as_ref())? {
            Ok(value) => Ok(value),
            Err(error) => Err(CallError::Raised(error)),
        }
    }

    /// Encodes `outcome` into `call` and stores it, unless a record already
    /// occupies the key. Returns the record that ends up in memory.
    fn store(
        &self,
        mut call: Call,
        call_type: CallType,
        outcome: &TargetResult,
    ) -> Result<Call, AutomockError> {
        call.resolve(call_type, outcome, self.codec.as_ref())?;
        let stored = {
            let mut memory = self.memory.lock();
            match memory.get(&call.key()) {
                Some(existing) => existing.clone(),
                None => {
                    memory.insert(call.clone());
                    call
                }
            }
        };
        self.log_resolution("automock.record", &stored);
        Ok(stored)
    }

    fn resolve_sync(&self, wanted: Call, outcome: TargetResult) -> Result<Reply, AutomockError> {
        let stored = self.store(wanted, CallType::Sync, &outcome)?;
        Ok(Reply::Ready(self.deliver(&stored)))
    }

    /// Awaits `future` on the caller's behalf and records the outcome as an
    /// asynchronous call. Nothing runs until the reply is awaited.
    fn resolve_async(self: &Arc<Self>, wanted: Call, future: TargetFuture) -> Reply {
        let context = Arc::clone(self);
        let method = wanted.method.clone();
        let future = async move {
            if let Some(existing) = context.memory.get(&wanted.key()) {
                return context.deliver(&existing);
            }
            let outcome = future.await;
            let stored = context.store(wanted, CallType::Async, &outcome)?;
            context.deliver(&stored)
        };
        Reply::Pending {
            method,
            future: future.boxed(),
        }
    }

    fn log_resolution(&self, event_type: &str, call: &Call) {
        emit(
            self.logger.as_ref(),
            "info",
            event_type,
            json!({
                "key": call.key().to_string(),
                "method": call.method,
                "type": call.call_type.as_ref().map(CallType::as_str),
                "is_exception": call.is_exception,
            }),
        );
    }
}

/// A mocked factory: every `instance` call constructs (or replays) one proxy.
///
/// Instances created through the same handle draw their indices from one
/// counter, so the n-th construction always maps to the same records.
pub struct Automock {
    context: Arc<Context>,
    factory: Option<Arc<dyn Factory>>,
    instances: Arc<AtomicU64>,
}

impl Automock {
    pub fn new(
        factory: impl Factory + 'static,
        memory: SharedMemory,
        options: AutomockOptions,
    ) -> Self {
        Self::build(Some(Arc::new(factory)), memory, options)
    }

    /// A handle that can only replay `memory`; it has no factory to fall
    /// back on and is therefore always locked.
    pub fn replay_only(memory: SharedMemory, options: AutomockOptions) -> Self {
        Self::build(
            None,
            memory,
            AutomockOptions {
                locked: true,
                ..options
            },
        )
    }

    fn build(
        factory: Option<Arc<dyn Factory>>,
        memory: SharedMemory,
        options: AutomockOptions,
    ) -> Self {
        let instances = match options.counter_scope {
            CounterScope::PerAutomock => Arc::new(AtomicU64::new(0)),
            CounterScope::PerMemory => memory.instance_counter(),
        };
        Self {
            context: Arc::new(Context {
                memory,
                locked: options.locked,
                codec: options.codec,
                debug: options.debug,
                logger: options.logger,
            }),
            factory,
            instances,
        }
    }

    pub fn memory(&self) -> &SharedMemory {
        &self.context.memory
    }

    pub fn is_locked(&self) -> bool {
        self.context.locked
    }

    /// Constructs an instance with `args`, replaying the `__init__` record
    /// when one exists. A replayed instance has no live target behind it.
    pub fn instance(&self, args: CallArgs) -> Result<Proxy, CallError> {
        let instance_index = next_index(&self.instances);
        let context = &self.context;
        let wanted = context.build_call(instance_index, None, INIT_METHOD, &args)?;
        let mut proxy = Proxy {
            context: Arc::clone(context),
            instance_index,
            next_call: 0,
            instance: None,
        };
        match context.lookup(&wanted) {
            Ok(Some(saved)) => {
                context.log_resolution("automock.replay", &saved);
                return Ok(proxy);
            }
            Ok(None) => {}
            Err(divergence) => return Err(context.fail(divergence).into()),
        }
        context.check_if_can_call(&wanted)?;
        let Some(factory) = &self.factory else {
            let error = AutomockError::Locked(wanted.to_string());
            return Err(context.fail(Divergence::new(wanted, error)).into());
        };
        let target = factory.construct(&args)?;
        context.store(wanted, CallType::Sync, &Ok(Value::Null))?;
        proxy.instance = Some(target);
        Ok(proxy)
    }
}

impl fmt::Debug for Automock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Automock")
            .field("locked", &self.context.locked)
            .field("has_factory", &self.factory.is_some())
            .field("memory_len", &self.context.memory.len())
            .finish()
    }
}

/// Stands in for one constructed instance of the mocked factory.
pub struct Proxy {
    context: Arc<Context>,
    instance_index: u64,
    next_call: u64,
    instance: Option<Box<dyn Target>>,
}

impl Proxy {
    pub fn instance_index(&self) -> u64 {
        self.instance_index
    }

    /// Number of calls issued so far; also the index the next call gets.
    pub fn calls_issued(&self) -> u64 {
        self.next_call
    }

    /// Whether a real target backs this proxy. False when construction was
    /// replayed from memory.
    pub fn is_live(&self) -> bool {
        self.instance.is_some()
    }

    pub fn memory(&self) -> &SharedMemory {
        &self.context.memory
    }

    /// Calls `method` on the mocked instance. Internal (`__`) names are
    /// rejected without spending a call index.
    pub fn call(&mut self, method: &str, args: CallArgs) -> Reply {
        if method.starts_with("__") {
            return Reply::failed(self.reject_internal(method, &args));
        }
        self.resolve(method, args)
    }

    fn reject_internal(&self, method: &str, args: &CallArgs) -> AutomockError {
        let context = &self.context;
        let wanted =
            match context.build_call(self.instance_index, Some(self.next_call), method, args) {
                Ok(wanted) => wanted,
                Err(error) => return error,
            };
        let error = AutomockError::UnsupportedAttribute {
            method: method.to_string(),
            detail: "internal names are not proxied".to_string(),
        };
        context.fail(Divergence::new(wanted, error))
    }

    /// Calls the mocked instance itself, under the reserved `__call__` name.
    pub fn invoke(&mut self, args: CallArgs) -> Reply {
        self.resolve(CALL_METHOD, args)
    }

    /// A callable bound to `name`, resolved when called.
    pub fn method(&mut self, name: impl Into<String>) -> Method<'_> {
        Method {
            proxy: self,
            name: name.into(),
        }
    }

    fn resolve(&mut self, method: &str, args: CallArgs) -> Reply {
        match self.try_resolve(method, args) {
            Ok(reply) => reply,
            Err(error) => Reply::failed(error),
        }
    }

    fn try_resolve(&mut self, method: &str, args: CallArgs) -> Result<Reply, AutomockError> {
        let call_index = self.next_call;
        self.next_call += 1;
        let context = &self.context;
        let wanted = context.build_call(self.instance_index, Some(call_index), method, &args)?;

        match context.lookup(&wanted) {
            Ok(Some(saved)) => return context.replay(&wanted, saved),
            Ok(None) => {}
            Err(divergence) => return Err(context.fail(divergence)),
        }
        let Some(instance) = self.instance.as_mut() else {
            let error = AutomockError::MissedCall {
                wanted: wanted.to_string(),
                recorded: context.recorded_keys(),
            };
            return Err(context.fail(Divergence::new(wanted, error)));
        };
        context.check_if_can_call(&wanted)?;

        match instance.method_kind(method) {
            MethodKind::Async => {
                let future = instance.call_async(method, args);
                Ok(context.resolve_async(wanted, future))
            }
            MethodKind::Sync => match instance.call_sync(method, &args) {
                SyncOutcome::Ready(outcome) => context.resolve_sync(wanted, outcome),
                SyncOutcome::Deferred(future) => Ok(context.resolve_async(wanted, future)),
            },
            kind @ (MethodKind::Field | MethodKind::Missing) => {
                let error = AutomockError::UnsupportedAttribute {
                    method: method.to_string(),
                    detail: format!("attribute is {}", kind.as_str()),
                };
                Err(context.fail(Divergence::new(wanted, error)))
            }
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("instance_index", &self.instance_index)
            .field("next_call", &self.next_call)
            .field("live", &self.instance.is_some())
            .finish()
    }
}

/// A method looked up on a proxy, not yet called.
pub struct Method<'a> {
    proxy: &'a mut Proxy,
    name: String,
}

impl Method<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(self, args: CallArgs) -> Reply {
        self.proxy.call(&self.name, args)
    }
}

/// Mocks a factory. Equivalent to `Automock::new`.
pub fn automock(
    factory: impl Factory + 'static,
    memory: SharedMemory,
    options: AutomockOptions,
) -> Automock {
    Automock::new(factory, memory, options)
}

/// Mocks a plain function: the returned proxy is already constructed and is
/// called through `Proxy::invoke`.
pub fn automock_fn(
    function: FunctionTarget,
    memory: SharedMemory,
    options: AutomockOptions,
) -> Result<Proxy, CallError> {
    Automock::new(function, memory, options).instance(CallArgs::new())
}

/// `automock_fn` for an async function.
pub fn automock_async_fn<F, Fut>(
    f: F,
    memory: SharedMemory,
    options: AutomockOptions,
) -> Result<Proxy, CallError>
where
    F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = TargetResult> + Send + 'static,
{
    automock_fn(FunctionTarget::asynchronous(f), memory, options)
}
