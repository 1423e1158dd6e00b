//! 类代理
//!
//! 生成目标类的子类：子类覆盖每个可覆盖的方法，调用时按生成时决定的分派方式处理。
//!
//! | 分派 | 条件 | 行为 |
//! |---|---|---|
//! | `NoOverride` | final 方法 | 直接调用目标，不经过调用链 |
//! | `Advised` | `Advised` 接口方法且非 opaque | 由配置本身回答 |
//! | `Equals` / `HashCode` | `equals` / `hash_code` | 代理自己的相等性 |
//! | `AopProxy` | 有通知或配置未冻结 | 每次解析调用链 |
//! | `Fixed` | 有通知、冻结、静态目标、不暴露代理 | 生成时固定的调用链 |
//! | `InvokeTarget` | 无通知，且暴露代理或目标不静态或返回值可能是目标 | 直接调用目标，处理返回值 |
//! | `DispatchTarget` | 其余 | 直接调用静态目标，不替换返回值 |
//!
//! 同样的目标类型与配置形状复用同一个生成的代理类。

use super::{backend_hash, with_target, Proxy};
use crate::advised::{Advised, AdvisedSupport};
use crate::advisor::{Advisor, WeakAdvisor};
use crate::aop_context::AopContext;
use crate::aop_utils;
use crate::chain_factory::ChainElement;
use crate::error::{AopConfigError, AopResult, InvocationError, InvocationResult};
use crate::invocation::MethodInvocation;
use crate::proxy::AopProxy;
use crate::proxy_utils;
use crate::reflect::{Class, ClassBuilder, Method, Object, Value, ADVISED_CLASS_NAME};
use crate::target_source::EmptyTargetSource;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

const DISCRIMINATOR: &str = "ClassProxy";

/// 目标类名 → 已生成的布局
static LAYOUTS: Lazy<Mutex<HashMap<String, Vec<Arc<ProxyClassLayout>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static PROXY_CLASS_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    NoOverride,
    Advised,
    Equals,
    HashCode,
    AopProxy,
    Fixed(usize),
    InvokeTarget,
    DispatchTarget,
}

/// 决定分派方式的配置形状
struct ProxyClassKey {
    target_class: Class,
    frozen: bool,
    expose_proxy: bool,
    opaque: bool,
    static_target: bool,
    pre_filtered: bool,
    interfaces: Vec<Class>,
    /// 只有冻结的配置按 advisor 决定分派；弱引用，不让缓存延长通知的生命周期
    advisors: Vec<WeakAdvisor>,
}

impl ProxyClassKey {
    fn capture(advised: &AdvisedSupport, target_class: Class, interfaces: Vec<Class>) -> Self {
        let flags = advised.flags();
        Self {
            target_class,
            frozen: flags.frozen,
            expose_proxy: flags.expose_proxy,
            opaque: flags.opaque,
            static_target: advised.target_source().is_static(),
            pre_filtered: advised.is_pre_filtered(),
            interfaces,
            advisors: if flags.frozen {
                advised.advisor_snapshot().iter().map(Advisor::downgrade).collect()
            } else {
                Vec::new()
            },
        }
    }

    /// advisor 都还存活
    fn is_live(&self) -> bool {
        self.advisors.iter().all(|a| a.upgrade().is_some())
    }

    fn same_shape(&self, other: &ProxyClassKey) -> bool {
        self.target_class == other.target_class
            && self.frozen == other.frozen
            && self.expose_proxy == other.expose_proxy
            && self.opaque == other.opaque
            && self.static_target == other.static_target
            && self.pre_filtered == other.pre_filtered
            && self.interfaces == other.interfaces
            && self.advisors.len() == other.advisors.len()
            && self
                .advisors
                .iter()
                .zip(other.advisors.iter())
                .all(|(a, b)| match (a.upgrade(), b.upgrade()) {
                    (Some(a), Some(b)) => a.same_shape(&b),
                    _ => false,
                })
    }
}

/// 生成的代理类与每个方法的分派方式
struct ProxyClassLayout {
    key: ProxyClassKey,
    class: Class,
    dispatch: HashMap<String, (Method, Dispatch)>,
    /// `Dispatch::Fixed(i)` 对应的方法
    fixed_methods: Vec<Method>,
}

/// 类代理实例
pub struct ClassProxy {
    advised: Arc<AdvisedSupport>,
    layout: Arc<ProxyClassLayout>,
    fixed_chains: Vec<Arc<[ChainElement]>>,
    static_target: OnceCell<Option<Object>>,
    self_ref: Weak<ClassProxy>,
}

impl ClassProxy {
    pub fn advised(&self) -> &AdvisedSupport {
        &self.advised
    }

    pub fn proxy_class(&self) -> &Class {
        &self.layout.class
    }

    pub(crate) fn find_method(&self, name: &str) -> Option<Method> {
        self.layout.dispatch.get(name).map(|(m, _)| m.clone())
    }

    /// 创建时固定下来的调用链数量
    pub fn fixed_chain_count(&self) -> usize {
        self.fixed_chains.len()
    }

    fn self_object(&self) -> InvocationResult<Object> {
        self.self_ref
            .upgrade()
            .map(|p| p as Object)
            .ok_or_else(|| InvocationError::IllegalState("proxy has already been dropped".to_string()))
    }

    /// 执行代理方法
    pub fn invoke(&self, method: &Method, args: Vec<Value>) -> InvocationResult<Value> {
        let Some((original, dispatch)) = self.layout.dispatch.get(method.name()) else {
            return Err(InvocationError::infrastructure(
                method.signature(),
                anyhow::anyhow!("method is not part of proxy class {}", self.layout.class),
            ));
        };

        match *dispatch {
            Dispatch::NoOverride => {
                let target_source = self.advised.target_source();
                with_target(target_source.as_ref(), original, |target| {
                    aop_utils::invoke_joinpoint_using_reflection(target, original, &args)
                })
            }
            Dispatch::Advised => {
                proxy_utils::invoke_advised_method(self.advised.as_ref() as &dyn Advised, original, &args)
            }
            Dispatch::Equals => {
                let other = args.first().and_then(Value::as_object);
                Ok(Value::Bool(other.is_some_and(|o| self.equals_object(o))))
            }
            Dispatch::HashCode => Ok(Value::Int(self.hash_code() as i64)),
            Dispatch::AopProxy => self.invoke_advised(original, args),
            Dispatch::Fixed(index) => self.invoke_fixed(index, original, args),
            Dispatch::InvokeTarget => self.invoke_target(original, args),
            Dispatch::DispatchTarget => {
                let target = self.static_target(original)?;
                let value = aop_utils::invoke_joinpoint_using_reflection(target.as_ref(), original, &args)?;
                proxy_utils::reject_null_primitive(value, original)
            }
        }
    }

    /// 每次解析调用链
    fn invoke_advised(&self, method: &Method, args: Vec<Value>) -> InvocationResult<Value> {
        let proxy = self.self_object()?;
        let _exposed = self
            .advised
            .is_expose_proxy()
            .then(|| AopContext::expose(Arc::clone(&proxy)));

        let target_source = self.advised.target_source();
        with_target(target_source.as_ref(), method, |target| {
            let target_class = target
                .and_then(Class::of)
                .or_else(|| target_source.target_class());
            let chain = self
                .advised
                .get_interceptors_and_dynamic_interception_advice(method, target_class.as_ref())?;
            let value = if chain.is_empty() {
                aop_utils::invoke_joinpoint_using_reflection(target, method, &args)?
            } else {
                MethodInvocation::new(
                    Arc::clone(&proxy),
                    target.cloned(),
                    method.clone(),
                    args,
                    target_class,
                    chain,
                )
                .proceed()?
            };
            proxy_utils::massage_return_value(value, target, &proxy, &self.layout.class, method)
        })
    }

    /// 固定调用链，静态目标
    fn invoke_fixed(&self, index: usize, method: &Method, args: Vec<Value>) -> InvocationResult<Value> {
        let chain = self.fixed_chains.get(index).cloned().ok_or_else(|| {
            InvocationError::infrastructure(
                method.signature(),
                anyhow::anyhow!("no fixed chain at index {}", index),
            )
        })?;
        let proxy = self.self_object()?;
        let target = self.static_target(method)?;
        let value = MethodInvocation::new(
            Arc::clone(&proxy),
            target.clone(),
            method.clone(),
            args,
            self.advised.target_class(),
            chain,
        )
        .proceed()?;
        proxy_utils::massage_return_value(value, target.as_ref(), &proxy, &self.layout.class, method)
    }

    /// 没有通知：直接调用目标
    fn invoke_target(&self, method: &Method, args: Vec<Value>) -> InvocationResult<Value> {
        let proxy = self.self_object()?;
        let _exposed = self
            .advised
            .is_expose_proxy()
            .then(|| AopContext::expose(Arc::clone(&proxy)));

        let target_source = self.advised.target_source();
        with_target(target_source.as_ref(), method, |target| {
            let value = aop_utils::invoke_joinpoint_using_reflection(target, method, &args)?;
            proxy_utils::massage_return_value(value, target, &proxy, &self.layout.class, method)
        })
    }

    fn static_target(&self, method: &Method) -> InvocationResult<Option<Object>> {
        self.static_target
            .get_or_try_init(|| self.advised.target_source().get_target())
            .cloned()
            .map_err(|source| InvocationError::TargetSource {
                method: method.signature(),
                source,
            })
    }

    /// 另一个对象是否是等价的类代理
    pub(crate) fn equals_object(&self, other: &Object) -> bool {
        let Some(Proxy::Class(other)) = Proxy::from_object(other) else {
            return false;
        };
        if std::ptr::eq(self, other.as_ref()) {
            return true;
        }
        let (a, b) = (&self.advised, &other.advised);
        a.is_frozen() == b.is_frozen()
            && a.is_expose_proxy() == b.is_expose_proxy()
            && a.target_source().is_static() == b.target_source().is_static()
            && proxy_utils::equals_in_proxy(a, b)
    }

    pub fn hash_code(&self) -> u64 {
        backend_hash(DISCRIMINATOR, self.advised.target_source().as_ref())
    }
}

/// 类代理后端
pub struct ClassAopProxy {
    advised: Arc<AdvisedSupport>,
}

impl ClassAopProxy {
    pub fn new(advised: Arc<AdvisedSupport>) -> AopResult<Self> {
        let canonical_empty = advised
            .target_source()
            .as_any()
            .downcast_ref::<EmptyTargetSource>()
            .is_some_and(EmptyTargetSource::is_canonical);
        if advised.advisor_count() == 0 && canonical_empty {
            return Err(AopConfigError::NoAdvisorsOrTarget);
        }
        Ok(Self { advised })
    }

    fn layout(&self, target_class: &Class) -> AopResult<Arc<ProxyClassLayout>> {
        let interfaces = proxy_utils::complete_proxied_interfaces(&self.advised);
        let key = ProxyClassKey::capture(&self.advised, target_class.clone(), interfaces);

        let mut layouts = LAYOUTS.lock();
        layouts.retain(|_, candidates| {
            candidates.retain(|l| l.key.is_live());
            !candidates.is_empty()
        });
        let candidates = layouts.entry(target_class.name().to_string()).or_default();
        if let Some(layout) = candidates.iter().find(|l| l.key.same_shape(&key)) {
            return Ok(Arc::clone(layout));
        }

        let layout = Arc::new(generate_layout(&self.advised, key)?);
        candidates.push(Arc::clone(&layout));
        Ok(layout)
    }
}

impl AopProxy for ClassAopProxy {
    fn get_proxy(&self) -> AopResult<Proxy> {
        let target_class = self
            .advised
            .target_class()
            .ok_or(AopConfigError::UndeterminableTargetClass)?;
        let layout = self.layout(&target_class)?;

        let mut fixed_chains = Vec::with_capacity(layout.fixed_methods.len());
        for method in &layout.fixed_methods {
            let chain = self
                .advised
                .get_interceptors_and_dynamic_interception_advice(method, Some(&target_class))
                .map_err(|e| generation_error(&target_class, e))?;
            fixed_chains.push(chain);
        }

        tracing::debug!(
            "Creating class proxy {} for target class [{}] ({} fixed chain(s))",
            layout.class.name(),
            target_class.name(),
            fixed_chains.len()
        );

        let proxy = Arc::new_cyclic(|self_ref| ClassProxy {
            advised: Arc::clone(&self.advised),
            layout,
            fixed_chains,
            static_target: OnceCell::new(),
            self_ref: self_ref.clone(),
        });
        Ok(Proxy::Class(proxy))
    }
}

/// 目标类当前缓存的布局数
#[cfg(test)]
pub(crate) fn cached_layout_count(target_class: &str) -> usize {
    LAYOUTS
        .lock()
        .get(target_class)
        .map_or(0, |candidates| candidates.iter().filter(|l| l.key.is_live()).count())
}

fn generation_error(class: &Class, reason: impl std::fmt::Display) -> AopConfigError {
    AopConfigError::ProxyGeneration {
        class: class.name().to_string(),
        reason: reason.to_string(),
    }
}

/// 校验目标类并决定每个方法的分派
fn generate_layout(advised: &AdvisedSupport, key: ProxyClassKey) -> AopResult<ProxyClassLayout> {
    let target_class = key.target_class.clone();
    if target_class.is_final() {
        return Err(AopConfigError::ClassNotExtensible {
            class: target_class.name().to_string(),
        });
    }
    let missing = target_class.unimplemented_methods();
    if !missing.is_empty() {
        let names: Vec<String> = missing.iter().map(Method::signature).collect();
        return Err(generation_error(
            &target_class,
            format!("abstract methods without implementation: {}", names.join(", ")),
        ));
    }

    let mut seen = HashSet::new();
    let methods: Vec<Method> = target_class
        .all_methods()
        .into_iter()
        .chain(key.interfaces.iter().flat_map(Class::all_methods))
        .filter(|m| seen.insert(m.name().to_string()))
        .collect();

    let name = format!(
        "{}$$WeaveProxy$${}",
        target_class.name(),
        PROXY_CLASS_COUNTER.fetch_add(1, Ordering::Relaxed)
    );

    let mut dispatch = HashMap::with_capacity(methods.len());
    let mut fixed_methods = Vec::new();
    let mut builder = ClassBuilder::<ClassProxy>::new(name.as_str()).subclass_of(&target_class);
    for interface in &key.interfaces {
        builder = builder.implements(interface);
    }

    for method in methods {
        let decision = decide(advised, &key, &method, &mut fixed_methods)
            .map_err(|e| generation_error(&target_class, e))?;
        if decision == Dispatch::NoOverride {
            tracing::warn!(
                "Unable to proxy method [{}] because it is final: \
                 calls to this method will NOT be routed to the target instance's advice chain",
                method.signature()
            );
        }
        builder = builder.declare(overriding_method(&name, method.clone()));
        dispatch.insert(method.name().to_string(), (method, decision));
    }

    let class = builder.build();
    tracing::trace!(
        "Generated proxy class {} with {} method(s), {} fixed",
        name,
        dispatch.len(),
        fixed_methods.len()
    );

    Ok(ProxyClassLayout {
        key,
        class,
        dispatch,
        fixed_methods,
    })
}

fn decide(
    advised: &AdvisedSupport,
    key: &ProxyClassKey,
    method: &Method,
    fixed_methods: &mut Vec<Method>,
) -> InvocationResult<Dispatch> {
    if method.is_final() {
        return Ok(Dispatch::NoOverride);
    }
    if !key.opaque && method.declaring_type() == ADVISED_CLASS_NAME {
        return Ok(Dispatch::Advised);
    }
    if aop_utils::is_equals_method(method) {
        return Ok(Dispatch::Equals);
    }
    if aop_utils::is_hash_code_method(method) {
        return Ok(Dispatch::HashCode);
    }

    let chain = advised.get_interceptors_and_dynamic_interception_advice(method, Some(&key.target_class))?;
    if !chain.is_empty() || !key.frozen {
        if key.expose_proxy {
            return Ok(Dispatch::AopProxy);
        }
        if key.static_target && key.frozen {
            fixed_methods.push(method.clone());
            return Ok(Dispatch::Fixed(fixed_methods.len() - 1));
        }
        return Ok(Dispatch::AopProxy);
    }

    if key.expose_proxy || !key.static_target {
        return Ok(Dispatch::InvokeTarget);
    }
    if method.return_type().accepts_instance_of(&key.target_class) {
        Ok(Dispatch::InvokeTarget)
    } else {
        Ok(Dispatch::DispatchTarget)
    }
}

/// 代理类上覆盖的方法：把接收者还原成代理再分派
fn overriding_method(proxy_class: &str, original: Method) -> Method {
    let declared = original.clone();
    Method::build(
        proxy_class.to_string(),
        original.name().to_string(),
        original.param_types().to_vec(),
        original.return_type().clone(),
        original.is_final(),
        Some(Arc::new(move |receiver: &Object, args: &[Value]| {
            let proxy = receiver.downcast_ref::<ClassProxy>().ok_or_else(|| {
                InvocationError::type_mismatch(declared.signature(), "receiver of type ClassProxy")
            })?;
            proxy.invoke(&declared, args.to_vec())
        })),
        None,
    )
}
