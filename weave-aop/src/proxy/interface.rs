//! 接口代理
//!
//! 代理类实现配置的全部接口（加上 `Advised`），是 final 的；
//! 每个接口方法对应一个转发方法，转回 [`InterfaceProxy::invoke`]。
//! 每次调用都从缓存取调用链，缓存未命中时现算。

use super::{backend_hash, with_target, Proxy};
use crate::advised::{Advised, AdvisedSupport};
use crate::aop_context::AopContext;
use crate::aop_utils;
use crate::error::{AopConfigError, AopResult, InvocationError, InvocationResult};
use crate::invocation::MethodInvocation;
use crate::proxy::AopProxy;
use crate::proxy_utils;
use crate::reflect::{Class, ClassBuilder, Method, Object, Value, ADVISED_CLASS_NAME};
use crate::target_source::EmptyTargetSource;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

const DISCRIMINATOR: &str = "InterfaceProxy";

/// 接口组合 → 生成的代理类
static PROXY_CLASSES: Lazy<Mutex<HashMap<Vec<String>, Class>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static PROXY_CLASS_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// 接口代理实例
pub struct InterfaceProxy {
    advised: Arc<AdvisedSupport>,
    proxy_class: Class,
    interfaces: Vec<Class>,
    equals_defined: bool,
    hash_code_defined: bool,
    self_ref: Weak<InterfaceProxy>,
}

impl InterfaceProxy {
    pub fn advised(&self) -> &AdvisedSupport {
        &self.advised
    }

    pub fn proxy_class(&self) -> &Class {
        &self.proxy_class
    }

    /// 实现的接口（含 `Advised`）
    pub fn interfaces(&self) -> &[Class] {
        &self.interfaces
    }

    pub(crate) fn find_method(&self, name: &str) -> Option<Method> {
        self.interfaces
            .iter()
            .find_map(|i| i.find_method(name))
            .or_else(|| Class::object().find_method(name))
    }

    fn self_object(&self) -> InvocationResult<Object> {
        self.self_ref
            .upgrade()
            .map(|p| p as Object)
            .ok_or_else(|| InvocationError::IllegalState("proxy has already been dropped".to_string()))
    }

    /// 执行代理方法
    pub fn invoke(&self, method: &Method, args: Vec<Value>) -> InvocationResult<Value> {
        if !self.equals_defined && aop_utils::is_equals_method(method) {
            let other = args.first().and_then(Value::as_object);
            return Ok(Value::Bool(other.is_some_and(|o| self.equals_object(o))));
        }
        if !self.hash_code_defined && aop_utils::is_hash_code_method(method) {
            return Ok(Value::Int(self.hash_code() as i64));
        }
        if method.declaring_type() == ADVISED_CLASS_NAME && !self.advised.is_opaque() {
            return proxy_utils::invoke_advised_method(self.advised.as_ref() as &dyn Advised, method, &args);
        }
        if !self.accepts(method) {
            return Err(InvocationError::infrastructure(
                method.signature(),
                anyhow::anyhow!("method is not declared by any interface of {}", self.proxy_class),
            ));
        }

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
            proxy_utils::massage_return_value(value, target, &proxy, &self.proxy_class, method)
        })
    }

    fn accepts(&self, method: &Method) -> bool {
        aop_utils::is_object_method(method)
            || self
                .interfaces
                .iter()
                .any(|i| i.is_assignable_to_name(method.declaring_type()))
    }

    /// 另一个对象是否是等价的接口代理
    pub(crate) fn equals_object(&self, other: &Object) -> bool {
        match Proxy::from_object(other) {
            Some(Proxy::Interface(other)) => {
                std::ptr::eq(self, other.as_ref())
                    || proxy_utils::equals_in_proxy(&self.advised, &other.advised)
            }
            _ => false,
        }
    }

    pub fn hash_code(&self) -> u64 {
        backend_hash(DISCRIMINATOR, self.advised.target_source().as_ref())
    }
}

/// 生成（或复用）实现这些接口的代理类
fn proxy_class_for(interfaces: &[Class]) -> Class {
    let key: Vec<String> = interfaces.iter().map(|i| i.name().to_string()).collect();
    let mut classes = PROXY_CLASSES.lock();
    if let Some(class) = classes.get(&key) {
        return class.clone();
    }

    let name = format!("$Proxy{}", PROXY_CLASS_COUNTER.fetch_add(1, Ordering::Relaxed));
    let mut builder = ClassBuilder::<InterfaceProxy>::new(name.as_str()).final_class();
    for interface in interfaces {
        builder = builder.implements(interface);
    }

    let mut seen = HashSet::new();
    let candidates = interfaces
        .iter()
        .flat_map(Class::all_methods)
        .chain(Class::object().all_methods());
    for original in candidates {
        if seen.insert(original.name().to_string()) {
            builder = builder.declare(forwarding_method(&name, original));
        }
    }

    let class = builder.build();
    tracing::trace!("Generated proxy class {} for interfaces {:?}", name, key);
    classes.insert(key, class.clone());
    class
}

/// 代理类上的方法：把接收者还原成代理再调用原方法
fn forwarding_method(proxy_class: &str, original: Method) -> Method {
    let declared = original.clone();
    Method::build(
        proxy_class.to_string(),
        original.name().to_string(),
        original.param_types().to_vec(),
        original.return_type().clone(),
        false,
        Some(Arc::new(move |receiver: &Object, args: &[Value]| {
            let proxy = receiver.downcast_ref::<InterfaceProxy>().ok_or_else(|| {
                InvocationError::type_mismatch(declared.signature(), "receiver of type InterfaceProxy")
            })?;
            proxy.invoke(&declared, args.to_vec())
        })),
        None,
    )
}

/// 接口代理后端
pub struct InterfaceAopProxy {
    advised: Arc<AdvisedSupport>,
}

impl InterfaceAopProxy {
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
}

impl AopProxy for InterfaceAopProxy {
    fn get_proxy(&self) -> AopResult<Proxy> {
        let interfaces = proxy_utils::complete_proxied_interfaces(&self.advised);
        let defines = |name: &str| {
            interfaces
                .iter()
                .any(|i| i.find_method(name).is_some_and(|m| !aop_utils::is_object_method(&m)))
        };
        let equals_defined = defines("equals");
        let hash_code_defined = defines("hash_code");
        let proxy_class = proxy_class_for(&interfaces);

        tracing::debug!(
            "Creating interface proxy {} for target source [{}]",
            proxy_class.name(),
            self.advised.target_source().describe()
        );

        let proxy = Arc::new_cyclic(|self_ref| InterfaceProxy {
            advised: Arc::clone(&self.advised),
            proxy_class,
            interfaces,
            equals_defined,
            hash_code_defined,
            self_ref: self_ref.clone(),
        });
        Ok(Proxy::Interface(proxy))
    }
}
