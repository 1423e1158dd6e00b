//! 代理
//!
//! 两种后端：
//! - [`InterfaceProxy`]：实现一组接口，每次调用都解析并执行调用链
//! - [`ClassProxy`]：生成目标类的子类，按方法预先决定分派方式，
//!   冻结配置加静态目标时调用链在创建时就固定下来
//!
//! 两者都通过 [`Proxy`] 句柄使用，也可以当作普通 `Object` 传给任何接受目标类型的地方。

mod class;
mod factory;
mod interface;

pub use class::{ClassAopProxy, ClassProxy};
pub use factory::{AopProxy, AopProxyFactory, DefaultAopProxyFactory, ProxyFactory};
pub use interface::{InterfaceAopProxy, InterfaceProxy};

use crate::advised::{Advised, AdvisedSupport};
use crate::error::{InvocationError, InvocationResult};
use crate::reflect::{Class, Method, Object, Value};
use crate::target_source::TargetSource;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 代理后端种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    Interface,
    Class,
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyKind::Interface => f.write_str("interface proxy"),
            ProxyKind::Class => f.write_str("class proxy"),
        }
    }
}

/// 代理句柄
#[derive(Clone)]
pub enum Proxy {
    Interface(Arc<InterfaceProxy>),
    Class(Arc<ClassProxy>),
}

impl Proxy {
    pub fn kind(&self) -> ProxyKind {
        match self {
            Proxy::Interface(_) => ProxyKind::Interface,
            Proxy::Class(_) => ProxyKind::Class,
        }
    }

    /// 通过代理调用方法
    pub fn invoke(&self, method: &Method, args: Vec<Value>) -> InvocationResult<Value> {
        match self {
            Proxy::Interface(p) => p.invoke(method, args),
            Proxy::Class(p) => p.invoke(method, args),
        }
    }

    /// 按名字调用方法
    pub fn invoke_named(&self, name: &str, args: Vec<Value>) -> InvocationResult<Value> {
        let method = self.find_method(name).ok_or_else(|| {
            InvocationError::infrastructure(
                format!("{}::{}", self.proxy_class().name(), name),
                anyhow::anyhow!("proxy does not expose a method named '{}'", name),
            )
        })?;
        self.invoke(&method, args)
    }

    /// 代理上可以调用的方法
    pub fn find_method(&self, name: &str) -> Option<Method> {
        match self {
            Proxy::Interface(p) => p.find_method(name),
            Proxy::Class(p) => p.find_method(name),
        }
    }

    /// 生成的代理类
    pub fn proxy_class(&self) -> &Class {
        match self {
            Proxy::Interface(p) => p.proxy_class(),
            Proxy::Class(p) => p.proxy_class(),
        }
    }

    /// 内省接口；opaque 代理返回 `None`
    pub fn advised(&self) -> Option<&dyn Advised> {
        let support = self.advised_support();
        (!support.is_opaque()).then_some(support as &dyn Advised)
    }

    pub(crate) fn advised_support(&self) -> &AdvisedSupport {
        match self {
            Proxy::Interface(p) => p.advised(),
            Proxy::Class(p) => p.advised(),
        }
    }

    /// 代理类型能否赋给 `class`
    pub fn implements(&self, class: &Class) -> bool {
        self.proxy_class().is_assignable_to(class)
    }

    /// 当作普通对象使用
    pub fn as_object(&self) -> Object {
        match self {
            Proxy::Interface(p) => Arc::clone(p) as Object,
            Proxy::Class(p) => Arc::clone(p) as Object,
        }
    }

    /// 从普通对象还原代理句柄
    pub fn from_object(object: &Object) -> Option<Proxy> {
        let object = Arc::clone(object);
        match object.downcast::<InterfaceProxy>() {
            Ok(p) => Some(Proxy::Interface(p)),
            Err(object) => object.downcast::<ClassProxy>().ok().map(Proxy::Class),
        }
    }

    pub fn is_proxy(object: &Object) -> bool {
        object.is::<InterfaceProxy>() || object.is::<ClassProxy>()
    }

    /// 是否是同一个代理实例
    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        match (self, other) {
            (Proxy::Interface(a), Proxy::Interface(b)) => Arc::ptr_eq(a, b),
            (Proxy::Class(a), Proxy::Class(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn hash_code(&self) -> u64 {
        match self {
            Proxy::Interface(p) => p.hash_code(),
            Proxy::Class(p) => p.hash_code(),
        }
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        match self {
            Proxy::Interface(p) => p.equals_object(&other.as_object()),
            Proxy::Class(p) => p.equals_object(&other.as_object()),
        }
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 只用类型名描述，不调用目标的 to_string
        let target = self
            .advised_support()
            .target_class()
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        write!(f, "{} [{}] for target of type [{}]", self.kind(), self.proxy_class(), target)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("kind", &self.kind())
            .field("proxy_class", &self.proxy_class().name())
            .field("config", &self.advised_support().to_proxy_config_string())
            .finish()
    }
}

/// 代理对象的代理类（`Class::of` 使用）
pub(crate) fn proxy_class_of(object: &Object) -> Option<Class> {
    if let Some(p) = object.downcast_ref::<InterfaceProxy>() {
        return Some(p.proxy_class().clone());
    }
    object
        .downcast_ref::<ClassProxy>()
        .map(|p| p.proxy_class().clone())
}

/// 后端哈希：固定的后端标识与目标源哈希组合
pub(crate) fn backend_hash(discriminator: &str, target_source: &dyn TargetSource) -> u64 {
    let mut hasher = DefaultHasher::new();
    discriminator.hash(&mut hasher);
    hasher
        .finish()
        .wrapping_mul(13)
        .wrapping_add(target_source.hash_code())
}

/// 从目标源取得目标，执行 `f`，然后归还目标
///
/// 静态目标源不归还。`f` 出错时照样归还；panic 展开时由守卫归还。
/// 归还失败只在 `f` 成功时作为错误返回，否则保留 `f` 的错误。
pub(crate) fn with_target<F>(
    target_source: &dyn TargetSource,
    method: &Method,
    f: F,
) -> InvocationResult<Value>
where
    F: FnOnce(Option<&Object>) -> InvocationResult<Value>,
{
    let target = target_source
        .get_target()
        .map_err(|source| InvocationError::TargetSource {
            method: method.signature(),
            source,
        })?;

    let guard = ReleaseGuard {
        target_source,
        pending: target.clone().filter(|_| !target_source.is_static()),
        method,
    };
    let result = f(target.as_ref());

    match guard.release() {
        Ok(()) => result,
        Err(source) => {
            tracing::error!(
                "Failed to release target for {}: {:#}",
                method.signature(),
                source
            );
            match result {
                Ok(_) => Err(InvocationError::TargetSource {
                    method: method.signature(),
                    source,
                }),
                Err(err) => Err(err),
            }
        }
    }
}

struct ReleaseGuard<'a> {
    target_source: &'a dyn TargetSource,
    pending: Option<Object>,
    method: &'a Method,
}

impl ReleaseGuard<'_> {
    fn release(mut self) -> anyhow::Result<()> {
        match self.pending.take() {
            Some(target) => self.target_source.release_target(&target),
            None => Ok(()),
        }
    }
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if let Some(target) = self.pending.take() {
            if let Err(e) = self.target_source.release_target(&target) {
                tracing::error!(
                    "Failed to release target for {} while unwinding: {:#}",
                    self.method.signature(),
                    e
                );
            }
        }
    }
}
