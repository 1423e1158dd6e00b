//! 代理工厂
//!
//! [`ProxyFactory`] 持有一份 [`AdvisedSupport`]，用它创建代理；
//! 后端由 [`AopProxyFactory`] 按配置选择。

use super::{ClassAopProxy, InterfaceAopProxy, Proxy};
use crate::advised::AdvisedSupport;
use crate::config::ProxyConfig;
use crate::error::{AopConfigError, AopResult};
use crate::reflect::{Class, Object};
use crate::target_source::{SingletonTargetSource, TargetSource};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// 一个已配置好的代理后端
pub trait AopProxy: Send + Sync {
    /// 创建新的代理实例
    fn get_proxy(&self) -> AopResult<Proxy>;
}

/// 按配置选择代理后端
pub trait AopProxyFactory: Send + Sync {
    fn create_aop_proxy(&self, config: &Arc<AdvisedSupport>) -> AopResult<Box<dyn AopProxy>>;
}

/// 默认的后端选择规则
///
/// 要求优化、要求代理目标类、或者没有指定任何接口时使用类代理
/// （目标类型本身是接口时仍然用接口代理）；其余情况使用接口代理。
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAopProxyFactory;

impl AopProxyFactory for DefaultAopProxyFactory {
    fn create_aop_proxy(&self, config: &Arc<AdvisedSupport>) -> AopResult<Box<dyn AopProxy>> {
        if config.is_optimize()
            || config.is_proxy_target_class()
            || config.has_no_user_supplied_interfaces()
        {
            let target_class = config
                .target_class()
                .ok_or(AopConfigError::UndeterminableTargetClass)?;
            if target_class.is_interface() {
                return Ok(Box::new(InterfaceAopProxy::new(Arc::clone(config))?));
            }
            return Ok(Box::new(ClassAopProxy::new(Arc::clone(config))?));
        }
        Ok(Box::new(InterfaceAopProxy::new(Arc::clone(config))?))
    }
}

/// 编程方式创建代理
///
/// ```ignore
/// let factory = ProxyFactory::for_target(service);
/// factory.add_advice(Advice::around(TraceInterceptor::new()))?;
/// let proxy = factory.get_proxy()?;
/// ```
pub struct ProxyFactory {
    advised: Arc<AdvisedSupport>,
    aop_proxy_factory: Arc<dyn AopProxyFactory>,
}

impl ProxyFactory {
    pub fn new() -> Self {
        Self::with_config(ProxyConfig::new())
    }

    /// 用给定的标志创建
    pub fn with_config(config: ProxyConfig) -> Self {
        Self {
            advised: Arc::new(AdvisedSupport::with_config(config)),
            aop_proxy_factory: Arc::new(DefaultAopProxyFactory),
        }
    }

    /// 代理一个现成的对象，代理它实现的全部接口
    pub fn for_target(target: Object) -> Self {
        let factory = Self::new();
        let interfaces = Class::of(&target)
            .map(|c| c.all_interfaces())
            .unwrap_or_default();
        factory.set_target_source(Arc::new(SingletonTargetSource::new(target)));
        for interface in &interfaces {
            // 刚创建的配置没有冻结，接口也都来自 all_interfaces
            if let Err(e) = factory.add_interface(interface) {
                tracing::warn!("Skipping interface [{}]: {}", interface.name(), e);
            }
        }
        factory
    }

    /// 代理一个接口，目标由目标源提供
    pub fn for_interface(interface: &Class, target_source: Arc<dyn TargetSource>) -> AopResult<Self> {
        let factory = Self::new();
        factory.add_interface(interface)?;
        factory.set_target_source(target_source);
        Ok(factory)
    }

    /// 只指定目标源（按目标类型选择后端）
    pub fn for_target_source(target_source: Arc<dyn TargetSource>) -> Self {
        let factory = Self::new();
        factory.set_target_source(target_source);
        factory
    }

    /// 包装已有的配置
    pub fn from_advised(advised: Arc<AdvisedSupport>) -> Self {
        Self {
            advised,
            aop_proxy_factory: Arc::new(DefaultAopProxyFactory),
        }
    }

    pub fn set_aop_proxy_factory(&mut self, factory: Arc<dyn AopProxyFactory>) {
        self.aop_proxy_factory = factory;
    }

    pub fn aop_proxy_factory(&self) -> &Arc<dyn AopProxyFactory> {
        &self.aop_proxy_factory
    }

    /// 共享的配置；创建出的代理都引用它
    pub fn advised_support(&self) -> &Arc<AdvisedSupport> {
        &self.advised
    }

    /// 选择后端；第一次调用时激活配置并通知监听器
    pub fn create_aop_proxy(&self) -> AopResult<Box<dyn AopProxy>> {
        self.advised.activate();
        self.aop_proxy_factory.create_aop_proxy(&self.advised)
    }

    /// 创建代理
    pub fn get_proxy(&self) -> AopResult<Proxy> {
        self.create_aop_proxy()?.get_proxy()
    }
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for ProxyFactory {
    type Target = AdvisedSupport;

    fn deref(&self) -> &Self::Target {
        &self.advised
    }
}

impl fmt::Debug for ProxyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyFactory")
            .field("config", &self.advised.to_proxy_config_string())
            .finish()
    }
}
