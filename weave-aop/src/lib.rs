//! Weave AOP - 通知链代理引擎
//!
//! 提供类似 Spring AOP 的代理功能，支持：
//! - 多种通知类型（Before、After、Around、AfterReturning、AfterThrowing、Introduction）
//! - 灵活的切点（名称、正则、类型模式、组合、运行时参数匹配）
//! - 接口代理与类代理两种后端，调用链按方法缓存
//! - 可替换的目标源（单例、原型、池化、延迟初始化、热替换）
//! - 通过 BeanPostProcessor 自动代理，循环引用拿到的提前引用也是代理
//!
//! ```ignore
//! use weave_aop::prelude::*;
//!
//! let factory = ProxyFactory::for_target(account);
//! factory.add_advice(Advice::around(TraceInterceptor::new()))?;
//! let proxy = factory.get_proxy()?;
//! let balance = proxy.invoke_named("balance", vec![])?;
//! ```

pub mod adapter;
pub mod advice;
pub mod advised;
pub mod advisor;
pub mod aop_context;
pub mod aop_utils;
pub mod aspect;
pub mod autoproxy;
pub mod chain_factory;
pub mod config;
pub mod error;
pub mod error_info;
pub mod introduction;
pub mod invocation;
pub mod joinpoint;
pub mod pointcut;
pub mod proxy;
pub mod proxy_utils;
pub mod reflect;
pub mod registry;
pub mod target_source;

#[cfg(test)]
mod test_support;

// 重新导出核心类型
pub use adapter::{get_adapter_registry, AdvisorAdapter, DefaultAdvisorAdapterRegistry};
pub use advice::{
    Advice, AdviceType, AfterAdvice, AfterReturningAdvice, IntroductionInterceptor,
    MethodBeforeAdvice, MethodInterceptor, ThrowsAdvice,
};
pub use advised::{Advised, AdvisedSupport, AdvisedSupportListener};
pub use advisor::{Advisor, DefaultIntroductionAdvisor, DefaultPointcutAdvisor};
pub use aop_context::AopContext;
pub use aspect::{
    aspect_advisor, registered_aspect_advisors, Aspect, AspectInterceptor, AspectRegistration,
    ExceptionLoggingAdvice, PerformanceMonitorInterceptor, RetryInterceptor, TraceInterceptor,
};
pub use autoproxy::AutoProxyCreator;
pub use chain_factory::{AdvisorChainFactory, ChainElement, DefaultAdvisorChainFactory};
pub use config::{ProxyConfig, ProxyFlags};
pub use error::{AopConfigError, AopResult, BoxError, InvocationError, InvocationResult};
pub use error_info::ErrorInfo;
pub use introduction::DelegatingIntroductionInterceptor;
pub use invocation::MethodInvocation;
pub use joinpoint::JoinPoint;
pub use pointcut::{
    ClassFilter, ComposablePointcut, DynamicMethodMatcherPointcut, MethodMatcher,
    NameMatchMethodPointcut, NamePattern, Pointcut, RegexpMethodPointcut, RootClassFilter,
    StaticMethodMatcherPointcut, TrueClassFilter, TrueMethodMatcher, TruePointcut,
    TypePatternClassFilter,
};
pub use proxy::{
    AopProxy, AopProxyFactory, DefaultAopProxyFactory, Proxy, ProxyFactory, ProxyKind,
};
pub use reflect::{
    arg, Class, ClassBuilder, ClassKind, FromValue, IntoValue, Method, Object, Proxyable, Value,
    ValueType,
};
pub use registry::{get_class_registry, ClassRegistration, ClassRegistry};
pub use target_source::{
    EmptyTargetSource, HotSwappableTargetSource, LazyInitTargetSource, PooledTargetSource,
    PrototypeTargetSource, SingletonTargetSource, TargetSource,
};

// 导出给 #[proxyable] 生成的代码使用
pub use inventory;
pub use once_cell;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::*;
    pub use crate::advised::{Advised, AdvisedSupport};
    pub use crate::advisor::{Advisor, DefaultIntroductionAdvisor, DefaultPointcutAdvisor};
    pub use crate::aop_context::AopContext;
    pub use crate::aspect::{
        aspect_advisor, Aspect, AspectRegistration, ExceptionLoggingAdvice,
        PerformanceMonitorInterceptor, RetryInterceptor, TraceInterceptor,
    };
    pub use crate::autoproxy::AutoProxyCreator;
    pub use crate::error::{AopConfigError, AopResult, InvocationError, InvocationResult};
    pub use crate::error_info::ErrorInfo;
    pub use crate::invocation::MethodInvocation;
    pub use crate::joinpoint::JoinPoint;
    pub use crate::pointcut::{
        ComposablePointcut, NameMatchMethodPointcut, Pointcut, RegexpMethodPointcut,
        TypePatternClassFilter,
    };
    pub use crate::proxy::{Proxy, ProxyFactory};
    pub use crate::reflect::{Class, ClassBuilder, Object, Proxyable, Value, ValueType};
    pub use crate::target_source::*;
}
