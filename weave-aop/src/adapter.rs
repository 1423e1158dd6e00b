//! 通知适配
//!
//! 每种通知最终都以 [`MethodInterceptor`] 的形式进入调用链。
//! 环绕通知和引入拦截器本身就是拦截器，其余种类由 `AdvisorAdapter` 包装。

use crate::advice::{
    Advice, AfterAdvice, AfterReturningAdvice, MethodBeforeAdvice, MethodInterceptor, ThrowsAdvice,
};
use crate::advisor::Advisor;
use crate::error::{AopConfigError, AopResult, InvocationResult};
use crate::invocation::MethodInvocation;
use crate::reflect::Value;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

/// 全局适配器注册表
static GLOBAL_ADAPTER_REGISTRY: Lazy<DefaultAdvisorAdapterRegistry> =
    Lazy::new(DefaultAdvisorAdapterRegistry::new);

/// 获取全局适配器注册表
pub fn get_adapter_registry() -> &'static DefaultAdvisorAdapterRegistry {
    &GLOBAL_ADAPTER_REGISTRY
}

/// 通知适配器
pub trait AdvisorAdapter: Send + Sync {
    /// 是否能处理该通知
    fn supports_advice(&self, advice: &Advice) -> bool;

    /// 包装成拦截器
    fn get_interceptor(&self, advisor: &Advisor) -> AopResult<Arc<dyn MethodInterceptor>>;
}

// ============================================================================
// 拦截器
// ============================================================================

/// 先执行前置通知，再继续调用链
pub struct MethodBeforeAdviceInterceptor {
    advice: Arc<dyn MethodBeforeAdvice>,
}

impl MethodBeforeAdviceInterceptor {
    pub fn new(advice: Arc<dyn MethodBeforeAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for MethodBeforeAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult<Value> {
        self.advice.before(&invocation.join_point())?;
        invocation.proceed()
    }
}

/// 正常返回后执行通知
pub struct AfterReturningAdviceInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl AfterReturningAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterReturningAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult<Value> {
        let value = invocation.proceed()?;
        self.advice
            .after_returning(&value, &invocation.join_point())?;
        Ok(value)
    }
}

/// 出错时执行通知，然后继续抛出原错误
pub struct ThrowsAdviceInterceptor {
    advice: Arc<dyn ThrowsAdvice>,
}

impl ThrowsAdviceInterceptor {
    pub fn new(advice: Arc<dyn ThrowsAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for ThrowsAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult<Value> {
        match invocation.proceed() {
            Ok(value) => Ok(value),
            Err(error) => {
                if self.advice.handles(&error) {
                    self.advice
                        .after_throwing(&error, &invocation.join_point())?;
                }
                Err(error)
            }
        }
    }
}

/// 无论结果如何都执行通知
pub struct AfterAdviceInterceptor {
    advice: Arc<dyn AfterAdvice>,
}

impl AfterAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult<Value> {
        let result = invocation.proceed();
        self.advice.after(&invocation.join_point())?;
        result
    }
}

// ============================================================================
// 内置适配器
// ============================================================================

struct MethodBeforeAdviceAdapter;

impl AdvisorAdapter for MethodBeforeAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Before(_))
    }

    fn get_interceptor(&self, advisor: &Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::Before(a) => Ok(Arc::new(MethodBeforeAdviceInterceptor::new(Arc::clone(a)))),
            other => Err(AopConfigError::UnknownAdviceType(other.type_name().to_string())),
        }
    }
}

struct AfterReturningAdviceAdapter;

impl AdvisorAdapter for AfterReturningAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::AfterReturning(_))
    }

    fn get_interceptor(&self, advisor: &Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::AfterReturning(a) => {
                Ok(Arc::new(AfterReturningAdviceInterceptor::new(Arc::clone(a))))
            }
            other => Err(AopConfigError::UnknownAdviceType(other.type_name().to_string())),
        }
    }
}

struct ThrowsAdviceAdapter;

impl AdvisorAdapter for ThrowsAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::AfterThrowing(_))
    }

    fn get_interceptor(&self, advisor: &Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::AfterThrowing(a) => Ok(Arc::new(ThrowsAdviceInterceptor::new(Arc::clone(a)))),
            other => Err(AopConfigError::UnknownAdviceType(other.type_name().to_string())),
        }
    }
}

struct AfterAdviceAdapter;

impl AdvisorAdapter for AfterAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::After(_))
    }

    fn get_interceptor(&self, advisor: &Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::After(a) => Ok(Arc::new(AfterAdviceInterceptor::new(Arc::clone(a)))),
            other => Err(AopConfigError::UnknownAdviceType(other.type_name().to_string())),
        }
    }
}

// ============================================================================
// 注册表
// ============================================================================

/// 默认的适配器注册表
pub struct DefaultAdvisorAdapterRegistry {
    adapters: RwLock<Vec<Arc<dyn AdvisorAdapter>>>,
}

impl DefaultAdvisorAdapterRegistry {
    /// 注册了内置适配器的注册表
    pub fn new() -> Self {
        let adapters: Vec<Arc<dyn AdvisorAdapter>> = vec![
            Arc::new(MethodBeforeAdviceAdapter),
            Arc::new(AfterReturningAdviceAdapter),
            Arc::new(ThrowsAdviceAdapter),
            Arc::new(AfterAdviceAdapter),
        ];
        Self {
            adapters: RwLock::new(adapters),
        }
    }

    /// 注册自定义适配器
    pub fn register_adapter(&self, adapter: Arc<dyn AdvisorAdapter>) {
        self.adapters.write().push(adapter);
    }

    /// 是否能处理该通知
    pub fn supports(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Around(_) | Advice::Introduction(_))
            || self.adapters.read().iter().any(|a| a.supports_advice(advice))
    }

    /// 把通知包装成 advisor（匹配一切）
    pub fn wrap(&self, advice: Advice) -> AopResult<Advisor> {
        if !self.supports(&advice) {
            return Err(AopConfigError::UnknownAdviceType(advice.type_name().to_string()));
        }
        Ok(Advisor::always(advice))
    }

    /// advisor 对应的拦截器
    pub fn get_interceptors(&self, advisor: &Advisor) -> AopResult<Vec<Arc<dyn MethodInterceptor>>> {
        let advice = advisor.advice();
        let mut interceptors: Vec<Arc<dyn MethodInterceptor>> = Vec::new();
        match advice {
            Advice::Around(i) => interceptors.push(Arc::clone(i)),
            Advice::Introduction(i) => {
                let interceptor: Arc<dyn MethodInterceptor> = i.clone();
                interceptors.push(interceptor);
            }
            _ => {}
        }
        for adapter in self.adapters.read().iter() {
            if adapter.supports_advice(advice) {
                interceptors.push(adapter.get_interceptor(advisor)?);
            }
        }
        if interceptors.is_empty() {
            return Err(AopConfigError::UnknownAdviceType(advice.type_name().to_string()));
        }
        Ok(interceptors)
    }
}

impl Default for DefaultAdvisorAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    struct MarkerInterceptor;

    impl MethodInterceptor for MarkerInterceptor {
        fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult<Value> {
            invocation.proceed()
        }
    }

    struct MarkerAdapter;

    impl AdvisorAdapter for MarkerAdapter {
        fn supports_advice(&self, advice: &Advice) -> bool {
            matches!(advice, Advice::Custom(a) if a.is::<Marker>())
        }

        fn get_interceptor(&self, _advisor: &Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
            Ok(Arc::new(MarkerInterceptor))
        }
    }

    #[test]
    fn test_builtin_advice_is_adapted() {
        let registry = DefaultAdvisorAdapterRegistry::new();
        let before = Advisor::always(Advice::before_fn(|_| Ok(())));
        let interceptors = registry.get_interceptors(&before).unwrap();
        assert_eq!(interceptors.len(), 1);
        assert!(interceptors[0].type_name().ends_with("MethodBeforeAdviceInterceptor"));

        let around = Advisor::always(Advice::around_fn(|mi| mi.proceed()));
        assert_eq!(registry.get_interceptors(&around).unwrap().len(), 1);
    }

    #[test]
    fn test_custom_advice_needs_adapter() {
        let registry = DefaultAdvisorAdapterRegistry::new();
        let advisor = Advisor::always(Advice::custom(Marker));
        assert!(matches!(
            registry.get_interceptors(&advisor),
            Err(AopConfigError::UnknownAdviceType(_))
        ));
        assert!(registry.wrap(Advice::custom(Marker)).is_err());

        registry.register_adapter(Arc::new(MarkerAdapter));
        assert!(registry.supports(&Advice::custom(Marker)));
        assert_eq!(registry.get_interceptors(&advisor).unwrap().len(), 1);
    }
}
