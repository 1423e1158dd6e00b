//! 切面（Aspect）定义与常用通知
//!
//! 切面是横切关注点的模块化：一个切点加上前置、返回后、异常、后置四个钩子。
//! 切面通过 [`AspectInterceptor`] 适配成一个环绕拦截器，再由 [`aspect_advisor`]
//! 包装成 advisor。

use crate::advice::{Advice, MethodInterceptor, ThrowsAdvice};
use crate::advisor::{Advisor, DefaultPointcutAdvisor};
use crate::error::{InvocationError, InvocationResult};
use crate::error_info::ErrorInfo;
use crate::invocation::MethodInvocation;
use crate::joinpoint::JoinPoint;
use crate::pointcut::Pointcut;
use crate::reflect::Value;
use std::any::TypeId;
use std::sync::Arc;
use std::time::Duration;

/// 切面 Trait
///
/// 实现此 trait 以定义切面逻辑
pub trait Aspect: Send + Sync + 'static {
    /// 切面名称
    fn name(&self) -> &str;

    /// 切点
    fn pointcut(&self) -> Arc<dyn Pointcut>;

    /// 排序值，越小越靠前
    fn order(&self) -> Option<i32> {
        None
    }

    /// 前置通知（可选实现）
    ///
    /// 返回错误时目标方法不会执行
    fn before(&self, _join_point: &JoinPoint<'_>) -> InvocationResult<()> {
        Ok(())
    }

    /// 返回后通知（可选实现）
    fn after_returning(&self, _return_value: &Value, _join_point: &JoinPoint<'_>) {}

    /// 异常通知（可选实现）
    fn after_throwing(&self, _error: &InvocationError, _join_point: &JoinPoint<'_>) {}

    /// 后置通知（可选实现），任何出口都会执行
    fn after(&self, _join_point: &JoinPoint<'_>) {}

    fn concrete_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// 把切面的四个钩子合成一个环绕拦截器
pub struct AspectInterceptor {
    aspect: Arc<dyn Aspect>,
}

impl AspectInterceptor {
    pub fn new(aspect: Arc<dyn Aspect>) -> Self {
        Self { aspect }
    }

    pub fn aspect(&self) -> &Arc<dyn Aspect> {
        &self.aspect
    }
}

impl MethodInterceptor for AspectInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult<Value> {
        self.aspect.before(&invocation.join_point())?;
        let result = invocation.proceed();

        let join_point = invocation.join_point();
        match &result {
            Ok(value) => self.aspect.after_returning(value, &join_point),
            Err(error) => self.aspect.after_throwing(error, &join_point),
        }
        self.aspect.after(&join_point);
        result
    }

    fn type_name(&self) -> &'static str {
        "AspectInterceptor"
    }

    fn concrete_type(&self) -> TypeId {
        self.aspect.concrete_type()
    }
}

/// 用切面的切点和排序值构造 advisor
pub fn aspect_advisor(aspect: Arc<dyn Aspect>) -> Advisor {
    let pointcut = aspect.pointcut();
    let order = aspect.order();
    let mut advisor =
        DefaultPointcutAdvisor::with_pointcut(pointcut, Advice::around(AspectInterceptor::new(aspect)));
    if let Some(order) = order {
        advisor = advisor.with_order(order);
    }
    Advisor::Pointcut(Arc::new(advisor))
}

/// 切面注册器
///
/// 用于 inventory 自动收集和注册切面
pub struct AspectRegistration {
    /// 切面名称
    pub name: &'static str,

    /// 创建切面实例的函数
    pub creator: fn() -> Arc<dyn Aspect>,
}

impl AspectRegistration {
    /// 创建新的切面注册器
    pub const fn new(name: &'static str, creator: fn() -> Arc<dyn Aspect>) -> Self {
        Self { name, creator }
    }

    /// 创建切面实例
    pub fn create_instance(&self) -> Arc<dyn Aspect> {
        (self.creator)()
    }
}

// 使用 inventory 收集所有切面注册器
inventory::collect!(AspectRegistration);

/// 获取所有注册的切面注册器
pub fn get_all_aspect_registrations() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>()
}

/// 所有注册切面对应的 advisor，可以交给 `AutoProxyCreator`
pub fn registered_aspect_advisors() -> Vec<Advisor> {
    get_all_aspect_registrations()
        .map(|registration| {
            tracing::debug!("Loading aspect '{}'", registration.name);
            aspect_advisor(registration.create_instance())
        })
        .collect()
}

// ============================================================================
// 预定义的常用通知
// ============================================================================

/// 记录方法进入、退出与耗时
#[derive(Debug, Clone, Default)]
pub struct TraceInterceptor {
    log_args: bool,
    log_result: bool,
}

impl TraceInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }

    pub fn with_result(mut self) -> Self {
        self.log_result = true;
        self
    }
}

impl MethodInterceptor for TraceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult<Value> {
        let signature = invocation.join_point().signature();
        if self.log_args {
            tracing::info!("Entering: {} with args {:?}", signature, invocation.arguments());
        } else {
            tracing::info!("Entering: {}", signature);
        }

        let result = invocation.proceed();
        let elapsed = invocation.elapsed();
        match &result {
            Ok(value) if self.log_result => {
                tracing::info!("Exiting: {} (took {:?}) -> {:?}", signature, elapsed, value)
            }
            Ok(_) => tracing::info!("Exiting: {} (took {:?})", signature, elapsed),
            Err(e) => tracing::info!("Exiting: {} with error (took {:?}): {}", signature, elapsed, e),
        }
        result
    }
}

/// 性能监控：耗时超过阈值时告警
#[derive(Debug, Clone)]
pub struct PerformanceMonitorInterceptor {
    threshold: Duration,
}

impl PerformanceMonitorInterceptor {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

impl MethodInterceptor for PerformanceMonitorInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult<Value> {
        let result = invocation.proceed();
        let elapsed = invocation.elapsed();
        if elapsed > self.threshold {
            tracing::warn!(
                "Slow method detected: {} took {}ms (threshold: {}ms)",
                invocation.join_point().signature(),
                elapsed.as_millis(),
                self.threshold.as_millis()
            );
        } else {
            tracing::trace!("{} took {:?}", invocation.join_point().signature(), elapsed);
        }
        result
    }
}

/// 异常日志：记录错误及其源链，错误继续抛出
#[derive(Debug, Clone, Default)]
pub struct ExceptionLoggingAdvice {
    include_infrastructure: bool,
}

impl ExceptionLoggingAdvice {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同时记录代理机制自身的错误
    pub fn including_infrastructure(mut self) -> Self {
        self.include_infrastructure = true;
        self
    }
}

impl ThrowsAdvice for ExceptionLoggingAdvice {
    fn handles(&self, error: &InvocationError) -> bool {
        self.include_infrastructure || !error.is_infrastructure()
    }

    fn after_throwing(&self, error: &InvocationError, join_point: &JoinPoint<'_>) -> InvocationResult<()> {
        let info = ErrorInfo::from_invocation_error(error);
        tracing::error!(
            error_type = %info.error_type,
            "Exception in {}: {}",
            join_point.signature(),
            info.full_description()
        );
        Ok(())
    }
}

type RetryPredicate = Arc<dyn Fn(&InvocationError) -> bool + Send + Sync>;

/// 失败后重新执行调用链的剩余部分
///
/// 默认只重试应用错误，最多执行 `max_attempts` 次。
#[derive(Clone)]
pub struct RetryInterceptor {
    max_attempts: usize,
    retry_on: RetryPredicate,
}

impl RetryInterceptor {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_on: Arc::new(|e: &InvocationError| !e.is_infrastructure()),
        }
    }

    /// 指定哪些错误需要重试
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&InvocationError) -> bool + Send + Sync + 'static,
    {
        self.retry_on = Arc::new(predicate);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

impl MethodInterceptor for RetryInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult<Value> {
        let mut attempt = 1;
        loop {
            let result = invocation.invocable_clone().proceed();
            match result {
                Err(e) if attempt < self.max_attempts && (self.retry_on)(&e) => {
                    tracing::warn!(
                        "Attempt {}/{} of {} failed: {}",
                        attempt,
                        self.max_attempts,
                        invocation.join_point().signature(),
                        e
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcut::NameMatchMethodPointcut;
    use crate::proxy::ProxyFactory;
    use crate::test_support::person;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingAspect {
        events: Mutex<Vec<String>>,
    }

    impl Aspect for RecordingAspect {
        fn name(&self) -> &str {
            "RecordingAspect"
        }

        fn pointcut(&self) -> Arc<dyn Pointcut> {
            Arc::new(NameMatchMethodPointcut::with_names(["greet", "fail"]))
        }

        fn before(&self, join_point: &JoinPoint<'_>) -> InvocationResult<()> {
            self.events.lock().push(format!("before {}", join_point.method_name()));
            Ok(())
        }

        fn after_returning(&self, return_value: &Value, _: &JoinPoint<'_>) {
            self.events.lock().push(format!("returned {:?}", return_value.as_str()));
        }

        fn after_throwing(&self, error: &InvocationError, _: &JoinPoint<'_>) {
            self.events.lock().push(format!("threw {}", error));
        }

        fn after(&self, join_point: &JoinPoint<'_>) {
            self.events.lock().push(format!("after {}", join_point.method_name()));
        }
    }

    fn registered_aspect() -> Arc<dyn Aspect> {
        Arc::new(RecordingAspect::default())
    }

    inventory::submit! {
        AspectRegistration::new("RecordingAspect", registered_aspect)
    }

    #[test]
    fn test_aspect_hooks_order() {
        let aspect = Arc::new(RecordingAspect::default());
        let factory = ProxyFactory::for_target(person("ann"));
        factory.add_advisor(aspect_advisor(aspect.clone())).unwrap();
        let proxy = factory.get_proxy().unwrap();

        proxy.invoke_named("greet", vec![Value::from("bob")]).unwrap();
        proxy.invoke_named("fail", vec![]).unwrap_err();

        assert_eq!(
            *aspect.events.lock(),
            [
                "before greet",
                "returned Some(\"ann greets bob\")",
                "after greet",
                "before fail",
                "threw greeting failed",
                "after fail",
            ]
        );
    }

    #[test]
    fn test_aspect_pointcut_limits_methods() {
        let aspect = Arc::new(RecordingAspect::default());
        let factory = ProxyFactory::for_target(person("ann"));
        factory.add_advisor(aspect_advisor(aspect.clone())).unwrap();
        let proxy = factory.get_proxy().unwrap();

        proxy.invoke_named("lucky_number", vec![]).unwrap_err();
        assert!(aspect.events.lock().is_empty());
    }

    #[test]
    fn test_registered_aspects_are_collected() {
        assert!(get_all_aspect_registrations().any(|r| r.name == "RecordingAspect"));
        assert!(!registered_aspect_advisors().is_empty());
    }

    #[test]
    fn test_aspect_advisor_carries_order() {
        struct Ordered;
        impl Aspect for Ordered {
            fn name(&self) -> &str {
                "Ordered"
            }
            fn pointcut(&self) -> Arc<dyn Pointcut> {
                Arc::new(crate::pointcut::TruePointcut)
            }
            fn order(&self) -> Option<i32> {
                Some(5)
            }
        }
        assert_eq!(aspect_advisor(Arc::new(Ordered)).order(), Some(5));
    }

    #[test]
    fn test_retry_reruns_rest_of_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let flaky = Advice::around_fn(move |mi| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(InvocationError::msg("flaky"))
            } else {
                mi.proceed()
            }
        });

        let factory = ProxyFactory::for_target(person("ann"));
        factory.add_advice(Advice::around(RetryInterceptor::new(3))).unwrap();
        factory.add_advice(flaky).unwrap();
        let proxy = factory.get_proxy().unwrap();

        let result = proxy.invoke_named("greet", vec![Value::from("bob")]).unwrap();
        assert_eq!(result.as_str(), Some("ann greets bob"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_gives_up() {
        let factory = ProxyFactory::for_target(person("ann"));
        factory.add_advice(Advice::around(RetryInterceptor::new(2))).unwrap();
        let proxy = factory.get_proxy().unwrap();

        let err = proxy.invoke_named("fail", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "greeting failed");
    }

    #[test]
    fn test_retry_predicate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory = ProxyFactory::for_target(person("ann"));
        factory
            .add_advice(Advice::around(RetryInterceptor::new(5).retry_on(|_| false)))
            .unwrap();
        factory
            .add_advice(Advice::before_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
        let proxy = factory.get_proxy().unwrap();

        proxy.invoke_named("fail", vec![]).unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stock_advice_passes_results_through() {
        let subscriber = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let factory = ProxyFactory::for_target(person("ann"));
        factory
            .add_advice(Advice::around(TraceInterceptor::new().with_args().with_result()))
            .unwrap();
        factory
            .add_advice(Advice::around(PerformanceMonitorInterceptor::new(Duration::ZERO)))
            .unwrap();
        factory
            .add_advice(Advice::after_throwing(ExceptionLoggingAdvice::new()))
            .unwrap();
        let proxy = factory.get_proxy().unwrap();

        let result = proxy.invoke_named("greet", vec![Value::from("bob")]).unwrap();
        assert_eq!(result.as_str(), Some("ann greets bob"));
        let err = proxy.invoke_named("fail", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "greeting failed");
    }
}
