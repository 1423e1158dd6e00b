//! 通知（Advice）定义
//!
//! 通知的种类是一个封闭集合，在注册 advisor 时就确定下来，调用时不再做类型判断。
//! 每种通知最终都会被适配成 [`MethodInterceptor`]，由调用链统一执行。

use crate::error::{InvocationError, InvocationResult};
use crate::invocation::MethodInvocation;
use crate::joinpoint::JoinPoint;
use crate::reflect::{Class, Value};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceType {
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
    /// 环绕通知（可以控制方法执行）
    Around,
    /// 引入新的接口
    Introduction,
}

/// 前置通知
///
/// 返回错误会中断调用，目标方法不会执行
pub trait MethodBeforeAdvice: Send + Sync + 'static {
    fn before(&self, join_point: &JoinPoint<'_>) -> InvocationResult<()>;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn concrete_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// 返回后通知
pub trait AfterReturningAdvice: Send + Sync + 'static {
    fn after_returning(&self, return_value: &Value, join_point: &JoinPoint<'_>) -> InvocationResult<()>;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn concrete_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// 异常通知
///
/// 原错误在通知执行后继续抛出；通知自己返回的错误会替换原错误
pub trait ThrowsAdvice: Send + Sync + 'static {
    /// 是否处理该错误
    fn handles(&self, _error: &InvocationError) -> bool {
        true
    }

    fn after_throwing(&self, error: &InvocationError, join_point: &JoinPoint<'_>) -> InvocationResult<()>;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn concrete_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// 后置通知，任何出口都会执行
pub trait AfterAdvice: Send + Sync + 'static {
    fn after(&self, join_point: &JoinPoint<'_>) -> InvocationResult<()>;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn concrete_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// 环绕通知（拦截器）
///
/// 自己决定是否、何时调用 `invocation.proceed()`
pub trait MethodInterceptor: Send + Sync + 'static {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult<Value>;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn concrete_type(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// 引入拦截器：让代理额外实现一组接口
pub trait IntroductionInterceptor: MethodInterceptor {
    /// 引入的接口
    fn interfaces(&self) -> Vec<Class>;

    fn implements_interface(&self, interface: &Class) -> bool {
        self.interfaces().iter().any(|i| i == interface)
    }
}

/// 通知
#[derive(Clone)]
pub enum Advice {
    Before(Arc<dyn MethodBeforeAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn ThrowsAdvice>),
    After(Arc<dyn AfterAdvice>),
    Around(Arc<dyn MethodInterceptor>),
    Introduction(Arc<dyn IntroductionInterceptor>),
    /// 由用户注册的 `AdvisorAdapter` 处理
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Advice {
    pub fn before(advice: impl MethodBeforeAdvice) -> Self {
        Advice::Before(Arc::new(advice))
    }

    pub fn after_returning(advice: impl AfterReturningAdvice) -> Self {
        Advice::AfterReturning(Arc::new(advice))
    }

    pub fn after_throwing(advice: impl ThrowsAdvice) -> Self {
        Advice::AfterThrowing(Arc::new(advice))
    }

    pub fn after(advice: impl AfterAdvice) -> Self {
        Advice::After(Arc::new(advice))
    }

    pub fn around(interceptor: impl MethodInterceptor) -> Self {
        Advice::Around(Arc::new(interceptor))
    }

    pub fn introduction(interceptor: impl IntroductionInterceptor) -> Self {
        Advice::Introduction(Arc::new(interceptor))
    }

    pub fn custom(advice: impl Any + Send + Sync) -> Self {
        Advice::Custom(Arc::new(advice))
    }

    /// 用闭包定义前置通知
    pub fn before_fn<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint<'_>) -> InvocationResult<()> + Send + Sync + 'static,
    {
        Advice::before(FnBeforeAdvice(f))
    }

    pub fn after_returning_fn<F>(f: F) -> Self
    where
        F: Fn(&Value, &JoinPoint<'_>) -> InvocationResult<()> + Send + Sync + 'static,
    {
        Advice::after_returning(FnAfterReturningAdvice(f))
    }

    pub fn after_throwing_fn<F>(f: F) -> Self
    where
        F: Fn(&InvocationError, &JoinPoint<'_>) -> InvocationResult<()> + Send + Sync + 'static,
    {
        Advice::after_throwing(FnThrowsAdvice(f))
    }

    pub fn after_fn<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint<'_>) -> InvocationResult<()> + Send + Sync + 'static,
    {
        Advice::after(FnAfterAdvice(f))
    }

    pub fn around_fn<F>(f: F) -> Self
    where
        F: Fn(&mut MethodInvocation) -> InvocationResult<Value> + Send + Sync + 'static,
    {
        Advice::around(FnInterceptor(f))
    }

    /// 通知类型；自定义通知返回 `None`
    pub fn advice_type(&self) -> Option<AdviceType> {
        match self {
            Advice::Before(_) => Some(AdviceType::Before),
            Advice::AfterReturning(_) => Some(AdviceType::AfterReturning),
            Advice::AfterThrowing(_) => Some(AdviceType::AfterThrowing),
            Advice::After(_) => Some(AdviceType::After),
            Advice::Around(_) => Some(AdviceType::Around),
            Advice::Introduction(_) => Some(AdviceType::Introduction),
            Advice::Custom(_) => None,
        }
    }

    /// 具体实现类型，代理相等性只看它而不看实例
    pub fn concrete_type(&self) -> TypeId {
        match self {
            Advice::Before(a) => a.concrete_type(),
            Advice::AfterReturning(a) => a.concrete_type(),
            Advice::AfterThrowing(a) => a.concrete_type(),
            Advice::After(a) => a.concrete_type(),
            Advice::Around(a) => a.concrete_type(),
            Advice::Introduction(a) => a.concrete_type(),
            Advice::Custom(a) => Any::type_id(&**a),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Advice::Before(a) => a.type_name(),
            Advice::AfterReturning(a) => a.type_name(),
            Advice::AfterThrowing(a) => a.type_name(),
            Advice::After(a) => a.type_name(),
            Advice::Around(a) => a.type_name(),
            Advice::Introduction(a) => a.type_name(),
            Advice::Custom(_) => "custom",
        }
    }

    /// 是否是同一个通知实例
    pub fn ptr_eq(&self, other: &Advice) -> bool {
        fn addr<T: ?Sized>(arc: &Arc<T>) -> *const () {
            Arc::as_ptr(arc) as *const ()
        }
        let (a, b) = match (self, other) {
            (Advice::Before(a), Advice::Before(b)) => (addr(a), addr(b)),
            (Advice::AfterReturning(a), Advice::AfterReturning(b)) => (addr(a), addr(b)),
            (Advice::AfterThrowing(a), Advice::AfterThrowing(b)) => (addr(a), addr(b)),
            (Advice::After(a), Advice::After(b)) => (addr(a), addr(b)),
            (Advice::Around(a), Advice::Around(b)) => (addr(a), addr(b)),
            (Advice::Introduction(a), Advice::Introduction(b)) => (addr(a), addr(b)),
            (Advice::Custom(a), Advice::Custom(b)) => (addr(a), addr(b)),
            _ => return false,
        };
        a == b
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.advice_type() {
            Some(kind) => write!(f, "{:?}({})", kind, self.type_name()),
            None => write!(f, "Custom"),
        }
    }
}

struct FnBeforeAdvice<F>(F);

impl<F> MethodBeforeAdvice for FnBeforeAdvice<F>
where
    F: Fn(&JoinPoint<'_>) -> InvocationResult<()> + Send + Sync + 'static,
{
    fn before(&self, join_point: &JoinPoint<'_>) -> InvocationResult<()> {
        (self.0)(join_point)
    }
}

struct FnAfterReturningAdvice<F>(F);

impl<F> AfterReturningAdvice for FnAfterReturningAdvice<F>
where
    F: Fn(&Value, &JoinPoint<'_>) -> InvocationResult<()> + Send + Sync + 'static,
{
    fn after_returning(&self, return_value: &Value, join_point: &JoinPoint<'_>) -> InvocationResult<()> {
        (self.0)(return_value, join_point)
    }
}

struct FnThrowsAdvice<F>(F);

impl<F> ThrowsAdvice for FnThrowsAdvice<F>
where
    F: Fn(&InvocationError, &JoinPoint<'_>) -> InvocationResult<()> + Send + Sync + 'static,
{
    fn after_throwing(&self, error: &InvocationError, join_point: &JoinPoint<'_>) -> InvocationResult<()> {
        (self.0)(error, join_point)
    }
}

struct FnAfterAdvice<F>(F);

impl<F> AfterAdvice for FnAfterAdvice<F>
where
    F: Fn(&JoinPoint<'_>) -> InvocationResult<()> + Send + Sync + 'static,
{
    fn after(&self, join_point: &JoinPoint<'_>) -> InvocationResult<()> {
        (self.0)(join_point)
    }
}

struct FnInterceptor<F>(F);

impl<F> MethodInterceptor for FnInterceptor<F>
where
    F: Fn(&mut MethodInvocation) -> InvocationResult<Value> + Send + Sync + 'static,
{
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult<Value> {
        (self.0)(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Audit;

    impl MethodBeforeAdvice for Audit {
        fn before(&self, _join_point: &JoinPoint<'_>) -> InvocationResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_advice_type_tags() {
        assert_eq!(Advice::before(Audit).advice_type(), Some(AdviceType::Before));
        assert_eq!(
            Advice::around_fn(|mi| mi.proceed()).advice_type(),
            Some(AdviceType::Around)
        );
        assert_eq!(Advice::custom(42_u32).advice_type(), None);
    }

    #[test]
    fn test_concrete_type_ignores_instance() {
        let a = Advice::before(Audit);
        let b = Advice::before(Audit);
        assert_eq!(a.concrete_type(), b.concrete_type());
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
        assert_eq!(Advice::custom(1_u8).concrete_type(), TypeId::of::<u8>());
    }

    #[test]
    fn test_type_name_names_implementation() {
        assert!(Advice::before(Audit).type_name().ends_with("Audit"));
    }
}
