//! Advisor：通知 + 适用范围
//!
//! - 切点 advisor：通知配一个切点，没有切点时匹配一切
//! - 引入 advisor：通知为代理引入新的接口

use crate::advice::{Advice, IntroductionInterceptor};
use crate::error::{AopConfigError, AopResult};
use crate::pointcut::{ClassFilter, Pointcut, TrueClassFilter, TruePointcut};
use crate::reflect::Class;
use std::fmt;
use std::sync::{Arc, Weak};

/// 带切点的 advisor
pub struct DefaultPointcutAdvisor {
    pointcut: Arc<dyn Pointcut>,
    advice: Advice,
    order: Option<i32>,
}

impl DefaultPointcutAdvisor {
    /// 匹配一切
    pub fn new(advice: Advice) -> Self {
        Self::with_pointcut(Arc::new(TruePointcut), advice)
    }

    pub fn with_pointcut(pointcut: Arc<dyn Pointcut>, advice: Advice) -> Self {
        Self {
            pointcut,
            advice,
            order: None,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn pointcut(&self) -> &Arc<dyn Pointcut> {
        &self.pointcut
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    pub fn order(&self) -> Option<i32> {
        self.order
    }
}

/// 引入 advisor
pub struct DefaultIntroductionAdvisor {
    advice: Advice,
    interceptor: Arc<dyn IntroductionInterceptor>,
    interfaces: Vec<Class>,
    class_filter: Arc<dyn ClassFilter>,
    order: Option<i32>,
}

impl DefaultIntroductionAdvisor {
    /// 引入拦截器自己声明的全部接口
    pub fn new(interceptor: Arc<dyn IntroductionInterceptor>) -> Self {
        let interfaces = interceptor.interfaces();
        Self::with_interfaces(interceptor, interfaces)
    }

    /// 只引入指定的接口
    pub fn with_interfaces(interceptor: Arc<dyn IntroductionInterceptor>, interfaces: Vec<Class>) -> Self {
        Self {
            advice: Advice::Introduction(Arc::clone(&interceptor)),
            interceptor,
            interfaces,
            class_filter: Arc::new(TrueClassFilter),
            order: None,
        }
    }

    pub fn with_class_filter(mut self, class_filter: impl ClassFilter) -> Self {
        self.class_filter = Arc::new(class_filter);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    pub fn interceptor(&self) -> &Arc<dyn IntroductionInterceptor> {
        &self.interceptor
    }

    pub fn interfaces(&self) -> &[Class] {
        &self.interfaces
    }

    pub fn class_filter(&self) -> &dyn ClassFilter {
        self.class_filter.as_ref()
    }

    pub fn order(&self) -> Option<i32> {
        self.order
    }

    /// 至少一个接口；每个都必须是接口，并且拦截器确实实现了它
    pub fn validate_interfaces(&self) -> AopResult<()> {
        if self.interfaces.is_empty() {
            return Err(AopConfigError::InvalidIntroduction(
                "introduction advisor must introduce at least one interface".to_string(),
            ));
        }
        for interface in &self.interfaces {
            if !interface.is_interface() {
                return Err(AopConfigError::InvalidIntroduction(format!(
                    "class '{}' is not an interface and cannot be introduced",
                    interface.name()
                )));
            }
            if !self.interceptor.implements_interface(interface) {
                return Err(AopConfigError::InvalidIntroduction(format!(
                    "introduction interceptor does not implement interface '{}' specified for introduction",
                    interface.name()
                )));
            }
        }
        Ok(())
    }
}

/// Advisor
#[derive(Clone)]
pub enum Advisor {
    Pointcut(Arc<DefaultPointcutAdvisor>),
    Introduction(Arc<DefaultIntroductionAdvisor>),
}

impl Advisor {
    /// 无条件应用的通知
    pub fn always(advice: Advice) -> Self {
        Advisor::Pointcut(Arc::new(DefaultPointcutAdvisor::new(advice)))
    }

    pub fn with_pointcut(pointcut: Arc<dyn Pointcut>, advice: Advice) -> Self {
        Advisor::Pointcut(Arc::new(DefaultPointcutAdvisor::with_pointcut(pointcut, advice)))
    }

    pub fn introduction(advisor: DefaultIntroductionAdvisor) -> Self {
        Advisor::Introduction(Arc::new(advisor))
    }

    pub fn advice(&self) -> &Advice {
        match self {
            Advisor::Pointcut(a) => a.advice(),
            Advisor::Introduction(a) => a.advice(),
        }
    }

    pub fn is_introduction(&self) -> bool {
        matches!(self, Advisor::Introduction(_))
    }

    pub fn pointcut(&self) -> Option<&Arc<dyn Pointcut>> {
        match self {
            Advisor::Pointcut(a) => Some(a.pointcut()),
            Advisor::Introduction(_) => None,
        }
    }

    pub fn introduced_interfaces(&self) -> &[Class] {
        match self {
            Advisor::Pointcut(_) => &[],
            Advisor::Introduction(a) => a.interfaces(),
        }
    }

    pub fn order(&self) -> Option<i32> {
        match self {
            Advisor::Pointcut(a) => a.order(),
            Advisor::Introduction(a) => a.order(),
        }
    }

    /// 是否是同一个 advisor 实例
    pub fn ptr_eq(&self, other: &Advisor) -> bool {
        match (self, other) {
            (Advisor::Pointcut(a), Advisor::Pointcut(b)) => Arc::ptr_eq(a, b),
            (Advisor::Introduction(a), Advisor::Introduction(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// 通知类型相同、切点相等（不比较通知实例）
    pub fn same_shape(&self, other: &Advisor) -> bool {
        if self.advice().concrete_type() != other.advice().concrete_type() {
            return false;
        }
        match (self, other) {
            (Advisor::Pointcut(a), Advisor::Pointcut(b)) => a.pointcut().equals(b.pointcut().as_ref()),
            (Advisor::Introduction(a), Advisor::Introduction(b)) => {
                a.interfaces() == b.interfaces() && a.class_filter().equals(b.class_filter())
            }
            _ => false,
        }
    }

    /// 不持有通知的弱引用
    pub(crate) fn downgrade(&self) -> WeakAdvisor {
        match self {
            Advisor::Pointcut(a) => WeakAdvisor::Pointcut(Arc::downgrade(a)),
            Advisor::Introduction(a) => WeakAdvisor::Introduction(Arc::downgrade(a)),
        }
    }
}

/// `Advisor` 的弱引用
#[derive(Clone)]
pub(crate) enum WeakAdvisor {
    Pointcut(Weak<DefaultPointcutAdvisor>),
    Introduction(Weak<DefaultIntroductionAdvisor>),
}

impl WeakAdvisor {
    pub(crate) fn upgrade(&self) -> Option<Advisor> {
        match self {
            WeakAdvisor::Pointcut(a) => a.upgrade().map(Advisor::Pointcut),
            WeakAdvisor::Introduction(a) => a.upgrade().map(Advisor::Introduction),
        }
    }
}

impl From<Advice> for Advisor {
    fn from(advice: Advice) -> Self {
        Advisor::always(advice)
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisor::Pointcut(a) => f
                .debug_struct("PointcutAdvisor")
                .field("pointcut", &a.pointcut().describe())
                .field("advice", a.advice())
                .finish(),
            Advisor::Introduction(a) => f
                .debug_struct("IntroductionAdvisor")
                .field(
                    "interfaces",
                    &a.interfaces().iter().map(Class::name).collect::<Vec<_>>(),
                )
                .field("advice", a.advice())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introduction::DelegatingIntroductionInterceptor;
    use crate::pointcut::NameMatchMethodPointcut;
    use crate::reflect::{ClassBuilder, Object, Value, ValueType};
    use crate::test_support::RecordingAdvice;

    struct Stamp;

    fn lockable() -> Class {
        ClassBuilder::interface("Lockable")
            .abstract_method("lock", vec![], ValueType::Void)
            .build()
    }

    fn stamp_class() -> Class {
        ClassBuilder::<Stamp>::new("Stamp")
            .implements(&lockable())
            .method("lock", vec![], ValueType::Void, |_: &Stamp, _| Ok(Value::Unit))
            .build()
    }

    fn delegate() -> DelegatingIntroductionInterceptor {
        let object: Object = Arc::new(Stamp);
        DelegatingIntroductionInterceptor::new(object, stamp_class())
    }

    #[test]
    fn test_validate_interfaces() {
        let advisor = DefaultIntroductionAdvisor::new(Arc::new(delegate()));
        assert!(advisor.validate_interfaces().is_ok());

        let empty = DefaultIntroductionAdvisor::with_interfaces(Arc::new(delegate()), vec![]);
        assert!(matches!(
            empty.validate_interfaces(),
            Err(AopConfigError::InvalidIntroduction(_))
        ));

        let not_interface =
            DefaultIntroductionAdvisor::with_interfaces(Arc::new(delegate()), vec![stamp_class()]);
        assert!(not_interface.validate_interfaces().is_err());

        let unrelated = ClassBuilder::interface("Auditable").build();
        let not_implemented =
            DefaultIntroductionAdvisor::with_interfaces(Arc::new(delegate()), vec![unrelated]);
        assert!(not_implemented.validate_interfaces().is_err());
    }

    #[test]
    fn test_same_shape_ignores_advice_instance() {
        let recorder = RecordingAdvice::new();
        let pointcut: Arc<dyn Pointcut> = Arc::new(NameMatchMethodPointcut::with_names(["get*"]));
        let a = Advisor::with_pointcut(Arc::clone(&pointcut), recorder.before("a"));
        let b = Advisor::with_pointcut(
            Arc::new(NameMatchMethodPointcut::with_names(["get*"])),
            recorder.before("b"),
        );
        let c = Advisor::with_pointcut(
            Arc::new(NameMatchMethodPointcut::with_names(["set*"])),
            recorder.before("c"),
        );

        assert!(a.same_shape(&b));
        assert!(!a.ptr_eq(&b));
        assert!(!a.same_shape(&c));
        assert!(!a.same_shape(&Advisor::always(recorder.around("d"))));
    }
}
