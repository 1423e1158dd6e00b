//! 引入（Introduction）
//!
//! 把引入接口上的调用转发给委托对象，其余调用继续沿调用链执行

use crate::advice::{IntroductionInterceptor, MethodInterceptor};
use crate::error::{InvocationError, InvocationResult};
use crate::invocation::MethodInvocation;
use crate::reflect::{same_object, Class, Object, Value};

/// 委托式引入拦截器
///
/// ```ignore
/// let mixin = DelegatingIntroductionInterceptor::new(Arc::new(LockMixin::default()), lock_mixin_class);
/// factory.add_advisor(Advisor::introduction(DefaultIntroductionAdvisor::new(Arc::new(mixin))))?;
/// ```
pub struct DelegatingIntroductionInterceptor {
    delegate: Object,
    delegate_class: Class,
    interfaces: Vec<Class>,
}

impl DelegatingIntroductionInterceptor {
    /// 引入委托类型实现的全部接口
    pub fn new(delegate: Object, delegate_class: Class) -> Self {
        let interfaces = delegate_class.all_interfaces();
        Self {
            delegate,
            delegate_class,
            interfaces,
        }
    }

    /// 不再引入某个接口
    pub fn suppress_interface(mut self, interface: &Class) -> Self {
        self.interfaces.retain(|i| i != interface);
        self
    }

    pub fn delegate(&self) -> &Object {
        &self.delegate
    }

    fn is_introduced(&self, declaring_type: &str) -> bool {
        self.interfaces
            .iter()
            .any(|i| i.is_assignable_to_name(declaring_type))
    }
}

impl MethodInterceptor for DelegatingIntroductionInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> InvocationResult<Value> {
        if !self.is_introduced(invocation.method().declaring_type()) {
            return invocation.proceed();
        }

        let method = invocation.method();
        let implementation = self
            .delegate_class
            .resolve_implementation(method)
            .ok_or_else(|| {
                InvocationError::infrastructure(
                    method.signature(),
                    anyhow::anyhow!(
                        "introduction delegate '{}' does not implement {}",
                        self.delegate_class.name(),
                        method.name()
                    ),
                )
            })?;
        let value = implementation.invoke(&self.delegate, invocation.arguments())?;

        // 委托返回自身时换成代理
        match &value {
            Value::Object(o) if same_object(o, &self.delegate) => {
                Ok(Value::Object(invocation.proxy().clone()))
            }
            _ => Ok(value),
        }
    }
}

impl IntroductionInterceptor for DelegatingIntroductionInterceptor {
    fn interfaces(&self) -> Vec<Class> {
        self.interfaces.clone()
    }

    fn implements_interface(&self, interface: &Class) -> bool {
        self.interfaces.iter().any(|i| i.is_assignable_to(interface))
    }
}
