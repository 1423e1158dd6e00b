//! 方法调用（调用链执行器）
//!
//! 每次外部调用创建一个 `MethodInvocation`，游标从 -1 开始：
//! 每次 `proceed()` 前进一格，走到最后一格之后调用真正的目标方法。

use crate::aop_utils;
use crate::chain_factory::ChainElement;
use crate::error::InvocationResult;
use crate::joinpoint::JoinPoint;
use crate::reflect::{Class, Method, Object, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 一次方法调用
pub struct MethodInvocation {
    proxy: Object,
    target: Option<Object>,
    method: Method,
    arguments: Vec<Value>,
    target_class: Option<Class>,
    chain: Arc<[ChainElement]>,
    current_index: isize,
    user_attributes: HashMap<String, Value>,
    started: Instant,
}

impl MethodInvocation {
    pub fn new(
        proxy: Object,
        target: Option<Object>,
        method: Method,
        arguments: Vec<Value>,
        target_class: Option<Class>,
        chain: Arc<[ChainElement]>,
    ) -> Self {
        Self {
            proxy,
            target,
            method,
            arguments,
            target_class,
            chain,
            current_index: -1,
            user_attributes: HashMap::new(),
            started: Instant::now(),
        }
    }

    /// 执行调用链的下一个拦截器，或者在链尾调用目标方法
    pub fn proceed(&mut self) -> InvocationResult<Value> {
        if self.current_index == self.chain.len() as isize - 1 {
            return self.invoke_joinpoint();
        }

        self.current_index += 1;
        let chain = Arc::clone(&self.chain);
        match &chain[self.current_index as usize] {
            ChainElement::Dynamic {
                interceptor,
                matcher,
            } => {
                let class = self.target_class.clone().unwrap_or_else(Class::object);
                if matcher.matches_with_args(&self.method, &class, &self.arguments) {
                    interceptor.invoke(self)
                } else {
                    // 动态匹配失败：跳过这一格
                    self.proceed()
                }
            }
            ChainElement::Interceptor(interceptor) => interceptor.invoke(self),
        }
    }

    fn invoke_joinpoint(&self) -> InvocationResult<Value> {
        aop_utils::invoke_joinpoint_using_reflection(
            self.target.as_ref(),
            &self.method,
            &self.arguments,
        )
    }

    /// 复制当前调用（游标位置相同），可以让通知多次执行调用链的剩余部分
    pub fn invocable_clone(&self) -> MethodInvocation {
        self.invocable_clone_with(self.arguments.clone())
    }

    /// 复制当前调用并替换参数
    pub fn invocable_clone_with(&self, arguments: Vec<Value>) -> MethodInvocation {
        MethodInvocation {
            proxy: Arc::clone(&self.proxy),
            target: self.target.clone(),
            method: self.method.clone(),
            arguments,
            target_class: self.target_class.clone(),
            chain: Arc::clone(&self.chain),
            current_index: self.current_index,
            user_attributes: self.user_attributes.clone(),
            started: self.started,
        }
    }

    /// 代理对象
    pub fn proxy(&self) -> &Object {
        &self.proxy
    }

    /// 目标对象
    pub fn this(&self) -> Option<&Object> {
        self.target.as_ref()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// 通知可以修改参数
    pub fn arguments_mut(&mut self) -> &mut Vec<Value> {
        &mut self.arguments
    }

    pub fn set_arguments(&mut self, arguments: Vec<Value>) {
        self.arguments = arguments;
    }

    pub fn target_class(&self) -> Option<&Class> {
        self.target_class.as_ref()
    }

    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub fn current_index(&self) -> isize {
        self.current_index
    }

    pub fn set_user_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.user_attributes.insert(key.into(), value);
    }

    pub fn user_attribute(&self, key: &str) -> Option<&Value> {
        self.user_attributes.get(key)
    }

    pub fn remove_user_attribute(&mut self, key: &str) -> Option<Value> {
        self.user_attributes.remove(key)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 只读视图
    pub fn join_point(&self) -> JoinPoint<'_> {
        JoinPoint::new(
            &self.method,
            &self.arguments,
            self.target.as_ref(),
            self.target_class.as_ref(),
            self.started,
        )
    }
}

impl fmt::Debug for MethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 只描述类型名，不调用目标自己的字符串化方法（那样可能重入代理）
        f.debug_struct("MethodInvocation")
            .field("method", &self.method.signature())
            .field(
                "target",
                &match (&self.target, &self.target_class) {
                    (None, _) => "<none>".to_string(),
                    (Some(_), Some(class)) => format!("target of type [{}]", class.name()),
                    (Some(_), None) => "target of unknown type".to_string(),
                },
            )
            .field("current_index", &self.current_index)
            .field("chain_len", &self.chain.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::adapter::get_adapter_registry;
    use crate::advisor::Advisor;
    use crate::error::InvocationError;
    use crate::pointcut::{DynamicMethodMatcherPointcut, Pointcut, PointcutMethodMatcher};
    use crate::test_support::{greeter_method, person, person_class, RecordingAdvice};

    fn interceptors(advice: Advice) -> Vec<ChainElement> {
        get_adapter_registry()
            .get_interceptors(&Advisor::always(advice))
            .unwrap()
            .into_iter()
            .map(ChainElement::Interceptor)
            .collect()
    }

    fn invocation(chain: Vec<ChainElement>, method: &str, args: Vec<Value>) -> MethodInvocation {
        let target = person("ann");
        MethodInvocation::new(
            Arc::clone(&target),
            Some(target),
            greeter_method(method),
            args,
            Some(person_class()),
            chain.into(),
        )
    }

    #[test]
    fn test_empty_chain_invokes_target() {
        let mut mi = invocation(vec![], "greet", vec![Value::from("bob")]);
        assert_eq!(mi.proceed().unwrap(), Value::from("ann greets bob"));
    }

    #[test]
    fn test_ordering_before_around_after() {
        let recorder = RecordingAdvice::new();
        let mut chain = interceptors(recorder.before("a1"));
        chain.extend(interceptors(recorder.around("a2")));
        chain.extend(interceptors(recorder.after_returning("a3")));

        let mut mi = invocation(chain, "greet", vec![Value::from("bob")]);
        mi.proceed().unwrap();
        assert_eq!(
            recorder.events(),
            ["a1-before", "a2-before", "a2-after", "a3-after"]
        );
    }

    #[test]
    fn test_dynamic_element_is_skipped_when_args_do_not_match() {
        let recorder = RecordingAdvice::new();
        let pointcut: Arc<dyn Pointcut> = Arc::new(DynamicMethodMatcherPointcut::new(|_, _, args| {
            args.first().and_then(Value::as_str) == Some("bob")
        }));
        let element = |advice: Advice| {
            interceptors(advice)
                .into_iter()
                .map(|e| match e {
                    ChainElement::Interceptor(interceptor) => ChainElement::Dynamic {
                        interceptor,
                        matcher: Arc::new(PointcutMethodMatcher(Arc::clone(&pointcut))),
                    },
                    other => other,
                })
                .collect::<Vec<_>>()
        };

        let chain: Arc<[ChainElement]> = element(recorder.before("dyn")).into();
        let target = person("ann");
        let mut skipped = MethodInvocation::new(
            Arc::clone(&target),
            Some(Arc::clone(&target)),
            greeter_method("greet"),
            vec![Value::from("carl")],
            Some(person_class()),
            Arc::clone(&chain),
        );
        skipped.proceed().unwrap();
        assert!(recorder.events().is_empty());

        let mut matched = MethodInvocation::new(
            Arc::clone(&target),
            Some(target),
            greeter_method("greet"),
            vec![Value::from("bob")],
            Some(person_class()),
            chain,
        );
        matched.proceed().unwrap();
        assert_eq!(recorder.events(), ["dyn-before"]);
    }

    #[test]
    fn test_invocable_clone_replays_rest_of_chain() {
        let recorder = RecordingAdvice::new();
        let replay = Advice::around_fn(|mi| {
            let first = mi.invocable_clone_with(vec![Value::from("x")]).proceed()?;
            let second = mi.proceed()?;
            Ok(Value::Str(format!(
                "{} / {}",
                first.as_str().unwrap_or(""),
                second.as_str().unwrap_or("")
            )))
        });
        let mut chain = interceptors(replay);
        chain.extend(interceptors(recorder.before("inner")));

        let mut mi = invocation(chain, "greet", vec![Value::from("y")]);
        assert_eq!(
            mi.proceed().unwrap(),
            Value::from("ann greets x / ann greets y")
        );
        assert_eq!(recorder.events(), ["inner-before", "inner-before"]);
    }

    #[test]
    fn test_target_error_passes_through_unchanged() {
        let mut mi = invocation(vec![], "fail", vec![]);
        let err = mi.proceed().unwrap_err();
        assert!(matches!(err, InvocationError::Thrown(_)));
        assert_eq!(err.to_string(), "greeting failed");
    }

    #[test]
    fn test_no_target() {
        let target = person("ann");
        let mut mi = MethodInvocation::new(
            target,
            None,
            greeter_method("greet"),
            vec![Value::from("x")],
            None,
            Vec::new().into(),
        );
        assert!(matches!(mi.proceed(), Err(InvocationError::NoTarget { .. })));
    }

    #[test]
    fn test_user_attributes_and_join_point() {
        let mut mi = invocation(vec![], "greet", vec![Value::from("z")]);
        mi.set_user_attribute("attempt", Value::Int(1));
        assert_eq!(mi.user_attribute("attempt"), Some(&Value::Int(1)));
        assert_eq!(mi.join_point().signature(), "Person::greet");
        assert_eq!(mi.current_index(), -1);
        assert!(format!("{:?}", mi).contains("target of type [Person]"));
    }
}
