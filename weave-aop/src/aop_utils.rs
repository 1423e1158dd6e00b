//! 代理相关的工具函数

use crate::advisor::Advisor;
use crate::error::{InvocationError, InvocationResult};
use crate::pointcut::{Pointcut, TrueMethodMatcher};
use crate::reflect::{Class, Method, Object, Value, OBJECT_CLASS_NAME};

/// `equals(other)`
pub fn is_equals_method(method: &Method) -> bool {
    method.name() == "equals" && method.param_types().len() == 1
}

/// `hash_code()`
pub fn is_hash_code_method(method: &Method) -> bool {
    method.name() == "hash_code" && method.param_types().is_empty()
}

/// `to_string()`
pub fn is_to_string_method(method: &Method) -> bool {
    method.name() == "to_string" && method.param_types().is_empty()
}

/// 声明在通用基类型上的方法
pub fn is_object_method(method: &Method) -> bool {
    method.declaring_type() == OBJECT_CLASS_NAME
}

/// 切点能否用于该类型的某个方法
pub fn can_apply_pointcut(pointcut: &dyn Pointcut, target_class: &Class, has_introductions: bool) -> bool {
    if !pointcut.class_filter().matches(target_class) {
        return false;
    }

    let matcher = pointcut.method_matcher();
    if matcher.as_any().is::<TrueMethodMatcher>() {
        return true;
    }

    target_class.all_methods().iter().any(|method| {
        matcher.matches_with_introductions(method, target_class, has_introductions)
    })
}

/// advisor 能否用于该类型
pub fn can_apply(advisor: &Advisor, target_class: &Class, has_introductions: bool) -> bool {
    match advisor {
        Advisor::Introduction(ia) => ia.class_filter().matches(target_class),
        Advisor::Pointcut(pa) => can_apply_pointcut(pa.pointcut().as_ref(), target_class, has_introductions),
    }
}

/// 从候选 advisor 中挑出适用于该类型的，引入 advisor 先判断
pub fn find_advisors_that_can_apply(candidates: &[Advisor], target_class: &Class) -> Vec<Advisor> {
    let mut eligible: Vec<Advisor> = candidates
        .iter()
        .filter(|a| a.is_introduction() && can_apply(a, target_class, false))
        .cloned()
        .collect();
    let has_introductions = !eligible.is_empty();

    eligible.extend(
        candidates
            .iter()
            .filter(|a| !a.is_introduction() && can_apply(a, target_class, has_introductions))
            .cloned(),
    );
    eligible
}

/// 在目标上调用方法：按目标的运行时类型找到实现
///
/// 目标方法返回的错误原样传出。
pub fn invoke_joinpoint_using_reflection(
    target: Option<&Object>,
    method: &Method,
    args: &[Value],
) -> InvocationResult<Value> {
    let target = target.ok_or_else(|| InvocationError::NoTarget {
        method: method.signature(),
    })?;

    let implementation = match Class::of(target) {
        Some(class) => class.resolve_implementation(method),
        None => (!method.is_abstract()).then(|| method.clone()),
    };
    let implementation = implementation.ok_or_else(|| {
        InvocationError::infrastructure(
            method.signature(),
            anyhow::anyhow!("target of type {} provides no implementation", target_type_name(target)),
        )
    })?;

    implementation.invoke(target, args)
}

fn target_type_name(target: &Object) -> String {
    Class::of(target)
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| "<unregistered>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcut::{ComposablePointcut, NameMatchMethodPointcut, TypePatternClassFilter};
    use crate::test_support::{greeter_method, person, person_class, RecordingAdvice};
    use std::sync::Arc;

    #[test]
    fn test_method_predicates() {
        let object = Class::object();
        assert!(is_equals_method(&object.find_method("equals").unwrap()));
        assert!(is_hash_code_method(&object.find_method("hash_code").unwrap()));
        assert!(is_to_string_method(&object.find_method("to_string").unwrap()));
        assert!(is_object_method(&object.find_method("equals").unwrap()));
        assert!(!is_equals_method(&greeter_method("greet")));
    }

    #[test]
    fn test_can_apply() {
        let recorder = RecordingAdvice::new();
        let by_name = Advisor::with_pointcut(
            Arc::new(NameMatchMethodPointcut::with_names(["greet"])),
            recorder.before("a"),
        );
        let missing = Advisor::with_pointcut(
            Arc::new(NameMatchMethodPointcut::with_names(["withdraw"])),
            recorder.before("b"),
        );
        let wrong_type = Advisor::with_pointcut(
            Arc::new(ComposablePointcut::from_class_filter(TypePatternClassFilter::new("*Repository"))),
            recorder.before("c"),
        );

        assert!(can_apply(&by_name, &person_class(), false));
        assert!(!can_apply(&missing, &person_class(), false));
        assert!(!can_apply(&wrong_type, &person_class(), false));

        let eligible = find_advisors_that_can_apply(&[missing, by_name.clone(), wrong_type], &person_class());
        assert_eq!(eligible.len(), 1);
        assert!(eligible[0].ptr_eq(&by_name));
    }

    #[test]
    fn test_invoke_uses_runtime_implementation() {
        let target = person("ann");
        let value =
            invoke_joinpoint_using_reflection(Some(&target), &greeter_method("greet"), &[Value::from("bob")])
                .unwrap();
        assert_eq!(value, Value::from("ann greets bob"));
    }

    #[test]
    fn test_invoke_without_target() {
        assert!(matches!(
            invoke_joinpoint_using_reflection(None, &greeter_method("greet"), &[]),
            Err(InvocationError::NoTarget { .. })
        ));
    }

    #[test]
    fn test_abstract_method_on_unregistered_target() {
        let stranger: Object = Arc::new(42_u8);
        let err = invoke_joinpoint_using_reflection(Some(&stranger), &greeter_method("greet"), &[])
            .unwrap_err();
        assert!(err.is_infrastructure());
    }
}
