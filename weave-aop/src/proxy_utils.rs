//! 代理层共用的辅助函数

use crate::advised::{Advised, AdvisedSupport};
use crate::error::{InvocationError, InvocationResult};
use crate::proxy::Proxy;
use crate::reflect::{same_object, Class, Method, Object, Value, ADVISED_CLASS_NAME};
use std::collections::HashSet;
use std::sync::Arc;

/// 代理实际要实现的接口
///
/// 没有指定接口而目标类型本身是接口时使用目标类型；非 opaque 时再加上 `Advised`。
pub fn complete_proxied_interfaces(advised: &AdvisedSupport) -> Vec<Class> {
    let mut interfaces = advised.proxied_interfaces();
    if interfaces.is_empty() {
        if let Some(target_class) = advised.target_class().filter(Class::is_interface) {
            interfaces.push(target_class);
        }
    }
    if !advised.is_opaque() && !interfaces.iter().any(|i| i.name() == ADVISED_CLASS_NAME) {
        interfaces.push(Class::advised());
    }
    interfaces
}

/// 两个代理配置是否等价：接口集合相同、advisor 形状逐个相同、目标源相等
pub fn equals_in_proxy(a: &AdvisedSupport, b: &AdvisedSupport) -> bool {
    std::ptr::eq(a, b)
        || (equals_proxied_interfaces(a, b)
            && equals_advisors(a, b)
            && a.target_source().equals(b.target_source().as_ref()))
}

/// 代理接口按集合比较
pub fn equals_proxied_interfaces(a: &AdvisedSupport, b: &AdvisedSupport) -> bool {
    let left: HashSet<Class> = a.proxied_interfaces().into_iter().collect();
    let right: HashSet<Class> = b.proxied_interfaces().into_iter().collect();
    left == right
}

/// advisor 按顺序比较通知类型和切点，不比较通知实例
pub fn equals_advisors(a: &AdvisedSupport, b: &AdvisedSupport) -> bool {
    let left = a.advisor_snapshot();
    let right = b.advisor_snapshot();
    left.len() == right.len() && left.iter().zip(right.iter()).all(|(x, y)| x.same_shape(y))
}

/// 穿过多层代理找到最终的目标类型
///
/// 遇到动态目标源就停在它声明的类型上，不去取目标。
pub fn ultimate_target_class(candidate: &Object) -> Option<Class> {
    let mut current = Arc::clone(candidate);
    let mut result = None;
    loop {
        let Some(proxy) = Proxy::from_object(&current) else {
            return Class::of(&current).or(result);
        };
        let target_source = proxy.advised_support().target_source();
        result = target_source.target_class().or(result);
        if !target_source.is_static() {
            return result;
        }
        match target_source.get_target() {
            Ok(Some(next)) => current = next,
            _ => return result,
        }
    }
}

/// 在代理上执行 `Advised` 接口的方法
pub(crate) fn invoke_advised_method(
    advised: &dyn Advised,
    method: &Method,
    _args: &[Value],
) -> InvocationResult<Value> {
    let value = match method.name() {
        "is_frozen" => Value::Bool(advised.is_frozen()),
        "is_proxy_target_class" => Value::Bool(advised.is_proxy_target_class()),
        "is_expose_proxy" => Value::Bool(advised.is_expose_proxy()),
        "is_pre_filtered" => Value::Bool(advised.is_pre_filtered()),
        "advisor_count" => Value::Int(advised.advisor_count() as i64),
        "to_proxy_config_string" => Value::Str(advised.to_proxy_config_string()),
        other => {
            return Err(InvocationError::infrastructure(
                method.signature(),
                anyhow::anyhow!("unsupported introspection method '{}'", other),
            ))
        }
    };
    Ok(value)
}

/// 处理目标方法的返回值
///
/// 目标返回自身且声明的返回类型能接受代理时换成代理；
/// 基本类型的返回值为空是调用错误。
pub(crate) fn massage_return_value(
    value: Value,
    target: Option<&Object>,
    proxy: &Object,
    proxy_class: &Class,
    method: &Method,
) -> InvocationResult<Value> {
    let return_type = method.return_type();
    if let (Value::Object(returned), Some(target)) = (&value, target) {
        if same_object(returned, target) && return_type.accepts_instance_of(proxy_class) {
            return Ok(Value::Object(Arc::clone(proxy)));
        }
    }
    reject_null_primitive(value, method)
}

/// 基本类型的返回值不能为空
pub(crate) fn reject_null_primitive(value: Value, method: &Method) -> InvocationResult<Value> {
    if value.is_null() && method.return_type().is_primitive() {
        return Err(InvocationError::NullForPrimitive {
            method: method.signature(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::Advisor;
    use crate::pointcut::NameMatchMethodPointcut;
    use crate::reflect::ValueType;
    use crate::target_source::SingletonTargetSource;
    use crate::test_support::{greeter_class, person, person_class, stamp_class, RecordingAdvice};

    fn config_for(target: &Object) -> AdvisedSupport {
        let config = AdvisedSupport::new();
        config.set_target_source(Arc::new(SingletonTargetSource::new(Arc::clone(target))));
        config
    }

    #[test]
    fn test_complete_interfaces_adds_advised() {
        let config = AdvisedSupport::new();
        config.add_interface(&greeter_class()).unwrap();
        let names: Vec<String> = complete_proxied_interfaces(&config)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, ["Greeter", ADVISED_CLASS_NAME]);

        config.set_opaque(true);
        assert_eq!(complete_proxied_interfaces(&config), vec![greeter_class()]);
    }

    #[test]
    fn test_interface_order_does_not_matter() {
        let target = person("ann");
        let a = config_for(&target);
        a.add_interface(&greeter_class()).unwrap();
        a.add_interface(&stamp_class()).unwrap();
        let b = config_for(&target);
        b.add_interface(&stamp_class()).unwrap();
        b.add_interface(&greeter_class()).unwrap();
        assert!(equals_in_proxy(&a, &b));

        b.remove_interface(&stamp_class()).unwrap();
        assert!(!equals_in_proxy(&a, &b));
    }

    #[test]
    fn test_advisor_shape_not_instance() {
        let target = person("ann");
        let recorder = RecordingAdvice::new();
        let a = config_for(&target);
        let b = config_for(&target);
        a.add_advisor(Advisor::with_pointcut(
            Arc::new(NameMatchMethodPointcut::with_names(["greet"])),
            recorder.before("one"),
        ))
        .unwrap();
        b.add_advisor(Advisor::with_pointcut(
            Arc::new(NameMatchMethodPointcut::with_names(["greet"])),
            recorder.before("two"),
        ))
        .unwrap();
        assert!(equals_advisors(&a, &b));

        let c = config_for(&target);
        c.add_advisor(Advisor::with_pointcut(
            Arc::new(NameMatchMethodPointcut::with_names(["fail"])),
            recorder.before("three"),
        ))
        .unwrap();
        assert!(!equals_advisors(&a, &c));
    }

    #[test]
    fn test_different_targets_are_not_equal() {
        let a = config_for(&person("ann"));
        let b = config_for(&person("ann"));
        assert!(!equals_in_proxy(&a, &b));
    }

    #[test]
    fn test_massage_substitutes_proxy() {
        let target = person("ann");
        let proxy: Object = Arc::new("proxy");
        let method = person_class().find_method("echo_self").unwrap();

        let value = massage_return_value(
            Value::Object(Arc::clone(&target)),
            Some(&target),
            &proxy,
            &person_class(),
            &method,
        )
        .unwrap();
        assert!(value.is_same_object(&proxy));
    }

    #[test]
    fn test_massage_keeps_unrelated_return() {
        let target = person("ann");
        let proxy: Object = Arc::new("proxy");
        let method = crate::reflect::Method::abstract_method(
            "Registry",
            "find",
            vec![],
            ValueType::named("Counter"),
        );
        let value = massage_return_value(
            Value::Object(Arc::clone(&target)),
            Some(&target),
            &proxy,
            &person_class(),
            &method,
        )
        .unwrap();
        assert!(value.is_same_object(&target));
    }

    #[test]
    fn test_null_for_primitive() {
        let target = person("ann");
        let proxy: Object = Arc::new("proxy");
        let method = person_class().find_method("lucky_number").unwrap();
        let err = massage_return_value(Value::Null, Some(&target), &proxy, &person_class(), &method)
            .unwrap_err();
        assert!(matches!(err, InvocationError::NullForPrimitive { .. }));
    }

    #[test]
    fn test_ultimate_target_class_of_plain_object() {
        assert_eq!(ultimate_target_class(&person("ann")), Some(person_class()));
    }
}
