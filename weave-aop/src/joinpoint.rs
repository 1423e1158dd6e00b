//! 连接点（JoinPoint）定义
//!
//! 连接点是方法调用的只读视图，交给前置、返回后、异常、后置通知使用

use crate::reflect::{Class, Method, Object, Value};
use std::fmt;
use std::time::{Duration, Instant};

/// 连接点信息
///
/// 借用自正在执行的 `MethodInvocation`
#[derive(Clone, Copy)]
pub struct JoinPoint<'a> {
    method: &'a Method,
    args: &'a [Value],
    target: Option<&'a Object>,
    target_class: Option<&'a Class>,
    started: Instant,
}

impl<'a> JoinPoint<'a> {
    pub fn new(
        method: &'a Method,
        args: &'a [Value],
        target: Option<&'a Object>,
        target_class: Option<&'a Class>,
        started: Instant,
    ) -> Self {
        Self {
            method,
            args,
            target,
            target_class,
            started,
        }
    }

    pub fn method(&self) -> &'a Method {
        self.method
    }

    /// 方法名称
    pub fn method_name(&self) -> &'a str {
        self.method.name()
    }

    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Option<&'a Value> {
        self.args.get(index)
    }

    /// 目标对象（没有目标时为 `None`）
    pub fn target(&self) -> Option<&'a Object> {
        self.target
    }

    pub fn target_class(&self) -> Option<&'a Class> {
        self.target_class
    }

    /// 目标类型名称，没有目标时取方法的声明类型
    pub fn target_type(&self) -> &'a str {
        self.target_class
            .map(Class::name)
            .unwrap_or_else(|| self.method.declaring_type())
    }

    /// 获取完整的方法签名
    pub fn signature(&self) -> String {
        format!("{}::{}", self.target_type(), self.method_name())
    }

    /// 调用开始到现在经过的时间
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl fmt::Debug for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("signature", &self.signature())
            .field("args", &self.args)
            .field("has_target", &self.target.is_some())
            .finish()
    }
}

impl fmt::Display for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::ValueType;

    #[test]
    fn test_signature_falls_back_to_declaring_type() {
        let method = Method::abstract_method("Greeter", "greet", vec![ValueType::Str], ValueType::Str);
        let args = [Value::from("ann")];
        let jp = JoinPoint::new(&method, &args, None, None, Instant::now());

        assert_eq!(jp.signature(), "Greeter::greet");
        assert_eq!(jp.arg(0), Some(&Value::from("ann")));
        assert!(jp.arg(1).is_none());
        assert_eq!(jp.to_string(), "Greeter::greet");
    }
}
