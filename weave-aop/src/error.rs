//! 代理引擎的错误类型
//!
//! - `AopConfigError`：创建代理或修改配置时的错误（配置错误、修改被拒绝）
//! - `InvocationError`：调用代理方法时的错误

use std::error::Error as StdError;
use thiserror::Error;

/// 应用代码（目标方法或通知）抛出的错误
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// 配置错误
#[derive(Debug, Error)]
pub enum AopConfigError {
    /// 没有任何 advisor，目标源也是空的
    #[error("no advisors and no target source specified")]
    NoAdvisorsOrTarget,

    /// 无法确定目标类型
    #[error("target source cannot determine target class: either an interface or a target is required for proxy creation")]
    UndeterminableTargetClass,

    /// introduction 声明的接口不合法
    #[error("invalid introduction: {0}")]
    InvalidIntroduction(String),

    /// 没有 adapter 能处理该通知
    #[error("unknown advice type '{0}'")]
    UnknownAdviceType(String),

    /// 目标类型不可扩展
    #[error("cannot generate proxy class for '{class}': class is final (not extensible)")]
    ClassNotExtensible { class: String },

    /// 代理类生成失败
    #[error("could not generate proxy class for '{class}': {reason}; common causes include a non-visible class or an abstract method without implementation")]
    ProxyGeneration { class: String, reason: String },

    /// 不是接口
    #[error("'{0}' is not an interface")]
    NotAnInterface(String),

    /// 配置已冻结
    #[error("cannot {operation}: configuration is frozen")]
    Frozen { operation: &'static str },

    /// 下标越界
    #[error("index {index} is out of bounds: only {len} advisors defined")]
    IndexOutOfBounds { index: usize, len: usize },
}

impl AopConfigError {
    /// 是否属于"修改被拒绝"类错误
    pub fn is_mutation_rejected(&self) -> bool {
        matches!(
            self,
            AopConfigError::Frozen { .. } | AopConfigError::IndexOutOfBounds { .. }
        )
    }
}

/// 配置结果类型
pub type AopResult<T> = std::result::Result<T, AopConfigError>;

/// 调用错误
#[derive(Debug, Error)]
pub enum InvocationError {
    /// 应用代码抛出的错误，原样传递
    #[error(transparent)]
    Thrown(BoxError),

    /// 基本类型的返回值为空
    #[error("null return value does not match primitive return type of {method}")]
    NullForPrimitive { method: String },

    /// 没有可调用的目标
    #[error("no target available to invoke {method}")]
    NoTarget { method: String },

    /// 目标源获取或释放目标失败
    #[error("target source failure for {method}: {source}")]
    TargetSource {
        method: String,
        #[source]
        source: anyhow::Error,
    },

    /// 代理机制内部失败
    #[error("AOP infrastructure failure invoking {method}: {source}")]
    Infrastructure {
        method: String,
        #[source]
        source: anyhow::Error,
    },

    /// 非法状态
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// 参数或返回值类型不匹配
    #[error("type mismatch in {method}: expected {expected}")]
    TypeMismatch { method: String, expected: String },
}

impl InvocationError {
    /// 包装应用代码抛出的错误
    pub fn thrown<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        InvocationError::Thrown(Box::new(error))
    }

    /// 用消息构造一个应用错误
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        InvocationError::Thrown(message.into())
    }

    pub fn infrastructure(method: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        InvocationError::Infrastructure {
            method: method.into(),
            source: source.into(),
        }
    }

    pub fn type_mismatch(method: impl Into<String>, expected: impl Into<String>) -> Self {
        InvocationError::TypeMismatch {
            method: method.into(),
            expected: expected.into(),
        }
    }

    /// 应用代码抛出的原始错误
    pub fn thrown_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            InvocationError::Thrown(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    /// 尝试把应用错误向下转型
    pub fn downcast_thrown<E: StdError + 'static>(&self) -> Option<&E> {
        self.thrown_error()?.downcast_ref::<E>()
    }

    /// 是否是代理机制自身的错误
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, InvocationError::Thrown(_))
    }
}

/// 调用结果类型
pub type InvocationResult<T> = std::result::Result<T, InvocationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("insufficient funds")]
    struct InsufficientFunds;

    #[test]
    fn test_thrown_error_is_preserved() {
        let err = InvocationError::thrown(InsufficientFunds);
        assert!(!err.is_infrastructure());
        assert!(err.downcast_thrown::<InsufficientFunds>().is_some());
        assert_eq!(err.to_string(), "insufficient funds");
    }

    #[test]
    fn test_mutation_rejected_classification() {
        assert!(AopConfigError::Frozen { operation: "add advisor" }.is_mutation_rejected());
        assert!(AopConfigError::IndexOutOfBounds { index: 3, len: 1 }.is_mutation_rejected());
        assert!(!AopConfigError::NoAdvisorsOrTarget.is_mutation_rejected());
    }

    #[test]
    fn test_infrastructure_keeps_cause() {
        let err = InvocationError::infrastructure("Foo::bar", anyhow::anyhow!("dispatch failed"));
        assert!(err.is_infrastructure());
        assert_eq!(
            StdError::source(&err).map(|s| s.to_string()),
            Some("dispatch failed".to_string())
        );
    }
}
