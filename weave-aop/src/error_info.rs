//! 错误信息结构
//!
//! 把调用错误整理成可记录的结构，供异常通知使用

use crate::error::InvocationError;
use std::error::Error;

/// 结构化的错误信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 错误类型名称
    pub error_type: String,

    /// 错误源链（cause chain）
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    /// 从标准错误创建 ErrorInfo
    pub fn from_error<E: Error + ?Sized>(error: &E) -> Self {
        Self {
            message: error.to_string(),
            error_type: std::any::type_name::<E>().to_string(),
            source_chain: source_chain(error.source()),
        }
    }

    /// 从调用错误创建，类型名取错误种类
    pub fn from_invocation_error(error: &InvocationError) -> Self {
        let error_type = match error {
            InvocationError::Thrown(_) => "Thrown",
            InvocationError::NullForPrimitive { .. } => "NullForPrimitive",
            InvocationError::NoTarget { .. } => "NoTarget",
            InvocationError::TargetSource { .. } => "TargetSource",
            InvocationError::Infrastructure { .. } => "Infrastructure",
            InvocationError::IllegalState(_) => "IllegalState",
            InvocationError::TypeMismatch { .. } => "TypeMismatch",
        };
        Self {
            message: error.to_string(),
            error_type: error_type.to_string(),
            source_chain: source_chain(error.source()),
        }
    }

    /// 创建简单的 ErrorInfo（只包含消息）
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: "Unknown".to_string(),
            source_chain: Vec::new(),
        }
    }

    /// 获取完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!(
                "{}\nCaused by:\n  {}",
                self.message,
                self.source_chain.join("\n  ")
            )
        }
    }
}

impl From<&InvocationError> for ErrorInfo {
    fn from(error: &InvocationError) -> Self {
        Self::from_invocation_error(error)
    }
}

fn source_chain(mut current: Option<&(dyn Error + 'static)>) -> Vec<String> {
    let mut chain = Vec::new();
    while let Some(source) = current {
        chain.push(source.to_string());
        current = source.source();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("disk full")]
    struct DiskFull;

    #[derive(Debug, Error)]
    #[error("could not save report")]
    struct SaveFailed(#[source] DiskFull);

    #[test]
    fn test_thrown_error_keeps_cause_chain() {
        let err = InvocationError::thrown(SaveFailed(DiskFull));
        let info = ErrorInfo::from(&err);
        assert_eq!(info.error_type, "Thrown");
        assert_eq!(info.message, "could not save report");
        assert_eq!(info.source_chain, ["disk full"]);
        assert_eq!(info.full_description(), "could not save report\nCaused by:\n  disk full");
    }

    #[test]
    fn test_infrastructure_error() {
        let err = InvocationError::infrastructure("Foo::bar", anyhow::anyhow!("dispatch failed"));
        let info = ErrorInfo::from_invocation_error(&err);
        assert_eq!(info.error_type, "Infrastructure");
        assert_eq!(info.source_chain, ["dispatch failed"]);
    }

    #[test]
    fn test_simple() {
        let info = ErrorInfo::simple("boom");
        assert_eq!(info.full_description(), "boom");
        assert_eq!(info.error_type, "Unknown");
    }
}
