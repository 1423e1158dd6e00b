//! 统一的错误处理类型
//!
//! 容器契约相关的错误使用 `CoreError` 表达；来自外部协作者（对象工厂、
//! 配置文件读取等）的不透明错误通过 `anyhow::Error` 承载，并用 `.context()`
//! 补充上下文信息。

use thiserror::Error;

/// 通用结果类型（外部协作者错误）
pub use anyhow::Result;

/// weave-core 的错误类型
#[derive(Debug, Error)]
pub enum CoreError {
    /// 单例创建失败
    #[error("failed to create singleton '{name}': {source}")]
    SingletonCreationFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// 循环引用且无法提前暴露引用
    #[error("circular reference detected while creating '{0}'")]
    CircularReference(String),

    /// 单例不存在
    #[error("singleton '{0}' not found")]
    SingletonNotFound(String),

    /// 提前暴露的引用与最终对象不一致
    #[error(
        "singleton '{name}' has been injected into other objects in its raw version as part \
         of a circular reference, but has eventually been wrapped"
    )]
    EarlyReferenceMismatch { name: String },

    /// 后置处理器执行失败
    #[error("post-processor '{processor}' failed for '{name}': {source}")]
    PostProcessorFailed {
        processor: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// 日志系统初始化失败
    #[error("logging initialization failed: {0}")]
    LoggingInitFailed(String),

    /// 配置解析失败
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// weave-core 的结果类型
pub type CoreResult<T> = std::result::Result<T, CoreError>;
