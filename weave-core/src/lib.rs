// weave-core: 代理引擎的基础设施
//
// 提供：
// - 错误类型与结果别名
// - 日志初始化（tracing-subscriber）
// - TOML / 环境变量配置
// - 容器契约：后置处理器与支持提前引用的单例登记表

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod singleton;

pub use config::{parse_bool, AopProperties, LoggingProperties, WeaveProperties};
pub use error::{CoreError, CoreResult, Result};
pub use lifecycle::{BeanPostProcessor, Object, SmartInstantiationAwareBeanPostProcessor};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use singleton::{CreationTracker, DefaultSingletonRegistry};

/// Prelude 模块
pub mod prelude {
    pub use crate::config::{AopProperties, LoggingProperties, WeaveProperties};
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::lifecycle::{
        BeanPostProcessor, Object, SmartInstantiationAwareBeanPostProcessor,
    };
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::singleton::DefaultSingletonRegistry;
    pub use anyhow::{anyhow, Context};
}
