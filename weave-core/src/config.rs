//! 配置加载
//!
//! 从 TOML 文件读取 `[aop]` 与 `[logging]` 两节，再用环境变量覆盖。
//!
//! ```toml
//! [aop]
//! proxy_target_class = true
//! expose_proxy = false
//!
//! [logging]
//! level = "debug"
//! format = "pretty"
//! ```

use crate::error::{CoreError, CoreResult};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// 代理默认配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AopProperties {
    pub proxy_target_class: bool,
    pub optimize: bool,
    pub opaque: bool,
    pub expose_proxy: bool,
    pub frozen: bool,
}

/// 日志配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingProperties {
    pub level: Option<String>,
    pub format: Option<String>,
    pub filter: Option<String>,
    pub show_target: bool,
}

/// 顶层配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WeaveProperties {
    pub aop: AopProperties,
    pub logging: LoggingProperties,
}

impl WeaveProperties {
    /// 从 TOML 字符串解析
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        toml::from_str(content).map_err(|e| CoreError::InvalidConfig(e.to_string()))
    }

    /// 从 TOML 文件读取
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// 用 `WEAVE_AOP_*` 环境变量覆盖
    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let flags: [(&str, &mut bool); 5] = [
            ("WEAVE_AOP_PROXY_TARGET_CLASS", &mut self.aop.proxy_target_class),
            ("WEAVE_AOP_OPTIMIZE", &mut self.aop.optimize),
            ("WEAVE_AOP_OPAQUE", &mut self.aop.opaque),
            ("WEAVE_AOP_EXPOSE_PROXY", &mut self.aop.expose_proxy),
            ("WEAVE_AOP_FROZEN", &mut self.aop.frozen),
        ];

        for (key, slot) in flags {
            let Some(raw) = lookup(key) else { continue };
            match parse_bool(&raw) {
                Some(value) => *slot = value,
                None => tracing::warn!("Ignoring {}={}: not a boolean", key, raw),
            }
        }
    }
}

/// 解析布尔值（true/yes/1, false/no/0）
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_full_document() {
        let props = WeaveProperties::from_toml_str(
            r#"
            [aop]
            proxy_target_class = true
            frozen = true

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert!(props.aop.proxy_target_class);
        assert!(props.aop.frozen);
        assert!(!props.aop.expose_proxy);
        assert_eq!(props.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let props = WeaveProperties::from_toml_str("").unwrap();
        assert_eq!(props, WeaveProperties::default());
    }

    #[test]
    fn test_invalid_document() {
        let err = WeaveProperties::from_toml_str("[aop]\nfrozen = \"maybe\"").unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("WEAVE_AOP_EXPOSE_PROXY", "yes"),
            ("WEAVE_AOP_OPTIMIZE", "1"),
            ("WEAVE_AOP_FROZEN", "perhaps"),
        ]
        .into_iter()
        .collect();

        let mut props = WeaveProperties::default();
        props.aop.frozen = true;
        props.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert!(props.aop.expose_proxy);
        assert!(props.aop.optimize);
        // 非法值保持原样
        assert!(props.aop.frozen);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" no "), Some(false));
        assert_eq!(parse_bool("2"), None);
    }
}
