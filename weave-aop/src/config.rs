//! 代理配置标志

use parking_lot::RwLock;
use std::fmt;
use weave_core::config::AopProperties;

/// 代理配置的快照值
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ProxyFlags {
    pub proxy_target_class: bool,
    pub optimize: bool,
    pub opaque: bool,
    pub expose_proxy: bool,
    pub frozen: bool,
}

/// 代理配置
///
/// 标志可以在代理创建后修改，所以内部加锁。
#[derive(Default)]
pub struct ProxyConfig {
    flags: RwLock<ProxyFlags>,
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_flags(flags: ProxyFlags) -> Self {
        Self {
            flags: RwLock::new(flags),
        }
    }

    /// 当前标志
    pub fn flags(&self) -> ProxyFlags {
        *self.flags.read()
    }

    /// 是否直接代理目标类（而不是接口）
    pub fn is_proxy_target_class(&self) -> bool {
        self.flags.read().proxy_target_class
    }

    pub fn set_proxy_target_class(&self, value: bool) {
        self.flags.write().proxy_target_class = value;
    }

    /// 是否做激进优化（选择类代理，固定调用链）
    pub fn is_optimize(&self) -> bool {
        self.flags.read().optimize
    }

    pub fn set_optimize(&self, value: bool) {
        self.flags.write().optimize = value;
    }

    /// 代理是否对外隐藏 `Advised` 内省接口
    pub fn is_opaque(&self) -> bool {
        self.flags.read().opaque
    }

    pub fn set_opaque(&self, value: bool) {
        self.flags.write().opaque = value;
    }

    /// 调用期间是否通过 `AopContext` 暴露当前代理
    pub fn is_expose_proxy(&self) -> bool {
        self.flags.read().expose_proxy
    }

    pub fn set_expose_proxy(&self, value: bool) {
        self.flags.write().expose_proxy = value;
    }

    /// 冻结后不能再修改 advisor 和接口
    pub fn is_frozen(&self) -> bool {
        self.flags.read().frozen
    }

    pub fn set_frozen(&self, value: bool) {
        self.flags.write().frozen = value;
    }

    /// 复制另一份配置的全部标志
    pub fn copy_from(&self, other: &ProxyConfig) {
        let flags = other.flags();
        *self.flags.write() = flags;
    }
}

impl From<&AopProperties> for ProxyConfig {
    fn from(props: &AopProperties) -> Self {
        Self::from_flags(ProxyFlags::from(props))
    }
}

impl From<&AopProperties> for ProxyFlags {
    fn from(props: &AopProperties) -> Self {
        Self {
            proxy_target_class: props.proxy_target_class,
            optimize: props.optimize,
            opaque: props.opaque,
            expose_proxy: props.expose_proxy,
            frozen: props.frozen,
        }
    }
}

impl fmt::Display for ProxyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "proxyTargetClass={}; optimize={}; opaque={}; exposeProxy={}; frozen={}",
            self.proxy_target_class, self.optimize, self.opaque, self.expose_proxy, self.frozen
        )
    }
}

impl fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.flags(), f)
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProxyConfig").field(&self.flags()).finish()
    }
}
