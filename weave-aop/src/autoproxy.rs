//! 自动代理 - 在对象初始化后为它套上代理
//!
//! [`AutoProxyCreator`] 同时是 `BeanPostProcessor` 和
//! `SmartInstantiationAwareBeanPostProcessor`：
//!
//! 1. 根据对象的运行时类型从候选 advisor 中挑出能用的
//! 2. 有能用的 advisor 就用 `SingletonTargetSource` 包装并创建代理
//! 3. 循环引用时提前暴露的引用已经是代理，初始化后不再重复代理
//!
//! ## 使用示例
//!
//! ```ignore
//! let creator = Arc::new(AutoProxyCreator::new(vec![advisor]));
//! registry.add_post_processor(creator);
//! ```

use crate::advisor::Advisor;
use crate::aop_utils::find_advisors_that_can_apply;
use crate::config::{ProxyConfig, ProxyFlags};
use crate::error::AopResult;
use crate::proxy::{Proxy, ProxyFactory};
use crate::reflect::{object_address, Class, Object};
use crate::target_source::SingletonTargetSource;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use weave_core::config::AopProperties;
use weave_core::lifecycle::{BeanPostProcessor, SmartInstantiationAwareBeanPostProcessor};

/// 自动代理创建器
pub struct AutoProxyCreator {
    advisors: RwLock<Vec<Advisor>>,

    /// 新建代理时复制的标志
    template: ProxyConfig,

    /// 提前暴露过代理的对象：名称 -> 原始对象地址
    early_proxy_references: Mutex<HashMap<String, usize>>,

    /// 名称 -> 是否被代理
    advised_beans: RwLock<HashMap<String, bool>>,

    order: i32,
}

impl AutoProxyCreator {
    pub fn new(advisors: Vec<Advisor>) -> Self {
        Self::with_config(advisors, ProxyConfig::new())
    }

    /// 指定代理标志模板
    pub fn with_config(advisors: Vec<Advisor>, template: ProxyConfig) -> Self {
        Self {
            advisors: RwLock::new(advisors),
            template,
            early_proxy_references: Mutex::new(HashMap::new()),
            advised_beans: RwLock::new(HashMap::new()),
            order: 2000,
        }
    }

    /// 从 `[aop]` 配置创建
    pub fn from_properties(advisors: Vec<Advisor>, props: &AopProperties) -> Self {
        Self::with_config(advisors, ProxyConfig::from(props))
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// 追加候选 advisor
    ///
    /// 之前判定为不需要代理的对象会重新判断。
    pub fn add_advisor(&self, advisor: Advisor) {
        self.advisors.write().push(advisor);
        self.advised_beans.write().retain(|_, advised| *advised);
        tracing::debug!("Candidate advisor added to auto-proxy creator");
    }

    pub fn advisors(&self) -> Vec<Advisor> {
        self.advisors.read().clone()
    }

    pub fn template_flags(&self) -> ProxyFlags {
        self.template.flags()
    }

    /// 该名称的对象是否已判定（`Some(true)` 表示被代理）
    pub fn is_advised(&self, bean_name: &str) -> Option<bool> {
        self.advised_beans.read().get(bean_name).copied()
    }

    /// 按排序值找出适用于该类型的 advisor，没有排序值的排在最后
    pub fn find_eligible_advisors(&self, class: &Class) -> Vec<Advisor> {
        let candidates = self.advisors.read().clone();
        let mut eligible = find_advisors_that_can_apply(&candidates, class);
        eligible.sort_by_key(|a| a.order().unwrap_or(i32::MAX));
        eligible
    }

    /// 需要时为对象创建代理，否则原样返回
    pub fn wrap_if_necessary(&self, bean: Object, bean_name: &str) -> AopResult<Object> {
        if self.is_advised(bean_name) == Some(false) {
            return Ok(bean);
        }

        if Proxy::is_proxy(&bean) {
            tracing::trace!("Bean '{}' is already a proxy, skipping", bean_name);
            self.mark(bean_name, false);
            return Ok(bean);
        }

        let Some(class) = Class::of(&bean) else {
            tracing::trace!("Bean '{}' has no class descriptor, skipping", bean_name);
            self.mark(bean_name, false);
            return Ok(bean);
        };

        let eligible = self.find_eligible_advisors(&class);
        if eligible.is_empty() {
            tracing::trace!("No advisor applies to bean '{}' [{}]", bean_name, class.name());
            self.mark(bean_name, false);
            return Ok(bean);
        }

        let proxy = self.create_proxy(bean, &class, eligible)?;
        self.mark(bean_name, true);
        tracing::debug!(
            "Created {} for bean '{}' [{}] with {} advisor(s)",
            proxy.kind(),
            bean_name,
            class.name(),
            proxy.advised_support().advisor_count()
        );
        Ok(proxy.as_object())
    }

    fn create_proxy(&self, bean: Object, class: &Class, advisors: Vec<Advisor>) -> AopResult<Proxy> {
        let mut flags = self.template.flags();
        let frozen = std::mem::take(&mut flags.frozen);
        let factory = ProxyFactory::with_config(ProxyConfig::from_flags(flags));
        factory.set_target_source(Arc::new(SingletonTargetSource::with_class(bean, class.clone())));

        if !flags.proxy_target_class {
            let interfaces = class.all_interfaces();
            if interfaces.is_empty() {
                factory.set_proxy_target_class(true);
            }
            for interface in &interfaces {
                factory.add_interface(interface)?;
            }
        }

        factory.add_advisors(advisors)?;
        // 候选已经按类型筛过
        factory.set_pre_filtered(true);
        if frozen {
            factory.set_frozen(true);
        }
        factory.get_proxy()
    }

    fn mark(&self, bean_name: &str, advised: bool) {
        self.advised_beans.write().insert(bean_name.to_string(), advised);
    }
}

impl Default for AutoProxyCreator {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl BeanPostProcessor for AutoProxyCreator {
    fn name(&self) -> &str {
        "AutoProxyCreator"
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn post_process_after_initialization(&self, bean: Object, bean_name: &str) -> anyhow::Result<Object> {
        let early = self.early_proxy_references.lock().remove(bean_name);
        if early == Some(object_address(&bean)) {
            tracing::trace!("Bean '{}' was proxied through its early reference", bean_name);
            return Ok(bean);
        }
        Ok(self.wrap_if_necessary(bean, bean_name)?)
    }
}

impl SmartInstantiationAwareBeanPostProcessor for AutoProxyCreator {
    fn get_early_bean_reference(&self, bean: Object, bean_name: &str) -> anyhow::Result<Object> {
        self.early_proxy_references
            .lock()
            .insert(bean_name.to_string(), object_address(&bean));
        Ok(self.wrap_if_necessary(bean, bean_name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcut::{NameMatchMethodPointcut, TypePatternClassFilter};
    use crate::reflect::same_object;
    use crate::test_support::{person, stamp, RecordingAdvice};
    use crate::Value;
    use weave_core::DefaultSingletonRegistry;

    fn greet_advisor(recorder: &RecordingAdvice) -> Advisor {
        Advisor::with_pointcut(
            Arc::new(NameMatchMethodPointcut::with_names(["greet"])),
            recorder.before("trace"),
        )
    }

    #[test]
    fn test_wraps_matching_bean() {
        let recorder = RecordingAdvice::new();
        let creator = AutoProxyCreator::new(vec![greet_advisor(&recorder)]);

        let bean = creator
            .post_process_after_initialization(person("ann"), "ann")
            .unwrap();
        let proxy = Proxy::from_object(&bean).unwrap();
        let result = proxy.invoke_named("greet", vec![Value::from("bob")]).unwrap();

        assert_eq!(result.as_str(), Some("ann greets bob"));
        assert_eq!(recorder.events(), ["trace-before"]);
        assert_eq!(creator.is_advised("ann"), Some(true));
        assert!(proxy.advised_support().is_pre_filtered());
    }

    #[test]
    fn test_unmatched_bean_is_returned_unchanged() {
        let recorder = RecordingAdvice::new();
        let creator = AutoProxyCreator::new(vec![greet_advisor(&recorder)]);

        let bean = stamp("v1");
        let result = creator.post_process_after_initialization(Arc::clone(&bean), "stamp").unwrap();
        assert!(same_object(&bean, &result));
        assert_eq!(creator.is_advised("stamp"), Some(false));
    }

    #[test]
    fn test_unknown_type_is_returned_unchanged() {
        let creator = AutoProxyCreator::new(vec![Advisor::always(RecordingAdvice::new().before("x"))]);
        let bean: Object = Arc::new(42u8);
        let result = creator.post_process_after_initialization(Arc::clone(&bean), "number").unwrap();
        assert!(same_object(&bean, &result));
    }

    #[test]
    fn test_class_filter_restricts_beans() {
        let recorder = RecordingAdvice::new();
        let advisor = Advisor::with_pointcut(
            Arc::new(crate::pointcut::ComposablePointcut::from_class_filter(
                TypePatternClassFilter::new("*Service"),
            )),
            recorder.before("svc"),
        );
        let creator = AutoProxyCreator::new(vec![advisor]);
        let bean = person("ann");
        let result = creator.post_process_after_initialization(Arc::clone(&bean), "ann").unwrap();
        assert!(!Proxy::is_proxy(&result));
    }

    #[test]
    fn test_add_advisor_forgets_negative_decisions() {
        let recorder = RecordingAdvice::new();
        let creator = AutoProxyCreator::default();
        let bean = person("ann");
        creator.post_process_after_initialization(Arc::clone(&bean), "ann").unwrap();
        assert_eq!(creator.is_advised("ann"), Some(false));

        creator.add_advisor(greet_advisor(&recorder));
        assert_eq!(creator.is_advised("ann"), None);
        let result = creator.post_process_after_initialization(bean, "ann").unwrap();
        assert!(Proxy::is_proxy(&result));
    }

    #[test]
    fn test_template_flags_are_copied() {
        let recorder = RecordingAdvice::new();
        let props = AopProperties {
            proxy_target_class: true,
            frozen: true,
            ..Default::default()
        };
        let creator = AutoProxyCreator::from_properties(vec![greet_advisor(&recorder)], &props);
        let bean = creator.post_process_after_initialization(person("ann"), "ann").unwrap();
        let proxy = Proxy::from_object(&bean).unwrap();

        assert_eq!(proxy.kind(), crate::proxy::ProxyKind::Class);
        assert!(proxy.advised_support().is_frozen());
    }

    #[test]
    fn test_circular_reference_gets_single_proxy() {
        let recorder = RecordingAdvice::new();
        let creator = Arc::new(AutoProxyCreator::new(vec![greet_advisor(&recorder)]));
        let registry = DefaultSingletonRegistry::new();
        registry.add_post_processor(creator.clone());

        let seen = Mutex::new(None);
        let finished = registry
            .get_or_create(
                "ann",
                || Ok(person("ann")),
                |_, registry| {
                    let early = registry.get_singleton("ann", true)?;
                    *seen.lock() = early;
                    Ok(())
                },
            )
            .unwrap();

        let early = seen.lock().take().unwrap();
        assert!(same_object(&finished, &early));
        assert!(Proxy::is_proxy(&finished));

        let proxy = Proxy::from_object(&finished).unwrap();
        proxy.invoke_named("greet", vec![Value::from("bob")]).unwrap();
        assert_eq!(recorder.events(), ["trace-before"]);
    }
}
