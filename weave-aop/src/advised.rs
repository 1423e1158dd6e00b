//! 代理配置与调用链缓存
//!
//! `AdvisedSupport` 保存目标源、代理接口列表、有序的 advisor 列表，
//! 以及按方法缓存的调用链。任何结构性修改都会在返回前整体清空缓存。
//!
//! 缓存与修改之间用一个代数计数器协调：计算调用链前记下代数，
//! 存入缓存时代数已经变化就放弃存入，这样并发修改期间算出的旧链不会留在缓存里。

use crate::adapter::get_adapter_registry;
use crate::advice::Advice;
use crate::advisor::{Advisor, DefaultIntroductionAdvisor};
use crate::chain_factory::{AdvisorChainFactory, ChainElement, DefaultAdvisorChainFactory};
use crate::config::{ProxyConfig, ProxyFlags};
use crate::error::{AopConfigError, AopResult, InvocationResult};
use crate::reflect::{Class, Method};
use crate::target_source::{EmptyTargetSource, TargetSource};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// 代理的内省能力
///
/// 代理（非 opaque 时）可以转换成它，查看和修改自己的配置。
pub trait Advised: Send + Sync {
    fn is_frozen(&self) -> bool;

    fn is_proxy_target_class(&self) -> bool;

    fn is_expose_proxy(&self) -> bool;

    fn set_expose_proxy(&self, expose: bool);

    fn is_pre_filtered(&self) -> bool;

    fn set_pre_filtered(&self, pre_filtered: bool);

    /// 代理实现的接口（不含内省接口）
    fn proxied_interfaces(&self) -> Vec<Class>;

    fn is_interface_proxied(&self, interface: &Class) -> bool;

    fn target_source(&self) -> Arc<dyn TargetSource>;

    fn set_target_source(&self, target_source: Arc<dyn TargetSource>);

    fn advisors(&self) -> Vec<Advisor>;

    fn advisor_count(&self) -> usize;

    fn add_advisor(&self, advisor: Advisor) -> AopResult<()>;

    fn add_advisor_at(&self, position: usize, advisor: Advisor) -> AopResult<()>;

    fn remove_advisor(&self, advisor: &Advisor) -> AopResult<bool>;

    fn remove_advisor_at(&self, index: usize) -> AopResult<Advisor>;

    fn index_of(&self, advisor: &Advisor) -> Option<usize>;

    fn replace_advisor(&self, old: &Advisor, new: Advisor) -> AopResult<bool>;

    fn add_advice(&self, advice: Advice) -> AopResult<()>;

    fn add_advice_at(&self, position: usize, advice: Advice) -> AopResult<()>;

    fn remove_advice(&self, advice: &Advice) -> AopResult<bool>;

    fn index_of_advice(&self, advice: &Advice) -> Option<usize>;

    fn add_interface(&self, interface: &Class) -> AopResult<()>;

    fn remove_interface(&self, interface: &Class) -> AopResult<bool>;

    fn to_proxy_config_string(&self) -> String;
}

/// 配置变化监听器
///
/// 第一个代理创建之后才会收到通知。
pub trait AdvisedSupportListener: Send + Sync {
    fn activated(&self, advised: &AdvisedSupport);

    fn advice_changed(&self, advised: &AdvisedSupport);
}

/// 调用链缓存的键：按方法身份比较，哈希在构造时算好
#[derive(Clone)]
pub struct MethodCacheKey {
    method: Method,
    hash: u64,
}

impl MethodCacheKey {
    pub fn new(method: &Method) -> Self {
        Self {
            method: method.clone(),
            hash: method.identity_hash(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

impl PartialEq for MethodCacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.method.ptr_eq(&other.method)
    }
}

impl Eq for MethodCacheKey {}

impl Hash for MethodCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for MethodCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodCacheKey({})", self.method.signature())
    }
}

struct AdvisorState {
    advisors: Arc<[Advisor]>,
    interfaces: Vec<Class>,
}

impl Default for AdvisorState {
    fn default() -> Self {
        Self {
            advisors: Arc::from(Vec::new()),
            interfaces: Vec::new(),
        }
    }
}

/// 代理配置
pub struct AdvisedSupport {
    config: ProxyConfig,
    pre_filtered: AtomicBool,
    target_source: RwLock<Arc<dyn TargetSource>>,
    state: RwLock<AdvisorState>,
    chain_factory: RwLock<Arc<dyn AdvisorChainFactory>>,
    method_cache: RwLock<HashMap<MethodCacheKey, Arc<[ChainElement]>>>,
    generation: AtomicU64,
    listeners: RwLock<Vec<Arc<dyn AdvisedSupportListener>>>,
    active: AtomicBool,
}

impl AdvisedSupport {
    pub fn new() -> Self {
        Self::with_config(ProxyConfig::new())
    }

    pub fn with_config(config: ProxyConfig) -> Self {
        Self {
            config,
            pre_filtered: AtomicBool::new(false),
            target_source: RwLock::new(Arc::new(EmptyTargetSource::new())),
            state: RwLock::new(AdvisorState::default()),
            chain_factory: RwLock::new(Arc::new(DefaultAdvisorChainFactory)),
            method_cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
            active: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------
    // 标志
    // ------------------------------------------------------------------

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn flags(&self) -> ProxyFlags {
        self.config.flags()
    }

    pub fn is_frozen(&self) -> bool {
        self.config.is_frozen()
    }

    pub fn set_frozen(&self, frozen: bool) {
        self.config.set_frozen(frozen);
    }

    pub fn is_proxy_target_class(&self) -> bool {
        self.config.is_proxy_target_class()
    }

    pub fn set_proxy_target_class(&self, value: bool) {
        self.config.set_proxy_target_class(value);
    }

    pub fn is_optimize(&self) -> bool {
        self.config.is_optimize()
    }

    pub fn set_optimize(&self, value: bool) {
        self.config.set_optimize(value);
    }

    pub fn is_opaque(&self) -> bool {
        self.config.is_opaque()
    }

    pub fn set_opaque(&self, value: bool) {
        self.config.set_opaque(value);
    }

    pub fn is_expose_proxy(&self) -> bool {
        self.config.is_expose_proxy()
    }

    pub fn set_expose_proxy(&self, value: bool) {
        self.config.set_expose_proxy(value);
    }

    /// advisor 是否已经按目标类型预先筛选过（跳过类过滤器）
    pub fn is_pre_filtered(&self) -> bool {
        self.pre_filtered.load(Ordering::Acquire)
    }

    pub fn set_pre_filtered(&self, pre_filtered: bool) {
        self.pre_filtered.store(pre_filtered, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // 目标源
    // ------------------------------------------------------------------

    pub fn target_source(&self) -> Arc<dyn TargetSource> {
        Arc::clone(&self.target_source.read())
    }

    pub fn set_target_source(&self, target_source: Arc<dyn TargetSource>) {
        *self.target_source.write() = target_source;
    }

    /// 目标源声明的目标类型
    pub fn target_class(&self) -> Option<Class> {
        self.target_source.read().target_class()
    }

    // ------------------------------------------------------------------
    // 接口
    // ------------------------------------------------------------------

    /// 代理接口（按加入顺序）
    pub fn interface_snapshot(&self) -> Vec<Class> {
        self.state.read().interfaces.clone()
    }

    pub fn proxied_interfaces(&self) -> Vec<Class> {
        self.interface_snapshot()
    }

    pub fn is_interface_proxied(&self, interface: &Class) -> bool {
        self.state
            .read()
            .interfaces
            .iter()
            .any(|i| i.is_assignable_to(interface))
    }

    /// 没有用户指定的接口
    pub fn has_no_user_supplied_interfaces(&self) -> bool {
        self.state.read().interfaces.is_empty()
    }

    /// 加入代理接口，重复加入不做任何事
    pub fn add_interface(&self, interface: &Class) -> AopResult<()> {
        self.check_not_frozen("add interface")?;
        if !interface.is_interface() {
            return Err(AopConfigError::NotAnInterface(interface.name().to_string()));
        }
        let added = {
            let mut state = self.state.write();
            Self::push_interface(&mut state, interface)
        };
        if added {
            tracing::debug!("Added interface [{}] to proxy configuration", interface.name());
            self.advice_changed();
        }
        Ok(())
    }

    /// 替换全部代理接口
    pub fn set_interfaces(&self, interfaces: &[Class]) -> AopResult<()> {
        self.check_not_frozen("set interfaces")?;
        if let Some(bad) = interfaces.iter().find(|i| !i.is_interface()) {
            return Err(AopConfigError::NotAnInterface(bad.name().to_string()));
        }
        {
            let mut state = self.state.write();
            state.interfaces.clear();
            for interface in interfaces {
                Self::push_interface(&mut state, interface);
            }
        }
        self.advice_changed();
        Ok(())
    }

    pub fn remove_interface(&self, interface: &Class) -> AopResult<bool> {
        self.check_not_frozen("remove interface")?;
        let removed = {
            let mut state = self.state.write();
            let before = state.interfaces.len();
            state.interfaces.retain(|i| i != interface);
            state.interfaces.len() != before
        };
        if removed {
            tracing::debug!("Removed interface [{}] from proxy configuration", interface.name());
            self.advice_changed();
        }
        Ok(removed)
    }

    fn push_interface(state: &mut AdvisorState, interface: &Class) -> bool {
        if state.interfaces.contains(interface) {
            return false;
        }
        state.interfaces.push(interface.clone());
        true
    }

    // ------------------------------------------------------------------
    // advisor
    // ------------------------------------------------------------------

    /// 当前 advisor 列表（共享的不可变快照）
    pub fn advisor_snapshot(&self) -> Arc<[Advisor]> {
        Arc::clone(&self.state.read().advisors)
    }

    pub fn advisors(&self) -> Vec<Advisor> {
        self.advisor_snapshot().to_vec()
    }

    pub fn advisor_count(&self) -> usize {
        self.state.read().advisors.len()
    }

    pub fn add_advisor(&self, advisor: Advisor) -> AopResult<()> {
        let position = self.advisor_count();
        self.add_advisor_at(position, advisor)
    }

    /// 依次加入多个 advisor
    pub fn add_advisors<I>(&self, advisors: I) -> AopResult<()>
    where
        I: IntoIterator<Item = Advisor>,
    {
        for advisor in advisors {
            self.add_advisor(advisor)?;
        }
        Ok(())
    }

    /// 在 `position` 处插入 advisor
    ///
    /// 引入 advisor 的接口先校验，再和 advisor 一起提交。
    pub fn add_advisor_at(&self, position: usize, advisor: Advisor) -> AopResult<()> {
        self.check_not_frozen("add advisor")?;
        Self::validate_advisor(&advisor)?;
        {
            let mut state = self.state.write();
            Self::insert_locked(&mut state, position, advisor.clone())?;
        }
        tracing::debug!("Added advisor {:?} at position {}", advisor, position);
        self.advice_changed();
        Ok(())
    }

    pub fn remove_advisor(&self, advisor: &Advisor) -> AopResult<bool> {
        match self.index_of(advisor) {
            Some(index) => self.remove_advisor_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    /// 删除引入 advisor 时一并删除它引入的接口
    pub fn remove_advisor_at(&self, index: usize) -> AopResult<Advisor> {
        self.check_not_frozen("remove advisor")?;
        let removed = {
            let mut state = self.state.write();
            Self::remove_locked(&mut state, index)?
        };
        tracing::debug!("Removed advisor {:?} at index {}", removed, index);
        self.advice_changed();
        Ok(removed)
    }

    pub fn index_of(&self, advisor: &Advisor) -> Option<usize> {
        self.state
            .read()
            .advisors
            .iter()
            .position(|a| a.ptr_eq(advisor))
    }

    /// 把 `old` 换成 `new`；`old` 不存在时返回 `false`
    pub fn replace_advisor(&self, old: &Advisor, new: Advisor) -> AopResult<bool> {
        self.check_not_frozen("replace advisor")?;
        Self::validate_advisor(&new)?;
        {
            let mut state = self.state.write();
            let Some(index) = state.advisors.iter().position(|a| a.ptr_eq(old)) else {
                return Ok(false);
            };
            Self::remove_locked(&mut state, index)?;
            Self::insert_locked(&mut state, index, new)?;
        }
        self.advice_changed();
        Ok(true)
    }

    pub fn add_advice(&self, advice: Advice) -> AopResult<()> {
        let position = self.advisor_count();
        self.add_advice_at(position, advice)
    }

    /// 引入拦截器包装成引入 advisor，其他通知包装成匹配一切的 advisor
    pub fn add_advice_at(&self, position: usize, advice: Advice) -> AopResult<()> {
        let advisor = match &advice {
            Advice::Introduction(interceptor) => Advisor::introduction(DefaultIntroductionAdvisor::new(
                Arc::clone(interceptor),
            )),
            _ => Advisor::always(advice),
        };
        self.add_advisor_at(position, advisor)
    }

    pub fn remove_advice(&self, advice: &Advice) -> AopResult<bool> {
        match self.index_of_advice(advice) {
            Some(index) => self.remove_advisor_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn index_of_advice(&self, advice: &Advice) -> Option<usize> {
        self.state
            .read()
            .advisors
            .iter()
            .position(|a| a.advice().ptr_eq(advice))
    }

    /// 是否包含该通知实例
    pub fn contains_advice(&self, advice: &Advice) -> bool {
        self.index_of_advice(advice).is_some()
    }

    fn validate_advisor(advisor: &Advisor) -> AopResult<()> {
        match advisor {
            Advisor::Introduction(ia) => ia.validate_interfaces(),
            Advisor::Pointcut(pa) => {
                if get_adapter_registry().supports(pa.advice()) {
                    Ok(())
                } else {
                    Err(AopConfigError::UnknownAdviceType(pa.advice().type_name().to_string()))
                }
            }
        }
    }

    fn insert_locked(state: &mut AdvisorState, position: usize, advisor: Advisor) -> AopResult<()> {
        let len = state.advisors.len();
        if position > len {
            return Err(AopConfigError::IndexOutOfBounds { index: position, len });
        }
        for interface in advisor.introduced_interfaces() {
            Self::push_interface(state, interface);
        }
        let mut advisors = state.advisors.to_vec();
        advisors.insert(position, advisor);
        state.advisors = advisors.into();
        Ok(())
    }

    fn remove_locked(state: &mut AdvisorState, index: usize) -> AopResult<Advisor> {
        let len = state.advisors.len();
        if index >= len {
            return Err(AopConfigError::IndexOutOfBounds { index, len });
        }
        let mut advisors = state.advisors.to_vec();
        let removed = advisors.remove(index);
        state.advisors = advisors.into();
        for interface in removed.introduced_interfaces() {
            state.interfaces.retain(|i| i != interface);
        }
        Ok(removed)
    }

    fn check_not_frozen(&self, operation: &'static str) -> AopResult<()> {
        if self.is_frozen() {
            return Err(AopConfigError::Frozen { operation });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // 调用链
    // ------------------------------------------------------------------

    pub fn advisor_chain_factory(&self) -> Arc<dyn AdvisorChainFactory> {
        Arc::clone(&self.chain_factory.read())
    }

    pub fn set_advisor_chain_factory(&self, factory: Arc<dyn AdvisorChainFactory>) {
        *self.chain_factory.write() = factory;
        self.advice_changed();
    }

    /// 方法的调用链：命中缓存直接返回，否则计算后存入
    pub fn get_interceptors_and_dynamic_interception_advice(
        &self,
        method: &Method,
        target_class: Option<&Class>,
    ) -> InvocationResult<Arc<[ChainElement]>> {
        let key = MethodCacheKey::new(method);
        if let Some(chain) = self.method_cache.read().get(&key) {
            return Ok(Arc::clone(chain));
        }

        let generation = self.generation.load(Ordering::Acquire);
        let factory = self.advisor_chain_factory();
        let chain: Arc<[ChainElement]> = factory
            .get_interceptors_and_dynamic_interception_advice(self, method, target_class)?
            .into();
        tracing::trace!("Computed chain for {}: {} element(s)", method.signature(), chain.len());

        let mut cache = self.method_cache.write();
        if self.generation.load(Ordering::Acquire) != generation {
            return Ok(chain);
        }
        Ok(Arc::clone(cache.entry(key).or_insert(chain)))
    }

    /// 缓存中调用链的数量
    pub fn cached_chain_count(&self) -> usize {
        self.method_cache.read().len()
    }

    /// 结构性修改之后调用：清空缓存并通知监听器
    pub fn advice_changed(&self) {
        {
            let mut cache = self.method_cache.write();
            self.generation.fetch_add(1, Ordering::AcqRel);
            cache.clear();
        }
        tracing::trace!("Invalidated interceptor chain cache");

        if self.is_active() {
            let listeners = self.listeners.read().clone();
            for listener in listeners {
                listener.advice_changed(self);
            }
        }
    }

    /// 配置修改的代数，每次结构性修改加一
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // 监听器
    // ------------------------------------------------------------------

    pub fn add_listener(&self, listener: Arc<dyn AdvisedSupportListener>) {
        self.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn AdvisedSupportListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// 第一个代理创建时调用
    pub fn activate(&self) {
        if self.active.swap(true, Ordering::AcqRel) {
            return;
        }
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.activated(self);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // 复制与描述
    // ------------------------------------------------------------------

    /// 复制另一份配置：标志、目标源、调用链工厂、接口和 advisor
    pub fn copy_configuration_from(&self, other: &AdvisedSupport) {
        self.config.copy_from(&other.config);
        self.set_pre_filtered(other.is_pre_filtered());
        self.set_target_source(other.target_source());
        *self.chain_factory.write() = other.advisor_chain_factory();
        {
            let source = other.state.read();
            let mut state = self.state.write();
            state.advisors = Arc::clone(&source.advisors);
            state.interfaces = source.interfaces.clone();
        }
        self.advice_changed();
    }

    /// 配置的文字描述
    pub fn to_proxy_config_string(&self) -> String {
        let state = self.state.read();
        let interfaces: Vec<&str> = state.interfaces.iter().map(Class::name).collect();
        let advisors: Vec<String> = state.advisors.iter().map(|a| format!("{:?}", a)).collect();
        format!(
            "{} interfaces [{}]; {} advisors [{}]; targetSource [{}]; {}",
            interfaces.len(),
            interfaces.join(", "),
            advisors.len(),
            advisors.join(", "),
            self.target_source().describe(),
            self.config
        )
    }
}

impl Default for AdvisedSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdvisedSupport: ")?;
        f.write_str(&self.to_proxy_config_string())
    }
}

impl Advised for AdvisedSupport {
    fn is_frozen(&self) -> bool {
        AdvisedSupport::is_frozen(self)
    }

    fn is_proxy_target_class(&self) -> bool {
        AdvisedSupport::is_proxy_target_class(self)
    }

    fn is_expose_proxy(&self) -> bool {
        AdvisedSupport::is_expose_proxy(self)
    }

    fn set_expose_proxy(&self, expose: bool) {
        AdvisedSupport::set_expose_proxy(self, expose)
    }

    fn is_pre_filtered(&self) -> bool {
        AdvisedSupport::is_pre_filtered(self)
    }

    fn set_pre_filtered(&self, pre_filtered: bool) {
        AdvisedSupport::set_pre_filtered(self, pre_filtered)
    }

    fn proxied_interfaces(&self) -> Vec<Class> {
        AdvisedSupport::proxied_interfaces(self)
    }

    fn is_interface_proxied(&self, interface: &Class) -> bool {
        AdvisedSupport::is_interface_proxied(self, interface)
    }

    fn target_source(&self) -> Arc<dyn TargetSource> {
        AdvisedSupport::target_source(self)
    }

    fn set_target_source(&self, target_source: Arc<dyn TargetSource>) {
        AdvisedSupport::set_target_source(self, target_source)
    }

    fn advisors(&self) -> Vec<Advisor> {
        AdvisedSupport::advisors(self)
    }

    fn advisor_count(&self) -> usize {
        AdvisedSupport::advisor_count(self)
    }

    fn add_advisor(&self, advisor: Advisor) -> AopResult<()> {
        AdvisedSupport::add_advisor(self, advisor)
    }

    fn add_advisor_at(&self, position: usize, advisor: Advisor) -> AopResult<()> {
        AdvisedSupport::add_advisor_at(self, position, advisor)
    }

    fn remove_advisor(&self, advisor: &Advisor) -> AopResult<bool> {
        AdvisedSupport::remove_advisor(self, advisor)
    }

    fn remove_advisor_at(&self, index: usize) -> AopResult<Advisor> {
        AdvisedSupport::remove_advisor_at(self, index)
    }

    fn index_of(&self, advisor: &Advisor) -> Option<usize> {
        AdvisedSupport::index_of(self, advisor)
    }

    fn replace_advisor(&self, old: &Advisor, new: Advisor) -> AopResult<bool> {
        AdvisedSupport::replace_advisor(self, old, new)
    }

    fn add_advice(&self, advice: Advice) -> AopResult<()> {
        AdvisedSupport::add_advice(self, advice)
    }

    fn add_advice_at(&self, position: usize, advice: Advice) -> AopResult<()> {
        AdvisedSupport::add_advice_at(self, position, advice)
    }

    fn remove_advice(&self, advice: &Advice) -> AopResult<bool> {
        AdvisedSupport::remove_advice(self, advice)
    }

    fn index_of_advice(&self, advice: &Advice) -> Option<usize> {
        AdvisedSupport::index_of_advice(self, advice)
    }

    fn add_interface(&self, interface: &Class) -> AopResult<()> {
        AdvisedSupport::add_interface(self, interface)
    }

    fn remove_interface(&self, interface: &Class) -> AopResult<bool> {
        AdvisedSupport::remove_interface(self, interface)
    }

    fn to_proxy_config_string(&self) -> String {
        AdvisedSupport::to_proxy_config_string(self)
    }
}
