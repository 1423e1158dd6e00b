//! 目标源
//!
//! 代理每次调用时通过 `TargetSource` 取得真正的目标，调用结束后归还。
//! 静态目标源永远返回同一个实例，归还是空操作。

use crate::reflect::{object_address, same_object, Class, Object};
use anyhow::anyhow;
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex, RwLock};
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 创建目标实例的工厂
pub type ObjectFactory = Arc<dyn Fn() -> anyhow::Result<Object> + Send + Sync>;

/// 目标源
pub trait TargetSource: Send + Sync + 'static {
    /// 目标类型，未知时为 `None`
    fn target_class(&self) -> Option<Class>;

    /// 是否每次都返回同一个实例
    fn is_static(&self) -> bool;

    /// 取得目标；空目标源返回 `None`
    fn get_target(&self) -> anyhow::Result<Option<Object>>;

    /// 归还目标
    fn release_target(&self, _target: &Object) -> anyhow::Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;

    /// 代理相等性比较使用
    fn equals(&self, other: &dyn TargetSource) -> bool;

    fn hash_code(&self) -> u64;

    fn describe(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("TargetSource")
            .to_string()
    }
}

impl fmt::Debug for dyn TargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn hash_of(value: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn class_name(class: &Option<Class>) -> &str {
    class.as_ref().map(Class::name).unwrap_or("<unknown>")
}

// ============================================================================
// EmptyTargetSource
// ============================================================================

/// 没有目标
///
/// 不带类型的实例是"没有目标"的标准哨兵。
#[derive(Debug, Clone, Default)]
pub struct EmptyTargetSource {
    class: Option<Class>,
}

impl EmptyTargetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 只有类型信息、没有实例（例如纯接口代理）
    pub fn for_class(class: Class) -> Self {
        Self { class: Some(class) }
    }

    /// 是否是标准哨兵
    pub fn is_canonical(&self) -> bool {
        self.class.is_none()
    }
}

impl TargetSource for EmptyTargetSource {
    fn target_class(&self) -> Option<Class> {
        self.class.clone()
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<Option<Object>> {
        Ok(None)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<EmptyTargetSource>()
            .is_some_and(|o| o.class == self.class)
    }

    fn hash_code(&self) -> u64 {
        hash_of(("EmptyTargetSource", self.class.as_ref().map(Class::name)))
    }

    fn describe(&self) -> String {
        match &self.class {
            Some(class) => format!("EmptyTargetSource: target class [{}]", class.name()),
            None => "EmptyTargetSource: no target class, static".to_string(),
        }
    }
}

// ============================================================================
// SingletonTargetSource
// ============================================================================

/// 固定的单个目标
pub struct SingletonTargetSource {
    target: Object,
    class: Option<Class>,
}

impl SingletonTargetSource {
    pub fn new(target: Object) -> Self {
        let class = Class::of(&target);
        Self { target, class }
    }

    /// 目标类型不在全局注册表中时显式指定
    pub fn with_class(target: Object, class: Class) -> Self {
        Self {
            target,
            class: Some(class),
        }
    }

    pub fn target(&self) -> &Object {
        &self.target
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_class(&self) -> Option<Class> {
        self.class.clone()
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<Option<Object>> {
        Ok(Some(Arc::clone(&self.target)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<SingletonTargetSource>()
            .is_some_and(|o| same_object(&o.target, &self.target))
    }

    fn hash_code(&self) -> u64 {
        hash_of(("SingletonTargetSource", object_address(&self.target)))
    }

    fn describe(&self) -> String {
        format!("SingletonTargetSource for target object of type [{}]", class_name(&self.class))
    }
}

// ============================================================================
// PrototypeTargetSource
// ============================================================================

/// 每次调用创建新的目标
pub struct PrototypeTargetSource {
    name: String,
    class: Class,
    factory: ObjectFactory,
}

impl PrototypeTargetSource {
    pub fn new<F>(name: impl Into<String>, class: Class, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Object> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            class,
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TargetSource for PrototypeTargetSource {
    fn target_class(&self) -> Option<Class> {
        Some(self.class.clone())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Option<Object>> {
        let target = (self.factory)()?;
        tracing::trace!("Created new prototype instance of '{}'", self.name);
        Ok(Some(target))
    }

    fn release_target(&self, _target: &Object) -> anyhow::Result<()> {
        tracing::trace!("Released prototype instance of '{}'", self.name);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<PrototypeTargetSource>()
            .is_some_and(|o| o.name == self.name && o.class == self.class)
    }

    fn hash_code(&self) -> u64 {
        hash_of(("PrototypeTargetSource", &self.name))
    }

    fn describe(&self) -> String {
        format!("PrototypeTargetSource for target '{}' of type [{}]", self.name, self.class.name())
    }
}

// ============================================================================
// PooledTargetSource
// ============================================================================

#[derive(Default)]
struct PoolState {
    idle: Vec<Object>,
    active: Vec<Object>,
    /// 正在创建、已占用名额的实例数
    creating: usize,
}

impl PoolState {
    fn size(&self) -> usize {
        self.idle.len() + self.active.len() + self.creating
    }
}

/// 有界对象池
///
/// 池满时 `get_target` 阻塞等待归还，超过 `max_wait` 仍拿不到则失败。
pub struct PooledTargetSource {
    name: String,
    class: Class,
    factory: ObjectFactory,
    max_size: usize,
    max_wait: Option<Duration>,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PooledTargetSource {
    pub fn new<F>(name: impl Into<String>, class: Class, max_size: usize, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Object> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            class,
            factory: Arc::new(factory),
            max_size: max_size.max(1),
            max_wait: None,
            state: Mutex::new(PoolState::default()),
            available: Condvar::new(),
        }
    }

    /// 最长等待时间，`None` 表示一直等
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// 调用前已占用一个创建名额
    fn create(&self) -> anyhow::Result<Object> {
        let slot = CreationSlot {
            pool: self,
            filled: false,
        };
        let target = (self.factory)()?;
        slot.fill(&target);
        Ok(target)
    }
}

/// 创建中占用的名额；工厂失败或 panic 时归还并唤醒等待者
struct CreationSlot<'a> {
    pool: &'a PooledTargetSource,
    filled: bool,
}

impl CreationSlot<'_> {
    fn fill(mut self, target: &Object) {
        let pool = self.pool;
        let mut state = pool.state.lock();
        state.creating -= 1;
        state.active.push(Arc::clone(target));
        tracing::trace!("Pool '{}' created instance ({} total)", pool.name, state.size());
        self.filled = true;
    }
}

impl Drop for CreationSlot<'_> {
    fn drop(&mut self) {
        if self.filled {
            return;
        }
        let mut state = self.pool.state.lock();
        state.creating -= 1;
        self.pool.available.notify_one();
    }
}

impl TargetSource for PooledTargetSource {
    fn target_class(&self) -> Option<Class> {
        Some(self.class.clone())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Option<Object>> {
        let deadline = self.max_wait.map(|wait| Instant::now() + wait);
        let mut state = self.state.lock();
        loop {
            if let Some(target) = state.idle.pop() {
                state.active.push(Arc::clone(&target));
                return Ok(Some(target));
            }
            if state.size() < self.max_size {
                state.creating += 1;
                drop(state);
                return self.create().map(Some);
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out()
                        && state.idle.is_empty()
                        && state.size() >= self.max_size
                    {
                        return Err(anyhow!(
                            "pool '{}' exhausted: {} active, waited {:?}",
                            self.name,
                            state.active.len(),
                            self.max_wait.unwrap_or_default()
                        ));
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    fn release_target(&self, target: &Object) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        let position = state
            .active
            .iter()
            .position(|t| same_object(t, target))
            .ok_or_else(|| anyhow!("object returned to pool '{}' was not borrowed from it", self.name))?;
        let target = state.active.swap_remove(position);
        state.idle.push(target);
        self.available.notify_one();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<PooledTargetSource>()
            .is_some_and(|o| std::ptr::eq(o, self))
    }

    fn hash_code(&self) -> u64 {
        hash_of(("PooledTargetSource", &self.name))
    }

    fn describe(&self) -> String {
        format!(
            "PooledTargetSource for target '{}' of type [{}], max size {}",
            self.name,
            self.class.name(),
            self.max_size
        )
    }
}

// ============================================================================
// LazyInitTargetSource
// ============================================================================

/// 第一次调用时才创建目标，之后一直使用同一个实例
///
/// 创建之前不是静态的。
pub struct LazyInitTargetSource {
    name: String,
    class: Class,
    factory: ObjectFactory,
    target: OnceCell<Object>,
}

impl LazyInitTargetSource {
    pub fn new<F>(name: impl Into<String>, class: Class, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Object> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            class,
            factory: Arc::new(factory),
            target: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.target.get().is_some()
    }
}

impl TargetSource for LazyInitTargetSource {
    fn target_class(&self) -> Option<Class> {
        Some(self.class.clone())
    }

    fn is_static(&self) -> bool {
        self.is_initialized()
    }

    fn get_target(&self) -> anyhow::Result<Option<Object>> {
        let target = self.target.get_or_try_init(|| {
            tracing::debug!("Initializing lazy target '{}'", self.name);
            (self.factory)()
        })?;
        Ok(Some(Arc::clone(target)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<LazyInitTargetSource>()
            .is_some_and(|o| o.name == self.name && o.class == self.class)
    }

    fn hash_code(&self) -> u64 {
        hash_of(("LazyInitTargetSource", &self.name))
    }

    fn describe(&self) -> String {
        format!("LazyInitTargetSource for target '{}' of type [{}]", self.name, self.class.name())
    }
}

// ============================================================================
// HotSwappableTargetSource
// ============================================================================

/// 可以在运行时原子替换目标
pub struct HotSwappableTargetSource {
    target: RwLock<Object>,
}

impl HotSwappableTargetSource {
    pub fn new(target: Object) -> Self {
        Self {
            target: RwLock::new(target),
        }
    }

    /// 换成新目标，返回旧目标
    pub fn swap(&self, new_target: Object) -> Object {
        let old = std::mem::replace(&mut *self.target.write(), new_target);
        tracing::debug!("Swapped hot-swappable target");
        old
    }

    pub fn current(&self) -> Object {
        Arc::clone(&self.target.read())
    }
}

impl TargetSource for HotSwappableTargetSource {
    fn target_class(&self) -> Option<Class> {
        Class::of(&self.target.read())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Option<Object>> {
        Ok(Some(self.current()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn TargetSource) -> bool {
        other
            .as_any()
            .downcast_ref::<HotSwappableTargetSource>()
            .is_some_and(|o| same_object(&o.current(), &self.current()))
    }

    fn hash_code(&self) -> u64 {
        hash_of("HotSwappableTargetSource")
    }

    fn describe(&self) -> String {
        format!(
            "HotSwappableTargetSource for target of type [{}]",
            class_name(&self.target_class())
        )
    }
}
