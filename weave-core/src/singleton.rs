//! 单例登记表
//!
//! 只实现代理引擎需要的那一小段容器语义：三级缓存与提前引用。
//!
//! 1. `singletons`：创建完成的对象
//! 2. `early_singletons`：已经被提前暴露过的引用
//! 3. `early_factories`：尚未被请求的提前引用工厂
//!
//! 一个对象实例化之后、装配依赖之前，登记表为它注册提前引用工厂；如果在装配过程中
//! 有别的对象反过来请求它，就调用工厂（经过所有后置处理器的
//! `get_early_bean_reference`）得到引用，这个引用最终也会作为该对象的登记结果。

use crate::error::{CoreError, CoreResult};
use crate::lifecycle::{Object, SmartInstantiationAwareBeanPostProcessor};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type EarlyReferenceFactory = Box<dyn FnOnce() -> anyhow::Result<Object> + Send>;

/// 记录正在创建中的对象名称
#[derive(Debug, Default)]
pub struct CreationTracker {
    creating: RwLock<HashSet<String>>,
}

impl CreationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_creating(&self, name: &str) -> bool {
        self.creating.read().contains(name)
    }

    /// 标记开始创建；已经在创建中时返回 `false`
    pub fn start_creating(&self, name: &str) -> bool {
        self.creating.write().insert(name.to_string())
    }

    pub fn finish_creating(&self, name: &str) {
        self.creating.write().remove(name);
    }

    pub fn current_creating(&self) -> Vec<String> {
        self.creating.read().iter().cloned().collect()
    }
}

#[derive(Default)]
struct SingletonCaches {
    singletons: HashMap<String, Object>,
    early_singletons: HashMap<String, Object>,
    early_factories: HashMap<String, EarlyReferenceFactory>,
}

/// 支持提前引用的单例登记表
#[derive(Default)]
pub struct DefaultSingletonRegistry {
    caches: Mutex<SingletonCaches>,
    creation_tracker: CreationTracker,
    post_processors: RwLock<Vec<Arc<dyn SmartInstantiationAwareBeanPostProcessor>>>,
}

impl DefaultSingletonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加后置处理器（按 order 排序）
    pub fn add_post_processor(&self, processor: Arc<dyn SmartInstantiationAwareBeanPostProcessor>) {
        let mut processors = self.post_processors.write();
        tracing::debug!("Registering post-processor '{}'", processor.name());
        processors.push(processor);
        processors.sort_by_key(|p| p.order());
    }

    /// 直接登记一个已完成的对象
    pub fn register_singleton(&self, name: impl Into<String>, object: Object) {
        let name = name.into();
        let mut caches = self.caches.lock();
        caches.early_singletons.remove(&name);
        caches.early_factories.remove(&name);
        caches.singletons.insert(name, object);
    }

    pub fn contains_singleton(&self, name: &str) -> bool {
        self.caches.lock().singletons.contains_key(name)
    }

    pub fn is_currently_in_creation(&self, name: &str) -> bool {
        self.creation_tracker.is_creating(name)
    }

    /// 查找对象
    ///
    /// 对象仍在创建中时，`allow_early` 决定是否调用提前引用工厂。
    pub fn get_singleton(&self, name: &str, allow_early: bool) -> CoreResult<Option<Object>> {
        let factory = {
            let mut caches = self.caches.lock();
            if let Some(object) = caches.singletons.get(name) {
                return Ok(Some(Arc::clone(object)));
            }
            if !self.creation_tracker.is_creating(name) {
                return Ok(None);
            }
            if let Some(object) = caches.early_singletons.get(name) {
                return Ok(Some(Arc::clone(object)));
            }
            if !allow_early {
                return Ok(None);
            }
            match caches.early_factories.remove(name) {
                Some(factory) => factory,
                None => return Ok(None),
            }
        };

        // 工厂在锁外执行，它会回调后置处理器
        let early = factory().map_err(|source| CoreError::SingletonCreationFailed {
            name: name.to_string(),
            source,
        })?;
        tracing::debug!("Exposed early reference for '{}'", name);

        let mut caches = self.caches.lock();
        let early = caches
            .early_singletons
            .entry(name.to_string())
            .or_insert(early);
        Ok(Some(Arc::clone(early)))
    }

    /// 取得单例，不存在时创建
    ///
    /// `instantiate` 产生原始对象；`populate` 为它装配依赖，其间可以重新进入登记表
    /// 请求别的对象（包括正在创建中的自己，此时拿到提前引用）。
    pub fn get_or_create<I, P>(&self, name: &str, instantiate: I, populate: P) -> CoreResult<Object>
    where
        I: FnOnce() -> anyhow::Result<Object>,
        P: FnOnce(&Object, &Self) -> anyhow::Result<()>,
    {
        if let Some(existing) = self.get_singleton(name, true)? {
            return Ok(existing);
        }

        if !self.creation_tracker.start_creating(name) {
            return Err(CoreError::CircularReference(format!(
                "{} -> {}",
                self.creation_tracker.current_creating().join(" -> "),
                name
            )));
        }

        struct CreationGuard<'a> {
            tracker: &'a CreationTracker,
            name: &'a str,
        }

        impl Drop for CreationGuard<'_> {
            fn drop(&mut self) {
                self.tracker.finish_creating(self.name);
            }
        }

        let _guard = CreationGuard {
            tracker: &self.creation_tracker,
            name,
        };

        let wrap = |source: anyhow::Error| CoreError::SingletonCreationFailed {
            name: name.to_string(),
            source,
        };

        let raw = instantiate().map_err(wrap)?;
        self.add_early_factory(name, Arc::clone(&raw));

        let result = populate(&raw, self)
            .map_err(wrap)
            .and_then(|_| self.initialize(name, Arc::clone(&raw)))
            .and_then(|exposed| self.reconcile_early_reference(name, &raw, exposed));

        let object = match result {
            Ok(object) => object,
            Err(e) => {
                let mut caches = self.caches.lock();
                caches.early_factories.remove(name);
                caches.early_singletons.remove(name);
                return Err(e);
            }
        };

        self.register_singleton(name, Arc::clone(&object));
        Ok(object)
    }

    fn add_early_factory(&self, name: &str, raw: Object) {
        let processors = self.post_processors.read().clone();
        let bean_name = name.to_string();
        let factory: EarlyReferenceFactory = Box::new(move || {
            processors.iter().try_fold(raw, |bean, processor| {
                processor.get_early_bean_reference(bean, &bean_name)
            })
        });
        self.caches
            .lock()
            .early_factories
            .insert(name.to_string(), factory);
    }

    fn initialize(&self, name: &str, raw: Object) -> CoreResult<Object> {
        let processors = self.post_processors.read().clone();
        let mut bean = raw;
        for processor in &processors {
            bean = processor
                .post_process_before_initialization(bean, name)
                .map_err(|source| post_processor_failed(processor.name(), name, source))?;
        }
        for processor in &processors {
            bean = processor
                .post_process_after_initialization(bean, name)
                .map_err(|source| post_processor_failed(processor.name(), name, source))?;
        }
        Ok(bean)
    }

    /// 被提前暴露过的对象必须以提前引用登记
    fn reconcile_early_reference(&self, name: &str, raw: &Object, exposed: Object) -> CoreResult<Object> {
        let early = self.caches.lock().early_singletons.get(name).cloned();
        match early {
            None => Ok(exposed),
            Some(early) if Arc::ptr_eq(&exposed, raw) || Arc::ptr_eq(&exposed, &early) => Ok(early),
            Some(_) => Err(CoreError::EarlyReferenceMismatch {
                name: name.to_string(),
            }),
        }
    }
}

fn post_processor_failed(processor: &str, name: &str, source: anyhow::Error) -> CoreError {
    CoreError::PostProcessorFailed {
        processor: processor.to_string(),
        name: name.to_string(),
        source,
    }
}
