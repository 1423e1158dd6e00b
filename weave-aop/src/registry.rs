//! 类型注册表
//!
//! 根据对象的 `TypeId` 找到它的 `Class`，代理在运行时据此决定目标的真实类型

use crate::reflect::Class;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;

/// 全局类型注册表
///
/// 首次访问时自动加载所有通过 inventory 注册的类型
static GLOBAL_CLASS_REGISTRY: Lazy<ClassRegistry> = Lazy::new(|| {
    let registry = ClassRegistry::new();
    registry.auto_load_classes();
    registry
});

/// 获取全局类型注册表
///
/// 使用示例：
/// ```ignore
/// use weave_aop::get_class_registry;
///
/// get_class_registry().register(account_class);
/// ```
pub fn get_class_registry() -> &'static ClassRegistry {
    &GLOBAL_CLASS_REGISTRY
}

/// 类型注册器
///
/// 用于 inventory 自动收集，由 `#[proxyable]` 生成
pub struct ClassRegistration {
    /// 类型名称
    pub type_name: &'static str,

    /// 构造类型描述的函数
    pub class: fn() -> Class,
}

impl ClassRegistration {
    pub const fn new(type_name: &'static str, class: fn() -> Class) -> Self {
        Self { type_name, class }
    }
}

inventory::collect!(ClassRegistration);

/// 获取所有注册的类型注册器
pub fn get_all_class_registrations() -> impl Iterator<Item = &'static ClassRegistration> {
    inventory::iter::<ClassRegistration>()
}

/// 类型注册表
pub struct ClassRegistry {
    classes: RwLock<HashMap<TypeId, Class>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
        }
    }

    /// 注册类型，返回被替换的旧描述
    ///
    /// 没有 Rust 类型的描述（接口、基类型）不会被登记
    pub fn register(&self, class: Class) -> Option<Class> {
        let type_id = class.type_id()?;
        tracing::debug!("Registering class: {}", class.name());
        self.classes.write().insert(type_id, class)
    }

    pub fn lookup(&self, type_id: TypeId) -> Option<Class> {
        self.classes.read().get(&type_id).cloned()
    }

    /// 按名字查找
    pub fn find_by_name(&self, name: &str) -> Option<Class> {
        self.classes
            .read()
            .values()
            .find(|c| c.name() == name)
            .cloned()
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.classes.read().contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }

    /// 从 inventory 自动加载所有注册的类型
    pub fn auto_load_classes(&self) {
        let registrations: Vec<_> = get_all_class_registrations().collect();
        tracing::debug!("Auto-loading {} class(es) from registry", registrations.len());

        for registration in registrations {
            tracing::trace!("  ├─ Loading class: {}", registration.type_name);
            self.register((registration.class)());
        }
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{ClassBuilder, Object, Value, ValueType};
    use std::sync::Arc;

    struct Ledger;

    #[test]
    fn test_register_and_lookup() {
        let registry = ClassRegistry::new();
        let class = ClassBuilder::<Ledger>::new("Ledger")
            .method("size", vec![], ValueType::Int, |_: &Ledger, _| Ok(Value::Int(0)))
            .build();

        assert!(registry.register(class.clone()).is_none());
        assert_eq!(registry.lookup(TypeId::of::<Ledger>()), Some(class));
        assert!(registry.find_by_name("Ledger").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_interfaces_are_not_registered() {
        let registry = ClassRegistry::new();
        let iface = ClassBuilder::interface("Sized").build();
        assert!(registry.register(iface).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_class_of_uses_global_registry() {
        struct Probe;
        let class = ClassBuilder::<Probe>::new("Probe").build();
        get_class_registry().register(class);

        let object: Object = Arc::new(Probe);
        assert_eq!(Class::of(&object).map(|c| c.name().to_string()), Some("Probe".into()));
    }
}
