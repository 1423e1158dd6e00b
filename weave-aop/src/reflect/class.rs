//! 类型描述
//!
//! Rust 没有运行时反射，代理需要的类型信息由 `Class` 显式描述：
//! 名字、种类（类 / 接口）、父类、实现的接口、声明的方法。
//!
//! 所有类都隐式继承通用基类型 [`Class::object`]。

use crate::error::InvocationError;
use crate::reflect::method::{Method, MethodInvoker, TypedInvoker};
use crate::reflect::value::{object_address, same_object, Object, Value, ValueType};
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 通用基类型的名字
pub const OBJECT_CLASS_NAME: &str = "Object";

/// 内省接口的名字
pub const ADVISED_CLASS_NAME: &str = "Advised";

/// 类型种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Class,
    Interface,
}

struct ClassInner {
    name: String,
    type_id: Option<TypeId>,
    kind: ClassKind,
    is_final: bool,
    superclass: Option<Class>,
    interfaces: Vec<Class>,
    methods: Vec<Method>,
    /// 从父类继承、重新绑定到本类型的方法
    inherited: Vec<Method>,
}

/// 类型句柄，按名字比较
#[derive(Clone)]
pub struct Class(Arc<ClassInner>);

static OBJECT_CLASS: Lazy<Class> = Lazy::new(|| {
    let equals = Method::with_invoker(
        OBJECT_CLASS_NAME,
        "equals",
        vec![ValueType::Object(None)],
        ValueType::Bool,
        Arc::new(|target, args| {
            let equal = args
                .first()
                .and_then(Value::as_object)
                .is_some_and(|other| same_object(target, other));
            Ok(Value::Bool(equal))
        }),
    );
    let hash_code = Method::with_invoker(
        OBJECT_CLASS_NAME,
        "hash_code",
        vec![],
        ValueType::Int,
        Arc::new(|target, _args| Ok(Value::Int(object_address(target) as i64))),
    );
    let to_string = Method::with_invoker(
        OBJECT_CLASS_NAME,
        "to_string",
        vec![],
        ValueType::Str,
        Arc::new(|target, _args| {
            let name = Class::of(target)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| OBJECT_CLASS_NAME.to_string());
            Ok(Value::Str(format!("{}@{:x}", name, object_address(target))))
        }),
    );

    Class(Arc::new(ClassInner {
        name: OBJECT_CLASS_NAME.to_string(),
        type_id: None,
        kind: ClassKind::Class,
        is_final: false,
        superclass: None,
        interfaces: Vec::new(),
        methods: vec![equals, hash_code, to_string],
        inherited: Vec::new(),
    }))
});

static ADVISED_CLASS: Lazy<Class> = Lazy::new(|| {
    ClassBuilder::interface(ADVISED_CLASS_NAME)
        .abstract_method("is_frozen", vec![], ValueType::Bool)
        .abstract_method("is_proxy_target_class", vec![], ValueType::Bool)
        .abstract_method("is_expose_proxy", vec![], ValueType::Bool)
        .abstract_method("is_pre_filtered", vec![], ValueType::Bool)
        .abstract_method("advisor_count", vec![], ValueType::Int)
        .abstract_method("to_proxy_config_string", vec![], ValueType::Str)
        .build()
});

impl Class {
    /// 通用基类型，声明 `equals` / `hash_code` / `to_string`
    pub fn object() -> Class {
        OBJECT_CLASS.clone()
    }

    /// 代理配置的内省接口
    pub fn advised() -> Class {
        ADVISED_CLASS.clone()
    }

    /// 对象的运行时类型：代理对象是生成的代理类，其余查询全局类型注册表
    pub fn of(object: &Object) -> Option<Class> {
        if let Some(class) = crate::proxy::proxy_class_of(object) {
            return Some(class);
        }
        let type_id = Any::type_id(&**object);
        crate::registry::get_class_registry().lookup(type_id)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.0.type_id
    }

    pub fn kind(&self) -> ClassKind {
        self.0.kind
    }

    pub fn is_interface(&self) -> bool {
        self.0.kind == ClassKind::Interface
    }

    pub fn is_final(&self) -> bool {
        self.0.is_final
    }

    pub fn is_object(&self) -> bool {
        self.name() == OBJECT_CLASS_NAME
    }

    pub fn superclass(&self) -> Option<&Class> {
        self.0.superclass.as_ref()
    }

    pub fn interfaces(&self) -> &[Class] {
        &self.0.interfaces
    }

    pub fn declared_methods(&self) -> &[Method] {
        &self.0.methods
    }

    /// 自身声明的方法（不含继承）
    pub fn find_declared_method(&self, name: &str) -> Option<Method> {
        self.0.methods.iter().find(|m| m.name() == name).cloned()
    }

    /// 查找方法：自身 → 父类链 → 接口
    pub fn find_method(&self, name: &str) -> Option<Method> {
        if let Some(m) = self.find_declared_method(name) {
            return Some(m);
        }
        if let Some(m) = self.0.inherited.iter().find(|m| m.name() == name) {
            return Some(m.clone());
        }
        if let Some(m) = self.superclass().and_then(|s| s.find_method(name)) {
            return Some(m);
        }
        self.interfaces().iter().find_map(|i| i.find_method(name))
    }

    /// 按运行时类型做虚分派：找到本类型对 `method` 的实现
    pub fn resolve_implementation(&self, method: &Method) -> Option<Method> {
        let own = self
            .0
            .methods
            .iter()
            .chain(self.0.inherited.iter())
            .find(|m| !m.is_abstract() && m.same_signature(method));
        if let Some(m) = own {
            return Some(m.clone());
        }
        if let Some(m) = self.superclass().and_then(|s| s.resolve_implementation(method)) {
            return Some(m);
        }
        (!method.is_abstract()).then(|| method.clone())
    }

    /// 本类型的实例能否赋给 `other` 类型
    pub fn is_assignable_to(&self, other: &Class) -> bool {
        self.is_assignable_to_name(other.name())
    }

    pub fn is_assignable_to_name(&self, name: &str) -> bool {
        if name == OBJECT_CLASS_NAME || self.name() == name {
            return true;
        }
        if self
            .superclass()
            .is_some_and(|s| s.is_assignable_to_name(name))
        {
            return true;
        }
        self.interfaces().iter().any(|i| i.is_assignable_to_name(name))
    }

    /// 实现的全部接口（含父类与父接口的），按出现顺序去重
    pub fn all_interfaces(&self) -> Vec<Class> {
        let mut out: Vec<Class> = Vec::new();
        let mut current = Some(self);
        while let Some(class) = current {
            for interface in class.interfaces() {
                for candidate in std::iter::once(interface.clone()).chain(interface.all_interfaces()) {
                    if !out.contains(&candidate) {
                        out.push(candidate);
                    }
                }
            }
            current = class.superclass();
        }
        out
    }

    /// 全部方法（自身、继承、接口），按名字去重，先出现者优先
    pub fn all_methods(&self) -> Vec<Method> {
        let mut seen = HashSet::new();
        let mut methods = Vec::new();
        self.collect_methods(&mut seen, &mut methods);
        methods
    }

    fn collect_methods(&self, seen: &mut HashSet<String>, out: &mut Vec<Method>) {
        for m in self.0.methods.iter().chain(self.0.inherited.iter()) {
            if seen.insert(m.name().to_string()) {
                out.push(m.clone());
            }
        }
        if let Some(superclass) = self.superclass() {
            superclass.collect_methods(seen, out);
        }
        for interface in self.interfaces() {
            interface.collect_methods(seen, out);
        }
    }

    /// 子类可以覆盖的方法
    pub fn overridable_methods(&self) -> Vec<Method> {
        self.all_methods()
            .into_iter()
            .filter(|m| !m.is_final())
            .collect()
    }

    /// 没有实现的抽象方法（接口声明但本类没有实现）
    pub fn unimplemented_methods(&self) -> Vec<Method> {
        if self.is_interface() {
            return Vec::new();
        }
        self.all_methods()
            .into_iter()
            .filter(|m| m.is_abstract() && self.resolve_implementation(m).is_none())
            .collect()
    }

    /// 本类型声明或继承了名为 `name` 的方法（不含接口与基类型）
    pub fn defines_method(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.is_object() {
                return false;
            }
            if class.0.methods.iter().chain(class.0.inherited.iter()).any(|m| m.name() == name) {
                return true;
            }
            current = class.superclass();
        }
        false
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.name() == other.name()
    }
}

impl Eq for Class {}

impl Hash for Class {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("is_final", &self.is_final())
            .field("methods", &self.0.methods.len())
            .finish()
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 具有编译期类型描述的类型
///
/// 通常由 `#[proxyable]` 生成。
pub trait Proxyable: Any + Send + Sync {
    fn class() -> Class;
}

type Rebinder = Box<dyn Fn(&Method) -> Method>;

/// 类型描述构建器
///
/// ```ignore
/// let account = ClassBuilder::<Account>::new("Account")
///     .method("balance", vec![], ValueType::Int, |a: &Account, _| Ok(a.balance().into()))
///     .build();
/// ```
pub struct ClassBuilder<T = ()> {
    name: String,
    type_id: Option<TypeId>,
    kind: ClassKind,
    is_final: bool,
    superclass: Option<Class>,
    interfaces: Vec<Class>,
    methods: Vec<Method>,
    rebind: Option<Rebinder>,
    _marker: std::marker::PhantomData<fn(&T)>,
}

impl ClassBuilder<()> {
    /// 构建接口
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: None,
            kind: ClassKind::Interface,
            is_final: false,
            superclass: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            rebind: None,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Any + Send + Sync> ClassBuilder<T> {
    /// 为 Rust 类型 `T` 构建类
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: Some(TypeId::of::<T>()),
            kind: ClassKind::Class,
            is_final: false,
            superclass: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            rebind: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// 继承 `base`，`upcast` 从子类型取得父类型部分
    pub fn extends<B: Any + Send + Sync>(mut self, base: &Class, upcast: fn(&T) -> &B) -> Self {
        let class_name = self.name.clone();
        self.superclass = Some(base.clone());
        self.rebind = Some(Box::new(move |method: &Method| {
            let Some(base_typed) = method
                .typed_invoker()
                .and_then(|t| t.downcast_ref::<TypedInvoker<B>>())
                .cloned()
            else {
                return method.clone();
            };
            let typed: TypedInvoker<T> = Arc::new(move |target: &T, args: &[Value]| {
                base_typed(upcast(target), args)
            });
            typed_method::<T>(
                &class_name,
                method.declaring_type().to_string(),
                method.name().to_string(),
                method.param_types().to_vec(),
                method.return_type().clone(),
                method.is_final(),
                typed,
            )
        }));
        self
    }

    /// 只登记父类关系，不继承方法体（生成的代理类使用）
    pub(crate) fn subclass_of(mut self, base: &Class) -> Self {
        self.superclass = Some(base.clone());
        self
    }

    /// 声明实现的接口（接口之间也用它表示继承）
    pub fn implements(mut self, interface: &Class) -> Self {
        self.interfaces.push(interface.clone());
        self
    }

    /// 不可继承
    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// 可覆盖的方法
    pub fn method<F>(self, name: &str, params: Vec<ValueType>, ret: ValueType, body: F) -> Self
    where
        F: Fn(&T, &[Value]) -> crate::error::InvocationResult<Value> + Send + Sync + 'static,
    {
        self.push_typed(name, params, ret, false, Arc::new(body))
    }

    /// 不可覆盖的方法，经过类代理调用时不会被拦截
    pub fn final_method<F>(self, name: &str, params: Vec<ValueType>, ret: ValueType, body: F) -> Self
    where
        F: Fn(&T, &[Value]) -> crate::error::InvocationResult<Value> + Send + Sync + 'static,
    {
        self.push_typed(name, params, ret, true, Arc::new(body))
    }

    /// 方法体直接拿到 `Object`（例如需要返回自身引用时）
    pub fn method_raw<F>(mut self, name: &str, params: Vec<ValueType>, ret: ValueType, body: F) -> Self
    where
        F: Fn(&Object, &[Value]) -> crate::error::InvocationResult<Value> + Send + Sync + 'static,
    {
        self.methods.push(Method::with_invoker(
            self.name.clone(),
            name,
            params,
            ret,
            Arc::new(body),
        ));
        self
    }

    fn push_typed(
        mut self,
        name: &str,
        params: Vec<ValueType>,
        ret: ValueType,
        is_final: bool,
        typed: TypedInvoker<T>,
    ) -> Self {
        let method = typed_method::<T>(
            &self.name,
            self.name.clone(),
            name.to_string(),
            params,
            ret,
            is_final,
            typed,
        );
        self.methods.push(method);
        self
    }
}

impl<T> ClassBuilder<T> {
    /// 没有方法体的方法
    pub fn abstract_method(mut self, name: &str, params: Vec<ValueType>, ret: ValueType) -> Self {
        self.methods
            .push(Method::abstract_method(self.name.clone(), name, params, ret));
        self
    }

    /// 直接加入已经构造好的方法（生成的代理类使用）
    pub(crate) fn declare(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Class {
        let superclass = match (self.kind, self.superclass) {
            (ClassKind::Interface, _) => None,
            (ClassKind::Class, Some(s)) => Some(s),
            (ClassKind::Class, None) => Some(Class::object()),
        };

        let mut inherited = Vec::new();
        if let (Some(base), Some(rebind)) = (&superclass, &self.rebind) {
            for m in base.0.methods.iter().chain(base.0.inherited.iter()) {
                let overridden = self.methods.iter().any(|own| own.same_signature(m));
                if !overridden && !m.is_abstract() {
                    inherited.push(rebind(m));
                }
            }
        }

        Class(Arc::new(ClassInner {
            name: self.name,
            type_id: self.type_id,
            kind: self.kind,
            is_final: self.is_final,
            superclass,
            interfaces: self.interfaces,
            methods: self.methods,
            inherited,
        }))
    }
}

fn typed_method<T: Any + Send + Sync>(
    class_name: &str,
    declaring_type: String,
    name: String,
    params: Vec<ValueType>,
    ret: ValueType,
    is_final: bool,
    typed: TypedInvoker<T>,
) -> Method {
    let location = format!("{}::{}", class_name, name);
    let body = Arc::clone(&typed);
    let invoker: MethodInvoker = Arc::new(move |target: &Object, args: &[Value]| {
        let receiver = target.downcast_ref::<T>().ok_or_else(|| {
            InvocationError::type_mismatch(
                location.as_str(),
                format!("receiver of type {}", std::any::type_name::<T>()),
            )
        })?;
        body(receiver, args)
    });
    Method::build(
        declaring_type,
        name,
        params,
        ret,
        is_final,
        Some(invoker),
        Some(Arc::new(typed)),
    )
}
