//! 方法描述
//!
//! `Method` 是按同一性比较的句柄：两个 `Method` 相等当且仅当它们指向同一个描述。

use crate::error::{InvocationError, InvocationResult};
use crate::reflect::value::{FromValue, Object, Value, ValueType};
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 在目标对象上执行方法
pub type MethodInvoker = Arc<dyn Fn(&Object, &[Value]) -> InvocationResult<Value> + Send + Sync>;

/// 绑定到具体 Rust 类型的方法体
pub(crate) type TypedInvoker<T> =
    Arc<dyn Fn(&T, &[Value]) -> InvocationResult<Value> + Send + Sync>;

struct MethodInner {
    name: String,
    declaring_type: String,
    param_types: Vec<ValueType>,
    return_type: ValueType,
    is_final: bool,
    invoker: Option<MethodInvoker>,
    /// `TypedInvoker<T>`，子类型继承时用来重新绑定
    typed: Option<Arc<dyn Any + Send + Sync>>,
    hash: u64,
}

/// 方法句柄
#[derive(Clone)]
pub struct Method(Arc<MethodInner>);

impl Method {
    /// 抽象方法（接口方法）
    pub fn abstract_method(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        param_types: Vec<ValueType>,
        return_type: ValueType,
    ) -> Self {
        Self::build(declaring_type.into(), name.into(), param_types, return_type, false, None, None)
    }

    /// 带方法体的方法，方法体直接操作 `Object`
    pub fn with_invoker(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        param_types: Vec<ValueType>,
        return_type: ValueType,
        invoker: MethodInvoker,
    ) -> Self {
        Self::build(
            declaring_type.into(),
            name.into(),
            param_types,
            return_type,
            false,
            Some(invoker),
            None,
        )
    }

    pub(crate) fn build(
        declaring_type: String,
        name: String,
        param_types: Vec<ValueType>,
        return_type: ValueType,
        is_final: bool,
        invoker: Option<MethodInvoker>,
        typed: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        declaring_type.hash(&mut hasher);
        name.hash(&mut hasher);
        let hash = hasher.finish();

        Method(Arc::new(MethodInner {
            name,
            declaring_type,
            param_types,
            return_type,
            is_final,
            invoker,
            typed,
            hash,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn declaring_type(&self) -> &str {
        &self.0.declaring_type
    }

    pub fn param_types(&self) -> &[ValueType] {
        &self.0.param_types
    }

    pub fn return_type(&self) -> &ValueType {
        &self.0.return_type
    }

    pub fn is_final(&self) -> bool {
        self.0.is_final
    }

    pub fn is_abstract(&self) -> bool {
        self.0.invoker.is_none()
    }

    pub fn invoker(&self) -> Option<&MethodInvoker> {
        self.0.invoker.as_ref()
    }

    pub(crate) fn typed_invoker(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.0.typed.as_ref()
    }

    /// 预先计算的哈希（声明类型 + 方法名）
    pub fn identity_hash(&self) -> u64 {
        self.0.hash
    }

    pub fn ptr_eq(&self, other: &Method) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// 与另一个方法签名相同（名字与参数个数）
    pub fn same_signature(&self, other: &Method) -> bool {
        self.name() == other.name() && self.param_types().len() == other.param_types().len()
    }

    /// 例如 `UserService::find(i64) -> String`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.param_types().iter().map(ToString::to_string).collect();
        format!(
            "{}::{}({}) -> {}",
            self.declaring_type(),
            self.name(),
            params.join(", "),
            self.return_type()
        )
    }

    /// 直接在目标上执行方法体
    pub fn invoke(&self, target: &Object, args: &[Value]) -> InvocationResult<Value> {
        match &self.0.invoker {
            Some(invoker) => invoker(target, args),
            None => Err(InvocationError::infrastructure(
                self.signature(),
                anyhow::anyhow!("method is abstract"),
            )),
        }
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Method {}

impl Hash for Method {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({})", self.signature())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// 方法体里取参数
///
/// ```ignore
/// let id: i64 = arg(args, 0, "UserService::find")?;
/// ```
pub fn arg<T: FromValue>(args: &[Value], index: usize, method: &str) -> InvocationResult<T> {
    args.get(index)
        .and_then(T::from_value)
        .ok_or_else(|| {
            InvocationError::type_mismatch(
                method,
                format!("argument #{} of type {}", index, std::any::type_name::<T>()),
            )
        })
}
