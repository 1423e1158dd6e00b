//! 动态值
//!
//! 代理方法的参数与返回值统一用 `Value` 表示。

use crate::reflect::class::Class;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use weave_core::Object;

/// 参数或返回值
#[derive(Clone, Default)]
pub enum Value {
    /// 空引用
    #[default]
    Null,
    /// 无返回值
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(Object),
}

impl Value {
    /// 包装任意对象
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Value::Object(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_object()?.downcast_ref::<T>()
    }

    /// 是否引用同一个对象
    pub fn is_same_object(&self, other: &Object) -> bool {
        self.as_object().is_some_and(|o| same_object(o, other))
    }

    /// 运行时值对应的类型
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null | Value::Object(_) => ValueType::Object(None),
            Value::Unit => ValueType::Void,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
        }
    }
}

/// 对象同一性比较（只比较数据指针）
pub fn same_object(a: &Object, b: &Object) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// 对象的地址，用作同一性哈希
pub fn object_address(object: &Object) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => same_object(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Object(o) => match Class::of(o) {
                Some(class) => write!(f, "{}@{:x}", class.name(), object_address(o)),
                None => write!(f, "Object@{:x}", object_address(o)),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

/// 声明的参数或返回类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Void,
    Bool,
    Int,
    Float,
    Str,
    /// 引用类型；`None` 表示通用基类型
    Object(Option<String>),
}

impl ValueType {
    /// 指定名字的引用类型
    pub fn named(name: impl Into<String>) -> Self {
        ValueType::Object(Some(name.into()))
    }

    /// 基本类型不能为空
    pub fn is_primitive(&self) -> bool {
        matches!(self, ValueType::Bool | ValueType::Int | ValueType::Float)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, ValueType::Void)
    }

    /// 该类型的变量能否持有 `class` 的实例
    pub fn accepts_instance_of(&self, class: &Class) -> bool {
        match self {
            ValueType::Object(None) => true,
            ValueType::Object(Some(name)) => class.is_assignable_to_name(name),
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Void => write!(f, "()"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int => write!(f, "i64"),
            ValueType::Float => write!(f, "f64"),
            ValueType::Str => write!(f, "String"),
            ValueType::Object(None) => write!(f, "Object"),
            ValueType::Object(Some(name)) => write!(f, "{}", name),
        }
    }
}

/// 转换为 `Value`
pub trait IntoValue {
    /// 声明类型
    fn value_type() -> ValueType
    where
        Self: Sized;

    fn into_value(self) -> Value;
}

/// 从 `Value` 转换
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl IntoValue for () {
    fn value_type() -> ValueType {
        ValueType::Void
    }

    fn into_value(self) -> Value {
        Value::Unit
    }
}

impl FromValue for () {
    fn from_value(value: &Value) -> Option<Self> {
        matches!(value, Value::Unit | Value::Null).then_some(())
    }
}

impl IntoValue for bool {
    fn value_type() -> ValueType {
        ValueType::Bool
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

macro_rules! integer_value {
    ($($ty:ty),*) => {
        $(
            impl IntoValue for $ty {
                fn value_type() -> ValueType {
                    ValueType::Int
                }

                fn into_value(self) -> Value {
                    Value::Int(self as i64)
                }
            }

            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    value.as_i64().and_then(|i| <$ty>::try_from(i).ok())
                }
            }
        )*
    };
}

integer_value!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl IntoValue for f64 {
    fn value_type() -> ValueType {
        ValueType::Float
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl IntoValue for String {
    fn value_type() -> ValueType {
        ValueType::Str
    }

    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl IntoValue for Value {
    fn value_type() -> ValueType {
        ValueType::Object(None)
    }

    fn into_value(self) -> Value {
        self
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn value_type() -> ValueType {
        match T::value_type() {
            ValueType::Object(name) => ValueType::Object(name),
            _ => ValueType::Object(None),
        }
    }

    fn into_value(self) -> Value {
        self.map_or(Value::Null, IntoValue::into_value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: Any + Send + Sync> IntoValue for Arc<T> {
    fn value_type() -> ValueType {
        ValueType::named(short_type_name::<T>())
    }

    fn into_value(self) -> Value {
        Value::Object(self)
    }
}

impl<T: Any + Send + Sync> FromValue for Arc<T> {
    fn from_value(value: &Value) -> Option<Self> {
        Arc::clone(value.as_object()?).downcast::<T>().ok()
    }
}

/// 去掉模块路径的类型名
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Account;

    #[test]
    fn test_value_equality_uses_object_identity() {
        let a: Object = Arc::new(Account);
        let b: Object = Arc::new(Account);
        assert_eq!(Value::Object(Arc::clone(&a)), Value::Object(Arc::clone(&a)));
        assert_ne!(Value::Object(a), Value::Object(b));
        assert_eq!(Value::from("x"), Value::Str("x".into()));
        assert_ne!(Value::Null, Value::Unit);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(i32::from_value(&Value::Int(7)), Some(7));
        assert_eq!(u8::from_value(&Value::Int(300)), None);
        assert_eq!(Option::<i64>::from_value(&Value::Null), Some(None));
        assert_eq!(Some(3_i64).into_value(), Value::Int(3));
        assert_eq!(<() as FromValue>::from_value(&Value::Null), Some(()));
        assert_eq!(String::from_value(&Value::Int(1)), None);
    }

    #[test]
    fn test_arc_round_trip_keeps_identity() {
        let account = Arc::new(Account);
        let value = Arc::clone(&account).into_value();
        let back = Arc::<Account>::from_value(&value).unwrap();
        assert!(Arc::ptr_eq(&account, &back));
        assert_eq!(<Arc<Account> as IntoValue>::value_type(), ValueType::named("Account"));
    }

    #[test]
    fn test_primitive_types() {
        assert!(ValueType::Int.is_primitive());
        assert!(!ValueType::Str.is_primitive());
        assert!(!ValueType::Object(None).is_primitive());
        assert_eq!(<Option<i64> as IntoValue>::value_type(), ValueType::Object(None));
    }
}
