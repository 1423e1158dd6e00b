//! 显式的对象模型
//!
//! - `Value` / `ValueType`：动态参数与返回值
//! - `Method`：按同一性比较的方法句柄
//! - `Class` / `ClassBuilder`：类型描述、继承与虚分派

pub mod class;
pub mod method;
pub mod value;

pub use class::{
    Class, ClassBuilder, ClassKind, Proxyable, ADVISED_CLASS_NAME, OBJECT_CLASS_NAME,
};
pub use method::{arg, Method, MethodInvoker};
pub use value::{
    object_address, same_object, short_type_name, FromValue, IntoValue, Object, Value, ValueType,
};
