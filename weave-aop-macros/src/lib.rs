//! Weave AOP 过程宏
//!
//! - `#[proxyable]` - 为 `impl` 块生成类型描述、注册信息和类型化的代理门面
//! - `#[proxy_final]` - 标记不可覆盖的方法（类代理不会拦截）

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemImpl};

mod proxyable;
mod utils;

/// `#[proxyable]` 属性宏
///
/// 作用在非泛型类型的固有 `impl` 块上。每个带 `&self` 的 `pub fn` 都成为类的方法，
/// 同时生成 `<Type>Proxy` 门面，门面方法通过代理分派并返回 `Result<T, InvocationError>`。
///
/// 使用示例：
/// ```ignore
/// use weave_aop_macros::{proxyable, proxy_final};
///
/// pub struct Account { /* ... */ }
///
/// #[proxyable]
/// impl Account {
///     pub fn balance(&self) -> i64 { /* ... */ }
///
///     pub fn withdraw(&self, amount: i64) -> Result<i64, InsufficientFunds> { /* ... */ }
///
///     #[proxy_final]
///     pub fn id(&self) -> String { /* ... */ }
/// }
///
/// let proxy = AccountProxy::new(ProxyFactory::for_target(account).get_proxy()?);
/// let balance = proxy.withdraw(10)?;
/// ```
///
/// 可以用 `#[proxyable(name = "Ledger")]` 指定类名，默认取类型名。
#[proc_macro_attribute]
pub fn proxyable(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as proxyable::ProxyableArgs);
    let item_impl = parse_macro_input!(item as ItemImpl);

    proxyable::impl_proxyable(args, item_impl)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// `#[proxy_final]` 属性宏
///
/// 在 `#[proxyable]` 块里由外层宏处理；单独使用时原样返回
#[proc_macro_attribute]
pub fn proxy_final(_attr: TokenStream, item: TokenStream) -> TokenStream {
    item
}
