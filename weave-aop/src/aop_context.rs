//! 当前代理
//!
//! 目标方法内部调用自己的其他方法时不会经过代理。
//! 配置了 `expose_proxy` 的代理在调用期间把自己放进线程局部变量，
//! 目标可以通过 [`AopContext::current_proxy`] 拿到代理再调用。

use crate::error::{InvocationError, InvocationResult};
use crate::reflect::Object;
use std::cell::RefCell;

thread_local! {
    static CURRENT_PROXY: RefCell<Option<Object>> = const { RefCell::new(None) };
}

/// 访问当前调用的代理
pub struct AopContext;

impl AopContext {
    /// 当前代理；没有暴露时是 `IllegalState` 错误
    pub fn current_proxy() -> InvocationResult<Object> {
        CURRENT_PROXY
            .with(|current| current.borrow().clone())
            .ok_or_else(|| {
                InvocationError::IllegalState(
                    "cannot find current proxy: set 'expose_proxy' to true to make it available, \
                     and ensure the call is made on the thread that invoked the proxy"
                        .to_string(),
                )
            })
    }

    /// 当前线程是否有暴露的代理
    pub fn has_current_proxy() -> bool {
        CURRENT_PROXY.with(|current| current.borrow().is_some())
    }

    /// 暴露 `proxy`，守卫析构时恢复原来的值（包括 panic 展开时）
    pub fn expose(proxy: Object) -> CurrentProxyGuard {
        let previous = CURRENT_PROXY.with(|current| current.replace(Some(proxy)));
        CurrentProxyGuard { previous }
    }
}

/// 恢复上一个当前代理
#[must_use = "the proxy is only exposed while the guard is alive"]
pub struct CurrentProxyGuard {
    previous: Option<Object>,
}

impl Drop for CurrentProxyGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_PROXY.with(|current| {
            *current.borrow_mut() = previous;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::same_object;
    use std::panic::AssertUnwindSafe;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_not_exposed_is_illegal_state() {
        assert!(matches!(
            AopContext::current_proxy(),
            Err(InvocationError::IllegalState(_))
        ));
    }

    #[test]
    fn test_nested_guards_restore_previous() {
        let outer: Object = Arc::new("outer");
        let inner: Object = Arc::new("inner");
        {
            let _outer = AopContext::expose(Arc::clone(&outer));
            {
                let _inner = AopContext::expose(Arc::clone(&inner));
                assert!(same_object(&AopContext::current_proxy().unwrap(), &inner));
            }
            assert!(same_object(&AopContext::current_proxy().unwrap(), &outer));
        }
        assert!(!AopContext::has_current_proxy());
    }

    #[test]
    fn test_restored_after_panic() {
        let proxy: Object = Arc::new(1_i64);
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = AopContext::expose(Arc::clone(&proxy));
            panic!("advice blew up");
        }));
        assert!(result.is_err());
        assert!(!AopContext::has_current_proxy());
    }

    #[test]
    fn test_threads_do_not_share_current_proxy() {
        let proxy: Object = Arc::new("main");
        let _guard = AopContext::expose(proxy);
        thread::spawn(|| assert!(!AopContext::has_current_proxy()))
            .join()
            .unwrap();
        assert!(AopContext::has_current_proxy());
    }
}
