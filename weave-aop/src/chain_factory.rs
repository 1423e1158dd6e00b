//! 调用链解析
//!
//! 按 advisor 的登记顺序逐个判断是否适用于 (方法, 运行时类型)，
//! 把适用的通知展开成拦截器。动态匹配器暂不判断，留到每次调用时再看参数。

use crate::adapter::get_adapter_registry;
use crate::advice::MethodInterceptor;
use crate::advised::AdvisedSupport;
use crate::advisor::Advisor;
use crate::error::{InvocationError, InvocationResult};
use crate::pointcut::{MethodMatcher, PointcutMethodMatcher};
use crate::reflect::{Class, Method};
use std::fmt;
use std::sync::Arc;

/// 调用链中的一格
#[derive(Clone)]
pub enum ChainElement {
    /// 已确定适用的拦截器
    Interceptor(Arc<dyn MethodInterceptor>),
    /// 调用时用参数判断是否执行
    Dynamic {
        interceptor: Arc<dyn MethodInterceptor>,
        matcher: Arc<dyn MethodMatcher>,
    },
}

impl ChainElement {
    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        match self {
            ChainElement::Interceptor(i) => i,
            ChainElement::Dynamic { interceptor, .. } => interceptor,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ChainElement::Dynamic { .. })
    }
}

impl fmt::Debug for ChainElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainElement::Interceptor(i) => write!(f, "Interceptor({})", i.type_name()),
            ChainElement::Dynamic { interceptor, .. } => {
                write!(f, "Dynamic({})", interceptor.type_name())
            }
        }
    }
}

/// 调用链工厂
pub trait AdvisorChainFactory: Send + Sync {
    /// 解析 `method` 在 `target_class` 上的调用链
    fn get_interceptors_and_dynamic_interception_advice(
        &self,
        config: &AdvisedSupport,
        method: &Method,
        target_class: Option<&Class>,
    ) -> InvocationResult<Vec<ChainElement>>;
}

/// 默认的调用链工厂
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAdvisorChainFactory;

impl AdvisorChainFactory for DefaultAdvisorChainFactory {
    fn get_interceptors_and_dynamic_interception_advice(
        &self,
        config: &AdvisedSupport,
        method: &Method,
        target_class: Option<&Class>,
    ) -> InvocationResult<Vec<ChainElement>> {
        let registry = get_adapter_registry();
        let advisors = config.advisor_snapshot();
        let interfaces = config.interface_snapshot();
        let pre_filtered = config.is_pre_filtered();

        // 没有目标类型时用声明该方法的代理接口
        let actual_class = target_class
            .cloned()
            .or_else(|| {
                interfaces
                    .iter()
                    .find(|i| i.name() == method.declaring_type())
                    .cloned()
            })
            .unwrap_or_else(Class::object);

        let mut has_introductions: Option<bool> = None;
        let mut chain = Vec::with_capacity(advisors.len());

        for advisor in advisors.iter() {
            match advisor {
                Advisor::Pointcut(pa) => {
                    let pointcut = pa.pointcut();
                    if !pre_filtered && !pointcut.class_filter().matches(&actual_class) {
                        continue;
                    }
                    let mm = pointcut.method_matcher();
                    let introductions = *has_introductions
                        .get_or_insert_with(|| has_matching_introductions(&advisors, &actual_class));
                    if !mm.matches_with_introductions(method, &actual_class, introductions) {
                        continue;
                    }

                    let interceptors = registry
                        .get_interceptors(advisor)
                        .map_err(|e| InvocationError::infrastructure(method.signature(), e))?;
                    if mm.is_runtime() {
                        let matcher: Arc<dyn MethodMatcher> =
                            Arc::new(PointcutMethodMatcher(Arc::clone(pointcut)));
                        chain.extend(interceptors.into_iter().map(|interceptor| {
                            ChainElement::Dynamic {
                                interceptor,
                                matcher: Arc::clone(&matcher),
                            }
                        }));
                    } else {
                        chain.extend(interceptors.into_iter().map(ChainElement::Interceptor));
                    }
                }
                Advisor::Introduction(ia) => {
                    // 引入的接口必须真的出现在代理上
                    let introduced = ia
                        .interfaces()
                        .iter()
                        .all(|i| interfaces.contains(i) || actual_class.is_assignable_to(i));
                    if !introduced {
                        continue;
                    }
                    if pre_filtered || ia.class_filter().matches(&actual_class) {
                        let interceptors = registry
                            .get_interceptors(advisor)
                            .map_err(|e| InvocationError::infrastructure(method.signature(), e))?;
                        chain.extend(interceptors.into_iter().map(ChainElement::Interceptor));
                    }
                }
            }
        }

        tracing::trace!(
            "Resolved chain for {} on {}: {} element(s)",
            method.name(),
            actual_class.name(),
            chain.len()
        );
        Ok(chain)
    }
}

/// 是否有适用于该类型的引入 advisor
fn has_matching_introductions(advisors: &[Advisor], actual_class: &Class) -> bool {
    advisors.iter().any(|advisor| match advisor {
        Advisor::Introduction(ia) => ia.class_filter().matches(actual_class),
        Advisor::Pointcut(_) => false,
    })
}
