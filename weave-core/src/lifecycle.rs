//! 对象后置处理契约
//!
//! 代理引擎只消费容器的一小部分能力：在对象初始化之后替换它（通常是换成代理），
//! 以及在对象仍在创建时提供一个"提前引用"以打破循环引用。

use std::any::Any;
use std::sync::Arc;

/// 容器管理的对象
pub type Object = Arc<dyn Any + Send + Sync>;

/// BeanPostProcessor trait
///
/// 在对象初始化的前后提供钩子，允许替换对象实例（例如包装为 AOP 代理）。
pub trait BeanPostProcessor: Send + Sync {
    /// 在初始化回调之前调用
    fn post_process_before_initialization(
        &self,
        bean: Object,
        _bean_name: &str,
    ) -> anyhow::Result<Object> {
        Ok(bean)
    }

    /// 在初始化回调之后调用
    ///
    /// 返回的对象会替换原对象登记到容器中。
    fn post_process_after_initialization(
        &self,
        bean: Object,
        _bean_name: &str,
    ) -> anyhow::Result<Object> {
        Ok(bean)
    }

    /// 处理器名称（用于日志）
    fn name(&self) -> &str {
        "BeanPostProcessor"
    }

    /// 优先级（数字越小越先执行）
    fn order(&self) -> i32 {
        1000
    }
}

/// 支持提前引用的后置处理器
///
/// 当 A 依赖 B、B 又依赖仍在创建中的 A 时，容器会向 B 交出
/// `get_early_bean_reference` 的结果。自动代理在这里就返回代理，
/// 这样 B 拿到的引用与 A 最终登记的对象一致。
pub trait SmartInstantiationAwareBeanPostProcessor: BeanPostProcessor {
    /// 获取提前暴露的引用
    fn get_early_bean_reference(&self, bean: Object, _bean_name: &str) -> anyhow::Result<Object> {
        Ok(bean)
    }
}
