use anyhow::anyhow;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use weave_aop::prelude::*;
use weave_aop::{registered_aspect_advisors, HotSwappableTargetSource};
use weave_aop_macros::{proxy_final, proxyable};
use weave_core::{DefaultSingletonRegistry, LoggingConfig, WeaveProperties};

// ==================== 业务服务 ====================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("item '{0}' is out of stock")]
    OutOfStock(String),

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),
}

/// 订单服务
pub struct OrderService {
    id: String,
    stock: Mutex<HashMap<String, i64>>,
    orders: Mutex<Vec<String>>,
}

#[proxyable]
impl OrderService {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            stock: Mutex::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
        }
    }

    pub fn restock(&self, item: &str, quantity: i64) {
        *self.stock.lock().entry(item.to_string()).or_insert(0) += quantity;
    }

    pub fn place_order(&self, item: &str, quantity: i64) -> Result<String, OrderError> {
        if quantity <= 0 {
            return Err(OrderError::InvalidQuantity(quantity));
        }
        let mut stock = self.stock.lock();
        let available = stock.entry(item.to_string()).or_insert(0);
        if *available < quantity {
            return Err(OrderError::OutOfStock(item.to_string()));
        }
        *available -= quantity;

        let mut orders = self.orders.lock();
        let order_id = format!("{}-{}", self.id, orders.len() + 1);
        orders.push(order_id.clone());
        Ok(order_id)
    }

    pub fn order_count(&self) -> i64 {
        self.orders.lock().len() as i64
    }

    #[proxy_final]
    pub fn id(&self) -> String {
        self.id.clone()
    }
}

// ==================== 切面 ====================

/// 审计切面 - 记录下单和补货
struct AuditAspect;

impl Aspect for AuditAspect {
    fn name(&self) -> &str {
        "AuditAspect"
    }

    fn pointcut(&self) -> Arc<dyn Pointcut> {
        Arc::new(NameMatchMethodPointcut::with_names(["place_*", "restock"]))
    }

    fn order(&self) -> Option<i32> {
        Some(0)
    }

    fn before(&self, join_point: &JoinPoint<'_>) -> InvocationResult<()> {
        tracing::info!("[audit] {} args={:?}", join_point.signature(), join_point.args());
        Ok(())
    }

    fn after_throwing(&self, error: &InvocationError, join_point: &JoinPoint<'_>) {
        tracing::warn!("[audit] {} rejected: {}", join_point.signature(), error);
    }
}

fn audit_aspect() -> Arc<dyn Aspect> {
    Arc::new(AuditAspect)
}

weave_aop::inventory::submit! {
    AspectRegistration::new("AuditAspect", audit_aspect)
}

// ==================== 主程序 ====================

fn load_properties() -> anyhow::Result<WeaveProperties> {
    let candidates = ["demos/aop-demo/weave.toml", "weave.toml"];
    let props = match candidates.iter().find(|path| Path::new(path).exists()) {
        Some(path) => WeaveProperties::from_file(path)?,
        None => WeaveProperties::default(),
    };
    Ok(props.apply_env())
}

fn main() -> anyhow::Result<()> {
    let props = load_properties()?;
    LoggingConfig::from(&props.logging).init()?;

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║     Weave - Advice Chain Proxy Demo                ║");
    println!("╚════════════════════════════════════════════════════╝\n");

    // 候选 advisor：注册的切面 + 常用通知
    let mut advisors = registered_aspect_advisors();
    advisors.push(Advisor::Pointcut(Arc::new(
        DefaultPointcutAdvisor::new(Advice::around(TraceInterceptor::new().with_args())).with_order(10),
    )));
    advisors.push(Advisor::always(Advice::around(PerformanceMonitorInterceptor::new(
        Duration::from_millis(50),
    ))));
    advisors.push(Advisor::always(Advice::after_throwing(ExceptionLoggingAdvice::new())));

    let creator = Arc::new(AutoProxyCreator::from_properties(advisors, &props.aop));
    let registry = DefaultSingletonRegistry::new();
    registry.add_post_processor(creator);

    let bean = registry.get_or_create(
        "orderService",
        || Ok(Arc::new(OrderService::new("order")) as Object),
        |_, _| Ok(()),
    )?;
    let service = OrderServiceProxy::from_object(&bean)
        .ok_or_else(|| anyhow!("orderService was not proxied"))?;

    println!("🛒 Placing orders through {}", service.proxy());
    service.restock("book", 3)?;
    println!("   Order placed: {}", service.place_order("book", 2)?);

    match service.place_order("book", 5) {
        Ok(id) => println!("   Unexpected order: {}", id),
        Err(e) if matches!(e.downcast_thrown::<OrderError>(), Some(OrderError::OutOfStock(_))) => {
            println!("   Rejected: {}", e)
        }
        Err(e) => return Err(e.into()),
    }

    println!("   Orders placed: {}", service.order_count()?);
    println!("   Service id (final, not advised): {}", service.id()?);
    if let Some(advised) = service.proxy().advised() {
        println!("   Proxy config: {}", advised.to_proxy_config_string());
    }

    // 编程方式：热替换目标
    println!("\n🔁 Hot-swapping the target behind a proxy");
    let swappable = Arc::new(HotSwappableTargetSource::new(Arc::new(OrderService::new("primary"))));
    let factory = ProxyFactory::for_target_source(swappable.clone());
    factory.add_advice(Advice::around(RetryInterceptor::new(3)))?;
    let swapped = OrderServiceProxy::from_factory(&factory)?;

    println!("   Before swap: {}", swapped.id()?);
    swappable.swap(Arc::new(OrderService::new("standby")));
    println!("   After swap:  {}", swapped.id()?);

    println!("\n✅ Demo complete");
    Ok(())
}
