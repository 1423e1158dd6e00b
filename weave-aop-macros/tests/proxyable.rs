use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weave_aop::{
    Advice, Class, InvocationError, NameMatchMethodPointcut, Object, ProxyFactory, ProxyKind,
    Proxyable, Value, ValueType,
};
use weave_aop_macros::{proxy_final, proxyable};

#[derive(Debug, thiserror::Error)]
#[error("insufficient funds: balance {balance}, requested {requested}")]
struct InsufficientFunds {
    balance: i64,
    requested: i64,
}

pub struct Account {
    owner: String,
    balance: Mutex<i64>,
}

#[proxyable]
impl Account {
    pub fn new(owner: &str, balance: i64) -> Self {
        Self {
            owner: owner.to_string(),
            balance: Mutex::new(balance),
        }
    }

    pub fn balance(&self) -> i64 {
        *self.balance.lock()
    }

    pub fn deposit(&self, amount: i64) -> i64 {
        let mut balance = self.balance.lock();
        *balance += amount;
        *balance
    }

    pub fn withdraw(&self, amount: i64) -> Result<i64, InsufficientFunds> {
        let mut balance = self.balance.lock();
        if amount > *balance {
            return Err(InsufficientFunds {
                balance: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        Ok(*balance)
    }

    pub fn greeting(&self, visitor: &str) -> String {
        format!("{} welcomes {}", self.owner, visitor)
    }

    pub fn reset(&self) {
        *self.balance.lock() = 0;
    }

    #[proxy_final]
    pub fn owner(&self) -> String {
        self.owner.clone()
    }

    fn audit(&self) -> usize {
        self.owner.len()
    }
}

pub struct Counter {
    hits: AtomicUsize,
}

#[proxyable(name = "HitCounter")]
impl Counter {
    pub fn hit(&self) -> u64 {
        self.hits.fetch_add(1, Ordering::SeqCst) as u64 + 1
    }
}

fn account(balance: i64) -> Object {
    Arc::new(Account::new("ann", balance))
}

/// 记录经过环绕通知的方法名
fn recording_factory(target: Object) -> (ProxyFactory, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&calls);
    let factory = ProxyFactory::for_target(target);
    factory
        .add_advice(Advice::around_fn(move |mi| {
            recorded.lock().push(mi.method().name().to_string());
            mi.proceed()
        }))
        .unwrap();
    (factory, calls)
}

#[test]
fn test_class_descriptor() {
    let class = Account::class();
    assert_eq!(class.name(), "Account");

    let withdraw = class.find_method("withdraw").unwrap();
    assert_eq!(withdraw.param_types(), &[ValueType::Int]);
    assert_eq!(withdraw.return_type(), &ValueType::Int);

    assert_eq!(class.find_method("greeting").unwrap().param_types(), &[ValueType::Str]);
    assert!(class.find_method("reset").unwrap().return_type().is_void());
    assert!(class.find_method("owner").unwrap().is_final());
    assert!(!withdraw.is_final());

    // 没有 &self 的函数和私有方法不进入类型描述
    assert!(class.find_method("new").is_none());
    assert!(class.find_method("audit").is_none());
    assert_eq!(Account::new("bob", 0).audit(), 3);
}

#[test]
fn test_registered_for_runtime_lookup() {
    let object = account(10);
    assert_eq!(Class::of(&object), Some(Account::class()));

    let counter: Object = Arc::new(Counter {
        hits: AtomicUsize::new(0),
    });
    assert_eq!(Class::of(&counter).map(|c| c.name().to_string()), Some("HitCounter".to_string()));
}

#[test]
fn test_facade_dispatches_through_advice() {
    let (factory, calls) = recording_factory(account(100));
    let proxy = AccountProxy::from_factory(&factory).unwrap();

    assert_eq!(proxy.proxy().kind(), ProxyKind::Class);
    assert_eq!(proxy.deposit(5).unwrap(), 105);
    assert_eq!(proxy.withdraw(5).unwrap(), 100);
    assert_eq!(proxy.greeting("bob").unwrap(), "ann welcomes bob");
    proxy.reset().unwrap();
    assert_eq!(proxy.balance().unwrap(), 0);

    assert_eq!(*calls.lock(), ["deposit", "withdraw", "greeting", "reset", "balance"]);
}

#[test]
fn test_error_is_carried_untouched() {
    let (factory, _) = recording_factory(account(10));
    let proxy = AccountProxy::from_factory(&factory).unwrap();

    let err = proxy.withdraw(50).unwrap_err();
    let funds = err.downcast_thrown::<InsufficientFunds>().unwrap();
    assert_eq!(funds.balance, 10);
    assert_eq!(funds.requested, 50);
    assert!(!err.is_infrastructure());
}

#[test]
fn test_final_method_is_not_advised() {
    let (factory, calls) = recording_factory(account(10));
    let proxy = AccountProxy::from_factory(&factory).unwrap();

    assert_eq!(proxy.owner().unwrap(), "ann");
    assert!(calls.lock().is_empty());
}

#[test]
fn test_return_type_mismatch() {
    let factory = ProxyFactory::for_target(account(10));
    factory
        .add_advisor(weave_aop::Advisor::with_pointcut(
            Arc::new(NameMatchMethodPointcut::with_names(["balance"])),
            Advice::around_fn(|_| Ok(Value::from("not a number"))),
        ))
        .unwrap();
    let proxy = AccountProxy::from_factory(&factory).unwrap();

    let err = proxy.balance().unwrap_err();
    assert!(matches!(err, InvocationError::TypeMismatch { .. }));
}

#[test]
fn test_facade_from_object() {
    let (factory, _) = recording_factory(account(1));
    let object = factory.get_proxy().unwrap().as_object();
    let proxy = AccountProxy::from_object(&object).unwrap();
    assert_eq!(proxy.balance().unwrap(), 1);

    assert!(AccountProxy::from_object(&account(1)).is_none());
}

#[test]
fn test_proxy_final_alone_is_noop() {
    struct Plain;
    impl Plain {
        #[proxy_final]
        fn value(&self) -> i32 {
            7
        }
    }
    assert_eq!(Plain.value(), 7);
}
