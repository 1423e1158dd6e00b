//! 测试用的类型与通知

use crate::advice::Advice;
use crate::error::InvocationError;
use crate::reflect::{arg, Class, ClassBuilder, Method, Object, Value, ValueType};
use crate::registry::get_class_registry;
use crate::target_source::TargetSource;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct Person {
    pub name: String,
}

pub struct StampMixin {
    pub value: String,
}

static GREETER: Lazy<Class> = Lazy::new(|| {
    ClassBuilder::interface("Greeter")
        .abstract_method("greet", vec![ValueType::Str], ValueType::Str)
        .abstract_method("fail", vec![], ValueType::Str)
        .abstract_method("echo_self", vec![], ValueType::named("Greeter"))
        .abstract_method("lucky_number", vec![], ValueType::Int)
        .build()
});

static PERSON: Lazy<Class> = Lazy::new(|| {
    let class = ClassBuilder::<Person>::new("Person")
        .implements(&GREETER)
        .method("greet", vec![ValueType::Str], ValueType::Str, |p: &Person, args| {
            let other: String = arg(args, 0, "Person::greet")?;
            Ok(Value::Str(format!("{} greets {}", p.name, other)))
        })
        .method("fail", vec![], ValueType::Str, |_: &Person, _| {
            Err(InvocationError::msg("greeting failed"))
        })
        .method_raw("echo_self", vec![], ValueType::named("Greeter"), |this, _| {
            Ok(Value::Object(Arc::clone(this)))
        })
        .method("lucky_number", vec![], ValueType::Int, |_: &Person, _| Ok(Value::Null))
        .final_method("name", vec![], ValueType::Str, |p: &Person, _| {
            Ok(Value::Str(p.name.clone()))
        })
        .build();
    get_class_registry().register(class.clone());
    class
});

static STAMP: Lazy<Class> = Lazy::new(|| {
    ClassBuilder::interface("Stamp")
        .abstract_method("stamp", vec![], ValueType::Str)
        .build()
});

static STAMPED: Lazy<Class> = Lazy::new(|| {
    let class = ClassBuilder::<StampMixin>::new("Stamped")
        .implements(&STAMP)
        .method("stamp", vec![], ValueType::Str, |s: &StampMixin, _| {
            Ok(Value::Str(s.value.clone()))
        })
        .build();
    get_class_registry().register(class.clone());
    class
});

pub fn greeter_class() -> Class {
    GREETER.clone()
}

/// 同名调用返回同一个方法句柄
pub fn greeter_method(name: &str) -> Method {
    GREETER.find_declared_method(name).unwrap()
}

pub fn person_class() -> Class {
    PERSON.clone()
}

pub fn person(name: &str) -> Object {
    Lazy::force(&PERSON);
    Arc::new(Person {
        name: name.to_string(),
    })
}

pub fn stamp_class() -> Class {
    STAMP.clone()
}

pub fn stamped_class() -> Class {
    STAMPED.clone()
}

pub fn stamp(value: &str) -> Object {
    Lazy::force(&STAMPED);
    Arc::new(StampMixin {
        value: value.to_string(),
    })
}

/// 按执行顺序记录事件的通知
#[derive(Clone, Default)]
pub struct RecordingAdvice {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingAdvice {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: String) {
        self.events.lock().push(event);
    }

    pub fn before(&self, label: &str) -> Advice {
        let this = self.clone();
        let event = format!("{}-before", label);
        Advice::before_fn(move |_| {
            this.record(event.clone());
            Ok(())
        })
    }

    pub fn around(&self, label: &str) -> Advice {
        let this = self.clone();
        let label = label.to_string();
        Advice::around_fn(move |mi| {
            this.record(format!("{}-before", label));
            let result = mi.proceed();
            this.record(format!("{}-after", label));
            result
        })
    }

    pub fn after_returning(&self, label: &str) -> Advice {
        let this = self.clone();
        let event = format!("{}-after", label);
        Advice::after_returning_fn(move |_, _| {
            this.record(event.clone());
            Ok(())
        })
    }

    pub fn after(&self, label: &str) -> Advice {
        let this = self.clone();
        let event = format!("{}-after", label);
        Advice::after_fn(move |_| {
            this.record(event.clone());
            Ok(())
        })
    }

    pub fn throws(&self, label: &str) -> Advice {
        let this = self.clone();
        let event = format!("{}-throws", label);
        Advice::after_throwing_fn(move |_, _| {
            this.record(event.clone());
            Ok(())
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// 每次取目标都新建一个 `Person`，并统计取用与归还次数
#[derive(Default)]
pub struct CountingTargetSource {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

impl CountingTargetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl TargetSource for CountingTargetSource {
    fn target_class(&self) -> Option<Class> {
        Some(person_class())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> anyhow::Result<Option<Object>> {
        let n = self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Some(person(&format!("worker-{}", n))))
    }

    fn release_target(&self, _target: &Object) -> anyhow::Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn TargetSource) -> bool {
        std::ptr::addr_eq(self as *const Self, other as *const dyn TargetSource)
    }

    fn hash_code(&self) -> u64 {
        self as *const Self as usize as u64
    }
}
