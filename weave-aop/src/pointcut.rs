//! 切点（Pointcut）
//!
//! 切点 = 类过滤器 + 方法匹配器。方法匹配器分两种：
//! - 静态：只看方法签名和类型，结果会随调用链一起缓存
//! - 动态（`is_runtime() == true`）：每次调用都要用实际参数重新判断
//!
//! 代理相等性会比较切点，所以内置切点都实现了按值比较的 `equals`。

use crate::reflect::{Class, Method, Value};
use regex::Regex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 类过滤器
pub trait ClassFilter: Send + Sync + 'static {
    fn matches(&self, class: &Class) -> bool;

    fn as_any(&self) -> &dyn Any;

    /// 默认按实例比较
    fn equals(&self, other: &dyn ClassFilter) -> bool {
        std::ptr::addr_eq(self.as_any(), other.as_any())
    }
}

/// 方法匹配器
pub trait MethodMatcher: Send + Sync + 'static {
    /// 静态匹配
    fn matches(&self, method: &Method, target_class: &Class) -> bool;

    /// 是否需要在每次调用时用参数再判断
    fn is_runtime(&self) -> bool {
        false
    }

    /// 动态匹配，只在静态匹配通过且 `is_runtime()` 为真时调用
    fn matches_with_args(&self, method: &Method, target_class: &Class, _args: &[Value]) -> bool {
        self.matches(method, target_class)
    }

    /// 考虑引入的接口
    fn matches_with_introductions(
        &self,
        method: &Method,
        target_class: &Class,
        _has_introductions: bool,
    ) -> bool {
        self.matches(method, target_class)
    }

    fn as_any(&self) -> &dyn Any;

    fn equals(&self, other: &dyn MethodMatcher) -> bool {
        std::ptr::addr_eq(self.as_any(), other.as_any())
    }
}

/// 切点
pub trait Pointcut: Send + Sync + 'static {
    fn class_filter(&self) -> &dyn ClassFilter;

    fn method_matcher(&self) -> &dyn MethodMatcher;

    fn as_any(&self) -> &dyn Any;

    fn equals(&self, other: &dyn Pointcut) -> bool {
        std::ptr::addr_eq(self.as_any(), other.as_any())
    }

    /// 用于日志
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

// ============================================================================
// 匹配一切
// ============================================================================

/// 匹配所有类型
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueClassFilter;

impl ClassFilter for TrueClassFilter {
    fn matches(&self, _class: &Class) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn ClassFilter) -> bool {
        other.as_any().is::<TrueClassFilter>()
    }
}

/// 匹配所有方法
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueMethodMatcher;

impl MethodMatcher for TrueMethodMatcher {
    fn matches(&self, _method: &Method, _target_class: &Class) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn MethodMatcher) -> bool {
        other.as_any().is::<TrueMethodMatcher>()
    }
}

/// 匹配所有连接点
#[derive(Debug, Clone, Copy, Default)]
pub struct TruePointcut;

impl Pointcut for TruePointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        &TrueClassFilter
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        &TrueMethodMatcher
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Pointcut) -> bool {
        other.as_any().is::<TruePointcut>()
    }

    fn describe(&self) -> String {
        "TruePointcut".to_string()
    }
}

// ============================================================================
// 类过滤器
// ============================================================================

/// 匹配可赋值给 `root` 的类型
#[derive(Debug, Clone)]
pub struct RootClassFilter {
    root: Class,
}

impl RootClassFilter {
    pub fn new(root: &Class) -> Self {
        Self { root: root.clone() }
    }
}

impl ClassFilter for RootClassFilter {
    fn matches(&self, class: &Class) -> bool {
        class.is_assignable_to(&self.root)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn ClassFilter) -> bool {
        other
            .as_any()
            .downcast_ref::<RootClassFilter>()
            .is_some_and(|o| o.root == self.root)
    }
}

/// 按类型名模式匹配
///
/// 例如：`TypePatternClassFilter::new("*Service")`
#[derive(Debug, Clone)]
pub struct TypePatternClassFilter {
    pattern: NamePattern,
}

impl TypePatternClassFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: NamePattern::new(pattern),
        }
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl ClassFilter for TypePatternClassFilter {
    fn matches(&self, class: &Class) -> bool {
        self.pattern.matches(class.name())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn ClassFilter) -> bool {
        other
            .as_any()
            .downcast_ref::<TypePatternClassFilter>()
            .is_some_and(|o| o.pattern == self.pattern)
    }
}

/// 预编译的名字模式（支持 * 通配符）
///
/// 支持的模式：
/// - `*` - 匹配任意字符串
/// - `get*` - 以 get 开头
/// - `*Service` - 以 Service 结尾
/// - `*Service*` - 包含 Service
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Any,
    Exact,
    Wildcard(Regex),
    Never,
}

impl NamePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let source = pattern.into();
        let kind = if source == "*" {
            PatternKind::Any
        } else if !source.contains('*') {
            PatternKind::Exact
        } else {
            let regex_pattern = source
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            match Regex::new(&format!("^{}$", regex_pattern)) {
                Ok(regex) => PatternKind::Wildcard(regex),
                Err(e) => {
                    tracing::warn!("Invalid name pattern '{}': {}", source, e);
                    PatternKind::Never
                }
            }
        };
        Self { source, kind }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, target: &str) -> bool {
        match &self.kind {
            PatternKind::Any => true,
            PatternKind::Exact => self.source == target,
            PatternKind::Wildcard(regex) => regex.is_match(target),
            PatternKind::Never => false,
        }
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for NamePattern {}

/// 一次性匹配；反复使用同一模式时用 `NamePattern`
pub fn pattern_matches(pattern: &str, target: &str) -> bool {
    NamePattern::new(pattern).matches(target)
}

// ============================================================================
// 方法切点
// ============================================================================

/// 按方法名匹配（支持 * 通配符）
#[derive(Debug, Clone, Default)]
pub struct NameMatchMethodPointcut {
    mapped_names: Vec<NamePattern>,
}

impl NameMatchMethodPointcut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mapped_names: names.into_iter().map(NamePattern::new).collect(),
        }
    }

    pub fn add_method_name(mut self, name: impl Into<String>) -> Self {
        self.mapped_names.push(NamePattern::new(name));
        self
    }

    pub fn mapped_names(&self) -> Vec<&str> {
        self.mapped_names.iter().map(NamePattern::as_str).collect()
    }
}

impl MethodMatcher for NameMatchMethodPointcut {
    fn matches(&self, method: &Method, _target_class: &Class) -> bool {
        self.mapped_names
            .iter()
            .any(|pattern| pattern.matches(method.name()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn MethodMatcher) -> bool {
        other
            .as_any()
            .downcast_ref::<NameMatchMethodPointcut>()
            .is_some_and(|o| o.mapped_names == self.mapped_names)
    }
}

impl Pointcut for NameMatchMethodPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        &TrueClassFilter
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Pointcut) -> bool {
        other
            .as_any()
            .downcast_ref::<NameMatchMethodPointcut>()
            .is_some_and(|o| o.mapped_names == self.mapped_names)
    }

    fn describe(&self) -> String {
        format!("NameMatchMethodPointcut({})", self.mapped_names().join(", "))
    }
}

/// 用正则表达式匹配 `类型::方法`
///
/// 目标类型名和方法声明类型名都会被尝试
#[derive(Debug, Clone)]
pub struct RegexpMethodPointcut {
    patterns: Vec<Regex>,
    excluded: Vec<Regex>,
}

impl RegexpMethodPointcut {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            patterns: compile(patterns)?,
            excluded: Vec::new(),
        })
    }

    /// 排除匹配这些模式的方法
    pub fn exclude<I, S>(mut self, patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded = compile(patterns)?;
        Ok(self)
    }

    fn candidates(method: &Method, target_class: &Class) -> [String; 2] {
        [
            format!("{}::{}", target_class.name(), method.name()),
            format!("{}::{}", method.declaring_type(), method.name()),
        ]
    }

    fn sources(regexes: &[Regex]) -> Vec<&str> {
        regexes.iter().map(Regex::as_str).collect()
    }
}

fn compile<I, S>(patterns: I) -> Result<Vec<Regex>, regex::Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|p| Regex::new(p.as_ref()))
        .collect()
}

impl MethodMatcher for RegexpMethodPointcut {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        let candidates = Self::candidates(method, target_class);
        let included = candidates
            .iter()
            .any(|c| self.patterns.iter().any(|p| p.is_match(c)));
        included
            && !candidates
                .iter()
                .any(|c| self.excluded.iter().any(|p| p.is_match(c)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn MethodMatcher) -> bool {
        other
            .as_any()
            .downcast_ref::<RegexpMethodPointcut>()
            .is_some_and(|o| {
                Self::sources(&o.patterns) == Self::sources(&self.patterns)
                    && Self::sources(&o.excluded) == Self::sources(&self.excluded)
            })
    }
}

impl Pointcut for RegexpMethodPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        &TrueClassFilter
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Pointcut) -> bool {
        MethodMatcher::equals(self, other.method_matcher())
    }

    fn describe(&self) -> String {
        format!("RegexpMethodPointcut({})", Self::sources(&self.patterns).join(", "))
    }
}

type StaticMatchFn = dyn Fn(&Method, &Class) -> bool + Send + Sync;
type DynamicMatchFn = dyn Fn(&Method, &Class, &[Value]) -> bool + Send + Sync;

/// 由闭包定义的静态切点
pub struct StaticMethodMatcherPointcut {
    class_filter: Arc<dyn ClassFilter>,
    matcher: Arc<StaticMatchFn>,
}

impl StaticMethodMatcherPointcut {
    pub fn new<F>(matcher: F) -> Self
    where
        F: Fn(&Method, &Class) -> bool + Send + Sync + 'static,
    {
        Self {
            class_filter: Arc::new(TrueClassFilter),
            matcher: Arc::new(matcher),
        }
    }

    pub fn with_class_filter(mut self, class_filter: impl ClassFilter) -> Self {
        self.class_filter = Arc::new(class_filter);
        self
    }
}

impl MethodMatcher for StaticMethodMatcherPointcut {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        (self.matcher)(method, target_class)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Pointcut for StaticMethodMatcherPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self.class_filter.as_ref()
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 由闭包定义的动态切点，每次调用都用参数判断
pub struct DynamicMethodMatcherPointcut {
    class_filter: Arc<dyn ClassFilter>,
    static_check: Option<Arc<StaticMatchFn>>,
    matcher: Arc<DynamicMatchFn>,
}

impl DynamicMethodMatcherPointcut {
    pub fn new<F>(matcher: F) -> Self
    where
        F: Fn(&Method, &Class, &[Value]) -> bool + Send + Sync + 'static,
    {
        Self {
            class_filter: Arc::new(TrueClassFilter),
            static_check: None,
            matcher: Arc::new(matcher),
        }
    }

    /// 先用签名做一次静态筛选
    pub fn with_static_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Method, &Class) -> bool + Send + Sync + 'static,
    {
        self.static_check = Some(Arc::new(check));
        self
    }

    pub fn with_class_filter(mut self, class_filter: impl ClassFilter) -> Self {
        self.class_filter = Arc::new(class_filter);
        self
    }
}

impl MethodMatcher for DynamicMethodMatcherPointcut {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        self.static_check
            .as_ref()
            .map_or(true, |check| check(method, target_class))
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_with_args(&self, method: &Method, target_class: &Class, args: &[Value]) -> bool {
        (self.matcher)(method, target_class, args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Pointcut for DynamicMethodMatcherPointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self.class_filter.as_ref()
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// 组合
// ============================================================================

/// 把切点当作类过滤器使用
#[derive(Clone)]
pub struct PointcutClassFilter(pub Arc<dyn Pointcut>);

impl ClassFilter for PointcutClassFilter {
    fn matches(&self, class: &Class) -> bool {
        self.0.class_filter().matches(class)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn ClassFilter) -> bool {
        other
            .as_any()
            .downcast_ref::<PointcutClassFilter>()
            .is_some_and(|o| o.0.equals(self.0.as_ref()))
    }
}

/// 把切点当作方法匹配器使用
#[derive(Clone)]
pub struct PointcutMethodMatcher(pub Arc<dyn Pointcut>);

impl MethodMatcher for PointcutMethodMatcher {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        self.0.method_matcher().matches(method, target_class)
    }

    fn is_runtime(&self) -> bool {
        self.0.method_matcher().is_runtime()
    }

    fn matches_with_args(&self, method: &Method, target_class: &Class, args: &[Value]) -> bool {
        self.0
            .method_matcher()
            .matches_with_args(method, target_class, args)
    }

    fn matches_with_introductions(
        &self,
        method: &Method,
        target_class: &Class,
        has_introductions: bool,
    ) -> bool {
        self.0
            .method_matcher()
            .matches_with_introductions(method, target_class, has_introductions)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn MethodMatcher) -> bool {
        other
            .as_any()
            .downcast_ref::<PointcutMethodMatcher>()
            .is_some_and(|o| o.0.equals(self.0.as_ref()))
    }
}

enum ClassFilterOp {
    Union(Arc<dyn ClassFilter>, Arc<dyn ClassFilter>),
    Intersection(Arc<dyn ClassFilter>, Arc<dyn ClassFilter>),
    Negate(Arc<dyn ClassFilter>),
}

/// 组合类过滤器
pub struct ComposedClassFilter(ClassFilterOp);

impl ClassFilter for ComposedClassFilter {
    fn matches(&self, class: &Class) -> bool {
        match &self.0 {
            ClassFilterOp::Union(a, b) => a.matches(class) || b.matches(class),
            ClassFilterOp::Intersection(a, b) => a.matches(class) && b.matches(class),
            ClassFilterOp::Negate(a) => !a.matches(class),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn ClassFilter) -> bool {
        let Some(other) = other.as_any().downcast_ref::<ComposedClassFilter>() else {
            return false;
        };
        match (&self.0, &other.0) {
            (ClassFilterOp::Union(a1, b1), ClassFilterOp::Union(a2, b2))
            | (ClassFilterOp::Intersection(a1, b1), ClassFilterOp::Intersection(a2, b2)) => {
                a1.equals(a2.as_ref()) && b1.equals(b2.as_ref())
            }
            (ClassFilterOp::Negate(a1), ClassFilterOp::Negate(a2)) => a1.equals(a2.as_ref()),
            _ => false,
        }
    }
}

enum MethodMatcherOp {
    Union(Arc<dyn MethodMatcher>, Arc<dyn MethodMatcher>),
    Intersection(Arc<dyn MethodMatcher>, Arc<dyn MethodMatcher>),
    Negate(Arc<dyn MethodMatcher>),
}

/// 组合方法匹配器
pub struct ComposedMethodMatcher(MethodMatcherOp);

impl MethodMatcher for ComposedMethodMatcher {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        match &self.0 {
            MethodMatcherOp::Union(a, b) => {
                a.matches(method, target_class) || b.matches(method, target_class)
            }
            MethodMatcherOp::Intersection(a, b) => {
                a.matches(method, target_class) && b.matches(method, target_class)
            }
            MethodMatcherOp::Negate(a) => !a.matches(method, target_class),
        }
    }

    fn is_runtime(&self) -> bool {
        match &self.0 {
            MethodMatcherOp::Union(a, b) | MethodMatcherOp::Intersection(a, b) => {
                a.is_runtime() || b.is_runtime()
            }
            MethodMatcherOp::Negate(a) => a.is_runtime(),
        }
    }

    fn matches_with_args(&self, method: &Method, target_class: &Class, args: &[Value]) -> bool {
        // 静态的一侧不能再用参数调用，只看它的静态结果
        let dynamic = |m: &Arc<dyn MethodMatcher>| {
            if m.is_runtime() {
                m.matches(method, target_class) && m.matches_with_args(method, target_class, args)
            } else {
                m.matches(method, target_class)
            }
        };
        match &self.0 {
            MethodMatcherOp::Union(a, b) => dynamic(a) || dynamic(b),
            MethodMatcherOp::Intersection(a, b) => dynamic(a) && dynamic(b),
            MethodMatcherOp::Negate(a) => !dynamic(a),
        }
    }

    fn matches_with_introductions(
        &self,
        method: &Method,
        target_class: &Class,
        has_introductions: bool,
    ) -> bool {
        match &self.0 {
            MethodMatcherOp::Union(a, b) => {
                a.matches_with_introductions(method, target_class, has_introductions)
                    || b.matches_with_introductions(method, target_class, has_introductions)
            }
            MethodMatcherOp::Intersection(a, b) => {
                a.matches_with_introductions(method, target_class, has_introductions)
                    && b.matches_with_introductions(method, target_class, has_introductions)
            }
            MethodMatcherOp::Negate(a) => {
                !a.matches_with_introductions(method, target_class, has_introductions)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn MethodMatcher) -> bool {
        let Some(other) = other.as_any().downcast_ref::<ComposedMethodMatcher>() else {
            return false;
        };
        match (&self.0, &other.0) {
            (MethodMatcherOp::Union(a1, b1), MethodMatcherOp::Union(a2, b2))
            | (MethodMatcherOp::Intersection(a1, b1), MethodMatcherOp::Intersection(a2, b2)) => {
                a1.equals(a2.as_ref()) && b1.equals(b2.as_ref())
            }
            (MethodMatcherOp::Negate(a1), MethodMatcherOp::Negate(a2)) => a1.equals(a2.as_ref()),
            _ => false,
        }
    }
}

/// 匹配两个切点之一，方法匹配只在各自类过滤器通过时才算数
struct ClassAwareUnionMatcher {
    first: Arc<dyn Pointcut>,
    second: Arc<dyn Pointcut>,
}

impl ClassAwareUnionMatcher {
    fn applies(pointcut: &Arc<dyn Pointcut>, class: &Class) -> bool {
        pointcut.class_filter().matches(class)
    }
}

impl MethodMatcher for ClassAwareUnionMatcher {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        [&self.first, &self.second].into_iter().any(|p| {
            Self::applies(p, target_class) && p.method_matcher().matches(method, target_class)
        })
    }

    fn is_runtime(&self) -> bool {
        self.first.method_matcher().is_runtime() || self.second.method_matcher().is_runtime()
    }

    fn matches_with_args(&self, method: &Method, target_class: &Class, args: &[Value]) -> bool {
        [&self.first, &self.second].into_iter().any(|p| {
            let mm = p.method_matcher();
            Self::applies(p, target_class)
                && mm.matches(method, target_class)
                && (!mm.is_runtime() || mm.matches_with_args(method, target_class, args))
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn MethodMatcher) -> bool {
        other
            .as_any()
            .downcast_ref::<ClassAwareUnionMatcher>()
            .is_some_and(|o| o.first.equals(self.first.as_ref()) && o.second.equals(self.second.as_ref()))
    }
}

/// 可组合的切点
///
/// ```ignore
/// let pc = ComposablePointcut::new()
///     .intersection_class_filter(TypePatternClassFilter::new("*Service"))
///     .intersection_method_matcher(NameMatchMethodPointcut::with_names(["save*"]));
/// ```
#[derive(Clone)]
pub struct ComposablePointcut {
    class_filter: Arc<dyn ClassFilter>,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl Default for ComposablePointcut {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposablePointcut {
    /// 匹配一切
    pub fn new() -> Self {
        Self {
            class_filter: Arc::new(TrueClassFilter),
            method_matcher: Arc::new(TrueMethodMatcher),
        }
    }

    pub fn from_parts(class_filter: Arc<dyn ClassFilter>, method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self {
            class_filter,
            method_matcher,
        }
    }

    pub fn from_class_filter(class_filter: impl ClassFilter) -> Self {
        Self::from_parts(Arc::new(class_filter), Arc::new(TrueMethodMatcher))
    }

    pub fn from_method_matcher(method_matcher: impl MethodMatcher) -> Self {
        Self::from_parts(Arc::new(TrueClassFilter), Arc::new(method_matcher))
    }

    pub fn from_pointcut(pointcut: Arc<dyn Pointcut>) -> Self {
        Self::from_parts(
            Arc::new(PointcutClassFilter(Arc::clone(&pointcut))),
            Arc::new(PointcutMethodMatcher(pointcut)),
        )
    }

    pub fn union_class_filter(mut self, other: impl ClassFilter) -> Self {
        self.class_filter = Arc::new(ComposedClassFilter(ClassFilterOp::Union(
            self.class_filter,
            Arc::new(other),
        )));
        self
    }

    pub fn intersection_class_filter(mut self, other: impl ClassFilter) -> Self {
        self.class_filter = Arc::new(ComposedClassFilter(ClassFilterOp::Intersection(
            self.class_filter,
            Arc::new(other),
        )));
        self
    }

    pub fn negate_class_filter(mut self) -> Self {
        self.class_filter = Arc::new(ComposedClassFilter(ClassFilterOp::Negate(self.class_filter)));
        self
    }

    pub fn union_method_matcher(mut self, other: impl MethodMatcher) -> Self {
        self.method_matcher = Arc::new(ComposedMethodMatcher(MethodMatcherOp::Union(
            self.method_matcher,
            Arc::new(other),
        )));
        self
    }

    pub fn intersection_method_matcher(mut self, other: impl MethodMatcher) -> Self {
        self.method_matcher = Arc::new(ComposedMethodMatcher(MethodMatcherOp::Intersection(
            self.method_matcher,
            Arc::new(other),
        )));
        self
    }

    pub fn negate_method_matcher(mut self) -> Self {
        self.method_matcher =
            Arc::new(ComposedMethodMatcher(MethodMatcherOp::Negate(self.method_matcher)));
        self
    }

    /// 并集：任一切点匹配即可
    pub fn union(self, other: Arc<dyn Pointcut>) -> Self {
        let this: Arc<dyn Pointcut> = Arc::new(self);
        Self {
            class_filter: Arc::new(ComposedClassFilter(ClassFilterOp::Union(
                Arc::new(PointcutClassFilter(Arc::clone(&this))),
                Arc::new(PointcutClassFilter(Arc::clone(&other))),
            ))),
            method_matcher: Arc::new(ClassAwareUnionMatcher {
                first: this,
                second: other,
            }),
        }
    }

    /// 交集：两个切点都要匹配
    pub fn intersection(self, other: Arc<dyn Pointcut>) -> Self {
        Self {
            class_filter: Arc::new(ComposedClassFilter(ClassFilterOp::Intersection(
                self.class_filter,
                Arc::new(PointcutClassFilter(Arc::clone(&other))),
            ))),
            method_matcher: Arc::new(ComposedMethodMatcher(MethodMatcherOp::Intersection(
                self.method_matcher,
                Arc::new(PointcutMethodMatcher(other)),
            ))),
        }
    }
}

impl Pointcut for ComposablePointcut {
    fn class_filter(&self) -> &dyn ClassFilter {
        self.class_filter.as_ref()
    }

    fn method_matcher(&self) -> &dyn MethodMatcher {
        self.method_matcher.as_ref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn Pointcut) -> bool {
        other
            .as_any()
            .downcast_ref::<ComposablePointcut>()
            .is_some_and(|o| {
                o.class_filter.equals(self.class_filter.as_ref())
                    && o.method_matcher.equals(self.method_matcher.as_ref())
            })
    }

    fn describe(&self) -> String {
        "ComposablePointcut".to_string()
    }
}

impl fmt::Debug for dyn Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{ClassBuilder, ValueType};

    struct Repo;

    fn repo_class() -> Class {
        ClassBuilder::<Repo>::new("UserRepository")
            .method("save_user", vec![ValueType::Int], ValueType::Void, |_: &Repo, _| {
                Ok(Value::Unit)
            })
            .method("find_user", vec![ValueType::Int], ValueType::Str, |_: &Repo, _| {
                Ok(Value::from("u"))
            })
            .build()
    }

    fn method(class: &Class, name: &str) -> Method {
        class.find_method(name).unwrap()
    }

    #[test]
    fn test_name_pattern_is_reusable() {
        let pattern = NamePattern::new("find_*_by_id");
        assert_eq!(pattern.as_str(), "find_*_by_id");
        assert!(pattern.matches("find_user_by_id"));
        assert!(pattern.matches("find_order_by_id"));
        assert!(!pattern.matches("find_user"));
        assert_eq!(pattern, NamePattern::new("find_*_by_id"));

        let filter = TypePatternClassFilter::new("*Service");
        assert_eq!(filter.pattern(), "*Service");
        let pointcut = NameMatchMethodPointcut::with_names(["save*", "delete"]);
        assert_eq!(pointcut.mapped_names(), ["save*", "delete"]);
    }

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("save*", "save_user"));
        assert!(pattern_matches("*Repository", "UserRepository"));
        assert!(pattern_matches("*user*", "find_user_by_id"));
        assert!(!pattern_matches("save*", "find_user"));
        assert!(pattern_matches("a.b", "a.b"));
        assert!(!pattern_matches("a.*", "ab"));
    }

    #[test]
    fn test_name_match_pointcut() {
        let class = repo_class();
        let pc = NameMatchMethodPointcut::with_names(["save*"]);
        assert!(pc.method_matcher().matches(&method(&class, "save_user"), &class));
        assert!(!pc.method_matcher().matches(&method(&class, "find_user"), &class));

        let same = NameMatchMethodPointcut::new().add_method_name("save*");
        let other = NameMatchMethodPointcut::with_names(["find*"]);
        assert!(Pointcut::equals(&pc, &same));
        assert!(!Pointcut::equals(&pc, &other));
    }

    #[test]
    fn test_regexp_pointcut() {
        let class = repo_class();
        let pc = RegexpMethodPointcut::new([r"^UserRepository::.*_user$"])
            .unwrap()
            .exclude([r"::find_"])
            .unwrap();
        assert!(pc.method_matcher().matches(&method(&class, "save_user"), &class));
        assert!(!pc.method_matcher().matches(&method(&class, "find_user"), &class));
        assert!(RegexpMethodPointcut::new(["("]).is_err());
    }

    #[test]
    fn test_class_filters() {
        let class = repo_class();
        assert!(TypePatternClassFilter::new("*Repository").matches(&class));
        assert!(!TypePatternClassFilter::new("*Service").matches(&class));
        assert!(RootClassFilter::new(&Class::object()).matches(&class));
        assert!(TypePatternClassFilter::new("A").equals(&TypePatternClassFilter::new("A")));
        assert!(!TypePatternClassFilter::new("A").equals(&TrueClassFilter));
    }

    #[test]
    fn test_composable_pointcut() {
        let class = repo_class();
        let pc = ComposablePointcut::new()
            .intersection_class_filter(TypePatternClassFilter::new("*Repository"))
            .intersection_method_matcher(NameMatchMethodPointcut::with_names(["save*"]));
        assert!(pc.class_filter().matches(&class));
        assert!(pc.method_matcher().matches(&method(&class, "save_user"), &class));
        assert!(!pc.method_matcher().matches(&method(&class, "find_user"), &class));

        let negated = pc.clone().negate_method_matcher();
        assert!(negated.method_matcher().matches(&method(&class, "find_user"), &class));

        let union = ComposablePointcut::from_method_matcher(NameMatchMethodPointcut::with_names(["save*"]))
            .union(Arc::new(NameMatchMethodPointcut::with_names(["find*"])));
        assert!(union.method_matcher().matches(&method(&class, "find_user"), &class));
        assert!(union.method_matcher().matches(&method(&class, "save_user"), &class));
    }

    #[test]
    fn test_dynamic_pointcut() {
        let class = repo_class();
        let pc = DynamicMethodMatcherPointcut::new(|_, _, args| args.first() == Some(&Value::Int(7)))
            .with_static_check(|m, _| m.name().starts_with("save"));
        let save = method(&class, "save_user");
        let mm = pc.method_matcher();
        assert!(mm.is_runtime());
        assert!(mm.matches(&save, &class));
        assert!(!mm.matches(&method(&class, "find_user"), &class));
        assert!(mm.matches_with_args(&save, &class, &[Value::Int(7)]));
        assert!(!mm.matches_with_args(&save, &class, &[Value::Int(8)]));
    }

    #[test]
    fn test_intersection_with_dynamic_side() {
        let class = repo_class();
        let dynamic: Arc<dyn Pointcut> =
            Arc::new(DynamicMethodMatcherPointcut::new(|_, _, args| !args.is_empty()));
        let pc = ComposablePointcut::from_method_matcher(NameMatchMethodPointcut::with_names(["save*"]))
            .intersection(dynamic);
        let save = method(&class, "save_user");
        assert!(pc.method_matcher().is_runtime());
        assert!(pc.method_matcher().matches_with_args(&save, &class, &[Value::Int(1)]));
        assert!(!pc.method_matcher().matches_with_args(&save, &class, &[]));
    }

    #[test]
    fn test_default_equality_is_identity() {
        let a = StaticMethodMatcherPointcut::new(|_, _| true);
        let b = StaticMethodMatcherPointcut::new(|_, _| true);
        assert!(Pointcut::equals(&a, &a));
        assert!(!Pointcut::equals(&a, &b));
        assert!(TruePointcut.equals(&TruePointcut));
    }
}
