use std::fmt;
use std::sync::Arc;

use closet_conf::FailurePolicy;
use closet_conf::Settings;
use closet_templates::Delimiters;
use closet_templates::RawTag;
use closet_templates::Separators;
use closet_templates::TagData;
use rustc_hash::FxHashMap;

use crate::error::DispatchError;
use crate::error::FilterError;
use crate::memory::Memory;
use crate::renderer::FilterResult;
use crate::renderer::IterationInfo;
use crate::renderer::TagRenderer;
use crate::template::Rendered;

pub type FilterFn =
    dyn Fn(&TagData, &mut FilterContext<'_>) -> Result<FilterResult, FilterError> + Send + Sync;

/// Side effect queued by a filter. It runs after the current pass (deferred)
/// or after the whole render (aftermath).
pub type Effect = Box<dyn FnOnce(&Memory) + Send>;

#[derive(Clone)]
struct FilterEntry {
    filter: Arc<FilterFn>,
    separators: Separators,
}

#[derive(Clone, Default)]
struct Registry(FxHashMap<String, FilterEntry>);

impl Registry {
    fn insert(&mut self, name: String, entry: FilterEntry) -> bool {
        self.0.insert(name, entry).is_some()
    }

    fn remove(&mut self, name: &str) -> bool {
        self.0.remove(name).is_some()
    }

    fn get(&self, name: &str) -> Option<&FilterEntry> {
        self.0.get(name)
    }

    fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Effects keyed by name, kept in the order they were first queued.
#[derive(Default)]
struct Effects(Vec<(String, Effect)>);

impl Effects {
    fn queue(&mut self, key: String, effect: Effect) -> bool {
        if self.0.iter().any(|(queued, _)| *queued == key) {
            return false;
        }
        self.0.push((key, effect));
        true
    }

    fn run(&mut self, memory: &Memory) {
        for (key, effect) in self.0.drain(..) {
            tracing::trace!(%key, "Running queued effect");
            effect(memory);
        }
    }

    fn clear(&mut self) {
        self.0.clear();
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// What a filter sees besides its tag data.
pub struct FilterContext<'a> {
    info: &'a IterationInfo<'a>,
    path: Option<&'a [usize]>,
    registry: &'a mut Registry,
    memory: &'a Memory,
    deferred: &'a mut Effects,
    aftermath: &'a mut Effects,
}

impl FilterContext<'_> {
    #[must_use]
    pub fn iteration(&self) -> &IterationInfo<'_> {
        self.info
    }

    /// Position of the tag in the template's parsed tree. `None` for tags that
    /// first appeared in filter output.
    #[must_use]
    pub fn path(&self) -> Option<&[usize]> {
        self.path
    }

    #[must_use]
    pub fn delimiters(&self) -> &Delimiters {
        self.info.delimiters
    }

    #[must_use]
    pub fn memory(&self) -> &Memory {
        self.memory
    }

    /// Registers a filter for the rest of the current render call, replacing
    /// any filter of the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, filter: F, separators: Separators)
    where
        F: Fn(&TagData, &mut FilterContext<'_>) -> Result<FilterResult, FilterError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        tracing::debug!(%name, iteration = self.info.index, "Registered filter during render");
        self.registry.insert(
            name,
            FilterEntry {
                filter: Arc::new(filter),
                separators,
            },
        );
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.registry.remove(name)
    }

    #[must_use]
    pub fn has_filter(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Queues `effect` to run once the current pass is done. Returns `false`
    /// if an effect with the same key is already queued.
    pub fn defer(
        &mut self,
        key: impl Into<String>,
        effect: impl FnOnce(&Memory) + Send + 'static,
    ) -> bool {
        self.deferred.queue(key.into(), Box::new(effect))
    }

    /// Queues `effect` to run once the render call is done. Returns `false` if
    /// an effect with the same key is already queued.
    pub fn aftermath(
        &mut self,
        key: impl Into<String>,
        effect: impl FnOnce(&Memory) + Send + 'static,
    ) -> bool {
        self.aftermath.queue(key.into(), Box::new(effect))
    }
}

/// Registry of named filters and the state they share during a render call.
///
/// Filters registered on the manager form the base registry and survive
/// between render calls. Each render starts from a copy of it; filters
/// registered from inside other filters only live in that copy.
pub struct FilterManager {
    base: Registry,
    run: Registry,
    memory: Memory,
    memoize: bool,
    policy: FailurePolicy,
    debug: bool,
    deferred: Effects,
    aftermath: Effects,
}

impl FilterManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Registry::default(),
            run: Registry::default(),
            memory: Memory::default(),
            memoize: false,
            policy: FailurePolicy::default(),
            debug: false,
            deferred: Effects::default(),
            aftermath: Effects::default(),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let mut manager = Self::new().with_policy(settings.on_failure);
        manager.memoize = settings.memoize;
        manager.debug = settings.debug;
        manager
    }

    /// Uses `memory` and keeps it across render calls.
    #[must_use]
    pub fn with_memory(mut self, memory: Memory) -> Self {
        self.memory = memory;
        self.memoize = true;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn register<F>(&mut self, name: impl Into<String>, filter: F, separators: Separators)
    where
        F: Fn(&TagData, &mut FilterContext<'_>) -> Result<FilterResult, FilterError>
            + Send
            + Sync
            + 'static,
    {
        let entry = FilterEntry {
            filter: Arc::new(filter),
            separators,
        };
        let name = name.into();
        self.run.insert(name.clone(), entry.clone());
        if self.base.insert(name.clone(), entry) {
            tracing::debug!(%name, "Replaced filter");
        }
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.run.remove(name);
        self.base.remove(name)
    }

    /// Whether `name` is currently dispatchable, including filters registered
    /// during the current render call.
    #[must_use]
    pub fn has_filter(&self, name: &str) -> bool {
        self.run.contains(name)
    }

    #[must_use]
    pub fn filter_names(&self) -> Vec<&str> {
        self.run.names()
    }

    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    #[must_use]
    pub fn memoizes(&self) -> bool {
        self.memoize
    }

    /// Drops filters registered during a render and any queued effects.
    pub fn reset(&mut self) {
        self.run = self.base.clone();
        self.deferred.clear();
        self.aftermath.clear();
    }
}

impl Default for FilterManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FilterManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterManager")
            .field("filters", &self.run.names())
            .field("memory", &self.memory)
            .field("memoize", &self.memoize)
            .field("policy", &self.policy)
            .field("deferred", &self.deferred.len())
            .field("aftermath", &self.aftermath.len())
            .finish_non_exhaustive()
    }
}

impl TagRenderer for FilterManager {
    fn dispatch(
        &mut self,
        tag: &RawTag,
        path: Option<&[usize]>,
        info: &IterationInfo<'_>,
    ) -> Result<FilterResult, DispatchError> {
        // Cloned out so the filter can change the registry while it runs.
        let Some(entry) = self.run.get(&tag.key).cloned() else {
            return Err(DispatchError::FilterNotFound {
                key: tag.key.clone(),
            });
        };

        let data = tag.data(&entry.separators, info.delimiters);
        let mut context = FilterContext {
            info,
            path,
            registry: &mut self.run,
            memory: &self.memory,
            deferred: &mut self.deferred,
            aftermath: &mut self.aftermath,
        };

        let result = (entry.filter)(&data, &mut context).map_err(|source| DispatchError::Filter {
            key: tag.key.clone(),
            source,
        })?;

        if self.debug {
            tracing::debug!(
                key = %tag.key,
                result = %result.result,
                ready = result.ready,
                "Filter result"
            );
        }

        Ok(result)
    }

    fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    fn begin_run(&mut self) {
        self.reset();
        if !self.memoize {
            self.memory = Memory::default();
        }
    }

    fn finish_iteration(&mut self, _info: &IterationInfo<'_>) {
        self.deferred.run(&self.memory);
    }

    fn finish_run(&mut self, _rendered: &Rendered) {
        self.deferred.run(&self.memory);
        self.aftermath.run(&self.memory);
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::BaseDepth;

    fn upper(tag: &TagData, _: &mut FilterContext<'_>) -> Result<FilterResult, FilterError> {
        Ok(FilterResult::ready(
            tag.value(0).unwrap_or_default().to_uppercase(),
        ))
    }

    fn dispatch(manager: &mut FilterManager, text: &str) -> Result<FilterResult, DispatchError> {
        let delimiters = Delimiters::default();
        let info = IterationInfo {
            index: 0,
            base_depth: BaseDepth::Single,
            delimiters: &delimiters,
        };
        let tag = RawTag::from_text(text, &delimiters).unwrap();
        manager.dispatch(&tag, None, &info)
    }

    mod registry {
        use super::*;

        #[test]
        fn test_dispatch_by_key() {
            let mut manager = FilterManager::new();
            manager.register("upper", upper, Separators::Template);
            assert_eq!(
                dispatch(&mut manager, "[[upper::hi]]").unwrap(),
                FilterResult::ready("HI")
            );
        }

        #[test]
        fn test_unknown_key() {
            let mut manager = FilterManager::new();
            assert!(matches!(
                dispatch(&mut manager, "[[nope]]"),
                Err(DispatchError::FilterNotFound { key }) if key == "nope"
            ));
        }

        #[test]
        fn test_last_registration_wins() {
            let mut manager = FilterManager::new();
            manager.register(
                "f",
                |_: &TagData, _: &mut FilterContext<'_>| Ok(FilterResult::ready("one")),
                Separators::Template,
            );
            manager.register(
                "f",
                |_: &TagData, _: &mut FilterContext<'_>| Ok(FilterResult::ready("two")),
                Separators::Template,
            );
            assert_eq!(dispatch(&mut manager, "[[f]]").unwrap().result, "two");
            assert_eq!(manager.filter_names(), vec!["f"]);
        }

        #[test]
        fn test_filter_separators() {
            let mut manager = FilterManager::new();
            manager.register(
                "count",
                |tag: &TagData, _: &mut FilterContext<'_>| {
                    Ok(FilterResult::ready(format!("{}:{}", tag.values.len(), tag.joined(0, "+"))))
                },
                Separators::custom(";", ","),
            );
            assert_eq!(dispatch(&mut manager, "[[count::a,b;c]]").unwrap().result, "2:a+b");
        }

        #[test]
        fn test_filter_error() {
            let mut manager = FilterManager::new();
            manager.register(
                "fail",
                |_: &TagData, _: &mut FilterContext<'_>| Err(FilterError::msg("boom")),
                Separators::Template,
            );
            let err = dispatch(&mut manager, "[[fail]]").unwrap_err();
            assert_eq!(err.to_string(), "Filter 'fail' failed: boom");
        }

        #[test]
        fn test_anyhow_errors_convert() {
            let mut manager = FilterManager::new();
            manager.register(
                "num",
                |tag: &TagData, _: &mut FilterContext<'_>| {
                    let n: i64 = tag
                        .value(0)
                        .unwrap_or_default()
                        .parse()
                        .map_err(anyhow::Error::from)?;
                    Ok(FilterResult::ready((n * 2).to_string()))
                },
                Separators::Template,
            );
            assert_eq!(dispatch(&mut manager, "[[num::21]]").unwrap().result, "42");
            assert!(matches!(
                dispatch(&mut manager, "[[num::x]]"),
                Err(DispatchError::Filter {
                    source: FilterError::Other(_),
                    ..
                })
            ));
        }
    }

    mod dynamic {
        use super::*;

        fn definer(
            tag: &TagData,
            ctx: &mut FilterContext<'_>,
        ) -> Result<FilterResult, FilterError> {
            let name = tag.value(0).unwrap_or_default().to_string();
            let reply = tag.value(1).unwrap_or_default().to_string();
            ctx.register(
                name,
                move |_: &TagData, _: &mut FilterContext<'_>| {
                    Ok(FilterResult::ready(reply.clone()))
                },
                Separators::Template,
            );
            Ok(FilterResult::ready(""))
        }

        #[test]
        fn test_registration_is_visible_immediately() {
            let mut manager = FilterManager::new();
            manager.register("define", definer, Separators::Template);
            manager.begin_run();
            dispatch(&mut manager, "[[define::hello::hi]]").unwrap();
            assert!(manager.has_filter("hello"));
            assert_eq!(dispatch(&mut manager, "[[hello]]").unwrap().result, "hi");
        }

        #[test]
        fn test_reset_drops_dynamic_filters() {
            let mut manager = FilterManager::new();
            manager.register("define", definer, Separators::Template);
            manager.begin_run();
            dispatch(&mut manager, "[[define::hello::hi]]").unwrap();
            manager.reset();
            assert!(!manager.has_filter("hello"));
            assert!(manager.has_filter("define"));
        }

        #[test]
        fn test_filter_can_replace_itself() {
            let mut manager = FilterManager::new();
            manager.register(
                "once",
                |_: &TagData, ctx: &mut FilterContext<'_>| {
                    ctx.register(
                        "once",
                        |_: &TagData, _: &mut FilterContext<'_>| Ok(FilterResult::ready("again")),
                        Separators::Template,
                    );
                    Ok(FilterResult::ready("first"))
                },
                Separators::Template,
            );
            manager.begin_run();
            assert_eq!(dispatch(&mut manager, "[[once]]").unwrap().result, "first");
            assert_eq!(dispatch(&mut manager, "[[once]]").unwrap().result, "again");
        }

        #[test]
        fn test_unregister_from_filter() {
            let mut manager = FilterManager::new();
            manager.register("target", upper, Separators::Template);
            manager.register(
                "drop",
                |tag: &TagData, ctx: &mut FilterContext<'_>| {
                    let removed = ctx.unregister(tag.value(0).unwrap_or_default());
                    Ok(FilterResult::ready(removed.to_string()))
                },
                Separators::Template,
            );
            manager.begin_run();
            assert_eq!(dispatch(&mut manager, "[[drop::target]]").unwrap().result, "true");
            assert!(!manager.has_filter("target"));
            manager.reset();
            assert!(manager.has_filter("target"));
        }
    }

    mod effects {
        use super::*;

        fn counting(
            tag: &TagData,
            ctx: &mut FilterContext<'_>,
        ) -> Result<FilterResult, FilterError> {
            let key = tag.value(0).unwrap_or_default().to_string();
            ctx.defer(key.clone(), |memory: &Memory| {
                let seen = memory.get::<usize>("deferred").unwrap_or(0);
                memory.insert("deferred", seen + 1);
            });
            ctx.aftermath(key, |memory: &Memory| {
                let seen = memory.get::<usize>("aftermath").unwrap_or(0);
                memory.insert("aftermath", seen + 1);
            });
            Ok(FilterResult::ready(""))
        }

        #[test]
        fn test_keyed_effects_run_once() {
            let memory = Memory::new();
            let mut manager = FilterManager::new().with_memory(memory.clone());
            manager.register("count", counting, Separators::Template);
            manager.begin_run();

            dispatch(&mut manager, "[[count::a]]").unwrap();
            dispatch(&mut manager, "[[count::a]]").unwrap();
            dispatch(&mut manager, "[[count::b]]").unwrap();

            let delimiters = Delimiters::default();
            manager.finish_iteration(&IterationInfo {
                index: 0,
                base_depth: BaseDepth::Single,
                delimiters: &delimiters,
            });
            assert_eq!(memory.get::<usize>("deferred"), Some(2));
            assert_eq!(memory.get::<usize>("aftermath"), None);

            manager.finish_run(&Rendered::default());
            assert_eq!(memory.get::<usize>("aftermath"), Some(2));
        }
    }

    mod memory {
        use super::*;

        #[test]
        fn test_fresh_memory_per_run() {
            let mut manager = FilterManager::new();
            manager.begin_run();
            manager.memory().insert("k", 1_u8);
            manager.begin_run();
            assert!(!manager.memory().has("k"));
        }

        #[test]
        fn test_memoized_memory_survives_runs() {
            let memory = Memory::new();
            let mut manager = FilterManager::new().with_memory(memory.clone());
            manager.begin_run();
            manager.memory().insert("k", 1_u8);
            manager.begin_run();
            assert!(manager.memory().shares(&memory));
            assert_eq!(manager.memory().get::<u8>("k"), Some(1));
        }

        #[test]
        fn test_from_settings() {
            let settings = Settings {
                memoize: true,
                on_failure: FailurePolicy::Abort,
                ..Settings::default()
            };
            let manager = FilterManager::from_settings(&settings);
            assert!(manager.memoizes());
            assert_eq!(manager.failure_policy(), FailurePolicy::Abort);
        }
    }
}
