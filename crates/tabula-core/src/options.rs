//! Option (enumeration) field support.
//!
//! An option field stores an `i32` and renders a caption. The value → name/caption
//! lookup for a Rust enum is built once per type and cached process-wide, so reading
//! captions never walks the enum again.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// A Rust enum usable as the domain of an option field.
///
/// # Example
///
/// ```
/// use tabula_core::options::{OptionEnum, OptionSet};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// enum Status { Open, Released }
///
/// impl OptionEnum for Status {
///     fn variants() -> &'static [Self] { &[Status::Open, Status::Released] }
///     fn value(self) -> i32 { self as i32 }
///     fn name(self) -> &'static str {
///         match self { Status::Open => "Open", Status::Released => "Released" }
///     }
/// }
///
/// let set = OptionSet::of::<Status>();
/// assert_eq!(set.parse("released"), Some(1));
/// assert_eq!(set.caption(0), Some("Open"));
/// ```
pub trait OptionEnum: Copy + 'static {
    /// All variants in declaration order.
    fn variants() -> &'static [Self];
    /// Stored integer value.
    fn value(self) -> i32;
    /// Stable code name.
    fn name(self) -> &'static str;
    /// Display caption. Defaults to the name.
    fn caption(self) -> &'static str {
        self.name()
    }
}

/// One member of an option set.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OptionEntry {
    /// Stored integer value.
    pub value: i32,
    /// Stable code name.
    pub name: &'static str,
    /// Display caption.
    pub caption: &'static str,
}

/// Immutable value → name/caption table for an option field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSet {
    type_name: &'static str,
    entries: Vec<OptionEntry>,
    by_value: HashMap<i32, usize>,
}

impl OptionSet {
    /// Build a set from explicit entries.
    pub fn from_entries(type_name: &'static str, entries: Vec<OptionEntry>) -> Self {
        let by_value = entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.value, idx))
            .collect();
        Self {
            type_name,
            entries,
            by_value,
        }
    }

    /// Get the cached set for an enum type, building it on first use.
    pub fn of<E: OptionEnum>() -> Arc<OptionSet> {
        option_cache().get_or_build::<E>()
    }

    /// Name of the enum type this set was built from.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[OptionEntry] {
        &self.entries
    }

    /// Look up an entry by stored value.
    pub fn entry(&self, value: i32) -> Option<&OptionEntry> {
        self.by_value.get(&value).map(|idx| &self.entries[*idx])
    }

    /// True if `value` is a member.
    pub fn contains(&self, value: i32) -> bool {
        self.by_value.contains_key(&value)
    }

    /// Caption of a stored value.
    pub fn caption(&self, value: i32) -> Option<&'static str> {
        self.entry(value).map(|e| e.caption)
    }

    /// Name of a stored value.
    pub fn name(&self, value: i32) -> Option<&'static str> {
        self.entry(value).map(|e| e.name)
    }

    /// Value of the first member; the blank value of an option field.
    pub fn first_value(&self) -> i32 {
        self.entries.first().map_or(0, |e| e.value)
    }

    /// Resolve text to a member: by name or caption (case-insensitive), then by number.
    pub fn parse(&self, text: &str) -> Option<i32> {
        let text = text.trim();
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(text) || e.caption.eq_ignore_ascii_case(text))
            .map(|e| e.value)
            .or_else(|| {
                text.parse::<i32>()
                    .ok()
                    .filter(|v| self.by_value.contains_key(v))
            })
    }
}

/// Thread-safe cache of option sets keyed by enum type.
struct OptionCache {
    cache: RwLock<HashMap<TypeId, Arc<OptionSet>>>,
}

impl OptionCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_build<E: OptionEnum>(&self) -> Arc<OptionSet> {
        let key = TypeId::of::<E>();
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(set) = cache.get(&key) {
                return Arc::clone(set);
            }
        }

        let entries = E::variants()
            .iter()
            .map(|v| OptionEntry {
                value: v.value(),
                name: v.name(),
                caption: v.caption(),
            })
            .collect();
        let set = Arc::new(OptionSet::from_entries(std::any::type_name::<E>(), entries));
        tracing::trace!(option_type = set.type_name, "Built option set");

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cache.entry(key).or_insert(set))
    }
}

fn option_cache() -> &'static OptionCache {
    static CACHE: OnceLock<OptionCache> = OnceLock::new();
    CACHE.get_or_init(OptionCache::new)
}
