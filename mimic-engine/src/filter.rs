use crate::catalog::{TraitOption, Tagged};
use crate::request::RequestContext;
use crate::value::Value;
use std::collections::BTreeMap;

/// Narrows tagged entries by the request context.
///
/// A context field that is unset does not constrain anything; an entry tag
/// that is unset is a wildcard. Otherwise the two must be equal, ignoring
/// ASCII case.
#[derive(Debug, Clone, Copy)]
pub struct ContextFilter<'a> {
    context: &'a RequestContext,
}

impl<'a> ContextFilter<'a> {
    pub fn new(context: &'a RequestContext) -> Self {
        Self { context }
    }

    pub fn matches<T: Tagged>(&self, item: &T) -> bool {
        tag_matches(self.context.region.as_deref(), item.region())
            && tag_matches(self.context.vendor.as_deref(), item.vendor())
            && tag_matches(self.context.device_class.as_deref(), item.device_class())
    }

    /// Eligible entries, in catalog order.
    pub fn apply<'i, T: Tagged>(&self, items: &'i [T]) -> Vec<&'i T> {
        items.iter().filter(|item| self.matches(*item)).collect()
    }
}

fn tag_matches(wanted: Option<&str>, tag: Option<&str>) -> bool {
    match (wanted, tag) {
        (Some(wanted), Some(tag)) => wanted.eq_ignore_ascii_case(tag),
        _ => true,
    }
}

/// Keep only options whose `when` conditions hold against `resolved`.
pub fn conditioned<'i>(
    options: Vec<&'i TraitOption>,
    resolved: &BTreeMap<String, Value>,
) -> Vec<&'i TraitOption> {
    options
        .into_iter()
        .filter(|option| option.conditions_hold(resolved))
        .collect()
}
