//! Hierarchy search and canonical joint ordering.

use crate::Element;

fn find_child(parent: &Element, name: Option<&str>, transform: Option<&Element>) -> Option<Element> {
    for child in parent.get_element_array("children") {
        let matches_name = name.is_some_and(|name| child.get_name().as_str() == name);
        let matches_transform = transform.is_some_and(|transform| child.get_element("transform").as_ref() == Some(transform));

        if matches_name || matches_transform {
            return Some(child);
        }

        if let Some(found) = find_child(&child, name, transform) {
            return Some(found);
        }
    }

    None
}

/// Searches the hierarchy below `parent` depth first for an element with the given name.
pub fn find_child_by_name(parent: &Element, name: &str) -> Option<Element> {
    find_child(parent, Some(name), None)
}

/// Searches the hierarchy below `parent` depth first for the element whose
/// `transform` attribute references the given element.
pub fn find_child_by_transform(parent: &Element, transform: &Element) -> Option<Element> {
    find_child(parent, None, Some(transform))
}

/// Derives the canonical joint ordering of a skeleton, independent of the
/// order joints were declared in.
///
/// An explicit non-empty `jointList` is used verbatim. Otherwise the base
/// pose transform list drives the order: its declaration order defines the
/// bone index space, so each transform is matched by name against the
/// hierarchy and the owning joint appended in transform order. Transforms
/// with no matching joint are omitted.
pub fn resolve_joint_order(skeleton: &Element) -> Vec<Element> {
    let explicit = skeleton.get_element_array("jointList");
    if !explicit.is_empty() {
        return explicit;
    }

    let transforms = skeleton
        .get_element_array("baseStates")
        .first()
        .map(|state| state.get_element_array("transforms"))
        .unwrap_or_default();

    let mut order = Vec::new();
    for transform in transforms {
        let name = transform.get_name().clone();
        if let Some(joint) = find_child_by_name(skeleton, &name) {
            order.push(joint);
        }
    }

    order
}
