use crate::browser::snapshot::SnapshotNode;
use crate::locator::identity::{normalize_label, normalize_section};
use crate::locator::locator_model::{ComponentLocator, ComponentRole};

/// Labels that mark a plain button as a page-wide or binary toggle.
const TOGGLE_HINTS: [&str; 5] = ["theme", "dark", "light", "mode", "toggle"];

/// Classify a node into the role taxonomy from structural signals only
/// (tag, ARIA role, aria-* state attributes, input type). Returns `None` for
/// nodes that are not components (hidden, form chrome, empty text).
pub fn classify_node(node: &SnapshotNode) -> Option<ComponentRole> {
    if node.hidden {
        return None;
    }

    if matches!(node.tag.as_str(), "label" | "legend" | "option" | "form") {
        return None;
    }

    if node.disabled {
        // Visible but inert: observe only
        return has_text(node).then_some(ComponentRole::Display);
    }

    if is_toggle(node) {
        return Some(ComponentRole::Toggle);
    }

    if is_dropdown(node) {
        return Some(ComponentRole::Dropdown);
    }

    if is_modal_trigger(node) {
        return Some(ComponentRole::Modal);
    }

    if is_expandable(node) {
        return Some(ComponentRole::Expandable);
    }

    if is_table(node) {
        return Some(ComponentRole::Table);
    }

    if is_chart(node) {
        return Some(ComponentRole::Chart);
    }

    if is_form_input(node) {
        return Some(ComponentRole::Form);
    }

    if is_button(node) {
        return Some(ComponentRole::Button);
    }

    if is_link(node) {
        return if in_navigation(node) {
            Some(ComponentRole::Nav)
        } else {
            Some(ComponentRole::Link)
        };
    }

    if node.role.as_deref() == Some("navigation") || node.tag == "nav" {
        return Some(ComponentRole::Nav);
    }

    has_text(node).then_some(ComponentRole::Display)
}

/// Build the locator for a classified node.
pub fn locator_for(node: &SnapshotNode, role: ComponentRole) -> ComponentLocator {
    ComponentLocator {
        selector: node.selector.clone(),
        role,
        section: section_for(node),
        label: label_for(node).unwrap_or_default(),
    }
}

/// Buttons whose click flips a binary state (aria-pressed, theme switches).
pub fn is_toggle_like_button(node: &SnapshotNode) -> bool {
    if node.pressed.is_some() {
        return true;
    }

    label_for(node)
        .map(|l| {
            let lower = l.to_lowercase();
            TOGGLE_HINTS.iter().any(|h| lower.contains(h))
        })
        .unwrap_or(false)
}

pub fn label_for(node: &SnapshotNode) -> Option<String> {
    node.name
        .as_deref()
        .and_then(normalize_label)
        .or_else(|| node.text.as_deref().and_then(normalize_label))
}

pub fn section_for(node: &SnapshotNode) -> String {
    node.landmark
        .as_deref()
        .map(normalize_section)
        .unwrap_or_else(|| "main".to_string())
}

fn has_text(node: &SnapshotNode) -> bool {
    node.text.as_deref().map(|t| t.trim().len() > 2).unwrap_or(false)
}

fn is_toggle(node: &SnapshotNode) -> bool {
    match node.role.as_deref() {
        Some("switch") | Some("checkbox") => return true,
        _ => {}
    }
    node.tag == "input" && node.input_type.as_deref() == Some("checkbox")
}

fn is_dropdown(node: &SnapshotNode) -> bool {
    if node.tag == "select" {
        return true;
    }

    if matches!(node.role.as_deref(), Some("combobox") | Some("listbox")) {
        return true;
    }

    matches!(node.has_popup.as_deref(), Some("listbox") | Some("menu") | Some("true"))
}

fn is_modal_trigger(node: &SnapshotNode) -> bool {
    node.has_popup.as_deref() == Some("dialog")
}

fn is_expandable(node: &SnapshotNode) -> bool {
    node.tag == "details" || node.tag == "summary" || node.expanded.is_some()
}

fn is_table(node: &SnapshotNode) -> bool {
    node.tag == "table" || matches!(node.role.as_deref(), Some("table") | Some("grid") | Some("treegrid"))
}

fn is_chart(node: &SnapshotNode) -> bool {
    if node.tag == "canvas" {
        return true;
    }

    if !node.layouts.is_empty() {
        return true;
    }

    node.tag == "svg" && matches!(node.role.as_deref(), Some("img") | Some("figure") | Some("graphics-document"))
}

fn is_form_input(node: &SnapshotNode) -> bool {
    if node.tag != "input" && node.tag != "textarea" && node.role.as_deref() != Some("textbox") {
        return false;
    }

    match node.input_type.as_deref() {
        None
        | Some("text")
        | Some("email")
        | Some("password")
        | Some("search")
        | Some("number")
        | Some("tel")
        | Some("url")
        | Some("date")
        | Some("time")
        | Some("month")
        | Some("week") => true,

        // Buttons, files and hidden inputs are not fillable state
        _ => false,
    }
}

fn is_button(node: &SnapshotNode) -> bool {
    node.tag == "button"
        || node.role.as_deref() == Some("button")
        || matches!(node.input_type.as_deref(), Some("button") | Some("submit") | Some("reset"))
}

fn is_link(node: &SnapshotNode) -> bool {
    node.tag == "a" || node.role.as_deref() == Some("link")
}

fn in_navigation(node: &SnapshotNode) -> bool {
    node.landmark
        .as_deref()
        .map(|l| {
            let lower = l.to_lowercase();
            lower.contains("nav") || lower.contains("menu") || lower.contains("sidebar")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(tag: &str) -> SnapshotNode {
        SnapshotNode {
            selector: format!("#{}", tag),
            tag: tag.into(),
            text: Some("Some text".into()),
            ..SnapshotNode::default()
        }
    }

    #[test]
    fn switch_role_wins_over_button_tag() {
        let mut n = node("button");
        n.role = Some("switch".into());
        assert_eq!(classify_node(&n), Some(ComponentRole::Toggle));
    }

    #[test]
    fn button_with_listbox_popup_is_dropdown() {
        let mut n = node("button");
        n.has_popup = Some("listbox".into());
        assert_eq!(classify_node(&n), Some(ComponentRole::Dropdown));
    }

    #[test]
    fn links_inside_navigation_landmark_are_nav() {
        let mut n = node("a");
        n.landmark = Some("Primary navigation".into());
        assert_eq!(classify_node(&n), Some(ComponentRole::Nav));

        n.landmark = Some("main".into());
        assert_eq!(classify_node(&n), Some(ComponentRole::Link));
    }

    #[test]
    fn submit_input_is_not_a_form_field() {
        let mut n = node("input");
        n.input_type = Some("submit".into());
        assert_eq!(classify_node(&n), Some(ComponentRole::Button));
    }

    #[test]
    fn hidden_and_chrome_nodes_are_skipped() {
        let mut n = node("div");
        n.hidden = true;
        assert_eq!(classify_node(&n), None);
        assert_eq!(classify_node(&node("label")), None);
    }
}
