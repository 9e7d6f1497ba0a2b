use crate::browser::snapshot::SnapshotNode;
use crate::locator::classifier::is_toggle_like_button;
use crate::locator::locator_model::{ComponentRole, InteractionType};

/// Input types with a reachable validation-error state.
const VALIDATING_INPUT_TYPES: [&str; 5] = ["email", "number", "url", "tel", "date"];

/// How the capture engine will drive a component of this role.
pub fn interaction_for(role: ComponentRole, node: &SnapshotNode) -> InteractionType {
    match role {
        ComponentRole::Button if is_toggle_like_button(node) => InteractionType::Click,
        ComponentRole::Button => InteractionType::Hover,
        ComponentRole::Dropdown => InteractionType::Select,
        ComponentRole::Form => InteractionType::Input,
        ComponentRole::Toggle
        | ComponentRole::Expandable
        | ComponentRole::Table
        | ComponentRole::Chart
        | ComponentRole::Modal => InteractionType::Click,
        ComponentRole::Nav | ComponentRole::Link | ComponentRole::Display => InteractionType::None,
    }
}

/// Ordered state names the protocol for this role is expected to produce.
/// The first name is always the default (pre-interaction) state.
pub fn anticipated_states(
    role: ComponentRole,
    node: &SnapshotNode,
    dropdown_sample_limit: usize,
    max_chart_layouts: usize,
) -> Vec<String> {
    let names: Vec<&str> = match role {
        ComponentRole::Button if is_toggle_like_button(node) => vec!["default", "toggled"],
        ComponentRole::Button => vec!["default", "hover"],

        ComponentRole::Dropdown => {
            if node.options.is_empty() {
                vec!["closed", "open"]
            } else {
                return sample_options(&node.options, node.selected.as_deref(), dropdown_sample_limit);
            }
        }

        ComponentRole::Toggle => {
            if node.checked == Some(true) {
                vec!["on", "off"]
            } else {
                vec!["off", "on"]
            }
        }

        ComponentRole::Expandable => {
            if node.expanded == Some(true) {
                vec!["expanded", "collapsed"]
            } else {
                vec!["collapsed", "expanded"]
            }
        }

        ComponentRole::Table => {
            if node.sort_selector.is_some() {
                vec!["default", "sorted"]
            } else {
                vec!["default"]
            }
        }

        ComponentRole::Form => {
            let first = if node.value.as_deref().unwrap_or("").is_empty() {
                "empty"
            } else {
                "default"
            };
            if validates(node) {
                vec![first, "filled", "error"]
            } else {
                vec![first, "filled"]
            }
        }

        ComponentRole::Modal => vec!["closed", "open"],

        ComponentRole::Chart => {
            let mut states = vec!["default".to_string()];
            states.extend(
                alternate_layouts(node)
                    .into_iter()
                    .take(max_chart_layouts)
                    .map(|l| format!("layout: {}", l)),
            );
            return states;
        }

        ComponentRole::Nav | ComponentRole::Link | ComponentRole::Display => vec!["default"],
    };

    names.into_iter().map(String::from).collect()
}

/// Pick representative dropdown options.
///
/// All options when there are at most `limit`; otherwise the default
/// selection, the first and the last (topped up from the head of the list
/// when those coincide). The default selection always comes first.
pub fn sample_options(options: &[String], selected: Option<&str>, limit: usize) -> Vec<String> {
    let mut distinct: Vec<String> = Vec::new();
    for option in options {
        if !distinct.contains(option) {
            distinct.push(option.clone());
        }
    }

    if distinct.is_empty() {
        return distinct;
    }

    let default = selected
        .filter(|s| distinct.iter().any(|o| o == s))
        .map(|s| s.to_string())
        .unwrap_or_else(|| distinct[0].clone());

    if distinct.len() <= limit {
        let rest = distinct.into_iter().filter(|o| *o != default);
        return std::iter::once(default.clone()).chain(rest).collect();
    }

    let mut picks = vec![default];
    for candidate in [&distinct[0], &distinct[distinct.len() - 1]] {
        if !picks.contains(candidate) {
            picks.push(candidate.clone());
        }
    }

    let mut i = 1;
    while picks.len() < 3 && i < distinct.len() {
        if !picks.contains(&distinct[i]) {
            picks.push(distinct[i].clone());
        }
        i += 1;
    }

    picks
}

/// Chart layouts other than the active one, in declared order.
pub fn alternate_layouts(node: &SnapshotNode) -> Vec<String> {
    let active = node
        .active_layout
        .clone()
        .or_else(|| node.layouts.first().map(|l| l.name.clone()));

    node.layouts
        .iter()
        .filter(|l| Some(&l.name) != active.as_ref())
        .map(|l| l.name.clone())
        .collect()
}

pub fn validates(node: &SnapshotNode) -> bool {
    node.input_type
        .as_deref()
        .map(|t| VALIDATING_INPUT_TYPES.contains(&t))
        .unwrap_or(false)
}
