use super::binding_label;
use crate::{
    config::{KeyBindingAction, KeyBindingsConfig, Theme},
    utils::{StyledLine, pad, raw, span},
};

const KEY_WIDTH: usize = 24;

/// Renders the help card listing the key bindings and the search syntax.
///
/// When `empty` is set, the card starts by stating that no record matches the query.
pub fn help_card(theme: &Theme, keybindings: &KeyBindingsConfig, empty: bool) -> Vec<StyledLine> {
    let key = |action| binding_label(keybindings, action);
    let entry = |keys: String, desc: &str| vec![raw("  "), span(pad(&keys, KEY_WIDTH), theme.accent), raw(desc)];
    let title = |title: &str| vec![span(title, theme.header)];

    let mut lines = Vec::new();
    if empty {
        lines.push(vec![span("No records match the current query", theme.warn)]);
        lines.push(Vec::new());
    }

    lines.push(title("Navigation:"));
    lines.push(entry(String::from("↑ ↓ / ctrl-k ctrl-j"), "Move the cursor"));
    lines.push(entry(String::from("pgup pgdn"), "Move a page"));
    lines.push(entry(String::from("home end"), "First / last record"));
    lines.push(Vec::new());

    lines.push(title("Selection:"));
    lines.push(entry(key(KeyBindingAction::Confirm), "Accept the selection"));
    lines.push(entry(key(KeyBindingAction::Mark), "Mark or unmark the record"));
    lines.push(entry(key(KeyBindingAction::Quit), "Cancel"));
    lines.push(Vec::new());

    lines.push(title("Sorting:"));
    lines.push(entry(key(KeyBindingAction::SortField), "Cycle the sort field"));
    lines.push(entry(key(KeyBindingAction::SortDirection), "Toggle the sort direction"));
    lines.push(Vec::new());

    lines.push(title("Preview & data:"));
    lines.push(entry(key(KeyBindingAction::PreviewMode), "Cycle details, json and help"));
    lines.push(entry(key(KeyBindingAction::Reload), "Reload the list"));
    lines.push(entry(
        format!(
            "{} {}",
            key(KeyBindingAction::HistoryPrev),
            key(KeyBindingAction::HistoryNext)
        ),
        "Browse the query history",
    ));
    lines.push(Vec::new());

    lines.push(title("Search syntax:"));
    for (example, desc) in [
        ("web server", "Every term must match"),
        ("name:web id:i-0a", "Name or id contains"),
        ("tag:Env=prod", "Tag equals"),
        ("has:Owner missing:Team", "Tag presence"),
        ("ip:10.0.* dns:*.internal", "Address patterns"),
        ("state:running az:eu-1a", "State or zone equals"),
        ("type:t3.*", "Instance type pattern"),
        ("!term !state:stopped", "Exclude matches"),
    ] {
        lines.push(entry(String::from(example), desc));
    }

    lines
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::utils::to_plain;

    #[test]
    fn test_help_card_uses_key_bindings() {
        let lines = help_card(&Theme::plain(), &KeyBindingsConfig::default(), false)
            .iter()
            .map(|l| to_plain(l))
            .collect::<Vec<_>>();
        assert_eq!(lines[0], "Navigation:");
        assert!(lines.iter().any(|l| l.starts_with("  enter ") && l.ends_with("Accept the selection")));
        assert!(lines.iter().any(|l| l.starts_with("  ctrl-s ") && l.ends_with("Cycle the sort field")));
        assert!(lines.iter().any(|l| l.contains("tag:Env=prod")));
    }
}
