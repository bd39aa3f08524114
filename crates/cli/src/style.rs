//! Shared styling utilities for the CLI.

use console::Style;

use svncompare_core::compare::DiffKind;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold, white).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Arrow showing which side a change comes from.
pub fn direction_arrow(kind: DiffKind) -> &'static str {
    if kind.is_no_change() {
        return " ";
    }
    match kind.direction() {
        DiffKind::LEFT => "→",
        DiffKind::RIGHT => "←",
        DiffKind::CONFLICTING => "↔",
        _ => " ",
    }
}

/// Table colour for a change direction.
pub fn direction_color(kind: DiffKind) -> comfy_table::Color {
    if kind.is_no_change() {
        return comfy_table::Color::Reset;
    }
    match kind.direction() {
        DiffKind::LEFT => comfy_table::Color::Green,
        DiffKind::RIGHT => comfy_table::Color::Blue,
        DiffKind::CONFLICTING if kind.is_pseudo_conflict() => comfy_table::Color::Yellow,
        DiffKind::CONFLICTING => comfy_table::Color::Red,
        _ => comfy_table::Color::Reset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_arrow() {
        assert_eq!(direction_arrow(DiffKind::NO_CHANGE), " ");
        assert_eq!(direction_arrow(DiffKind::CHANGE | DiffKind::LEFT), "→");
        assert_eq!(direction_arrow(DiffKind::DELETION | DiffKind::RIGHT), "←");
        assert_eq!(direction_arrow(DiffKind::CHANGE | DiffKind::CONFLICTING), "↔");
    }

    #[test]
    fn test_no_change_is_uncoloured() {
        assert_eq!(direction_color(DiffKind::NO_CHANGE), comfy_table::Color::Reset);
        assert_eq!(
            direction_color(DiffKind::CHANGE | DiffKind::CONFLICTING),
            comfy_table::Color::Red
        );
    }
}
