/// Minimum width of the preview pane, narrower panes are suppressed
pub const MIN_PREVIEW_WIDTH: u16 = 20;

/// Splits the terminal width between the list pane and the preview pane.
///
/// The list share shrinks as the terminal grows. Returns the width of the list and the width of the preview, which is
/// `None` when the preview would be narrower than [`MIN_PREVIEW_WIDTH`] and the list takes the whole width.
///
/// # Examples
///
/// ```rust
/// # use fleet_select::utils::split_widths;
/// assert_eq!(split_widths(200), (110, Some(90)));
/// assert_eq!(split_widths(100), (60, Some(40)));
/// assert_eq!(split_widths(25), (25, None));
/// ```
pub fn split_widths(total: u16) -> (u16, Option<u16>) {
    let list_pct: u32 = match total {
        160.. => 55,
        120..=159 => 58,
        100..=119 => 60,
        80..=99 => 65,
        _ => 70,
    };
    let list = (u32::from(total) * list_pct / 100) as u16;
    let preview = total - list;
    if preview < MIN_PREVIEW_WIDTH {
        (total, None)
    } else {
        (list, Some(preview))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_split_ratios() {
        assert_eq!(split_widths(160), (88, Some(72)));
        assert_eq!(split_widths(159), (92, Some(67)));
        assert_eq!(split_widths(120), (69, Some(51)));
        assert_eq!(split_widths(119), (71, Some(48)));
        assert_eq!(split_widths(80), (52, Some(28)));
        assert_eq!(split_widths(79), (55, Some(24)));
    }

    #[test]
    fn test_narrow_terminals_suppress_preview() {
        assert_eq!(split_widths(64), (44, Some(20)));
        assert_eq!(split_widths(63), (63, None));
        assert_eq!(split_widths(29), (29, None));
        assert_eq!(split_widths(0), (0, None));
    }
}
