use std::borrow::Cow;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Renders an elastic plain-text table. `align` is matched to columns by
/// position; columns without an entry are left aligned.
pub fn render_table(headers: &[&str], rows: &[Vec<String>], align: &[Align]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }
    for width in &mut widths {
        *width = (*width).max(3);
    }

    let mut output = String::new();
    let header_cells = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths, &[]));
    let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths, &[]));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, align));
    }
    output
}

/// A titled table, or a `(none)` line when there is nothing to show.
pub fn render_section(
    title: &str,
    headers: &[&str],
    rows: &[Vec<String>],
    align: &[Align],
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{title}");
    let _ = writeln!(output, "{}", "=".repeat(display_width(title)));
    if rows.is_empty() {
        let _ = writeln!(output, "(none)");
    } else {
        output.push_str(&render_table(headers, rows, align));
    }
    output
}

fn format_row(values: &[String], widths: &[usize], align: &[Align]) -> String {
    let cells = values
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(idx, (value, width))| {
            let sanitized = sanitize_cell(value);
            let padding = " ".repeat(width.saturating_sub(display_width(&sanitized)));
            match align.get(idx).copied().unwrap_or(Align::Left) {
                Align::Left => format!("{sanitized}{padding}"),
                Align::Right => format!("{padding}{sanitized}"),
            }
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_align_right_under_their_header() {
        let rendered = render_table(
            &["name", "rows"],
            &[
                vec!["orders".to_string(), "12".to_string()],
                vec!["customers".to_string(), "3".to_string()],
            ],
            &[Align::Left, Align::Right],
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "name       rows");
        assert_eq!(lines[1], "---------  ----");
        assert_eq!(lines[2], "orders       12");
        assert_eq!(lines[3], "customers     3");
    }

    #[test]
    fn empty_sections_say_so() {
        let rendered = render_section("Relationships", &["a"], &[], &[]);
        assert_eq!(rendered, "Relationships\n=============\n(none)\n");
    }

    #[test]
    fn control_characters_do_not_break_rows() {
        let rendered = render_table(&["note"], &[vec!["two\nlines".to_string()]], &[]);
        assert!(rendered.lines().any(|line| line == "two lines"));
    }
}
