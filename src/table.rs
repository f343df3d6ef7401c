use std::borrow::Cow;
use std::fmt::Write as _;

/// Left-aligned plain-text table: header, dashed rule, rows, two spaces between columns.
#[derive(Debug, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Extra cells beyond the header are dropped; missing ones render blank.
    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        let mut widths = self
            .headers
            .iter()
            .map(|header| cell_width(header).max(3))
            .collect::<Vec<_>>();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell_width(cell));
            }
        }

        let rule = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
        let mut output = String::new();
        let _ = writeln!(output, "{}", render_line(&self.headers, &widths));
        let _ = writeln!(output, "{}", render_line(&rule, &widths));
        for row in &self.rows {
            let _ = writeln!(output, "{}", render_line(row, &widths));
        }
        output
    }
}

fn render_line(cells: &[String], widths: &[usize]) -> String {
    let line = widths
        .iter()
        .enumerate()
        .map(|(idx, width)| {
            let cell = cells.get(idx).map(|c| clean(c)).unwrap_or_default();
            format!("{cell:<width$}")
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn cell_width(value: &str) -> usize {
    clean(value).chars().count()
}

fn clean(value: &str) -> Cow<'_, str> {
    if value.contains(|ch: char| ch.is_control()) {
        Cow::Owned(
            value
                .chars()
                .map(|ch| if ch.is_control() { ' ' } else { ch })
                .collect(),
        )
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_padded_columns_with_rule() {
        let mut table = Table::new(["#", "raw name"]);
        table.push_row(vec!["1".into(), "First Name".into()]);
        table.push_row(vec!["2".into()]);
        assert_eq!(
            table.render(),
            "#    raw name\n---  ----------\n1    First Name\n2\n"
        );
    }

    #[test]
    fn control_characters_are_flattened() {
        let mut table = Table::new(["name"]);
        table.push_row(vec!["a\tb\nc".into()]);
        assert!(table.render().ends_with("a b c\n"));
    }
}
