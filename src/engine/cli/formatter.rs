//! Terminal rendering for `docdex` text output
//!
//! Status lines go to stdout except failures, which go to stderr so that
//! `--format json` output stays parseable when piped.

use colored::{ColoredString, Colorize};

pub struct CliFormatter;

impl CliFormatter {
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "!".yellow().bold(), message);
    }

    /// Underlined section title preceded by a blank line
    pub fn header(title: &str) {
        println!("\n{}", title.cyan().bold());
        println!("{}", "=".repeat(title.chars().count()).bright_black());
    }

    pub fn kv(key: &str, value: &str) {
        println!("  {:<12} {}", format!("{}:", key).bold(), value);
    }

    pub fn item(text: &str) {
        println!("  {} {}", "-".bright_black(), text);
    }

    /// Left-aligned table; every column is as wide as its widest cell
    pub fn table(columns: &[&str], rows: &[Vec<String>]) {
        let widths: Vec<usize> = columns
            .iter()
            .enumerate()
            .map(|(i, title)| {
                rows.iter()
                    .filter_map(|row| row.get(i))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(title.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let heading: Vec<ColoredString> = columns
            .iter()
            .zip(&widths)
            .map(|(title, w)| format!("{:<w$}", title, w = w).bold())
            .collect();
        println!(
            "  {}",
            heading.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("  ")
        );

        for row in rows {
            let cells: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, w)| format!("{:<w$}", cell, w = w))
                .collect();
            println!("  {}", cells.join("  ").trim_end());
        }
    }
}

/// `count` followed by the singular or plural noun
pub fn counted(count: usize, one: &str, many: &str) -> String {
    format!("{} {}", count, if count == 1 { one } else { many })
}
