//! Text emission for the nested-list format.
//!
//! The backing tree is compacted (tombstones removed at every level) and then
//! rendered. Line breaks are inserted while rendering, in front of the
//! entities named by [`WriteOptions::newline_before`], so that they can never
//! land inside a quoted string. Bulk-data lines longer than the soft limit are
//! then wrapped at spaces outside of strings.

use crate::config::WriteOptions;
use crate::parser::sexp::{format_number, quote_string, SExp};

/// Remove every tombstone from the tree, recursively.
pub fn compact(exp: &mut SExp) {
    if let SExp::List(items) = exp {
        items.retain(|item| !item.is_tombstone());
        for item in items.iter_mut() {
            compact(item);
        }
    }
}

/// Render a tree to text following `options`. The input is not modified;
/// tombstones are skipped.
pub fn render(exp: &SExp, options: &WriteOptions) -> String {
    let mut out = String::new();
    render_into(exp, &mut out, 0, options);
    out
}

/// Full write pipeline: compact a copy, render, wrap bulk lines.
pub fn to_text(tree: &SExp, options: &WriteOptions) -> String {
    let mut tree = tree.clone();
    compact(&mut tree);
    let mut text = render(&tree, options);
    text = wrap_long_lines(&text, options);
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

fn starts_on_new_line(exp: &SExp, depth: usize, options: &WriteOptions) -> bool {
    depth > 0
        && exp
            .head()
            .map(|head| options.newline_before.iter().any(|k| k == head))
            .unwrap_or(false)
}

fn render_into(exp: &SExp, out: &mut String, depth: usize, options: &WriteOptions) {
    match exp {
        SExp::Symbol(s) => out.push_str(s),
        SExp::Str(s) => out.push_str(&quote_string(s)),
        SExp::Number(n) => out.push_str(&format_number(*n)),
        SExp::Tombstone => {}
        SExp::List(items) => {
            out.push('(');
            let mut first = true;
            for item in items.iter().filter(|i| !i.is_tombstone()) {
                if starts_on_new_line(item, depth + 1, options) {
                    out.push('\n');
                    if options.indent {
                        out.push_str(&"  ".repeat(depth + 1));
                    }
                } else if !first {
                    out.push(' ');
                }
                first = false;
                render_into(item, out, depth + 1, options);
            }
            out.push(')');
        }
    }
}

fn is_bulk_line(line: &str, options: &WriteOptions) -> bool {
    let trimmed = line.trim_start();
    let Some(rest) = trimmed.strip_prefix('(') else {
        return false;
    };
    options.bulk_keywords.iter().any(|kw| {
        rest.strip_prefix(kw.as_str())
            .map(|after| {
                after.is_empty()
                    || after.starts_with(char::is_whitespace)
                    || after.starts_with('(')
                    || after.starts_with(')')
            })
            .unwrap_or(false)
    })
}

/// Break over-long bulk-data lines after every space that sits outside a
/// quoted string.
pub fn wrap_long_lines(text: &str, options: &WriteOptions) -> String {
    let mut out_lines = Vec::new();
    for line in text.split('\n') {
        if line.chars().count() > options.max_line_length && is_bulk_line(line, options) {
            out_lines.push(break_at_spaces(line));
        } else {
            out_lines.push(line.to_string());
        }
    }
    out_lines.join("\n")
}

fn break_at_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + line.len() / 8);
    let mut in_string = false;
    let mut escaped = false;
    let mut indent = true;
    for ch in line.chars() {
        out.push(ch);
        if indent {
            if ch.is_whitespace() {
                continue;
            }
            indent = false;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
        } else if ch == '"' {
            in_string = true;
        } else if ch == ' ' {
            out.push('\n');
        }
    }
    out
}
