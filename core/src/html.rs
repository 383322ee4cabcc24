// HTML helpers
//
// Templates use `{{ name }}` placeholders. The server renders each one as a
// marker element carrying the variable name so the client can patch it on
// `SetVar` without a full re-render.

use std::fmt::{self, Write};

use serde_json::Value;

use crate::component::ComponentClass;
use crate::message::Payload;

/// Attribute carried by rendered variable markers.
pub const VAR_ATTRIBUTE: &str = "data-sundash-var";

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Text shown for a variable value: strings verbatim, null as nothing, the rest as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Names of all well-formed placeholders, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    scan(template, |segment| {
        if let Segment::Placeholder(name) = segment {
            names.push(name.to_string());
        }
    });
    names
}

/// Substitute every placeholder with a marker holding the escaped value.
///
/// Placeholders naming an unknown variable are left untouched.
pub fn render_template(template: &str, vars: &Payload) -> String {
    let mut out = String::with_capacity(template.len());
    scan(template, |segment| match segment {
        Segment::Text(text) => out.push_str(text),
        Segment::Placeholder(name) => match vars.get(name) {
            Some(value) => {
                let _ = write!(
                    out,
                    r#"<span {}="{}">{}</span>"#,
                    VAR_ATTRIBUTE,
                    escape(name),
                    escape(&display_value(value))
                );
            }
            None => {
                out.push_str("{{ ");
                out.push_str(name);
                out.push_str(" }}");
            }
        },
    });
    out
}

enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn scan<'a>(template: &'a str, mut emit: impl FnMut(Segment<'a>)) {
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        let name = after[..end].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            // Not a placeholder; keep the braces as text.
            emit(Segment::Text(&rest[..start + 2]));
            rest = after;
            continue;
        }
        emit(Segment::Text(&rest[..start]));
        emit(Segment::Placeholder(name));
        rest = &after[end + 2..];
    }
    emit(Segment::Text(rest));
}

pub fn button(id: &str, label: &str) -> String {
    format!(r#"<button id="{}">{}</button>"#, escape(id), escape(label))
}

/// Render a datasheet as a table. The first row is the header.
pub fn render_table<Row, Cell>(datasheet: &[Row]) -> String
where
    Row: AsRef<[Cell]>,
    Cell: fmt::Display,
{
    let mut out = String::from("<table>");
    for (i, row) in datasheet.iter().enumerate() {
        let tag = if i == 0 { "th" } else { "td" };
        out.push_str("<tr>");
        for cell in row.as_ref() {
            let _ = write!(out, "<{tag}>{}</{tag}>", escape(&cell.to_string()));
        }
        out.push_str("</tr>");
    }
    out.push_str("</table>");
    out
}

/// Static component showing a datasheet.
pub fn table_component<Row, Cell>(name: impl Into<String>, datasheet: &[Row]) -> ComponentClass
where
    Row: AsRef<[Cell]>,
    Cell: fmt::Display,
{
    ComponentClass::new(name).html(render_table(datasheet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn placeholders_allow_optional_spaces() {
        assert_eq!(placeholders("{{count}} and {{ total }}"), vec!["count", "total"]);
    }

    #[test]
    fn render_escapes_values() {
        let mut vars = Payload::new();
        vars.insert("q".into(), json!("<b>"));
        let html = render_template("<p>{{ q }}</p>", &vars);
        assert_eq!(html, r#"<p><span data-sundash-var="q">&lt;b&gt;</span></p>"#);
    }

    #[test]
    fn unknown_placeholder_is_kept() {
        let html = render_template("{{ missing }}", &Payload::new());
        assert_eq!(html, "{{ missing }}");
    }

    #[test]
    fn braces_without_name_are_text() {
        assert_eq!(render_template("{{ }} x", &Payload::new()), "{{ }} x");
        assert!(placeholders("a {{ b").is_empty());
    }

    #[test]
    fn table_has_header_row() {
        let html = render_table(&[vec!["company", "employees"], vec!["Alfreds", "65"]]);
        assert_eq!(
            html,
            "<table><tr><th>company</th><th>employees</th></tr><tr><td>Alfreds</td><td>65</td></tr></table>"
        );
    }
}
