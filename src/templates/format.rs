// src/templates/format.rs
use lazy_static::lazy_static;
use regex::{Captures, Regex};

const COLORS: [&str; 10] = [
    "black", "red", "green", "yellow", "blue", "cyan", "magenta", "white", "orange", "gray",
];

lazy_static! {
    static ref COLOR_CODE: Regex = Regex::new(r"\^([0-9])").unwrap();
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escapes a name and turns its `^N` color codes into spans.
///
/// `"^1Hello ^7World! >>"` becomes
/// `<span class="white"></span><span class="red">Hello </span><span class="white">World! &gt;&gt;</span>`
pub fn format_name(name: &str) -> String {
    let escaped = escape_html(name);
    let colored = COLOR_CODE.replace_all(&escaped, |caps: &Captures| {
        let color = caps[1].parse::<usize>().map_or("white", |digit| COLORS[digit]);
        format!("</span><span class=\"{color}\">")
    });
    format!("<span class=\"white\">{colored}</span>")
}

/// Removes color codes. Does not escape anything.
pub fn strip_colors(name: &str) -> String {
    COLOR_CODE.replace_all(name, "").into_owned()
}
