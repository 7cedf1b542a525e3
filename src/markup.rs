//! Markup clean-up for imported catalog text.

use itertools::Itertools;
use scraper::{node::Node, ElementRef, Html};

/// Elements dropped together with everything inside them.
const DROPPED: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "form", "input", "button", "select",
    "textarea", "template", "noscript", "head", "title", "meta", "link",
];

/// Elements kept in sanitized descriptions. Anything else is unwrapped to its
/// children.
const ALLOWED: &[&str] = &[
    "a", "abbr", "b", "blockquote", "br", "cite", "code", "del", "dd", "div", "dl", "dt",
    "em", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "ins", "li", "ol", "p", "pre", "q",
    "s", "small", "span", "strike", "strong", "sub", "sup", "u", "ul",
];

const VOID: &[&str] = &["br", "hr"];

pub const EXCERPT_WORDS: usize = 55;
const MORE: &str = "…";

/// Plain text of `html` with every tag removed.
pub fn strip_all_tags(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::new();
    collect_text(fragment.root_element(), &mut text);
    text.split_whitespace().join(" ")
}

/// Keeps a small set of formatting elements and safe link attributes.
pub fn sanitize(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    write_children(fragment.root_element(), &mut out);
    out.trim().to_string()
}

/// First `max_words` words of the plain text, with an ellipsis when cut.
pub fn excerpt(html: &str, max_words: usize) -> String {
    let text = strip_all_tags(html);
    let mut words = text.split_whitespace();
    let head = words.by_ref().take(max_words).join(" ");
    if words.next().is_some() {
        format!("{head}{MORE}")
    } else {
        head
    }
}

fn collect_text(element: ElementRef<'_>, text: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(el) if DROPPED.contains(&el.name()) => {}
            Node::Element(el) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, text);
                }
                if matches!(el.name(), "p" | "br" | "div" | "li") {
                    text.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn write_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(t) => out.push_str(&escape(t)),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(child, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let el = element.value();
    let name = el.name();
    if DROPPED.contains(&name) {
        return;
    }
    if !ALLOWED.contains(&name) {
        write_children(element, out);
        return;
    }

    out.push('<');
    out.push_str(name);
    for (attr, value) in el.attrs() {
        if attribute_allowed(name, attr, value) {
            out.push_str(&format!(" {attr}=\"{}\"", escape(value)));
        }
    }
    out.push('>');

    if VOID.contains(&name) {
        return;
    }
    write_children(element, out);
    out.push_str(&format!("</{name}>"));
}

fn attribute_allowed(element: &str, attr: &str, value: &str) -> bool {
    match (element, attr) {
        ("a", "href") => {
            let value = value.trim().to_ascii_lowercase();
            ["http://", "https://", "mailto:", "/", "#"]
                .iter()
                .any(|scheme| value.starts_with(scheme))
        }
        ("a", "title") | ("abbr", "title") | ("blockquote", "cite") | ("q", "cite") => true,
        _ => false,
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
