// SPDX-License-Identifier: MPL-2.0

//! Standalone HTML page that lays tooltips out in a grid for capture.

use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

/// Element whose bounding box decides the screenshot size
pub const GRID_ID: &str = "tooltip-grid";

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());

/// Drop script blocks from armory markup before it is cached or rendered.
pub fn sanitize(markup: &str) -> String {
    SCRIPT_RE.replace_all(markup, "").trim().to_string()
}

/// Build the capture page. `columns` is capped by the number of fragments.
pub fn document(fragments: &[String], stylesheets: &[String], columns: usize) -> String {
    let columns = columns.clamp(1, fragments.len().max(1));

    let mut html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    for href in stylesheets {
        let _ = writeln!(html, "<link rel=\"stylesheet\" href=\"{}\">", escape_attr(href));
    }
    let _ = writeln!(
        html,
        "<style>\n\
         html, body {{ margin: 0; padding: 0; background: transparent; }}\n\
         #{GRID_ID} {{ display: inline-grid; grid-template-columns: repeat({columns}, max-content); \
         gap: 8px; align-items: start; }}\n\
         #{GRID_ID} > .cell {{ position: relative; }}\n\
         </style>"
    );
    html.push_str("</head>\n<body>\n");
    let _ = writeln!(html, "<div id=\"{GRID_ID}\">");
    for fragment in fragments {
        let _ = writeln!(html, "<div class=\"cell\">{fragment}</div>");
    }
    html.push_str("</div>\n</body>\n</html>\n");
    html
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
