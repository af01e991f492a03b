//! Text renderers.
//!
//! Rendering turns record text into display-ready HTML. The default
//! [`MarkdownRenderer`] handles the subset of markdown that notes use in
//! practice: headings, bullet and checklist items, fenced code blocks,
//! paragraphs, inline code and bold.

use framestore_core::{Category, Result};

/// Produces display output from source text.
pub trait Renderer: Send + Sync {
    /// Render `source`. Must be deterministic for equal input.
    fn render(&self, source: &str) -> Result<String>;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "renderer"
    }
}

/// Markdown to HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, source: &str) -> Result<String> {
        Ok(markdown_to_html(source))
    }

    fn name(&self) -> &'static str {
        "markdown"
    }
}

/// Escape `&`, `<`, `>`, `"` and `'`.
pub fn escape_html(text: &str) -> String {
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

/// Replace paired markers in already-escaped text with tags.
fn replace_pairs(text: &str, marker: &str, open: &str, close: &str) -> String {
    let parts: Vec<&str> = text.split(marker).collect();
    // An unpaired trailing marker stays literal.
    if parts.len() < 3 {
        return text.to_string();
    }
    let pairs = (parts.len() - 1) / 2;
    let mut out = String::with_capacity(text.len() + pairs * (open.len() + close.len()));
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            let closing = i % 2 == 0;
            if i > pairs * 2 {
                out.push_str(marker);
            } else if closing {
                out.push_str(close);
            } else {
                out.push_str(open);
            }
        }
        out.push_str(part);
    }
    out
}

fn inline(text: &str) -> String {
    let escaped = escape_html(text);
    let coded = replace_pairs(&escaped, "`", "<code>", "</code>");
    replace_pairs(&coded, "**", "<strong>", "</strong>")
}

fn heading_level(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&level) {
        line[level..].strip_prefix(' ').map(|rest| (level, rest))
    } else {
        None
    }
}

fn bullet(line: &str) -> Option<&str> {
    line.strip_prefix("- ").or_else(|| line.strip_prefix("* "))
}

/// Convert markdown to HTML.
pub fn markdown_to_html(source: &str) -> String {
    let mut html = String::with_capacity(source.len() + source.len() / 4);
    let mut paragraph: Vec<&str> = Vec::new();
    let mut in_list = false;
    let mut in_code = false;

    fn flush_paragraph(html: &mut String, paragraph: &mut Vec<&str>) {
        if !paragraph.is_empty() {
            html.push_str("<p>");
            html.push_str(&inline(&paragraph.join(" ")));
            html.push_str("</p>\n");
            paragraph.clear();
        }
    }

    fn close_list(html: &mut String, in_list: &mut bool) {
        if *in_list {
            html.push_str("</ul>\n");
            *in_list = false;
        }
    }

    for raw in source.lines() {
        if in_code {
            if raw.trim_start().starts_with("```") {
                html.push_str("</code></pre>\n");
                in_code = false;
            } else {
                html.push_str(&escape_html(raw));
                html.push('\n');
            }
            continue;
        }

        let line = raw.trim_end();
        if line.trim_start().starts_with("```") {
            flush_paragraph(&mut html, &mut paragraph);
            close_list(&mut html, &mut in_list);
            html.push_str("<pre><code>");
            in_code = true;
        } else if line.trim().is_empty() {
            flush_paragraph(&mut html, &mut paragraph);
            close_list(&mut html, &mut in_list);
        } else if let Some((level, text)) = heading_level(line) {
            flush_paragraph(&mut html, &mut paragraph);
            close_list(&mut html, &mut in_list);
            html.push_str(&format!("<h{level}>{}</h{level}>\n", inline(text)));
        } else if let Some(item) = bullet(line.trim_start()) {
            flush_paragraph(&mut html, &mut paragraph);
            if !in_list {
                html.push_str("<ul>\n");
                in_list = true;
            }
            let (class, text) = if let Some(rest) = item.strip_prefix("[ ] ") {
                (" class=\"todo\"", rest)
            } else if let Some(rest) = item
                .strip_prefix("[x] ")
                .or_else(|| item.strip_prefix("[X] "))
            {
                (" class=\"done\"", rest)
            } else {
                ("", item)
            };
            html.push_str(&format!("<li{class}>{}</li>\n", inline(text)));
        } else {
            close_list(&mut html, &mut in_list);
            paragraph.push(line.trim());
        }
    }

    flush_paragraph(&mut html, &mut paragraph);
    close_list(&mut html, &mut in_list);
    if in_code {
        html.push_str("</code></pre>\n");
    }
    html
}

/// Render a record body according to its category.
pub fn render_for_category(
    renderer: &dyn Renderer,
    category: Category,
    title: &str,
    body: &str,
) -> Result<String> {
    match category {
        Category::Code => Ok(format!("<pre><code>{}</code></pre>\n", escape_html(body))),
        Category::Link => {
            let url = body.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
            let label = if title.trim().is_empty() { url } else { title.trim() };
            Ok(format!(
                "<a href=\"{}\">{}</a>\n",
                escape_html(url),
                escape_html(label)
            ))
        }
        Category::Note | Category::Markdown | Category::Checklist | Category::Other => {
            renderer.render(body)
        }
    }
}

/// First `chars` characters of `text`, with an ellipsis when cut.
pub fn placeholder(text: &str, chars: usize) -> String {
    match text.char_indices().nth(chars) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + 3);
            out.push_str(&text[..cut]);
            out.push('…');
            out
        }
        None => text.to_string(),
    }
}
