//! Prompt construction and LaTeX document normalisation.
//!
//! Model output is rarely a clean, compilable document: it may be wrapped in
//! Markdown fences, be a bare fragment, or miss the `document` environment.
//! [`normalize`] turns all of these into a complete document.

use std::ops::Range;

/// Instruction sent to the model with every conversion.
pub const SYSTEM_INSTRUCTION: &str = "\
You are an advanced text-to-LaTeX converter.
Your only job is to turn whatever text you receive into a well structured LaTeX document. The result must:
- ALWAYS be pure LaTeX code, with no explanations, no extra prose, no Markdown and no comments outside the code.
- Organise the content into sections, subsections and paragraphs where appropriate.
- Keep correct formatting for lists, equations, tables and any other element present in the input.
- Produce a tidy, aesthetically organised document structure.
- Preserve the language of the input text.";

const PLAIN_INSTRUCTIONS: &str = "Convert the following text into valid LaTeX code. \
Output only the LaTeX code, without comments or additional explanations.";

const MATH_INSTRUCTIONS: &str = "Convert the following text, which contains mathematical notation, \
into valid LaTeX code. Every mathematical expression must be wrapped in math-mode delimiters \
(\\( \\) inline or \\[ \\] for display). Output only the LaTeX code, without comments or \
additional explanations.";

const DOCUMENT_CLASS: &str = "\\documentclass";
const BEGIN_DOCUMENT: &str = "\\begin{document}";
const END_DOCUMENT: &str = "\\end{document}";

/// Markers that open a math-mode region.
const MATH_DELIMITERS: &[&str] = &[
    "$",
    "\\(",
    "\\[",
    "\\begin{equation",
    "\\begin{align",
    "\\begin{gather",
    "\\begin{multline",
    "\\begin{eqnarray",
    "\\begin{math}",
    "\\begin{displaymath}",
];

/// Build the user prompt for a conversion request.
#[must_use]
pub fn build_prompt(text: &str, math_mode: bool) -> String {
    let instructions = if math_mode {
        MATH_INSTRUCTIONS
    } else {
        PLAIN_INSTRUCTIONS
    };
    format!("{instructions}\n\nText: {text}\n\nLaTeX code:")
}

/// Remove a surrounding Markdown code fence (```` ```latex ... ``` ````).
#[must_use]
pub fn strip_code_fences(source: &str) -> &str {
    let mut s = source.trim();
    if s.starts_with("```") {
        s = match s.find('\n') {
            Some(pos) => &s[pos + 1..],
            None => "",
        };
    }
    if let Some(stripped) = s.trim_end().strip_suffix("```") {
        s = stripped;
    }
    s.trim()
}

/// Wrap a document body in the minimal preamble.
fn minimal_document(body: &str) -> String {
    format!(
        "\\documentclass[12pt]{{article}}
\\usepackage[utf8]{{inputenc}}
\\usepackage[T1]{{fontenc}}
\\usepackage{{amsmath}}
\\usepackage{{amssymb}}
\\usepackage{{graphicx}}

\\begin{{document}}

{body}

\\end{{document}}
"
    )
}

/// Byte range of the trimmed text between `\begin{document}` and `\end{document}`.
fn body_range(source: &str) -> Option<Range<usize>> {
    let start = source.find(BEGIN_DOCUMENT)? + BEGIN_DOCUMENT.len();
    let end = source.rfind(END_DOCUMENT)?;
    if end < start {
        return None;
    }
    let raw = &source[start..end];
    let lead = raw.len() - raw.trim_start().len();
    let len = raw.trim().len();
    Some(start + lead..start + lead + len)
}

/// Text between `\begin{document}` and `\end{document}`, if both are present in order.
#[must_use]
pub fn document_body(source: &str) -> Option<&str> {
    body_range(source).map(|r| &source[r])
}

fn is_preamble_line(line: &str) -> bool {
    let line = line.trim();
    line.is_empty()
        || line.starts_with(DOCUMENT_CLASS)
        || line.starts_with('%')
        || line.starts_with("\\use")
}

/// Ensure `source` is a complete, compilable LaTeX document.
///
/// - complete documents are returned trimmed
/// - fragments (with or without a `document` environment) get the minimal preamble
/// - documents with a `\documentclass` but a missing `document` environment get
///   `\begin{document}` after the preamble and `\end{document}` at the end
#[must_use]
pub fn normalize(source: &str) -> String {
    let trimmed = strip_code_fences(source);

    let has_class = trimmed.contains(DOCUMENT_CLASS);
    let has_begin = trimmed.contains(BEGIN_DOCUMENT);
    let has_end = trimmed.contains(END_DOCUMENT);

    if has_class && has_begin && has_end {
        return trimmed.to_string();
    }

    if !has_class {
        let body = if has_begin && has_end {
            document_body(trimmed).unwrap_or(trimmed)
        } else {
            trimmed
        };
        return minimal_document(body);
    }

    if has_begin {
        // Preamble and body are there, only the closing is missing.
        return format!("{trimmed}\n{END_DOCUMENT}\n");
    }

    let mut preamble = Vec::new();
    let mut content = Vec::new();
    let mut in_preamble = true;
    for line in trimmed.lines() {
        if in_preamble && is_preamble_line(line) {
            preamble.push(line);
        } else {
            in_preamble = false;
            content.push(line);
        }
    }

    let mut doc = preamble.join("\n");
    doc.push('\n');
    doc.push_str(BEGIN_DOCUMENT);
    doc.push_str("\n\n");
    doc.push_str(&content.join("\n"));
    if !has_end {
        doc.push('\n');
        doc.push_str(END_DOCUMENT);
        doc.push('\n');
    }
    doc
}

/// Whether `source` contains any math-mode delimiter.
#[must_use]
pub fn has_math_delimiters(source: &str) -> bool {
    MATH_DELIMITERS.iter().any(|d| source.contains(d))
}

/// Wrap the paragraphs of a document body in display math when the model
/// ignored the math-mode instruction.
#[must_use]
pub fn ensure_math_delimiters(document: String) -> String {
    let Some(range) = body_range(&document) else {
        return document;
    };
    let body = &document[range.clone()];
    if body.is_empty() || has_math_delimiters(body) {
        return document;
    }

    let wrapped = body
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("\\[\n{p}\n\\]"))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut out = String::with_capacity(document.len() + wrapped.len());
    out.push_str(&document[..range.start]);
    out.push_str(&wrapped);
    out.push_str(&document[range.end..]);
    out
}
