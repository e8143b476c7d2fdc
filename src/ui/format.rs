//! Response formatting
//!
//! Converts raw model text into terminal output: markdown structure via
//! pulldown-cmark, fenced code blocks highlighted with syntect, raw HTML
//! rendered as literal text so nothing a model emits is ever interpreted.
//! [`format_answer`] is a pure function of its input; the same text always
//! formats to the same output.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use std::sync::OnceLock;
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::as_24_bit_terminal_escaped;

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const ITALIC: &str = "\x1b[3m";
pub const CYAN: &str = "\x1b[36m";

#[derive(Clone, Copy, Debug)]
pub struct FormatOptions {
    pub markdown: bool,
    pub syntax: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            markdown: true,
            syntax: true,
        }
    }
}

fn syntax_set() -> &'static SyntaxSet {
    static SYNTAXES: OnceLock<SyntaxSet> = OnceLock::new();
    SYNTAXES.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn theme_set() -> &'static ThemeSet {
    static THEMES: OnceLock<ThemeSet> = OnceLock::new();
    THEMES.get_or_init(ThemeSet::load_defaults)
}

/// Remove `<think>…</think>` reasoning blocks that some models emit ahead
/// of their answer.
pub fn strip_reasoning_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find("<think>") {
            Some(open) => {
                out.push_str(&rest[..open]);
                match rest[open..].find("</think>") {
                    Some(close) => {
                        rest = &rest[open + close + "</think>".len()..];
                    }
                    None => {
                        // Unterminated block: drop everything after the tag.
                        break;
                    }
                }
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out.trim_start_matches('\n').to_string()
}

fn highlight_code(code: &str, lang: &str, syntax_enabled: bool) -> String {
    if !syntax_enabled || lang.is_empty() {
        return code.trim_end().to_string();
    }

    let syntaxes = syntax_set();
    let Some(syntax) = syntaxes
        .find_syntax_by_token(lang)
        .or_else(|| syntaxes.find_syntax_by_extension(lang))
    else {
        return code.trim_end().to_string();
    };

    let theme = &theme_set().themes["base16-ocean.dark"];
    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut out = String::new();
    for line in code.lines() {
        match highlighter.highlight_line(line, syntaxes) {
            Ok(ranges) => {
                out.push_str(&as_24_bit_terminal_escaped(&ranges[..], false));
                out.push_str(RESET);
                out.push('\n');
            }
            Err(_) => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out.trim_end().to_string()
}

/// Format one model answer for the terminal. Pure and deterministic.
pub fn format_answer(text: &str, options: &FormatOptions) -> String {
    if !options.markdown {
        return text.trim_end().to_string();
    }

    let mut parser_options = Options::empty();
    parser_options.insert(Options::ENABLE_STRIKETHROUGH);
    parser_options.insert(Options::ENABLE_TABLES);
    let parser = Parser::new_ext(text, parser_options);

    let mut out = String::new();
    let mut code_buffer: Option<(String, String)> = None;
    let mut list_depth: usize = 0;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => out.push_str(BOLD),
            Event::End(TagEnd::Heading(_)) => {
                out.push_str(RESET);
                out.push_str("\n\n");
            }
            Event::Start(Tag::Strong) => out.push_str(BOLD),
            Event::End(TagEnd::Strong) => out.push_str(RESET),
            Event::Start(Tag::Emphasis) => out.push_str(ITALIC),
            Event::End(TagEnd::Emphasis) => out.push_str(RESET),
            Event::Start(Tag::Paragraph) => {}
            Event::End(TagEnd::Paragraph) => out.push_str("\n\n"),
            Event::Start(Tag::List(_)) => list_depth += 1,
            Event::End(TagEnd::List(_)) => {
                list_depth = list_depth.saturating_sub(1);
                if list_depth == 0 {
                    out.push('\n');
                }
            }
            Event::Start(Tag::Item) => {
                out.push_str(&"  ".repeat(list_depth.saturating_sub(1)));
                out.push_str("• ");
            }
            Event::End(TagEnd::Item) => out.push('\n'),
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) => lang.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                code_buffer = Some((lang, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((lang, code)) = code_buffer.take() {
                    out.push_str(&highlight_code(&code, &lang, options.syntax));
                    out.push_str("\n\n");
                }
            }
            Event::Text(t) => {
                if let Some((_, code)) = code_buffer.as_mut() {
                    code.push_str(&t);
                } else {
                    out.push_str(&t);
                }
            }
            Event::Code(code) => {
                out.push_str(CYAN);
                out.push_str(&code);
                out.push_str(RESET);
            }
            // Raw HTML is never interpreted; it is shown literally.
            Event::Html(html) | Event::InlineHtml(html) => out.push_str(&html),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::Rule => out.push_str(&format!("{DIM}────────{RESET}\n\n")),
            _ => {}
        }
    }

    out.trim_end().to_string()
}
