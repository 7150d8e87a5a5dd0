//! Pure Markdown analysis: raw text in, structured facts out.
//!
//! Two passes. A structural, line-oriented pass builds headings and task
//! lines (tasks need the chain of enclosing headings). A lexical pass pulls
//! `#tag` and `[[wikilink]]` tokens straight out of the raw text; those are
//! regex-shaped, not structural. Analysis never fails: malformed input
//! degrades to whatever partial structure can be extracted.

use chrono::NaiveDate;
use pulldown_cmark::{Event, Parser};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    pub title: Option<String>,
    pub headings: Vec<Heading>,
    pub todos: Vec<TodoLine>,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub plain_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoLine {
    /// 1-based line number in the raw file. Advisory only; content is the
    /// source of truth on rewrite.
    pub line_number: usize,
    pub description: String,
    pub completed: bool,
    /// Enclosing headings joined with " > ", outermost first.
    pub heading_path: String,
    pub context: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<NaiveDate>,
}

pub struct Analyzer {
    heading_regex: Regex,
    task_regex: Regex,
    tag_regex: Regex,
    wikilink_regex: Regex,
}

impl Analyzer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            heading_regex: Regex::new(r"^(#{1,6})\s+(.+?)\s*$")?,
            task_regex: Regex::new(r"^\s*[-*+]\s+\[( |x|X)\]\s+(.*)$")?,
            tag_regex: Regex::new(r"(?m)(?:^|\s)#([a-zA-Z0-9_/-]+)")?,
            wikilink_regex: Regex::new(r"\[\[([^\]|]+)(?:\|([^\]]+))?\]\]")?,
        })
    }

    pub fn analyze(&self, raw: &str) -> Analysis {
        let (frontmatter_tags, body_start_line) = extract_frontmatter_tags(raw);

        let mut analysis = Analysis::default();
        analysis.tags = frontmatter_tags;

        self.structural_pass(raw, body_start_line, &mut analysis);
        self.lexical_pass(raw, body_start_line, &mut analysis);
        analysis.plain_text = self.plain_text(raw, body_start_line);

        analysis.title = analysis
            .headings
            .iter()
            .find(|h| h.level == 1)
            .map(|h| h.text.clone());

        analysis
    }

    fn structural_pass(&self, raw: &str, body_start_line: usize, analysis: &mut Analysis) {
        // Stack of (level, text) for the currently open headings.
        let mut heading_stack: Vec<(u8, String)> = Vec::new();
        let mut in_fence = false;

        for (idx, line) in raw.lines().enumerate() {
            if idx < body_start_line {
                continue;
            }
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }

            if let Some(cap) = self.heading_regex.captures(line) {
                let level = cap[1].len() as u8;
                let text = cap[2].to_string();
                while heading_stack.last().is_some_and(|(l, _)| *l >= level) {
                    heading_stack.pop();
                }
                heading_stack.push((level, text.clone()));
                let slug = slugify(&text);
                analysis.headings.push(Heading { level, text, slug });
                continue;
            }

            if let Some(cap) = self.task_regex.captures(line) {
                let completed = !cap[1].trim().is_empty();
                let heading_path = heading_stack
                    .iter()
                    .map(|(_, t)| t.as_str())
                    .collect::<Vec<_>>()
                    .join(" > ");
                let mut todo = parse_task_metadata(&cap[2]);
                todo.line_number = idx + 1;
                todo.completed = completed;
                todo.heading_path = heading_path;
                analysis.todos.push(todo);
            }
        }
    }

    fn lexical_pass(&self, raw: &str, body_start_line: usize, analysis: &mut Analysis) {
        let body = &raw[line_byte_offset(raw, body_start_line)..];

        for cap in self.tag_regex.captures_iter(body) {
            let tag = cap[1].to_string();
            if !analysis.tags.contains(&tag) {
                analysis.tags.push(tag);
            }
        }

        for cap in self.wikilink_regex.captures_iter(body) {
            let target = cap[1].trim().to_string();
            if !target.is_empty() && !analysis.links.contains(&target) {
                analysis.links.push(target);
            }
        }
    }

    /// Rendered plain text for the full-text index row.
    fn plain_text(&self, raw: &str, body_start_line: usize) -> String {
        let body = &raw[line_byte_offset(raw, body_start_line)..];

        let mut text = String::new();
        for event in Parser::new(body) {
            match event {
                Event::Text(t) => text.push_str(&t),
                Event::Code(t) => text.push_str(&t),
                Event::SoftBreak | Event::HardBreak => text.push(' '),
                Event::Start(_) | Event::End(_) => text.push(' '),
                _ => {}
            }
        }

        let text = self.wikilink_regex.replace_all(&text, "$1");
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Parses and strips inline task metadata: `due:YYYY-MM-DD`,
/// `priority:<word>` and `@context` tokens.
fn parse_task_metadata(raw_description: &str) -> TodoLine {
    let mut description = Vec::new();
    let mut context = None;
    let mut priority = None;
    let mut due_date = None;

    for token in raw_description.split_whitespace() {
        if let Some(rest) = token.strip_prefix("due:") {
            if let Ok(date) = NaiveDate::parse_from_str(rest, "%Y-%m-%d") {
                due_date = Some(date);
                continue;
            }
        }
        if let Some(rest) = token.strip_prefix("priority:") {
            if !rest.is_empty() {
                priority = Some(rest.to_string());
                continue;
            }
        }
        if let Some(rest) = token.strip_prefix('@') {
            if !rest.is_empty() && context.is_none() {
                context = Some(rest.to_string());
                continue;
            }
        }
        description.push(token);
    }

    TodoLine {
        line_number: 0,
        description: description.join(" "),
        completed: false,
        heading_path: String::new(),
        context,
        priority,
        due_date,
    }
}

/// Returns tags declared in YAML frontmatter and the 0-based line index where
/// the body starts. Malformed or unterminated frontmatter contributes nothing.
fn extract_frontmatter_tags(raw: &str) -> (Vec<String>, usize) {
    let mut lines = raw.lines();
    if lines.next().map(str::trim) != Some("---") {
        return (Vec::new(), 0);
    }

    let mut yaml = String::new();
    let mut consumed = 1usize;
    let mut terminated = false;
    for line in lines {
        consumed += 1;
        if line.trim() == "---" {
            terminated = true;
            break;
        }
        yaml.push_str(line);
        yaml.push('\n');
    }
    if !terminated {
        return (Vec::new(), 0);
    }

    let tags = match serde_yaml::from_str::<serde_yaml::Value>(&yaml) {
        Ok(serde_yaml::Value::Mapping(map)) => match map.get("tags") {
            Some(serde_yaml::Value::String(s)) => vec![s.clone()],
            Some(serde_yaml::Value::Sequence(seq)) => seq
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    (tags, consumed)
}

/// Byte offset where the given 0-based line starts. Counts newline bytes
/// rather than summing line lengths, so CRLF endings stay exact. The result
/// always sits just past a `\n`, hence on a char boundary.
fn line_byte_offset(raw: &str, line_index: usize) -> usize {
    if line_index == 0 {
        return 0;
    }
    let mut seen = 0usize;
    for (i, b) in raw.bytes().enumerate() {
        if b == b'\n' {
            seen += 1;
            if seen == line_index {
                return i + 1;
            }
        }
    }
    raw.len()
}

fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}
