//! Output normalization for written files
//!
//! Transforms splice tokens from different sources into one file, so the indentation of the result is rarely
//! consistent. Before a file is written every line is re-indented by its bracket nesting depth (two spaces per
//! level), trailing whitespace and leading blank lines are removed. Heredoc bodies and the inner lines of
//! multi-line comments are left untouched.
//!
//! Like `terraform fmt`, the `=` of consecutive `key = value` lines at the same depth is aligned. Any other line
//! (blank, comment, block header, closing bracket) ends such a group.

const INDENT: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Context {
    Code,
    String,
    /// `${ ... }` or `%{ ... }` inside a string, with its own brace depth
    Interpolation(usize),
}

#[derive(Debug, Default)]
struct Scanner {
    stack: Vec<Context>,
    depth: usize,
    block_comment: bool,
    heredoc: Option<String>,
}

impl Scanner {
    fn context(&self) -> Context {
        self.stack.last().copied().unwrap_or(Context::Code)
    }

    /// Only lines that start at the top level code context are re-indented
    fn at_code_start(&self) -> bool {
        self.heredoc.is_none() && !self.block_comment && self.context() == Context::Code
    }

    fn scan_line(&mut self, line: &str) {
        if let Some(terminator) = &self.heredoc {
            if line.trim() == terminator {
                self.heredoc = None;
            }
            return;
        }

        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if self.block_comment {
                if c == '*' && next == Some('/') {
                    self.block_comment = false;
                    i += 1;
                }
                i += 1;
                continue;
            }

            match self.context() {
                Context::String => match c {
                    '\\' => i += 1,
                    '"' => {
                        self.stack.pop();
                    }
                    '$' | '%' if next == Some('{') => {
                        self.stack.push(Context::Interpolation(0));
                        i += 1;
                    }
                    _ => {}
                },
                context => match c {
                    '#' => break,
                    '/' if next == Some('/') => break,
                    '/' if next == Some('*') => {
                        self.block_comment = true;
                        i += 1;
                    }
                    '"' => self.stack.push(Context::String),
                    '<' if next == Some('<') && context == Context::Code => {
                        let rest: String = chars[i + 2..].iter().collect();
                        let marker = rest.trim_start_matches('-').trim();
                        if !marker.is_empty() && marker.chars().all(|c| c.is_alphanumeric() || c == '_') {
                            self.heredoc = Some(marker.to_string());
                            return;
                        }
                        i += 1;
                    }
                    '{' | '[' | '(' => match context {
                        Context::Interpolation(depth) => {
                            self.stack.pop();
                            self.stack.push(Context::Interpolation(depth + 1));
                        }
                        _ => self.depth += 1,
                    },
                    '}' | ']' | ')' => match context {
                        Context::Interpolation(0) => {
                            self.stack.pop();
                        }
                        Context::Interpolation(depth) => {
                            self.stack.pop();
                            self.stack.push(Context::Interpolation(depth - 1));
                        }
                        _ => self.depth = self.depth.saturating_sub(1),
                    },
                    _ => {}
                },
            }
            i += 1;
        }
    }
}

fn leading_closers(line: &str) -> usize {
    line.chars().take_while(|c| matches!(c, '}' | ']' | ')')).count()
}

/// A line of `key = value` at the start of a statement
#[derive(Debug)]
struct Assignment<'a> {
    indent: usize,
    key: &'a str,
    value: &'a str,
}

fn assignment(indent: usize, trimmed: &str) -> Option<Assignment<'_>> {
    let key_len = trimmed
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(trimmed.len());
    if key_len == 0 || !trimmed.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        return None;
    }

    let (key, rest) = trimmed.split_at(key_len);
    let rest = rest.trim_start();
    let value = rest.strip_prefix('=')?;
    if value.starts_with(['=', '>']) {
        return None;
    }
    Some(Assignment {
        indent,
        key,
        value: value.trim_start(),
    })
}

enum Line<'a> {
    Assignment(Assignment<'a>),
    Text(String),
}

fn render_group(group: &mut Vec<Assignment>, output: &mut String) {
    let width = group.iter().map(|line| line.key.chars().count()).max().unwrap_or(0);
    for line in group.drain(..) {
        output.push_str(&INDENT.repeat(line.indent));
        output.push_str(line.key);
        output.push_str(&" ".repeat(width - line.key.chars().count()));
        output.push_str(" = ");
        output.push_str(line.value);
        output.push('\n');
    }
}

/// Re-indents HCL source text and aligns assignments
pub fn format(source: &str) -> String {
    let mut scanner = Scanner::default();
    let mut lines = vec![];

    for line in source.lines() {
        if lines.is_empty() && line.trim().is_empty() {
            continue;
        }

        if scanner.at_code_start() {
            let trimmed = line.trim();
            let indent = scanner.depth.saturating_sub(leading_closers(trimmed));
            match assignment(indent, trimmed) {
                Some(assignment) => lines.push(Line::Assignment(assignment)),
                None if trimmed.is_empty() => lines.push(Line::Text(String::new())),
                None => lines.push(Line::Text(format!("{}{trimmed}", INDENT.repeat(indent)))),
            }
        } else {
            lines.push(Line::Text(line.to_string()));
        }
        scanner.scan_line(line);
    }

    let mut output = String::with_capacity(source.len());
    let mut group: Vec<Assignment> = vec![];
    for line in lines {
        match line {
            Line::Assignment(assignment) => {
                if group.last().is_some_and(|last| last.indent != assignment.indent) {
                    render_group(&mut group, &mut output);
                }
                group.push(assignment);
            }
            Line::Text(text) => {
                render_group(&mut group, &mut output);
                output.push_str(&text);
                output.push('\n');
            }
        }
    }
    render_group(&mut group, &mut output);

    let trimmed_len = output.trim_end_matches('\n').len();
    output.truncate(trimmed_len);
    if !output.is_empty() {
        output.push('\n');
    }
    output
}
