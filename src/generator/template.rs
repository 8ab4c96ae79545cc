//! Text templating for service configuration files
//!
//! Templates use `{{ ... }}` actions over a serialized context object:
//!
//! - `{{ .home_dir }}` / `{{ .node_set.name }}` look up a field path
//! - `{{ .prefix | upper }}` pipes a value into a function (the piped value
//!   is passed as the last argument)
//! - `{{ env "HOME" }}` calls a function directly
//! - `{{ and (eq .mode "validator") (gt .index 0) }}` nests calls in parentheses
//! - `{{- ... -}}` trims surrounding whitespace
//!
//! Block actions follow the usual `if`/`else if`/`else`/`end`, `range` and
//! `with` forms. `range` and `with` rebind `.` to the element or value while
//! `$` always refers to the whole context. Empty values (missing, `false`,
//! `0`, `""`, empty lists and maps) are false.
//!
//! The function library covers the usual string helpers (`upper`, `lower`,
//! `trim`, `quote`, `squote`, `replace`, `trimPrefix`, `trimSuffix`,
//! `contains`, `join`), `default`, integer arithmetic (`add`, `add1`, `sub`,
//! `mul`), comparisons and logic (`eq`, `ne`, `lt`, `le`, `gt`, `ge`, `and`,
//! `or`, `not`, `len`), `env` and `toJson`.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while parsing or executing a template
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template parse error: {0}")]
    Parse(String),

    #[error("Unknown template function: {0}")]
    UnknownFunction(String),

    #[error("Template value '{0}' is not set")]
    MissingValue(String),

    #[error("Function '{func}' expects {expected} argument(s), got {got}")]
    Arity {
        func: String,
        expected: usize,
        got: usize,
    },

    #[error("Function '{func}': {message}")]
    InvalidArgument { func: String, message: String },

    #[error("Failed to serialize template context: {0}")]
    Context(#[from] serde_json::Error),
}

/// A config type whose marked string fields are rendered as templates.
///
/// Implementors return mutable references to exactly the fields that accept
/// template syntax; everything else is left untouched.
pub trait Templatable {
    fn templated_fields(&mut self) -> Vec<&mut String>;
}

impl<T: Templatable> Templatable for Option<T> {
    fn templated_fields(&mut self) -> Vec<&mut String> {
        match self {
            Some(inner) => inner.templated_fields(),
            None => Vec::new(),
        }
    }
}

impl<T: Templatable> Templatable for Vec<T> {
    fn templated_fields(&mut self) -> Vec<&mut String> {
        self.iter_mut().flat_map(|t| t.templated_fields()).collect()
    }
}

/// Render every templated field of `target` in place
pub fn render_fields<T, C>(target: &mut T, ctx: &C) -> Result<(), TemplateError>
where
    T: Templatable + ?Sized,
    C: Serialize,
{
    let ctx = serde_json::to_value(ctx)?;
    for field in target.templated_fields() {
        if field.contains("{{") {
            *field = render(field, &ctx)?;
        }
    }
    Ok(())
}

/// Render a template against any serializable context
pub fn render_with<C: Serialize>(template: &str, ctx: &C) -> Result<String, TemplateError> {
    let ctx = serde_json::to_value(ctx)?;
    render(template, &ctx)
}

fn action_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)\{\{(-?)(.*?)(-?)\}\}").expect("static template pattern is valid")
    })
}

/// Render a template against a JSON context
pub fn render(template: &str, ctx: &Value) -> Result<String, TemplateError> {
    let nodes = parse(template)?;
    let mut output = String::with_capacity(template.len());
    execute(&nodes, Scope { root: ctx, dot: ctx }, &mut output)?;
    Ok(output)
}

enum Segment {
    Text(String),
    Action(String),
}

/// Split a template into literal text and action bodies, applying trim markers
fn lex(template: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut last = 0;
    let mut trim_next = false;

    for caps in action_pattern().captures_iter(template) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        let mut literal = &template[last..whole.start];
        if trim_next {
            literal = literal.trim_start();
        }
        if caps.get(1).is_some_and(|m| !m.as_str().is_empty()) {
            literal = literal.trim_end();
        }
        if !literal.is_empty() {
            segments.push(Segment::Text(literal.to_string()));
        }

        let expr = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        if !expr.starts_with("/*") {
            segments.push(Segment::Action(expr.to_string()));
        }

        trim_next = caps.get(3).is_some_and(|m| !m.as_str().is_empty());
        last = whole.end;
    }

    let mut tail = &template[last..];
    if trim_next {
        tail = tail.trim_start();
    }
    if tail.contains("{{") {
        return Err(TemplateError::Parse(format!(
            "unclosed action near '{}'",
            tail.chars().take(30).collect::<String>()
        )));
    }
    if !tail.is_empty() {
        segments.push(Segment::Text(tail.to_string()));
    }

    Ok(segments)
}

#[derive(Debug)]
enum Node {
    Text(String),
    Output(Pipeline),
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    Range {
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    With {
        pipeline: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// What ended a list of nodes
enum Stop {
    Eof,
    End,
    Else,
    ElseIf(Pipeline),
}

type Segments = std::vec::IntoIter<Segment>;

fn parse(template: &str) -> Result<Vec<Node>, TemplateError> {
    let mut segments = lex(template)?.into_iter();
    match parse_list(&mut segments)? {
        (nodes, Stop::Eof) => Ok(nodes),
        (_, Stop::End) => Err(TemplateError::Parse("unexpected {{ end }}".to_string())),
        (_, Stop::Else | Stop::ElseIf(_)) => {
            Err(TemplateError::Parse("unexpected {{ else }}".to_string()))
        }
    }
}

fn split_keyword(action: &str) -> (&str, &str) {
    match action.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (action, ""),
    }
}

fn parse_list(segments: &mut Segments) -> Result<(Vec<Node>, Stop), TemplateError> {
    let mut nodes = Vec::new();

    while let Some(segment) = segments.next() {
        let action = match segment {
            Segment::Text(text) => {
                nodes.push(Node::Text(text));
                continue;
            }
            Segment::Action(action) => action,
        };

        let (keyword, rest) = split_keyword(&action);
        match keyword {
            "end" if rest.is_empty() => return Ok((nodes, Stop::End)),
            "end" => {
                return Err(TemplateError::Parse(format!("unexpected '{}' after end", rest)));
            }
            "else" if rest.is_empty() => return Ok((nodes, Stop::Else)),
            "else" => match split_keyword(rest) {
                ("if", cond) => return Ok((nodes, Stop::ElseIf(block_pipeline("else if", cond)?))),
                _ => {
                    return Err(TemplateError::Parse(format!("unexpected 'else {}'", rest)));
                }
            },
            "if" => nodes.push(parse_if(block_pipeline("if", rest)?, segments)?),
            "range" => {
                let pipeline = block_pipeline("range", rest)?;
                let (body, otherwise) = parse_scoped("range", segments)?;
                nodes.push(Node::Range {
                    pipeline,
                    body,
                    otherwise,
                });
            }
            "with" => {
                let pipeline = block_pipeline("with", rest)?;
                let (body, otherwise) = parse_scoped("with", segments)?;
                nodes.push(Node::With {
                    pipeline,
                    body,
                    otherwise,
                });
            }
            _ => nodes.push(Node::Output(Pipeline::parse(&action)?)),
        }
    }

    Ok((nodes, Stop::Eof))
}

fn block_pipeline(keyword: &str, source: &str) -> Result<Pipeline, TemplateError> {
    if source.is_empty() {
        return Err(TemplateError::Parse(format!("missing value for '{}'", keyword)));
    }
    Pipeline::parse(source)
}

fn parse_if(cond: Pipeline, segments: &mut Segments) -> Result<Node, TemplateError> {
    let mut branches = Vec::new();
    let mut cond = cond;
    loop {
        let (body, stop) = parse_list(segments)?;
        branches.push((cond, body));
        match stop {
            Stop::End => {
                return Ok(Node::If {
                    branches,
                    otherwise: Vec::new(),
                })
            }
            Stop::ElseIf(next) => cond = next,
            Stop::Else => {
                let otherwise = parse_else("if", segments)?;
                return Ok(Node::If {
                    branches,
                    otherwise,
                });
            }
            Stop::Eof => return Err(missing_end("if")),
        }
    }
}

fn parse_scoped(
    keyword: &str,
    segments: &mut Segments,
) -> Result<(Vec<Node>, Vec<Node>), TemplateError> {
    let (body, stop) = parse_list(segments)?;
    match stop {
        Stop::End => Ok((body, Vec::new())),
        Stop::Else => Ok((body, parse_else(keyword, segments)?)),
        Stop::ElseIf(_) => Err(TemplateError::Parse(format!(
            "'else if' is not allowed in '{}'",
            keyword
        ))),
        Stop::Eof => Err(missing_end(keyword)),
    }
}

fn parse_else(keyword: &str, segments: &mut Segments) -> Result<Vec<Node>, TemplateError> {
    match parse_list(segments)? {
        (nodes, Stop::End) => Ok(nodes),
        (_, Stop::Eof) => Err(missing_end(keyword)),
        _ => Err(TemplateError::Parse(format!(
            "more than one else in '{}'",
            keyword
        ))),
    }
}

fn missing_end(keyword: &str) -> TemplateError {
    TemplateError::Parse(format!("missing {{{{ end }}}} for '{}'", keyword))
}

/// The values `.` and `$` refer to while executing
#[derive(Clone, Copy)]
struct Scope<'a> {
    root: &'a Value,
    dot: &'a Value,
}

fn execute(nodes: &[Node], scope: Scope<'_>, out: &mut String) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(pipeline) => {
                let value = pipeline.eval(scope)?;
                out.push_str(&value_to_string(&value, &pipeline.source)?);
            }
            Node::If {
                branches,
                otherwise,
            } => {
                let mut taken = otherwise;
                for (cond, body) in branches {
                    if !is_empty(&cond.eval(scope)?) {
                        taken = body;
                        break;
                    }
                }
                execute(taken, scope, out)?;
            }
            Node::With {
                pipeline,
                body,
                otherwise,
            } => {
                let value = pipeline.eval(scope)?;
                if is_empty(&value) {
                    execute(otherwise, scope, out)?;
                } else {
                    execute(body, Scope { root: scope.root, dot: &value }, out)?;
                }
            }
            Node::Range {
                pipeline,
                body,
                otherwise,
            } => {
                let value = pipeline.eval(scope)?;
                let items: Vec<&Value> = match &value {
                    Value::Array(items) => items.iter().collect(),
                    Value::Object(map) => map.values().collect(),
                    Value::Null => Vec::new(),
                    other => {
                        return Err(TemplateError::InvalidArgument {
                            func: "range".to_string(),
                            message: format!("cannot iterate over {}", other),
                        })
                    }
                };
                if items.is_empty() {
                    execute(otherwise, scope, out)?;
                }
                for item in items {
                    execute(body, Scope { root: scope.root, dot: item }, out)?;
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Field(String),
    Root(String),
    Str(String),
    Number(i64),
    Bool(bool),
    Pipe,
    LParen,
    RParen,
}

/// A tokenized `a | b c | d` expression, validated when the template is parsed
#[derive(Debug)]
struct Pipeline {
    source: String,
    tokens: Vec<Token>,
}

impl Pipeline {
    fn parse(source: &str) -> Result<Self, TemplateError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(TemplateError::Parse("empty action".to_string()));
        }
        validate(&tokens, source)?;
        Ok(Self {
            source: source.to_string(),
            tokens,
        })
    }

    fn eval(&self, scope: Scope<'_>) -> Result<Value, TemplateError> {
        eval_tokens(&self.tokens, scope, &self.source)
    }
}

fn tokenize(expr: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '|' {
            chars.next();
            tokens.push(Token::Pipe);
        } else if c == '(' {
            chars.next();
            tokens.push(Token::LParen);
        } else if c == ')' {
            chars.next();
            tokens.push(Token::RParen);
        } else if c == '"' {
            chars.next();
            let mut s = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some(other) => s.push(other),
                        None => break,
                    },
                    other => s.push(other),
                }
            }
            if !closed {
                return Err(TemplateError::Parse(format!("unterminated string in '{}'", expr)));
            }
            tokens.push(Token::Str(s));
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || matches!(c, '|' | '"' | '(' | ')') {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(classify_word(&word, expr)?);
        }
    }

    Ok(tokens)
}

fn classify_word(word: &str, expr: &str) -> Result<Token, TemplateError> {
    if word.starts_with('.') {
        return Ok(Token::Field(word.to_string()));
    }
    if let Some(path) = word.strip_prefix('$') {
        if path.is_empty() || path.starts_with('.') {
            return Ok(Token::Root(path.to_string()));
        }
    }
    if word == "true" || word == "false" {
        return Ok(Token::Bool(word == "true"));
    }
    if let Ok(n) = word.parse::<i64>() {
        return Ok(Token::Number(n));
    }
    if word.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Ok(Token::Ident(word.to_string()));
    }
    Err(TemplateError::Parse(format!("unexpected '{}' in '{}'", word, expr)))
}

/// Split a token stream on the pipes that are not inside parentheses
fn split_commands(tokens: &[Token]) -> Vec<&[Token]> {
    let mut commands = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Pipe if depth == 0 => {
                commands.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    commands.push(&tokens[start..]);
    commands
}

enum Term<'t> {
    Token(&'t Token),
    Group(&'t [Token]),
}

fn terms<'t>(command: &'t [Token], expr: &str) -> Result<Vec<Term<'t>>, TemplateError> {
    let mut terms = Vec::new();
    let mut i = 0;
    while i < command.len() {
        match &command[i] {
            Token::LParen => {
                let close = matching_paren(command, i, expr)?;
                terms.push(Term::Group(&command[i + 1..close]));
                i = close + 1;
            }
            Token::RParen => {
                return Err(TemplateError::Parse(format!("unexpected ')' in '{}'", expr)));
            }
            token => {
                terms.push(Term::Token(token));
                i += 1;
            }
        }
    }
    Ok(terms)
}

fn matching_paren(tokens: &[Token], open: usize, expr: &str) -> Result<usize, TemplateError> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(TemplateError::Parse(format!("unclosed '(' in '{}'", expr)))
}

fn validate(tokens: &[Token], expr: &str) -> Result<(), TemplateError> {
    for command in split_commands(tokens) {
        if command.is_empty() {
            return Err(TemplateError::Parse(format!("empty pipeline stage in '{}'", expr)));
        }
        for term in terms(command, expr)? {
            if let Term::Group(inner) = term {
                validate(inner, expr)?;
            }
        }
    }
    Ok(())
}

fn eval_tokens(tokens: &[Token], scope: Scope<'_>, expr: &str) -> Result<Value, TemplateError> {
    let mut piped: Option<Value> = None;
    for command in split_commands(tokens) {
        let terms = terms(command, expr)?;
        let (head, rest) = terms
            .split_first()
            .ok_or_else(|| TemplateError::Parse(format!("empty pipeline stage in '{}'", expr)))?;

        let value = match head {
            Term::Token(Token::Ident(name)) => {
                let mut args = rest
                    .iter()
                    .map(|t| term_value(t, scope, expr))
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(v) = piped.take() {
                    args.push(v);
                }
                call(name, args)?
            }
            other => {
                if piped.is_some() || !rest.is_empty() {
                    return Err(TemplateError::Parse(format!(
                        "expected a function name in '{}'",
                        expr
                    )));
                }
                term_value(other, scope, expr)?
            }
        };
        piped = Some(value);
    }

    Ok(piped.unwrap_or(Value::Null))
}

fn term_value(term: &Term<'_>, scope: Scope<'_>, expr: &str) -> Result<Value, TemplateError> {
    match term {
        Term::Group(inner) => eval_tokens(inner, scope, expr),
        Term::Token(token) => operand(token, scope, expr),
    }
}

fn operand(token: &Token, scope: Scope<'_>, expr: &str) -> Result<Value, TemplateError> {
    match token {
        Token::Field(path) => Ok(lookup(scope.dot, path)),
        Token::Root(path) => Ok(lookup(scope.root, path)),
        Token::Str(s) => Ok(Value::String(s.clone())),
        Token::Number(n) => Ok(Value::from(*n)),
        Token::Bool(b) => Ok(Value::Bool(*b)),
        Token::Ident(name) => Err(TemplateError::Parse(format!(
            "function '{}' used as an argument in '{}', wrap it in parentheses",
            name, expr
        ))),
        Token::Pipe | Token::LParen | Token::RParen => {
            Err(TemplateError::Parse(format!("unexpected token in '{}'", expr)))
        }
    }
}

fn lookup(ctx: &Value, path: &str) -> Value {
    let mut current = ctx;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn value_to_string(value: &Value, expr: &str) -> Result<String, TemplateError> {
    match value {
        Value::Null => Err(TemplateError::MissingValue(expr.to_string())),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Ok(other.to_string()),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn expect_args(func: &str, args: &[Value], expected: usize) -> Result<(), TemplateError> {
    if args.len() != expected {
        return Err(TemplateError::Arity {
            func: func.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn as_str(func: &str, value: &Value) -> Result<String, TemplateError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err(TemplateError::InvalidArgument {
            func: func.to_string(),
            message: "value is not set".to_string(),
        }),
        other => Ok(other.to_string()),
    }
}

fn as_int(func: &str, value: &Value) -> Result<i64, TemplateError> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| TemplateError::InvalidArgument {
        func: func.to_string(),
        message: format!("{} is not an integer", value),
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => {
            matches!(compare("eq", a, b), Ok(Ordering::Equal))
        }
        _ => a == b,
    }
}

fn compare(func: &str, a: &Value, b: &Value) -> Result<Ordering, TemplateError> {
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x
                .as_f64()
                .zip(y.as_f64())
                .and_then(|(x, y)| x.partial_cmp(&y)),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    };
    ordering.ok_or_else(|| TemplateError::InvalidArgument {
        func: func.to_string(),
        message: format!("cannot compare {} with {}", a, b),
    })
}

fn call(func: &str, args: Vec<Value>) -> Result<Value, TemplateError> {
    let string_fn = |f: fn(&str) -> String| -> Result<Value, TemplateError> {
        expect_args(func, &args, 1)?;
        Ok(Value::String(f(&as_str(func, &args[0])?)))
    };

    match func {
        "upper" => string_fn(|s| s.to_uppercase()),
        "lower" => string_fn(|s| s.to_lowercase()),
        "trim" => string_fn(|s| s.trim().to_string()),
        "quote" => string_fn(|s| format!("{:?}", s)),
        "squote" => string_fn(|s| format!("'{}'", s)),
        "default" => {
            expect_args(func, &args, 2)?;
            let (fallback, value) = (&args[0], &args[1]);
            Ok(if is_empty(value) { fallback.clone() } else { value.clone() })
        }
        "replace" => {
            expect_args(func, &args, 3)?;
            let (old, new, s) = (
                as_str(func, &args[0])?,
                as_str(func, &args[1])?,
                as_str(func, &args[2])?,
            );
            Ok(Value::String(s.replace(&old, &new)))
        }
        "trimPrefix" | "trimSuffix" => {
            expect_args(func, &args, 2)?;
            let (affix, s) = (as_str(func, &args[0])?, as_str(func, &args[1])?);
            let trimmed = if func == "trimPrefix" {
                s.strip_prefix(affix.as_str())
            } else {
                s.strip_suffix(affix.as_str())
            };
            Ok(Value::String(trimmed.unwrap_or(&s).to_string()))
        }
        "contains" => {
            expect_args(func, &args, 2)?;
            let (needle, s) = (as_str(func, &args[0])?, as_str(func, &args[1])?);
            Ok(Value::Bool(s.contains(&needle)))
        }
        "join" => {
            expect_args(func, &args, 2)?;
            let sep = as_str(func, &args[0])?;
            let items = match &args[1] {
                Value::Array(items) => items
                    .iter()
                    .map(|v| as_str(func, v))
                    .collect::<Result<Vec<_>, _>>()?,
                other => vec![as_str(func, other)?],
            };
            Ok(Value::String(items.join(&sep)))
        }
        "add" | "sub" | "mul" => {
            expect_args(func, &args, 2)?;
            let (a, b) = (as_int(func, &args[0])?, as_int(func, &args[1])?);
            let result = match func {
                "add" => a.checked_add(b),
                "sub" => a.checked_sub(b),
                _ => a.checked_mul(b),
            };
            result.map(Value::from).ok_or_else(|| TemplateError::InvalidArgument {
                func: func.to_string(),
                message: "integer overflow".to_string(),
            })
        }
        "add1" => {
            expect_args(func, &args, 1)?;
            as_int(func, &args[0])?
                .checked_add(1)
                .map(Value::from)
                .ok_or_else(|| TemplateError::InvalidArgument {
                    func: func.to_string(),
                    message: "integer overflow".to_string(),
                })
        }
        "eq" => {
            let (first, rest) = args.split_first().filter(|(_, rest)| !rest.is_empty()).ok_or(
                TemplateError::Arity {
                    func: func.to_string(),
                    expected: 2,
                    got: args.len(),
                },
            )?;
            Ok(Value::Bool(rest.iter().any(|other| values_equal(first, other))))
        }
        "ne" => {
            expect_args(func, &args, 2)?;
            Ok(Value::Bool(!values_equal(&args[0], &args[1])))
        }
        "lt" | "le" | "gt" | "ge" => {
            expect_args(func, &args, 2)?;
            let ordering = compare(func, &args[0], &args[1])?;
            Ok(Value::Bool(match func {
                "lt" => ordering.is_lt(),
                "le" => ordering.is_le(),
                "gt" => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        "and" | "or" => {
            if args.is_empty() {
                return Err(TemplateError::Arity {
                    func: func.to_string(),
                    expected: 1,
                    got: 0,
                });
            }
            // first falsy (and) or first truthy (or) argument, else the last
            let stop_on_empty = func == "and";
            let pick = args
                .iter()
                .position(|v| is_empty(v) == stop_on_empty)
                .unwrap_or(args.len() - 1);
            Ok(args[pick].clone())
        }
        "not" => {
            expect_args(func, &args, 1)?;
            Ok(Value::Bool(is_empty(&args[0])))
        }
        "len" => {
            expect_args(func, &args, 1)?;
            let len = match &args[0] {
                Value::String(s) => s.len(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => {
                    return Err(TemplateError::InvalidArgument {
                        func: func.to_string(),
                        message: format!("{} has no length", other),
                    })
                }
            };
            Ok(Value::from(len))
        }
        "env" => {
            expect_args(func, &args, 1)?;
            let name = as_str(func, &args[0])?;
            Ok(Value::String(std::env::var(name).unwrap_or_default()))
        }
        "toJson" => {
            expect_args(func, &args, 1)?;
            Ok(Value::String(args[0].to_string()))
        }
        other => Err(TemplateError::UnknownFunction(other.to_string())),
    }
}
