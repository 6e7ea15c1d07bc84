//! Hand-written recursive descent parser for the script language.
//!
//! The language is a small JavaScript-flavoured subset: bindings,
//! assignments into locals and into the context store, `if`/`else`,
//! `return`, and expressions with the usual precedence. There are no loops
//! and no user-defined functions, so every script terminates after a number
//! of steps bounded by its length (capability calls aside).
//!
//! `nom` handles token recognition; precedence climbing is done by hand.

use std::cell::Cell;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{opt, recognize},
    error::ErrorKind,
    multi::{many0, separated_list0},
    sequence::{delimited, tuple},
};

use crate::ast::{
    AssignOp, BinaryOp, Capability, Expr, PathSegment, Place, Program, Stmt, TemplatePart,
    UnaryOp,
};
use crate::config::DEFAULT_MAX_NESTING;
use crate::error::ScriptError;

const KEYWORDS: &[&str] = &["let", "const", "var", "if", "else", "return"];

/// Parse a complete script with the default nesting limit.
pub fn parse_program(source: &str) -> Result<Program, ScriptError> {
    parse_program_with_nesting(source, DEFAULT_MAX_NESTING)
}

/// Parse a complete script, rejecting it once parentheses, unary operators,
/// operator chains, postfix chains or nested statements go deeper than
/// `max_nesting`.
///
/// The resulting tree is never deeper than the limit, so evaluating and
/// dropping it cannot exhaust the stack.
pub fn parse_program_with_nesting(
    source: &str,
    max_nesting: usize,
) -> Result<Program, ScriptError> {
    let stripped = strip_comments(source);
    let _limit = NestingLimit::set(max_nesting);
    let (rest, body) = many0(parse_stmt)(stripped.as_str())
        .map_err(|e| parse_error(&e, max_nesting))?;
    let rest = rest.trim();
    if !rest.is_empty() {
        return Err(ScriptError::Parse(format!(
            "unexpected input: {:?}",
            rest.chars().take(40).collect::<String>()
        )));
    }
    Ok(Program { body })
}

/// Parse a single expression; used by tests and diagnostics.
pub fn parse_expr(input: &str) -> Result<Expr, ScriptError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ScriptError::Parse("empty expression".to_owned()));
    }
    let _limit = NestingLimit::set(DEFAULT_MAX_NESTING);
    let (rest, expr) =
        parse_ternary(input).map_err(|e| parse_error(&e, DEFAULT_MAX_NESTING))?;
    let rest = rest.trim();
    if !rest.is_empty() {
        return Err(ScriptError::Parse(format!(
            "unexpected trailing input: {rest:?}"
        )));
    }
    Ok(expr)
}

fn parse_error(err: &nom::Err<nom::error::Error<&str>>, max_nesting: usize) -> ScriptError {
    match err {
        nom::Err::Failure(e) if e.code == ErrorKind::TooLarge => {
            ScriptError::Parse(format!("nesting exceeds limit of {max_nesting}"))
        }
        other => ScriptError::Parse(format!("{other}")),
    }
}

// ---------------------------------------------------------------------------
// Nesting budget
// ---------------------------------------------------------------------------

thread_local! {
    /// Current nesting depth of the parse running on this thread, and its limit.
    static NESTING: Cell<(usize, usize)> = const { Cell::new((0, DEFAULT_MAX_NESTING)) };
}

/// Installs a nesting limit for one parse and restores the previous state
/// when dropped.
struct NestingLimit {
    previous: (usize, usize),
}

impl NestingLimit {
    fn set(limit: usize) -> Self {
        Self {
            previous: NESTING.replace((0, limit)),
        }
    }
}

impl Drop for NestingLimit {
    fn drop(&mut self) {
        NESTING.set(self.previous);
    }
}

/// One level of nesting, held while the nested construct is parsed.
///
/// Entering past the limit is a hard failure so `alt` does not retry the
/// same input through its other branches.
struct Level;

impl Level {
    fn enter(input: &str) -> Result<Self, nom::Err<nom::error::Error<&str>>> {
        let (depth, limit) = NESTING.get();
        if depth >= limit {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                ErrorKind::TooLarge,
            )));
        }
        NESTING.set((depth + 1, limit));
        Ok(Self)
    }
}

impl Drop for Level {
    fn drop(&mut self) {
        let (depth, limit) = NESTING.get();
        NESTING.set((depth.saturating_sub(1), limit));
    }
}

/// Remove `//` and `/* */` comments, leaving string literals intact.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Consume optional whitespace around a parser.
fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn fail<T>(input: &str, kind: nom::error::ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(nom::error::Error::new(input, kind)))
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Match `word` only when it is not the prefix of a longer identifier.
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let (rest, matched) = tag(word)(input)?;
        if rest.chars().next().is_some_and(is_ident_char) {
            return fail(input, nom::error::ErrorKind::Tag);
        }
        Ok((rest, matched))
    }
}

/// Optional trailing semicolon.
fn end_of_stmt(input: &str) -> IResult<&str, ()> {
    let (input, _) = multispace0(input)?;
    let (input, _) = opt(char(';'))(input)?;
    Ok((input, ()))
}

/// Parse a bare identifier matching `[A-Za-z_$][A-Za-z0-9_$]*`.
fn parse_ident_str(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '$'),
        take_while(is_ident_char),
    )))(input)
}

/// An identifier that is not a reserved word.
fn parse_name(input: &str) -> IResult<&str, &str> {
    let (rest, ident) = parse_ident_str(input)?;
    if KEYWORDS.contains(&ident) {
        return fail(input, nom::error::ErrorKind::Verify);
    }
    Ok((rest, ident))
}

/// Comma-separated expressions with an optional trailing comma.
fn parse_expr_list(input: &str) -> IResult<&str, Vec<Expr>> {
    let (input, items) = separated_list0(ws(char(',')), parse_ternary)(input)?;
    let (input, _) = opt(ws(char(',')))(input)?;
    Ok((input, items))
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

fn parse_stmt(input: &str) -> IResult<&str, Stmt> {
    let (input, _) = multispace0(input)?;
    let _level = Level::enter(input)?;
    alt((
        parse_empty,
        parse_let,
        parse_if,
        parse_return,
        parse_block_stmt,
        parse_assign,
        parse_expr_stmt,
    ))(input)
}

fn parse_empty(input: &str) -> IResult<&str, Stmt> {
    let (input, _) = char(';')(input)?;
    Ok((input, Stmt::Block(Vec::new())))
}

/// `let x = expr;`, `var x = expr;` or `const x = expr;`
fn parse_let(input: &str) -> IResult<&str, Stmt> {
    let (input, word) = alt((keyword("let"), keyword("const"), keyword("var")))(input)?;
    let (input, name) = ws(parse_name)(input)?;
    let (input, _) = char('=')(input)?;
    let (input, value) = parse_ternary(input)?;
    let (input, ()) = end_of_stmt(input)?;
    Ok((
        input,
        Stmt::Let {
            name: name.to_owned(),
            value,
            constant: word == "const",
        },
    ))
}

/// `if (cond) stmt-or-block [else stmt-or-block]`
fn parse_if(input: &str) -> IResult<&str, Stmt> {
    let (input, _) = keyword("if")(input)?;
    let (input, _) = ws(char('('))(input)?;
    let (input, cond) = parse_ternary(input)?;
    let (input, _) = ws(char(')'))(input)?;
    let (input, then_branch) = parse_branch(input)?;

    let (after_ws, _) = multispace0(input)?;
    if let Ok((rest, _)) = keyword("else")(after_ws) {
        let (rest, _) = multispace0(rest)?;
        let (rest, else_branch) = parse_branch(rest)?;
        return Ok((
            rest,
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            },
        ));
    }

    Ok((
        input,
        Stmt::If {
            cond,
            then_branch,
            else_branch: Vec::new(),
        },
    ))
}

/// A braced block or a single statement.
fn parse_branch(input: &str) -> IResult<&str, Vec<Stmt>> {
    if input.starts_with('{') {
        return parse_block(input);
    }
    let (input, stmt) = parse_stmt(input)?;
    Ok((input, vec![stmt]))
}

fn parse_block(input: &str) -> IResult<&str, Vec<Stmt>> {
    let (input, _) = char('{')(input)?;
    let (input, body) = many0(parse_stmt)(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('}')(input)?;
    Ok((input, body))
}

fn parse_block_stmt(input: &str) -> IResult<&str, Stmt> {
    let (input, body) = parse_block(input)?;
    Ok((input, Stmt::Block(body)))
}

/// `return;` or `return expr;`
fn parse_return(input: &str) -> IResult<&str, Stmt> {
    let (input, _) = keyword("return")(input)?;
    let (input, value) = opt(parse_ternary)(input)?;
    let (input, ()) = end_of_stmt(input)?;
    Ok((input, Stmt::Return(value)))
}

/// `place op= expr;`, `place = expr;`, `place++;` or `place--;`
fn parse_assign(input: &str) -> IResult<&str, Stmt> {
    let (input, place) = parse_place(input)?;
    let (input, _) = multispace0(input)?;

    let (input, op, value) = if let Some(rest) = input.strip_prefix("++") {
        (rest, AssignOp::Add, Expr::Int(1))
    } else if let Some(rest) = input.strip_prefix("--") {
        (rest, AssignOp::Sub, Expr::Int(1))
    } else {
        let (rest, op) = parse_assign_op(input)?;
        let (rest, value) = parse_ternary(rest)?;
        (rest, op, value)
    };

    let (input, ()) = end_of_stmt(input)?;
    Ok((input, Stmt::Assign { place, op, value }))
}

/// `+=`, `-=`, `*=`, `/=`, or a single `=` that is not the start of `==`.
fn parse_assign_op(input: &str) -> IResult<&str, AssignOp> {
    for (token, op) in [
        ("+=", AssignOp::Add),
        ("-=", AssignOp::Sub),
        ("*=", AssignOp::Mul),
        ("/=", AssignOp::Div),
    ] {
        if let Some(rest) = input.strip_prefix(token) {
            return Ok((rest, op));
        }
    }
    let (rest, _) = char('=')(input)?;
    if rest.starts_with('=') {
        return fail(input, nom::error::ErrorKind::Char);
    }
    Ok((rest, AssignOp::Set))
}

/// Assignment target: `name`, `name.field`, `name["key"]`, nested freely.
fn parse_place(input: &str) -> IResult<&str, Place> {
    let (mut input, root) = parse_name(input)?;
    let mut path = Vec::new();

    loop {
        let (next, _) = multispace0(input)?;
        if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('.')(next) {
            let (rest, field) = ws(parse_ident_str)(rest)?;
            path.push(PathSegment::Field(field.to_owned()));
            input = rest;
            continue;
        }
        if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('[')(next) {
            let (rest, index) = ws(parse_ternary)(rest)?;
            let (rest, _) = char(']')(rest)?;
            path.push(PathSegment::Index(index));
            input = rest;
            continue;
        }
        break;
    }

    Ok((
        input,
        Place {
            root: root.to_owned(),
            path,
        },
    ))
}

fn parse_expr_stmt(input: &str) -> IResult<&str, Stmt> {
    let (input, expr) = parse_ternary(input)?;
    let (input, ()) = end_of_stmt(input)?;
    Ok((input, Stmt::Expr(expr)))
}

// ---------------------------------------------------------------------------
// Atoms (literals, identifiers, parenthesised expressions, lists, maps)
// ---------------------------------------------------------------------------

fn parse_atom(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;
    alt((
        parse_null,
        parse_bool,
        parse_number,
        parse_string_literal,
        parse_template_literal,
        parse_list_literal,
        parse_map_literal,
        parse_paren,
        parse_function_or_ident,
    ))(input)
}

/// `null` and `undefined` both evaluate to null.
fn parse_null(input: &str) -> IResult<&str, Expr> {
    let (rest, _) = alt((keyword("null"), keyword("undefined")))(input)?;
    Ok((rest, Expr::Null))
}

fn parse_bool(input: &str) -> IResult<&str, Expr> {
    let (rest, word) = alt((keyword("true"), keyword("false")))(input)?;
    Ok((rest, Expr::Bool(word == "true")))
}

/// Unsigned integer or float literal. Negation is a unary operator.
fn parse_number(input: &str) -> IResult<&str, Expr> {
    let (rest, num_str) = recognize(tuple((
        take_while1(|c: char| c.is_ascii_digit()),
        opt(tuple((
            char('.'),
            take_while1(|c: char| c.is_ascii_digit()),
        ))),
    )))(input)?;

    if num_str.contains('.') {
        let f: f64 = num_str.parse().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))
        })?;
        Ok((rest, Expr::Float(f)))
    } else {
        let i: i64 = num_str.parse().map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
        })?;
        Ok((rest, Expr::Int(i)))
    }
}

fn parse_string_literal(input: &str) -> IResult<&str, Expr> {
    let (rest, s) = alt((quoted('"'), quoted('\'')))(input)?;
    Ok((rest, Expr::String(s)))
}

/// A string delimited by `quote`, with `\n`, `\t`, `\\` and `\<quote>`
/// escapes.
fn quoted<'a>(quote: char) -> impl FnMut(&'a str) -> IResult<&'a str, String> {
    move |input: &'a str| {
        let (input, _) = char(quote)(input)?;
        let mut result = String::new();
        let mut chars = input.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                c if c == quote => return Ok((&input[i + c.len_utf8()..], result)),
                '\\' => match chars.next() {
                    Some((_, 'n')) => result.push('\n'),
                    Some((_, 't')) => result.push('\t'),
                    Some((_, 'r')) => result.push('\r'),
                    Some((_, '\\')) => result.push('\\'),
                    Some((_, c)) if c == quote => result.push(c),
                    Some((_, c)) => {
                        result.push('\\');
                        result.push(c);
                    }
                    None => return fail(input, nom::error::ErrorKind::Char),
                },
                c => result.push(c),
            }
        }
        fail(input, nom::error::ErrorKind::Char)
    }
}

/// A backtick template: `` `text ${expr} text` ``.
fn parse_template_literal(input: &str) -> IResult<&str, Expr> {
    let (mut input, _) = char('`')(input)?;
    let mut parts = Vec::new();
    let mut literal = String::new();

    loop {
        let mut chars = input.chars();
        match chars.next() {
            None => return fail(input, nom::error::ErrorKind::Char),
            Some('`') => {
                if !literal.is_empty() {
                    parts.push(TemplatePart::Literal(literal));
                }
                return Ok((chars.as_str(), Expr::Template(parts)));
            }
            Some('$') if input.starts_with("${") => {
                if !literal.is_empty() {
                    parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                }
                let (rest, expr) = ws(parse_ternary)(&input[2..])?;
                let (rest, _) = char('}')(rest)?;
                parts.push(TemplatePart::Expr(expr));
                input = rest;
            }
            Some('\\') => {
                match chars.next() {
                    Some('n') => literal.push('\n'),
                    Some('t') => literal.push('\t'),
                    Some(c) => literal.push(c),
                    None => return fail(input, nom::error::ErrorKind::Char),
                }
                input = chars.as_str();
            }
            Some(c) => {
                literal.push(c);
                input = chars.as_str();
            }
        }
    }
}

/// `[expr, expr, ...]`
fn parse_list_literal(input: &str) -> IResult<&str, Expr> {
    let (input, _) = char('[')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, items) = parse_expr_list(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(']')(input)?;
    Ok((input, Expr::List(items)))
}

/// `{key: value, "key": value, ...}`
fn parse_map_literal(input: &str) -> IResult<&str, Expr> {
    let (input, _) = char('{')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, entries) = separated_list0(ws(char(',')), parse_map_entry)(input)?;
    let (input, _) = opt(ws(char(',')))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('}')(input)?;
    Ok((input, Expr::Map(entries)))
}

fn parse_map_entry(input: &str) -> IResult<&str, (String, Expr)> {
    let (input, _) = multispace0(input)?;
    let (input, key) = alt((quoted('"'), quoted('\''), parse_map_key))(input)?;
    let (input, _) = ws(char(':'))(input)?;
    let (input, value) = parse_ternary(input)?;
    Ok((input, (key, value)))
}

fn parse_map_key(input: &str) -> IResult<&str, String> {
    let (rest, key) = parse_ident_str(input)?;
    Ok((rest, key.to_owned()))
}

fn parse_paren(input: &str) -> IResult<&str, Expr> {
    let (input, _) = char('(')(input)?;
    let (input, expr) = ws(parse_ternary)(input)?;
    let (input, _) = char(')')(input)?;
    Ok((input, expr))
}

/// A builtin call `name(args)` or a plain identifier.
fn parse_function_or_ident(input: &str) -> IResult<&str, Expr> {
    let (rest, ident) = parse_name(input)?;
    let (rest2, _) = multispace0(rest)?;

    if rest2.starts_with('(') {
        let (rest3, args) = parse_call_args(rest2)?;
        return Ok((rest3, Expr::Call(ident.to_owned(), args)));
    }

    Ok((rest, Expr::Ident(ident.to_owned())))
}

fn parse_call_args(input: &str) -> IResult<&str, Vec<Expr>> {
    let (input, _) = char('(')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, args) = parse_expr_list(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(')')(input)?;
    Ok((input, args))
}

// ---------------------------------------------------------------------------
// Postfix: field access, index access, method calls
// ---------------------------------------------------------------------------

fn parse_postfix(input: &str) -> IResult<&str, Expr> {
    let (mut input, mut expr) = parse_atom(input)?;
    let mut chain = Vec::new();

    loop {
        let (next, _) = multispace0(input)?;

        if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('.')(next) {
            chain.push(Level::enter(next)?);
            let (rest, field) = ws(parse_ident_str)(rest)?;

            if rest.starts_with('(') {
                let (rest, args) = parse_call_args(rest)?;
                expr = compile_method_call(expr, field, args);
                input = rest;
                continue;
            }

            expr = Expr::Field(Box::new(expr), field.to_owned());
            input = rest;
            continue;
        }

        if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('[')(next) {
            chain.push(Level::enter(next)?);
            let (rest, index_expr) = ws(parse_ternary)(rest)?;
            let (rest, _) = char(']')(rest)?;
            expr = Expr::Index(Box::new(expr), Box::new(index_expr));
            input = rest;
            continue;
        }

        break;
    }

    Ok((input, expr))
}

/// Method calls on capability objects become [`Expr::Invoke`]; `JSON.*`,
/// `Math.*` and `Object.*` become namespaced builtins; anything else becomes
/// a builtin with the receiver as first argument.
fn compile_method_call(receiver: Expr, method: &str, args: Vec<Expr>) -> Expr {
    if let Expr::Ident(name) = &receiver {
        match name.as_str() {
            "logger" | "console" => {
                return Expr::Invoke(Capability::Logger, method.to_owned(), args);
            }
            "http" => return Expr::Invoke(Capability::Http, method.to_owned(), args),
            "JSON" | "Math" | "Object" => {
                return Expr::Call(format!("{name}.{method}"), args);
            }
            _ => {}
        }
    }
    let mut full_args = vec![receiver];
    full_args.extend(args);
    Expr::Call(method.to_owned(), full_args)
}

// ---------------------------------------------------------------------------
// Unary operators
// ---------------------------------------------------------------------------

fn parse_unary(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;

    if input.starts_with('!') && !input.starts_with("!=") {
        let _level = Level::enter(input)?;
        let (rest, operand) = parse_unary(&input[1..])?;
        return Ok((rest, Expr::Unary(UnaryOp::Not, Box::new(operand))));
    }

    if let Some(after_minus) = input.strip_prefix('-')
        && !after_minus.starts_with('-')
        && !after_minus.starts_with('=')
    {
        let _level = Level::enter(input)?;
        let (rest, operand) = parse_unary(after_minus)?;
        return Ok((rest, Expr::Unary(UnaryOp::Neg, Box::new(operand))));
    }

    parse_postfix(input)
}

// ---------------------------------------------------------------------------
// Binary operators with precedence climbing
// ---------------------------------------------------------------------------

/// Match a binary operator token at the start of `input`, refusing tokens
/// that are really the start of an assignment (`+=`, `++`, ...).
fn binary_token(input: &str, ops: &[(&'static str, BinaryOp)]) -> Option<(BinaryOp, usize)> {
    for (token, op) in ops {
        if let Some(after) = input.strip_prefix(token) {
            let single = token.len() == 1;
            if single && (after.starts_with('=') || after.starts_with(*token)) {
                return None;
            }
            return Some((*op, token.len()));
        }
    }
    None
}

/// Left-associative loop shared by every binary precedence level.
///
/// Each operator deepens the tree by one, so each holds a nesting level
/// until the chain ends.
fn binary_level<'a>(
    input: &'a str,
    ops: &[(&'static str, BinaryOp)],
    next_level: fn(&'a str) -> IResult<&'a str, Expr>,
) -> IResult<&'a str, Expr> {
    let (mut input, mut left) = next_level(input)?;
    let mut chain = Vec::new();

    loop {
        let (next, _) = multispace0(input)?;
        let Some((op, len)) = binary_token(next, ops) else {
            break;
        };
        chain.push(Level::enter(next)?);
        let (rest, right) = next_level(&next[len..])?;
        left = Expr::Binary(op, Box::new(left), Box::new(right));
        input = rest;
    }

    Ok((input, left))
}

/// `*`, `/`, `%`
fn parse_mul(input: &str) -> IResult<&str, Expr> {
    binary_level(
        input,
        &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Mod)],
        parse_unary,
    )
}

/// `+`, `-`
fn parse_add(input: &str) -> IResult<&str, Expr> {
    binary_level(
        input,
        &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
        parse_mul,
    )
}

/// `<=`, `>=`, `<`, `>`
fn parse_relational(input: &str) -> IResult<&str, Expr> {
    let (mut input, mut left) = parse_add(input)?;
    let mut chain = Vec::new();

    loop {
        let (next, _) = multispace0(input)?;
        let op = if next.starts_with("<=") {
            Some((BinaryOp::Le, 2))
        } else if next.starts_with(">=") {
            Some((BinaryOp::Ge, 2))
        } else if next.starts_with('<') {
            Some((BinaryOp::Lt, 1))
        } else if next.starts_with('>') {
            Some((BinaryOp::Gt, 1))
        } else {
            None
        };

        let Some((op, len)) = op else {
            break;
        };
        chain.push(Level::enter(next)?);
        let (rest, right) = parse_add(&next[len..])?;
        left = Expr::Binary(op, Box::new(left), Box::new(right));
        input = rest;
    }

    Ok((input, left))
}

/// `===`, `!==`, `==`, `!=`
fn parse_equality(input: &str) -> IResult<&str, Expr> {
    let (mut input, mut left) = parse_relational(input)?;
    let mut chain = Vec::new();

    loop {
        let (next, _) = multispace0(input)?;
        let op = if next.starts_with("===") {
            Some((BinaryOp::Eq, 3))
        } else if next.starts_with("!==") {
            Some((BinaryOp::Ne, 3))
        } else if next.starts_with("==") {
            Some((BinaryOp::Eq, 2))
        } else if next.starts_with("!=") {
            Some((BinaryOp::Ne, 2))
        } else {
            None
        };

        let Some((op, len)) = op else {
            break;
        };
        chain.push(Level::enter(next)?);
        let (rest, right) = parse_relational(&next[len..])?;
        left = Expr::Binary(op, Box::new(left), Box::new(right));
        input = rest;
    }

    Ok((input, left))
}

/// `&&`
fn parse_and(input: &str) -> IResult<&str, Expr> {
    binary_level(input, &[("&&", BinaryOp::And)], parse_equality)
}

/// `||`
fn parse_or(input: &str) -> IResult<&str, Expr> {
    binary_level(input, &[("||", BinaryOp::Or)], parse_and)
}

/// Top-level expression: ternary `condition ? then : else`
fn parse_ternary(input: &str) -> IResult<&str, Expr> {
    let _level = Level::enter(input)?;
    let (input, cond) = parse_or(input)?;
    let (after_ws, _) = multispace0(input)?;

    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('?')(after_ws) {
        let (rest, then_expr) = ws(parse_ternary)(rest)?;
        let (rest, _) = char(':')(rest)?;
        let (rest, else_expr) = parse_ternary(rest)?;
        Ok((
            rest,
            Expr::Ternary(Box::new(cond), Box::new(then_expr), Box::new(else_expr)),
        ))
    } else {
        Ok((input, cond))
    }
}
