//! Line splitting and argument tokenization of recipe text using `nom`.
//!
//! Recipes are line oriented: [`logical_lines`] folds `\` continuations,
//! drops comments and blank lines, and rejects leftover merge markers.
//! The argument helpers then tokenize the text after the keyword.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till1, take_while, take_while1},
    character::complete::{alpha1, char, space0, space1},
    combinator::{eof, map, opt, rest},
    multi::{many0, separated_list1},
    sequence::{pair, preceded, separated_pair, terminated},
};
use vresolve_common::error::{Result, VresolveError};

/// Prefixes that git leaves behind in an unresolved merge.
const MERGE_MARKERS: [&str; 4] = ["<<<<<<<", "=======", ">>>>>>>", "|||||||"];

/// One instruction after continuation folding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based line the instruction starts on.
    pub number: usize,
    /// Instruction keyword as written.
    pub keyword: String,
    /// Everything after the keyword, trimmed.
    pub rest: String,
}

fn lex_err(origin: &str, line: usize, message: impl Into<String>) -> VresolveError {
    VresolveError::Parse {
        origin: origin.to_owned(),
        line,
        message: message.into(),
    }
}

/// Splits recipe text into logical instruction lines.
///
/// # Errors
///
/// Returns an error on merge markers, on a continuation that runs off the
/// end of the input, or on a line that does not start with a keyword.
pub fn logical_lines(origin: &str, input: &str) -> Result<Vec<LogicalLine>> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in input.lines().enumerate() {
        let number = idx + 1;
        let trimmed = raw.trim();

        if MERGE_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
            return Err(lex_err(
                origin,
                number,
                format!("unresolved merge marker \"{}\"", &trimmed[..7]),
            ));
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (body, continues) = trimmed
            .strip_suffix('\\')
            .map_or((trimmed, false), |b| (b.trim_end(), true));

        let (start, mut text) = pending.take().unwrap_or((number, String::new()));
        if !text.is_empty() && !body.is_empty() {
            text.push(' ');
        }
        text.push_str(body);

        if continues {
            pending = Some((start, text));
        } else {
            lines.push(split_keyword(origin, start, &text)?);
        }
    }

    if let Some((start, _)) = pending {
        return Err(lex_err(origin, start, "line continuation at end of input"));
    }
    Ok(lines)
}

fn keyword_and_rest(input: &str) -> IResult<&str, (&str, &str)> {
    pair(alpha1, alt((preceded(space1, rest), map(eof, |_| "")))).parse(input)
}

fn split_keyword(origin: &str, number: usize, text: &str) -> Result<LogicalLine> {
    let (_, (keyword, rest)) = keyword_and_rest(text).map_err(|_| {
        lex_err(
            origin,
            number,
            format!("expected an instruction keyword at \"{}\"", preview(text)),
        )
    })?;
    Ok(LogicalLine {
        number,
        keyword: keyword.to_owned(),
        rest: rest.trim().to_owned(),
    })
}

fn preview(text: &str) -> &str {
    let end = text
        .char_indices()
        .nth(20)
        .map_or(text.len(), |(idx, _)| idx);
    &text[..end]
}

/// Whether `name` is a valid ARG/ENV name: `[A-Za-z_][A-Za-z0-9_]*`.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses a double-quoted string with basic escape support.
fn quoted(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let mut result = String::new();
    let mut chars = input.char_indices();
    loop {
        match chars.next() {
            Some((idx, '"')) => return Ok((&input[idx + 1..], result)),
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => result.push('\n'),
                Some((_, 't')) => result.push('\t'),
                Some((_, '\\')) => result.push('\\'),
                Some((_, '"')) => result.push('"'),
                Some((_, c)) => {
                    result.push('\\');
                    result.push(c);
                }
                None => {
                    return Err(nom::Err::Failure(nom::error::Error::new(
                        input,
                        nom::error::ErrorKind::Char,
                    )));
                }
            },
            Some((_, c)) => result.push(c),
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Char,
                )));
            }
        }
    }
}

fn bare_word(input: &str) -> IResult<&str, String> {
    map(take_till1(char::is_whitespace), str::to_owned).parse(input)
}

fn word(input: &str) -> IResult<&str, String> {
    alt((quoted, bare_word)).parse(input)
}

/// Splits an argument list into whitespace-separated words; double-quoted
/// words may contain spaces.
///
/// # Errors
///
/// Returns an error on an unterminated quote.
pub fn words(origin: &str, line: usize, text: &str) -> Result<Vec<String>> {
    let parsed: IResult<&str, Vec<String>> =
        terminated(many0(preceded(space0, word)), space0).parse(text);
    match parsed {
        Ok(("", items)) => Ok(items),
        Ok((left, _)) => Err(lex_err(
            origin,
            line,
            format!("unexpected input at \"{}\"", preview(left)),
        )),
        Err(_) => Err(lex_err(origin, line, "unterminated string literal")),
    }
}

fn name(input: &str) -> IResult<&str, &str> {
    let (after, ident) = take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)?;
    if is_valid_name(ident) {
        Ok((after, ident))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::AlphaNumeric,
        )))
    }
}

fn value(input: &str) -> IResult<&str, String> {
    alt((
        quoted,
        map(take_while(|c: char| !c.is_whitespace()), str::to_owned),
    ))
    .parse(input)
}

fn assignment(input: &str) -> IResult<&str, (String, String)> {
    map(separated_pair(name, char('='), value), |(n, v)| {
        (n.to_owned(), v)
    })
    .parse(input)
}

/// Parses one or more `NAME=value` pairs separated by whitespace.
///
/// Returns `None` when the text is not entirely made of assignments.
#[must_use]
pub fn assignments(text: &str) -> Option<Vec<(String, String)>> {
    let parsed: IResult<&str, Vec<(String, String)>> =
        terminated(separated_list1(space1, assignment), space0).parse(text);
    match parsed {
        Ok(("", pairs)) => Some(pairs),
        _ => None,
    }
}

/// Splits `NAME value...` into the name and the raw remainder.
#[must_use]
pub fn name_and_rest(text: &str) -> Option<(String, String)> {
    let parsed: IResult<&str, (&str, Option<&str>)> =
        pair(name, opt(preceded(space1, rest))).parse(text);
    match parsed {
        Ok(("", (n, value))) => Some((n.to_owned(), value.unwrap_or_default().trim().to_owned())),
        _ => None,
    }
}

/// Parses a JSON exec-form array such as `["/app/run.sh"]`.
///
/// Returns `None` when the text does not start with `[`.
///
/// # Errors
///
/// Returns an error when the text starts with `[` but is not a JSON array
/// of strings.
pub fn exec_form(origin: &str, line: usize, text: &str) -> Result<Option<Vec<String>>> {
    if !text.starts_with('[') {
        return Ok(None);
    }
    serde_json::from_str::<Vec<String>>(text)
        .map(Some)
        .map_err(|e| lex_err(origin, line, format!("invalid exec form: {e}")))
}
