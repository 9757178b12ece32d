//! Lazy `${section:option}` substitution with cycle detection (§4.G).

use crate::config::ConfigTree;
use crate::util::error::{Error, Result};
use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::char,
    sequence::{delimited, separated_pair},
    IResult,
};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Lit(String),
    Ref(String, String),
}

fn ident(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == ' ')(input)
}

fn reference(input: &str) -> IResult<&str, (&str, &str)> {
    delimited(
        tag("${"),
        separated_pair(ident, char(':'), ident),
        char('}'),
    )(input)
}

/// Split a raw option value into literal runs and `${section:option}`
/// references. `$$` is a literal `$`; any other `$` that doesn't open a
/// well-formed reference is a `BadReferenceSyntax` error.
pub fn tokenize(value: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let bytes = value.as_bytes();
    let mut i = 0;

    while i < value.len() {
        if value[i..].starts_with("$$") {
            literal.push('$');
            i += 2;
            continue;
        }

        if bytes[i] == b'$' {
            match reference(&value[i..]) {
                Ok((rest, (section, option))) => {
                    if !literal.is_empty() {
                        tokens.push(Token::Lit(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Ref(section.to_string(), option.to_string()));
                    i = value.len() - rest.len();
                    continue;
                }
                Err(_) => return Err(Error::BadReferenceSyntax(value.to_string()).into()),
            }
        }

        let ch = value[i..].chars().next().expect("i < value.len()");
        literal.push(ch);
        i += ch.len_utf8();
    }

    if !literal.is_empty() {
        tokens.push(Token::Lit(literal));
    }

    Ok(tokens)
}

/// Resolve `${section:option}`, consulting `data` then `cooked` then
/// computing from `raw`; `seen` is the per-top-level-call cycle guard.
pub fn resolve(
    tree: &ConfigTree,
    section: &str,
    option: &str,
    seen: &mut HashSet<(String, String)>,
) -> Result<String> {
    let key = (section.to_string(), option.to_string());
    if !seen.insert(key.clone()) {
        return Err(Error::CircularReference.into());
    }

    let result = resolve_inner(tree, section, option, seen);
    seen.remove(&key);
    result
}

fn resolve_inner(
    tree: &ConfigTree,
    section: &str,
    option: &str,
    seen: &mut HashSet<(String, String)>,
) -> Result<String> {
    let sec = tree
        .sections
        .get(section)
        .ok_or_else(|| Error::MissingSection(section.to_string()))?;

    if let Some(v) = sec.data.borrow().get(option) {
        sec.used.borrow_mut().insert(option.to_string());
        return Ok(v.clone());
    }

    if let Some(v) = sec.cooked.borrow().get(option) {
        sec.used.borrow_mut().insert(option.to_string());
        return Ok(v.clone());
    }

    let raw = sec
        .raw
        .get(option)
        .ok_or_else(|| Error::MissingOption(section.to_string(), option.to_string()))?
        .clone();

    let tokens = tokenize(&raw)?;
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Lit(s) => out.push_str(&s),
            Token::Ref(s, o) => out.push_str(&resolve(tree, &s, &o, seen)?),
        }
    }

    sec.cooked.borrow_mut().insert(option.to_string(), out.clone());
    sec.used.borrow_mut().insert(option.to_string());
    Ok(out)
}
