#![forbid(unsafe_code)]

//! Evaluation form of trigger expressions.
//!
//! Expressions reference functions as `{functionid}`. The compiled form is a
//! bincode encoded token list that evaluators walk without re-parsing the
//! text, and that the cache uses to find the items a trigger depends on.

use crate::Error;
use bincode::{Decode, Encode};

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum Token {
    Function(u64),
    Text(String),
}

fn tokenize(expression: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut rest = expression;

    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let reference = after
            .find('}')
            .map(|end| &after[..end])
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| Some((digits.len(), digits.parse::<u64>().ok()?)));

        match reference {
            Some((len, functionid)) => {
                text.push_str(&rest[..start]);
                if !text.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut text)));
                }
                tokens.push(Token::Function(functionid));
                rest = &after[len + 1..];
            }
            None => {
                text.push_str(&rest[..=start]);
                rest = after;
            }
        }
    }
    text.push_str(rest);
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    tokens
}

/// Compile expression text; an empty expression compiles to no bytes.
pub fn compile(expression: &str) -> Result<Vec<u8>, Error> {
    if expression.is_empty() {
        return Ok(Vec::new());
    }
    Ok(bincode::encode_to_vec(
        tokenize(expression),
        bincode::config::standard(),
    )?)
}

pub fn decode(bytes: &[u8]) -> Result<Vec<Token>, Error> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let (tokens, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(tokens)
}

/// Function ids referenced by a compiled expression, in order of appearance.
pub fn functionids(bytes: &[u8]) -> Result<Vec<u64>, Error> {
    Ok(decode(bytes)?
        .into_iter()
        .filter_map(|token| match token {
            Token::Function(functionid) => Some(functionid),
            Token::Text(_) => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn references_become_function_tokens() {
        let bytes = compile("last({13})>5 and {$LIMIT}<{14}").unwrap();
        assert_eq!(
            decode(&bytes).unwrap(),
            vec![
                Token::Text("last(".into()),
                Token::Function(13),
                Token::Text(")>5 and {$LIMIT}<".into()),
                Token::Function(14),
            ]
        );
        assert_eq!(functionids(&bytes).unwrap(), vec![13, 14]);
    }

    #[test]
    fn empty_expression_has_no_functions() {
        assert!(compile("").unwrap().is_empty());
        assert!(functionids(&[]).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(decode(&[0xff, 0xff, 0xff]), Err(Error::Decode(_))));
    }
}
