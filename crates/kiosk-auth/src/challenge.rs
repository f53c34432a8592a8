//! `WWW-Authenticate: Digest ...` challenge parsing.
//!
//! The directive grammar accepted here:
//!
//! ```text
//! challenge     := "Digest" 1*SP directive *( *SP "," *SP directive )
//! directive     := token "=" ( quoted-string | token )
//! quoted-string := DQUOTE *( any char except DQUOTE ) DQUOTE
//! token         := 1*( any char except "," / whitespace / "=" )
//! ```
//!
//! Directive names are case-insensitive and are lowercased in the parsed map.
//! The `Authorization` header produced by [`crate::header`] follows the same
//! grammar, so it can be read back with [`parse_directives`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};

use crate::error::{DigestError, Result};

/// Authentication scheme handled by this crate.
pub const DIGEST_SCHEME: &str = "Digest";

/// qop value used for every response; the upstream only offers `auth`.
pub const QOP_AUTH: &str = "auth";

/// Digest hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    Md5,
    Md5Sess,
}

impl Algorithm {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "MD5",
            Algorithm::Md5Sess => "MD5-sess",
        }
    }

    /// Case-insensitive lookup of a wire value.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("MD5") {
            Some(Algorithm::Md5)
        } else if value.eq_ignore_ascii_case("MD5-sess") {
            Some(Algorithm::Md5Sess)
        } else {
            None
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed Digest challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub nonce: String,
    pub qop: String,
    pub algorithm: Algorithm,
    pub opaque: Option<String>,
    /// Server reported the previous nonce as expired.
    pub stale: bool,
}

impl Challenge {
    /// Parse a raw `WWW-Authenticate` value.
    pub fn parse(header: &str) -> Result<Self> {
        let directives = parse_directives(header)?;
        Self::from_directives(&directives)
    }

    /// Pull the Digest challenge out of a response's headers.
    ///
    /// When the upstream sends several `WWW-Authenticate` values the first
    /// Digest one is used.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let mut values = headers.get_all(WWW_AUTHENTICATE).iter().peekable();
        if values.peek().is_none() {
            return Err(DigestError::ChallengeParse(
                "401 response carried no WWW-Authenticate header".to_string(),
            ));
        }

        let mut last_err = None;
        for value in values {
            let raw = value.to_str().map_err(|_| {
                DigestError::ChallengeParse(
                    "WWW-Authenticate header is not valid ASCII".to_string(),
                )
            })?;
            match Self::parse(raw) {
                Ok(challenge) => return Ok(challenge),
                Err(e @ DigestError::ChallengeParse(_)) => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            DigestError::ChallengeParse("no Digest challenge found".to_string())
        }))
    }

    /// Build a challenge from an already-tokenized directive map.
    pub fn from_directives(directives: &HashMap<String, String>) -> Result<Self> {
        let realm = non_empty(directives, "realm");
        let nonce = non_empty(directives, "nonce");

        let (realm, nonce) = match (realm, nonce) {
            (Some(realm), Some(nonce)) => (realm, nonce),
            (realm, nonce) => {
                let mut missing = Vec::new();
                if realm.is_none() {
                    missing.push("realm");
                }
                if nonce.is_none() {
                    missing.push("nonce");
                }
                return Err(DigestError::MissingChallengeFields { missing });
            }
        };

        let qop = match directives.get("qop") {
            None => QOP_AUTH.to_string(),
            Some(offered) => select_qop(offered)?,
        };

        let algorithm = match directives.get("algorithm") {
            None => Algorithm::Md5,
            Some(value) => Algorithm::parse(value).ok_or_else(|| {
                DigestError::ChallengeParse(format!("unsupported digest algorithm '{}'", value))
            })?,
        };

        let stale = directives
            .get("stale")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Ok(Self {
            realm,
            nonce,
            qop,
            algorithm,
            opaque: directives.get("opaque").cloned(),
            stale,
        })
    }
}

impl FromStr for Challenge {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn non_empty(directives: &HashMap<String, String>, key: &str) -> Option<String> {
    directives.get(key).filter(|v| !v.is_empty()).cloned()
}

/// The server may offer a list such as `auth,auth-int`; only `auth` is spoken.
fn select_qop(offered: &str) -> Result<String> {
    offered
        .split(',')
        .map(str::trim)
        .find(|q| q.eq_ignore_ascii_case(QOP_AUTH))
        .map(|_| QOP_AUTH.to_string())
        .ok_or_else(|| DigestError::ChallengeParse(format!("unsupported qop '{}'", offered)))
}

/// Tokenize a `Digest ...` header into a directive map.
///
/// Fails when the scheme is not `Digest` or a directive is malformed.
/// The first occurrence of a repeated directive wins.
pub fn parse_directives(header: &str) -> Result<HashMap<String, String>> {
    let rest = strip_scheme(header).ok_or_else(|| {
        DigestError::ChallengeParse(format!("not a Digest challenge: '{}'", truncate(header)))
    })?;

    let mut cursor = Cursor::new(rest);
    let mut directives = HashMap::new();

    loop {
        cursor.skip_while(|c| c == ',' || c.is_whitespace());
        if cursor.is_eof() {
            break;
        }

        let key = cursor.take_while(|c| c != '=' && c != ',' && !c.is_whitespace());
        if key.is_empty() {
            return Err(DigestError::ChallengeParse(format!(
                "empty directive name at offset {}",
                cursor.pos
            )));
        }

        cursor.skip_while(char::is_whitespace);
        if !cursor.eat('=') {
            return Err(DigestError::ChallengeParse(format!(
                "expected '=' after directive '{}'",
                key
            )));
        }
        cursor.skip_while(char::is_whitespace);

        let value = if cursor.eat('"') {
            let quoted = cursor.take_while(|c| c != '"');
            if !cursor.eat('"') {
                return Err(DigestError::ChallengeParse(format!(
                    "unterminated quoted value for '{}'",
                    key
                )));
            }
            quoted
        } else {
            cursor.take_while(|c| c != ',' && !c.is_whitespace())
        };

        directives
            .entry(key.to_ascii_lowercase())
            .or_insert_with(|| value.to_string());
    }

    Ok(directives)
}

/// Returns the text after a case-insensitive `Digest` scheme token.
fn strip_scheme(header: &str) -> Option<&str> {
    let header = header.trim_start();
    let scheme_len = DIGEST_SCHEME.len();
    let scheme = header.get(..scheme_len)?;
    if !scheme.eq_ignore_ascii_case(DIGEST_SCHEME) {
        return None;
    }
    let rest = &header[scheme_len..];
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

fn truncate(header: &str) -> &str {
    match header.char_indices().nth(32) {
        Some((idx, _)) => &header[..idx],
        None => header,
    }
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    fn skip_while(&mut self, pred: impl Fn(char) -> bool) {
        self.take_while(pred);
    }
}
