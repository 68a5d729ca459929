//! A library for [dependency specifiers](https://packaging.python.org/en/latest/specifications/dependency-specifiers/)
//! previously known as [PEP 508](https://peps.python.org/pep-0508/).
//!
//! ```text
//! numpy>=1.20
//! requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"
//! pip @ https://github.com/pypa/pip/archive/1.3.1.zip#sha1=da9234ee9982d4bbb3c72346a6de940a148ea686
//! ```

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;
use url::Url;

use hub_normalize::{ExtraName, PackageName};
use hub_pep440::VersionSpecifiers;

use crate::cursor::Cursor;
pub use crate::marker::{
    MarkerEnvironment, MarkerExpression, MarkerOperator, MarkerTree, MarkerValue,
    MarkerValueString, MarkerValueVersion, StringVersion,
};
use crate::marker::parse_markers_impl;

mod cursor;
mod marker;

/// A parse error, pointing at the offending span of the input.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub struct Pep508Error {
    pub message: String,
    /// Byte offset of the span in `input`.
    pub start: usize,
    /// Byte length of the span.
    pub len: usize,
    pub input: String,
}

impl Pep508Error {
    pub(crate) fn new(
        message: impl Into<String>,
        start: usize,
        len: usize,
        input: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            start,
            len,
            input: input.into(),
        }
    }
}

impl Display for Pep508Error {
    /// Pretty formatting with underline.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let start = self.start.min(self.input.len());
        let end = (self.start + self.len).min(self.input.len());
        // Underline in characters, not bytes.
        let start_offset = self.input[..start].chars().count();
        let underline_len = self.input[start..end].chars().count().max(1);
        write!(
            f,
            "{}\n{}\n{}{}",
            self.message,
            self.input,
            " ".repeat(start_offset),
            "^".repeat(underline_len)
        )
    }
}

/// The version constraint or direct reference of a requirement.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum VersionOrUrl {
    /// A PEP 440 version specifier set, e.g. `>=1.20,<2`.
    VersionSpecifier(VersionSpecifiers),
    /// A direct reference, e.g. `name @ https://example.org/name-1.0.tar.gz`.
    Url(Url),
}

impl Display for VersionOrUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VersionSpecifier(specifiers) => specifiers.fmt(f),
            Self::Url(url) => write!(f, " @ {url}"),
        }
    }
}

/// A PEP 508 dependency specifier.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Requirement {
    /// The distribution name such as `numpy` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`.
    pub name: PackageName,
    /// The list of extras such as `security`, `tests` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`.
    pub extras: Vec<ExtraName>,
    /// The version specifier such as `>= 2.8.1`, `== 2.8.*` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`,
    /// or a URL.
    pub version_or_url: Option<VersionOrUrl>,
    /// The markers such as `python_version > "3.8"` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`.
    /// Those are a nested and/or tree.
    pub marker: Option<MarkerTree>,
}

impl Requirement {
    /// Returns whether the markers apply for the given environment and active extras.
    pub fn evaluate_markers(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        self.marker
            .as_ref()
            .is_none_or(|marker| marker.evaluate(env, extras))
    }

    /// The version specifiers, if this is not a direct reference. Unconstrained requirements
    /// yield an empty set.
    pub fn specifiers(&self) -> Option<VersionSpecifiers> {
        match &self.version_or_url {
            None => Some(VersionSpecifiers::default()),
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => Some(specifiers.clone()),
            Some(VersionOrUrl::Url(_)) => None,
        }
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(ExtraName::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if let Some(version_or_url) = &self.version_or_url {
            write!(f, "{version_or_url}")?;
        }
        if let Some(marker) = &self.marker {
            if matches!(self.version_or_url, Some(VersionOrUrl::Url(_))) {
                // A space is required between the URL and the `;`.
                write!(f, " ; {marker}")?;
            } else {
                write!(f, "; {marker}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Requirement {
    type Err = Pep508Error;

    /// Parse a [dependency specifier](https://packaging.python.org/en/latest/specifications/dependency-specifiers).
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse(&mut Cursor::new(input))
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        Self::from_str(&string).map_err(de::Error::custom)
    }
}

fn parse_name(cursor: &mut Cursor) -> Result<PackageName, Pep508Error> {
    // https://peps.python.org/pep-0508/#names
    // ^([A-Z0-9]|[A-Z0-9][A-Z0-9._-]*[A-Z0-9])$ with re.IGNORECASE
    let start = cursor.pos();
    match cursor.peek_char() {
        Some(char) if char.is_ascii_alphanumeric() => {}
        Some(char) => {
            return Err(Pep508Error::new(
                format!("Expected package name starting with an alphanumeric character, found '{char}'"),
                start,
                char.len_utf8(),
                cursor.to_string(),
            ));
        }
        None => {
            return Err(Pep508Error::new(
                "Empty field is not allowed for PEP508",
                start,
                1,
                cursor.to_string(),
            ));
        }
    }
    let (start, len) =
        cursor.take_while(|char| char.is_ascii_alphanumeric() || matches!(char, '-' | '_' | '.'));
    let name = cursor.slice(start, len);
    PackageName::from_str(name).map_err(|_| {
        Pep508Error::new(
            format!(
                "Package name must end with an alphanumeric character, not '{}'",
                name.chars().last().unwrap_or('?')
            ),
            start + len - 1,
            1,
            cursor.to_string(),
        )
    })
}

/// Parses `[extra1, extra2]`, or nothing.
fn parse_extras(cursor: &mut Cursor) -> Result<Vec<ExtraName>, Pep508Error> {
    let Some(bracket_pos) = cursor.eat_char('[') else {
        return Ok(vec![]);
    };
    let mut extras = Vec::new();
    loop {
        cursor.eat_whitespace();
        if extras.is_empty() && cursor.eat_char(']').is_some() {
            return Ok(extras);
        }
        let (start, len) = cursor
            .take_while(|char| char.is_ascii_alphanumeric() || matches!(char, '-' | '_' | '.'));
        let extra = cursor.slice(start, len);
        if extra.is_empty() {
            return match cursor.peek() {
                None => Err(Pep508Error::new(
                    "Missing closing bracket (expected ']', found end of dependency specification)",
                    bracket_pos,
                    1,
                    cursor.to_string(),
                )),
                Some((pos, other)) => Err(Pep508Error::new(
                    format!("Expected an alphanumeric character starting the extra name, found '{other}'"),
                    pos,
                    other.len_utf8(),
                    cursor.to_string(),
                )),
            };
        }
        let extra = ExtraName::from_str(extra).map_err(|err| {
            Pep508Error::new(err.to_string(), start, len, cursor.to_string())
        })?;
        extras.push(extra);
        cursor.eat_whitespace();
        match cursor.next() {
            Some((_, ',')) => {}
            Some((_, ']')) => return Ok(extras),
            Some((pos, other)) => {
                return Err(Pep508Error::new(
                    format!("Expected either ',' (separating extras) or ']' (ending the extras section), found '{other}'"),
                    pos,
                    other.len_utf8(),
                    cursor.to_string(),
                ));
            }
            None => {
                return Err(Pep508Error::new(
                    "Missing closing bracket (expected ']', found end of dependency specification)",
                    bracket_pos,
                    1,
                    cursor.to_string(),
                ));
            }
        }
    }
}

/// Parses the URL after an `@`, which runs until the next whitespace.
fn parse_url(cursor: &mut Cursor) -> Result<Url, Pep508Error> {
    cursor.eat_whitespace();
    let (start, len) = cursor.take_while(|char| !char.is_whitespace());
    let url = cursor.slice(start, len);
    if url.is_empty() {
        return Err(Pep508Error::new(
            "Expected URL",
            start,
            1,
            cursor.to_string(),
        ));
    }
    Url::parse(url).map_err(|err| {
        Pep508Error::new(
            format!("Invalid URL `{url}`: {err}"),
            start,
            len,
            cursor.to_string(),
        )
    })
}

/// Parses version specifiers without parentheses, which run until the `;` of the markers.
fn parse_version_specifier(cursor: &mut Cursor) -> Result<VersionSpecifiers, Pep508Error> {
    let (start, len) = cursor.take_while(|char| char != ';');
    let specifiers = cursor.slice(start, len);
    let trimmed = specifiers.trim_end();
    VersionSpecifiers::from_str(trimmed).map_err(|err| {
        Pep508Error::new(err.to_string(), start, trimmed.len(), cursor.to_string())
    })
}

/// Parses version specifiers in parentheses, as in `name (>=1.0)`.
fn parse_version_specifier_parentheses(
    cursor: &mut Cursor,
) -> Result<VersionSpecifiers, Pep508Error> {
    let Some(brace_pos) = cursor.eat_char('(') else {
        return Ok(VersionSpecifiers::default());
    };
    let (start, len) = cursor.take_while(|char| char != ')');
    let specifiers = cursor.slice(start, len);
    let specifiers = VersionSpecifiers::from_str(specifiers.trim()).map_err(|err| {
        Pep508Error::new(err.to_string(), start, len, cursor.to_string())
    })?;
    cursor.next_expect_char(')', brace_pos)?;
    Ok(specifiers)
}

/// Parses a PEP 508 string into a [`Requirement`].
fn parse(cursor: &mut Cursor) -> Result<Requirement, Pep508Error> {
    // Technically, the grammar is:
    // ```text
    // name_req      = name wsp* extras? wsp* versionspec? wsp* quoted_marker?
    // url_req       = name wsp* extras? wsp* urlspec wsp+ quoted_marker?
    // specification = wsp* ( url_req | name_req ) wsp*
    // ```
    cursor.eat_whitespace();
    let name = parse_name(cursor)?;
    cursor.eat_whitespace();
    let extras = parse_extras(cursor)?;
    cursor.eat_whitespace();

    let version_or_url = match cursor.peek_char() {
        Some('@') => {
            cursor.next();
            Some(VersionOrUrl::Url(parse_url(cursor)?))
        }
        Some('(') => Some(VersionOrUrl::VersionSpecifier(
            parse_version_specifier_parentheses(cursor)?,
        )),
        Some('<' | '=' | '>' | '~' | '!') => Some(VersionOrUrl::VersionSpecifier(
            parse_version_specifier(cursor)?,
        )),
        _ => None,
    };

    cursor.eat_whitespace();

    let marker = if cursor.eat_char(';').is_some() {
        Some(parse_markers_impl(cursor)?)
    } else {
        None
    };

    if let Some((pos, char)) = cursor.next() {
        let message = if marker.is_none() && version_or_url.is_none() {
            format!("Expected one of `@`, `(`, `<`, `=`, `>`, `~`, `!`, `;`, found `{char}`")
        } else {
            format!("Expected end of input or `;`, found `{char}`")
        };
        return Err(Pep508Error::new(
            message,
            pos,
            cursor.remaining() + char.len_utf8(),
            cursor.to_string(),
        ));
    }

    Ok(Requirement {
        name,
        extras,
        version_or_url,
        marker,
    })
}
