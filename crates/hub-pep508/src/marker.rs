//! PEP 508 environment markers.
//!
//! Markers restrict a requirement to particular environments, e.g.
//! `importlib-metadata ; python_version < "3.8"`, or to an activated extra, e.g.
//! `pysocks ; extra == "socks"`. Comparisons against version-valued keys use PEP 440
//! semantics; everything else compares strings.

use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use tracing::warn;

use hub_normalize::ExtraName;
use hub_pep440::{Operator, Version, VersionParseError, VersionSpecifier};

use crate::{Cursor, Pep508Error};

/// Environment markers whose value is a PEP 440 version.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::enum_variant_names)]
pub enum MarkerValueVersion {
    ImplementationVersion,
    PythonFullVersion,
    PythonVersion,
}

impl Display for MarkerValueVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImplementationVersion => f.write_str("implementation_version"),
            Self::PythonFullVersion => f.write_str("python_full_version"),
            Self::PythonVersion => f.write_str("python_version"),
        }
    }
}

/// Environment markers whose value is an arbitrary string.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValueString {
    ImplementationName,
    OsName,
    PlatformMachine,
    PlatformPythonImplementation,
    PlatformRelease,
    PlatformSystem,
    PlatformVersion,
    SysPlatform,
}

impl Display for MarkerValueString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImplementationName => f.write_str("implementation_name"),
            Self::OsName => f.write_str("os_name"),
            Self::PlatformMachine => f.write_str("platform_machine"),
            Self::PlatformPythonImplementation => f.write_str("platform_python_implementation"),
            Self::PlatformRelease => f.write_str("platform_release"),
            Self::PlatformSystem => f.write_str("platform_system"),
            Self::PlatformVersion => f.write_str("platform_version"),
            Self::SysPlatform => f.write_str("sys_platform"),
        }
    }
}

/// One side of a marker expression.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerValue {
    MarkerEnvVersion(MarkerValueVersion),
    MarkerEnvString(MarkerValueString),
    /// `extra`
    Extra,
    /// A literal in single or double quotes.
    QuotedString(String),
}

impl FromStr for MarkerValue {
    type Err = String;

    /// Parses a marker key. Quoted strings are handled by the caller.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s {
            "implementation_name" => Self::MarkerEnvString(MarkerValueString::ImplementationName),
            "implementation_version" => {
                Self::MarkerEnvVersion(MarkerValueVersion::ImplementationVersion)
            }
            "os_name" => Self::MarkerEnvString(MarkerValueString::OsName),
            "platform_machine" => Self::MarkerEnvString(MarkerValueString::PlatformMachine),
            "platform_python_implementation" => {
                Self::MarkerEnvString(MarkerValueString::PlatformPythonImplementation)
            }
            "platform_release" => Self::MarkerEnvString(MarkerValueString::PlatformRelease),
            "platform_system" => Self::MarkerEnvString(MarkerValueString::PlatformSystem),
            "platform_version" => Self::MarkerEnvString(MarkerValueString::PlatformVersion),
            "python_full_version" => Self::MarkerEnvVersion(MarkerValueVersion::PythonFullVersion),
            "python_version" => Self::MarkerEnvVersion(MarkerValueVersion::PythonVersion),
            "sys_platform" => Self::MarkerEnvString(MarkerValueString::SysPlatform),
            "extra" => Self::Extra,
            // Dotted names from PEP 345, still found in old metadata.
            "os.name" => Self::MarkerEnvString(MarkerValueString::OsName),
            "platform.machine" => Self::MarkerEnvString(MarkerValueString::PlatformMachine),
            "platform.python_implementation" | "python_implementation" => {
                Self::MarkerEnvString(MarkerValueString::PlatformPythonImplementation)
            }
            "platform.version" => Self::MarkerEnvString(MarkerValueString::PlatformVersion),
            "sys.platform" => Self::MarkerEnvString(MarkerValueString::SysPlatform),
            _ => return Err(format!("Invalid key: {s}")),
        };
        Ok(value)
    }
}

impl Display for MarkerValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarkerEnvVersion(marker) => marker.fmt(f),
            Self::MarkerEnvString(marker) => marker.fmt(f),
            Self::Extra => f.write_str("extra"),
            Self::QuotedString(value) if value.contains('"') => write!(f, "'{value}'"),
            Self::QuotedString(value) => write!(f, "\"{value}\""),
        }
    }
}

/// How to compare the two sides of a marker expression.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MarkerOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    TildeEqual,
    In,
    NotIn,
}

impl MarkerOperator {
    /// The PEP 440 operator with the same meaning, if there is one.
    fn to_pep440_operator(self) -> Option<Operator> {
        match self {
            Self::Equal => Some(Operator::Equal),
            Self::NotEqual => Some(Operator::NotEqual),
            Self::GreaterThan => Some(Operator::GreaterThan),
            Self::GreaterEqual => Some(Operator::GreaterThanEqual),
            Self::LessThan => Some(Operator::LessThan),
            Self::LessEqual => Some(Operator::LessThanEqual),
            Self::TildeEqual => Some(Operator::TildeEqual),
            Self::In | Self::NotIn => None,
        }
    }

    /// The operator to use when the sides of the expression are swapped.
    fn invert(self) -> Option<Self> {
        match self {
            Self::Equal | Self::NotEqual => Some(self),
            Self::GreaterThan => Some(Self::LessThan),
            Self::GreaterEqual => Some(Self::LessEqual),
            Self::LessThan => Some(Self::GreaterThan),
            Self::LessEqual => Some(Self::GreaterEqual),
            Self::TildeEqual | Self::In | Self::NotIn => None,
        }
    }
}

impl FromStr for MarkerOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s {
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessEqual,
            "~=" => Self::TildeEqual,
            "in" => Self::In,
            not_space_in
                if not_space_in
                    .strip_prefix("not")
                    .and_then(|rest| rest.strip_suffix("in"))
                    .is_some_and(|space| !space.is_empty() && space.trim().is_empty()) =>
            {
                Self::NotIn
            }
            other => return Err(format!("Invalid comparator: {other}")),
        };
        Ok(value)
    }
}

impl Display for MarkerOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterEqual => ">=",
            Self::LessThan => "<",
            Self::LessEqual => "<=",
            Self::TildeEqual => "~=",
            Self::In => "in",
            Self::NotIn => "not in",
        })
    }
}

/// A version that also remembers the exact string it was parsed from, so `python_version`
/// can be compared both as a version and as a string.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StringVersion {
    string: String,
    version: Version,
}

impl StringVersion {
    pub fn as_str(&self) -> &str {
        &self.string
    }
}

impl FromStr for StringVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            string: s.to_string(),
            version: Version::from_str(s)?,
        })
    }
}

impl Display for StringVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.string)
    }
}

impl Deref for StringVersion {
    type Target = Version;

    fn deref(&self) -> &Self::Target {
        &self.version
    }
}

impl Serialize for StringVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.string)
    }
}

impl<'de> Deserialize<'de> for StringVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        Self::from_str(&string).map_err(de::Error::custom)
    }
}

/// The values of every marker key for one (possibly hypothetical) interpreter.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct MarkerEnvironment {
    pub implementation_name: String,
    pub implementation_version: StringVersion,
    pub os_name: String,
    pub platform_machine: String,
    pub platform_python_implementation: String,
    pub platform_release: String,
    pub platform_system: String,
    pub platform_version: String,
    pub python_full_version: StringVersion,
    pub python_version: StringVersion,
    pub sys_platform: String,
}

impl MarkerEnvironment {
    fn get_version(&self, key: MarkerValueVersion) -> &StringVersion {
        match key {
            MarkerValueVersion::ImplementationVersion => &self.implementation_version,
            MarkerValueVersion::PythonFullVersion => &self.python_full_version,
            MarkerValueVersion::PythonVersion => &self.python_version,
        }
    }

    fn get_string(&self, key: MarkerValueString) -> &str {
        match key {
            MarkerValueString::ImplementationName => &self.implementation_name,
            MarkerValueString::OsName => &self.os_name,
            MarkerValueString::PlatformMachine => &self.platform_machine,
            MarkerValueString::PlatformPythonImplementation => {
                &self.platform_python_implementation
            }
            MarkerValueString::PlatformRelease => &self.platform_release,
            MarkerValueString::PlatformSystem => &self.platform_system,
            MarkerValueString::PlatformVersion => &self.platform_version,
            MarkerValueString::SysPlatform => &self.sys_platform,
        }
    }
}

/// A single comparison, e.g. `python_version >= "3.8"`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MarkerExpression {
    pub l_value: MarkerValue,
    pub operator: MarkerOperator,
    pub r_value: MarkerValue,
}

impl MarkerExpression {
    /// Evaluates the expression. Comparisons that make no sense evaluate to `false` with a
    /// warning rather than failing the whole requirement.
    fn evaluate(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        match (&self.l_value, &self.r_value) {
            (MarkerValue::MarkerEnvVersion(key), MarkerValue::QuotedString(r_string)) => {
                let l_version = env.get_version(*key);
                if matches!(self.operator, MarkerOperator::In | MarkerOperator::NotIn) {
                    return self.compare_strings(l_version.as_str(), r_string);
                }
                self.compare_version(self.operator, l_version, r_string)
            }
            (MarkerValue::QuotedString(l_string), MarkerValue::MarkerEnvVersion(key)) => {
                let r_version = env.get_version(*key);
                if matches!(self.operator, MarkerOperator::In | MarkerOperator::NotIn) {
                    return self.compare_strings(l_string, r_version.as_str());
                }
                let Some(operator) = self.operator.invert() else {
                    warn!("Operator `{}` can't be reversed in `{self}`", self.operator);
                    return false;
                };
                self.compare_version(operator, r_version, l_string)
            }
            (MarkerValue::MarkerEnvString(key), MarkerValue::QuotedString(r_string)) => {
                self.compare_strings(env.get_string(*key), r_string)
            }
            (MarkerValue::QuotedString(l_string), MarkerValue::MarkerEnvString(key)) => {
                self.compare_strings(l_string, env.get_string(*key))
            }
            (MarkerValue::Extra, MarkerValue::QuotedString(r_string))
            | (MarkerValue::QuotedString(r_string), MarkerValue::Extra) => {
                let Ok(extra) = ExtraName::from_str(r_string) else {
                    warn!("Not a valid extra name in `{self}`");
                    return false;
                };
                match self.operator {
                    MarkerOperator::Equal => extras.contains(&extra),
                    MarkerOperator::NotEqual => !extras.contains(&extra),
                    _ => {
                        warn!("Comparing `extra` with anything but `==` or `!=` is invalid: `{self}`");
                        false
                    }
                }
            }
            (MarkerValue::QuotedString(l_string), MarkerValue::QuotedString(r_string)) => {
                warn!("Comparing two quoted strings in `{self}`");
                self.compare_strings(l_string, r_string)
            }
            _ => {
                warn!("Comparing two markers with each other doesn't make any sense: `{self}`");
                false
            }
        }
    }

    fn compare_version(&self, operator: MarkerOperator, env: &Version, spec: &str) -> bool {
        let Some(operator) = operator.to_pep440_operator() else {
            return false;
        };
        let (version, star) = match Version::from_str_star(spec) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Expected a PEP 440 version in `{self}`, ignoring: {err}");
                return false;
            }
        };
        match VersionSpecifier::new(operator, version, star) {
            Ok(specifier) => specifier.contains(env),
            Err(err) => {
                warn!("Invalid version comparison in `{self}`, ignoring: {err}");
                false
            }
        }
    }

    fn compare_strings(&self, l_string: &str, r_string: &str) -> bool {
        match self.operator {
            MarkerOperator::Equal => l_string == r_string,
            MarkerOperator::NotEqual => l_string != r_string,
            MarkerOperator::GreaterThan => l_string > r_string,
            MarkerOperator::GreaterEqual => l_string >= r_string,
            MarkerOperator::LessThan => l_string < r_string,
            MarkerOperator::LessEqual => l_string <= r_string,
            MarkerOperator::TildeEqual => {
                warn!("Can't compare strings with `~=`: `{self}`");
                false
            }
            MarkerOperator::In => r_string.contains(l_string),
            MarkerOperator::NotIn => !r_string.contains(l_string),
        }
    }
}

impl Display for MarkerExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.l_value, self.operator, self.r_value)
    }
}

/// A boolean combination of marker expressions.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum MarkerTree {
    Expression(MarkerExpression),
    And(Vec<MarkerTree>),
    Or(Vec<MarkerTree>),
}

impl MarkerTree {
    /// Does this marker apply in the given environment with the given extras activated?
    pub fn evaluate(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        match self {
            Self::Expression(expression) => expression.evaluate(env, extras),
            Self::And(trees) => trees.iter().all(|tree| tree.evaluate(env, extras)),
            Self::Or(trees) => trees.iter().any(|tree| tree.evaluate(env, extras)),
        }
    }

    /// Whether any expression in the tree mentions `extra`.
    pub fn references_extra(&self) -> bool {
        match self {
            Self::Expression(expression) => {
                expression.l_value == MarkerValue::Extra || expression.r_value == MarkerValue::Extra
            }
            Self::And(trees) | Self::Or(trees) => trees.iter().any(Self::references_extra),
        }
    }
}

impl FromStr for MarkerTree {
    type Err = Pep508Error;

    fn from_str(markers: &str) -> Result<Self, Self::Err> {
        parse_markers_impl(&mut Cursor::new(markers))
    }
}

impl Display for MarkerTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let format_inner = |tree: &Self| match tree {
            Self::Expression(expression) => expression.to_string(),
            Self::And(_) | Self::Or(_) => format!("({tree})"),
        };
        match self {
            Self::Expression(expression) => expression.fmt(f),
            Self::And(trees) => {
                let parts: Vec<String> = trees.iter().map(format_inner).collect();
                f.write_str(&parts.join(" and "))
            }
            Self::Or(trees) => {
                let parts: Vec<String> = trees
                    .iter()
                    .map(|tree| match tree {
                        Self::And(_) | Self::Expression(_) => tree.to_string(),
                        Self::Or(_) => format!("({tree})"),
                    })
                    .collect();
                f.write_str(&parts.join(" or "))
            }
        }
    }
}

impl Serialize for MarkerTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MarkerTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        Self::from_str(&string).map_err(de::Error::custom)
    }
}

/// ```text
/// version_cmp   = wsp* <'<=' | '<' | '!=' | '==' | '>=' | '>' | '~=' | '==='>
/// marker_op     = version_cmp | (wsp* 'in') | (wsp* 'not' wsp+ 'in')
/// ```
fn parse_marker_operator(cursor: &mut Cursor) -> Result<MarkerOperator, Pep508Error> {
    let (start, len) = if cursor.peek_char().is_some_and(char::is_alphabetic) {
        cursor.take_while(char::is_alphabetic)
    } else {
        cursor.take_while(|c| matches!(c, '<' | '=' | '>' | '~' | '!'))
    };
    let operator = cursor.slice(start, len);
    if operator == "not" {
        // `not` must be followed by whitespace and then `in`.
        match cursor.next() {
            None => {
                return Err(Pep508Error::new(
                    "Expected whitespace after 'not', found end of input",
                    cursor.pos(),
                    1,
                    cursor.to_string(),
                ));
            }
            Some((_, whitespace)) if whitespace.is_whitespace() => {}
            Some((pos, other)) => {
                return Err(Pep508Error::new(
                    format!("Expected whitespace after 'not', found '{other}'"),
                    pos,
                    other.len_utf8(),
                    cursor.to_string(),
                ));
            }
        }
        cursor.eat_whitespace();
        let (in_start, in_len) = cursor.take_while(char::is_alphabetic);
        if cursor.slice(in_start, in_len) != "in" {
            return Err(Pep508Error::new(
                "Expected 'in' after 'not'",
                in_start,
                in_len.max(1),
                cursor.to_string(),
            ));
        }
        return Ok(MarkerOperator::NotIn);
    }
    MarkerOperator::from_str(operator).map_err(|_| {
        Pep508Error::new(
            format!(
                "Expected a valid marker operator (such as '>=' or 'not in'), found '{operator}'"
            ),
            start,
            len.max(1),
            cursor.to_string(),
        )
    })
}

/// Either a single or double quoted string or one of `python_version`, `python_full_version`,
/// `os_name` and the rest of the marker keys.
fn parse_marker_value(cursor: &mut Cursor) -> Result<MarkerValue, Pep508Error> {
    match cursor.peek() {
        None => Err(Pep508Error::new(
            "Expected marker value, found end of dependency specification",
            cursor.pos(),
            1,
            cursor.to_string(),
        )),
        Some((start_pos, quotation_mark @ ('"' | '\''))) => {
            cursor.next();
            let (start, len) = cursor.take_while(|c| c != quotation_mark);
            let value = cursor.slice(start, len).to_string();
            cursor.next_expect_char(quotation_mark, start_pos)?;
            Ok(MarkerValue::QuotedString(value))
        }
        Some(_) => {
            let (start, len) = cursor.take_while(|char| {
                !char.is_whitespace() && !matches!(char, '<' | '=' | '>' | '~' | '!' | ')')
            });
            let key = cursor.slice(start, len);
            MarkerValue::from_str(key).map_err(|_| {
                Pep508Error::new(
                    format!("Expected a valid marker name, found '{key}'"),
                    start,
                    len.max(1),
                    cursor.to_string(),
                )
            })
        }
    }
}

/// ```text
/// marker_var:l marker_op:o marker_var:r
/// ```
fn parse_marker_key_op_value(cursor: &mut Cursor) -> Result<MarkerExpression, Pep508Error> {
    cursor.eat_whitespace();
    let l_value = parse_marker_value(cursor)?;
    cursor.eat_whitespace();
    let operator = parse_marker_operator(cursor)?;
    cursor.eat_whitespace();
    let r_value = parse_marker_value(cursor)?;
    Ok(MarkerExpression {
        l_value,
        operator,
        r_value,
    })
}

/// ```text
/// marker_expr = marker_var:l marker_op:o marker_var:r -> (o, l, r)
///             | wsp* '(' marker:m wsp* ')' -> m
/// ```
fn parse_marker_expr(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    cursor.eat_whitespace();
    if let Some(start_pos) = cursor.eat_char('(') {
        let marker = parse_marker_or(cursor)?;
        cursor.eat_whitespace();
        cursor.next_expect_char(')', start_pos)?;
        Ok(marker)
    } else {
        Ok(MarkerTree::Expression(parse_marker_key_op_value(cursor)?))
    }
}

/// ```text
/// marker_and = marker_expr:l wsp* 'and' marker_expr:r -> ('and', l, r)
///            | marker_expr:m -> m
/// ```
fn parse_marker_and(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    parse_marker_op(cursor, "and", MarkerTree::And, parse_marker_expr)
}

/// ```text
/// marker_or = marker_and:l wsp* 'or' marker_and:r -> ('or', l, r)
///           | marker_and:m -> m
/// ```
fn parse_marker_or(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    parse_marker_op(cursor, "or", MarkerTree::Or, parse_marker_and)
}

/// Parses `inner (op inner)*`, flattening the result into a single node.
fn parse_marker_op(
    cursor: &mut Cursor,
    op: &str,
    constructor: fn(Vec<MarkerTree>) -> MarkerTree,
    parse_inner: fn(&mut Cursor) -> Result<MarkerTree, Pep508Error>,
) -> Result<MarkerTree, Pep508Error> {
    let mut expressions = vec![parse_inner(cursor)?];
    loop {
        cursor.eat_whitespace();
        let (start, len) = cursor.peek_while(char::is_alphabetic);
        if cursor.slice(start, len) != op {
            break;
        }
        cursor.take_while(char::is_alphabetic);
        expressions.push(parse_inner(cursor)?);
    }
    if expressions.len() == 1 {
        Ok(expressions.remove(0))
    } else {
        Ok(constructor(expressions))
    }
}

/// Parses markers up to the end of the input, as found after the `;` of a requirement.
pub(crate) fn parse_markers_impl(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    let marker = parse_marker_or(cursor)?;
    cursor.eat_whitespace();
    if let Some((pos, unexpected)) = cursor.next() {
        return Err(Pep508Error::new(
            format!("Unexpected character '{unexpected}', expected 'and', 'or' or end of input"),
            pos,
            cursor.remaining() + unexpected.len_utf8(),
            cursor.to_string(),
        ));
    }
    Ok(marker)
}
