use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::LazyLock;

use regex::Regex;

pub use extra_name::ExtraName;
pub use package_name::PackageName;

mod extra_name;
mod package_name;

static NAME_NORMALIZE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-_.]+").unwrap());
static NAME_VALIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([A-Z0-9]|[A-Z0-9][A-Z0-9._-]*[A-Z0-9])$").unwrap());

/// Validate and normalize a borrowed name, always allocating the result.
pub(crate) fn validate_and_normalize_ref(
    name: impl AsRef<str>,
) -> Result<String, InvalidNameError> {
    let name = name.as_ref();
    if !NAME_VALIDATE.is_match(name) {
        return Err(InvalidNameError(name.to_string()));
    }
    let mut normalized = NAME_NORMALIZE.replace_all(name, "-").into_owned();
    normalized.make_ascii_lowercase();
    Ok(normalized)
}

/// Validate and normalize an owned name, reusing the allocation when the separators are
/// already canonical.
pub(crate) fn validate_and_normalize_owned(mut name: String) -> Result<String, InvalidNameError> {
    if !NAME_VALIDATE.is_match(&name) {
        return Err(InvalidNameError(name));
    }
    let normalized = NAME_NORMALIZE.replace_all(&name, "-");
    if normalized != name {
        name = normalized.into_owned();
    }
    name.make_ascii_lowercase();
    Ok(name)
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidNameError(String);

impl InvalidNameError {
    /// The name that failed validation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Not a valid package or extra name: \"{}\". Names must start and end with a letter or \
            digit and may only contain -, _, ., and alphanumeric characters",
            self.0
        )
    }
}

impl Error for InvalidNameError {}
