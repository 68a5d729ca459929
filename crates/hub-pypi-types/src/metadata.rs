use std::str::FromStr;

use mailparse::{MailHeaderMap, MailParseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use hub_normalize::{ExtraName, InvalidNameError, PackageName};
use hub_pep440::{Version, VersionParseError, VersionSpecifierParseError, VersionSpecifiers};
use hub_pep508::{Pep508Error, Requirement};

use crate::lenient_requirement::LenientRequirement;
use crate::simple_json::parse_requires_python_lenient;

/// Python Package Metadata 2.3 as specified in
/// <https://packaging.python.org/specifications/core-metadata/>.
///
/// This is a subset of the full metadata specification, and only includes the fields that are
/// relevant to dependency resolution.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Metadata23 {
    // Mandatory fields
    pub metadata_version: String,
    pub name: PackageName,
    pub version: Version,
    // Optional fields
    pub requires_dist: Vec<Requirement>,
    pub requires_python: Option<VersionSpecifiers>,
    pub provides_extras: Vec<ExtraName>,
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Metadata field {0} not found")]
    FieldNotFound(&'static str),
    #[error("Invalid version: {0}")]
    Pep440VersionError(#[source] VersionParseError),
    #[error(transparent)]
    Pep440Error(#[from] VersionSpecifierParseError),
    #[error(transparent)]
    Pep508Error(#[from] Box<Pep508Error>),
    #[error(transparent)]
    InvalidName(#[from] InvalidNameError),
    #[error(transparent)]
    MailParse(#[from] MailParseError),
}

impl Metadata23 {
    /// Parse the [`Metadata23`] from a `METADATA` file, as included in a built distribution
    /// (wheel) or served by an index next to it (PEP 658).
    pub fn parse_metadata(content: &[u8]) -> Result<Self, MetadataError> {
        let headers = Headers::parse(content)?;

        let metadata_version = headers
            .get_first_value("Metadata-Version")
            .ok_or(MetadataError::FieldNotFound("Metadata-Version"))?;
        let name = PackageName::new(
            headers
                .get_first_value("Name")
                .ok_or(MetadataError::FieldNotFound("Name"))?,
        )?;
        let version = Version::from_str(
            &headers
                .get_first_value("Version")
                .ok_or(MetadataError::FieldNotFound("Version"))?,
        )
        .map_err(MetadataError::Pep440VersionError)?;
        let requires_dist = headers
            .get_all_values("Requires-Dist")
            .map(|requires_dist| parse_requires_dist(&requires_dist))
            .collect::<Result<Vec<_>, _>>()?;
        let requires_python = headers
            .get_first_value("Requires-Python")
            .and_then(|requires_python| parse_requires_python_lenient(&requires_python))
            .transpose()?;
        let provides_extras = parse_provides_extras(headers.get_all_values("Provides-Extra"));

        Ok(Self {
            metadata_version,
            name,
            version,
            requires_dist,
            requires_python,
            provides_extras,
        })
    }
}

pub(crate) fn parse_requires_dist(requires_dist: &str) -> Result<Requirement, MetadataError> {
    LenientRequirement::from_str(requires_dist)
        .map(Requirement::from)
        .map_err(|err| MetadataError::Pep508Error(Box::new(err)))
}

pub(crate) fn parse_provides_extras(extras: impl Iterator<Item = String>) -> Vec<ExtraName> {
    extras
        .filter_map(|provides_extra| match ExtraName::new(provides_extra) {
            Ok(extra_name) => Some(extra_name),
            Err(err) => {
                warn!("Ignoring invalid extra: {err}");
                None
            }
        })
        .collect()
}

/// The headers of a distribution metadata file.
#[derive(Debug)]
struct Headers<'a>(Vec<mailparse::MailHeader<'a>>);

impl<'a> Headers<'a> {
    /// Parse the headers from the given metadata file content. The body is ignored.
    fn parse(content: &'a [u8]) -> Result<Self, MailParseError> {
        let (headers, _) = mailparse::parse_headers(content)?;
        Ok(Self(headers))
    }

    /// Return the first value associated with the header with the given name.
    fn get_first_value(&self, name: &str) -> Option<String> {
        self.0
            .get_first_value(name)
            .filter(|value| value != "UNKNOWN")
    }

    /// Return all values associated with the header with the given name.
    fn get_all_values(&self, name: &str) -> impl Iterator<Item = String> {
        self.0
            .get_all_values(name)
            .into_iter()
            .filter(|value| value != "UNKNOWN")
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;

    use hub_normalize::{ExtraName, PackageName};
    use hub_pep440::Version;

    use super::{Metadata23, MetadataError};

    #[test]
    fn missing_fields() {
        let meta = Metadata23::parse_metadata(b"Metadata-Version: 1.0");
        assert!(matches!(meta, Err(MetadataError::FieldNotFound("Name"))));

        let meta = Metadata23::parse_metadata(b"Metadata-Version: 1.0\nName: asdf");
        assert!(matches!(meta, Err(MetadataError::FieldNotFound("Version"))));

        let meta = Metadata23::parse_metadata(b"Metadata-Version: 1.0\nName: asdf\nVersion: UNKNOWN");
        assert!(matches!(meta, Err(MetadataError::FieldNotFound("Version"))));
    }

    #[test]
    fn minimal() {
        let meta = Metadata23::parse_metadata(
            "Metadata-Version: 1.0\nName: asdf\nVersion: 1.0\nAuthor: 中文\n\n一个 Python 包"
                .as_bytes(),
        )
        .unwrap();
        assert_eq!(meta.metadata_version, "1.0");
        assert_eq!(meta.name, PackageName::from_str("asdf").unwrap());
        assert_eq!(meta.version, Version::from_release(vec![1, 0]));
        assert!(meta.requires_dist.is_empty());
    }

    #[test]
    fn requires_dist() {
        let content = indoc! {r#"
            Metadata-Version: 2.1
            Name: requests
            Version: 2.31.0
            Summary: Python HTTP for Humans.
            Requires-Python: >=3.7
            Description-Content-Type: text/markdown
            License: Apache 2.0
              with a folded line
            Requires-Dist: charset-normalizer (<4,>=2)
            Requires-Dist: idna (<4,>=2.5)
            Requires-Dist: urllib3 (<3,>=1.21.1)
            Requires-Dist: certifi (>=2017.4.17)
            Requires-Dist: PySocks (!=1.5.7,>=1.5.6) ; extra == 'socks'
            Requires-Dist: chardet (<6,>=3.0.2) ; extra == 'use_chardet_on_py3'
            Provides-Extra: security
            Provides-Extra: socks
            Provides-Extra: use_chardet_on_py3

            # Requests

            Requires-Dist: not-a-header
        "#};
        let meta = Metadata23::parse_metadata(content.as_bytes()).unwrap();
        let requires_dist: Vec<String> = meta
            .requires_dist
            .iter()
            .map(ToString::to_string)
            .collect();
        insta::assert_debug_snapshot!(requires_dist, @r#"
        [
            "charset-normalizer<4, >=2",
            "idna<4, >=2.5",
            "urllib3<3, >=1.21.1",
            "certifi>=2017.4.17",
            "pysocks!=1.5.7, >=1.5.6; extra == \"socks\"",
            "chardet<6, >=3.0.2; extra == \"use_chardet_on_py3\"",
        ]
        "#);
        assert_eq!(meta.requires_python.unwrap().to_string(), ">=3.7");
        assert_eq!(
            meta.provides_extras,
            vec![
                ExtraName::from_str("security").unwrap(),
                ExtraName::from_str("socks").unwrap(),
                ExtraName::from_str("use-chardet-on-py3").unwrap(),
            ]
        );
    }

    #[test]
    fn lenient_requires_dist() {
        let content = "Metadata-Version: 2.1\nName: foo\nVersion: 1.0\nRequires-Dist: bar (>=1.0<2.0)\n";
        let meta = Metadata23::parse_metadata(content.as_bytes()).unwrap();
        assert_eq!(meta.requires_dist[0].to_string(), "bar>=1.0, <2.0");
    }

    #[test]
    fn malformed_requirement() {
        let err = Metadata23::parse_metadata(
            b"Metadata-Version: 2.1\nName: foo\nVersion: 1.0\nRequires-Dist: -bar\n",
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::Pep508Error(_)));
    }

    #[test]
    fn whitespace_only_continuation() {
        // The folded description has a line of only spaces, which is not the end of the headers.
        let content = concat!(
            "Metadata-Version: 2.1\n",
            "Name: foo\n",
            "Version: 1.0\n",
            "Description: first paragraph\n",
            "        \n",
            "        second paragraph\n",
            "Requires-Dist: bar>=1\n",
            "Requires-Python: >=3.13\n",
        );
        let meta = Metadata23::parse_metadata(content.as_bytes()).unwrap();
        assert_eq!(meta.requires_dist.len(), 1);
        assert_eq!(meta.requires_dist[0].to_string(), "bar>=1");
        assert_eq!(meta.requires_python.unwrap().to_string(), ">=3.13");
    }
}
