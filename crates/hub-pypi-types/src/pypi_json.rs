use std::str::FromStr;

use serde::Deserialize;

use hub_normalize::PackageName;
use hub_pep440::Version;

use crate::metadata::{parse_provides_extras, parse_requires_dist};
use crate::simple_json::parse_requires_python_lenient;
use crate::{Metadata23, MetadataError};

/// The subset of a PyPI JSON API release response (`/pypi/{name}/{version}/json`) that carries
/// core metadata.
///
/// <https://warehouse.pypa.io/api-reference/json.html#get--pypi--project_name---version--json>
#[derive(Debug, Clone, Deserialize)]
pub struct PypiJson {
    pub info: PypiInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PypiInfo {
    pub name: String,
    pub version: String,
    pub requires_dist: Option<Vec<String>>,
    pub requires_python: Option<String>,
    #[serde(default)]
    pub provides_extra: Option<Vec<String>>,
}

impl TryFrom<PypiJson> for Metadata23 {
    type Error = MetadataError;

    fn try_from(json: PypiJson) -> Result<Self, Self::Error> {
        let info = json.info;
        let name = PackageName::new(info.name)?;
        let version = Version::from_str(&info.version).map_err(MetadataError::Pep440VersionError)?;
        let requires_dist = info
            .requires_dist
            .unwrap_or_default()
            .iter()
            .map(|requires_dist| parse_requires_dist(requires_dist))
            .collect::<Result<Vec<_>, _>>()?;
        let requires_python = info
            .requires_python
            .as_deref()
            .and_then(parse_requires_python_lenient)
            .transpose()?;
        let provides_extras =
            parse_provides_extras(info.provides_extra.unwrap_or_default().into_iter());
        Ok(Self {
            // The JSON API doesn't report the metadata version it was built from.
            metadata_version: "2.1".to_string(),
            name,
            version,
            requires_dist,
            requires_python,
            provides_extras,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{Metadata23, PypiJson};

    #[test]
    fn from_json_api() {
        let json = r#"{
            "info": {
                "name": "Flask",
                "version": "3.0.0",
                "requires_dist": [
                    "Werkzeug >=3.0.0",
                    "Jinja2 >=3.1.2",
                    "importlib-metadata >=3.6.0 ; python_version < \"3.10\"",
                    "asgiref >=3.2 ; extra == 'async'"
                ],
                "requires_python": ">=3.8",
                "provides_extra": ["async", "dotenv"]
            },
            "urls": []
        }"#;
        let json: PypiJson = serde_json::from_str(json).unwrap();
        let metadata = Metadata23::try_from(json).unwrap();
        assert_eq!(metadata.name.as_str(), "flask");
        assert_eq!(metadata.requires_dist.len(), 4);
        assert_eq!(metadata.requires_dist[0].to_string(), "werkzeug>=3.0.0");
        assert_eq!(metadata.provides_extras.len(), 2);
        assert_eq!(metadata.requires_python.unwrap().to_string(), ">=3.8");
    }

    #[test]
    fn null_requires_dist() {
        let json = r#"{"info": {"name": "six", "version": "1.16.0", "requires_dist": null, "requires_python": ""}}"#;
        let json: PypiJson = serde_json::from_str(json).unwrap();
        let metadata = Metadata23::try_from(json).unwrap();
        assert!(metadata.requires_dist.is_empty());
        assert!(metadata.requires_python.is_none());
    }
}
