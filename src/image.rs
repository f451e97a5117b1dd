use crate::error::FixtureError;
use docker_api::opts::ImageFilter;
use regex::Regex;
use std::{fmt::Display, str::FromStr};

/// A docker image reference split into its registry, repository and version.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageName {
    raw_name: String,
    registry: Option<String>,
    repository: String,
    version: Version,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Version {
    Any,
    Sha256(String),
    Tag(String),
}

impl ImageName {
    pub fn full_name(&self) -> &str {
        &self.raw_name
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Filter selecting this image among the locally present ones.
    pub(crate) fn local_filter(&self) -> ImageFilter {
        let image = match &self.registry {
            Some(registry) => format!("{registry}/{}", self.repository),
            None => self.repository.clone(),
        };
        let tag = match &self.version {
            Version::Any => None,
            Version::Sha256(hash) => Some(hash.clone()),
            Version::Tag(tag) => Some(tag.clone()),
        };
        ImageFilter::Reference(image, tag)
    }
}

impl Display for ImageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw_name)
    }
}

impl FromStr for ImageName {
    type Err = FixtureError;

    fn from_str(full_name: &str) -> Result<Self, Self::Err> {
        let (registry, remainder) = match full_name.split_once('/') {
            Some((host, remainder))
                if host.contains('.') || host.contains(':') || host == "localhost" =>
            {
                (Some(host.to_string()), remainder)
            }
            _ => (None, full_name),
        };

        let (repository, version) = match remainder.split_once("@sha256:") {
            Some((repository, hash)) => (repository, Version::sha256(hash)?),
            None => match remainder.split_once(':') {
                Some((repository, tag)) => (repository, Version::tag(tag)?),
                None => (remainder, Version::Any),
            },
        };

        if repository.is_empty() || repository.contains('@') || repository.contains(':') {
            return Err(invalid(format!("invalid repository name: {repository}")));
        }
        Ok(ImageName {
            raw_name: full_name.to_string(),
            registry,
            repository: repository.to_string(),
            version,
        })
    }
}

impl Version {
    fn sha256(hash: &str) -> Result<Version, FixtureError> {
        if matches("^[0-9a-fA-F]{32,}$", hash)? {
            Ok(Version::Sha256(hash.to_string()))
        } else {
            Err(invalid(format!("invalid sha256 hash version: {hash}")))
        }
    }

    fn tag(tag: &str) -> Result<Version, FixtureError> {
        if matches(r"^[\w][\w.\-]{0,127}$", tag)? {
            Ok(Version::Tag(tag.to_string()))
        } else {
            Err(invalid(format!("invalid tag version: {tag}")))
        }
    }
}

fn matches(pattern: &str, text: &str) -> Result<bool, FixtureError> {
    let regex = Regex::new(pattern).map_err(|e| invalid(e.to_string()))?;
    Ok(regex.is_match(text))
}

fn invalid(reason: String) -> FixtureError {
    FixtureError::InvalidConfig { reason }
}
