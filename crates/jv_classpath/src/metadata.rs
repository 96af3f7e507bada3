use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

pub const POM_PROPERTIES_SUFFIX: &str = "/pom.properties";
pub const POM_XML_SUFFIX: &str = "/pom.xml";
pub const MAVEN_METADATA_PREFIX: &str = "META-INF/maven/";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("pom.properties is missing `{key}`")]
    MissingProperty { key: &'static str },
    #[error("failed to parse pom.xml: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("pom.xml has no <project> element")]
    MissingProject,
}

/// `groupId:artifactId` identity of a library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LibraryCoordinate {
    pub group: String,
    pub artifact: String,
}

impl LibraryCoordinate {
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
        }
    }
}

impl fmt::Display for LibraryCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)
    }
}

/// Dependency declared in an embedded `pom.xml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredDependency {
    pub coordinate: LibraryCoordinate,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub optional: bool,
}

/// Maven metadata embedded in an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub coordinate: LibraryCoordinate,
    pub version: String,
    pub dependencies: Vec<DeclaredDependency>,
}

/// Parse `pom.properties` (`groupId`, `artifactId`, `version`).
pub fn parse_pom_properties(text: &str) -> Result<(LibraryCoordinate, String), MetadataError> {
    let properties = parse_properties(text);
    let lookup = |key: &'static str| {
        properties
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.clone())
            .filter(|value| !value.is_empty())
            .ok_or(MetadataError::MissingProperty { key })
    };
    let group = lookup("groupId")?;
    let artifact = lookup("artifactId")?;
    let version = lookup("version")?;
    Ok((LibraryCoordinate::new(group, artifact), version))
}

/// Minimal `key=value` / `key: value` reader for Java properties text.
/// Comments (`#`, `!`) and blank lines are ignored; later keys win.
pub fn parse_properties(text: &str) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let split = line.find(['=', ':']);
        let (key, value) = match split {
            Some(index) => (line[..index].trim(), line[index + 1..].trim()),
            None => (line, ""),
        };
        if let Some(existing) = entries.iter_mut().find(|(candidate, _)| candidate == key) {
            existing.1 = value.to_string();
        } else {
            entries.push((key.to_string(), value.to_string()));
        }
    }
    entries
}

/// Extract the direct dependencies from an embedded `pom.xml`.
///
/// Property placeholders are not interpolated: a version or scope that still
/// contains `${` is treated as absent.
pub fn parse_pom_dependencies(xml: &str) -> Result<Vec<DeclaredDependency>, MetadataError> {
    let normalized = normalize_xml_entities(xml);
    let document = Document::parse(normalized.as_ref())?;
    let project = document
        .descendants()
        .find(|node| node.has_tag_name("project"))
        .ok_or(MetadataError::MissingProject)?;

    let Some(dependencies) = child_element(&project, "dependencies") else {
        return Ok(Vec::new());
    };

    let mut result = Vec::new();
    for dependency in dependencies
        .children()
        .filter(|child| child.is_element() && child.tag_name().name() == "dependency")
    {
        let (Some(group), Some(artifact)) = (
            node_text(&dependency, "groupId"),
            node_text(&dependency, "artifactId"),
        ) else {
            continue;
        };
        result.push(DeclaredDependency {
            coordinate: LibraryCoordinate::new(group, artifact),
            version: node_text(&dependency, "version").filter(|value| !is_placeholder(value)),
            scope: node_text(&dependency, "scope").filter(|value| !is_placeholder(value)),
            optional: node_text(&dependency, "optional")
                .map(|value| value.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        });
    }
    Ok(result)
}

fn is_placeholder(value: &str) -> bool {
    value.contains("${")
}

fn child_element<'a, 'input>(
    node: &Node<'a, 'input>,
    tag: &str,
) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn node_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn normalize_xml_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '&' {
            output.push(ch);
            continue;
        }
        let mut entity = String::new();
        while let Some(&next) = chars.peek() {
            entity.push(next);
            chars.next();
            if next == ';' || entity.len() > 32 {
                break;
            }
        }
        let known = entity.strip_suffix(';').map(|name| {
            ["lt", "gt", "amp", "quot", "apos"]
                .iter()
                .any(|known| name.eq_ignore_ascii_case(known))
                || name.starts_with('#')
        });
        match known {
            // DTD-defined entities are unknown to roxmltree.
            Some(false) => output.push(' '),
            _ => {
                output.push('&');
                output.push_str(&entity);
            }
        }
    }
    Cow::Owned(output)
}
