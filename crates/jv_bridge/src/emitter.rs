use crate::target::CallTarget;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_BRIDGE_PACKAGE: &str = "dev.jv.generated.interop";
const RUNTIME_DISPATCH: &str = "dev.jv.runtime.JvInterop.invokeBinding";

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("failed to write bridge source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One generated Java bridge class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSource {
    pub owner: String,
    pub class_name: String,
    /// Path relative to the source root (`dev/jv/generated/interop/FooBridge.java`).
    pub relative_path: PathBuf,
    pub source: String,
}

impl BridgeSource {
    pub fn write_to(&self, root: &Path) -> Result<PathBuf, EmitError> {
        let path = root.join(&self.relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| EmitError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, &self.source).map_err(|source| EmitError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// Renders static forwarding classes, one per owner class, with one
/// `Object name(Object... args)` method per binding.
#[derive(Debug, Clone)]
pub struct BridgeSourceEmitter {
    package: String,
}

impl Default for BridgeSourceEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_BRIDGE_PACKAGE)
    }
}

impl BridgeSourceEmitter {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Output is ordered by owner, then binding, whatever the input order.
    pub fn emit<'t>(&self, targets: impl IntoIterator<Item = &'t CallTarget>) -> Vec<BridgeSource> {
        let mut by_owner: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for target in targets {
            by_owner
                .entry(target.owner())
                .or_default()
                .insert(target.binding());
        }

        let mut class_names: HashMap<String, usize> = HashMap::new();
        by_owner
            .into_iter()
            .map(|(owner, bindings)| {
                let base = bridge_class_name(owner);
                let seen = class_names.entry(base.clone()).or_insert(0);
                *seen += 1;
                let class_name = if *seen == 1 {
                    base
                } else {
                    format!("{base}{seen}")
                };
                self.render(owner, class_name, &bindings)
            })
            .collect()
    }

    fn render(&self, owner: &str, class_name: String, bindings: &BTreeSet<String>) -> BridgeSource {
        let mut source = String::new();
        source.push_str(&format!("package {};\n\n", self.package));
        source.push_str(&format!("public final class {class_name} {{\n"));
        source.push_str(&format!("    private {class_name}() {{\n    }}\n"));

        let mut method_names: HashMap<String, usize> = HashMap::new();
        for binding in bindings {
            let base = java_identifier(binding);
            let seen = method_names.entry(base.clone()).or_insert(0);
            *seen += 1;
            let method = if *seen == 1 {
                base
            } else {
                format!("{base}_{seen}")
            };
            source.push('\n');
            source.push_str(&format!(
                "    public static Object {method}(final Object... args) {{\n"
            ));
            source.push_str(&format!(
                "        return {RUNTIME_DISPATCH}(\"{}\", \"{}\", args);\n",
                escape_java(owner),
                escape_java(binding)
            ));
            source.push_str("    }\n");
        }
        source.push_str("}\n");

        let relative_path = self
            .package
            .split('.')
            .filter(|segment| !segment.is_empty())
            .collect::<PathBuf>()
            .join(format!("{class_name}.java"));
        BridgeSource {
            owner: owner.to_string(),
            class_name,
            relative_path,
            source,
        }
    }
}

/// `java.util.List` -> `JavaUtilListBridge`.
fn bridge_class_name(owner: &str) -> String {
    let mut name = String::new();
    for part in owner.split(['.', '$']).filter(|part| !part.is_empty()) {
        let part = java_identifier(part);
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    if name.is_empty() {
        name.push_str("Interop");
    }
    name.push_str("Bridge");
    name
}

fn java_identifier(raw: &str) -> String {
    let mut identifier = raw
        .chars()
        .map(|ch| if ch.is_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect::<String>();
    if identifier.is_empty() {
        identifier.push_str("value");
    }
    if identifier.starts_with(|ch: char| ch.is_ascii_digit()) {
        identifier.insert(0, '_');
    }
    identifier
}

fn escape_java(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
