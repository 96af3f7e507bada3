#![allow(dead_code)]

use jv_classpath::testing::{ClassFileWriter, JarWriter};
use jv_classpath::{ACC_PUBLIC, ACC_STATIC};
use jv_interop::{
    InteropConfig, InvocationError, Invoker, JvmValue, PolicyMode, PolicyOverrides,
    PolicySettings, ResolvedBinding,
};
use std::path::{Path, PathBuf};

pub const PS: u16 = ACC_PUBLIC | ACC_STATIC;

pub type Dep<'a> = (&'a str, &'a str, Option<&'a str>, Option<&'a str>);

/// Config writing under `root/out`, indexing sequentially, no ambient policy.
pub fn config(root: &Path) -> InteropConfig {
    let mut config = InteropConfig::isolated(root.join("out"));
    config.parallel = false;
    config
}

/// Broad policy with risk acknowledged, so only the explicit settings govern.
pub fn broad() -> PolicyOverrides {
    PolicyOverrides {
        settings: PolicySettings {
            mode: Some(PolicyMode::Broad),
            ack_risk: Some(true),
            ..PolicySettings::default()
        },
        approval: None,
    }
}

pub fn maven_jar(
    dir: &Path,
    file: &str,
    gav: (&str, &str, &str),
    deps: &[Dep<'_>],
    class: ClassFileWriter,
) -> PathBuf {
    let (group, artifact, version) = gav;
    JarWriter::new()
        .maven(group, artifact, version)
        .pom(group, artifact, deps)
        .class(&class)
        .write(&dir.join(file))
        .expect("jar")
}

pub fn path_string(path: &Path) -> String {
    path.display().to_string()
}

pub fn file_names<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Vec<String> {
    paths
        .into_iter()
        .filter_map(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Answers every call with the selected binding's signature.
pub struct Recorder;

impl Invoker for Recorder {
    fn invoke(
        &self,
        binding: &ResolvedBinding,
        _receiver: Option<&JvmValue>,
        _arguments: Vec<JvmValue>,
    ) -> Result<JvmValue, InvocationError> {
        Ok(JvmValue::String(binding.signature()))
    }
}
