//! Fixture writers for class files and archives, shared with downstream
//! crates through the `test-support` feature.

use crate::record::{ACC_ENUM, ACC_FINAL, ACC_PUBLIC, ACC_STATIC};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const TAG_UTF8: u8 = 1;
const TAG_CLASS: u8 = 7;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

struct MemberSpec {
    access: u16,
    name: String,
    descriptor: String,
    signature: Option<String>,
}

/// Minimal class-file emitter. Only the constant pool entries and attributes
/// the indexer reads are produced.
pub struct ClassFileWriter {
    name: String,
    access: u16,
    super_class: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<MemberSpec>,
    methods: Vec<MemberSpec>,
}

impl ClassFileWriter {
    /// Public class extending `java.lang.Object`. Names use dots.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            access: ACC_PUBLIC,
            super_class: Some("java.lang.Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn super_class(mut self, super_class: Option<&str>) -> Self {
        self.super_class = super_class.map(str::to_string);
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.fields.push(MemberSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: None,
        });
        self
    }

    pub fn generic_field(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        signature: &str,
    ) -> Self {
        self.fields.push(MemberSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: Some(signature.to_string()),
        });
        self
    }

    /// `public static final` enum constant of this class.
    pub fn enum_constant(self, name: &str) -> Self {
        let descriptor = format!("L{};", self.name.replace('.', "/"));
        self.field(
            ACC_PUBLIC | ACC_STATIC | ACC_FINAL | ACC_ENUM,
            name,
            &descriptor,
        )
    }

    pub fn method(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.methods.push(MemberSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: None,
        });
        self
    }

    pub fn generic_method(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        signature: &str,
    ) -> Self {
        self.methods.push(MemberSpec {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: Some(signature.to_string()),
        });
        self
    }

    pub fn constructor(self, access: u16, descriptor: &str) -> Self {
        self.method(access, "<init>", descriptor)
    }

    /// Member path inside an archive or directory (`a/b/C.class`).
    pub fn member_path(&self) -> String {
        format!("{}.class", self.name.replace('.', "/"))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut pool = PoolBuilder::default();
        let this_class = pool.class(&self.name);
        let super_class = self
            .super_class
            .as_deref()
            .map(|name| pool.class(name))
            .unwrap_or(0);
        let interfaces: Vec<u16> = self
            .interfaces
            .iter()
            .map(|name| pool.class(name))
            .collect();
        let fields: Vec<(u16, u16, u16, Option<(u16, u16)>)> =
            self.fields.iter().map(|spec| pool.member(spec)).collect();
        let methods: Vec<(u16, u16, u16, Option<(u16, u16)>)> =
            self.methods.iter().map(|spec| pool.member(spec)).collect();

        let mut out = Vec::new();
        write_header(&mut out, &pool);
        push_u2(&mut out, self.access);
        push_u2(&mut out, this_class);
        push_u2(&mut out, super_class);
        push_u2(&mut out, interfaces.len() as u16);
        for index in interfaces {
            push_u2(&mut out, index);
        }
        for members in [&fields, &methods] {
            push_u2(&mut out, members.len() as u16);
            for (access, name, descriptor, signature) in members {
                push_u2(&mut out, *access);
                push_u2(&mut out, *name);
                push_u2(&mut out, *descriptor);
                match signature {
                    Some((attribute, value)) => {
                        push_u2(&mut out, 1);
                        push_u2(&mut out, *attribute);
                        out.extend_from_slice(&2u32.to_be_bytes());
                        push_u2(&mut out, *value);
                    }
                    None => push_u2(&mut out, 0),
                }
            }
        }
        push_u2(&mut out, 0);
        out
    }
}

/// `module-info.class` bytes declaring `name` and exporting `exports`.
pub fn module_info_bytes(name: &str, exports: &[&str]) -> Vec<u8> {
    let mut pool = PoolBuilder::default();
    let this_class = pool.class("module-info");
    let attribute = pool.utf8("Module");
    let module = pool.module(name);
    let packages: Vec<u16> = exports.iter().map(|package| pool.package(package)).collect();

    let mut body = Vec::new();
    push_u2(&mut body, module);
    push_u2(&mut body, 0);
    push_u2(&mut body, 0);
    push_u2(&mut body, 0);
    push_u2(&mut body, packages.len() as u16);
    for package in packages {
        push_u2(&mut body, package);
        push_u2(&mut body, 0);
        push_u2(&mut body, 0);
    }
    for _ in 0..3 {
        push_u2(&mut body, 0);
    }

    let mut out = Vec::new();
    write_header(&mut out, &pool);
    push_u2(&mut out, 0x8000);
    push_u2(&mut out, this_class);
    push_u2(&mut out, 0);
    push_u2(&mut out, 0);
    push_u2(&mut out, 0);
    push_u2(&mut out, 0);
    push_u2(&mut out, 1);
    push_u2(&mut out, attribute);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

#[derive(Default)]
struct PoolBuilder {
    bytes: Vec<u8>,
    count: u16,
    utf8: HashMap<String, u16>,
}

impl PoolBuilder {
    fn next(&mut self) -> u16 {
        self.count += 1;
        self.count
    }

    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(index) = self.utf8.get(value) {
            return *index;
        }
        let index = self.next();
        self.bytes.push(TAG_UTF8);
        push_u2(&mut self.bytes, value.len() as u16);
        self.bytes.extend_from_slice(value.as_bytes());
        self.utf8.insert(value.to_string(), index);
        index
    }

    fn indirect(&mut self, tag: u8, value: &str) -> u16 {
        let name = self.utf8(value);
        let index = self.next();
        self.bytes.push(tag);
        push_u2(&mut self.bytes, name);
        index
    }

    fn class(&mut self, dotted: &str) -> u16 {
        self.indirect(TAG_CLASS, &dotted.replace('.', "/"))
    }

    fn module(&mut self, name: &str) -> u16 {
        self.indirect(TAG_MODULE, name)
    }

    fn package(&mut self, dotted: &str) -> u16 {
        self.indirect(TAG_PACKAGE, &dotted.replace('.', "/"))
    }

    fn member(&mut self, spec: &MemberSpec) -> (u16, u16, u16, Option<(u16, u16)>) {
        let name = self.utf8(&spec.name);
        let descriptor = self.utf8(&spec.descriptor);
        let signature = spec.signature.as_deref().map(|signature| {
            let attribute = self.utf8("Signature");
            (attribute, self.utf8(signature))
        });
        (spec.access, name, descriptor, signature)
    }
}

fn write_header(out: &mut Vec<u8>, pool: &PoolBuilder) {
    out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
    push_u2(out, 0);
    push_u2(out, 61);
    push_u2(out, pool.count + 1);
    out.extend_from_slice(&pool.bytes);
}

fn push_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Builds a jar with sorted-independent member order and optional Maven and
/// multi-release metadata.
pub struct JarWriter {
    members: Vec<(String, Vec<u8>)>,
}

impl Default for JarWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl JarWriter {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    pub fn entry(mut self, name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.members.push((name.to_string(), bytes.into()));
        self
    }

    pub fn class(self, class: &ClassFileWriter) -> Self {
        let path = class.member_path();
        self.entry(&path, class.to_bytes())
    }

    pub fn versioned_class(self, release: u16, class: &ClassFileWriter) -> Self {
        let path = format!("META-INF/versions/{release}/{}", class.member_path());
        self.entry(&path, class.to_bytes())
    }

    pub fn multi_release(self) -> Self {
        self.entry(
            "META-INF/MANIFEST.MF",
            "Manifest-Version: 1.0\r\nMulti-Release: true\r\n\r\n",
        )
    }

    pub fn maven(self, group: &str, artifact: &str, version: &str) -> Self {
        let properties =
            format!("groupId={group}\nartifactId={artifact}\nversion={version}\n");
        self.entry(
            &format!("META-INF/maven/{group}/{artifact}/pom.properties"),
            properties,
        )
    }

    /// Embedded `pom.xml` listing `(group, artifact, version, scope)` tuples.
    pub fn pom(
        self,
        group: &str,
        artifact: &str,
        dependencies: &[(&str, &str, Option<&str>, Option<&str>)],
    ) -> Self {
        let mut xml = String::from("<?xml version=\"1.0\"?>\n<project>\n  <dependencies>\n");
        for (dep_group, dep_artifact, version, scope) in dependencies {
            xml.push_str("    <dependency>\n");
            xml.push_str(&format!("      <groupId>{dep_group}</groupId>\n"));
            xml.push_str(&format!("      <artifactId>{dep_artifact}</artifactId>\n"));
            if let Some(version) = version {
                xml.push_str(&format!("      <version>{version}</version>\n"));
            }
            if let Some(scope) = scope {
                xml.push_str(&format!("      <scope>{scope}</scope>\n"));
            }
            xml.push_str("    </dependency>\n");
        }
        xml.push_str("  </dependencies>\n</project>\n");
        self.entry(&format!("META-INF/maven/{group}/{artifact}/pom.xml"), xml)
    }

    pub fn write(&self, path: &Path) -> io::Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut zip = ZipWriter::new(File::create(path)?);
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, bytes) in &self.members {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }
        zip.finish()?;
        Ok(path.to_path_buf())
    }
}

/// Write each class under `root` as an exploded directory entry.
pub fn write_class_dir(root: &Path, classes: &[ClassFileWriter]) -> io::Result<PathBuf> {
    for class in classes {
        let path = root.join(class.member_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, class.to_bytes())?;
    }
    Ok(root.to_path_buf())
}
