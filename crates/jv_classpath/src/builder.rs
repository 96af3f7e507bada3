use crate::classfile::{parse_class, parse_module_info, ClassParseError};
use crate::entry::{ClasspathEntry, EntryKind, SourceKind};
use crate::index::{ClasspathIndex, EntryReport, SkippedMember, UnreadableEntry};
use crate::metadata::{
    parse_pom_dependencies, parse_pom_properties, ArchiveMetadata, MAVEN_METADATA_PREFIX,
    POM_PROPERTIES_SUFFIX, POM_XML_SUFFIX,
};
use crate::record::{ReleaseVariant, SymbolOrigin, SymbolRecord};
use crate::release::MIN_VERSIONED_RELEASE;
use rayon::prelude::*;
use std::env;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
const VERSIONS_PREFIX: &str = "META-INF/versions/";
const MAX_READ_HINT: u64 = 1 << 20;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error while scanning {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ZIP error while scanning {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("Class parse error in {path}: {source}")]
    ClassFile {
        path: PathBuf,
        #[source]
        source: ClassParseError,
    },
    #[error("runtime module `{module}` not found (runtime image: {image})")]
    MissingRuntimeModule { module: String, image: String },
}

/// Inputs shared by every entry scan.
#[derive(Debug, Clone, Default)]
pub struct IndexContext {
    /// JDK home used to resolve `jrt:/<module>` references, either through
    /// `jmods/<module>.jmod` or an exploded `modules/<module>/` tree.
    pub runtime_image: Option<PathBuf>,
    pub parallel: bool,
}

impl IndexContext {
    pub fn detect() -> Self {
        Self {
            runtime_image: detect_java_home(),
            parallel: true,
        }
    }

    pub fn with_runtime_image(mut self, runtime_image: impl Into<PathBuf>) -> Self {
        self.runtime_image = Some(runtime_image.into());
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

pub struct ClasspathIndexer<'a> {
    context: &'a IndexContext,
}

impl<'a> ClasspathIndexer<'a> {
    pub fn new(context: &'a IndexContext) -> Self {
        Self { context }
    }

    /// Index entries in caller order. Entries may be scanned in parallel; the
    /// results are merged back in declaration order.
    pub fn build(&self, entries: &[ClasspathEntry]) -> ClasspathIndex {
        let scans: Vec<EntryScan> = if self.context.parallel {
            entries.par_iter().map(|entry| self.scan_entry(entry)).collect()
        } else {
            entries.iter().map(|entry| self.scan_entry(entry)).collect()
        };

        let mut index = ClasspathIndex::new();
        for mut scan in scans {
            scan.records.sort_by(|left, right| {
                left.qualified_name
                    .cmp(&right.qualified_name)
                    .then(left.variant.cmp(&right.variant))
            });
            scan.report.class_count = scan.records.len();
            index.push_entry(scan.report, scan.records, scan.skipped, scan.unreadable);
        }

        tracing::debug!(
            entries = entries.len(),
            symbols = index.symbol_count(),
            records = index.record_count(),
            skipped = index.skipped().len(),
            "classpath indexed"
        );
        index
    }

    fn scan_entry(&self, entry: &ClasspathEntry) -> EntryScan {
        let mut scan = EntryScan::new(entry);
        let result = match &entry.kind {
            EntryKind::Directory => self.scan_directory(&entry.path, &mut scan),
            EntryKind::Archive => self.scan_archive(&entry.path, &mut scan),
            EntryKind::RuntimeModule { module } => self.scan_runtime_module(module, &mut scan),
        };

        if let Err(error) = result {
            tracing::warn!(entry = %entry.location(), error = %error, "classpath entry skipped");
            scan.unreadable = Some(UnreadableEntry {
                entry: entry.ordinal,
                location: entry.location(),
                reason: error.to_string(),
            });
        }
        scan
    }

    fn scan_runtime_module(&self, module: &str, scan: &mut EntryScan) -> Result<(), IndexError> {
        let image = self.context.runtime_image.as_deref();
        let jmod = image.map(|home| home.join("jmods").join(format!("{module}.jmod")));
        if let Some(jmod) = jmod.filter(|path| path.is_file()) {
            return self.scan_archive(&jmod, scan);
        }
        let exploded = image.map(|home| home.join("modules").join(module));
        if let Some(exploded) = exploded.filter(|path| path.is_dir()) {
            return self.scan_directory(&exploded, scan);
        }
        Err(IndexError::MissingRuntimeModule {
            module: module.to_string(),
            image: image
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<none>".to_string()),
        })
    }

    fn scan_directory(&self, root: &Path, scan: &mut EntryScan) -> Result<(), IndexError> {
        if !root.is_dir() {
            return Err(IndexError::Io {
                path: root.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "directory does not exist"),
            });
        }

        let mut members = Vec::new();
        let mut dirs = vec![root.to_path_buf()];
        while let Some(dir) = dirs.pop() {
            let entries = fs::read_dir(&dir).map_err(|source| IndexError::Io {
                path: dir.clone(),
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| IndexError::Io {
                    path: dir.clone(),
                    source,
                })?;
                let path = entry.path();
                let metadata = entry.metadata().map_err(|source| IndexError::Io {
                    path: path.clone(),
                    source,
                })?;
                if metadata.is_dir() {
                    dirs.push(path);
                } else if let Ok(relative) = path.strip_prefix(root) {
                    members.push((relative_member_name(relative), path));
                }
            }
        }
        // Byte-stable member order regardless of filesystem listing order.
        members.sort_by(|left, right| left.0.cmp(&right.0));

        if let Some((_, path)) = members.iter().find(|(name, _)| name == "module-info.class") {
            let bytes = read_file(path)?;
            match parse_module_info(&bytes) {
                Ok(info) => scan.report.module = Some(info.name),
                Err(error) => scan.skip("module-info.class", None, error.to_string()),
            }
        }

        for (name, path) in &members {
            let Some(qualified_name) = class_name_for_member(name) else {
                continue;
            };
            match read_file(path) {
                Ok(bytes) => scan.index_class(name, &qualified_name, &bytes, ReleaseVariant::Base),
                Err(error) => scan.skip(name, Some(qualified_name), error.to_string()),
            }
        }
        Ok(())
    }

    fn scan_archive(&self, path: &Path, scan: &mut EntryScan) -> Result<(), IndexError> {
        let file = File::open(path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|source| IndexError::Zip {
                path: path.to_path_buf(),
                source,
            })?;

        let mut names: Vec<String> = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();
        names.sort();

        let jmod = path.extension().is_some_and(|ext| ext == "jmod");
        let multi_release = names.iter().any(|name| name == MANIFEST_PATH)
            && read_member(&mut archive, MANIFEST_PATH)
                .map(|bytes| is_multi_release_manifest(&String::from_utf8_lossy(&bytes)))
                .unwrap_or(false);
        scan.report.multi_release = multi_release;
        scan.report.metadata = read_archive_metadata(&mut archive, &names, scan);

        let module_info_name = names
            .iter()
            .find(|name| archive_member(name, jmod) == "module-info.class")
            .cloned();
        if let Some(name) = module_info_name {
            match read_member(&mut archive, &name).map(|bytes| parse_module_info(&bytes)) {
                Ok(Ok(info)) => scan.report.module = Some(info.name),
                Ok(Err(error)) => scan.skip(&name, None, error.to_string()),
                Err(error) => scan.skip(&name, None, error.to_string()),
            }
        }

        for name in &names {
            let Some((member, variant)) = split_versioned(name, multi_release, jmod) else {
                continue;
            };
            let Some(qualified_name) = class_name_for_member(member) else {
                continue;
            };
            match read_member(&mut archive, name) {
                Ok(bytes) => scan.index_class(name, &qualified_name, &bytes, variant),
                Err(error) => scan.skip(name, Some(qualified_name), error.to_string()),
            }
        }
        Ok(())
    }
}

struct EntryScan {
    report: EntryReport,
    records: Vec<SymbolRecord>,
    skipped: Vec<SkippedMember>,
    unreadable: Option<UnreadableEntry>,
}

impl EntryScan {
    fn new(entry: &ClasspathEntry) -> Self {
        Self {
            report: EntryReport {
                entry: entry.clone(),
                metadata: None,
                multi_release: false,
                module: entry.module_name().map(str::to_string),
                class_count: 0,
            },
            records: Vec::new(),
            skipped: Vec::new(),
            unreadable: None,
        }
    }

    fn source_kind(&self) -> SourceKind {
        self.report.entry.kind.source_kind()
    }

    fn index_class(
        &mut self,
        member: &str,
        qualified_name: &str,
        bytes: &[u8],
        variant: ReleaseVariant,
    ) {
        let class = match parse_class(bytes) {
            Ok(class) => class,
            Err(error) => {
                self.skip(member, Some(qualified_name.to_string()), error.to_string());
                return;
            }
        };
        let origin = SymbolOrigin {
            entry: self.report.entry.ordinal,
            owner: self.report.entry.owner,
            source_kind: self.source_kind(),
            location: self.report.entry.location(),
            member: member.to_string(),
            module: self.report.module.clone(),
            package: class.package().to_string(),
        };
        self.records.push(SymbolRecord {
            qualified_name: class.name.clone(),
            origin,
            variant,
            multi_release: self.report.multi_release,
            class,
        });
    }

    fn skip(&mut self, member: &str, qualified_name: Option<String>, reason: String) {
        tracing::warn!(
            entry = %self.report.entry.location(),
            member,
            reason = %reason,
            "skipping unreadable classpath member"
        );
        self.skipped.push(SkippedMember {
            entry: self.report.entry.ordinal,
            location: self.report.entry.location(),
            member: member.to_string(),
            qualified_name,
            reason,
        });
    }
}

fn read_archive_metadata<R: Read + io::Seek>(
    archive: &mut ZipArchive<R>,
    names: &[String],
    scan: &mut EntryScan,
) -> Option<ArchiveMetadata> {
    let properties_name = names.iter().find(|name| {
        name.starts_with(MAVEN_METADATA_PREFIX) && name.ends_with(POM_PROPERTIES_SUFFIX)
    })?;
    let parsed = read_member(archive, properties_name)
        .map_err(|error| error.to_string())
        .and_then(|bytes| {
            parse_pom_properties(&String::from_utf8_lossy(&bytes)).map_err(|e| e.to_string())
        });
    let (coordinate, version) = match parsed {
        Ok(parsed) => parsed,
        Err(reason) => {
            scan.skip(properties_name, None, reason);
            return None;
        }
    };

    let pom_name = format!(
        "{}{POM_XML_SUFFIX}",
        properties_name.trim_end_matches(POM_PROPERTIES_SUFFIX)
    );
    let mut dependencies = Vec::new();
    if names.iter().any(|name| name == &pom_name) {
        let parsed = read_member(archive, &pom_name)
            .map_err(|error| error.to_string())
            .and_then(|bytes| {
                parse_pom_dependencies(&String::from_utf8_lossy(&bytes))
                    .map_err(|e| e.to_string())
            });
        match parsed {
            Ok(parsed) => dependencies = parsed,
            Err(reason) => scan.skip(&pom_name, None, reason),
        }
    }

    Some(ArchiveMetadata {
        coordinate,
        version,
        dependencies,
    })
}

fn read_member<R: Read + io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, IndexError> {
    let mut entry = archive.by_name(name).map_err(|source| IndexError::Zip {
        path: PathBuf::from(name),
        source,
    })?;
    // The declared size comes from the archive itself; only trust it as a hint.
    let mut buffer = Vec::with_capacity(entry.size().min(MAX_READ_HINT) as usize);
    entry
        .read_to_end(&mut buffer)
        .map_err(|source| IndexError::Io {
            path: PathBuf::from(name),
            source,
        })?;
    Ok(buffer)
}

fn read_file(path: &Path) -> Result<Vec<u8>, IndexError> {
    fs::read(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn is_multi_release_manifest(manifest: &str) -> bool {
    manifest.lines().any(|line| {
        line.split_once(':').map_or(false, |(key, value)| {
            key.trim().eq_ignore_ascii_case("Multi-Release")
                && value.trim().eq_ignore_ascii_case("true")
        })
    })
}

/// Map an archive member to its class path and release tag. Returns `None`
/// for members the JVM would not load as classes from this archive.
fn split_versioned(name: &str, multi_release: bool, jmod: bool) -> Option<(&str, ReleaseVariant)> {
    if let Some(rest) = name.strip_prefix(VERSIONS_PREFIX) {
        if !multi_release {
            return None;
        }
        let (release, member) = rest.split_once('/')?;
        let release = release.parse::<u16>().ok()?;
        if release < MIN_VERSIONED_RELEASE {
            return None;
        }
        return Some((member, ReleaseVariant::Versioned(release)));
    }
    if name.starts_with("META-INF/") {
        return None;
    }
    Some((archive_member(name, jmod), ReleaseVariant::Base))
}

/// Class path inside the archive. Only `.jmod` files keep classes under `classes/`.
fn archive_member(name: &str, jmod: bool) -> &str {
    if jmod {
        name.strip_prefix("classes/").unwrap_or(name)
    } else {
        name
    }
}

fn class_name_for_member(member: &str) -> Option<String> {
    let stem = member.strip_suffix(".class")?;
    let simple = stem.rsplit('/').next().unwrap_or(stem);
    if simple == "module-info" || simple == "package-info" {
        return None;
    }
    Some(stem.replace('/', "."))
}

fn relative_member_name(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn detect_java_home() -> Option<PathBuf> {
    if let Ok(path) = env::var("JAVA_HOME") {
        let candidate = PathBuf::from(path);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let java_path = which::which("java").ok()?;
    let java_path = fs::canonicalize(&java_path).unwrap_or(java_path);
    java_path
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
}
