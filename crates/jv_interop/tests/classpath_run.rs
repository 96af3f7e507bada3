//! End-to-end runs over generated archives: mediation, multi-release
//! selection, scope filtering and isolation as seen through a session.

mod common;

use common::{broad, config, file_names, maven_jar, path_string, PS};
use jv_classpath::testing::{write_class_dir, ClassFileWriter, JarWriter};
use jv_classpath::parse_properties;
use jv_interop::{
    codes, CallManifest, CallTarget, ClasspathUsage, InteropRequest, InteropSession,
    IntoDiagnostic, IsolationMode, PolicySettings, ARTIFACT_FILE_NAME,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

fn class_with(name: &str, method: &str) -> ClassFileWriter {
    ClassFileWriter::new(name).method(PS, method, "()Ljava/lang/String;")
}

fn target(raw: &str) -> CallTarget {
    CallTarget::parse(raw).expect("target")
}

fn artifact_map(path: &Path) -> BTreeMap<String, String> {
    parse_properties(&fs::read_to_string(path).expect("read artifact"))
        .into_iter()
        .collect()
}

/// `app -> a:1.0, b:1.0` and `b -> a:2.0`, with a-2.0 listed before a-1.0.
fn nearest_fixture(root: &Path) -> (PathBuf, Vec<String>) {
    let program = write_class_dir(&root.join("classes"), &[ClassFileWriter::new("app.Main")])
        .expect("program dir");
    let app = maven_jar(
        root,
        "app.jar",
        ("org.app", "app", "1.0"),
        &[
            ("org.lib", "a", Some("1.0"), None),
            ("org.lib", "b", Some("1.0"), None),
        ],
        ClassFileWriter::new("org.app.App"),
    );
    let a2 = maven_jar(root, "a-2.0.jar", ("org.lib", "a", "2.0"), &[], class_with("org.lib.A", "v2"));
    let b = maven_jar(
        root,
        "b-1.0.jar",
        ("org.lib", "b", "1.0"),
        &[("org.lib", "a", Some("2.0"), None)],
        ClassFileWriter::new("org.lib.B"),
    );
    let a1 = maven_jar(root, "a-1.0.jar", ("org.lib", "a", "1.0"), &[], class_with("org.lib.A", "v1"));
    (program, vec![path_string(&app), path_string(&a2), path_string(&b), path_string(&a1)])
}

#[test]
fn nearest_version_wins_and_program_output_leads() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (program, classpath) = nearest_fixture(dir.path());
    let manifest = CallManifest::from_targets(["org.lib.A#v1"])?;
    let request = InteropRequest::new(manifest)
        .program_dir(&program)
        .classpath(classpath)
        .overrides(broad());

    let session = InteropSession::prepare(config(dir.path()), request)?;
    let classpath: Vec<&Path> = session.classpath().iter().map(|entry| entry.path.as_path()).collect();
    assert_eq!(
        file_names(classpath),
        vec!["classes", "app.jar", "b-1.0.jar", "a-1.0.jar"]
    );

    let binding = session.resolve(&target("org.lib.A#v1"), None, Vec::new())?;
    assert_eq!(binding.descriptor, "()Ljava/lang/String;");
    let rejected = session
        .resolve(&target("org.lib.A#v2"), None, Vec::new())
        .expect_err("the rejected version is not on the classpath");
    assert_eq!(rejected.code(), codes::SYMBOL_NOT_FOUND);

    let summary = session.finish()?;
    let artifact = artifact_map(&summary.artifact_path);
    assert_eq!(artifact["interopClasspath.count"], "4");
    assert!(artifact["interopClasspath.0"].ends_with("classes"));
    assert!(artifact["interopClasspath.3"].ends_with("a-1.0.jar"));
    assert_eq!(artifact["interopClasspath.mediation.count"], "1");
    assert_eq!(artifact["interopClasspath.mediation.0.artifact"], "org.lib:a");
    assert_eq!(artifact["interopClasspath.mediation.0.selectedVersion"], "1.0");
    assert_eq!(artifact["interopClasspath.mediation.0.rejectedVersion"], "2.0");
    assert_eq!(artifact["interopClasspath.mediation.0.rule"], "nearest");
    assert_eq!(artifact["interopClasspath.scope.usage"], "compile");
    assert_eq!(artifact["interopClasspath.classloaderIsolation"], "shared");
    assert_eq!(artifact["interopBridges.selectedTargetCount"], "1");
    assert_eq!(artifact["interopBridges.selectedTarget.0.target"], "org.lib.A#v1");
    assert_eq!(artifact["interopBridges.selectedTarget.0.owner"], "org.lib.A");
    assert_eq!(artifact["interopBridges.selectedTarget.0.invokeKind"], "invokestatic");
    assert!(summary.artifact_path.ends_with(ARTIFACT_FILE_NAME));
    Ok(())
}

#[test]
fn equal_depth_follows_root_order_and_swaps() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let root = dir.path();
    let first = maven_jar(
        root,
        "first.jar",
        ("org.app", "first", "1.0"),
        &[("org.lib", "x", Some("1.0"), None)],
        ClassFileWriter::new("org.app.First"),
    );
    let second = maven_jar(
        root,
        "second.jar",
        ("org.app", "second", "1.0"),
        &[("org.lib", "x", Some("2.0"), None)],
        ClassFileWriter::new("org.app.Second"),
    );
    let x1 = maven_jar(root, "x-1.jar", ("org.lib", "x", "1.0"), &[], class_with("org.lib.X", "one"));
    let x2 = maven_jar(root, "x-2.jar", ("org.lib", "x", "2.0"), &[], class_with("org.lib.X", "two"));

    let run = |order: [&PathBuf; 4]| -> anyhow::Result<InteropSession> {
        let request = InteropRequest::new(CallManifest::default())
            .classpath(order.iter().map(|path| path_string(path)))
            .overrides(broad());
        Ok(InteropSession::prepare(config(root), request)?)
    };

    let session = run([&first, &second, &x1, &x2])?;
    let decision = &session.mediation().decisions()[0];
    assert_eq!(decision.selected_version, "1.0");
    assert_eq!(decision.rule.as_str(), "root-order");
    assert!(session.resolve(&target("org.lib.X#one"), None, Vec::new()).is_ok());

    let swapped = run([&second, &first, &x1, &x2])?;
    assert_eq!(swapped.mediation().decisions()[0].selected_version, "2.0");
    assert!(swapped.resolve(&target("org.lib.X#two"), None, Vec::new()).is_ok());
    Ok(())
}

fn multi_release_jar(root: &Path) -> PathBuf {
    JarWriter::new()
        .multi_release()
        .class(&ClassFileWriter::new("mr.Base"))
        .class(&class_with("mr.Api", "legacy"))
        .versioned_class(11, &class_with("mr.Api", "modern"))
        .write(&root.join("mr.jar"))
        .expect("jar")
}

#[test]
fn multi_release_variant_follows_the_target_release() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let jar = path_string(&multi_release_jar(dir.path()));

    let mut modern = config(dir.path());
    modern.target_release = 17;
    let session = InteropSession::prepare(
        modern,
        InteropRequest::new(CallManifest::default())
            .classpath([jar.clone()])
            .overrides(broad()),
    )?;
    assert!(session.resolve(&target("mr.Api#modern"), None, Vec::new()).is_ok());
    let summary = session.finish()?;
    let artifact = artifact_map(&summary.artifact_path);
    assert_eq!(artifact["interopClasspath.classIndex.mrJarWinnerCount"], "2");
    assert_eq!(artifact["interopClasspath.classIndex.mrJarBaseWinnerCount"], "1");
    assert_eq!(artifact["interopClasspath.classIndex.mrJarVersionedWinnerCount"], "1");
    assert_eq!(artifact["interopClasspath.classIndex.symbolCount"], "2");
    assert!(artifact["interopClasspath.classIndex.path"].ends_with("class-index.json"));

    let mut legacy = config(dir.path());
    legacy.target_release = 8;
    legacy.output_dir = dir.path().join("legacy-out");
    let session = InteropSession::prepare(
        legacy,
        InteropRequest::new(CallManifest::default())
            .classpath([jar])
            .overrides(broad()),
    )?;
    assert!(session.resolve(&target("mr.Api#legacy"), None, Vec::new()).is_ok());
    let missing = session
        .resolve(&target("mr.Api#modern"), None, Vec::new())
        .expect_err("release 11 variant is not visible at release 8");
    assert_eq!(missing.code(), codes::SYMBOL_NOT_FOUND);
    assert_eq!(session.view().release_stats().mr_jar_versioned_winner_count, 0);
    Ok(())
}

fn provided_fixture(root: &Path) -> Vec<String> {
    let app = maven_jar(
        root,
        "app.jar",
        ("org.app", "app", "1.0"),
        &[("org.api", "servlet", Some("4.0"), Some("provided"))],
        ClassFileWriter::new("org.app.Main"),
    );
    let api = maven_jar(
        root,
        "servlet-api.jar",
        ("org.api", "servlet", "4.0"),
        &[],
        class_with("org.api.Servlet", "version"),
    );
    vec![path_string(&app), path_string(&api)]
}

#[test]
fn provided_scope_is_visible_at_compile_but_not_runtime() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let classpath = provided_fixture(dir.path());
    let manifest = CallManifest::from_targets(["org.api.Servlet#version"])?;

    let compile = InteropSession::prepare(
        config(dir.path()),
        InteropRequest::new(manifest.clone())
            .classpath(classpath.clone())
            .overrides(broad()),
    )?;
    assert_eq!(compile.usage(), ClasspathUsage::Compile);
    assert!(compile
        .resolve(&target("org.api.Servlet#version"), None, Vec::new())
        .is_ok());

    let mut overrides = broad();
    overrides.settings.classpath_scope = Some(ClasspathUsage::Runtime);
    let error = match InteropSession::prepare(
        config(dir.path()),
        InteropRequest::new(manifest)
            .classpath(classpath)
            .overrides(overrides),
    ) {
        Err(error) => error,
        Ok(_) => panic!("runtime usage must exclude the provided dependency"),
    };
    let diagnostic = error.to_diagnostic();
    assert_eq!(diagnostic.code, codes::SCOPE_VIOLATION);
    assert_eq!(diagnostic.context_value("targetClass"), Some("org.api.Servlet"));
    assert_eq!(diagnostic.context_value("scope"), Some("provided"));
    assert_eq!(diagnostic.context_value("usage"), Some("runtime"));
    assert!(!dir.path().join("out").exists());
    Ok(())
}

fn colliding_fixture(root: &Path) -> (PathBuf, String) {
    let program = write_class_dir(
        &root.join("classes"),
        &[
            ClassFileWriter::new("app.Main"),
            ClassFileWriter::new("com.acme.Widget"),
        ],
    )
    .expect("program dir");
    let library = JarWriter::new()
        .class(&class_with("com.acme.Widget", "fromLibrary"))
        .write(&root.join("widget.jar"))
        .expect("jar");
    (program, path_string(&library))
}

#[test]
fn isolation_conflict_is_fatal_only_when_app_isolated() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (program, library) = colliding_fixture(dir.path());
    let request = || {
        InteropRequest::new(CallManifest::default())
            .program_dir(&program)
            .classpath([library.clone()])
            .overrides(broad())
    };

    let mut isolated = config(dir.path());
    isolated.isolation = IsolationMode::AppIsolated;
    let error = match InteropSession::prepare(isolated, request()) {
        Err(error) => error,
        Ok(_) => panic!("app-isolated collision must abort the run"),
    };
    let diagnostic = error.to_diagnostic();
    assert_eq!(diagnostic.code, codes::ISOLATION_CONFLICT);
    assert_eq!(diagnostic.context_value("qualifiedName"), Some("com.acme.Widget"));
    assert_eq!(diagnostic.context_value("mode"), Some("app-isolated"));

    let shared = InteropSession::prepare(config(dir.path()), request())?;
    assert_eq!(shared.isolation(), IsolationMode::Shared);
    assert!(shared
        .resolve(&target("com.acme.Widget#fromLibrary"), None, Vec::new())
        .is_ok());
    let summary = shared.finish()?;
    let artifact = artifact_map(&summary.artifact_path);
    assert_eq!(artifact["interopClasspath.classIndex.duplicateCount"], "1");
    Ok(())
}

#[test]
fn policy_isolation_overrides_the_config_default() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (program, library) = colliding_fixture(dir.path());
    let mut overrides = broad();
    overrides.settings = PolicySettings {
        classloader_isolation: Some(IsolationMode::AppIsolated),
        ..overrides.settings
    };
    let request = InteropRequest::new(CallManifest::default())
        .program_dir(&program)
        .classpath([library])
        .overrides(overrides);

    match InteropSession::prepare(config(dir.path()), request) {
        Err(error) => assert_eq!(error.code(), codes::ISOLATION_CONFLICT),
        Ok(_) => panic!("policy selected app-isolated"),
    }
    Ok(())
}

#[test]
fn repeated_runs_produce_identical_outputs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (program, classpath) = nearest_fixture(dir.path());

    let mut outputs = Vec::new();
    for run in ["first", "second"] {
        let mut config = config(dir.path());
        config.output_dir = dir.path().join(run);
        config.parallel = run == "second";
        let request = InteropRequest::new(CallManifest::from_targets(["org.lib.A#v1"])?)
            .program_dir(&program)
            .classpath(classpath.clone())
            .overrides(broad());
        let session = InteropSession::prepare(config, request)?;
        session.resolve(&target("org.lib.A#v1"), None, Vec::new())?;
        outputs.push(session.finish()?);
    }

    let index = |path: &Path| fs::read_to_string(path).expect("class index");
    assert_eq!(
        index(&outputs[0].class_index_path),
        index(&outputs[1].class_index_path)
    );

    let stable = |path: &Path| {
        let mut artifact = artifact_map(path);
        for volatile in ["generatedAt", "runId", "interopClasspath.classIndex.path"] {
            artifact.remove(volatile);
        }
        artifact
    };
    assert_eq!(
        stable(&outputs[0].artifact_path),
        stable(&outputs[1].artifact_path)
    );
    Ok(())
}

#[test]
fn unreadable_entries_are_warnings_and_cache_is_reused() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let broken = dir.path().join("broken.jar");
    fs::write(&broken, b"not a zip")?;
    let good = JarWriter::new()
        .class(&class_with("ok.Util", "ping"))
        .write(&dir.path().join("ok.jar"))?;

    let mut cached = config(dir.path());
    cached.cache_dir = Some(dir.path().join("cache"));
    let request = || {
        InteropRequest::new(CallManifest::default())
            .classpath([path_string(&broken), path_string(&good)])
            .overrides(broad())
    };

    let session = InteropSession::prepare(cached.clone(), request())?;
    let warning = &session.warnings()[0];
    assert_eq!(warning.code, codes::ENTRY_UNREADABLE);
    assert!(!warning.is_fatal());
    assert!(session.resolve(&target("ok.Util#ping"), None, Vec::new()).is_ok());

    let cache_files = fs::read_dir(dir.path().join("cache"))?.count();
    assert_eq!(cache_files, 1);

    let again = InteropSession::prepare(cached, request())?;
    assert_eq!(again.index(), session.index());
    assert_eq!(fs::read_dir(dir.path().join("cache"))?.count(), 1);
    Ok(())
}
