use super::*;
use jv_classpath::testing::{write_class_dir, ClassFileWriter, JarWriter};
use jv_classpath::{
    ClasspathEntry, ClasspathIndex, ClasspathIndexer, EntryOwner, IndexContext, ReleaseVariant,
};
use jv_diagnostics::{codes, IntoDiagnostic};
use jv_mediation::{mediate_index, ClasspathUsage, MediationOutcome};
use std::path::Path;

struct Fixture {
    _dir: tempfile::TempDir,
    index: ClasspathIndex,
    mediation: MediationOutcome,
}

fn fixture(build: impl FnOnce(&Path) -> Vec<ClasspathEntry>, usage: ClasspathUsage) -> Fixture {
    let dir = tempfile::tempdir().expect("temp dir");
    let entries = build(dir.path());
    let index = ClasspathIndexer::new(&IndexContext::default()).build(&entries);
    let mediation = mediate_index(&index, usage);
    Fixture {
        _dir: dir,
        index,
        mediation,
    }
}

fn colliding(root: &Path) -> Vec<ClasspathEntry> {
    let program = write_class_dir(
        &root.join("out"),
        &[
            ClassFileWriter::new("app.Main"),
            ClassFileWriter::new("com.acme.Widget"),
        ],
    )
    .expect("program dir");
    let library = JarWriter::new()
        .class(&ClassFileWriter::new("com.acme.Widget").method(
            jv_classpath::ACC_PUBLIC | jv_classpath::ACC_STATIC,
            "fromLibrary",
            "()V",
        ))
        .write(&root.join("widget.jar"))
        .expect("jar");
    vec![
        ClasspathEntry::directory(0, program, EntryOwner::Program),
        ClasspathEntry::archive(1, library, EntryOwner::Library),
    ]
}

#[test]
fn app_isolated_collision_is_fatal_and_names_both_origins() {
    let fixture = fixture(colliding, ClasspathUsage::Runtime);
    let program = ProgramNamespace::from_index(&fixture.index);
    let manager = IsolationManager::new(IsolationMode::AppIsolated, 21);

    let conflict = manager
        .check(&program, &fixture.index, &fixture.mediation)
        .expect_err("conflict");
    assert_eq!(conflict.qualified_name, "com.acme.Widget");
    assert_eq!(conflict.program_origin.owner, "program");
    assert!(conflict.library_origin.location.ends_with("widget.jar"));

    let diagnostic = conflict.to_diagnostic();
    assert_eq!(diagnostic.code, codes::ISOLATION_CONFLICT);
    assert_eq!(diagnostic.context_value("mode"), Some("app-isolated"));
    assert!(diagnostic
        .context_value("programOrigin")
        .is_some_and(|origin| origin.ends_with("!com/acme/Widget.class")));
    assert!(diagnostic.remedy.as_deref().is_some_and(|remedy| remedy.contains("shared")));
}

#[test]
fn shared_mode_lets_the_library_win() {
    let fixture = fixture(colliding, ClasspathUsage::Runtime);
    let program = ProgramNamespace::from_index(&fixture.index);
    let view = IsolationManager::new(IsolationMode::Shared, 21)
        .check(&program, &fixture.index, &fixture.mediation)
        .expect("shared view");

    let widget = view.lookup("com.acme.Widget").expect("widget");
    assert_eq!(widget.origin.owner, EntryOwner::Library);
    assert!(widget.class.members_named("fromLibrary").next().is_some());
    assert_eq!(view.lookup("app.Main").map(|r| r.origin.owner), Some(EntryOwner::Program));

    assert_eq!(view.duplicates().len(), 1);
    let duplicate = &view.duplicates()[0];
    assert_eq!(duplicate.rule, DuplicateRule::MediatedOrder);
    assert_eq!(duplicate.shadowed.owner, "program");
    assert_eq!(view.symbol_count(), 2);
}

#[test]
fn manifest_names_without_records_still_conflict() {
    let fixture = fixture(colliding, ClasspathUsage::Runtime);
    let program = ProgramNamespace::from_manifest(["com.acme.Widget"], "generated-program");
    let conflict = IsolationManager::new(IsolationMode::AppIsolated, 21)
        .check(&program, &fixture.index, &fixture.mediation)
        .expect_err("conflict");
    assert_eq!(conflict.program_origin.source_kind, "generated");
    assert_eq!(conflict.program_origin.location, "generated-program");
}

#[test]
fn library_duplicates_follow_classpath_order() {
    let fixture = fixture(
        |root| {
            let first = JarWriter::new()
                .class(&ClassFileWriter::new("dup.Thing").method(0x0009, "first", "()V"))
                .write(&root.join("first.jar"))
                .expect("jar");
            let second = JarWriter::new()
                .class(&ClassFileWriter::new("dup.Thing").method(0x0009, "second", "()V"))
                .write(&root.join("second.jar"))
                .expect("jar");
            vec![
                ClasspathEntry::archive(0, first, EntryOwner::Library),
                ClasspathEntry::archive(1, second, EntryOwner::Library),
            ]
        },
        ClasspathUsage::Compile,
    );
    let view = IsolationManager::new(IsolationMode::AppIsolated, 17)
        .check(&ProgramNamespace::new(), &fixture.index, &fixture.mediation)
        .expect("view");

    let thing = view.lookup("dup.Thing").expect("thing");
    assert!(thing.class.members_named("first").next().is_some());
    let duplicate = &view.duplicates()[0];
    assert_eq!(duplicate.rule, DuplicateRule::ClasspathOrder);
    assert!(duplicate.winner.location.ends_with("first.jar"));
    assert!(duplicate.shadowed.location.ends_with("second.jar"));
}

#[test]
fn index_file_reports_multi_release_winners() {
    let fixture = fixture(
        |root| {
            let jar = JarWriter::new()
                .multi_release()
                .class(&ClassFileWriter::new("mr.Base"))
                .class(&ClassFileWriter::new("mr.Api"))
                .versioned_class(11, &ClassFileWriter::new("mr.Api"))
                .write(&root.join("mr.jar"))
                .expect("jar");
            vec![ClasspathEntry::archive(0, jar, EntryOwner::Library)]
        },
        ClasspathUsage::Compile,
    );
    let view = IsolationManager::new(IsolationMode::Shared, 17)
        .check(&ProgramNamespace::new(), &fixture.index, &fixture.mediation)
        .expect("view");

    assert_eq!(
        view.lookup("mr.Api").map(|record| record.variant),
        Some(ReleaseVariant::Versioned(11))
    );
    let stats = view.release_stats();
    assert_eq!(stats.mr_jar_winner_count, 2);
    assert_eq!(stats.mr_jar_base_winner_count, 1);
    assert_eq!(stats.mr_jar_versioned_winner_count, 1);

    let out = tempfile::tempdir().expect("out dir");
    let path = view.write_index_file(out.path()).expect("index file");
    assert!(path.ends_with(INDEX_FILE_NAME));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
    assert_eq!(json["formatVersion"], "0.1");
    assert_eq!(json["isolationMode"], "shared");
    assert_eq!(json["targetRelease"], 17);
    assert_eq!(json["symbolCount"], 2);
    assert_eq!(json["symbols"][0]["qualifiedName"], "mr.Api");
    assert_eq!(json["symbols"][0]["variant"], "11");
    assert_eq!(json["release"]["mrJarVersionedWinnerCount"], 1);

    let again = view.to_index_json().expect("json");
    assert_eq!(again, std::fs::read_to_string(&path).expect("read"));
}

#[test]
fn missing_names_are_explained() {
    let fixture = fixture(
        |root| {
            let app = JarWriter::new()
                .maven("org.app", "app", "1.0")
                .pom("org.app", "app", &[("org.api", "api", None, Some("provided"))])
                .entry("org/app/Broken.class", b"garbage".to_vec())
                .write(&root.join("app.jar"))
                .expect("jar");
            let api = JarWriter::new()
                .maven("org.api", "api", "1.0")
                .class(&ClassFileWriter::new("org.api.Service"))
                .write(&root.join("api.jar"))
                .expect("jar");
            vec![
                ClasspathEntry::archive(0, app, EntryOwner::Library),
                ClasspathEntry::archive(1, api, EntryOwner::Library),
            ]
        },
        ClasspathUsage::Runtime,
    );
    let view = IsolationManager::new(IsolationMode::Shared, 21)
        .check(&ProgramNamespace::new(), &fixture.index, &fixture.mediation)
        .expect("view");

    assert!(view.lookup("org.api.Service").is_none());
    let scope = view.explain_missing("org.api.Service").expect("scope");
    assert_eq!(scope.to_diagnostic().code, codes::SCOPE_VIOLATION);

    let broken = view.explain_missing("org.app.Broken").expect("skipped");
    assert!(matches!(broken, Unavailable::Skipped(_)));
    assert_eq!(broken.to_diagnostic().code, codes::UNREADABLE_SYMBOL);

    assert!(view.explain_missing("org.none.Missing").is_none());
}
