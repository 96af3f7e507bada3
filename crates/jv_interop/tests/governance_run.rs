//! Policy merge, gate ordering, audit and overload resolution through a session.

mod common;

use common::{broad, config, path_string, Recorder, PS};
use jv_classpath::testing::{ClassFileWriter, JarWriter};
use jv_classpath::parse_properties;
use jv_interop::{
    codes, CallManifest, CallTarget, InteropConfig, InteropError, InteropRequest,
    InteropSession, InteropValue, IntoDiagnostic, PolicyMode, PolicyOverrides, PolicySettings,
};
use serde_json::Value;
use std::fs;
use std::path::Path;
use test_case::test_case;

fn demo_jar(root: &Path) -> String {
    let jar = JarWriter::new()
        .class(
            &ClassFileWriter::new("demo.Numbers")
                .method(PS, "pick", "(J)Ljava/lang/String;")
                .method(PS, "pick", "(D)Ljava/lang/String;")
                .method(PS, "pick", "(B)Ljava/lang/String;"),
        )
        .class(&ClassFileWriter::new("demo.Bytes").method(PS, "take", "(B)V"))
        .class(&ClassFileWriter::new("demo.Ops").method(PS, "halt", "()V"))
        .write(&root.join("demo.jar"))
        .expect("jar");
    path_string(&jar)
}

fn target(raw: &str) -> CallTarget {
    CallTarget::parse(raw).expect("target")
}

fn prepare(
    config: InteropConfig,
    classpath: &str,
    targets: &[&str],
    overrides: PolicyOverrides,
) -> Result<InteropSession, InteropError> {
    let manifest = CallManifest::from_targets(targets).expect("manifest");
    InteropSession::prepare(
        config,
        InteropRequest::new(manifest)
            .classpath([classpath.to_string()])
            .overrides(overrides),
    )
}

fn prepare_err(
    config: InteropConfig,
    classpath: &str,
    targets: &[&str],
    overrides: PolicyOverrides,
) -> InteropError {
    match prepare(config, classpath, targets, overrides) {
        Err(error) => error,
        Ok(_) => panic!("expected the run to be rejected"),
    }
}

fn write_policy(dir: &Path, text: &str) -> std::path::PathBuf {
    let policy_dir = dir.join(".jv");
    fs::create_dir_all(&policy_dir).expect("policy dir");
    let path = policy_dir.join("interop-policy.properties");
    fs::write(&path, text).expect("policy");
    path
}

#[test_case(5.0, "(J)Ljava/lang/String;" ; "whole number widens to long")]
#[test_case(2.5, "(D)Ljava/lang/String;" ; "fraction picks double")]
fn numeric_arguments_pick_the_widening_overload(number: f64, descriptor: &str) {
    let dir = tempfile::tempdir().expect("temp dir");
    let jar = demo_jar(dir.path());
    let session =
        prepare(config(dir.path()), &jar, &["demo.Numbers#pick"], broad()).expect("session");

    let result = session
        .invoke(
            &Recorder,
            &target("demo.Numbers#pick"),
            None,
            &[InteropValue::Number(number)],
        )
        .expect("invoke");
    match result {
        InteropValue::String(signature) => assert!(signature.ends_with(descriptor), "{signature}"),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn long_and_narrowing_arguments_through_the_session() {
    let dir = tempfile::tempdir().expect("temp dir");
    let jar = demo_jar(dir.path());
    let session = prepare(
        config(dir.path()),
        &jar,
        &["demo.Numbers#pick", "demo.Bytes#take"],
        broad(),
    )
    .expect("session");

    let long = session
        .invoke(&Recorder, &target("demo.Numbers#pick"), None, &[InteropValue::Long(1 << 40)])
        .expect("long");
    assert_eq!(long, InteropValue::string("demo.Numbers#pick(J)Ljava/lang/String;"));

    let narrowing = session
        .invoke(&Recorder, &target("demo.Bytes#take"), None, &[InteropValue::Number(1.0)])
        .expect_err("int to byte narrows");
    let diagnostic = narrowing.to_diagnostic();
    assert_eq!(diagnostic.code, codes::NUMERIC_CONVERSION);
    assert_eq!(diagnostic.context_value("to"), Some("byte"));
}

#[test]
fn conflicting_policy_files_need_an_explicit_value() {
    let dir = tempfile::tempdir().expect("temp dir");
    let jar = demo_jar(dir.path());
    let project = dir.path().join("project");
    write_policy(&project, "interop.policy=broad\ninterop.ackRisk=true\n");
    let global = write_policy(&dir.path().join("home"), "interop.policy=strict\n");

    let mut settings = config(dir.path());
    settings.project_root = Some(project.join("src"));
    settings.global_policy = Some(global);

    let error = prepare_err(
        settings.clone(),
        &jar,
        &["demo.Numbers#pick"],
        PolicyOverrides::default(),
    );
    let diagnostic = error.to_diagnostic();
    assert_eq!(diagnostic.code, codes::POLICY_CONFLICT);
    assert_eq!(diagnostic.context_value("setting"), Some("interop.policy"));
    assert_eq!(diagnostic.context_value("projectValue"), Some("broad"));
    assert_eq!(diagnostic.context_value("globalValue"), Some("strict"));
    assert_eq!(diagnostic.context_value("flag"), Some("--interop-policy"));

    let overrides = PolicyOverrides {
        settings: PolicySettings {
            mode: Some(PolicyMode::Broad),
            ..PolicySettings::default()
        },
        approval: None,
    };
    let session = prepare(settings, &jar, &["demo.Numbers#pick"], overrides).expect("resolved");
    assert_eq!(session.policy().mode, PolicyMode::Broad);
    assert!(session.policy().ack_risk);
}

#[test]
fn invalid_policy_values_are_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let jar = demo_jar(dir.path());
    let path = write_policy(dir.path(), "interop.ackRisk=maybe\n");
    let mut settings = config(dir.path());
    settings.project_policy = Some(path);

    let diagnostic = prepare_err(settings, &jar, &[], broad()).to_diagnostic();
    assert_eq!(diagnostic.code, codes::INVALID_POLICY);
    assert_eq!(diagnostic.context_value("value"), Some("maybe"));
}

const GOVERNED: &str = "interop.policy=broad
interop.ackRisk=true
interop.rbac.requiredRoles=dev
interop.rbac.sensitiveTargets=demo.Ops
interop.rbac.sensitiveRequiredRoles=admin
interop.approval.required=true
interop.approval.token=ticket-42
";

fn with_roles(roles: &[&str], approval: Option<&str>) -> PolicyOverrides {
    PolicyOverrides {
        settings: PolicySettings {
            actor_roles: Some(roles.iter().map(|role| role.to_string()).collect()),
            ..PolicySettings::default()
        },
        approval: approval.map(str::to_string),
    }
}

#[test]
fn rbac_is_enforced_before_approval() {
    let dir = tempfile::tempdir().expect("temp dir");
    let jar = demo_jar(dir.path());
    let mut settings = config(dir.path());
    settings.project_policy = Some(write_policy(dir.path(), GOVERNED));

    let missing_role = prepare_err(
        settings.clone(),
        &jar,
        &["demo.Ops#halt"],
        with_roles(&["dev"], None),
    );
    let diagnostic = missing_role.to_diagnostic();
    assert_eq!(diagnostic.code, codes::RBAC_DENIED);
    assert_eq!(diagnostic.context_value("scope"), Some("sensitive"));

    let missing_approval = prepare_err(
        settings.clone(),
        &jar,
        &["demo.Ops#halt"],
        with_roles(&["dev", "admin"], None),
    );
    assert_eq!(missing_approval.code(), codes::APPROVAL_REQUIRED);

    let session = prepare(
        settings,
        &jar,
        &["demo.Ops#halt"],
        with_roles(&["dev", "admin"], Some("ticket-42")),
    )
    .expect("approved");
    let decisions = session.decisions();
    assert_eq!(decisions.len(), 1);
    assert!(decisions[0].is_allowed());
}

#[test]
fn strict_policy_allows_only_declared_targets() {
    let dir = tempfile::tempdir().expect("temp dir");
    let jar = demo_jar(dir.path());
    let overrides = PolicyOverrides {
        settings: PolicySettings {
            allowlist: Some(vec!["demo.Numbers".into()]),
            denylist: Some(vec!["demo.Numbers#pick".into()]),
            ..PolicySettings::default()
        },
        approval: None,
    };

    let denied = prepare_err(config(dir.path()), &jar, &["demo.Numbers#pick"], overrides.clone());
    assert_eq!(denied.code(), codes::DENYLISTED);

    let mut allowed = overrides;
    allowed.settings.denylist = None;
    let session = prepare(config(dir.path()), &jar, &["demo.Numbers#pick"], allowed).expect("session");
    assert_eq!(session.policy().mode, PolicyMode::Strict);

    let undeclared = session
        .invoke(&Recorder, &target("demo.Bytes#take"), None, &[InteropValue::Number(1.0)])
        .expect_err("undeclared");
    assert_eq!(undeclared.code(), codes::STRICT_UNDECLARED);
    // Denials are not cached; the second attempt is audited again.
    let _ = session.resolve(&target("demo.Bytes#take"), None, Vec::new());
    let decisions = session.decisions();
    assert_eq!(decisions.len(), 3);
    assert!(!decisions[2].is_allowed());
}

#[test]
fn audit_falls_back_to_the_local_log() {
    let dir = tempfile::tempdir().expect("temp dir");
    let jar = demo_jar(dir.path());
    let blocked = dir.path().join("fleet");
    fs::create_dir_all(&blocked).expect("blocked aggregate");

    let mut settings = config(dir.path());
    settings.audit.log = Some(dir.path().join("audit/run.jsonl"));
    settings.audit.aggregate = Some(blocked);
    settings.audit.run_id = Some("run-e2e".into());

    let session = prepare(settings, &jar, &["demo.Numbers#pick"], broad()).expect("session");
    session
        .invoke(&Recorder, &target("demo.Numbers#pick"), None, &[InteropValue::Long(3)])
        .expect("invoke");
    let summary = session.finish().expect("finish");

    let lines: Vec<Value> = fs::read_to_string(dir.path().join("audit/run.jsonl"))
        .expect("audit log")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["decision"], "allow");
    assert_eq!(lines[0]["run"], "run-e2e");
    assert_eq!(lines[0]["target"], "demo.Numbers#pick");
    assert_eq!(lines[1]["decision"], "warn");
    assert_eq!(lines[1]["code"], codes::AUDIT_AGGREGATE_FALLBACK);

    assert_eq!(summary.run_id, "run-e2e");
    assert!(summary
        .warnings
        .iter()
        .any(|warning| warning.code == codes::AUDIT_AGGREGATE_FALLBACK && !warning.is_fatal()));
    let artifact: Vec<(String, String)> =
        parse_properties(&fs::read_to_string(&summary.artifact_path).expect("artifact"));
    assert!(artifact.contains(&("interopAudit.fallbackCount".to_string(), "1".to_string())));
}

#[test]
fn aggregate_without_local_log_is_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let jar = demo_jar(dir.path());
    let mut settings = config(dir.path());
    settings.audit.aggregate = Some(dir.path().join("fleet.jsonl"));

    let error = prepare_err(settings, &jar, &[], broad());
    assert_eq!(error.code(), codes::INVALID_CONFIG);
}

#[test]
fn bridge_sources_are_written_for_manifest_targets() {
    let dir = tempfile::tempdir().expect("temp dir");
    let jar = demo_jar(dir.path());
    let mut settings = config(dir.path());
    settings.bridge_package = Some("app.bridges".into());

    let session = prepare(
        settings,
        &jar,
        &["demo.Numbers#pick", "demo.Bytes#take"],
        broad(),
    )
    .expect("session");
    let summary = session.finish().expect("finish");

    assert_eq!(summary.bridge_sources.len(), 2);
    let names = common::file_names(summary.bridge_sources.iter().map(|path| path.as_path()));
    assert_eq!(names, ["DemoBytesBridge.java", "DemoNumbersBridge.java"]);
    let numbers = fs::read_to_string(&summary.bridge_sources[1]).expect("bridge source");
    assert!(numbers.contains("package app.bridges;"));
    assert!(numbers.contains("public static Object pick(final Object... args)"));
    assert_eq!(summary.artifact.get("interopBridges.sourceCount"), Some("2"));
}

#[test]
fn failed_publish_leaves_no_partial_outputs() {
    let dir = tempfile::tempdir().expect("temp dir");
    let jar = demo_jar(dir.path());
    let out = dir.path().join("out");
    // A non-empty directory where the artifact belongs cannot be replaced by a file.
    fs::create_dir_all(out.join(jv_interop::ARTIFACT_FILE_NAME).join("keep")).expect("blocker");
    let mut settings = config(dir.path());
    settings.bridge_package = Some("app.bridges".into());

    let session = prepare(settings, &jar, &["demo.Numbers#pick"], broad()).expect("session");
    let error = match session.finish() {
        Err(error) => error,
        Ok(summary) => panic!("expected finish to fail, wrote {:?}", summary.artifact_path),
    };
    let diagnostic = error.to_diagnostic();
    assert_eq!(diagnostic.code, codes::OUTPUT_UNWRITABLE);
    assert_eq!(
        diagnostic.context_value("output"),
        Some(out.join(jv_interop::ARTIFACT_FILE_NAME).display().to_string().as_str())
    );

    let mut left: Vec<String> = fs::read_dir(&out)
        .expect("out dir")
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    left.sort();
    assert_eq!(left, [jv_interop::ARTIFACT_FILE_NAME]);
    assert!(!out.join("bridge-src/app/bridges/DemoNumbersBridge.java").exists());
}
