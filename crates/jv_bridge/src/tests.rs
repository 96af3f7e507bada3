use super::*;
use jv_classpath::testing::{ClassFileWriter, JarWriter};
use jv_classpath::{
    ClasspathEntry, ClasspathIndexer, EntryOwner, IndexContext, JavaType, PrimitiveType,
    ACC_ABSTRACT, ACC_BRIDGE, ACC_ENUM, ACC_FINAL, ACC_INTERFACE, ACC_PRIVATE, ACC_PUBLIC,
    ACC_STATIC, ACC_SYNTHETIC, ACC_VARARGS,
};
use jv_diagnostics::{codes, IntoDiagnostic};
use jv_isolation::{ClassView, IsolationManager, IsolationMode, ProgramNamespace};
use jv_mediation::{mediate_index, ClasspathUsage};
use std::sync::{Arc, Mutex};

const PS: u16 = ACC_PUBLIC | ACC_STATIC;

struct Fixture {
    _dir: tempfile::TempDir,
    view: Arc<ClassView>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("temp dir");
    let jar = JarWriter::new()
        .class(
            &ClassFileWriter::new("demo.Numbers")
                .method(PS, "pick", "(J)Ljava/lang/String;")
                .method(PS, "pick", "(D)Ljava/lang/String;")
                .method(PS, "pick", "(B)Ljava/lang/String;"),
        )
        .class(&ClassFileWriter::new("demo.Bytes").method(PS, "take", "(B)V"))
        .class(
            &ClassFileWriter::new("demo.Amb")
                .method(PS, "f", "(Ljava/lang/Number;)V")
                .method(PS, "f", "(Ljava/lang/Comparable;)V"),
        )
        .class(
            &ClassFileWriter::new("demo.Base")
                .constructor(ACC_PUBLIC, "()V")
                .method(ACC_PUBLIC, "describe", "()Ljava/lang/String;")
                .method(ACC_PUBLIC, "size", "()I")
                .method(ACC_PRIVATE | ACC_STATIC, "secret", "()V"),
        )
        .class(
            &ClassFileWriter::new("demo.Greeter")
                .access(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT)
                .method(ACC_PUBLIC, "greet", "()Ljava/lang/String;"),
        )
        .class(
            &ClassFileWriter::new("demo.Child")
                .super_class(Some("demo.Base"))
                .interface("demo.Greeter")
                .interface("java.lang.Comparable")
                .constructor(ACC_PUBLIC, "()V")
                .method(ACC_PUBLIC, "describe", "()Ljava/lang/String;")
                .method(ACC_PUBLIC, "compareTo", "(Ldemo/Child;)I")
                .method(
                    ACC_PUBLIC | ACC_BRIDGE | ACC_SYNTHETIC,
                    "compareTo",
                    "(Ljava/lang/Object;)I",
                ),
        )
        .class(
            &ClassFileWriter::new("demo.Color")
                .access(ACC_PUBLIC | ACC_FINAL | ACC_ENUM)
                .super_class(Some("java.lang.Enum"))
                .enum_constant("RED")
                .enum_constant("GREEN"),
        )
        .class(
            &ClassFileWriter::new("demo.Paint")
                .method(PS, "paint", "(Ldemo/Color;)Ljava/lang/String;")
                .generic_method(
                    PS,
                    "sum",
                    "(Ljava/util/List;)J",
                    "(Ljava/util/List<Ljava/lang/Long;>;)J",
                )
                .method(
                    PS | ACC_VARARGS,
                    "join",
                    "(Ljava/lang/String;[Ljava/lang/String;)Ljava/lang/String;",
                ),
        )
        .class(
            &ClassFileWriter::new("demo.Config")
                .field(PS, "LEVEL", "I")
                .field(PS | ACC_FINAL, "LIMIT", "I"),
        )
        .entry("demo/Broken.class", b"not a class file".to_vec())
        .write(&dir.path().join("demo.jar"))
        .expect("jar");

    let entries = vec![ClasspathEntry::archive(0, jar, EntryOwner::Library)];
    let index = ClasspathIndexer::new(&IndexContext::default()).build(&entries);
    let mediation = mediate_index(&index, ClasspathUsage::Compile);
    let view = IsolationManager::new(IsolationMode::Shared, 21)
        .check(&ProgramNamespace::new(), &index, &mediation)
        .expect("class view");
    Fixture {
        _dir: dir,
        view: Arc::new(view),
    }
}

fn target(raw: &str) -> CallTarget {
    CallTarget::parse(raw).expect("call target")
}

fn resolve(
    fixture: &Fixture,
    raw: &str,
    receiver: Option<&str>,
    shapes: &[ArgumentShape],
) -> Result<ResolvedBinding, BridgeError> {
    BindingResolver::new(&fixture.view).resolve(&target(raw), receiver, shapes)
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<(String, Vec<JvmValue>)>>,
}

impl Invoker for Recorder {
    fn invoke(
        &self,
        binding: &ResolvedBinding,
        _receiver: Option<&JvmValue>,
        arguments: Vec<JvmValue>,
    ) -> Result<JvmValue, InvocationError> {
        self.calls
            .lock()
            .expect("recorder lock")
            .push((binding.signature(), arguments));
        Ok(JvmValue::String(binding.signature()))
    }
}

struct Failing;

impl Invoker for Failing {
    fn invoke(
        &self,
        _binding: &ResolvedBinding,
        _receiver: Option<&JvmValue>,
        _arguments: Vec<JvmValue>,
    ) -> Result<JvmValue, InvocationError> {
        Err(InvocationError::new("java.lang.IllegalStateException: boom"))
    }
}

#[test]
fn numeric_shapes_pick_long_double_overloads() {
    let fixture = fixture();

    let long = resolve(&fixture, "demo.Numbers#pick", None, &[ArgumentShape::Long]).expect("long");
    assert_eq!(long.descriptor, "(J)Ljava/lang/String;");
    assert_eq!(long.conversions[0].rule, ConversionRule::Identity);

    let double =
        resolve(&fixture, "demo.Numbers#pick", None, &[ArgumentShape::Double]).expect("double");
    assert_eq!(double.descriptor, "(D)Ljava/lang/String;");

    let int = resolve(&fixture, "demo.Numbers#pick", None, &[ArgumentShape::Int]).expect("int");
    assert_eq!(int.descriptor, "(J)Ljava/lang/String;");
    assert_eq!(int.conversions[0].rule, ConversionRule::PrimitiveWidening);
    assert_eq!(int.invoke_kind, InvokeKind::InvokeStatic);
}

#[test]
fn narrowing_only_candidates_report_numeric_conversion() {
    let fixture = fixture();
    let error = resolve(&fixture, "demo.Bytes#take", None, &[ArgumentShape::Int])
        .expect_err("narrowing");
    let diagnostic = error.to_diagnostic();
    assert_eq!(diagnostic.code, codes::NUMERIC_CONVERSION);
    assert_eq!(diagnostic.context_value("from"), Some("int"));
    assert_eq!(diagnostic.context_value("to"), Some("byte"));
    assert!(diagnostic
        .message
        .contains("numeric conversion from int to byte requires narrowing"));
}

#[test]
fn equal_cost_without_specificity_winner_is_ambiguous() {
    let fixture = fixture();
    let error =
        resolve(&fixture, "demo.Amb#f", None, &[ArgumentShape::Int]).expect_err("ambiguous");
    assert_eq!(error.code(), codes::AMBIGUOUS_OVERLOAD);
    let BridgeError::AmbiguousOverload { candidates, .. } = error else {
        panic!("unexpected error kind");
    };
    assert_eq!(candidates.len(), 2);
}

#[test]
fn instance_bindings_walk_from_the_receiver_class() {
    let fixture = fixture();

    let describe = resolve(
        &fixture,
        "demo.Base#$instance$describe",
        Some("demo.Child"),
        &[],
    )
    .expect("override");
    assert_eq!(describe.owner, "demo.Child");
    assert_eq!(describe.invoke_kind, InvokeKind::InvokeVirtual);

    let greet = resolve(&fixture, "demo.Child#$instance$greet", Some("demo.Child"), &[])
        .expect("default method");
    assert_eq!(greet.owner, "demo.Greeter");
    assert_eq!(greet.invoke_kind, InvokeKind::InvokeInterface);

    let size = resolve(&fixture, "demo.Child#$instance$size", None, &[]).expect("inherited");
    assert_eq!(size.owner, "demo.Base");

    let unrelated = resolve(
        &fixture,
        "demo.Child#$instance$describe",
        Some("demo.Color"),
        &[],
    )
    .expect_err("receiver mismatch");
    assert_eq!(unrelated.code(), codes::INVALID_TARGET);
}

#[test]
fn bridge_methods_are_dropped_for_concrete_overrides() {
    let fixture = fixture();
    let binding = resolve(
        &fixture,
        "demo.Child#$instance$compareTo",
        None,
        &[ArgumentShape::Object("demo.Child".into())],
    )
    .expect("compareTo");
    assert_eq!(binding.descriptor, "(Ldemo/Child;)I");
}

#[test]
fn defective_members_are_invalid_targets() {
    let fixture = fixture();

    let instance_as_static = resolve(&fixture, "demo.Base#size", None, &[]).expect_err("static");
    assert_eq!(instance_as_static.code(), codes::INVALID_TARGET);
    assert!(instance_as_static.to_string().contains("is not static"));

    let private = resolve(&fixture, "demo.Base#secret", None, &[]).expect_err("private");
    assert!(private.to_string().contains("is not public"));

    let abstract_new = resolve(&fixture, "demo.Greeter#$new", None, &[]).expect_err("abstract");
    assert_eq!(abstract_new.code(), codes::INVALID_TARGET);

    let constructor = resolve(&fixture, "demo.Child#$new", None, &[]).expect("constructor");
    assert_eq!(constructor.invoke_kind, InvokeKind::InvokeSpecial);
    assert_eq!(constructor.return_type, JavaType::reference("demo.Child"));
}

#[test]
fn missing_symbols_are_explained() {
    let fixture = fixture();

    let missing = resolve(&fixture, "demo.Nope#run", None, &[]).expect_err("missing class");
    assert_eq!(missing.code(), codes::SYMBOL_NOT_FOUND);
    assert_eq!(missing.to_diagnostic().context_value("class"), Some("demo.Nope"));

    let broken = resolve(&fixture, "demo.Broken#run", None, &[]).expect_err("unreadable");
    let diagnostic = broken.to_diagnostic();
    assert_eq!(diagnostic.code, codes::UNREADABLE_SYMBOL);
    assert_eq!(diagnostic.context_value("target"), Some("demo.Broken#run"));

    let member = resolve(&fixture, "demo.Numbers#nothing", None, &[]).expect_err("member");
    assert_eq!(member.to_diagnostic().context_value("member"), Some("nothing"));

    let arity = resolve(&fixture, "demo.Numbers#pick", None, &[]).expect_err("arity");
    assert_eq!(arity.code(), codes::NO_APPLICABLE_OVERLOAD);
}

#[test]
fn enum_constants_match_by_name() {
    let fixture = fixture();
    let bridge = InvocationBridge::new(Arc::clone(&fixture.view));
    let recorder = Recorder::default();
    let paint = target("demo.Paint#paint");

    let result = bridge
        .call(&recorder, &paint, None, &[InteropValue::string("RED")])
        .expect("paint");
    assert_eq!(
        result,
        InteropValue::string("demo.Paint#paint(Ldemo/Color;)Ljava/lang/String;")
    );
    let calls = recorder.calls.lock().expect("recorder lock");
    assert_eq!(
        calls[0].1,
        vec![JvmValue::Enum {
            class: "demo.Color".into(),
            constant: "RED".into(),
        }]
    );
    drop(calls);

    let error = bridge
        .call(&recorder, &paint, None, &[InteropValue::string("BLUE")])
        .expect_err("unknown constant");
    let diagnostic = error.to_diagnostic();
    assert_eq!(diagnostic.code, codes::GENERIC_CONVERSION);
    assert_eq!(diagnostic.context_value("expectedEnum"), Some("demo.Color"));
    assert_eq!(diagnostic.context_value("value"), Some("BLUE"));
}

#[test]
fn generic_lists_and_varargs_are_adapted() {
    let fixture = fixture();
    let bridge = InvocationBridge::new(Arc::clone(&fixture.view));
    let recorder = Recorder::default();

    bridge
        .call(
            &recorder,
            &target("demo.Paint#sum"),
            None,
            &[InteropValue::List(vec![
                InteropValue::Number(1.0),
                InteropValue::Number(2.0),
            ])],
        )
        .expect("sum");
    bridge
        .call(
            &recorder,
            &target("demo.Paint#join"),
            None,
            &[
                InteropValue::string(","),
                InteropValue::string("a"),
                InteropValue::string("b"),
            ],
        )
        .expect("join");

    let calls = recorder.calls.lock().expect("recorder lock");
    assert_eq!(
        calls[0].1,
        vec![JvmValue::List(vec![
            JvmValue::Boxed(Box::new(JvmValue::Long(1))),
            JvmValue::Boxed(Box::new(JvmValue::Long(2))),
        ])]
    );
    assert_eq!(
        calls[1].1,
        vec![
            JvmValue::String(",".into()),
            JvmValue::Array {
                component: JavaType::reference("java.lang.String"),
                items: vec![JvmValue::String("a".into()), JvmValue::String("b".into())],
            },
        ]
    );

    let join = bridge
        .cache()
        .resolved()
        .into_iter()
        .find(|binding| binding.name == "join")
        .expect("cached join");
    assert!(join.varargs);
    assert!(join
        .conversions
        .iter()
        .any(|conversion| conversion.rule == ConversionRule::Varargs));
}

#[test]
fn field_bindings_resolve_accessors() {
    let fixture = fixture();

    let get = resolve(&fixture, "demo.Config#$static$get$LEVEL", None, &[]).expect("get");
    assert_eq!(get.invoke_kind, InvokeKind::GetStatic);
    assert_eq!(get.return_type, JavaType::Primitive(PrimitiveType::Int));

    let set = resolve(
        &fixture,
        "demo.Config#$static$set$LEVEL",
        None,
        &[ArgumentShape::Int],
    )
    .expect("set");
    assert_eq!(set.invoke_kind, InvokeKind::PutStatic);
    assert_eq!(set.parameters, vec![JavaType::Primitive(PrimitiveType::Int)]);

    let fractional = resolve(
        &fixture,
        "demo.Config#$static$set$LEVEL",
        None,
        &[ArgumentShape::Double],
    )
    .expect_err("narrowing");
    assert_eq!(fractional.code(), codes::NUMERIC_CONVERSION);

    let final_field = resolve(
        &fixture,
        "demo.Config#$static$set$LIMIT",
        None,
        &[ArgumentShape::Int],
    )
    .expect_err("final");
    assert!(final_field.to_string().contains("is final"));
}

#[test]
fn bindings_are_memoized_per_shape() {
    let fixture = fixture();
    let bridge = InvocationBridge::new(Arc::clone(&fixture.view));
    let recorder = Recorder::default();
    let pick = target("demo.Numbers#pick");

    for value in [1.0, 2.0, 3.0] {
        bridge
            .call(&recorder, &pick, None, &[InteropValue::Number(value)])
            .expect("pick int");
    }
    assert_eq!(bridge.cache().len(), 1);

    bridge
        .call(&recorder, &pick, None, &[InteropValue::Number(0.5)])
        .expect("pick double");
    assert_eq!(bridge.cache().len(), 2);
    assert_eq!(bridge.cache().resolved().len(), 2);
}

#[test]
fn instance_calls_need_a_receiver_and_surface_host_failures() {
    let fixture = fixture();
    let bridge = InvocationBridge::new(Arc::clone(&fixture.view));
    let describe = target("demo.Base#$instance$describe");

    let missing = bridge
        .call(&Recorder::default(), &describe, None, &[])
        .expect_err("receiver");
    assert_eq!(missing.code(), codes::INVALID_TARGET);

    let receiver = InteropValue::object("demo.Child", 42);
    let failed = bridge
        .call(&Failing, &describe, Some(&receiver), &[])
        .expect_err("host failure");
    assert_eq!(failed.code(), codes::INVOCATION_FAILED);
    assert!(failed.to_string().contains("boom"));
}
