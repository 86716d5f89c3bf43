use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use jarscope::dispatch::{ModifiedOnlyDispatcher, StrictDispatcher};
use jarscope::event::{EventLog, Recorded};
use jarscope::instruction::Instruction;
use jarscope::{ClassFile, ClassfileLoader, LoaderConfig, Monitor, MonitorConfig, SessionMode};

#[path = "../src/testing.rs"]
mod testing;

use testing::{
    ACC_PUBLIC, ACC_STATIC, ClassBuilder, MULTI_RELEASE_MANIFEST, nested_annotation_class,
    simple_class, temp_path, write_jar,
};

type Log = Rc<RefCell<Vec<String>>>;

fn recording_monitor(loader: &mut ClassfileLoader, mode: SessionMode) -> (Log, Log) {
    let added: Log = Rc::default();
    let removed: Log = Rc::default();
    let (a, r) = (added.clone(), removed.clone());
    loader.add_listener(Monitor::with_config(
        move |c: &Arc<ClassFile>| a.borrow_mut().push(c.class_name().to_string()),
        move |name: &str| r.borrow_mut().push(name.to_string()),
        MonitorConfig { session_mode: mode },
    ));
    (added, removed)
}

fn decoded_classes(log: &EventLog) -> Vec<(String, String)> {
    log.events()
        .into_iter()
        .filter_map(|e| match e {
            Recorded::EndClassfile(file, Some(class)) => Some((file, class)),
            _ => None,
        })
        .collect()
}

fn multi_release_jar(path: &std::path::Path) -> anyhow::Result<()> {
    let base = ClassBuilder::new("p/A").version(52).build();
    let versions: Vec<(String, Vec<u8>)> = [(9, 53), (17, 61), (21, 65), (22, 66)]
        .into_iter()
        .map(|(release, major)| {
            (
                format!("META-INF/versions/{release}/p/A.class"),
                ClassBuilder::new("p/A").version(major).build(),
            )
        })
        .collect();

    let mut entries: Vec<(&str, &[u8])> = vec![
        ("META-INF/MANIFEST.MF", MULTI_RELEASE_MANIFEST),
        ("p/A.class", &base),
    ];
    entries.extend(versions.iter().map(|(n, b)| (n.as_str(), b.as_slice())));
    write_jar(path, &entries)
}

#[test]
fn multi_release_selection_follows_target() -> anyhow::Result<()> {
    let jar = temp_path("mr.jar");
    multi_release_jar(&jar)?;

    let cases = [
        (Some(19), "META-INF/versions/17/p/A.class", 61),
        (None, "META-INF/versions/22/p/A.class", 66),
        (Some(8), "p/A.class", 52),
    ];
    for (target, expected_entry, expected_major) in cases {
        let log = EventLog::new();
        let mut loader = ClassfileLoader::aggregating(
            LoaderConfig::strict().with_target_release(target),
        );
        loader.add_listener(log.clone());
        loader.load(&[&jar]);

        // Every entry is a file; only the winner is a class-file attempt.
        assert_eq!(log.count(|e| matches!(e, Recorded::BeginFile(_))), 6);
        assert_eq!(
            decoded_classes(&log),
            [(expected_entry.to_string(), "p.A".to_string())],
            "target {target:?}"
        );
        let class = loader.classfile("p.A").expect("p.A loaded");
        assert_eq!(class.major_version, expected_major);
    }

    let _ = std::fs::remove_file(&jar);
    Ok(())
}

#[test]
fn closed_monitor_is_idempotent_for_unchanged_sources() -> anyhow::Result<()> {
    let dir = temp_path("idempotent");
    std::fs::create_dir_all(dir.join("p"))?;
    std::fs::write(dir.join("p/A.class"), simple_class("p/A"))?;
    std::fs::write(dir.join("p/B.class"), simple_class("p/B"))?;

    let mut loader = ClassfileLoader::transient(LoaderConfig::strict());
    let (added, removed) = recording_monitor(&mut loader, SessionMode::Closed);

    loader.load(&[&dir]);
    loader.load(&[&dir]);

    assert_eq!(*added.borrow(), ["p.A", "p.B", "p.A", "p.B"]);
    assert!(removed.borrow().is_empty());

    std::fs::remove_file(dir.join("p/B.class"))?;
    loader.load(&[&dir]);
    assert_eq!(*removed.borrow(), ["p.B"]);

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn closed_monitor_reports_class_missing_from_next_source() -> anyhow::Result<()> {
    let first = temp_path("first.jar");
    let second = temp_path("second.jar");
    let (a, b) = (simple_class("p/A"), simple_class("p/B"));
    write_jar(&first, &[("p/A.class", &a), ("p/B.class", &b)])?;
    write_jar(&second, &[("p/A.class", &a)])?;

    let mut loader = ClassfileLoader::transient(LoaderConfig::strict());
    let (added, removed) = recording_monitor(&mut loader, SessionMode::Closed);

    loader.load(&[&first]);
    assert!(removed.borrow().is_empty());
    loader.load(&[&second]);

    assert_eq!(*removed.borrow(), ["p.B"]);
    assert_eq!(added.borrow().len(), 3);

    let _ = std::fs::remove_file(&first);
    let _ = std::fs::remove_file(&second);
    Ok(())
}

#[test]
fn open_monitor_reannounces_unchanged_classes() -> anyhow::Result<()> {
    let jar = temp_path("open.jar");
    write_jar(
        &jar,
        &[("p/A.class", &simple_class("p/A")), ("p/B.class", &simple_class("p/B"))],
    )?;

    let log = EventLog::new();
    let mut loader = ClassfileLoader::transient(LoaderConfig::strict())
        .with_dispatcher(ModifiedOnlyDispatcher::new(StrictDispatcher));
    loader.add_listener(log.clone());
    let (added, removed) = recording_monitor(&mut loader, SessionMode::Open);

    let first = loader.load(&[&jar]);
    let second = loader.load(&[&jar]);

    assert_eq!(first.attempted, 2);
    // Nothing changed, so nothing was decoded the second time.
    assert_eq!(second.attempted, 0);
    assert_eq!(second.files, 2);
    assert_eq!(decoded_classes(&log).len(), 2);
    assert_eq!(*added.borrow(), ["p.A", "p.B", "p.A", "p.B"]);
    assert!(removed.borrow().is_empty());

    let _ = std::fs::remove_file(&jar);
    Ok(())
}

/// `getstatic x; invokestatic run; return` against whatever pool layout the
/// builder ended up with.
fn body(field: u16, method: u16) -> Vec<u8> {
    let [fh, fl] = field.to_be_bytes();
    let [mh, ml] = method.to_be_bytes();
    vec![0xB2, fh, fl, 0xB8, mh, ml, 0xB1]
}

fn hash_of(instruction: &Instruction<'_>) -> u64 {
    let mut hasher = DefaultHasher::new();
    instruction.hash(&mut hasher);
    hasher.finish()
}

fn instructions_of(class: &ClassFile) -> Vec<Instruction<'_>> {
    class
        .method("go", "()V")
        .and_then(|m| m.code())
        .expect("go has code")
        .instructions()
        .collect::<Result<_, _>>()
        .expect("valid bytecode")
}

#[test]
fn instruction_equality_ignores_pool_layout() -> anyhow::Result<()> {
    let mut first = ClassBuilder::empty();
    let field = first.field_ref("p/C", "x", "I");
    let method = first.method_ref("p/C", "run", "()V");
    let first = first
        .named("p/C")
        .extends("java/lang/Object")
        .method(ACC_PUBLIC | ACC_STATIC, "go", "()V", &body(field, method))
        .build();

    let mut second = ClassBuilder::empty();
    second.long(42);
    second.string("padding");
    let method = second.method_ref("p/C", "run", "()V");
    let field = second.field_ref("p/C", "x", "I");
    let second = second
        .named("p/C")
        .extends("java/lang/Object")
        .method(ACC_PUBLIC | ACC_STATIC, "go", "()V", &body(field, method))
        .build();

    let mut third = ClassBuilder::empty();
    let field = third.field_ref("p/C", "y", "I");
    let method = third.method_ref("p/C", "run", "()V");
    let third = third
        .named("p/C")
        .extends("java/lang/Object")
        .method(ACC_PUBLIC | ACC_STATIC, "go", "()V", &body(field, method))
        .build();

    let (first, second, third) = (
        ClassFile::decode(&first)?,
        ClassFile::decode(&second)?,
        ClassFile::decode(&third)?,
    );
    let (a, b, c) = (
        instructions_of(&first),
        instructions_of(&second),
        instructions_of(&third),
    );

    assert_ne!(a[0].index(), b[0].index());
    assert_eq!(a, b);
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(hash_of(x), hash_of(y));
    }

    assert_ne!(a[0], c[0]);
    assert_eq!(a[1], c[1]);
    assert_eq!(a[2], c[2]);
    Ok(())
}

#[test]
fn aggregating_loader_resolves_inherited_members() -> anyhow::Result<()> {
    let base = ClassBuilder::new("p/Base")
        .field(ACC_PUBLIC, "count", "I")
        .field(0, "hidden", "I")
        .build();
    let child = ClassBuilder::new("q/Child").extends("p/Base").build();
    let jar = temp_path("hierarchy.jar");
    write_jar(&jar, &[("q/Child.class", &child), ("p/Base.class", &base)])?;

    let mut loader = ClassfileLoader::aggregating(LoaderConfig::strict());
    let summary = loader.load(&[&jar]);
    assert_eq!(summary.decoded, 2);

    let child = loader.classfile("q.Child").expect("child loaded");
    assert_eq!(
        child.superclass().map(|s| s.class_name().to_string()),
        Some("p.Base".to_string())
    );
    let found = child
        .locate_field(|f| f.name == "count")
        .expect("inherited public field");
    assert_eq!(found.owner, "p.Base");
    // Package-private and declared in another package.
    assert!(child.locate_field(|f| f.name == "hidden").is_none());

    let transient = ClassFile::decode(&ClassBuilder::new("q/Child").extends("p/Base").build())?;
    assert!(transient.superclass().is_none());
    assert!(transient.locate_field(|f| f.name == "count").is_none());

    let _ = std::fs::remove_file(&jar);
    Ok(())
}

#[test]
fn standalone_stream_skips_session_and_group() -> anyhow::Result<()> {
    let log = EventLog::new();
    let mut loader = ClassfileLoader::transient(LoaderConfig::permissive());
    loader.add_listener(log.clone());

    let class = loader
        .load_stream("renamed.bin", &simple_class("p/A")[..])?
        .expect("decoded");
    assert_eq!(class.class_name(), "p.A");
    assert_eq!(
        log.events(),
        vec![
            Recorded::BeginFile("renamed.bin".into()),
            Recorded::BeginClassfile("renamed.bin".into()),
            Recorded::EndClassfile("renamed.bin".into(), Some("p.A".into())),
            Recorded::EndFile("renamed.bin".into()),
        ]
    );
    Ok(())
}

#[test]
fn hostile_classes_do_not_stop_the_batch() -> anyhow::Result<()> {
    let deep = nested_annotation_class("p/Deep", 400_000);
    let dangling = ClassBuilder::new("p/Dangling")
        .attribute("SourceFile", &999u16.to_be_bytes())
        .build();
    let jar = temp_path("hostile.jar");
    write_jar(
        &jar,
        &[
            ("p/Deep.class", &deep),
            ("p/Dangling.class", &dangling),
            ("p/Good.class", &simple_class("p/Good")),
        ],
    )?;

    let log = EventLog::new();
    let mut loader = ClassfileLoader::aggregating(LoaderConfig::strict());
    loader.add_listener(log.clone());
    let summary = loader.load(&[&jar]);

    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.decoded, 2);
    assert_eq!(summary.failed, 1);
    assert!(loader.classfile("p.Deep").is_some_and(|c| c.is_partial()));
    assert!(loader.classfile("p.Dangling").is_none());
    assert!(loader.classfile("p.Good").is_some());

    let _ = std::fs::remove_file(&jar);
    Ok(())
}
