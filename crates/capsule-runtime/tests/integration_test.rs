//! Integration tests for capsule-runtime unit loading.
//!
//! These tests cover:
//! - Loading source units and containers through directory handles
//! - Compiled cache validation and fallback to source
//! - Resolution chain ordering and namespace portions
//! - Failure eviction and circular imports
//! - Native library linking, self-registration and failure paths
//! - Rights narrowing and closed handles

use capsule_runtime::cache::{self, encode};
use capsule_runtime::{
    ArtifactKind, DirectoryHandle, Finder, Importer, LoaderError, NamespaceFinder, PathFinder,
    Program, Resolution, Right, Rights, RightsLimiter, Runtime, SuffixRules, Value,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

// ==============================================================================
// Test Fixture Helpers
// ==============================================================================

/// Write a file below `root`, creating parent directories.
fn write(root: &Path, relative: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, contents).unwrap();
    path
}

/// Truncated mtime of a file below `root`, as the loader sees it.
fn source_mtime(root: &Path, relative: &str) -> u32 {
    DirectoryHandle::open_path(root)
        .unwrap()
        .stat(relative)
        .unwrap()
        .mtime_low32()
}

/// Write a cache whose body differs from the source but whose header matches it.
fn write_cache_for(root: &Path, source: &str, cache: &str, body: &str) {
    let program = Program::parse(body, cache).unwrap();
    let bytes = encode(&program, source_mtime(root, source)).unwrap();
    write(root, cache, bytes);
}

fn finder_for(root: &Path) -> Arc<dyn Finder> {
    Arc::new(NamespaceFinder::open(root, SuffixRules::default(), &[]).unwrap())
}

fn runtime_for(roots: &[&Path]) -> Runtime {
    let runtime = Runtime::new();
    for root in roots {
        runtime.push_finder(finder_for(root));
    }
    runtime
}

fn attr(runtime: &Runtime, unit: &str, key: &str) -> Option<Value> {
    runtime.registry().get(unit).and_then(|u| u.get_attr(key))
}

// ==============================================================================
// Source Loading Tests
// ==============================================================================

#[test]
fn test_source_unit_loads_with_origin() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(temp_dir.path(), "greet.src", "message = \"hello\"\ncount = 3\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    let unit = runtime.import("greet").unwrap();

    assert_eq!(unit.origin(), Some(path.display().to_string()));
    assert_eq!(unit.kind(), Some(ArtifactKind::Source));
    assert_eq!(unit.get_attr("message"), Some(Value::Str("hello".into())));
    assert_eq!(unit.get_attr("count"), Some(Value::Int(3)));
}

#[test]
fn test_import_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "once.src", "x = 1\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    let first = runtime.import("once").unwrap();
    first.set_attr("touched", Value::Bool(true));

    let second = runtime.import("once").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.get_attr("touched"), Some(Value::Bool(true)));
}

#[test]
fn test_container_and_child() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.src", "level = \"top\"\n");
    let child = write(temp_dir.path(), "pkg/mod.src", "level = \"child\"\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    let unit = runtime.import("pkg.mod").unwrap();

    let parent = runtime.registry().get("pkg").unwrap();
    assert!(parent.is_namespace_container());
    assert_eq!(parent.search_locations(), vec![temp_dir.path().join("pkg")]);
    assert_eq!(parent.get_attr("mod"), Some(Value::Unit("pkg.mod".into())));

    assert_eq!(unit.origin(), Some(child.display().to_string()));
    assert_eq!(unit.get_attr("level"), Some(Value::Str("child".into())));
    assert_eq!(
        unit.get_attr("__package__"),
        Some(Value::Str("pkg".into()))
    );
}

#[test]
fn test_from_import_binds_children_and_attributes() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.src", "version = 2\n");
    write(temp_dir.path(), "pkg/helpers.src", "shout = \"HEY\"\n");
    write(
        temp_dir.path(),
        "app.src",
        "from pkg import version, helpers\nloud = helpers.shout\n",
    );

    let runtime = runtime_for(&[temp_dir.path()]);
    let app = runtime.import("app").unwrap();

    assert_eq!(app.get_attr("version"), Some(Value::Int(2)));
    assert_eq!(app.get_attr("helpers"), Some(Value::Unit("pkg.helpers".into())));
    assert_eq!(app.get_attr("loud"), Some(Value::Str("HEY".into())));
}

#[test]
fn test_child_of_plain_unit_is_missing() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "flat.src", "x = 1\n");
    write(temp_dir.path(), "flat/inner.src", "y = 2\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    let err = runtime.import("flat.inner").unwrap_err();
    assert!(matches!(err, LoaderError::MissingArtifact(_)));
    assert!(runtime.registry().contains("flat"));
}

#[test]
fn test_syntax_error_is_not_registered() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "broken.src", "this is not a statement\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    let err = runtime.import("broken").unwrap_err();
    assert!(matches!(err, LoaderError::Syntax { line: 1, .. }));
    assert!(!runtime.registry().contains("broken"));
}

#[test]
fn test_relative_root_resolves_children() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "lib/pkg/__init__.src", "x = 1\n");
    let child = write(temp_dir.path(), "lib/pkg/mod.src", "y = 2\n");

    // the same root, spelled relative to the working directory
    let cwd = std::env::current_dir().unwrap();
    let mut relative = PathBuf::new();
    for _ in cwd.components().skip(1) {
        relative.push("..");
    }
    let relative = relative.join(temp_dir.path().join("lib").strip_prefix("/").unwrap());

    let runtime = runtime_for(&[relative.as_path()]);
    let unit = runtime.import("pkg.mod").unwrap();

    assert_eq!(unit.get_attr("y"), Some(Value::Int(2)));
    assert_eq!(unit.origin(), Some(child.display().to_string()));
    let parent = runtime.registry().get("pkg").unwrap();
    assert_eq!(parent.search_locations(), vec![temp_dir.path().join("lib/pkg")]);
}

// ==============================================================================
// Compiled Cache Tests
// ==============================================================================

#[test]
fn test_fresh_cache_is_preferred() {
    let temp_dir = TempDir::new().unwrap();
    let source = write(temp_dir.path(), "m.src", "from_source = true\n");
    write_cache_for(temp_dir.path(), "m.src", "m.cache", "from_cache = true\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    let unit = runtime.import("m").unwrap();

    assert_eq!(unit.get_attr("from_cache"), Some(Value::Bool(true)));
    assert_eq!(unit.get_attr("from_source"), None);
    assert_eq!(unit.kind(), Some(ArtifactKind::CompiledCache));
    assert_eq!(unit.origin(), Some(source.display().to_string()));
}

#[test]
fn test_compile_source_output_loads() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "m.src", "value = 7\n");

    let handle = DirectoryHandle::open_path(temp_dir.path()).unwrap();
    let bytes = cache::compile_source(&handle, "m.src").unwrap();
    write(temp_dir.path(), "m.cache", bytes);

    let runtime = runtime_for(&[temp_dir.path()]);
    let unit = runtime.import("m").unwrap();
    assert_eq!(unit.kind(), Some(ArtifactKind::CompiledCache));
    assert_eq!(unit.get_attr("value"), Some(Value::Int(7)));
}

#[test]
fn test_stale_cache_falls_back_to_source() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "m.src", "from_source = true\n");
    let program = Program::parse("from_cache = true\n", "m.cache").unwrap();
    let stale = source_mtime(temp_dir.path(), "m.src").wrapping_add(1);
    write(temp_dir.path(), "m.cache", encode(&program, stale).unwrap());

    let handle = DirectoryHandle::open_path(temp_dir.path()).unwrap();
    let err = capsule_runtime::loader::read_validated(
        &handle,
        Path::new("m.cache"),
        Some(Path::new("m.src")),
    )
    .unwrap_err();
    assert!(matches!(err, LoaderError::StaleCache { .. }));

    let runtime = runtime_for(&[temp_dir.path()]);
    let unit = runtime.import("m").unwrap();
    assert_eq!(unit.get_attr("from_source"), Some(Value::Bool(true)));
    assert_eq!(unit.kind(), Some(ArtifactKind::Source));
}

#[test]
fn test_zero_magic_falls_back_to_source() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "m.src", "from_source = true\n");
    write_cache_for(temp_dir.path(), "m.src", "m.cache", "from_cache = true\n");

    let mut bytes = std::fs::read(temp_dir.path().join("m.cache")).unwrap();
    bytes[..4].copy_from_slice(&[0, 0, 0, 0]);
    write(temp_dir.path(), "m.cache", bytes);

    let runtime = runtime_for(&[temp_dir.path()]);
    let unit = runtime.import("m").unwrap();
    assert_eq!(unit.get_attr("from_source"), Some(Value::Bool(true)));
}

#[test]
fn test_truncated_cache_falls_back_to_source() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "m.src", "from_source = true\n");
    let mut bytes = cache::MAGIC.to_ne_bytes().to_vec();
    bytes.extend([1u8, 2]);
    write(temp_dir.path(), "m.cache", bytes);

    let runtime = runtime_for(&[temp_dir.path()]);
    let unit = runtime.import("m").unwrap();
    assert_eq!(unit.get_attr("from_source"), Some(Value::Bool(true)));
}

#[test]
fn test_garbage_body_falls_back_to_source() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "m.src", "from_source = true\n");
    let mut bytes = cache::CacheHeader::new(source_mtime(temp_dir.path(), "m.src"))
        .to_bytes()
        .to_vec();
    bytes.extend(b"{not json");
    write(temp_dir.path(), "m.cache", bytes);

    let runtime = runtime_for(&[temp_dir.path()]);
    let unit = runtime.import("m").unwrap();
    assert_eq!(unit.get_attr("from_source"), Some(Value::Bool(true)));
}

#[test]
fn test_cache_without_source_is_trusted() {
    let temp_dir = TempDir::new().unwrap();
    let program = Program::parse("only = \"cache\"\n", "no_src.cache").unwrap();
    let path = write(temp_dir.path(), "no_src.cache", encode(&program, 12345).unwrap());

    let runtime = runtime_for(&[temp_dir.path()]);
    let unit = runtime.import("no_src").unwrap();
    assert_eq!(unit.get_attr("only"), Some(Value::Str("cache".into())));
    assert_eq!(unit.origin(), Some(path.display().to_string()));
}

#[test]
fn test_cache_only_corruption_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "bad.cache", b"\x00\x00");

    let runtime = runtime_for(&[temp_dir.path()]);
    let err = runtime.import("bad").unwrap_err();
    assert!(matches!(err, LoaderError::CorruptCache { .. }));
    assert!(!runtime.registry().contains("bad"));
}

#[test]
fn test_unreadable_cache_is_not_recovered() {
    use std::os::unix::fs::PermissionsExt;

    // root ignores permission bits
    if unsafe { libc::geteuid() } == 0 {
        return;
    }

    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "m.src", "x = 1\n");
    let cache = write(temp_dir.path(), "m.cache", b"whatever");
    std::fs::set_permissions(&cache, std::fs::Permissions::from_mode(0o000)).unwrap();

    let runtime = runtime_for(&[temp_dir.path()]);
    let err = runtime.import("m").unwrap_err();
    assert!(matches!(err, LoaderError::InaccessibleArtifact { .. }));
}

// ==============================================================================
// Resolution Chain Tests
// ==============================================================================

#[test]
fn test_first_finder_wins() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    write(first.path(), "shared.src", "root = 1\n");
    write(second.path(), "shared.src", "root = 2\n");
    write(second.path(), "only_second.src", "root = 2\n");

    let runtime = runtime_for(&[first.path(), second.path()]);
    assert_eq!(runtime.finder_descriptions().len(), 2);

    runtime.import("shared").unwrap();
    runtime.import("only_second").unwrap();
    assert_eq!(attr(&runtime, "shared", "root"), Some(Value::Int(1)));
    assert_eq!(attr(&runtime, "only_second", "root"), Some(Value::Int(2)));
}

#[test]
fn test_replace_finders() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    write(second.path(), "late.src", "x = 1\n");

    let runtime = runtime_for(&[first.path()]);
    assert!(runtime.import("late").is_err());

    let previous = runtime.replace_finders(vec![finder_for(second.path())]);
    assert_eq!(previous.len(), 1);
    assert!(runtime.import("late").is_ok());
}

#[test]
fn test_namespace_container_without_initializer() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "ns/leaf.src", "x = 1\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    runtime.import("ns.leaf").unwrap();

    let ns = runtime.registry().get("ns").unwrap();
    assert!(ns.is_namespace_container());
    assert_eq!(ns.origin(), None);
    assert_eq!(ns.search_locations(), vec![temp_dir.path().join("ns")]);
}

#[test]
fn test_namespace_portions_within_one_root() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "top/__init__.src", "x = 1\n");
    std::fs::create_dir_all(temp_dir.path().join("top/ns")).unwrap();

    let finder = NamespaceFinder::open(temp_dir.path(), SuffixRules::default(), &[]).unwrap();
    let search_path = vec![temp_dir.path().join("top")];
    match finder.find("top.ns", Some(&search_path)).unwrap() {
        Some(Resolution::Namespace {
            search_locations, ..
        }) => assert_eq!(search_locations, vec![temp_dir.path().join("top/ns")]),
        other => panic!("expected namespace, got {:?}", other),
    }
}

#[test]
fn test_path_finder_in_chain() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "ambient.src", "x = 1\n");

    let runtime = Runtime::new();
    runtime.push_finder(Arc::new(PathFinder::new(
        vec![temp_dir.path().to_path_buf()],
        SuffixRules::default(),
    )));
    assert!(runtime.import("ambient").is_ok());
}

#[test]
fn test_builtins_shadow_artifacts() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "sys.src", "fake = true\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    let sys = runtime.import("sys").unwrap();
    assert_eq!(sys.get_attr("fake"), None);
    assert!(sys.get_attr("platform").is_some());
}

// ==============================================================================
// Failure and Re-entrancy Tests
// ==============================================================================

#[test]
fn test_failed_initialization_is_evicted() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "flaky.src", "partial = 1\nraise \"boom\"\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    let err = runtime.import("flaky").unwrap_err();
    assert!(matches!(err, LoaderError::ExecutionFailed { .. }));
    assert!(!runtime.registry().contains("flaky"));

    write(temp_dir.path(), "flaky.src", "partial = 2\n");
    let unit = runtime.import("flaky").unwrap();
    assert_eq!(unit.get_attr("partial"), Some(Value::Int(2)));
}

#[test]
fn test_failed_child_evicts_only_itself() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.src", "x = 1\n");
    write(temp_dir.path(), "pkg/bad.src", "raise \"nope\"\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    assert!(runtime.import("pkg.bad").is_err());
    assert!(runtime.registry().contains("pkg"));
    assert!(!runtime.registry().contains("pkg.bad"));
    assert_eq!(attr(&runtime, "pkg", "bad"), None);
}

#[test]
fn test_circular_imports_see_partial_units() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "a.src", "early = 1\nimport b\nlate = 2\n");
    write(temp_dir.path(), "b.src", "import a\nseen = a.early\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    let a = runtime.import("a").unwrap();

    assert_eq!(a.get_attr("late"), Some(Value::Int(2)));
    assert_eq!(attr(&runtime, "b", "seen"), Some(Value::Int(1)));
}

#[test]
fn test_evict_forces_reload() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "m.src", "v = 1\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    let first = runtime.import("m").unwrap();
    assert!(runtime.evict("m").is_some());

    write(temp_dir.path(), "m.src", "v = 2\n");
    let second = runtime.import("m").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.get_attr("v"), Some(Value::Int(2)));
}

// ==============================================================================
// Native Library Tests
// ==============================================================================

#[test]
fn test_non_library_is_dynamic_load_failure() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "fake.so", "plain text, not ELF");

    let runtime = runtime_for(&[temp_dir.path()]);
    let err = runtime.import("fake").unwrap_err();
    assert!(matches!(err, LoaderError::DynamicLoadFailure(_)));
    assert!(!runtime.registry().contains("fake"));
    assert!(!runtime.reclamation().is_suspended());
}

#[test]
fn test_native_shadows_source() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "dual.so", "not a library");
    write(temp_dir.path(), "dual.src", "x = 1\n");

    let runtime = runtime_for(&[temp_dir.path()]);
    assert!(matches!(
        runtime.import("dual"),
        Err(LoaderError::DynamicLoadFailure(_))
    ));
}

#[test]
fn test_library_without_entry_point() {
    let candidates = [
        "/lib/x86_64-linux-gnu/libm.so.6",
        "/usr/lib/x86_64-linux-gnu/libm.so.6",
        "/lib/aarch64-linux-gnu/libm.so.6",
        "/usr/lib/aarch64-linux-gnu/libm.so.6",
        "/lib64/libm.so.6",
        "/usr/lib64/libm.so.6",
        "/lib/libm.so.6",
        "/usr/lib/libm.so.6",
    ];
    let Some(libm) = candidates.iter().map(Path::new).find(|p| p.is_file()) else {
        return;
    };

    let temp_dir = TempDir::new().unwrap();
    std::fs::copy(libm, temp_dir.path().join("mathlib.so")).unwrap();

    let runtime = runtime_for(&[temp_dir.path()]);
    match runtime.import("mathlib") {
        Err(LoaderError::EntryPointNotFound { symbol, .. }) => {
            assert_eq!(symbol, "capsule_init_mathlib")
        }
        other => panic!("expected missing entry point, got {:?}", other.map(|_| ())),
    }
    assert!(!runtime.registry().contains("mathlib"));
}

/// Copy the compiled native fixture to `relative` below `root`.
///
/// `None` when the build had no C compiler to produce the fixture.
fn native_fixture(root: &Path, relative: &str) -> Option<PathBuf> {
    let fixture = option_env!("CAPSULE_NATIVE_FIXTURE")?;
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::copy(fixture, &path).unwrap();
    Some(path)
}

#[test]
fn test_native_unit_registers_under_qualified_name() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.src", "x = 1\n");
    let Some(path) = native_fixture(temp_dir.path(), "pkg/fast.so") else {
        return;
    };

    let runtime = runtime_for(&[temp_dir.path()]);
    let unit = runtime.import("pkg.fast").unwrap();

    assert_eq!(unit.name(), "pkg.fast");
    assert_eq!(unit.get_attr("answer"), Some(Value::Int(42)));
    assert_eq!(
        unit.get_attr("greeting"),
        Some(Value::Str("hello from C".into()))
    );
    assert_eq!(unit.origin(), Some(path.display().to_string()));
    assert_eq!(unit.kind(), Some(ArtifactKind::NativeLibrary));
    assert!(!runtime.registry().contains("fast"));

    let parent = runtime.registry().get("pkg").unwrap();
    assert_eq!(parent.get_attr("fast"), Some(Value::Unit("pkg.fast".into())));
    assert_eq!(runtime.linked_libraries(), 1);

    // registered units come back from the registry without relinking
    let again = runtime.import("pkg.fast").unwrap();
    assert!(Arc::ptr_eq(&unit, &again));
    assert_eq!(runtime.linked_libraries(), 1);
}

#[test]
fn test_reclamation_suspended_only_during_native_init() {
    let temp_dir = TempDir::new().unwrap();
    if native_fixture(temp_dir.path(), "fast.so").is_none() {
        return;
    }

    let runtime = runtime_for(&[temp_dir.path()]);
    let unit = runtime.import("fast").unwrap();

    assert_eq!(unit.get_attr("reclaim_depth"), Some(Value::Int(1)));
    assert_eq!(runtime.reclamation().depth(), 0);
    assert_eq!(
        runtime.reclaim(&["fast".to_string()]),
        Some(vec!["fast".to_string()])
    );
}

#[test]
fn test_native_unit_that_never_registers() {
    let temp_dir = TempDir::new().unwrap();
    if native_fixture(temp_dir.path(), "silent.so").is_none() {
        return;
    }

    let runtime = runtime_for(&[temp_dir.path()]);
    match runtime.import("silent") {
        Err(LoaderError::DynamicLoadFailure(message)) => {
            assert!(message.contains("did not register"), "{}", message)
        }
        other => panic!("expected registration failure, got {:?}", other.map(|_| ())),
    }
    assert!(!runtime.registry().contains("silent"));
    assert!(!runtime.reclamation().is_suspended());
}

#[test]
fn test_native_registration_under_other_name_is_verbatim() {
    let temp_dir = TempDir::new().unwrap();
    if native_fixture(temp_dir.path(), "stray.so").is_none() {
        return;
    }

    let runtime = runtime_for(&[temp_dir.path()]);
    assert!(matches!(
        runtime.import("stray"),
        Err(LoaderError::DynamicLoadFailure(_))
    ));

    let elsewhere = runtime.registry().get("elsewhere").unwrap();
    assert_eq!(elsewhere.get_attr("answer"), Some(Value::Int(7)));
    assert!(!runtime.registry().contains("stray"));
}

#[test]
fn test_native_units_linked_back_to_back() {
    let temp_dir = TempDir::new().unwrap();
    if native_fixture(temp_dir.path(), "silent.so").is_none() {
        return;
    }
    native_fixture(temp_dir.path(), "fast.so");

    let runtime = runtime_for(&[temp_dir.path()]);
    assert!(runtime.import("silent").is_err());
    let fast = runtime.import("fast").unwrap();

    assert_eq!(fast.get_attr("answer"), Some(Value::Int(42)));
    assert_eq!(runtime.linked_libraries(), 2);
}

// ==============================================================================
// Rights and Handle Lifecycle Tests
// ==============================================================================

#[test]
fn test_rights_without_read_deny_loading() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "m.src", "x = 1\n");

    let limiter: Arc<dyn RightsLimiter> = Arc::new(Rights::from_strings(["lookup", "fstat"]));
    let finder = NamespaceFinder::open(temp_dir.path(), SuffixRules::default(), &[limiter]).unwrap();

    let runtime = Runtime::new();
    runtime.push_finder(Arc::new(finder));
    let err = runtime.import("m").unwrap_err();
    match err {
        LoaderError::RightsDenied { right, .. } => assert_eq!(right, Right::Read.as_str()),
        other => panic!("expected rights denial, got {:?}", other),
    }
}

#[test]
fn test_loader_default_rights_allow_loading() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "pkg/__init__.src", "x = 1\n");
    write(temp_dir.path(), "pkg/m.src", "y = 2\n");

    let limiter: Arc<dyn RightsLimiter> = Arc::new(Rights::loader_default());
    let finder = NamespaceFinder::open(temp_dir.path(), SuffixRules::default(), &[limiter]).unwrap();
    assert_eq!(finder.root().rights(), Some(Rights::loader_default()));

    let runtime = Runtime::new();
    runtime.push_finder(Arc::new(finder));
    assert!(runtime.import("pkg.m").is_ok());
}

#[test]
fn test_closed_root_reports_closed_handle() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "m.src", "x = 1\n");

    let finder = Arc::new(NamespaceFinder::open(temp_dir.path(), SuffixRules::default(), &[]).unwrap());
    finder.root().close();
    finder.root().close();

    let runtime = Runtime::new();
    runtime.push_finder(finder);
    assert!(matches!(
        runtime.import("m"),
        Err(LoaderError::ClosedHandle(_))
    ));
}

#[test]
fn test_escaping_paths_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "inside/m.src", "x = 1\n");

    let handle = DirectoryHandle::open_path(temp_dir.path().join("inside")).unwrap();
    assert!(matches!(
        handle.open("../inside/m.src"),
        Err(LoaderError::BadPath(_))
    ));
    assert!(matches!(
        handle.open_subdirectory(".."),
        Err(LoaderError::BadPath(_))
    ));
    assert!(handle.open("sub/../m.src").is_ok());
}
