use automock::config::{load_config, CliOverrides, EnvMap};
use automock::runtime::{FileSystem, ProductionFileSystem};
use automock::{
    AutomockError, CallArgs, CallError, CodecKind, CounterScope, FixtureStore, FunctionTarget,
    MethodTable, MockSession, TargetError,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

fn config_in(root: &std::path::Path, unlocked: bool) -> automock::config::AutomockConfig {
    let mut env = EnvMap::new();
    env.insert("AUTOMOCK_STORAGE".to_string(), root.display().to_string());
    if unlocked {
        env.insert("AUTOMOCK_UNLOCKED".to_string(), "1".to_string());
    }
    load_config(&CliOverrides::default(), &env, &ProductionFileSystem).expect("config")
}

fn wallet_factory(
    balance: Arc<AtomicI64>,
) -> impl Fn(&CallArgs) -> Result<MethodTable, TargetError> + Send + Sync + 'static {
    move |_: &CallArgs| {
        let balance = Arc::clone(&balance);
        Ok(MethodTable::new().sync("deposit", move |args| {
            let amount = args.get(0).and_then(Value::as_i64).unwrap_or_default();
            Ok(json!(balance.fetch_add(amount, Ordering::SeqCst) + amount))
        }))
    }
}

#[test]
fn recorded_fixture_replays_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fs: Arc<dyn FileSystem> = Arc::new(ProductionFileSystem);

    let mut session = MockSession::new(config_in(dir.path(), true), "test_wallet", Arc::clone(&fs));
    let wallet = session
        .mock("bank", "Wallet", wallet_factory(Arc::new(AtomicI64::new(0))))
        .expect("mock");
    let mut proxy = wallet.instance(CallArgs::new()).expect("instance");
    proxy.call("deposit", CallArgs::positional([5])).into_sync().expect("deposit");
    proxy.call("deposit", CallArgs::positional([7])).into_sync().expect("deposit");
    let written = session.finish().expect("finish");
    let expected = dir.path().join("test_wallet").join("bank").join("Wallet");
    assert_eq!(written, vec![expected.clone()]);
    assert!(expected.is_file());

    let balance = Arc::new(AtomicI64::new(1000));
    let mut session =
        MockSession::new(config_in(dir.path(), false), "test_wallet", Arc::clone(&fs));
    let wallet = session
        .mock("bank", "Wallet", wallet_factory(Arc::clone(&balance)))
        .expect("mock");
    let mut proxy = wallet.instance(CallArgs::new()).expect("instance");
    let first = proxy.call("deposit", CallArgs::positional([5])).into_sync().expect("first");
    let second = proxy.call("deposit", CallArgs::positional([7])).into_sync().expect("second");
    assert_eq!((first, second), (json!(5), json!(12)));
    assert_eq!(balance.load(Ordering::SeqCst), 1000);
    assert!(session.finish().expect("finish").is_empty());
}

#[test]
fn fixture_bytes_are_stable_across_recordings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fs: Arc<dyn FileSystem> = Arc::new(ProductionFileSystem);
    let mut contents = Vec::new();
    for test in ["first", "second"] {
        let mut session = MockSession::new(config_in(dir.path(), true), test, Arc::clone(&fs));
        let mut f = session
            .mock_fn(
                "m",
                "f",
                FunctionTarget::sync(|_: &CallArgs| Ok(json!({"b": 2, "a": [1, 2]}))),
            )
            .expect("mock");
        f.invoke(CallArgs::new().kwarg("z", 1).kwarg("y", 2)).into_sync().expect("call");
        let written = session.finish().expect("finish");
        contents.push(std::fs::read(&written[0]).expect("read"));
    }
    assert_eq!(contents[0], contents[1]);
}

#[test]
fn config_file_sets_codec_and_counter_scope() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("automock.toml");
    std::fs::write(
        &path,
        "[codec]\nkind = \"json\"\n[counters]\nscope = \"per_memory\"\n",
    )
    .expect("write config");
    let overrides = CliOverrides {
        config_path: Some(path),
    };
    let cfg = load_config(&overrides, &EnvMap::new(), &ProductionFileSystem).expect("config");
    assert_eq!(cfg.codec.kind, CodecKind::Json);
    assert_eq!(cfg.counters.scope, CounterScope::PerMemory);
    assert!(cfg.options().locked);
}

#[test]
fn locked_session_without_fixture_fails_and_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fs: Arc<dyn FileSystem> = Arc::new(ProductionFileSystem);
    let mut session = MockSession::new(config_in(dir.path(), false), "t", fs);
    let err = session
        .mock_fn("m", "f", FunctionTarget::sync(|_: &CallArgs| Ok(json!(1))))
        .expect_err("locked");
    assert!(matches!(err, CallError::Automock(AutomockError::Locked(_))));
    assert!(session.finish().expect("finish").is_empty());
    assert!(!dir.path().join("t").exists());
}

#[test]
fn corrupt_fixture_surfaces_as_fixture_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FixtureStore::new(dir.path(), Arc::new(ProductionFileSystem));
    let path: PathBuf = store.path_for("t", "m", "f").expect("path");
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(&path, "{\"version\": 9, \"calls\": []}").expect("write");
    assert!(matches!(store.load(&path), Err(AutomockError::Fixture(_))));
}
