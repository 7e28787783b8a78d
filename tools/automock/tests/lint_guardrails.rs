use std::path::Path;

fn read(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => panic!("{} must be readable: {err}", path.display()),
    }
}

#[test]
fn package_and_workspace_keep_unwrap_and_expect_lints() {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let workspace_dir = match manifest_dir.parent().and_then(Path::parent) {
        Some(dir) => dir,
        None => panic!("workspace root should be two levels above package manifest dir"),
    };

    let manifest = read(&manifest_dir.join("Cargo.toml"));
    assert!(
        manifest.contains("[lints.clippy]") && manifest.contains("expect_used = \"warn\""),
        "expected package lints to configure clippy::expect_used as warn"
    );

    let workspace = read(&workspace_dir.join("Cargo.toml"));
    assert!(
        workspace.contains("[workspace.lints.clippy]")
            && workspace.contains("unwrap_used = \"deny\""),
        "expected workspace lints to deny clippy::unwrap_used"
    );
}

#[test]
fn library_sources_do_not_unwrap() {
    let src = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut pending = vec![src];
    let mut offenders = Vec::new();
    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => panic!("{} must be listable: {err}", dir.display()),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let text = read(&path);
            // Only production code; unit test modules sit at the end of each file.
            let production = text.split("#[cfg(test)]").next().unwrap_or_default();
            if production.contains(".unwrap()") {
                offenders.push(path.display().to_string());
            }
        }
    }
    assert!(offenders.is_empty(), "unwrap() in production code: {offenders:?}");
}
