use std::fs;
use std::path::{Path, PathBuf};

fn rs_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|s| s.to_str()) == Some("rs") {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

fn rel(path: &Path) -> String {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let rel = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string();
    rel.replace('\\', "/")
}

fn violations_under(dir: &str, forbidden: &[&str]) -> Vec<String> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join(dir);
    let mut violations = Vec::new();

    for file in rs_files(&root) {
        let content = fs::read_to_string(&file).unwrap_or_default();
        for needle in forbidden {
            if content.contains(needle) {
                violations.push(format!(
                    "{} imports forbidden dependency `{}`",
                    rel(&file),
                    needle
                ));
            }
        }
    }
    violations
}

#[test]
fn analysis_module_is_pure() {
    let violations = violations_under(
        "src/analysis",
        &[
            "crate::store",
            "crate::scheduler",
            "crate::monitor",
            "crate::api",
            "crate::system::collector",
            "std::fs",
            "tokio",
            "axum",
        ],
    );

    assert!(
        violations.is_empty(),
        "Analysis layering violations:\n{}",
        violations.join("\n")
    );
}

#[test]
fn system_module_does_not_reach_upward() {
    let violations = violations_under(
        "src/system",
        &[
            "crate::store",
            "crate::scheduler",
            "crate::monitor",
            "crate::api",
            "axum",
        ],
    );

    assert!(
        violations.is_empty(),
        "System layering violations:\n{}",
        violations.join("\n")
    );
}

#[test]
fn http_stack_is_confined_to_api_and_binary() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut violations = Vec::new();

    for file in rs_files(&root) {
        let content = fs::read_to_string(&file).unwrap_or_default();
        if !content.contains("axum") {
            continue;
        }

        let rel_path = rel(&file);
        let allowed = rel_path == "src/api.rs" || rel_path == "src/main.rs";
        if !allowed {
            violations.push(format!(
                "{} uses axum but is outside allowed boundary",
                rel_path
            ));
        }
    }

    assert!(
        violations.is_empty(),
        "Unexpected axum usage:\n{}",
        violations.join("\n")
    );
}

#[test]
fn store_does_not_depend_on_capture_control() {
    let violations = violations_under("src/store.rs", &["crate::scheduler", "crate::api"]);
    assert!(
        violations.is_empty(),
        "Store layering violations:\n{}",
        violations.join("\n")
    );
}
