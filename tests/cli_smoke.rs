//! Smoke tests against the compiled binary

mod util;

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;
use util::make_project;

fn itf(dir: &std::path::Path) -> Command
{
    let mut cmd = Command::cargo_bin("itf").expect("itf binary");
    cmd.current_dir(dir).env_remove("ITF_LOG");
    cmd
}

#[test]
fn fix_prints_rebuilt_header()
{
    // Given: a diff whose header points nowhere near the real lines
    let tmp = make_project(
        "```diff\n--- a/src/app.py\n+++ b/src/app.py\n@@ -90,9 +90,9 @@\n-    return 0\n+    return 1\n```\n",
    );

    // When / Then: the header is recomputed from the file content
    itf(tmp.path())
        .args(["fix", "--input", "itf.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--- a/src/app.py"))
        .stdout(predicate::str::contains("@@ -3,1 +3,1 @@"));

    // fix never writes
    tmp.child("src/app.py")
        .assert("def main():\n    print('hello')\n    return 0\n");
}

#[test]
fn block_dry_run_leaves_files_alone()
{
    let tmp = make_project("`src/app.py`\n```python\nprint('x')\n```\n");

    itf(tmp.path())
        .args(["block", "--dry-run", "--input", "itf.txt", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DRY RUN: would modify"))
        .stdout(predicate::str::contains("+print('x')"));

    tmp.child("src/app.py")
        .assert("def main():\n    print('hello')\n    return 0\n");
    tmp.child(".itf_state.json").assert(predicate::path::missing());
}

#[test]
fn apply_then_history_json()
{
    let tmp = make_project("`notes/todo.md`\n```markdown\n- ship it\n```\n");

    itf(tmp.path())
        .args(["block", "-y", "--quiet", "--input", "itf.txt"])
        .assert()
        .success();
    tmp.child("notes/todo.md").assert("- ship it\n");

    let out = itf(tmp.path())
        .args(["history", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).expect("history json");
    assert_eq!(v["currentIndex"], 0);
    assert_eq!(v["history"][0]["operations"][0]["action"], "create");
}

#[test]
fn undo_with_empty_history_exits_six()
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    itf(tmp.path())
        .args(["undo", "-y"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("nothing to revert"));
}

#[test]
fn missing_input_file_is_invalid_input()
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    itf(tmp.path())
        .args(["diff", "--input", "nope.txt"])
        .assert()
        .code(3);
}

#[test]
fn init_writes_config_once()
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    itf(tmp.path()).arg("init").assert().success();
    tmp.child("itf.toml")
        .assert(predicate::str::contains("max_snapshots = 32"));

    // Second run refuses without --force
    itf(tmp.path()).arg("init").assert().failure();
}

#[test]
fn completions_print_or_install()
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    // Without --out-dir the script goes to stdout
    itf(tmp.path())
        .args(["completions", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::contains("complete -c itf"));

    itf(tmp.path())
        .args(["--quiet", "completions", "bash", "--out-dir", "comp"])
        .assert()
        .success();
    tmp.child("comp/itf.bash").assert(predicate::path::exists());
}
