use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const KEY: &str = "correct horse battery staple";

fn secrets(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("secrets").unwrap();
    cmd.arg("--no-keyring")
        .arg("--path")
        .arg(dir)
        .env("SECRETS_GUARD_KDF_MEMORY_KIB", "64")
        .env("SECRETS_GUARD_KDF_ITERATIONS", "1")
        .env("SECRETS_GUARD_KDF_PARALLELISM", "1")
        .env_remove("SECRETS_GUARD_KEY")
        .env_remove("SECRETS_GUARD_PATH")
        .env_remove("RUST_LOG");
    cmd
}

fn create_passwords(dir: &Path) {
    secrets(dir)
        .args(["create", "passwords", "--fields", "Site+m,Account,Password+mh,Other"])
        .args(["--key", KEY])
        .assert()
        .success();
}

fn add(dir: &Path, data: &str) {
    secrets(dir)
        .args(["add", "passwords", "--data", data, "--key", KEY])
        .assert()
        .success();
}

fn show(dir: &Path, extra: &[&str]) -> String {
    let output = secrets(dir)
        .args(["show", "passwords", "--no-table", "--key", KEY])
        .args(extra)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8(output).unwrap()
}

#[test]
fn end_to_end_password_store() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());

    secrets(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout("passwords\n");

    add(dir.path(), "Site=Megavideo,Account=me@gmail.com,Password=MyPassword");
    let shown = show(dir.path(), &[]);
    assert!(shown.contains("ID: 1\n"));
    assert!(shown.contains("Site: Megavideo\n"));
    assert!(shown.contains("Password: MyPassword\n"));

    secrets(dir.path())
        .args(["modify", "passwords", "1", "--data", "Password=NewPass", "--key", KEY])
        .assert()
        .success();

    secrets(dir.path())
        .args(["grep", "passwords", "My", "--no-table", "--key", KEY])
        .assert()
        .success()
        .stdout("");

    secrets(dir.path())
        .args(["grep", "passwords", "newpass", "--no-table", "--no-color", "--key", KEY])
        .assert()
        .success()
        .stdout(predicate::str::contains("ID: 1\n"))
        .stdout(predicate::str::contains("Password: NewPass\n"));

    let raw = fs::read(dir.path().join("passwords.sec")).unwrap();
    let raw = String::from_utf8_lossy(&raw);
    assert!(!raw.contains("Megavideo"));
    assert!(!raw.contains("NewPass"));
}

#[test]
fn wrong_key_is_rejected() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());
    secrets(dir.path())
        .args(["show", "passwords", "--key", "not the key"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("authentication failed"));
}

#[test]
fn key_from_environment() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());
    secrets(dir.path())
        .env("SECRETS_GUARD_KEY", KEY)
        .args(["add", "passwords", "--data", "Site=env,Password=p"])
        .assert()
        .success();
    assert!(show(dir.path(), &[]).contains("Site: env\n"));
}

#[test]
fn creating_twice_fails() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());
    secrets(dir.path())
        .args(["create", "passwords", "--fields", "A", "--key", KEY])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn invalid_field_declaration_fails() {
    let dir = tempdir().unwrap();
    secrets(dir.path())
        .args(["create", "bad", "--fields", "Site,site", "--key", KEY])
        .assert()
        .failure();
    secrets(dir.path())
        .args(["create", "bad", "--fields", "Site+x", "--key", KEY])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown attribute"));
    assert!(!dir.path().join("bad.sec").exists());
}

#[test]
fn missing_mandatory_field_is_read_from_stdin() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());
    secrets(dir.path())
        .args(["add", "passwords", "--data", "Account=me,Password=pw", "--key", KEY])
        .write_stdin("Megavideo\n")
        .assert()
        .success();
    assert!(show(dir.path(), &[]).contains("Site: Megavideo\n"));

    secrets(dir.path())
        .args(["add", "passwords", "--data", "Account=me,Password=pw", "--key", KEY])
        .write_stdin("")
        .assert()
        .failure();
    assert!(!show(dir.path(), &[]).contains("ID: 2"));
}

#[test]
fn unknown_field_is_rejected() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());
    secrets(dir.path())
        .args(["add", "passwords", "--data", "Site=a,Password=b,Color=red", "--key", KEY])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Color"));
    assert!(!show(dir.path(), &[]).contains("ID:"));
}

#[test]
fn remove_is_all_or_nothing() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());
    add(dir.path(), "Site=a,Password=1");
    secrets(dir.path())
        .args(["remove", "passwords", "1,99", "--key", KEY])
        .assert()
        .failure()
        .stderr(predicate::str::contains("99"));
    assert!(show(dir.path(), &[]).contains("ID: 1\n"));
}

#[test]
fn remove_accepts_spaces_and_commas_and_never_reuses_ids() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());
    for site in ["a", "b", "c", "d"] {
        add(dir.path(), &format!("Site={site},Password=x"));
    }
    secrets(dir.path())
        .args(["remove", "passwords", "1,2", "4", "--key", KEY])
        .assert()
        .success();
    add(dir.path(), "Site=e,Password=x");
    let shown = show(dir.path(), &[]);
    assert!(shown.contains("ID: 3\n"));
    assert!(shown.contains("ID: 5\n"));
    assert!(!shown.contains("ID: 4\n"));
    assert!(!shown.contains("ID: 1\n"));
}

#[test]
fn sort_is_stable_and_reversible() {
    let dir = tempdir().unwrap();
    secrets(dir.path())
        .args(["create", "passwords", "--fields", "Site,Category", "--key", KEY])
        .assert()
        .success();
    for site in ["A", "B", "C"] {
        add(dir.path(), &format!("Site={site},Category=same"));
    }
    let order = |text: &str| -> Vec<usize> {
        ["Site: A", "Site: B", "Site: C"]
            .iter()
            .map(|needle| text.find(needle).unwrap())
            .collect()
    };
    let forward = order(&show(dir.path(), &["--sort", "category"]));
    assert!(forward[0] < forward[1] && forward[1] < forward[2]);
    let backward = order(&show(dir.path(), &["--sort", "Category", "--reverse"]));
    assert!(backward[2] < backward[1] && backward[1] < backward[0]);

    secrets(dir.path())
        .args(["show", "passwords", "--sort", "Colour", "--key", KEY])
        .assert()
        .failure();
}

#[test]
fn grep_highlights_and_restricts_fields() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());
    add(dir.path(), "Site=Megavideo,Password=MyPassword");
    add(dir.path(), "Site=My site,Password=OtherPass");

    secrets(dir.path())
        .args(["grep", "passwords", "^My", "--fields", "Password", "--key", KEY])
        .assert()
        .success()
        .stdout(predicate::str::contains("\x1b[31mMy\x1b[0mPassword"))
        .stdout(predicate::str::contains("OtherPass").not());

    secrets(dir.path())
        .args(["grep", "passwords", "^my", "--case-sensitive", "--key", KEY])
        .args(["--no-table"])
        .assert()
        .success()
        .stdout("");

    secrets(dir.path())
        .args(["grep", "passwords", "x", "--fields", "Nope", "--key", KEY])
        .assert()
        .failure();

    secrets(dir.path())
        .args(["grep", "passwords", "(", "--key", KEY])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid search pattern"));
}

#[test]
fn show_table_with_timestamps() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());
    add(dir.path(), "Site=Megavideo,Password=pw");
    secrets(dir.path())
        .args(["show", "passwords", "--when", "--key", KEY])
        .assert()
        .success()
        .stdout(predicate::str::contains("| ID | Site "))
        .stdout(predicate::str::contains("| Created "))
        .stdout(predicate::str::contains("| Modified "));
}

#[test]
fn clear_keeps_the_fields() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());
    add(dir.path(), "Site=a,Password=1");
    add(dir.path(), "Site=b,Password=2");
    secrets(dir.path())
        .args(["clear", "passwords", "--key", KEY])
        .assert()
        .success();
    assert!(!show(dir.path(), &[]).contains("ID:"));
    add(dir.path(), "Site=c,Password=3");
    assert!(show(dir.path(), &[]).contains("ID: 3\n"));
}

#[test]
fn key_rotation() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());
    add(dir.path(), "Site=a,Password=1");
    secrets(dir.path())
        .args(["key", "passwords", "new key", "--key", KEY])
        .assert()
        .success();
    secrets(dir.path())
        .args(["show", "passwords", "--key", KEY])
        .assert()
        .failure();
    secrets(dir.path())
        .args(["show", "passwords", "--no-table", "--key", "new key"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Site: a\n"));
}

#[test]
fn destroy_removes_the_store() {
    let dir = tempdir().unwrap();
    create_passwords(dir.path());
    secrets(dir.path())
        .args(["destroy", "passwords"])
        .assert()
        .success();
    secrets(dir.path()).arg("list").assert().success().stdout("");
    secrets(dir.path())
        .args(["destroy", "passwords"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no store"));
    secrets(dir.path())
        .args(["show", "passwords", "--key", KEY])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no store"));
}

#[test]
fn list_of_missing_directory_is_empty() {
    let dir = tempdir().unwrap();
    secrets(&dir.path().join("nothing-here"))
        .arg("list")
        .assert()
        .success()
        .stdout("");
}
