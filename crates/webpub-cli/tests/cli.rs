use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use webpub_core::ExitCode;
use webpub_test_support::Sandbox;

fn webpub1c(sandbox: &Sandbox) -> Command {
    let mut cmd = Command::cargo_bin("webpub1c").expect("binary");
    cmd.current_dir(sandbox.root()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn add_get_list_remove_cycle() {
    let sandbox = Sandbox::with_apache_config("Listen 80\n");

    webpub1c(&sandbox)
        .args(["add", "Бухгалтерия 2345"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "published buhgalterija-2345 at /1c/buhgalterija-2345",
        ));

    let output = webpub1c(&sandbox)
        .args(["get", "buhgalterija-2345"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let publication: serde_json::Value =
        serde_json::from_slice(&output).expect("get prints json");
    assert_eq!(publication["url"], "/1c/buhgalterija-2345");
    assert_eq!(publication["target"]["kind"], "server");
    assert_eq!(publication["target"]["infobase"], "Бухгалтерия 2345");
    assert_eq!(publication["descriptor_present"], true);

    webpub1c(&sandbox)
        .arg("list")
        .assert()
        .success()
        .stdout("buhgalterija-2345\t/1c/buhgalterija-2345\tserver Бухгалтерия 2345\n");

    webpub1c(&sandbox)
        .args(["remove", "buhgalterija-2345"])
        .assert()
        .success();
    assert_eq!(sandbox.read_apache_config(), "Listen 80\n");
    assert!(!sandbox.descriptor_path("buhgalterija-2345").exists());
}

#[test]
fn list_json_includes_file_infobases() {
    let sandbox = Sandbox::new();
    webpub1c(&sandbox)
        .args(["add", "acc", "--file", "/srv/ib/acc", "--url", "/1c/accounting"])
        .assert()
        .success();

    let output = webpub1c(&sandbox)
        .args(["list", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let list: serde_json::Value = serde_json::from_slice(&output).expect("json list");
    assert_eq!(list[0]["name"], "acc");
    assert_eq!(list[0]["url"], "/1c/accounting");
    assert_eq!(list[0]["target"]["kind"], "file");
    assert_eq!(list[0]["target"]["path"], "/srv/ib/acc");
}

#[test]
fn dry_run_prints_diff_only() {
    let sandbox = Sandbox::with_apache_config("Listen 80\n");
    webpub1c(&sandbox)
        .args(["add", "acc", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("+Alias \"/1c/acc\""));
    assert_eq!(sandbox.read_apache_config(), "Listen 80\n");
    assert!(!sandbox.descriptor_path("acc").exists());
}

#[test]
fn set_url_updates_publication() {
    let sandbox = Sandbox::new();
    webpub1c(&sandbox).args(["add", "test"]).assert().success();

    webpub1c(&sandbox)
        .args(["set-url", "test", "another-infobase"])
        .assert()
        .success()
        .stdout("test moved to /1c/another-infobase\n");
    assert!(sandbox
        .read_apache_config()
        .contains("Alias \"/1c/another-infobase\""));

    webpub1c(&sandbox)
        .args(["set-url", "test", "another-infobase"])
        .assert()
        .success()
        .stdout("test unchanged\n");
}

#[test]
fn errors_map_to_exit_codes() {
    let sandbox = Sandbox::new();
    webpub1c(&sandbox).args(["add", "acc"]).assert().success();

    webpub1c(&sandbox)
        .args(["get", "ghost"])
        .assert()
        .code(ExitCode::NotFound as i32)
        .stderr(predicate::str::contains("webpub1c: publication 'ghost' not found"));

    webpub1c(&sandbox)
        .args(["add", "acc"])
        .assert()
        .code(ExitCode::DuplicateName as i32);

    webpub1c(&sandbox)
        .args(["add", "other", "--url", "acc"])
        .assert()
        .code(ExitCode::DuplicateUrl as i32)
        .stderr(predicate::str::contains("already used by publication 'acc'"));

    webpub1c(&sandbox)
        .args(["add", "!!!"])
        .assert()
        .code(ExitCode::InvalidName as i32);

    webpub1c(&sandbox)
        .args(["set-url", "acc", "a/b"])
        .assert()
        .code(ExitCode::InvalidUrl as i32);
}

#[test]
fn leftover_descriptor_needs_force() {
    let sandbox = Sandbox::new();
    fs::write(sandbox.descriptor_path("acc"), "<point/>").unwrap();

    webpub1c(&sandbox)
        .args(["add", "acc"])
        .assert()
        .code(ExitCode::ArtifactExists as i32)
        .stderr(predicate::str::contains("can't create publication 'acc'"));

    webpub1c(&sandbox)
        .args(["add", "acc", "--force"])
        .assert()
        .success();
}

#[test]
fn malformed_server_config_is_reported() {
    let sandbox =
        Sandbox::with_apache_config("# --- WEBPUB1C PUBLICATION END: stray\n");
    webpub1c(&sandbox)
        .arg("list")
        .assert()
        .code(ExitCode::MalformedConfig as i32)
        .stderr(predicate::str::contains("line 1"));
}

#[test]
fn invalid_configuration_exits_with_config_code() {
    let sandbox = Sandbox::new();
    sandbox.write_config("[publication]\nurl_base = \"no-slash\"\n");
    webpub1c(&sandbox)
        .arg("list")
        .assert()
        .code(ExitCode::InvalidConfig as i32)
        .stderr(predicate::str::contains("publication.url_base"));

    webpub1c(&sandbox)
        .args(["--config", "missing.toml", "list"])
        .assert()
        .code(ExitCode::InvalidConfig as i32);
}

#[test]
fn module_commands() {
    let sandbox = Sandbox::with_apache_config("Listen 80\n");

    webpub1c(&sandbox)
        .arg("has-module")
        .assert()
        .success()
        .stdout("false\n");
    webpub1c(&sandbox)
        .arg("add-module")
        .assert()
        .success()
        .stdout("module enabled\n");
    webpub1c(&sandbox)
        .arg("add-module")
        .assert()
        .success()
        .stdout("module already enabled\n");
    webpub1c(&sandbox)
        .arg("has-module")
        .assert()
        .success()
        .stdout("true\n");
}

#[test]
fn check_fails_until_environment_is_ready() {
    let sandbox = Sandbox::new();
    webpub1c(&sandbox)
        .arg("check")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("FAIL module_file"));

    sandbox.install_module();
    webpub1c(&sandbox).arg("add-module").assert().success();
    webpub1c(&sandbox)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("FAIL").not());
}

#[test]
fn verbose_logs_go_to_stderr() {
    let sandbox = Sandbox::new();
    webpub1c(&sandbox)
        .args(["-v", "add", "acc"])
        .assert()
        .success()
        .stderr(predicate::str::contains("publication added"));
}
