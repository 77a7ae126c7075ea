#![cfg(unix)]

use androsh::core::config::BridgeConfig;
use androsh::core::error::AndroshError;
use androsh::distro::bridge::{PrivilegedShell, RishBridge, sh_c, tokenize};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tempfile::{TempDir, tempdir};

/// Stand-in for `app_process`: echoes its contract back and exits with the
/// code given as the last token.
const FAKE_LOADER: &str = r#"#!/bin/sh
echo "app=$RISH_APPLICATION_ID"
echo "classpath=$1"
echo "dir=$2 nice=$3 class=$4"
shift 4
for arg in "$@"; do echo "arg=$arg"; done
echo "loader stderr" >&2
eval "last=\${$#}"
exit "$last"
"#;

fn setup() -> (TempDir, RishBridge) {
    let tmp = tempdir().expect("tempdir");
    let assets = tmp.path().join("assets");
    fs::create_dir_all(&assets).unwrap();
    fs::write(assets.join("rish_shizuku.dex"), b"dex").unwrap();

    let loader = tmp.path().join("app_process");
    fs::write(&loader, FAKE_LOADER).unwrap();
    fs::set_permissions(&loader, fs::Permissions::from_mode(0o755)).unwrap();

    let config = BridgeConfig {
        loader,
        staging_dir: tmp.path().join("stage"),
        app_id: "com.example.term".to_string(),
        ..BridgeConfig::default()
    };
    let bridge = RishBridge::new(config, &assets);
    (tmp, bridge)
}

fn lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}

#[test]
fn captured_run_reports_exit_code_and_streams() {
    let (_tmp, bridge) = setup();
    let out = bridge.run_captured("-c 'exit 3' 3").expect("run");
    assert_eq!(out.exit_code, 3);
    assert!(!out.succeeded());
    assert_eq!(out.stderr.trim(), "loader stderr");

    let stdout = lines(&out.stdout);
    assert_eq!(stdout[0], "app=com.example.term");
    assert_eq!(
        stdout[1],
        format!("classpath=-Djava.class.path={}", bridge.staged_helper_path().display())
    );
    assert_eq!(
        stdout[2],
        "dir=/system/bin nice=--nice-name=rish class=rikka.shizuku.shell.ShizukuShellLoader"
    );
    assert_eq!(&stdout[3..], ["arg=-c", "arg=exit 3", "arg=3"]);
}

#[test]
fn quoted_paths_reach_the_loader_as_one_token() {
    let (_tmp, bridge) = setup();
    let command = format!("{} 0", sh_c(&["mkdir", "-p", "/data/local/tmp/my box"]).unwrap());
    let out = bridge.run_captured(&command).expect("run");
    assert_eq!(out.exit_code, 0);
    let script = out
        .stdout
        .lines()
        .find_map(|l| l.strip_prefix("arg=mkdir"))
        .map(|rest| format!("mkdir{rest}"))
        .expect("script token");
    assert_eq!(
        tokenize(&script).unwrap(),
        vec!["mkdir", "-p", "/data/local/tmp/my box"]
    );
}

#[test]
fn unbalanced_quotes_never_reach_the_loader() {
    let (_tmp, bridge) = setup();
    let err = bridge.run_captured("-c \"rm -rf /x").unwrap_err();
    assert!(matches!(err, AndroshError::Tokenize(_)));
}

#[test]
fn helper_is_staged_once_and_read_only() {
    let (tmp, bridge) = setup();
    let staged = bridge.ensure_helper_staged().expect("stage");
    assert_eq!(staged, tmp.path().join("stage").join("rish_shizuku.dex"));
    assert_eq!(fs::read(&staged).unwrap(), b"dex");
    let mode = fs::metadata(&staged).unwrap().permissions().mode();
    assert_eq!(mode & 0o222, 0, "staged helper must not be writable");

    // A changed source is not re-copied over an existing staged helper.
    fs::write(tmp.path().join("assets").join("rish_shizuku.dex"), b"new").unwrap();
    let again = bridge.ensure_helper_staged().expect("stage again");
    assert_eq!(again, staged);
    assert_eq!(fs::read(&staged).unwrap(), b"dex");
}

#[test]
fn missing_helper_is_a_configuration_error() {
    let (tmp, bridge) = setup();
    fs::remove_file(tmp.path().join("assets").join("rish_shizuku.dex")).unwrap();
    let err = bridge.run_captured("-c true 0").unwrap_err();
    assert!(matches!(err, AndroshError::Configuration(_)));
}

#[test]
fn interactive_run_returns_exit_code() {
    let (_tmp, bridge) = setup();
    assert_eq!(bridge.run_interactive("/tmp/proot.sh 0").expect("run"), 0);
    assert_eq!(bridge.run_interactive("/tmp/proot.sh 5").expect("run"), 5);
}

#[test]
fn interactive_run_without_loader_is_a_privileged_error() {
    let (tmp, _) = setup();
    let config = BridgeConfig {
        loader: tmp.path().join("no-such-loader"),
        staging_dir: tmp.path().join("stage"),
        ..BridgeConfig::default()
    };
    let bridge = RishBridge::new(config, &tmp.path().join("assets"));
    let err = bridge.run_interactive("/tmp/proot.sh").unwrap_err();
    assert!(matches!(
        err,
        AndroshError::PrivilegedCommand { exit_code: -1, .. }
    ));
}
