#![allow(dead_code)]

use androsh::core::config::Config;
use androsh::core::error::AndroshError;
use androsh::core::registry::Registry;
use androsh::distro::bridge::{self, CommandOutput, PrivilegedShell};
use androsh::distro::download::Downloader;
use sha2::{Digest, Sha512};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const ARCHIVE_BYTES: &[u8] = b"pretend this is alpine-minirootfs";
pub const TEMPLATE: &str = "#!/system/bin/sh\nexec {{ root }}/proot -r {{ root }}/{{ distro }} # {{ name }}\n";

pub fn sha512_hex(bytes: &[u8]) -> String {
    hex::encode(Sha512::digest(bytes))
}

pub fn manifest_for(sha512: &str) -> String {
    format!(
        r#"
- flavor: alpine-netboot
  version: 3.20.3
  sha512: "00"
- flavor: alpine-minirootfs
  version: 3.20.3
  file: alpine-minirootfs-3.20.3-aarch64.tar.gz
  sha512: "{sha512}"
"#
    )
}

/// Records every privileged command; fails the first one whose script
/// contains `fail_on`.
#[derive(Default)]
pub struct FakeShell {
    pub captured: RefCell<Vec<String>>,
    pub interactive: RefCell<Vec<String>>,
    pub fail_on: Option<String>,
    pub interactive_code: Cell<i32>,
}

impl FakeShell {
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
            ..Self::default()
        }
    }

    /// Decoded argv of every captured `-c '<script>'` command.
    pub fn argvs(&self) -> Vec<Vec<String>> {
        self.captured
            .borrow()
            .iter()
            .map(|cmd| {
                let tokens = bridge::tokenize(cmd).expect("outer tokens");
                assert_eq!(tokens[0], "-c", "privileged commands go through sh -c");
                bridge::tokenize(&tokens[1]).expect("inner tokens")
            })
            .collect()
    }

    pub fn ran(&self, argv: &[&str]) -> bool {
        self.argvs().iter().any(|a| a == argv)
    }

    pub fn ran_program(&self, program: &str) -> bool {
        self.argvs().iter().any(|a| a.first().map(String::as_str) == Some(program))
    }

    pub fn total_calls(&self) -> usize {
        self.captured.borrow().len() + self.interactive.borrow().len()
    }
}

impl PrivilegedShell for FakeShell {
    fn run_captured(&self, command: &str) -> Result<CommandOutput, AndroshError> {
        self.captured.borrow_mut().push(command.to_string());
        if let Some(needle) = &self.fail_on
            && command.contains(needle.as_str())
        {
            return Ok(CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "Permission denied".to_string(),
            });
        }
        Ok(CommandOutput::default())
    }

    fn run_interactive(&self, command: &str) -> Result<i32, AndroshError> {
        self.interactive.borrow_mut().push(command.to_string());
        Ok(self.interactive_code.get())
    }
}

/// Serves a fixed manifest and writes archive payloads in order; the last
/// payload repeats once the queue runs dry.
pub struct FakeDownloader {
    pub manifest: String,
    pub payloads: RefCell<Vec<Vec<u8>>>,
    pub fetched: RefCell<Vec<String>>,
    pub downloaded: RefCell<Vec<String>>,
}

impl FakeDownloader {
    pub fn new(manifest: String, payloads: Vec<&[u8]>) -> Self {
        Self {
            manifest,
            payloads: RefCell::new(payloads.into_iter().map(<[u8]>::to_vec).collect()),
            fetched: RefCell::new(Vec::new()),
            downloaded: RefCell::new(Vec::new()),
        }
    }

    pub fn serving_valid_archive() -> Self {
        Self::new(manifest_for(&sha512_hex(ARCHIVE_BYTES)), vec![ARCHIVE_BYTES])
    }

    pub fn archive_downloads(&self) -> usize {
        self.downloaded
            .borrow()
            .iter()
            .filter(|u| u.ends_with(".tar.gz"))
            .count()
    }

    pub fn network_calls(&self) -> usize {
        self.fetched.borrow().len() + self.downloaded.borrow().len()
    }
}

impl Downloader for FakeDownloader {
    fn fetch_text(&self, url: &str) -> Result<String, AndroshError> {
        self.fetched.borrow_mut().push(url.to_string());
        Ok(self.manifest.clone())
    }

    fn download(&self, url: &str, dest: &Path) -> Result<(), AndroshError> {
        self.downloaded.borrow_mut().push(url.to_string());
        let body = if url.ends_with(".tar.gz") {
            let mut queue = self.payloads.borrow_mut();
            if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue.first().cloned().unwrap_or_default()
            }
        } else {
            b"helper".to_vec()
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, body)?;
        Ok(())
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub config: Config,
    pub registry: Registry,
}

impl Harness {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path();
        let assets = root.join("assets");
        fs::create_dir_all(&assets).expect("assets dir");
        fs::write(assets.join("proot.sh"), TEMPLATE).expect("template");

        let config = Config {
            home: root.join("home"),
            base_dir: root.join("base"),
            downloads_dir: root.join("downloads"),
            assets_dir: Some(assets),
            db_path: Some(root.join("home").join("androsh.db")),
            machine: Some("aarch64".to_string()),
            ..Config::default()
        };
        let registry = Registry::open(&config.db_path()).expect("registry");
        Self {
            tmp,
            config,
            registry,
        }
    }

    pub fn key(&self, name: &str) -> String {
        self.config
            .instance_path(name)
            .to_string_lossy()
            .into_owned()
    }

    pub fn path_str(&self, path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    pub fn seed_archive(&self) -> PathBuf {
        let archive = self.config.archive_path();
        fs::create_dir_all(archive.parent().unwrap()).unwrap();
        fs::write(&archive, ARCHIVE_BYTES).unwrap();
        archive
    }

    pub fn seed_helpers(&self) {
        for helper in self.config.helper_paths() {
            fs::create_dir_all(helper.parent().unwrap()).unwrap();
            fs::write(helper, b"helper").unwrap();
        }
    }
}
