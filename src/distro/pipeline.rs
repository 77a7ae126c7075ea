//! Provisioning pipeline: turns an instance name into a ready distro.
//!
//! ```text
//! Absent -> Downloading -> Verifying -> Staging -> Extracting -> Configured -> Ready
//!                 any non-terminal stage --(error)--> Failed
//! ```
//!
//! Every stage re-checks what already exists, so re-running `setup` after an
//! interruption skips finished work. The registry record is written last, in
//! one transaction; a failure anywhere before that leaves no record behind.

use crate::core::config::Config;
use crate::core::error::AndroshError;
use crate::core::output;
use crate::core::registry::Registry;
use crate::core::time;
use crate::distro::arch::Arch;
use crate::distro::bridge::{self, CommandOutput, PrivilegedShell};
use crate::distro::download::{self, Downloader};
use crate::distro::manifest;
use crate::distro::template;
use serde_json::{Map, Value};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

/// Marker directory left by a previous patch run inside the instance root.
pub const PATCHED_MARKER: &str = ".patched";
/// Scratch directory inside the root filesystem wiped by `clean`.
pub const TMP_SUBDIR: &str = "tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Absent,
    Downloading,
    Verifying,
    Staging,
    Extracting,
    Configured,
    Ready,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Absent => "absent",
            Stage::Downloading => "downloading",
            Stage::Verifying => "verifying",
            Stage::Staging => "staging",
            Stage::Extracting => "extracting",
            Stage::Configured => "configured",
            Stage::Ready => "ready",
            Stage::Failed => "failed",
        }
    }
}

/// Result of an operation the user may decline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Aborted,
}

/// Instance names become a single path component under the base directory
/// and a value in the launch script: letters, digits, `.`, `_`, `-` and
/// spaces only.
pub fn validate_name(name: &str) -> Result<(), AndroshError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ');
    if name.trim().is_empty() || name == "." || name == ".." || !name.chars().all(allowed) {
        return Err(AndroshError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn path_str(path: &Path) -> Result<&str, AndroshError> {
    path.to_str().ok_or_else(|| {
        AndroshError::Configuration(format!("path is not valid UTF-8: {}", path.display()))
    })
}

pub struct Pipeline<'a> {
    config: &'a Config,
    registry: &'a Registry,
    shell: &'a dyn PrivilegedShell,
    downloader: &'a dyn Downloader,
    stage: Cell<Stage>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        registry: &'a Registry,
        shell: &'a dyn PrivilegedShell,
        downloader: &'a dyn Downloader,
    ) -> Self {
        Self {
            config,
            registry,
            shell,
            downloader,
            stage: Cell::new(Stage::Absent),
        }
    }

    /// Stage reached by the last `setup` call.
    pub fn stage(&self) -> Stage {
        self.stage.get()
    }

    fn transition(&self, next: Stage) {
        let prev = self.stage.replace(next);
        if prev != next {
            tracing::info!(from = prev.as_str(), to = next.as_str(), "stage");
        }
    }

    /// Registry key of the instance called `name`.
    pub fn instance_key(&self, name: &str) -> Result<String, AndroshError> {
        validate_name(name)?;
        Ok(path_str(&self.config.instance_path(name))?.to_string())
    }

    /// Run one privileged command built from `argv`; anything but a clean exit
    /// aborts the caller.
    fn privileged(&self, argv: &[&str]) -> Result<CommandOutput, AndroshError> {
        let command = bridge::sh_c(argv)?;
        self.shell.run_captured(&command)?.into_result(&command)
    }

    fn recorded_distro(&self, key: &str) -> String {
        self.registry
            .get_sub(key, "distro")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| self.config.distro_dir.clone())
    }

    /// Provision `name` and record it. Rejects an existing instance unless
    /// `resetup` is set.
    pub fn setup(&self, name: &str, resetup: bool) -> Result<PathBuf, AndroshError> {
        let key = self.instance_key(name)?;
        if self.registry.exists(&key, None) && !resetup {
            return Err(AndroshError::AlreadyExists(name.to_string()));
        }

        self.stage.set(Stage::Absent);
        self.registry.set_global_flag(false);

        let instance = self.config.instance_path(name);
        match self.provision(name, &instance, resetup) {
            Ok(()) => {
                self.registry.set_global_flag(true);
                Ok(instance)
            }
            Err(err) => {
                tracing::error!(stage = self.stage().as_str(), error = %err, "provisioning failed");
                self.transition(Stage::Failed);
                Err(err)
            }
        }
    }

    fn provision(&self, name: &str, instance: &Path, resetup: bool) -> Result<(), AndroshError> {
        output::info("The setup process has been started...");
        self.transition(Stage::Downloading);
        let arch = Arch::detect(self.config.machine.as_deref())?;
        tracing::debug!(arch = arch.as_str(), "resolved architecture");
        let launch_template = template::load(&self.config.template_path())?;
        self.check_storage()?;

        self.download_helpers(arch)?;
        let archive = self.config.archive_path();
        if archive.is_file() {
            output::info(&format!(
                "Using existing archive {}, skipping download",
                archive.display()
            ));
        } else {
            self.download_verified(arch, &archive)?;
        }

        self.transition(Stage::Staging);
        self.stage_instance(instance, &archive, resetup)?;

        self.transition(Stage::Configured);
        self.render_script(&launch_template, name, instance, &self.config.distro_dir)?;

        self.record(name, instance)?;
        self.transition(Stage::Ready);
        output::success(&format!("'{}' is ready at {}", name, instance.display()));
        Ok(())
    }

    /// Download directory must exist (created if needed), be a directory and
    /// be writable.
    fn check_storage(&self) -> Result<(), AndroshError> {
        let dir = &self.config.downloads_dir;
        let storage_err = |what: &str| {
            AndroshError::Configuration(format!("{}: {}", what, dir.display()))
        };

        fs::create_dir_all(dir).map_err(|_| storage_err("Storage path cannot be created"))?;
        if !dir.is_dir() {
            return Err(storage_err("Storage path is not a directory"));
        }
        let marker = dir.join(".androsh-write-check");
        fs::write(&marker, b"").map_err(|_| storage_err("Insufficient permissions for storage path"))?;
        if let Err(e) = fs::remove_file(&marker) {
            tracing::debug!(path = %marker.display(), error = %e, "could not remove write-check file");
        }
        tracing::debug!(path = %dir.display(), "storage path verified");
        Ok(())
    }

    fn download_helpers(&self, arch: Arch) -> Result<(), AndroshError> {
        let names = [&self.config.loader_name, &self.config.lib_name];
        let base = self.config.helpers_url.trim_end_matches('/');

        let (urls, dests): (Vec<String>, Vec<PathBuf>) = names
            .iter()
            .zip(self.config.helper_paths())
            .filter(|(_, dest)| !dest.is_file())
            .map(|(name, dest)| (format!("{}/{}/{}", base, arch.helper_dir(), name), dest))
            .unzip();

        if urls.is_empty() {
            tracing::debug!("helper binaries already present");
            return Ok(());
        }
        output::info(&format!("Downloading {} helper binaries", urls.len()));
        self.downloader.download_many(&urls, &dests)
    }

    /// Fetch the manifest, then download and verify the archive, retrying a
    /// corrupt download up to `max_download_attempts` times.
    fn download_verified(&self, arch: Arch, archive: &Path) -> Result<(), AndroshError> {
        let manifest_text = self
            .downloader
            .fetch_text(&manifest::manifest_url(&self.config.mirror, arch))?;
        let entries = manifest::parse_manifest(&manifest_text)?;
        let release = manifest::select_release(&entries, &self.config.manifest_flavor)?;
        output::info(&format!("Alpine version: {}", release.version));

        let url = manifest::archive_url(&self.config.mirror, arch, &release.version);
        let attempts = self.config.max_download_attempts;
        for attempt in 1..=attempts {
            self.transition(Stage::Downloading);
            self.downloader.download(&url, archive)?;

            self.transition(Stage::Verifying);
            if download::checksum_matches(archive, &release.sha512)? {
                tracing::info!(attempt, "archive checksum verified");
                return Ok(());
            }

            tracing::warn!(attempt, attempts, url = %url, "archive checksum mismatch");
            output::warn(&format!(
                "The file is corrupt (attempt {}/{}), downloading again",
                attempt, attempts
            ));
            let _ = fs::remove_file(archive);
        }

        Err(AndroshError::Verification {
            path: archive.to_path_buf(),
            attempts,
        })
    }

    fn stage_instance(&self, instance: &Path, archive: &Path, resetup: bool) -> Result<(), AndroshError> {
        output::info("Sandbox setup process has been started.");
        let root = path_str(instance)?;
        let distro_dir = self.config.distro_path(instance, &self.config.distro_dir);
        let distro = path_str(&distro_dir)?;
        let marker = instance.join(PATCHED_MARKER);

        self.privileged(&["command", "-v", "tar"]).map_err(|err| match err {
            AndroshError::PrivilegedCommand { command, exit_code, .. } => {
                AndroshError::PrivilegedCommand {
                    command,
                    exit_code,
                    stderr: "tar isn't available on this device".to_string(),
                }
            }
            other => other,
        })?;

        self.privileged(&["mkdir", "-p", root])?;
        for helper in self.config.helper_paths() {
            self.privileged(&["cp", path_str(&helper)?, root])?;
        }
        let loader = instance.join(&self.config.loader_name);
        self.privileged(&["chmod", "755", path_str(&loader)?])?;
        self.privileged(&["rm", "-rf", path_str(&marker)?])?;
        if resetup {
            self.privileged(&["rm", "-rf", distro])?;
        }
        self.privileged(&["mkdir", "-p", distro])?;

        self.transition(Stage::Extracting);
        self.privileged(&["tar", "-xf", path_str(archive)?, "-C", distro])?;
        Ok(())
    }

    fn render_script(
        &self,
        launch_template: &str,
        name: &str,
        instance: &Path,
        distro: &str,
    ) -> Result<PathBuf, AndroshError> {
        let dest = self.config.script_path(name);
        template::render_script(
            launch_template,
            &dest,
            &[("root", path_str(instance)?), ("distro", distro), ("name", name)],
        )?;
        Ok(dest)
    }

    fn record(&self, name: &str, instance: &Path) -> Result<(), AndroshError> {
        let key = path_str(instance)?.to_string();
        let mut meta = Map::new();
        meta.insert("name".into(), Value::from(name));
        meta.insert("distro".into(), Value::from(self.config.distro_dir.as_str()));
        meta.insert(
            "base_dir".into(),
            Value::from(path_str(&self.config.base_dir)?),
        );
        meta.insert("date".into(), Value::from(time::today()));

        let mut batch = Map::new();
        batch.insert(key.clone(), Value::Object(meta));
        if !self.registry.update_bulk(&batch) {
            return Err(AndroshError::Storage(format!(
                "could not record instance {}",
                key
            )));
        }
        Ok(())
    }

    /// Open an interactive session in a provisioned instance.
    pub fn launch(&self, name: &str) -> Result<i32, AndroshError> {
        let key = self.instance_key(name)?;
        if !self.registry.exists(&key, None) {
            return Err(AndroshError::NotSetUp(name.to_string()));
        }

        let distro = self.recorded_distro(&key);
        let instance = self.config.instance_path(name);
        let launch_template = template::load(&self.config.template_path())?;
        let script = self.render_script(&launch_template, name, &instance, &distro)?;
        let command = bridge::quote(path_str(&script)?)?;

        tracing::info!(name, script = %script.display(), "launching");
        let code = self.shell.run_interactive(&command)?;
        if code != 0 {
            return Err(AndroshError::PrivilegedCommand {
                command,
                exit_code: code,
                stderr: "session exited with a non-zero status".to_string(),
            });
        }
        Ok(code)
    }

    /// Delete the instance tree, then its registry record. `confirm` is asked
    /// unless `force` is set; declining changes nothing.
    pub fn remove(
        &self,
        name: &str,
        force: bool,
        confirm: &mut dyn FnMut(&Path) -> bool,
    ) -> Result<Outcome, AndroshError> {
        let key = self.instance_key(name)?;
        if !self.registry.exists(&key, None) {
            return Err(AndroshError::NotFound(name.to_string()));
        }

        let instance = self.config.instance_path(name);
        if !force && !confirm(instance.as_path()) {
            tracing::info!(name, "removal declined");
            return Ok(Outcome::Aborted);
        }

        self.privileged(&["rm", "-rf", key.as_str()])?;
        if !self.registry.remove(&key, None) {
            return Err(AndroshError::Storage(format!(
                "{} was deleted but its record could not be removed",
                key
            )));
        }

        let script = self.config.script_path(name);
        let _ = fs::remove_file(&script);
        if let Some(dir) = script.parent() {
            let _ = fs::remove_dir(dir);
        }
        output::success(&format!("'{}' has been removed", name));
        Ok(Outcome::Done)
    }

    /// Wipe the scratch directory inside the instance's root filesystem.
    pub fn clean(&self, name: &str) -> Result<PathBuf, AndroshError> {
        let key = self.instance_key(name)?;
        if !self.registry.exists(&key, None) {
            return Err(AndroshError::NotSetUp(name.to_string()));
        }

        let distro = self.recorded_distro(&key);
        let tmp = self
            .config
            .distro_path(Path::new(&key), &distro)
            .join(TMP_SUBDIR);
        let tmp_str = path_str(&tmp)?;
        self.privileged(&["rm", "-rf", tmp_str])?;
        self.privileged(&["mkdir", "-p", tmp_str])?;
        output::success(&format!("Cleaned {}", tmp.display()));
        Ok(tmp)
    }

    /// Provisioned instances, sorted by name.
    pub fn instances(&self) -> Vec<output::InstanceRow> {
        output::instance_rows(&self.registry.fetch_all())
    }
}
