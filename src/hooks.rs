//! Hook selection and execution
//!
//! Hooks live in `<script_dir>/<state>.d/` and run with the assembled
//! environment on every transition into their state. Eligibility is
//! checked on every dispatch so operators can add or drop hooks without
//! restarting the daemon.

use crate::error::{LinkhookError, LinkhookResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Owner-execute permission bit
const S_IXUSR: u32 = 0o100;
/// Group- and world-writable permission bits
const WRITABLE_BY_OTHERS: u32 = 0o022;

/// Selects the ordered, permission-filtered hook list for a state
pub struct HookSelector {
    script_dir: PathBuf,
    /// Required owner of every hook (the privileged identity)
    owner_uid: u32,
    owner_gid: u32,
}

impl HookSelector {
    /// Selector requiring root:root ownership, the daemon default
    pub fn new(script_dir: impl Into<PathBuf>) -> Self {
        Self::with_owner(script_dir, 0, 0)
    }

    /// Selector requiring a specific owning identity
    pub fn with_owner(script_dir: impl Into<PathBuf>, owner_uid: u32, owner_gid: u32) -> Self {
        Self {
            script_dir: script_dir.into(),
            owner_uid,
            owner_gid,
        }
    }

    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    /// Return the eligible hooks for `state`, sorted ascending by path
    /// byte order. A missing state directory means no hooks configured.
    pub async fn select(&self, state: &str) -> LinkhookResult<Vec<PathBuf>> {
        let dir = self.script_dir.join(format!("{}.d", state));

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut hooks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match self.check_eligibility(&path).await {
                Ok(()) => hooks.push(path),
                Err(LinkhookError::PermissionDenied(msg)) => {
                    error!("Skipping hook {}: {}", path.display(), msg);
                }
                Err(e) => {
                    error!("Skipping hook {}: {}", path.display(), e);
                }
            }
        }

        hooks.sort();
        Ok(hooks)
    }

    /// A hook must be a regular file, owner-executable, writable only
    /// by its owner, and owned by the privileged identity (both user
    /// and group, no partial match).
    async fn check_eligibility(&self, path: &Path) -> LinkhookResult<()> {
        let metadata = tokio::fs::metadata(path).await?;

        if !metadata.is_file() {
            return Err(LinkhookError::PermissionDenied(
                "not a regular file".to_string(),
            ));
        }
        if metadata.mode() & S_IXUSR == 0 {
            return Err(LinkhookError::PermissionDenied(
                "owner execute bit not set".to_string(),
            ));
        }
        if metadata.mode() & WRITABLE_BY_OTHERS != 0 {
            return Err(LinkhookError::PermissionDenied(format!(
                "mode {:o} is group or world writable",
                metadata.mode() & 0o7777
            )));
        }
        if metadata.uid() != self.owner_uid || metadata.gid() != self.owner_gid {
            return Err(LinkhookError::PermissionDenied(format!(
                "owned by {}:{}, expected {}:{}",
                metadata.uid(),
                metadata.gid(),
                self.owner_uid,
                self.owner_gid
            )));
        }

        Ok(())
    }
}

/// Executes hooks with an injected environment
#[async_trait]
pub trait HookRunner: Send + Sync {
    /// Run `hooks` in order, waiting for each to finish before starting
    /// the next. A failing hook never blocks the remaining hooks.
    async fn run(&self, hooks: &[PathBuf], env: &HashMap<String, String>);
}

/// Spawns each hook as a child process
pub struct ScriptHookRunner;

#[async_trait]
impl HookRunner for ScriptHookRunner {
    async fn run(&self, hooks: &[PathBuf], env: &HashMap<String, String>) {
        for hook in hooks {
            debug!("Running hook {}", hook.display());
            match Command::new(hook).envs(env).status().await {
                Ok(status) if status.success() => {
                    debug!("Hook {} completed", hook.display());
                }
                Ok(status) => {
                    warn!(
                        "Hook {} exited with {:?}",
                        hook.display(),
                        status.code()
                    );
                }
                Err(e) => {
                    warn!("Failed to run hook {}: {}", hook.display(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn current_identity() -> (u32, u32) {
        unsafe { (libc::getuid(), libc::getgid()) }
    }

    fn write_hook(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn selector_for(tmp: &TempDir) -> HookSelector {
        let (uid, gid) = current_identity();
        HookSelector::with_owner(tmp.path(), uid, gid)
    }

    #[tokio::test]
    async fn test_missing_state_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let selector = selector_for(&tmp);
        let hooks = selector.select("routable").await.unwrap();
        assert!(hooks.is_empty());
    }

    #[tokio::test]
    async fn test_lexicographic_order() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("routable.d");
        std::fs::create_dir(&dir).unwrap();
        write_hook(&dir, "99c", 0o700);
        write_hook(&dir, "10a", 0o700);
        write_hook(&dir, "2b", 0o700);

        let selector = selector_for(&tmp);
        let hooks = selector.select("routable").await.unwrap();
        let names: Vec<_> = hooks
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["10a", "2b", "99c"]);
    }

    #[tokio::test]
    async fn test_non_executable_excluded() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("off.d");
        std::fs::create_dir(&dir).unwrap();
        write_hook(&dir, "10-valid", 0o700);
        write_hook(&dir, "20-plain", 0o600);

        let selector = selector_for(&tmp);
        let hooks = selector.select("off").await.unwrap();
        assert_eq!(hooks.len(), 1);
        assert!(hooks[0].ends_with("10-valid"));
    }

    #[tokio::test]
    async fn test_world_writable_excluded() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("routable.d");
        std::fs::create_dir(&dir).unwrap();
        write_hook(&dir, "10-open", 0o777);
        write_hook(&dir, "20-group", 0o720);
        write_hook(&dir, "30-valid", 0o700);

        let selector = selector_for(&tmp);
        let hooks = selector.select("routable").await.unwrap();
        assert_eq!(hooks.len(), 1);
        assert!(hooks[0].ends_with("30-valid"));
    }

    #[tokio::test]
    async fn test_wrong_owner_excluded() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("off.d");
        std::fs::create_dir(&dir).unwrap();
        write_hook(&dir, "10-valid", 0o700);

        let (uid, gid) = current_identity();
        // Expecting a different group makes the existing file a partial
        // match, which must be rejected as strictly as a wrong owner.
        let selector = HookSelector::with_owner(tmp.path(), uid, gid.wrapping_add(1));
        let hooks = selector.select("off").await.unwrap();
        assert!(hooks.is_empty());
    }

    #[tokio::test]
    async fn test_directory_excluded() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("dormant.d");
        std::fs::create_dir(&dir).unwrap();
        std::fs::create_dir(dir.join("subdir")).unwrap();
        write_hook(&dir, "10-valid", 0o700);

        let selector = selector_for(&tmp);
        let hooks = selector.select("dormant").await.unwrap();
        assert_eq!(hooks.len(), 1);
    }

    #[tokio::test]
    async fn test_runner_continues_after_failure() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("ran");

        let failing = tmp.path().join("10-fail");
        std::fs::write(&failing, "#!/bin/sh\nexit 3\n").unwrap();
        std::fs::set_permissions(&failing, std::fs::Permissions::from_mode(0o700)).unwrap();

        let succeeding = tmp.path().join("20-touch");
        std::fs::write(
            &succeeding,
            format!("#!/bin/sh\necho \"$STATE\" > {}\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&succeeding, std::fs::Permissions::from_mode(0o700)).unwrap();

        let mut env = HashMap::new();
        env.insert("STATE".to_string(), "routable".to_string());

        ScriptHookRunner
            .run(&[failing, succeeding], &env)
            .await;

        let content = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(content.trim(), "routable");
    }
}
