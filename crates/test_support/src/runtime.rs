use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::{env, fs};

use anyhow::{bail, Result};

/// Ensure a container runtime socket is available for testcontainers.
///
/// testcontainers talks to the Docker API; when `DOCKER_HOST` is unset and no
/// Docker socket answers, a reachable Podman socket is used instead.
///
/// # Errors
/// Returns an error when no Docker/Podman socket can be found or reached, so
/// callers can skip instead of failing the suite.
pub fn ensure_container_runtime() -> Result<()> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match INIT.get_or_init(init_container_runtime) {
        Ok(()) => Ok(()),
        Err(message) => bail!("{message}"),
    }
}

fn init_container_runtime() -> Result<(), String> {
    if let Ok(docker_host) = env::var("DOCKER_HOST") {
        let path = docker_host
            .strip_prefix("unix://")
            .unwrap_or(docker_host.as_str());
        if !path.starts_with('/') || socket_connectable(Path::new(path)) {
            return Ok(());
        }
        return Err(format!(
            "`DOCKER_HOST` points to `{docker_host}`, but the socket is not accepting connections."
        ));
    }

    let docker_socket = Path::new("/var/run/docker.sock");
    if socket_connectable(docker_socket) {
        return Ok(());
    }

    if let Some(path) = find_podman_socket() {
        if socket_connectable(&path) {
            env::set_var("DOCKER_HOST", format!("unix://{}", path.display()));
            return Ok(());
        }
        return Err(format!(
            "Podman socket found at `{}`, but it is not accepting connections. Start `podman.socket` or run `podman system service`.",
            path.display()
        ));
    }

    Err(
        "No container runtime socket found. Start the Docker daemon, `podman.socket`, or set `DOCKER_HOST`."
            .to_string(),
    )
}

fn find_podman_socket() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        candidates.push(PathBuf::from(runtime_dir).join("podman/podman.sock"));
    }
    if let Some(uid) = read_uid() {
        candidates.push(PathBuf::from(format!("/run/user/{uid}/podman/podman.sock")));
    }
    candidates.push(PathBuf::from("/var/run/podman/podman.sock"));
    candidates.push(PathBuf::from("/run/podman/podman.sock"));

    candidates.into_iter().find(|path| path.exists())
}

fn socket_connectable(path: &Path) -> bool {
    path.exists() && UnixStream::connect(path).is_ok()
}

fn read_uid() -> Option<u32> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("Uid:") {
            return rest.split_whitespace().next()?.parse().ok();
        }
    }
    None
}
