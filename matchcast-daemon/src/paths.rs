use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn matchcast_root(home: &Path) -> PathBuf {
    home.join(".matchcast")
}

pub fn socket_path(home: &Path) -> PathBuf {
    matchcast_root(home).join(DAEMON_SOCKET)
}
