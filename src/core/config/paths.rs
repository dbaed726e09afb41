use std::env;
use std::fs;
use std::path::PathBuf;

/// Filesystem layout of one deployment.
///
/// `DOCCHAT_ROOT` picks the directory holding `config.yml`; `DOCCHAT_DATA_DIR`
/// moves logs, secrets and the SQLite session file elsewhere (default
/// `<root>/data`).
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub sessions_db_path: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = env::var_os("DOCCHAT_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(default_root);
        let data_dir = env::var_os("DOCCHAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| project_root.join("data"));
        Self::with_data_dir(project_root, data_dir)
    }

    pub fn with_data_dir(project_root: PathBuf, user_data_dir: PathBuf) -> Self {
        let log_dir = user_data_dir.join("logs");
        if let Err(err) = fs::create_dir_all(&log_dir) {
            eprintln!("cannot create {}: {}", log_dir.display(), err);
        }

        AppPaths {
            sessions_db_path: user_data_dir.join("sessions.db"),
            secrets_path: user_data_dir.join("secrets.yaml"),
            project_root,
            user_data_dir,
            log_dir,
        }
    }
}

/// The crate directory during development, the working directory otherwise.
fn default_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").exists() {
        return manifest_dir;
    }
    env::current_dir().unwrap_or(manifest_dir)
}
