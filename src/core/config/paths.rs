use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub index_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        Self::with_data_dir(data_dir)
    }

    /// Root all storage under an explicit directory. Tests point this at a
    /// scratch directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let index_dir = data_dir.join("indices");
        let log_dir = data_dir.join("logs");

        for dir in [&data_dir, &index_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            data_dir,
            index_dir,
            log_dir,
        }
    }

    /// Vector artifact for one user's index.
    pub fn vector_path(&self, user_id: u64) -> PathBuf {
        self.index_dir.join(format!("user_{user_id}.vec"))
    }

    /// Metadata artifact paired with [`AppPaths::vector_path`].
    pub fn metadata_path(&self, user_id: u64) -> PathBuf {
        self.index_dir.join(format!("user_{user_id}.meta.json"))
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("RESEARCHHUB_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("ResearchHub");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("ResearchHub");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("researchhub")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
