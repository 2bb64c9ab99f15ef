use std::path::PathBuf;

/// Where afkbot keeps its files.
///
/// Follows the XDG base directory layout on Unix-like systems and `%APPDATA%`
/// on Windows:
/// - config: `$XDG_CONFIG_HOME/{name}` (default `~/.config/{name}`)
/// - data: `$XDG_DATA_HOME/{name}` (default `~/.local/share/{name}`)
pub struct ProjectPaths {
    name: String,
}

impl ProjectPaths {
    /// Create a new ProjectPaths for `name`.
    ///
    /// Returns `None` when no home directory can be determined.
    pub fn new(name: &str) -> Option<Self> {
        home_dir()?;
        Some(ProjectPaths {
            name: name.to_string(),
        })
    }

    pub fn config_dir(&self) -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            windows_appdata()
                .map(|p| p.join(&self.name))
                .unwrap_or_else(|| PathBuf::from(format!(".{}", self.name)))
        }

        #[cfg(not(target_os = "windows"))]
        {
            xdg_dir("XDG_CONFIG_HOME", &[".config"]).join(&self.name)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            windows_appdata()
                .map(|p| p.join(&self.name))
                .unwrap_or_else(|| PathBuf::from(format!(".{}", self.name)))
        }

        #[cfg(not(target_os = "windows"))]
        {
            xdg_dir("XDG_DATA_HOME", &[".local", "share"]).join(&self.name)
        }
    }

    /// Path of the default settings file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    /// Directory that holds the log files.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

/// Read the home directory from HOME, falling back to USERPROFILE.
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
}

/// Resolve `$var` if set, else `~/<fallback...>`, else the relative fallback.
#[cfg(not(target_os = "windows"))]
fn xdg_dir(var: &str, fallback: &[&str]) -> PathBuf {
    let relative: PathBuf = fallback.iter().collect();
    std::env::var_os(var)
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|h| h.join(&relative)))
        .unwrap_or(relative)
}

#[cfg(target_os = "windows")]
fn windows_appdata() -> Option<PathBuf> {
    std::env::var_os("APPDATA").map(PathBuf::from)
}
