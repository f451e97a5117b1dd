use crate::error::FixtureError;
use std::{
    collections::HashMap,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::TempPath;

/// Where the official postgres image looks for seed scripts on first boot.
pub const CONTAINER_INIT_DIR: &str = "/docker-entrypoint-initdb.d";

/// Seed scripts to mount into a container or to run against a new database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InitScripts {
    #[default]
    None,
    /// SQL text, written to a temporary `init.sql`.
    Inline(String),
    /// Absolute paths to individual scripts, mounted under their own file name.
    FromFiles(Vec<PathBuf>),
    /// Absolute path to a directory mounted as the whole init directory.
    FromDir(PathBuf),
}

impl InitScripts {
    pub fn inline<S: Into<String>>(sql: S) -> Self {
        InitScripts::Inline(sql.into())
    }

    pub fn from_files<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        InitScripts::FromFiles(paths.into_iter().map(Into::into).collect())
    }

    pub fn from_dir<P: Into<PathBuf>>(dir: P) -> Self {
        InitScripts::FromDir(dir.into())
    }

    /// Computes the bind mounts for these scripts.
    ///
    /// Only the `Inline` variant touches the filesystem: the text lands in a
    /// fresh temporary file whose ownership is handed to the caller through
    /// [`ResolvedScripts::temp_file`]. Relative paths are rejected before
    /// anything is created.
    pub fn resolve(&self) -> Result<ResolvedScripts, FixtureError> {
        match self {
            InitScripts::Inline(sql) if !sql.is_empty() => {
                let temp_file = write_temp_script(sql)
                    .map_err(|source| FixtureError::ResolutionIo { source })?;
                let mut mounts = HashMap::new();
                mounts.insert(
                    temp_file.to_path_buf(),
                    format!("{CONTAINER_INIT_DIR}/init.sql"),
                );
                Ok(ResolvedScripts {
                    mounts,
                    scripts: Scripts::Files(vec![temp_file.to_path_buf()]),
                    temp_file: Some(temp_file),
                })
            }
            InitScripts::FromFiles(files) if !files.is_empty() => {
                let mut mounts = HashMap::with_capacity(files.len());
                for file in files {
                    let file_name = require_absolute(file)?
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .ok_or_else(|| FixtureError::InvalidSpec { path: file.clone() })?;
                    mounts.insert(file.clone(), format!("{CONTAINER_INIT_DIR}/{file_name}"));
                }
                Ok(ResolvedScripts {
                    mounts,
                    scripts: Scripts::Files(files.clone()),
                    temp_file: None,
                })
            }
            InitScripts::FromDir(dir) if !dir.as_os_str().is_empty() => {
                require_absolute(dir)?;
                let mut mounts = HashMap::new();
                mounts.insert(dir.clone(), CONTAINER_INIT_DIR.to_string());
                Ok(ResolvedScripts {
                    mounts,
                    scripts: Scripts::Dir(dir.clone()),
                    temp_file: None,
                })
            }
            _ => Ok(ResolvedScripts::default()),
        }
    }
}

fn require_absolute(path: &Path) -> Result<&Path, FixtureError> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(FixtureError::InvalidSpec {
            path: path.to_path_buf(),
        })
    }
}

fn write_temp_script(sql: &str) -> io::Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("init")
        .suffix(".sql")
        .tempfile()?;
    file.write_all(sql.as_bytes())?;
    file.flush()?;
    // the entrypoint reads the mount as the database user, not as us
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644))?;
    }
    Ok(file.into_temp_path())
}

#[derive(Debug, Default)]
enum Scripts {
    #[default]
    Empty,
    Files(Vec<PathBuf>),
    Dir(PathBuf),
}

/// Outcome of [`InitScripts::resolve`].
#[derive(Debug, Default)]
pub struct ResolvedScripts {
    /// Host path to container path.
    pub mounts: HashMap<PathBuf, String>,
    /// Temporary file backing an inline script. Deleted when dropped, so the
    /// caller decides how long it lives by where it moves it.
    pub temp_file: Option<TempPath>,
    scripts: Scripts,
}

impl ResolvedScripts {
    /// Host-side script files in the order they should run.
    ///
    /// Directories are expanded to their `*.sql` entries sorted by name,
    /// which is the order the postgres entrypoint applies them in.
    pub async fn script_files(&self) -> io::Result<Vec<PathBuf>> {
        match &self.scripts {
            Scripts::Empty => Ok(vec![]),
            Scripts::Files(files) => Ok(files.clone()),
            Scripts::Dir(dir) => {
                let mut entries = tokio::fs::read_dir(dir).await?;
                let mut files = vec![];
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if entry.file_type().await?.is_file()
                        && path.extension().map_or(false, |ext| ext == "sql")
                    {
                        files.push(path);
                    }
                }
                files.sort();
                Ok(files)
            }
        }
    }
}
