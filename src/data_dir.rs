use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Root under which transmem keeps its state.
///
/// The only thing stored today is the Tantivy index in `index/`. The
/// channel ledger lives inside that index, so copying the directory while
/// no process has it open yields a consistent backup.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

/// Environment variable overriding the default location.
pub const DATA_DIR_ENV: &str = "TRANSMEM_DATA_DIR";

impl DataDir {
    /// Pick the data directory and make sure it exists.
    ///
    /// `--data-dir` wins over `TRANSMEM_DATA_DIR`, which wins over the XDG
    /// data home (`~/.local/share/transmem/`).
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os(DATA_DIR_ENV) {
                Some(val) if !val.is_empty() => PathBuf::from(val),
                _ => xdg_data_home()?,
            },
        };
        create(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The translation memory index, created on first use.
    pub fn index_dir(&self) -> Result<PathBuf> {
        let path = self.root.join("index");
        create(&path)?;
        Ok(path)
    }
}

fn xdg_data_home() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("transmem")
        .get_data_home()
        .ok_or_else(|| Error::Config("no XDG data home for transmem".into()))
}

fn create(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|_| Error::DataDir(path.into()))
}
