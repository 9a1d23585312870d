//! Backend adapters and command-line backend selection.

pub mod keyspace;
pub mod memory_adapter;
pub mod sqlite_adapter;
pub mod store_client;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::client::Client;
use crate::error::{BenchResult, ConfigError};

/// Backend named on the command line: `memory`, `sqlite` or `sqlite:<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    /// `None` places the database in the run's scratch directory.
    Sqlite { path: Option<PathBuf> },
}

impl BackendKind {
    pub fn label(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Sqlite { .. } => "sqlite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Sqlite { path: Some(path) } => write!(f, "sqlite:{}", path.display()),
            other => f.write_str(other.label()),
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (s, None),
        };
        match (kind.to_ascii_lowercase().as_str(), arg) {
            ("memory", None) => Ok(BackendKind::Memory),
            ("sqlite", None) => Ok(BackendKind::Sqlite { path: None }),
            ("sqlite", Some(path)) if !path.is_empty() => Ok(BackendKind::Sqlite {
                path: Some(PathBuf::from(path)),
            }),
            _ => Err(ConfigError::InvalidSetting(format!(
                "unknown backend `{s}` (expected memory, sqlite or sqlite:<path>)"
            ))),
        }
    }
}

/// Open a backend under `name`. `rtt` adds a simulated round trip per call.
pub fn open_backend(
    kind: &BackendKind,
    name: &str,
    scratch_dir: &Path,
    rtt: Duration,
) -> BenchResult<Arc<dyn Client>> {
    let client: Arc<dyn Client> = match kind {
        BackendKind::Memory => Arc::new(memory_adapter::memory_client(name).with_round_trip(rtt)),
        BackendKind::Sqlite { path } => {
            let path = path
                .clone()
                .unwrap_or_else(|| scratch_dir.join(format!("{name}.db")));
            Arc::new(sqlite_adapter::sqlite_client(name, &path)?.with_round_trip(rtt))
        }
    };
    Ok(client)
}
