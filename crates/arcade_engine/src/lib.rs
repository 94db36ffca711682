use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod geom;
pub mod loader;
pub mod physics;
pub mod signal;

pub use app::{
    run_app, run_app_with_metrics, AppError, Camera, Game, GameConfig, GameContext, GameState,
    Graphic, InputEvent, Key, LoopMetricsSnapshot, MetricsHandle, Node, NodeId, Plugin, Renderer,
    Scene, SceneStart, Stage, TickReport, SLOW_FRAME_ENV_VAR,
};
pub use geom::{Circle, Rect, Vec2};
pub use loader::{Cache, Loader, LoaderConfig};
pub use physics::{Body, BodyId, BodySet, World, WorldConfig};
pub use signal::{HandlerId, Signal};

pub const ROOT_ENV_VAR: &str = "ARCADE_ROOT";
const ASSETS_DIR_NAME: &str = "assets";

/// Where the asset root was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSource {
    EnvOverride,
    ExecutableAncestor,
    WorkingDirAncestor,
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    /// Base directory the file fetcher resolves relative asset URLs against.
    pub assets_dir: PathBuf,
    pub source: RootSource,
}

impl AppPaths {
    fn at(root: PathBuf, source: RootSource) -> Self {
        let assets_dir = root.join(ASSETS_DIR_NAME);
        Self { root, assets_dir, source }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{var} is not valid unicode: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("{var} points at {}, which has no assets/ directory", .path.display())]
    InvalidEnvRoot { var: &'static str, path: PathBuf },
    #[error(
        "no directory with an assets/ folder above [{}]; set ARCADE_ROOT to the project root",
        display_paths(.searched)
    )]
    RootNotFound { searched: Vec<PathBuf> },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolves the asset root: the `ARCADE_ROOT` override when set, otherwise
/// the nearest ancestor of the executable, then of the working directory,
/// that holds an `assets/` folder.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let root = normalize_path(Path::new(&value));
            if has_assets(&root) {
                Ok(AppPaths::at(root, RootSource::EnvOverride))
            } else {
                Err(StartupError::InvalidEnvRoot {
                    var: ROOT_ENV_VAR,
                    path: root,
                })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe_dir = env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf));
            let cwd = env::current_dir().ok();
            search_roots([
                exe_dir.map(|dir| (dir, RootSource::ExecutableAncestor)),
                cwd.map(|dir| (dir, RootSource::WorkingDirAncestor)),
            ])
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn search_roots<I>(starts: I) -> Result<AppPaths, StartupError>
where
    I: IntoIterator<Item = Option<(PathBuf, RootSource)>>,
{
    let mut searched = Vec::new();
    for (start, source) in starts.into_iter().flatten() {
        if let Some(root) = nearest_asset_root(&start) {
            return Ok(AppPaths::at(root, source));
        }
        searched.push(normalize_path(&start));
    }
    Err(StartupError::RootNotFound { searched })
}

fn nearest_asset_root(start: &Path) -> Option<PathBuf> {
    start.ancestors().find(|dir| has_assets(dir)).map(normalize_path)
}

fn has_assets(dir: &Path) -> bool {
    dir.join(ASSETS_DIR_NAME).is_dir()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
