use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use thiserror::Error;
use tracing::debug;

use super::task::{FetchPart, TaskId};
use super::url::is_absolute_url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported url scheme: {url}")]
    UnsupportedScheme { url: String },
    #[error("url escapes the asset root: {url}")]
    OutsideRoot { url: String },
    #[error("no response registered for {url}")]
    NotFound { url: String },
    #[error("request for {url} failed: {message}")]
    Failed { url: String, message: String },
    #[error("none of {candidates:?} has a supported extension")]
    NoSupportedUrl { candidates: Vec<String> },
    #[error("inline data could not be serialized: {0}")]
    Inline(#[source] serde_json::Error),
    #[error("failed to spawn fetch worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Identifies the task (and loader generation) a completion belongs to, so a
/// completion arriving after a reset is recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub task: TaskId,
    pub generation: u64,
    pub part: FetchPart,
}

#[derive(Debug)]
pub struct FetchCompletion {
    pub ticket: FetchTicket,
    pub result: Result<Vec<u8>, FetchError>,
}

/// Transport seam. `begin` never completes synchronously; results surface
/// through a later `poll`.
pub trait Fetcher {
    fn begin(&mut self, ticket: FetchTicket, url: &str);
    fn poll(&mut self) -> Vec<FetchCompletion>;
}

/// Reads relative urls from an asset root on worker threads.
#[derive(Debug)]
pub struct FileFetcher {
    root: PathBuf,
    sender: Sender<FetchCompletion>,
    receiver: Receiver<FetchCompletion>,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            root: root.into(),
            sender,
            receiver,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Fetcher for FileFetcher {
    fn begin(&mut self, ticket: FetchTicket, url: &str) {
        let path = match resolve_asset_path(&self.root, url) {
            Ok(path) => path,
            Err(error) => {
                let _ = self.sender.send(FetchCompletion {
                    ticket,
                    result: Err(error),
                });
                return;
            }
        };

        let sender = self.sender.clone();
        let worker_path = path.clone();
        let spawned = thread::Builder::new()
            .name("asset-fetch".to_string())
            .spawn(move || {
                let result = fs::read(&worker_path).map_err(|source| FetchError::Io {
                    path: worker_path.clone(),
                    source,
                });
                let _ = sender.send(FetchCompletion { ticket, result });
            });
        if let Err(source) = spawned {
            let _ = self.sender.send(FetchCompletion {
                ticket,
                result: Err(FetchError::Spawn(source)),
            });
        } else {
            debug!(path = %path.display(), "fetch_started");
        }
    }

    fn poll(&mut self) -> Vec<FetchCompletion> {
        self.receiver.try_iter().collect()
    }
}

fn resolve_asset_path(root: &Path, url: &str) -> Result<PathBuf, FetchError> {
    if is_absolute_url(url) || url.contains("://") {
        return Err(FetchError::UnsupportedScheme {
            url: url.to_string(),
        });
    }
    let relative = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_start_matches('/');
    let relative = Path::new(relative);
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
    {
        return Err(FetchError::OutsideRoot {
            url: url.to_string(),
        });
    }
    Ok(root.join(relative))
}

#[derive(Debug, Default)]
struct MemoryFetcherState {
    responses: HashMap<String, Result<Vec<u8>, String>>,
    held: HashSet<String>,
    pending: Vec<(FetchTicket, String)>,
    requested: Vec<String>,
}

/// Deterministic in-memory transport. Clones share state, so a test can keep
/// a handle after giving the fetcher to a `Loader`.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    state: Rc<RefCell<MemoryFetcherState>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, bytes: impl Into<Vec<u8>>) {
        self.state
            .borrow_mut()
            .responses
            .insert(url.to_string(), Ok(bytes.into()));
    }

    pub fn insert_failure(&self, url: &str, message: &str) {
        self.state
            .borrow_mut()
            .responses
            .insert(url.to_string(), Err(message.to_string()));
    }

    /// Requests for `url` stay in flight until `release` is called.
    pub fn hold(&self, url: &str) {
        self.state.borrow_mut().held.insert(url.to_string());
    }

    pub fn release(&self, url: &str) {
        self.state.borrow_mut().held.remove(url);
    }

    /// Every url passed to `begin`, in order.
    pub fn requested(&self) -> Vec<String> {
        self.state.borrow().requested.clone()
    }

    pub fn in_flight(&self) -> Vec<String> {
        self.state
            .borrow()
            .pending
            .iter()
            .map(|(_, url)| url.clone())
            .collect()
    }
}

impl Fetcher for MemoryFetcher {
    fn begin(&mut self, ticket: FetchTicket, url: &str) {
        let mut state = self.state.borrow_mut();
        state.requested.push(url.to_string());
        state.pending.push((ticket, url.to_string()));
    }

    fn poll(&mut self) -> Vec<FetchCompletion> {
        let mut state = self.state.borrow_mut();
        let pending = std::mem::take(&mut state.pending);
        let mut completions = Vec::new();
        for (ticket, url) in pending {
            if state.held.contains(&url) {
                state.pending.push((ticket, url));
                continue;
            }
            let result = match state.responses.get(&url) {
                Some(Ok(bytes)) => Ok(bytes.clone()),
                Some(Err(message)) => Err(FetchError::Failed {
                    url: url.clone(),
                    message: message.clone(),
                }),
                None => Err(FetchError::NotFound { url: url.clone() }),
            };
            completions.push(FetchCompletion { ticket, result });
        }
        completions
    }
}
