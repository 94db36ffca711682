use std::collections::VecDeque;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::signal::Signal;

use super::cache::Cache;
use super::decode::{AssetDecoder, DefaultDecoder};
use super::fetch::{FetchCompletion, FetchError, FetchTicket, Fetcher};
use super::pack::{pack_requests, parse_pack_text};
use super::task::{
    default_extension, AssetKind, AssetRequest, AtlasFormat, FetchPart, InlineData, LoadTask,
    SpriteSheetLayout, TaskId, TaskOptions, TaskState, TilemapFormat, UrlSource,
};
use super::url::{pick_supported_url, resolve_url};

pub const MAX_PARALLEL_DOWNLOADS_CAP: usize = 12;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub base_url: String,
    pub path: String,
    pub enable_parallel: bool,
    pub max_parallel_downloads: usize,
    pub stall_grace_ms: f64,
    pub audio_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            path: String::new(),
            enable_parallel: true,
            max_parallel_downloads: 4,
            stall_grace_ms: 2000.0,
            audio_extensions: ["ogg", "mp3", "m4a", "wav"].map(String::from).to_vec(),
            video_extensions: ["webm", "mp4", "ogv"].map(String::from).to_vec(),
        }
    }
}

impl LoaderConfig {
    pub fn inflight_limit(&self) -> usize {
        if self.enable_parallel {
            self.max_parallel_downloads.clamp(1, MAX_PARALLEL_DOWNLOADS_CAP)
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Queued(TaskId),
    /// An identical queued task was replaced in place (overwrite).
    Replaced(TaskId),
    /// A queued task with the same kind and key already exists.
    Duplicate,
    /// Empty key or no derivable url; a warning was logged.
    Rejected,
}

impl EnqueueResult {
    pub fn task_id(self) -> Option<TaskId> {
        match self {
            EnqueueResult::Queued(id) | EnqueueResult::Replaced(id) => Some(id),
            EnqueueResult::Duplicate | EnqueueResult::Rejected => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PackSource {
    Url(String),
    Inline(Value),
    /// JSON text, parsed at enqueue time.
    InlineText(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileStart {
    pub progress: u32,
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileComplete {
    pub progress: u32,
    pub key: String,
    pub success: bool,
    pub loaded: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileError {
    pub kind: AssetKind,
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackComplete {
    pub key: String,
    pub success: bool,
    pub loaded: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub files_total: usize,
    pub files_loaded: usize,
    pub files_failed: usize,
    pub packs_total: usize,
    pub packs_loaded: usize,
    /// The stall safety net ended the load rather than the queue draining.
    pub forced: bool,
}

/// Asset queue with bounded parallel fetches and sync-point ordering.
///
/// Tasks are processed in list order. A sync-point task that has not resolved
/// blocks every ordinary task enqueued after it; packs without a payload are
/// still dispatched so manifests resolve while a block is active. Fetch
/// completions are applied from `pump`, never from inside `begin`.
pub struct Loader {
    config: LoaderConfig,
    base_url: String,
    path: String,
    fetcher: Box<dyn Fetcher>,
    decoder: Box<dyn AssetDecoder>,
    file_list: Vec<LoadTask>,
    flight_queue: Vec<TaskId>,
    deferred: VecDeque<FetchCompletion>,
    processing_head: usize,
    sync_point_depth: u32,
    is_loading: bool,
    has_loaded: bool,
    file_load_started: bool,
    pub reset_locked: bool,
    total_file_count: usize,
    total_pack_count: usize,
    loaded_file_count: usize,
    loaded_pack_count: usize,
    failed_file_count: usize,
    next_task_id: u64,
    next_seq: u64,
    generation: u64,
    stall_deadline_ms: Option<f64>,
    finished: Option<LoadSummary>,
    pub on_load_start: Signal<()>,
    pub on_file_start: Signal<FileStart>,
    pub on_file_complete: Signal<FileComplete>,
    pub on_file_error: Signal<FileError>,
    pub on_pack_complete: Signal<PackComplete>,
    pub on_load_complete: Signal<LoadSummary>,
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("files", &self.file_list.len())
            .field("in_flight", &self.flight_queue.len())
            .field("processing_head", &self.processing_head)
            .field("is_loading", &self.is_loading)
            .finish()
    }
}

impl Loader {
    pub fn new(config: LoaderConfig, fetcher: Box<dyn Fetcher>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            path: config.path.clone(),
            config,
            fetcher,
            decoder: Box::new(DefaultDecoder),
            file_list: Vec::new(),
            flight_queue: Vec::new(),
            deferred: VecDeque::new(),
            processing_head: 0,
            sync_point_depth: 0,
            is_loading: false,
            has_loaded: false,
            file_load_started: false,
            reset_locked: false,
            total_file_count: 0,
            total_pack_count: 0,
            loaded_file_count: 0,
            loaded_pack_count: 0,
            failed_file_count: 0,
            next_task_id: 0,
            next_seq: 0,
            generation: 0,
            stall_deadline_ms: None,
            finished: None,
            on_load_start: Signal::new(),
            on_file_start: Signal::new(),
            on_file_complete: Signal::new(),
            on_file_error: Signal::new(),
            on_pack_complete: Signal::new(),
            on_load_complete: Signal::new(),
        }
    }

    pub fn with_decoder(mut self, decoder: Box<dyn AssetDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into();
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Prefix applied to relative urls of tasks enqueued from now on.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn has_loaded(&self) -> bool {
        self.has_loaded
    }

    pub fn tasks(&self) -> &[LoadTask] {
        &self.file_list
    }

    pub fn in_flight(&self) -> &[TaskId] {
        &self.flight_queue
    }

    pub fn total_queued_files(&self) -> usize {
        self.total_file_count - self.loaded_file_count
    }

    pub fn total_loaded_files(&self) -> usize {
        self.loaded_file_count
    }

    pub fn total_queued_packs(&self) -> usize {
        self.total_pack_count - self.loaded_pack_count
    }

    pub fn total_loaded_packs(&self) -> usize {
        self.loaded_pack_count
    }

    pub fn total_file_count(&self) -> usize {
        self.total_file_count
    }

    pub fn total_pack_count(&self) -> usize {
        self.total_pack_count
    }

    pub fn progress_float(&self) -> f32 {
        if self.total_file_count == 0 {
            return 0.0;
        }
        let progress = self.loaded_file_count as f32 / self.total_file_count as f32 * 100.0;
        progress.clamp(0.0, 100.0)
    }

    pub fn progress(&self) -> u32 {
        self.progress_float().round() as u32
    }

    /// Summary of the most recent completed load, consumed once.
    pub fn take_finished(&mut self) -> Option<LoadSummary> {
        self.finished.take()
    }

    /// Index of the task the queue would act on for `(kind, key)`: the first
    /// match that is still queued, otherwise the last match.
    pub fn asset_index(&self, kind: AssetKind, key: &str) -> Option<usize> {
        let mut best = None;
        for (index, task) in self.file_list.iter().enumerate() {
            if task.kind == kind && task.key == key {
                best = Some(index);
                if task.state == TaskState::Queued {
                    break;
                }
            }
        }
        best
    }

    pub fn asset(&self, kind: AssetKind, key: &str) -> Option<&LoadTask> {
        self.asset_index(kind, key).map(|index| &self.file_list[index])
    }

    pub fn check_key_exists(&self, kind: AssetKind, key: &str) -> bool {
        self.asset_index(kind, key).is_some()
    }

    pub fn enqueue(&mut self, request: AssetRequest) -> EnqueueResult {
        let AssetRequest {
            kind,
            key,
            url,
            secondary,
            options,
            overwrite,
            path,
        } = request;

        if kind == AssetKind::Pack {
            let source = match url {
                UrlSource::Single(url) => PackSource::Url(url),
                UrlSource::Inline(InlineData::Json(value)) => PackSource::Inline(value),
                UrlSource::Inline(InlineData::Text(text)) => PackSource::InlineText(text),
                UrlSource::Default => PackSource::Url(format!("{key}.json")),
                UrlSource::Candidates(_) => {
                    warn!(key = %key, "loader_pack_candidates_unsupported");
                    return EnqueueResult::Rejected;
                }
            };
            return self.pack(&key, source);
        }
        if key.is_empty() {
            warn!(kind = kind.as_str(), "loader_empty_key");
            return EnqueueResult::Rejected;
        }
        let url = match url {
            UrlSource::Default => match default_extension(kind, &options) {
                Some(extension) => UrlSource::Single(format!("{key}{extension}")),
                None => {
                    warn!(kind = kind.as_str(), key = %key, "loader_missing_url");
                    return EnqueueResult::Rejected;
                }
            },
            UrlSource::Candidates(candidates) if candidates.is_empty() => {
                warn!(kind = kind.as_str(), key = %key, "loader_missing_url");
                return EnqueueResult::Rejected;
            }
            other => other,
        };
        if matches!(secondary, Some(UrlSource::Default) | Some(UrlSource::Candidates(_))) {
            warn!(kind = kind.as_str(), key = %key, "loader_missing_data_url");
            return EnqueueResult::Rejected;
        }

        let path = path.unwrap_or_else(|| self.path.clone());
        let task = self.new_task(kind, key, url, secondary, options, path);
        let id = task.id;

        match self.asset_index(kind, &task.key) {
            Some(index) if self.file_list[index].state == TaskState::Queued => {
                if overwrite {
                    debug!(kind = kind.as_str(), key = %task.key, "loader_task_replaced");
                    self.file_list[index] = task;
                    EnqueueResult::Replaced(id)
                } else {
                    debug!(kind = kind.as_str(), key = %task.key, "loader_duplicate_ignored");
                    EnqueueResult::Duplicate
                }
            }
            _ => {
                self.file_list.push(task);
                self.total_file_count += 1;
                EnqueueResult::Queued(id)
            }
        }
    }

    /// Enqueues with overwrite set.
    pub fn replace(&mut self, request: AssetRequest) -> EnqueueResult {
        self.enqueue(request.with_overwrite(true))
    }

    /// Packs are sync points and are placed before the first queued ordinary
    /// task, so packs added before loading starts resolve first, in order.
    pub fn pack(&mut self, key: &str, source: PackSource) -> EnqueueResult {
        if key.is_empty() {
            warn!(kind = AssetKind::Pack.as_str(), "loader_empty_key");
            return EnqueueResult::Rejected;
        }
        let (url, data) = match source {
            PackSource::Url(url) => (UrlSource::Single(url), None),
            PackSource::Inline(value) => (UrlSource::Inline(InlineData::Json(value.clone())), Some(value)),
            PackSource::InlineText(text) => match parse_pack_text(&text) {
                Ok(value) => (UrlSource::Inline(InlineData::Text(text)), Some(value)),
                Err(error) => {
                    warn!(key, error = %error, "loader_pack_rejected");
                    return EnqueueResult::Rejected;
                }
            },
        };

        let mut task = self.new_task(
            AssetKind::Pack,
            key.to_string(),
            url,
            None,
            TaskOptions::None,
            self.path.clone(),
        );
        task.sync_point = true;
        if let Some(value) = data {
            task.pack_data = Some(value);
            task.state = TaskState::Loaded;
        }
        let id = task.id;

        let insert_at = self
            .file_list
            .iter()
            .position(|existing| {
                existing.state == TaskState::Queued && existing.kind != AssetKind::Pack
            })
            .unwrap_or(self.file_list.len());
        self.file_list.insert(insert_at, task);
        self.total_pack_count += 1;
        EnqueueResult::Queued(id)
    }

    pub fn image(&mut self, key: &str, url: impl Into<UrlSource>) -> EnqueueResult {
        self.enqueue(AssetRequest::new(AssetKind::Image, key, url))
    }

    pub fn text(&mut self, key: &str, url: impl Into<UrlSource>) -> EnqueueResult {
        self.enqueue(AssetRequest::new(AssetKind::Text, key, url))
    }

    pub fn json(&mut self, key: &str, url: impl Into<UrlSource>) -> EnqueueResult {
        self.enqueue(AssetRequest::new(AssetKind::Json, key, url))
    }

    pub fn xml(&mut self, key: &str, url: impl Into<UrlSource>) -> EnqueueResult {
        self.enqueue(AssetRequest::new(AssetKind::Xml, key, url))
    }

    pub fn script(&mut self, key: &str, url: impl Into<UrlSource>) -> EnqueueResult {
        self.enqueue(AssetRequest::new(AssetKind::Script, key, url))
    }

    pub fn binary(&mut self, key: &str, url: impl Into<UrlSource>) -> EnqueueResult {
        self.enqueue(AssetRequest::new(AssetKind::Binary, key, url))
    }

    pub fn shader(&mut self, key: &str, url: impl Into<UrlSource>) -> EnqueueResult {
        self.enqueue(AssetRequest::new(AssetKind::Shader, key, url))
    }

    pub fn spritesheet(
        &mut self,
        key: &str,
        url: impl Into<UrlSource>,
        layout: SpriteSheetLayout,
    ) -> EnqueueResult {
        self.enqueue(
            AssetRequest::new(AssetKind::SpriteSheet, key, url)
                .with_options(TaskOptions::SpriteSheet(layout)),
        )
    }

    pub fn atlas(
        &mut self,
        key: &str,
        texture_url: impl Into<UrlSource>,
        data: impl Into<UrlSource>,
        format: AtlasFormat,
    ) -> EnqueueResult {
        self.enqueue(
            AssetRequest::new(AssetKind::TextureAtlas, key, texture_url)
                .with_secondary(data)
                .with_options(TaskOptions::Atlas(format)),
        )
    }

    pub fn bitmap_font(
        &mut self,
        key: &str,
        texture_url: impl Into<UrlSource>,
        data: impl Into<UrlSource>,
        x_spacing: f32,
        y_spacing: f32,
    ) -> EnqueueResult {
        self.enqueue(
            AssetRequest::new(AssetKind::BitmapFont, key, texture_url)
                .with_secondary(data)
                .with_options(TaskOptions::BitmapFont {
                    x_spacing,
                    y_spacing,
                }),
        )
    }

    pub fn tilemap(
        &mut self,
        key: &str,
        url: impl Into<UrlSource>,
        format: TilemapFormat,
    ) -> EnqueueResult {
        self.enqueue(
            AssetRequest::new(AssetKind::Tilemap, key, url)
                .with_options(TaskOptions::Tilemap(format)),
        )
    }

    pub fn physics(&mut self, key: &str, url: impl Into<UrlSource>) -> EnqueueResult {
        self.enqueue(AssetRequest::new(AssetKind::Physics, key, url).with_options(
            TaskOptions::Physics(super::task::PhysicsFormat::LimeCorona),
        ))
    }

    pub fn audio(&mut self, key: &str, urls: impl Into<UrlSource>, auto_decode: bool) -> EnqueueResult {
        self.enqueue(
            AssetRequest::new(AssetKind::Audio, key, urls)
                .with_options(TaskOptions::Audio { auto_decode }),
        )
    }

    pub fn audio_sprite(
        &mut self,
        key: &str,
        urls: impl Into<UrlSource>,
        data: impl Into<UrlSource>,
        auto_decode: bool,
    ) -> EnqueueResult {
        self.enqueue(
            AssetRequest::new(AssetKind::AudioSprite, key, urls)
                .with_secondary(data)
                .with_options(TaskOptions::Audio { auto_decode }),
        )
    }

    pub fn video(&mut self, key: &str, urls: impl Into<UrlSource>, as_blob: bool) -> EnqueueResult {
        self.enqueue(
            AssetRequest::new(AssetKind::Video, key, urls)
                .with_options(TaskOptions::Video { as_blob }),
        )
    }

    /// Tags every task enqueued inside `f` as a sync point. Nestable.
    pub fn with_sync_point<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.sync_point_depth += 1;
        let result = f(self);
        self.sync_point_depth -= 1;
        result
    }

    pub fn add_sync_point(&mut self, kind: AssetKind, key: &str) -> bool {
        match self.asset_index(kind, key) {
            Some(index) => {
                self.file_list[index].sync_point = true;
                true
            }
            None => false,
        }
    }

    /// Removes a task that has not started loading.
    pub fn remove_file(&mut self, kind: AssetKind, key: &str) -> bool {
        let Some(index) = self.asset_index(kind, key) else {
            return false;
        };
        if self.file_list[index].state != TaskState::Queued || index < self.processing_head {
            return false;
        }
        self.file_list.remove(index);
        self.total_file_count = self.total_file_count.saturating_sub(1);
        true
    }

    /// Drops every task, including in-flight ones; their completions are
    /// ignored when they arrive.
    pub fn remove_all(&mut self) {
        self.file_list.clear();
        self.flight_queue.clear();
        self.deferred.clear();
        self.processing_head = 0;
        self.total_file_count = 0;
        self.total_pack_count = 0;
        self.loaded_file_count = 0;
        self.loaded_pack_count = 0;
        self.failed_file_count = 0;
        self.generation += 1;
    }

    /// Clears the queue and counters. `hard` also restores the configured
    /// base url and path. No-op while `reset_locked`.
    pub fn reset(&mut self, hard: bool, clear_events: bool) {
        if self.reset_locked {
            return;
        }
        if hard {
            self.base_url = self.config.base_url.clone();
            self.path = self.config.path.clone();
        }
        self.is_loading = false;
        self.file_load_started = false;
        self.stall_deadline_ms = None;
        self.finished = None;
        self.remove_all();
        if clear_events {
            self.on_load_start.remove_all();
            self.on_file_start.remove_all();
            self.on_file_complete.remove_all();
            self.on_file_error.remove_all();
            self.on_pack_complete.remove_all();
            self.on_load_complete.remove_all();
        }
    }

    /// Begins processing the queue. Ignored while a load is running.
    pub fn start(&mut self, now_ms: f64) {
        if self.is_loading {
            return;
        }
        self.has_loaded = false;
        self.is_loading = true;
        self.finished = None;
        info!(
            files = self.total_file_count,
            packs = self.total_pack_count,
            "loader_start"
        );
        self.process_load_queue(now_ms);
    }

    /// Applies completed fetches, advancing the queue after each one.
    pub fn pump(&mut self, cache: &mut Cache, now_ms: f64) {
        let mut completions: Vec<FetchCompletion> = self.deferred.drain(..).collect();
        completions.extend(self.fetcher.poll());
        for completion in completions {
            if self.apply_completion(completion, cache) {
                self.process_load_queue(now_ms);
            }
        }

        if let Some(deadline) = self.stall_deadline_ms {
            if self.is_loading && now_ms >= deadline {
                warn!(
                    processing_head = self.processing_head,
                    files = self.file_list.len(),
                    "loader_stall_forced_complete"
                );
                self.finish_loading(true);
            }
        }
    }

    fn new_task(
        &mut self,
        kind: AssetKind,
        key: String,
        url: UrlSource,
        secondary: Option<UrlSource>,
        options: TaskOptions,
        path: String,
    ) -> LoadTask {
        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        LoadTask {
            id,
            seq,
            kind,
            key,
            url,
            secondary,
            path,
            options,
            sync_point: self.sync_point_depth > 0,
            state: TaskState::Queued,
            error: None,
            request_url: None,
            primary_bytes: None,
            pack_data: None,
        }
    }

    fn index_of(&self, id: TaskId) -> Option<usize> {
        self.file_list.iter().position(|task| task.id == id)
    }

    fn process_load_queue(&mut self, now_ms: f64) {
        if !self.is_loading {
            return;
        }
        self.drain_flight_queue();

        let limit = self.config.inflight_limit();
        // Lowest enqueue sequence among unresolved sync points seen this pass.
        // Keyed on enqueue order, not list index: expanded pack entries are
        // spliced in ahead of later tasks and are only gated by sync points
        // enqueued before them.
        let mut barrier: Option<u64> = None;
        let mut index = self.processing_head;
        while index < self.file_list.len() {
            if index == self.processing_head
                && self.file_list[index].kind == AssetKind::Pack
                && self.file_list[index].state == TaskState::Loaded
            {
                self.expand_pack(index);
            }

            let task = &self.file_list[index];
            if task.is_resolved() {
                if index == self.processing_head {
                    self.processing_head = index + 1;
                }
            } else if !task.is_loading() && self.flight_queue.len() < limit {
                if task.kind == AssetKind::Pack {
                    self.dispatch(index);
                } else if barrier.map_or(true, |seq| task.seq < seq) {
                    if !self.file_load_started {
                        self.file_load_started = true;
                        self.on_load_start.dispatch(&());
                    }
                    self.dispatch(index);
                    let event = FileStart {
                        progress: self.progress(),
                        key: self.file_list[index].key.clone(),
                        url: self.file_list[index].display_url(),
                    };
                    self.on_file_start.dispatch(&event);
                }
            }

            let task = &self.file_list[index];
            if !task.is_resolved() && task.sync_point {
                barrier = Some(barrier.map_or(task.seq, |seq| seq.min(task.seq)));
            }
            if self.flight_queue.len() >= limit
                || (barrier.is_some() && self.loaded_pack_count == self.total_pack_count)
            {
                break;
            }
            index += 1;
        }

        if self.processing_head >= self.file_list.len() {
            self.finish_loading(false);
        } else if self.flight_queue.is_empty() {
            if self.stall_deadline_ms.is_none() {
                warn!(
                    processing_head = self.processing_head,
                    files = self.file_list.len(),
                    "loader_stalled"
                );
                self.stall_deadline_ms = Some(now_ms + self.config.stall_grace_ms);
            }
        } else {
            self.stall_deadline_ms = None;
        }
    }

    fn drain_flight_queue(&mut self) {
        let mut position = 0;
        while position < self.flight_queue.len() {
            let id = self.flight_queue[position];
            let Some(index) = self.index_of(id) else {
                self.flight_queue.remove(position);
                continue;
            };
            if !self.file_list[index].is_resolved() {
                position += 1;
                continue;
            }
            self.flight_queue.remove(position);

            let task = &self.file_list[index];
            let (kind, key, errored) = (task.kind, task.key.clone(), task.is_errored());
            if errored {
                let event = FileError {
                    kind,
                    key: key.clone(),
                    message: task.error.clone().unwrap_or_default(),
                };
                self.on_file_error.dispatch(&event);
            }

            if kind != AssetKind::Pack {
                self.loaded_file_count += 1;
                if errored {
                    self.failed_file_count += 1;
                }
                let event = FileComplete {
                    progress: self.progress(),
                    key,
                    success: !errored,
                    loaded: self.loaded_file_count,
                    total: self.total_file_count,
                };
                self.on_file_complete.dispatch(&event);
            } else if errored {
                self.loaded_pack_count += 1;
                let event = PackComplete {
                    key,
                    success: false,
                    loaded: self.loaded_pack_count,
                    total: self.total_pack_count,
                };
                self.on_pack_complete.dispatch(&event);
            }
        }
    }

    fn expand_pack(&mut self, index: usize) {
        let (key, path, data) = {
            let task = &mut self.file_list[index];
            (task.key.clone(), task.path.clone(), task.pack_data.take())
        };
        match data.as_ref().map(|data| pack_requests(&key, data)) {
            Some(Ok(requests)) => {
                debug!(pack = %key, entries = requests.len(), "loader_pack_expanded");
                for request in requests {
                    let request = match request.path {
                        Some(_) => request,
                        None => request.with_path(path.clone()),
                    };
                    self.enqueue(request);
                }
            }
            Some(Err(error)) => warn!(pack = %key, error = %error, "loader_pack_invalid"),
            None => warn!(pack = %key, "loader_pack_without_data"),
        }

        self.loaded_pack_count += 1;
        let event = PackComplete {
            key,
            success: true,
            loaded: self.loaded_pack_count,
            total: self.total_pack_count,
        };
        self.on_pack_complete.dispatch(&event);
    }

    fn dispatch(&mut self, index: usize) {
        let generation = self.generation;
        let candidates_allowed = match self.file_list[index].kind {
            AssetKind::Video => self.config.video_extensions.clone(),
            _ => self.config.audio_extensions.clone(),
        };
        let task = &mut self.file_list[index];
        task.state = TaskState::Loading;
        let ticket = FetchTicket {
            task: task.id,
            generation,
            part: FetchPart::Primary,
        };
        self.flight_queue.push(task.id);

        let target = match &task.url {
            UrlSource::Single(url) => Ok(resolve_url(&self.base_url, &task.path, url)),
            UrlSource::Candidates(candidates) => {
                match pick_supported_url(candidates, &candidates_allowed) {
                    Some(url) => Ok(resolve_url(&self.base_url, &task.path, url)),
                    None => Err(FetchError::NoSupportedUrl {
                        candidates: candidates.clone(),
                    }),
                }
            }
            UrlSource::Inline(data) => {
                let result = data.to_bytes().map_err(FetchError::Inline);
                self.deferred.push_back(FetchCompletion { ticket, result });
                return;
            }
            UrlSource::Default => Err(FetchError::Failed {
                url: task.key.clone(),
                message: "no url".to_string(),
            }),
        };

        match target {
            Ok(url) => {
                debug!(kind = task.kind.as_str(), key = %task.key, url = %url, "loader_file_dispatched");
                task.request_url = Some(url.clone());
                self.fetcher.begin(ticket, &url);
            }
            Err(error) => self.deferred.push_back(FetchCompletion {
                ticket,
                result: Err(error),
            }),
        }
    }

    fn dispatch_secondary(&mut self, index: usize) {
        let ticket = FetchTicket {
            task: self.file_list[index].id,
            generation: self.generation,
            part: FetchPart::Secondary,
        };
        let task = &self.file_list[index];
        match &task.secondary {
            Some(UrlSource::Single(url)) => {
                let url = resolve_url(&self.base_url, &task.path, url);
                self.fetcher.begin(ticket, &url);
            }
            Some(UrlSource::Inline(data)) => {
                let result = data.to_bytes().map_err(FetchError::Inline);
                self.deferred.push_back(FetchCompletion { ticket, result });
            }
            _ => self.deferred.push_back(FetchCompletion {
                ticket,
                result: Err(FetchError::Failed {
                    url: task.key.clone(),
                    message: "no data url".to_string(),
                }),
            }),
        }
    }

    /// Returns true when the completion resolved a task.
    fn apply_completion(&mut self, completion: FetchCompletion, cache: &mut Cache) -> bool {
        let FetchCompletion { ticket, result } = completion;
        if ticket.generation != self.generation {
            debug!(task = ?ticket.task, "loader_late_completion_ignored");
            return false;
        }
        let Some(index) = self.index_of(ticket.task) else {
            debug!(task = ?ticket.task, "loader_late_completion_ignored");
            return false;
        };
        if self.file_list[index].state != TaskState::Loading {
            return false;
        }

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(error) => {
                self.fail(index, error.to_string());
                return true;
            }
        };

        let task = &mut self.file_list[index];
        if task.kind == AssetKind::Pack {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => {
                    task.pack_data = Some(value);
                    task.state = TaskState::Loaded;
                }
                Err(error) => self.fail(index, error.to_string()),
            }
            return true;
        }

        match ticket.part {
            FetchPart::Primary if task.secondary.is_some() => {
                task.primary_bytes = Some(bytes);
                self.dispatch_secondary(index);
                false
            }
            FetchPart::Primary => {
                self.complete(index, bytes, None, cache);
                true
            }
            FetchPart::Secondary => {
                let primary = task.primary_bytes.take().unwrap_or_default();
                self.complete(index, primary, Some(bytes), cache);
                true
            }
        }
    }

    fn complete(&mut self, index: usize, primary: Vec<u8>, secondary: Option<Vec<u8>>, cache: &mut Cache) {
        match self.decoder.parse(&self.file_list[index], primary, secondary) {
            Ok(record) => {
                let task = &mut self.file_list[index];
                task.state = TaskState::Loaded;
                debug!(kind = task.kind.as_str(), key = %task.key, "loader_file_loaded");
                cache.add(&task.key, task.request_url.clone(), record);
            }
            Err(error) => self.fail(index, error.to_string()),
        }
    }

    fn fail(&mut self, index: usize, message: String) {
        let task = &mut self.file_list[index];
        warn!(
            kind = task.kind.as_str(),
            key = %task.key,
            url = %task.display_url(),
            error = %message,
            "loader_file_failed"
        );
        task.state = TaskState::Failed;
        task.primary_bytes = None;
        task.error = Some(message);
    }

    fn finish_loading(&mut self, forced: bool) {
        if self.has_loaded {
            return;
        }
        self.has_loaded = true;
        self.is_loading = false;
        self.stall_deadline_ms = None;
        if !forced && !self.file_load_started {
            self.file_load_started = true;
            self.on_load_start.dispatch(&());
        }

        let summary = LoadSummary {
            files_total: self.total_file_count,
            files_loaded: self.loaded_file_count,
            files_failed: self.failed_file_count,
            packs_total: self.total_pack_count,
            packs_loaded: self.loaded_pack_count,
            forced,
        };
        info!(
            files_total = summary.files_total,
            files_failed = summary.files_failed,
            packs_total = summary.packs_total,
            forced,
            "loader_complete"
        );
        self.on_load_complete.dispatch(&summary);
        self.reset(false, false);
        // Set after the reset so the summary belongs to this load only.
        self.finished = Some(summary);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::loader::fetch::MemoryFetcher;

    fn loader_with(config: LoaderConfig) -> (Loader, MemoryFetcher) {
        let fetcher = MemoryFetcher::new();
        let loader = Loader::new(config, Box::new(fetcher.clone()));
        (loader, fetcher)
    }

    fn loader() -> (Loader, MemoryFetcher) {
        loader_with(LoaderConfig::default())
    }

    fn record<T: Clone + 'static>(signal: &mut Signal<T>) -> Rc<RefCell<Vec<T>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        signal.add(move |event: &T| sink.borrow_mut().push(event.clone()));
        log
    }

    fn pump_until_idle(loader: &mut Loader, cache: &mut Cache) {
        for _ in 0..16 {
            loader.pump(cache, 0.0);
            if !loader.is_loading() {
                return;
            }
        }
    }

    #[test]
    fn empty_key_and_missing_url_are_rejected() {
        let (mut loader, _) = loader();
        assert_eq!(loader.image("", "a.png"), EnqueueResult::Rejected);
        assert_eq!(
            loader.audio("music", UrlSource::Default, true),
            EnqueueResult::Rejected
        );
        assert_eq!(
            loader.audio("music", Vec::<String>::new(), true),
            EnqueueResult::Rejected
        );
        assert_eq!(loader.total_file_count(), 0);
    }

    #[test]
    fn default_url_uses_key_and_extension() {
        let (mut loader, _) = loader();
        loader.set_path("levels/");
        loader.json("one", UrlSource::Default);
        let task = loader.asset(AssetKind::Json, "one").expect("task");
        assert_eq!(task.url(), &UrlSource::Single("one.json".to_string()));
        assert_eq!(task.path(), "levels/");
    }

    #[test]
    fn overwrite_replaces_queued_task_in_place() {
        let (mut loader, _) = loader();
        loader.image("hero", "old.png");
        loader.image("enemy", "enemy.png");
        assert_eq!(loader.image("hero", "other.png"), EnqueueResult::Duplicate);

        let replaced = loader.replace(AssetRequest::new(AssetKind::Image, "hero", "new.png"));
        assert!(matches!(replaced, EnqueueResult::Replaced(_)));
        assert_eq!(loader.tasks().len(), 2);
        assert_eq!(loader.tasks()[0].url(), &UrlSource::Single("new.png".to_string()));
        assert_eq!(loader.total_file_count(), 2);
    }

    #[test]
    fn duplicate_of_loading_task_is_appended() {
        let (mut loader, fetcher) = loader();
        fetcher.insert("a.png", Vec::new());
        fetcher.hold("a.png");
        loader.text("a", "a.png");
        loader.start(0.0);

        let appended = loader.text("a", "a.png");
        assert!(matches!(appended, EnqueueResult::Queued(_)));
        assert_eq!(loader.tasks().len(), 2);
        assert_eq!(loader.asset_index(AssetKind::Text, "a"), Some(1));
    }

    #[test]
    fn sync_point_blocks_later_ordinary_tasks() {
        let (mut loader, fetcher) = loader();
        fetcher.insert("a.txt", b"a".to_vec());
        fetcher.insert("b.txt", b"b".to_vec());
        fetcher.hold("a.txt");
        let mut cache = Cache::new();

        loader.with_sync_point(|loader| loader.text("a", "a.txt"));
        loader.text("b", "b.txt");
        loader.start(0.0);

        assert_eq!(fetcher.requested(), vec!["a.txt".to_string()]);
        loader.pump(&mut cache, 0.0);
        assert_eq!(fetcher.requested(), vec!["a.txt".to_string()]);
        assert!(!loader.tasks()[1].is_loading());

        fetcher.release("a.txt");
        loader.pump(&mut cache, 0.0);
        assert_eq!(
            fetcher.requested(),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
        pump_until_idle(&mut loader, &mut cache);
        assert_eq!(cache.text("b"), Some("b"));
    }

    #[test]
    fn errored_sync_point_still_unblocks() {
        let (mut loader, fetcher) = loader();
        fetcher.insert_failure("a.txt", "404");
        fetcher.insert("b.txt", b"b".to_vec());
        let mut cache = Cache::new();
        let errors = record(&mut loader.on_file_error);
        let completes = record(&mut loader.on_file_complete);

        loader.with_sync_point(|loader| loader.text("a", "a.txt"));
        loader.text("b", "b.txt");
        loader.start(0.0);
        pump_until_idle(&mut loader, &mut cache);

        assert_eq!(errors.borrow().len(), 1);
        assert_eq!(errors.borrow()[0].key, "a");
        let completes = completes.borrow();
        assert_eq!(completes.len(), 2);
        assert!(!completes[0].success);
        assert!(completes[1].success);
        assert_eq!(completes[1].progress, 100);
        assert_eq!(cache.text("b"), Some("b"));
    }

    #[test]
    fn parallel_limit_bounds_in_flight() {
        let config = LoaderConfig {
            max_parallel_downloads: 2,
            ..LoaderConfig::default()
        };
        let (mut loader, fetcher) = loader_with(config);
        for key in ["a", "b", "c", "d"] {
            let url = format!("{key}.txt");
            fetcher.insert(&url, key.as_bytes().to_vec());
            fetcher.hold(&url);
            loader.text(key, url.as_str());
        }
        loader.start(0.0);
        assert_eq!(loader.in_flight().len(), 2);

        let serial = LoaderConfig {
            enable_parallel: false,
            max_parallel_downloads: 8,
            ..LoaderConfig::default()
        };
        assert_eq!(serial.inflight_limit(), 1);
        let clamped = LoaderConfig {
            max_parallel_downloads: 40,
            ..LoaderConfig::default()
        };
        assert_eq!(clamped.inflight_limit(), MAX_PARALLEL_DOWNLOADS_CAP);
    }

    #[test]
    fn pack_and_image_load_end_to_end() {
        let (mut loader, fetcher) = loader();
        fetcher.insert("a.png", b"a".to_vec());
        fetcher.insert(
            "p.json",
            serde_json::to_vec(&json!({ "p": [{ "type": "text", "key": "b", "url": "b.txt" }] }))
                .expect("pack json"),
        );
        fetcher.insert("b.txt", b"b".to_vec());
        let mut cache = Cache::new();
        let files = record(&mut loader.on_file_complete);
        let packs = record(&mut loader.on_pack_complete);
        let done = record(&mut loader.on_load_complete);

        loader.text("a", "a.png");
        loader.pack("p", PackSource::Url("p.json".to_string()));
        loader.start(0.0);

        let mut concurrent = fetcher.in_flight();
        concurrent.sort();
        assert_eq!(concurrent, vec!["a.png".to_string(), "p.json".to_string()]);

        pump_until_idle(&mut loader, &mut cache);

        assert_eq!(
            fetcher.requested(),
            vec!["p.json".to_string(), "a.png".to_string(), "b.txt".to_string()]
        );
        assert_eq!(done.borrow().len(), 1);
        let summary = done.borrow()[0];
        assert_eq!(summary.files_total, 2);
        assert_eq!(summary.packs_total, 1);
        assert!(!summary.forced);
        assert_eq!(files.borrow().last().map(|event| event.total), Some(2));
        assert_eq!(packs.borrow().len(), 1);
        assert!(packs.borrow()[0].success);
        assert_eq!(cache.text("a"), Some("a"));
        assert_eq!(cache.text("b"), Some("b"));
    }

    #[test]
    fn packs_are_inserted_before_queued_files_in_order() {
        let (mut loader, _) = loader();
        loader.text("a", "a.txt");
        loader.pack("p1", PackSource::Url("p1.json".to_string()));
        loader.pack("p2", PackSource::Inline(json!({ "p2": [] })));
        let keys: Vec<&str> = loader.tasks().iter().map(LoadTask::key).collect();
        assert_eq!(keys, vec!["p1", "p2", "a"]);
        assert!(loader.tasks()[1].is_loaded());
        assert_eq!(loader.total_queued_packs(), 2);
    }

    #[test]
    fn failed_pack_counts_as_complete_and_is_not_expanded() {
        let (mut loader, fetcher) = loader();
        fetcher.insert("p.json", b"not json".to_vec());
        let mut cache = Cache::new();
        let packs = record(&mut loader.on_pack_complete);
        let done = record(&mut loader.on_load_complete);

        loader.pack("p", PackSource::Url("p.json".to_string()));
        loader.start(0.0);
        pump_until_idle(&mut loader, &mut cache);

        assert_eq!(packs.borrow().len(), 1);
        assert!(!packs.borrow()[0].success);
        assert_eq!(done.borrow().len(), 1);
        assert_eq!(done.borrow()[0].files_total, 0);
    }

    #[test]
    fn inline_pack_text_must_parse() {
        let (mut loader, _) = loader();
        assert_eq!(
            loader.pack("p", PackSource::InlineText("{".to_string())),
            EnqueueResult::Rejected
        );
        assert!(loader
            .pack("p", PackSource::InlineText(r#"{"p":[]}"#.to_string()))
            .task_id()
            .is_some());
    }

    #[test]
    fn empty_queue_completes_and_fires_start_once() {
        let (mut loader, _) = loader();
        let starts = record(&mut loader.on_load_start);
        let done = record(&mut loader.on_load_complete);
        loader.start(0.0);
        assert_eq!(starts.borrow().len(), 1);
        assert_eq!(done.borrow().len(), 1);
        assert!(loader.has_loaded());
        assert!(!loader.is_loading());
        assert!(loader.take_finished().is_some());
        assert!(loader.take_finished().is_none());
    }

    #[test]
    fn untaken_summary_does_not_outlive_the_next_reset_or_start() {
        let (mut loader, fetcher) = loader();
        let mut cache = Cache::new();
        loader.start(0.0);
        loader.reset(true, false);
        assert!(loader.take_finished().is_none());

        loader.start(0.0);
        fetcher.hold("held.txt");
        loader.text("held", "held.txt");
        loader.start(16.0);
        loader.pump(&mut cache, 32.0);
        assert!(loader.is_loading());
        assert!(loader.take_finished().is_none());
    }

    #[test]
    fn completion_is_deferred_to_pump() {
        let (mut loader, fetcher) = loader();
        fetcher.insert("a.txt", b"a".to_vec());
        let mut cache = Cache::new();
        loader.tilemap(
            "inline",
            UrlSource::Inline(InlineData::Text("1,2".to_string())),
            TilemapFormat::Csv,
        );
        loader.text("a", "a.txt");
        loader.start(0.0);

        assert!(cache.is_empty());
        assert!(loader.is_loading());
        loader.pump(&mut cache, 0.0);
        assert!(cache.tilemap("inline").is_some());
        assert_eq!(cache.text("a"), Some("a"));
    }

    #[test]
    fn reset_clears_queue_and_respects_lock() {
        let (mut loader, fetcher) = loader();
        fetcher.insert("a.txt", b"a".to_vec());
        let mut cache = Cache::new();
        loader.text("a", "a.txt");
        loader.start(0.0);
        pump_until_idle(&mut loader, &mut cache);

        loader.reset(false, false);
        assert!(loader.tasks().is_empty());
        assert_eq!(loader.total_loaded_files(), 0);
        assert!(!loader.is_loading());

        loader.text("b", "b.txt");
        loader.reset_locked = true;
        loader.reset(true, true);
        assert_eq!(loader.tasks().len(), 1);
    }

    #[test]
    fn late_completions_after_reset_are_ignored() {
        let (mut loader, fetcher) = loader();
        fetcher.insert("a.txt", b"a".to_vec());
        fetcher.hold("a.txt");
        let mut cache = Cache::new();
        let files = record(&mut loader.on_file_complete);
        loader.text("a", "a.txt");
        loader.start(0.0);

        loader.reset(false, false);
        fetcher.release("a.txt");
        loader.pump(&mut cache, 0.0);

        assert!(files.borrow().is_empty());
        assert!(cache.text("a").is_none());
    }

    #[test]
    fn audio_picks_first_supported_candidate() {
        let (mut loader, fetcher) = loader();
        fetcher.insert("sfx/jump.ogg", vec![1]);
        let mut cache = Cache::new();
        loader.set_path("sfx/");
        loader.audio(
            "jump",
            vec!["jump.aac".to_string(), "jump.ogg".to_string()],
            false,
        );
        loader.audio("beep", vec!["beep.flac".to_string()], false);
        let errors = record(&mut loader.on_file_error);
        loader.start(0.0);
        pump_until_idle(&mut loader, &mut cache);

        assert_eq!(fetcher.requested(), vec!["sfx/jump.ogg".to_string()]);
        assert!(cache.check_key(AssetKind::Audio, "jump"));
        assert_eq!(errors.borrow().len(), 1);
        assert_eq!(errors.borrow()[0].key, "beep");
    }

    #[test]
    fn two_part_assets_fetch_data_after_texture() {
        let (mut loader, fetcher) = loader();
        fetcher.insert("font.png", b"png".to_vec());
        fetcher.insert("font.xml", b"<font/>".to_vec());
        fetcher.hold("font.xml");
        let mut cache = Cache::new();
        loader.bitmap_font("font", "font.png", "font.xml", 0.0, 0.0);
        loader.start(0.0);

        assert_eq!(fetcher.requested(), vec!["font.png".to_string()]);
        loader.pump(&mut cache, 0.0);
        assert_eq!(
            fetcher.requested(),
            vec!["font.png".to_string(), "font.xml".to_string()]
        );
        assert!(loader.tasks()[0].is_loading());

        fetcher.release("font.xml");
        pump_until_idle(&mut loader, &mut cache);
        assert!(!loader.is_loading());
    }

    #[test]
    fn progress_is_rounded_and_drops_when_tasks_grow() {
        let (mut loader, fetcher) = loader();
        let mut cache = Cache::new();
        for key in ["a", "b", "c"] {
            let url = format!("{key}.txt");
            fetcher.insert(&url, Vec::new());
            loader.text(key, url.as_str());
        }
        fetcher.hold("b.txt");
        fetcher.hold("c.txt");
        assert_eq!(loader.progress(), 0);
        loader.start(0.0);
        loader.pump(&mut cache, 0.0);
        assert_eq!(loader.progress(), 33);

        loader.text("d", "d.txt");
        assert_eq!(loader.progress(), 25);
    }

    #[test]
    fn remove_file_only_touches_queued_tasks() {
        let (mut loader, fetcher) = loader();
        fetcher.hold("a.txt");
        loader.with_sync_point(|loader| loader.text("a", "a.txt"));
        loader.text("b", "b.txt");
        loader.start(0.0);

        assert!(!loader.remove_file(AssetKind::Text, "a"));
        assert!(loader.remove_file(AssetKind::Text, "b"));
        assert_eq!(loader.total_file_count(), 1);
        assert!(!loader.check_key_exists(AssetKind::Text, "b"));
    }

    #[test]
    fn stall_is_forced_complete_after_grace() {
        let (mut loader, fetcher) = loader();
        fetcher.hold("a.txt");
        let done = record(&mut loader.on_load_complete);
        loader.text("a", "a.txt");
        // Simulate a lost in-flight entry.
        loader.is_loading = true;
        loader.flight_queue.clear();
        loader.process_load_queue(0.0);
        assert_eq!(loader.in_flight().len(), 1);
        loader.flight_queue.clear();
        loader.file_list[0].state = TaskState::Loading;
        loader.process_load_queue(100.0);

        let mut cache = Cache::new();
        loader.pump(&mut cache, 1000.0);
        assert!(done.borrow().is_empty());
        loader.pump(&mut cache, 2200.0);
        assert_eq!(done.borrow().len(), 1);
        assert!(done.borrow()[0].forced);
    }
}
