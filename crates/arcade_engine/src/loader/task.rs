use serde_json::Value;

use crate::geom::Rect;

use super::decode::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Image,
    Text,
    Json,
    Xml,
    Script,
    Binary,
    Shader,
    SpriteSheet,
    TextureAtlas,
    BitmapFont,
    Tilemap,
    Physics,
    Audio,
    AudioSprite,
    Video,
    Pack,
}

impl AssetKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Text => "text",
            AssetKind::Json => "json",
            AssetKind::Xml => "xml",
            AssetKind::Script => "script",
            AssetKind::Binary => "binary",
            AssetKind::Shader => "shader",
            AssetKind::SpriteSheet => "spritesheet",
            AssetKind::TextureAtlas => "textureatlas",
            AssetKind::BitmapFont => "bitmapfont",
            AssetKind::Tilemap => "tilemap",
            AssetKind::Physics => "physics",
            AssetKind::Audio => "audio",
            AssetKind::AudioSprite => "audiosprite",
            AssetKind::Video => "video",
            AssetKind::Pack => "pack",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPart {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InlineData {
    Json(Value),
    Text(String),
}

impl InlineData {
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            InlineData::Json(value) => serde_json::to_vec(value),
            InlineData::Text(text) => Ok(text.clone().into_bytes()),
        }
    }
}

/// Where a task's bytes come from. Decided once when the task is enqueued.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum UrlSource {
    /// Derive `key + default extension` for the asset kind.
    #[default]
    Default,
    Single(String),
    /// Audio/video alternatives; the first with a supported extension wins.
    Candidates(Vec<String>),
    Inline(InlineData),
}

impl From<&str> for UrlSource {
    fn from(url: &str) -> Self {
        UrlSource::Single(url.to_string())
    }
}

impl From<String> for UrlSource {
    fn from(url: String) -> Self {
        UrlSource::Single(url)
    }
}

impl From<Vec<String>> for UrlSource {
    fn from(urls: Vec<String>) -> Self {
        UrlSource::Candidates(urls)
    }
}

impl From<Option<&str>> for UrlSource {
    fn from(url: Option<&str>) -> Self {
        url.map_or(UrlSource::Default, UrlSource::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtlasFormat {
    JsonArray,
    JsonHash,
    Xml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilemapFormat {
    Csv,
    TiledJson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsFormat {
    LimeCorona,
}

/// Grid layout of a sprite sheet. Non-positive frame sizes divide the image
/// (`-2` means half the image width).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteSheetLayout {
    pub frame_width: i32,
    pub frame_height: i32,
    pub frame_max: i32,
    pub margin: u32,
    pub spacing: u32,
    pub skip_frames: i32,
}

impl SpriteSheetLayout {
    pub fn new(frame_width: i32, frame_height: i32) -> Self {
        Self {
            frame_width,
            frame_height,
            frame_max: -1,
            margin: 0,
            spacing: 0,
            skip_frames: 0,
        }
    }

    pub fn frames(&self, image_width: u32, image_height: u32) -> Result<Vec<Rect>, DecodeError> {
        let frame_width = resolve_frame_extent(self.frame_width, image_width);
        let frame_height = resolve_frame_extent(self.frame_height, image_height);
        if frame_width == 0 || frame_height == 0 || image_width == 0 || image_height == 0 {
            return Err(DecodeError::SpriteSheet(format!(
                "frame {frame_width}x{frame_height} does not fit image {image_width}x{image_height}"
            )));
        }

        let margin = self.margin as i64;
        let spacing = self.spacing as i64;
        let columns = (image_width as i64 - margin + spacing) / (frame_width as i64 + spacing);
        let rows = (image_height as i64 - margin + spacing) / (frame_height as i64 + spacing);
        let mut total = (columns * rows).max(0);

        let mut skip = self.skip_frames as i64;
        if skip > total || skip < -total {
            return Err(DecodeError::SpriteSheet(format!(
                "skip_frames {skip} out of range for {total} frames"
            )));
        }
        if skip < 0 {
            skip += total;
        }
        if self.frame_max >= 0 {
            total = total.min(skip + self.frame_max as i64);
        }
        if total == 0 {
            return Err(DecodeError::SpriteSheet("sheet contains no frames".to_string()));
        }

        let mut frames = Vec::with_capacity((total - skip).max(0) as usize);
        let (mut x, mut y) = (margin, margin);
        for index in 0..total {
            if index >= skip {
                frames.push(Rect::new(
                    x as f32,
                    y as f32,
                    frame_width as f32,
                    frame_height as f32,
                ));
            }
            x += frame_width as i64 + spacing;
            if x + frame_width as i64 > image_width as i64 {
                x = margin;
                y += frame_height as i64 + spacing;
            }
        }
        Ok(frames)
    }
}

fn resolve_frame_extent(requested: i32, image_extent: u32) -> u32 {
    if requested > 0 {
        requested as u32
    } else {
        let divisor = requested.unsigned_abs().max(1);
        image_extent / divisor
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum TaskOptions {
    #[default]
    None,
    SpriteSheet(SpriteSheetLayout),
    Atlas(AtlasFormat),
    BitmapFont {
        x_spacing: f32,
        y_spacing: f32,
    },
    Tilemap(TilemapFormat),
    Physics(PhysicsFormat),
    Audio {
        auto_decode: bool,
    },
    Video {
        as_blob: bool,
    },
}

/// Default extension applied when a key is enqueued without a url.
pub(crate) fn default_extension(kind: AssetKind, options: &TaskOptions) -> Option<&'static str> {
    match kind {
        AssetKind::Image | AssetKind::SpriteSheet => Some(".png"),
        AssetKind::Text => Some(".txt"),
        AssetKind::Json | AssetKind::Physics | AssetKind::Pack => Some(".json"),
        AssetKind::Xml => Some(".xml"),
        AssetKind::Script => Some(".js"),
        AssetKind::Binary => Some(".bin"),
        AssetKind::Shader => Some(".frag"),
        AssetKind::Tilemap => match options {
            TaskOptions::Tilemap(TilemapFormat::Csv) => Some(".csv"),
            _ => Some(".json"),
        },
        AssetKind::TextureAtlas
        | AssetKind::BitmapFont
        | AssetKind::Audio
        | AssetKind::AudioSprite
        | AssetKind::Video => None,
    }
}

/// Everything needed to enqueue one asset; built by the typed helpers on
/// `Loader` and by pack expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRequest {
    pub kind: AssetKind,
    pub key: String,
    pub url: UrlSource,
    pub secondary: Option<UrlSource>,
    pub options: TaskOptions,
    pub overwrite: bool,
    pub path: Option<String>,
}

impl AssetRequest {
    pub fn new(kind: AssetKind, key: impl Into<String>, url: impl Into<UrlSource>) -> Self {
        Self {
            kind,
            key: key.into(),
            url: url.into(),
            secondary: None,
            options: TaskOptions::None,
            overwrite: false,
            path: None,
        }
    }

    pub fn with_secondary(mut self, secondary: impl Into<UrlSource>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    pub fn with_options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct LoadTask {
    pub(crate) id: TaskId,
    pub(crate) seq: u64,
    pub(crate) kind: AssetKind,
    pub(crate) key: String,
    pub(crate) url: UrlSource,
    pub(crate) secondary: Option<UrlSource>,
    pub(crate) path: String,
    pub(crate) options: TaskOptions,
    pub(crate) sync_point: bool,
    pub(crate) state: TaskState,
    pub(crate) error: Option<String>,
    pub(crate) request_url: Option<String>,
    pub(crate) primary_bytes: Option<Vec<u8>>,
    pub(crate) pack_data: Option<Value>,
}

impl LoadTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn url(&self) -> &UrlSource {
        &self.url
    }

    pub fn secondary(&self) -> Option<&UrlSource> {
        self.secondary.as_ref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn options(&self) -> &TaskOptions {
        &self.options
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_sync_point(&self) -> bool {
        self.sync_point
    }

    pub fn is_loading(&self) -> bool {
        self.state == TaskState::Loading
    }

    pub fn is_loaded(&self) -> bool {
        self.state == TaskState::Loaded
    }

    pub fn is_errored(&self) -> bool {
        self.state == TaskState::Failed
    }

    /// Loaded or errored; either one unblocks dependents.
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, TaskState::Loaded | TaskState::Failed)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Fully resolved url used for the primary fetch, once dispatched.
    pub fn request_url(&self) -> Option<&str> {
        self.request_url.as_deref()
    }

    pub(crate) fn display_url(&self) -> String {
        if let Some(url) = &self.request_url {
            return url.clone();
        }
        match &self.url {
            UrlSource::Single(url) => url.clone(),
            UrlSource::Candidates(urls) => urls.join(","),
            UrlSource::Inline(_) => "inline".to_string(),
            UrlSource::Default => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spritesheet_counts_frames_with_margin_and_spacing() {
        let mut layout = SpriteSheetLayout::new(16, 16);
        layout.margin = 1;
        layout.spacing = 2;
        let frames = layout.frames(55, 37).expect("frames");
        assert_eq!(frames.len(), 6);
        assert_eq!(frames[0], Rect::new(1.0, 1.0, 16.0, 16.0));
        assert_eq!(frames[1], Rect::new(19.0, 1.0, 16.0, 16.0));
        assert_eq!(frames[3], Rect::new(1.0, 19.0, 16.0, 16.0));
    }

    #[test]
    fn spritesheet_respects_skip_and_max() {
        let mut layout = SpriteSheetLayout::new(10, 10);
        layout.skip_frames = 1;
        layout.frame_max = 2;
        let frames = layout.frames(40, 10).expect("frames");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].x, 10.0);
        assert_eq!(frames[1].x, 20.0);
    }

    #[test]
    fn spritesheet_rejects_oversized_frames() {
        let layout = SpriteSheetLayout::new(64, 64);
        assert!(layout.frames(32, 32).is_err());
    }

    #[test]
    fn negative_frame_size_divides_image() {
        let layout = SpriteSheetLayout::new(-2, -1);
        let frames = layout.frames(40, 10).expect("frames");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], Rect::new(20.0, 0.0, 20.0, 10.0));
    }

    #[test]
    fn tilemap_extension_follows_format() {
        assert_eq!(
            default_extension(AssetKind::Tilemap, &TaskOptions::Tilemap(TilemapFormat::Csv)),
            Some(".csv")
        );
        assert_eq!(
            default_extension(AssetKind::Tilemap, &TaskOptions::None),
            Some(".json")
        );
        assert_eq!(default_extension(AssetKind::Audio, &TaskOptions::None), None);
    }
}
