use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::geom::Rect;
use crate::signal::Signal;

use super::task::{AssetKind, AtlasFormat, PhysicsFormat};

#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlAsset {
    pub root_tag: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtlasData {
    Json(Value),
    Xml(XmlAsset),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FontData {
    Xml(XmlAsset),
    Json(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TilemapData {
    TiledJson(Value),
    Csv(Vec<Vec<i32>>),
}

/// Undecoded media payload; audio and video decoding happen elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub url: String,
    pub bytes: Vec<u8>,
    pub auto_decode: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssetRecord {
    Image(ImageAsset),
    Text(String),
    Json(Value),
    Xml(XmlAsset),
    Script(String),
    Shader(String),
    Binary(Vec<u8>),
    SpriteSheet {
        image: ImageAsset,
        frames: Vec<Rect>,
    },
    TextureAtlas {
        image: ImageAsset,
        format: AtlasFormat,
        data: AtlasData,
    },
    BitmapFont {
        image: ImageAsset,
        data: FontData,
        x_spacing: f32,
        y_spacing: f32,
    },
    Tilemap(TilemapData),
    Physics {
        format: PhysicsFormat,
        data: Value,
    },
    Audio(MediaAsset),
    AudioSprite {
        audio: MediaAsset,
        data: Value,
    },
    Video(MediaAsset),
}

impl AssetRecord {
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetRecord::Image(_) => AssetKind::Image,
            AssetRecord::Text(_) => AssetKind::Text,
            AssetRecord::Json(_) => AssetKind::Json,
            AssetRecord::Xml(_) => AssetKind::Xml,
            AssetRecord::Script(_) => AssetKind::Script,
            AssetRecord::Shader(_) => AssetKind::Shader,
            AssetRecord::Binary(_) => AssetKind::Binary,
            AssetRecord::SpriteSheet { .. } => AssetKind::SpriteSheet,
            AssetRecord::TextureAtlas { .. } => AssetKind::TextureAtlas,
            AssetRecord::BitmapFont { .. } => AssetKind::BitmapFont,
            AssetRecord::Tilemap(_) => AssetKind::Tilemap,
            AssetRecord::Physics { .. } => AssetKind::Physics,
            AssetRecord::Audio(_) => AssetKind::Audio,
            AssetRecord::AudioSprite { .. } => AssetKind::AudioSprite,
            AssetRecord::Video(_) => AssetKind::Video,
        }
    }

    /// Pixel data for anything drawable as a texture.
    pub fn image(&self) -> Option<&ImageAsset> {
        match self {
            AssetRecord::Image(image)
            | AssetRecord::SpriteSheet { image, .. }
            | AssetRecord::TextureAtlas { image, .. }
            | AssetRecord::BitmapFont { image, .. } => Some(image),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub url: Option<String>,
    pub record: AssetRecord,
}

type CacheKey = (AssetKind, String);

/// Decoded assets keyed by kind and key. Written by loader completions, read
/// by everything else.
#[derive(Debug, Default)]
pub struct Cache {
    entries: HashMap<CacheKey, CacheEntry>,
    required: BTreeSet<CacheKey>,
    ready: bool,
    pub on_ready: Signal<()>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, url: Option<String>, record: AssetRecord) {
        let cache_key = (record.kind(), key.to_string());
        debug!(kind = cache_key.0.as_str(), key, "cache_add");
        self.required.remove(&cache_key);
        self.entries.insert(cache_key, CacheEntry { url, record });
        self.check_ready();
    }

    pub fn get(&self, kind: AssetKind, key: &str) -> Option<&CacheEntry> {
        self.entries.get(&(kind, key.to_string()))
    }

    pub fn check_key(&self, kind: AssetKind, key: &str) -> bool {
        self.get(kind, key).is_some()
    }

    pub fn remove(&mut self, kind: AssetKind, key: &str) -> Option<CacheEntry> {
        self.entries.remove(&(kind, key.to_string()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self, kind: AssetKind) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .entries
            .keys()
            .filter(|(entry_kind, _)| *entry_kind == kind)
            .map(|(_, key)| key.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Registers an asset that must be present before the cache reports ready.
    pub fn require(&mut self, kind: AssetKind, key: &str) {
        if self.check_key(kind, key) {
            return;
        }
        self.required.insert((kind, key.to_string()));
        self.ready = false;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn check_ready(&mut self) {
        if self.ready || !self.required.is_empty() {
            return;
        }
        self.ready = true;
        self.on_ready.dispatch(&());
    }

    pub fn image(&self, key: &str) -> Option<&ImageAsset> {
        match &self.get(AssetKind::Image, key)?.record {
            AssetRecord::Image(image) => Some(image),
            _ => None,
        }
    }

    /// Any texture-bearing record under `key`, checking images first.
    pub fn texture(&self, key: &str) -> Option<&ImageAsset> {
        [
            AssetKind::Image,
            AssetKind::SpriteSheet,
            AssetKind::TextureAtlas,
            AssetKind::BitmapFont,
        ]
        .into_iter()
        .find_map(|kind| self.get(kind, key).and_then(|entry| entry.record.image()))
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match &self.get(AssetKind::Text, key)?.record {
            AssetRecord::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn json(&self, key: &str) -> Option<&Value> {
        match &self.get(AssetKind::Json, key)?.record {
            AssetRecord::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn xml(&self, key: &str) -> Option<&XmlAsset> {
        match &self.get(AssetKind::Xml, key)?.record {
            AssetRecord::Xml(xml) => Some(xml),
            _ => None,
        }
    }

    pub fn binary(&self, key: &str) -> Option<&[u8]> {
        match &self.get(AssetKind::Binary, key)?.record {
            AssetRecord::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn tilemap(&self, key: &str) -> Option<&TilemapData> {
        match &self.get(AssetKind::Tilemap, key)?.record {
            AssetRecord::Tilemap(data) => Some(data),
            _ => None,
        }
    }

    pub fn sprite_frames(&self, key: &str) -> Option<&[Rect]> {
        match &self.get(AssetKind::SpriteSheet, key)?.record {
            AssetRecord::SpriteSheet { frames, .. } => Some(frames),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn typed_getters_match_kind() {
        let mut cache = Cache::new();
        cache.add("greeting", None, AssetRecord::Text("hi".to_string()));
        cache.add("level", Some("level.json".to_string()), AssetRecord::Json(Value::Null));

        assert_eq!(cache.text("greeting"), Some("hi"));
        assert!(cache.json("greeting").is_none());
        assert!(cache.check_key(AssetKind::Json, "level"));
        assert_eq!(
            cache.get(AssetKind::Json, "level").and_then(|e| e.url.as_deref()),
            Some("level.json")
        );
        assert_eq!(cache.keys(AssetKind::Text), vec!["greeting"]);
    }

    #[test]
    fn ready_waits_for_required_assets() {
        let fired = Rc::new(Cell::new(0));
        let mut cache = Cache::new();
        let counter = Rc::clone(&fired);
        cache.on_ready.add(move |_| counter.set(counter.get() + 1));
        cache.require(AssetKind::Text, "a");
        cache.require(AssetKind::Text, "b");

        cache.add("a", None, AssetRecord::Text(String::new()));
        assert!(!cache.is_ready());
        cache.add("b", None, AssetRecord::Text(String::new()));
        assert!(cache.is_ready());
        cache.add("c", None, AssetRecord::Text(String::new()));

        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn texture_lookup_finds_sheet_images() {
        let image = ImageAsset {
            width: 1,
            height: 1,
            rgba: vec![255; 4],
        };
        let mut cache = Cache::new();
        cache.add(
            "hero",
            None,
            AssetRecord::SpriteSheet {
                image: image.clone(),
                frames: vec![Rect::new(0.0, 0.0, 1.0, 1.0)],
            },
        );
        assert_eq!(cache.texture("hero"), Some(&image));
        assert!(cache.image("hero").is_none());
        assert_eq!(cache.sprite_frames("hero").map(<[Rect]>::len), Some(1));
    }
}
