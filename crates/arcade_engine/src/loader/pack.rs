use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use super::task::{
    AssetKind, AssetRequest, AtlasFormat, InlineData, PhysicsFormat, SpriteSheetLayout,
    TaskOptions, TilemapFormat, UrlSource,
};

#[derive(Debug, Error)]
pub enum PackError {
    #[error("pack text is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("pack {key} has no section named {key}")]
    MissingSection { key: String },
    #[error("pack {key} section is not an array")]
    NotAnArray { key: String },
    #[error("invalid pack entry at {path}: {source}")]
    Entry {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for UrlSource {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(url) => UrlSource::Single(url),
            OneOrMany::Many(urls) => UrlSource::Candidates(urls),
        }
    }
}

fn default_frame_max() -> i32 {
    -1
}

fn default_true() -> bool {
    true
}

/// One descriptor of a pack section. Unknown `type` values deserialize to
/// `Unsupported` and are skipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
enum PackEntry {
    #[serde(rename = "image")]
    Image {
        key: String,
        url: Option<String>,
        #[serde(default)]
        overwrite: bool,
    },
    #[serde(rename = "text")]
    Text {
        key: String,
        url: Option<String>,
        #[serde(default)]
        overwrite: bool,
    },
    #[serde(rename = "json")]
    Json {
        key: String,
        url: Option<String>,
        #[serde(default)]
        overwrite: bool,
    },
    #[serde(rename = "xml")]
    Xml {
        key: String,
        url: Option<String>,
        #[serde(default)]
        overwrite: bool,
    },
    #[serde(rename = "script")]
    Script {
        key: String,
        url: Option<String>,
        #[serde(default)]
        overwrite: bool,
    },
    #[serde(rename = "binary")]
    Binary {
        key: String,
        url: Option<String>,
        #[serde(default)]
        overwrite: bool,
    },
    #[serde(rename = "shader")]
    Shader {
        key: String,
        url: Option<String>,
        #[serde(default)]
        overwrite: bool,
    },
    #[serde(rename = "spritesheet")]
    SpriteSheet {
        key: String,
        url: Option<String>,
        frame_width: i32,
        frame_height: i32,
        #[serde(default = "default_frame_max")]
        frame_max: i32,
        #[serde(default)]
        margin: u32,
        #[serde(default)]
        spacing: u32,
        #[serde(default)]
        skip_frames: i32,
    },
    #[serde(rename = "audio")]
    Audio {
        key: String,
        urls: OneOrMany,
        #[serde(default = "default_true")]
        auto_decode: bool,
    },
    #[serde(rename = "audiosprite")]
    AudioSprite {
        key: String,
        urls: OneOrMany,
        #[serde(rename = "jsonURL")]
        json_url: Option<String>,
        json_data: Option<Value>,
        #[serde(default = "default_true")]
        auto_decode: bool,
    },
    #[serde(rename = "video")]
    Video {
        key: String,
        urls: OneOrMany,
        #[serde(default)]
        as_blob: bool,
    },
    #[serde(rename = "tilemap")]
    Tilemap {
        key: String,
        url: Option<String>,
        data: Option<Value>,
        format: Option<String>,
    },
    #[serde(rename = "physics")]
    Physics {
        key: String,
        url: Option<String>,
        data: Option<Value>,
    },
    #[serde(rename = "bitmapFont")]
    BitmapFont {
        key: String,
        #[serde(rename = "textureURL")]
        texture_url: Option<String>,
        #[serde(rename = "atlasURL")]
        atlas_url: Option<String>,
        atlas_data: Option<Value>,
        #[serde(default)]
        x_spacing: f32,
        #[serde(default)]
        y_spacing: f32,
    },
    #[serde(rename = "atlasJSONArray")]
    AtlasJsonArray {
        key: String,
        #[serde(rename = "textureURL")]
        texture_url: Option<String>,
        #[serde(rename = "atlasURL")]
        atlas_url: Option<String>,
        atlas_data: Option<Value>,
    },
    #[serde(rename = "atlasJSONHash")]
    AtlasJsonHash {
        key: String,
        #[serde(rename = "textureURL")]
        texture_url: Option<String>,
        #[serde(rename = "atlasURL")]
        atlas_url: Option<String>,
        atlas_data: Option<Value>,
    },
    #[serde(rename = "atlasXML")]
    AtlasXml {
        key: String,
        #[serde(rename = "textureURL")]
        texture_url: Option<String>,
        #[serde(rename = "atlasURL")]
        atlas_url: Option<String>,
        atlas_data: Option<Value>,
    },
    #[serde(other)]
    Unsupported,
}

fn url_or_default(url: Option<String>) -> UrlSource {
    url.map_or(UrlSource::Default, UrlSource::Single)
}

fn data_or_url(data: Option<Value>, url: Option<String>) -> UrlSource {
    match data {
        Some(Value::String(text)) => UrlSource::Inline(InlineData::Text(text)),
        Some(value) => UrlSource::Inline(InlineData::Json(value)),
        None => url_or_default(url),
    }
}

fn atlas_request(
    key: String,
    format: AtlasFormat,
    texture_url: Option<String>,
    atlas_url: Option<String>,
    atlas_data: Option<Value>,
) -> AssetRequest {
    let texture = texture_url.unwrap_or_else(|| format!("{key}.png"));
    let secondary = match atlas_data {
        Some(_) => data_or_url(atlas_data, None),
        None => UrlSource::Single(atlas_url.unwrap_or_else(|| match format {
            AtlasFormat::Xml => format!("{key}.xml"),
            AtlasFormat::JsonArray | AtlasFormat::JsonHash => format!("{key}.json"),
        })),
    };
    AssetRequest::new(AssetKind::TextureAtlas, key, texture)
        .with_secondary(secondary)
        .with_options(TaskOptions::Atlas(format))
}

impl PackEntry {
    fn into_request(self) -> Option<AssetRequest> {
        let simple = |kind: AssetKind, key: String, url: Option<String>, overwrite: bool| {
            AssetRequest::new(kind, key, url_or_default(url)).with_overwrite(overwrite)
        };
        let request = match self {
            PackEntry::Image {
                key,
                url,
                overwrite,
            } => simple(AssetKind::Image, key, url, overwrite),
            PackEntry::Text {
                key,
                url,
                overwrite,
            } => simple(AssetKind::Text, key, url, overwrite),
            PackEntry::Json {
                key,
                url,
                overwrite,
            } => simple(AssetKind::Json, key, url, overwrite),
            PackEntry::Xml {
                key,
                url,
                overwrite,
            } => simple(AssetKind::Xml, key, url, overwrite),
            PackEntry::Script {
                key,
                url,
                overwrite,
            } => simple(AssetKind::Script, key, url, overwrite),
            PackEntry::Binary {
                key,
                url,
                overwrite,
            } => simple(AssetKind::Binary, key, url, overwrite),
            PackEntry::Shader {
                key,
                url,
                overwrite,
            } => simple(AssetKind::Shader, key, url, overwrite),
            PackEntry::SpriteSheet {
                key,
                url,
                frame_width,
                frame_height,
                frame_max,
                margin,
                spacing,
                skip_frames,
            } => AssetRequest::new(AssetKind::SpriteSheet, key, url_or_default(url)).with_options(
                TaskOptions::SpriteSheet(SpriteSheetLayout {
                    frame_width,
                    frame_height,
                    frame_max,
                    margin,
                    spacing,
                    skip_frames,
                }),
            ),
            PackEntry::Audio {
                key,
                urls,
                auto_decode,
            } => AssetRequest::new(AssetKind::Audio, key, UrlSource::from(urls))
                .with_options(TaskOptions::Audio { auto_decode }),
            PackEntry::AudioSprite {
                key,
                urls,
                json_url,
                json_data,
                auto_decode,
            } => {
                let secondary = data_or_url(json_data, json_url.or_else(|| Some(format!("{key}.json"))));
                AssetRequest::new(AssetKind::AudioSprite, key, UrlSource::from(urls))
                    .with_secondary(secondary)
                    .with_options(TaskOptions::Audio { auto_decode })
            }
            PackEntry::Video { key, urls, as_blob } => {
                AssetRequest::new(AssetKind::Video, key, UrlSource::from(urls))
                    .with_options(TaskOptions::Video { as_blob })
            }
            PackEntry::Tilemap {
                key,
                url,
                data,
                format,
            } => {
                let format = match format.as_deref() {
                    Some("CSV") => TilemapFormat::Csv,
                    _ => TilemapFormat::TiledJson,
                };
                AssetRequest::new(AssetKind::Tilemap, key, data_or_url(data, url))
                    .with_options(TaskOptions::Tilemap(format))
            }
            PackEntry::Physics { key, url, data } => {
                AssetRequest::new(AssetKind::Physics, key, data_or_url(data, url))
                    .with_options(TaskOptions::Physics(PhysicsFormat::LimeCorona))
            }
            PackEntry::BitmapFont {
                key,
                texture_url,
                atlas_url,
                atlas_data,
                x_spacing,
                y_spacing,
            } => {
                let texture = texture_url.unwrap_or_else(|| format!("{key}.png"));
                let secondary = match atlas_data {
                    Some(_) => data_or_url(atlas_data, None),
                    None => UrlSource::Single(atlas_url.unwrap_or_else(|| format!("{key}.xml"))),
                };
                AssetRequest::new(AssetKind::BitmapFont, key, texture)
                    .with_secondary(secondary)
                    .with_options(TaskOptions::BitmapFont {
                        x_spacing,
                        y_spacing,
                    })
            }
            PackEntry::AtlasJsonArray {
                key,
                texture_url,
                atlas_url,
                atlas_data,
            } => atlas_request(key, AtlasFormat::JsonArray, texture_url, atlas_url, atlas_data),
            PackEntry::AtlasJsonHash {
                key,
                texture_url,
                atlas_url,
                atlas_data,
            } => atlas_request(key, AtlasFormat::JsonHash, texture_url, atlas_url, atlas_data),
            PackEntry::AtlasXml {
                key,
                texture_url,
                atlas_url,
                atlas_data,
            } => atlas_request(key, AtlasFormat::Xml, texture_url, atlas_url, atlas_data),
            PackEntry::Unsupported => return None,
        };
        Some(request)
    }
}

/// Expands the `key` section of a pack manifest into enqueue requests.
/// Malformed entries are logged and skipped; unknown types are ignored.
pub(crate) fn pack_requests(pack_key: &str, data: &Value) -> Result<Vec<AssetRequest>, PackError> {
    let section = data.get(pack_key).ok_or_else(|| PackError::MissingSection {
        key: pack_key.to_string(),
    })?;
    let entries = section.as_array().ok_or_else(|| PackError::NotAnArray {
        key: pack_key.to_string(),
    })?;

    let mut requests = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match parse_entry(pack_key, index, entry) {
            Ok(Some(request)) => requests.push(request),
            Ok(None) => {}
            Err(error) => warn!(pack = pack_key, error = %error, "pack_entry_skipped"),
        }
    }
    Ok(requests)
}

fn parse_entry(pack_key: &str, index: usize, entry: &Value) -> Result<Option<AssetRequest>, PackError> {
    let parsed = serde_path_to_error::deserialize::<_, PackEntry>(entry.clone()).map_err(|error| {
        let field_path = error.path().to_string();
        let path = if field_path == "." {
            format!("{pack_key}[{index}]")
        } else {
            format!("{pack_key}[{index}].{field_path}")
        };
        PackError::Entry {
            path,
            source: error.into_inner(),
        }
    })?;
    Ok(parsed.into_request())
}

pub(crate) fn parse_pack_text(text: &str) -> Result<Value, PackError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn expands_known_entries_in_order_and_skips_unknown() {
        let data = json!({
            "level": [
                { "type": "image", "key": "sky", "url": "sky.png" },
                { "type": "hologram", "key": "ignored" },
                { "type": "text", "key": "intro" },
                { "type": "audio", "key": "theme", "urls": ["theme.ogg", "theme.mp3"] }
            ]
        });
        let requests = pack_requests("level", &data).expect("pack");

        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].kind, AssetKind::Image);
        assert_eq!(requests[0].url, UrlSource::Single("sky.png".to_string()));
        assert_eq!(requests[1].url, UrlSource::Default);
        assert_eq!(
            requests[2].url,
            UrlSource::Candidates(vec!["theme.ogg".to_string(), "theme.mp3".to_string()])
        );
    }

    #[test]
    fn malformed_entry_is_skipped_not_fatal() {
        let data = json!({
            "p": [
                { "type": "spritesheet", "key": "hero", "url": "hero.png", "frameWidth": "wide" },
                { "type": "json", "key": "cfg" }
            ]
        });
        let requests = pack_requests("p", &data).expect("pack");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].key, "cfg");
    }

    #[test]
    fn entry_errors_carry_json_path() {
        let entry = json!({ "type": "spritesheet", "key": "hero", "frameWidth": "wide", "frameHeight": 4 });
        let error = parse_entry("p", 3, &entry).expect_err("bad frame width");
        let PackError::Entry { path, .. } = error else {
            panic!("expected entry error");
        };
        assert!(path.starts_with("p[3]"));
    }

    #[test]
    fn missing_section_is_reported() {
        let data = json!({ "other": [] });
        assert!(matches!(
            pack_requests("p", &data),
            Err(PackError::MissingSection { .. })
        ));
    }

    #[test]
    fn atlas_entries_become_two_part_requests() {
        let data = json!({
            "ui": [
                { "type": "atlasJSONHash", "key": "buttons", "textureURL": "ui/b.png", "atlasURL": "ui/b.json" },
                { "type": "atlasXML", "key": "icons", "atlasData": "<TextureAtlas/>" }
            ]
        });
        let requests = pack_requests("ui", &data).expect("pack");
        assert_eq!(requests[0].url, UrlSource::Single("ui/b.png".to_string()));
        assert_eq!(
            requests[0].secondary,
            Some(UrlSource::Single("ui/b.json".to_string()))
        );
        assert_eq!(requests[0].options, TaskOptions::Atlas(AtlasFormat::JsonHash));
        assert_eq!(requests[1].url, UrlSource::Single("icons.png".to_string()));
        assert_eq!(
            requests[1].secondary,
            Some(UrlSource::Inline(InlineData::Text("<TextureAtlas/>".to_string())))
        );
    }
}
