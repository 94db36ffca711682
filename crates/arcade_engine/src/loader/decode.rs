use image::ImageFormat;
use serde_json::Value;
use thiserror::Error;

use super::cache::{
    AssetRecord, AtlasData, FontData, ImageAsset, MediaAsset, TilemapData, XmlAsset,
};
use super::task::{AssetKind, AtlasFormat, LoadTask, PhysicsFormat, TaskOptions, TilemapFormat};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("asset is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid xml: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("invalid image: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid csv at row {row}, column {column}: {value:?}")]
    Csv {
        row: usize,
        column: usize,
        value: String,
    },
    #[error("invalid spritesheet: {0}")]
    SpriteSheet(String),
    #[error("{kind} is missing its data part")]
    MissingPart { kind: &'static str },
    #[error("{kind} assets are not decoded here")]
    Unsupported { kind: &'static str },
}

/// Turns fetched bytes into a cache record. `secondary` carries the second
/// part of two-part assets (atlas data, font data, audio sprite json).
pub trait AssetDecoder {
    fn parse(
        &self,
        task: &LoadTask,
        primary: Vec<u8>,
        secondary: Option<Vec<u8>>,
    ) -> Result<AssetRecord, DecodeError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDecoder;

impl AssetDecoder for DefaultDecoder {
    fn parse(
        &self,
        task: &LoadTask,
        primary: Vec<u8>,
        secondary: Option<Vec<u8>>,
    ) -> Result<AssetRecord, DecodeError> {
        let kind = task.kind();
        match kind {
            AssetKind::Image => Ok(AssetRecord::Image(decode_png(&primary)?)),
            AssetKind::Text => Ok(AssetRecord::Text(String::from_utf8(primary)?)),
            AssetKind::Script => Ok(AssetRecord::Script(String::from_utf8(primary)?)),
            AssetKind::Shader => Ok(AssetRecord::Shader(String::from_utf8(primary)?)),
            AssetKind::Json => Ok(AssetRecord::Json(serde_json::from_slice(&primary)?)),
            AssetKind::Xml => Ok(AssetRecord::Xml(decode_xml(primary)?)),
            AssetKind::Binary => Ok(AssetRecord::Binary(primary)),
            AssetKind::SpriteSheet => {
                let image = decode_png(&primary)?;
                let frames = match task.options() {
                    TaskOptions::SpriteSheet(layout) => layout.frames(image.width, image.height)?,
                    _ => {
                        return Err(DecodeError::SpriteSheet(
                            "missing frame layout".to_string(),
                        ))
                    }
                };
                Ok(AssetRecord::SpriteSheet { image, frames })
            }
            AssetKind::TextureAtlas => {
                let image = decode_png(&primary)?;
                let data = secondary.ok_or(DecodeError::MissingPart {
                    kind: kind.as_str(),
                })?;
                let format = match task.options() {
                    TaskOptions::Atlas(format) => *format,
                    _ => AtlasFormat::JsonArray,
                };
                let data = match format {
                    AtlasFormat::Xml => AtlasData::Xml(decode_xml(data)?),
                    AtlasFormat::JsonArray | AtlasFormat::JsonHash => {
                        AtlasData::Json(serde_json::from_slice(&data)?)
                    }
                };
                Ok(AssetRecord::TextureAtlas {
                    image,
                    format,
                    data,
                })
            }
            AssetKind::BitmapFont => {
                let image = decode_png(&primary)?;
                let data = secondary.ok_or(DecodeError::MissingPart {
                    kind: kind.as_str(),
                })?;
                let (x_spacing, y_spacing) = match task.options() {
                    TaskOptions::BitmapFont {
                        x_spacing,
                        y_spacing,
                    } => (*x_spacing, *y_spacing),
                    _ => (0.0, 0.0),
                };
                let data = if looks_like_json(&data) {
                    FontData::Json(serde_json::from_slice(&data)?)
                } else {
                    FontData::Xml(decode_xml(data)?)
                };
                Ok(AssetRecord::BitmapFont {
                    image,
                    data,
                    x_spacing,
                    y_spacing,
                })
            }
            AssetKind::Tilemap => {
                let data = match task.options() {
                    TaskOptions::Tilemap(TilemapFormat::Csv) => {
                        TilemapData::Csv(parse_csv_layer(&String::from_utf8(primary)?)?)
                    }
                    _ => TilemapData::TiledJson(serde_json::from_slice(&primary)?),
                };
                Ok(AssetRecord::Tilemap(data))
            }
            AssetKind::Physics => {
                let format = match task.options() {
                    TaskOptions::Physics(format) => *format,
                    _ => PhysicsFormat::LimeCorona,
                };
                Ok(AssetRecord::Physics {
                    format,
                    data: serde_json::from_slice(&primary)?,
                })
            }
            AssetKind::Audio => Ok(AssetRecord::Audio(media(task, primary))),
            AssetKind::AudioSprite => {
                let data = secondary.ok_or(DecodeError::MissingPart {
                    kind: kind.as_str(),
                })?;
                let data: Value = serde_json::from_slice(&data)?;
                Ok(AssetRecord::AudioSprite {
                    audio: media(task, primary),
                    data,
                })
            }
            AssetKind::Video => Ok(AssetRecord::Video(media(task, primary))),
            AssetKind::Pack => Err(DecodeError::Unsupported {
                kind: kind.as_str(),
            }),
        }
    }
}

fn decode_png(bytes: &[u8]) -> Result<ImageAsset, DecodeError> {
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
    let rgba = decoded.to_rgba8();
    Ok(ImageAsset {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

fn decode_xml(bytes: Vec<u8>) -> Result<XmlAsset, DecodeError> {
    let source = String::from_utf8(bytes)?;
    let root_tag = {
        let document = roxmltree::Document::parse(&source)?;
        document.root_element().tag_name().name().to_string()
    };
    Ok(XmlAsset { root_tag, source })
}

fn looks_like_json(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|byte| !byte.is_ascii_whitespace())
        .is_some_and(|byte| *byte == b'{' || *byte == b'[')
}

fn media(task: &LoadTask, bytes: Vec<u8>) -> MediaAsset {
    let auto_decode = match task.options() {
        TaskOptions::Audio { auto_decode } => *auto_decode,
        _ => false,
    };
    MediaAsset {
        url: task.request_url().unwrap_or_default().to_string(),
        bytes,
        auto_decode,
    }
}

/// Parses a CSV tile layer: one row per line, comma separated tile indices.
pub fn parse_csv_layer(text: &str) -> Result<Vec<Vec<i32>>, DecodeError> {
    let mut rows = Vec::new();
    for (row, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut cells = Vec::new();
        for (column, cell) in line.split(',').enumerate() {
            let cell = cell.trim();
            let value = cell.parse::<i32>().map_err(|_| DecodeError::Csv {
                row,
                column,
                value: cell.to_string(),
            })?;
            cells.push(value);
        }
        rows.push(cells);
    }
    Ok(rows)
}
