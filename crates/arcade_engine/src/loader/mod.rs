mod cache;
mod decode;
mod fetch;
mod pack;
mod pipeline;
mod task;
mod url;

pub use cache::{
    AssetRecord, AtlasData, Cache, CacheEntry, FontData, ImageAsset, MediaAsset, TilemapData,
    XmlAsset,
};
pub use decode::{parse_csv_layer, AssetDecoder, DecodeError, DefaultDecoder};
pub use fetch::{FetchCompletion, FetchError, FetchTicket, Fetcher, FileFetcher, MemoryFetcher};
pub use pack::PackError;
pub use pipeline::{
    EnqueueResult, FileComplete, FileError, FileStart, LoadSummary, Loader, LoaderConfig,
    PackComplete, PackSource, MAX_PARALLEL_DOWNLOADS_CAP,
};
pub use task::{
    AssetKind, AssetRequest, AtlasFormat, FetchPart, InlineData, LoadTask, PhysicsFormat,
    SpriteSheetLayout, TaskId, TaskOptions, TaskState, TilemapFormat, UrlSource,
};
pub use url::{is_absolute_url, pick_supported_url, resolve_url, url_extension};
