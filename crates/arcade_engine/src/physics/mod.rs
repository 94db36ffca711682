mod body;
mod circle;
mod collide;
mod quadtree;
mod separate;
mod tile;
mod world;

pub use body::{
    Body, BodyEvents, BodyId, BodySet, EdgeFlags, Facing, Group, DEFAULT_MAX_ANGULAR,
    DEFAULT_MAX_VELOCITY,
};
pub use collide::{Collidable, Collider, PhysicsEvent};
pub use quadtree::{QuadTree, DEFAULT_MAX_LEVELS, DEFAULT_MAX_OBJECTS};
pub use separate::{circle_body_intersects, intersects, SeparationParams};
pub use tile::{GridTileLayer, Tile, TileLayer};
pub use world::{BoundsCollision, SortDirection, World, WorldConfig, OVERLAP_BIAS, TILE_BIAS};
