use crate::geom::Rect;

use super::body::Body;

/// One solid tile as seen by the physics world. `face_*` marks edges that are
/// exposed (no solid neighbour); `collide_*` marks edges that block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub column: usize,
    pub row: usize,
    pub index: i32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub face_top: bool,
    pub face_bottom: bool,
    pub face_left: bool,
    pub face_right: bool,
    pub collide_up: bool,
    pub collide_down: bool,
    pub collide_left: bool,
    pub collide_right: bool,
}

impl Tile {
    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn intersects(&self, left: f32, top: f32, right: f32, bottom: f32) -> bool {
        !(right <= self.x || bottom <= self.y || left >= self.right() || top >= self.bottom())
    }

    fn has_faces(&self) -> bool {
        self.face_top || self.face_bottom || self.face_left || self.face_right
    }
}

/// Static tile source. Implementations return only colliding tiles.
pub trait TileLayer {
    /// Solid tiles overlapping `area`, in row-major order.
    fn colliding_tiles(&self, area: Rect) -> Vec<Tile>;
}

/// Uniform grid of tile indices; indices listed in `solid` collide. Built
/// from a CSV layer or any row-major index grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridTileLayer {
    rows: Vec<Vec<i32>>,
    tile_width: f32,
    tile_height: f32,
    solid: Vec<i32>,
}

impl GridTileLayer {
    pub fn new(rows: Vec<Vec<i32>>, tile_width: f32, tile_height: f32) -> Self {
        Self {
            rows,
            tile_width,
            tile_height,
            solid: Vec::new(),
        }
    }

    pub fn set_collision(&mut self, indices: &[i32]) {
        for index in indices {
            if !self.solid.contains(index) {
                self.solid.push(*index);
            }
        }
    }

    pub fn width_in_tiles(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn height_in_tiles(&self) -> usize {
        self.rows.len()
    }

    fn is_solid(&self, column: isize, row: isize) -> bool {
        if column < 0 || row < 0 {
            return false;
        }
        self.rows
            .get(row as usize)
            .and_then(|cells| cells.get(column as usize))
            .is_some_and(|index| self.solid.contains(index))
    }

    fn tile_at(&self, column: usize, row: usize) -> Tile {
        let (c, r) = (column as isize, row as isize);
        let face_top = !self.is_solid(c, r - 1);
        let face_bottom = !self.is_solid(c, r + 1);
        let face_left = !self.is_solid(c - 1, r);
        let face_right = !self.is_solid(c + 1, r);
        Tile {
            column,
            row,
            index: self.rows[row][column],
            x: column as f32 * self.tile_width,
            y: row as f32 * self.tile_height,
            width: self.tile_width,
            height: self.tile_height,
            face_top,
            face_bottom,
            face_left,
            face_right,
            collide_up: true,
            collide_down: true,
            collide_left: true,
            collide_right: true,
        }
    }
}

impl TileLayer for GridTileLayer {
    fn colliding_tiles(&self, area: Rect) -> Vec<Tile> {
        if self.tile_width <= 0.0 || self.tile_height <= 0.0 {
            return Vec::new();
        }
        let first_column = (area.x / self.tile_width).floor().max(0.0) as usize;
        let first_row = (area.y / self.tile_height).floor().max(0.0) as usize;
        let last_column = ((area.right() / self.tile_width).ceil().max(0.0) as usize)
            .min(self.width_in_tiles());
        let last_row =
            ((area.bottom() / self.tile_height).ceil().max(0.0) as usize).min(self.height_in_tiles());

        let mut tiles = Vec::new();
        for row in first_row..last_row {
            for column in first_column..last_column {
                if self.is_solid(column as isize, row as isize) {
                    tiles.push(self.tile_at(column, row));
                }
            }
        }
        tiles
    }
}

fn tile_check_x(body: &mut Body, tile: &Tile, tile_bias: f32) -> f32 {
    let mut overlap = 0.0;
    if body.delta_x() < 0.0 && !body.blocked.left && tile.collide_right && body.check_collision.left {
        if tile.face_right && body.left() < tile.right() {
            overlap = body.left() - tile.right();
            if overlap < -tile_bias {
                overlap = 0.0;
            }
        }
    } else if body.delta_x() > 0.0
        && !body.blocked.right
        && tile.collide_left
        && body.check_collision.right
        && tile.face_left
        && body.right() > tile.left()
    {
        overlap = body.right() - tile.left();
        if overlap > tile_bias {
            overlap = 0.0;
        }
    }

    if overlap != 0.0 {
        if body.custom_separate_x {
            body.overlap_x = overlap;
        } else {
            if overlap < 0.0 {
                body.blocked.set_left();
            } else {
                body.blocked.set_right();
            }
            body.position.x -= overlap;
            body.velocity.x = if body.bounce.x == 0.0 {
                0.0
            } else {
                -body.velocity.x * body.bounce.x
            };
        }
    }
    overlap
}

fn tile_check_y(body: &mut Body, tile: &Tile, tile_bias: f32) -> f32 {
    let mut overlap = 0.0;
    if body.delta_y() < 0.0 && !body.blocked.up && tile.collide_down && body.check_collision.up {
        if tile.face_bottom && body.top() < tile.bottom() {
            overlap = body.top() - tile.bottom();
            if overlap < -tile_bias {
                overlap = 0.0;
            }
        }
    } else if body.delta_y() > 0.0
        && !body.blocked.down
        && tile.collide_up
        && body.check_collision.down
        && tile.face_top
        && body.bottom() > tile.top()
    {
        overlap = body.bottom() - tile.top();
        if overlap > tile_bias {
            overlap = 0.0;
        }
    }

    if overlap != 0.0 {
        if body.custom_separate_y {
            body.overlap_y = overlap;
        } else {
            if overlap < 0.0 {
                body.blocked.set_up();
            } else {
                body.blocked.set_down();
            }
            body.position.y -= overlap;
            body.velocity.y = if body.bounce.y == 0.0 {
                0.0
            } else {
                -body.velocity.y * body.bounce.y
            };
        }
    }
    overlap
}

fn body_intersects_tile(body: &Body, tile: &Tile) -> bool {
    tile.intersects(body.left(), body.top(), body.right(), body.bottom())
}

/// Pushes `body` out of one tile along its exposed faces. Internal edges
/// (no exposed face) never collide.
pub(crate) fn separate_tile(body: &mut Body, tile: &Tile, overlap_only: bool, tile_bias: f32) -> bool {
    if !body.enable || !body_intersects_tile(body, tile) {
        return false;
    }
    if overlap_only {
        return true;
    }
    if !tile.has_faces() {
        return false;
    }

    let mut min_x = 0.0;
    let mut min_y = 1.0;
    if body.delta_abs_x() > body.delta_abs_y() {
        min_x = -1.0;
    } else if body.delta_abs_x() < body.delta_abs_y() {
        min_y = -1.0;
    }
    if body.delta_x() != 0.0
        && body.delta_y() != 0.0
        && (tile.face_left || tile.face_right)
        && (tile.face_top || tile.face_bottom)
    {
        min_x = (body.left() - tile.right())
            .abs()
            .min((body.right() - tile.left()).abs());
        min_y = (body.top() - tile.bottom())
            .abs()
            .min((body.bottom() - tile.top()).abs());
    }

    let mut overlap_x = 0.0;
    let mut overlap_y = 0.0;
    if min_x < min_y {
        if tile.face_left || tile.face_right {
            overlap_x = tile_check_x(body, tile, tile_bias);
            if overlap_x != 0.0 && !body_intersects_tile(body, tile) {
                return true;
            }
        }
        if tile.face_top || tile.face_bottom {
            overlap_y = tile_check_y(body, tile, tile_bias);
        }
    } else {
        if tile.face_top || tile.face_bottom {
            overlap_y = tile_check_y(body, tile, tile_bias);
            if overlap_y != 0.0 && !body_intersects_tile(body, tile) {
                return true;
            }
        }
        if tile.face_left || tile.face_right {
            overlap_x = tile_check_x(body, tile, tile_bias);
        }
    }
    overlap_x != 0.0 || overlap_y != 0.0
}
