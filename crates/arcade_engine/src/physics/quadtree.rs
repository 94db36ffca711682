use crate::geom::Rect;

pub const DEFAULT_MAX_OBJECTS: usize = 10;
pub const DEFAULT_MAX_LEVELS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
struct NodeBounds {
    x: f32,
    y: f32,
    sub_width: f32,
    sub_height: f32,
    /// Vertical split line.
    mid_x: f32,
    /// Horizontal split line.
    mid_y: f32,
}

impl NodeBounds {
    fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        let sub_width = (width / 2.0).floor();
        let sub_height = (height / 2.0).floor();
        Self {
            x,
            y,
            sub_width,
            sub_height,
            mid_x: x.round() + sub_width,
            mid_y: y.round() + sub_height,
        }
    }

    /// Quadrant fully containing `rect`: 0 top-right, 1 top-left,
    /// 2 bottom-left, 3 bottom-right. `None` when it straddles a split.
    fn quadrant(&self, rect: &Rect) -> Option<usize> {
        let top = rect.y < self.mid_y && rect.bottom() < self.mid_y;
        let bottom = rect.y > self.mid_y;
        if rect.x < self.mid_x && rect.right() < self.mid_x {
            if top {
                return Some(1);
            }
            if bottom {
                return Some(2);
            }
        } else if rect.x > self.mid_x {
            if top {
                return Some(0);
            }
            if bottom {
                return Some(3);
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
struct Node<T> {
    bounds: NodeBounds,
    level: u32,
    items: Vec<(T, Rect)>,
    children: Option<[usize; 4]>,
}

/// Region quadtree rebuilt from scratch for each query batch. Nodes split
/// once they hold more than `max_objects` items, up to `max_levels` deep.
#[derive(Debug, Clone)]
pub struct QuadTree<T> {
    nodes: Vec<Node<T>>,
    max_objects: usize,
    max_levels: u32,
}

impl<T: Copy> QuadTree<T> {
    pub fn new(bounds: Rect, max_objects: usize, max_levels: u32) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            max_objects,
            max_levels,
        };
        tree.reset(bounds, max_objects, max_levels);
        tree
    }

    pub fn reset(&mut self, bounds: Rect, max_objects: usize, max_levels: u32) {
        self.max_objects = max_objects;
        self.max_levels = max_levels;
        self.nodes.clear();
        self.nodes.push(Node {
            bounds: NodeBounds::new(bounds.x, bounds.y, bounds.width, bounds.height),
            level: 0,
            items: Vec::new(),
            children: None,
        });
    }

    /// Drops every item and subdivision, keeping the root bounds.
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        if let Some(root) = self.nodes.first_mut() {
            root.items.clear();
            root.children = None;
        }
    }

    pub fn populate(&mut self, items: impl IntoIterator<Item = (T, Rect)>) {
        for (item, rect) in items {
            self.insert(item, rect);
        }
    }

    pub fn insert(&mut self, item: T, rect: Rect) {
        self.insert_at(0, item, rect);
    }

    fn insert_at(&mut self, node: usize, item: T, rect: Rect) {
        if let Some(children) = self.nodes[node].children {
            if let Some(quadrant) = self.nodes[node].bounds.quadrant(&rect) {
                self.insert_at(children[quadrant], item, rect);
                return;
            }
        }

        self.nodes[node].items.push((item, rect));
        if self.nodes[node].items.len() <= self.max_objects || self.nodes[node].level >= self.max_levels {
            return;
        }
        let children = match self.nodes[node].children {
            Some(children) => children,
            None => self.split(node),
        };

        let items = std::mem::take(&mut self.nodes[node].items);
        for (item, rect) in items {
            match self.nodes[node].bounds.quadrant(&rect) {
                Some(quadrant) => self.insert_at(children[quadrant], item, rect),
                None => self.nodes[node].items.push((item, rect)),
            }
        }
    }

    fn split(&mut self, node: usize) -> [usize; 4] {
        let parent = self.nodes[node].bounds;
        let level = self.nodes[node].level + 1;
        let (x, y, w, h) = (parent.x, parent.y, parent.sub_width, parent.sub_height);
        let quadrants = [
            NodeBounds::new(x + w, y, w, h),
            NodeBounds::new(x, y, w, h),
            NodeBounds::new(x, y + h, w, h),
            NodeBounds::new(x + w, y + h, w, h),
        ];
        let first = self.nodes.len();
        for bounds in quadrants {
            self.nodes.push(Node {
                bounds,
                level,
                items: Vec::new(),
                children: None,
            });
        }
        let children = [first, first + 1, first + 2, first + 3];
        self.nodes[node].children = Some(children);
        children
    }

    /// Items that may overlap `rect`: those in every node `rect` can reach.
    pub fn retrieve(&self, rect: &Rect) -> Vec<T> {
        let mut found = Vec::new();
        self.retrieve_from(0, rect, &mut found);
        found
    }

    fn retrieve_from(&self, node: usize, rect: &Rect, found: &mut Vec<T>) {
        let current = &self.nodes[node];
        found.extend(current.items.iter().map(|(item, _)| *item));
        let Some(children) = current.children else {
            return;
        };
        match current.bounds.quadrant(rect) {
            Some(quadrant) => self.retrieve_from(children[quadrant], rect, found),
            None => {
                for child in children {
                    self.retrieve_from(child, rect, found);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().map(|node| node.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn depth(&self) -> u32 {
        self.nodes.iter().map(|node| node.level).max().unwrap_or(0)
    }
}
