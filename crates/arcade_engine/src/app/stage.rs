use crate::geom::Vec2;
use crate::physics::{Body, BodyId, BodySet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Graphic {
    Rect { width: f32, height: f32, color: [u8; 4] },
    Circle { radius: f32, color: [u8; 4] },
    /// Image or spritesheet frame from the asset cache.
    Sprite { key: String, frame: Option<usize> },
}

/// Display node. `position` is local to the parent and marks the node's
/// top-left corner; `world_*` values are refreshed by `update_transforms`.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub position: Vec2,
    /// Radians.
    pub rotation: f32,
    pub scale: Vec2,
    pub alpha: f32,
    pub visible: bool,
    pub exists: bool,
    pub graphic: Option<Graphic>,
    /// Remaining life; the node is killed when it runs out.
    pub lifespan_ms: Option<f32>,
    body: Option<BodyId>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    world_position: Vec2,
    world_rotation: f32,
    world_scale: Vec2,
    world_alpha: f32,
    world_visible: bool,
}

impl Node {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            rotation: 0.0,
            scale: Vec2::ONE,
            alpha: 1.0,
            visible: true,
            exists: true,
            graphic: None,
            lifespan_ms: None,
            body: None,
            parent: None,
            children: Vec::new(),
            world_position: Vec2::new(x, y),
            world_rotation: 0.0,
            world_scale: Vec2::ONE,
            world_alpha: 1.0,
            world_visible: true,
        }
    }

    pub fn with_graphic(mut self, graphic: Graphic) -> Self {
        self.graphic = Some(graphic);
        self
    }

    pub fn with_lifespan(mut self, lifespan_ms: f32) -> Self {
        self.lifespan_ms = Some(lifespan_ms);
        self
    }

    pub fn body(&self) -> Option<BodyId> {
        self.body
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn world_position(&self) -> Vec2 {
        self.world_position
    }

    pub fn world_rotation(&self) -> f32 {
        self.world_rotation
    }

    pub fn world_scale(&self) -> Vec2 {
        self.world_scale
    }

    pub fn world_alpha(&self) -> f32 {
        self.world_alpha
    }

    pub fn world_visible(&self) -> bool {
        self.world_visible
    }

    /// Hides the node and stops it taking part in updates.
    pub fn kill(&mut self) {
        self.exists = false;
        self.visible = false;
    }

    pub fn revive(&mut self) {
        self.exists = true;
        self.visible = true;
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Scene graph root: an arena of nodes forming a forest.
#[derive(Debug, Clone)]
pub struct Stage {
    slots: Vec<Slot>,
    free: Vec<u32>,
    roots: Vec<NodeId>,
    len: usize,
    pub background: [u8; 4],
}

impl Default for Stage {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            roots: Vec::new(),
            len: 0,
            background: [20, 22, 28, 255],
        }
    }
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        let id = self.insert(node);
        self.roots.push(id);
        id
    }

    pub fn add_child(&mut self, parent: NodeId, mut node: Node) -> Option<NodeId> {
        let parent_node = self.get(parent)?;
        node.parent = Some(parent);
        node.world_position = parent_node.world_position + node.position;
        let id = self.insert(node);
        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.children.push(id);
        }
        Some(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Removes the node, its descendants and every body they own.
    pub fn remove(&mut self, id: NodeId, bodies: &mut BodySet) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        match node.parent {
            Some(parent) => {
                if let Some(parent) = self.get_mut(parent) {
                    parent.children.retain(|child| *child != id);
                }
            }
            None => self.roots.retain(|root| *root != id),
        }

        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let slot = &mut self.slots[current.index as usize];
            let Some(node) = slot.node.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(current.index);
            self.len -= 1;
            if let Some(body) = node.body {
                bodies.remove(body);
            }
            pending.extend(node.children);
        }
        true
    }

    /// Removes every node and body.
    pub fn clear(&mut self, bodies: &mut BodySet) {
        for root in self.roots.clone() {
            self.remove(root, bodies);
        }
    }

    /// Attaches a new body aligned with the node's world position.
    pub fn enable_body(&mut self, id: NodeId, mut body: Body, bodies: &mut BodySet) -> Option<BodyId> {
        let node = self.get(id)?;
        if let Some(existing) = node.body {
            return Some(existing);
        }
        body.position = node.world_position + body.offset;
        body.prev = body.position;
        let body_id = bodies.insert(body);
        if let Some(node) = self.get_mut(id) {
            node.body = Some(body_id);
        }
        Some(body_id)
    }

    /// Parents before children, in insertion order.
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.len);
        let mut pending: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = pending.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            order.push(id);
            pending.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Counts down lifespans and kills expired nodes, disabling their bodies.
    pub fn pre_update(&mut self, elapsed_ms: f32, bodies: &mut BodySet) {
        for id in self.depth_first() {
            let Some(node) = self.get_mut(id) else {
                continue;
            };
            if !node.exists {
                continue;
            }
            let Some(remaining) = node.lifespan_ms.as_mut() else {
                continue;
            };
            *remaining -= elapsed_ms;
            if *remaining <= 0.0 {
                node.lifespan_ms = None;
                node.kill();
                if let Some(body) = node.body.and_then(|body| bodies.get_mut(body)) {
                    body.enable = false;
                }
            }
        }
    }

    /// Copies node positions into their bodies ahead of integration.
    pub fn push_bodies(&self, bodies: &mut BodySet) {
        for slot in &self.slots {
            let Some(node) = slot.node.as_ref().filter(|node| node.exists) else {
                continue;
            };
            if let Some(body) = node.body.and_then(|body| bodies.get_mut(body)) {
                body.position = node.world_position + body.offset;
                body.rotation = node.world_rotation.to_degrees();
            }
        }
    }

    /// Applies each body's clamped step motion back to its node.
    pub fn post_update(&mut self, bodies: &BodySet) {
        for slot in &mut self.slots {
            let Some(node) = slot.node.as_mut().filter(|node| node.exists) else {
                continue;
            };
            let Some(body) = node.body.and_then(|body| bodies.get(body)) else {
                continue;
            };
            if !body.enable {
                continue;
            }
            node.position += body.step_delta();
            if body.allow_rotation {
                node.rotation += body.delta_z().to_radians();
            }
        }
    }

    pub fn update_transforms(&mut self) {
        for id in self.depth_first() {
            let parent = self
                .get(id)
                .and_then(|node| node.parent)
                .and_then(|parent| self.get(parent))
                .map(|parent| {
                    (
                        parent.world_position,
                        parent.world_rotation,
                        parent.world_scale,
                        parent.world_alpha,
                        parent.world_visible,
                    )
                });
            let Some(node) = self.get_mut(id) else {
                continue;
            };
            match parent {
                Some((position, rotation, scale, alpha, visible)) => {
                    let local = Vec2::new(node.position.x * scale.x, node.position.y * scale.y);
                    let (sin, cos) = rotation.sin_cos();
                    node.world_position =
                        position + Vec2::new(local.x * cos - local.y * sin, local.x * sin + local.y * cos);
                    node.world_rotation = rotation + node.rotation;
                    node.world_scale = Vec2::new(scale.x * node.scale.x, scale.y * node.scale.y);
                    node.world_alpha = alpha * node.alpha;
                    node.world_visible = visible && node.visible;
                }
                None => {
                    node.world_position = node.position;
                    node.world_rotation = node.rotation;
                    node.world_scale = node.scale;
                    node.world_alpha = node.alpha;
                    node.world_visible = node.visible;
                }
            }
        }
    }

    /// Nodes that should be drawn this frame, in draw order.
    pub fn render_list(&self) -> Vec<NodeId> {
        self.depth_first()
            .into_iter()
            .filter(|id| {
                self.get(*id)
                    .is_some_and(|node| node.exists && node.world_visible && node.world_alpha > 0.0)
            })
            .collect()
    }

    fn insert(&mut self, node: Node) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }
}
