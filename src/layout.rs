//! Diagram geometry.
//!
//! Geometry is a pure function of the container size until the user pans or
//! zooms; from then on the manual view wins over resize events until a new
//! fragment is loaded. Sizes are in pixels; a terminal cell counts as
//! [`CellSize`] pixels.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::observer::Notifier;
use crate::tree::{Node, TreeFragment};

/// Containers narrower than this use the small preset
pub const BREAKPOINT_PX: f64 = 768.0;
/// Width at which the computed zoom is exactly 1
pub const REFERENCE_WIDTH_PX: f64 = 1200.0;
pub const SMALL_ZOOM_BOOST: f64 = 1.3;
pub const INITIAL_ZOOM_MIN: f64 = 0.3;
pub const INITIAL_ZOOM_MAX: f64 = 1.5;
pub const INTERACTIVE_ZOOM_MIN: f64 = 0.3;
pub const INTERACTIVE_ZOOM_MAX: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeSize {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Separation {
    pub siblings: f64,
    pub non_siblings: f64,
}

const SMALL_NODE_SIZE: NodeSize = NodeSize { x: 350.0, y: 28.0 };
const LARGE_NODE_SIZE: NodeSize = NodeSize { x: 350.0, y: 24.0 };
const SMALL_SEPARATION: Separation = Separation { siblings: 1.5, non_siblings: 2.5 };
const LARGE_SEPARATION: Separation = Separation { siblings: 1.0, non_siblings: 2.0 };

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutGeometry {
    pub container_width: f64,
    pub container_height: f64,
    pub translate: Point,
    pub zoom: f64,
    pub node_size: NodeSize,
    pub separation: Separation,
}

pub fn is_small(width: f64) -> bool {
    width < BREAKPOINT_PX
}

/// Default geometry for a container, with no manual adjustment.
pub fn compute_geometry(width: f64, height: f64) -> LayoutGeometry {
    let small = is_small(width);
    let translate = Point {
        x: if small { width / 8.0 } else { width / 4.0 },
        y: height / 2.0,
    };
    let base_zoom = width / REFERENCE_WIDTH_PX;
    let zoom = if small { base_zoom * SMALL_ZOOM_BOOST } else { base_zoom };

    LayoutGeometry {
        container_width: width,
        container_height: height,
        translate,
        zoom: zoom.clamp(INITIAL_ZOOM_MIN, INITIAL_ZOOM_MAX),
        node_size: if small { SMALL_NODE_SIZE } else { LARGE_NODE_SIZE },
        separation: if small { SMALL_SEPARATION } else { LARGE_SEPARATION },
    }
}

impl LayoutGeometry {
    pub fn is_small(&self) -> bool {
        is_small(self.container_width)
    }

    pub fn to_screen(&self, p: Point) -> Point {
        Point {
            x: self.translate.x + p.x * self.zoom,
            y: self.translate.y + p.y * self.zoom,
        }
    }

    pub fn to_diagram(&self, p: Point) -> Point {
        Point {
            x: (p.x - self.translate.x) / self.zoom,
            y: (p.y - self.translate.y) / self.zoom,
        }
    }
}

/// Owns the current geometry and the pan/zoom override.
#[derive(Debug)]
pub struct LayoutEngine {
    geometry: LayoutGeometry,
    interacted: bool,
    notifier: Notifier,
}

impl LayoutEngine {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            geometry: compute_geometry(width, height),
            interacted: false,
            notifier: Notifier::new(),
        }
    }

    pub fn geometry(&self) -> &LayoutGeometry {
        &self.geometry
    }

    pub fn has_interacted(&self) -> bool {
        self.interacted
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Container changed size. Node spacing always follows the new size;
    /// translate and zoom only while the user has not taken over the view.
    pub fn on_resize(&mut self, width: f64, height: f64) -> bool {
        let computed = compute_geometry(width, height);
        let next = if self.interacted {
            LayoutGeometry {
                translate: self.geometry.translate,
                zoom: self.geometry.zoom,
                ..computed
            }
        } else {
            computed
        };
        self.replace(next)
    }

    pub fn pan(&mut self, dx: f64, dy: f64) -> bool {
        self.interacted = true;
        let mut next = self.geometry;
        next.translate.x += dx;
        next.translate.y += dy;
        self.replace(next)
    }

    /// Scale the zoom by `factor`, keeping `anchor` (screen pixels) fixed.
    pub fn zoom_at(&mut self, factor: f64, anchor: Point) -> bool {
        self.interacted = true;
        let old_zoom = self.geometry.zoom;
        let zoom = (old_zoom * factor).clamp(INTERACTIVE_ZOOM_MIN, INTERACTIVE_ZOOM_MAX);
        let ratio = zoom / old_zoom;

        let mut next = self.geometry;
        next.zoom = zoom;
        next.translate.x = anchor.x - (anchor.x - self.geometry.translate.x) * ratio;
        next.translate.y = anchor.y - (anchor.y - self.geometry.translate.y) * ratio;
        self.replace(next)
    }

    /// Zoom around the container center.
    pub fn zoom_by(&mut self, factor: f64) -> bool {
        let center = Point::new(self.geometry.container_width / 2.0, self.geometry.container_height / 2.0);
        self.zoom_at(factor, center)
    }

    /// A new root fragment was loaded: forget the manual view.
    pub fn reset_for_new_fragment(&mut self) -> bool {
        self.interacted = false;
        let next = compute_geometry(self.geometry.container_width, self.geometry.container_height);
        self.replace(next)
    }

    fn replace(&mut self, next: LayoutGeometry) -> bool {
        if next == self.geometry {
            return false;
        }
        self.geometry = next;
        self.notifier.notify();
        true
    }
}

/// Pixels per terminal cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellSize {
    pub width_px: f64,
    pub height_px: f64,
}

impl Default for CellSize {
    fn default() -> Self {
        Self {
            width_px: 8.0,
            height_px: 16.0,
        }
    }
}

impl CellSize {
    pub fn container_px(&self, cols: u16, rows: u16) -> (f64, f64) {
        (cols as f64 * self.width_px, rows as f64 * self.height_px)
    }

    /// Screen pixel to (col, row), relative to the container origin.
    pub fn to_cell(&self, p: Point) -> (i64, i64) {
        ((p.x / self.width_px).floor() as i64, (p.y / self.height_px).floor() as i64)
    }

    pub fn cell_center(&self, col: u16, row: u16) -> Point {
        Point::new(
            (col as f64 + 0.5) * self.width_px,
            (row as f64 + 0.5) * self.height_px,
        )
    }
}

/// Nodes at `initial_depth` or deeper start collapsed.
pub fn initial_collapsed(fragment: &TreeFragment, initial_depth: usize) -> HashSet<String> {
    fragment
        .iter()
        .filter(|node| node.has_children())
        .filter(|node| fragment.depth_of(&node.id).unwrap_or(0) >= initial_depth)
        .map(|node| node.id.clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedNode {
    pub id: String,
    pub label: String,
    pub depth: usize,
    /// Position in diagram space; the root sits at the origin
    pub pos: Point,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Has children that are currently hidden
    pub collapsed: bool,
    pub extinct: bool,
}

/// Visible nodes of a fragment in pre-order, positioned for drawing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagramLayout {
    pub nodes: Vec<PlacedNode>,
}

struct Placer<'a> {
    collapsed: &'a HashSet<String>,
    geometry: &'a LayoutGeometry,
    nodes: Vec<PlacedNode>,
    last_leaf: Option<(f64, Option<usize>)>,
}

impl<'a> Placer<'a> {
    /// Leaves are stacked top to bottom in visit order.
    fn leaf_y(&mut self, parent: Option<usize>) -> f64 {
        let y = match self.last_leaf {
            None => 0.0,
            Some((prev_y, prev_parent)) => {
                let gap = if prev_parent == parent {
                    self.geometry.separation.siblings
                } else {
                    self.geometry.separation.non_siblings
                };
                prev_y + gap * self.geometry.node_size.y
            }
        };
        self.last_leaf = Some((y, parent));
        y
    }

    /// Places the visible nodes in pre-order and returns the root's y.
    /// Inner nodes are centered on their first and last child afterwards,
    /// walking back from the end since children always follow their parent.
    fn place(&mut self, root: &Node) -> f64 {
        let mut stack: Vec<(&Node, usize, Option<usize>)> = vec![(root, 0, None)];
        while let Some((node, depth, parent)) = stack.pop() {
            let index = self.nodes.len();
            if let Some(parent) = parent {
                self.nodes[parent].children.push(index);
            }
            let hidden = self.collapsed.contains(&node.id);
            let expanded = !hidden && node.has_children();
            let y = if expanded { 0.0 } else { self.leaf_y(parent) };

            self.nodes.push(PlacedNode {
                id: node.id.clone(),
                label: node.display_name(),
                depth,
                pos: Point::new(depth as f64 * self.geometry.node_size.x, y),
                parent,
                children: Vec::new(),
                collapsed: hidden && node.has_children(),
                extinct: node.is_extinct(),
            });

            if expanded {
                for child in node.children.iter().rev() {
                    stack.push((child, depth + 1, Some(index)));
                }
            }
        }

        for index in (0..self.nodes.len()).rev() {
            let span = {
                let children = &self.nodes[index].children;
                children.first().zip(children.last()).map(|(&first, &last)| (first, last))
            };
            if let Some((first, last)) = span {
                self.nodes[index].pos.y = (self.nodes[first].pos.y + self.nodes[last].pos.y) / 2.0;
            }
        }
        self.nodes.first().map_or(0.0, |root| root.pos.y)
    }
}

impl DiagramLayout {
    pub fn place(fragment: &TreeFragment, collapsed: &HashSet<String>, geometry: &LayoutGeometry) -> Self {
        let mut placer = Placer {
            collapsed,
            geometry,
            nodes: Vec::new(),
            last_leaf: None,
        };
        let root_y = placer.place(fragment.root());
        let mut nodes = placer.nodes;
        for node in &mut nodes {
            node.pos.y -= root_y;
        }
        Self { nodes }
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&PlacedNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Node whose marker or label covers the given cell. The marker is drawn
    /// at the node's cell, the label two columns to its right.
    pub fn hit_test(&self, geometry: &LayoutGeometry, cell: CellSize, col: i64, row: i64) -> Option<&PlacedNode> {
        let mut label_hit = None;
        for node in &self.nodes {
            let (node_col, node_row) = cell.to_cell(geometry.to_screen(node.pos));
            if node_row != row {
                continue;
            }
            if node_col == col {
                return Some(node);
            }
            let label_end = node_col + 1 + node.label.chars().count() as i64;
            if label_hit.is_none() && col > node_col && col <= label_end {
                label_hit = Some(node);
            }
        }
        label_hit
    }
}
