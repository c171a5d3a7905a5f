//! Product structure of a STEP file as an [`Assembly`].
//!
//! PRODUCT_DEFINITIONs become nodes; NEXT_ASSEMBLY_USAGE_OCCURRENCEs become
//! parent/child edges. A definition used by several occurrences is expanded
//! once per occurrence. Top-level definitions hang under a synthetic
//! COMPOUND root with tag 1.

use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};

use super::lexer::{Entity, Value};
use crate::model::document::{Assembly, Document};
use crate::model::node::{Color, Node, NodeId, ShapeType};
use crate::util::{Error, Result};

/// Styles are nested several levels deep before the colour.
const MAX_STYLE_DEPTH: usize = 8;

/// What a product definition contributes to each of its nodes.
#[derive(Clone, Debug, Default)]
struct ProductInfo {
    name: Option<String>,
    shape_type: ShapeType,
    color: Option<Color>,
}

/// One assembly usage: the occurrence display name and the used definition.
struct Usage {
    name: Option<String>,
    child: u32,
}

enum Frame {
    Expand { definition: u32, node: NodeId },
    Leave(u32),
}

/// Entity lookups shared by the builder passes.
struct Index<'a> {
    entities: &'a FxHashMap<u32, Entity>,
    /// Entity ids in ascending order, so every pass is deterministic.
    order: Vec<u32>,
}

impl<'a> Index<'a> {
    fn new(entities: &'a FxHashMap<u32, Entity>) -> Self {
        let mut order: Vec<u32> = entities.keys().copied().collect();
        order.sort_unstable();
        Self { entities, order }
    }

    fn get(&self, id: u32) -> Option<&'a Entity> {
        self.entities.get(&id)
    }

    /// Simple instances whose type is one of `names`, in id order.
    fn of_type<'s>(
        &'s self,
        names: &'s [&'s str],
    ) -> impl Iterator<Item = (u32, &'a [Value])> + 's {
        self.order.iter().filter_map(move |&id| {
            let entity = self.entities.get(&id)?;
            let ty = entity.simple_type()?;
            names.contains(&ty).then(|| (id, entity.records[0].1.as_slice()))
        })
    }

    fn ref_arg(args: &[Value], index: usize) -> Option<u32> {
        args.get(index).and_then(Value::as_ref_id)
    }

    fn text_arg(args: &[Value], index: usize) -> Option<&str> {
        args.get(index).and_then(Value::as_str)
    }

    /// Definition -> product, through the formation.
    fn products_by_definition(&self) -> FxHashMap<u32, u32> {
        let formations: FxHashMap<u32, u32> = self
            .of_type(&[
                "PRODUCT_DEFINITION_FORMATION",
                "PRODUCT_DEFINITION_FORMATION_WITH_SPECIFIED_SOURCE",
            ])
            .filter_map(|(id, args)| Some((id, Self::ref_arg(args, 2)?)))
            .collect();

        self.definitions()
            .filter_map(|(id, args)| {
                let formation = Self::ref_arg(args, 2)?;
                Some((id, *formations.get(&formation)?))
            })
            .collect()
    }

    fn definitions(&self) -> impl Iterator<Item = (u32, &'a [Value])> + '_ {
        self.of_type(&[
            "PRODUCT_DEFINITION",
            "PRODUCT_DEFINITION_WITH_ASSOCIATED_DOCUMENTS",
        ])
    }

    /// PRODUCT name, else its id string.
    fn product_name(&self, product: u32) -> Option<String> {
        let args = self.get(product)?.args_if("PRODUCT")?;
        match Self::text_arg(args, 1) {
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ => Self::text_arg(args, 0).map(str::to_string),
        }
    }

    /// Occurrence description, else name, else id.
    fn usage_name(args: &[Value]) -> Option<String> {
        [2, 1]
            .into_iter()
            .filter_map(|i| Self::text_arg(args, i))
            .find(|s| !s.is_empty())
            .or_else(|| Self::text_arg(args, 0))
            .map(str::to_string)
    }

    /// Parent definition -> usages ordered by occurrence id.
    fn usages(&self) -> FxHashMap<u32, Vec<Usage>> {
        let mut usages: FxHashMap<u32, Vec<Usage>> = FxHashMap::default();
        for (_, args) in self.of_type(&["NEXT_ASSEMBLY_USAGE_OCCURRENCE"]) {
            let (Some(parent), Some(child)) = (Self::ref_arg(args, 3), Self::ref_arg(args, 4)) else {
                continue;
            };
            usages
                .entry(parent)
                .or_default()
                .push(Usage { name: Self::usage_name(args), child });
        }
        usages
    }

    /// Representation items of every definition that has a shape.
    fn items_by_definition(&self) -> FxHashMap<u32, Vec<u32>> {
        // definition shape -> definition
        let shapes: FxHashMap<u32, u32> = self
            .of_type(&["PRODUCT_DEFINITION_SHAPE"])
            .filter_map(|(id, args)| Some((id, Self::ref_arg(args, 2)?)))
            .collect();

        // representation -> representations linked by a plain relationship
        let mut linked: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
        for (_, args) in self.of_type(&["SHAPE_REPRESENTATION_RELATIONSHIP"]) {
            if let (Some(a), Some(b)) = (Self::ref_arg(args, 2), Self::ref_arg(args, 3)) {
                linked.entry(a).or_default().push(b);
                linked.entry(b).or_default().push(a);
            }
        }

        let mut items: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
        for (_, args) in self.of_type(&["SHAPE_DEFINITION_REPRESENTATION"]) {
            let Some(definition) = Self::ref_arg(args, 0).and_then(|s| shapes.get(&s)) else {
                continue;
            };
            let Some(rep) = Self::ref_arg(args, 1) else { continue };

            let out = items.entry(*definition).or_default();
            let reps = std::iter::once(rep).chain(linked.get(&rep).into_iter().flatten().copied());
            for rep in reps {
                if let Some(list) = self.get(rep).and_then(|e| e.arg(1)).and_then(Value::as_list) {
                    out.extend(list.iter().filter_map(Value::as_ref_id));
                }
            }
        }
        items
    }

    /// Colour per styled representation item; the first style wins.
    fn item_colors(&self) -> FxHashMap<u32, Color> {
        let mut colors = FxHashMap::default();
        for (_, args) in self.of_type(&["STYLED_ITEM", "OVER_RIDING_STYLED_ITEM"]) {
            let Some(item) = Self::ref_arg(args, 2) else { continue };
            if colors.contains_key(&item) {
                continue;
            }
            let mut refs = Vec::new();
            if let Some(styles) = args.get(1) {
                styles.collect_refs(&mut refs);
            }
            if let Some(color) = self.find_color(refs) {
                colors.insert(item, color);
            }
        }
        colors
    }

    /// Depth-limited search from style references down to a colour entity.
    fn find_color(&self, start: Vec<u32>) -> Option<Color> {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<(u32, usize)> = start.into_iter().rev().map(|id| (id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(entity) = self.get(id) else { continue };
            if let Some(color) = entity_color(entity) {
                return Some(color);
            }
            if depth >= MAX_STYLE_DEPTH {
                continue;
            }
            let mut refs = Vec::new();
            for (_, args) in &entity.records {
                args.iter().for_each(|v| v.collect_refs(&mut refs));
            }
            stack.extend(refs.into_iter().rev().map(|r| (r, depth + 1)));
        }
        None
    }
}

fn entity_color(entity: &Entity) -> Option<Color> {
    if let Some(args) = entity.args_if("COLOUR_RGB") {
        let channel = |i: usize| args.get(i).and_then(Value::as_real);
        return Some(Color::new(channel(1)?, channel(2)?, channel(3)?));
    }
    let name = Index::text_arg(entity.args_if("DRAUGHTING_PRE_DEFINED_COLOUR")?, 0)?;
    let [r, g, b] = match name {
        "red" => [1.0, 0.0, 0.0],
        "green" => [0.0, 1.0, 0.0],
        "blue" => [0.0, 0.0, 1.0],
        "yellow" => [1.0, 1.0, 0.0],
        "magenta" => [1.0, 0.0, 1.0],
        "cyan" => [0.0, 1.0, 1.0],
        "black" => [0.0, 0.0, 0.0],
        "white" => [1.0, 1.0, 1.0],
        _ => return None,
    };
    Some(Color::new(r, g, b))
}

/// Shape type of a representation item; `None` for items that carry no shape.
fn item_shape(entity: &Entity) -> Option<ShapeType> {
    let ty = entity.simple_type()?;
    Some(match ty {
        "MANIFOLD_SOLID_BREP" | "BREP_WITH_VOIDS" | "FACETED_BREP" => ShapeType::Solid,
        "SHELL_BASED_SURFACE_MODEL" | "OPEN_SHELL" | "CLOSED_SHELL" => ShapeType::Shell,
        "ADVANCED_FACE" | "FACE_SURFACE" => ShapeType::Face,
        "GEOMETRIC_CURVE_SET" => ShapeType::Wire,
        "EDGE_CURVE" => ShapeType::Edge,
        "VERTEX_POINT" => ShapeType::Vertex,
        "AXIS2_PLACEMENT_3D" | "AXIS2_PLACEMENT_2D" | "MAPPED_ITEM" => return None,
        _ => ShapeType::Other,
    })
}

/// Build the assembly tree from parsed DATA entities.
pub(super) fn build(entities: &FxHashMap<u32, Entity>, origin: &Path) -> Result<Assembly> {
    let index = Index::new(entities);
    let products = index.products_by_definition();
    let usages = index.usages();
    let items = index.items_by_definition();
    let colors = index.item_colors();

    let info = |definition: u32| -> ProductInfo {
        let shape_items: Vec<(u32, ShapeType)> = items
            .get(&definition)
            .into_iter()
            .flatten()
            .filter_map(|&item| Some((item, item_shape(index.get(item)?)?)))
            .collect();
        let shape_type = match shape_items.as_slice() {
            [] if usages.contains_key(&definition) => ShapeType::Compound,
            [] => ShapeType::Other,
            [(_, single)] => *single,
            _ => ShapeType::Compound,
        };
        ProductInfo {
            name: products.get(&definition).and_then(|&p| index.product_name(p)),
            shape_type,
            color: shape_items.iter().find_map(|(item, _)| colors.get(item).copied()),
        }
    };

    let used: FxHashSet<u32> = usages.values().flatten().map(|u| u.child).collect();
    let roots: Vec<u32> = index
        .definitions()
        .map(|(id, _)| id)
        .filter(|id| !used.contains(id))
        .collect();

    let mut doc = Assembly::new(Node::new(1, ShapeType::Compound));
    let mut stack = Vec::new();
    for (i, &definition) in roots.iter().enumerate() {
        let node = doc.add_child(doc.root(), product_node(i, info(definition), None))?;
        stack.push(Frame::Expand { definition, node });
    }
    stack.reverse();

    let mut path: FxHashSet<u32> = FxHashSet::default();
    while let Some(frame) = stack.pop() {
        let (definition, node) = match frame {
            Frame::Leave(definition) => {
                path.remove(&definition);
                continue;
            }
            Frame::Expand { definition, node } => (definition, node),
        };
        if !path.insert(definition) {
            return Err(Error::parse(
                origin,
                format!("assembly cycle through product definition #{definition}"),
            ));
        }
        stack.push(Frame::Leave(definition));

        let mut expanded = Vec::new();
        for (i, usage) in usages.get(&definition).into_iter().flatten().enumerate() {
            let child = doc.add_child(node, product_node(i, info(usage.child), usage.name.clone()))?;
            expanded.push(Frame::Expand { definition: usage.child, node: child });
        }
        stack.extend(expanded.into_iter().rev());
    }

    tracing::debug!(
        definitions = products.len(),
        roots = roots.len(),
        nodes = doc.len(),
        "built STEP product tree"
    );
    Ok(doc)
}

/// Node for the `position`-th child; an occurrence name overrides the product name.
fn product_node(position: usize, info: ProductInfo, occurrence: Option<String>) -> Node {
    Node {
        tag: position as u32 + 1,
        name: occurrence.or(info.name),
        color: info.color,
        shape_type: info.shape_type,
        ..Node::default()
    }
}
