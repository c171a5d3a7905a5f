//! Hierarchical export: one container group per assembly node.
//!
//! ```text
//! /<top>
//!     label_1                 root node: attributes
//!         label_1             first child
//!         label_2
//!             ...
//!     structure
//!         node_tags           int64[n], pre-order
//!         children            vlen<int64>[n], pre-order child indices
//! ```

use rustc_hash::{FxHashMap, FxHashSet};

use super::report::{ConstructFailure, ExportReport};
use crate::container::{AttrValue, Container, GroupId, ReleaseLedger, VlenBuffers};
use crate::extract::{AttributeExtractor, AttributeRecord};
use crate::kernel::GeometryKernel;
use crate::model::{Document, NodeId};
use crate::util::{ElementType, Error, PlainOldDataType, Result, Shape};
use crate::walk::{walk, NodeVisitor, Visit, VisitFlow};

/// Default name of the group that receives the tree.
pub const DEFAULT_TOP_GROUP: &str = "properties";
pub const STRUCTURE_GROUP: &str = "structure";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeExportOptions {
    pub top_group: String,
    /// Replace groups left by an earlier export instead of failing on them.
    pub overwrite: bool,
    /// Also write the `structure` arrays.
    pub structure: bool,
}

impl Default for TreeExportOptions {
    fn default() -> Self {
        Self { top_group: DEFAULT_TOP_GROUP.to_string(), overwrite: true, structure: true }
    }
}

/// Group name for a node with `tag`.
pub fn label_name(tag: u32) -> String {
    format!("label_{tag}")
}

/// Where a node ended up in the container.
struct Placed {
    group: GroupId,
    /// Pre-order index among written nodes.
    index: usize,
}

struct TreeWriter<'a, D: ?Sized, K> {
    doc: &'a D,
    extractor: &'a AttributeExtractor<K>,
    container: &'a mut Container,
    options: &'a TreeExportOptions,
    top: GroupId,
    /// Written ancestors of the node being visited, by depth.
    path: Vec<Placed>,
    /// Names handed out under each group during this export.
    names: FxHashMap<GroupId, FxHashSet<String>>,
    tags: Vec<i64>,
    children: Vec<Vec<i64>>,
    root_group: Option<GroupId>,
    report: ExportReport,
}

impl<D: Document + ?Sized, K: GeometryKernel> TreeWriter<'_, D, K> {
    /// `label_<tag>`, or `label_<tag>_<index>` when a sibling already took it.
    fn group_name(&mut self, parent: GroupId, visit: &Visit<'_>) -> String {
        let used = self.names.entry(parent).or_default();
        let mut name = label_name(visit.node.tag);
        if used.contains(&name) {
            name = format!("{name}_{}", visit.index);
            self.report.collisions += 1;
            tracing::debug!(entry = %visit.entry, name = %name, "sibling tag collision");
        }
        used.insert(name.clone());
        name
    }

    /// Create `name` under `parent`, reusing a group from an earlier export
    /// when overwriting. `None` when the conflict is recorded instead.
    fn open_group(&mut self, parent: GroupId, name: &str) -> Result<Option<GroupId>> {
        match self.container.create_group(parent, name) {
            Ok(group) => Ok(Some(group)),
            Err(err) if err.is_create_conflict() => {
                if let (true, Some(existing)) = (self.options.overwrite, self.container.group(parent, name)?) {
                    self.container.clear_group(existing)?;
                    return Ok(Some(existing));
                }
                tracing::warn!(%err, "construct not written");
                self.report.construct_failures.push(ConstructFailure {
                    path: self.container.group_path(parent)? + "/" + name,
                    message: err.to_string(),
                });
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn write_attributes(&mut self, group: GroupId, record: &AttributeRecord) -> Result<()> {
        let c = &mut *self.container;
        c.set_attribute(group, "tag", AttrValue::Int(record.tag.into()))?;
        c.set_attribute(group, "entry", AttrValue::Text(record.entry.clone()))?;
        c.set_attribute(group, "depth", AttrValue::Int(record.depth as i64))?;
        c.set_attribute(group, "shape_type", AttrValue::Text(record.shape_type.name().into()))?;
        if let Some(name) = &record.name {
            c.set_attribute(group, "name", AttrValue::Text(name.clone()))?;
        }
        if let Some(color) = record.color {
            c.set_attribute(group, "color", AttrValue::Floats(color.to_array().to_vec()))?;
        }
        if record.property.is_applicable() {
            c.set_attribute(group, "property", AttrValue::Text(record.property.tag().into()))?;
        }
        let values = [
            ("volume", record.property.volume()),
            ("area", record.property.area()),
            ("length", record.property.length()),
        ];
        for (key, value) in values {
            if let Some(v) = value {
                c.set_attribute(group, key, AttrValue::Float(v))?;
            }
        }
        if let Some(centroid) = record.centroid {
            c.set_attribute(group, "centroid", AttrValue::Floats(centroid.to_array().to_vec()))?;
        }
        Ok(())
    }

    /// `structure/node_tags` and `structure/children`.
    fn write_structure(&mut self) -> Result<()> {
        let Some(structure) = self.open_group(self.top, STRUCTURE_GROUP)? else {
            return Ok(());
        };
        self.report.groups_written += 1;
        let rows = self.tags.len();

        let tags = self.container.create_array(
            structure,
            "node_tags",
            ElementType::Pod(PlainOldDataType::Int64),
            Shape::d1(rows),
            None,
        )?;
        if rows > 0 {
            self.container.write_region(tags, 0, &self.tags)?;
        }

        let children = self.container.create_vlen_array(structure, "children", PlainOldDataType::Int64, rows)?;
        let ledger = ReleaseLedger::new();
        let lengths: Vec<usize> = self.children.iter().map(Vec::len).collect();
        let mut buffers = VlenBuffers::<i64>::allocate(&ledger, &lengths);
        for (i, row) in self.children.iter().enumerate() {
            if let Some(buffer) = buffers.row_mut(i) {
                buffer.copy_from_slice(row);
            }
        }
        self.container.write_vlen(children, &buffers, &lengths)?;
        buffers.release_all();
        drop(buffers);
        ledger.check_balanced()?;

        self.report.arrays_written += 2;
        Ok(())
    }
}

impl<D: Document + ?Sized, K: GeometryKernel> NodeVisitor for TreeWriter<'_, D, K> {
    fn visit(&mut self, visit: &Visit<'_>) -> Result<VisitFlow> {
        let extraction = self.extractor.extract(self.doc, visit);
        if extraction.is_degraded() {
            tracing::warn!(
                entry = %visit.entry,
                warnings = extraction.warnings.len(),
                first = %extraction.warnings[0],
                "degraded node"
            );
            self.report.degraded += 1;
        }
        self.report.warnings.extend(extraction.warnings);

        self.path.truncate(visit.depth);
        let parent = self.path.last().map(|p| p.group);
        let parent_group = parent.unwrap_or(self.top);
        let name = self.group_name(parent_group, visit);
        let Some(group) = self.open_group(parent_group, &name)? else {
            return Ok(VisitFlow::SkipChildren);
        };
        self.write_attributes(group, &extraction.record)?;
        self.report.groups_written += 1;
        if parent.is_none() {
            self.root_group = Some(group);
        }

        let index = self.tags.len();
        self.tags.push(visit.node.tag.into());
        self.children.push(Vec::new());
        if let Some(p) = self.path.last() {
            self.children[p.index].push(index as i64);
        }
        self.path.push(Placed { group, index });
        Ok(VisitFlow::Continue)
    }
}

/// Export the tree under `doc.root()` into `container`.
///
/// Per-node extraction problems and per-group conflicts end up in the
/// report. A traversal error removes what this call wrote and is returned.
pub fn export_tree<D, K>(
    doc: &D,
    extractor: &AttributeExtractor<K>,
    container: &mut Container,
    options: &TreeExportOptions,
) -> Result<ExportReport>
where
    D: Document + ?Sized,
    K: GeometryKernel,
{
    export_subtree(doc, doc.root(), extractor, container, options)
}

/// [`export_tree`] starting from any node.
pub fn export_subtree<D, K>(
    doc: &D,
    root: NodeId,
    extractor: &AttributeExtractor<K>,
    container: &mut Container,
    options: &TreeExportOptions,
) -> Result<ExportReport>
where
    D: Document + ?Sized,
    K: GeometryKernel,
{
    let span = tracing::info_span!("export_tree", top = %options.top_group, file = %container.path().display());
    let _enter = span.enter();

    let container_root = container.root();
    let (top, created_top) = match container.group(container_root, &options.top_group)? {
        Some(existing) if options.overwrite => {
            container.clear_group(existing)?;
            (existing, false)
        }
        Some(existing) => (existing, false),
        None => (container.create_group(container_root, &options.top_group)?, true),
    };

    let mut writer = TreeWriter {
        doc,
        extractor,
        container,
        options,
        top,
        path: Vec::new(),
        names: FxHashMap::default(),
        tags: Vec::new(),
        children: Vec::new(),
        root_group: None,
        report: ExportReport::default(),
    };
    writer.report.groups_written = usize::from(created_top);

    let walked = match walk(doc, root, &mut writer) {
        Ok(walked) => walked,
        Err(err @ Error::Traversal(_)) => {
            // discard the partial tree
            let discard = if created_top || options.overwrite { Some(top) } else { writer.root_group };
            if let Some(group) = discard {
                if let Err(cleanup) = writer.container.remove_group(group) {
                    tracing::warn!(%cleanup, "could not discard partial export");
                }
            }
            return Err(err);
        }
        Err(err) => return Err(err),
    };

    if options.structure {
        writer.write_structure()?;
    }
    writer.container.flush()?;
    let mut report = writer.report;
    report.visited = walked.visited;
    report.max_depth = walked.max_depth;

    tracing::info!(
        visited = report.visited,
        degraded = report.degraded,
        failures = report.construct_failures.len(),
        "tree export finished"
    );
    Ok(report)
}
