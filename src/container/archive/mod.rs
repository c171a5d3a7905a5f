//! In-memory container with create/open/close lifecycle.
//!
//! Groups, attributes and arrays live in an arena addressed by [`GroupId`]
//! and [`ArrayId`]. The file is rewritten from the arena on
//! [`Container::flush`] / [`Container::close`], so identical content always
//! yields a byte-identical file.

mod layout;

use std::path::{Path, PathBuf};

use smallvec::SmallVec;

use super::values::AttrValue;
use super::vlen::{ReleaseLedger, VlenBuffers};
use crate::util::{ContainerPod, ElementType, Error, MaxShape, PlainOldDataType, Result, Shape};

/// Handle to a group in a [`Container`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(usize);

/// Handle to an array in a [`Container`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayId(usize);

/// How an existing container is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Lifecycle of a single construct.
///
/// `Unopened -> Created -> Written -> Closed`; `Written -> Written` is an
/// in-place overwrite. Writing is only legal once a construct is created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConstructState {
    #[default]
    Unopened,
    Created,
    Written,
    Closed,
}

/// A named child of a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildRef {
    Group(GroupId),
    Array(ArrayId),
}

/// Snapshot of an array's declared type and extents.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayInfo {
    pub name: String,
    pub element: ElementType,
    pub shape: Shape,
    pub max_shape: MaxShape,
    pub state: ConstructState,
}

#[derive(Debug)]
struct GroupEntry {
    name: String,
    parent: Option<GroupId>,
    attributes: Vec<(String, AttrValue)>,
    children: Vec<ChildRef>,
}

#[derive(Debug)]
enum Payload {
    /// Row-major element bytes.
    Fixed(Vec<u8>),
    /// One byte buffer per row.
    VarLen(Vec<Vec<u8>>),
}

#[derive(Debug)]
struct ArrayEntry {
    name: String,
    parent: GroupId,
    element: ElementType,
    shape: Shape,
    max_shape: MaxShape,
    payload: Payload,
    state: ConstructState,
}

/// Hierarchical, strongly typed container file.
#[derive(Debug)]
pub struct Container {
    path: PathBuf,
    mode: OpenMode,
    closed: bool,
    dirty: bool,
    groups: Vec<Option<GroupEntry>>,
    arrays: Vec<Option<ArrayEntry>>,
}

impl Container {
    /// Create a new container file.
    ///
    /// An existing file is replaced only when `truncate` is set; otherwise
    /// this fails with [`Error::ContainerCreateConflict`] and the file is
    /// left untouched.
    pub fn create(path: impl AsRef<Path>, truncate: bool) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() && !truncate {
            return Err(Error::ContainerCreateConflict(path.display().to_string()));
        }
        let mut container = Self::empty(path, OpenMode::ReadWrite);
        container.groups.push(Some(GroupEntry {
            name: String::new(),
            parent: None,
            attributes: Vec::new(),
            children: Vec::new(),
        }));
        container.flush()?;
        tracing::debug!(path = %path.display(), "created container");
        Ok(container)
    }

    /// Open an existing container file.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let container = Self::load(path, mode)?;
        tracing::debug!(
            path = %path.display(),
            ?mode,
            groups = container.groups.len(),
            arrays = container.arrays.len(),
            "opened container"
        );
        Ok(container)
    }

    fn empty(path: &Path, mode: OpenMode) -> Self {
        Self {
            path: path.to_path_buf(),
            mode,
            closed: false,
            dirty: false,
            groups: Vec::new(),
            arrays: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The root group ("/").
    #[inline]
    pub fn root(&self) -> GroupId {
        GroupId(0)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if self.mode == OpenMode::ReadOnly {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    fn group_entry(&self, id: GroupId) -> Result<&GroupEntry> {
        self.groups
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::InvalidState(format!("group #{} does not exist", id.0)))
    }

    fn group_entry_mut(&mut self, id: GroupId) -> Result<&mut GroupEntry> {
        self.groups
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::InvalidState(format!("group #{} does not exist", id.0)))
    }

    fn array_entry(&self, id: ArrayId) -> Result<&ArrayEntry> {
        self.arrays.get(id.0).and_then(Option::as_ref).ok_or_else(|| {
            Error::InvalidState(format!("array #{} was never created or has been removed", id.0))
        })
    }

    fn array_entry_mut(&mut self, id: ArrayId) -> Result<&mut ArrayEntry> {
        self.arrays.get_mut(id.0).and_then(Option::as_mut).ok_or_else(|| {
            Error::InvalidState(format!("array #{} was never created or has been removed", id.0))
        })
    }

    fn child_name(&self, child: ChildRef) -> Result<&str> {
        match child {
            ChildRef::Group(g) => Ok(&self.group_entry(g)?.name),
            ChildRef::Array(a) => Ok(&self.array_entry(a)?.name),
        }
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Find a direct child of `parent` by name.
    pub fn child(&self, parent: GroupId, name: &str) -> Result<Option<ChildRef>> {
        self.check_open()?;
        for &child in &self.group_entry(parent)?.children {
            if self.child_name(child)? == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Find a direct child group by name.
    pub fn group(&self, parent: GroupId, name: &str) -> Result<Option<GroupId>> {
        Ok(match self.child(parent, name)? {
            Some(ChildRef::Group(g)) => Some(g),
            _ => None,
        })
    }

    /// Find a direct child array by name.
    pub fn array(&self, parent: GroupId, name: &str) -> Result<Option<ArrayId>> {
        Ok(match self.child(parent, name)? {
            Some(ChildRef::Array(a)) => Some(a),
            _ => None,
        })
    }

    /// Resolve a `/`-separated path to a child of the root.
    pub fn lookup(&self, path: &str) -> Result<ChildRef> {
        let mut current = ChildRef::Group(self.root());
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let ChildRef::Group(group) = current else {
                return Err(Error::NotFound(path.to_string()));
            };
            current = self.child(group, part)?.ok_or_else(|| Error::NotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Resolve a path that must name a group.
    pub fn lookup_group(&self, path: &str) -> Result<GroupId> {
        match self.lookup(path)? {
            ChildRef::Group(g) => Ok(g),
            ChildRef::Array(_) => Err(Error::TypeMismatch {
                expected: "group".into(),
                actual: format!("array at {path}"),
            }),
        }
    }

    /// Resolve a path that must name an array.
    pub fn lookup_array(&self, path: &str) -> Result<ArrayId> {
        match self.lookup(path)? {
            ChildRef::Array(a) => Ok(a),
            ChildRef::Group(_) => Err(Error::TypeMismatch {
                expected: "array".into(),
                actual: format!("group at {path}"),
            }),
        }
    }

    /// Children of a group in creation order, with their names.
    pub fn children(&self, group: GroupId) -> Result<Vec<(String, ChildRef)>> {
        self.check_open()?;
        self.group_entry(group)?
            .children
            .iter()
            .map(|&c| Ok((self.child_name(c)?.to_string(), c)))
            .collect()
    }

    pub fn group_name(&self, group: GroupId) -> Result<&str> {
        Ok(&self.group_entry(group)?.name)
    }

    /// Absolute path of a group, `/` for the root.
    pub fn group_path(&self, group: GroupId) -> Result<String> {
        let mut parts = Vec::new();
        let mut current = Some(group);
        while let Some(id) = current {
            let entry = self.group_entry(id)?;
            if entry.parent.is_some() {
                parts.push(entry.name.as_str());
            }
            current = entry.parent;
        }
        parts.reverse();
        Ok(format!("/{}", parts.join("/")))
    }

    fn child_path(&self, parent: GroupId, name: &str) -> Result<String> {
        let base = self.group_path(parent)?;
        Ok(if base == "/" { format!("/{name}") } else { format!("{base}/{name}") })
    }

    fn check_new_child(&self, parent: GroupId, name: &str) -> Result<()> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::invalid(format!("invalid construct name {name:?}")));
        }
        if self.child(parent, name)?.is_some() {
            return Err(Error::ContainerCreateConflict(self.child_path(parent, name)?));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Groups and attributes
    // -------------------------------------------------------------------------

    /// Create a child group. Fails with a conflict if the name is taken.
    pub fn create_group(&mut self, parent: GroupId, name: &str) -> Result<GroupId> {
        self.check_writable()?;
        self.check_new_child(parent, name)?;
        let id = GroupId(self.groups.len());
        self.groups.push(Some(GroupEntry {
            name: name.to_string(),
            parent: Some(parent),
            attributes: Vec::new(),
            children: Vec::new(),
        }));
        self.group_entry_mut(parent)?.children.push(ChildRef::Group(id));
        self.dirty = true;
        tracing::trace!(group = name, "create group");
        Ok(id)
    }

    /// Drop every attribute and child of a group, keeping the group itself
    /// and its position among its siblings.
    pub fn clear_group(&mut self, group: GroupId) -> Result<()> {
        self.check_writable()?;
        let children = std::mem::take(&mut self.group_entry_mut(group)?.children);
        for child in children {
            self.free_child(child);
        }
        self.group_entry_mut(group)?.attributes.clear();
        self.dirty = true;
        Ok(())
    }

    /// Remove a group and its whole subtree.
    pub fn remove_group(&mut self, group: GroupId) -> Result<()> {
        self.check_writable()?;
        let parent = self
            .group_entry(group)?
            .parent
            .ok_or_else(|| Error::InvalidState("the root group cannot be removed".into()))?;
        self.group_entry_mut(parent)?.children.retain(|c| *c != ChildRef::Group(group));
        self.free_child(ChildRef::Group(group));
        self.dirty = true;
        Ok(())
    }

    fn free_child(&mut self, child: ChildRef) {
        let mut pending = vec![child];
        while let Some(child) = pending.pop() {
            match child {
                ChildRef::Group(g) => {
                    if let Some(entry) = self.groups.get_mut(g.0).and_then(Option::take) {
                        pending.extend(entry.children);
                    }
                }
                ChildRef::Array(a) => {
                    if let Some(slot) = self.arrays.get_mut(a.0) {
                        *slot = None;
                    }
                }
            }
        }
    }

    /// Set (or replace) a scalar attribute on a group.
    pub fn set_attribute(&mut self, group: GroupId, name: &str, value: AttrValue) -> Result<()> {
        self.check_writable()?;
        let attrs = &mut self.group_entry_mut(group)?.attributes;
        match attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => attrs.push((name.to_string(), value)),
        }
        self.dirty = true;
        Ok(())
    }

    pub fn attribute(&self, group: GroupId, name: &str) -> Result<Option<&AttrValue>> {
        self.check_open()?;
        Ok(self.group_entry(group)?.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v))
    }

    /// All attributes of a group in the order they were first set.
    pub fn attributes(&self, group: GroupId) -> Result<&[(String, AttrValue)]> {
        self.check_open()?;
        Ok(&self.group_entry(group)?.attributes)
    }

    // -------------------------------------------------------------------------
    // Arrays
    // -------------------------------------------------------------------------

    /// Create a typed array with a declared shape.
    ///
    /// `max_shape` defaults to the shape itself (not resizable). Fixed-size
    /// elements start zero-filled; variable-length arrays must be rank 1 and
    /// start with empty rows.
    pub fn create_array(
        &mut self,
        parent: GroupId,
        name: &str,
        element: ElementType,
        shape: Shape,
        max_shape: Option<MaxShape>,
    ) -> Result<ArrayId> {
        self.check_writable()?;
        self.check_new_child(parent, name)?;
        if !element.is_valid() {
            return Err(Error::invalid(format!("invalid element type {element}")));
        }
        let max_shape = max_shape.unwrap_or_else(|| MaxShape::fixed(&shape));
        max_shape.admits(&shape)?;

        let payload = match element.num_bytes() {
            Some(size) => Payload::Fixed(vec![0u8; payload_len(name, &shape, size)?]),
            None => {
                if shape.rank() != 1 {
                    return Err(Error::ShapeMismatch(format!(
                        "variable-length array {name} must be rank 1, got {shape}"
                    )));
                }
                // one u64 length per row on disk
                payload_len(name, &shape, 8)?;
                Payload::VarLen(vec![Vec::new(); shape.rows()])
            }
        };

        let id = ArrayId(self.arrays.len());
        tracing::trace!(array = name, %element, %shape, %max_shape, "create array");
        self.arrays.push(Some(ArrayEntry {
            name: name.to_string(),
            parent,
            element,
            shape,
            max_shape,
            payload,
            state: ConstructState::Created,
        }));
        self.group_entry_mut(parent)?.children.push(ChildRef::Array(id));
        self.dirty = true;
        Ok(id)
    }

    /// Create a rank-1 variable-length array of `rows` entries.
    pub fn create_vlen_array(
        &mut self,
        parent: GroupId,
        name: &str,
        pod: PlainOldDataType,
        rows: usize,
    ) -> Result<ArrayId> {
        self.create_array(parent, name, ElementType::VarLen(pod), Shape::d1(rows), None)
    }

    pub fn array_info(&self, id: ArrayId) -> Result<ArrayInfo> {
        self.check_open()?;
        let entry = self.array_entry(id)?;
        Ok(ArrayInfo {
            name: entry.name.clone(),
            element: entry.element.clone(),
            shape: entry.shape.clone(),
            max_shape: entry.max_shape.clone(),
            state: entry.state,
        })
    }

    /// Group that owns an array.
    pub fn array_parent(&self, id: ArrayId) -> Result<GroupId> {
        Ok(self.array_entry(id)?.parent)
    }

    /// Construct state of an array; a removed or unknown id is `Unopened`.
    pub fn state(&self, id: ArrayId) -> ConstructState {
        if self.closed {
            return ConstructState::Closed;
        }
        self.arrays
            .get(id.0)
            .and_then(Option::as_ref)
            .map_or(ConstructState::Unopened, |e| e.state)
    }

    /// Write whole rows (slabs along dimension 0) starting at row `offset`.
    pub fn write_region<T: ContainerPod>(
        &mut self,
        id: ArrayId,
        offset: usize,
        values: &[T],
    ) -> Result<()> {
        self.expect_element(id, &ElementType::Pod(T::POD_TYPE))?;
        self.write_region_bytes(id, offset, bytemuck::cast_slice(values))
    }

    /// Write pre-encoded rows (text, compound or numeric) starting at row `offset`.
    pub fn write_region_bytes(&mut self, id: ArrayId, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_writable()?;
        let entry = self.array_entry_mut(id)?;
        let (start, end) = region_bounds(entry, offset, bytes.len())?;
        let Payload::Fixed(data) = &mut entry.payload else {
            return Err(Error::TypeMismatch {
                expected: "fixed-size elements".into(),
                actual: entry.element.to_string(),
            });
        };
        data[start..end].copy_from_slice(bytes);
        entry.state = ConstructState::Written;
        self.dirty = true;
        Ok(())
    }

    /// Read `count` rows starting at row `offset`.
    pub fn read_region<T: ContainerPod>(
        &self,
        id: ArrayId,
        offset: usize,
        count: usize,
    ) -> Result<Vec<T>> {
        self.expect_element(id, &ElementType::Pod(T::POD_TYPE))?;
        let bytes = self.read_region_bytes(id, offset, count)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Read `count` raw rows starting at row `offset`.
    pub fn read_region_bytes(&self, id: ArrayId, offset: usize, count: usize) -> Result<Vec<u8>> {
        self.check_open()?;
        let entry = self.array_entry(id)?;
        let Payload::Fixed(data) = &entry.payload else {
            return Err(Error::TypeMismatch {
                expected: "fixed-size elements".into(),
                actual: entry.element.to_string(),
            });
        };
        let len = row_bytes(entry)?.checked_mul(count).ok_or_else(|| {
            Error::ShapeMismatch(format!("{count} rows of {} overflow the address space", entry.name))
        })?;
        let (start, end) = region_bounds(entry, offset, len)?;
        Ok(data[start..end].to_vec())
    }

    /// Read every element of a numeric array, row-major.
    pub fn read_all<T: ContainerPod>(&self, id: ArrayId) -> Result<Vec<T>> {
        let rows = self.array_entry(id)?.shape.rows();
        self.read_region(id, 0, rows)
    }

    /// Grow an array to `new_shape`, keeping existing elements in place.
    ///
    /// Only dimensions whose maximum allows it may grow; shrinking is an error.
    pub fn extend(&mut self, id: ArrayId, new_shape: Shape) -> Result<()> {
        self.check_writable()?;
        let entry = self.array_entry_mut(id)?;
        if entry.shape.is_scalar() {
            return Err(Error::ShapeMismatch(format!("{} is a scalar", entry.name)));
        }
        entry.max_shape.admits(&new_shape)?;
        for (dim, (&old, &new)) in entry.shape.sizes().iter().zip(new_shape.sizes()).enumerate() {
            if new < old {
                return Err(Error::ShapeMismatch(format!(
                    "dimension {dim} of {} cannot shrink from {old} to {new}",
                    entry.name
                )));
            }
        }

        let size = entry.element.num_bytes();
        match (&mut entry.payload, size) {
            (Payload::Fixed(data), Some(size)) => {
                let len = payload_len(&entry.name, &new_shape, size)?;
                *data = relayout(data, &entry.shape, &new_shape, size, len);
            }
            (Payload::VarLen(rows), _) => {
                payload_len(&entry.name, &new_shape, 8)?;
                rows.resize(new_shape.rows(), Vec::new());
            }
            (Payload::Fixed(_), None) => return Err(Error::invalid("fixed payload without element size")),
        }
        tracing::trace!(array = %entry.name, from = %entry.shape, to = %new_shape, "extend");
        entry.shape = new_shape;
        self.dirty = true;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Variable-length arrays
    // -------------------------------------------------------------------------

    /// Copy every row of `buffers` into the array.
    ///
    /// `lengths` must give the element count of every row and match the
    /// buffers. The container keeps its own copy, so the caller releases
    /// `buffers` once this returns.
    pub fn write_vlen<T: ContainerPod>(
        &mut self,
        id: ArrayId,
        buffers: &VlenBuffers<T>,
        lengths: &[usize],
    ) -> Result<()> {
        self.check_writable()?;
        self.expect_element(id, &ElementType::VarLen(T::POD_TYPE))?;
        let entry = self.array_entry_mut(id)?;
        let rows = entry.shape.rows();
        if lengths.len() != rows || buffers.len() != rows {
            return Err(Error::ShapeMismatch(format!(
                "{} has {rows} rows, got {} lengths and {} buffers",
                entry.name,
                lengths.len(),
                buffers.len()
            )));
        }

        let mut stored = Vec::with_capacity(rows);
        for (i, &len) in lengths.iter().enumerate() {
            let row = buffers
                .row(i)
                .ok_or_else(|| Error::InvalidState(format!("row {i} released before write")))?;
            if row.len() != len {
                return Err(Error::ShapeMismatch(format!(
                    "row {i}: declared length {len}, buffer holds {}",
                    row.len()
                )));
            }
            stored.push(bytemuck::cast_slice::<T, u8>(row).to_vec());
        }

        entry.payload = Payload::VarLen(stored);
        entry.state = ConstructState::Written;
        self.dirty = true;
        Ok(())
    }

    /// Read every row into freshly allocated buffers recorded in `ledger`.
    pub fn read_vlen<T: ContainerPod>(
        &self,
        id: ArrayId,
        ledger: &ReleaseLedger,
    ) -> Result<VlenBuffers<T>> {
        self.check_open()?;
        self.expect_element(id, &ElementType::VarLen(T::POD_TYPE))?;
        let Payload::VarLen(rows) = &self.array_entry(id)?.payload else {
            return Err(Error::invalid("variable-length array with fixed payload"));
        };
        let rows = rows.iter().map(|r| bytemuck::pod_collect_to_vec::<u8, T>(r)).collect();
        Ok(VlenBuffers::from_rows(ledger, rows))
    }

    /// Element count of every row of a variable-length array.
    pub fn vlen_lengths(&self, id: ArrayId) -> Result<Vec<usize>> {
        self.check_open()?;
        let entry = self.array_entry(id)?;
        let (Payload::VarLen(rows), ElementType::VarLen(pod)) = (&entry.payload, &entry.element)
        else {
            return Err(Error::TypeMismatch {
                expected: "variable-length array".into(),
                actual: entry.element.to_string(),
            });
        };
        Ok(rows.iter().map(|r| r.len() / pod.num_bytes()).collect())
    }

    fn expect_element(&self, id: ArrayId, expected: &ElementType) -> Result<()> {
        let entry = self.array_entry(id)?;
        if &entry.element != expected {
            return Err(Error::TypeMismatch {
                expected: expected.to_string(),
                actual: entry.element.to_string(),
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Rewrite the file from the in-memory arena.
    pub fn flush(&mut self) -> Result<()> {
        self.check_writable()?;
        self.save()?;
        self.dirty = false;
        Ok(())
    }

    /// Flush (when writable) and close. Any further use fails with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        self.check_open()?;
        if self.mode == OpenMode::ReadWrite {
            self.flush()?;
        }
        for entry in self.arrays.iter_mut().flatten() {
            entry.state = ConstructState::Closed;
        }
        self.closed = true;
        tracing::debug!(path = %self.path.display(), "closed container");
        Ok(())
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if !self.closed && self.dirty && self.mode == OpenMode::ReadWrite {
            if let Err(err) = self.save() {
                tracing::warn!(path = %self.path.display(), %err, "failed to flush container on drop");
            }
        }
    }
}

fn row_bytes(entry: &ArrayEntry) -> Result<usize> {
    let size = entry
        .element
        .num_bytes()
        .ok_or_else(|| Error::invalid("variable-length elements have no fixed row size"))?;
    entry.shape.checked_row_bytes(size).ok_or_else(|| {
        Error::ShapeMismatch(format!("row of {} overflows the address space", entry.name))
    })
}

/// Byte length of a fixed-size payload holding every element of `shape`.
fn payload_len(name: &str, shape: &Shape, size: usize) -> Result<usize> {
    shape
        .checked_bytes(size)
        .ok_or_else(|| Error::ShapeMismatch(format!("{shape} elements of {name} overflow the address space")))
}

/// Byte range covered by `len` bytes of whole rows starting at row `offset`.
fn region_bounds(entry: &ArrayEntry, offset: usize, len: usize) -> Result<(usize, usize)> {
    let row_bytes = row_bytes(entry)?;
    if row_bytes == 0 {
        return if len == 0 { Ok((0, 0)) } else {
            Err(Error::ShapeMismatch(format!("{} has zero-sized rows", entry.name)))
        };
    }
    if len % row_bytes != 0 {
        return Err(Error::ShapeMismatch(format!(
            "{} bytes is not a whole number of {}-byte rows in {}",
            len, row_bytes, entry.name
        )));
    }
    let count = len / row_bytes;
    let rows = entry.shape.rows();
    match offset.checked_add(count) {
        // end <= rows, and rows * row_bytes is the payload length
        Some(end) if end <= rows => Ok((offset * row_bytes, end * row_bytes)),
        _ => Err(Error::ShapeMismatch(format!(
            "{count} rows at offset {offset} out of range for {} with {rows} rows",
            entry.name
        ))),
    }
}

/// Copy row-major elements of `old_shape` into a zeroed buffer of `new_shape`.
fn relayout(old: &[u8], old_shape: &Shape, new_shape: &Shape, size: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if old_shape.sizes()[1..] == new_shape.sizes()[1..] {
        out[..old.len()].copy_from_slice(old);
        return out;
    }

    let old_dims = old_shape.sizes();
    let new_dims = new_shape.sizes();
    let mut index: SmallVec<[usize; 4]> = SmallVec::from_elem(0, old_dims.len());
    for flat in 0..old_shape.num_points() {
        let mut rem = flat;
        for d in (0..old_dims.len()).rev() {
            index[d] = rem % old_dims[d];
            rem /= old_dims[d];
        }
        let target = index.iter().zip(new_dims).fold(0, |acc, (&i, &n)| acc * n + i);
        out[target * size..(target + 1) * size]
            .copy_from_slice(&old[flat * size..(flat + 1) * size]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relayout_columns() {
        // 2x2 -> 3x3 keeps (r, c) positions
        let old: Vec<u8> = vec![1, 2, 3, 4];
        let out = relayout(&old, &Shape::d2(2, 2), &Shape::d2(3, 3), 1, 9);
        assert_eq!(out, vec![1, 2, 0, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn test_relayout_rows_only() {
        let old: Vec<u8> = vec![1, 2, 3, 4];
        let out = relayout(&old, &Shape::d2(2, 2), &Shape::d2(3, 2), 1, 6);
        assert_eq!(out, vec![1, 2, 3, 4, 0, 0]);
    }
}
