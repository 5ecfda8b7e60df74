// Copyright (C) 2023 meshforge contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::marker::PhantomData;

use crate::{
    prelude::*,
    sync::{BorrowedRef, InteriorMutable, MutableRef},
};

use glam::*;
use itertools::Itertools;
use slotmap::{SecondaryMap, SlotMap};
use smallvec::SmallVec;

/// Implements indexing traits so the mesh data structure can be used to access
/// vertex, edge, face or halfedge information using ids as indices.
pub mod mesh_index_impls;

/// Type-safe wrappers over the internal allocator indices used as pointers
pub mod id_types;
pub use id_types::*;

/// An API to represent type-safe and error-handled graph traversals over a mesh
pub mod traversals;
pub use traversals::*;

/// Primitive shapes, like boxes or spheres, used to build test meshes.
pub mod primitives;

/// High level polygon edit operations on a HalfEdge mesh: flip, split,
/// collapse, erase, bevel.
pub mod edit_ops;

/// Triangulation, subdivision position rules and QEM simplification.
pub mod global_ops;

/// Re-verifies the manifold invariants of a mesh.
pub mod validate;

pub mod channels;
pub use channels::*;

/// HalfEdge meshes are a type of linked list. This means it is sometimes
/// impossible to ensure some algorithms will terminate when the mesh is
/// malformed. To ensure the code never goes into an infinite loop, this max
/// number of iterations will be performed before giving an error. This error
/// should be large enough, as faces with a very large number of vertices may
/// trigger it.
pub const MAX_LOOP_ITERATIONS: usize = 8196;

#[derive(Debug, Default, Clone)]
pub struct HalfEdge {
    twin: Option<HalfEdgeId>,
    next: Option<HalfEdgeId>,
    vertex: Option<VertexId>,
    edge: Option<EdgeId>,
    face: Option<FaceId>,
}

#[derive(Debug, Clone, Default)]
pub struct Vertex {
    halfedge: Option<HalfEdgeId>,
}

#[derive(Debug, Clone)]
pub struct Edge {
    halfedge: HalfEdgeId,
}

/// A face is either a real polygon of the mesh, or a `boundary` face: a
/// virtual face materializing a hole so that every halfedge, including those
/// that walk around the outside of the mesh, has somewhere to point.
/// Boundary faces are excluded from triangulation, subdivision and quadric
/// accumulation.
#[derive(Debug, Clone)]
pub struct Face {
    halfedge: Option<HalfEdgeId>,
    boundary: bool,
}

/// Stored as RGBA
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DebugColor(pub u32);

impl DebugColor {
    pub fn r(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn g(&self) -> u8 {
        ((self.0 >> 16) & 0x00_00_00_ff) as u8
    }

    pub fn b(&self) -> u8 {
        ((self.0 >> 8) & 0x00_00_00_ff) as u8
    }

    pub fn a(&self) -> u8 {
        (self.0 & 0x00_00_00_ff) as u8
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DebugMark {
    pub label: String,
    pub color: DebugColor,
}

impl DebugMark {
    pub fn blue(label: &str) -> Self {
        Self::new(label, DebugColor(0x00_00_ff_ff))
    }

    pub fn red(label: &str) -> Self {
        Self::new(label, DebugColor(0xff_00_00_ff))
    }

    pub fn green(label: &str) -> Self {
        Self::new(label, DebugColor(0x00_ff_00_ff))
    }

    pub fn purple(label: &str) -> Self {
        Self::new(label, DebugColor(0xff_00_ff_ff))
    }

    pub fn new(label: &str, color: DebugColor) -> Self {
        Self {
            label: label.to_owned(),
            color,
        }
    }
}

/// The core connectivity graph: four arenas plus, for each, a set of
/// entities marked for deletion but not yet swept. See [`MeshConnectivity::commit`].
#[derive(Debug, Default, Clone)]
pub struct MeshConnectivity {
    vertices: SlotMap<VertexId, Vertex>,
    edges: SlotMap<EdgeId, Edge>,
    faces: SlotMap<FaceId, Face>,
    halfedges: SlotMap<HalfEdgeId, HalfEdge>,

    erased_vertices: HashSet<VertexId>,
    erased_edges: HashSet<EdgeId>,
    erased_faces: HashSet<FaceId>,
    erased_halfedges: HashSet<HalfEdgeId>,

    debug_edges: HashMap<HalfEdgeId, DebugMark>,
    debug_vertices: HashMap<VertexId, DebugMark>,
}

/// This struct contains some parameters that allow configuring the way in which
/// a mesh is generated.
#[derive(Default, Debug, Clone)]
pub struct MeshGenerationConfig {
    /// Should this mesh be generated using smooth (i.e. per-vertex) normals? Or
    /// flat (i.e. per-face) normals?
    pub smooth_normals: bool,
}

#[derive(Debug)]
#[cfg_attr(not(feature = "sync"), derive(Clone))]
pub struct HalfEdgeMesh {
    connectivity: InteriorMutable<MeshConnectivity>,
    positions: InteriorMutable<Positions>,
    channels: InteriorMutable<MeshChannels>,
    pub gen_config: MeshGenerationConfig,
}

#[cfg(feature = "sync")]
impl Clone for HalfEdgeMesh {
    fn clone(&self) -> Self {
        HalfEdgeMesh {
            connectivity: InteriorMutable::new(self.connectivity.borrow().clone()),
            positions: InteriorMutable::new(self.positions.borrow().clone()),
            channels: InteriorMutable::new(self.channels.borrow().clone()),
            gen_config: self.gen_config.clone(),
        }
    }
}

impl MeshConnectivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the edges of a given face
    pub fn face_edges(&self, face_id: FaceId) -> SVec<HalfEdgeId> {
        let mut edges = SmallVec::new();
        let h0 = self[face_id].halfedge.expect("Face should have a halfedge");
        let mut h = h0;

        edges.push(h);

        let mut counter = 0;

        loop {
            if counter > MAX_LOOP_ITERATIONS {
                panic!("Max number of iterations reached. Is the mesh malformed?");
            }
            counter += 1;

            h = self[h]
                .next
                .unwrap_or_else(|| panic!("Halfedge {h:?} has no next"));
            if h == h0 {
                break;
            }
            edges.push(h);
        }

        edges
    }

    pub fn face_vertices(&self, face_id: FaceId) -> SVec<VertexId> {
        self.face_edges(face_id)
            .iter()
            .map(|e| self.at_halfedge(*e).vertex().end())
            .collect()
    }

    pub fn edge_endpoints(&self, edge: HalfEdgeId) -> (VertexId, VertexId) {
        let a = self.at_halfedge(edge).vertex().end();
        let b = self.at_halfedge(edge).next().vertex().end();
        (a, b)
    }

    /// Given a `self` in an inconsistent state, where some halfedges have no
    /// `twin` (because they lie on a hole boundary), this method adds twin
    /// halfedges forming a loop across the boundary, and materializes one
    /// `boundary: true` `Face` per hole so no halfedge is ever left pointing
    /// at nothing.
    fn add_boundary_halfedges(&mut self) {
        // Clone to avoid double-borrow issues
        let halfedges: Vec<HalfEdgeId> = self.iter_halfedges().map(|(h, _)| h).collect();

        for &h0 in halfedges.iter() {
            let mut boundary_halfedges = Vec::<HalfEdgeId>::new();
            if self[h0].twin.is_none() {
                let mut h_it = h0;
                loop {
                    let t = self.alloc_halfedge(HalfEdge::default());
                    boundary_halfedges.push(t);
                    self[h_it].twin = Some(t);
                    self[t].twin = Some(h_it);
                    self[t].vertex = Some(self.at_halfedge(h_it).next().vertex().end());

                    // Look for the next outgoing halfedge for this vertex
                    // that's in the boundary
                    h_it = self.at_halfedge(h_it).next().end();
                    while h_it != h0 && self[h_it].twin.is_some() {
                        // Twin-next cycles around the outgoing halfedges of a vertex
                        h_it = self.at_halfedge(h_it).twin().next().end();
                    }

                    if h_it == h0 {
                        break;
                    }
                }
            }

            if !boundary_halfedges.is_empty() {
                let hole = self.alloc_face_raw(true);
                self[hole].halfedge = Some(boundary_halfedges[0]);
                for &b_h in boundary_halfedges.iter() {
                    self[b_h].face = Some(hole);
                }
            }

            for (&b_h, &b_h_next) in boundary_halfedges.iter().rev().circular_tuple_windows() {
                self[b_h].next = Some(b_h_next);
            }
        }
    }

    /// Walks every halfedge pair and allocates the `Edge` entity shared by
    /// both sides of it, setting `HalfEdge::edge` on each. Must run after
    /// every halfedge has a `twin` (i.e. after [`Self::add_boundary_halfedges`]).
    fn assign_edges(&mut self) {
        let halfedges: Vec<HalfEdgeId> = self.iter_halfedges().map(|(h, _)| h).collect();
        for h in halfedges {
            if self[h].edge.is_some() {
                continue;
            }
            let t = self[h].twin.expect("Halfedge should have a twin by now");
            let e = self.edges.insert(Edge { halfedge: h });
            self[h].edge = Some(e);
            self[t].edge = Some(e);
        }
    }

    fn halfedge_loop(&self, h0: HalfEdgeId) -> SVec<HalfEdgeId> {
        let mut ret = smallvec::smallvec![h0];
        let mut h = h0;

        let mut count = 0;

        loop {
            if count > MAX_LOOP_ITERATIONS {
                panic!("Max number of iterations reached. Is the mesh malformed?");
            }
            count += 1;

            h = self[h].next.expect("Halfedges should form a loop");
            if h == h0 {
                break;
            } else {
                ret.push(h);
            }
        }
        ret
    }

    /// Returns an iterator that follows the next pointer for halfedges starting
    /// at `h0` until closing the loop.
    fn halfedge_loop_iter(&self, h0: HalfEdgeId) -> HalfedgeOpIterator<'_, NextOp> {
        HalfedgeOpIterator {
            conn: self,
            start: h0,
            next: h0,
            count: 0,
            _op: PhantomData,
        }
    }

    /// Returns an iterator that cycles around the halfedge fan starting at `h0`
    /// until closing the loop.
    #[allow(dead_code)]
    fn halfedge_fan_iter(&self, h0: HalfEdgeId) -> HalfedgeOpIterator<'_, CycleFanOp> {
        HalfedgeOpIterator {
            conn: self,
            start: h0,
            next: h0,
            count: 0,
            _op: PhantomData,
        }
    }

    pub fn iter_vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> {
        self.vertices
            .iter()
            .filter(move |(k, _)| !self.erased_vertices.contains(k))
    }

    pub fn iter_vertices_with_channel<'a, T: Clone + Default>(
        &'a self,
        channel: &'a Channel<VertexId, T>,
    ) -> impl Iterator<Item = (VertexId, &'a Vertex, T)> + 'a {
        self.iter_vertices().map(|(id, v)| (id, v, channel[id].clone()))
    }

    pub fn iter_edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges
            .iter()
            .filter(move |(k, _)| !self.erased_edges.contains(k))
    }

    pub fn iter_faces(&self) -> impl Iterator<Item = (FaceId, &Face)> {
        self.faces
            .iter()
            .filter(move |(k, _)| !self.erased_faces.contains(k))
    }

    pub fn iter_faces_with_channel<'a, T: Clone + Default>(
        &'a self,
        channel: &'a Channel<FaceId, T>,
    ) -> impl Iterator<Item = (FaceId, &'a Face, T)> + 'a {
        self.iter_faces().map(|(id, v)| (id, v, channel[id].clone()))
    }

    pub fn iter_halfedges(&self) -> impl Iterator<Item = (HalfEdgeId, &HalfEdge)> {
        self.halfedges
            .iter()
            .filter(move |(k, _)| !self.erased_halfedges.contains(k))
    }

    pub fn iter_halfedges_with_channel<'a, T: Clone + Default>(
        &'a self,
        channel: &'a Channel<HalfEdgeId, T>,
    ) -> impl Iterator<Item = (HalfEdgeId, &'a HalfEdge, T)> + 'a {
        self.iter_halfedges().map(|(id, v)| (id, v, channel[id].clone()))
    }

    /// Adds a new vertex to the mesh, disconnected from everything else. Returns its handle.
    fn alloc_vertex(
        &mut self,
        positions: &mut Positions,
        position: Vec3,
        halfedge: Option<HalfEdgeId>,
    ) -> VertexId {
        let v = self.vertices.insert(Vertex { halfedge });
        positions[v] = position;
        v
    }

    /// Adds a new vertex to the mesh, disconnected from everything else.
    /// Returns its handle. Unlike `alloc_vertex`, this function does not set
    /// the vertex position, implicitly leaving it at zero.
    fn alloc_vertex_raw(&mut self, halfedge: Option<HalfEdgeId>) -> VertexId {
        self.vertices.insert(Vertex { halfedge })
    }

    /// Adds a new face to the mesh, disconnected from everything else. Returns its handle.
    fn alloc_face(&mut self, halfedge: Option<HalfEdgeId>) -> FaceId {
        self.faces.insert(Face {
            halfedge,
            boundary: false,
        })
    }

    /// Adds a new face, explicitly choosing whether it is a boundary face.
    fn alloc_face_raw(&mut self, boundary: bool) -> FaceId {
        self.faces.insert(Face {
            halfedge: None,
            boundary,
        })
    }

    /// Adds a new vertex to the mesh, disconnected from everything else. Returns its handle.
    fn alloc_halfedge(&mut self, halfedge: HalfEdge) -> HalfEdgeId {
        self.halfedges.insert(halfedge)
    }

    /// Allocates an edge whose `halfedge` pointer is set separately; used
    /// while merging two meshes, when the halfedge side isn't known yet.
    fn alloc_edge_raw(&mut self) -> EdgeId {
        self.edges.insert(Edge {
            halfedge: HalfEdgeId::default(),
        })
    }

    /// Marks `vertex` for deletion. The handle stays resolvable until the
    /// next [`Self::commit`].
    pub fn erase_vertex(&mut self, vertex: VertexId) {
        self.erased_vertices.insert(vertex);
    }

    /// Marks `edge` for deletion. The handle stays resolvable until the
    /// next [`Self::commit`].
    pub fn erase_edge(&mut self, edge: EdgeId) {
        self.erased_edges.insert(edge);
    }

    /// Marks `face` for deletion. The handle stays resolvable until the
    /// next [`Self::commit`].
    pub fn erase_face(&mut self, face: FaceId) {
        self.erased_faces.insert(face);
    }

    /// Marks `halfedge` for deletion. The handle stays resolvable until the
    /// next [`Self::commit`].
    pub fn erase_halfedge(&mut self, halfedge: HalfEdgeId) {
        self.erased_halfedges.insert(halfedge);
    }

    /// Immediately removes `vertex` from storage, bypassing the mark-then-sweep
    /// lifecycle. Only used where deferred deletion buys nothing: from-scratch
    /// mesh construction (see [`primitives`](super::primitives)) and from
    /// [`Self::commit`] itself.
    pub(crate) fn remove_vertex(&mut self, vertex: VertexId) {
        self.vertices.remove(vertex);
        self.erased_vertices.remove(&vertex);
        self.debug_vertices.remove(&vertex);
    }

    pub(crate) fn remove_edge(&mut self, edge: EdgeId) {
        self.edges.remove(edge);
        self.erased_edges.remove(&edge);
    }

    pub(crate) fn remove_face(&mut self, face: FaceId) {
        self.faces.remove(face);
        self.erased_faces.remove(&face);
    }

    pub(crate) fn remove_halfedge(&mut self, halfedge: HalfEdgeId) {
        self.halfedges.remove(halfedge);
        self.erased_halfedges.remove(&halfedge);
        self.debug_edges.remove(&halfedge);
    }

    /// Physically removes every entity marked by `erase_*` since the last
    /// `commit`. Operations only ever call `erase_*`; this is the one place
    /// that actually frees storage, so a validator run between an operation
    /// and its commit still sees the pre-sweep graph.
    pub fn commit(&mut self) {
        let halfedges: Vec<_> = self.erased_halfedges.drain().collect();
        for h in halfedges {
            self.halfedges.remove(h);
            self.debug_edges.remove(&h);
        }
        let edges: Vec<_> = self.erased_edges.drain().collect();
        for e in edges {
            self.edges.remove(e);
        }
        let faces: Vec<_> = self.erased_faces.drain().collect();
        for f in faces {
            self.faces.remove(f);
        }
        let vertices: Vec<_> = self.erased_vertices.drain().collect();
        for v in vertices {
            self.vertices.remove(v);
            self.debug_vertices.remove(&v);
        }
    }

    pub fn vertex_exists(&self, vertex: VertexId) -> bool {
        self.vertices.contains_key(vertex) && !self.erased_vertices.contains(&vertex)
    }

    pub fn edge_exists(&self, edge: EdgeId) -> bool {
        self.edges.contains_key(edge) && !self.erased_edges.contains(&edge)
    }

    pub fn face_exists(&self, face: FaceId) -> bool {
        self.faces.contains_key(face) && !self.erased_faces.contains(&face)
    }

    pub fn halfedge_exists(&self, halfedge: HalfEdgeId) -> bool {
        self.halfedges.contains_key(halfedge) && !self.erased_halfedges.contains(&halfedge)
    }

    pub fn vertex_debug_mark(&self, vertex: VertexId) -> Option<DebugMark> {
        self.debug_vertices.get(&vertex).cloned()
    }

    pub fn add_debug_vertex(&mut self, vertex: VertexId, mark: DebugMark) {
        self.debug_vertices.insert(vertex, mark);
    }

    pub fn halfedge_debug_mark(&self, edge: HalfEdgeId) -> Option<DebugMark> {
        self.debug_edges.get(&edge).cloned()
    }

    pub fn add_debug_halfedge(&mut self, h: HalfEdgeId, mark: DebugMark) {
        self.debug_edges.insert(h, mark);
    }

    pub fn iter_debug_halfedges(&self) -> impl Iterator<Item = (&HalfEdgeId, &DebugMark)> {
        self.debug_edges.iter()
    }

    pub fn iter_debug_vertices(&self) -> impl Iterator<Item = (&VertexId, &DebugMark)> {
        self.debug_vertices.iter()
    }

    pub fn clear_debug(&mut self) {
        self.debug_edges.clear();
        self.debug_vertices.clear();
    }

    /// Returns the average of a face's vertices. Note that this is different
    /// from the centroid. See:
    /// https://en.wikipedia.org/wiki/Centroid#Of_a_polygon
    /// https://stackoverflow.com/questions/2355931/compute-the-centroid-of-a-3d-planar-polygon
    pub fn face_vertex_average(&self, positions: &Positions, face_id: FaceId) -> Vec3 {
        let face_vertices = self
            .face_vertices(face_id)
            .iter()
            .map(|v| positions[*v])
            .collect::<SVec<_>>();
        face_vertices.iter().fold(Vec3::ZERO, |v1, v2| v1 + *v2) / face_vertices.len() as f32
    }

    // Returns the normal of the face. The first three vertices are used to
    // compute the normal. If the vertices of the face are not coplanar,
    // the result will not be correct.
    pub(crate) fn face_normal(&self, positions: &Positions, face: FaceId) -> Option<Vec3> {
        let verts = self.face_vertices(face);
        if verts.len() >= 3 {
            let v01 = positions[verts[0]] - positions[verts[1]];
            let v12 = positions[verts[1]] - positions[verts[2]];
            Some(v01.cross(v12).normalize())
        } else {
            None
        }
    }

    pub fn num_halfedges(&self) -> usize {
        self.halfedges.len() - self.erased_halfedges.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len() - self.erased_vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len() - self.erased_edges.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len() - self.erased_faces.len()
    }

    /// Faces marked `boundary`, i.e. the virtual faces covering holes.
    pub fn is_boundary_face(&self, face: FaceId) -> bool {
        self[face].boundary
    }
}

impl HalfEdgeMesh {
    pub fn new() -> Self {
        Self {
            connectivity: InteriorMutable::new(MeshConnectivity::new()),
            positions: InteriorMutable::new(Positions::new()),
            channels: InteriorMutable::new(MeshChannels::default()),
            gen_config: MeshGenerationConfig::default(),
        }
    }

    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        let mut min = Vec3::new(f32::MAX, f32::MAX, f32::MAX);
        let mut max = Vec3::new(f32::MIN, f32::MIN, f32::MIN);
        let conn = self.read_connectivity();
        let positions = self.read_positions();
        for (v, _) in conn.iter_vertices() {
            let p = positions[v];
            min = min.min(p);
            max = max.max(p);
        }
        let center = (min + max) * 0.5;
        let size = max - min;
        (center, size)
    }

    pub fn read_connectivity(&self) -> BorrowedRef<'_, MeshConnectivity> {
        self.connectivity.borrow()
    }

    pub fn write_connectivity(&self) -> MutableRef<'_, MeshConnectivity> {
        self.connectivity.borrow_mut()
    }

    pub fn read_positions(&self) -> BorrowedRef<'_, Positions> {
        self.positions.borrow()
    }

    pub fn write_positions(&self) -> MutableRef<'_, Positions> {
        self.positions.borrow_mut()
    }

    pub fn read_channels(&self) -> BorrowedRef<'_, MeshChannels> {
        self.channels.borrow()
    }

    pub fn write_channels(&self) -> MutableRef<'_, MeshChannels> {
        self.channels.borrow_mut()
    }

    /// Builds this mesh from a list of vertices, and a list of polygons,
    /// containing indices that reference those vertices.
    ///
    /// - Generic over Index: Use as much precision as you need / want.
    /// - Generic over Polygon: Use whatever input layout you want.
    ///
    /// If unsure, you can pass `Vec<Vec<u32>>` as `polygons`. You can also use
    /// `[[u32;3]]` or `&[&[u32]]`. Same for `u8`, `u16` or `usize` indices.
    pub fn build_from_polygons<Index, Polygon>(
        positions: &[Vec3],
        polygons: &[Polygon],
    ) -> Result<Self>
    where
        Index: num_traits::AsPrimitive<usize> + 'static + Eq + PartialEq + core::hash::Hash + Copy,
        Polygon: AsRef<[Index]>,
    {
        let mesh = Self::new();
        let mut conn = mesh.write_connectivity();
        let mut positions_ch = mesh.write_positions();

        // Maps indices from the `polygons` array to the allocated vertices in
        // the newly created halfedge mesh.
        let mut index_to_vertex = HashMap::<Index, VertexId>::new();

        // Used to compute the degree of a vertex. Useful to do some sanity
        // checks.
        let mut vertex_degree = HashMap::<VertexId, u32>::new();

        // First pass over polygon data to determine some initial properties
        for polygon in polygons.iter().map(|p| p.as_ref()) {
            // Some sanity checks
            if polygon.len() < 3 {
                bail!("Cannot build meshes where polygons have less than three vertices.")
            }
            if polygon.iter().duplicates().next().is_some() {
                bail!("Cannot not build meshes where a polygon has duplicate vertices")
            }

            // Compute correspondence between vertices and indices. Also fill in vertex degree data.
            for index in polygon {
                // Create the vertex if it doesn't exist
                let position = positions.get(index.as_()).ok_or_else(|| {
                    anyhow!("Out-of-bounds index in the polygon array {}", index.as_())
                })?;
                let v_id = index_to_vertex
                    .entry(*index)
                    .or_insert_with(|| conn.alloc_vertex(&mut positions_ch, *position, None));

                // Increment the vertex degree counter for that vertex.
                *vertex_degree.entry(*v_id).or_insert(0) += 1;
            }
        }

        // Maps pairs of indices to mesh halfedges
        let mut pair_to_halfedge = HashMap::<(Index, Index), HalfEdgeId>::new();

        // We can now start building connectivity information by doing a second
        // pass over the polygon list
        for polygon in polygons.iter().map(|p| p.as_ref()) {
            // Cyclically ordered list of the half edge ids of this face.
            let mut half_edges_in_face = SVec::new();

            let face = conn.alloc_face(None);

            for (&a, &b) in polygon.iter().circular_tuple_windows() {
                if pair_to_halfedge.get(&(a, b)).is_some() {
                    bail!(
                        "Found multiple oriented edges with the same indices.\
                         This means either (i) surface is non-manifold or (ii) faces \
                         are not oriented in the same direction"
                    )
                }

                let h = conn.alloc_halfedge(HalfEdge::default());
                // Link halfedge to face
                conn[h].face = Some(face);
                conn[face].halfedge = Some(h);

                // Link halfedge to source vertex
                let v_a = index_to_vertex[&a];
                conn[h].vertex = Some(v_a);
                conn[v_a].halfedge = Some(h);

                half_edges_in_face.push(h);

                pair_to_halfedge.insert((a, b), h);

                if let Some(&other) = pair_to_halfedge.get(&(b, a)) {
                    conn[h].twin = Some(other);
                    conn[other].twin = Some(h);
                }
            }

            for (&h1, &h2) in half_edges_in_face.iter().circular_tuple_windows() {
                conn[h1].next = Some(h2);
            }
        }

        // Construct the boundary halfedges and the boundary faces that cover
        // the holes they bound. Right now, the boundary consists of
        // incomplete edges, i.e. half edges that do not have a twin. Leaving
        // it like this would complicate traversal because we can't rely on
        // halfedges always having a twin or a face. We instead create
        // boundary half edges and a boundary `Face` per hole: twin halfedges
        // whose `face` is a virtual, `boundary: true` face rather than a real
        // polygon. The boundary halfedges are linked following a circle
        // around the closed hole.
        conn.add_boundary_halfedges();

        // Every halfedge pair now shares an `Edge` entity.
        conn.assign_edges();

        // Do some final manifoldness checks
        for (v, vertex) in conn.iter_vertices() {
            if vertex.halfedge.is_none() {
                bail!("There is at least a single vertex that's disconnected from any polygon");
            }

            // Check that the number of halfedges emanating from this vertex
            // equal the number of polygons containing this vertex. If this
            // doesn't check out, it means our vertex is not a polygon "fan",
            // but some other (thus, non-manifold) structure
            let h0 = conn.at_vertex(v).halfedge().end();
            let mut h = h0;
            let mut count = 0;
            loop {
                if !conn.at_halfedge(h).is_boundary().unwrap() {
                    count += 1;
                }
                h = conn.at_halfedge(h).twin().next().end();

                if h == h0 {
                    break;
                }
            }

            if count != vertex_degree[&v] {
                bail!("At least one of the vertices is not a polygon fan, but some other nonmanifold structure instead.")
            }
        }

        drop(conn);
        drop(positions_ch);
        Ok(mesh)
    }

    /// Merges this halfedge mesh with another one. No additional connectivity
    /// data is generated between the two.
    pub fn merge_with(&mut self, mesh_b: &HalfEdgeMesh) {
        let mut vmap = SecondaryMap::<VertexId, VertexId>::new();
        let mut hmap = SecondaryMap::<HalfEdgeId, HalfEdgeId>::new();
        let mut fmap = SecondaryMap::<FaceId, FaceId>::new();
        let mut emap = SecondaryMap::<EdgeId, EdgeId>::new();

        {
            let mut a_conn = self.write_connectivity();
            let b_conn = mesh_b.read_connectivity();

            // On a first pass, we reserve new vertices, edges, faces and
            // halfedges without setting any of their pointers and store
            // their ids in a mapping.
            for (vertex_id, _vertex) in b_conn.iter_vertices() {
                vmap.insert(vertex_id, a_conn.alloc_vertex_raw(None));
            }
            for (face_id, face) in b_conn.iter_faces() {
                fmap.insert(face_id, a_conn.alloc_face_raw(face.boundary));
            }
            for (edge_id, _edge) in b_conn.iter_edges() {
                emap.insert(edge_id, a_conn.alloc_edge_raw());
            }
            for (halfedge_id, _) in b_conn.iter_halfedges() {
                hmap.insert(halfedge_id, a_conn.alloc_halfedge(HalfEdge::default()));
            }

            // The second pass uses the mapping and the original data to set
            // all the inner pointers.
            for (vertex_id, vertex) in b_conn.iter_vertices() {
                if let Some(h) = vertex.halfedge {
                    a_conn[vmap[vertex_id]].halfedge = Some(hmap[h])
                }
            }
            for (face_id, face) in b_conn.iter_faces() {
                if let Some(h) = face.halfedge {
                    a_conn[fmap[face_id]].halfedge = Some(hmap[h])
                }
            }
            for (edge_id, edge) in b_conn.iter_edges() {
                a_conn[emap[edge_id]].halfedge = hmap[edge.halfedge];
            }
            for (halfedge_id, halfedge) in b_conn.iter_halfedges() {
                let dst = hmap[halfedge_id];
                if let Some(twin) = halfedge.twin {
                    a_conn[dst].twin = Some(hmap[twin]);
                }
                if let Some(next) = halfedge.next {
                    a_conn[dst].next = Some(hmap[next]);
                }
                if let Some(vertex) = halfedge.vertex {
                    a_conn[dst].vertex = Some(vmap[vertex]);
                }
                if let Some(face) = halfedge.face {
                    a_conn[dst].face = Some(fmap[face]);
                }
                if let Some(edge) = halfedge.edge {
                    a_conn[dst].edge = Some(emap[edge]);
                }
            }
        }

        // Finally, once the connectivity data is correct, we merge the fixed
        // channels for both meshes by translating ids through the maps built
        // above.
        {
            let mut a_pos = self.write_positions();
            let b_pos = mesh_b.read_positions();
            for (old_v, &new_v) in vmap.iter() {
                a_pos[new_v] = b_pos[old_v];
            }
        }
        {
            let mut a_ch = self.write_channels();
            let b_ch = mesh_b.read_channels();
            for (old_v, &new_v) in vmap.iter() {
                a_ch.vertex_normals[new_v] = b_ch.vertex_normals[old_v];
                a_ch.vertex_new_pos[new_v] = b_ch.vertex_new_pos[old_v];
                a_ch.vertex_is_new[new_v] = b_ch.vertex_is_new[old_v];
            }
            for (old_f, &new_f) in fmap.iter() {
                a_ch.face_normals[new_f] = b_ch.face_normals[old_f];
                a_ch.face_new_pos[new_f] = b_ch.face_new_pos[old_f];
            }
            for (old_e, &new_e) in emap.iter() {
                a_ch.edge_new_pos[new_e] = b_ch.edge_new_pos[old_e];
                a_ch.edge_is_new[new_e] = b_ch.edge_is_new[old_e];
            }
        }
    }
}

impl Default for HalfEdgeMesh {
    fn default() -> Self {
        Self::new()
    }
}

pub trait HalfEdgeOp {
    fn op(conn: &MeshConnectivity, h: HalfEdgeId) -> HalfEdgeId;
}

pub struct NextOp;
impl HalfEdgeOp for NextOp {
    fn op(conn: &MeshConnectivity, h: HalfEdgeId) -> HalfEdgeId {
        conn.at_halfedge(h).next().end()
    }
}

pub struct CycleFanOp;
impl HalfEdgeOp for CycleFanOp {
    fn op(conn: &MeshConnectivity, h: HalfEdgeId) -> HalfEdgeId {
        conn.at_halfedge(h).cycle_around_fan().end()
    }
}

pub struct HalfedgeOpIterator<'a, Op: HalfEdgeOp> {
    conn: &'a MeshConnectivity,
    start: HalfEdgeId,
    next: HalfEdgeId,
    count: usize,
    _op: PhantomData<Op>,
}

impl<'a, Op: HalfEdgeOp> Iterator for HalfedgeOpIterator<'a, Op> {
    type Item = HalfEdgeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.count >= MAX_LOOP_ITERATIONS {
            panic!("Max number of iterations reached. Is the mesh malformed?");
        } else if self.count > 0 && self.next == self.start {
            None
        } else {
            let res = self.next;
            self.next = Op::op(self.conn, self.next);
            self.count += 1;
            Some(res)
        }
    }
}

