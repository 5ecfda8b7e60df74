// Copyright (C) 2023 meshforge contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slotmap::SecondaryMap;

use super::*;

/// A side-table attaching a value of type `V` to some, or all, entities of
/// key type `K` (`VertexId`, `EdgeId`, `HalfEdgeId` or `FaceId`).
///
/// Reading an entity that was never written returns `V`'s
/// [`Default`](std::default::Default) value: a channel behaves as a total
/// function over its key type. Internally it is backed by a
/// [`SecondaryMap`](slotmap::SecondaryMap), which takes the same keys as the
/// arenas in [`MeshConnectivity`].
///
/// Using a handle from a different mesh to index a channel is not undefined
/// behavior, but is meaningless: channels carry no back-reference to the
/// mesh they were created for.
#[derive(Clone, Debug)]
pub struct Channel<K: slotmap::Key, V: Clone + Default> {
    inner: SecondaryMap<K, V>,
    default: V,
}

impl<K: slotmap::Key, V: Clone + Default> Default for Channel<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: slotmap::Key, V: Clone + Default> std::ops::Index<K> for Channel<K, V> {
    type Output = V;

    fn index(&self, index: K) -> &Self::Output {
        // Returns the default value for never-accessed keys.
        self.inner.get(index).unwrap_or(&self.default)
    }
}

impl<K: slotmap::Key, V: Clone + Default> std::ops::IndexMut<K> for Channel<K, V> {
    fn index_mut(&mut self, index: K) -> &mut Self::Output {
        self.inner
            .entry(index)
            .expect("Error indexing channel. Key was removed from the originating slotmap.")
            .or_default()
    }
}

impl<K: slotmap::Key, V: Clone + Default> Channel<K, V> {
    pub fn new() -> Self {
        Self {
            inner: SecondaryMap::new(),
            default: V::default(),
        }
    }

    /// Removes any value stored for `key`, reverting it to the default.
    pub fn remove(&mut self, key: K) {
        self.inner.remove(key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.inner.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> {
        self.inner.iter_mut()
    }
}

/// The non-positional channels every [`HalfEdgeMesh`] carries: per-element
/// normals plus the subdivision scratch state consumed by `rebuild_from_quads`.
/// Vertex positions are the one channel frequent enough to warrant their own
/// independent borrow, so they live directly on `HalfEdgeMesh` instead of in
/// here; see `HalfEdgeMesh::read_positions`/`write_positions`.
///
/// Fixed named fields rather than a dynamic by-name registry — there is no
/// scripting surface here that needs to look a channel up at runtime.
#[derive(Debug, Clone, Default)]
pub struct MeshChannels {
    pub vertex_normals: Channel<VertexId, Vec3>,
    pub face_normals: Channel<FaceId, Vec3>,

    /// Subdivision scratch position, populated by `linear_subdivide_positions`
    /// / `catmullclark_subdivide_positions` and consumed by
    /// `rebuild_from_quads`.
    pub vertex_new_pos: Channel<VertexId, Vec3>,
    pub edge_new_pos: Channel<EdgeId, Vec3>,
    pub face_new_pos: Channel<FaceId, Vec3>,

    /// Transient flags, meaningful only mid-subdivision.
    pub vertex_is_new: Channel<VertexId, bool>,
    pub edge_is_new: Channel<EdgeId, bool>,
}

pub type Positions = Channel<VertexId, Vec3>;
