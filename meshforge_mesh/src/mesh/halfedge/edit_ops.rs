// Copyright (C) 2023 meshforge contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local topology operations: flip, split, collapse, erase, bevel.
//!
//! Every operation here either returns its principal new entity or an
//! `Err` describing why it refused; on refusal the mesh is left untouched.

use crate::prelude::*;

/// Flips the edge `e` shared by two triangles, replacing it with the edge
/// between the two opposite vertices. Refuses on boundary edges, or when
/// either adjacent face isn't a triangle (a flip is only well-defined between
/// two triangles).
pub fn flip_edge(conn: &mut MeshConnectivity, e: EdgeId) -> Result<EdgeId> {
    let h0 = conn[e].halfedge;
    let h1 = conn.at_halfedge(h0).twin().try_end()?;

    if conn.at_halfedge(h0).is_boundary()? || conn.at_halfedge(h1).is_boundary()? {
        bail!("flip_edge: cannot flip a boundary edge");
    }

    let h2 = conn.at_halfedge(h0).next().try_end()?;
    let h3 = conn.at_halfedge(h2).next().try_end()?;
    let h4 = conn.at_halfedge(h1).next().try_end()?;
    let h5 = conn.at_halfedge(h4).next().try_end()?;

    if conn.at_halfedge(h3).next().try_end()? != h0 || conn.at_halfedge(h5).next().try_end()? != h1
    {
        bail!("flip_edge: both adjacent faces must be triangles");
    }

    let v0 = conn[h0].vertex.unwrap();
    let v1 = conn[h1].vertex.unwrap();
    let v2 = conn[h3].vertex.unwrap();
    let v3 = conn[h5].vertex.unwrap();

    let f0 = conn[h0].face.unwrap();
    let f1 = conn[h1].face.unwrap();

    conn[h0].next = Some(h3);
    conn[h0].vertex = Some(v3);

    conn[h1].next = Some(h5);
    conn[h1].vertex = Some(v2);

    conn[h2].next = Some(h1);
    conn[h2].vertex = Some(v1);
    conn[h2].face = Some(f1);

    conn[h3].next = Some(h4);
    conn[h3].vertex = Some(v2);
    conn[h3].face = Some(f0);

    conn[h4].next = Some(h0);
    conn[h4].vertex = Some(v0);
    conn[h4].face = Some(f0);

    conn[h5].next = Some(h2);
    conn[h5].vertex = Some(v3);
    conn[h5].face = Some(f1);

    conn[v0].halfedge = Some(h4);
    conn[v1].halfedge = Some(h2);
    conn[v2].halfedge = Some(h3);
    conn[v3].halfedge = Some(h5);

    conn[e].halfedge = h0;
    conn[f0].halfedge = Some(h0);
    conn[f1].halfedge = Some(h1);

    Ok(e)
}

/// Splits the interior edge `e` at its midpoint `m`, fanning the two
/// adjacent triangles into four. Both adjacent faces must be triangles;
/// splitting a boundary edge refuses, since no boundary-split rule is
/// defined.
///
/// The returned vertex's halfedge is the half of the original edge nearer to
/// its original destination, not one of the three newly allocated edges.
pub fn split_edge(conn: &mut MeshConnectivity, positions: &mut Positions, e: EdgeId) -> Result<VertexId> {
    let h0 = conn[e].halfedge;
    let h1 = conn.at_halfedge(h0).twin().try_end()?;

    if conn.at_halfedge(h0).is_boundary()? || conn.at_halfedge(h1).is_boundary()? {
        bail!("split_edge: boundary-edge splitting is not supported");
    }

    let h0n = conn.at_halfedge(h0).next().try_end()?;
    let h0nn = conn.at_halfedge(h0n).next().try_end()?;
    let h1n = conn.at_halfedge(h1).next().try_end()?;
    let h1nn = conn.at_halfedge(h1n).next().try_end()?;

    if conn.at_halfedge(h0nn).next().try_end()? != h0
        || conn.at_halfedge(h1nn).next().try_end()? != h1
    {
        bail!("split_edge: both adjacent faces must be triangles");
    }

    let a = conn[h0].vertex.unwrap();
    let b = conn[h1].vertex.unwrap();
    let c = conn[h0nn].vertex.unwrap();
    let d = conn[h1nn].vertex.unwrap();

    let f0 = conn[h0].face.unwrap();
    let f1 = conn[h1].face.unwrap();

    let mid = positions[a].lerp(positions[b], 0.5);
    let m = conn.alloc_vertex(positions, mid, None);

    let f2 = conn.alloc_face(None);
    let f3 = conn.alloc_face(None);

    let h_am = conn.alloc_halfedge(HalfEdge::default());
    let h_ma = conn.alloc_halfedge(HalfEdge::default());
    let h_mc = conn.alloc_halfedge(HalfEdge::default());
    let h_cm = conn.alloc_halfedge(HalfEdge::default());
    let h_md = conn.alloc_halfedge(HalfEdge::default());
    let h_dm = conn.alloc_halfedge(HalfEdge::default());

    let e_am = conn.alloc_edge_raw();
    let e_mc = conn.alloc_edge_raw();
    let e_md = conn.alloc_edge_raw();

    conn[e_am].halfedge = h_am;
    conn[e_mc].halfedge = h_mc;
    conn[e_md].halfedge = h_md;

    conn[h_am].edge = Some(e_am);
    conn[h_ma].edge = Some(e_am);
    conn[h_mc].edge = Some(e_mc);
    conn[h_cm].edge = Some(e_mc);
    conn[h_md].edge = Some(e_md);
    conn[h_dm].edge = Some(e_md);

    conn[h_am].twin = Some(h_ma);
    conn[h_ma].twin = Some(h_am);
    conn[h_mc].twin = Some(h_cm);
    conn[h_cm].twin = Some(h_mc);
    conn[h_md].twin = Some(h_dm);
    conn[h_dm].twin = Some(h_md);

    conn[h_am].vertex = Some(a);
    conn[h_ma].vertex = Some(m);
    conn[h_mc].vertex = Some(m);
    conn[h_cm].vertex = Some(c);
    conn[h_md].vertex = Some(m);
    conn[h_dm].vertex = Some(d);

    // h0 keeps the original edge `e`, shrunk to the second half `m -> b`,
    // per the module-wide convention that the original handle survives on
    // the half nearer its original destination.
    conn[h0].vertex = Some(m);

    // Face f0 = (m, b, c): h0, h0n (unchanged), h_cm
    conn[h0n].next = Some(h_cm);
    conn[h_cm].next = Some(h0);
    conn[h_cm].face = Some(f0);

    // Face f2 = (a, m, c): h_am, h_mc, h0nn (unchanged)
    conn[h_am].next = Some(h_mc);
    conn[h_mc].next = Some(h0nn);
    conn[h0nn].next = Some(h_am);
    conn[h_am].face = Some(f2);
    conn[h_mc].face = Some(f2);
    conn[h0nn].face = Some(f2);

    // Face f1 = (b, m, d): h1, h_md, h1nn (unchanged)
    conn[h1].next = Some(h_md);
    conn[h_md].next = Some(h1nn);
    conn[h_md].face = Some(f1);

    // Face f3 = (m, a, d): h_ma, h1n (unchanged), h_dm
    conn[h_ma].next = Some(h1n);
    conn[h1n].next = Some(h_dm);
    conn[h_dm].next = Some(h_ma);
    conn[h_ma].face = Some(f3);
    conn[h1n].face = Some(f3);
    conn[h_dm].face = Some(f3);

    conn[f0].halfedge = Some(h0);
    conn[f1].halfedge = Some(h1);
    conn[f2].halfedge = Some(h_am);
    conn[f3].halfedge = Some(h_ma);

    conn[a].halfedge = Some(h_am);
    conn[m].halfedge = Some(h0);

    Ok(m)
}

/// Merges the endpoints of `h` into its source vertex, at their midpoint.
/// A triangular adjacent face collapses entirely (fusing its two remaining
/// edges); a non-triangular one simply loses the one boundary halfedge.
pub fn collapse_edge(conn: &mut MeshConnectivity, positions: &mut Positions, h: HalfEdgeId) -> Result<VertexId> {
    let (v, w) = conn.at_halfedge(h).src_dst_pair()?;
    let t = conn.at_halfedge(h).twin().try_end()?;
    let h_next = conn.at_halfedge(h).next().try_end()?;
    let h_prev = conn.at_halfedge(h).previous().try_end()?;
    let t_next = conn.at_halfedge(t).next().try_end()?;
    let t_prev = conn.at_halfedge(t).previous().try_end()?;
    let w_outgoing = conn.at_vertex(w).outgoing_halfedges()?;
    let f_h = conn.at_halfedge(h).face_or_boundary()?;
    let f_t = conn.at_halfedge(t).face_or_boundary()?;
    let f_h_is_triangle = f_h.is_some() && conn.halfedge_loop_iter(h).count() == 3;
    let f_t_is_triangle = f_t.is_some() && conn.halfedge_loop_iter(t).count() == 3;

    let midpoint = positions[v].lerp(positions[w], 0.5);

    for h_wo in w_outgoing {
        conn[h_wo].vertex = Some(v);
    }
    conn[t_prev].next = Some(t_next);
    conn[h_prev].next = Some(h_next);

    if let Some(f_h) = f_h {
        if conn.at_face(f_h).halfedge().try_end()? == h {
            conn[f_h].halfedge = Some(h_next);
        }
    }
    if let Some(f_t) = f_t {
        if conn.at_face(f_t).halfedge().try_end()? == t {
            conn[f_t].halfedge = Some(t_next);
        }
    }

    conn.erase_halfedge(t);
    conn.erase_halfedge(h);
    conn.erase_vertex(w);
    let e = conn.at_halfedge(h).edge().try_end();
    if let Ok(e) = e {
        conn.erase_edge(e);
    }

    fn post_process_triangular_face(
        conn: &mut MeshConnectivity,
        prev: HalfEdgeId,
        next: HalfEdgeId,
        face: Option<FaceId>,
    ) -> Result<(HalfEdgeId, HalfEdgeId)> {
        let prev_twin = conn.at_halfedge(prev).twin().try_end()?;
        let next_twin = conn.at_halfedge(next).twin().try_end()?;
        let fused_edge = conn.at_halfedge(next).edge().try_end()?;
        conn[prev_twin].twin = Some(next_twin);
        conn[next_twin].twin = Some(prev_twin);
        conn[prev_twin].edge = Some(fused_edge);
        conn[next_twin].edge = Some(fused_edge);
        conn[fused_edge].halfedge = next_twin;
        conn.erase_halfedge(prev);
        conn.erase_halfedge(next);
        let stale_edge = conn.at_halfedge(prev_twin).edge().try_end();
        if let Ok(stale_edge) = stale_edge {
            if stale_edge != fused_edge {
                conn.erase_edge(stale_edge);
            }
        }
        if let Some(face) = face {
            conn.erase_face(face);
        }
        Ok((prev_twin, next_twin))
    }

    let f_h_triangle_halfedges = if f_h_is_triangle {
        Some(post_process_triangular_face(conn, h_prev, h_next, f_h)?)
    } else {
        None
    };
    let f_t_triangle_halfedges = if f_t_is_triangle {
        Some(post_process_triangular_face(conn, t_prev, t_next, f_t)?)
    } else {
        None
    };

    if conn[v].halfedge == Some(h) {
        if let Some((h_v_x, _)) = f_h_triangle_halfedges {
            conn[v].halfedge = Some(h_v_x);
        } else {
            conn[v].halfedge = Some(h_next);
        }
    }
    if let Some((_, h_x_w)) = f_h_triangle_halfedges {
        let x = conn.at_halfedge(h_x_w).vertex().try_end()?;
        if conn[x].halfedge == Some(h_prev) {
            conn[x].halfedge = Some(h_x_w);
        }
    }
    if let Some((h_v_y, h_y_v)) = f_t_triangle_halfedges {
        let y = conn.at_halfedge(h_y_v).vertex().try_end()?;
        if conn[y].halfedge == Some(t_prev) {
            conn[y].halfedge = Some(h_y_v);
        }
        if conn[v].halfedge == Some(t_next) {
            conn[v].halfedge = Some(h_v_y);
        }
    }

    positions[v] = midpoint;

    // A collapse can leave behind an edge whose two sides are both boundary
    // faces (e.g. collapsing the last interior edge bridging two holes).
    // Such an edge no longer separates anything real and is swept away.
    let v_outgoing = conn.at_vertex(v).outgoing_halfedges()?;
    for h in v_outgoing {
        let Ok(twin) = conn.at_halfedge(h).twin().try_end() else {
            continue;
        };
        let (Ok(f1), Ok(f2)) = (
            conn.at_halfedge(h).face().try_end(),
            conn.at_halfedge(twin).face().try_end(),
        ) else {
            continue;
        };
        if conn.is_boundary_face(f1) && conn.is_boundary_face(f2) {
            let _ = erase_edge(conn, conn.at_halfedge(h).edge().try_end()?);
        }
    }

    Ok(v)
}

/// Erases `e`, merging its two incident faces into one (the face kept is
/// the one bounded by `e`'s stored halfedge). Refuses when the two
/// halfedges are adjacent (erasing would disconnect the mesh at that
/// vertex) or when both sides already bound the same face.
pub fn erase_edge(conn: &mut MeshConnectivity, e: EdgeId) -> Result<FaceId> {
    let h_l = conn[e].halfedge;
    let h_r = conn.at_halfedge(h_l).twin().try_end()?;

    let f_l = conn.at_halfedge(h_l).face().try_end()?;
    let f_r = conn.at_halfedge(h_r).face().try_end()?;

    if f_l == f_r {
        bail!("erase_edge: both sides of the edge already bound the same face");
    }

    let h_l_next = conn.at_halfedge(h_l).next().try_end()?;
    let h_l_prev = conn.at_halfedge(h_l).previous().try_end()?;
    let h_r_next = conn.at_halfedge(h_r).next().try_end()?;
    let h_r_prev = conn.at_halfedge(h_r).previous().try_end()?;

    if h_l_next == h_r || h_r_next == h_l {
        bail!("erase_edge: halfedges are adjacent; erasing would disconnect the mesh");
    }

    let (v, w) = conn.at_halfedge(h_l).src_dst_pair()?;
    let halfedges_r = conn.halfedge_loop(h_r);

    conn[h_r_prev].next = Some(h_l_next);
    conn[h_l_prev].next = Some(h_r_next);
    for h in halfedges_r.iter_cpy() {
        conn[h].face = Some(f_l);
    }

    let merged_boundary = conn.is_boundary_face(f_l) || conn.is_boundary_face(f_r);
    conn[f_l].boundary = merged_boundary;

    if conn[f_l].halfedge == Some(h_l) {
        conn[f_l].halfedge = Some(h_l_prev);
    }
    if conn[v].halfedge == Some(h_l) {
        conn[v].halfedge = Some(h_l_next);
    }
    if conn[w].halfedge == Some(h_r) {
        conn[w].halfedge = Some(h_r_next);
    }

    conn.erase_halfedge(h_l);
    conn.erase_halfedge(h_r);
    conn.erase_edge(e);
    conn.erase_face(f_r);

    Ok(f_l)
}

/// Merges every face incident to `v` into one and removes `v` along with its
/// edges and halfedges. Refuses to erase the mesh's last remaining vertex,
/// and refuses when `v` sits on the mesh boundary (merging a boundary face
/// with an interior one has no well-defined result here).
pub fn erase_vertex(conn: &mut MeshConnectivity, v: VertexId) -> Result<FaceId> {
    if conn.num_vertices() <= 1 {
        bail!("erase_vertex: cannot erase the mesh's last vertex");
    }

    let outgoing = conn.at_vertex(v).outgoing_halfedges()?;
    if outgoing.is_empty() {
        bail!("erase_vertex: vertex is not connected to any face");
    }

    let incident_faces: SVec<FaceId> = outgoing
        .iter_cpy()
        .map(|h| conn.at_halfedge(h).face().try_end())
        .collect::<std::result::Result<_, _>>()?;
    let is_boundary0 = conn.is_boundary_face(incident_faces[0]);
    if incident_faces.iter_cpy().any(|f| conn.is_boundary_face(f) != is_boundary0) {
        bail!("erase_vertex: vertex lies on the mesh boundary");
    }

    let new_face = conn.alloc_face_raw(is_boundary0);

    let mut to_erase = SVec::<(HalfEdgeId, HalfEdgeId, FaceId, EdgeId)>::new();

    for &h in &outgoing {
        let tw = conn.at_halfedge(h).twin().try_end()?;
        let w = conn.at_halfedge(tw).vertex().try_end()?;
        let nxt = conn.at_halfedge(h).next().try_end()?;
        let prv = conn.at_halfedge(tw).previous().try_end()?;
        let f = conn.at_halfedge(h).face().try_end()?;
        let e = conn.at_halfedge(h).edge().try_end()?;
        conn[prv].next = Some(nxt);
        if conn[w].halfedge == Some(tw) {
            conn[w].halfedge = Some(nxt);
        }
        to_erase.push((tw, h, f, e));
    }

    let outer_loop = conn.halfedge_loop(conn.at_halfedge(outgoing[0]).next().try_end()?);
    for &h in &outer_loop {
        conn[h].face = Some(new_face);
    }
    conn[new_face].halfedge = Some(outer_loop[0]);

    conn.erase_vertex(v);
    for (tw, h, f, e) in to_erase {
        conn.erase_halfedge(tw);
        conn.erase_halfedge(h);
        conn.erase_face(f);
        conn.erase_edge(e);
    }

    Ok(new_face)
}

/// Bevels (insets) `f`, keeping `f`'s id as the new inset face and allocating
/// one new "ring" quad per original edge. Refuses on boundary faces.
pub fn bevel_face(conn: &mut MeshConnectivity, positions: &mut Positions, f: FaceId) -> Result<FaceId> {
    if conn.is_boundary_face(f) {
        bail!("bevel_face: cannot bevel a boundary face");
    }

    let h: SVec<HalfEdgeId> = conn.face_edges(f);
    let n = h.len();
    if n < 3 {
        bail!("bevel_face: face must have at least three sides");
    }
    let v: SVec<VertexId> = h
        .iter_cpy()
        .map(|hi| conn.at_halfedge(hi).vertex().end())
        .collect();

    let m: SVec<VertexId> = v
        .iter_cpy()
        .map(|vi| conn.alloc_vertex(positions, positions[vi], None))
        .collect();

    // Rail edges: r[i] = v_i -> m_i, r_rev[i] = m_i -> v_i.
    let mut r = SVec::<HalfEdgeId>::new();
    let mut r_rev = SVec::<HalfEdgeId>::new();
    for i in 0..n {
        let a = conn.alloc_halfedge(HalfEdge::default());
        let b = conn.alloc_halfedge(HalfEdge::default());
        let e = conn.alloc_edge_raw();
        conn[e].halfedge = a;
        conn[a].edge = Some(e);
        conn[b].edge = Some(e);
        conn[a].twin = Some(b);
        conn[b].twin = Some(a);
        conn[a].vertex = Some(v[i]);
        conn[b].vertex = Some(m[i]);
        r.push(a);
        r_rev.push(b);
    }

    // Inset edges: ih[i] = m_i -> m_{i+1}, ih_rev[i] = m_{i+1} -> m_i.
    let mut ih = SVec::<HalfEdgeId>::new();
    let mut ih_rev = SVec::<HalfEdgeId>::new();
    for i in 0..n {
        let a = conn.alloc_halfedge(HalfEdge::default());
        let b = conn.alloc_halfedge(HalfEdge::default());
        let e = conn.alloc_edge_raw();
        conn[e].halfedge = a;
        conn[a].edge = Some(e);
        conn[b].edge = Some(e);
        conn[a].twin = Some(b);
        conn[b].twin = Some(a);
        conn[a].vertex = Some(m[i]);
        conn[b].vertex = Some(m[(i + 1) % n]);
        ih.push(a);
        ih_rev.push(b);
    }

    let ring: SVec<FaceId> = (0..n).map(|_| conn.alloc_face(None)).collect();

    for i in 0..n {
        let ip1 = (i + 1) % n;

        conn[h[i]].face = Some(ring[i]);
        conn[h[i]].next = Some(r[ip1]);

        conn[r[ip1]].face = Some(ring[i]);
        conn[r[ip1]].next = Some(ih_rev[i]);

        conn[ih_rev[i]].face = Some(ring[i]);
        conn[ih_rev[i]].next = Some(r_rev[i]);

        conn[r_rev[i]].face = Some(ring[i]);
        conn[r_rev[i]].next = Some(h[i]);

        conn[ring[i]].halfedge = Some(h[i]);

        conn[ih[i]].face = Some(f);
        conn[ih[i]].next = Some(ih[ip1]);

        conn[m[i]].halfedge = Some(ih[i]);
    }

    conn[f].halfedge = Some(ih[0]);

    Ok(f)
}

/// Moves the vertices of a just-bevelled face `f` off the original face's
/// plane. Must be called immediately after [`bevel_face`], while `f`'s
/// vertices still sit at their un-offset original positions.
pub fn bevel_face_positions(
    conn: &MeshConnectivity,
    positions: &mut Positions,
    f: FaceId,
    normal_offset: f32,
    tangent_offset: f32,
) -> Result<()> {
    let normal = conn
        .face_normal(positions, f)
        .ok_or_else(|| anyhow!("bevel_face_positions: face has no well-defined normal"))?;
    let centroid = conn.face_vertex_average(positions, f);

    let verts = conn.face_vertices(f);
    let originals: SVec<Vec3> = verts.iter_cpy().map(|vid| positions[vid]).collect();
    for (&vid, &original) in verts.iter().zip(originals.iter()) {
        positions[vid] = original - normal_offset * normal + tangent_offset * (original - centroid);
    }

    Ok(())
}

/// Bevels a single vertex by some given distance. No principled
/// single-vertex inset rule is defined, so this reports unsupported rather
/// than guessing one.
pub fn bevel_vertex(_conn: &mut MeshConnectivity, _positions: &mut Positions, _v: VertexId) -> Result<()> {
    bail!("bevel_vertex: not supported")
}

/// Bevels a single edge. See [`bevel_vertex`]'s doc comment: the same
/// absence of a defined rule applies here.
pub fn bevel_edge(_conn: &mut MeshConnectivity, _positions: &mut Positions, _e: EdgeId) -> Result<()> {
    bail!("bevel_edge: not supported")
}

/// Creates a 2-sided face on the inside of `h`'s edge: a zero-area wall that
/// can later be pulled apart (e.g. to open a seam) without disturbing the
/// rest of the mesh's connectivity.
#[allow(dead_code)]
pub fn duplicate_edge(conn: &mut MeshConnectivity, h: HalfEdgeId) -> Result<HalfEdgeId> {
    let (v, w) = conn.at_halfedge(h).src_dst_pair()?;

    let h_v_w = h;
    let h_w_v = conn.at_halfedge(h).twin().try_end()?;

    let h2_v_w = conn.alloc_halfedge(HalfEdge::default());
    let h2_w_v = conn.alloc_halfedge(HalfEdge::default());

    let e2 = conn.alloc_edge_raw();
    conn[e2].halfedge = h2_v_w;
    conn[h2_v_w].edge = Some(e2);
    conn[h2_w_v].edge = Some(e2);

    let inner_face = conn.alloc_face(Some(h2_v_w));

    conn[h2_v_w].face = Some(inner_face);
    conn[h2_w_v].face = Some(inner_face);
    conn[h2_v_w].next = Some(h2_w_v);
    conn[h2_w_v].next = Some(h2_v_w);

    conn[h2_v_w].vertex = Some(v);
    conn[h2_w_v].vertex = Some(w);

    conn[h2_v_w].twin = Some(h_w_v);
    conn[h2_w_v].twin = Some(h_v_w);
    conn[h_w_v].twin = Some(h2_v_w);
    conn[h_v_w].twin = Some(h2_w_v);

    Ok(h2_v_w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::halfedge::primitives::{Box as MeshBox, Icosahedron, Quad};

    /// A(0,0,0) B(1,0,0) C(1,1,0) D(0,1,0), split by diagonal B-D into
    /// triangles (A,B,D) and (B,C,D).
    fn square() -> (HalfEdgeMesh, [VertexId; 4]) {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let mesh =
            HalfEdgeMesh::build_from_polygons::<u32, _>(&positions, &[[0u32, 1, 3], [1, 2, 3]])
                .unwrap();
        let find = |p: Vec3| {
            let conn = mesh.read_connectivity();
            let pos = mesh.read_positions();
            conn.iter_vertices().find(|(v, _)| pos[*v] == p).unwrap().0
        };
        let a = find(positions[0]);
        let b = find(positions[1]);
        let c = find(positions[2]);
        let d = find(positions[3]);
        (mesh, [a, b, c, d])
    }

    #[test]
    fn flip_square_diagonal_and_back() {
        let (mesh, [a, b, c, d]) = square();
        let bd = {
            let conn = mesh.read_connectivity();
            conn.at_vertex(b).halfedge_to(d).edge().try_end().unwrap()
        };

        {
            let mut conn = mesh.write_connectivity();
            flip_edge(&mut conn, bd).unwrap();
        }

        {
            let conn = mesh.read_connectivity();
            // The flipped edge now connects A and C.
            assert!(conn.at_vertex(a).halfedge_to(c).try_end().is_ok());
            assert!(conn.at_vertex(b).halfedge_to(d).try_end().is_err());

            let faces: SVec<FaceId> = conn.iter_faces().filter(|(f, _)| !conn.is_boundary_face(*f)).map(|(f, _)| f).collect();
            assert_eq!(faces.len(), 2);
            for f in faces.iter_cpy() {
                let verts = conn.face_vertices(f);
                assert_eq!(verts.len(), 3);
                assert!(verts.contains(&a) && verts.contains(&c));
            }
        }

        let ac = {
            let conn = mesh.read_connectivity();
            conn.at_vertex(a).halfedge_to(c).edge().try_end().unwrap()
        };
        {
            let mut conn = mesh.write_connectivity();
            flip_edge(&mut conn, ac).unwrap();
        }
        let conn = mesh.read_connectivity();
        assert!(conn.at_vertex(b).halfedge_to(d).try_end().is_ok());
    }

    #[test]
    fn flip_refuses_on_boundary_edge() {
        let (mesh, [a, b, ..]) = square();
        let ab = {
            let conn = mesh.read_connectivity();
            conn.at_vertex(a).halfedge_to(b).edge().try_end().unwrap()
        };
        let mut conn = mesh.write_connectivity();
        assert!(flip_edge(&mut conn, ab).is_err());
    }

    #[test]
    fn collapse_square_diagonal_yields_single_triangle() {
        let (mesh, [a, b, c, d]) = square();
        let ab = {
            let conn = mesh.read_connectivity();
            conn.at_vertex(a).halfedge_to(b).try_end().unwrap()
        };

        {
            let mut conn = mesh.write_connectivity();
            let mut pos = mesh.write_positions();
            collapse_edge(&mut conn, &mut pos, ab).unwrap();
            conn.commit();
        }

        let conn = mesh.read_connectivity();
        let pos = mesh.read_positions();
        assert_eq!(conn.num_vertices(), 3);
        let real_faces: SVec<FaceId> = conn
            .iter_faces()
            .filter(|(f, _)| !conn.is_boundary_face(*f))
            .map(|(f, _)| f)
            .collect();
        assert_eq!(real_faces.len(), 1);
        let verts = conn.face_vertices(real_faces[0]);
        assert_eq!(verts.len(), 3);
        assert!(verts.contains(&c) && verts.contains(&d));
        let merged = verts.iter_cpy().find(|v| *v != c && *v != d).unwrap();
        assert!((pos[merged] - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-5);
        let _ = (a, b);
    }

    #[test]
    fn bevel_face_inserts_ring_faces() {
        let mesh = MeshBox::build(Vec3::ZERO, Vec3::ONE);
        let (f, before_faces) = {
            let conn = mesh.read_connectivity();
            let f = conn
                .iter_faces()
                .find(|(fid, _)| !conn.is_boundary_face(*fid))
                .unwrap()
                .0;
            (f, conn.num_faces())
        };

        {
            let mut conn = mesh.write_connectivity();
            let mut pos = mesh.write_positions();
            let f2 = bevel_face(&mut conn, &mut pos, f).unwrap();
            bevel_face_positions(&conn, &mut pos, f2, 0.0, 0.2).unwrap();
        }
        let conn = mesh.read_connectivity();
        // A quad face gains 4 ring faces; the inset face reuses `f`'s id.
        assert_eq!(conn.num_faces(), before_faces + 4);
        assert_eq!(conn.face_vertices(f).len(), 4);
    }

    #[test]
    fn bevel_face_refuses_on_boundary() {
        let mesh = Quad::build(Vec3::ZERO, Vec3::Y, Vec3::X, Vec2::ONE);
        let boundary = {
            let conn = mesh.read_connectivity();
            conn.iter_faces()
                .find(|(fid, _)| conn.is_boundary_face(*fid))
                .unwrap()
                .0
        };
        let mut conn = mesh.write_connectivity();
        let mut pos = mesh.write_positions();
        assert!(bevel_face(&mut conn, &mut pos, boundary).is_err());
    }

    #[test]
    fn erase_vertex_refuses_last_vertex() {
        let mesh = HalfEdgeMesh::new();
        let mut conn = mesh.write_connectivity();
        let mut pos = mesh.write_positions();
        let v = conn.alloc_vertex(&mut pos, Vec3::ZERO, None);
        assert!(erase_vertex(&mut conn, v).is_err());
    }

    #[test]
    fn icosahedron_has_twenty_triangles() {
        let mesh = Icosahedron::build(Vec3::ZERO, 1.0);
        let conn = mesh.read_connectivity();
        let real_faces = conn.iter_faces().filter(|(f, _)| !conn.is_boundary_face(*f)).count();
        assert_eq!(real_faces, 20);
        assert_eq!(conn.num_vertices(), 12);
    }
}
