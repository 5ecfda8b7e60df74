// Copyright (C) 2023 meshforge contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Re-verifies the manifold invariants a [`HalfEdgeMesh`] must satisfy
//! before and after every local operation. Intended to be run by surrounding
//! tooling after every edit, the way `build_from_polygons`'s own inline
//! fan-check guards construction.

use super::*;

/// Runs every manifold invariant check and returns the first violation found, or
/// `Ok(())` if the mesh is a valid manifold. Entities marked `erase_*` but
/// not yet `commit`ted are treated as absent, consistent with the deferred
/// deletion lifecycle.
pub fn validate(mesh: &HalfEdgeMesh) -> Result<()> {
    let conn = mesh.read_connectivity();

    if conn.num_vertices() == 0 {
        bail!("validate: mesh has no vertices");
    }

    for (h, halfedge) in conn.iter_halfedges() {
        let twin = halfedge
            .twin
            .ok_or_else(|| anyhow!("validate: halfedge {h:?} has no twin"))?;
        if !conn.halfedge_exists(twin) {
            bail!("validate: halfedge {h:?}'s twin {twin:?} does not resolve");
        }
        let twin_twin = conn[twin]
            .twin
            .ok_or_else(|| anyhow!("validate: halfedge {twin:?} (twin of {h:?}) has no twin"))?;
        if twin_twin != h {
            bail!("validate: halfedge {h:?}'s twin is not involutive (h.twin.twin != h)");
        }
        if twin == h {
            bail!("validate: halfedge {h:?} is its own twin");
        }

        let next = halfedge
            .next
            .ok_or_else(|| anyhow!("validate: halfedge {h:?} has no next"))?;
        if !conn.halfedge_exists(next) {
            bail!("validate: halfedge {h:?}'s next {next:?} does not resolve");
        }
        let twin_vertex = conn[twin]
            .vertex
            .ok_or_else(|| anyhow!("validate: halfedge {twin:?} has no vertex"))?;
        let next_vertex = conn[next]
            .vertex
            .ok_or_else(|| anyhow!("validate: halfedge {next:?} has no vertex"))?;
        if twin_vertex != next_vertex {
            bail!("validate: h.twin.vertex != h.next.vertex at halfedge {h:?}");
        }

        let edge = halfedge
            .edge
            .ok_or_else(|| anyhow!("validate: halfedge {h:?} has no edge"))?;
        if !conn.edge_exists(edge) {
            bail!("validate: halfedge {h:?}'s edge {edge:?} does not resolve");
        }
        let twin_edge = conn[twin]
            .edge
            .ok_or_else(|| anyhow!("validate: halfedge {twin:?} has no edge"))?;
        if twin_edge != edge {
            bail!("validate: h.edge != h.twin.edge at halfedge {h:?}");
        }

        let face = halfedge
            .face
            .ok_or_else(|| anyhow!("validate: halfedge {h:?} has no face"))?;
        if !conn.face_exists(face) {
            bail!("validate: halfedge {h:?}'s face {face:?} does not resolve");
        }

        if halfedge
            .vertex
            .map(|v| !conn.vertex_exists(v))
            .unwrap_or(true)
        {
            bail!("validate: halfedge {h:?}'s vertex does not resolve");
        }
    }

    // Invariant 3: walking `next` from any halfedge returns to it, and every
    // halfedge on the loop shares `face`.
    for (h, _) in conn.iter_halfedges() {
        let face = conn.at_halfedge(h).face().try_end()?;
        let mut cursor = h;
        let mut steps = 0;
        loop {
            if conn.at_halfedge(cursor).face().try_end()? != face {
                bail!("validate: face loop through halfedge {h:?} visits more than one face");
            }
            cursor = conn.at_halfedge(cursor).next().try_end()?;
            steps += 1;
            if cursor == h {
                break;
            }
            if steps > MAX_LOOP_ITERATIONS {
                bail!("validate: face loop through halfedge {h:?} never closes");
            }
        }
    }

    // Invariant 5: walking `h -> h.twin.next` from a vertex's halfedge
    // returns to it, and every visited halfedge points back at that vertex.
    for (v, vertex) in conn.iter_vertices() {
        let h0 = vertex
            .halfedge
            .ok_or_else(|| anyhow!("validate: vertex {v:?} has no halfedge"))?;
        if !conn.halfedge_exists(h0) {
            bail!("validate: vertex {v:?}'s halfedge {h0:?} does not resolve");
        }
        let mut cursor = h0;
        let mut steps = 0;
        loop {
            let src = conn.at_halfedge(cursor).vertex().try_end()?;
            if src != v {
                bail!("validate: vertex {v:?}'s outgoing fan visits a halfedge rooted at a different vertex");
            }
            cursor = conn.at_halfedge(cursor).cycle_around_fan().try_end()?;
            steps += 1;
            if cursor == h0 {
                break;
            }
            if steps > MAX_LOOP_ITERATIONS {
                bail!("validate: vertex {v:?}'s outgoing fan never closes");
            }
        }
    }

    for (e, edge) in conn.iter_edges() {
        if !conn.halfedge_exists(edge.halfedge) {
            bail!("validate: edge {e:?}'s halfedge does not resolve");
        }
    }

    // Invariant 6: boundary faces cover holes, real faces are never marked boundary.
    for (f, face) in conn.iter_faces() {
        let h0 = face
            .halfedge
            .ok_or_else(|| anyhow!("validate: face {f:?} has no halfedge"))?;
        if !conn.halfedge_exists(h0) {
            bail!("validate: face {f:?}'s halfedge does not resolve");
        }
    }

    // Invariant 7 / export-contract: no two boundary faces share an edge,
    // and no face repeats an edge (doubled edge within one face's loop).
    for (f, _) in conn.iter_faces() {
        let halfedges = conn.at_face(f).halfedges()?;
        let mut seen_edges = HashSet::new();
        for h in halfedges.iter().copied() {
            let e = conn.at_halfedge(h).edge().try_end()?;
            if !seen_edges.insert(e) {
                bail!("validate: face {f:?} visits edge {e:?} twice (doubled edge)");
            }
            if conn.is_boundary_face(f) {
                let twin = conn.at_halfedge(h).twin().try_end()?;
                let twin_face = conn.at_halfedge(twin).face().try_end()?;
                if conn.is_boundary_face(twin_face) {
                    bail!(
                        "validate: boundary face {f:?} shares edge {e:?} with another boundary face"
                    );
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::halfedge::primitives::{Box as MeshBox, Icosahedron, Quad};

    #[test]
    fn validates_a_fresh_icosahedron() {
        let mesh = Icosahedron::build(Vec3::ZERO, 1.0);
        validate(&mesh).unwrap();
    }

    #[test]
    fn validates_a_fresh_cube() {
        let mesh = MeshBox::build(Vec3::ZERO, Vec3::ONE);
        validate(&mesh).unwrap();
    }

    #[test]
    fn validates_an_open_quad_with_its_boundary_hole() {
        let mesh = Quad::build(Vec3::ZERO, Vec3::Y, Vec3::X, Vec2::ONE);
        validate(&mesh).unwrap();
    }

    #[test]
    fn detects_a_dangling_twin_pointer() {
        let mesh = MeshBox::build(Vec3::ZERO, Vec3::ONE);
        {
            let mut conn = mesh.write_connectivity();
            let (h, _) = conn.iter_halfedges().next().unwrap();
            conn[h].twin = None;
        }
        assert!(validate(&mesh).is_err());
    }
}
