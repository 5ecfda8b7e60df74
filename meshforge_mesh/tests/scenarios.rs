// Copyright (C) 2023 meshforge contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end walks through the worked scenarios, exercising a full
//! build → edit → validate round trip instead of a single function in
//! isolation.

use meshforge_mesh::mesh::halfedge::edit_ops::{collapse_edge, flip_edge};
use meshforge_mesh::mesh::halfedge::global_ops::{
    catmullclark_subdivide_positions, simplify, SimplifyConfig,
};
use meshforge_mesh::mesh::halfedge::primitives::{Box as MeshBox, Icosahedron};
use meshforge_mesh::mesh::halfedge::validate::validate;
use meshforge_mesh::prelude::*;

fn unit_square() -> (HalfEdgeMesh, [VertexId; 4]) {
    let positions = [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ];
    let mesh = HalfEdgeMesh::build_from_polygons::<u32, _>(&positions, &[[0u32, 1, 3], [1, 2, 3]])
        .unwrap();
    let find = |p: Vec3| {
        let conn = mesh.read_connectivity();
        let pos = mesh.read_positions();
        conn.iter_vertices().find(|(v, _)| pos[*v] == p).unwrap().0
    };
    let verts = [
        find(positions[0]),
        find(positions[1]),
        find(positions[2]),
        find(positions[3]),
    ];
    (mesh, verts)
}

/// Square split by diagonal B-D; flipping the shared edge swaps the
/// diagonal to A-C, and flipping back restores B-D, validating at every
/// step.
#[test]
fn flipping_a_square_diagonal_and_back_round_trips() {
    let (mesh, [a, b, c, d]) = unit_square();
    validate(&mesh).unwrap();

    let bd = {
        let conn = mesh.read_connectivity();
        conn.at_vertex(b).halfedge_to(d).edge().try_end().unwrap()
    };
    {
        let mut conn = mesh.write_connectivity();
        flip_edge(&mut conn, bd).unwrap();
    }
    validate(&mesh).unwrap();

    let ac = {
        let conn = mesh.read_connectivity();
        assert!(conn.at_vertex(a).halfedge_to(c).try_end().is_ok());
        conn.at_vertex(a).halfedge_to(c).edge().try_end().unwrap()
    };
    {
        let mut conn = mesh.write_connectivity();
        flip_edge(&mut conn, ac).unwrap();
    }
    validate(&mesh).unwrap();

    let conn = mesh.read_connectivity();
    assert!(conn.at_vertex(b).halfedge_to(d).try_end().is_ok());
    assert!(conn.at_vertex(a).halfedge_to(c).try_end().is_err());
}

/// Collapsing one edge of the diagonal-split square leaves a single
/// triangle and three vertices, with the merged vertex sitting at the
/// collapsed edge's midpoint.
#[test]
fn collapsing_a_square_diagonal_edge_yields_one_triangle() {
    let (mesh, [a, b, c, d]) = unit_square();
    let h_ab = {
        let conn = mesh.read_connectivity();
        conn.at_vertex(a).halfedge_to(b).try_end().unwrap()
    };

    {
        let mut conn = mesh.write_connectivity();
        let mut pos = mesh.write_positions();
        collapse_edge(&mut conn, &mut pos, h_ab).unwrap();
        conn.commit();
    }
    validate(&mesh).unwrap();

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
    assert!(verts.contains(&c) && verts.contains(&d));
    let merged = verts.iter_cpy().find(|v| *v != c && *v != d).unwrap();
    assert!((pos[merged] - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-5);
}

/// One Catmull-Clark pass over a unit cube moves every corner's new
/// position to magnitude ~0.5555 along each axis, the textbook result for
/// a cube corner.
#[test]
fn catmullclark_subdivides_a_cube_corner_to_known_magnitude() {
    let mesh = MeshBox::build(Vec3::ZERO, Vec3::new(2.0, 2.0, 2.0));
    validate(&mesh).unwrap();

    catmullclark_subdivide_positions(&mesh).unwrap();

    let conn = mesh.read_connectivity();
    let channels = mesh.read_channels();
    for (v, _) in conn.iter_vertices() {
        let p = channels.vertex_new_pos[v];
        assert!((p.x.abs() - 0.5555).abs() < 0.01);
        assert!((p.y.abs() - 0.5555).abs() < 0.01);
        assert!((p.z.abs() - 0.5555).abs() < 0.01);
    }
}

/// Simplifying a 20-face icosahedron with factor 4 reduces it to at most
/// 5 faces (20 / 4), and the result is still a valid manifold mesh.
#[test]
fn simplifying_an_icosahedron_reduces_it_to_a_valid_low_poly_mesh() {
    let mesh = Icosahedron::build(Vec3::ZERO, 1.0);
    validate(&mesh).unwrap();
    let before = mesh.read_connectivity().num_faces();
    assert_eq!(before, 20);

    let did_collapse = simplify(&mesh, SimplifyConfig { factor: 4.0 }).unwrap();
    assert!(did_collapse);

    validate(&mesh).unwrap();
    let after = mesh.read_connectivity().num_faces();
    assert!(after <= 5);
    assert!(after >= 4);
}
