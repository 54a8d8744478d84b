//! Recommend using with
//! `RUSTFLAGS="-C target-cpu=x86-86-v2" cargo bench`
//! and that end users compile their applications in this way. That enables
//! SSE4.2 support which should be a safe default for the quaternion and
//! matrix maths in node composition.
//!
//! The scenes here are synthetic. A shape with a long node chain gives the
//! composition loop something to chew on and a field of identical instances
//! exercises the budget pass and bin sorting.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use marrow::{
    anim::ShapeInstance,
    config::{DetailConfig, DetailPrefs, RenderConfig},
    detail::{DetailManager, DetailProfile},
    render::{Material, MaterialLibrary, RenderInstManager},
    shape::{
        Detail, Mesh, Node, Object, Primitive, Sequence, SequenceFlags, Shape,
        ShapeBuilder,
    },
    types::{PrimitiveRange, Projection, VertexBufferHandle},
};
use nalgebra_glm as glm;
use std::sync::Arc;

const NODES: usize = 32;
const INSTANCES: usize = 200;

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn creature() -> Arc<Shape> {
    let mut b = ShapeBuilder::new("creature");
    for i in 0..NODES {
        let mut node = Node::new(&format!("bone{i}"), i.checked_sub(1));
        node.default_translation = glm::vec3(0.0, 0.5, 0.0);
        b.add_node(node);
    }
    let mut walk = Sequence::new("walk", 8, 1.2);
    walk.flags = SequenceFlags::CYCLIC;
    for i in 0..NODES {
        walk.rotation_matters.set(i);
    }
    walk.keys.rotations = (0..8 * NODES)
        .map(|k| glm::quat_angle_axis(0.01 * k as f32, &glm::vec3(0.0, 0.0, 1.0)))
        .collect();
    b.add_sequence(walk);

    b.materials = vec!["skin".to_string(), "eyes".to_string()];
    for (i, polys) in [4000, 1500, 300].into_iter().enumerate() {
        let object = b.add_object(Object {
            name: format!("body{i}"),
            node: Some(NODES / 2),
            meshes: vec![None; 3],
        });
        b.objects[object].meshes[i] = Some(Mesh {
            vertex_buffer: VertexBufferHandle(i as u32),
            primitives: vec![
                Primitive {
                    range: PrimitiveRange::default(),
                    material: Some(0),
                },
                Primitive {
                    range: PrimitiveRange::default(),
                    material: Some(1),
                },
            ],
            poly_count: polys,
            ..Default::default()
        });
    }
    b.add_detail(Detail::new("high", 0, 0, 120.0));
    b.add_detail(Detail::new("mid", 0, 1, 40.0));
    b.add_detail(Detail::new("low", 0, 2, 10.0));
    Arc::new(b.build().unwrap())
}

fn herd(shape: &Arc<Shape>) -> Vec<ShapeInstance> {
    (0..INSTANCES)
        .map(|_| {
            let mut si = ShapeInstance::new(Arc::clone(shape));
            let _ = si.add_thread();
            si
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn positions() -> Vec<glm::Vec3> {
    (0..INSTANCES)
        .map(|i| glm::vec3((i % 20) as f32 * 3.0, 0.0, 2.0 + (i / 20) as f32 * 4.0))
        .collect()
}

fn animate(c: &mut Criterion) {
    let shape = creature();
    let mut si = ShapeInstance::new(shape);
    let t = si.add_thread().unwrap();

    c.bench_function(
        "animate", //
        |b| {
            b.iter(|| {
                si.advance_time(t, black_box(0.016));
                si.animate();
            });
        },
    );
}

fn detail_frame(c: &mut Criterion) {
    let shape = creature();
    let mut insts = herd(&shape);
    let positions = positions();
    let projection = Projection::default();
    let prefs = DetailPrefs::default();
    let profile = DetailProfile::default();
    let mut mgr = DetailManager::new(DetailConfig {
        detail_scale: 0.0,
        min_poly_limit: 100_000,
        ..Default::default()
    });

    c.bench_function(
        "detail_frame", //
        |b| {
            b.iter(|| {
                mgr.begin();
                for (si, pos) in insts.iter_mut().zip(&positions) {
                    let dist = glm::length(pos);
                    mgr.select_potential(si, dist, 1.0, &profile, &projection, &prefs);
                }
                mgr.end();
                for si in &mut insts {
                    mgr.select_current(si);
                }
            });
        },
    );
}

fn render_sort(c: &mut Criterion) {
    let shape = creature();
    let insts = herd(&shape);
    let positions = positions();
    let library = MaterialLibrary::new();
    library.add(Material::new("skin"));
    library.add(Material::new("eyes"));
    let mut mgr = RenderInstManager::new(&RenderConfig::default(), &library);

    c.bench_function(
        "render_sort", //
        |b| {
            b.iter(|| {
                mgr.clear();
                for (si, pos) in insts.iter().zip(&positions) {
                    si.prep_render(&mut mgr, &library, &glm::translation(pos));
                }
                mgr.sort();
                black_box(mgr.inst_count())
            });
        },
    );
}

criterion_group!(benches, animate, detail_frame, render_sort);
criterion_main!(benches);
