//! Tests for detail selection under a frame polygon budget

use marrow::{
    anim::ShapeInstance,
    config::{Config, DetailConfig, DetailPrefs},
    detail::{DetailManager, DetailProfile, Detailed, PartInstance},
    shape::{Detail, Mesh, Node, Object, Shape, ShapeBuilder},
    types::Projection,
};
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

/// Initializes logging in a "once per test run" manner. Call at the start of
/// each test that needs logging.
fn init_tests() {
    INIT.call_once(|| {
        env_logger::init();
    });
}

/// Shape with one object and a detail per entry of `levels`, each a
/// (size, polygons) pair from finest to coarsest
fn shape(name: &str, levels: &[(f32, u32)]) -> Arc<Shape> {
    let mut b = ShapeBuilder::new(name);
    b.add_node(Node::new("root", None));
    b.add_object(Object {
        name: name.to_string(),
        node: Some(0),
        meshes: levels
            .iter()
            .map(|(_, poly_count)| {
                Some(Mesh {
                    poly_count: *poly_count,
                    ..Default::default()
                })
            })
            .collect(),
    });
    for (i, (size, _)) in levels.iter().enumerate() {
        b.add_detail(Detail::new(&format!("{name}{i}"), 0, i, *size));
    }
    Arc::new(b.build().unwrap())
}

fn scene() -> Vec<ShapeInstance> {
    let tree = shape("tree", &[(100.0, 1000), (50.0, 400), (20.0, 100)]);
    let rock = shape("rock", &[(80.0, 600), (10.0, 50)]);
    let bush = shape("bush", &[(30.0, 250)]);
    (0..12)
        .map(|i| {
            let s = match i % 3 {
                0 => &tree,
                1 => &rock,
                _ => &bush,
            };
            ShapeInstance::new(Arc::clone(s))
        })
        .collect()
}

fn manager(limit: u32) -> DetailManager {
    DetailManager::new(DetailConfig {
        detail_scale: 0.0,
        min_poly_limit: limit,
        ..Default::default()
    })
}

/// Runs a frame and returns what each instance chose before the budget pass
fn frame(
    mgr: &mut DetailManager,
    insts: &mut [ShapeInstance],
    dist: impl Fn(usize) -> f32,
) -> Vec<Option<usize>> {
    let projection = Projection::default();
    let prefs = DetailPrefs::default();
    let profile = DetailProfile::default();
    mgr.begin();
    let chosen = insts
        .iter_mut()
        .enumerate()
        .map(|(i, inst)| {
            mgr.select_potential(inst, dist(i), 1.0, &profile, &projection, &prefs)
        })
        .collect();
    mgr.end();
    for inst in insts.iter_mut() {
        assert!(mgr.select_current(inst));
    }
    chosen
}

#[test]
fn budget_met_or_all_coarsest() {
    init_tests();
    for limit in [200, 1500, 3000, 6000, 50000] {
        let mut insts = scene();
        let mut mgr = manager(limit);
        for f in 0..4 {
            #[allow(clippy::cast_precision_loss)]
            frame(&mut mgr, &mut insts, |i| 1.5 + ((i + f) % 5) as f32);
            let total: u32 = insts
                .iter()
                .map(|inst| inst.poly_count(inst.current_detail().unwrap()))
                .sum();
            let all_coarsest = insts
                .iter()
                .all(|inst| inst.current_detail() == Detailed::coarsest_detail(inst));
            assert!(
                total <= limit || all_coarsest,
                "limit {limit} frame {f}: {total} polygons"
            );
            assert_eq!(mgr.stats().polys_rendered, total);
            assert_eq!(mgr.stats().poly_limit, limit);
        }
    }
}

#[test]
fn selection_is_stable_within_a_frame() {
    init_tests();
    let mut insts = scene();
    let mut mgr = manager(1_000_000);
    #[allow(clippy::cast_precision_loss)]
    let chosen = frame(&mut mgr, &mut insts, |i| 1.0 + i as f32);
    for (inst, dl) in insts.iter().zip(chosen) {
        assert_eq!(inst.current_detail(), dl);
    }
    assert_eq!(mgr.stats().polys_tried, mgr.stats().polys_rendered);
}

#[test]
fn far_instances_stay_visible() {
    init_tests();
    let mut insts = scene();
    let mut mgr = manager(1_000_000);
    frame(&mut mgr, &mut insts, |_| 10_000.0);
    for inst in &insts {
        assert_eq!(inst.current_detail(), Detailed::coarsest_detail(inst));
    }
}

#[test]
fn unselected_instance_is_not_drawn() {
    init_tests();
    let mut insts = scene();
    let mut mgr = manager(1_000_000);
    frame(&mut mgr, &mut insts, |_| 2.0);
    mgr.begin();
    mgr.end();
    assert!(!mgr.select_current(&mut insts[0]));
    assert_eq!(mgr.stats().records, 0);
}

#[test]
fn parts_share_the_budget() {
    init_tests();
    let insts = scene();
    let mut part = PartInstance::new(&insts[0]);
    assert!(part.add_object(&insts[0], 0));
    let mut mgr = manager(700);
    let projection = Projection::default();
    let prefs = DetailPrefs::default();
    mgr.begin();
    let dl = mgr.select_potential(
        &mut part,
        2.0,
        1.0,
        &DetailProfile::default(),
        &projection,
        &prefs,
    );
    assert_eq!(dl, Some(0));
    mgr.end();
    assert!(mgr.select_current(&mut part));
    assert!(part.poly_count(part.current_detail().unwrap()) <= 700);
}

#[test]
fn budget_from_yaml() {
    init_tests();
    let config = Config::from_yaml(
        "detail:\n  detail_scale: 0.0\n  min_poly_limit: 2000\n",
    )
    .unwrap();
    let mut mgr = DetailManager::new(config.detail);
    let mut insts = scene();
    frame(&mut mgr, &mut insts, |_| 2.0);
    assert_eq!(mgr.stats().poly_limit, 2000);
    assert!(mgr.stats().polys_rendered <= 2000);
}
