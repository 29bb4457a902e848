use std::hint::black_box;
use std::time::Instant;

use glam::{Mat4, Vec3};
use prism_assets::{
    GeometryBatch, NodeArena, SourceMesh, SourceNode, SourcePrimitive, SourceScene, StaticVertex,
};
use prism_common::Transform;

/// A grid of `count` nodes, each carrying a `quads x quads` tessellated plane.
fn make_scene(count: usize, quads: u32) -> SourceScene {
    let mut positions = Vec::new();
    let mut indices = Vec::new();
    let side = quads + 1;
    for z in 0..side {
        for x in 0..side {
            positions.push(Vec3::new(x as f32, 0.0, z as f32));
        }
    }
    for z in 0..quads {
        for x in 0..quads {
            let i = z * side + x;
            indices.extend_from_slice(&[i, i + side, i + 1, i + 1, i + side, i + side + 1]);
        }
    }

    let mut scene = SourceScene {
        name: "bench".into(),
        ..Default::default()
    };
    let mesh = scene.push_mesh(SourceMesh {
        name: "plane".into(),
        primitives: vec![SourcePrimitive::triangles(positions, indices)],
    });
    let grid = (count as f32).sqrt().ceil() as usize;
    let children = (0..count)
        .map(|i| {
            scene.push_node(SourceNode {
                mesh: Some(mesh),
                transform: Transform::from_translation(Vec3::new(
                    (i % grid) as f32 * 20.0,
                    0.0,
                    (i / grid) as f32 * 20.0,
                )),
                ..Default::default()
            })
        })
        .collect();
    let root = scene.push_node(SourceNode {
        children,
        ..Default::default()
    });
    scene.roots.push(root);
    scene
}

fn bench_build(count: usize, quads: u32, iterations: usize) {
    let scene = make_scene(count, quads);

    let start = Instant::now();
    for _ in 0..iterations {
        let mut nodes = NodeArena::from_source(&scene);
        let batch: GeometryBatch<StaticVertex> =
            GeometryBatch::build(black_box(&scene), &mut nodes, &Mat4::IDENTITY, &[]);
        black_box(batch.draw_set().len());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  build ({count} nodes, {quads}x{quads} quads, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_refresh(count: usize, iterations: usize) {
    let scene = make_scene(count, 4);
    let mut nodes = NodeArena::from_source(&scene);
    let mut batch: GeometryBatch<StaticVertex> =
        GeometryBatch::build(&scene, &mut nodes, &Mat4::IDENTITY, &[]);

    let start = Instant::now();
    for i in 0..iterations {
        let world = Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0));
        batch.refresh_metadata(&mut nodes, black_box(&world), &[]);
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  refresh metadata ({count} nodes, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}");
}

fn main() {
    println!("geometry batch benchmarks");
    bench_build(64, 8, 50);
    bench_build(1024, 4, 10);
    bench_refresh(1024, 100);
    bench_refresh(16_384, 10);
}
