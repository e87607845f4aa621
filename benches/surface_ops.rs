//! Benchmarks for surface operations.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::Point3;
use sulcus::algo::morph::{subdivided_icosahedron, ForceKernel, KernelParameters, MorphingKernel};
use sulcus::algo::smooth::{areal_smoothing, SmoothOptions};
use sulcus::prelude::*;

fn create_grid_surface(n: usize) -> Surface {
    let mut coords = Vec::with_capacity((n + 1) * (n + 1));
    let mut triangles = Vec::with_capacity(n * n * 2);

    for j in 0..=n {
        for i in 0..=n {
            coords.push(Point3::new(i as f32, j as f32, 0.0));
        }
    }

    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1);
            let v11 = v01 + 1;

            triangles.push([v00, v10, v11]);
            triangles.push([v00, v11, v01]);
        }
    }

    let topology = Arc::new(Topology::new(coords.len(), triangles).unwrap());
    Surface::new(SurfaceKind::Flat, coords, topology).unwrap()
}

fn create_sphere(subdivisions: usize) -> Surface {
    let (coords, triangles) = subdivided_icosahedron(subdivisions);
    let topology = Arc::new(Topology::new(coords.len(), triangles).unwrap());
    let mut sphere = Surface::new(SurfaceKind::Spherical, coords, topology).unwrap();
    sphere.scale(100.0);
    sphere
}

fn bench_projection(c: &mut Criterion) {
    let sphere = create_sphere(4);

    c.bench_function("projector_build_sphere_2562", |b| {
        b.iter(|| PointProjector::new(&sphere, ProjectionHint::Sphere, ProjectorOptions::default()));
    });

    let projector = PointProjector::new(&sphere, ProjectionHint::Sphere, ProjectorOptions::default());
    let queries: Vec<Point3<f32>> = sphere.coords().iter().map(|p| p * 1.01).collect();
    c.bench_function("project_barycentric_all", |b| {
        b.iter(|| {
            queries
                .iter()
                .filter(|q| projector.project_barycentric(q, true).map_or(false, |p| p.is_projected()))
                .count()
        });
    });
}

fn bench_geodesic(c: &mut Criterion) {
    let grid = create_grid_surface(100);

    c.bench_function("dijkstra_grid_100x100", |b| {
        b.iter(|| dijkstra(&grid, 0, None, &GeodesicOptions::default()).unwrap());
    });
}

fn bench_smoothing(c: &mut Criterion) {
    let grid = create_grid_surface(100);
    let options = SmoothOptions::default().with_iterations(10).with_strength(0.5);

    c.bench_function("areal_smoothing_grid_10_iters", |b| {
        b.iter(|| {
            let mut surface = grid.clone();
            areal_smoothing(&mut surface, &options, None).unwrap();
            surface
        });
    });

    c.bench_function("areal_smoothing_grid_10_iters_sequential", |b| {
        let options = options.clone().sequential();
        b.iter(|| {
            let mut surface = grid.clone();
            areal_smoothing(&mut surface, &options, None).unwrap();
            surface
        });
    });
}

fn bench_kernel(c: &mut Criterion) {
    let reference = create_sphere(3);
    let mut start = reference.clone();
    for p in start.coords_mut() {
        p.x *= 1.2;
    }
    start.convert_to_sphere_with_radius(100.0);
    let params = KernelParameters::default().with_iterations(5);

    c.bench_function("force_kernel_sphere_642_5_iters", |b| {
        b.iter(|| {
            let mut surface = start.clone();
            ForceKernel
                .morph(&mut surface, reference.coords(), &params, &Progress::none())
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_projection, bench_geodesic, bench_smoothing, bench_kernel);
criterion_main!(benches);
