//! # Registry Benchmark
//!
//! Measures the three paths that matter for an archetype store:
//! 1. Creation into an exact schema (amortized growth)
//! 2. Linear iteration over every record holding a field set
//! 3. Random point lookups through the shared indirection table

#![allow(missing_docs)]

use bytemuck::{Pod, Zeroable};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tessera_core::{Entity, Registry};

const ENTITY_COUNT: usize = 100_000;

#[derive(Clone, Copy, Default, Pod, Zeroable)]
#[repr(C)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Clone, Copy, Default, Pod, Zeroable)]
#[repr(C)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Clone, Copy, Default, Pod, Zeroable)]
#[repr(transparent)]
struct Health(u32);

/// Generate deterministic "random" indices
fn generate_random_indices(count: usize, max: usize, seed: u64) -> Vec<usize> {
    let mut indices = Vec::with_capacity(count);
    let mut state = seed;

    for _ in 0..count {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        indices.push((state as usize) % max);
    }

    indices
}

fn registry() -> Registry {
    Registry::builder()
        .schema::<(Position,)>()
        .schema::<(Position, Velocity)>()
        .schema::<(Position, Velocity, Health)>()
        .build()
        .expect("benchmark schemas are valid")
}

/// Fills the registry, spreading records over the three schemas.
fn populate(registry: &mut Registry) -> Vec<Entity> {
    (0..ENTITY_COUNT)
        .map(|i| {
            let p = Position {
                x: i as f32,
                ..Position::default()
            };
            let v = Velocity {
                x: 1.0,
                ..Velocity::default()
            };
            match i % 3 {
                0 => registry.create((p,)),
                1 => registry.create((p, v)),
                _ => registry.create((p, v, Health(100))),
            }
            .expect("schema declared")
        })
        .collect()
}

// =============================================================================
// CREATION
// =============================================================================

fn bench_create(c: &mut Criterion) {
    c.bench_function("create_100k_mixed_schemas", |b| {
        b.iter(|| {
            let mut registry = registry();
            black_box(populate(&mut registry).len())
        });
    });

    c.bench_function("create_100k_after_destroy_all", |b| {
        let mut registry = registry();
        b.iter(|| {
            registry.destroy_all();
            black_box(populate(&mut registry).len())
        });
    });
}

// =============================================================================
// ITERATION
// =============================================================================

fn bench_for_each(c: &mut Criterion) {
    let mut registry = registry();
    populate(&mut registry);

    c.bench_function("for_each_position_velocity_67k", |b| {
        b.iter(|| {
            registry
                .for_each::<(&mut Position, &Velocity), _>(
                    |_, (p, v): (&mut Position, &Velocity)| {
                        p.x += v.x * 0.016;
                        p.y += v.y * 0.016;
                        p.z += v.z * 0.016;
                    },
                )
                .expect("query fields declared");
        });
    });

    c.bench_function("view_sum_position_100k", |b| {
        b.iter(|| {
            let view = registry.view::<(Position,)>().expect("view exists");
            let mut sum = 0.0f32;
            view.for_each::<&Position, _>(|_, p: &Position| sum += p.x)
                .expect("query fields declared");
            black_box(sum)
        });
    });
}

// =============================================================================
// POINT ACCESS
// =============================================================================

fn bench_random_unpack(c: &mut Criterion) {
    let mut registry = registry();
    let handles = populate(&mut registry);
    let random_indices = generate_random_indices(ENTITY_COUNT, ENTITY_COUNT, 0xDEAD_BEEF);

    c.bench_function("random_unpack_position_100k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for &idx in &random_indices {
                if let Ok(pos) = registry.unpack::<Position>(handles[idx]) {
                    sum += pos.x;
                }
            }
            black_box(sum)
        });
    });

    c.bench_function("random_unpack_health_narrow_view_100k", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for &idx in &random_indices {
                if let Ok(health) = registry.unpack::<Health>(handles[idx]) {
                    sum += u64::from(health.0);
                }
            }
            black_box(sum)
        });
    });
}

criterion_group!(benches, bench_create, bench_for_each, bench_random_unpack);
criterion_main!(benches);
