//! Light Encoding Benchmarks
//!
//! Per-frame cost of encoding a full light budget and of rebuilding the
//! light registry.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use glam::{Mat4, Quat, Vec3, Vec4};
use lumina_core::Arena;
use lumina_renderer::light::{Light, LightShape};
use lumina_renderer::{
    EncoderFeatures, LightRegistry, LightTextureFormat, LightsBuffer, MAX_LIGHTS, RenderLayer,
};

fn scene_lights(count: usize) -> Vec<Light> {
    (0..count)
        .map(|i| {
            let position = Vec3::new((i % 16) as f32 * 6.0, (i / 64) as f32 * 4.0, (i / 16 % 4) as f32 * 6.0);
            let mut light = if i % 3 == 0 {
                Light::spot(Vec3::new(1.0, 0.8, 0.6), 3.0, 12.0, 0.3, 0.6)
            } else {
                Light::omni(Vec3::new(0.6, 0.8, 1.0), 2.0, 8.0)
            };
            light.world_transform =
                Mat4::from_rotation_translation(Quat::from_rotation_x(i as f32 * 0.1), position);
            if i % 4 == 0 {
                light.cast_shadows = true;
                light.atlas_viewport = Some(Vec4::new(0.25, 0.5, 0.125, 0.125));
            }
            if i % 5 == 0 {
                light.shape = LightShape::Rect;
            }
            light
        })
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_lights");
    let lights = scene_lights(MAX_LIGHTS);
    let features = EncoderFeatures {
        shadows: true,
        cookies: true,
        area_lights: true,
    };

    for format in [LightTextureFormat::Float, LightTextureFormat::EightBit] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{format:?}")), &format, |b, &format| {
            let mut buffer = LightsBuffer::new(format, features);
            b.iter(|| {
                buffer.begin_frame(MAX_LIGHTS, format);
                buffer.set_compression_ranges(12.0, 3.0);
                buffer.set_scene_bounds(Vec3::splat(-12.0), Vec3::splat(120.0));
                for (index, light) in lights.iter().enumerate() {
                    buffer.encode(black_box(light), index, true).unwrap();
                }
                black_box(buffer.compact_data().len())
            });
        });
    }

    group.finish();
}

fn bench_registry_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_rebuild");

    for layer_count in [1usize, 4, 16].iter() {
        let mut lights = Arena::new();
        let ids: Vec<_> = scene_lights(MAX_LIGHTS)
            .into_iter()
            .map(|light| lights.insert(light))
            .collect();

        let mut layers = Arena::new();
        let layer_ids: Vec<_> = (0..*layer_count)
            .map(|n| {
                let mut layer = RenderLayer::new(format!("Layer{n}"));
                for &id in ids.iter().skip(n).step_by(2) {
                    layer.add_light(id);
                }
                layers.insert(layer)
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(layer_count), layer_count, |b, _| {
            let mut registry = LightRegistry::default();
            b.iter(|| {
                registry.rebuild(black_box(&layer_ids), &layers, &lights).unwrap();
                black_box(registry.len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_registry_rebuild);
criterion_main!(benches);
