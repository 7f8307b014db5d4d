use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use sar_core::{
    compute_phase, tick, ExperienceLevel, GridGeometry, LatLon, ProbabilityGrid, Sex,
    SimulationConfig, SubjectProfile, TerrainInfluenceModel, WeatherModifier,
};

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    let config = SimulationConfig::default();
    let profile = SubjectProfile::new(30, Sex::Male, ExperienceLevel::Medium);
    let params = compute_phase(&profile, 1.0);

    for radius_km in [1.0f64, 2.5, 5.0] {
        let geometry = GridGeometry::for_search(LatLon::new(51.1784, -115.5708), radius_km, 100.0);
        let terrain = TerrainInfluenceModel::neutral(geometry);
        let (row, col) = terrain.geometry().center_cell();
        let (width, height) = (terrain.geometry().width, terrain.geometry().height);

        // a few warm-up ticks so the mass covers a realistic area
        let mut warm = ProbabilityGrid::point_mass(width, height, row, col);
        for _ in 0..4 {
            warm = tick(&warm, &terrain, &params, &WeatherModifier::default(), (row, col), &config);
        }

        group.bench_with_input(BenchmarkId::new("grid", width), &warm, |b, grid| {
            b.iter_batched(
                || grid.clone(),
                |grid| {
                    let weather = WeatherModifier::default();
                    tick(&grid, &terrain, &params, &weather, (row, col), &config)
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(tick_benches, bench_tick);
criterion_main!(tick_benches);
