use criterion::{criterion_group, criterion_main, Criterion};
use stisim::context::Context;
use stisim::parameters::{ContextParametersExt, SimConfig};
use stisim::random::ContextRandomExt;
use stisim::simulation::run_simulation;

fn initialize() -> Context {
    let mut config = SimConfig::default();
    config.population.num_men = 200;
    config.population.num_women = 200;
    config.population.sim_time = 5.0;
    config.chlamydia.outbreak.seed.time = 0.0;
    config.gonorrhea.outbreak.seed.time = 0.0;
    let mut context = Context::new();
    context.init_random(8);
    context
        .load_parameters(config)
        .expect("default parameters are valid");
    context
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("five years of 400 people", |bencher| {
        bencher.iter_with_large_drop(|| {
            let mut context = initialize();
            run_simulation(&mut context).expect("the run completes");
            context
        });
    });
}

criterion_group!(scheduler_benches, criterion_benchmark);
criterion_main!(scheduler_benches);
