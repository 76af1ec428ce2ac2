use binconv::{routing_triples, AudioBuffer, ImpulseResponse, MatrixConvolver, Sample};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::hint::black_box;

const BLOCK_SIZE: usize = 512;
const FILTER_LENGTH: usize = 8192;
const INPUT_COUNTS: [usize; 4] = [2, 8, 22, 24];

fn noise(rng: &mut StdRng, len: usize) -> AudioBuffer {
    (0..len).map(|_| rng.random_range(-1.0..1.0)).collect()
}

pub fn matrix_process_benchmarks(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut group = c.benchmark_group("matrix_process");

    for &num_inputs in INPUT_COUNTS.iter() {
        let set: Vec<ImpulseResponse> = (0..num_inputs)
            .map(|_| {
                let left = noise(&mut rng, FILTER_LENGTH);
                let right = noise(&mut rng, FILTER_LENGTH);
                ImpulseResponse::new(left, right).unwrap()
            })
            .collect();
        let input: Vec<AudioBuffer> = (0..num_inputs).map(|_| noise(&mut rng, BLOCK_SIZE)).collect();
        let mut output = vec![vec![0.0 as Sample; BLOCK_SIZE]; 2];

        let mut engine = MatrixConvolver::new(BLOCK_SIZE, num_inputs, 2, routing_triples(&set)).unwrap();

        group.bench_with_input(BenchmarkId::new("inputs", num_inputs), &num_inputs, |b, _| {
            b.iter(|| {
                engine.process_into(black_box(&input), &mut output).unwrap();
            })
        });
    }

    group.finish();
}

pub fn sparse_input_benchmarks(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let num_inputs = 22;
    let set: Vec<ImpulseResponse> = (0..num_inputs)
        .map(|_| ImpulseResponse::new(noise(&mut rng, FILTER_LENGTH), noise(&mut rng, FILTER_LENGTH)).unwrap())
        .collect();

    // only one loudspeaker active, the rest silent
    let mut input = vec![vec![0.0 as Sample; BLOCK_SIZE]; num_inputs];
    input[0] = noise(&mut rng, BLOCK_SIZE);
    let mut output = vec![vec![0.0 as Sample; BLOCK_SIZE]; 2];

    let mut engine = MatrixConvolver::new(BLOCK_SIZE, num_inputs, 2, routing_triples(&set)).unwrap();
    c.bench_function("matrix_process_one_active_input", |b| {
        b.iter(|| {
            engine.process_into(black_box(&input), &mut output).unwrap();
        })
    });
}

criterion_group!(benches, matrix_process_benchmarks, sparse_input_benchmarks);
criterion_main!(benches);
