use criterion::{Criterion, black_box, criterion_group, criterion_main};

use trace_mlp::{Activation, Matrix, Network, Samples, TraceWriter};

const SIZES: [usize; 4] = [128, 256, 256, 10];

fn batch(len: usize) -> Samples {
    let (input_dim, output_dim) = (SIZES[0], SIZES[SIZES.len() - 1]);
    let inputs = vec![vec![0.1; input_dim]; len];
    let outputs = vec![vec![0.0; output_dim]; len];
    Samples::from_rows(&inputs, &outputs).unwrap()
}

fn matrix_multiply_bench(c: &mut Criterion) {
    let a = Matrix::from_row_major(256, 128, vec![0.1; 256 * 128]).unwrap();
    let b = Matrix::from_row_major(64, 256, vec![0.2; 64 * 256]).unwrap();
    let mut out = Matrix::new(64, 128);

    c.bench_function("matrix_multiply_128x256_256x64", |bench| {
        bench.iter(|| {
            out.multiply(black_box(&a), black_box(&b));
            black_box(out.get(0, 0));
        })
    });
}

fn network_forward_bench(c: &mut Criterion) {
    let mut net = Network::new_with_seed(&SIZES, Activation::Sigmoid, 0).unwrap();
    let input = vec![0.1; net.input_dim()];

    c.bench_function("network_forward_128_256_256_10", |b| {
        b.iter(|| {
            let out = net.forward(black_box(&input));
            black_box(out[0]);
        })
    });
}

fn network_backpropagate_bench(c: &mut Criterion) {
    let mut net = Network::new_with_seed(&SIZES, Activation::Sigmoid, 0).unwrap();
    let samples = batch(16);
    let (inputs, outputs) = (samples.inputs(), samples.outputs());

    c.bench_function("network_backpropagate_128_256_256_10_x16", |b| {
        b.iter(|| {
            net.backpropagate(black_box(&inputs), black_box(&outputs));
            net.learn(1e-3);
        })
    });
}

fn trace_write_frame_bench(c: &mut Criterion) {
    let net = Network::new_with_seed(&SIZES, Activation::Sigmoid, 0).unwrap();

    c.bench_function("trace_write_frame_128_256_256_10", |b| {
        b.iter(|| {
            let mut writer = TraceWriter::new(Vec::with_capacity(1 << 20), &net).unwrap();
            writer.write_frame(black_box(&net)).unwrap();
            black_box(writer.finish().unwrap().len());
        })
    });
}

criterion_group!(
    benches,
    matrix_multiply_bench,
    network_forward_bench,
    network_backpropagate_bench,
    trace_write_frame_bench
);
criterion_main!(benches);
