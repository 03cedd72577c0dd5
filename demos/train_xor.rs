use trace_mlp::{Activation, Network, Samples, TraceWriter, TrainConfig};

fn main() -> trace_mlp::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "xor.trace".to_owned());

    // Classic XOR dataset.
    let xs = vec![
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ];
    let ys = vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0]];
    let samples = Samples::from_rows(&xs, &ys)?;

    // 2 -> 2 -> 1, sigmoid everywhere.
    let mut net = Network::new_with_seed(&[2, 2, 1], Activation::Sigmoid, 0)?;

    let mut trace = TraceWriter::create(&path, &net)?;
    trace.write_frame(&net)?;
    let report = net.train_with_trace(&samples, TrainConfig::default(), &mut trace)?;
    trace.finish()?;

    println!(
        "iterations={} initial_cost={} final_cost={} converged={}",
        report.iterations, report.initial_cost, report.final_cost, report.converged
    );
    for x in &xs {
        let y = net.forward(x)[0];
        println!("x={x:?} y={y:.4}");
    }
    println!("trace written to {path} ({} frames)", report.iterations + 1);

    Ok(())
}
