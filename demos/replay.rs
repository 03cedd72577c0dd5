use trace_mlp::{Error, Network, TraceReader};

fn main() -> trace_mlp::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| Error::InvalidConfig("usage: replay <trace file> [every]".to_owned()))?;
    let every = match std::env::args().nth(2) {
        Some(s) => match s.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "every must be a positive integer, got {s:?}"
                )));
            }
        },
        None => 1_000,
    };

    let mut reader = TraceReader::open(&path)?;
    let mut net = Network::from_header(reader.header())?;
    log::info!(
        "replaying {path}: layers={:?} activation={:?}",
        net.layer_sizes(),
        net.activation()
    );

    let mut frame = 0_usize;
    while reader.read_frame_into(&mut net)? {
        if frame.is_multiple_of(every) {
            log::info!("frame {frame}\n{net}");
        }
        frame += 1;
    }

    println!("{path}: {frame} frames");
    if frame > 0 {
        print!("{net}");
    }
    Ok(())
}
