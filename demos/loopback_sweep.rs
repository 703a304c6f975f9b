/// Runs all four Nagle / delayed-ACK combinations over loopback and prints
/// a side-by-side summary of what the sender and receiver observed.
///
/// Run with:
/// ```
/// cargo run --release --example loopback_sweep
/// ```
use std::fs;
use std::thread;
use tcptune::{menu, Client, Config, Server, TransferConfiguration};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("Nagle / Delayed-ACK Loopback Sweep");
    println!("==================================\n");

    let input = std::env::temp_dir().join("tcptune-loopback-sweep.bin");
    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    fs::write(&input, &payload)?;

    let passes: Vec<TransferConfiguration> = menu::server_sweep();

    let server = Server::new(
        Config::server(0)
            .with_bind_addr(Some("127.0.0.1".parse()?))
            .with_output_path(None),
    )?;
    let listener = server.bind()?;
    let port = listener.local_addr()?.port();

    let server_passes = passes.clone();
    let receiving = thread::spawn(move || server.run_sweep(&listener, &server_passes));

    let client_config = Config::client("127.0.0.1".to_string(), port).with_input_path(&input);
    let client = Client::new(client_config)?;
    let sent = client.run(&passes)?;
    let received = receiving
        .join()
        .map_err(|_| "server thread panicked")??;

    println!(
        "{:<32} {:>10} {:>8} {:>10} {:>8} {:>14}",
        "configuration", "sent", "writes", "received", "reads", "bytes/sec"
    );
    for (tx, rx) in sent.iter().zip(&received) {
        println!(
            "{:<32} {:>10} {:>8} {:>10} {:>8} {:>14.2}",
            rx.configuration.to_string(),
            tx.statistics.total_bytes,
            tx.statistics.packet_count,
            rx.statistics.total_bytes,
            rx.statistics.packet_count,
            rx.statistics.throughput
        );
    }

    fs::remove_file(&input)?;
    Ok(())
}
