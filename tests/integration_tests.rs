use std::io::Write;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tcptune::{
    menu, Client, Config, PassOutcome, PassReport, ProgressEvent, Server, TransferConfiguration,
};
use tempfile::NamedTempFile;

// Loopback tests: a real server thread and a real client over 127.0.0.1

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn input_file(len: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&payload(len)).unwrap();
    file.flush().unwrap();
    file
}

fn server_config() -> Config {
    Config::server(0)
        .with_bind_addr(Some("127.0.0.1".parse().unwrap()))
        .with_output_path(None)
}

fn bound(config: Config) -> (Server, TcpListener, u16) {
    let server = Server::new(config).unwrap();
    let listener = server.bind().unwrap();
    let port = listener.local_addr().unwrap().port();
    (server, listener, port)
}

fn client_config(port: u16, input: &std::path::Path) -> Config {
    Config::client("127.0.0.1".to_string(), port).with_input_path(input)
}

/// Runs a server sweep in a thread against a client run of the same passes
fn sweep(
    server_cfg: Config,
    client_cfg: impl FnOnce(u16) -> Config,
    passes: Vec<TransferConfiguration>,
) -> (Vec<PassReport>, Vec<PassReport>) {
    let (server, listener, port) = bound(server_cfg);
    let server_passes = passes.clone();
    let handle = thread::spawn(move || server.run_sweep(&listener, &server_passes).unwrap());

    let sent = Client::new(client_cfg(port)).unwrap().run(&passes).unwrap();
    let received = handle.join().unwrap();
    (sent, received)
}

#[test]
fn test_4096_byte_file_in_40_byte_chunks() {
    let input = input_file(4096);
    let (sent, received) = sweep(
        server_config(),
        |port| client_config(port, input.path()),
        vec![TransferConfiguration::new(false, false)],
    );

    assert_eq!(sent.len(), 1);
    assert!(sent[0].is_completed());
    assert_eq!(sent[0].statistics.total_bytes, 4096);
    assert_eq!(sent[0].statistics.packet_count, 103);
    assert_eq!(sent[0].statistics.max_packet_size, 40);

    assert!(received[0].is_completed());
    assert_eq!(received[0].statistics.total_bytes, 4096);
    assert!(received[0].statistics.max_packet_size <= 40);
}

#[test]
fn test_receiver_total_independent_of_its_chunk_size() {
    for chunk in [1usize, 7, 16, 40] {
        let input = input_file(4096);
        let (_, received) = sweep(
            server_config().with_chunk_size(chunk),
            |port| client_config(port, input.path()),
            vec![TransferConfiguration::default()],
        );

        assert_eq!(received[0].statistics.total_bytes, 4096, "chunk {}", chunk);
        assert!(received[0].statistics.max_packet_size <= chunk as u64);
    }
}

#[test]
fn test_missing_source_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("file.txt");

    let (sent, received) = sweep(
        server_config(),
        |port| client_config(port, &missing),
        vec![TransferConfiguration::default()],
    );

    assert!(matches!(sent[0].outcome, PassOutcome::Aborted { .. }));
    assert_eq!(sent[0].statistics.total_bytes, 0);
    assert_eq!(sent[0].statistics.packet_count, 0);

    // The server sees a clean end-of-stream with nothing in it
    assert!(received[0].is_completed());
    assert_eq!(received[0].statistics.total_bytes, 0);
    assert_eq!(received[0].statistics.throughput, 0.0);
}

#[test]
fn test_unwritable_output_still_counts() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("missing-dir").join("received.bin");
    let input = input_file(4096);

    let (_, received) = sweep(
        server_config().with_output_path(Some(output.clone())),
        |port| client_config(port, input.path()),
        vec![TransferConfiguration::default()],
    );

    assert!(received[0].is_completed());
    assert_eq!(received[0].statistics.total_bytes, 4096);
    assert!(received[0].statistics.packet_count > 0);
    assert!(!output.exists());
}

#[test]
fn test_output_file_matches_input() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("received.bin");
    let input = input_file(2000);

    sweep(
        server_config()
            .with_pass_bytes(Some(2000))
            .with_output_path(Some(output.clone())),
        |port| client_config(port, input.path()),
        vec![TransferConfiguration::new(true, false)],
    );

    assert_eq!(std::fs::read(&output).unwrap(), payload(2000));
}

#[test]
fn test_full_sweep_over_one_connection() {
    let input = input_file(4096);
    let delay = Duration::from_millis(1);

    let (server, listener, port) = bound(server_config());
    let handle = thread::spawn(move || server.run_sweep(&listener, &menu::server_sweep()).unwrap());

    let client = Client::new(client_config(port, input.path()).with_send_delay(delay)).unwrap();
    let sent = client.run(&client.sweep()).unwrap();
    let received = handle.join().unwrap();

    assert_eq!(sent.len(), 4);
    assert_eq!(received.len(), 4);
    for (i, (tx, rx)) in sent.iter().zip(&received).enumerate() {
        assert!(tx.is_completed(), "pass {}", i);
        assert!(rx.is_completed(), "pass {}", i);
        assert_eq!(tx.pass_index, i);
        assert_eq!(tx.statistics.total_bytes, 4096);
        assert_eq!(rx.statistics.total_bytes, 4096);
    }
    assert_eq!(received[3].configuration, TransferConfiguration::new(false, false));
}

#[test]
fn test_sweep_keeps_each_pass_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("received.bin");
    let input = input_file(4096);

    // Server sweeps four configurations, client sends a single pass
    let (server, listener, port) = bound(server_config().with_output_path(Some(output.clone())));
    let handle = thread::spawn(move || server.run_sweep(&listener, &menu::server_sweep()).unwrap());
    Client::new(client_config(port, input.path()))
        .unwrap()
        .run(&[TransferConfiguration::default()])
        .unwrap();
    let received = handle.join().unwrap();

    let totals: Vec<u64> = received.iter().map(|r| r.statistics.total_bytes).collect();
    assert_eq!(totals, vec![4096, 0, 0, 0]);

    assert_eq!(
        std::fs::read(dir.path().join("received.pass1.bin")).unwrap(),
        payload(4096)
    );
    for n in 2..=4 {
        let later = dir.path().join(format!("received.pass{}.bin", n));
        assert_eq!(std::fs::read(&later).unwrap().len(), 0, "pass {}", n);
    }
    assert!(!output.exists());
}

#[test]
fn test_configured_send_delay_paces_chunks() {
    let input = input_file(120);
    let delay = Duration::from_millis(50);

    let (server, listener, port) = bound(server_config());
    let handle = thread::spawn(move || {
        server
            .run_sweep(&listener, &[TransferConfiguration::default()])
            .unwrap()
    });

    let client = Client::new(client_config(port, input.path()).with_send_delay(delay)).unwrap();
    let cfg = client.selection(3);
    let sent = client.run(&[cfg]).unwrap();
    handle.join().unwrap();

    assert_eq!(sent[0].configuration.inter_chunk_delay, delay);
    assert_eq!(sent[0].statistics.packet_count, 3);
    assert!(sent[0].statistics.elapsed >= delay * 3);
}

#[test]
fn test_client_events_bracket_each_pass() {
    let input = input_file(400);
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_ref = events.clone();

    let (server, listener, port) = bound(server_config());
    let handle = thread::spawn(move || {
        server
            .run_sweep(&listener, &[TransferConfiguration::default()])
            .unwrap()
    });

    Client::new(client_config(port, input.path()))
        .unwrap()
        .with_callback(move |e: ProgressEvent| events_ref.lock().unwrap().push(e))
        .run(&[TransferConfiguration::default()])
        .unwrap();
    handle.join().unwrap();

    let events = events.lock().unwrap();
    assert!(matches!(events.first(), Some(ProgressEvent::PassStarted { pass_index: 0, .. })));
    assert!(matches!(events.last(), Some(ProgressEvent::PassCompleted(_))));
    let chunks = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::ChunkSent { .. }))
        .count();
    assert_eq!(chunks, 10);
}

#[test]
fn test_looping_server_reports_each_client() {
    let input = input_file(300);
    let reports = Arc::new(Mutex::new(Vec::new()));
    let reports_ref = reports.clone();

    let server = Server::new(server_config().with_max_clients(Some(2)))
        .unwrap()
        .with_callback(move |e: ProgressEvent| {
            if let ProgressEvent::PassCompleted(report) = e {
                reports_ref.lock().unwrap().push(*report);
            }
        });
    let listener = server.bind().unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        server
            .run_loop(&listener, |_| menu::server_selection(4))
            .unwrap()
    });

    for option in [1, 2] {
        let cfg = menu::client_selection(option, Duration::ZERO);
        Client::new(client_config(port, input.path()))
            .unwrap()
            .run(&[cfg])
            .unwrap();
    }
    assert_eq!(handle.join().unwrap(), 2);

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 2);
    for report in reports.iter() {
        assert_eq!(report.statistics.total_bytes, 300);
        assert_eq!(report.configuration, TransferConfiguration::new(false, false));
    }
}

#[test]
fn test_report_json_shape() {
    let input = input_file(120);
    let (sent, _) = sweep(
        server_config(),
        |port| client_config(port, input.path()),
        vec![TransferConfiguration::default()],
    );

    let json: serde_json::Value = serde_json::from_str(&sent[0].render_json().unwrap()).unwrap();
    assert_eq!(json["role"], "sender");
    assert_eq!(json["statistics"]["total_bytes"], 120);
    assert_eq!(json["statistics"]["packet_count"], 3);
    assert_eq!(json["outcome"]["status"], "completed");
    assert!(json["timestamp"].is_string());
}
