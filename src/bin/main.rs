use clap::{Parser, Subcommand};
use log::warn;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;
use tcptune::config::{DEFAULT_INPUT_FILE, DEFAULT_OUTPUT_FILE};
use tcptune::{
    menu, Client, Config, ProgressCallback, ProgressEvent, Role, Server, TransferConfiguration,
};

#[derive(Parser)]
#[command(name = "tcptune")]
#[command(
    about = "Measure how Nagle's algorithm and delayed ACKs shape a small-chunk TCP transfer",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run in server mode (receiver)
    Server {
        /// Port to listen on
        #[arg(short, long, default_value = "5050")]
        port: u16,

        /// Bind to specific address
        #[arg(short, long)]
        bind: Option<String>,

        /// Read buffer size in bytes
        #[arg(short = 'l', long, default_value = "40")]
        chunk_size: usize,

        /// File received bytes are written to
        #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
        output: PathBuf,

        /// Count bytes without saving them
        #[arg(long)]
        no_output: bool,

        /// Bytes per pass before moving to the next configuration
        #[arg(long)]
        pass_bytes: Option<u64>,

        /// Serve clients one after another, one pass each
        #[arg(long = "loop")]
        looping: bool,

        /// Menu option (1-4) instead of the interactive prompt or full sweep
        #[arg(short, long)]
        variant: Option<u32>,

        /// Stop the looping server after this many clients
        #[arg(long)]
        max_clients: Option<usize>,

        /// Packets between progress lines (0 disables them)
        #[arg(long, default_value = "10")]
        progress_every: u64,

        /// Output in JSON format
        #[arg(short = 'J', long)]
        json: bool,
    },

    /// Run in client mode (sender)
    Client {
        /// Server address to connect to
        server: String,

        /// Port to connect to
        #[arg(short, long, default_value = "5050")]
        port: u16,

        /// File to send
        #[arg(short, long, default_value = DEFAULT_INPUT_FILE)]
        input: PathBuf,

        /// Send chunk size in bytes
        #[arg(short = 'l', long, default_value = "40")]
        chunk_size: usize,

        /// Pause before each chunk for configurations with the delay on
        #[arg(short, long, default_value = "1000")]
        delay_ms: u64,

        /// Menu option (1-4) instead of the interactive prompt
        #[arg(short, long, conflicts_with = "all")]
        variant: Option<u32>,

        /// Run all four configurations over one connection
        #[arg(short, long)]
        all: bool,

        /// Upper bound on bytes sent per pass
        #[arg(long)]
        byte_limit: Option<u64>,

        /// Output in JSON format
        #[arg(short = 'J', long)]
        json: bool,

        /// Exit without waiting for Enter
        #[arg(long)]
        no_wait: bool,
    },
}

/// Prints progress events for the operator.
struct Printer {
    json: bool,
}

impl ProgressCallback for Printer {
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::PassCompleted(report) => {
                if self.json {
                    match report.render_json() {
                        Ok(doc) => println!("{}", doc),
                        Err(e) => eprintln!("Error rendering report: {}", e),
                    }
                } else {
                    print!("{}", report.render_text());
                }
            }
            ProgressEvent::Error(msg) => eprintln!("Error: {}", msg),
            _ if self.json => {}
            ProgressEvent::PassStarted {
                role,
                pass_index,
                configuration,
            } => {
                println!("\n--- Pass {} ({}): {} ---", pass_index + 1, role, configuration);
            }
            ProgressEvent::Delaying { delay } => {
                println!("Applying delay of {}ms before sending...", delay.as_millis());
            }
            ProgressEvent::ChunkSent { bytes, total } => {
                println!("Sent {} bytes. Total: {} bytes.", bytes, total);
            }
            ProgressEvent::Progress {
                packets,
                total_bytes,
            } => {
                println!("Received {} packets, {} bytes so far", packets, total_bytes);
            }
        }
    }
}

/// Warns when `option` fell back to the default configuration `cfg`.
fn checked(option: u32, cfg: TransferConfiguration) -> TransferConfiguration {
    if !menu::is_valid_selection(option) {
        warn!("Invalid option {}. Using default: {}", option, cfg);
    }
    cfg
}

fn prompt(role: Role, delay: Duration) -> io::Result<TransferConfiguration> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    menu::prompt_selection(&mut input, &mut io::stdout(), role, delay)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            port,
            bind,
            chunk_size,
            output,
            no_output,
            pass_bytes,
            looping,
            variant,
            max_clients,
            progress_every,
            json,
        } => {
            let mut config = Config::server(port)
                .with_chunk_size(chunk_size)
                .with_output_path(if no_output { None } else { Some(output) })
                .with_pass_bytes(pass_bytes)
                .with_max_clients(max_clients)
                .with_progress_every(progress_every)
                .with_json(json);

            if let Some(bind_addr) = bind {
                config.bind_addr = Some(bind_addr.parse()?);
            }

            let server = Server::new(config)?;
            let printer = Printer {
                json: server.config().json,
            };
            let server = server.with_callback(printer);
            let listener = server.bind()?;

            if looping {
                server.run_loop(&listener, |peer| {
                    println!("Client connected: {}", peer);
                    match variant {
                        Some(option) => checked(option, menu::server_selection(option)),
                        None => prompt(Role::Receiver, Duration::ZERO).unwrap_or_else(|e| {
                            warn!("Cannot read selection: {}", e);
                            menu::server_selection(0)
                        }),
                    }
                })?;
            } else {
                let passes = match variant {
                    Some(option) => vec![checked(option, menu::server_selection(option))],
                    None => menu::server_sweep(),
                };
                server.run_sweep(&listener, &passes)?;
            }
        }

        Commands::Client {
            server,
            port,
            input,
            chunk_size,
            delay_ms,
            variant,
            all,
            byte_limit,
            json,
            no_wait,
        } => {
            let config = Config::client(server, port)
                .with_input_path(input)
                .with_chunk_size(chunk_size)
                .with_send_delay(Duration::from_millis(delay_ms))
                .with_byte_limit(byte_limit)
                .with_json(json);

            let client = Client::new(config)?;
            let passes = if all {
                client.sweep()
            } else if let Some(option) = variant {
                vec![checked(option, client.selection(option))]
            } else {
                vec![prompt(Role::Sender, client.config().send_delay)?]
            };

            let printer = Printer {
                json: client.config().json,
            };
            let client = client.with_callback(printer);
            let reports = client.run(&passes)?;

            let failed = reports.iter().filter(|r| !r.is_completed()).count();
            if failed > 0 {
                warn!("{} of {} passes did not complete", failed, reports.len());
            }

            if !no_wait {
                println!("Press Enter to exit...");
                let mut line = String::new();
                io::stdin().lock().read_line(&mut line)?;
            }
        }
    }

    Ok(())
}
