//! Operator menu: numeric selections mapped to transfer configurations.
//!
//! The mapping functions are pure; only [`prompt_selection`] touches I/O.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::config::{Role, TransferConfiguration};

/// Client option `n` (1-4). Invalid selections fall back to Nagle ON,
/// delay OFF.
///
/// # Examples
///
/// ```
/// use tcptune::menu::client_selection;
/// use std::time::Duration;
///
/// let delay = Duration::from_millis(1000);
/// assert!(!client_selection(4, delay).nagle_enabled);
/// assert_eq!(client_selection(9, delay), client_selection(1, delay));
/// ```
pub fn client_selection(option: u32, delay: Duration) -> TransferConfiguration {
    let (nagle, delayed) = match option {
        1 => (true, false),
        2 => (false, false),
        3 => (true, true),
        4 => (false, true),
        _ => (true, false),
    };
    let cfg = TransferConfiguration::new(nagle, true);
    if delayed {
        cfg.with_inter_chunk_delay(delay)
    } else {
        cfg
    }
}

/// Server option `n` (1-4). Invalid selections fall back to Nagle ON,
/// delayed-ACK ON.
pub fn server_selection(option: u32) -> TransferConfiguration {
    match option {
        1 => TransferConfiguration::new(true, true),
        2 => TransferConfiguration::new(true, false),
        3 => TransferConfiguration::new(false, true),
        4 => TransferConfiguration::new(false, false),
        _ => TransferConfiguration::new(true, true),
    }
}

pub fn is_valid_selection(option: u32) -> bool {
    (1..=4).contains(&option)
}

/// Maps a selection for `role`.
pub fn selection(role: Role, option: u32, delay: Duration) -> TransferConfiguration {
    match role {
        Role::Sender => client_selection(option, delay),
        Role::Receiver => server_selection(option),
    }
}

/// All four client configurations in menu order.
pub fn client_sweep(delay: Duration) -> Vec<TransferConfiguration> {
    (1..=4).map(|n| client_selection(n, delay)).collect()
}

/// All four server configurations in menu order.
pub fn server_sweep() -> Vec<TransferConfiguration> {
    (1..=4).map(server_selection).collect()
}

/// Menu text shown before the prompt.
pub fn menu_text(role: Role, delay: Duration) -> String {
    let mut lines = vec![
        "TCP File Transfer With Nagle and Delayed-ACK Options".to_string(),
        "====================================================".to_string(),
        "Options:".to_string(),
    ];
    for n in 1..=4 {
        let cfg = selection(role, n, delay);
        let line = match role {
            Role::Sender => format!(
                "  {}. Nagle {}, Delay {} ({}ms)",
                n,
                if cfg.nagle_enabled { "ON" } else { "OFF" },
                if cfg.has_delay() { "ON" } else { "OFF" },
                delay.as_millis()
            ),
            Role::Receiver => format!(
                "  {}. Nagle {}, Delayed-ACK {}",
                n,
                if cfg.nagle_enabled { "ON" } else { "OFF" },
                if cfg.delayed_ack_enabled { "ON" } else { "OFF" }
            ),
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// Prints the menu, reads one line and maps it.
///
/// Anything that is not a number in 1-4 selects the default configuration
/// and prints a notice. Only I/O failures on the prompt streams are errors.
pub fn prompt_selection<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    role: Role,
    delay: Duration,
) -> io::Result<TransferConfiguration> {
    writeln!(output, "{}", menu_text(role, delay))?;
    write!(output, "Enter option (1-4): ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    let option = line.trim().parse::<u32>().unwrap_or(0);
    let cfg = selection(role, option, delay);
    if !is_valid_selection(option) {
        writeln!(output, "Invalid option. Using default: {}", cfg)?;
    }
    Ok(cfg)
}
