//! Command-line configuration for the `jeux` server.

use clap::Parser;

/// `jeux` hosts concurrent two-player tic-tac-toe matches over a fixed
/// binary protocol on a single TCP port.
///
/// The `-p` option is required; the process exits with a usage error if
/// it is absent. There are no other options.
#[derive(Debug, Parser)]
#[command(name = "jeux", version, about)]
pub struct Config {
    /// TCP port to listen on.
    #[arg(short = 'p', value_name = "PORT")]
    pub port: u16,
}
