//! `dlvc`: drive a Delve headless server from the command line.
//!
//! Every stdin line is a JSON array of semantic commands, e.g.
//! `[{"cmd": "createbreakpoint", "parms": {"Breakpoint": {"file": "main.go", "line": 5}}}]`.
//! Every batch result list is printed as one JSON line on stdout.

use anyhow::Context;
use clap::Parser;
use dlvc::rpc::Framing;
use dlvc::{Config, SemanticCommand, Worker};
use log::{info, warn};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::thread;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Delve server host
    #[clap(long, env = "DLVC_HOST")]
    host: Option<String>,

    /// Delve server port
    #[clap(long, env = "DLVC_PORT")]
    port: Option<u16>,

    /// Path to config file (default: ~/.config/dlvc/config.toml)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Socket read/write timeout in seconds, 0 disables timeout
    #[clap(long)]
    timeout: Option<u64>,

    /// Message framing on the wire
    #[clap(long)]
    framing: Option<Framing>,

    /// Append raw protocol traffic to this file
    #[clap(long)]
    trace_file: Option<PathBuf>,

    /// Enable debug logs and mirror protocol traffic into them
    #[clap(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::from_file(self.config.as_deref()).context("load config")?;
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(framing) = self.framing {
            config.framing = framing;
        }
        if let Some(trace_file) = &self.trace_file {
            config.trace_file = Some(trace_file.clone());
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let config = args.config()?;
    if args.verbose || config.trace_file.is_some() {
        dlvc::log::enable_wire_trace();
    }
    info!(target: "dlvc", "connect to delve at {}:{}", config.host, config.port);

    let (worker, results) = Worker::with_channel(config);

    let reader = thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(target: "dlvc", "read stdin: {e}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Vec<SemanticCommand>>(&line) {
                Ok(batch) => worker.submit(batch),
                Err(e) => warn!(target: "dlvc", "invalid batch `{line}`: {e}"),
            }
        }
        worker.stop();
        worker.join();
    });

    let mut stdout = std::io::stdout().lock();
    for batch in results {
        serde_json::to_writer(&mut stdout, &batch)?;
        writeln!(stdout)?;
        stdout.flush()?;
    }

    if reader.join().is_err() {
        anyhow::bail!("stdin reader panicked");
    }
    Ok(())
}
