//! Mock target application for integration testing
//!
//! Listens on an ephemeral loopback port, publishes `{"pid":..,"port":..}`
//! to the app-info file and answers admin requests with the probe states
//! read from a JSON file.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use harness::app::codec::{self, LENGTH_WIDTH};
use harness::app::admin::LIST_PROBES;

#[derive(Parser)]
struct Args {
    /// Where to publish the app-info file
    #[arg(long)]
    appinfo: PathBuf,

    /// JSON array of probe states to serve
    #[arg(long)]
    probes: PathBuf,

    /// Accepted for parity with real targets
    #[arg(long, default_value_t = 0)]
    transactions: u32,

    /// Exit on our own after this long, in case nobody kills us
    #[arg(long, default_value_t = 300)]
    lifetime_secs: u64,

    /// Remaining arguments are ignored
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

fn main() {
    let args = Args::parse();

    let probes = match std::fs::read_to_string(&args.probes) {
        Ok(probes) => probes,
        Err(e) => {
            eprintln!("cannot read {}: {}", args.probes.display(), e);
            std::process::exit(2);
        }
    };

    let listener = match TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("cannot listen: {}", e);
            std::process::exit(2);
        }
    };
    let port = listener.local_addr().map(|addr| addr.port()).unwrap_or(0);

    if let Err(e) = publish(&args.appinfo, port) {
        eprintln!("cannot write {}: {}", args.appinfo.display(), e);
        std::process::exit(2);
    }

    let lifetime = Duration::from_secs(args.lifetime_secs);
    std::thread::spawn(move || {
        std::thread::sleep(lifetime);
        std::process::exit(0);
    });

    for stream in listener.incoming().flatten() {
        serve(stream, probes.trim());
    }
}

/// Write the app-info file so readers never see a partial document
fn publish(path: &Path, port: u16) -> std::io::Result<()> {
    let content = format!("{{\"pid\": {}, \"port\": {}}}", std::process::id(), port);
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

fn serve(mut stream: TcpStream, probes: &str) {
    loop {
        let mut prefix = [0u8; LENGTH_WIDTH];
        if stream.read_exact(&mut prefix).is_err() {
            return;
        }

        let len: usize = match std::str::from_utf8(&prefix).ok().and_then(|s| s.parse().ok()) {
            Some(len) => len,
            None => return,
        };

        let mut body = vec![0u8; len];
        if stream.read_exact(&mut body).is_err() {
            return;
        }

        let response = match std::str::from_utf8(&body) {
            Ok(LIST_PROBES) => codec::encode_response(0, probes),
            Ok(other) => codec::encode_response(1, &format!("unknown request '{}'", other)),
            Err(_) => codec::encode_response(1, "request is not UTF-8"),
        };

        if stream.write_all(response.as_bytes()).is_err() {
            return;
        }
    }
}
