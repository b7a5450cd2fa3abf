use anyhow::{Context, Result};
use log::{info, warn};
use std::time::Duration;

use telemetry_link::Sink;
use telemetry_link::sink::LogSink;
use telemetry_link::transport::{BUFFER_SIZE, Received, TcpTransport, Transport, parse_target};

use crate::cli::ProbeOpts;

pub fn run(opts: ProbeOpts) -> Result<()> {
    let target = parse_target(&opts.target.ip, opts.target.port).context("probe target")?;
    let mut transport = TcpTransport::default();
    let mut conn = transport
        .connect_with_retry(target, Duration::from_secs(opts.target.timeout))
        .with_context(|| format!("probing {}", target))?;
    info!("producer reachable at {}", target);

    if opts.sample {
        let mut buf = [0u8; BUFFER_SIZE];
        match transport.receive(&mut conn, &mut buf).context("sample receive")? {
            Received::Data(n) => LogSink.ingest(1, &buf[..n]),
            Received::EndOfStream => warn!("producer closed the connection before sending"),
            Received::Empty => warn!("no payload received"),
        }
    }

    transport.close(conn).context("closing probe connection")?;
    Ok(())
}
