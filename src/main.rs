// cliscan Source Code File
//
// Copyright 2013 Hello Inc. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use cliscan::host::HostCentral;
use cliscan::session::{ScanConfig, ScanEvent, ScanSession, StopReason};
use cliscan::{Error, Result};
use futures::stream::StreamExt;
use log::info;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Usage(text)) => {
            print!("{}", text);
            ExitCode::SUCCESS
        }
        Err(err @ Error::InvalidArgument(_)) => {
            eprintln!("cliscan: {}", err);
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("cliscan: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // Arguments are checked before touching the radio so --help works without an adapter.
    let config = ScanConfig::default().with_arguments(std::env::args_os().skip(1))?;
    let central = HostCentral::first_adapter().await?;
    let session = ScanSession::with_config(central, config).await?;

    let mut events = session.events();
    session.start_scan(session.config().duration).await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let reason = loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                info!("Interrupted, stopping scan");
                session.stop_scan().await?;
            }
            event = events.next() => match event {
                Some(ScanEvent::Discovered(discovery)) => println!("{}", discovery),
                Some(ScanEvent::Connected(id)) => println!("connected to {}", id),
                Some(ScanEvent::Stopped(reason)) => break reason,
                Some(_) => {}
                None => break StopReason::HostClosed,
            },
        }
    };
    // A lagging subscriber can miss Discovered events, so count from the registry.
    println!(
        "scan stopped ({}): {} peripheral(s) found",
        reason,
        session.discoveries().len()
    );

    match reason {
        StopReason::RadioUnavailable(state) => Err(Error::RadioUnavailable(state)),
        StopReason::ConnectionFailed { id, reason } => Err(Error::Other(
            format!("connection to {} failed: {}", id, reason).into(),
        )),
        StopReason::HostClosed => Err(Error::InvalidHandle),
        StopReason::Elapsed
        | StopReason::Matched
        | StopReason::Connected(_)
        | StopReason::Cancelled => Ok(()),
    }
}
