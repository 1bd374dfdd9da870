//! Example FastAGI IVR server
//!
//! Answers each call, prompts for an extension, collects up to four
//! digits with a 3-second inter-digit timeout, and reads them back.
//!
//! Usage: cargo run --example ivr_server
//!
//! Point an Asterisk dialplan at it with:
//!   exten => 600,1,AGI(agi://127.0.0.1:4573/ivr)

use std::time::Duration;

use fastagi_tokio::{AgiChannel, AgiError, AgiServer};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let server = AgiServer::bind("0.0.0.0:4573").await?;
    info!("Waiting for AGI connections from Asterisk...");

    loop {
        match server.accept().await {
            Ok((channel, _events)) => {
                tokio::spawn(async move {
                    if let Err(e) = handle_call(&channel).await {
                        error!("Error handling call: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_call(channel: &AgiChannel) -> Result<(), AgiError> {
    let meta = channel.metadata();
    info!(
        "Handling call {} from {} <{}>",
        meta.uniqueid, meta.calleridname, meta.callerid
    );

    channel.answer().await?;

    let entry = channel
        .get_data(
            "ivr/ivr-please_enter_extension_followed_by_pound",
            Duration::from_secs(10),
            Some(4),
            Some(Duration::from_secs(3)),
        )
        .await?;

    if entry.timed_out {
        info!("Caller entered nothing");
        channel
            .stream_file("ivr/ivr-that_was_an_invalid_entry", "")
            .await?;
    } else {
        info!("Caller entered: {}", entry.digits);
        channel.say_digits(&entry.digits, "").await?;
    }

    channel.hangup().await?;
    Ok(())
}
