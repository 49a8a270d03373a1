//! Media sharing demo
//!
//! Starts two in-process agents connected over the loopback transport,
//! shares one media item from alice to bob and prints bob's record.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use futures::StreamExt;
use media_sharing::{
    AgentConfig, CreateMediaSharingOptions, EventKind, LogConfig, LoopbackNetwork, MediaAgent,
    MediaItem, Metadata, MetadataValue, ShareMediaOptions,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URI of the media to share
    #[arg(short, long, default_value = "https://example.com/photo.png")]
    uri: String,

    /// MIME type of the media
    #[arg(short, long, default_value = "image/png")]
    mime_type: String,

    /// Optional description of the item
    #[arg(short, long)]
    description: Option<String>,

    /// Sender-local metadata as key=value (values may be JSON)
    #[arg(long = "metadata", value_parser = parse_key_value)]
    metadata: Vec<(String, MetadataValue)>,
}

fn parse_key_value(raw: &str) -> Result<(String, MetadataValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err("metadata key must not be empty".to_string());
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), MetadataValue::from_json(value)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let network = LoopbackNetwork::new();
    let (alice_transport, _alice_inbox) = network.register_endpoint("alice");
    let (bob_transport, bob_inbox) = network.register_endpoint("bob");
    let (alice_conn, _bob_conn) = network.connect("alice", "bob")?;

    let alice = MediaAgent::new(
        AgentConfig::in_memory("alice").with_logging(LogConfig::development()),
        Arc::new(alice_transport),
    )?;
    let bob = Arc::new(MediaAgent::new(
        AgentConfig::in_memory("bob"),
        Arc::new(bob_transport),
    )?);
    let inbound = bob.spawn_inbound(bob_inbox);
    let mut received = bob.events().subscribe(EventKind::RecordAdded);

    let metadata: Metadata = args.metadata.into_iter().collect();
    let record = alice
        .media()
        .create(CreateMediaSharingOptions::new(&alice_conn).with_metadata(metadata))
        .await?;
    info!(record_id = %record.id, "Alice created record");

    let mut item = MediaItem::new(args.mime_type, args.uri);
    if let Some(description) = args.description {
        item = item.with_description(description);
    }
    alice
        .media()
        .share(ShareMediaOptions::new(&record.id, vec![item]))
        .await?;

    let event = tokio::time::timeout(Duration::from_secs(5), received.next())
        .await?
        .ok_or("bob's event stream closed")?;
    let record = bob.media().get_by_id(&event.record().id)?;
    println!("{}", serde_json::to_string_pretty(&record)?);

    inbound.abort();
    Ok(())
}
