//! Seed a stream and print its live window.

use anyhow::Result;
use mxsync_client::NewEvent;
use mxsync_types::StreamId;

use super::Client;

/// Run the timeline command.
pub async fn run(client: &Client, stream: &str, events: usize, load_more: usize) -> Result<()> {
    let stream_id = StreamId::new(stream);

    let seed = (1..=events)
        .map(|i| NewEvent::new("@mxsync:localhost", format!("event {}", i), i as u64))
        .collect();
    client.events().append(&stream_id, seed);

    let pager = client.live_timeline(stream_id);
    for _ in 0..load_more {
        if !pager.load_more().await {
            break;
        }
    }

    let snapshot = pager.snapshot();
    match snapshot.range {
        Some(range) => println!(
            "Stream {}: showing {}..={} of {}",
            snapshot.stream_id,
            range.start,
            range.end,
            client.events().len(&snapshot.stream_id)
        ),
        None => println!("Stream {} is empty", snapshot.stream_id),
    }
    for event in &snapshot.events {
        println!("  [{}] {}: {}", event.position, event.sender, event.body);
    }
    if snapshot.has_more_backward {
        println!("  (older events available)");
    }

    pager.close();
    Ok(())
}
