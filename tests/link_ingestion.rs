//! End-to-end ingestion through an in-process transport

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, ensure};
use toad_readout::encoder::{FrameBuilder, encode_data_word, encode_stream, sample_stream};
use toad_readout::{
    ChannelTransport, HeaderLayout, LinkConfig, LinkHandler, LinkMode, QueueSink, Readout,
    ReadoutRecord, RecordReceiver, StreamLink,
};

fn config() -> LinkConfig {
    LinkConfig { card_id: 4, link_tag: 1, receiver_timeout_ms: 5, ..Default::default() }
}

fn collect(rx: &mut RecordReceiver, count: usize, timeout: Duration) -> Result<Vec<ReadoutRecord>> {
    let deadline = Instant::now() + timeout;
    let mut records = Vec::with_capacity(count);
    while records.len() < count {
        ensure!(Instant::now() < deadline, "timed out after {} of {} records", records.len(), count);
        match rx.try_recv() {
            Some(record) => records.push(record),
            None => std::thread::sleep(Duration::from_millis(1)),
        }
    }
    Ok(records)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !condition() {
        ensure!(Instant::now() < deadline, "condition not met within {:?}", timeout);
        std::thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}

#[test]
fn stream_split_across_many_messages_is_decoded_in_order() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let (mut link, sender, mut rx) = Readout::loopback(config(), 4096)?;
    let stream = sample_stream(50, 13);

    // Chunk sizes that never line up with the 40-byte frames.
    for chunk in stream.chunks(17) {
        sender.blocking_send_message(Some(b"pacman".as_slice()), chunk)?;
    }

    let records = collect(&mut rx, 50 * 13, Duration::from_secs(10))?;
    for (frame, chunk) in records.chunks(13).enumerate() {
        ensure!(chunk.iter().all(|r| r.fec_id as usize == frame), "frame {} out of order", frame);
        let clusters: Vec<u16> = chunk.iter().map(|r| r.cluster).collect();
        ensure!(clusters == (0..13).collect::<Vec<_>>(), "cluster indices for frame {}", frame);
    }
    ensure!(records.iter().all(|r| r.card_id == 4 && r.link_tag == 1));

    let info = link.info();
    ensure!(info.counters.bytes_received == stream.len() as u64);
    ensure!(info.counters.records_decoded == 650);
    ensure!(info.counters.frames_decoded == 50);
    link.stop()?;
    Ok(())
}

#[test]
fn single_sample_frame_from_explicit_words() -> Result<()> {
    let (mut link, sender, mut rx) = Readout::loopback(config(), 16)?;

    let mut frame = Vec::new();
    frame.extend_from_slice(&0x8001_0000_0000_0000u64.to_be_bytes());
    frame.extend_from_slice(&0u64.to_be_bytes());
    frame.extend_from_slice(&encode_data_word(&[5]).to_be_bytes());
    sender.blocking_send_message(Some(b"pacman".as_slice()), &frame)?;

    let records = collect(&mut rx, 1, Duration::from_secs(5))?;
    ensure!(records[0].adc == 5);
    ensure!(records[0].cluster == 0);

    std::thread::sleep(Duration::from_millis(20));
    ensure!(rx.try_recv().is_none(), "exactly one record expected");
    link.stop()?;
    Ok(())
}

#[test]
fn pubsub_mode_takes_bare_payloads() -> Result<()> {
    let config = LinkConfig { mode: LinkMode::PubSub, ..config() };
    let (mut link, sender, mut rx) = Readout::loopback(config, 16)?;

    let frame = FrameBuilder::new().samples(&[1, 2, 3]).encode();
    sender.blocking_send_message(None, &frame)?;

    let records = collect(&mut rx, 3, Duration::from_secs(5))?;
    ensure!(records.iter().map(|r| r.adc).collect::<Vec<_>>() == vec![1, 2, 3]);
    link.stop()?;
    Ok(())
}

#[test]
fn legacy_layout_link() -> Result<()> {
    let config = LinkConfig { layout: HeaderLayout::Legacy, ..config() };
    let (mut link, sender, mut rx) = Readout::loopback(config, 16)?;

    let stream = encode_stream(&[
        FrameBuilder::new().layout(HeaderLayout::Legacy).fec_id(17).channel(2).raw_timestamp(500).samples(&[9]),
        FrameBuilder::new().layout(HeaderLayout::Legacy).fec_id(18).channel(3).raw_timestamp(501).samples(&[8]),
    ]);
    sender.blocking_send_message(Some(b"pacman".as_slice()), &stream)?;

    let records = collect(&mut rx, 2, Duration::from_secs(5))?;
    ensure!(records[0].channel == 2 && records[0].timestamp == 500);
    ensure!(records[1].channel == 3 && records[1].fec_id == 18);
    link.stop()?;
    Ok(())
}

#[test]
fn full_sink_drops_records_but_counts_bytes() -> Result<()> {
    let (transport, sender) = ChannelTransport::pair(16);
    let (sink, _rx) = QueueSink::bounded("tiny", 1);
    let mut link = StreamLink::new(transport);
    link.set_sink(Arc::new(sink));
    link.configure(LinkConfig { sink_timeout_ms: 1, ..config() })?;
    link.start()?;

    let frame = FrameBuilder::new().samples(&[1, 2, 3, 4]).encode();
    sender.blocking_send_message(Some(b"pacman".as_slice()), &frame)?;

    let counters = link.counters();
    wait_until(Duration::from_secs(5), || counters.snapshot().records_dropped == 3)?;
    let snap = counters.snapshot();
    ensure!(snap.bytes_received == frame.len() as u64);
    ensure!(snap.records_forwarded == 1, "queue holds exactly one record");
    link.stop()?;
    Ok(())
}

#[test]
fn stray_data_word_is_reported_and_link_survives() -> Result<()> {
    let (mut link, sender, mut rx) = Readout::loopback(LinkConfig { resync_on_desync: true, ..config() }, 16)?;

    let mut payload = encode_data_word(&[1, 1]).to_be_bytes().to_vec();
    payload.extend(FrameBuilder::new().samples(&[77]).encode());
    sender.blocking_send_message(Some(b"pacman".as_slice()), &payload)?;

    let records = collect(&mut rx, 1, Duration::from_secs(5)).context("record after resync")?;
    ensure!(records[0].adc == 77);
    ensure!(link.info().counters.desync_errors == 1);
    link.stop()?;
    Ok(())
}

#[test]
fn zero_length_messages_are_counted() -> Result<()> {
    let (mut link, sender, _rx) = Readout::loopback(config(), 16)?;
    for _ in 0..3 {
        sender.blocking_send_message(Some(b"pacman".as_slice()), &[])?;
    }
    let counters = link.counters();
    wait_until(Duration::from_secs(5), || counters.snapshot().zero_receives == 3)?;
    ensure!(counters.snapshot().bytes_received == 0);
    link.stop()?;
    Ok(())
}
