// tests/stream_glue.rs

//! Pump tests over in-memory duplex streams.

use execbridge::channel::{ChannelOutput, OutputStream};
use execbridge::glue::{StreamGlue, copy_stream, spawn_input_pump, spawn_output_pump};
use execbridge_test_utils::{init_tracing, with_timeout};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

#[tokio::test]
async fn output_pump_forwards_until_eof() {
    init_tracing();
    let (mut writer, reader) = tokio::io::duplex(64);
    let (output_tx, mut output_rx) = mpsc::channel(16);

    let pump = spawn_output_pump(reader, output_tx, OutputStream::Stdout);

    writer.write_all(b"first ").await.unwrap();
    writer.write_all(b"second").await.unwrap();
    drop(writer);

    let mut collected = Vec::new();
    while let Some(output) = output_rx.recv().await {
        match output {
            ChannelOutput::Data(bytes) => collected.extend(bytes),
            other => panic!("unexpected output: {other:?}"),
        }
    }
    assert_eq!(collected, b"first second");

    with_timeout(pump).await.unwrap();
}

#[tokio::test]
async fn stderr_pump_tags_chunks_as_stderr() {
    init_tracing();
    let (mut writer, reader) = tokio::io::duplex(64);
    let (output_tx, mut output_rx) = mpsc::channel(16);

    let pump = spawn_output_pump(reader, output_tx, OutputStream::Stderr);

    writer.write_all(b"oops").await.unwrap();
    drop(writer);

    assert_eq!(
        output_rx.recv().await,
        Some(ChannelOutput::StderrData(b"oops".to_vec()))
    );
    assert_eq!(output_rx.recv().await, None);

    with_timeout(pump).await.unwrap();
}

#[tokio::test]
async fn input_pump_writes_then_half_closes() {
    init_tracing();
    let (writer, mut reader) = tokio::io::duplex(64);
    let (data_tx, data_rx) = mpsc::channel(16);

    let pump = spawn_input_pump(data_rx, writer);

    data_tx.send(b"hello ".to_vec()).await.unwrap();
    data_tx.send(b"world".to_vec()).await.unwrap();
    drop(data_tx);

    // The shutdown after the channel ends is what gives the reader EOF.
    let mut received = Vec::new();
    with_timeout(reader.read_to_end(&mut received))
        .await
        .unwrap();
    assert_eq!(received, b"hello world");

    with_timeout(pump).await.unwrap();
}

#[tokio::test]
async fn input_pump_survives_a_closed_reader() {
    init_tracing();
    let (writer, reader) = tokio::io::duplex(16);
    let (data_tx, data_rx) = mpsc::channel(16);

    let pump = spawn_input_pump(data_rx, writer);
    drop(reader);

    // Writes fail once the peer is gone; the pump drains the rest instead
    // of erroring out.
    for _ in 0..8 {
        if data_tx.send(vec![0u8; 16]).await.is_err() {
            break;
        }
    }
    drop(data_tx);

    with_timeout(pump).await.unwrap();
}

#[tokio::test]
async fn glue_couples_both_directions() {
    init_tracing();
    let (mut stdin_peer, stdin) = tokio::io::duplex(64);
    let (mut stdout_peer, stdout) = tokio::io::duplex(64);
    let (data_tx, data_rx) = mpsc::channel(16);
    let (output_tx, mut output_rx) = mpsc::channel(16);

    let glue = StreamGlue::couple(stdout, stdin, data_rx, output_tx);

    // Channel data flows to the process's stdin.
    data_tx.send(b"to-stdin".to_vec()).await.unwrap();
    let mut buf = [0u8; 8];
    with_timeout(stdin_peer.read_exact(&mut buf)).await.unwrap();
    assert_eq!(&buf, b"to-stdin");

    // Process stdout flows to the channel.
    stdout_peer.write_all(b"to-channel").await.unwrap();
    assert_eq!(
        with_timeout(output_rx.recv()).await,
        Some(ChannelOutput::Data(b"to-channel".to_vec()))
    );

    drop(data_tx);
    drop(stdout_peer);
    with_timeout(glue.join()).await;
}

#[tokio::test]
async fn copy_stream_reports_byte_count() {
    init_tracing();
    let (mut writer, reader) = tokio::io::duplex(64);
    let (sink_writer, mut sink_reader) = tokio::io::duplex(64);

    let copier = tokio::spawn(copy_stream(reader, sink_writer));

    writer.write_all(b"serial console bytes").await.unwrap();
    drop(writer);

    let mut received = Vec::new();
    with_timeout(sink_reader.read_to_end(&mut received))
        .await
        .unwrap();
    assert_eq!(received, b"serial console bytes");

    let copied = with_timeout(copier).await.unwrap().unwrap();
    assert_eq!(copied, 20);
}
