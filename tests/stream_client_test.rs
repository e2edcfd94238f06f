use std::io;
use std::sync::Arc;
use std::time::Duration;

use mjpeg_proxy::{AppError, AppResult, FrameSink, ProxyConfig, StopFlag, StreamClient};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Instant};

type Frames = Arc<Mutex<Vec<Vec<u8>>>>;

const PATH: &str = "/?action=stream";

fn test_config(port: u16) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.stream.hostname = "127.0.0.1".to_string();
    config.stream.port = port;
    config.stream.path = PATH.to_string();
    config.stream.boundary = "--frame".to_string();
    config.network.connect_timeout_ms = 1_000;
    config.network.read_timeout_ms = 300;
    config.network.frame_buffer_size = 1024;
    config.network.reconnect_backoff_ms = 50;
    config.network.max_reconnect_backoff_ms = 200;
    config
}

fn collector() -> (Frames, impl FrameSink + Send + 'static) {
    let frames: Frames = Arc::new(Mutex::new(Vec::new()));
    let sink_frames = frames.clone();
    let sink = move |frame: &[u8]| sink_frames.lock().push(frame.to_vec());
    (frames, sink)
}

fn part(boundary: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        boundary,
        payload.len()
    )
    .into_bytes();
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n");
    out
}

/// Accepts one client, checks its request and answers with `head`.
async fn accept_stream(listener: &TcpListener, head: &[u8]) -> io::Result<TcpStream> {
    let (mut socket, _) = listener.accept().await?;
    let mut request = vec![0u8; 1024];
    let read = socket.read(&mut request).await?;
    assert!(request[..read].starts_with(format!("GET {} HTTP/1.0\r\n", PATH).as_bytes()));
    socket.write_all(head).await?;
    Ok(socket)
}

async fn wait_for_frames(frames: &Frames, count: usize) -> Vec<Vec<u8>> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        {
            let frames = frames.lock();
            if frames.len() >= count {
                return frames.clone();
            }
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {} frames",
            count
        );
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_start_extracts_frames_from_small_writes() -> AppResult<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let config = test_config(listener.local_addr()?.port());

    let server = tokio::spawn(async move {
        let mut socket = accept_stream(
            &listener,
            b"HTTP/1.0 200 OK\r\nContent-Type: multipart/x-mixed-replace;boundary=myboundary\r\n\r\n",
        )
        .await?;
        let body = b"--myboundary\r\nContent-Length: 5\r\n\r\nAAAAA--myboundary\r\nContent-Length: 3\r\n\r\nBBB";
        for chunk in body.chunks(3) {
            socket.write_all(chunk).await?;
            socket.flush().await?;
            sleep(Duration::from_millis(1)).await;
        }
        Ok::<_, io::Error>(socket)
    });

    let (frames, sink) = collector();
    let stop = StopFlag::new();
    let client_stop = stop.clone();
    let client = std::thread::spawn(move || StreamClient::start(&config, sink, client_stop));

    let received = wait_for_frames(&frames, 2).await;
    assert_eq!(received, vec![b"AAAAA".to_vec(), b"BBB".to_vec()]);

    stop.stop();
    let joined = tokio::task::spawn_blocking(move || client.join())
        .await
        .unwrap()
        .unwrap();
    joined?;
    let _socket = server.await.unwrap()?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnect_discards_partial_frame() -> AppResult<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let config = test_config(listener.local_addr()?.port());

    let server = tokio::spawn(async move {
        // first session dies in the middle of a payload
        let mut first = accept_stream(&listener, b"HTTP/1.0 200 OK\r\n\r\n").await?;
        first
            .write_all(b"--frame\r\nContent-Length: 10\r\n\r\nHALF")
            .await?;
        drop(first);

        let mut second = accept_stream(&listener, b"HTTP/1.0 200 OK\r\n\r\n").await?;
        second.write_all(&part("--frame", b"one")).await?;
        second.write_all(&part("--frame", b"two")).await?;
        Ok::<_, io::Error>(second)
    });

    let (frames, sink) = collector();
    let stop = StopFlag::new();
    let mut client = StreamClient::new(&config, sink, stop.clone())?;
    let handle = tokio::spawn(async move {
        client.run().await?;
        Ok::<_, AppError>(client.stats())
    });

    let received = wait_for_frames(&frames, 2).await;
    assert_eq!(received, vec![b"one".to_vec(), b"two".to_vec()]);

    stop.stop();
    let stats = timeout(Duration::from_secs(2), handle)
        .await
        .expect("client did not stop")
        .unwrap()?;
    assert_eq!(stats.frames, 2);
    let _socket = server.await.unwrap()?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_error_status_is_retried() -> AppResult<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let config = test_config(listener.local_addr()?.port());

    let server = tokio::spawn(async move {
        let refused = accept_stream(&listener, b"HTTP/1.0 503 Service Unavailable\r\n\r\n").await?;
        drop(refused);

        let mut socket = accept_stream(
            &listener,
            b"HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=\"cam\"\r\n\r\n",
        )
        .await?;
        socket.write_all(&part("--cam", b"\xff\xd8jpeg\xff\xd9")).await?;
        Ok::<_, io::Error>(socket)
    });

    let (frames, sink) = collector();
    let stop = StopFlag::new();
    let mut client = StreamClient::new(&config, sink, stop.clone())?;
    let handle = tokio::spawn(async move { client.run().await });

    let received = wait_for_frames(&frames, 1).await;
    assert_eq!(received, vec![b"\xff\xd8jpeg\xff\xd9".to_vec()]);

    stop.stop();
    timeout(Duration::from_secs(2), handle)
        .await
        .expect("client did not stop")
        .unwrap()?;
    let _socket = server.await.unwrap()?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_while_stream_is_idle() -> AppResult<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let config = test_config(listener.local_addr()?.port());
    let read_timeout = config.network.read_timeout();

    let server = tokio::spawn(async move {
        let socket = accept_stream(&listener, b"HTTP/1.0 200 OK\r\n\r\n").await?;
        Ok::<_, io::Error>((socket, listener))
    });

    let (frames, sink) = collector();
    let stop = StopFlag::new();
    let mut client = StreamClient::new(&config, sink, stop.clone())?;
    let handle = tokio::spawn(async move { client.run().await });

    // wait for the session, then stop while no bytes are flowing
    let _idle = server.await.unwrap()?;
    sleep(Duration::from_millis(50)).await;
    let stopped_at = Instant::now();
    stop.stop();

    timeout(read_timeout * 3, handle)
        .await
        .expect("client ignored the stop flag")
        .unwrap()?;
    assert!(stopped_at.elapsed() <= read_timeout * 3);
    assert!(frames.lock().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_while_response_head_trickles_in() -> AppResult<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let config = test_config(listener.local_addr()?.port());
    let read_timeout = config.network.read_timeout();

    // one head byte every 200 ms, never reaching the blank line
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await?;
        let mut request = vec![0u8; 1024];
        socket.read(&mut request).await?;
        let head = b"HTTP/1.0 200 OK\r\nX-Padding: ";
        for &byte in head.iter().chain(std::iter::repeat(&b'a')) {
            if socket.write_all(&[byte]).await.is_err() {
                break;
            }
            sleep(Duration::from_millis(200)).await;
        }
        Ok::<_, io::Error>(())
    });

    let (frames, sink) = collector();
    let stop = StopFlag::new();
    let mut client = StreamClient::new(&config, sink, stop.clone())?;
    let handle = tokio::spawn(async move { client.run().await });

    sleep(Duration::from_millis(700)).await;
    let stopped_at = Instant::now();
    stop.stop();

    timeout(read_timeout * 2, handle)
        .await
        .expect("client kept reading the response head after stop")
        .unwrap()?;
    assert!(stopped_at.elapsed() <= read_timeout * 2);
    assert!(frames.lock().is_empty());

    timeout(Duration::from_secs(5), server)
        .await
        .expect("server kept writing to a closed session")
        .unwrap()?;
    Ok(())
}
