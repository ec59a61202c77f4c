// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! wait_recv / wait_send / wait_accept over real sockets, on both backends.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::Duration;

use aio_rt::{Backend, BoxError, RuntimeConfig, Scheduler};

fn scheduler(backend: Backend) -> Scheduler {
    let config = RuntimeConfig {
        backend,
        ..RuntimeConfig::default()
    };
    Scheduler::from_config(&config).unwrap()
}

fn backends() -> Vec<Backend> {
    if cfg!(target_os = "linux") {
        vec![Backend::Poll, Backend::Epoll]
    } else {
        vec![Backend::Poll]
    }
}

/// The reader parks before any data exists. An eager read on the
/// non-blocking socket would fail with `WouldBlock` and abort the run.
#[test]
fn recv_waits_for_readiness() {
    for backend in backends() {
        let mut sched = scheduler(backend);
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let got = Rc::new(RefCell::new(Vec::new()));

        let sink = got.clone();
        sched.new_task(move |cx| async move {
            let data = cx.wait_recv(&a, 64).await?;
            sink.borrow_mut().extend(data);
            Ok::<(), BoxError>(())
        });
        sched.new_task(move |cx| async move {
            cx.sleep(Duration::from_millis(30)).await;
            (&b).write_all(b"ping")?;
            Ok::<(), BoxError>(())
        });

        sched.run().unwrap();
        assert_eq!(*got.borrow(), b"ping", "backend {backend}");
    }
}

#[test]
fn recv_returns_empty_at_end_of_stream() {
    let mut sched = Scheduler::new();
    let (a, b) = UnixStream::pair().unwrap();
    a.set_nonblocking(true).unwrap();
    drop(b);
    let got = Rc::new(RefCell::new(None));

    let sink = got.clone();
    sched.new_task(move |cx| async move {
        let data = cx.wait_recv(&a, 64).await?;
        *sink.borrow_mut() = Some(data);
        Ok::<(), BoxError>(())
    });
    sched.run().unwrap();
    assert_eq!(got.borrow().as_deref(), Some(&[][..]));
}

#[test]
fn send_all_delivers_everything() {
    for backend in backends() {
        let mut sched = scheduler(backend);
        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let payload: Vec<u8> = (0..=255u8).cycle().take(512 * 1024).collect();
        let expected = payload.clone();

        sched.new_task(move |cx| async move {
            cx.wait_send_all(&a, &payload).await?;
            Ok::<(), BoxError>(())
        });

        // Drain from a plain thread so the writer has to wait for space.
        let reader = std::thread::spawn(move || {
            let mut received = Vec::new();
            b.read_to_end(&mut received).unwrap();
            received
        });

        sched.run().unwrap();
        // `a` was dropped with its task, closing the stream.
        assert_eq!(reader.join().unwrap(), expected, "backend {backend}");
    }
}

#[test]
fn accept_then_echo() {
    for backend in backends() {
        let mut sched = scheduler(backend);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        let echoed = Rc::new(RefCell::new(Vec::new()));

        sched.new_task(move |cx| async move {
            let (stream, peer) = cx.wait_accept(&listener).await?;
            assert!(peer.ip().is_loopback());
            let data = cx.wait_recv(&stream, 64).await?;
            cx.wait_send_all(&stream, &data).await?;
            Ok::<(), BoxError>(())
        });

        let sink = echoed.clone();
        sched.new_task(move |cx| async move {
            // Loopback connect completes against the backlog without an accept.
            let client = TcpStream::connect(addr)?;
            client.set_nonblocking(true)?;
            cx.wait_send_all(&client, b"hello").await?;
            let mut got = Vec::new();
            while got.len() < 5 {
                let chunk = cx.wait_recv(&client, 16).await?;
                if chunk.is_empty() {
                    break;
                }
                got.extend(chunk);
            }
            sink.borrow_mut().extend(got);
            Ok::<(), BoxError>(())
        });

        sched.run().unwrap();
        assert_eq!(*echoed.borrow(), b"hello", "backend {backend}");
        let stats = sched.stats();
        assert_eq!(stats.tasks_completed, 2);
        assert!(stats.io_wakeups >= 3);
    }
}

#[test]
fn io_errors_reach_the_waiting_task() {
    let mut sched = Scheduler::new();
    let (a, b) = UnixStream::pair().unwrap();
    a.set_nonblocking(true).unwrap();
    drop(b);
    let outcome = Rc::new(RefCell::new(None));

    let sink = outcome.clone();
    sched.new_task(move |cx| async move {
        // Peer is gone: the socket polls writable (hang-up) and the write fails.
        let result = cx.wait_send(&a, b"lost").await;
        *sink.borrow_mut() = Some(result.map_err(|e| e.kind()));
        Ok::<(), BoxError>(())
    });
    sched.run().unwrap();

    let outcome = outcome.borrow_mut().take().unwrap();
    assert_eq!(outcome, Err(std::io::ErrorKind::BrokenPipe));
}

#[test]
fn zero_length_recv_is_rejected_without_waiting() {
    let mut sched = Scheduler::new();
    let (a, mut b) = UnixStream::pair().unwrap();
    a.set_nonblocking(true).unwrap();
    b.write_all(b"pending").unwrap();
    let outcome = Rc::new(RefCell::new(None));

    let sink = outcome.clone();
    sched.new_task(move |cx| async move {
        let result = cx.wait_recv(&a, 0).await;
        *sink.borrow_mut() = Some(result.map_err(|e| e.kind()));
        // The pending bytes are still there for a real read.
        let data = cx.wait_recv(&a, 64).await?;
        assert_eq!(data, b"pending");
        Ok::<(), BoxError>(())
    });
    sched.run().unwrap();

    assert_eq!(
        outcome.borrow_mut().take(),
        Some(Err(std::io::ErrorKind::InvalidInput))
    );
    assert_eq!(sched.stats().io_wakeups, 1);
}
