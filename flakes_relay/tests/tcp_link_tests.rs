//! Controller link tests over loopback TCP.
//!
//! The test plays the controller: it accepts the relay's connection, checks
//! the handshake, pushes level updates and watches for PING frames.

use flakes_relay::channel::ChannelBank;
use flakes_relay::connection::{ConnectionManager, ConnectionState, TcpConnector};
use flakes_relay::protocol::{Handshake, PING_FRAME};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

const CHANNELS: usize = 17;

fn relay(listener: &TcpListener, heartbeat_ticks: u32) -> ConnectionManager<TcpConnector> {
    let connector = TcpConnector::from_addr(
        listener.local_addr().expect("local addr"),
        Duration::from_secs(1),
    );
    let handshake = Handshake::new("SFR-01").expect("handshake");
    let mut manager = ConnectionManager::new(connector, handshake, CHANNELS, heartbeat_ticks);
    manager.start().expect("start");
    manager
}

/// Run update ticks until `done` holds.
fn tick_until<F>(
    manager: &mut ConnectionManager<TcpConnector>,
    bank: &mut ChannelBank,
    what: &str,
    mut done: F,
) where
    F: FnMut(&ConnectionManager<TcpConnector>, &ChannelBank) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(manager, bank) {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        manager.update_tick(bank);
        thread::sleep(Duration::from_millis(1));
    }
}

fn accept(listener: &TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().expect("accept");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    stream
}

fn read_exact(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).expect("read from relay");
    buf
}

#[test]
fn test_handshake_then_level_updates() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let mut bank = ChannelBank::new(CHANNELS);
    let mut manager = relay(&listener, 1000);

    tick_until(&mut manager, &mut bank, "connect", |m, _| m.is_connected());
    let mut controller = accept(&listener);
    assert_eq!(read_exact(&mut controller, 7), b"SFR-01\0");

    // Second record split across two writes.
    controller.write_all(&[0, 128, 16, 255, 4]).expect("write");
    controller.flush().expect("flush");
    thread::sleep(Duration::from_millis(20));
    controller.write_all(&[42, 99, 1]).expect("write");

    tick_until(&mut manager, &mut bank, "levels", |m, _| {
        m.stats().updates_applied + m.stats().updates_discarded == 4
    });
    assert_eq!(bank.level(0).expect("level"), 128);
    assert_eq!(bank.level(16).expect("level"), 255);
    assert_eq!(bank.level(4).expect("level"), 42);
    assert_eq!(manager.stats().updates_discarded, 1);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[test]
fn test_silent_controller_gets_ping_then_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let mut bank = ChannelBank::new(CHANNELS);
    let mut manager = relay(&listener, 2);

    tick_until(&mut manager, &mut bank, "connect", |m, _| m.is_connected());
    let mut first = accept(&listener);
    assert_eq!(read_exact(&mut first, 7), b"SFR-01\0");

    tick_until(&mut manager, &mut bank, "ping", |m, _| m.stats().pings_sent == 1);
    assert_eq!(read_exact(&mut first, PING_FRAME.len()), PING_FRAME);
    assert!(manager.ping_outstanding());

    tick_until(&mut manager, &mut bank, "reconnect", |m, _| {
        m.stats().reconnects == 1 && m.is_connected()
    });
    let mut second = accept(&listener);
    assert_eq!(read_exact(&mut second, 7), b"SFR-01\0");
    assert_eq!(manager.stats().connects, 2);
}

#[test]
fn test_answered_ping_keeps_link() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let mut bank = ChannelBank::new(CHANNELS);
    let mut manager = relay(&listener, 2);

    tick_until(&mut manager, &mut bank, "connect", |m, _| m.is_connected());
    let mut controller = accept(&listener);
    read_exact(&mut controller, 7);

    for round in 1..=3u64 {
        tick_until(&mut manager, &mut bank, "ping", |m, _| {
            m.stats().pings_sent == round
        });
        assert_eq!(read_exact(&mut controller, PING_FRAME.len()), PING_FRAME);
        controller.write_all(&[3, round as u8]).expect("write");
        tick_until(&mut manager, &mut bank, "reply", |m, _| !m.ping_outstanding());
    }

    assert_eq!(manager.stats().reconnects, 0);
    assert_eq!(bank.level(3).expect("level"), 3);
}

#[test]
fn test_controller_close_drops_to_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let mut bank = ChannelBank::new(CHANNELS);
    let mut manager = relay(&listener, 1000);

    tick_until(&mut manager, &mut bank, "connect", |m, _| m.is_connected());
    let mut controller = accept(&listener);
    read_exact(&mut controller, 7);
    controller.write_all(&[5, 50]).expect("write");
    drop(controller);

    tick_until(&mut manager, &mut bank, "disconnect", |m, _| {
        m.state() == ConnectionState::Disconnected
    });
    // Levels received before the close survive it.
    assert_eq!(bank.level(5).expect("level"), 50);
}
