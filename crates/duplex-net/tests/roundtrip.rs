use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use duplex_net::{DataChannel, DataReadOutcome, Listener, MsgChannel, MsgReadOutcome};
use mio::{Events, Interest, Poll, Token};

const LISTENER: Token = Token(0);
const STREAM: Token = Token(1);

#[test]
fn msg_channel_delivers_a_stripped_line() {
    let addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 25711));

    let server = thread::spawn(move || {
        let mut poll = Poll::new().unwrap();
        let listener = Listener::bind(poll.registry(), LISTENER, addr).unwrap();
        let mut events = Events::with_capacity(16);
        let mut channel: Option<MsgChannel> = None;

        loop {
            poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
            for event in events.iter() {
                if event.token() == LISTENER {
                    for (mut stream, _peer) in listener.accept_all() {
                        poll.registry().register(&mut stream, STREAM, Interest::READABLE).unwrap();
                        channel = Some(MsgChannel::new(stream).unwrap());
                    }
                } else if event.token() == STREAM {
                    if let Some(chan) = channel.as_mut() {
                        match chan.read_line_nonblocking() {
                            MsgReadOutcome::Line(line) => return line,
                            MsgReadOutcome::WouldBlock => {}
                            MsgReadOutcome::Disconnected => panic!("unexpected disconnect"),
                        }
                    }
                }
            }
        }
    });

    thread::sleep(Duration::from_millis(20));
    let mut client = std::net::TcpStream::connect(addr).unwrap();
    client.write_all(b"pause  \n").unwrap();

    assert_eq!(server.join().unwrap(), "pause");
}

#[test]
fn data_channel_recv_exact_collects_exactly_n_bytes() {
    let addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 25712));

    let server = thread::spawn(move || {
        let mut poll = Poll::new().unwrap();
        let listener = Listener::bind(poll.registry(), LISTENER, addr).unwrap();
        let mut events = Events::with_capacity(16);
        let mut channel: Option<DataChannel> = None;

        loop {
            poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
            for event in events.iter() {
                if event.token() == LISTENER {
                    for (mut stream, _peer) in listener.accept_all() {
                        poll.registry().register(&mut stream, STREAM, Interest::READABLE).unwrap();
                        let mut chan = DataChannel::new(stream).unwrap();
                        chan.request_exact(4);
                        channel = Some(chan);
                    }
                } else if event.token() == STREAM {
                    if let Some(chan) = channel.as_mut() {
                        match chan.poll_read() {
                            DataReadOutcome::Ready(buf) => return buf,
                            DataReadOutcome::WouldBlock => {}
                            DataReadOutcome::Disconnected => panic!("unexpected disconnect"),
                        }
                    }
                }
            }
        }
    });

    thread::sleep(Duration::from_millis(20));
    let mut client = std::net::TcpStream::connect(addr).unwrap();
    // Two separate writes: recv_exact must accumulate across both.
    client.write_all(&[1, 2]).unwrap();
    thread::sleep(Duration::from_millis(20));
    client.write_all(&[3, 4]).unwrap();

    assert_eq!(server.join().unwrap(), vec![1, 2, 3, 4]);
}
