// Copyright 2023 Bitwise IO, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Line-oriented TCP services shared by the liveness and worker listeners.

use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::RecoveryError;

const ACCEPT_POLL: Duration = Duration::from_millis(25);
const READ_POLL: Duration = Duration::from_millis(200);

/// What a handler sends back for one request line.
pub(crate) enum LineReply {
    Reply(String),
    /// Sends the reply and closes the connection.
    Close(String),
}

/// Answers request lines on one listener.
pub(crate) trait LineHandler: Send + Sync + 'static {
    /// Per-connection state, created when a connection is accepted.
    type Session: Default;

    fn handle(&self, session: &mut Self::Session, line: &str) -> LineReply;
}

/// A running listener. Dropping the handle stops it.
pub struct ServiceHandle {
    name: &'static str,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl ServiceHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("{} listener thread panicked", self.name);
            }
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Binds `address` and answers each connection on its own thread.
pub(crate) fn spawn_service<H: LineHandler>(
    name: &'static str,
    address: &str,
    handler: Arc<H>,
) -> Result<ServiceHandle, RecoveryError> {
    let listener = TcpListener::bind(address)?;
    let local_addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let join = thread::Builder::new()
        .name(format!("tandem-{}", name))
        .spawn(move || run_accept_loop(name, listener, handler, flag))?;

    debug!("{} listening on {}", name, local_addr);
    Ok(ServiceHandle {
        name,
        shutdown,
        join: Some(join),
        local_addr,
    })
}

fn run_accept_loop<H: LineHandler>(
    name: &'static str,
    listener: TcpListener,
    handler: Arc<H>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("{} accepted connection from {}", name, peer);
                let handler = Arc::clone(&handler);
                let shutdown = Arc::clone(&shutdown);
                thread::spawn(move || {
                    if let Err(err) = serve_connection(stream, handler.as_ref(), &shutdown) {
                        debug!("{} connection from {} ended: {}", name, peer, err);
                    }
                });
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                warn!("{} accept failed: {}", name, err);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn serve_connection<H: LineHandler>(
    stream: TcpStream,
    handler: &H,
    shutdown: &AtomicBool,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_POLL))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut session = H::Session::default();
    let mut line = String::new();

    loop {
        match reader.read_line(&mut line) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                let reply = handler.handle(&mut session, line.trim_end());
                line.clear();
                match reply {
                    LineReply::Reply(reply) => write_line(&mut writer, &reply)?,
                    LineReply::Close(reply) => return write_line(&mut writer, &reply),
                }
            }
            // a partial line stays in `line` until the rest arrives
            Err(err) if is_timeout(&err) => {
                if shutdown.load(Ordering::Relaxed) {
                    return Ok(());
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn write_line(writer: &mut TcpStream, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// One client connection speaking a request/reply line protocol.
pub(crate) struct LineClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl LineClient {
    /// Connects to the first address `address` resolves to, bounding every step by `timeout`.
    pub fn connect(address: &str, timeout: Duration) -> io::Result<Self> {
        let target = address.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} did not resolve to an address", address),
            )
        })?;
        let stream = TcpStream::connect_timeout(&target, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let writer = stream.try_clone()?;

        Ok(LineClient {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Sends one line and returns the reply line without its terminator.
    pub fn request(&mut self, line: &str) -> io::Result<String> {
        write_line(&mut self.writer, line)?;
        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "connection closed before a reply",
            ));
        }
        Ok(reply.trim_end().to_string())
    }

    /// Replaces the read timeout, `None` waiting as long as it takes.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    #[derive(Default)]
    struct Echo {
        seen: Mutex<Vec<String>>,
    }

    impl LineHandler for Echo {
        type Session = usize;

        fn handle(&self, count: &mut usize, line: &str) -> LineReply {
            *count += 1;
            self.seen.lock().push(line.to_string());
            if line == "bye" {
                LineReply::Close(format!("closing after {}", count))
            } else {
                LineReply::Reply(line.to_uppercase())
            }
        }
    }

    #[test]
    fn replies_per_line_and_closes_on_request() -> Result<(), Box<dyn std::error::Error>> {
        let handler = Arc::new(Echo::default());
        let mut service = spawn_service("echo", "127.0.0.1:0", handler.clone())?;
        let address = service.local_addr().to_string();

        let mut client = LineClient::connect(&address, Duration::from_secs(5))?;
        assert_eq!(client.request("hello")?, "HELLO");
        assert_eq!(client.request("again")?, "AGAIN");
        assert_eq!(client.request("bye")?, "closing after 3");
        assert!(client.request("late").is_err());

        // sessions are per connection
        let mut second = LineClient::connect(&address, Duration::from_secs(5))?;
        assert_eq!(second.request("bye")?, "closing after 1");

        service.shutdown();
        assert_eq!(handler.seen.lock().len(), 4);
        Ok(())
    }

    #[test]
    fn stopped_service_refuses_connections() -> Result<(), Box<dyn std::error::Error>> {
        let mut service = spawn_service("echo", "127.0.0.1:0", Arc::new(Echo::default()))?;
        let address = service.local_addr().to_string();
        service.shutdown();

        assert!(LineClient::connect(&address, Duration::from_millis(500)).is_err());
        Ok(())
    }
}
