//! Scripted serial link shared by the integration tests

#![allow(dead_code)]

use accprobe_core::config::{LinkConfig, SessionConfig};
use accprobe_core::protocol::{
    Clock, DeviceSession, LinkOpener, ManualClock, ProtocolError, SerialLink, SessionContext,
    Transport,
};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

/// Response to one written command line
#[derive(Debug, Clone)]
pub struct Scripted {
    /// Empty reads/polls before the bytes show up
    pub delay: u32,
    pub bytes: Vec<u8>,
}

impl Scripted {
    pub fn now(bytes: &[u8]) -> Self {
        Self::after(0, bytes)
    }

    pub fn after(delay: u32, bytes: &[u8]) -> Self {
        Self {
            delay,
            bytes: bytes.to_vec(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Script {
    /// Responses consumed in order, one per written line; `None` = silence
    pub responses: VecDeque<Option<Scripted>>,
    /// Lines written by the host
    pub written: Vec<String>,
    /// Calls to `read`
    pub reads: usize,
    /// Calls to `bytes_to_read`
    pub polls: usize,
    inbox: Vec<u8>,
    rx: Vec<u8>,
    in_flight: Option<Scripted>,
}

impl Script {
    /// Count one read or poll; release the in-flight reply when its delay is up
    fn tick(&mut self) {
        if let Some(reply) = self.in_flight.as_mut() {
            if reply.delay > 0 {
                reply.delay -= 1;
                return;
            }
        }
        if let Some(reply) = self.in_flight.take() {
            self.rx.extend_from_slice(&reply.bytes);
        }
    }
}

/// Link whose replies come from a [`Script`]
pub struct ScriptedLink {
    script: Arc<Mutex<Script>>,
}

impl Read for ScriptedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut s = self.script.lock().unwrap();
        s.reads += 1;
        s.tick();
        let n = buf.len().min(s.rx.len());
        buf[..n].copy_from_slice(&s.rx[..n]);
        s.rx.drain(..n);
        Ok(n)
    }
}

impl Write for ScriptedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut s = self.script.lock().unwrap();
        s.inbox.extend_from_slice(buf);
        while let Some(pos) = s.inbox.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = s.inbox.drain(..=pos).collect();
            s.written.push(String::from_utf8_lossy(&raw).trim().to_string());
            let next = s.responses.pop_front().flatten();
            s.in_flight = next;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for ScriptedLink {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let mut s = self.script.lock().unwrap();
        s.polls += 1;
        s.tick();
        Ok(s.rx.len() as u32)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.script.lock().unwrap().rx.clear();
        Ok(())
    }
}

/// Hands out links sharing one script
#[derive(Clone, Default)]
pub struct ScriptedOpener {
    pub script: Arc<Mutex<Script>>,
}

impl ScriptedOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the response to the next written line
    pub fn respond(&self, reply: Scripted) -> &Self {
        self.script.lock().unwrap().responses.push_back(Some(reply));
        self
    }

    /// Queue `:ok` for the next `n` written lines
    pub fn ack(&self, n: usize) -> &Self {
        for _ in 0..n {
            self.respond(Scripted::now(b":ok\n"));
        }
        self
    }

    /// Queue silence for the next written line
    pub fn silence(&self) -> &Self {
        self.script.lock().unwrap().responses.push_back(None);
        self
    }

    pub fn written(&self) -> Vec<String> {
        self.script.lock().unwrap().written.clone()
    }

    pub fn reads(&self) -> usize {
        self.script.lock().unwrap().reads
    }

    pub fn reset_counts(&self) {
        let mut s = self.script.lock().unwrap();
        s.reads = 0;
        s.polls = 0;
        s.written.clear();
    }
}

impl LinkOpener for ScriptedOpener {
    fn open(&self, _config: &LinkConfig) -> Result<Box<dyn SerialLink>, ProtocolError> {
        Ok(Box::new(ScriptedLink {
            script: self.script.clone(),
        }))
    }
}

/// Opener that always fails
pub struct FailingOpener;

impl LinkOpener for FailingOpener {
    fn open(&self, config: &LinkConfig) -> Result<Box<dyn SerialLink>, ProtocolError> {
        Err(ProtocolError::ConnectionFailed {
            port: config.port_name.clone(),
            reason: "no such device".to_string(),
        })
    }
}

/// Connected transport on a scripted link with a manual clock
pub fn transport(opener: &ScriptedOpener) -> (Transport, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let ctx = SessionContext::with_clock("scripted", clock.clone() as Arc<dyn Clock>);
    let mut transport = Transport::with_opener(LinkConfig::new("scripted"), Box::new(opener.clone()), ctx);
    transport.connect().unwrap();
    (transport, clock)
}

/// Connected session on a scripted link with a manual clock
pub fn session(opener: &ScriptedOpener) -> (DeviceSession, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let session = DeviceSession::with_opener(
        SessionConfig::for_port("scripted"),
        Box::new(opener.clone()),
        clock.clone(),
    );
    (session, clock)
}

/// Little-endian batch frame: `count` samples with x = base + i, y = -x, z = 1000,
/// zero-padded to 192 bytes, followed by the `:ok\n` trailer
pub fn batch_frame(base: i16, count: usize) -> Vec<u8> {
    let mut frame = vec![0u8; 192];
    for i in 0..count {
        let x = base + i as i16;
        let off = i * 6;
        frame[off..off + 2].copy_from_slice(&x.to_le_bytes());
        frame[off + 2..off + 4].copy_from_slice(&(-x).to_le_bytes());
        frame[off + 4..off + 6].copy_from_slice(&1000i16.to_le_bytes());
    }
    frame.extend_from_slice(b":ok\n");
    frame
}
