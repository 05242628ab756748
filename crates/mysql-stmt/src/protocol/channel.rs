//! Framed packet transport.
//!
//! Wraps the authenticated byte stream the connection layer hands over
//! and speaks whole packets: 4-byte headers, per-command sequence-id
//! tracking, reassembly of continuation packets, splitting of oversized
//! payloads. Transport failures surface as `std::io::Error`; the
//! statement layer translates them into its recorded-error convention.

use std::io::{Read, Write};

use crate::protocol::{MAX_PACKET_SIZE, PacketHeader, capabilities};

/// A framed packet channel over an authenticated stream.
#[derive(Debug)]
pub struct Channel<S> {
    stream: S,
    sequence_id: u8,
    capabilities: u32,
}

impl<S> Channel<S> {
    /// Wrap a stream, recording the capability flags the connection
    /// layer negotiated.
    pub fn new(stream: S, capabilities: u32) -> Self {
        Self {
            stream,
            sequence_id: 0,
            capabilities,
        }
    }

    /// Negotiated capability flags.
    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }

    /// True when EOF packets are replaced by 0xFE-headed OK packets.
    pub fn deprecate_eof(&self) -> bool {
        self.capabilities & capabilities::CLIENT_DEPRECATE_EOF != 0
    }

    /// Hand the underlying stream back.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Channel<S> {
    /// Send a command payload. Every command starts a fresh packet
    /// sequence.
    pub fn send_command(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.sequence_id = 0;
        tracing::trace!(len = payload.len(), first = payload.first(), "send command");
        self.write_packet(payload)
    }

    /// Write one logical payload, splitting it when it exceeds the
    /// 16MB - 1 packet limit.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_packet(&mut self, payload: &[u8]) -> std::io::Result<()> {
        if payload.len() < MAX_PACKET_SIZE {
            let header = PacketHeader {
                payload_length: payload.len() as u32,
                sequence_id: self.sequence_id,
            };
            self.sequence_id = self.sequence_id.wrapping_add(1);
            self.stream.write_all(&header.to_bytes())?;
            self.stream.write_all(payload)?;
        } else {
            // Chunk at the maximum size; a final chunk of exactly the
            // maximum is followed by an empty packet so the receiver
            // knows the payload ended.
            let mut offset = 0;
            loop {
                let chunk_len = (payload.len() - offset).min(MAX_PACKET_SIZE);
                let header = PacketHeader {
                    payload_length: chunk_len as u32,
                    sequence_id: self.sequence_id,
                };
                self.sequence_id = self.sequence_id.wrapping_add(1);
                self.stream.write_all(&header.to_bytes())?;
                self.stream.write_all(&payload[offset..offset + chunk_len])?;
                offset += chunk_len;
                if chunk_len < MAX_PACKET_SIZE {
                    break;
                }
            }
        }
        self.stream.flush()
    }

    /// Read one logical payload, reassembling continuation packets.
    pub fn read_packet(&mut self) -> std::io::Result<Vec<u8>> {
        let mut header_buf = [0u8; 4];
        self.stream.read_exact(&mut header_buf)?;
        let header = PacketHeader::from_bytes(&header_buf);
        self.sequence_id = header.sequence_id.wrapping_add(1);

        let mut payload = vec![0u8; header.payload_length as usize];
        if !payload.is_empty() {
            self.stream.read_exact(&mut payload)?;
        }

        // A payload of exactly the maximum size continues in the next
        // packet, terminated by one shorter than the maximum.
        if payload.len() == MAX_PACKET_SIZE {
            loop {
                self.stream.read_exact(&mut header_buf)?;
                let cont = PacketHeader::from_bytes(&header_buf);
                self.sequence_id = cont.sequence_id.wrapping_add(1);

                let cont_len = cont.payload_length as usize;
                if cont_len > 0 {
                    let start = payload.len();
                    payload.resize(start + cont_len, 0);
                    self.stream.read_exact(&mut payload[start..])?;
                }
                if cont_len < MAX_PACKET_SIZE {
                    break;
                }
            }
        }

        Ok(payload)
    }
}
