//! byte cursors used by the wire codec
//!
//! Every multi-octet integer is read and written in network byte order by
//! explicit shifting, so nothing here depends on the host's endianness.

use crate::dns::name;
use crate::dns::protocol::{Result, WireError};

pub trait PacketBuffer {
    fn read(&mut self) -> Result<u8>;
    fn get_range(&self, start: usize, len: usize) -> Result<&[u8]>;
    fn write(&mut self, val: u8) -> Result<()>;
    fn as_slice(&self) -> &[u8];
    fn pos(&self) -> usize;
    fn seek(&mut self, pos: usize) -> Result<()>;

    fn step(&mut self, steps: usize) -> Result<()> {
        let pos = self.pos() + steps;
        self.seek(pos)
    }

    fn remaining(&self) -> usize {
        self.as_slice().len().saturating_sub(self.pos())
    }

    fn write_u8(&mut self, val: u8) -> Result<()> {
        self.write(val)
    }

    fn write_u16(&mut self, val: u16) -> Result<()> {
        self.write((val >> 8) as u8)?;
        self.write((val & 0xFF) as u8)?;

        Ok(())
    }

    fn write_u32(&mut self, val: u32) -> Result<()> {
        self.write(((val >> 24) & 0xFF) as u8)?;
        self.write(((val >> 16) & 0xFF) as u8)?;
        self.write(((val >> 8) & 0xFF) as u8)?;
        self.write((val & 0xFF) as u8)?;

        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        for b in data {
            self.write(*b)?;
        }

        Ok(())
    }

    fn write_qname(&mut self, qname: &str) -> Result<()> {
        let encoded = name::encode_name(qname)?;
        self.write_bytes(&encoded)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let res = ((self.read()? as u16) << 8) | (self.read()? as u16);

        Ok(res)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let res = ((self.read()? as u32) << 24)
            | ((self.read()? as u32) << 16)
            | ((self.read()? as u32) << 8)
            | (self.read()? as u32);

        Ok(res)
    }

    fn read_qname(&mut self) -> Result<String> {
        let (qname, consumed) = name::decode_name(self.as_slice(), self.pos())?;
        self.step(consumed)?;

        Ok(qname)
    }
}

/// Read-only cursor over a received datagram.
pub struct BytePacketBuffer<'a> {
    pub buf: &'a [u8],
    pub pos: usize,
}

impl<'a> BytePacketBuffer<'a> {
    pub fn new(buf: &'a [u8]) -> BytePacketBuffer<'a> {
        BytePacketBuffer { buf, pos: 0 }
    }
}

impl<'a> PacketBuffer for BytePacketBuffer<'a> {
    fn read(&mut self) -> Result<u8> {
        let res = *self.buf.get(self.pos).ok_or(WireError::EndOfBuffer)?;
        self.pos += 1;

        Ok(res)
    }

    fn get_range(&self, start: usize, len: usize) -> Result<&[u8]> {
        let end = start.checked_add(len).ok_or(WireError::EndOfBuffer)?;
        self.buf.get(start..end).ok_or(WireError::EndOfBuffer)
    }

    fn write(&mut self, _: u8) -> Result<()> {
        Err(WireError::EndOfBuffer)
    }

    fn as_slice(&self) -> &[u8] {
        self.buf
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(WireError::EndOfBuffer);
        }
        self.pos = pos;

        Ok(())
    }
}

/// Growable buffer used to assemble outgoing messages.
#[derive(Default)]
pub struct VectorPacketBuffer {
    pub buffer: Vec<u8>,
    pub pos: usize,
}

impl VectorPacketBuffer {
    pub fn new() -> VectorPacketBuffer {
        VectorPacketBuffer {
            buffer: Vec::new(),
            pos: 0,
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

impl PacketBuffer for VectorPacketBuffer {
    fn read(&mut self) -> Result<u8> {
        let res = *self.buffer.get(self.pos).ok_or(WireError::EndOfBuffer)?;
        self.pos += 1;

        Ok(res)
    }

    fn get_range(&self, start: usize, len: usize) -> Result<&[u8]> {
        let end = start.checked_add(len).ok_or(WireError::EndOfBuffer)?;
        self.buffer.get(start..end).ok_or(WireError::EndOfBuffer)
    }

    fn write(&mut self, val: u8) -> Result<()> {
        if self.pos < self.buffer.len() {
            self.buffer[self.pos] = val;
        } else {
            self.buffer.push(val);
        }
        self.pos += 1;

        Ok(())
    }

    fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.buffer.len() {
            return Err(WireError::EndOfBuffer);
        }
        self.pos = pos;

        Ok(())
    }
}
