//! implements the DNS protocol in a transport agnostic fashion

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use derive_more::Display;

use crate::dns::buffer::{BytePacketBuffer, PacketBuffer, VectorPacketBuffer};
use crate::dns::name;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum WireError {
    #[display(fmt = "unexpected end of buffer")]
    EndOfBuffer,
    #[display(fmt = "message shorter than the 12 octet header")]
    TruncatedHeader,
    #[display(fmt = "question section ends before type and class")]
    TruncatedQuestion,
    #[display(fmt = "resource record ends before its data")]
    TruncatedRecord,
    /// Empty label, or the buffer ended before the root label.
    #[display(fmt = "malformed domain name")]
    MalformedName,
    #[display(fmt = "label longer than 63 octets")]
    LabelTooLong,
    #[display(fmt = "domain name longer than 255 octets")]
    NameTooLong,
    #[display(fmt = "compressed domain names are not supported")]
    CompressionUnsupported,
    #[display(fmt = "record data longer than 65535 octets")]
    RecordTooLong,
}

impl std::error::Error for WireError {}

pub type Result<T> = std::result::Result<T, WireError>;

pub const HEADER_LEN: usize = 12;

pub const OPCODE_QUERY: u8 = 0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueryType {
    UNKNOWN(u16),
    A,    // 1
    MX,   // 15
    TXT,  // 16
    AAAA, // 28
}

impl QueryType {
    pub fn to_num(&self) -> u16 {
        match *self {
            QueryType::UNKNOWN(x) => x,
            QueryType::A => 1,
            QueryType::MX => 15,
            QueryType::TXT => 16,
            QueryType::AAAA => 28,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            15 => QueryType::MX,
            16 => QueryType::TXT,
            28 => QueryType::AAAA,
            _ => QueryType::UNKNOWN(num),
        }
    }

    pub fn from_name(name: &str) -> Option<QueryType> {
        match name.to_ascii_uppercase().as_str() {
            "A" => Some(QueryType::A),
            "MX" => Some(QueryType::MX),
            "TXT" => Some(QueryType::TXT),
            "AAAA" => Some(QueryType::AAAA),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueryClass {
    UNKNOWN(u16),
    IN, // 1
}

impl QueryClass {
    pub fn to_num(&self) -> u16 {
        match *self {
            QueryClass::UNKNOWN(x) => x,
            QueryClass::IN => 1,
        }
    }

    pub fn from_num(num: u16) -> QueryClass {
        match num {
            1 => QueryClass::IN,
            _ => QueryClass::UNKNOWN(num),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResultCode {
    NOERROR,
    FORMERR,
    SERVFAIL,
    NXDOMAIN,
    NOTIMP,
    REFUSED,
    UNKNOWN(u8),
}

impl ResultCode {
    pub fn to_num(&self) -> u8 {
        match *self {
            ResultCode::NOERROR => 0,
            ResultCode::FORMERR => 1,
            ResultCode::SERVFAIL => 2,
            ResultCode::NXDOMAIN => 3,
            ResultCode::NOTIMP => 4,
            ResultCode::REFUSED => 5,
            ResultCode::UNKNOWN(x) => x & 0x0F,
        }
    }

    pub fn from_num(num: u8) -> ResultCode {
        match num {
            0 => ResultCode::NOERROR,
            1 => ResultCode::FORMERR,
            2 => ResultCode::SERVFAIL,
            3 => ResultCode::NXDOMAIN,
            4 => ResultCode::NOTIMP,
            5 => ResultCode::REFUSED,
            x => ResultCode::UNKNOWN(x),
        }
    }
}

impl Default for ResultCode {
    fn default() -> Self {
        ResultCode::NOERROR
    }
}

/// The second 16 bit word of the header.
///
/// Laid out most significant bit first as
/// `QR | OPCODE(4) | AA | TC | RD | RA | Z(3) | RCODE(4)`. Fields are
/// extracted by shift and mask, never through struct layout.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderFlags(pub u16);

impl HeaderFlags {
    const QR: u16 = 1 << 15;
    const OPCODE_SHIFT: u16 = 11;
    const OPCODE_MASK: u16 = 0x0F << HeaderFlags::OPCODE_SHIFT;
    const AA: u16 = 1 << 10;
    const TC: u16 = 1 << 9;
    const RD: u16 = 1 << 8;
    const RA: u16 = 1 << 7;
    const Z_SHIFT: u16 = 4;
    const Z_MASK: u16 = 0x07 << HeaderFlags::Z_SHIFT;
    const RCODE_MASK: u16 = 0x0F;

    fn flag(&self, mask: u16) -> bool {
        self.0 & mask != 0
    }

    fn set_flag(&mut self, mask: u16, on: bool) {
        if on {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    pub fn response(&self) -> bool {
        self.flag(HeaderFlags::QR)
    }

    pub fn set_response(&mut self, on: bool) {
        self.set_flag(HeaderFlags::QR, on);
    }

    pub fn opcode(&self) -> u8 {
        ((self.0 & HeaderFlags::OPCODE_MASK) >> HeaderFlags::OPCODE_SHIFT) as u8
    }

    pub fn set_opcode(&mut self, opcode: u8) {
        self.0 = (self.0 & !HeaderFlags::OPCODE_MASK)
            | (((opcode as u16) << HeaderFlags::OPCODE_SHIFT) & HeaderFlags::OPCODE_MASK);
    }

    pub fn authoritative_answer(&self) -> bool {
        self.flag(HeaderFlags::AA)
    }

    pub fn set_authoritative_answer(&mut self, on: bool) {
        self.set_flag(HeaderFlags::AA, on);
    }

    pub fn truncated_message(&self) -> bool {
        self.flag(HeaderFlags::TC)
    }

    pub fn set_truncated_message(&mut self, on: bool) {
        self.set_flag(HeaderFlags::TC, on);
    }

    pub fn recursion_desired(&self) -> bool {
        self.flag(HeaderFlags::RD)
    }

    pub fn set_recursion_desired(&mut self, on: bool) {
        self.set_flag(HeaderFlags::RD, on);
    }

    pub fn recursion_available(&self) -> bool {
        self.flag(HeaderFlags::RA)
    }

    pub fn set_recursion_available(&mut self, on: bool) {
        self.set_flag(HeaderFlags::RA, on);
    }

    /// Reserved bits. Always zero in messages we produce.
    pub fn z(&self) -> u8 {
        ((self.0 & HeaderFlags::Z_MASK) >> HeaderFlags::Z_SHIFT) as u8
    }

    pub fn rescode(&self) -> ResultCode {
        ResultCode::from_num((self.0 & HeaderFlags::RCODE_MASK) as u8)
    }

    pub fn set_rescode(&mut self, rescode: ResultCode) {
        self.0 = (self.0 & !HeaderFlags::RCODE_MASK) | rescode.to_num() as u16;
    }

    fn to_wire(&self) -> u16 {
        self.0 & !HeaderFlags::Z_MASK
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: HeaderFlags,

    pub questions: u16,
    pub answers: u16,
    pub authoritative_entries: u16,
    pub resource_entries: u16,
}

impl DnsHeader {
    pub fn new() -> DnsHeader {
        DnsHeader::default()
    }

    pub fn read<T: PacketBuffer>(buffer: &mut T) -> Result<DnsHeader> {
        if buffer.remaining() < HEADER_LEN {
            return Err(WireError::TruncatedHeader);
        }

        Ok(DnsHeader {
            id: buffer.read_u16()?,
            flags: HeaderFlags(buffer.read_u16()?),
            questions: buffer.read_u16()?,
            answers: buffer.read_u16()?,
            authoritative_entries: buffer.read_u16()?,
            resource_entries: buffer.read_u16()?,
        })
    }

    pub fn write<T: PacketBuffer>(&self, buffer: &mut T) -> Result<()> {
        buffer.write_u16(self.id)?;
        buffer.write_u16(self.flags.to_wire())?;
        buffer.write_u16(self.questions)?;
        buffer.write_u16(self.answers)?;
        buffer.write_u16(self.authoritative_entries)?;
        buffer.write_u16(self.resource_entries)?;

        Ok(())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<DnsHeader> {
        DnsHeader::read(&mut BytePacketBuffer::new(bytes))
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let f = self.flags.to_wire();
        let words = [
            self.id,
            f,
            self.questions,
            self.answers,
            self.authoritative_entries,
            self.resource_entries,
        ];

        let mut out = [0u8; HEADER_LEN];
        for (i, word) in words.iter().enumerate() {
            out[i * 2] = (word >> 8) as u8;
            out[i * 2 + 1] = (word & 0xFF) as u8;
        }

        out
    }
}

impl fmt::Display for DnsHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id {} qr {} opcode {} aa {} tc {} rd {} ra {} rcode {:?} qd {} an {} ns {} ar {}",
            self.id,
            self.flags.response(),
            self.flags.opcode(),
            self.flags.authoritative_answer(),
            self.flags.truncated_message(),
            self.flags.recursion_desired(),
            self.flags.recursion_available(),
            self.flags.rescode(),
            self.questions,
            self.answers,
            self.authoritative_entries,
            self.resource_entries
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: QueryType,
    pub qclass: QueryClass,
}

impl DnsQuestion {
    pub fn new(name: &str, qtype: QueryType) -> DnsQuestion {
        DnsQuestion {
            name: name.to_string(),
            qtype,
            qclass: QueryClass::IN,
        }
    }

    pub fn binary_len(&self) -> usize {
        name::name_len(&self.name) + 4
    }

    pub fn read<T: PacketBuffer>(buffer: &mut T) -> Result<DnsQuestion> {
        let name = buffer.read_qname()?;
        if buffer.remaining() < 4 {
            return Err(WireError::TruncatedQuestion);
        }

        let qtype = QueryType::from_num(buffer.read_u16()?);
        let qclass = QueryClass::from_num(buffer.read_u16()?);

        Ok(DnsQuestion {
            name,
            qtype,
            qclass,
        })
    }

    pub fn write<T: PacketBuffer>(&self, buffer: &mut T) -> Result<()> {
        buffer.write_qname(&self.name)?;
        buffer.write_u16(self.qtype.to_num())?;
        buffer.write_u16(self.qclass.to_num())?;

        Ok(())
    }

    /// Decodes the question at `offset`, returning it with the number of
    /// octets it occupied.
    pub fn from_bytes(bytes: &[u8], offset: usize) -> Result<(DnsQuestion, usize)> {
        let mut buffer = BytePacketBuffer::new(bytes);
        buffer.seek(offset).map_err(|_| WireError::MalformedName)?;

        let question = DnsQuestion::read(&mut buffer)?;

        Ok((question, buffer.pos() - offset))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = VectorPacketBuffer::new();
        self.write(&mut buffer)?;

        Ok(buffer.into_inner())
    }
}

impl fmt::Display for DnsQuestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} {:?}", self.name, self.qclass, self.qtype)
    }
}

/// A resource record with opaque record data.
///
/// RDLENGTH is not stored: it is always the length of `data`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    pub domain: String,
    pub rtype: QueryType,
    pub class: QueryClass,
    pub ttl: u32,
    pub data: Vec<u8>,
}

impl ResourceRecord {
    pub fn rdlength(&self) -> Result<u16> {
        if self.data.len() > u16::MAX as usize {
            return Err(WireError::RecordTooLong);
        }

        Ok(self.data.len() as u16)
    }

    pub fn binary_len(&self) -> usize {
        name::name_len(&self.domain) + 2 + 2 + 4 + 2 + self.data.len()
    }

    pub fn read<T: PacketBuffer>(buffer: &mut T) -> Result<ResourceRecord> {
        let domain = buffer.read_qname()?;
        if buffer.remaining() < 10 {
            return Err(WireError::TruncatedRecord);
        }

        let rtype = QueryType::from_num(buffer.read_u16()?);
        let class = QueryClass::from_num(buffer.read_u16()?);
        let ttl = buffer.read_u32()?;
        let data_len = buffer.read_u16()? as usize;

        let data = buffer
            .get_range(buffer.pos(), data_len)
            .map_err(|_| WireError::TruncatedRecord)?
            .to_vec();
        buffer.step(data_len)?;

        Ok(ResourceRecord {
            domain,
            rtype,
            class,
            ttl,
            data,
        })
    }

    pub fn write<T: PacketBuffer>(&self, buffer: &mut T) -> Result<()> {
        let rdlength = self.rdlength()?;

        buffer.write_qname(&self.domain)?;
        buffer.write_u16(self.rtype.to_num())?;
        buffer.write_u16(self.class.to_num())?;
        buffer.write_u32(self.ttl)?;
        buffer.write_u16(rdlength)?;
        buffer.write_bytes(&self.data)?;

        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = VectorPacketBuffer::new();
        self.write(&mut buffer)?;

        Ok(buffer.into_inner())
    }

    /// Human readable record data for the types we know how to decode.
    pub fn rdata_text(&self) -> String {
        let data = &self.data;
        match self.rtype {
            QueryType::A if data.len() == 4 => {
                Ipv4Addr::new(data[0], data[1], data[2], data[3]).to_string()
            }
            QueryType::AAAA if data.len() == 16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(data);
                Ipv6Addr::from(octets).to_string()
            }
            QueryType::MX if data.len() >= 3 => {
                let preference = ((data[0] as u16) << 8) | data[1] as u16;
                match name::decode_name(data, 2) {
                    Ok((exchange, _)) => format!("{} {}", preference, exchange),
                    Err(_) => hex(data),
                }
            }
            _ => hex(data),
        }
    }
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:?} {:?} {}",
            self.domain,
            self.ttl,
            self.class,
            self.rtype,
            self.rdata_text()
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DnsPacket {
    pub header: DnsHeader,
    pub questions: Vec<DnsQuestion>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub resources: Vec<ResourceRecord>,
}

impl DnsPacket {
    pub fn new() -> DnsPacket {
        DnsPacket::default()
    }

    pub fn from_buffer<T: PacketBuffer>(buffer: &mut T) -> Result<DnsPacket> {
        let mut result = DnsPacket::new();
        result.header = DnsHeader::read(buffer)?;

        for _ in 0..result.header.questions {
            result.questions.push(DnsQuestion::read(buffer)?);
        }

        for _ in 0..result.header.answers {
            result.answers.push(ResourceRecord::read(buffer)?);
        }
        for _ in 0..result.header.authoritative_entries {
            result.authorities.push(ResourceRecord::read(buffer)?);
        }
        for _ in 0..result.header.resource_entries {
            result.resources.push(ResourceRecord::read(buffer)?);
        }

        Ok(result)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<DnsPacket> {
        DnsPacket::from_buffer(&mut BytePacketBuffer::new(bytes))
    }

    /// Writes the packet, setting the section counts from the sections
    /// themselves. Records that would push the message past `max_size`
    /// are left out and the TC flag is raised.
    pub fn write<T: PacketBuffer>(&self, buffer: &mut T, max_size: usize) -> Result<()> {
        let mut size = HEADER_LEN;
        for question in &self.questions {
            size += question.binary_len();
        }

        let mut truncated = false;
        let mut counts = [0usize; 3];
        let sections = [&self.answers, &self.authorities, &self.resources];
        for (count, section) in counts.iter_mut().zip(sections.iter()) {
            for rec in section.iter() {
                size += rec.binary_len();
                if truncated || size > max_size {
                    truncated = true;
                    break;
                }
                *count += 1;
            }
        }

        let mut header = self.header;
        header.questions = self.questions.len() as u16;
        header.answers = counts[0] as u16;
        header.authoritative_entries = counts[1] as u16;
        header.resource_entries = counts[2] as u16;
        header
            .flags
            .set_truncated_message(truncated || self.header.flags.truncated_message());

        header.write(buffer)?;

        for question in &self.questions {
            question.write(buffer)?;
        }

        for (count, section) in counts.iter().zip(sections.iter()) {
            for rec in section.iter().take(*count) {
                rec.write(buffer)?;
            }
        }

        Ok(())
    }

    pub fn to_bytes(&self, max_size: usize) -> Result<Vec<u8>> {
        let mut buffer = VectorPacketBuffer::new();
        self.write(&mut buffer, max_size)?;

        Ok(buffer.into_inner())
    }
}
