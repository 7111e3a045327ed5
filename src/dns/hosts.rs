//! the static host table this server is authoritative for
//!
//! The table is read once at startup from a plain text file:
//!
//! ```text
//! # comments run from '#' to the end of the line
//! example.com          93.184.216.34
//! ipv6.example.com     2001:db8::1        600
//! example.com          MX 10 mail.example.com
//! ```
//!
//! Each line is `<hostname> <value> [ttl]`, fields separated by whitespace.
//! A value is an IPv4 address, an IPv6 address, or `MX <preference>
//! <exchange>`. Lines without a ttl get the configured default. Hostnames
//! are matched case insensitively and a later line for the same hostname
//! replaces an earlier one.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use derive_more::{Display, From};
use regex::Regex;

use crate::dns::name;
use crate::dns::protocol::{self, QueryType};

#[derive(Debug, Display, From)]
pub enum HostsError {
    #[display(fmt = "{}", _0)]
    Io(std::io::Error),
    #[display(fmt = "line {}: {}", line, reason)]
    #[from(ignore)]
    Parse { line: usize, reason: String },
}

impl std::error::Error for HostsError {}

pub type Result<T> = std::result::Result<T, HostsError>;

const HOSTNAME_PATTERN: &str =
    r"^[A-Za-z0-9_](?:[A-Za-z0-9_-]*[A-Za-z0-9_])?(?:\.[A-Za-z0-9_](?:[A-Za-z0-9_-]*[A-Za-z0-9_])?)*\.?$";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostValue {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    MX { preference: u16, exchange: String },
}

impl HostValue {
    pub fn query_type(&self) -> QueryType {
        match *self {
            HostValue::A(_) => QueryType::A,
            HostValue::AAAA(_) => QueryType::AAAA,
            HostValue::MX { .. } => QueryType::MX,
        }
    }

    /// Record data in wire form.
    pub fn rdata(&self) -> protocol::Result<Vec<u8>> {
        match *self {
            HostValue::A(ref addr) => Ok(addr.octets().to_vec()),
            HostValue::AAAA(ref addr) => Ok(addr.octets().to_vec()),
            HostValue::MX {
                preference,
                ref exchange,
            } => {
                let mut data = vec![(preference >> 8) as u8, (preference & 0xFF) as u8];
                name::write_name(exchange, &mut data)?;
                Ok(data)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostEntry {
    pub value: HostValue,
    pub ttl: u32,
}

#[derive(Clone, Debug, Default)]
pub struct HostTable {
    entries: HashMap<String, HostEntry>,
}

fn normalize(hostname: &str) -> String {
    hostname
        .strip_suffix('.')
        .unwrap_or(hostname)
        .to_ascii_lowercase()
}

impl HostTable {
    pub fn new() -> HostTable {
        HostTable::default()
    }

    pub fn load<P: AsRef<Path>>(path: P, default_ttl: u32) -> Result<HostTable> {
        let file = File::open(path)?;
        HostTable::parse(BufReader::new(file), default_ttl)
    }

    pub fn parse<R: BufRead>(reader: R, default_ttl: u32) -> Result<HostTable> {
        let hostname_re = Regex::new(HOSTNAME_PATTERN).map_err(|e| HostsError::Parse {
            line: 0,
            reason: e.to_string(),
        })?;

        let mut table = HostTable::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let parsed = parse_line(&line, &hostname_re, default_ttl).map_err(|reason| {
                HostsError::Parse {
                    line: idx + 1,
                    reason,
                }
            })?;

            if let Some((hostname, entry)) = parsed {
                table.insert(&hostname, entry);
            }
        }

        Ok(table)
    }

    pub fn insert(&mut self, hostname: &str, entry: HostEntry) -> Option<HostEntry> {
        self.entries.insert(normalize(hostname), entry)
    }

    /// Exact, case insensitive match. No wildcards, no suffix matching.
    pub fn lookup(&self, qname: &str) -> Option<&HostEntry> {
        self.entries.get(&normalize(qname))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn check_hostname(hostname: &str, hostname_re: &Regex) -> std::result::Result<(), String> {
    if !hostname_re.is_match(hostname) {
        return Err(format!("invalid hostname `{}`", hostname));
    }

    name::encode_name(hostname)
        .map(|_| ())
        .map_err(|e| format!("invalid hostname `{}`: {}", hostname, e))
}

fn parse_ttl(fields: &[&str], default_ttl: u32) -> std::result::Result<u32, String> {
    match fields {
        [] => Ok(default_ttl),
        [ttl] => ttl
            .parse::<u32>()
            .map_err(|_| format!("invalid ttl `{}`", ttl)),
        [_, extra, ..] => Err(format!("unexpected field `{}`", extra)),
    }
}

fn parse_line(
    line: &str,
    hostname_re: &Regex,
    default_ttl: u32,
) -> std::result::Result<Option<(String, HostEntry)>, String> {
    let content = line.split('#').next().unwrap_or("");
    let fields = content.split_whitespace().collect::<Vec<&str>>();

    let (hostname, rest) = match fields.split_first() {
        Some((hostname, rest)) => (*hostname, rest),
        None => return Ok(None),
    };

    check_hostname(hostname, hostname_re)?;

    let (value, ttl) = match rest {
        [] => return Err(format!("missing value for `{}`", hostname)),
        [kind, tail @ ..] if kind.eq_ignore_ascii_case("MX") => match tail {
            [preference, exchange, ttl @ ..] => {
                let preference = preference
                    .parse::<u16>()
                    .map_err(|_| format!("invalid MX preference `{}`", preference))?;
                check_hostname(exchange, hostname_re)?;

                let value = HostValue::MX {
                    preference,
                    exchange: normalize(exchange),
                };
                (value, parse_ttl(ttl, default_ttl)?)
            }
            _ => return Err("MX needs a preference and an exchange".to_string()),
        },
        [addr, ttl @ ..] => {
            let value = match addr.parse::<IpAddr>() {
                Ok(IpAddr::V4(ip)) => HostValue::A(ip),
                Ok(IpAddr::V6(ip)) => HostValue::AAAA(ip),
                Err(_) => return Err(format!("invalid address `{}`", addr)),
            };
            (value, parse_ttl(ttl, default_ttl)?)
        }
    };

    Ok(Some((normalize(hostname), HostEntry { value, ttl })))
}
