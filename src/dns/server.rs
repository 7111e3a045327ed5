//! UDP server answering queries from the host table

use std::collections::VecDeque;
use std::io::Result;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{Builder, JoinHandle};

use tracing::{debug, info, warn};

use crate::dns::context::ServerContext;
use crate::dns::protocol::{
    self, DnsHeader, DnsPacket, DnsQuestion, ResourceRecord, ResultCode, HEADER_LEN,
    OPCODE_QUERY,
};

/// Largest response we will put in a single UDP datagram.
pub const MAX_UDP_SIZE: usize = 512;

pub trait DnsServer {
    /// Spawns the server threads and returns the handle of the thread
    /// receiving requests.
    fn run_server(self) -> Result<JoinHandle<()>>;
}

fn response_header(request: &DnsHeader, rescode: ResultCode) -> DnsHeader {
    let mut header = DnsHeader::new();
    header.id = request.id;
    header.flags.set_response(true);
    header.flags.set_opcode(request.flags.opcode());
    header.flags.set_authoritative_answer(true);
    header
        .flags
        .set_recursion_desired(request.flags.recursion_desired());
    header.flags.set_recursion_available(false);
    header.flags.set_rescode(rescode);
    header
}

/// A reply with the given code and every section left empty.
pub fn error_response(request: &DnsHeader, rescode: ResultCode) -> DnsPacket {
    let mut packet = DnsPacket::new();
    packet.header = response_header(request, rescode);
    packet
}

/// Decodes the header and the question section, ignoring anything after.
pub fn parse_query(data: &[u8]) -> protocol::Result<DnsPacket> {
    let mut packet = DnsPacket::new();
    packet.header = DnsHeader::from_bytes(data)?;

    let mut offset = HEADER_LEN;
    for _ in 0..packet.header.questions {
        let (question, consumed) = DnsQuestion::from_bytes(data, offset)?;
        packet.questions.push(question);
        offset += consumed;
    }

    Ok(packet)
}

/// Answers the first question of `request` from the host table. The other
/// questions are echoed but not answered.
pub fn execute_query(context: &ServerContext, request: &DnsPacket) -> DnsPacket {
    let mut packet = DnsPacket::new();
    packet.header = response_header(&request.header, ResultCode::NOERROR);
    packet.questions = request.questions.clone();

    let question = match request.questions.first() {
        Some(x) => x,
        None => {
            packet.header.flags.set_rescode(ResultCode::FORMERR);
            return packet;
        }
    };

    let rescode = match context.hosts.lookup(&question.name) {
        Some(entry) => match entry.value.rdata() {
            Ok(data) => {
                if entry.value.query_type() != question.qtype {
                    debug!(
                        name = %question.name,
                        qtype = ?question.qtype,
                        stored = ?entry.value.query_type(),
                        "answering with data of another record type"
                    );
                }
                packet.answers.push(ResourceRecord {
                    domain: question.name.clone(),
                    rtype: question.qtype,
                    class: question.qclass,
                    ttl: entry.ttl,
                    data,
                });
                ResultCode::NOERROR
            }
            Err(err) => {
                warn!(name = %question.name, error = %err, "unusable host entry");
                ResultCode::SERVFAIL
            }
        },
        None => ResultCode::NXDOMAIN,
    };
    packet.header.flags.set_rescode(rescode);

    info!(
        id = request.header.id,
        name = %question.name,
        qtype = ?question.qtype,
        rescode = ?rescode,
        "query"
    );

    packet
}

/// Runs one datagram through parse, resolve and encode. `None` means the
/// datagram gets no reply at all.
pub fn handle_datagram(context: &ServerContext, data: &[u8]) -> Option<Vec<u8>> {
    let header = match DnsHeader::from_bytes(data) {
        Ok(x) => x,
        Err(err) => {
            debug!(len = data.len(), error = %err, "dropping datagram");
            return None;
        }
    };

    if header.flags.response() {
        debug!(id = header.id, "dropping datagram that is not a query");
        return None;
    }

    let response = if header.flags.opcode() != OPCODE_QUERY {
        debug!(id = header.id, opcode = header.flags.opcode(), "unsupported opcode");
        error_response(&header, ResultCode::NOTIMP)
    } else if header.questions == 0 {
        debug!(id = header.id, "query without questions");
        error_response(&header, ResultCode::FORMERR)
    } else {
        match parse_query(data) {
            Ok(request) => execute_query(context, &request),
            Err(err) => {
                debug!(id = header.id, error = %err, "malformed question section");
                error_response(&header, ResultCode::FORMERR)
            }
        }
    };

    match response.to_bytes(MAX_UDP_SIZE) {
        Ok(x) => Some(x),
        Err(err) => {
            warn!(id = header.id, error = %err, "failed to encode response");
            error_response(&header, ResultCode::SERVFAIL)
                .to_bytes(MAX_UDP_SIZE)
                .ok()
        }
    }
}

/// Datagrams waiting for a worker beyond this are dropped.
pub const MAX_PENDING_REQUESTS: usize = 1024;

/// Requests handed from the receiving thread to the workers, tagged with
/// their client ticket.
pub struct RequestQueue {
    pending: Mutex<VecDeque<(u64, Vec<u8>)>>,
    cond: Condvar,
    capacity: usize,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> RequestQueue {
        RequestQueue {
            pending: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            capacity,
        }
    }

    /// Queues a request and wakes a worker. Returns false, leaving the queue
    /// untouched, when it is full.
    pub fn push(&self, ticket: u64, data: Vec<u8>) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.len() >= self.capacity {
            return false;
        }

        pending.push_back((ticket, data));
        self.cond.notify_one();

        true
    }

    /// Blocks until a request is available.
    pub fn pop(&self) -> (u64, Vec<u8>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(request) = pending.pop_front() {
                return request;
            }
            pending = self
                .cond
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The UDP server
///
/// Incoming datagrams are read by a single thread, which records the sender
/// in the client tracker and queues the datagram. A pool of worker threads
/// takes requests off the queue, resolves them and sends the reply to the
/// tracked address.
pub struct DnsUdpServer {
    context: Arc<ServerContext>,
    socket: UdpSocket,
    requests: Arc<RequestQueue>,
}

impl DnsUdpServer {
    pub fn bind(context: Arc<ServerContext>) -> Result<DnsUdpServer> {
        let socket = UdpSocket::bind((
            context.config.bind_address.as_str(),
            context.config.port,
        ))?;

        Ok(DnsUdpServer {
            context,
            socket,
            requests: Arc::new(RequestQueue::new(MAX_PENDING_REQUESTS)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }
}

fn serve_request(context: &ServerContext, socket: &UdpSocket, ticket: u64, data: &[u8]) {
    let addr = match context.clients.address(ticket) {
        Some(x) => x,
        None => {
            debug!(ticket, "client expired before its request was handled");
            return;
        }
    };

    if let Some(reply) = handle_datagram(context, data) {
        if let Err(err) = socket.send_to(&reply, addr) {
            warn!(client = %addr, error = %err, "failed to send reply");
        }
    }
}

impl DnsServer for DnsUdpServer {
    fn run_server(self) -> Result<JoinHandle<()>> {
        for thread_id in 0..self.context.config.thread_count.max(1) {
            let socket = self.socket.try_clone()?;
            let context = self.context.clone();
            let requests = self.requests.clone();

            Builder::new()
                .name(format!("DnsUdpServer-request-{}", thread_id))
                .spawn(move || loop {
                    let (ticket, data) = requests.pop();
                    serve_request(&context, &socket, ticket, &data);
                    context.clients.finish(ticket);
                })?;
        }

        let local_addr = self.socket.local_addr()?;
        info!(addr = %local_addr, "listening for UDP queries");

        Builder::new()
            .name("DnsUdpServer-incoming".into())
            .spawn(move || loop {
                let mut buf = [0u8; MAX_UDP_SIZE];
                let (len, src) = match self.socket.recv_from(&mut buf) {
                    Ok(x) => x,
                    Err(err) => {
                        warn!(error = %err, "failed to read from UDP socket");
                        continue;
                    }
                };

                let clients = &self.context.clients;
                let evicted = clients.evict_older_than(self.context.config.client_timeout());
                if evicted > 0 {
                    debug!(evicted, pending = clients.len(), "evicted stale clients");
                }

                let id = DnsHeader::from_bytes(&buf[..len]).map(|x| x.id).unwrap_or(0);
                let ticket = clients.register(src, id);

                if !self.requests.push(ticket, buf[..len].to_vec()) {
                    warn!(client = %src, id, "request queue full, dropping datagram");
                    clients.finish(ticket);
                }
            })
    }
}
