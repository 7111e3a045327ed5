use std::env;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use derive_more::{Display, From};
use getopts::{Matches, Options};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hostdns::dns::client::{ClientError, DnsUdpClient};
use hostdns::dns::context::{ContextError, ServerConfig, ServerContext};
use hostdns::dns::protocol::QueryType;
use hostdns::dns::server::{DnsServer, DnsUdpServer};

#[derive(Debug, Display, From)]
enum AppError {
    #[display(fmt = "{}", _0)]
    Context(ContextError),
    #[display(fmt = "query failed: {}", _0)]
    Client(ClientError),
    #[display(fmt = "{}", _0)]
    #[from(ignore)]
    Usage(String),
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Context(ContextError::Io(err))
    }
}

type Result<T> = std::result::Result<T, AppError>;

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

fn parse_opt<T: std::str::FromStr>(matches: &Matches, name: &str) -> Result<Option<T>> {
    match matches.opt_str(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::Usage(format!("invalid value `{}` for --{}", value, name))),
        None => Ok(None),
    }
}

fn build_config(matches: &Matches) -> Result<ServerConfig> {
    let mut config = match matches.opt_str("config") {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    if let Some(bind) = matches.opt_str("bind") {
        config.bind_address = bind;
    }
    if let Some(port) = parse_opt::<u16>(matches, "port")? {
        config.port = port;
    }
    if let Some(hosts) = matches.opt_str("hosts") {
        config.hosts_file = PathBuf::from(hosts);
    }
    if let Some(threads) = parse_opt::<usize>(matches, "threads")? {
        config.thread_count = threads;
    }

    Ok(config)
}

fn run_server(matches: &Matches) -> Result<()> {
    let config = build_config(matches)?;
    let context = Arc::new(ServerContext::initialize(config)?);

    info!(
        bind = %context.config.bind_address,
        port = context.config.port,
        threads = context.config.thread_count,
        "starting server"
    );

    let server = DnsUdpServer::bind(context)?;
    let handle = server.run_server()?;

    if handle.join().is_err() {
        error!("UDP server thread panicked");
    }

    Ok(())
}

fn run_query(matches: &Matches, qname: &str) -> Result<()> {
    let qtype = match matches.opt_str("type") {
        Some(name) => QueryType::from_name(&name)
            .ok_or_else(|| AppError::Usage(format!("unknown record type `{}`", name)))?,
        None => QueryType::A,
    };

    let server = matches
        .opt_str("server")
        .unwrap_or_else(|| "127.0.0.1:53".to_string());
    let server: SocketAddr = server
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| AppError::Usage(format!("cannot resolve server `{}`", server)))?;

    let client = DnsUdpClient::new(Duration::from_secs(5));
    let response = client.send_query(qname, qtype, server)?;

    println!(";; {}", response.header);
    for question in &response.questions {
        println!(";{}", question);
    }
    for answer in &response.answers {
        println!("{}", answer);
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "hostdns".to_string());

    let mut opts = Options::new();
    opts.optopt("c", "config", "JSON configuration file", "FILE");
    opts.optopt("b", "bind", "address to listen on", "ADDR");
    opts.optopt("p", "port", "UDP port to listen on", "PORT");
    opts.optopt("f", "hosts", "host table to serve", "FILE");
    opts.optopt("t", "threads", "number of worker threads", "N");
    opts.optopt("q", "query", "query a running server instead of serving", "NAME");
    opts.optopt("T", "type", "record type to query (default A)", "TYPE");
    opts.optopt("s", "server", "server to query (default 127.0.0.1:53)", "ADDR:PORT");
    opts.optflag("h", "help", "print this help menu");

    let matches = match opts.parse(args.iter().skip(1)) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            print_usage(&program, &opts);
            process::exit(2);
        }
    };

    if matches.opt_present("h") {
        print_usage(&program, &opts);
        return;
    }

    let result = match matches.opt_str("query") {
        Some(qname) => run_query(&matches, &qname),
        None => run_server(&matches),
    };

    if let Err(err) = result {
        error!(error = %err, "hostdns failed");
        process::exit(1);
    }
}
