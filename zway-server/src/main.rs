//! Binary entry point (`spec.md` §6): CLI flags, TOML config, logging and
//! runtime bootstrap, and the interactive stdin command loop.

mod config;
mod supervisor;
mod tls;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{App, Arg};
use tokio::io::{AsyncBufReadExt, BufReader};

use zway_proto::logging::{self, Logger};
use zway_push::{FcmNotifier, NoopNotifier, PushNotifier};
use zway_session::{SessionContext, SessionRegistry};
use zway_store::{MemoryStore, StoreGateway};

use config::Config;
use supervisor::Supervisor;

fn main() {
    let matches = App::new("zway-server")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("End-to-end encrypted messenger relay")
        .arg(Arg::with_name("config").long("config").takes_value(true).help("Path to a TOML config file"))
        .arg(Arg::with_name("address").long("address").takes_value(true).help("Bind address, required unless set in --config"))
        .arg(Arg::with_name("port").long("port").takes_value(true).help("Bind port (default 5557)"))
        .arg(Arg::with_name("num-workers").long("num-workers").takes_value(true).help("Tokio worker thread count (default 20, capped at 50)"))
        .arg(Arg::with_name("daemon").long("daemon").help("Run detached, logging to stdout instead of the terminal"))
        .arg(Arg::with_name("heartbeat-disconnect").long("heartbeat-disconnect").help("Close sessions whose heartbeat has expired instead of only logging it"))
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => Config::load(path),
        None => Config {
            address: matches.value_of("address").expect("--address is required without --config").to_string(),
            port: 5557,
            num_workers: 20,
            daemon: false,
            working_dir: ".".to_string(),
            store_pool_size: zway_store::DEFAULT_POOL_SIZE,
            heartbeat_timeout_secs: 40,
            heartbeat_disconnect: false,
            stream_idle_timeout_secs: 60,
            fcm_key: None,
        },
    };

    if let Some(address) = matches.value_of("address") {
        config.address = address.to_string();
    }
    if let Some(port) = matches.value_of("port") {
        config.port = port.parse().expect("--port must be a number");
    }
    if let Some(workers) = matches.value_of("num-workers") {
        config.num_workers = workers.parse().expect("--num-workers must be a number");
    }
    if matches.is_present("daemon") {
        config.daemon = true;
    }
    if matches.is_present("heartbeat-disconnect") {
        config.heartbeat_disconnect = true;
    }

    let log = if config.daemon { logging::init_daemon() } else { logging::init() };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.clamped_workers())
        .enable_all()
        .build()
        .expect("failed to build the tokio runtime");

    runtime.block_on(run(config, log));
}

async fn run(config: Config, log: Logger) {
    let acceptor = tls::load_acceptor(&config.cert_path(), &config.key_path()).expect("failed to load TLS certificate/key");

    // No standalone database backend ships in this workspace (`spec.md` §2
    // treats the document store as an opaque external collaborator); the
    // in-memory implementation serves both tests and this binary.
    let store = StoreGateway::new(MemoryStore::new(), config.store_pool_size, &log);
    let stream_pool = Arc::new(zway_net::StreamPool::new(config.tmp_dir(), &log));
    let push: Arc<dyn PushNotifier> = match &config.fcm_key {
        Some(key) => Arc::new(FcmNotifier::new(key.clone(), &log)),
        None => Arc::new(NoopNotifier),
    };

    let ctx = Arc::new(SessionContext {
        store,
        stream_pool,
        stream_senders: zway_session::senders::StreamSenderList::new(),
        registry: Arc::new(SessionRegistry::new()),
        push,
        heartbeat_timeout_secs: config.heartbeat_timeout_secs,
        heartbeat_disconnect: config.heartbeat_disconnect,
        stream_idle_timeout_secs: config.stream_idle_timeout_secs,
        log: log.new(logging::o!("component" => "session-context")),
    });

    let addr: SocketAddr = format!("{}:{}", config.address, config.port)
        .parse()
        .expect("invalid bind address/port");

    let supervisor = Arc::new(
        Supervisor::bind(ctx, acceptor, addr, log.new(logging::o!("component" => "supervisor")))
            .await
            .expect("failed to bind accept socket"),
    );

    logging::info!(log, "listening"; "address" => addr.to_string(), "workers" => config.clamped_workers());

    tokio::spawn(supervisor.clone().run_ticker());
    let accept_handle = tokio::spawn(supervisor.clone().run_accept_loop());

    if config.daemon {
        let _ = accept_handle.await;
    } else {
        run_stdin_commands(supervisor, log).await;
    }
}

/// `p`/`r`/`i`/`e` single-key commands (`spec.md` §6), read line by line
/// since there's no raw-terminal dependency in the teacher's stack.
async fn run_stdin_commands(supervisor: Arc<Supervisor>, log: Logger) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            _ => break,
        };

        match line.trim() {
            "p" => {
                if supervisor.pause().await {
                    logging::info!(log, "accept loop paused");
                } else if supervisor.resume().await {
                    logging::info!(log, "accept loop resumed");
                }
            }
            "r" => {
                supervisor.remove_all_sessions();
                logging::info!(log, "removed all sessions");
            }
            "i" => {
                logging::info!(log, "status"; "sessions" => supervisor.session_count());
            }
            "e" => {
                logging::info!(log, "exiting");
                break;
            }
            _ => {}
        }
    }
}
