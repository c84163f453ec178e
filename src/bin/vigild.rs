//! vigild - directory-integrity monitor daemon
//!
//! Watches the directories named on the command line through the kernel
//! inotify facility and prints one JSON alert per line for every
//! unauthorized change. Runs until interrupted.

use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use vigil::{
    ChannelSink, CorrelationEngine, Dispatcher, DispatcherConfig, DispatcherHandle,
    InotifySource, StreamRecvError, VigilError, WindowOracle,
};

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_sig: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    let handler = handle_signal as extern "C" fn(libc::c_int);
    // Safety: the handler only stores to an atomic, which is async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

fn parse_args() -> Vec<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let program = args
        .first()
        .map_or("vigild", String::as_str)
        .to_string();

    let mut dirs = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("vigild - directory-integrity monitor");
                println!();
                println!("USAGE:");
                println!("    {program} dir1 [dir2 .. dirN]");
                println!();
                println!("Watches each directory for unauthorized changes and prints");
                println!("one JSON alert per line. Stops on SIGINT or SIGTERM.");
                exit(0);
            }
            other => dirs.push(PathBuf::from(other)),
        }
    }

    if dirs.is_empty() {
        eprintln!("Usage: {program} dir1 [dir2 .. dirN]");
        exit(1);
    }
    dirs
}

fn exit_code_for(err: &VigilError) -> i32 {
    match err {
        VigilError::Source(source) => source.os_error_code().unwrap_or(1),
        _ => 1,
    }
}

fn finish(handle: DispatcherHandle) -> i32 {
    match handle.join() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("vigild: {err}");
            exit_code_for(&err)
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let dirs = parse_args();
    install_signal_handlers();

    let source = match InotifySource::new() {
        Ok(source) => source,
        Err(err) => {
            eprintln!("vigild: failed to initialize event source: {err}");
            exit(err.os_error_code().unwrap_or(1));
        }
    };

    let (sink, alerts) = ChannelSink::new(1024);
    let engine = CorrelationEngine::new(WindowOracle::new(), sink);
    let mut dispatcher = Dispatcher::new(DispatcherConfig::default(), source, engine);

    if let Err(err) = dispatcher.register_all(&dirs) {
        eprintln!("vigild: {err}");
        exit(exit_code_for(&err));
    }

    let handle = match dispatcher.spawn() {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("vigild: {err}");
            exit(exit_code_for(&err));
        }
    };

    loop {
        if STOP.load(Ordering::SeqCst) {
            break;
        }
        match alerts.recv_timeout(Duration::from_millis(200)) {
            Ok(alert) => {
                if let Ok(line) = serde_json::to_string(&alert) {
                    println!("{line}");
                }
            }
            Err(StreamRecvError::Timeout) => {}
            Err(StreamRecvError::Disconnected) => {
                // The dispatcher stopped on its own; surface its error.
                exit(finish(handle));
            }
        }
    }

    let code = finish(handle);
    // Drain alerts that raced the shutdown.
    while let Some(alert) = alerts.try_recv() {
        if let Ok(line) = serde_json::to_string(&alert) {
            println!("{line}");
        }
    }
    exit(code);
}
