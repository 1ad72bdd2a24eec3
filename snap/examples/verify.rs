//! Verify example: check credentials and the IOS release of a router
//!
//! Runs the Verify workflow in the background and prints status lines as
//! the router answers. Exits non-zero if verification fails.
//!
//! # Usage
//!
//! Over SSH:
//! ```bash
//! cargo run --example verify -- --transport ssh --address 192.168.1.1 --user admin --password secret
//! ```
//!
//! Over a console cable:
//! ```bash
//! cargo run --example verify -- --transport console --address COM3 --user admin --password secret
//! ```

use std::env;
use std::process::ExitCode;

use futures_util::StreamExt;
use snap::{
    DeviceProfile, Engine, HostKeyVerification, RunnerEvent, SessionRunner, TransportKind,
    Workflow, WorkflowResult, WorkflowSettings,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    let mut builder = DeviceProfile::builder(args.transport, &args.address)
        .username(&args.user)
        .password(&args.password);
    if let Some(secret) = &args.enable_secret {
        builder = builder.enable_secret(secret);
    }
    if args.insecure {
        builder = builder.host_key_verification(HostKeyVerification::Disabled);
    }

    let profile = match builder.build() {
        Ok(profile) => profile,
        Err(e) => {
            let failure = snap::Failure::classify(args.transport, &e);
            eprintln!("{}", failure);
            return ExitCode::FAILURE;
        }
    };

    let runner = SessionRunner::new(Engine::with_settings(WorkflowSettings::default()));
    let mut handle = match runner.launch(Workflow::Verify(profile)) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut outcome = None;
    while let Some(event) = handle.next().await {
        match event {
            RunnerEvent::Status(status) => println!("{}", status),
            RunnerEvent::Finished(result) => outcome = Some(result),
        }
    }

    match outcome {
        Some(WorkflowResult::Verified(device)) => {
            println!("\n{} is ready over {}", device.address(), device.kind());
            ExitCode::SUCCESS
        }
        Some(result) => {
            if let Some(failure) = result.failure() {
                eprintln!("\nVerify failed ({:?})", failure.kind);
            }
            ExitCode::FAILURE
        }
        None => ExitCode::FAILURE,
    }
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    transport: TransportKind,
    address: String,
    user: String,
    password: String,
    enable_secret: Option<String>,
    insecure: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut transport = TransportKind::Ssh;
        let mut address = String::new();
        let mut user = String::new();
        let mut password = String::new();
        let mut enable_secret = None;
        let mut insecure = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--transport" | "-t" => {
                    i += 1;
                    if i < args.len() {
                        transport = match args[i].to_ascii_lowercase().as_str() {
                            "console" | "serial" => TransportKind::Console,
                            "telnet" => TransportKind::Telnet,
                            "ssh" => TransportKind::Ssh,
                            other => {
                                eprintln!("Unknown transport: {}", other);
                                std::process::exit(2);
                            }
                        };
                    }
                }
                "--address" | "-a" => {
                    i += 1;
                    if i < args.len() {
                        address = args[i].clone();
                    }
                }
                "--user" | "-u" => {
                    i += 1;
                    if i < args.len() {
                        user = args[i].clone();
                    }
                }
                "--password" | "-P" => {
                    i += 1;
                    if i < args.len() {
                        password = args[i].clone();
                    }
                }
                "--enable-secret" | "-e" => {
                    i += 1;
                    if i < args.len() {
                        enable_secret = Some(args[i].clone());
                    }
                }
                "--insecure" => insecure = true,
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                }
            }
            i += 1;
        }

        Self {
            transport,
            address,
            user,
            password,
            enable_secret,
            insecure,
        }
    }

    fn print_help() {
        println!(
            r#"snap verify example

USAGE:
    cargo run --example verify -- [OPTIONS]

OPTIONS:
    -t, --transport <KIND>      console, telnet or ssh [default: ssh]
    -a, --address <ADDR>        Serial port (COM3, /dev/ttyUSB0) or host[:port]
    -u, --user <USER>           Username
    -P, --password <PASS>       Password
    -e, --enable-secret <PASS>  Enable secret [default: the password]
    --insecure                  Skip SSH host key checks
    --help                      Print this help message
"#
        );
    }
}
