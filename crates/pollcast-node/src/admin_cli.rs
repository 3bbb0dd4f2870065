//! pollcast-admin CLI tool
//!
//! Operator commands for a running Pollcast node.
//!
//! Usage:
//!   pollcast-admin get-poll <poll_id>
//!   pollcast-admin list-polls
//!   pollcast-admin close-poll <poll_id>
//!   pollcast-admin delete-poll <poll_id>
//!   pollcast-admin reconcile-poll <poll_id>
//!   pollcast-admin ping

use pollcast_core::Poll;
use pollcast_node::admin_socket::{default_socket_path, AdminCommand, AdminResponse};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

fn print_usage() {
    eprintln!("pollcast-admin - Operate a Pollcast node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  pollcast-admin get-poll <poll_id>        Show a poll and its counters");
    eprintln!("  pollcast-admin list-polls                List all polls");
    eprintln!("  pollcast-admin close-poll <poll_id>      Close a poll");
    eprintln!("  pollcast-admin delete-poll <poll_id>     Delete a poll and its votes");
    eprintln!("  pollcast-admin reconcile-poll <poll_id>  Recount a poll from its votes");
    eprintln!("  pollcast-admin ping                      Check if daemon is running");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  POLLCAST_SOCKET       Path to admin socket");
    eprintln!("  POLLCAST_ADMIN_SOCKET Socket path shared with pollcast-node");
    eprintln!("  POLLCAST_DATA_DIR     Data directory (socket: <dir>/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("POLLCAST_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_socket_path())
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to pollcast-node at {:?}: {}\n\
             Is the pollcast-node running?",
            socket_path, e
        )
    })?;

    // Send command
    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn print_poll(poll: &Poll) {
    let state = if poll.is_active { "active" } else { "closed" };
    println!(
        "{}  {:?}  {}  {} votes  (creator {})",
        poll.id, poll.question_type, state, poll.total_votes, poll.creator
    );
    for option in &poll.options {
        println!("    {}  {:>6}  {}", option.id, option.vote_count, option.text);
    }
}

fn poll_id_arg(args: &[String], command: &str) -> String {
    match args.get(2) {
        Some(id) => id.clone(),
        None => {
            eprintln!("Error: {} requires a poll_id argument", command);
            std::process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match args[1].as_str() {
        "get-poll" => AdminCommand::GetPoll {
            poll_id: poll_id_arg(&args, "get-poll"),
        },
        "list-polls" => AdminCommand::ListPolls,
        "close-poll" => AdminCommand::ClosePoll {
            poll_id: poll_id_arg(&args, "close-poll"),
        },
        "delete-poll" => AdminCommand::DeletePoll {
            poll_id: poll_id_arg(&args, "delete-poll"),
        },
        "reconcile-poll" => AdminCommand::ReconcilePoll {
            poll_id: poll_id_arg(&args, "reconcile-poll"),
        },
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::Poll { poll } => print_poll(&poll),
            AdminResponse::Polls { polls } => {
                if polls.is_empty() {
                    println!("(none)");
                }
                for poll in &polls {
                    print_poll(poll);
                }
            }
            AdminResponse::Reconciled { poll_id, repaired } => {
                if repaired {
                    println!("{}: counters repaired", poll_id);
                } else {
                    println!("{}: counters consistent", poll_id);
                }
            }
            AdminResponse::Pong => {
                println!("pong - pollcast-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
