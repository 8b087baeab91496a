mod cli;
mod format;
mod input;
mod shutdown;

use std::io::{stdin, BufReader};
use std::sync::Arc;

use clap::Parser;
use metasched_core::load_queue_config;
use metasched_engine::{start_engine, EngineConfig, EngineEvent, EngineOutcome, ResourceHints, SlurmAdapter};

use crate::cli::Cli;
use crate::shutdown::{spawn_ctrl_c_handler, ShutdownController, ShutdownEvent};

/// Bound on how long a forced (second Ctrl-C) shutdown waits for the
/// engine to finish cancelling live jobs via the Cluster Adapter before
/// giving up and exiting anyway. The second Ctrl-C is still an escape
/// hatch if the cluster tool itself hangs; it no longer skips
/// cancellation outright.
const FORCE_CANCEL_GRACE: std::time::Duration = std::time::Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let queues = load_queue_config(&cli.config)?;
    let commands = input::read_commands(BufReader::new(stdin()))?;

    println!(
        "{}",
        format::start_banner(&cli.config.display().to_string(), cli.poll, queues.len())
    );

    if commands.is_empty() {
        println!("[{}] no commands on stdin; nothing to do", chrono::Local::now().format("%c"));
        return Ok(());
    }

    let hints = ResourceHints {
        memory_gb: cli.memory,
        timeout_minutes: cli.timeout,
        output_dir: cli.out.display().to_string(),
    };

    let engine = start_engine(EngineConfig {
        queues,
        commands,
        adapter: Arc::new(SlurmAdapter::new()),
        resource_hints: hints,
        poll_interval: std::time::Duration::from_secs(cli.poll),
        monitor_interval_secs: cli.monitor,
        retry_bound: cli.retry,
    });

    let mut events = engine.subscribe();

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_ctrl_c_handler(shutdown.clone(), shutdown_tx);

    let mut force_exit = false;
    let mut exit_code = 0;

    loop {
        tokio::select! {
            ev_opt = shutdown_rx.recv() => {
                match ev_opt {
                    Some(ShutdownEvent::Graceful) => {
                        eprintln!("{}", format::termination_line());
                        engine.request_stop();
                    }
                    Some(ShutdownEvent::Immediate) => {
                        eprintln!("{}", format::termination_line());
                        force_exit = true;
                        engine.request_stop();
                        break;
                    }
                    None => {}
                }
            }
            evt = events.recv() => {
                let evt = match evt {
                    Ok(v) => v,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };

                match evt {
                    EngineEvent::Started | EngineEvent::StopRequested => {}
                    EngineEvent::Report(report) => {
                        println!("{}", format::load_report_line(&report));
                        println!("{}", format::progress_report_line(&report));
                    }
                    EngineEvent::Supervisor(event) => {
                        let line = format::supervisor_event_line(&event);
                        if event.is_warning() {
                            eprintln!("{line}");
                        } else {
                            println!("{line}");
                        }
                    }
                    EngineEvent::Stopped { result } => {
                        match &result {
                            EngineOutcome::Completed(stats) => {
                                println!("{}", format::completion_summary_line(stats));
                            }
                            EngineOutcome::Cancelled(stats) => {
                                println!("{}", format::completion_summary_line(stats));
                                exit_code = 130;
                            }
                            EngineOutcome::Fatal { reason } => {
                                eprintln!("{}", format::fatal_line(reason));
                                exit_code = 1;
                            }
                        }
                        break;
                    }
                }
            }
        }
    }

    // A forced (second Ctrl-C) shutdown still has to wait for the engine
    // to actually cancel every live job through the Cluster Adapter
    // (SPEC_FULL.md §5); it just bounds how long it waits before giving up.
    if force_exit {
        match tokio::time::timeout(FORCE_CANCEL_GRACE, engine.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => eprintln!("{}", format::fatal_line(&err.to_string())),
            Err(_) => eprintln!(
                "{}",
                format::fatal_line("timed out waiting for live jobs to be cancelled")
            ),
        }
        std::process::exit(130);
    }

    match engine.wait().await {
        Ok(_) => {}
        Err(err) => {
            eprintln!("{}", format::fatal_line(&err.to_string()));
            exit_code = 1;
        }
    }

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
