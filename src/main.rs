//! Console controller for a trial acquisition session.
//!
//! Reads operator commands from stdin:
//!
//! ```text
//! setup <experiment> <participant> <folder> [WIDTHxHEIGHT/FPSfps]
//! start | stop | bias | preview | repeat on|off | status | quit
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use trial_daq::channels::{CameraMode, SetupParameters};
use trial_daq::config::{Settings, DEFAULT_CONFIG_PATH};
use trial_daq::controller::TrialController;
use trial_daq::session::Session;

#[derive(Parser, Debug)]
#[command(author, version, about = "Synchronized force/torque, inertial and camera trials")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;
    trial_daq::tracing_init::init(&settings.application.log_level)?;

    let session = Session::start(&settings).context("Failed to start session")?;
    println!("{} ready. Type 'help' for commands.", settings.application.name);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        for report in session.controller().drain_errors() {
            eprintln!("error: {}", report);
        }
        match handle(session.controller(), &line) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("{:#}", e),
        }
        if session.all_workers_finished() {
            eprintln!("all workers have exited");
            break;
        }
        io::stdout().flush()?;
    }

    for report in session.controller().drain_errors() {
        eprintln!("error: {}", report);
    }
    session.shutdown()?;
    Ok(())
}

/// Execute one command line. Returns `false` on `quit`.
fn handle(controller: &TrialController, line: &str) -> Result<bool> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => {}
        ["setup", experiment, participant, folder, rest @ ..] => {
            let mode = match rest {
                [] => CameraMode::default(),
                [mode] => mode.parse()?,
                _ => bail!("usage: setup <experiment> <participant> <folder> [mode]"),
            };
            let params = SetupParameters::new(*experiment, *participant, *folder);
            controller.save_setup(&params, mode)?;
            println!("setup saved ({})", mode);
        }
        ["start"] => {
            controller.start_trial()?;
            println!("recording started");
        }
        ["stop"] => {
            controller.stop_trial()?;
            println!("recording stopped");
        }
        ["bias"] => controller.request_bias(),
        ["preview"] => controller.toggle_preview(),
        ["repeat", "on"] => controller.set_repeat(true),
        ["repeat", "off"] => controller.set_repeat(false),
        ["status"] => {
            let status = controller.status();
            println!("{:?}", status);
            if let Some(frame) = controller.latest_force_torque() {
                println!("force_torque: {}", serde_json::to_string(&frame)?);
            }
            if let Some(frame) = controller.latest_inertial() {
                println!("inertial: {}", serde_json::to_string(&frame)?);
            }
        }
        ["help"] => {
            println!("setup <experiment> <participant> <folder> [mode]");
            println!("  modes: {}", CameraMode::PRESETS.map(|m| m.to_string()).join(", "));
            println!("start | stop | bias | preview | repeat on|off | status | quit");
        }
        ["quit"] | ["exit"] => return Ok(false),
        _ => bail!("unknown command '{}', type 'help'", line.trim()),
    }
    Ok(true)
}
