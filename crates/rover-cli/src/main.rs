//! `roverd` – rover controller daemon
//!
//! 1. Loads `~/.rover/config.toml`, writing the defaults on first run.
//! 2. Installs the tracing subscriber.
//! 3. Builds the board.  No GPIO backend ships with this crate, so the
//!    daemon drives the simulated board scripted by the `[bench]` table.
//! 4. Runs the controller until a fault or Ctrl-C.  Faults exit non-zero.

mod config;

use colored::Colorize;
use rover_hal::sim::SimBoard;
use rover_runtime::{Controller, LogFormat, init_tracing_with};
use tokio::sync::watch;
use tracing::{error, info, warn};

fn main() {
    let (cfg, first_run) = match config::load() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            std::process::exit(2);
        }
    };

    let format = std::env::var("ROVER_LOG_FORMAT")
        .unwrap_or_else(|_| cfg.log_format.clone())
        .parse()
        .unwrap_or(LogFormat::Compact);
    let _guard = init_tracing_with("roverd", format);

    print_banner();

    if first_run {
        // Environment overrides are not persisted.
        match config::save(&config::Config::default()) {
            Ok(()) => println!(
                "  {} Default config written to {}\n",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            ),
            Err(e) => warn!(error = %e, "could not write default config"),
        }
    } else {
        println!(
            "  Config loaded from {}\n",
            config::config_path().display().to_string().bold()
        );
    }

    // ── Ctrl-C ────────────────────────────────────────────────────────────
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping motors …".yellow().bold());
        let _ = shutdown_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let mut bench = SimBoard::new()
        .with_distances(cfg.bench.sonar_script())
        .with_display_init_failures(cfg.bench.display_init_failures)
        .with_sound_divisor(cfg.controller.sound_divisor);
    if cfg.bench.repeat {
        bench = bench.repeating();
    }
    let (board, _probe) = bench.build();
    info!(
        port = cfg.controller.port,
        samples = cfg.bench.distances_cm.len(),
        "bench board ready"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Runtime error".red(), e);
            std::process::exit(1);
        }
    };

    let controller = Controller::new(cfg.controller, board);
    let outcome = runtime.block_on(async move {
        tokio::select! {
            result = controller.run() => result,
            Ok(()) = shutdown_rx.changed() => {
                info!("shutdown requested");
                Ok(())
            }
        }
    });
    // Dropping the runtime cancels every task; a lease dropped mid-maneuver
    // coasts the motors.
    drop(runtime);

    match outcome {
        Ok(()) => println!("{}", "  ✓ Rover stopped.".green()),
        Err(e) => {
            error!(error = %e, "controller failed");
            eprintln!("{}: {}", "Controller stopped".red(), e);
            std::process::exit(1);
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___                    "#.bold().cyan());
    println!("{}", r#"  / _ \___ _  _____ ____  "#.bold().cyan());
    println!("{}", r#" / , _/ _ \ |/ / -_) __/  "#.bold().cyan());
    println!("{}", r#"/_/|_|\___/___/\__/_/     "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "roverd".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Differential-drive motion controller");
    println!();
}
