// src/main.rs - Chessboard simulator: runs the controller against simulated hardware
use clap::Parser;
use gantry_chess::Indication;
use gantry_chess::chessboard::{BoardController, BoardError, TracingSink};
use gantry_chess::config::{self, Config};
use gantry_chess::hardware::simulated::SimulatedHardware;
use gantry_chess::motion::StepperDriver;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Duration;

/// Gantry chessboard simulator
#[derive(Parser, Debug)]
#[command(name = "chessboard-sim", about = "Plays symbolic moves on a simulated gantry chessboard.")]
struct Cli {
    /// Path to a TOML config file (defaults when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run the homing routine before the first move
    #[arg(long)]
    home: bool,

    /// Symbolic move, e.g. --move P43 or --move C22R (piece, file, rank, optional T/B/L/R hint)
    #[arg(short = 'm', long = "move", value_parser = parse_move)]
    moves: Vec<SymbolicMove>,

    /// Print the final board as JSON
    #[arg(long)]
    json: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy)]
struct SymbolicMove {
    piece: char,
    x: i32,
    y: i32,
    indication: Indication,
}

fn parse_move(s: &str) -> Result<SymbolicMove, String> {
    let chars: Vec<char> = s.chars().collect();
    let (piece, file, rank, hint) = match chars.as_slice() {
        [p, x, y] => (*p, *x, *y, None),
        [p, x, y, h] => (*p, *x, *y, Some(*h)),
        _ => return Err(format!("expected <piece><file><rank>[T|B|L|R], got '{}'", s)),
    };
    let digit = |c: char| {
        c.to_digit(10)
            .map(|d| d as i32)
            .ok_or_else(|| format!("'{}' in '{}' is not a digit", c, s))
    };
    let indication = match hint.map(|c| c.to_ascii_uppercase()) {
        None => Indication::None,
        Some('T') => Indication::Top,
        Some('B') => Indication::Bottom,
        Some('L') => Indication::Left,
        Some('R') => Indication::Right,
        Some(other) => return Err(format!("unknown hint '{}' in '{}'", other, s)),
    };
    Ok(SymbolicMove {
        piece,
        x: digit(file)?,
        y: digit(rank)?,
        indication,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    tracing::info!("Starting chessboard simulator");

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            config::load_config(path)?
        }
        None => Config::default(),
    };
    config.validate()?;

    let hw = Arc::new(SimulatedHardware::with_carriage_at(
        config.simulator.start_x,
        config.simulator.start_y,
    ));
    let driver = Arc::new(StepperDriver::new(hw.clone(), hw.clone(), config.driver_settings())?);

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

    // Stand-in for the hardware timer interrupt
    let ticks_per_ms = config.simulator.ticks_per_ms;
    let timer_hw = hw.clone();
    let timer_driver = driver.clone();
    let timer = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(1));
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = interval.tick() => {
                    for _ in 0..ticks_per_ms {
                        if !timer_hw.tick(&timer_driver) {
                            break;
                        }
                    }
                }
            }
        }
    });

    let settings = config.controller_settings();
    let moves = cli.moves.clone();
    let home = cli.home;
    let io = hw.clone();
    let controller = tokio::task::spawn_blocking(move || -> Result<BoardController, BoardError> {
        let mut controller = BoardController::new(driver, io, settings);
        controller.attach_logger(Box::new(TracingSink));
        controller.begin();
        if home {
            controller.go_home()?;
        }
        // Each move drains before the next one is resolved, so resolution
        // sees the position the previous move produced.
        for mv in moves {
            if let Err(e) = controller.queue_piece_move_by_type(mv.piece, mv.x, mv.y, mv.indication) {
                tracing::warn!(?mv, "skipping move: {}", e);
                continue;
            }
            controller.run_until_idle();
        }
        controller.log_matrix();
        Ok(controller)
    })
    .await??;

    let _ = shutdown_tx.send(());
    timer.await?;

    let stats = controller.queue_stats();
    tracing::info!(
        max = stats.max,
        avg = stats.avg,
        carriage_x = hw.carriage(gantry_chess::Axis::X),
        carriage_y = hw.carriage(gantry_chess::Axis::Y),
        "simulation finished"
    );

    if cli.json {
        println!("{}", serde_json::to_string_pretty(controller.board())?);
    } else {
        print!("{}", controller.render_matrix());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move() {
        let mv = parse_move("P43").unwrap();
        assert_eq!((mv.piece, mv.x, mv.y), ('P', 4, 3));
        assert_eq!(mv.indication, Indication::None);

        let mv = parse_move("c22l").unwrap();
        assert_eq!(mv.piece, 'c');
        assert_eq!(mv.indication, Indication::Left);

        assert!(parse_move("P4").is_err());
        assert!(parse_move("Px3").is_err());
        assert!(parse_move("P43Q").is_err());
    }
}
