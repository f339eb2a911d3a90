//! # Chessboard configuration
//!
//! Loaded from TOML; every section and key is optional and falls back to the
//! values of the reference board (200 steps per cell, 100/300 steps/s carry
//! and travel speeds, 32-slot motion queue, 8-slot piece-move queue).
//!
//! ## Example
//!
//! ```toml
//! [steppers]
//! microsteps = 2
//! carry_speed = 80
//!
//! [homing]
//! rehome_min_moves = 6
//!
//! [simulator]
//! ticks_per_ms = 50
//! ```

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::chessboard::ControllerSettings;
use crate::motion::{DriverSettings, RehomePolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub steppers: StepperConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub homing: HomingConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Stepper speeds are logical steps per second.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepperConfig {
    #[serde(default = "default_speed")]
    pub speed: u32,
    #[serde(default = "default_microsteps")]
    pub microsteps: u32,
    /// Used while the magnet drags a piece.
    #[serde(default = "default_carry_speed")]
    pub carry_speed: u32,
    /// Used for empty travel.
    #[serde(default = "default_travel_speed")]
    pub travel_speed: u32,
    #[serde(default = "default_homing_speed")]
    pub homing_speed: u32,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            microsteps: default_microsteps(),
            carry_speed: default_carry_speed(),
            travel_speed: default_travel_speed(),
            homing_speed: default_homing_speed(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoardConfig {
    #[serde(default = "default_steps_per_unit")]
    pub steps_per_unit: i32,
    #[serde(default = "default_true")]
    pub limit_switch_polling: bool,
    /// Steps from the X switch to file 0.
    #[serde(default = "default_working_offset_x")]
    pub working_offset_x: i32,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            steps_per_unit: default_steps_per_unit(),
            limit_switch_polling: true,
            working_offset_x: default_working_offset_x(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HomingConfig {
    #[serde(default = "default_seek_steps")]
    pub seek_steps: i32,
    #[serde(default = "default_backoff_steps")]
    pub backoff_steps: i32,
    #[serde(default = "default_zone")]
    pub zone: i32,
    #[serde(default)]
    pub rehome_min_moves: u32,
    #[serde(default = "default_travel_units")]
    pub travel_units: i32,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            seek_steps: default_seek_steps(),
            backoff_steps: default_backoff_steps(),
            zone: default_zone(),
            rehome_min_moves: 0,
            travel_units: default_travel_units(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_motion_capacity")]
    pub motion_capacity: usize,
    #[serde(default = "default_piece_move_capacity")]
    pub piece_move_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            motion_capacity: default_motion_capacity(),
            piece_move_capacity: default_piece_move_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_ticks_per_ms")]
    pub ticks_per_ms: u32,
    #[serde(default = "default_start_x")]
    pub start_x: i64,
    #[serde(default = "default_start_y")]
    pub start_y: i64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ticks_per_ms: default_ticks_per_ms(),
            start_x: default_start_x(),
            start_y: default_start_y(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.steppers;
        for (name, value) in [
            ("speed", s.speed),
            ("microsteps", s.microsteps),
            ("carry_speed", s.carry_speed),
            ("travel_speed", s.travel_speed),
            ("homing_speed", s.homing_speed),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("steppers.{} must be > 0", name)));
            }
        }
        if self.board.steps_per_unit <= 0 {
            return Err(ConfigError::Invalid("board.steps_per_unit must be > 0".to_string()));
        }
        if self.homing.seek_steps <= 0 || self.homing.backoff_steps <= 0 {
            return Err(ConfigError::Invalid(
                "homing.seek_steps and homing.backoff_steps must be > 0".to_string(),
            ));
        }
        if self.queues.motion_capacity < crate::motion::planner::MAX_PLAN_LEN {
            return Err(ConfigError::Invalid(format!(
                "queues.motion_capacity must hold at least {} commands",
                crate::motion::planner::MAX_PLAN_LEN
            )));
        }
        if self.queues.piece_move_capacity < 2 {
            return Err(ConfigError::Invalid(
                "queues.piece_move_capacity must be at least 2".to_string(),
            ));
        }
        if self.simulator.ticks_per_ms == 0 {
            return Err(ConfigError::Invalid("simulator.ticks_per_ms must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            speed: self.steppers.speed,
            microsteps: self.steppers.microsteps,
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            steps_per_unit: self.board.steps_per_unit,
            carry_speed: self.steppers.carry_speed,
            travel_speed: self.steppers.travel_speed,
            homing_speed: self.steppers.homing_speed,
            working_offset_x: self.board.working_offset_x,
            seek_steps: self.homing.seek_steps,
            backoff_steps: self.homing.backoff_steps,
            limit_switch_polling: self.board.limit_switch_polling,
            motion_capacity: self.queues.motion_capacity,
            piece_move_capacity: self.queues.piece_move_capacity,
            rehome: RehomePolicy {
                zone: self.homing.zone,
                min_moves_between: self.homing.rehome_min_moves,
                travel_units: self.homing.travel_units,
            },
        }
    }
}

fn default_speed() -> u32 { 100 }
fn default_microsteps() -> u32 { 1 }
fn default_carry_speed() -> u32 { 100 }
fn default_travel_speed() -> u32 { 300 }
fn default_homing_speed() -> u32 { 100 }
fn default_steps_per_unit() -> i32 { 200 }
fn default_true() -> bool { true }
fn default_working_offset_x() -> i32 { 430 }
fn default_seek_steps() -> i32 { 2000 }
fn default_backoff_steps() -> i32 { 25 }
fn default_zone() -> i32 { 2 }
fn default_travel_units() -> i32 { 100 }
fn default_motion_capacity() -> usize { 32 }
fn default_piece_move_capacity() -> usize { 8 }
fn default_ticks_per_ms() -> u32 { 20 }
fn default_start_x() -> i64 { 600 }
fn default_start_y() -> i64 { 400 }

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.board.steps_per_unit, 200);
        assert_eq!(config.steppers.carry_speed, 100);
        assert_eq!(config.steppers.travel_speed, 300);
        assert_eq!(config.queues.motion_capacity, 32);
        assert_eq!(config.queues.piece_move_capacity, 8);
        assert_eq!(config.homing.rehome_min_moves, 0);
        assert!(config.board.limit_switch_polling);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("board.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[steppers]\nmicrosteps = 4\n\n[homing]\nrehome_min_moves = 6").unwrap();
        file.flush().unwrap();
        let config = load_config(&file_path).unwrap();
        assert_eq!(config.steppers.microsteps, 4);
        assert_eq!(config.homing.rehome_min_moves, 6);
        // Defaults for missing fields
        assert_eq!(config.steppers.travel_speed, 300);
        assert_eq!(config.board.working_offset_x, 430);

        let settings = config.controller_settings();
        assert_eq!(settings.rehome.min_moves_between, 6);
        assert_eq!(config.driver_settings().microsteps, 4);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(&file_path);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.steppers.carry_speed = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.queues.piece_move_capacity = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.queues.motion_capacity = 4;
        assert!(config.validate().is_err());
    }
}
