// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! A line-oriented key source that reads key events and commands from stdin.

use std::io;

use tracing::{info, span, warn, Level};

use crate::dispatch::KeyEvent;
use crate::engine::Engine;

const DOWN: &str = "d";
const UP: &str = "u";
const PROFILE: &str = ":profile";
const VOLUME: &str = ":volume";
const TOGGLE: &str = ":toggle";
const QUIT: &str = ":quit";

/// Something read from a line of input.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Key(KeyEvent),
    Profile(String),
    Volume(u8),
    Toggle,
    Quit,
}

/// Parses a line of input. `d <key>` and `u <key>` are single key events, commands start
/// with a colon, and anything else is typed text that produces a down and up per character.
pub fn parse_line(line: &str) -> Vec<Input> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Vec::new();
    }

    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let rest = line.trim()[command.len()..].trim();

    match command {
        DOWN | UP if !rest.is_empty() => match rest.parse::<i64>() {
            Ok(key) if command == DOWN => vec![Input::Key(KeyEvent::down(key))],
            Ok(key) => vec![Input::Key(KeyEvent::up(key))],
            Err(_) => typed(line),
        },
        PROFILE if !rest.is_empty() => vec![Input::Profile(rest.to_string())],
        VOLUME => match rest.parse::<u8>() {
            Ok(volume) => vec![Input::Volume(volume)],
            Err(_) => {
                warn!(input = line, "Volume must be a number from 0 to 100");
                Vec::new()
            }
        },
        TOGGLE => vec![Input::Toggle],
        QUIT => vec![Input::Quit],
        _ if command.starts_with(':') => {
            warn!(input = line, "Unrecognized command");
            Vec::new()
        }
        _ => typed(line),
    }
}

/// A down and up event per character, keyed by the character's code point.
fn typed(text: &str) -> Vec<Input> {
    text.chars()
        .flat_map(|c| {
            let key = i64::from(u32::from(c));
            [
                Input::Key(KeyEvent::down(key)),
                Input::Key(KeyEvent::up(key)),
            ]
        })
        .collect()
}

/// Reads one line and applies it to the engine. Returns false at end of input or on quit.
fn monitor_io<R, W>(engine: &Engine, mut reader: R, mut writer: W) -> Result<bool, io::Error>
where
    R: io::BufRead,
    W: io::Write,
{
    write!(
        writer,
        "Keys ({} <key>, {} <key>, text, {} <name>, {} <n>, {}, {}): ",
        DOWN, UP, PROFILE, VOLUME, TOGGLE, QUIT,
    )?;
    writer.flush()?;

    let mut input = String::default();
    if reader.read_line(&mut input)? == 0 {
        return Ok(false);
    }

    for input in parse_line(&input) {
        match input {
            Input::Key(event) => engine.handle(event),
            Input::Profile(name) => {
                engine.set_profile(&name);
                writeln!(
                    writer,
                    "Profile: {}",
                    engine.current_profile().unwrap_or_default()
                )?;
            }
            Input::Volume(volume) => {
                engine.settings().set_volume(volume);
                writeln!(writer, "Volume: {}", engine.settings().volume())?;
            }
            Input::Toggle => {
                let enabled = engine.settings().toggle();
                writeln!(writer, "Sound {}", if enabled { "on" } else { "off" })?;
            }
            Input::Quit => return Ok(false),
        }
    }
    Ok(true)
}

/// Feeds stdin to the engine until end of input or `:quit`.
pub fn run(engine: &Engine) -> Result<(), io::Error> {
    let span = span!(Level::INFO, "stdin keys");
    let _enter = span.enter();

    info!("Reading keys from stdin.");

    while monitor_io(engine, io::stdin().lock(), io::stdout())? {}

    info!("Key input finished.");
    Ok(())
}
