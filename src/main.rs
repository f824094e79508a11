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
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use keyclack::engine::Engine;
use keyclack::profiles::ProfileLibrary;
use keyclack::random::ThreadRandomizer;
use keyclack::{audio, config, keys};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Plays switch sounds for every keystroke."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available switch profiles.
    Profiles {},
    /// Renders a profile's key-down and key-up sounds to a WAV file.
    Render {
        /// The profile to render. Unknown names render the default profile.
        profile: String,
        /// The path of the WAV file to write.
        path: String,
        /// Silence between the key-down and key-up sounds, in milliseconds.
        #[arg(short, long, default_value_t = 100)]
        gap_ms: u64,
    },
    /// Start plays sounds for keys read from stdin.
    Start {
        /// The path to the config file. Without one, defaults and KEYCLACK_ environment
        /// variables are used.
        config_path: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Profiles {} => {
            let library = ProfileLibrary::new();

            println!("Profiles:");
            for name in library.available_profiles() {
                let preset = library.preset(&name);
                println!(
                    "- {} (down: {} Hz, {} ms; up: {} Hz, {} ms)",
                    name,
                    preset.key_down().frequency(),
                    preset.key_down().duration() * 1000.0,
                    preset.key_up().frequency(),
                    preset.key_up().duration() * 1000.0,
                );
            }
        }
        Commands::Render {
            profile,
            path,
            gap_ms,
        } => {
            let library = ProfileLibrary::new();
            let profile = library.get_profile(&profile);
            profile.write_wav(Path::new(&path), Duration::from_millis(gap_ms))?;
            println!("Wrote {} to {}.", profile.name(), path);
        }
        Commands::Start { config_path } => {
            let config_path = config_path.map(PathBuf::from);
            let config = config::load(config_path.as_deref())?;
            let engine = Engine::start(&config, Arc::new(ThreadRandomizer::default()));

            keys::run(&engine)?;
            engine.shutdown();
        }
    }

    Ok(())
}
