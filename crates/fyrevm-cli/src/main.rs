// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Terminal front-end: a stdin/stdout `Host` around the engine.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use fyrevm::{Engine, EngineOptions, GameImage, Host};

/// Run a Glulx story file in the terminal.
#[derive(Parser)]
#[command(name = "fyrevm", version, about)]
struct Args {
    /// The story file (.ulx).
    story: PathBuf,

    /// Where save files go; defaults to the story path with a
    /// .fyresave extension.
    #[arg(long)]
    save_file: Option<PathBuf>,

    /// Heap ceiling in bytes for the story's malloc.
    #[arg(long, default_value_t = 4 << 20)]
    max_heap: u32,

    /// Do not print non-MAIN channels as status lines.
    #[arg(long)]
    quiet_channels: bool,
}

/// Host implementation over stdin/stdout and a save file.
struct TerminalHost {
    save_path: PathBuf,
    quiet_channels: bool,
}

impl Host for TerminalHost {
    fn line_wanted(&mut self) -> Option<String> {
        print!("> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    fn key_wanted(&mut self) -> Option<char> {
        // Line-buffered terminals cannot deliver single keys; take the
        // first character of a line instead.
        self.line_wanted().and_then(|line| line.chars().next())
    }

    fn output_ready(&mut self, channels: BTreeMap<String, String>) {
        if !self.quiet_channels {
            for (name, text) in &channels {
                if name != "MAIN" {
                    println!("[{name}: {}]", text.trim_end());
                }
            }
        }
        if let Some(main) = channels.get("MAIN") {
            print!("{main}");
            let _ = std::io::stdout().flush();
        }
    }

    fn save_requested(&mut self) -> Option<Box<dyn Write>> {
        match File::create(&self.save_path) {
            Ok(file) => {
                info!("saving to {}", self.save_path.display());
                Some(Box::new(file))
            }
            Err(e) => {
                eprintln!("cannot write {}: {e}", self.save_path.display());
                None
            }
        }
    }

    fn load_requested(&mut self) -> Option<Box<dyn Read>> {
        match File::open(&self.save_path) {
            Ok(file) => Some(Box::new(file)),
            Err(e) => {
                eprintln!("cannot read {}: {e}", self.save_path.display());
                None
            }
        }
    }

    fn transition_requested(&mut self) {
        debug!("story signalled a transition");
    }
}

fn default_save_path(story: &Path) -> PathBuf {
    story.with_extension("fyresave")
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let bytes = std::fs::read(&args.story)
        .with_context(|| format!("reading {}", args.story.display()))?;
    let image = GameImage::load(bytes)
        .with_context(|| format!("loading {}", args.story.display()))?;
    info!(
        "loaded {} (Glulx {}.{}.{})",
        args.story.display(),
        image.version() >> 16,
        (image.version() >> 8) & 0xFF,
        image.version() & 0xFF
    );

    let options = EngineOptions {
        max_heap_extent: args.max_heap,
        ..EngineOptions::default()
    };
    let mut engine = Engine::new(image, options)?;

    let mut host = TerminalHost {
        save_path: args
            .save_file
            .unwrap_or_else(|| default_save_path(&args.story)),
        quiet_channels: args.quiet_channels,
    };

    engine.run(&mut host).context("story aborted")?;
    println!();
    Ok(())
}
