//! Interactive terminal preview over a clock-driven element

use anyhow::Result;
use media_pipeline::{ClockElement, PlaybackController, PlaybackPhase, PlaybackState, Quality};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const BAR_WIDTH: usize = 20;
const TICK: Duration = Duration::from_millis(250);

pub const HELP: &str = "commands: p (play/pause), m (mute), v <0-100> (volume), s <0-100> (seek %), q <1080p|720p|480p> (quality), i (status), x (exit)";

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewCommand {
    TogglePlay,
    ToggleMute,
    Volume(f64),
    Seek(f64),
    Quality(Quality),
    Status,
    Help,
    Exit,
}

pub fn parse_command(line: &str) -> std::result::Result<PreviewCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(PreviewCommand::Status);
    };
    let arg = parts.next();

    let number = |name: &str| -> std::result::Result<f64, String> {
        arg.ok_or_else(|| format!("{} needs a value", name))?
            .parse::<f64>()
            .map_err(|e| format!("invalid {}: {}", name, e))
    };

    match head {
        "p" | "play" | "pause" => Ok(PreviewCommand::TogglePlay),
        "m" | "mute" => Ok(PreviewCommand::ToggleMute),
        "v" | "volume" => Ok(PreviewCommand::Volume(number("volume")?)),
        "s" | "seek" => Ok(PreviewCommand::Seek(number("seek")?)),
        "q" | "quality" => arg
            .ok_or_else(|| "quality needs a value".to_string())?
            .parse()
            .map(PreviewCommand::Quality),
        "i" | "status" => Ok(PreviewCommand::Status),
        "h" | "help" | "?" => Ok(PreviewCommand::Help),
        "x" | "exit" | "quit" => Ok(PreviewCommand::Exit),
        other => Err(format!("unknown command '{}'", other)),
    }
}

pub fn apply(controller: &mut PlaybackController<ClockElement>, command: &PreviewCommand) {
    match command {
        PreviewCommand::TogglePlay => {
            controller.toggle_play();
        }
        PreviewCommand::ToggleMute => {
            controller.toggle_mute();
        }
        PreviewCommand::Volume(v) => controller.set_volume(*v),
        PreviewCommand::Seek(pct) => controller.seek(*pct),
        PreviewCommand::Quality(q) => controller.set_quality(*q),
        PreviewCommand::Status | PreviewCommand::Help | PreviewCommand::Exit => {}
    }
}

pub fn render(state: &PlaybackState) -> String {
    let filled = ((state.progress / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    let phase = match state.phase {
        PlaybackPhase::Unbound => "loading",
        PlaybackPhase::Loaded => "ready",
        PlaybackPhase::Playing => "playing",
        PlaybackPhase::Paused => "paused",
        PlaybackPhase::Ended => "ended",
    };
    let volume = if state.is_muted {
        "muted".to_string()
    } else {
        format!("vol {:.0}", state.volume)
    };
    let aspect = state
        .aspect_ratio
        .map(|a| a.to_string())
        .unwrap_or_else(|| "?".to_string());

    format!(
        "[{}{}] {:>3.0}% {:<7} | {} | {} | {}",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        state.progress,
        phase,
        volume,
        aspect,
        state.quality
    )
}

/// Read commands from stdin until exit or EOF, redrawing when the state changes
pub async fn run(controller: &mut PlaybackController<ClockElement>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(TICK);

    controller.pump();
    let mut last = render(controller.state());
    println!("{}", HELP);
    println!("{}", last);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if controller.pump() == 0 {
                    continue;
                }
                let line = render(controller.state());
                if line != last {
                    println!("{}", line);
                    last = line;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed, leaving preview");
                    break;
                };
                match parse_command(&line) {
                    Ok(PreviewCommand::Exit) => break,
                    Ok(PreviewCommand::Help) => println!("{}", HELP),
                    Ok(command) => {
                        apply(controller, &command);
                        last = render(controller.state());
                        println!("{}", last);
                    }
                    Err(e) => eprintln!("{} ({})", e, HELP),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_pipeline::MediaElement;

    fn loaded_controller() -> PlaybackController<ClockElement> {
        let mut controller = PlaybackController::new(ClockElement::new(40.0, 1920, 1080));
        controller.bind("/x.mp4");
        controller.pump();
        controller
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("p").unwrap(), PreviewCommand::TogglePlay);
        assert_eq!(parse_command("v 35").unwrap(), PreviewCommand::Volume(35.0));
        assert_eq!(parse_command("seek 50").unwrap(), PreviewCommand::Seek(50.0));
        assert_eq!(
            parse_command("q 480p").unwrap(),
            PreviewCommand::Quality(Quality::Standard)
        );
        assert_eq!(parse_command("   ").unwrap(), PreviewCommand::Status);
        assert!(parse_command("v").is_err());
        assert!(parse_command("v loud").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn test_apply_drives_controller() {
        let mut controller = loaded_controller();
        apply(&mut controller, &PreviewCommand::Volume(120.0));
        assert_eq!(controller.state().volume, 100.0);

        apply(&mut controller, &PreviewCommand::Seek(25.0));
        assert_eq!(controller.element().current_time(), 10.0);

        apply(&mut controller, &PreviewCommand::TogglePlay);
        assert!(controller.state().is_playing);
    }

    #[test]
    fn test_render_line() {
        let mut controller = loaded_controller();
        controller.seek(50.0);
        controller.toggle_mute();
        assert_eq!(
            render(controller.state()),
            "[##########----------]  50% ready   | muted | 16:9 | 720p"
        );
    }
}
