use std::error::Error;

use services::{SessionController, SessionError, SessionMode, SessionSnapshot};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

use crate::commands::{HELP, PlayerCommand};
use crate::render;

type Input = Lines<BufReader<Stdin>>;

fn stdin_lines() -> Input {
    BufReader::new(tokio::io::stdin()).lines()
}

/// Tracks what has already been announced so countdown ticks stay quiet.
#[derive(Default)]
struct Screen {
    mode: Option<SessionMode>,
    warned_low: bool,
    announced_time_up: bool,
}

impl Screen {
    fn observe(&mut self, snapshot: &SessionSnapshot) {
        if self.mode != Some(snapshot.mode) {
            self.mode = Some(snapshot.mode);
            match snapshot.mode {
                SessionMode::Review => {
                    println!("\n{}\n", render::results(snapshot));
                    println!("{}", render::question(snapshot));
                }
                SessionMode::Playing | SessionMode::Preview => {
                    println!("{}", render::question(snapshot));
                }
                SessionMode::Submitting => println!("Submitting your answers..."),
                SessionMode::Lobby => {}
            }
        }
        if let Some(remaining) = snapshot.remaining {
            if remaining.low && !remaining.expired && !self.warned_low {
                self.warned_low = true;
                println!("Only {} left.", remaining.display());
            }
        }
        if snapshot.time_up && !self.announced_time_up {
            self.announced_time_up = true;
            println!("Time is up. Your answers are locked.");
        }
    }
}

async fn enter(
    controller: &SessionController,
    input: &mut Input,
    mut code: Option<String>,
) -> Result<bool, Box<dyn Error>> {
    loop {
        let candidate = match code.take() {
            Some(code) => code,
            None => {
                println!("Access code:");
                match input.next_line().await? {
                    Some(line) => line,
                    None => return Ok(false),
                }
            }
        };
        match controller.start(&candidate).await {
            Ok(()) => return Ok(true),
            Err(err) if err.is_retryable() => println!("{}", err.user_message()),
            Err(err) => {
                println!("{}", err.user_message());
                return Err(err.into());
            }
        }
    }
}

fn report(err: &SessionError) {
    println!("{}", err.user_message());
}

fn apply(controller: &SessionController, command: &PlayerCommand) -> Result<(), SessionError> {
    match command {
        PlayerCommand::Next => controller.next().map(|_| ()),
        PlayerCommand::Back => controller.back().map(|_| ()),
        PlayerCommand::GoTo(index) => controller.go_to(*index).map(|_| ()),
        PlayerCommand::Choose(option) => controller.select_option(*option),
        PlayerCommand::Submit
        | PlayerCommand::Time
        | PlayerCommand::Help
        | PlayerCommand::Quit => Ok(()),
    }
}

/// Interactive loop for one attempt (or a preview when the controller is one).
pub async fn run(controller: SessionController, code: Option<String>) -> Result<(), Box<dyn Error>> {
    let mut input = stdin_lines();
    let mut updates = controller.subscribe();
    let mut screen = Screen::default();

    if controller.mode() == SessionMode::Lobby && !enter(&controller, &mut input, code).await? {
        return Ok(());
    }
    screen.observe(&updates.borrow_and_update());
    println!("{HELP}");

    let mut confirm_submit = false;
    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else { break };
                if confirm_submit {
                    confirm_submit = false;
                    if matches!(line.trim(), "y" | "Y" | "yes") {
                        if let Err(err) = controller.submit().await {
                            report(&err);
                        }
                    } else {
                        println!("Submission cancelled.");
                    }
                    continue;
                }
                let command = match PlayerCommand::parse(&line) {
                    Ok(command) => command,
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                match command {
                    PlayerCommand::Quit => break,
                    PlayerCommand::Help => println!("{HELP}"),
                    PlayerCommand::Time => {
                        let snapshot = controller.snapshot();
                        match snapshot.remaining {
                            Some(remaining) => println!("{} left", remaining.display()),
                            None => println!("No countdown running."),
                        }
                    }
                    PlayerCommand::Submit => {
                        let snapshot = controller.snapshot();
                        if snapshot.mode != SessionMode::Playing {
                            println!("Nothing to submit.");
                            continue;
                        }
                        let unanswered = snapshot.progress.map_or(0, |p| p.unanswered.len());
                        if unanswered > 0 {
                            println!("{unanswered} question(s) unanswered. Submit anyway? [y/N]");
                        } else {
                            println!("Submit your answers? [y/N]");
                        }
                        confirm_submit = true;
                    }
                    other => match apply(&controller, &other) {
                        Ok(()) => println!("{}", render::question(&controller.snapshot())),
                        Err(err) => report(&err),
                    },
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                screen.observe(&snapshot);
            }
        }
    }

    info!(exam_id = %controller.exam_id(), mode = ?controller.mode(), "player exited");
    controller.shutdown();
    Ok(())
}
