// Console front end - line commands read from stdin

use std::io::{self, BufRead, Write};
use thiserror::Error;

use crate::game::{Game, InputEvent, Outcome};
use crate::persistence::save_game;
use crate::types::Point;

pub const HELP: &str = "\
Commands:
  water N        pour N litres from your supply
  fertilise N    spread N kilograms from your supply
  grow           advance one turn
  prune ID       cut branch ID and everything above it
  prune-at X Y   cut the branch under a point
  harvest X Y    pick the fruit under a point
  undo           reverse the last action
  status         show supplies and tree levels
  branches       list every branch
  save PATH      write the game to a JSON file
  help           show this text
  quit           leave the game";

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Input(InputEvent),
    Prune(u32),
    PruneAt(Point),
    Status,
    Branches,
    Save(String),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("'{0}' needs {1}")]
    MissingArgument(&'static str, &'static str),
    #[error("'{0}' is not a number")]
    BadNumber(String),
}

fn number<T: std::str::FromStr>(
    arg: Option<&str>,
    cmd: &'static str,
    what: &'static str,
) -> Result<T, CommandError> {
    let arg = arg.ok_or(CommandError::MissingArgument(cmd, what))?;
    arg.parse().map_err(|_| CommandError::BadNumber(arg.to_string()))
}

fn point<'a>(
    args: &mut impl Iterator<Item = &'a str>,
    cmd: &'static str,
) -> Result<Point, CommandError> {
    let x = number(args.next(), cmd, "X and Y")?;
    let y = number(args.next(), cmd, "X and Y")?;
    Ok(Point::new(x, y))
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Ok(None);
    };
    let command = match cmd.to_ascii_lowercase().as_str() {
        "water" | "w" => Command::Input(InputEvent::Water(number(
            words.next(),
            "water",
            "an amount",
        )?)),
        "fertilise" | "fertilize" | "f" => Command::Input(InputEvent::Fertilise(number(
            words.next(),
            "fertilise",
            "an amount",
        )?)),
        "grow" | "g" => Command::Input(InputEvent::Grow),
        "prune" | "p" => Command::Prune(number(words.next(), "prune", "a branch id")?),
        "prune-at" => Command::PruneAt(point(&mut words, "prune-at")?),
        "harvest" => Command::Input(InputEvent::Harvest(point(&mut words, "harvest")?)),
        "undo" | "u" => Command::Input(InputEvent::Undo),
        "status" | "s" => Command::Status,
        "branches" | "b" => Command::Branches,
        "save" => Command::Save(
            words
                .next()
                .ok_or(CommandError::MissingArgument("save", "a path"))?
                .to_string(),
        ),
        "help" | "h" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn write_status<W: Write>(game: &Game, out: &mut W) -> io::Result<()> {
    let stats = game.tree.stats();
    writeln!(
        out,
        "supply: {:.2} water, {:.2} fertiliser",
        game.player.water_supply(),
        game.player.fertiliser_supply()
    )?;
    writeln!(
        out,
        "tree: water {:.2}/{:.2}, nutrients {:.2}/{:.2}",
        stats.water_level, stats.max_water, stats.nutrient_level, stats.max_nutrients
    )?;
    writeln!(
        out,
        "branches: {} ({} alive), fruit: {} ({} picked), undo depth: {}",
        stats.branch_count,
        stats.living_count,
        stats.fruit_count,
        stats.fruit_collected,
        game.timeline.len()
    )
}

fn write_branches<W: Write>(game: &Game, out: &mut W) -> io::Result<()> {
    for b in game.tree.branches() {
        let parent = b.parent().map_or_else(|| "-".to_string(), |p| p.to_string());
        let tip = b.tip_position();
        writeln!(
            out,
            "#{:<3} parent {:<3} age {:<3} {:>7.2} x {:<7.2} angle {:>6.1} tip ({:.1}, {:.1}) {}{}",
            b.id(),
            parent,
            b.age(),
            b.width(),
            b.length(),
            b.angle(),
            tip.x,
            tip.y,
            if b.is_alive() { "alive" } else { "dead" },
            if b.has_leaves() {
                format!(", {} leaves", b.leaves().len())
            } else {
                String::new()
            },
        )?;
    }
    Ok(())
}

fn write_outcome<W: Write>(outcome: Outcome, out: &mut W) -> io::Result<()> {
    match outcome {
        Outcome::Performed { action } => writeln!(out, "done: {action}"),
        Outcome::Undone { action } => writeln!(out, "undid: {action}"),
        Outcome::ModeChanged { mode } => writeln!(out, "mode: {mode:?}"),
        Outcome::Ignored => writeln!(out, "nothing there"),
    }
}

/// Run one command against the game. Returns `false` once the player quits.
pub fn execute<W: Write>(game: &mut Game, command: Command, out: &mut W) -> io::Result<bool> {
    let result = match command {
        Command::Input(event) => game.handle_input(event),
        Command::Prune(id) => game.prune(id).map(|action| Outcome::Performed { action }),
        Command::PruneAt(point) => game.click_once(point),
        Command::Status => {
            write_status(game, out)?;
            return Ok(true);
        }
        Command::Branches => {
            write_branches(game, out)?;
            return Ok(true);
        }
        Command::Save(path) => {
            match save_game(&game.state, &path) {
                Ok(()) => writeln!(out, "saved to {path}")?,
                Err(e) => writeln!(out, "error: {e}")?,
            }
            return Ok(true);
        }
        Command::Help => {
            writeln!(out, "{HELP}")?;
            return Ok(true);
        }
        Command::Quit => return Ok(false),
    };

    match result {
        Ok(outcome) => write_outcome(outcome, out)?,
        Err(e) => writeln!(out, "error: {e}")?,
    }
    Ok(true)
}

/// Read commands until `quit` or end of input.
pub fn run<R: BufRead, W: Write>(game: &mut Game, input: R, out: &mut W) -> io::Result<()> {
    writeln!(out, "Time Travel Tree. Type 'help' for commands.")?;
    write_status(game, out)?;
    for line in input.lines() {
        let line = line?;
        match parse_command(&line) {
            Ok(Some(command)) => {
                if !execute(game, command, out)? {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => writeln!(out, "{e}")?,
        }
        out.flush()?;
    }
    Ok(())
}
